use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::Instrument;
use speccheck_core::{PullRequestRef, ReviewConfig, SpecCheckError, TokenUsage};

use crate::context::{self, PullRequestContext};
use crate::evidence;
use crate::llm::{ChatMessage, Completion, LanguageModel};
use crate::prompt;
use crate::tracker::IssueTracker;
use crate::verdict::{self, ActionOutcome, ReviewActionPlan, Verdict};

/// Output of the two model stages.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StageOutputs {
    /// Free-form judgment from the review stage.
    pub review: Completion,
    /// Canonical verdict text from the validation stage.
    pub validation: Completion,
}

/// The judge-then-normalize model pipeline.
///
/// Each stage builds its own conversation from scratch; nothing but the
/// review stage's answer crosses into the validation stage.
pub struct ConformancePipeline<'a> {
    model: &'a dyn LanguageModel,
}

impl<'a> ConformancePipeline<'a> {
    /// Create a pipeline over `model`.
    pub fn new(model: &'a dyn LanguageModel) -> Self {
        Self { model }
    }

    /// Judge whether `diff` satisfies the spec carried by `seed`.
    ///
    /// # Errors
    ///
    /// Returns [`SpecCheckError::NoAnswer`] if the model produces no content,
    /// or the model's own error.
    pub async fn review(
        &self,
        pr: &PullRequestRef,
        seed: &[ChatMessage],
        author: &str,
        diff: &str,
    ) -> Result<Completion, SpecCheckError> {
        let messages = prompt::review_conversation(seed, author, diff)?;
        self.ask(&format!("PR review call for #{}", pr.number), &messages)
            .await
    }

    /// Render the review stage's answer into one of the two verdict templates.
    ///
    /// # Errors
    ///
    /// Returns [`SpecCheckError::NoAnswer`] if the model produces no content,
    /// or the model's own error.
    pub async fn validate(
        &self,
        pr: &PullRequestRef,
        review: &Completion,
        author: &str,
    ) -> Result<Completion, SpecCheckError> {
        let messages = prompt::validation_conversation(review, author)?;
        self.ask(
            &format!("PR review validation call for #{}", pr.number),
            &messages,
        )
        .await
    }

    /// Run both stages in order.
    ///
    /// # Errors
    ///
    /// Propagates the first stage failure; the validation stage does not run
    /// if the review stage failed.
    pub async fn run(
        &self,
        pr: &PullRequestRef,
        seed: &[ChatMessage],
        author: &str,
        diff: &str,
    ) -> Result<StageOutputs, SpecCheckError> {
        let review = self.review(pr, seed, author, diff).await?;
        let validation = self.validate(pr, &review, author).await?;
        Ok(StageOutputs { review, validation })
    }

    async fn ask(
        &self,
        stage: &str,
        messages: &[ChatMessage],
    ) -> Result<Completion, SpecCheckError> {
        let span = tracing::info_span!("stage", name = stage);
        tracing::info!(parent: &span, model = self.model.model(), "asking model");
        let answer = self.model.complete(messages).instrument(span).await?;
        match answer {
            Some(completion) => {
                tracing::debug!(
                    input = completion.token_usage.input,
                    output = completion.token_usage.output,
                    total = completion.token_usage.total,
                    "token usage"
                );
                Ok(completion)
            }
            None => {
                tracing::info!(stage, "no answer found");
                Err(SpecCheckError::NoAnswer {
                    stage: stage.to_string(),
                })
            }
        }
    }
}

/// Outcome of one spec review.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewReport {
    /// The reviewed pull request.
    pub pull_request: PullRequestRef,
    /// Pull request author.
    pub author: String,
    /// Number of the issue the change was judged against.
    pub linked_issue: u64,
    /// The normalized verdict.
    pub verdict: Verdict,
    /// Planned actions, in order.
    pub plan: ReviewActionPlan,
    /// Executed actions; empty on a dry run.
    pub outcomes: Vec<ActionOutcome>,
    /// `true` if the plan was built but not executed.
    pub dry_run: bool,
    /// Model identifier used for both stages.
    pub model_used: String,
    /// Tokens spent by the review stage.
    pub review_tokens: TokenUsage,
    /// Tokens spent by the validation stage.
    pub validation_tokens: TokenUsage,
    /// When the review finished.
    pub reviewed_at: DateTime<Utc>,
}

impl ReviewReport {
    /// Tokens spent across both stages.
    pub fn total_tokens(&self) -> TokenUsage {
        self.review_tokens + self.validation_tokens
    }

    /// Actions that were attempted and failed.
    pub fn failed_actions(&self) -> impl Iterator<Item = &ActionOutcome> {
        self.outcomes.iter().filter(|o| !o.succeeded())
    }

    /// Render the report as markdown.
    pub fn to_markdown(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!("# Spec Review: {}\n\n", self.pull_request));
        out.push_str(&format!(
            "**Author:** {} | **Linked issue:** #{} | **Verdict:** {} | **Model:** {} | **Tokens:** {}\n\n",
            self.author,
            self.linked_issue,
            self.verdict.label(),
            self.model_used,
            self.total_tokens().total,
        ));
        out.push_str(self.verdict.text());
        out.push_str("\n\n## Actions\n\n");
        if self.plan.is_empty() {
            out.push_str("No actions taken.\n");
        } else if self.dry_run {
            for action in self.plan.actions() {
                out.push_str(&format!("- {action} (dry run)\n"));
            }
        } else {
            for outcome in &self.outcomes {
                match &outcome.error {
                    None => out.push_str(&format!("- {} \u{2713}\n", outcome.action)),
                    Some(e) => out.push_str(&format!("- {} \u{2717} {e}\n", outcome.action)),
                }
            }
        }
        out
    }
}

impl fmt::Display for ReviewReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Spec Review")?;
        writeln!(f, "===========")?;
        writeln!(
            f,
            "PR: {} | Author: {} | Linked issue: #{} | Model: {} | Tokens: {}\n",
            self.pull_request,
            self.author,
            self.linked_issue,
            self.model_used,
            self.total_tokens().total,
        )?;
        writeln!(f, "Verdict: {}", self.verdict.label().to_uppercase())?;
        writeln!(f, "{}\n", self.verdict.text())?;

        if self.plan.is_empty() {
            writeln!(f, "No actions taken.")?;
        } else if self.dry_run {
            for action in self.plan.actions() {
                writeln!(f, "[DRY RUN] {action}")?;
            }
        } else {
            for outcome in &self.outcomes {
                match &outcome.error {
                    None => writeln!(f, "[OK] {}", outcome.action)?,
                    Some(e) => writeln!(f, "[FAILED] {}: {e}", outcome.action)?,
                }
            }
        }
        Ok(())
    }
}

/// Review orchestrator: context, evidence, both model stages, then dispatch.
///
/// Every step depends on the previous one, so they run strictly in sequence
/// and the first failure aborts the review before any action is taken.
pub struct SpecReviewer<'a> {
    tracker: &'a dyn IssueTracker,
    model: &'a dyn LanguageModel,
    config: ReviewConfig,
    dry_run: bool,
}

impl<'a> SpecReviewer<'a> {
    /// Create a reviewer from its collaborators and review config.
    pub fn new(
        tracker: &'a dyn IssueTracker,
        model: &'a dyn LanguageModel,
        config: ReviewConfig,
    ) -> Self {
        Self {
            tracker,
            model,
            config,
            dry_run: false,
        }
    }

    /// Build the action plan but do not execute it.
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Review `pr` against its linked issue and act on the verdict.
    ///
    /// # Errors
    ///
    /// Returns [`SpecCheckError::Fetch`], [`SpecCheckError::NoLinkedIssue`],
    /// [`SpecCheckError::NoAnswer`], or [`SpecCheckError::UnclassifiedVerdict`];
    /// in each case no review action has been taken.
    pub async fn review(&self, pr: &PullRequestRef) -> Result<ReviewReport, SpecCheckError> {
        let ctx = context::load_pull_request(self.tracker, pr).await?;
        self.review_context(&ctx).await
    }

    /// Review an already loaded pull request context.
    ///
    /// # Errors
    ///
    /// Same as [`SpecReviewer::review`], minus the context fetch.
    pub async fn review_context(
        &self,
        ctx: &PullRequestContext,
    ) -> Result<ReviewReport, SpecCheckError> {
        let pr = &ctx.pull_request;
        let assembled = evidence::assemble(self.tracker, ctx).await?;

        let stages = ConformancePipeline::new(self.model)
            .run(pr, &assembled.seed, &ctx.author, &ctx.diff)
            .await?;

        let verdict = Verdict::classify(&stages.validation.answer);
        tracing::info!(pull_request = %pr, verdict = verdict.label(), "verdict");
        if let Verdict::Unclassified(text) = &verdict {
            tracing::warn!(
                pull_request = %pr,
                chars = text.len(),
                "verdict matched neither template"
            );
        }

        let plan = ReviewActionPlan::for_verdict(&verdict, self.config.on_unclassified)?;
        let outcomes = if self.dry_run {
            Vec::new()
        } else {
            verdict::dispatch(self.tracker, ctx, &plan).await
        };

        Ok(ReviewReport {
            pull_request: pr.clone(),
            author: ctx.author.clone(),
            linked_issue: assembled.specification.issue_number,
            verdict,
            plan,
            outcomes,
            dry_run: self.dry_run,
            model_used: self.model.model().to_string(),
            review_tokens: stages.review.token_usage,
            validation_tokens: stages.validation.token_usage,
            reviewed_at: Utc::now(),
        })
    }
}
