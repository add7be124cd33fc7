//! Verdict classification and the review actions each verdict triggers.

use std::fmt;

use serde::Serialize;
use speccheck_core::{SpecCheckError, UnclassifiedPolicy};

use crate::context::PullRequestContext;
use crate::tracker::{IssueTracker, ReviewDisposition};

/// Marker of Template A. Checked first because it contains [`ACHIEVED_MARKER`].
pub const NOT_ACHIEVED_MARKER: &str = "Spec not achieved";
/// Marker of Template B.
pub const ACHIEVED_MARKER: &str = "Spec achieved";

/// The normalized outcome of a spec review.
///
/// # Examples
///
/// ```
/// use speccheck_review::verdict::Verdict;
///
/// let verdict = Verdict::classify("### Spec achieved\nocto, nice work.");
/// assert!(matches!(verdict, Verdict::Accepted(_)));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "text", rename_all = "camelCase")]
pub enum Verdict {
    /// The change does not satisfy the spec.
    Rejected(String),
    /// The change satisfies the spec.
    Accepted(String),
    /// The text matched neither template.
    Unclassified(String),
}

impl Verdict {
    /// Classify canonical verdict text by marker, `Spec not achieved` first.
    pub fn classify(text: &str) -> Self {
        if text.contains(NOT_ACHIEVED_MARKER) {
            Verdict::Rejected(text.to_string())
        } else if text.contains(ACHIEVED_MARKER) {
            Verdict::Accepted(text.to_string())
        } else {
            Verdict::Unclassified(text.to_string())
        }
    }

    /// The verdict text as produced by the model.
    pub fn text(&self) -> &str {
        match self {
            Verdict::Rejected(t) | Verdict::Accepted(t) | Verdict::Unclassified(t) => t,
        }
    }

    /// Short label for logs and reports.
    pub fn label(&self) -> &'static str {
        match self {
            Verdict::Rejected(_) => "spec not achieved",
            Verdict::Accepted(_) => "spec achieved",
            Verdict::Unclassified(_) => "unclassified",
        }
    }
}

/// One side-effecting step against the issue tracker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum ReviewAction {
    /// Post a conversation comment.
    PostComment {
        /// Comment text.
        body: String,
    },
    /// Convert the pull request to draft.
    SetDraft,
    /// Submit a formal review.
    SubmitReview {
        /// Review outcome.
        disposition: ReviewDisposition,
        /// Review text, if any.
        body: Option<String>,
    },
}

impl fmt::Display for ReviewAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReviewAction::PostComment { .. } => write!(f, "post comment"),
            ReviewAction::SetDraft => write!(f, "convert to draft"),
            ReviewAction::SubmitReview { disposition, .. } => {
                write!(f, "submit review ({disposition})")
            }
        }
    }
}

/// Ordered actions derived from a verdict.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ReviewActionPlan {
    actions: Vec<ReviewAction>,
}

impl ReviewActionPlan {
    /// Derive the plan for `verdict`.
    ///
    /// Rejected: comment, draft, request changes. Accepted: a comment-only
    /// review carrying the verdict text as its body, since GitHub rejects a
    /// COMMENT review without one. Unclassified: nothing with
    /// [`UnclassifiedPolicy::Ignore`], an error with [`UnclassifiedPolicy::Fail`].
    ///
    /// # Errors
    ///
    /// Returns [`SpecCheckError::UnclassifiedVerdict`] for an unclassified
    /// verdict under [`UnclassifiedPolicy::Fail`].
    ///
    /// # Examples
    ///
    /// ```
    /// use speccheck_core::UnclassifiedPolicy;
    /// use speccheck_review::verdict::{ReviewActionPlan, Verdict};
    ///
    /// let verdict = Verdict::classify("### Spec not achieved\nmissing endpoint");
    /// let plan = ReviewActionPlan::for_verdict(&verdict, UnclassifiedPolicy::Ignore).unwrap();
    /// assert_eq!(plan.actions().len(), 3);
    /// ```
    pub fn for_verdict(
        verdict: &Verdict,
        policy: UnclassifiedPolicy,
    ) -> Result<Self, SpecCheckError> {
        let actions = match verdict {
            Verdict::Rejected(text) => vec![
                ReviewAction::PostComment { body: text.clone() },
                ReviewAction::SetDraft,
                ReviewAction::SubmitReview {
                    disposition: ReviewDisposition::RequestChanges,
                    body: Some(text.clone()),
                },
            ],
            Verdict::Accepted(text) => vec![ReviewAction::SubmitReview {
                disposition: ReviewDisposition::Comment,
                body: Some(text.clone()),
            }],
            Verdict::Unclassified(text) => match policy {
                UnclassifiedPolicy::Ignore => Vec::new(),
                UnclassifiedPolicy::Fail => {
                    return Err(SpecCheckError::UnclassifiedVerdict { text: text.clone() })
                }
            },
        };
        Ok(Self { actions })
    }

    /// The actions in execution order.
    pub fn actions(&self) -> &[ReviewAction] {
        &self.actions
    }

    /// `true` if there is nothing to do.
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}

/// Result of executing one planned action.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionOutcome {
    /// The action that was attempted.
    pub action: ReviewAction,
    /// Error message if the action failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ActionOutcome {
    /// `true` if the action went through.
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// Execute every action of `plan` against `ctx`'s pull request.
///
/// Actions are independent side effects: a failure is recorded and logged,
/// and the remaining actions still run.
pub async fn dispatch(
    tracker: &dyn IssueTracker,
    ctx: &PullRequestContext,
    plan: &ReviewActionPlan,
) -> Vec<ActionOutcome> {
    let pr = &ctx.pull_request;
    let mut outcomes = Vec::with_capacity(plan.actions().len());

    for action in plan.actions() {
        let result = match action {
            ReviewAction::PostComment { body } => {
                tracker
                    .post_comment(&pr.owner, &pr.repo, pr.number, body)
                    .await
            }
            ReviewAction::SetDraft => tracker.set_draft(&ctx.node_id).await,
            ReviewAction::SubmitReview { disposition, body } => {
                tracker
                    .submit_review(&pr.owner, &pr.repo, pr.number, *disposition, body.as_deref())
                    .await
            }
        };

        let error = match result {
            Ok(()) => {
                tracing::info!(pull_request = %pr, %action, "review action done");
                None
            }
            Err(e) => {
                tracing::warn!(pull_request = %pr, %action, error = %e, "review action failed");
                Some(e.to_string())
            }
        };
        outcomes.push(ActionOutcome {
            action: action.clone(),
            error,
        });
    }

    outcomes
}
