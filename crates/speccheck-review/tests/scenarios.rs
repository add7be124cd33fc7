//! End-to-end review scenarios against in-memory collaborators.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use speccheck_core::{
    PullRequestRef, ReviewConfig, SpecCheckError, TokenUsage, UnclassifiedPolicy,
};
use speccheck_review::llm::{ChatMessage, Completion, LanguageModel, Role};
use speccheck_review::pipeline::SpecReviewer;
use speccheck_review::tracker::{Issue, IssueTracker, PullRequest, ReviewDisposition};
use speccheck_review::verdict::{ReviewAction, Verdict};

const DIFF: &str = "diff --git a/src/health.rs b/src/health.rs\n+pub fn health() -> &'static str { \"ok\" }\n";

#[derive(Debug, Clone, PartialEq)]
enum Call {
    FetchIssue(u64),
    FetchPullRequest(u64),
    FetchDiff(u64),
    Comment(String),
    Draft(String),
    Review(ReviewDisposition, Option<String>),
}

#[derive(Default)]
struct FakeTracker {
    issues: HashMap<u64, Option<String>>,
    pr_body: Option<String>,
    fail_diff: bool,
    fail_draft: bool,
    calls: Mutex<Vec<Call>>,
}

impl FakeTracker {
    fn with_pr_body(body: &str) -> Self {
        Self {
            pr_body: Some(body.to_string()),
            ..Default::default()
        }
    }

    fn issue(mut self, number: u64, body: &str) -> Self {
        self.issues.insert(number, Some(body.to_string()));
        self
    }

    fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    fn writes(&self) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|c| matches!(c, Call::Comment(_) | Call::Draft(_) | Call::Review(..)))
            .collect()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl IssueTracker for FakeTracker {
    async fn fetch_issue(&self, _: &str, _: &str, number: u64) -> Result<Issue, SpecCheckError> {
        self.record(Call::FetchIssue(number));
        match self.issues.get(&number) {
            Some(body) => Ok(Issue {
                number,
                body: body.clone(),
            }),
            None => Err(SpecCheckError::GitHub(format!("issue #{number}: 404 Not Found"))),
        }
    }

    async fn fetch_pull_request(
        &self,
        _: &str,
        _: &str,
        number: u64,
    ) -> Result<PullRequest, SpecCheckError> {
        self.record(Call::FetchPullRequest(number));
        Ok(PullRequest {
            number,
            node_id: "PR_kwDO7".into(),
            body: self.pr_body.clone(),
            author: "octocat".into(),
        })
    }

    async fn fetch_diff(&self, _: &str, _: &str, number: u64) -> Result<String, SpecCheckError> {
        self.record(Call::FetchDiff(number));
        if self.fail_diff {
            return Err(SpecCheckError::GitHub("502 Bad Gateway".into()));
        }
        Ok(DIFF.to_string())
    }

    async fn post_comment(
        &self,
        _: &str,
        _: &str,
        _: u64,
        body: &str,
    ) -> Result<(), SpecCheckError> {
        self.record(Call::Comment(body.to_string()));
        Ok(())
    }

    async fn set_draft(&self, node_id: &str) -> Result<(), SpecCheckError> {
        self.record(Call::Draft(node_id.to_string()));
        if self.fail_draft {
            return Err(SpecCheckError::GitHub("draft conversion forbidden".into()));
        }
        Ok(())
    }

    async fn submit_review(
        &self,
        _: &str,
        _: &str,
        _: u64,
        disposition: ReviewDisposition,
        body: Option<&str>,
    ) -> Result<(), SpecCheckError> {
        self.record(Call::Review(disposition, body.map(str::to_string)));
        Ok(())
    }
}

/// Answers each call with the next scripted reply and records every conversation.
struct ScriptedModel {
    replies: Mutex<VecDeque<Option<String>>>,
    conversations: Mutex<Vec<Vec<ChatMessage>>>,
}

impl ScriptedModel {
    fn new(replies: &[Option<&str>]) -> Self {
        Self {
            replies: Mutex::new(replies.iter().map(|r| r.map(str::to_string)).collect()),
            conversations: Mutex::new(Vec::new()),
        }
    }

    fn answering(review: &str, verdict: &str) -> Self {
        Self::new(&[Some(review), Some(verdict)])
    }

    fn conversations(&self) -> Vec<Vec<ChatMessage>> {
        self.conversations.lock().unwrap().clone()
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    async fn complete(
        &self,
        messages: &[ChatMessage],
    ) -> Result<Option<Completion>, SpecCheckError> {
        self.conversations.lock().unwrap().push(messages.to_vec());
        let reply = self.replies.lock().unwrap().pop_front().flatten();
        Ok(reply.map(|answer| Completion {
            answer,
            token_usage: TokenUsage {
                input: 100,
                output: 20,
                total: 120,
            },
        }))
    }

    fn model(&self) -> &str {
        "scripted"
    }
}

fn pr() -> PullRequestRef {
    PullRequestRef::new("acme", "api", 7)
}

fn reviewer<'a>(tracker: &'a FakeTracker, model: &'a ScriptedModel) -> SpecReviewer<'a> {
    SpecReviewer::new(tracker, model, ReviewConfig::default())
}

#[tokio::test]
async fn accepted_spec_gets_a_comment_review_only() {
    let tracker = FakeTracker::with_pr_body("Resolves #42").issue(42, "Add a health endpoint");
    let verdict = "### Spec achieved\noctocat, you have achieved the spec and now the reviewers will let you know if there are any other changes needed.";
    let model = ScriptedModel::answering("The health endpoint is implemented.", verdict);

    let report = reviewer(&tracker, &model).review(&pr()).await.unwrap();

    assert!(matches!(report.verdict, Verdict::Accepted(_)));
    assert_eq!(report.linked_issue, 42);
    assert_eq!(
        tracker.writes(),
        vec![Call::Review(ReviewDisposition::Comment, Some(verdict.to_string()))]
    );
    assert_eq!(report.total_tokens().total, 240);
}

#[tokio::test]
async fn rejected_spec_comments_drafts_and_requests_changes() {
    let tracker = FakeTracker::with_pr_body("Resolves #42").issue(42, "Add a health endpoint");
    let verdict = "### Spec not achieved\noctocat this is where you went wrong...\nthe endpoint is never routed";
    let model = ScriptedModel::answering("The route is missing.", verdict);

    let report = reviewer(&tracker, &model).review(&pr()).await.unwrap();

    assert!(matches!(report.verdict, Verdict::Rejected(_)));
    assert_eq!(
        tracker.writes(),
        vec![
            Call::Comment(verdict.to_string()),
            Call::Draft("PR_kwDO7".into()),
            Call::Review(
                ReviewDisposition::RequestChanges,
                Some(verdict.to_string())
            ),
        ]
    );
    assert!(report.outcomes.iter().all(|o| o.succeeded()));
}

#[tokio::test]
async fn missing_reference_aborts_before_any_model_call() {
    let tracker = FakeTracker::with_pr_body("Quick fix, no ticket.");
    let model = ScriptedModel::answering("unused", "unused");

    let err = reviewer(&tracker, &model).review(&pr()).await.unwrap_err();

    assert!(matches!(err, SpecCheckError::NoLinkedIssue { pull_number: 7 }));
    assert!(model.conversations().is_empty());
    assert!(tracker.writes().is_empty());
}

#[tokio::test]
async fn empty_pull_request_body_has_no_reference() {
    let tracker = FakeTracker::default();
    let model = ScriptedModel::answering("unused", "unused");

    let err = reviewer(&tracker, &model).review(&pr()).await.unwrap_err();
    assert!(matches!(err, SpecCheckError::NoLinkedIssue { .. }));
}

#[tokio::test]
async fn unclassified_verdict_takes_no_action() {
    let tracker = FakeTracker::with_pr_body("Resolves #42").issue(42, "Add a health endpoint");
    let model = ScriptedModel::answering("Looks okay.", "I think it is probably fine.");

    let report = reviewer(&tracker, &model).review(&pr()).await.unwrap();

    assert!(matches!(report.verdict, Verdict::Unclassified(_)));
    assert!(report.plan.is_empty());
    assert!(tracker.writes().is_empty());
}

#[tokio::test]
async fn unclassified_verdict_fails_when_configured() {
    let tracker = FakeTracker::with_pr_body("Resolves #42").issue(42, "Add a health endpoint");
    let model = ScriptedModel::answering("Looks okay.", "probably fine");
    let config = ReviewConfig {
        on_unclassified: UnclassifiedPolicy::Fail,
    };

    let err = SpecReviewer::new(&tracker, &model, config)
        .review(&pr())
        .await
        .unwrap_err();

    assert!(matches!(err, SpecCheckError::UnclassifiedVerdict { .. }));
    assert!(tracker.writes().is_empty());
}

#[tokio::test]
async fn first_reference_governs() {
    let tracker = FakeTracker::with_pr_body(
        "Part of https://github.com/acme/api/issues/42, follows up #13",
    )
    .issue(42, "Add a health endpoint")
    .issue(13, "Something else");
    let model = ScriptedModel::answering("ok", "### Spec achieved");

    let report = reviewer(&tracker, &model).review(&pr()).await.unwrap();

    assert_eq!(report.linked_issue, 42);
    assert!(tracker.calls().contains(&Call::FetchIssue(42)));
    assert!(!tracker.calls().contains(&Call::FetchIssue(13)));
}

#[tokio::test]
async fn stages_do_not_share_conversations() {
    let tracker = FakeTracker::with_pr_body("Resolves #42").issue(42, "Add a health endpoint");
    let model = ScriptedModel::answering("The endpoint exists.", "### Spec achieved");

    reviewer(&tracker, &model).review(&pr()).await.unwrap();

    let conversations = model.conversations();
    assert_eq!(conversations.len(), 2);

    let review = &conversations[0];
    let roles: Vec<Role> = review.iter().map(|m| m.role).collect();
    assert_eq!(roles, vec![Role::System, Role::Assistant, Role::User]);
    assert!(review[2].content.starts_with("octocat's PR Diff: \n"));
    assert!(review[2].content.contains("pub fn health()"));

    let validation = &conversations[1];
    assert_eq!(validation.len(), 2);
    assert!(validation
        .iter()
        .all(|m| !m.content.contains("pub fn health()")));
    assert!(validation[1].content.contains("The endpoint exists."));
    assert!(validation[1]
        .content
        .starts_with("Validate for user: octocat: \n"));
}

#[tokio::test]
async fn description_precedes_specification() {
    let tracker = FakeTracker::with_pr_body("Resolves #42").issue(42, "Add a health endpoint");
    let model = ScriptedModel::answering("ok", "### Spec achieved");

    reviewer(&tracker, &model).review(&pr()).await.unwrap();

    let seed = &model.conversations()[0][1].content;
    let description = seed.find("octocat's pull request description").unwrap();
    let specification = seed.find("#42 Specification").unwrap();
    assert!(description < specification);
    assert!(seed.contains("Add a health endpoint"));
}

#[tokio::test]
async fn missing_issue_is_a_fetch_error() {
    let tracker = FakeTracker::with_pr_body("Resolves #99");
    let model = ScriptedModel::answering("unused", "unused");

    let err = reviewer(&tracker, &model).review(&pr()).await.unwrap_err();

    match err {
        SpecCheckError::Fetch { what, .. } => assert!(what.contains("#99")),
        other => panic!("expected fetch error, got {other:?}"),
    }
    assert!(model.conversations().is_empty());
}

#[tokio::test]
async fn diff_failure_aborts_before_anything_else() {
    let tracker = FakeTracker {
        fail_diff: true,
        ..FakeTracker::with_pr_body("Resolves #42").issue(42, "spec")
    };
    let model = ScriptedModel::answering("unused", "unused");

    let err = reviewer(&tracker, &model).review(&pr()).await.unwrap_err();

    assert!(matches!(err, SpecCheckError::Fetch { .. }));
    assert_eq!(tracker.calls(), vec![Call::FetchDiff(7)]);
}

#[tokio::test]
async fn empty_review_answer_stops_before_validation() {
    let tracker = FakeTracker::with_pr_body("Resolves #42").issue(42, "spec");
    let model = ScriptedModel::new(&[None]);

    let err = reviewer(&tracker, &model).review(&pr()).await.unwrap_err();

    match err {
        SpecCheckError::NoAnswer { stage } => assert!(stage.contains("#7")),
        other => panic!("expected no-answer error, got {other:?}"),
    }
    assert_eq!(model.conversations().len(), 1);
    assert!(tracker.writes().is_empty());
}

#[tokio::test]
async fn empty_validation_answer_takes_no_action() {
    let tracker = FakeTracker::with_pr_body("Resolves #42").issue(42, "spec");
    let model = ScriptedModel::new(&[Some("review"), None]);

    let err = reviewer(&tracker, &model).review(&pr()).await.unwrap_err();

    assert!(matches!(err, SpecCheckError::NoAnswer { .. }));
    assert!(tracker.writes().is_empty());
}

#[tokio::test]
async fn failed_action_does_not_stop_the_rest() {
    let tracker = FakeTracker {
        fail_draft: true,
        ..FakeTracker::with_pr_body("Resolves #42").issue(42, "spec")
    };
    let model = ScriptedModel::answering("bad", "### Spec not achieved\nfix it");

    let report = reviewer(&tracker, &model).review(&pr()).await.unwrap();

    assert_eq!(tracker.writes().len(), 3);
    let failed: Vec<_> = report.failed_actions().collect();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].action, ReviewAction::SetDraft);
}

#[tokio::test]
async fn dry_run_plans_without_writing() {
    let tracker = FakeTracker::with_pr_body("Resolves #42").issue(42, "spec");
    let model = ScriptedModel::answering("bad", "### Spec not achieved\nfix it");

    let report = reviewer(&tracker, &model)
        .dry_run(true)
        .review(&pr())
        .await
        .unwrap();

    assert_eq!(report.plan.actions().len(), 3);
    assert!(report.outcomes.is_empty());
    assert!(tracker.writes().is_empty());
}

#[tokio::test]
async fn null_issue_body_is_an_empty_spec() {
    let mut tracker = FakeTracker::with_pr_body("Resolves #42");
    tracker.issues.insert(42, None);
    let model = ScriptedModel::answering("ok", "### Spec achieved");

    let report = reviewer(&tracker, &model).review(&pr()).await.unwrap();

    assert_eq!(report.linked_issue, 42);
    let seed = &model.conversations()[0][1].content;
    assert!(seed.contains("#42 Specification"));
}
