use serde::Serialize;
use speccheck_core::{PullRequestRef, SpecCheckError};

use crate::tracker::IssueTracker;

/// Everything the review needs to know about one pull request, fetched once.
///
/// # Examples
///
/// ```
/// use speccheck_core::PullRequestRef;
/// use speccheck_review::context::PullRequestContext;
///
/// let ctx = PullRequestContext {
///     pull_request: PullRequestRef::new("acme", "api", 7),
///     node_id: "PR_kwDO7".into(),
///     author: "octocat".into(),
///     body: "Resolves #42".into(),
///     diff: "+fn health() {}".into(),
/// };
/// assert_eq!(ctx.pull_request.number, 7);
/// ```
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PullRequestContext {
    /// Where the pull request lives.
    pub pull_request: PullRequestRef,
    /// GraphQL node id of the pull request.
    pub node_id: String,
    /// Login of the pull request author.
    pub author: String,
    /// Pull request description; empty when GitHub has none.
    pub body: String,
    /// Unified diff at the pull request's head when fetched.
    pub diff: String,
}

/// Fetch the diff and metadata of `pr` and freeze them into a context.
///
/// The diff is fetched first; no partial context is returned if either call fails.
///
/// # Errors
///
/// Returns [`SpecCheckError::Fetch`] wrapping the tracker's error.
pub async fn load_pull_request(
    tracker: &dyn IssueTracker,
    pr: &PullRequestRef,
) -> Result<PullRequestContext, SpecCheckError> {
    let diff = tracker
        .fetch_diff(&pr.owner, &pr.repo, pr.number)
        .await
        .map_err(|e| SpecCheckError::fetch(format!("diff of {pr}"), e))?;
    tracing::debug!(pull_request = %pr, bytes = diff.len(), "fetched diff");

    let pull = tracker
        .fetch_pull_request(&pr.owner, &pr.repo, pr.number)
        .await
        .map_err(|e| SpecCheckError::fetch(format!("pull request {pr}"), e))?;

    Ok(PullRequestContext {
        pull_request: pr.clone(),
        node_id: pull.node_id,
        author: pull.author,
        body: pull.body.unwrap_or_default(),
        diff,
    })
}
