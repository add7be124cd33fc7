//! The issue-tracker seam the review core talks through.
//!
//! [`IssueTracker`] is implemented by [`crate::github::GitHubClient`] for real
//! runs and by in-memory fakes in tests.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use speccheck_core::SpecCheckError;

/// An issue as far as the review cares about it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
    /// Issue number.
    pub number: u64,
    /// Issue body; GitHub returns `null` for an empty body.
    pub body: Option<String>,
}

/// Pull request metadata, without the diff.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequest {
    /// Pull request number.
    pub number: u64,
    /// GraphQL node id, used for the draft conversion.
    pub node_id: String,
    /// Pull request description.
    pub body: Option<String>,
    /// Login of the pull request author.
    pub author: String,
}

/// Formal outcome of a submitted review.
///
/// # Examples
///
/// ```
/// use speccheck_review::tracker::ReviewDisposition;
///
/// assert_eq!(ReviewDisposition::RequestChanges.as_event(), "REQUEST_CHANGES");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ReviewDisposition {
    /// Approve the pull request.
    Approve,
    /// Block the pull request until changes are made.
    RequestChanges,
    /// Leave a review without approving or blocking.
    Comment,
}

impl ReviewDisposition {
    /// The `event` value expected by the GitHub review API.
    pub fn as_event(self) -> &'static str {
        match self {
            ReviewDisposition::Approve => "APPROVE",
            ReviewDisposition::RequestChanges => "REQUEST_CHANGES",
            ReviewDisposition::Comment => "COMMENT",
        }
    }
}

impl fmt::Display for ReviewDisposition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReviewDisposition::Approve => write!(f, "approve"),
            ReviewDisposition::RequestChanges => write!(f, "request changes"),
            ReviewDisposition::Comment => write!(f, "comment"),
        }
    }
}

/// Read and write access to issues and pull requests of one hosting service.
#[async_trait]
pub trait IssueTracker: Send + Sync {
    /// Fetch an issue (or a pull request, which GitHub also serves as an issue).
    async fn fetch_issue(&self, owner: &str, repo: &str, number: u64)
        -> Result<Issue, SpecCheckError>;

    /// Fetch pull request metadata.
    async fn fetch_pull_request(
        &self,
        owner: &str,
        repo: &str,
        number: u64,
    ) -> Result<PullRequest, SpecCheckError>;

    /// Fetch the unified diff of a pull request at its current head.
    async fn fetch_diff(&self, owner: &str, repo: &str, number: u64)
        -> Result<String, SpecCheckError>;

    /// Post a conversation comment on an issue or pull request.
    async fn post_comment(
        &self,
        owner: &str,
        repo: &str,
        number: u64,
        body: &str,
    ) -> Result<(), SpecCheckError>;

    /// Convert the pull request with GraphQL node id `node_id` back to draft.
    async fn set_draft(&self, node_id: &str) -> Result<(), SpecCheckError>;

    /// Submit a formal review.
    async fn submit_review(
        &self,
        owner: &str,
        repo: &str,
        number: u64,
        disposition: ReviewDisposition,
        body: Option<&str>,
    ) -> Result<(), SpecCheckError>;
}
