//! GitHub Actions event intake.

use std::path::Path;

use serde::Deserialize;
use speccheck_core::{PullRequestRef, SpecCheckError};

/// Event name GitHub uses for pull request activity.
pub const PULL_REQUEST_EVENT: &str = "pull_request";

/// Pull request actions that trigger a review.
pub const REVIEW_ACTIONS: &[&str] = &["opened", "ready_for_review"];

/// The subset of a `pull_request` webhook payload needed to start a review.
#[derive(Debug, Clone, Deserialize)]
pub struct PullRequestEvent {
    /// What happened to the pull request.
    pub action: String,
    /// The pull request itself.
    pub pull_request: EventPullRequest,
    /// Repository the pull request belongs to.
    pub repository: EventRepository,
}

/// Pull request fields of an event payload.
#[derive(Debug, Clone, Deserialize)]
pub struct EventPullRequest {
    /// Pull request number.
    pub number: u64,
    /// Draft pull requests are not reviewed.
    #[serde(default)]
    pub draft: bool,
}

/// Repository fields of an event payload.
#[derive(Debug, Clone, Deserialize)]
pub struct EventRepository {
    /// Repository name.
    pub name: String,
    /// Repository owner.
    pub owner: EventOwner,
}

/// Repository owner fields of an event payload.
#[derive(Debug, Clone, Deserialize)]
pub struct EventOwner {
    /// Owner login.
    pub login: String,
}

impl PullRequestEvent {
    /// Parse a payload from JSON text.
    ///
    /// # Errors
    ///
    /// Returns [`SpecCheckError::Event`] if the payload is not a pull request event.
    pub fn from_json(json: &str) -> Result<Self, SpecCheckError> {
        serde_json::from_str(json)
            .map_err(|e| SpecCheckError::Event(format!("not a pull_request payload: {e}")))
    }

    /// Read and parse a payload file such as `$GITHUB_EVENT_PATH`.
    ///
    /// # Errors
    ///
    /// Returns [`SpecCheckError::FileNotFound`] if the file is missing, or
    /// [`SpecCheckError::Event`] if it cannot be parsed.
    pub fn from_file(path: &Path) -> Result<Self, SpecCheckError> {
        if !path.exists() {
            return Err(SpecCheckError::FileNotFound(path.to_path_buf()));
        }
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// The pull request this event is about.
    pub fn pull_request_ref(&self) -> PullRequestRef {
        PullRequestRef::new(
            &self.repository.owner.login,
            &self.repository.name,
            self.pull_request.number,
        )
    }
}

/// Whether an event with this name and action should start a review.
///
/// # Examples
///
/// ```
/// use speccheck_review::event::should_review;
///
/// assert!(should_review("pull_request", "opened"));
/// assert!(should_review("pull_request", "ready_for_review"));
/// assert!(!should_review("pull_request", "synchronize"));
/// assert!(!should_review("issues", "opened"));
/// ```
pub fn should_review(event_name: &str, action: &str) -> bool {
    event_name == PULL_REQUEST_EVENT && REVIEW_ACTIONS.contains(&action)
}

/// Decide whether `event` starts a review and return its pull request if so.
///
/// Drafts opened as drafts are skipped; they are picked up again on
/// `ready_for_review`.
pub fn review_target(event_name: &str, event: &PullRequestEvent) -> Option<PullRequestRef> {
    if !should_review(event_name, &event.action) {
        tracing::info!(event = event_name, action = %event.action, "event does not trigger a review");
        return None;
    }
    if event.pull_request.draft {
        tracing::info!(pull_request = event.pull_request.number, "skipping draft pull request");
        return None;
    }
    Some(event.pull_request_ref())
}
