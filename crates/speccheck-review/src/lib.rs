//! Spec conformance review of pull requests.
//!
//! Resolves the issue a pull request claims to address, asks a language model
//! whether the diff satisfies that issue, normalizes the answer into a
//! [`verdict::Verdict`], and acts on it through an [`tracker::IssueTracker`].
//! GitHub and OpenAI-compatible implementations of the collaborators live in
//! [`github`] and [`llm`].

pub mod context;
pub mod event;
pub mod evidence;
pub mod github;
pub mod llm;
pub mod pipeline;
pub mod prompt;
pub mod references;
pub mod retry;
pub mod tracker;
pub mod verdict;
