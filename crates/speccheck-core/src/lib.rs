//! Core types, configuration, and error handling for speccheck.
//!
//! This crate provides the shared foundation used by the review crate and the CLI:
//! - [`SpecCheckError`]: unified error type using `thiserror` and `miette`
//! - [`SpecCheckConfig`]: configuration loaded from `.speccheck.toml`
//! - Shared types: [`PullRequestRef`], [`TokenUsage`], [`OutputFormat`]

mod config;
mod error;
mod types;

pub use config::{
    GitHubConfig, LlmConfig, RetryConfig, ReviewConfig, SpecCheckConfig, UnclassifiedPolicy,
};
pub use error::SpecCheckError;
pub use types::{OutputFormat, PullRequestRef, TokenUsage};

/// A convenience `Result` type for speccheck operations.
pub type Result<T> = std::result::Result<T, SpecCheckError>;
