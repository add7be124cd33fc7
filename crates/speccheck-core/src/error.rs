use std::path::PathBuf;

/// Errors that can occur across the speccheck workspace.
///
/// The review-specific variants map one to one onto the ways a spec review
/// can abort: no linked issue, a failed fetch, a stage with no model answer,
/// or an unclassified verdict when that is configured to be fatal. Library
/// crates use this type directly; the binary converts to a `miette::Report`
/// at the boundary.
///
/// # Examples
///
/// ```
/// use speccheck_core::SpecCheckError;
///
/// let err = SpecCheckError::Config("missing API key".into());
/// assert!(err.to_string().contains("missing API key"));
/// ```
#[derive(Debug, thiserror::Error, miette::Diagnostic)]
pub enum SpecCheckError {
    /// Filesystem I/O failure.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid or missing configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// The pull request body does not reference any issue or pull request.
    #[error("no linked issue found in body of pull request #{pull_number}")]
    #[diagnostic(help(
        "reference the issue that defines the spec in the PR body, e.g. `Resolves #42`"
    ))]
    NoLinkedIssue {
        /// Pull request whose body was searched.
        pull_number: u64,
    },

    /// An issue, pull request, or diff could not be retrieved.
    #[error("failed to fetch {what}")]
    Fetch {
        /// Human-readable description of what was being fetched.
        what: String,
        /// Underlying transport or API failure.
        #[source]
        source: Box<SpecCheckError>,
    },

    /// A pipeline stage's model call returned no content.
    #[error("no answer from the model for {stage}")]
    NoAnswer {
        /// Stage label, e.g. `"review of #7"`.
        stage: String,
    },

    /// The normalized verdict matched neither canonical marker.
    #[error("model verdict matched neither `Spec achieved` nor `Spec not achieved`")]
    #[diagnostic(help("set `review.on_unclassified = \"ignore\"` to skip such pull requests"))]
    UnclassifiedVerdict {
        /// The verdict text as returned by the model.
        text: String,
    },

    /// GitHub API failure.
    #[error("GitHub error: {0}")]
    GitHub(String),

    /// LLM API or response error.
    #[error("LLM error: {0}")]
    Llm(String),

    /// The triggering event could not be read or understood.
    #[error("event error: {0}")]
    Event(String),

    /// JSON serialization / deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML deserialization failure.
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// A required file was not found.
    #[error("file not found: {}", .0.display())]
    FileNotFound(PathBuf),
}

impl SpecCheckError {
    /// Wrap `source` as a fetch failure for `what`.
    ///
    /// # Examples
    ///
    /// ```
    /// use speccheck_core::SpecCheckError;
    ///
    /// let err = SpecCheckError::fetch("issue #42", SpecCheckError::GitHub("404".into()));
    /// assert_eq!(err.to_string(), "failed to fetch issue #42");
    /// ```
    pub fn fetch(what: impl Into<String>, source: SpecCheckError) -> Self {
        Self::Fetch {
            what: what.into(),
            source: Box::new(source),
        }
    }
}
