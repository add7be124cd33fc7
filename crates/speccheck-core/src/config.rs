use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::SpecCheckError;

/// Top-level configuration loaded from `.speccheck.toml`.
///
/// Supports layered resolution: CLI flags > env vars > local config > defaults.
///
/// # Examples
///
/// ```
/// use speccheck_core::SpecCheckConfig;
///
/// let config = SpecCheckConfig::default();
/// assert_eq!(config.llm.max_tokens, 500);
/// assert_eq!(config.retry.max_attempts, 3);
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SpecCheckConfig {
    /// LLM provider settings.
    #[serde(default)]
    pub llm: LlmConfig,
    /// GitHub API settings.
    #[serde(default)]
    pub github: GitHubConfig,
    /// Review behavior settings.
    #[serde(default)]
    pub review: ReviewConfig,
    /// Retry policy for calls to GitHub and the LLM provider.
    #[serde(default)]
    pub retry: RetryConfig,
}

impl SpecCheckConfig {
    /// Load configuration from a TOML file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`SpecCheckError::Io`] if the file cannot be read, or
    /// [`SpecCheckError::Toml`] if the content is not valid TOML.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use speccheck_core::SpecCheckConfig;
    /// use std::path::Path;
    ///
    /// let config = SpecCheckConfig::from_file(Path::new(".speccheck.toml")).unwrap();
    /// ```
    pub fn from_file(path: &Path) -> Result<Self, SpecCheckError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns [`SpecCheckError::Toml`] if parsing fails.
    ///
    /// # Examples
    ///
    /// ```
    /// use speccheck_core::{SpecCheckConfig, UnclassifiedPolicy};
    ///
    /// let toml = r#"
    /// [review]
    /// on_unclassified = "fail"
    /// "#;
    /// let config = SpecCheckConfig::from_toml(toml).unwrap();
    /// assert_eq!(config.review.on_unclassified, UnclassifiedPolicy::Fail);
    /// ```
    pub fn from_toml(content: &str) -> Result<Self, SpecCheckError> {
        let config: Self = toml::from_str(content)?;
        Ok(config)
    }
}

/// LLM provider configuration.
///
/// # Examples
///
/// ```
/// use speccheck_core::LlmConfig;
///
/// let config = LlmConfig::default();
/// assert_eq!(config.model, "gpt-4o");
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Provider name (e.g. `"openai"`, `"anthropic"`, `"ollama"`).
    #[serde(default = "default_provider")]
    pub provider: String,
    /// Model identifier.
    #[serde(default = "default_model")]
    pub model: String,
    /// API key for the provider.
    pub api_key: Option<String>,
    /// Custom base URL for API requests.
    pub base_url: Option<String>,
    /// Completion token cap per request (default: 500).
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Request timeout in seconds (default: 120).
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,
}

fn default_provider() -> String {
    "openai".into()
}

fn default_model() -> String {
    "gpt-4o".into()
}

fn default_max_tokens() -> u32 {
    500
}

fn default_llm_timeout() -> u64 {
    120
}

impl LlmConfig {
    /// Environment variable consulted for the API key of this provider.
    ///
    /// # Examples
    ///
    /// ```
    /// use speccheck_core::LlmConfig;
    ///
    /// let config = LlmConfig { provider: "anthropic".into(), ..LlmConfig::default() };
    /// assert_eq!(config.api_key_env_var(), "ANTHROPIC_API_KEY");
    /// ```
    pub fn api_key_env_var(&self) -> &'static str {
        match self.provider.as_str() {
            "anthropic" => "ANTHROPIC_API_KEY",
            "gemini" => "GEMINI_API_KEY",
            _ => "OPENAI_API_KEY",
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            api_key: None,
            base_url: None,
            max_tokens: default_max_tokens(),
            timeout_secs: default_llm_timeout(),
        }
    }
}

/// GitHub API configuration.
///
/// # Examples
///
/// ```
/// use speccheck_core::GitHubConfig;
///
/// let config = GitHubConfig::default();
/// assert!(config.token.is_none());
/// assert_eq!(config.timeout_secs, 30);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitHubConfig {
    /// Personal access or installation token. Falls back to `GITHUB_TOKEN` / `GH_TOKEN`.
    pub token: Option<String>,
    /// REST API base (default: `https://api.github.com`).
    pub api_base: Option<String>,
    /// Request timeout in seconds (default: 30).
    #[serde(default = "default_github_timeout")]
    pub timeout_secs: u64,
}

fn default_github_timeout() -> u64 {
    30
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            token: None,
            api_base: None,
            timeout_secs: default_github_timeout(),
        }
    }
}

/// What to do when the normalized verdict carries neither canonical marker.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnclassifiedPolicy {
    /// Take no review action and log a warning.
    #[default]
    Ignore,
    /// Abort the review with [`SpecCheckError::UnclassifiedVerdict`].
    Fail,
}

/// Review behavior configuration.
///
/// # Examples
///
/// ```
/// use speccheck_core::{ReviewConfig, UnclassifiedPolicy};
///
/// let config = ReviewConfig::default();
/// assert_eq!(config.on_unclassified, UnclassifiedPolicy::Ignore);
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReviewConfig {
    /// Handling of verdicts that match neither template (default: ignore).
    #[serde(default)]
    pub on_unclassified: UnclassifiedPolicy,
}

/// Bounded retry settings for external calls.
///
/// # Examples
///
/// ```
/// use speccheck_core::RetryConfig;
///
/// let config = RetryConfig::default();
/// assert_eq!(config.max_attempts, 3);
/// assert_eq!(config.initial_backoff_ms, 500);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total attempts per call, including the first (default: 3).
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Delay before the first retry; doubled on each further retry (default: 500).
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_backoff_ms() -> u64 {
    500
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
        }
    }
}
