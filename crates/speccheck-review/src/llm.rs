use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use speccheck_core::{LlmConfig, SpecCheckError, TokenUsage};

use crate::retry::{AttemptError, RetryPolicy};

/// A message in a chat conversation with the LLM.
///
/// # Examples
///
/// ```
/// use speccheck_review::llm::{ChatMessage, Role};
///
/// let msg = ChatMessage::new(Role::User, "Review this code");
/// assert!(matches!(msg.role, Role::User));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Role of the message sender.
    pub role: Role,
    /// Text content of the message.
    pub content: String,
}

impl ChatMessage {
    /// Build a message from a role and its content.
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// Role in the chat conversation.
///
/// # Examples
///
/// ```
/// use speccheck_review::llm::Role;
///
/// let role = Role::System;
/// assert_eq!(serde_json::to_string(&role).unwrap(), "\"system\"");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System-level instructions.
    System,
    /// User input.
    User,
    /// Assistant response.
    Assistant,
}

/// An answer from the model together with its token accounting.
///
/// Serializes as `{"answer": ..., "tokenUsage": {...}}`, which is the shape
/// replayed into the validation stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Completion {
    /// The model's text answer.
    pub answer: String,
    /// Tokens consumed by the request.
    #[serde(rename = "tokenUsage")]
    pub token_usage: TokenUsage,
}

/// A chat model that can complete a conversation.
///
/// `Ok(None)` means the call succeeded but the model produced no content.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Complete `messages` and return the answer, if any.
    async fn complete(&self, messages: &[ChatMessage]) -> Result<Option<Completion>, SpecCheckError>;

    /// Model identifier, for reporting.
    fn model(&self) -> &str;
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
    usage: Option<ChatUsage>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct ChatUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
    #[serde(default)]
    total_tokens: u64,
}

/// OpenAI-compatible chat completions client.
///
/// Works with any provider that exposes the `/v1/chat/completions` endpoint:
/// OpenAI, Ollama, vLLM, LiteLLM, etc. Requests always use temperature 0 so
/// identical input gives reproducible verdicts.
///
/// # Examples
///
/// ```
/// use speccheck_core::LlmConfig;
/// use speccheck_review::llm::LlmClient;
/// use speccheck_review::retry::RetryPolicy;
///
/// let config = LlmConfig {
///     api_key: Some("test-key".into()),
///     ..LlmConfig::default()
/// };
/// let client = LlmClient::new(&config, RetryPolicy::no_retry()).unwrap();
/// ```
pub struct LlmClient {
    client: reqwest::Client,
    config: LlmConfig,
    retry: RetryPolicy,
}

impl LlmClient {
    /// Create a new LLM client from configuration.
    ///
    /// When the config carries no API key, the provider's environment
    /// variable (see [`LlmConfig::api_key_env_var`]) is consulted.
    ///
    /// # Errors
    ///
    /// Returns [`SpecCheckError::Llm`] if the HTTP client cannot be built.
    pub fn new(config: &LlmConfig, retry: RetryPolicy) -> Result<Self, SpecCheckError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| SpecCheckError::Llm(format!("failed to create HTTP client: {e}")))?;
        let mut config = config.clone();
        if config.api_key.is_none() {
            config.api_key = std::env::var(config.api_key_env_var()).ok();
        }
        Ok(Self {
            client,
            config,
            retry,
        })
    }

    async fn send_once(&self, body: &serde_json::Value) -> Result<Option<Completion>, AttemptError> {
        let base_url = self
            .config
            .base_url
            .as_deref()
            .unwrap_or("https://api.openai.com")
            .trim_end_matches('/');
        let url = format!("{base_url}/v1/chat/completions");

        let mut request = self.client.post(&url);
        if let Some(api_key) = &self.config.api_key {
            request = request.bearer_auth(api_key);
        }

        let response = request.json(body).send().await.map_err(|e| {
            AttemptError::transient(SpecCheckError::Llm(format!("request failed: {e}")))
        })?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(AttemptError::from_status(
                status.as_u16(),
                SpecCheckError::Llm(format!("LLM API error {status}: {body_text}")),
            ));
        }

        let parsed: ChatCompletionResponse = response.json().await.map_err(|e| {
            AttemptError::permanent(SpecCheckError::Llm(format!(
                "failed to parse response: {e}"
            )))
        })?;

        let token_usage = parsed
            .usage
            .map(|u| TokenUsage {
                input: u.prompt_tokens,
                output: u.completion_tokens,
                total: u.total_tokens,
            })
            .unwrap_or_default();

        let answer = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|content| !content.trim().is_empty());

        Ok(answer.map(|answer| Completion {
            answer,
            token_usage,
        }))
    }
}

#[async_trait]
impl LanguageModel for LlmClient {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<Option<Completion>, SpecCheckError> {
        let body = serde_json::json!({
            "model": self.config.model,
            "messages": messages,
            "max_tokens": self.config.max_tokens,
            "temperature": 0,
        });

        tracing::debug!(
            model = %self.config.model,
            messages = messages.len(),
            chars = messages.iter().map(|m| m.content.len()).sum::<usize>(),
            "sending chat completion"
        );

        let this = self;
        let body = &body;
        self.retry
            .run("chat completion", move || async move { this.send_once(body).await })
            .await
    }

    fn model(&self) -> &str {
        &self.config.model
    }
}
