use std::future::Future;
use std::time::Duration;

use speccheck_core::{RetryConfig, SpecCheckError};

/// Failure of a single attempt, tagged with whether it is worth retrying.
#[derive(Debug)]
pub struct AttemptError {
    /// The underlying failure.
    pub error: SpecCheckError,
    /// `true` for transport errors, rate limiting, and server errors.
    pub retryable: bool,
}

impl AttemptError {
    /// A failure that may succeed on another attempt.
    pub fn transient(error: SpecCheckError) -> Self {
        Self {
            error,
            retryable: true,
        }
    }

    /// A failure that will not change on retry (bad request, not found, auth).
    pub fn permanent(error: SpecCheckError) -> Self {
        Self {
            error,
            retryable: false,
        }
    }

    /// Classify by HTTP status code: 429 and 5xx are transient.
    ///
    /// # Examples
    ///
    /// ```
    /// use speccheck_core::SpecCheckError;
    /// use speccheck_review::retry::AttemptError;
    ///
    /// let err = AttemptError::from_status(503, SpecCheckError::GitHub("unavailable".into()));
    /// assert!(err.retryable);
    /// let err = AttemptError::from_status(404, SpecCheckError::GitHub("not found".into()));
    /// assert!(!err.retryable);
    /// ```
    pub fn from_status(status: u16, error: SpecCheckError) -> Self {
        if status == 429 || (500..600).contains(&status) {
            Self::transient(error)
        } else {
            Self::permanent(error)
        }
    }

    /// Classify a failed non-idempotent write by HTTP status: only 429 is
    /// transient, since a 5xx may arrive after the write was applied.
    ///
    /// # Examples
    ///
    /// ```
    /// use speccheck_core::SpecCheckError;
    /// use speccheck_review::retry::AttemptError;
    ///
    /// let err = AttemptError::from_write_status(429, SpecCheckError::GitHub("slow down".into()));
    /// assert!(err.retryable);
    /// let err = AttemptError::from_write_status(502, SpecCheckError::GitHub("bad gateway".into()));
    /// assert!(!err.retryable);
    /// ```
    pub fn from_write_status(status: u16, error: SpecCheckError) -> Self {
        if status == 429 {
            Self::transient(error)
        } else {
            Self::permanent(error)
        }
    }
}

/// Bounded retry with exponential backoff for calls to external services.
///
/// The first retry waits `initial_backoff`, each further retry doubles it.
///
/// # Examples
///
/// ```
/// use speccheck_core::RetryConfig;
/// use speccheck_review::retry::RetryPolicy;
///
/// let policy = RetryPolicy::from_config(&RetryConfig::default());
/// assert_eq!(policy.max_attempts(), 3);
/// ```
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    initial_backoff: Duration,
}

impl RetryPolicy {
    /// Build a policy from configuration. Zero attempts is treated as one.
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            initial_backoff: Duration::from_millis(config.initial_backoff_ms),
        }
    }

    /// A policy that makes exactly one attempt.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            initial_backoff: Duration::ZERO,
        }
    }

    /// Total attempts this policy allows, including the first.
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    fn backoff_for(&self, retry: u32) -> Duration {
        self.initial_backoff
            .saturating_mul(2u32.saturating_pow(retry.saturating_sub(1)))
    }

    /// Run `op` until it succeeds, fails permanently, or attempts run out.
    ///
    /// # Errors
    ///
    /// Returns the error of the last attempt.
    pub async fn run<T, F, Fut>(&self, label: &str, mut op: F) -> Result<T, SpecCheckError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, AttemptError>>,
    {
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if e.retryable && attempt < self.max_attempts => {
                    let delay = self.backoff_for(attempt);
                    tracing::warn!(
                        call = label,
                        attempt,
                        max_attempts = self.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e.error,
                        "transient failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e.error),
            }
        }
    }
}
