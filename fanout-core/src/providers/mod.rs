//! LLM provider implementations.
//!
//! Provides the OpenAI-compatible implementation of the `LlmProvider` trait
//! (OpenAI, Azure, vLLM, LM Studio and proxies that speak the chat completions
//! API with structured outputs).
//!
//! Use `create_provider()` to instantiate a provider from config.

pub mod openai_compat;

use crate::brain::LlmProvider;
use crate::config::{LlmConfig, RetryConfig};
use crate::error::{ConfigError, GenerationError, LlmError};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

pub use openai_compat::OpenAiCompatibleProvider;

/// Errors that [`with_retry`] knows how to classify.
pub trait RetryableError: std::fmt::Display {
    /// Whether retrying the same call could plausibly succeed.
    fn is_retryable(&self) -> bool;

    /// Server-provided delay, if any.
    fn retry_after_secs(&self) -> Option<u64> {
        None
    }
}

impl RetryableError for LlmError {
    fn is_retryable(&self) -> bool {
        matches!(
            self,
            LlmError::RateLimited { .. } | LlmError::Connection { .. } | LlmError::Timeout { .. }
        )
    }

    fn retry_after_secs(&self) -> Option<u64> {
        match self {
            LlmError::RateLimited { retry_after_secs } => Some(*retry_after_secs),
            _ => None,
        }
    }
}

impl RetryableError for GenerationError {
    fn is_retryable(&self) -> bool {
        self.is_transient()
    }

    fn retry_after_secs(&self) -> Option<u64> {
        match self {
            GenerationError::Provider(e) => e.retry_after_secs(),
            _ => None,
        }
    }
}

/// Execute an async operation with exponential backoff retry on transient errors.
///
/// Rate limits (respecting `retry_after_secs`), connection failures and
/// timeouts are retried. Permanent errors return immediately. With
/// `max_retries = 0` the operation runs exactly once.
pub async fn with_retry<F, Fut, T, E>(config: &RetryConfig, operation: F) -> Result<T, E>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: RetryableError,
{
    let mut attempt = 0;
    loop {
        match operation().await {
            Ok(val) => return Ok(val),
            Err(e) => {
                if !e.is_retryable() || attempt >= config.max_retries {
                    return Err(e);
                }

                let backoff_ms = compute_backoff(config, attempt, &e);
                tracing::warn!(
                    attempt = attempt + 1,
                    max = config.max_retries,
                    backoff_ms = backoff_ms,
                    error = %e,
                    "Retrying after transient error"
                );
                tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                attempt += 1;
            }
        }
    }
}

/// Compute backoff delay, respecting rate limit retry-after values.
///
/// A server-supplied delay is capped at `max_backoff_ms`.
fn compute_backoff<E: RetryableError>(config: &RetryConfig, attempt: u32, err: &E) -> u64 {
    let computed = compute_exponential_backoff(config, attempt);
    match err.retry_after_secs() {
        Some(secs) => secs
            .saturating_mul(1000)
            .min(config.max_backoff_ms)
            .max(computed),
        None => computed,
    }
}

/// Pure exponential backoff with optional jitter.
fn compute_exponential_backoff(config: &RetryConfig, attempt: u32) -> u64 {
    let base = config.initial_backoff_ms as f64 * config.backoff_multiplier.powi(attempt as i32);
    let capped = base.min(config.max_backoff_ms as f64) as u64;
    if config.jitter {
        // Up to 25%
        let jitter = (capped as f64 * 0.25 * rand_simple()) as u64;
        capped + jitter
    } else {
        capped
    }
}

/// Cheap pseudo-random fraction in [0, 1) from the clock.
fn rand_simple() -> f64 {
    use std::time::SystemTime;
    let nanos = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .subsec_nanos();
    (nanos % 1000) as f64 / 1000.0
}

/// Create an LLM provider from configuration and a pre-resolved API key.
pub fn create_provider(
    config: &LlmConfig,
    api_key: String,
) -> Result<Arc<dyn LlmProvider>, ConfigError> {
    match config.provider.as_str() {
        "openai" | "openai-compatible" | "azure" => {
            let provider = OpenAiCompatibleProvider::new_with_key(config, api_key).map_err(|e| {
                ConfigError::Invalid {
                    message: format!("failed to build LLM client: {e}"),
                }
            })?;
            Ok(Arc::new(provider))
        }
        other => Err(ConfigError::UnsupportedProvider {
            provider: other.to_string(),
        }),
    }
}
