//! Brain module: LLM provider abstraction and structured generation.
//!
//! Defines the `LlmProvider` trait for model-agnostic completions and the
//! [`Generator`], which turns one prompt pair plus a [`ResponseShape`] into a
//! typed, still-unvalidated candidate.

use crate::config::LlmConfig;
use crate::error::{GenerationError, LlmError};
use crate::types::{CompletionRequest, CompletionResponse, Message, ResponseShape, TokenUsage};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

/// Trait for LLM providers.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Perform a full completion and return the response.
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError>;

    /// Return the model name.
    fn model_name(&self) -> &str;

    /// Whether this provider enforces `response_shape` server-side.
    fn supports_structured_output(&self) -> bool {
        false
    }
}

/// Issues single structured calls against an injected provider.
///
/// Holds no per-request state and performs no retries; callers own the
/// retry policy.
#[derive(Clone)]
pub struct Generator {
    provider: Arc<dyn LlmProvider>,
    temperature: f32,
    max_tokens: Option<usize>,
}

impl std::fmt::Debug for Generator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Generator")
            .field("model", &self.provider.model_name())
            .field("temperature", &self.temperature)
            .finish()
    }
}

impl Generator {
    pub fn new(provider: Arc<dyn LlmProvider>) -> Self {
        Self {
            provider,
            temperature: 0.7,
            max_tokens: None,
        }
    }

    /// Build a generator using the sampling settings from `config`.
    pub fn from_config(provider: Arc<dyn LlmProvider>, config: &LlmConfig) -> Self {
        Self {
            provider,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        }
    }

    pub fn model_name(&self) -> &str {
        self.provider.model_name()
    }

    /// Send one system/user prompt pair constrained to `shape` and decode the
    /// answer into `T`.
    pub async fn generate<T: DeserializeOwned>(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        shape: &ResponseShape,
    ) -> Result<T, GenerationError> {
        let request = CompletionRequest {
            messages: vec![Message::system(system_prompt), Message::user(user_prompt)],
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            response_shape: Some(shape.clone()),
        };

        debug!(
            model = self.provider.model_name(),
            shape = %shape.name,
            structured = self.provider.supports_structured_output(),
            "Sending structured completion request"
        );

        let response = self.provider.complete(request).await?;
        log_usage(&shape.name, &response.usage);

        if response.finish_reason.as_deref() == Some("length") {
            debug!(shape = %shape.name, "Completion stopped at max_tokens");
        }

        parse_structured(&response.message.content, &shape.name)
    }
}

fn log_usage(shape: &str, usage: &TokenUsage) {
    info!(
        shape,
        input_tokens = usage.input_tokens,
        output_tokens = usage.output_tokens,
        total_tokens = usage.total(),
        "Completion received"
    );
}

/// Decode model text into `T`, tolerating a surrounding markdown code fence.
pub fn parse_structured<T: DeserializeOwned>(text: &str, shape: &str) -> Result<T, GenerationError> {
    let trimmed = strip_code_fence(text.trim());
    if trimmed.is_empty() {
        return Err(GenerationError::EmptyResponse {
            shape: shape.to_string(),
        });
    }
    serde_json::from_str(trimmed).map_err(|e| GenerationError::MalformedResponse {
        shape: shape.to_string(),
        message: e.to_string(),
    })
}

fn strip_code_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

type MockReply = Result<CompletionResponse, LlmError>;

/// A mock LLM provider for testing and offline development.
///
/// Replies are popped from a per-shape queue when the request names a shape
/// with queued replies, otherwise from the shared queue. Every request is
/// recorded.
pub struct MockLlmProvider {
    model: String,
    replies: Mutex<VecDeque<MockReply>>,
    shaped_replies: Mutex<HashMap<String, VecDeque<MockReply>>>,
    requests: Mutex<Vec<CompletionRequest>>,
    calls: AtomicUsize,
}

impl MockLlmProvider {
    pub fn new() -> Self {
        Self {
            model: "mock-model".to_string(),
            replies: Mutex::new(VecDeque::new()),
            shaped_replies: Mutex::new(HashMap::new()),
            requests: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
        }
    }

    /// Queue a response to be returned by the next `complete` call.
    pub fn queue_response(&self, response: CompletionResponse) {
        lock(&self.replies).push_back(Ok(response));
    }

    /// Queue a JSON body as the next assistant reply.
    pub fn queue_json(&self, body: &serde_json::Value) {
        self.queue_response(Self::text_response(&body.to_string()));
    }

    /// Queue a failure for the next `complete` call.
    pub fn queue_error(&self, error: LlmError) {
        lock(&self.replies).push_back(Err(error));
    }

    /// Queue a JSON reply used only for requests constrained to `shape`.
    pub fn queue_json_for_shape(&self, shape: &str, body: &serde_json::Value) {
        lock(&self.shaped_replies)
            .entry(shape.to_string())
            .or_default()
            .push_back(Ok(Self::text_response(&body.to_string())));
    }

    /// Queue a failure used only for requests constrained to `shape`.
    pub fn queue_error_for_shape(&self, shape: &str, error: LlmError) {
        lock(&self.shaped_replies)
            .entry(shape.to_string())
            .or_default()
            .push_back(Err(error));
    }

    /// Number of `complete` calls made so far.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Snapshot of every request received.
    pub fn requests(&self) -> Vec<CompletionRequest> {
        lock(&self.requests).clone()
    }

    /// Create a simple text response for testing.
    pub fn text_response(text: &str) -> CompletionResponse {
        CompletionResponse {
            message: Message::assistant(text),
            usage: TokenUsage {
                input_tokens: 100,
                output_tokens: 50,
            },
            model: "mock-model".to_string(),
            finish_reason: Some("stop".to_string()),
        }
    }

    fn next_reply(&self, shape: Option<&str>) -> Option<MockReply> {
        if let Some(shape) = shape
            && let Some(queue) = lock(&self.shaped_replies).get_mut(shape)
            && let Some(reply) = queue.pop_front()
        {
            return Some(reply);
        }
        lock(&self.replies).pop_front()
    }
}

/// Lock a mock's mutex, recovering the data if a panicking test poisoned it.
fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
}

impl Default for MockLlmProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LlmProvider for MockLlmProvider {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let shape = request.response_shape.as_ref().map(|s| s.name.clone());
        lock(&self.requests).push(request);
        self.next_reply(shape.as_deref())
            .unwrap_or_else(|| {
                Err(LlmError::ApiRequest {
                    message: "mock provider has no queued responses".to_string(),
                })
            })
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn supports_structured_output(&self) -> bool {
        true
    }
}
