//! Error types for the fan-out core.
//!
//! Uses `thiserror` for public API error types with structured variants for
//! input normalization, configuration, remote model calls, retrieval, and the
//! stage-tagged pipeline failures.

use crate::geo::validation::ValidationError;
use crate::pipeline::Stage;
use std::path::PathBuf;

/// Top-level error type for the fan-out core library.
#[derive(Debug, thiserror::Error)]
pub enum FanOutError {
    #[error("{0}")]
    Input(#[from] InputError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("{0}")]
    Pipeline(#[from] PipelineError),
}

/// Problems with what the caller sent. Surfaced verbatim, never a fault.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InputError {
    #[error("A target keyword is required to run the fan-out analysis.")]
    BlankKeyword,

    #[error("Uploaded file '{filename}' is not valid UTF-8 text.")]
    UploadNotUtf8 { filename: String },

    #[error("Malformed form submission: {message}")]
    MalformedForm { message: String },
}

/// Errors from the configuration system.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    #[error(
        "Environment variable not set: {var}. Set it in your environment or a .env file before running the tool."
    )]
    EnvVarMissing { var: String },

    #[error("Configuration parse error: {message}")]
    ParseError { message: String },

    #[error("Unsupported LLM provider: {provider}")]
    UnsupportedProvider { provider: String },
}

/// Transport-level errors from LLM provider interactions.
#[derive(Debug, Clone, thiserror::Error)]
pub enum LlmError {
    #[error("API request failed: {message}")]
    ApiRequest { message: String },

    #[error("API response parse error: {message}")]
    ResponseParse { message: String },

    #[error("Authentication failed for provider {provider}")]
    AuthFailed { provider: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    #[error("Provider connection failed: {message}")]
    Connection { message: String },
}

/// Failure of one structured generation call.
#[derive(Debug, Clone, thiserror::Error)]
pub enum GenerationError {
    #[error("{0}")]
    Provider(#[from] LlmError),

    #[error("model returned no content for '{shape}'")]
    EmptyResponse { shape: String },

    #[error("unexpected response format for '{shape}': {message}")]
    MalformedResponse { shape: String, message: String },
}

impl GenerationError {
    /// Whether retrying the same call could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            GenerationError::Provider(
                LlmError::RateLimited { .. }
                    | LlmError::Timeout { .. }
                    | LlmError::Connection { .. }
            )
        )
    }
}

/// Errors from a search backend or the retrieval stage as a whole.
#[derive(Debug, Clone, thiserror::Error)]
pub enum RetrievalError {
    #[error("search request for '{query}' failed: {message}")]
    Backend { query: String, message: String },

    #[error("no result for '{query}'")]
    NotFound { query: String },

    #[error("synthetic snippet for '{query}' failed: {source}")]
    Synthetic {
        query: String,
        #[source]
        source: GenerationError,
    },

    #[error("retrieval timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    #[error("no sub-queries to search")]
    NoQueries,
}

/// Stage-tagged pipeline failure.
#[derive(Debug, Clone, thiserror::Error)]
pub enum PipelineError {
    #[error("Planning failed: {0}")]
    PlanningFailed(#[source] GenerationError),

    #[error("Search failed: {0}")]
    SearchFailed(#[source] RetrievalError),

    #[error("Synthesis failed: {0}")]
    SynthesisFailed(#[source] GenerationError),

    #[error("{stage} failed: {source}")]
    ValidationFailed {
        stage: Stage,
        #[source]
        source: ValidationError,
    },

    #[error("{stage} timed out after {timeout_secs}s")]
    StageTimeout { stage: Stage, timeout_secs: u64 },
}

impl PipelineError {
    /// The stage at which the pipeline halted.
    pub fn stage(&self) -> Stage {
        match self {
            PipelineError::PlanningFailed(_) => Stage::Planning,
            PipelineError::SearchFailed(_) => Stage::Search,
            PipelineError::SynthesisFailed(_) => Stage::Synthesis,
            PipelineError::ValidationFailed { stage, .. } => *stage,
            PipelineError::StageTimeout { stage, .. } => *stage,
        }
    }
}
