//! # Fan-Out Core
//!
//! Core library for the GEO fan-out generator.
//! Turns a keyword, optionally paired with source content, into 3-5
//! validated answer blocks: self-contained snippets written to be quoted
//! verbatim by AI answer engines. Provides the validation engine, the
//! generation adapter (brain), retrieval, the pipeline orchestrator, the HTTP
//! gateway and configuration.

pub mod brain;
pub mod config;
pub mod error;
pub mod gateway;
pub mod geo;
pub mod pipeline;
pub mod prompts;
pub mod providers;
pub mod retrieval;
pub mod types;

// Re-export commonly used types at the crate root.
pub use brain::{Generator, LlmProvider, MockLlmProvider};
pub use config::{Credentials, FanOutConfig, SearchStrategy, load_config};
pub use error::{
    ConfigError, FanOutError, GenerationError, InputError, LlmError, PipelineError,
    RetrievalError,
};
pub use geo::{
    AnswerBlock, AnswerBlockCandidate, FanOutCandidate, FanOutResult, IntentCategory, Rule,
    SubQueryPlan, ValidationError, validate_block, validate_plan, validate_result,
};
pub use pipeline::{FanOutRequest, FanOutRun, Pipeline, PipelineMode, Stage, ToolResponse};
pub use retrieval::{ContextMap, Retriever, SearchBackend, StaticSearch};
pub use types::{CompletionRequest, CompletionResponse, Message, ResponseShape, Role, TokenUsage};
