//! # GEO data model
//!
//! Answer blocks, fan-out results, and sub-query plans in two forms:
//!
//! - **Candidates** (`*Candidate`) mirror whatever the model returned. They
//!   deserialize leniently (scores as signed integers, categories as free
//!   strings) so that an out-of-range value reaches the validation engine and
//!   is rejected with a precise reason instead of surfacing as a parse error.
//! - **Validated** values (`AnswerBlock`, `FanOutResult`, `SubQueryPlan`) are
//!   only produced by [`validation`] and are immutable afterwards.

pub mod schema;
pub mod validation;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub use validation::{
    Rule, ValidationError, validate_block, validate_plan, validate_result,
};

/// The search intent an answer block serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IntentCategory {
    Definition,
    Comparison,
    Limitations,
    #[serde(rename = "How-to")]
    HowTo,
}

impl IntentCategory {
    pub const ALL: [IntentCategory; 4] = [
        IntentCategory::Definition,
        IntentCategory::Comparison,
        IntentCategory::Limitations,
        IntentCategory::HowTo,
    ];

    /// The exact wire spelling.
    pub fn as_str(&self) -> &'static str {
        match self {
            IntentCategory::Definition => "Definition",
            IntentCategory::Comparison => "Comparison",
            IntentCategory::Limitations => "Limitations",
            IntentCategory::HowTo => "How-to",
        }
    }
}

impl fmt::Display for IntentCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IntentCategory {
    type Err = String;

    /// Exact, case-sensitive match. Near misses such as `"Howto"` or
    /// `"how-to"` are rejected rather than coerced.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        IntentCategory::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| s.to_string())
    }
}

/// One extractable snippet that passed every block rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerBlock {
    pub intent_category: IntentCategory,
    pub target_query: String,
    pub heading: String,
    pub content: String,
    pub relevance_score: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_quality_score: Option<u8>,
}

/// The validated response for one (keyword, content) request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FanOutResult {
    pub main_keyword: String,
    pub analysis_summary: String,
    pub blocks: Vec<AnswerBlock>,
}

/// Sub-queries derived from the keyword, consumed by retrieval.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubQueryPlan {
    pub main_intent: String,
    pub sub_queries: Vec<String>,
}

/// Raw answer block as returned by the model, before validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerBlockCandidate {
    pub intent_category: String,
    pub target_query: String,
    pub heading: String,
    pub content: String,
    pub relevance_score: i64,
    #[serde(default)]
    pub source_quality_score: Option<i64>,
}

/// Raw fan-out result as returned by the model, before validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FanOutCandidate {
    pub main_keyword: String,
    pub analysis_summary: String,
    pub blocks: Vec<AnswerBlockCandidate>,
}

/// Raw sub-query plan as returned by the model, before validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubQueryPlanCandidate {
    pub main_intent: String,
    pub sub_queries: Vec<String>,
}

impl From<AnswerBlock> for AnswerBlockCandidate {
    fn from(block: AnswerBlock) -> Self {
        Self {
            intent_category: block.intent_category.as_str().to_string(),
            target_query: block.target_query,
            heading: block.heading,
            content: block.content,
            relevance_score: i64::from(block.relevance_score),
            source_quality_score: block.source_quality_score.map(i64::from),
        }
    }
}
