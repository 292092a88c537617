//! Validation engine for model output.
//!
//! Pure, deterministic checks that turn raw candidates into validated
//! [`AnswerBlock`], [`FanOutResult`], and [`SubQueryPlan`] values. Every
//! check fails closed on the first violated rule and reports which rule,
//! field, and block index tripped it.
//!
//! Block rules run in a fixed order: word count, pronoun start, single
//! paragraph, causal connector, heading, score range, intent category.
//! Result rules (block count, then `target_query` uniqueness) only run once
//! every block has passed.

use super::{
    AnswerBlock, AnswerBlockCandidate, FanOutCandidate, FanOutResult, IntentCategory,
    SubQueryPlan, SubQueryPlanCandidate,
};
use std::collections::HashMap;
use std::fmt;

/// Inclusive bounds on the number of words in a block's content.
pub const MIN_WORDS: usize = 40;
pub const MAX_WORDS: usize = 80;

/// Inclusive bounds on the number of blocks in a result.
pub const MIN_BLOCKS: usize = 3;
pub const MAX_BLOCKS: usize = 5;

/// Inclusive bounds on the number of sub-queries in a plan.
pub const MIN_SUB_QUERIES: usize = 3;
pub const MAX_SUB_QUERIES: usize = 5;

pub const MAX_SCORE: i64 = 100;

/// Words a block may not open with; the subject must be named explicitly.
pub const FORBIDDEN_LEADING_WORDS: [&str; 7] = ["it", "this", "these", "those", "they", "he", "she"];

/// At least one of these must appear in a block's content.
pub const CAUSAL_CONNECTORS: [&str; 3] = ["because", "therefore", "which means"];

/// Stripped from both ends of the first word before the pronoun check.
const EDGE_PUNCTUATION: &[char] = &[
    ',', '.', '?', '!', ':', ';', '"', '\'', '\u{201C}', '\u{201D}', '\u{2018}', '\u{2019}', '(',
    ')',
];

/// The rule a candidate violated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Rule {
    WordCount,
    PronounStart,
    SingleParagraph,
    CausalConnector,
    Heading,
    ScoreRange,
    IntentCategory,
    BlockCount,
    UniqueTargetQuery,
    SubQueryCount,
    BlankSubQuery,
    UniqueSubQuery,
}

/// A rejected candidate: which rule failed, where, and why.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub rule: Rule,
    /// Index into the result's block sequence, when the failure is block-local.
    pub block: Option<usize>,
    pub field: String,
    pub reason: String,
}

impl ValidationError {
    pub fn new(rule: Rule, field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            rule,
            block: None,
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Attribute this failure to the block at `index`.
    pub fn at_block(mut self, index: usize) -> Self {
        self.block = Some(index);
        self
    }

    /// Field path in the result document, e.g. `blocks[2].content`.
    pub fn path(&self) -> String {
        match self.block {
            Some(index) => format!("blocks[{index}].{}", self.field),
            None => self.field.clone(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path(), self.reason)
    }
}

impl std::error::Error for ValidationError {}

/// Number of whitespace-delimited tokens.
pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

/// First token, stripped of edge punctuation and lower-cased.
fn leading_word(text: &str) -> Option<String> {
    text.split_whitespace()
        .next()
        .map(|token| token.trim_matches(EDGE_PUNCTUATION).to_lowercase())
}

fn check_word_count(content: &str) -> Result<(), ValidationError> {
    let count = word_count(content);
    if !(MIN_WORDS..=MAX_WORDS).contains(&count) {
        return Err(ValidationError::new(
            Rule::WordCount,
            "content",
            format!(
                "Answer Block length does not meet GEO standards ({count} words). Must be between {MIN_WORDS}-{MAX_WORDS}."
            ),
        ));
    }
    Ok(())
}

fn check_pronoun_start(content: &str) -> Result<(), ValidationError> {
    if let Some(word) = leading_word(content)
        && FORBIDDEN_LEADING_WORDS.contains(&word.as_str())
    {
        return Err(ValidationError::new(
            Rule::PronounStart,
            "content",
            format!(
                "Text starts with an ambiguous pronoun ('{word}'). Use the subject (brand name/product) explicitly."
            ),
        ));
    }
    Ok(())
}

/// Characters that start a new line in any common renderer.
const LINE_BREAKS: [char; 7] = [
    '\n', '\r', '\u{0B}', '\u{0C}', '\u{85}', '\u{2028}', '\u{2029}',
];

fn check_single_paragraph(content: &str) -> Result<(), ValidationError> {
    if content.contains(LINE_BREAKS) {
        return Err(ValidationError::new(
            Rule::SingleParagraph,
            "content",
            "Answer Block must be a single paragraph without line breaks.",
        ));
    }
    Ok(())
}

fn check_causal_connector(content: &str) -> Result<(), ValidationError> {
    let lower = content.to_lowercase();
    if !CAUSAL_CONNECTORS.iter().any(|c| lower.contains(c)) {
        return Err(ValidationError::new(
            Rule::CausalConnector,
            "content",
            "Answer Block must use a causal connector ('because', 'therefore', or 'which means').",
        ));
    }
    Ok(())
}

fn check_score(field: &str, value: i64) -> Result<u8, ValidationError> {
    u8::try_from(value)
        .ok()
        .filter(|score| i64::from(*score) <= MAX_SCORE)
        .ok_or_else(|| {
            ValidationError::new(
                Rule::ScoreRange,
                field,
                format!("{field} must be between 0-{MAX_SCORE} (received {value})"),
            )
        })
}

fn check_intent(value: &str) -> Result<IntentCategory, ValidationError> {
    value.parse::<IntentCategory>().map_err(|unknown| {
        let options: Vec<&str> = IntentCategory::ALL.iter().map(|c| c.as_str()).collect();
        ValidationError::new(
            Rule::IntentCategory,
            "intent_category",
            format!(
                "intent_category '{unknown}' is not supported. Valid options: {}",
                options.join(", ")
            ),
        )
    })
}

/// Validate one answer block candidate.
///
/// The returned block carries a trimmed heading; every other field is kept
/// as the model produced it.
pub fn validate_block(candidate: &AnswerBlockCandidate) -> Result<AnswerBlock, ValidationError> {
    let content = candidate.content.as_str();
    check_word_count(content)?;
    check_pronoun_start(content)?;
    check_single_paragraph(content)?;
    check_causal_connector(content)?;

    let heading = candidate.heading.trim();
    if heading.is_empty() {
        return Err(ValidationError::new(
            Rule::Heading,
            "heading",
            "heading cannot be blank",
        ));
    }

    let relevance_score = check_score("relevance_score", candidate.relevance_score)?;
    let source_quality_score = candidate
        .source_quality_score
        .map(|score| check_score("source_quality_score", score))
        .transpose()?;
    let intent_category = check_intent(&candidate.intent_category)?;

    Ok(AnswerBlock {
        intent_category,
        target_query: candidate.target_query.clone(),
        heading: heading.to_string(),
        content: candidate.content.clone(),
        relevance_score,
        source_quality_score,
    })
}

/// Validate a full fan-out result candidate.
pub fn validate_result(candidate: &FanOutCandidate) -> Result<FanOutResult, ValidationError> {
    let blocks = candidate
        .blocks
        .iter()
        .enumerate()
        .map(|(index, block)| validate_block(block).map_err(|e| e.at_block(index)))
        .collect::<Result<Vec<_>, _>>()?;

    let count = blocks.len();
    if !(MIN_BLOCKS..=MAX_BLOCKS).contains(&count) {
        return Err(ValidationError::new(
            Rule::BlockCount,
            "blocks",
            format!("Expected between {MIN_BLOCKS}-{MAX_BLOCKS} Answer Blocks, received {count}"),
        ));
    }

    let mut seen: HashMap<String, usize> = HashMap::with_capacity(count);
    for (index, block) in blocks.iter().enumerate() {
        let key = block.target_query.to_lowercase();
        if let Some(first) = seen.get(&key) {
            return Err(ValidationError::new(
                Rule::UniqueTargetQuery,
                "target_query",
                format!(
                    "target_query values must be unique ('{}' repeats blocks[{first}])",
                    block.target_query
                ),
            )
            .at_block(index));
        }
        seen.insert(key, index);
    }

    Ok(FanOutResult {
        main_keyword: candidate.main_keyword.clone(),
        analysis_summary: candidate.analysis_summary.clone(),
        blocks,
    })
}

/// Validate a sub-query plan: 3-5 non-blank, case-insensitively unique
/// queries. Returned queries are trimmed.
pub fn validate_plan(candidate: &SubQueryPlanCandidate) -> Result<SubQueryPlan, ValidationError> {
    let count = candidate.sub_queries.len();
    if !(MIN_SUB_QUERIES..=MAX_SUB_QUERIES).contains(&count) {
        return Err(ValidationError::new(
            Rule::SubQueryCount,
            "sub_queries",
            format!(
                "Expected between {MIN_SUB_QUERIES}-{MAX_SUB_QUERIES} sub-queries, received {count}"
            ),
        ));
    }

    let mut sub_queries: Vec<String> = Vec::with_capacity(count);
    for (index, query) in candidate.sub_queries.iter().enumerate() {
        let query = query.trim();
        if query.is_empty() {
            return Err(ValidationError::new(
                Rule::BlankSubQuery,
                format!("sub_queries[{index}]"),
                "sub-query cannot be blank",
            ));
        }
        let key = query.to_lowercase();
        if sub_queries.iter().any(|q| q.to_lowercase() == key) {
            return Err(ValidationError::new(
                Rule::UniqueSubQuery,
                format!("sub_queries[{index}]"),
                format!("sub-query '{query}' is repeated"),
            ));
        }
        sub_queries.push(query.to_string());
    }

    Ok(SubQueryPlan {
        main_intent: candidate.main_intent.trim().to_string(),
        sub_queries,
    })
}
