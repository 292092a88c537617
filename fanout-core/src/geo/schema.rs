//! JSON schemas attached to structured generation calls.
//!
//! Schemas follow the strict structured-output dialect: every property is
//! required and no additional properties are allowed. They constrain what the
//! model emits but are never trusted as validation; candidates still go
//! through [`super::validation`].

use super::IntentCategory;
use crate::types::ResponseShape;
use serde_json::{Value, json};

pub const SUB_QUERY_PLAN: &str = "sub_query_plan";
pub const FAN_OUT_RESULT: &str = "fan_out_result";
pub const SEARCH_SNIPPET: &str = "search_snippet";

fn answer_block_schema(with_source_quality: bool) -> Value {
    let intents: Vec<&str> = IntentCategory::ALL.iter().map(|c| c.as_str()).collect();
    let mut properties = json!({
        "intent_category": {
            "type": "string",
            "enum": intents,
            "description": "The intent of the query: 'Definition', 'Comparison', 'Limitations', or 'How-to'"
        },
        "target_query": {
            "type": "string",
            "description": "The likely user fan-out query (e.g., 'Jotform vs Zapier pricing')"
        },
        "heading": {
            "type": "string",
            "description": "The heading to be used as H2 or H3 in the blog post"
        },
        "content": {
            "type": "string",
            "description": "The snippet text containing the direct answer"
        },
        "relevance_score": {
            "type": "integer",
            "description": "LMP Relevance Score (0-100). How relevant is the content to the question?"
        }
    });
    let mut required = vec![
        "intent_category",
        "target_query",
        "heading",
        "content",
        "relevance_score",
    ];
    if with_source_quality {
        properties["source_quality_score"] = json!({
            "type": "integer",
            "description": "Source Quality Score (0-100). How well does the retrieved context support this answer?"
        });
        required.push("source_quality_score");
    }
    json!({
        "type": "object",
        "properties": properties,
        "required": required,
        "additionalProperties": false
    })
}

/// Shape of a fan-out result. Retrieval-augmented runs also ask for a
/// per-block source quality score.
pub fn fan_out_result_shape(with_source_quality: bool) -> ResponseShape {
    ResponseShape::new(
        FAN_OUT_RESULT,
        json!({
            "type": "object",
            "properties": {
                "main_keyword": { "type": "string" },
                "analysis_summary": {
                    "type": "string",
                    "description": "A brief strategic summary of why these fan-out queries were selected."
                },
                "blocks": {
                    "type": "array",
                    "items": answer_block_schema(with_source_quality)
                }
            },
            "required": ["main_keyword", "analysis_summary", "blocks"],
            "additionalProperties": false
        }),
    )
}

/// Shape of the planning stage output.
pub fn sub_query_plan_shape() -> ResponseShape {
    ResponseShape::new(
        SUB_QUERY_PLAN,
        json!({
            "type": "object",
            "properties": {
                "main_intent": {
                    "type": "string",
                    "description": "The dominant search intent behind the keyword."
                },
                "sub_queries": {
                    "type": "array",
                    "items": { "type": "string" },
                    "description": "3-5 distinct fan-out queries a searcher would ask next."
                }
            },
            "required": ["main_intent", "sub_queries"],
            "additionalProperties": false
        }),
    )
}

/// Shape of one synthetic search snippet.
pub fn search_snippet_shape() -> ResponseShape {
    ResponseShape::new(
        SEARCH_SNIPPET,
        json!({
            "type": "object",
            "properties": {
                "snippet": {
                    "type": "string",
                    "description": "A realistic search-result excerpt with concrete facts and figures."
                }
            },
            "required": ["snippet"],
            "additionalProperties": false
        }),
    )
}
