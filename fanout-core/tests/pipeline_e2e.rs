//! End-to-end pipeline scenarios against the mock provider.

use fanout_core::config::PipelineConfig;
use fanout_core::geo::schema::{FAN_OUT_RESULT, SEARCH_SNIPPET, SUB_QUERY_PLAN};
use fanout_core::retrieval::{SyntheticSearch, placeholder};
use fanout_core::{
    FanOutError, FanOutRequest, Generator, InputError, MockLlmProvider, Pipeline, PipelineMode,
    Retriever, Stage, StaticSearch, ToolResponse,
};
use pretty_assertions::assert_eq;
use serde_json::{Value, json};
use std::collections::HashSet;
use std::sync::Arc;

const KEYWORD: &str = "project management software";

const SUB_QUERIES: [&str; 4] = [
    "what is project management software",
    "asana vs monday.com",
    "project management software limitations",
    "how to choose project management software",
];

fn block_content(subject: &str) -> String {
    format!(
        "{subject} organizes projects into boards, timelines and workloads because teams need one \
         shared view of who owns each task, which means fewer missed handoffs between departments. \
         {subject} charges roughly ten to twenty five dollars per seat each month, therefore \
         a twenty person team should budget up to six thousand dollars yearly."
    )
}

fn plan_json() -> Value {
    json!({
        "main_intent": "Commercial investigation: buyers comparing tools before purchase.",
        "sub_queries": SUB_QUERIES,
    })
}

fn synthesis_json() -> Value {
    let intents = ["Definition", "Comparison", "Limitations", "How-to"];
    let subjects = ["Asana", "Monday.com", "Jira", "ClickUp"];
    json!({
        "main_keyword": KEYWORD,
        "analysis_summary": "Searchers move from definitions to vendor comparisons and limits.",
        "blocks": SUB_QUERIES.iter().zip(intents).zip(subjects).map(|((q, intent), subject)| json!({
            "intent_category": intent,
            "target_query": q,
            "heading": format!("{KEYWORD}: {q}"),
            "content": block_content(subject),
            "relevance_score": 92,
            "source_quality_score": 70
        })).collect::<Vec<_>>()
    })
}

fn static_search() -> StaticSearch {
    StaticSearch::new()
        .with(SUB_QUERIES[0], "Project management software plans and tracks work.")
        .with(SUB_QUERIES[1], "Asana starts at $10.99/seat; Monday.com at $9/seat.")
        .with(SUB_QUERIES[2], "Common limits: seat minimums and automation caps.")
}

#[tokio::test]
async fn test_keyword_only_runs_plan_retrieve_synthesize() {
    let provider = Arc::new(MockLlmProvider::new());
    provider.queue_json_for_shape(SUB_QUERY_PLAN, &plan_json());
    provider.queue_json_for_shape(FAN_OUT_RESULT, &synthesis_json());
    let pipeline = Pipeline::new(
        Generator::new(provider.clone()),
        Retriever::new(Arc::new(static_search())),
        PipelineConfig::default(),
    );

    let run = pipeline
        .run_request(&FanOutRequest::new(KEYWORD, Some(String::new())))
        .await
        .unwrap();

    let plan = run.plan.expect("fan-out mode records the plan");
    assert!((3..=5).contains(&plan.sub_queries.len()));

    let context = run.context.expect("fan-out mode records the context");
    assert_eq!(context.len(), plan.sub_queries.len());
    let ordered: Vec<&str> = context.iter().map(|(q, _)| q).collect();
    assert_eq!(ordered, SUB_QUERIES.to_vec());
    assert_eq!(context.get(SUB_QUERIES[3]), Some(placeholder(SUB_QUERIES[3]).as_str()));

    let result = run.result;
    assert!((3..=5).contains(&result.blocks.len()));
    let unique: HashSet<String> = result
        .blocks
        .iter()
        .map(|b| b.target_query.to_lowercase())
        .collect();
    assert_eq!(unique.len(), result.blocks.len());
    assert!(result.blocks.iter().all(|b| b.source_quality_score == Some(70)));

    assert_eq!(provider.call_count(), 2);
    let requests = provider.requests();
    assert_eq!(
        requests[1].response_shape.as_ref().unwrap().schema["properties"]["blocks"]["items"]
            ["required"]
            .as_array()
            .unwrap()
            .len(),
        6
    );
}

#[tokio::test]
async fn test_synthetic_retrieval_end_to_end() {
    let provider = Arc::new(MockLlmProvider::new());
    provider.queue_json_for_shape(SUB_QUERY_PLAN, &plan_json());
    for query in SUB_QUERIES {
        provider.queue_json_for_shape(
            SEARCH_SNIPPET,
            &json!({"snippet": format!("Synthetic facts about {query}.")}),
        );
    }
    provider.queue_json_for_shape(FAN_OUT_RESULT, &synthesis_json());

    let generator = Generator::new(provider.clone());
    let pipeline = Pipeline::new(
        generator.clone(),
        Retriever::new(Arc::new(SyntheticSearch::new(generator))),
        PipelineConfig::default(),
    );

    let run = pipeline
        .run(PipelineMode::FanOut {
            keyword: KEYWORD.into(),
            seed: None,
        })
        .await
        .unwrap();
    let context = run.context.unwrap();
    assert_eq!(context.degraded(), 0);
    assert!(context.iter().all(|(_, c)| c.starts_with("Synthetic facts about")));
    // plan + one snippet per sub-query + synthesis
    assert_eq!(provider.call_count(), 1 + SUB_QUERIES.len() + 1);
}

#[tokio::test]
async fn test_blank_keyword_makes_no_remote_call() {
    let provider = Arc::new(MockLlmProvider::new());
    let pipeline = Pipeline::new(
        Generator::new(provider.clone()),
        Retriever::new(Arc::new(static_search())),
        PipelineConfig::default(),
    );

    let err = pipeline
        .run_request(&FanOutRequest::new(" \t ", Some("Some content".into())))
        .await
        .unwrap_err();
    assert!(matches!(err, FanOutError::Input(InputError::BlankKeyword)));
    assert_eq!(provider.call_count(), 0);
}

#[tokio::test]
async fn test_duplicate_queries_in_synthesis_fail_the_run() {
    let provider = Arc::new(MockLlmProvider::new());
    provider.queue_json_for_shape(SUB_QUERY_PLAN, &plan_json());
    let mut duplicated = synthesis_json();
    duplicated["blocks"][2]["target_query"] = json!("ASANA VS MONDAY.COM");
    provider.queue_json_for_shape(FAN_OUT_RESULT, &duplicated);
    let pipeline = Pipeline::new(
        Generator::new(provider),
        Retriever::new(Arc::new(static_search())),
        PipelineConfig::default(),
    );

    let err = pipeline
        .run(PipelineMode::FanOut {
            keyword: KEYWORD.into(),
            seed: None,
        })
        .await
        .unwrap_err();
    assert_eq!(err.stage(), Stage::Synthesis);
    assert!(err.to_string().contains("blocks[2].target_query"));
}

#[tokio::test]
async fn test_forced_fan_out_seeds_planning_prompt() {
    let provider = Arc::new(MockLlmProvider::new());
    provider.queue_json_for_shape(SUB_QUERY_PLAN, &plan_json());
    provider.queue_json_for_shape(FAN_OUT_RESULT, &synthesis_json());
    let config = PipelineConfig {
        force_fan_out: true,
        ..PipelineConfig::default()
    };
    let pipeline = Pipeline::new(
        Generator::new(provider.clone()),
        Retriever::new(Arc::new(static_search())),
        config,
    );

    let response = pipeline
        .run_tool(&FanOutRequest::new(
            KEYWORD,
            Some("Our team compared six tools last quarter.".into()),
        ))
        .await;
    assert!(matches!(response, ToolResponse::Result(_)));
    let planning = &provider.requests()[0];
    assert!(planning.messages[1]
        .content
        .contains("Our team compared six tools last quarter."));
}

#[tokio::test]
async fn test_tool_response_serializes_envelope() {
    let provider = Arc::new(MockLlmProvider::new());
    provider.queue_json(&synthesis_json());
    let pipeline = Pipeline::new(
        Generator::new(provider),
        Retriever::new(Arc::new(static_search())),
        PipelineConfig::default(),
    );

    let response = pipeline
        .run_tool(&FanOutRequest::new(KEYWORD, Some("Notes on PM tools.".into())))
        .await;
    let value = serde_json::to_value(&response).unwrap();
    assert_eq!(value["result"]["main_keyword"], KEYWORD);
    assert_eq!(value["result"]["blocks"].as_array().unwrap().len(), 4);
    assert!(value.get("error").is_none());
}
