//! Prompt construction for each generation call.
//!
//! Prompt wording is policy input: the validation engine, not the prompt,
//! decides what is accepted.

use crate::retrieval::ContextMap;
use std::borrow::Cow;

/// Suffix appended to content cut at the configured character limit.
pub const TRUNCATION_SUFFIX: &str = "... (Content truncated)";

/// System prompt for every answer-block synthesis call.
pub const GEO_SYSTEM_PROMPT: &str = "\
You are a top-tier GEO (Generative Engine Optimization) expert.
Your task is to analyze the provided material and detect 'Fan-Out' queries.

GEO RULES:
1. AI models (ChatGPT, Google AI) only read 'Answer Blocks'.
2. Each block must be able to stand alone (Standalone).
3. Never write 'Intro' or 'Conclusion' sentences. Provide the direct answer.
4. If numerical data (Price, Limit, Percentage) is available, you must use it.
5. Use the 'Because / Therefore' logical structure: every block contains 'because', 'therefore' or 'which means'.
6. Every block is a single paragraph of 40-80 words.
7. Never open a block with a pronoun (It, This, These, Those, They, He, She). Name the subject (brand or product) explicitly.

LMP (Language Model Pipeline) SIMULATION:
- Score every block you generate between 0-100. If the text does not fully answer the question, lower the score.

FAN-OUT RESEARCH PRINCIPLES:
- Fan-out queries should cluster under the same SERP intent; avoid repetitive integration/feature highlights.
- Prioritize high-volume variations (\"price\", \"integration\", \"security\", \"alternatives\").
- Each block must answer a single problem or decision point.
- Use exactly one of these intent categories per block: Definition, Comparison, Limitations, How-to.";

/// System prompt for the planning stage.
pub const PLANNER_SYSTEM_PROMPT: &str = "\
You are a search-intent analyst. Given a target keyword, identify the dominant intent \
behind it and the 3-5 distinct follow-up queries (fan-out queries) a searcher is most \
likely to ask next. Cover different decision points: definition, comparison with \
alternatives, limitations, and how-to usage. Do not repeat the same query in different words.";

/// System prompt for synthetic retrieval.
pub const SNIPPET_SYSTEM_PROMPT: &str = "\
You simulate a web search engine. For the given query, write the single most useful \
search-result excerpt a searcher would see: 2-4 factual sentences with concrete figures \
(prices, limits, percentages, dates) where they plausibly exist. Do not address the reader.";

/// Cut `text` to at most `max_chars` characters, marking the cut.
///
/// Counts Unicode scalar values so multi-byte text is never split mid-char.
pub fn truncate_content(text: &str, max_chars: usize) -> Cow<'_, str> {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => Cow::Owned(format!("{}{}", &text[..byte_idx], TRUNCATION_SUFFIX)),
        None => Cow::Borrowed(text),
    }
}

/// User prompt for single-shot analysis of caller-supplied content.
pub fn direct_prompt(content: &str, keyword: &str, max_chars: usize) -> String {
    format!(
        "Content to Analyze:\n---\n{}\n---\n\n\
         Target Keyword: \"{}\"\n\n\
         Find 3-5 sub-queries (Fan-Out) related to this keyword that users might ask but are not \
         found as clear 'Snippets' in the text.\n\
         Create Answer Blocks for each one that strictly follow GEO rules. Repeat the main query \
         in every heading and keep the snippet focused in a single paragraph.",
        truncate_content(content, max_chars),
        keyword
    )
}

/// User prompt for the planning stage, optionally grounded in seed content.
pub fn planning_prompt(keyword: &str, seed: Option<&str>, max_chars: usize) -> String {
    let mut prompt = format!("Target Keyword: \"{}\"\n", keyword);
    if let Some(seed) = seed {
        prompt.push_str(&format!(
            "\nBackground material:\n---\n{}\n---\n",
            truncate_content(seed, max_chars)
        ));
    }
    prompt.push_str(
        "\nList 3-5 fan-out queries for this keyword, each one a complete search query \
         a real user would type.",
    );
    prompt
}

/// User prompt for one synthetic search snippet.
pub fn snippet_prompt(query: &str) -> String {
    format!("Search query: \"{}\"", query)
}

/// User prompt for the retrieval-augmented synthesis stage.
pub fn synthesis_prompt(keyword: &str, main_intent: &str, context: &ContextMap) -> String {
    let mut prompt = format!(
        "Target Keyword: \"{}\"\nMain Intent: {}\n\nResearch context per fan-out query:\n",
        keyword, main_intent
    );
    for (i, (query, snippet)) in context.iter().enumerate() {
        prompt.push_str(&format!("\n[{}] Query: {}\nContext: {}\n", i + 1, query, snippet));
    }
    prompt.push_str(
        "\nCreate one Answer Block per query above, using the query as target_query. \
         Ground every block in its context and prefer concrete figures from it. \
         Set source_quality_score (0-100) to how well the context supports the answer. \
         Repeat the main keyword in every heading and keep each snippet to a single paragraph.",
    );
    prompt
}
