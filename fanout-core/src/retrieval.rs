//! Retrieval: map planned sub-queries to context text.
//!
//! A [`Retriever`] fans the queries out concurrently over one
//! [`SearchBackend`]. Per-query failures never abort the batch; they degrade
//! to a placeholder for that query.

use crate::brain::Generator;
use crate::config::{Credentials, SearchConfig, SearchStrategy};
use crate::error::{ConfigError, RetrievalError};
use crate::geo::schema::search_snippet_shape;
use crate::prompts::{SNIPPET_SYSTEM_PROMPT, snippet_prompt};
use async_trait::async_trait;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Context text substituted for a query whose lookup failed.
pub fn placeholder(query: &str) -> String {
    format!("No search results available for \"{}\".", query)
}

/// Ordered query -> context mapping, one entry per input query.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextMap {
    entries: Vec<(String, String)>,
    #[serde(default)]
    degraded: usize,
}

impl ContextMap {
    pub fn get(&self, query: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(q, _)| q == query)
            .map(|(_, c)| c.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of entries holding a placeholder.
    pub fn degraded(&self) -> usize {
        self.degraded
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(q, c)| (q.as_str(), c.as_str()))
    }
}

/// A source of context text for one query.
#[async_trait]
pub trait SearchBackend: Send + Sync {
    fn name(&self) -> &str;

    async fn search(&self, query: &str) -> Result<String, RetrievalError>;
}

#[derive(Debug, Deserialize)]
struct SnippetCandidate {
    snippet: String,
}

/// Asks the model for a plausible search snippet per query.
pub struct SyntheticSearch {
    generator: Generator,
}

impl SyntheticSearch {
    pub fn new(generator: Generator) -> Self {
        Self { generator }
    }
}

#[async_trait]
impl SearchBackend for SyntheticSearch {
    fn name(&self) -> &str {
        "synthetic"
    }

    async fn search(&self, query: &str) -> Result<String, RetrievalError> {
        let out: SnippetCandidate = self
            .generator
            .generate(SNIPPET_SYSTEM_PROMPT, &snippet_prompt(query), &search_snippet_shape())
            .await
            .map_err(|source| RetrievalError::Synthetic {
                query: query.to_string(),
                source,
            })?;
        let snippet = out.snippet.trim();
        if snippet.is_empty() {
            return Err(RetrievalError::NotFound {
                query: query.to_string(),
            });
        }
        Ok(snippet.to_string())
    }
}

#[derive(Debug, Deserialize)]
struct WebSearchResponse {
    #[serde(default)]
    results: Vec<WebSearchResult>,
}

#[derive(Debug, Deserialize)]
struct WebSearchResult {
    #[serde(default)]
    content: String,
}

/// Tavily-style JSON search API.
pub struct WebSearch {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    max_results: usize,
}

impl WebSearch {
    pub fn new(config: &SearchConfig, api_key: String) -> Result<Self, ConfigError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(concat!("fanout/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ConfigError::Invalid {
                message: format!("Failed to create HTTP client: {}", e),
            })?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
            max_results: config.max_results,
        })
    }

    /// Join the top results' `content` fields into one snippet.
    fn reduce_results(response: WebSearchResponse, max_results: usize) -> Option<String> {
        let parts: Vec<String> = response
            .results
            .into_iter()
            .map(|r| r.content.trim().to_string())
            .filter(|c| !c.is_empty())
            .take(max_results)
            .collect();
        (!parts.is_empty()).then(|| parts.join("\n"))
    }
}

#[async_trait]
impl SearchBackend for WebSearch {
    fn name(&self) -> &str {
        "web"
    }

    async fn search(&self, query: &str) -> Result<String, RetrievalError> {
        let backend_err = |message: String| RetrievalError::Backend {
            query: query.to_string(),
            message,
        };

        let url = format!("{}/search", self.base_url);
        debug!(url = %url, query, "Sending web search request");

        let response = self
            .client
            .post(&url)
            .json(&serde_json::json!({
                "api_key": self.api_key,
                "query": query,
                "max_results": self.max_results,
            }))
            .send()
            .await
            .map_err(|e| backend_err(format!("Request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(backend_err(format!("HTTP {}", status)));
        }

        let body: WebSearchResponse = response
            .json()
            .await
            .map_err(|e| backend_err(format!("Invalid response: {}", e)))?;

        Self::reduce_results(body, self.max_results).ok_or_else(|| RetrievalError::NotFound {
            query: query.to_string(),
        })
    }
}

/// In-memory lookup table, matched case-insensitively on the trimmed query.
#[derive(Debug, Clone, Default)]
pub struct StaticSearch {
    entries: HashMap<String, String>,
}

impl StaticSearch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, query: &str, context: &str) -> Self {
        self.entries.insert(normalize(query), context.to_string());
        self
    }
}

fn normalize(query: &str) -> String {
    query.trim().to_lowercase()
}

#[async_trait]
impl SearchBackend for StaticSearch {
    fn name(&self) -> &str {
        "static"
    }

    async fn search(&self, query: &str) -> Result<String, RetrievalError> {
        self.entries
            .get(&normalize(query))
            .cloned()
            .ok_or_else(|| RetrievalError::NotFound {
                query: query.to_string(),
            })
    }
}

/// Pick the backend for `config.strategy`.
///
/// `auto` uses web search only when a search credential is present.
pub fn backend_from_config(
    config: &SearchConfig,
    credentials: &Credentials,
    generator: &Generator,
) -> Result<Arc<dyn SearchBackend>, ConfigError> {
    let web_key = credentials.search_api_key.clone();
    match (config.strategy, web_key) {
        (SearchStrategy::Synthetic, _) | (SearchStrategy::Auto, None) => {
            Ok(Arc::new(SyntheticSearch::new(generator.clone())))
        }
        (SearchStrategy::Auto | SearchStrategy::Web, Some(key)) => {
            Ok(Arc::new(WebSearch::new(config, key)?))
        }
        (SearchStrategy::Web, None) => Err(ConfigError::EnvVarMissing {
            var: config.api_key_env.clone(),
        }),
    }
}

/// Fans sub-queries out over one backend.
#[derive(Clone)]
pub struct Retriever {
    backend: Arc<dyn SearchBackend>,
    query_timeout: Option<Duration>,
}

impl Retriever {
    pub fn new(backend: Arc<dyn SearchBackend>) -> Self {
        Self {
            backend,
            query_timeout: None,
        }
    }

    /// Bound each lookup; a lookup exceeding it degrades to a placeholder.
    pub fn with_query_timeout(mut self, timeout: Duration) -> Self {
        self.query_timeout = Some(timeout);
        self
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    /// Look up every query concurrently, preserving input order.
    pub async fn retrieve(&self, queries: &[String]) -> Result<ContextMap, RetrievalError> {
        if queries.is_empty() {
            return Err(RetrievalError::NoQueries);
        }

        let lookups = queries.iter().map(|query| async move {
            let outcome = match self.query_timeout {
                Some(limit) => tokio::time::timeout(limit, self.backend.search(query))
                    .await
                    .unwrap_or_else(|_| {
                        Err(RetrievalError::Timeout {
                            timeout_secs: limit.as_secs(),
                        })
                    }),
                None => self.backend.search(query).await,
            };
            (query, outcome)
        });

        let mut map = ContextMap::default();
        for (query, outcome) in join_all(lookups).await {
            let context = match outcome {
                Ok(context) => context,
                Err(e) => {
                    warn!(query = %query, backend = self.backend.name(), error = %e, "Search degraded to placeholder");
                    map.degraded += 1;
                    placeholder(query)
                }
            };
            map.entries.push((query.clone(), context));
        }

        info!(
            backend = self.backend.name(),
            queries = map.len(),
            degraded = map.degraded,
            "Retrieval complete"
        );
        Ok(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::brain::MockLlmProvider;
    use crate::geo::schema::SEARCH_SNIPPET;
    use serde_json::json;

    fn queries(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    /// Sleeps longer for earlier queries so completion order is reversed.
    struct SlowFirst;

    #[async_trait]
    impl SearchBackend for SlowFirst {
        fn name(&self) -> &str {
            "slow-first"
        }

        async fn search(&self, query: &str) -> Result<String, RetrievalError> {
            let delay = match query {
                "a" => 60,
                "b" => 30,
                _ => 0,
            };
            tokio::time::sleep(Duration::from_millis(delay)).await;
            Ok(format!("context for {query}"))
        }
    }

    #[tokio::test]
    async fn test_static_search_hit_and_placeholder() {
        let backend = StaticSearch::new().with("CRM Pricing", "Plans start at $15/user.");
        let retriever = Retriever::new(Arc::new(backend));

        let map = retriever
            .retrieve(&queries(&["crm pricing", "crm security"]))
            .await
            .unwrap();
        assert_eq!(map.len(), 2);
        assert_eq!(map.get("crm pricing"), Some("Plans start at $15/user."));
        assert_eq!(
            map.get("crm security"),
            Some("No search results available for \"crm security\".")
        );
        assert_eq!(map.degraded(), 1);
    }

    #[tokio::test]
    async fn test_retrieve_preserves_input_order() {
        let retriever = Retriever::new(Arc::new(SlowFirst));
        let map = retriever.retrieve(&queries(&["a", "b", "c"])).await.unwrap();
        let order: Vec<&str> = map.iter().map(|(q, _)| q).collect();
        assert_eq!(order, vec!["a", "b", "c"]);
        assert_eq!(map.get("a"), Some("context for a"));
    }

    #[tokio::test]
    async fn test_retrieve_timeout_degrades_single_query() {
        let retriever =
            Retriever::new(Arc::new(SlowFirst)).with_query_timeout(Duration::from_millis(15));
        let map = retriever.retrieve(&queries(&["a", "c"])).await.unwrap();
        assert_eq!(map.get("a"), Some(placeholder("a").as_str()));
        assert_eq!(map.get("c"), Some("context for c"));
        assert_eq!(map.degraded(), 1);
    }

    #[tokio::test]
    async fn test_retrieve_no_queries() {
        let retriever = Retriever::new(Arc::new(StaticSearch::new()));
        let err = retriever.retrieve(&[]).await.unwrap_err();
        assert!(matches!(err, RetrievalError::NoQueries));
    }

    #[tokio::test]
    async fn test_synthetic_search_uses_snippet_shape() {
        let provider = Arc::new(MockLlmProvider::new());
        provider.queue_json_for_shape(SEARCH_SNIPPET, &json!({"snippet": "  Asana costs $10.99.  "}));
        let backend = SyntheticSearch::new(Generator::new(provider.clone()));

        let snippet = backend.search("asana pricing").await.unwrap();
        assert_eq!(snippet, "Asana costs $10.99.");
        let request = &provider.requests()[0];
        assert_eq!(request.response_shape.as_ref().unwrap().name, SEARCH_SNIPPET);
        assert!(request.messages[1].content.contains("asana pricing"));
    }

    #[tokio::test]
    async fn test_synthetic_search_failure_degrades() {
        let provider = Arc::new(MockLlmProvider::new());
        provider.queue_json_for_shape(SEARCH_SNIPPET, &json!({"snippet": "Trello is free."}));
        // Second lookup finds no queued reply and fails.
        let retriever = Retriever::new(Arc::new(SyntheticSearch::new(Generator::new(provider))));

        let map = retriever
            .retrieve(&queries(&["trello pricing", "trello limits"]))
            .await
            .unwrap();
        assert_eq!(map.len(), 2);
        assert_eq!(map.degraded(), 1);
    }

    #[test]
    fn test_reduce_results_joins_top_n() {
        let response: WebSearchResponse = serde_json::from_value(json!({
            "query": "crm",
            "results": [
                {"title": "A", "url": "https://a", "content": "First."},
                {"title": "B", "url": "https://b", "content": "  "},
                {"title": "C", "url": "https://c", "content": "Second."},
                {"title": "D", "url": "https://d", "content": "Third."}
            ]
        }))
        .unwrap();
        assert_eq!(
            WebSearch::reduce_results(response, 2).as_deref(),
            Some("First.\nSecond.")
        );
    }

    #[test]
    fn test_reduce_results_empty() {
        let response: WebSearchResponse = serde_json::from_value(json!({"results": []})).unwrap();
        assert!(WebSearch::reduce_results(response, 3).is_none());
    }

    fn credentials(search: Option<&str>) -> Credentials {
        Credentials {
            llm_api_key: "sk-test".to_string(),
            search_api_key: search.map(str::to_string),
        }
    }

    #[test]
    fn test_backend_selection() {
        let generator = Generator::new(Arc::new(MockLlmProvider::new()));
        let mut config = SearchConfig::default();

        let b = backend_from_config(&config, &credentials(None), &generator).unwrap();
        assert_eq!(b.name(), "synthetic");
        let b = backend_from_config(&config, &credentials(Some("tvly-key")), &generator).unwrap();
        assert_eq!(b.name(), "web");

        config.strategy = SearchStrategy::Synthetic;
        let b = backend_from_config(&config, &credentials(Some("tvly-key")), &generator).unwrap();
        assert_eq!(b.name(), "synthetic");

        config.strategy = SearchStrategy::Web;
        let err = backend_from_config(&config, &credentials(None), &generator).err().unwrap();
        assert!(matches!(err, ConfigError::EnvVarMissing { var } if var == "TAVILY_API_KEY"));
    }
}
