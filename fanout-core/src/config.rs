//! Configuration system for the fan-out generator.
//!
//! Uses `figment` for layered configuration: defaults -> user config ->
//! workspace config -> explicit config file -> environment.
//! Configuration is loaded from `~/.config/fanout/config.toml` and/or
//! `.fanout/config.toml` in the workspace directory.
//!
//! Secrets never live in configuration files. The config only names the
//! environment variables that hold them; [`Credentials::from_env`] reads them
//! once at startup.

use crate::error::ConfigError;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FanOutConfig {
    pub llm: LlmConfig,
    pub search: SearchConfig,
    pub pipeline: PipelineConfig,
    pub server: ServerConfig,
}

/// LLM provider configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Provider name. Only OpenAI-compatible endpoints are supported.
    pub provider: String,
    /// Model identifier; must support structured outputs.
    pub model: String,
    /// Environment variable holding the API key.
    pub api_key_env: String,
    /// Optional base URL override (Azure, vLLM, proxies).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    pub temperature: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<usize>,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            model: "gpt-4o-2024-08-06".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            base_url: None,
            temperature: 0.7,
            max_tokens: None,
            timeout_secs: 60,
        }
    }
}

impl LlmConfig {
    /// Validate this LLM config and return any warnings.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if self.temperature < 0.0 || self.temperature > 2.0 {
            warnings.push(format!(
                "llm.temperature ({}) is outside the typical range 0.0-2.0",
                self.temperature
            ));
        }
        if self.timeout_secs == 0 {
            warnings.push("llm.timeout_secs is 0; requests will fail immediately".to_string());
        }
        warnings
    }
}

/// How sub-query context is retrieved.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchStrategy {
    /// Web search when a search credential is present, synthetic otherwise.
    #[default]
    Auto,
    /// Ask the model to fabricate plausible search snippets.
    Synthetic,
    /// Always call the web search backend.
    Web,
}

impl std::fmt::Display for SearchStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SearchStrategy::Auto => write!(f, "auto"),
            SearchStrategy::Synthetic => write!(f, "synthetic"),
            SearchStrategy::Web => write!(f, "web"),
        }
    }
}

/// Search backend configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    pub strategy: SearchStrategy,
    /// Environment variable holding the search API key (optional).
    pub api_key_env: String,
    pub base_url: String,
    /// Number of top results reduced into one snippet.
    pub max_results: usize,
    pub timeout_secs: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            strategy: SearchStrategy::Auto,
            api_key_env: "TAVILY_API_KEY".to_string(),
            base_url: "https://api.tavily.com".to_string(),
            max_results: 3,
            timeout_secs: 15,
        }
    }
}

/// Retry policy for transient remote failures.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of retries after the first attempt (0 = no retry).
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub backoff_multiplier: f64,
    /// Add up to 25% random jitter to each backoff.
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 0,
            initial_backoff_ms: 1000,
            max_backoff_ms: 32_000,
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

/// Pipeline orchestration settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Content longer than this many characters is truncated before prompting.
    pub max_content_chars: usize,
    /// Run plan -> retrieve -> synthesize even when content is supplied,
    /// using the content as seed material.
    pub force_fan_out: bool,
    /// Total synthesis attempts when the model output fails validation.
    pub max_synthesis_attempts: u32,
    /// Upper bound on the wall time of any single stage.
    pub stage_timeout_secs: u64,
    #[serde(default)]
    pub retry: RetryConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_content_chars: 4000,
            force_fan_out: false,
            max_synthesis_attempts: 1,
            stage_timeout_secs: 180,
            retry: RetryConfig::default(),
        }
    }
}

/// HTTP server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Maximum accepted request body, including uploads.
    pub max_upload_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
            max_upload_bytes: 2 * 1024 * 1024,
        }
    }
}

impl FanOutConfig {
    /// Validate the whole configuration and return human-readable warnings.
    ///
    /// Does not fail: callers decide whether warnings are fatal.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = self.llm.validate();
        if self.pipeline.max_synthesis_attempts == 0 {
            warnings.push(
                "pipeline.max_synthesis_attempts is 0; treating it as 1".to_string(),
            );
        }
        if self.pipeline.max_content_chars == 0 {
            warnings.push("pipeline.max_content_chars is 0; all content will be dropped".to_string());
        }
        if self.search.max_results == 0 {
            warnings.push("search.max_results is 0; web search returns no context".to_string());
        }
        if self.pipeline.stage_timeout_secs < self.llm.timeout_secs {
            warnings.push(format!(
                "pipeline.stage_timeout_secs ({}) is shorter than llm.timeout_secs ({})",
                self.pipeline.stage_timeout_secs, self.llm.timeout_secs
            ));
        }
        warnings
    }
}

impl FanOutConfig {
    /// Render the effective configuration as TOML.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::ParseError {
            message: e.to_string(),
        })
    }
}

/// Credentials read from the environment once at startup.
#[derive(Clone)]
pub struct Credentials {
    pub llm_api_key: String,
    pub search_api_key: Option<String>,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("llm_api_key", &"<redacted>")
            .field(
                "search_api_key",
                &self.search_api_key.as_ref().map(|_| "<redacted>"),
            )
            .finish()
    }
}

impl Credentials {
    /// Read credentials from the variables named in `config`.
    ///
    /// A missing LLM key is a configuration error; a missing search key only
    /// disables web search.
    pub fn from_env(config: &FanOutConfig) -> Result<Self, ConfigError> {
        let llm_api_key =
            read_env(&config.llm.api_key_env).ok_or_else(|| ConfigError::EnvVarMissing {
                var: config.llm.api_key_env.clone(),
            })?;
        Ok(Self {
            llm_api_key,
            search_api_key: read_env(&config.search.api_key_env),
        })
    }
}

fn read_env(var: &str) -> Option<String> {
    std::env::var(var)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Load configuration with layered sources.
///
/// Priority (highest to lowest):
/// 1. Environment variables (prefixed with `FANOUT_`, `__` for nesting)
/// 2. Explicit config file (`--config`)
/// 3. Workspace-local config (`.fanout/config.toml`)
/// 4. User config (`~/.config/fanout/config.toml`)
/// 5. Built-in defaults
///
/// Each layer only replaces the keys it sets. Callers apply per-invocation
/// overrides to the returned value.
pub fn load_config(
    workspace: Option<&Path>,
    config_file: Option<&Path>,
) -> Result<FanOutConfig, ConfigError> {
    let mut figment = Figment::from(Serialized::defaults(FanOutConfig::default()));

    if let Some(config_dir) = directories::ProjectDirs::from("dev", "fanout", "fanout") {
        let user_config = config_dir.config_dir().join("config.toml");
        if user_config.exists() {
            figment = figment.merge(Toml::file(&user_config));
        }
    }

    if let Some(ws) = workspace {
        let ws_config = ws.join(".fanout").join("config.toml");
        if ws_config.exists() {
            figment = figment.merge(Toml::file(&ws_config));
        }
    }

    if let Some(path) = config_file {
        if !path.exists() {
            return Err(ConfigError::FileNotFound {
                path: path.to_path_buf(),
            });
        }
        figment = figment.merge(Toml::file(path));
    }

    // FANOUT_LLM__MODEL, FANOUT_SEARCH__STRATEGY, etc.
    figment = figment.merge(Env::prefixed("FANOUT_").split("__"));

    figment.extract().map_err(|e| ConfigError::ParseError {
        message: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = FanOutConfig::default();
        assert_eq!(config.llm.provider, "openai");
        assert_eq!(config.llm.model, "gpt-4o-2024-08-06");
        assert_eq!(config.llm.api_key_env, "OPENAI_API_KEY");
        assert_eq!(config.search.strategy, SearchStrategy::Auto);
        assert_eq!(config.pipeline.max_content_chars, 4000);
        assert_eq!(config.pipeline.max_synthesis_attempts, 1);
        assert_eq!(config.pipeline.retry.max_retries, 0);
        assert_eq!(config.server.port, 8000);
    }

    #[test]
    fn test_config_serialization_roundtrip() {
        let config = FanOutConfig::default();
        let toml_str = toml::to_string(&config).unwrap();
        let deserialized: FanOutConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(deserialized.llm.model, config.llm.model);
        assert_eq!(deserialized.search.strategy, config.search.strategy);
        assert_eq!(deserialized.server.host, config.server.host);
    }

    #[test]
    fn test_to_toml_names_sections() {
        let rendered = FanOutConfig::default().to_toml().unwrap();
        for section in ["[llm]", "[search]", "[pipeline]", "[pipeline.retry]", "[server]"] {
            assert!(rendered.contains(section), "missing {section}");
        }
        assert!(!rendered.contains("sk-"));
    }

    #[test]
    fn test_search_strategy_serde() {
        let json = serde_json::to_string(&SearchStrategy::Synthetic).unwrap();
        assert_eq!(json, "\"synthetic\"");
        let parsed: SearchStrategy = serde_json::from_str("\"web\"").unwrap();
        assert_eq!(parsed, SearchStrategy::Web);
        assert_eq!(SearchStrategy::Auto.to_string(), "auto");
    }

    #[test]
    fn test_load_config_defaults() {
        let config = load_config(None, None).unwrap();
        assert_eq!(config.llm.provider, "openai");
    }

    #[test]
    fn test_explicit_file_keeps_workspace_keys() {
        let dir = tempfile::tempdir().unwrap();
        let ws_dir = dir.path().join(".fanout");
        std::fs::create_dir_all(&ws_dir).unwrap();
        std::fs::write(
            ws_dir.join("config.toml"),
            "[llm]\nmodel = \"gpt-4o-mini\"\n\n[pipeline]\nmax_synthesis_attempts = 3\n",
        )
        .unwrap();
        let path = dir.path().join("custom.toml");
        std::fs::write(&path, "[server]\nport = 9090\n").unwrap();

        let config = load_config(Some(dir.path()), Some(&path)).unwrap();
        assert_eq!(config.server.port, 9090);
        assert_eq!(config.llm.model, "gpt-4o-mini");
        assert_eq!(config.pipeline.max_synthesis_attempts, 3);
    }

    #[test]
    fn test_load_config_from_workspace() {
        let dir = tempfile::tempdir().unwrap();
        let ws_dir = dir.path().join(".fanout");
        std::fs::create_dir_all(&ws_dir).unwrap();
        std::fs::write(
            ws_dir.join("config.toml"),
            r#"
[llm]
model = "gpt-4o-mini"

[search]
strategy = "synthetic"
max_results = 5

[pipeline]
force_fan_out = true
"#,
        )
        .unwrap();

        let config = load_config(Some(dir.path()), None).unwrap();
        assert_eq!(config.llm.model, "gpt-4o-mini");
        assert_eq!(config.llm.api_key_env, "OPENAI_API_KEY");
        assert_eq!(config.search.strategy, SearchStrategy::Synthetic);
        assert_eq!(config.search.max_results, 5);
        assert!(config.pipeline.force_fan_out);
        assert_eq!(config.pipeline.max_content_chars, 4000);
    }

    #[test]
    fn test_load_config_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.toml");
        std::fs::write(&path, "[server]\nport = 9090\n").unwrap();

        let config = load_config(None, Some(&path)).unwrap();
        assert_eq!(config.server.port, 9090);
    }

    #[test]
    fn test_load_config_missing_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nope.toml");
        let err = load_config(None, Some(&path)).unwrap_err();
        assert!(matches!(err, ConfigError::FileNotFound { .. }));
    }

    #[test]
    fn test_load_config_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "[search]\nstrategy = \"carrier-pigeon\"\n").unwrap();
        let err = load_config(None, Some(&path)).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { .. }));
    }

    #[test]
    fn test_validate_defaults_clean() {
        assert!(FanOutConfig::default().validate().is_empty());
    }

    #[test]
    fn test_validate_flags_bad_values() {
        let mut config = FanOutConfig::default();
        config.llm.temperature = 3.5;
        config.pipeline.max_synthesis_attempts = 0;
        config.search.max_results = 0;
        config.pipeline.stage_timeout_secs = 5;
        let warnings = config.validate();
        assert_eq!(warnings.len(), 4, "{warnings:?}");
        assert!(warnings[0].contains("temperature"));
    }

    #[test]
    fn test_credentials_missing_llm_key() {
        let mut config = FanOutConfig::default();
        config.llm.api_key_env = "FANOUT_TEST_LLM_KEY_MISSING".to_string();
        // SAFETY: test-only env var manipulation
        unsafe { std::env::remove_var("FANOUT_TEST_LLM_KEY_MISSING") };
        let err = Credentials::from_env(&config).unwrap_err();
        match err {
            ConfigError::EnvVarMissing { var } => assert_eq!(var, "FANOUT_TEST_LLM_KEY_MISSING"),
            other => panic!("Expected EnvVarMissing, got {:?}", other),
        }
    }

    #[test]
    fn test_credentials_optional_search_key() {
        let mut config = FanOutConfig::default();
        config.llm.api_key_env = "FANOUT_TEST_LLM_KEY_PRESENT".to_string();
        config.search.api_key_env = "FANOUT_TEST_SEARCH_KEY_BLANK".to_string();
        // SAFETY: test-only env var manipulation
        unsafe {
            std::env::set_var("FANOUT_TEST_LLM_KEY_PRESENT", " sk-test ");
            std::env::set_var("FANOUT_TEST_SEARCH_KEY_BLANK", "   ");
        }
        let creds = Credentials::from_env(&config).unwrap();
        assert_eq!(creds.llm_api_key, "sk-test");
        assert!(creds.search_api_key.is_none());
        assert!(!format!("{creds:?}").contains("sk-test"));
        // SAFETY: test-only env var manipulation
        unsafe {
            std::env::remove_var("FANOUT_TEST_LLM_KEY_PRESENT");
            std::env::remove_var("FANOUT_TEST_SEARCH_KEY_BLANK");
        }
    }
}
