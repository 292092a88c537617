//! Pipeline orchestrator.
//!
//! One entry point dispatches on [`PipelineMode`]:
//!
//! - `Direct`: caller-supplied content and keyword go into one synthesis call.
//! - `FanOut`: plan sub-queries, retrieve context for each, then synthesize.
//!
//! Stages run strictly in sequence and the first failure halts the run with a
//! stage-tagged [`PipelineError`]. Every model output passes through the
//! validation engine before it leaves a stage.

use crate::brain::Generator;
use crate::config::{Credentials, FanOutConfig, PipelineConfig};
use crate::error::{ConfigError, FanOutError, InputError, PipelineError};
use crate::geo::schema::{fan_out_result_shape, sub_query_plan_shape};
use crate::geo::{
    FanOutCandidate, FanOutResult, SubQueryPlan, SubQueryPlanCandidate, validate_plan,
    validate_result,
};
use crate::prompts::{
    GEO_SYSTEM_PROMPT, PLANNER_SYSTEM_PROMPT, direct_prompt, planning_prompt, synthesis_prompt,
};
use crate::providers::{create_provider, with_retry};
use crate::retrieval::{ContextMap, Retriever, backend_from_config};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tracing::{Instrument, debug, error, info, info_span, warn};
use uuid::Uuid;

/// A pipeline stage, used to tag failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Planning,
    Search,
    Synthesis,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Planning => "planning",
            Stage::Search => "search",
            Stage::Synthesis => "synthesis",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Stage::Planning => write!(f, "Planning"),
            Stage::Search => write!(f, "Search"),
            Stage::Synthesis => write!(f, "Synthesis"),
        }
    }
}

/// Inbound request as received from a front end.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FanOutRequest {
    #[serde(default)]
    pub content_text: Option<String>,
    #[serde(default)]
    pub keyword: String,
}

impl FanOutRequest {
    pub fn new(keyword: impl Into<String>, content_text: Option<String>) -> Self {
        Self {
            content_text,
            keyword: keyword.into(),
        }
    }

    /// Append an uploaded file's text after the typed content.
    ///
    /// The upload must be valid UTF-8. Empty uploads are ignored.
    pub fn append_upload(&mut self, filename: &str, bytes: &[u8]) -> Result<(), InputError> {
        if bytes.is_empty() {
            return Ok(());
        }
        let text = std::str::from_utf8(bytes).map_err(|_| InputError::UploadNotUtf8 {
            filename: filename.to_string(),
        })?;
        self.content_text = Some(match self.content_text.take() {
            Some(existing) if !existing.trim().is_empty() => format!("{existing}\n\n{text}"),
            _ => text.to_string(),
        });
        Ok(())
    }
}

/// Normalized pipeline input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineMode {
    /// Analyze caller-supplied content in one synthesis call.
    Direct { keyword: String, content: String },
    /// Plan, retrieve, then synthesize. `seed` grounds the planning stage.
    FanOut {
        keyword: String,
        seed: Option<String>,
    },
}

impl PipelineMode {
    /// Normalize a request. Fails only on a blank keyword.
    pub fn from_request(request: &FanOutRequest, force_fan_out: bool) -> Result<Self, InputError> {
        let keyword = request.keyword.trim();
        if keyword.is_empty() {
            return Err(InputError::BlankKeyword);
        }
        let keyword = keyword.to_string();
        let content = request
            .content_text
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(str::to_string);

        Ok(match (content, force_fan_out) {
            (Some(content), false) => PipelineMode::Direct { keyword, content },
            (seed, _) => PipelineMode::FanOut { keyword, seed },
        })
    }

    pub fn keyword(&self) -> &str {
        match self {
            PipelineMode::Direct { keyword, .. } | PipelineMode::FanOut { keyword, .. } => keyword,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            PipelineMode::Direct { .. } => "direct",
            PipelineMode::FanOut { .. } => "fan_out",
        }
    }
}

/// Everything one successful run produced.
#[derive(Debug, Clone, Serialize)]
pub struct FanOutRun {
    pub request_id: Uuid,
    pub result: FanOutResult,
    /// Present in fan-out mode.
    pub plan: Option<SubQueryPlan>,
    /// Present in fan-out mode.
    pub context: Option<ContextMap>,
    pub synthesis_attempts: u32,
}

/// The `{ "result": ... } | { "error": ... }` envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolResponse {
    Result(FanOutResult),
    Error(String),
}

impl From<Result<FanOutRun, FanOutError>> for ToolResponse {
    fn from(outcome: Result<FanOutRun, FanOutError>) -> Self {
        match outcome {
            Ok(run) => ToolResponse::Result(run.result),
            Err(e) => ToolResponse::Error(e.to_string()),
        }
    }
}

/// Sequences the generation and retrieval stages for one request at a time.
///
/// Holds only shared, read-only handles; one instance serves every request.
#[derive(Clone)]
pub struct Pipeline {
    generator: Generator,
    retriever: Retriever,
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(generator: Generator, retriever: Retriever, config: PipelineConfig) -> Self {
        Self {
            generator,
            retriever,
            config,
        }
    }

    /// Wire the provider, generator and search backend from configuration.
    pub fn from_config(config: &FanOutConfig, credentials: &Credentials) -> Result<Self, ConfigError> {
        let provider = create_provider(&config.llm, credentials.llm_api_key.clone())?;
        let generator = Generator::from_config(provider, &config.llm);
        let backend = backend_from_config(&config.search, credentials, &generator)?;
        let query_timeout = config.search.timeout_secs.max(config.llm.timeout_secs);
        let retriever =
            Retriever::new(backend).with_query_timeout(Duration::from_secs(query_timeout));

        info!(
            model = generator.model_name(),
            search = retriever.backend_name(),
            "Pipeline ready"
        );
        Ok(Self::new(generator, retriever, config.pipeline.clone()))
    }

    /// Read credentials from the environment, then wire as [`Pipeline::from_config`].
    pub fn from_env(config: &FanOutConfig) -> Result<Self, FanOutError> {
        let credentials = Credentials::from_env(config)?;
        Ok(Self::from_config(config, &credentials)?)
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn model_name(&self) -> &str {
        self.generator.model_name()
    }

    pub fn search_backend(&self) -> &str {
        self.retriever.backend_name()
    }

    /// Normalize `request` and run it.
    pub async fn run_request(&self, request: &FanOutRequest) -> Result<FanOutRun, FanOutError> {
        let mode = PipelineMode::from_request(request, self.config.force_fan_out).inspect_err(|e| {
            debug!(error = %e, "Rejected request input");
        })?;
        Ok(self.run(mode).await?)
    }

    /// Run a request and wrap the outcome in the result/error envelope.
    pub async fn run_tool(&self, request: &FanOutRequest) -> ToolResponse {
        self.run_request(request).await.into()
    }

    /// Run one normalized request to completion.
    pub async fn run(&self, mode: PipelineMode) -> Result<FanOutRun, PipelineError> {
        let request_id = Uuid::new_v4();
        let span = info_span!("fanout", %request_id, mode = mode.name(), keyword = mode.keyword());

        async move {
            let outcome = match mode {
                PipelineMode::Direct { keyword, content } => {
                    self.run_direct(request_id, &keyword, &content).await
                }
                PipelineMode::FanOut { keyword, seed } => {
                    self.run_fan_out(request_id, &keyword, seed.as_deref()).await
                }
            };
            if let Err(e) = &outcome {
                error!(stage = e.stage().as_str(), error = %e, "Pipeline failed");
            }
            outcome
        }
        .instrument(span)
        .await
    }

    async fn run_direct(
        &self,
        request_id: Uuid,
        keyword: &str,
        content: &str,
    ) -> Result<FanOutRun, PipelineError> {
        let prompt = direct_prompt(content, keyword, self.config.max_content_chars);
        let (result, attempts) = self
            .within(Stage::Synthesis, self.synthesize(&prompt, false))
            .await?;
        Ok(FanOutRun {
            request_id,
            result,
            plan: None,
            context: None,
            synthesis_attempts: attempts,
        })
    }

    async fn run_fan_out(
        &self,
        request_id: Uuid,
        keyword: &str,
        seed: Option<&str>,
    ) -> Result<FanOutRun, PipelineError> {
        let plan = self.within(Stage::Planning, self.plan(keyword, seed)).await?;
        info!(stage = "planning", sub_queries = plan.sub_queries.len(), "Stage complete");

        let context = self
            .within(Stage::Search, async {
                self.retriever
                    .retrieve(&plan.sub_queries)
                    .await
                    .map_err(PipelineError::SearchFailed)
            })
            .await?;
        info!(stage = "search", entries = context.len(), degraded = context.degraded(), "Stage complete");

        let prompt = synthesis_prompt(keyword, &plan.main_intent, &context);
        let (result, attempts) = self
            .within(Stage::Synthesis, self.synthesize(&prompt, true))
            .await?;

        Ok(FanOutRun {
            request_id,
            result,
            plan: Some(plan),
            context: Some(context),
            synthesis_attempts: attempts,
        })
    }

    async fn plan(&self, keyword: &str, seed: Option<&str>) -> Result<SubQueryPlan, PipelineError> {
        let prompt = planning_prompt(keyword, seed, self.config.max_content_chars);
        let shape = sub_query_plan_shape();
        let candidate: SubQueryPlanCandidate = with_retry(&self.config.retry, || {
            self.generator.generate(PLANNER_SYSTEM_PROMPT, &prompt, &shape)
        })
        .await
        .map_err(PipelineError::PlanningFailed)?;

        validate_plan(&candidate).map_err(|source| {
            warn!(stage = "planning", error = %source, "Plan rejected");
            PipelineError::ValidationFailed {
                stage: Stage::Planning,
                source,
            }
        })
    }

    /// Generate and validate a result, regenerating on validation failure up
    /// to `max_synthesis_attempts` times in total.
    async fn synthesize(
        &self,
        prompt: &str,
        with_source_quality: bool,
    ) -> Result<(FanOutResult, u32), PipelineError> {
        let shape = fan_out_result_shape(with_source_quality);
        let max_attempts = self.config.max_synthesis_attempts.max(1);

        let mut attempt = 1;
        loop {
            let candidate: FanOutCandidate = with_retry(&self.config.retry, || {
                self.generator.generate(GEO_SYSTEM_PROMPT, prompt, &shape)
            })
            .await
            .map_err(PipelineError::SynthesisFailed)?;

            match validate_result(&candidate) {
                Ok(result) => {
                    info!(stage = "synthesis", blocks = result.blocks.len(), attempt, "Stage complete");
                    return Ok((result, attempt));
                }
                Err(source) => {
                    warn!(stage = "synthesis", attempt, max_attempts, error = %source, "Result rejected");
                    if attempt >= max_attempts {
                        return Err(PipelineError::ValidationFailed {
                            stage: Stage::Synthesis,
                            source,
                        });
                    }
                }
            }
            attempt += 1;
        }
    }

    /// Bound a stage by `stage_timeout_secs`.
    async fn within<T>(
        &self,
        stage: Stage,
        fut: impl Future<Output = Result<T, PipelineError>>,
    ) -> Result<T, PipelineError> {
        let timeout_secs = self.config.stage_timeout_secs;
        tokio::time::timeout(Duration::from_secs(timeout_secs), fut)
            .await
            .unwrap_or(Err(PipelineError::StageTimeout {
                stage,
                timeout_secs,
            }))
    }
}
