//! HTTP gateway server built on axum.

use super::page::{PageContext, render_page, templates};
use crate::config::ServerConfig;
use crate::error::{ConfigError, FanOutError, InputError};
use crate::pipeline::{FanOutRequest, Pipeline, ToolResponse};
use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, Multipart, State, rejection::JsonRejection},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::{get, post},
};
use chrono::{DateTime, Utc};
use handlebars::Handlebars;
use std::sync::Arc;
use std::time::Instant;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info};

/// Shared state for axum handlers. Read-only after construction.
pub struct AppState {
    pipeline: Pipeline,
    templates: Handlebars<'static>,
    max_upload_bytes: usize,
    started_at: Instant,
    started_at_utc: DateTime<Utc>,
}

pub type SharedState = Arc<AppState>;

impl AppState {
    pub fn new(pipeline: Pipeline, server: &ServerConfig) -> Result<Self, ConfigError> {
        let templates = templates().map_err(|e| ConfigError::Invalid {
            message: format!("page template: {e}"),
        })?;
        Ok(Self {
            pipeline,
            templates,
            max_upload_bytes: server.max_upload_bytes,
            started_at: Instant::now(),
            started_at_utc: Utc::now(),
        })
    }

    pub fn uptime_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}

/// Build the router.
pub fn router(state: SharedState) -> Router {
    let body_limit = state.max_upload_bytes;
    Router::new()
        .route("/", get(index_page).post(submit_form))
        .route("/health", get(health_handler))
        .route("/fanout", post(fanout_handler))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// JSON error with a `detail` field.
struct ApiError {
    status: StatusCode,
    detail: String,
}

impl From<FanOutError> for ApiError {
    fn from(err: FanOutError) -> Self {
        let status = match &err {
            FanOutError::Input(_) => StatusCode::BAD_REQUEST,
            FanOutError::Pipeline(_) => StatusCode::BAD_GATEWAY,
            FanOutError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            detail: err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({ "detail": self.detail });
        (self.status, Json(body)).into_response()
    }
}

/// Health check endpoint.
async fn health_handler(State(state): State<SharedState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "uptime_secs": state.uptime_secs(),
        "started_at": state.started_at_utc.to_rfc3339(),
        "model": state.pipeline.model_name(),
        "search": state.pipeline.search_backend(),
    }))
}

/// JSON API: returns the validated result fields directly.
async fn fanout_handler(
    State(state): State<SharedState>,
    payload: Result<Json<FanOutRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(request) = payload.map_err(|rejection| {
        // Wrong field types are caller input errors, same as bad syntax.
        let status = match &rejection {
            JsonRejection::JsonDataError(_) => StatusCode::BAD_REQUEST,
            other => other.status(),
        };
        ApiError {
            status,
            detail: rejection.body_text(),
        }
    })?;

    let run = state.pipeline.run_request(&request).await?;
    Ok(Json(run.result).into_response())
}

async fn index_page(State(state): State<SharedState>) -> Response {
    page_response(&state, &PageContext::default())
}

/// Raw form fields, before normalization.
#[derive(Debug, Default)]
struct FormSubmission {
    content_text: String,
    keyword: String,
    upload: Option<(String, Vec<u8>)>,
}

impl FormSubmission {
    fn into_request(self) -> Result<FanOutRequest, InputError> {
        let mut request = FanOutRequest::new(self.keyword, Some(self.content_text));
        if let Some((filename, bytes)) = self.upload {
            request.append_upload(&filename, &bytes)?;
        }
        Ok(request)
    }
}

async fn read_form(mut multipart: Multipart) -> Result<FormSubmission, InputError> {
    let malformed = |e: axum::extract::multipart::MultipartError| InputError::MalformedForm {
        message: e.body_text(),
    };

    let mut form = FormSubmission::default();
    while let Some(field) = multipart.next_field().await.map_err(malformed)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "content_text" => form.content_text = field.text().await.map_err(malformed)?,
            "keyword" => form.keyword = field.text().await.map_err(malformed)?,
            "upload" => {
                let filename = field.file_name().unwrap_or("upload").to_string();
                let bytes = field.bytes().await.map_err(malformed)?;
                form.upload = Some((filename, bytes.to_vec()));
            }
            other => debug!(field = other, "Ignoring unknown form field"),
        }
    }
    Ok(form)
}

/// Form handler: always re-renders the page with the outcome.
async fn submit_form(State(state): State<SharedState>, multipart: Multipart) -> Response {
    let mut context = PageContext::default();

    let response = match read_form(multipart).await {
        Ok(form) => {
            context.submitted_text = form.content_text.clone();
            context.submitted_keyword = form.keyword.clone();
            match form.into_request() {
                Ok(request) => state.pipeline.run_tool(&request).await,
                Err(e) => ToolResponse::Error(e.to_string()),
            }
        }
        Err(e) => ToolResponse::Error(e.to_string()),
    };

    match response {
        ToolResponse::Result(result) => context.result = Some(result),
        ToolResponse::Error(message) => context.error = Some(message),
    }
    page_response(&state, &context)
}

fn page_response(state: &AppState, context: &PageContext) -> Response {
    match render_page(&state.templates, context) {
        Ok(html) => Html(html).into_response(),
        Err(e) => {
            error!(error = %e, "Failed to render page");
            (StatusCode::INTERNAL_SERVER_ERROR, "Failed to render page").into_response()
        }
    }
}

/// Serve on the configured address until Ctrl-C.
pub async fn run(config: &ServerConfig, state: SharedState) -> Result<(), std::io::Error> {
    let app = router(state);
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(addr = %addr, "Fan-out server listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutting down");
        })
        .await?;
    Ok(())
}
