//! Viva HTTP REST API
//!
//! Axum-based HTTP server exposing the interview lifecycle. Runs alongside
//! the Unix socket IPC server.
//!
//! Architecture: each endpoint has a thin axum handler that delegates to a
//! testable inner function, so the business logic is exercised without
//! axum dispatch machinery.
//!
//! Endpoints:
//! - GET  /health            — health check with store status
//! - GET  /version           — server version info
//! - POST /resume            — stage resume text for an identity
//! - POST /interview/start   — open a session, returns the first question
//! - POST /interview/next    — submit an answer, returns feedback + question
//! - POST /interview/end     — finalize, returns summary + score
//! - GET  /interview/active  — projection of the current session
//! - POST /interview/reset   — one-time restart

use std::sync::Arc;

use anyhow::Result;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use viva_core::error::VivaError;
use viva_core::store::SessionStore;
use viva_core::VivaConfig;

use crate::subsystems::interview::InterviewOrchestrator;

/// Shared state for all HTTP handlers
#[derive(Clone)]
pub struct HttpState {
    pub orchestrator: Arc<InterviewOrchestrator>,
    pub store: Arc<dyn SessionStore>,
}

/// Build the Axum router with all endpoints
pub fn build_router(state: Arc<HttpState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/version", get(version_handler))
        .route("/resume", post(resume_handler))
        .route("/interview/start", post(start_handler))
        .route("/interview/next", post(next_handler))
        .route("/interview/end", post(end_handler))
        .route("/interview/active", get(active_handler))
        .route("/interview/reset", post(reset_handler))
        .with_state(state)
}

/// Start the HTTP server on the configured address.
/// Gracefully shuts down when the broadcast shutdown signal fires.
pub async fn start_http_server(
    state: Arc<HttpState>,
    config: VivaConfig,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<()> {
    let addr = format!("{}:{}", config.http.host, config.http.port);
    let app = build_router(state);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("Viva HTTP API listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
            tracing::info!("HTTP server shutting down...");
        })
        .await?;

    Ok(())
}

// ============================================================================
// Request DTOs
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct IdentityRequest {
    pub identity: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct NextRequest {
    pub identity: Option<String>,
    pub answer: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct StageResumeRequest {
    pub identity: Option<String>,
    pub resume_text: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ActiveQuery {
    pub identity: Option<String>,
}

// ============================================================================
// Error mapping
// ============================================================================

fn error_status(err: &VivaError) -> StatusCode {
    match err {
        VivaError::PrecursorMissing | VivaError::Validation(_) => StatusCode::BAD_REQUEST,
        VivaError::SessionNotFound => StatusCode::NOT_FOUND,
        VivaError::ResetExhausted => StatusCode::FORBIDDEN,
        VivaError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
        VivaError::ModelUnavailable(_) | VivaError::TransientUpstream(_) => {
            StatusCode::SERVICE_UNAVAILABLE
        }
        VivaError::StoreUnavailable(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Convert a service error into an HTTP status + body. The message is the
/// human-readable Display text; provider error text is never echoed.
pub fn error_response(err: &VivaError) -> (StatusCode, serde_json::Value) {
    let mut body = serde_json::json!({
        "error": err.to_string(),
        "status": "error",
    });
    if let VivaError::RateLimited { retry_after_secs } = err {
        body["retry_after_secs"] = serde_json::json!(retry_after_secs);
    }
    (error_status(err), body)
}

fn require<'a>(field: &'a Option<String>, name: &str) -> Result<&'a str, VivaError> {
    match field.as_deref().map(str::trim) {
        Some(value) if !value.is_empty() => Ok(value),
        _ => Err(VivaError::Validation(format!("{name} field is required"))),
    }
}

fn to_json<T: serde::Serialize>(value: &T) -> serde_json::Value {
    serde_json::to_value(value).unwrap_or_else(|_| serde_json::json!({}))
}

// ============================================================================
// Inner (directly testable) business logic functions
// ============================================================================

/// Inner health check — probes the store and returns (status_code, json_body).
pub async fn health_inner(store: &dyn SessionStore) -> (StatusCode, serde_json::Value) {
    match store.resume("health-probe").await {
        Ok(_) => (
            StatusCode::OK,
            serde_json::json!({
                "status": "healthy",
                "version": env!("CARGO_PKG_VERSION"),
            }),
        ),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            serde_json::json!({
                "status": "unhealthy",
                "error": e.to_string(),
            }),
        ),
    }
}

/// Inner version — returns version info (pure, no IO).
pub fn version_inner() -> serde_json::Value {
    serde_json::json!({
        "version": env!("CARGO_PKG_VERSION"),
        "protocol": "viva/1",
    })
}

pub async fn resume_inner(
    orchestrator: &InterviewOrchestrator,
    req: StageResumeRequest,
) -> (StatusCode, serde_json::Value) {
    let result = async {
        let identity = require(&req.identity, "identity")?;
        let resume_text = require(&req.resume_text, "resume_text")?;
        orchestrator.stage_resume(identity, resume_text).await
    }
    .await;

    match result {
        Ok(()) => (StatusCode::OK, serde_json::json!({"staged": true})),
        Err(e) => error_response(&e),
    }
}

pub async fn start_inner(
    orchestrator: &InterviewOrchestrator,
    req: IdentityRequest,
) -> (StatusCode, serde_json::Value) {
    let result = async {
        let identity = require(&req.identity, "identity")?;
        orchestrator.start(identity).await
    }
    .await;

    match result {
        Ok(outcome) => (StatusCode::OK, to_json(&outcome)),
        Err(e) => error_response(&e),
    }
}

pub async fn next_inner(
    orchestrator: &InterviewOrchestrator,
    req: NextRequest,
) -> (StatusCode, serde_json::Value) {
    let result = async {
        let identity = require(&req.identity, "identity")?;
        let answer = require(&req.answer, "answer")?;
        orchestrator.next(identity, answer).await
    }
    .await;

    match result {
        Ok(outcome) => (StatusCode::OK, to_json(&outcome)),
        Err(e) => error_response(&e),
    }
}

pub async fn end_inner(
    orchestrator: &InterviewOrchestrator,
    req: IdentityRequest,
) -> (StatusCode, serde_json::Value) {
    let result = async {
        let identity = require(&req.identity, "identity")?;
        orchestrator.end(identity).await
    }
    .await;

    match result {
        Ok(outcome) => (StatusCode::OK, to_json(&outcome)),
        Err(e) => error_response(&e),
    }
}

pub async fn active_inner(
    orchestrator: &InterviewOrchestrator,
    query: ActiveQuery,
) -> (StatusCode, serde_json::Value) {
    let result = async {
        let identity = require(&query.identity, "identity")?;
        orchestrator.active(identity).await
    }
    .await;

    match result {
        Ok(outcome) => (StatusCode::OK, to_json(&outcome)),
        Err(e) => error_response(&e),
    }
}

pub async fn reset_inner(
    orchestrator: &InterviewOrchestrator,
    req: IdentityRequest,
) -> (StatusCode, serde_json::Value) {
    let result = async {
        let identity = require(&req.identity, "identity")?;
        orchestrator.reset(identity).await
    }
    .await;

    match result {
        Ok(outcome) => (StatusCode::OK, to_json(&outcome)),
        Err(e) => error_response(&e),
    }
}

// ============================================================================
// Axum handler wrappers (thin — delegate to inner functions)
// ============================================================================

pub async fn health_handler(State(state): State<Arc<HttpState>>) -> impl IntoResponse {
    let (status, body) = health_inner(state.store.as_ref()).await;
    (status, Json(body))
}

pub async fn version_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(version_inner()))
}

pub async fn resume_handler(
    State(state): State<Arc<HttpState>>,
    Json(req): Json<StageResumeRequest>,
) -> impl IntoResponse {
    let (status, body) = resume_inner(&state.orchestrator, req).await;
    (status, Json(body))
}

pub async fn start_handler(
    State(state): State<Arc<HttpState>>,
    Json(req): Json<IdentityRequest>,
) -> impl IntoResponse {
    let (status, body) = start_inner(&state.orchestrator, req).await;
    (status, Json(body))
}

pub async fn next_handler(
    State(state): State<Arc<HttpState>>,
    Json(req): Json<NextRequest>,
) -> impl IntoResponse {
    let (status, body) = next_inner(&state.orchestrator, req).await;
    (status, Json(body))
}

pub async fn end_handler(
    State(state): State<Arc<HttpState>>,
    Json(req): Json<IdentityRequest>,
) -> impl IntoResponse {
    let (status, body) = end_inner(&state.orchestrator, req).await;
    (status, Json(body))
}

pub async fn active_handler(
    State(state): State<Arc<HttpState>>,
    Query(query): Query<ActiveQuery>,
) -> impl IntoResponse {
    let (status, body) = active_inner(&state.orchestrator, query).await;
    (status, Json(body))
}

pub async fn reset_handler(
    State(state): State<Arc<HttpState>>,
    Json(req): Json<IdentityRequest>,
) -> impl IntoResponse {
    let (status, body) = reset_inner(&state.orchestrator, req).await;
    (status, Json(body))
}

// ============================================================================
// Unit Tests — call inner functions directly
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::Duration;
    use viva_core::config::InterviewConfig;
    use viva_core::model::{GenerateOptions, ModelError, TextGenerator};
    use viva_core::store::MemoryStore;

    struct ScriptedModel {
        replies: Mutex<VecDeque<Result<String, ModelError>>>,
    }

    #[async_trait]
    impl TextGenerator for ScriptedModel {
        async fn generate(
            &self,
            _prompt: &str,
            _opts: &GenerateOptions,
        ) -> Result<String, ModelError> {
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Err(ModelError::Fatal("script exhausted".to_string())))
        }
    }

    fn make_state(replies: Vec<Result<String, ModelError>>) -> (Arc<MemoryStore>, HttpState) {
        let store = Arc::new(MemoryStore::new());
        let model = Arc::new(ScriptedModel {
            replies: Mutex::new(replies.into_iter().collect()),
        });
        let orchestrator = Arc::new(InterviewOrchestrator::new(
            store.clone(),
            model,
            InterviewConfig::default(),
            GenerateOptions {
                model: "gemini-1.5-pro".to_string(),
                max_retries: 1,
                initial_delay: Duration::from_millis(1),
            },
        ));
        (
            store.clone(),
            HttpState {
                orchestrator,
                store,
            },
        )
    }

    #[test]
    fn test_version_inner_pure() {
        let v = version_inner();
        assert!(v["version"].is_string(), "version must be string");
        assert_eq!(v["protocol"], "viva/1", "protocol must be viva/1");
    }

    #[tokio::test]
    async fn test_health_inner_ok() {
        let (_, state) = make_state(vec![]);
        let (status, body) = health_inner(state.store.as_ref()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
    }

    #[tokio::test]
    async fn test_start_inner_missing_identity() {
        let (_, state) = make_state(vec![]);
        let (status, body) = start_inner(
            &state.orchestrator,
            IdentityRequest { identity: None },
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["status"], "error");
        assert!(body["error"].is_string());
    }

    #[tokio::test]
    async fn test_start_inner_without_resume_is_400() {
        let (_, state) = make_state(vec![Ok("q?".to_string())]);
        let (status, body) = start_inner(
            &state.orchestrator,
            IdentityRequest {
                identity: Some("alice".to_string()),
            },
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(
            body["error"].as_str().unwrap().contains("resume"),
            "message should point at the missing resume: {body}"
        );
    }

    #[tokio::test]
    async fn test_start_inner_happy_path() {
        let (store, state) = make_state(vec![Ok("Tell me about your last project.".to_string())]);
        store
            .stage_resume("alice", "resume text", Duration::from_secs(60))
            .await
            .unwrap();

        let (status, body) = start_inner(
            &state.orchestrator,
            IdentityRequest {
                identity: Some("alice".to_string()),
            },
        )
        .await;
        assert_eq!(status, StatusCode::OK, "body: {body}");
        assert_eq!(body["question"], "Tell me about your last project.");
        assert!(body["session_id"].is_string());
    }

    #[tokio::test]
    async fn test_next_inner_unknown_session_is_404() {
        let (_, state) = make_state(vec![]);
        let (status, _) = next_inner(
            &state.orchestrator,
            NextRequest {
                identity: Some("ghost".to_string()),
                answer: Some("A long enough answer here.".to_string()),
            },
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_next_inner_rate_limited_maps_to_429() {
        let (store, state) = make_state(vec![
            Ok(r#"{"correctness": 5, "clarity": 5, "confidence": 5, "overall_feedback": "ok"}"#
                .to_string()),
            Err(ModelError::RateLimited("quota".to_string())),
        ]);
        store
            .stage_resume("bob", "resume", Duration::from_secs(60))
            .await
            .unwrap();
        let record = viva_core::models::SessionRecord::new("resume", "Q?");
        store
            .create("bob", &record, Duration::from_secs(60))
            .await
            .unwrap();

        let (status, body) = next_inner(
            &state.orchestrator,
            NextRequest {
                identity: Some("bob".to_string()),
                answer: Some("An answer of reasonable length.".to_string()),
            },
        )
        .await;
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
        assert!(body["retry_after_secs"].is_number());
    }

    #[tokio::test]
    async fn test_active_inner_reports_absence() {
        let (_, state) = make_state(vec![]);
        let (status, body) = active_inner(
            &state.orchestrator,
            ActiveQuery {
                identity: Some("nobody".to_string()),
            },
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["has_active_session"], false);
        assert!(body.get("current_question").is_none());
    }

    #[tokio::test]
    async fn test_error_response_shapes() {
        let (status, body) = error_response(&VivaError::SessionNotFound);
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["status"], "error");

        let (status, _) = error_response(&VivaError::ResetExhausted);
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, _) = error_response(&VivaError::StoreUnavailable("down".to_string()));
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);

        let (status, _) = error_response(&VivaError::ModelUnavailable("x".to_string()));
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }
}
