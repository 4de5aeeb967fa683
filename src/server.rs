//! HTTP surface: `/assistant/chat`, `/assistant/sync`, `/assistant/recommend`, `/health`.
//!
//! Handlers hop onto the blocking pool for the synchronous pipeline. Degraded
//! stages never surface here; only the errors [`Assistant`] returns become a
//! 500 with a `{detail}` body.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;

use crate::assistant::Assistant;
use crate::config::AssistantConfig;
use crate::error::AssistError;

const MAX_RECOMMENDATIONS: usize = 50;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Assist(#[from] AssistError),

    #[error("background task failed: {0}")]
    Task(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let Self::Assist(e) = &self {
            tracing::error!(kind = e.kind(), error = %e, "request failed");
        } else {
            tracing::error!(error = %self, "request failed");
        }
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "detail": self.to_string() })),
        )
            .into_response()
    }
}

#[derive(Clone)]
struct AppState {
    assistant: Arc<Assistant>,
    recommendation_limit: usize,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChatRequest {
    seller_id: i64,
    message: String,
    customer_id: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
struct SyncRequest {
    #[serde(default)]
    force: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RecommendRequest {
    customer_id: Option<i64>,
    limit: Option<usize>,
}

async fn blocking<T, F>(f: F) -> Result<T, ApiError>
where
    F: FnOnce() -> Result<T, AssistError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ApiError::Task(e.to_string()))?
        .map_err(ApiError::from)
}

async fn chat(
    State(state): State<AppState>,
    Json(req): Json<ChatRequest>,
) -> Result<Json<Value>, ApiError> {
    let assistant = state.assistant.clone();
    let reply = blocking(move || assistant.chat(req.seller_id, &req.message, req.customer_id)).await?;
    Ok(Json(json!({ "answer": reply.answer })))
}

async fn synchronize(
    State(state): State<AppState>,
    body: Option<Json<SyncRequest>>,
) -> Result<Json<Value>, ApiError> {
    let force = body.map(|Json(b)| b.force).unwrap_or(false);
    let assistant = state.assistant.clone();
    let summary = blocking(move || assistant.synchronize(force, &mut |_, _| {})).await?;

    Ok(Json(json!({
        "status": "ok",
        "customers": summary.customers,
        "products": summary.products,
        "embedded": summary.embedded,
        "detail": format!(
            "{} customers and {} products synchronized.",
            summary.customers, summary.products
        ),
    })))
}

async fn recommend(
    State(state): State<AppState>,
    body: Option<Json<RecommendRequest>>,
) -> Result<Json<Value>, ApiError> {
    let req = body.map(|Json(b)| b).unwrap_or_default();
    let limit = req
        .limit
        .unwrap_or(state.recommendation_limit)
        .clamp(1, MAX_RECOMMENDATIONS);
    let customer_id = req.customer_id;
    let assistant = state.assistant.clone();
    let recommendations = blocking(move || assistant.recommend(customer_id, limit)).await?;

    Ok(Json(json!({
        "customerId": customer_id,
        "recommendations": recommendations,
    })))
}

async fn health() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "service": "pos-assistant"
    }))
}

pub fn router(assistant: Arc<Assistant>, recommendation_limit: usize) -> Router {
    Router::new()
        .route("/assistant/chat", post(chat))
        .route("/assistant/sync", post(synchronize))
        .route("/assistant/recommend", post(recommend))
        .route("/health", get(health))
        .with_state(AppState {
            assistant,
            recommendation_limit,
        })
}

/// Serve on an already-bound listener until ctrl-c.
pub async fn serve_on(
    listener: tokio::net::TcpListener,
    assistant: Arc<Assistant>,
    recommendation_limit: usize,
) -> anyhow::Result<()> {
    axum::serve(listener, router(assistant, recommendation_limit))
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for ctrl-c");
                std::future::pending::<()>().await;
            }
            tracing::info!("shutting down HTTP server");
        })
        .await?;
    Ok(())
}

/// Build providers from config, check the stored embedding model, and serve.
pub async fn serve(config: AssistantConfig) -> anyhow::Result<()> {
    let bind_addr = format!("{}:{}", config.server.host, config.server.port);

    let assistant = Arc::new(Assistant::from_config(&config)?);
    {
        let assistant = assistant.clone();
        tokio::task::spawn_blocking(move || assistant.check_embedding_model()).await??;
    }
    tracing::info!(
        assistant_db = %assistant.databases().assistant.display(),
        store_db = %assistant.databases().store.display(),
        "stores configured"
    );

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!(addr = %bind_addr, "assistant listening at http://{bind_addr}");

    serve_on(listener, assistant, config.retrieval.recommendation_limit).await
}
