//! HTTP chat server.
//!
//! A thin JSON transport over [`Pipeline::try_answer`]. The pipeline is
//! shared across requests; the first `/chat` call initializes it unless the
//! server was started with `--warm`.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/chat` | `{"query": "..."}` → `{"response": "..."}` |
//! | `GET`  | `/health` | Status, version, and pipeline state |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "query is required" } }
//! ```
//!
//! Error codes: `bad_request` (400), `initialization_failed` (500),
//! `retrieval_failed` (500), `generation_failed` (500).
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted so browser front-ends can
//! call the API directly.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use crate::error::RagError;
use crate::pipeline::{Pipeline, PipelineState};

/// Build the router. Exposed separately from [`run_server`] so tests can
/// serve it on an ephemeral port.
pub fn router(pipeline: Arc<Pipeline>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/chat", post(handle_chat))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(pipeline)
}

/// Serve the router on `bind` until the process is terminated.
pub async fn run_server(pipeline: Arc<Pipeline>, bind: &str) -> anyhow::Result<()> {
    let listener = TcpListener::bind(bind).await?;
    serve(pipeline, listener).await
}

/// Serve on an already-bound listener.
pub async fn serve(pipeline: Arc<Pipeline>, listener: TcpListener) -> anyhow::Result<()> {
    let addr: SocketAddr = listener.local_addr()?;
    info!(%addr, "chat server listening");
    println!("finrag listening on http://{}", addr);
    axum::serve(listener, router(pipeline)).await?;
    Ok(())
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code.to_string(),
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<RagError> for AppError {
    fn from(err: RagError) -> Self {
        let (status, code) = match &err {
            RagError::EmptyQuery => (StatusCode::BAD_REQUEST, "bad_request"),
            RagError::Initialization(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "initialization_failed")
            }
            RagError::Retrieval(_) => (StatusCode::INTERNAL_SERVER_ERROR, "retrieval_failed"),
            RagError::Generation(_) => (StatusCode::INTERNAL_SERVER_ERROR, "generation_failed"),
        };
        AppError {
            status,
            code,
            message: err.to_string(),
        }
    }
}

// ============ POST /chat ============

#[derive(Deserialize)]
struct ChatRequest {
    #[serde(default)]
    query: String,
}

#[derive(Serialize)]
struct ChatResponse {
    response: String,
}

async fn handle_chat(
    State(pipeline): State<Arc<Pipeline>>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, AppError> {
    let response = pipeline.try_answer(&request.query).await?;
    Ok(Json(ChatResponse { response }))
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
    pipeline: PipelineState,
}

async fn handle_health(State(pipeline): State<Arc<Pipeline>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        pipeline: pipeline.state(),
    })
}
