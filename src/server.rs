//! JSON HTTP server.
//!
//! Exposes the pipeline over HTTP for UIs and scripts.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Health check (returns version) |
//! | `GET`  | `/documents` | Indexed documents with chunk counts |
//! | `POST` | `/ingest` | Ingest base64-encoded PDFs |
//! | `POST` | `/answer` | Answer a query with citations |
//! | `DELETE` | `/documents/{id}` | Remove a document's entries |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "query must not be empty" } }
//! ```
//!
//! Error codes: `bad_request` (400), `dimension_mismatch` (500),
//! `unavailable` (503), `internal` (500).
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted to support browser-based
//! upload forms.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use crate::error::{EmbeddingError, IndexError, PipelineError};
use crate::index::SearchFilter;
use crate::models::{Answer, Document, DocumentSummary, IngestReport};
use crate::pipeline::{AnswerRequest, Pipeline};

#[derive(Clone)]
struct AppState {
    pipeline: Arc<Pipeline>,
}

/// Build the router. Exposed so tests can serve it on an ephemeral port.
pub fn router(pipeline: Arc<Pipeline>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/documents", get(handle_documents))
        .route("/documents/{id}", delete(handle_delete))
        .route("/ingest", post(handle_ingest))
        .route("/answer", post(handle_answer))
        .layer(cors)
        .with_state(AppState { pipeline })
}

/// Serve on `[server].bind` until the process is terminated.
pub async fn run_server(pipeline: Arc<Pipeline>) -> anyhow::Result<()> {
    let bind_addr = pipeline.config().server.bind.clone();
    let app = router(pipeline);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!(addr = %bind_addr, "listening");
    println!("lexrag listening on http://{}", bind_addr);
    axum::serve(listener, app).await?;

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
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

impl From<PipelineError> for AppError {
    fn from(err: PipelineError) -> Self {
        let (status, code) = match &err {
            PipelineError::Index(IndexError::DimensionMismatch { .. }) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "dimension_mismatch")
            }
            PipelineError::Index(IndexError::Unavailable(_))
            | PipelineError::Embedding(EmbeddingError::Unavailable(_))
            | PipelineError::Embedding(EmbeddingError::Timeout(_)) => {
                (StatusCode::SERVICE_UNAVAILABLE, "unavailable")
            }
            _ => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
        };
        AppError {
            status,
            code: code.to_string(),
            message: err.to_string(),
        }
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ GET /documents ============

#[derive(Serialize)]
struct DocumentsResponse {
    documents: Vec<DocumentSummary>,
}

async fn handle_documents(State(state): State<AppState>) -> Result<Json<DocumentsResponse>, AppError> {
    let documents = state.pipeline.documents().await?;
    Ok(Json(DocumentsResponse { documents }))
}

// ============ DELETE /documents/{id} ============

#[derive(Serialize)]
struct DeleteResponse {
    deleted: usize,
}

async fn handle_delete(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<DeleteResponse>, AppError> {
    let deleted = state.pipeline.delete_document(&id).await?;
    Ok(Json(DeleteResponse { deleted }))
}

// ============ POST /ingest ============

#[derive(Deserialize)]
struct IngestRequest {
    documents: Vec<UploadedDocument>,
}

#[derive(Deserialize)]
struct UploadedDocument {
    filename: String,
    content_base64: String,
    #[serde(default)]
    document_id: Option<String>,
}

async fn handle_ingest(
    State(state): State<AppState>,
    Json(req): Json<IngestRequest>,
) -> Result<Json<IngestReport>, AppError> {
    if req.documents.is_empty() {
        return Err(bad_request("documents must not be empty"));
    }

    let mut documents = Vec::with_capacity(req.documents.len());
    for upload in req.documents {
        if upload.filename.trim().is_empty() {
            return Err(bad_request("filename must not be empty"));
        }
        let bytes = STANDARD
            .decode(upload.content_base64.trim())
            .map_err(|e| bad_request(format!("{}: invalid base64: {}", upload.filename, e)))?;
        documents.push(match upload.document_id {
            Some(id) => Document::with_id(id, upload.filename, bytes),
            None => Document::new(upload.filename, bytes),
        });
    }

    let report = state.pipeline.ingest(documents).await?;
    Ok(Json(report))
}

// ============ POST /answer ============

#[derive(Deserialize)]
struct AnswerBody {
    query: String,
    #[serde(default)]
    k: Option<usize>,
    #[serde(default)]
    document_ids: Vec<String>,
    #[serde(default)]
    page: Option<u32>,
}

async fn handle_answer(
    State(state): State<AppState>,
    Json(body): Json<AnswerBody>,
) -> Result<Json<Answer>, AppError> {
    if body.query.trim().is_empty() {
        return Err(bad_request("query must not be empty"));
    }
    if body.k == Some(0) {
        return Err(bad_request("k must be at least 1"));
    }

    let request = AnswerRequest {
        query: body.query,
        k: body.k,
        filter: SearchFilter {
            document_ids: body.document_ids,
            page: body.page,
        },
    };
    let answer = state
        .pipeline
        .answer_request(request, &CancellationToken::new())
        .await?;
    Ok(Json(answer))
}
