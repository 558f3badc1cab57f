//! HTTP search API.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/search` | Hybrid search with filters and pagination |
//! | `GET` | `/search/facets` | Index-wide facet counts |
//! | `POST` | `/search/rebuild` | Rebuild the index from the source tables |
//! | `GET` | `/search/stats` | Record totals per object type |
//! | `POST` | `/search/items` | Upsert one index record |
//! | `DELETE` | `/search/items/{objectType}/{objectId}` | Remove a record |
//! | `GET` | `/health` | Health check (returns version) |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "unknown variant `2weeks`" } }
//! ```
//!
//! Error codes: `bad_request` (400), `not_found` (404), `internal` (500).
//! Request bodies are read as raw bytes and parsed here, so a body that is
//! not JSON gets the same error shape as one with invalid fields.
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted so ERP front-ends on
//! other origins can call the API directly.

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::{Any, CorsLayer};

use erp_search_core::embedding::EmbeddingProvider;
use erp_search_core::facets::{get_facets, get_stats, IndexFacets, IndexStats};
use erp_search_core::models::{IndexRecord, ObjectType, SearchResponse};
use erp_search_core::projection::{InvalidRecord, ProjectionBuilder};
use erp_search_core::search::{search, SearchParams, SearchRequest};

use crate::config::Config;
use crate::db;
use crate::embedding::create_provider;
use crate::sources::SqliteSources;
use crate::sqlite_store::SqliteIndexStore;

/// Shared application state passed to all route handlers.
#[derive(Clone)]
struct AppState {
    store: Arc<SqliteIndexStore>,
    sources: Arc<SqliteSources>,
    provider: Option<Arc<dyn EmbeddingProvider>>,
    params: Arc<SearchParams>,
}

/// Start the HTTP server on `[server].bind` and run until the process exits.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let pool = db::connect(config).await?;
    let provider: Option<Arc<dyn EmbeddingProvider>> =
        create_provider(&config.embedding)?.map(Arc::from);

    let state = AppState {
        store: Arc::new(SqliteIndexStore::new(pool.clone())),
        sources: Arc::new(SqliteSources::new(pool)),
        provider,
        params: Arc::new(config.search_params()),
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/search", post(handle_search))
        .route("/search/facets", get(handle_facets))
        .route("/search/rebuild", post(handle_rebuild))
        .route("/search/stats", get(handle_stats))
        .route("/search/items", post(handle_upsert_item))
        .route(
            "/search/items/{object_type}/{object_id}",
            delete(handle_remove_item),
        )
        .route("/health", get(handle_health))
        .fallback(handle_not_found)
        .layer(cors)
        .with_state(state);

    let bind_addr = &config.server.bind;
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    tracing::info!(bind = %bind_addr, "search server started");
    println!("ERP search server listening on http://{}", bind_addr);

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

/// Error type that converts into a JSON HTTP response.
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

fn not_found(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_found".to_string(),
        message: message.into(),
    }
}

fn internal(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal".to_string(),
        message: message.into(),
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        if let Some(invalid) = err.downcast_ref::<InvalidRecord>() {
            return bad_request(invalid.to_string());
        }
        tracing::error!(error = %err, "request failed");
        internal(format!("{:#}", err))
    }
}

/// Parse a JSON request body, mapping any failure to `bad_request`.
fn parse_body<T: DeserializeOwned>(body: &[u8], what: &str) -> Result<T, AppError> {
    serde_json::from_slice(body).map_err(|e| bad_request(format!("invalid {}: {}", what, e)))
}

async fn handle_not_found(uri: axum::http::Uri) -> AppError {
    not_found(format!("no route for {}", uri.path()))
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

// ============ POST /search ============

#[derive(Serialize)]
struct SearchReply {
    #[serde(flatten)]
    response: SearchResponse,
    #[serde(rename = "durationMs")]
    duration_ms: u64,
}

/// Handler for `POST /search`.
///
/// Malformed JSON and bad filters (e.g. an unknown `dateRange`) both
/// produce the standard `bad_request` error body.
async fn handle_search(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<SearchReply>, AppError> {
    let req: SearchRequest = parse_body(&body, "search request")?;

    let started = Instant::now();
    let outcome = search(
        state.store.as_ref(),
        state.provider.as_deref(),
        &req,
        &state.params,
        Utc::now(),
    )
    .await;
    let duration_ms = started.elapsed().as_millis() as u64;

    match outcome {
        Ok(outcome) => {
            tracing::info!(
                query = %req.query,
                total = outcome.total_count,
                semantic_matches = outcome.semantic_matches,
                duration_ms,
                "search"
            );
            Ok(Json(SearchReply {
                response: outcome.into_response(),
                duration_ms,
            }))
        }
        Err(e) => {
            tracing::error!(query = %req.query, duration_ms, error = %e, "search failed");
            Err(internal(format!("search failed: {:#}", e)))
        }
    }
}

// ============ GET /search/facets, GET /search/stats ============

async fn handle_facets(State(state): State<AppState>) -> Result<Json<IndexFacets>, AppError> {
    Ok(Json(get_facets(state.store.as_ref()).await?))
}

async fn handle_stats(State(state): State<AppState>) -> Result<Json<IndexStats>, AppError> {
    Ok(Json(get_stats(state.store.as_ref()).await?))
}

// ============ POST /search/rebuild ============

#[derive(Serialize)]
struct RebuildReply {
    success: bool,
    count: usize,
    embedded: usize,
}

async fn handle_rebuild(State(state): State<AppState>) -> Result<Json<RebuildReply>, AppError> {
    let builder = ProjectionBuilder::new(state.store.as_ref(), state.provider.as_deref());
    let report = builder.rebuild_index(state.sources.as_ref()).await?;
    Ok(Json(RebuildReply {
        success: true,
        count: report.count,
        embedded: report.embedded,
    }))
}

// ============ /search/items ============

#[derive(Serialize)]
struct UpsertReply {
    success: bool,
    id: String,
}

async fn handle_upsert_item(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<UpsertReply>, AppError> {
    let record: IndexRecord = parse_body(&body, "index record")?;

    let builder = ProjectionBuilder::new(state.store.as_ref(), state.provider.as_deref());
    let saved = builder.update_item(record).await?;
    Ok(Json(UpsertReply {
        success: true,
        id: saved.id,
    }))
}

#[derive(Serialize)]
struct RemoveReply {
    success: bool,
    removed: u64,
}

async fn handle_remove_item(
    State(state): State<AppState>,
    Path((object_type, object_id)): Path<(String, String)>,
) -> Result<Json<RemoveReply>, AppError> {
    let object_type: ObjectType = object_type
        .parse()
        .map_err(|e: anyhow::Error| bad_request(e.to_string()))?;

    let builder = ProjectionBuilder::new(state.store.as_ref(), state.provider.as_deref());
    let removed = builder.remove_item(object_type, &object_id).await?;
    Ok(Json(RemoveReply {
        success: true,
        removed,
    }))
}
