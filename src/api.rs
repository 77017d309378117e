use axum::{
    extract::{Json, Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use serde_json::json;
use tracing::{error, info};

use crate::{
    app_state::AppState,
    error::RagError,
    models::{
        Article, CorpusStats, EngineInfo, HealthResponse, RagResponse, SearchResponse,
        SimilarArticles, DEFAULT_MAX_ARTICLES,
    },
};

type ApiError = (StatusCode, Json<serde_json::Value>);

// --- Payloads ---

#[derive(Deserialize)]
pub struct ChatPayload {
    #[serde(default)]
    query: String,
    max_articles: Option<i64>,
}

#[derive(Deserialize)]
pub struct SearchPayload {
    #[serde(default)]
    query: String,
    n_results: Option<i64>,
}

#[derive(Deserialize)]
pub struct SimilarParams {
    n_results: Option<i64>,
}

// --- Router ---

pub fn create_router(app_state: AppState) -> Router {
    Router::new()
        .route("/api/chat", post(chat_handler))
        .route("/api/search", post(search_handler))
        .route("/api/rag/info", get(rag_info_handler))
        .route("/api/health", get(health_handler))
        .route("/api/articles/:id", get(article_handler))
        .route("/api/similar/:id", get(similar_handler))
        .route("/api/stats", get(stats_handler))
        .route("/api/admin/reload", post(reload_handler))
        .with_state(app_state)
}

fn api_error(err: RagError) -> ApiError {
    let status = match &err {
        RagError::Validation(_) => StatusCode::BAD_REQUEST,
        RagError::ArticleNotFound(_) => StatusCode::NOT_FOUND,
        RagError::CorpusUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        RagError::EmbeddingFailure(_)
        | RagError::GenerationTimeout(_)
        | RagError::GenerationUnavailable(_) => StatusCode::BAD_GATEWAY,
        RagError::InvalidCorpus(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status.is_server_error() {
        error!("Error atendiendo la petición: {err}");
    }
    (status, Json(json!({ "error": err.to_string() })))
}

// --- Handlers ---

#[axum::debug_handler]
async fn chat_handler(
    State(state): State<AppState>,
    Json(payload): Json<ChatPayload>,
) -> Result<Json<RagResponse>, ApiError> {
    state
        .engine
        .answer(&payload.query, payload.max_articles.unwrap_or(DEFAULT_MAX_ARTICLES))
        .await
        .map(Json)
        .map_err(api_error)
}

#[axum::debug_handler]
async fn search_handler(
    State(state): State<AppState>,
    Json(payload): Json<SearchPayload>,
) -> Result<Json<SearchResponse>, ApiError> {
    state
        .engine
        .search(&payload.query, payload.n_results.unwrap_or(DEFAULT_MAX_ARTICLES))
        .await
        .map(Json)
        .map_err(api_error)
}

#[axum::debug_handler]
async fn rag_info_handler(State(state): State<AppState>) -> Json<EngineInfo> {
    Json(state.engine.info())
}

#[axum::debug_handler]
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let ready = state.engine.is_ready();
    Json(HealthResponse {
        status: "ok".to_string(),
        database_ready: ready,
        total_articles: state.engine.total_articles(),
        rag_enabled: Some(ready),
        llm_provider: ready.then(|| state.engine.provider_name().to_string()),
    })
}

#[axum::debug_handler]
async fn article_handler(
    State(state): State<AppState>,
    Path(id): Path<u32>,
) -> Result<Json<Article>, ApiError> {
    state.engine.article(id).map(Json).map_err(api_error)
}

#[axum::debug_handler]
async fn similar_handler(
    State(state): State<AppState>,
    Path(id): Path<u32>,
    Query(params): Query<SimilarParams>,
) -> Result<Json<SimilarArticles>, ApiError> {
    state
        .engine
        .similar(id, params.n_results.unwrap_or(DEFAULT_MAX_ARTICLES))
        .map(Json)
        .map_err(api_error)
}

#[axum::debug_handler]
async fn stats_handler(State(state): State<AppState>) -> Result<Json<CorpusStats>, ApiError> {
    state.engine.stats().map(Json).map_err(api_error)
}

#[axum::debug_handler]
async fn reload_handler(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, ApiError> {
    info!("Petición de recarga del corpus recibida.");
    match state.engine.reload().await {
        Ok(summary) => Ok(Json(json!({
            "message": summary.to_string(),
            "total_articles": summary.articles_loaded,
            "from_cache": summary.from_cache,
        }))),
        Err(e) => {
            error!("Error recargando el corpus: {e:#}");
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": format!("Error al recargar el corpus: {e}") })),
            ))
        }
    }
}
