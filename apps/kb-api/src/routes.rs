use axum::{
	Json, Router,
	extract::{Path, Query, State},
	http::StatusCode,
	middleware,
	response::{IntoResponse, Response},
	routing::{get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{rate_limit::rate_limit_middleware, state::AppState};
use kb_service::{
	AddDocumentRequest, CacheResponseRequest, CacheStats, CachedResponse, CleanupReport,
	DocumentListResponse, DocumentResponse, Error, RateLimitStats, RefreshReport, SearchRequest,
	SearchResponse, SnapshotInfo, UpdateDocumentRequest,
};

#[derive(Debug, Serialize)]
struct HealthBody {
	status: &'static str,
	cached_documents: usize,
	cache_fresh: bool,
}

#[derive(Debug, Serialize)]
struct RootBody {
	service: &'static str,
	version: &'static str,
}

#[derive(Debug, Deserialize)]
struct ListQuery {
	limit: Option<u32>,
	offset: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct ResponseQuery {
	query: String,
}

#[derive(Debug, Serialize)]
struct CachedAck {
	cached: bool,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
	error_code: String,
	message: String,
}

#[derive(Debug)]
pub struct ApiError {
	status: StatusCode,
	error_code: String,
	message: String,
}
impl ApiError {
	fn new(status: StatusCode, error_code: impl Into<String>, message: impl Into<String>) -> Self {
		Self { status, error_code: error_code.into(), message: message.into() }
	}
}

impl From<Error> for ApiError {
	fn from(err: Error) -> Self {
		let message = err.to_string();

		match err.root() {
			Error::InvalidRequest { .. } => {
				ApiError::new(StatusCode::BAD_REQUEST, "INVALID_REQUEST", message)
			},
			Error::NotFound { .. } => ApiError::new(StatusCode::NOT_FOUND, "NOT_FOUND", message),
			Error::Provider { .. } => {
				tracing::error!(error = %message, "Embedding provider error.");

				ApiError::new(StatusCode::BAD_GATEWAY, "PROVIDER_ERROR", message)
			},
			Error::Storage { .. }
			| Error::UpstreamFetch { .. }
			| Error::DocumentOperation { .. } => {
				tracing::error!(error = %message, "Storage error.");

				ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, "STORAGE_ERROR", message)
			},
		}
	}
}

impl IntoResponse for ApiError {
	fn into_response(self) -> Response {
		let body = ErrorBody { error_code: self.error_code, message: self.message };

		(self.status, Json(body)).into_response()
	}
}

pub fn router(state: AppState) -> Router {
	Router::new()
		.route("/", get(root))
		.route("/health", get(health))
		.route("/v1/search", post(search))
		.route("/v1/documents", post(add_document).get(list_documents))
		.route(
			"/v1/documents/{document_id}",
			get(get_document).put(update_document).delete(delete_document),
		)
		.route("/v1/responses", get(cached_response).post(cache_response))
		.layer(middleware::from_fn_with_state(state.clone(), rate_limit_middleware))
		.with_state(state)
}

pub fn admin_router(state: AppState) -> Router {
	Router::new()
		.route("/v1/admin/cache/stats", get(response_cache_stats))
		.route("/v1/admin/cache/clear", post(clear_response_cache))
		.route("/v1/admin/cache/cleanup", post(cleanup_response_cache))
		.route("/v1/admin/documents/cache", get(snapshot_info))
		.route("/v1/admin/documents/refresh", post(refresh_snapshot))
		.route("/v1/admin/rate_limit/stats", get(rate_limit_stats))
		.with_state(state)
}

async fn root() -> Json<RootBody> {
	Json(RootBody { service: env!("CARGO_PKG_NAME"), version: kb_cli::VERSION })
}

async fn health(State(state): State<AppState>) -> Json<HealthBody> {
	let info = state.service.snapshot_info();

	Json(HealthBody {
		status: "ok",
		cached_documents: info.cached_documents,
		cache_fresh: info.cache_fresh,
	})
}

async fn search(
	State(state): State<AppState>,
	Json(payload): Json<SearchRequest>,
) -> Result<Json<SearchResponse>, ApiError> {
	let response = state.service.search(payload).await?;

	Ok(Json(response))
}

async fn add_document(
	State(state): State<AppState>,
	Json(payload): Json<AddDocumentRequest>,
) -> Result<(StatusCode, Json<DocumentResponse>), ApiError> {
	let response = state.service.add_document(payload).await?;

	Ok((StatusCode::CREATED, Json(response)))
}

async fn list_documents(
	State(state): State<AppState>,
	Query(query): Query<ListQuery>,
) -> Result<Json<DocumentListResponse>, ApiError> {
	let response = state.service.list_documents(query.limit, query.offset).await?;

	Ok(Json(response))
}

async fn get_document(
	State(state): State<AppState>,
	Path(document_id): Path<String>,
) -> Result<Json<Map<String, Value>>, ApiError> {
	let response = state.service.get_document(&document_id).await?;

	Ok(Json(response))
}

async fn update_document(
	State(state): State<AppState>,
	Path(document_id): Path<String>,
	Json(payload): Json<UpdateDocumentRequest>,
) -> Result<Json<DocumentResponse>, ApiError> {
	let response = state.service.update_document(&document_id, payload).await?;

	Ok(Json(response))
}

async fn delete_document(
	State(state): State<AppState>,
	Path(document_id): Path<String>,
) -> Result<Json<DocumentResponse>, ApiError> {
	let response = state.service.delete_document(&document_id).await?;

	Ok(Json(response))
}

async fn cached_response(
	State(state): State<AppState>,
	Query(query): Query<ResponseQuery>,
) -> Result<Json<CachedResponse>, ApiError> {
	let response = state.service.cached_response(&query.query)?;

	if !response.cached {
		return Err(ApiError::new(
			StatusCode::NOT_FOUND,
			"NOT_FOUND",
			"No cached response for this query.",
		));
	}

	Ok(Json(response))
}

async fn cache_response(
	State(state): State<AppState>,
	Json(payload): Json<CacheResponseRequest>,
) -> Result<Json<CachedAck>, ApiError> {
	state.service.cache_response(payload)?;

	Ok(Json(CachedAck { cached: true }))
}

async fn response_cache_stats(State(state): State<AppState>) -> Json<CacheStats> {
	Json(state.service.response_cache_stats())
}

async fn clear_response_cache(State(state): State<AppState>) -> Json<CacheStats> {
	Json(state.service.clear_response_cache())
}

async fn cleanup_response_cache(State(state): State<AppState>) -> Json<CleanupReport> {
	Json(state.service.cleanup_response_cache())
}

async fn snapshot_info(State(state): State<AppState>) -> Json<SnapshotInfo> {
	Json(state.service.snapshot_info())
}

async fn refresh_snapshot(State(state): State<AppState>) -> Json<RefreshReport> {
	Json(state.service.refresh_snapshot().await)
}

async fn rate_limit_stats(State(state): State<AppState>) -> Json<RateLimitStats> {
	Json(state.rate_limiter.stats())
}
