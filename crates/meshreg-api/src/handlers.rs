//! REST API handlers.
//!
//! Each handler calls into `RegistryService` and returns JSON responses.
//! Failures are returned as a normal response carrying `{code, message}`.

use axum::Json;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde::{Deserialize, Serialize};

use meshreg_state::{AgentRegistration, ErrorCode, GatewayRegistration};

use crate::ApiState;
use crate::error::{ApiError, ApiResult};

/// Response wrapper for consistent API format.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ApiError>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data: Some(data),
            error: None,
        })
    }

    pub fn err(error: ApiError) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error),
        }
    }
}

// ── Registration ───────────────────────────────────────────────

/// Gateway registration body. An absent region means the default one.
#[derive(Debug, Deserialize)]
pub struct RegisterGatewayRequest {
    #[serde(default)]
    pub region: String,
    #[serde(flatten)]
    pub gateway: GatewayRegistration,
}

/// Agent registration body.
#[derive(Debug, Deserialize)]
pub struct RegisterAgentRequest {
    #[serde(default)]
    pub region: String,
    #[serde(flatten)]
    pub agent: AgentRegistration,
}

/// Run a registry write off the async workers; appends block on disk.
async fn blocking<T, F>(f: F) -> ApiResult<T>
where
    F: FnOnce() -> ApiResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ApiError::new(ErrorCode::Internal, format!("registry task failed: {e}")))?
}

/// POST /api/v1/gateways
pub async fn register_gateway(
    State(state): State<ApiState>,
    body: Result<Json<RegisterGatewayRequest>, JsonRejection>,
) -> impl IntoResponse {
    let Json(req) = match body {
        Ok(body) => body,
        Err(rejection) => return ApiError::from(rejection).into_response(),
    };
    match blocking(move || state.service.register_gateway(&req.region, req.gateway)).await {
        Ok(record) => (StatusCode::CREATED, ApiResponse::ok(record)).into_response(),
        Err(e) => e.into_response(),
    }
}

/// POST /api/v1/agents
pub async fn register_agent(
    State(state): State<ApiState>,
    body: Result<Json<RegisterAgentRequest>, JsonRejection>,
) -> impl IntoResponse {
    let Json(req) = match body {
        Ok(body) => body,
        Err(rejection) => return ApiError::from(rejection).into_response(),
    };
    match blocking(move || state.service.register_agent(&req.region, req.agent)).await {
        Ok(binding) => (StatusCode::CREATED, ApiResponse::ok(binding)).into_response(),
        Err(e) => e.into_response(),
    }
}

// ── Lookup ─────────────────────────────────────────────────────

/// Query string of the top-K listing.
#[derive(Debug, Default, Deserialize)]
pub struct TopQuery {
    pub k: Option<usize>,
}

/// GET /api/v1/regions/{region}/gateways?k=N
pub async fn list_top_gateways(
    State(state): State<ApiState>,
    Path(region): Path<String>,
    query: Result<Query<TopQuery>, QueryRejection>,
) -> impl IntoResponse {
    let Query(query) = match query {
        Ok(query) => query,
        Err(rejection) => return ApiError::from(rejection).into_response(),
    };
    match state.service.list_top_gateways(&region, query.k) {
        Ok(gateways) => ApiResponse::ok(gateways).into_response(),
        Err(e) => e.into_response(),
    }
}

/// GET /api/v1/regions/{region}/resolve/{key}
pub async fn resolve_for_proxy(
    State(state): State<ApiState>,
    Path((region, key)): Path<(String, String)>,
) -> impl IntoResponse {
    match state.service.resolve_gateway_for_proxy(&region, &key) {
        Ok(resolution) => ApiResponse::ok(resolution).into_response(),
        Err(e) => e.into_response(),
    }
}

/// GET /api/v1/regions
pub async fn list_regions(State(state): State<ApiState>) -> impl IntoResponse {
    ApiResponse::ok(state.service.regions())
}

// ── Health ─────────────────────────────────────────────────────

/// GET /healthz
pub async fn healthz() -> impl IntoResponse {
    ApiResponse::ok(serde_json::json!({ "status": "ok" }))
}
