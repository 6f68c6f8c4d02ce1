//! meshreg-api — registry call surface and REST API.
//!
//! [`RegistryService`] is the only write path into the registry: it logs
//! each mutation to the WAL before applying it. The axum router exposes
//! the service as JSON over HTTP.
//!
//! # API Routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | POST | `/api/v1/gateways` | Register or update a gateway |
//! | POST | `/api/v1/agents` | Register or rebind an agent |
//! | GET | `/api/v1/regions` | List regions with record counts |
//! | GET | `/api/v1/regions/{region}/gateways?k=N` | Top-K ranked gateways |
//! | GET | `/api/v1/regions/{region}/resolve/{key}` | Resolve a gateway address or agent domain |
//! | GET | `/healthz` | Liveness |
//!
//! Every body is `{ "success": bool, "data"?: ..., "error"?: { "code", "message" } }`.

pub mod error;
pub mod handlers;
pub mod service;

use axum::Router;
use axum::routing::{get, post};

pub use error::{ApiError, ApiResult};
pub use service::{AgentBinding, DEFAULT_TOP_K, ProxyResolution, RegistryService};

/// Shared state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub service: RegistryService,
}

/// Build the complete API router.
pub fn build_router(service: RegistryService) -> Router {
    let api_state = ApiState { service };

    let api_routes = Router::new()
        .route("/gateways", post(handlers::register_gateway))
        .route("/agents", post(handlers::register_agent))
        .route("/regions", get(handlers::list_regions))
        .route("/regions/{region}/gateways", get(handlers::list_top_gateways))
        .route("/regions/{region}/resolve/{key}", get(handlers::resolve_for_proxy))
        .with_state(api_state);

    Router::new()
        .nest("/api/v1", api_routes)
        .route("/healthz", get(handlers::healthz))
}
