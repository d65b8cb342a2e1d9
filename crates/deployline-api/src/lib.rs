//! deployline-api — REST control plane for Deployline.
//!
//! # API Routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | GET | `/api/v1/aliases` | List aliases |
//! | POST | `/api/v1/aliases` | Create an alias |
//! | GET | `/api/v1/aliases/{name}` | Get alias routing |
//! | GET | `/api/v1/rollouts` | Latest rollout per alias |
//! | POST | `/api/v1/rollouts/{alias}` | Start a canary rollout |
//! | GET | `/api/v1/rollouts/{alias}` | Latest rollout on an alias |
//! | POST | `/api/v1/rollouts/{alias}/cancel` | Abort the active rollout |
//! | POST | `/api/v1/metrics` | Ingest a datapoint |
//!
//! Every response is `{ "success": bool, "data"?: ..., "error"?: "..." }`.

pub mod handlers;
pub mod rollout_handlers;

use axum::Router;
use axum::routing::{get, post};

use deployline_metrics::InMemoryMetricSource;
use deployline_rollout::CanaryController;

/// Shared state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub controller: CanaryController,
    /// Receives pushed datapoints; the controller should be polling it.
    pub metrics: InMemoryMetricSource,
}

/// Build the complete API router.
pub fn build_router(state: ApiState) -> Router {
    let api_routes = Router::new()
        .route("/aliases", get(handlers::list_aliases).post(handlers::create_alias))
        .route("/aliases/{name}", get(handlers::get_alias))
        .route("/rollouts", get(rollout_handlers::list_rollouts))
        .route(
            "/rollouts/{alias}",
            get(rollout_handlers::get_rollout).post(rollout_handlers::start_rollout),
        )
        .route("/rollouts/{alias}/cancel", post(rollout_handlers::cancel_rollout))
        .route("/metrics", post(handlers::ingest_metric))
        .with_state(state);

    Router::new().nest("/api/v1", api_routes)
}
