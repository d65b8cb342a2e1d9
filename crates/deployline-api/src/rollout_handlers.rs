//! REST API handlers for rollout management.
//!
//! Provides endpoints to start, list, get, and cancel rollouts.

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde::Deserialize;
use tracing::info;

use deployline_core::{AlarmSpec, AutoRollbackConfig, CanaryPlan, VersionId};
use deployline_rollout::RolloutError;

use crate::ApiState;
use crate::handlers::{ApiResponse, error_response, rollout_error};

/// A plan given inline or by preset name.
#[derive(Deserialize)]
#[serde(untagged)]
pub enum PlanRequest {
    Preset(String),
    Plan(CanaryPlan),
}

impl PlanRequest {
    fn resolve(self) -> Result<CanaryPlan, RolloutError> {
        match self {
            PlanRequest::Preset(name) => Ok(CanaryPlan::preset(&name)?),
            PlanRequest::Plan(plan) => Ok(plan),
        }
    }
}

/// Request body to start a rollout.
#[derive(Deserialize)]
pub struct StartRolloutRequest {
    pub new_version: VersionId,
    pub plan: PlanRequest,
    pub alarm: AlarmSpec,
    /// Revert on breach; defaults to true.
    pub auto_rollback: Option<bool>,
}

/// POST /api/v1/rollouts/{alias}
pub async fn start_rollout(
    State(state): State<ApiState>,
    Path(alias): Path<String>,
    Json(req): Json<StartRolloutRequest>,
) -> impl IntoResponse {
    let plan = match req.plan.resolve() {
        Ok(plan) => plan,
        Err(e) => return rollout_error(&e),
    };
    let auto_rollback = AutoRollbackConfig {
        deployment_in_alarm: req.auto_rollback.unwrap_or(true),
    };

    match state
        .controller
        .start_rollout_with(&alias, req.new_version, plan, req.alarm, auto_rollback)
        .await
    {
        Ok(handle) => {
            info!(%alias, rollout = %handle.id(), "rollout started via API");
            (StatusCode::CREATED, ApiResponse::ok(handle.status())).into_response()
        }
        Err(e) => rollout_error(&e),
    }
}

/// GET /api/v1/rollouts
pub async fn list_rollouts(State(state): State<ApiState>) -> impl IntoResponse {
    ApiResponse::ok(state.controller.rollouts().await).into_response()
}

/// GET /api/v1/rollouts/{alias}
pub async fn get_rollout(
    State(state): State<ApiState>,
    Path(alias): Path<String>,
) -> impl IntoResponse {
    match state.controller.rollout(&alias).await {
        Some(status) => ApiResponse::ok(status).into_response(),
        None => error_response("rollout not found", StatusCode::NOT_FOUND).into_response(),
    }
}

#[derive(Deserialize)]
pub struct CancelParams {
    pub reason: Option<String>,
}

/// POST /api/v1/rollouts/{alias}/cancel
pub async fn cancel_rollout(
    State(state): State<ApiState>,
    Path(alias): Path<String>,
    Query(params): Query<CancelParams>,
) -> impl IntoResponse {
    let reason = params
        .reason
        .unwrap_or_else(|| "cancelled by operator".to_string());
    match state.controller.cancel(&alias, &reason).await {
        Ok(handle) => ApiResponse::ok(handle.wait().await).into_response(),
        Err(e) => rollout_error(&e),
    }
}
