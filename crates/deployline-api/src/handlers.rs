//! REST API handlers for aliases and metric ingestion.

use std::collections::BTreeMap;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde::Deserialize;
use tracing::debug;

use deployline_core::VersionId;
use deployline_metrics::{Datapoint, epoch_secs};
use deployline_rollout::RolloutError;

use crate::ApiState;

/// Response wrapper for consistent API format.
#[derive(serde::Serialize)]
pub(crate) struct ApiResponse<T: serde::Serialize> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T: serde::Serialize> ApiResponse<T> {
    pub(crate) fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data: Some(data),
            error: None,
        })
    }
}

pub(crate) fn error_response(msg: &str, status: StatusCode) -> impl IntoResponse {
    (
        status,
        Json(ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(msg.to_string()),
        }),
    )
}

/// Map a rollout error onto the HTTP status the API reports.
pub(crate) fn rollout_error(e: &RolloutError) -> axum::response::Response {
    let status = match e {
        RolloutError::UnknownAlias(_) | RolloutError::NoActiveRollout(_) => StatusCode::NOT_FOUND,
        RolloutError::AliasExists(_) | RolloutError::RolloutInProgress { .. } => StatusCode::CONFLICT,
        RolloutError::Validation(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    error_response(&e.to_string(), status).into_response()
}

// ── Aliases ────────────────────────────────────────────────────

/// GET /api/v1/aliases
pub async fn list_aliases(State(state): State<ApiState>) -> impl IntoResponse {
    ApiResponse::ok(state.controller.aliases().list().await).into_response()
}

/// GET /api/v1/aliases/{name}
pub async fn get_alias(
    State(state): State<ApiState>,
    Path(name): Path<String>,
) -> impl IntoResponse {
    match state.controller.aliases().get(&name).await {
        Some(alias) => ApiResponse::ok(alias).into_response(),
        None => error_response("alias not found", StatusCode::NOT_FOUND).into_response(),
    }
}

#[derive(Deserialize)]
pub struct CreateAliasRequest {
    pub name: String,
    pub version: VersionId,
}

/// POST /api/v1/aliases
pub async fn create_alias(
    State(state): State<ApiState>,
    Json(req): Json<CreateAliasRequest>,
) -> impl IntoResponse {
    match state.controller.aliases().create(&req.name, req.version).await {
        Ok(alias) => (StatusCode::CREATED, ApiResponse::ok(alias)).into_response(),
        Err(e) => rollout_error(&e),
    }
}

// ── Metrics ────────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct IngestRequest {
    pub metric: String,
    #[serde(default)]
    pub dimensions: BTreeMap<String, String>,
    pub value: f64,
    /// Epoch seconds; defaults to now.
    pub timestamp: Option<u64>,
}

/// POST /api/v1/metrics
pub async fn ingest_metric(
    State(state): State<ApiState>,
    Json(req): Json<IngestRequest>,
) -> impl IntoResponse {
    if req.metric.trim().is_empty() {
        return error_response("metric name is empty", StatusCode::BAD_REQUEST).into_response();
    }
    if !req.value.is_finite() {
        return error_response("value must be finite", StatusCode::BAD_REQUEST).into_response();
    }
    let timestamp = req.timestamp.unwrap_or_else(epoch_secs);
    state
        .metrics
        .record(&req.metric, req.dimensions.clone(), req.value, timestamp)
        .await;
    debug!(metric = %req.metric, value = req.value, "datapoint ingested");

    let point = Datapoint {
        dimensions: req.dimensions,
        value: req.value,
        timestamp,
    };
    (StatusCode::ACCEPTED, ApiResponse::ok(point)).into_response()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::to_bytes;
    use deployline_metrics::{InMemoryMetricSource, MetricQuery, MetricSource};
    use deployline_core::Statistic;
    use deployline_rollout::{AliasRegistry, CanaryController};

    use super::*;

    fn test_state() -> ApiState {
        let metrics = InMemoryMetricSource::new();
        let controller = CanaryController::new(AliasRegistry::new(), Arc::new(metrics.clone()));
        ApiState {
            controller,
            metrics,
        }
    }

    async fn body_json(resp: axum::response::Response) -> serde_json::Value {
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn alias_request(name: &str, version: &str) -> CreateAliasRequest {
        CreateAliasRequest {
            name: name.to_string(),
            version: VersionId::new(version),
        }
    }

    #[tokio::test]
    async fn create_and_get_alias() {
        let state = test_state();
        let resp = create_alias(State(state.clone()), Json(alias_request("Current", "v1")))
            .await
            .into_response();
        assert_eq!(resp.status(), StatusCode::CREATED);

        let resp = get_alias(State(state), Path("Current".to_string()))
            .await
            .into_response();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = body_json(resp).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["data"]["live"], "v1");
        assert!(body["data"]["canary"].is_null());
    }

    #[tokio::test]
    async fn duplicate_alias_conflicts() {
        let state = test_state();
        create_alias(State(state.clone()), Json(alias_request("Current", "v1"))).await;
        let resp = create_alias(State(state), Json(alias_request("Current", "v2")))
            .await
            .into_response();
        assert_eq!(resp.status(), StatusCode::CONFLICT);
        let body = body_json(resp).await;
        assert_eq!(body["success"], false);
        assert!(body["error"].as_str().unwrap().contains("already exists"));
    }

    #[tokio::test]
    async fn unknown_alias_is_not_found() {
        let resp = get_alias(State(test_state()), Path("nope".to_string()))
            .await
            .into_response();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn list_aliases_sorted() {
        let state = test_state();
        create_alias(State(state.clone()), Json(alias_request("b", "v1"))).await;
        create_alias(State(state.clone()), Json(alias_request("a", "v1"))).await;

        let body = body_json(list_aliases(State(state)).await.into_response()).await;
        let names: Vec<&str> = body["data"]
            .as_array()
            .unwrap()
            .iter()
            .map(|a| a["name"].as_str().unwrap())
            .collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn ingested_metrics_are_queryable() {
        let state = test_state();
        let req = IngestRequest {
            metric: "5XXError".to_string(),
            dimensions: BTreeMap::from([("ApiName".to_string(), "BlogHttpApi".to_string())]),
            value: 2.0,
            timestamp: Some(500),
        };
        let resp = ingest_metric(State(state.clone()), Json(req)).await.into_response();
        assert_eq!(resp.status(), StatusCode::ACCEPTED);

        let query = MetricQuery {
            metric_name: "5XXError".to_string(),
            dimensions: BTreeMap::from([("ApiName".to_string(), "BlogHttpApi".to_string())]),
            statistic: Statistic::Sum,
            window_start: 480,
            window_end: 540,
        };
        assert_eq!(state.metrics.query(&query).await, Ok(2.0));
    }

    #[tokio::test]
    async fn ingest_rejects_empty_metric() {
        let req = IngestRequest {
            metric: " ".to_string(),
            dimensions: BTreeMap::new(),
            value: 1.0,
            timestamp: None,
        };
        let resp = ingest_metric(State(test_state()), Json(req)).await.into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }
}
