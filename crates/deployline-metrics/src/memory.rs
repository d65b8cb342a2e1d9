//! In-memory metric source.
//!
//! Datapoints are pushed in (by the REST ingestion endpoint or a test) and
//! aggregated on query. A datapoint matches a query when its metric name and
//! its full dimension set are equal to the query's, and its timestamp falls
//! inside the query window.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::{MetricError, MetricResult};
use crate::source::{MetricQuery, MetricSource};

/// One observed value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Datapoint {
    #[serde(default)]
    pub dimensions: BTreeMap<String, String>,
    pub value: f64,
    /// Epoch seconds.
    pub timestamp: u64,
}

/// Thread-safe datapoint store implementing [`MetricSource`].
#[derive(Clone, Default)]
pub struct InMemoryMetricSource {
    /// metric name → datapoints, in arrival order.
    series: Arc<RwLock<HashMap<String, Vec<Datapoint>>>>,
}

impl InMemoryMetricSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a datapoint for `metric`.
    pub async fn record(
        &self,
        metric: &str,
        dimensions: BTreeMap<String, String>,
        value: f64,
        timestamp: u64,
    ) {
        let mut series = self.series.write().await;
        series.entry(metric.to_string()).or_default().push(Datapoint {
            dimensions,
            value,
            timestamp,
        });
        debug!(%metric, value, timestamp, "datapoint recorded");
    }

    /// Drop datapoints older than `before`. Returns how many were removed.
    pub async fn prune(&self, before: u64) -> usize {
        let mut series = self.series.write().await;
        let mut removed = 0;
        for points in series.values_mut() {
            let len = points.len();
            points.retain(|p| p.timestamp >= before);
            removed += len - points.len();
        }
        series.retain(|_, points| !points.is_empty());
        removed
    }

    /// Metric names with at least one datapoint, sorted.
    pub async fn metrics(&self) -> Vec<String> {
        let series = self.series.read().await;
        let mut names: Vec<String> = series.keys().cloned().collect();
        names.sort();
        names
    }

    /// Number of datapoints stored for `metric`.
    pub async fn len(&self, metric: &str) -> usize {
        let series = self.series.read().await;
        series.get(metric).map(Vec::len).unwrap_or(0)
    }
}

#[async_trait]
impl MetricSource for InMemoryMetricSource {
    async fn query(&self, query: &MetricQuery) -> MetricResult<f64> {
        let series = self.series.read().await;
        let samples: Vec<f64> = series
            .get(&query.metric_name)
            .map(|points| {
                points
                    .iter()
                    .filter(|p| p.timestamp >= query.window_start && p.timestamp < query.window_end)
                    .filter(|p| p.dimensions == query.dimensions)
                    .map(|p| p.value)
                    .collect()
            })
            .unwrap_or_default();

        query
            .statistic
            .aggregate(&samples)
            .ok_or_else(|| MetricError::NoData {
                metric: query.metric_name.clone(),
            })
    }
}
