//! MetricSource trait and query type.

use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use deployline_core::{AlarmSpec, Statistic};

use crate::error::MetricResult;

/// One aggregation request over a half-open window `[window_start, window_end)`,
/// in epoch seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricQuery {
    pub metric_name: String,
    pub dimensions: BTreeMap<String, String>,
    pub statistic: Statistic,
    pub window_start: u64,
    pub window_end: u64,
}

impl MetricQuery {
    /// The query for the alarm period ending at `now`.
    pub fn for_alarm(alarm: &AlarmSpec, now: u64) -> Self {
        let period = alarm.period.as_secs().max(1);
        Self {
            metric_name: alarm.metric.clone(),
            dimensions: alarm.dimensions.clone(),
            statistic: alarm.statistic,
            window_start: now.saturating_sub(period),
            window_end: now,
        }
    }
}

/// Something that can answer metric queries.
///
/// Implementations may fail transiently; callers treat every error as an
/// inconclusive period.
#[async_trait]
pub trait MetricSource: Send + Sync {
    async fn query(&self, query: &MetricQuery) -> MetricResult<f64>;
}

pub fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn alarm_query_covers_one_period() {
        let alarm = AlarmSpec::new("5XXError", Duration::from_secs(60), 1.0)
            .with_dimension("ApiName", "BlogHttpApi");
        let query = MetricQuery::for_alarm(&alarm, 1_000);

        assert_eq!(query.metric_name, "5XXError");
        assert_eq!(query.window_start, 940);
        assert_eq!(query.window_end, 1_000);
        assert_eq!(query.dimensions["ApiName"], "BlogHttpApi");
        assert_eq!(query.statistic, Statistic::Sum);
    }

    #[test]
    fn window_start_saturates() {
        let alarm = AlarmSpec::new("Errors", Duration::from_secs(300), 1.0);
        assert_eq!(MetricQuery::for_alarm(&alarm, 10).window_start, 0);
    }
}
