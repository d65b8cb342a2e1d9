//! Alarm configuration for canary rollouts.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};

/// Longest evaluation period an alarm may use.
pub const MAX_ALARM_PERIOD: Duration = Duration::from_secs(24 * 3600);

/// How datapoints inside one evaluation period are aggregated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Statistic {
    #[default]
    Sum,
    Average,
    Minimum,
    Maximum,
    SampleCount,
}

impl Statistic {
    /// Aggregate a set of samples. Returns `None` when there is nothing to
    /// aggregate and the statistic has no natural zero.
    pub fn aggregate(self, samples: &[f64]) -> Option<f64> {
        match self {
            Statistic::Sum => Some(samples.iter().sum()),
            Statistic::SampleCount => Some(samples.len() as f64),
            Statistic::Average if samples.is_empty() => None,
            Statistic::Average => Some(samples.iter().sum::<f64>() / samples.len() as f64),
            Statistic::Minimum => samples.iter().copied().reduce(f64::min),
            Statistic::Maximum => samples.iter().copied().reduce(f64::max),
        }
    }
}

/// How an aggregated value is compared against the threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ComparisonOperator {
    #[default]
    GreaterThanOrEqualToThreshold,
    GreaterThanThreshold,
    LessThanThreshold,
    LessThanOrEqualToThreshold,
}

impl ComparisonOperator {
    /// Whether `value` is on the alarming side of `threshold`.
    pub fn is_violated(self, value: f64, threshold: f64) -> bool {
        match self {
            ComparisonOperator::GreaterThanOrEqualToThreshold => value >= threshold,
            ComparisonOperator::GreaterThanThreshold => value > threshold,
            ComparisonOperator::LessThanThreshold => value < threshold,
            ComparisonOperator::LessThanOrEqualToThreshold => value <= threshold,
        }
    }
}

/// Alarm watched during a canary rollout.
///
/// The alarm is in breach only after `evaluation_periods` consecutive
/// periods violate the threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlarmSpec {
    /// Metric name, e.g. "5XXError".
    pub metric: String,
    /// Dimensions narrowing the metric, e.g. `ApiName = "BlogHttpApi"`.
    #[serde(default)]
    pub dimensions: BTreeMap<String, String>,
    #[serde(default)]
    pub statistic: Statistic,
    /// Length of one evaluation period; also the polling interval.
    #[serde(with = "crate::duration::serde_str")]
    pub period: Duration,
    pub threshold: f64,
    pub evaluation_periods: u32,
    #[serde(default)]
    pub comparison: ComparisonOperator,
}

impl AlarmSpec {
    /// An alarm on `metric` summed per `period`, tripping at `threshold`.
    pub fn new(metric: impl Into<String>, period: Duration, threshold: f64) -> Self {
        Self {
            metric: metric.into(),
            dimensions: BTreeMap::new(),
            statistic: Statistic::Sum,
            period,
            threshold,
            evaluation_periods: 1,
            comparison: ComparisonOperator::default(),
        }
    }

    pub fn with_dimension(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.dimensions.insert(key.into(), value.into());
        self
    }

    pub fn with_statistic(mut self, statistic: Statistic) -> Self {
        self.statistic = statistic;
        self
    }

    pub fn with_evaluation_periods(mut self, periods: u32) -> Self {
        self.evaluation_periods = periods;
        self
    }

    pub fn with_comparison(mut self, comparison: ComparisonOperator) -> Self {
        self.comparison = comparison;
        self
    }

    /// Whether an aggregated value violates this alarm's threshold.
    pub fn is_violated(&self, value: f64) -> bool {
        self.comparison.is_violated(value, self.threshold)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.metric.trim().is_empty() {
            return Err(ConfigError::InvalidAlarm("metric name is empty".to_string()));
        }
        if self.period.is_zero() {
            return Err(ConfigError::InvalidAlarm("period must be positive".to_string()));
        }
        // Metric windows are measured in whole epoch seconds.
        if self.period.subsec_nanos() != 0 {
            return Err(ConfigError::InvalidAlarm(format!(
                "period must be a whole number of seconds, got {}ms",
                self.period.as_millis()
            )));
        }
        if self.period > MAX_ALARM_PERIOD {
            return Err(ConfigError::InvalidAlarm(format!(
                "period must be at most {}s",
                MAX_ALARM_PERIOD.as_secs()
            )));
        }
        if self.evaluation_periods == 0 {
            return Err(ConfigError::InvalidAlarm(
                "evaluation_periods must be at least 1".to_string(),
            ));
        }
        if !self.threshold.is_finite() {
            return Err(ConfigError::InvalidAlarm("threshold must be finite".to_string()));
        }
        Ok(())
    }
}

/// What the controller does when the alarm goes into breach.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutoRollbackConfig {
    /// Revert traffic when the alarm breaches. When false the breach is
    /// only recorded and the shift continues.
    pub deployment_in_alarm: bool,
}

impl Default for AutoRollbackConfig {
    fn default() -> Self {
        Self {
            deployment_in_alarm: true,
        }
    }
}
