//! Turns per-period metric values into a rollback verdict.
//!
//! Counts consecutive violating periods against the alarm's
//! `evaluation_periods`. A period that could not be measured is a gap: it
//! neither advances nor resets the count.

use serde::Serialize;
use tracing::{debug, warn};

use deployline_core::AlarmSpec;
use deployline_metrics::{MetricQuery, MetricResult, MetricSource};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Healthy,
    Breached,
}

/// What one evaluation period looked like.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PeriodOutcome {
    Within { value: f64 },
    Violated { value: f64 },
    Inconclusive { reason: String },
}

/// Per-rollout alarm state.
#[derive(Debug)]
pub struct RollbackManager {
    alarm: AlarmSpec,
    consecutive_violations: u32,
    inconclusive_periods: u32,
    verdict: Verdict,
    last: Option<PeriodOutcome>,
}

impl RollbackManager {
    pub fn new(alarm: AlarmSpec) -> Self {
        Self {
            alarm,
            consecutive_violations: 0,
            inconclusive_periods: 0,
            verdict: Verdict::Healthy,
            last: None,
        }
    }

    pub fn alarm(&self) -> &AlarmSpec {
        &self.alarm
    }

    /// Query `source` for the period ending at `now` (epoch seconds) and
    /// fold the result into the verdict.
    pub async fn evaluate(&mut self, source: &dyn MetricSource, now: u64) -> Verdict {
        let query = MetricQuery::for_alarm(&self.alarm, now);
        let result = source.query(&query).await;
        self.record(result);
        self.verdict
    }

    /// Fold one period's query result into the verdict.
    pub fn record(&mut self, result: MetricResult<f64>) -> &PeriodOutcome {
        let outcome = match result {
            Ok(value) if self.alarm.is_violated(value) => {
                self.consecutive_violations += 1;
                debug!(
                    metric = %self.alarm.metric,
                    value,
                    consecutive = self.consecutive_violations,
                    "alarm period violated"
                );
                if self.verdict == Verdict::Healthy
                    && self.consecutive_violations >= self.alarm.evaluation_periods
                {
                    warn!(
                        metric = %self.alarm.metric,
                        value,
                        threshold = self.alarm.threshold,
                        periods = self.consecutive_violations,
                        "alarm in breach"
                    );
                    self.verdict = Verdict::Breached;
                }
                PeriodOutcome::Violated { value }
            }
            Ok(value) => {
                self.consecutive_violations = 0;
                PeriodOutcome::Within { value }
            }
            Err(e) => {
                self.inconclusive_periods += 1;
                warn!(
                    metric = %self.alarm.metric,
                    error = %e,
                    consecutive = self.consecutive_violations,
                    "metric gap, period inconclusive"
                );
                PeriodOutcome::Inconclusive {
                    reason: e.to_string(),
                }
            }
        };
        self.last.insert(outcome)
    }

    /// Breached is sticky until [`reset`](Self::reset).
    pub fn verdict(&self) -> Verdict {
        self.verdict
    }

    pub fn consecutive_violations(&self) -> u32 {
        self.consecutive_violations
    }

    pub fn inconclusive_periods(&self) -> u32 {
        self.inconclusive_periods
    }

    pub fn last_outcome(&self) -> Option<&PeriodOutcome> {
        self.last.as_ref()
    }

    /// Clear all state for the next rollout.
    pub fn reset(&mut self) {
        self.consecutive_violations = 0;
        self.inconclusive_periods = 0;
        self.verdict = Verdict::Healthy;
        self.last = None;
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use deployline_core::Statistic;
    use deployline_metrics::{InMemoryMetricSource, MetricError};

    use super::*;

    fn alarm(periods: u32) -> AlarmSpec {
        AlarmSpec::new("5XXError", Duration::from_secs(60), 1.0).with_evaluation_periods(periods)
    }

    #[test]
    fn single_violation_breaches_with_one_period() {
        let mut manager = RollbackManager::new(alarm(1));
        manager.record(Ok(0.0));
        assert_eq!(manager.verdict(), Verdict::Healthy);
        manager.record(Ok(3.0));
        assert_eq!(manager.verdict(), Verdict::Breached);
    }

    #[test]
    fn over_under_over_never_breaches_with_two_periods() {
        let mut manager = RollbackManager::new(alarm(2));
        for value in [5.0, 0.0, 5.0, 0.0, 5.0] {
            manager.record(Ok(value));
            assert_eq!(manager.verdict(), Verdict::Healthy);
        }
        assert_eq!(manager.consecutive_violations(), 1);
    }

    #[test]
    fn consecutive_violations_breach() {
        let mut manager = RollbackManager::new(alarm(2));
        manager.record(Ok(2.0));
        assert_eq!(manager.verdict(), Verdict::Healthy);
        manager.record(Ok(2.0));
        assert_eq!(manager.verdict(), Verdict::Breached);
    }

    #[test]
    fn gap_leaves_counter_unchanged() {
        let mut manager = RollbackManager::new(alarm(3));
        manager.record(Ok(2.0));
        assert_eq!(manager.consecutive_violations(), 1);

        let outcome = manager
            .record(Err(MetricError::Unavailable("timeout".to_string())))
            .clone();
        assert!(matches!(outcome, PeriodOutcome::Inconclusive { .. }));
        assert_eq!(manager.consecutive_violations(), 1);
        assert_eq!(manager.inconclusive_periods(), 1);
        assert_eq!(manager.verdict(), Verdict::Healthy);

        // The gap did not reset the run: two more violations breach.
        manager.record(Ok(2.0));
        manager.record(Ok(2.0));
        assert_eq!(manager.verdict(), Verdict::Breached);
    }

    #[test]
    fn breach_is_sticky_until_reset() {
        let mut manager = RollbackManager::new(alarm(1));
        manager.record(Ok(1.0));
        manager.record(Ok(0.0));
        assert_eq!(manager.verdict(), Verdict::Breached);
        assert_eq!(manager.consecutive_violations(), 0);

        manager.reset();
        assert_eq!(manager.verdict(), Verdict::Healthy);
        assert!(manager.last_outcome().is_none());
    }

    #[tokio::test]
    async fn evaluate_queries_the_last_period() {
        let source = InMemoryMetricSource::new();
        let dims = Default::default();
        source.record("5XXError", dims, 1.0, 950).await;

        let mut manager = RollbackManager::new(alarm(1));
        assert_eq!(manager.evaluate(&source, 1_000).await, Verdict::Breached);
        assert_eq!(manager.last_outcome(), Some(&PeriodOutcome::Violated { value: 1.0 }));
    }

    #[tokio::test]
    async fn evaluate_no_data_average_is_a_gap() {
        let source = InMemoryMetricSource::new();
        let mut manager = RollbackManager::new(alarm(1).with_statistic(Statistic::Average));
        assert_eq!(manager.evaluate(&source, 1_000).await, Verdict::Healthy);
        assert_eq!(manager.inconclusive_periods(), 1);
    }
}
