//! Metric query errors.

use thiserror::Error;

/// Why a metric query produced no value.
///
/// Both variants are inconclusive for rollback purposes: a period with an
/// error is neither a violation nor a recovery.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MetricError {
    /// The source could not be reached or answered with an error.
    #[error("metric source unavailable: {0}")]
    Unavailable(String),

    /// The window held no datapoints and the statistic has no value for an
    /// empty set.
    #[error("no datapoints for {metric} in window")]
    NoData { metric: String },
}

pub type MetricResult<T> = Result<T, MetricError>;
