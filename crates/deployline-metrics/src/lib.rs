//! deployline-metrics — the metric side of canary rollouts.
//!
//! The rollout loop asks a [`MetricSource`] for one aggregated value per
//! evaluation period. Production deployments plug in whatever backs their
//! alarms; [`InMemoryMetricSource`] stores pushed datapoints and serves the
//! REST ingestion endpoint and tests.
//!
//! ```text
//! InMemoryMetricSource
//!   ├── record() ← POST /api/v1/metrics
//!   └── query()  → RollbackManager::evaluate, once per period
//! ```

pub mod error;
pub mod memory;
pub mod source;

pub use error::{MetricError, MetricResult};
pub use memory::{Datapoint, InMemoryMetricSource};
pub use source::{MetricQuery, MetricSource, epoch_secs};
