//! deployline-rollout — progressive delivery behind aliases.
//!
//! A [`CanaryController`] moves an alias's traffic from its live version to
//! a new one in the weighted steps of a [`deployline_core::CanaryPlan`],
//! polling a [`deployline_metrics::MetricSource`] through a
//! [`RollbackManager`] and reverting when the alarm breaches.
//!
//! # Components
//!
//! - **`alias`** — alias registry and routing state (watch channels)
//! - **`rollback`** — consecutive-period alarm evaluation
//! - **`controller`** — per-rollout background task and handles
//! - **`release`** — pipeline run → provisioned version → rollout

pub mod alias;
pub mod controller;
pub mod error;
pub mod release;
pub mod rollback;

pub use alias::{AliasRegistry, AliasState, CanaryTarget};
pub use controller::{CanaryController, RolloutEvent, RolloutHandle, RolloutState, RolloutStatus};
pub use error::{RolloutError, RolloutResult};
pub use release::{Delivery, Provisioner, Release};
pub use rollback::{PeriodOutcome, RollbackManager, Verdict};
