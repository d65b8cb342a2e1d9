//! deployline-core — shared types for the Deployline delivery controller.
//!
//! Everything here is flat, serializable configuration: pipeline
//! definitions, canary plans, alarm specs, deployable units, and the
//! `deployline.toml` file that ties them together. Execution lives in the
//! other crates; they take these structs by value.

pub mod alarm;
pub mod canary;
pub mod config;
pub mod duration;
pub mod error;
pub mod pipeline;
pub mod types;

pub use alarm::{AlarmSpec, AutoRollbackConfig, ComparisonOperator, MAX_ALARM_PERIOD, Statistic};
pub use canary::{CanaryPlan, CanaryStep, MAX_STEP_HOLD};
pub use config::DeploylineConfig;
pub use duration::{format_duration, parse_duration};
pub use error::{ConfigError, ConfigResult};
pub use pipeline::{ActionSpec, Pipeline, Stage};
pub use types::*;
