//! deployline-pipeline — ordered stages, parallel actions, immutable artifacts.
//!
//! A [`PipelineEngine`] runs a [`deployline_core::Pipeline`] stage by stage.
//! Actions are dispatched to [`ActionExecutor`]s looked up by name in an
//! [`ExecutorRegistry`]; their outputs land in the
//! [`deployline_artifacts::ArtifactStore`] and feed later stages.
//!
//! # Components
//!
//! - **`validation`** — static checks run before every run
//! - **`engine`** — stage sequencing, worker pool, artifact hand-off
//! - **`executor`** — executor trait and registry
//! - **`command`** — executor that runs an external program
//! - **`report`** — `RunResult` and per-stage reports

pub mod command;
pub mod engine;
pub mod error;
pub mod executor;
pub mod report;
pub mod validation;

pub use command::{CommandExecutor, input_env_var, output_file_name};
pub use engine::{EngineConfig, PipelineEngine};
pub use error::{PipelineError, PipelineResult};
pub use executor::{ActionContext, ActionExecutor, ActionOutputs, ExecutorRegistry};
pub use report::{ActionReport, ActionStatus, RunResult, RunStatus, StageReport, StageStatus};
pub use validation::validate;
