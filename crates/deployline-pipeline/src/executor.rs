//! The pluggable work behind each pipeline action.
//!
//! The engine never interprets an action itself. It looks up the executor
//! named by `ActionSpec::executor` in an [`ExecutorRegistry`] handed to it
//! at construction, passes the resolved input bytes, and stores whatever
//! outputs come back.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;

use deployline_core::ActionSpec;

/// Output bytes keyed by artifact name.
pub type ActionOutputs = BTreeMap<String, Vec<u8>>;

/// Everything an executor gets to see for one action invocation.
#[derive(Debug, Clone)]
pub struct ActionContext {
    pub run_id: String,
    pub pipeline: String,
    pub stage: String,
    pub action: ActionSpec,
    /// Input bytes keyed by artifact name; exactly the action's declared inputs.
    pub inputs: BTreeMap<String, Vec<u8>>,
}

impl ActionContext {
    /// Input bytes for `name`, if declared.
    pub fn input(&self, name: &str) -> Option<&[u8]> {
        self.inputs.get(name).map(Vec::as_slice)
    }
}

/// Runs one kind of action.
///
/// Implementations must produce exactly the outputs the action declares.
/// For a given action and inputs the outputs should be identical across
/// calls; the engine itself adds no run-specific data.
#[async_trait]
pub trait ActionExecutor: Send + Sync {
    async fn execute(&self, ctx: ActionContext) -> anyhow::Result<ActionOutputs>;
}

/// Named executors available to a pipeline engine.
#[derive(Clone, Default)]
pub struct ExecutorRegistry {
    executors: HashMap<String, Arc<dyn ActionExecutor>>,
}

impl ExecutorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an executor under `name`, replacing any previous one.
    pub fn register(mut self, name: impl Into<String>, executor: Arc<dyn ActionExecutor>) -> Self {
        self.executors.insert(name.into(), executor);
        self
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn ActionExecutor>> {
        self.executors.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.executors.contains_key(name)
    }

    /// Registered executor names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.executors.keys().cloned().collect();
        names.sort();
        names
    }
}

impl std::fmt::Debug for ExecutorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutorRegistry")
            .field("executors", &self.names())
            .finish()
    }
}
