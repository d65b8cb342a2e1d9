//! Declarative pipeline definition: stages, actions, and artifact names.
//!
//! These are plain data. Execution and validation live in
//! `deployline-pipeline`.

use serde::{Deserialize, Serialize};

/// An ordered sequence of stages. Order is fixed at definition time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pipeline {
    pub name: String,
    pub stages: Vec<Stage>,
}

/// One step of a pipeline. All actions of a stage may run concurrently.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stage {
    pub name: String,
    pub actions: Vec<ActionSpec>,
    /// Artifact names this stage consumes; produced by earlier stages.
    #[serde(default)]
    pub inputs: Vec<String>,
    /// Artifact names this stage produces.
    #[serde(default)]
    pub outputs: Vec<String>,
}

/// A unit of work inside a stage, dispatched to a named executor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionSpec {
    pub name: String,
    /// Name of the executor registered with the engine (e.g. "command").
    pub executor: String,
    #[serde(default)]
    pub inputs: Vec<String>,
    #[serde(default)]
    pub outputs: Vec<String>,
    /// Executor-specific settings, passed through untouched.
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub config: serde_json::Value,
}

impl Pipeline {
    pub fn new(name: impl Into<String>, stages: Vec<Stage>) -> Self {
        Self {
            name: name.into(),
            stages,
        }
    }

    /// Find a stage by name.
    pub fn stage(&self, name: &str) -> Option<&Stage> {
        self.stages.iter().find(|s| s.name == name)
    }
}

impl Stage {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            actions: Vec::new(),
            inputs: Vec::new(),
            outputs: Vec::new(),
        }
    }

    pub fn with_action(mut self, action: ActionSpec) -> Self {
        self.actions.push(action);
        self
    }

    pub fn with_inputs<I, S>(mut self, inputs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.inputs.extend(inputs.into_iter().map(Into::into));
        self
    }

    pub fn with_outputs<I, S>(mut self, outputs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.outputs.extend(outputs.into_iter().map(Into::into));
        self
    }
}

impl ActionSpec {
    pub fn new(name: impl Into<String>, executor: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            executor: executor.into(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            config: serde_json::Value::Null,
        }
    }

    pub fn with_inputs<I, S>(mut self, inputs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.inputs.extend(inputs.into_iter().map(Into::into));
        self
    }

    pub fn with_outputs<I, S>(mut self, outputs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.outputs.extend(outputs.into_iter().map(Into::into));
        self
    }

    pub fn with_config(mut self, config: serde_json::Value) -> Self {
        self.config = config;
        self
    }
}
