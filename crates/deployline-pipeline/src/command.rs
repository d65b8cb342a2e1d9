//! CommandExecutor — runs an external program as a pipeline action.
//!
//! Action config:
//!
//! ```toml
//! [pipeline.stages.actions.config]
//! program = "npm"
//! args = ["run", "build"]
//! env = { NODE_ENV = "production" }
//! ```
//!
//! Each invocation gets a fresh work directory under the executor's root.
//! Input artifacts are written into `<workdir>/inputs/` and their paths are
//! exported as `DEPLOYLINE_INPUT_<NAME>`. The program runs with the work
//! directory as its cwd and must leave one file per declared output at
//! `<workdir>/<OUTPUT>`, with every character outside `[A-Za-z0-9]` in the
//! output name replaced by `_`. When a project directory is set it is
//! exported as `DEPLOYLINE_PROJECT_DIR`.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use serde::Deserialize;
use tokio::process::Command;
use tracing::{debug, info};

use crate::executor::{ActionContext, ActionExecutor, ActionOutputs};

#[derive(Debug, Deserialize)]
struct CommandConfig {
    program: String,
    #[serde(default)]
    args: Vec<String>,
    #[serde(default)]
    env: BTreeMap<String, String>,
}

/// Executor that shells out to a program per action.
#[derive(Debug, Clone)]
pub struct CommandExecutor {
    work_root: PathBuf,
    project_dir: Option<PathBuf>,
}

impl CommandExecutor {
    /// Work directories are created beneath `work_root`.
    pub fn new(work_root: impl Into<PathBuf>) -> Self {
        Self {
            work_root: work_root.into(),
            project_dir: None,
        }
    }

    pub fn with_project_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.project_dir = Some(dir.into());
        self
    }

    fn workdir(&self, ctx: &ActionContext) -> PathBuf {
        self.work_root
            .join(&ctx.run_id)
            .join(sanitize(&ctx.stage))
            .join(sanitize(&ctx.action.name))
    }
}

/// Name of the env var carrying the path of input `name`.
pub fn input_env_var(name: &str) -> String {
    format!("DEPLOYLINE_INPUT_{}", sanitize(name).to_ascii_uppercase())
}

/// File name under the work directory where output `name` is collected.
pub fn output_file_name(name: &str) -> String {
    sanitize(name)
}

/// Output files must stay distinct and clear of the inputs directory.
fn check_output_names(declared: &[String]) -> Result<()> {
    let mut seen = HashSet::new();
    for name in declared {
        let file = output_file_name(name);
        if file == INPUTS_DIR {
            bail!("output {name} collides with the {INPUTS_DIR} directory");
        }
        if !seen.insert(file.clone()) {
            bail!("output {name} maps to the same file ({file}) as another output");
        }
    }
    Ok(())
}

const INPUTS_DIR: &str = "inputs";

fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

#[async_trait]
impl ActionExecutor for CommandExecutor {
    async fn execute(&self, ctx: ActionContext) -> Result<ActionOutputs> {
        let config: CommandConfig = serde_json::from_value(ctx.action.config.clone())
            .with_context(|| format!("action {}: invalid command config", ctx.action.name))?;

        check_output_names(&ctx.action.outputs)
            .with_context(|| format!("action {}: invalid outputs", ctx.action.name))?;

        let workdir = self.workdir(&ctx);
        let inputs_dir = workdir.join(INPUTS_DIR);
        tokio::fs::create_dir_all(&inputs_dir)
            .await
            .with_context(|| format!("failed to create {}", inputs_dir.display()))?;

        let mut cmd = Command::new(&config.program);
        cmd.args(&config.args)
            .current_dir(&workdir)
            .env("DEPLOYLINE_RUN_ID", &ctx.run_id)
            .env("DEPLOYLINE_STAGE", &ctx.stage)
            .env("DEPLOYLINE_ACTION", &ctx.action.name)
            .envs(&config.env)
            .kill_on_drop(true);
        if let Some(dir) = &self.project_dir {
            cmd.env("DEPLOYLINE_PROJECT_DIR", dir);
        }

        for (name, bytes) in &ctx.inputs {
            let path = inputs_dir.join(sanitize(name));
            tokio::fs::write(&path, bytes)
                .await
                .with_context(|| format!("failed to materialize input {name}"))?;
            cmd.env(input_env_var(name), &path);
        }

        info!(
            stage = %ctx.stage,
            action = %ctx.action.name,
            program = %config.program,
            "running command"
        );
        let output = cmd
            .output()
            .await
            .with_context(|| format!("failed to execute '{}'", config.program))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let exit_code = output.status.code().unwrap_or(-1);
            bail!(
                "{} failed (exit code {exit_code}): {}",
                config.program,
                stderr.trim()
            );
        }

        read_outputs(&workdir, &ctx.action.outputs).await
    }
}

async fn read_outputs(workdir: &Path, declared: &[String]) -> Result<ActionOutputs> {
    let mut outputs = ActionOutputs::new();
    for name in declared {
        let path = workdir.join(output_file_name(name));
        let bytes = tokio::fs::read(&path)
            .await
            .with_context(|| format!("declared output {name} not found at {}", path.display()))?;
        debug!(output = %name, size = bytes.len(), "collected command output");
        outputs.insert(name.clone(), bytes);
    }
    Ok(outputs)
}
