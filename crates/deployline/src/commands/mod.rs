use std::path::Path;

use anyhow::Context;
use deployline_core::DeploylineConfig;
use deployline_pipeline::{CommandExecutor, ExecutorRegistry};

pub mod init;
pub mod plan;
pub mod run;
pub mod serve;
pub mod validate;

/// Executor name actions use for [`CommandExecutor`].
pub const COMMAND_EXECUTOR: &str = "command";

pub fn load_config(path: &Path) -> anyhow::Result<DeploylineConfig> {
    DeploylineConfig::from_file(path)
        .with_context(|| format!("failed to load {}", path.display()))
}

/// Executors available to pipelines run from the CLI.
pub fn executors(work_root: &Path, project_dir: &Path) -> ExecutorRegistry {
    let command = CommandExecutor::new(work_root).with_project_dir(project_dir);
    ExecutorRegistry::new().register(COMMAND_EXECUTOR, std::sync::Arc::new(command))
}

/// Directory holding `config`, used as the project root.
pub fn project_dir(config: &Path) -> &Path {
    match config.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    }
}
