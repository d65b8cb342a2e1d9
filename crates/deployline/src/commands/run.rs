use std::path::Path;

use anyhow::Context;
use deployline_artifacts::ArtifactStore;
use deployline_pipeline::{ActionStatus, EngineConfig, PipelineEngine, RunResult, StageStatus};

use super::{executors, load_config, project_dir};

/// Open (or create) the artifact store under `data_dir`.
pub fn open_store(data_dir: &Path) -> anyhow::Result<ArtifactStore> {
    std::fs::create_dir_all(data_dir)
        .with_context(|| format!("failed to create {}", data_dir.display()))?;
    let path = data_dir.join("artifacts.redb");
    ArtifactStore::open(&path).with_context(|| format!("failed to open {}", path.display()))
}

pub async fn run(config_path: &Path, data_dir: &Path, format: &str) -> anyhow::Result<()> {
    let config = load_config(config_path)?;
    let store = open_store(data_dir)?;
    let registry = executors(&data_dir.join("work"), project_dir(config_path));
    let engine_config = EngineConfig {
        max_parallel_actions: config
            .max_parallel_actions()
            .unwrap_or(EngineConfig::default().max_parallel_actions),
    };
    let engine = PipelineEngine::new(store, registry, engine_config);

    let result = engine.run(&config.pipeline).await?;
    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&result)?),
        _ => println!("{}", format_run(&result)),
    }

    if let Some(failure) = result.failure {
        anyhow::bail!("run {} failed: {failure}", result.run_id);
    }
    Ok(())
}

fn format_run(result: &RunResult) -> String {
    let mut lines = vec![format!("run {} ({})", result.run_id, result.pipeline)];
    for stage in &result.stages {
        let mark = match stage.status {
            StageStatus::Succeeded => "✓",
            StageStatus::Failed => "✗",
            StageStatus::Skipped => "-",
        };
        lines.push(format!("{mark} {}", stage.name));
        for action in &stage.actions {
            let line = match &action.status {
                ActionStatus::Succeeded => format!("    {} ({}ms)", action.name, action.elapsed_ms),
                ActionStatus::Failed { reason } => format!("    {}: {reason}", action.name),
                ActionStatus::NotRun => format!("    {} (not run)", action.name),
            };
            lines.push(line);
        }
    }
    if !result.artifacts.is_empty() {
        lines.push("artifacts:".to_string());
        for artifact in result.artifacts.values() {
            lines.push(format!("    {artifact} ({} bytes)", artifact.size));
        }
    }
    lines.join("\n")
}
