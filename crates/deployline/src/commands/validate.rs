use std::path::Path;

use deployline_pipeline::validate as validate_pipeline;

use super::{executors, load_config, project_dir};

pub fn validate(config_path: &Path) -> anyhow::Result<()> {
    let config = load_config(config_path)?;

    // Work directories are never created during validation.
    let registry = executors(Path::new(".deployline/work"), project_dir(config_path));
    validate_pipeline(&config.pipeline, &registry)?;
    println!(
        "✓ pipeline {} ({} stages)",
        config.pipeline.name,
        config.pipeline.stages.len()
    );

    let artifact = config.deploy_artifact()?;
    if !config
        .pipeline
        .stages
        .iter()
        .any(|s| s.outputs.contains(&artifact))
    {
        anyhow::bail!("deploy artifact {artifact} is not produced by any stage");
    }
    let unit = config.unit();
    println!("✓ unit {} → alias {} (artifact {artifact})", unit.name, unit.alias);

    let plan = config.plan()?;
    println!(
        "✓ canary plan: {} steps over {}",
        plan.steps.len(),
        deployline_core::format_duration(plan.total_duration())
    );

    match config.alarm()? {
        Some(alarm) => println!(
            "✓ alarm {} {:?} {:?} {} over {} period(s) of {}",
            alarm.metric,
            alarm.statistic,
            alarm.comparison,
            alarm.threshold,
            alarm.evaluation_periods,
            deployline_core::format_duration(alarm.period)
        ),
        None => println!("! no [alarm] configured; rollouts need one"),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scaffold_validates() {
        let dir = tempfile::tempdir().unwrap();
        super::super::init::init(dir.path(), "blog").unwrap();
        validate(&dir.path().join("deployline.toml")).unwrap();
    }

    #[test]
    fn unknown_executor_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("deployline.toml");
        std::fs::write(
            &path,
            r#"
[unit]
name = "blog"

[pipeline]
name = "p"

[[pipeline.stages]]
name = "Build"
outputs = ["BIN"]

[[pipeline.stages.actions]]
name = "compile"
executor = "codebuild"
outputs = ["BIN"]
"#,
        )
        .unwrap();
        let err = validate(&path).unwrap_err();
        assert!(err.to_string().contains("unknown executor codebuild"));
    }
}
