//! deployline.toml configuration parser.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::alarm::{AlarmSpec, AutoRollbackConfig, ComparisonOperator, Statistic};
use crate::canary::{CanaryPlan, CanaryStep};
use crate::duration::parse_duration;
use crate::error::{ConfigError, ConfigResult};
use crate::pipeline::{ActionSpec, Pipeline, Stage};
use crate::types::{DeployableUnit, PermissionRequest};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploylineConfig {
    pub unit: UnitConfig,
    pub pipeline: Pipeline,
    pub deployment: Option<DeploymentConfig>,
    pub alarm: Option<AlarmConfig>,
    pub engine: Option<EngineConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnitConfig {
    pub name: String,
    pub alias: Option<String>,
    /// Pipeline artifact that is handed to the provisioning layer.
    pub artifact: Option<String>,
    pub permissions: Option<Vec<PermissionRequest>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentConfig {
    pub preset: Option<String>,
    pub steps: Option<Vec<CanaryStep>>,
    pub auto_rollback: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlarmConfig {
    pub metric: String,
    pub statistic: Option<Statistic>,
    pub period: Option<String>,
    pub threshold: f64,
    pub evaluation_periods: Option<u32>,
    pub comparison: Option<ComparisonOperator>,
    pub dimensions: Option<BTreeMap<String, String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    pub max_parallel_actions: Option<usize>,
}

/// Alias used when `[unit].alias` is omitted.
pub const DEFAULT_ALIAS: &str = "Current";

/// Plan used when `[deployment]` is omitted.
pub const DEFAULT_PRESET: &str = "Canary10Percent10Minutes";

impl DeploylineConfig {
    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> ConfigResult<Self> {
        let config: DeploylineConfig = toml::from_str(content)?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// The deployable unit described by `[unit]`.
    pub fn unit(&self) -> DeployableUnit {
        DeployableUnit {
            name: self.unit.name.clone(),
            alias: self
                .unit
                .alias
                .clone()
                .unwrap_or_else(|| DEFAULT_ALIAS.to_string()),
            permissions: self.unit.permissions.clone().unwrap_or_default(),
        }
    }

    /// Name of the artifact to deploy; defaults to the last output of the
    /// last stage.
    pub fn deploy_artifact(&self) -> ConfigResult<String> {
        if let Some(name) = &self.unit.artifact {
            return Ok(name.clone());
        }
        self.pipeline
            .stages
            .last()
            .and_then(|s| s.outputs.last())
            .cloned()
            .ok_or_else(|| ConfigError::Missing("unit.artifact".to_string()))
    }

    /// The canary plan from `[deployment]`, validated.
    pub fn plan(&self) -> ConfigResult<CanaryPlan> {
        match &self.deployment {
            Some(DeploymentConfig {
                steps: Some(steps), ..
            }) => CanaryPlan::new(steps.clone()),
            Some(DeploymentConfig {
                preset: Some(preset),
                ..
            }) => CanaryPlan::preset(preset),
            _ => CanaryPlan::preset(DEFAULT_PRESET),
        }
    }

    pub fn auto_rollback(&self) -> AutoRollbackConfig {
        AutoRollbackConfig {
            deployment_in_alarm: self
                .deployment
                .as_ref()
                .and_then(|d| d.auto_rollback)
                .unwrap_or(true),
        }
    }

    /// The alarm from `[alarm]`, validated. `None` if not configured.
    pub fn alarm(&self) -> ConfigResult<Option<AlarmSpec>> {
        let Some(cfg) = &self.alarm else {
            return Ok(None);
        };
        let period = match &cfg.period {
            Some(raw) => parse_duration(raw).ok_or_else(|| ConfigError::InvalidDuration {
                field: "alarm.period".to_string(),
                value: raw.clone(),
            })?,
            None => Duration::from_secs(60),
        };
        let spec = AlarmSpec {
            metric: cfg.metric.clone(),
            dimensions: cfg.dimensions.clone().unwrap_or_default(),
            statistic: cfg.statistic.unwrap_or_default(),
            period,
            threshold: cfg.threshold,
            evaluation_periods: cfg.evaluation_periods.unwrap_or(1),
            comparison: cfg.comparison.unwrap_or_default(),
        };
        spec.validate()?;
        Ok(Some(spec))
    }

    pub fn max_parallel_actions(&self) -> Option<usize> {
        self.engine.as_ref().and_then(|e| e.max_parallel_actions)
    }

    /// Scaffold a source → build pipeline with a canary rollout.
    pub fn scaffold(name: &str) -> Self {
        let command = |program: &str, args: &[&str]| {
            serde_json::json!({ "program": program, "args": args })
        };
        let pipeline = Pipeline::new(
            format!("{name}-pipeline"),
            vec![
                Stage::new("Source")
                    .with_outputs(["SOURCE"])
                    .with_action(
                        ActionSpec::new("fetch-source", "command")
                            .with_outputs(["SOURCE"])
                            .with_config(command(
                                "sh",
                                &["-c", "git -C \"$DEPLOYLINE_PROJECT_DIR\" archive --output=\"$PWD/SOURCE\" HEAD"],
                            )),
                    ),
                Stage::new("Build")
                    .with_inputs(["SOURCE"])
                    .with_outputs(["BUILD"])
                    .with_action(
                        ActionSpec::new("build", "command")
                            .with_inputs(["SOURCE"])
                            .with_outputs(["BUILD"])
                            .with_config(command("sh", &["-c", "cp \"$DEPLOYLINE_INPUT_SOURCE\" BUILD"])),
                    ),
            ],
        );
        DeploylineConfig {
            unit: UnitConfig {
                name: name.to_string(),
                alias: Some(DEFAULT_ALIAS.to_string()),
                artifact: Some("BUILD".to_string()),
                permissions: None,
            },
            pipeline,
            deployment: Some(DeploymentConfig {
                preset: Some(DEFAULT_PRESET.to_string()),
                steps: None,
                auto_rollback: Some(true),
            }),
            alarm: Some(AlarmConfig {
                metric: "5XXError".to_string(),
                statistic: Some(Statistic::Sum),
                period: Some("1m".to_string()),
                threshold: 1.0,
                evaluation_periods: Some(1),
                comparison: None,
                dimensions: None,
            }),
            engine: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Access;

    const BLOG: &str = r#"
[unit]
name = "blog"
permissions = [{ resource = "table/Blog", access = "read_write" }]

[pipeline]
name = "BlogPipeline"

[[pipeline.stages]]
name = "Source"
outputs = ["LAMBDA_SOURCE", "CDK_SOURCE"]

[[pipeline.stages.actions]]
name = "GitHubLambdaSource"
executor = "command"
outputs = ["LAMBDA_SOURCE"]
config = { program = "git", args = ["archive", "HEAD"] }

[[pipeline.stages.actions]]
name = "GitHubCdkSource"
executor = "command"
outputs = ["CDK_SOURCE"]

[[pipeline.stages]]
name = "LambdaBuild"
inputs = ["LAMBDA_SOURCE"]
outputs = ["LAMBDA_BUILD"]

[[pipeline.stages.actions]]
name = "LambdaBuild"
executor = "command"
inputs = ["LAMBDA_SOURCE"]
outputs = ["LAMBDA_BUILD"]

[deployment]
steps = [{ weight = 10, hold = "5m" }, { weight = 100, hold = "0s" }]

[alarm]
metric = "5XXError"
period = "1m"
threshold = 1
dimensions = { ApiName = "BlogHttpApi" }
"#;

    #[test]
    fn parses_full_config() {
        let config = DeploylineConfig::from_toml_str(BLOG).unwrap();
        assert_eq!(config.pipeline.stages.len(), 2);
        assert_eq!(config.pipeline.stages[0].actions.len(), 2);
        assert_eq!(
            config.pipeline.stages[0].actions[0].config["program"],
            serde_json::json!("git")
        );

        let unit = config.unit();
        assert_eq!(unit.alias, DEFAULT_ALIAS);
        assert_eq!(unit.permissions[0].access, Access::ReadWrite);

        assert_eq!(config.deploy_artifact().unwrap(), "LAMBDA_BUILD");

        let plan = config.plan().unwrap();
        assert_eq!(plan.steps[0].hold, Duration::from_secs(300));

        let alarm = config.alarm().unwrap().unwrap();
        assert_eq!(alarm.evaluation_periods, 1);
        assert_eq!(alarm.dimensions["ApiName"], "BlogHttpApi");
        assert!(config.auto_rollback().deployment_in_alarm);
    }

    #[test]
    fn missing_deployment_uses_default_preset() {
        let mut config = DeploylineConfig::from_toml_str(BLOG).unwrap();
        config.deployment = None;
        assert_eq!(
            config.plan().unwrap(),
            CanaryPlan::preset(DEFAULT_PRESET).unwrap()
        );
    }

    #[test]
    fn bad_alarm_period_is_reported() {
        let mut config = DeploylineConfig::from_toml_str(BLOG).unwrap();
        if let Some(alarm) = config.alarm.as_mut() {
            alarm.period = Some("often".to_string());
        }
        assert!(matches!(
            config.alarm(),
            Err(ConfigError::InvalidDuration { .. })
        ));
    }

    #[test]
    fn scaffold_roundtrips_through_toml() {
        let config = DeploylineConfig::scaffold("my-api");
        let text = config.to_toml_string().unwrap();
        let back = DeploylineConfig::from_toml_str(&text).unwrap();
        assert_eq!(back.pipeline, config.pipeline);
        assert_eq!(back.unit().name, "my-api");
    }
}
