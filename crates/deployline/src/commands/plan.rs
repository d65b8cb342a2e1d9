use std::path::Path;
use std::time::Duration;

use deployline_core::{CanaryPlan, format_duration};

use super::load_config;

pub fn plan(config: Option<&Path>, preset: Option<&str>, format: &str) -> anyhow::Result<()> {
    let plan = match (config, preset) {
        (_, Some(name)) => CanaryPlan::preset(name)?,
        (Some(path), None) => load_config(path)?.plan()?,
        (None, None) => {
            println!("Presets:");
            for name in CanaryPlan::preset_names() {
                println!("  {name}");
            }
            return Ok(());
        }
    };

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&plan)?),
        _ => println!("{}", format_plan(&plan)),
    }
    Ok(())
}

/// One line per step with the offset at which it starts.
fn format_plan(plan: &CanaryPlan) -> String {
    let mut lines = vec![format!("{:>8}  {:>6}  {}", "at", "weight", "hold")];
    let mut offset = Duration::ZERO;
    for step in &plan.steps {
        lines.push(format!(
            "{:>8}  {:>5}%  {}",
            format_duration(offset),
            step.weight,
            format_duration(step.hold)
        ));
        offset += step.hold;
    }
    lines.push(format!("total {}", format_duration(plan.total_duration())));
    lines.join("\n")
}
