//! Canary plans: the ordered traffic steps of a rollout.
//!
//! A plan is a list of `(weight, hold)` steps that must end at 100%.
//! The presets mirror the usual managed deployment configurations:
//! all-at-once, a two-step canary, and linear increments.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::duration::format_duration;
use crate::error::{ConfigError, ConfigResult};

/// Longest a single step may hold its weight.
pub const MAX_STEP_HOLD: Duration = Duration::from_secs(48 * 3600);

/// One traffic step: route `weight`% to the new version for `hold`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanaryStep {
    /// Percentage of traffic on the new version (1-100).
    pub weight: u8,
    /// How long to observe this weight before advancing.
    #[serde(with = "crate::duration::serde_str")]
    pub hold: Duration,
}

impl CanaryStep {
    pub fn new(weight: u8, hold: Duration) -> Self {
        Self { weight, hold }
    }
}

/// Ordered traffic steps culminating in 100%.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanaryPlan {
    pub steps: Vec<CanaryStep>,
}

impl CanaryPlan {
    /// Build and validate a plan.
    pub fn new(steps: Vec<CanaryStep>) -> ConfigResult<Self> {
        let plan = Self { steps };
        plan.validate()?;
        Ok(plan)
    }

    /// Shift all traffic in one step.
    pub fn all_at_once() -> Self {
        Self {
            steps: vec![CanaryStep::new(100, Duration::ZERO)],
        }
    }

    /// Route `percent`% for `interval`, then everything.
    pub fn canary(percent: u8, interval: Duration) -> ConfigResult<Self> {
        Self::new(vec![
            CanaryStep::new(percent, interval),
            CanaryStep::new(100, Duration::ZERO),
        ])
    }

    /// Add `percent`% every `every` until 100% is reached.
    pub fn linear(percent: u8, every: Duration) -> ConfigResult<Self> {
        if percent == 0 || percent > 100 {
            return Err(ConfigError::InvalidPlan(format!(
                "linear increment must be 1-100, got {percent}"
            )));
        }
        let mut steps = Vec::new();
        let mut weight = percent;
        while weight < 100 {
            steps.push(CanaryStep::new(weight, every));
            weight = weight.saturating_add(percent);
        }
        steps.push(CanaryStep::new(100, Duration::ZERO));
        Self::new(steps)
    }

    /// Resolve a named preset such as `Canary10Percent10Minutes`.
    pub fn preset(name: &str) -> ConfigResult<Self> {
        let minutes = |m: u64| Duration::from_secs(m * 60);
        match name {
            "AllAtOnce" => Ok(Self::all_at_once()),
            "Canary10Percent5Minutes" => Self::canary(10, minutes(5)),
            "Canary10Percent10Minutes" => Self::canary(10, minutes(10)),
            "Canary10Percent15Minutes" => Self::canary(10, minutes(15)),
            "Canary10Percent30Minutes" => Self::canary(10, minutes(30)),
            "Linear10PercentEvery1Minute" => Self::linear(10, minutes(1)),
            "Linear10PercentEvery2Minutes" => Self::linear(10, minutes(2)),
            "Linear10PercentEvery3Minutes" => Self::linear(10, minutes(3)),
            "Linear10PercentEvery10Minutes" => Self::linear(10, minutes(10)),
            other => Err(ConfigError::UnknownPreset(other.to_string())),
        }
    }

    /// Names accepted by [`CanaryPlan::preset`].
    pub fn preset_names() -> &'static [&'static str] {
        &[
            "AllAtOnce",
            "Canary10Percent5Minutes",
            "Canary10Percent10Minutes",
            "Canary10Percent15Minutes",
            "Canary10Percent30Minutes",
            "Linear10PercentEvery1Minute",
            "Linear10PercentEvery2Minutes",
            "Linear10PercentEvery3Minutes",
            "Linear10PercentEvery10Minutes",
        ]
    }

    /// Check that steps are non-empty, non-decreasing, end at 100, and hold
    /// no longer than [`MAX_STEP_HOLD`].
    pub fn validate(&self) -> ConfigResult<()> {
        let Some(last) = self.steps.last() else {
            return Err(ConfigError::InvalidPlan("plan has no steps".to_string()));
        };
        let mut previous = 0u8;
        for (idx, step) in self.steps.iter().enumerate() {
            if step.weight == 0 || step.weight > 100 {
                return Err(ConfigError::InvalidPlan(format!(
                    "step {idx}: weight must be 1-100, got {}",
                    step.weight
                )));
            }
            if step.weight < previous {
                return Err(ConfigError::InvalidPlan(format!(
                    "step {idx}: weight {} is below previous step ({previous})",
                    step.weight
                )));
            }
            if step.hold > MAX_STEP_HOLD {
                return Err(ConfigError::InvalidPlan(format!(
                    "step {idx}: hold {} exceeds the {} limit",
                    format_duration(step.hold),
                    format_duration(MAX_STEP_HOLD)
                )));
            }
            previous = step.weight;
        }
        if last.weight != 100 {
            return Err(ConfigError::InvalidPlan(format!(
                "final step must be 100%, got {}%",
                last.weight
            )));
        }
        Ok(())
    }

    /// Sum of all hold durations.
    pub fn total_duration(&self) -> Duration {
        self.steps.iter().map(|s| s.hold).sum()
    }
}
