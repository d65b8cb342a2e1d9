//! Static checks on a pipeline definition, run before any stage executes.

use std::collections::{HashMap, HashSet};

use deployline_core::Pipeline;

use crate::error::{PipelineError, PipelineResult};
use crate::executor::ExecutorRegistry;

/// Validate `pipeline` against the executors that will run it.
///
/// Rejects empty pipelines, duplicate stage or action names, unknown
/// executors, actions whose inputs/outputs fall outside their stage's
/// declaration, artifacts produced twice, and stage inputs not produced by
/// a strictly earlier stage.
pub fn validate(pipeline: &Pipeline, executors: &ExecutorRegistry) -> PipelineResult<()> {
    let invalid = |msg: String| Err(PipelineError::Validation(msg));

    if pipeline.stages.is_empty() {
        return invalid(format!("pipeline {} has no stages", pipeline.name));
    }

    let mut stage_names = HashSet::new();
    // artifact name → producing stage
    let mut producers: HashMap<&str, &str> = HashMap::new();

    for stage in &pipeline.stages {
        if !stage_names.insert(stage.name.as_str()) {
            return invalid(format!("duplicate stage name {}", stage.name));
        }
        if stage.actions.is_empty() {
            return invalid(format!("stage {} has no actions", stage.name));
        }

        for input in &stage.inputs {
            if !producers.contains_key(input.as_str()) {
                return invalid(format!(
                    "stage {}: input {input} is not produced by an earlier stage",
                    stage.name
                ));
            }
        }

        let mut action_names = HashSet::new();
        let mut action_outputs = HashSet::new();
        for action in &stage.actions {
            if !action_names.insert(action.name.as_str()) {
                return invalid(format!(
                    "stage {}: duplicate action name {}",
                    stage.name, action.name
                ));
            }
            if !executors.contains(&action.executor) {
                return invalid(format!(
                    "stage {}: action {} uses unknown executor {}",
                    stage.name, action.name, action.executor
                ));
            }
            for input in &action.inputs {
                if !stage.inputs.contains(input) {
                    return invalid(format!(
                        "stage {}: action {} reads {input}, which the stage does not declare",
                        stage.name, action.name
                    ));
                }
            }
            for output in &action.outputs {
                if !stage.outputs.contains(output) {
                    return invalid(format!(
                        "stage {}: action {} writes {output}, which the stage does not declare",
                        stage.name, action.name
                    ));
                }
                if !action_outputs.insert(output.as_str()) {
                    return invalid(format!(
                        "stage {}: output {output} is written by more than one action",
                        stage.name
                    ));
                }
            }
        }

        for output in &stage.outputs {
            if !action_outputs.contains(output.as_str()) {
                return invalid(format!(
                    "stage {}: output {output} is not written by any action",
                    stage.name
                ));
            }
            if let Some(previous) = producers.insert(output.as_str(), stage.name.as_str()) {
                return invalid(format!(
                    "artifact {output} is produced by both {previous} and {}",
                    stage.name
                ));
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use deployline_core::{ActionSpec, Stage};

    use super::*;
    use crate::executor::{ActionContext, ActionExecutor, ActionOutputs};

    struct Noop;

    #[async_trait]
    impl ActionExecutor for Noop {
        async fn execute(&self, _ctx: ActionContext) -> anyhow::Result<ActionOutputs> {
            Ok(ActionOutputs::new())
        }
    }

    fn registry() -> ExecutorRegistry {
        ExecutorRegistry::new().register("noop", Arc::new(Noop))
    }

    fn source_then_build() -> Pipeline {
        Pipeline::new(
            "blog",
            vec![
                Stage::new("Source")
                    .with_outputs(["SRC"])
                    .with_action(ActionSpec::new("fetch", "noop").with_outputs(["SRC"])),
                Stage::new("Build")
                    .with_inputs(["SRC"])
                    .with_outputs(["BIN"])
                    .with_action(
                        ActionSpec::new("compile", "noop")
                            .with_inputs(["SRC"])
                            .with_outputs(["BIN"]),
                    ),
            ],
        )
    }

    fn message(result: PipelineResult<()>) -> String {
        match result {
            Err(PipelineError::Validation(msg)) => msg,
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn accepts_well_formed_pipeline() {
        validate(&source_then_build(), &registry()).unwrap();
    }

    #[test]
    fn rejects_empty_pipeline() {
        let msg = message(validate(&Pipeline::new("empty", vec![]), &registry()));
        assert!(msg.contains("no stages"));
    }

    #[test]
    fn rejects_input_from_same_or_later_stage() {
        let mut pipeline = source_then_build();
        pipeline.stages.swap(0, 1);
        let msg = message(validate(&pipeline, &registry()));
        assert!(msg.contains("not produced by an earlier stage"));

        // A stage cannot consume its own output either.
        let selfish = Pipeline::new(
            "loop",
            vec![Stage::new("Build")
                .with_inputs(["BIN"])
                .with_outputs(["BIN"])
                .with_action(ActionSpec::new("compile", "noop").with_outputs(["BIN"]))],
        );
        assert!(validate(&selfish, &registry()).is_err());
    }

    #[test]
    fn rejects_unknown_executor() {
        let mut pipeline = source_then_build();
        pipeline.stages[0].actions[0].executor = "codebuild".to_string();
        let msg = message(validate(&pipeline, &registry()));
        assert!(msg.contains("unknown executor codebuild"));
    }

    #[test]
    fn rejects_duplicate_stage_names() {
        let mut pipeline = source_then_build();
        pipeline.stages[1].name = "Source".to_string();
        let msg = message(validate(&pipeline, &registry()));
        assert!(msg.contains("duplicate stage name"));
    }

    #[test]
    fn rejects_action_io_outside_stage() {
        let mut pipeline = source_then_build();
        pipeline.stages[1].actions[0].outputs.push("EXTRA".to_string());
        let msg = message(validate(&pipeline, &registry()));
        assert!(msg.contains("does not declare"));
    }

    #[test]
    fn rejects_unwritten_stage_output() {
        let mut pipeline = source_then_build();
        pipeline.stages[0].outputs.push("ORPHAN".to_string());
        let msg = message(validate(&pipeline, &registry()));
        assert!(msg.contains("not written by any action"));
    }

    #[test]
    fn rejects_artifact_produced_twice() {
        let mut pipeline = source_then_build();
        pipeline.stages[1].outputs.push("SRC".to_string());
        pipeline.stages[1].actions[0].outputs.push("SRC".to_string());
        let msg = message(validate(&pipeline, &registry()));
        assert!(msg.contains("produced by both"));
    }
}
