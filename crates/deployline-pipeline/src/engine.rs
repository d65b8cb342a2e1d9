//! Pipeline engine — runs stages in order, actions in parallel.
//!
//! One run is driven by a single control task. For each stage the engine
//! checks that every declared input exists, fans the stage's actions out to
//! a bounded worker pool, waits for all of them, and only then commits the
//! outputs and moves on. The first failing stage ends the run.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};
use uuid::Uuid;

use deployline_artifacts::{ArtifactRef, ArtifactStore};
use deployline_core::{Pipeline, Stage};

use crate::error::{PipelineError, PipelineResult};
use crate::executor::{ActionContext, ActionOutputs, ExecutorRegistry};
use crate::report::{ActionReport, ActionStatus, RunResult, RunStatus, StageReport, StageStatus};
use crate::validation::validate;

/// Engine tuning.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Maximum number of actions executing at once, across the stage.
    pub max_parallel_actions: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_parallel_actions: 4,
        }
    }
}

/// Executes pipelines against an artifact store and a set of executors.
pub struct PipelineEngine {
    store: ArtifactStore,
    executors: ExecutorRegistry,
    workers: Arc<Semaphore>,
}

impl PipelineEngine {
    pub fn new(store: ArtifactStore, executors: ExecutorRegistry, config: EngineConfig) -> Self {
        let permits = config.max_parallel_actions.max(1);
        Self {
            store,
            executors,
            workers: Arc::new(Semaphore::new(permits)),
        }
    }

    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    /// Check a pipeline definition without running it.
    pub fn validate(&self, pipeline: &Pipeline) -> PipelineResult<()> {
        validate(pipeline, &self.executors)
    }

    /// Run a pipeline to completion.
    ///
    /// Returns `Err` only for definitions rejected before execution. A run
    /// that starts always yields a `RunResult`; a failed stage is reported
    /// in `RunResult::failure` and every later stage is marked `Skipped`.
    pub async fn run(&self, pipeline: &Pipeline) -> PipelineResult<RunResult> {
        self.validate(pipeline)?;

        let run_id = Uuid::new_v4().to_string();
        info!(
            %run_id,
            pipeline = %pipeline.name,
            stages = pipeline.stages.len(),
            "pipeline run started"
        );

        let mut produced: BTreeMap<String, ArtifactRef> = BTreeMap::new();
        let mut stages = Vec::with_capacity(pipeline.stages.len());
        let mut failure: Option<PipelineError> = None;

        for stage in &pipeline.stages {
            if failure.is_some() {
                stages.push(StageReport::not_run(stage, StageStatus::Skipped));
                continue;
            }
            debug!(%run_id, stage = %stage.name, "stage starting");
            let (report, result) = self
                .run_stage(&run_id, &pipeline.name, stage, &mut produced)
                .await;
            if let Err(err) = result {
                warn!(%run_id, stage = %stage.name, error = %err, "stage failed");
                failure = Some(err);
            } else {
                debug!(%run_id, stage = %stage.name, "stage succeeded");
            }
            stages.push(report);
        }

        let status = if failure.is_some() {
            RunStatus::Failed
        } else {
            RunStatus::Succeeded
        };
        info!(%run_id, pipeline = %pipeline.name, ?status, "pipeline run finished");

        Ok(RunResult {
            run_id,
            pipeline: pipeline.name.clone(),
            status,
            stages,
            artifacts: produced,
            failure,
        })
    }

    async fn run_stage(
        &self,
        run_id: &str,
        pipeline: &str,
        stage: &Stage,
        produced: &mut BTreeMap<String, ArtifactRef>,
    ) -> (StageReport, PipelineResult<()>) {
        let failed = |err: PipelineError| (StageReport::not_run(stage, StageStatus::Failed), Err(err));

        // Fail fast: no action starts unless every input is present.
        let mut inputs: BTreeMap<&str, Vec<u8>> = BTreeMap::new();
        for name in &stage.inputs {
            let missing = || PipelineError::MissingArtifact {
                stage: stage.name.clone(),
                artifact: name.clone(),
            };
            let Some(artifact) = produced.get(name) else {
                return failed(missing());
            };
            match self.store.get(artifact) {
                Ok(bytes) => {
                    inputs.insert(name.as_str(), bytes);
                }
                Err(deployline_artifacts::ArtifactError::NotFound(_)) => return failed(missing()),
                Err(e) => return failed(e.into()),
            }
        }

        let mut tasks = JoinSet::new();
        for (index, action) in stage.actions.iter().enumerate() {
            let Some(executor) = self.executors.get(&action.executor) else {
                return failed(PipelineError::Validation(format!(
                    "unknown executor {}",
                    action.executor
                )));
            };
            let ctx = ActionContext {
                run_id: run_id.to_string(),
                pipeline: pipeline.to_string(),
                stage: stage.name.clone(),
                action: action.clone(),
                inputs: action
                    .inputs
                    .iter()
                    .filter_map(|n| inputs.get(n.as_str()).map(|b| (n.clone(), b.clone())))
                    .collect(),
            };
            let workers = self.workers.clone();
            tasks.spawn(async move {
                let started = Instant::now();
                let result = match workers.acquire_owned().await {
                    Ok(_permit) => executor.execute(ctx).await,
                    Err(e) => Err(anyhow::anyhow!("worker pool closed: {e}")),
                };
                (index, result, started.elapsed())
            });
        }

        // Fan-in: wait for every action, then judge in declaration order so
        // the reported failure does not depend on completion order.
        let mut results: Vec<Option<(anyhow::Result<ActionOutputs>, u64)>> =
            (0..stage.actions.len()).map(|_| None).collect();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, result, elapsed)) => {
                    results[index] = Some((result, elapsed.as_millis() as u64));
                }
                Err(e) => warn!(stage = %stage.name, error = %e, "action task aborted"),
            }
        }

        let mut reports = Vec::with_capacity(stage.actions.len());
        let mut outputs: Vec<ActionOutputs> = Vec::with_capacity(stage.actions.len());
        let mut first_error: Option<PipelineError> = None;

        for (action, slot) in stage.actions.iter().zip(results) {
            let (result, elapsed_ms) = match slot {
                Some(pair) => pair,
                None => (Err(anyhow::anyhow!("action task panicked")), 0),
            };
            let checked = result.and_then(|out| {
                check_outputs(&action.outputs, &out)?;
                Ok(out)
            });
            let status = match checked {
                Ok(out) => {
                    outputs.push(out);
                    ActionStatus::Succeeded
                }
                Err(e) => {
                    let reason = format!("{e:#}");
                    debug!(stage = %stage.name, action = %action.name, %reason, "action failed");
                    if first_error.is_none() {
                        first_error = Some(PipelineError::ActionFailure {
                            stage: stage.name.clone(),
                            action: action.name.clone(),
                            reason: reason.clone(),
                        });
                    }
                    ActionStatus::Failed { reason }
                }
            };
            reports.push(ActionReport {
                name: action.name.clone(),
                status,
                elapsed_ms,
            });
        }

        if let Some(err) = first_error {
            let report = StageReport {
                name: stage.name.clone(),
                status: StageStatus::Failed,
                actions: reports,
            };
            return (report, Err(err));
        }

        // Commit in declaration order, then by output name.
        for out in outputs {
            for (name, bytes) in out {
                match self.store.put(&name, &bytes) {
                    Ok(artifact) => {
                        debug!(stage = %stage.name, artifact = %artifact, "artifact committed");
                        produced.insert(name, artifact);
                    }
                    Err(e) => {
                        let report = StageReport {
                            name: stage.name.clone(),
                            status: StageStatus::Failed,
                            actions: reports,
                        };
                        return (report, Err(e.into()));
                    }
                }
            }
        }

        let report = StageReport {
            name: stage.name.clone(),
            status: StageStatus::Succeeded,
            actions: reports,
        };
        (report, Ok(()))
    }
}

/// An action must return exactly the outputs it declared.
fn check_outputs(declared: &[String], outputs: &ActionOutputs) -> anyhow::Result<()> {
    for name in declared {
        if !outputs.contains_key(name) {
            anyhow::bail!("declared output {name} was not produced");
        }
    }
    for name in outputs.keys() {
        if !declared.contains(name) {
            anyhow::bail!("produced undeclared output {name}");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use deployline_core::ActionSpec;

    use super::*;
    use crate::executor::ActionExecutor;

    /// Records start/finish events and echoes inputs into outputs.
    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<String>>,
        calls: AtomicUsize,
    }

    impl Recorder {
        fn events(&self) -> Vec<String> {
            self.events.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ActionExecutor for Recorder {
        async fn execute(&self, ctx: ActionContext) -> anyhow::Result<ActionOutputs> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.events
                .lock()
                .unwrap()
                .push(format!("start {}/{}", ctx.stage, ctx.action.name));

            if let Some(ms) = ctx.action.config.get("sleep_ms").and_then(|v| v.as_u64()) {
                tokio::time::sleep(Duration::from_millis(ms)).await;
            }
            if ctx.action.config.get("fail").is_some() {
                anyhow::bail!("exit status 2");
            }

            let mut seed = ctx.action.name.clone().into_bytes();
            for bytes in ctx.inputs.values() {
                seed.extend_from_slice(bytes);
            }
            let outputs = ctx
                .action
                .outputs
                .iter()
                .map(|name| (name.clone(), seed.clone()))
                .collect();

            self.events
                .lock()
                .unwrap()
                .push(format!("finish {}/{}", ctx.stage, ctx.action.name));
            Ok(outputs)
        }
    }

    fn engine_with(recorder: Arc<Recorder>) -> PipelineEngine {
        let store = ArtifactStore::open_in_memory().unwrap();
        let executors = ExecutorRegistry::new().register("record", recorder);
        PipelineEngine::new(store, executors, EngineConfig::default())
    }

    /// Source (two parallel fetches) → Build → Deploy.
    fn blog_pipeline() -> Pipeline {
        Pipeline::new(
            "blog",
            vec![
                Stage::new("Source")
                    .with_outputs(["LAMBDA_SOURCE", "CDK_SOURCE"])
                    .with_action(
                        ActionSpec::new("lambda-source", "record")
                            .with_outputs(["LAMBDA_SOURCE"])
                            .with_config(serde_json::json!({ "sleep_ms": 20 })),
                    )
                    .with_action(ActionSpec::new("cdk-source", "record").with_outputs(["CDK_SOURCE"])),
                Stage::new("Build")
                    .with_inputs(["LAMBDA_SOURCE"])
                    .with_outputs(["LAMBDA_BUILD"])
                    .with_action(
                        ActionSpec::new("lambda-build", "record")
                            .with_inputs(["LAMBDA_SOURCE"])
                            .with_outputs(["LAMBDA_BUILD"]),
                    ),
                Stage::new("Deploy")
                    .with_inputs(["CDK_SOURCE", "LAMBDA_BUILD"])
                    .with_outputs(["CDK_BUILD"])
                    .with_action(
                        ActionSpec::new("cdk-deploy", "record")
                            .with_inputs(["CDK_SOURCE", "LAMBDA_BUILD"])
                            .with_outputs(["CDK_BUILD"]),
                    ),
            ],
        )
    }

    fn position(events: &[String], needle: &str) -> usize {
        events
            .iter()
            .position(|e| e == needle)
            .unwrap_or_else(|| panic!("missing event {needle}: {events:?}"))
    }

    #[tokio::test]
    async fn runs_stages_in_order() {
        let recorder = Arc::new(Recorder::default());
        let engine = engine_with(recorder.clone());

        let result = engine.run(&blog_pipeline()).await.unwrap();
        assert!(result.succeeded(), "{:?}", result.failure);
        assert_eq!(result.artifacts.len(), 4);

        let events = recorder.events();
        // Build starts only after both Source actions finished.
        let build = position(&events, "start Build/lambda-build");
        assert!(position(&events, "finish Source/lambda-source") < build);
        assert!(position(&events, "finish Source/cdk-source") < build);
        assert!(position(&events, "finish Build/lambda-build") < position(&events, "start Deploy/cdk-deploy"));
    }

    #[tokio::test]
    async fn actions_within_a_stage_overlap() {
        let recorder = Arc::new(Recorder::default());
        let engine = engine_with(recorder.clone());
        engine.run(&blog_pipeline()).await.unwrap();

        let events = recorder.events();
        // cdk-source starts before the slow lambda-source finishes.
        assert!(position(&events, "start Source/cdk-source") < position(&events, "finish Source/lambda-source"));
    }

    #[tokio::test]
    async fn failed_action_stops_the_run() {
        let recorder = Arc::new(Recorder::default());
        let engine = engine_with(recorder.clone());

        let mut pipeline = blog_pipeline();
        pipeline.stages[1].actions[0].config = serde_json::json!({ "fail": true });

        let result = engine.run(&pipeline).await.unwrap();
        assert_eq!(result.status, RunStatus::Failed);
        assert_eq!(
            result.failure,
            Some(PipelineError::ActionFailure {
                stage: "Build".to_string(),
                action: "lambda-build".to_string(),
                reason: "exit status 2".to_string(),
            })
        );
        assert_eq!(result.stage("Build").unwrap().status, StageStatus::Failed);
        assert_eq!(result.stage("Deploy").unwrap().status, StageStatus::Skipped);
        assert!(!recorder.events().iter().any(|e| e.contains("Deploy")));
        assert!(result.artifact("LAMBDA_BUILD").is_none());
        assert!(result.into_result().is_err());
    }

    /// Claims success but never writes its declared output.
    struct Forgetful;

    #[async_trait]
    impl ActionExecutor for Forgetful {
        async fn execute(&self, _ctx: ActionContext) -> anyhow::Result<ActionOutputs> {
            Ok(ActionOutputs::new())
        }
    }

    #[tokio::test]
    async fn missing_output_is_an_action_failure() {
        let store = ArtifactStore::open_in_memory().unwrap();
        let executors = ExecutorRegistry::new().register("forgetful", Arc::new(Forgetful));
        let engine = PipelineEngine::new(store, executors, EngineConfig::default());

        let pipeline = Pipeline::new(
            "p",
            vec![Stage::new("Build")
                .with_outputs(["BIN"])
                .with_action(ActionSpec::new("compile", "forgetful").with_outputs(["BIN"]))],
        );
        let result = engine.run(&pipeline).await.unwrap();
        match result.failure {
            Some(PipelineError::ActionFailure { reason, .. }) => {
                assert!(reason.contains("BIN was not produced"))
            }
            other => panic!("unexpected failure: {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_input_fails_fast_without_running_actions() {
        let recorder = Arc::new(Recorder::default());
        let engine = engine_with(recorder.clone());
        let pipeline = blog_pipeline();

        // Drive the Deploy stage directly with only one of its two inputs.
        let mut produced = BTreeMap::new();
        let cdk = engine.store().put("CDK_SOURCE", b"cdk").unwrap();
        produced.insert("CDK_SOURCE".to_string(), cdk);

        let deploy = pipeline.stage("Deploy").unwrap();
        let (report, result) = engine.run_stage("run-1", "blog", deploy, &mut produced).await;

        assert_eq!(
            result,
            Err(PipelineError::MissingArtifact {
                stage: "Deploy".to_string(),
                artifact: "LAMBDA_BUILD".to_string(),
            })
        );
        assert_eq!(report.status, StageStatus::Failed);
        assert!(report.actions.iter().all(|a| a.status == ActionStatus::NotRun));
        assert_eq!(recorder.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn reruns_produce_identical_bytes_under_new_refs() {
        let recorder = Arc::new(Recorder::default());
        let engine = engine_with(recorder);
        let pipeline = blog_pipeline();

        let first = engine.run(&pipeline).await.unwrap();
        let second = engine.run(&pipeline).await.unwrap();
        assert_ne!(first.run_id, second.run_id);

        for (name, a) in &first.artifacts {
            let b = &second.artifacts[name];
            assert_ne!(a.id, b.id, "{name} should get a fresh ref");
            assert_eq!(a.digest, b.digest, "{name} should be byte-identical");
        }
    }

    #[tokio::test]
    async fn artifact_ids_follow_declaration_order() {
        let recorder = Arc::new(Recorder::default());
        let engine = engine_with(recorder);

        // lambda-source sleeps, so cdk-source finishes first; ids must not care.
        let result = engine.run(&blog_pipeline()).await.unwrap();
        assert!(result.artifacts["LAMBDA_SOURCE"].id < result.artifacts["CDK_SOURCE"].id);
    }

    #[tokio::test]
    async fn invalid_pipeline_is_rejected_before_running() {
        let recorder = Arc::new(Recorder::default());
        let engine = engine_with(recorder.clone());

        let mut pipeline = blog_pipeline();
        pipeline.stages.swap(0, 2);
        assert!(matches!(
            engine.run(&pipeline).await,
            Err(PipelineError::Validation(_))
        ));
        assert_eq!(recorder.calls.load(Ordering::SeqCst), 0);
    }
}
