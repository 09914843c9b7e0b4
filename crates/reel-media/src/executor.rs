//! Sequential stage execution.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use metrics::histogram;
use tracing::{error, info};

use crate::assets::AssetLedger;
use crate::command::Stage;
use crate::error::{MediaError, MediaResult};
use crate::planner::CompositionPlan;
use crate::runner::ToolRunner;

/// Histogram of per-stage wall time.
pub const STAGE_DURATION_SECONDS: &str = "reel_stage_duration_seconds";

/// Runs a plan's stages strictly in order.
#[derive(Clone)]
pub struct StageExecutor {
    runner: Arc<dyn ToolRunner>,
}

impl StageExecutor {
    pub fn new(runner: Arc<dyn ToolRunner>) -> Self {
        Self { runner }
    }

    /// Run every stage and return the final output path.
    ///
    /// The first failure stops the plan. Before it is returned, every asset
    /// in `ledger` (including the failing stage's partial output) is released.
    pub async fn execute(&self, plan: &CompositionPlan, ledger: &AssetLedger) -> MediaResult<PathBuf> {
        let total = plan.len();

        for (index, stage) in plan.stages.iter().enumerate() {
            info!(
                job_id = %ledger.job_id(),
                stage = %stage.kind,
                step = index + 1,
                total,
                "Starting stage"
            );

            if let Err(e) = self.run_stage(stage, ledger).await {
                if let Some(diagnostics) = e.diagnostics() {
                    error!(
                        job_id = %ledger.job_id(),
                        stage = %stage.kind,
                        stderr = %diagnostics.trim(),
                        "Stage diagnostics"
                    );
                }
                error!(job_id = %ledger.job_id(), stage = %stage.kind, error = %e, "Stage failed, releasing assets");
                ledger.release_all().await;
                return Err(e);
            }
        }

        plan.final_output()
            .map(|p| p.to_path_buf())
            .ok_or_else(|| MediaError::internal("composition plan has no stages"))
    }

    async fn run_stage(&self, stage: &Stage, ledger: &AssetLedger) -> MediaResult<()> {
        // A stage's output may be written even when the tool fails
        ledger.register(&stage.output);

        let start = Instant::now();
        let output = self.runner.run(&stage.tool, &stage.args).await;
        let elapsed = start.elapsed().as_secs_f64();
        histogram!(STAGE_DURATION_SECONDS, "stage" => stage.kind.as_str()).record(elapsed);

        let output = output?;
        if !output.success {
            return Err(MediaError::transcode_failed(
                stage.kind.as_str(),
                output.exit_code,
                output.stderr,
            ));
        }

        match ledger.fs().len(&stage.output).await {
            Ok(len) if len > 0 => {
                info!(
                    job_id = %ledger.job_id(),
                    stage = %stage.kind,
                    bytes = len,
                    elapsed_secs = elapsed,
                    "Stage complete"
                );
                Ok(())
            }
            _ => Err(MediaError::MissingOutput {
                stage: stage.kind.to_string(),
                path: stage.output.clone(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::testing::FakeFs;
    use crate::command::{FfmpegCommand, StageKind};
    use crate::planner::{PlanShape, RenderShape};
    use crate::runner::ToolOutput;
    use async_trait::async_trait;
    use reel_models::{ContentKind, JobId};
    use std::path::Path;
    use std::sync::Mutex;

    /// Runs scripted exit codes in order, writing the output (last arg) on success.
    struct ScriptedRunner {
        fs: Arc<FakeFs>,
        exits: Mutex<Vec<i32>>,
        calls: Mutex<Vec<Vec<String>>>,
        write_output: bool,
    }

    impl ScriptedRunner {
        fn new(fs: Arc<FakeFs>, exits: Vec<i32>) -> Self {
            Self {
                fs,
                exits: Mutex::new(exits),
                calls: Mutex::new(Vec::new()),
                write_output: true,
            }
        }
    }

    #[async_trait]
    impl ToolRunner for ScriptedRunner {
        async fn run(&self, _program: &str, args: &[String]) -> MediaResult<ToolOutput> {
            self.calls.lock().unwrap().push(args.to_vec());
            let code = self.exits.lock().unwrap().remove(0);
            let out = Path::new(args.last().unwrap());
            // A failing tool leaves a partial file behind
            if self.write_output || code != 0 {
                self.fs.put(out, b"partial or complete");
            }
            Ok(ToolOutput {
                exit_code: Some(code),
                success: code == 0,
                stdout: String::new(),
                stderr: if code == 0 { String::new() } else { format!("error in stage (exit {code})") },
            })
        }
    }

    fn two_stage_plan(ledger: &AssetLedger) -> CompositionPlan {
        let primary = ledger.allocate(ContentKind::Video, "mp4");
        let demo = ledger.allocate(ContentKind::Video, "mp4");
        let rendered = ledger.allocate(ContentKind::Video, "mp4");
        let appended = ledger.allocate(ContentKind::Video, "mp4");

        CompositionPlan {
            shape: PlanShape::RenderThenAppend {
                render: RenderShape::VideoOnly { source_audio: false },
                audio_duration: None,
            },
            stages: vec![
                FfmpegCommand::new(&primary.path, &rendered.path).into_stage(StageKind::Render, "ffmpeg"),
                FfmpegCommand::new(&rendered.path, &appended.path)
                    .input(&demo.path)
                    .into_stage(StageKind::Concat, "ffmpeg"),
            ],
        }
    }

    fn setup() -> (Arc<FakeFs>, AssetLedger) {
        let fs = Arc::new(FakeFs::default());
        let ledger = AssetLedger::new(JobId::from_string("job"), "/work", fs.clone());
        (fs, ledger)
    }

    #[tokio::test]
    async fn test_runs_all_stages_in_order() {
        let (fs, ledger) = setup();
        let plan = two_stage_plan(&ledger);
        let runner = Arc::new(ScriptedRunner::new(fs.clone(), vec![0, 0]));
        let executor = StageExecutor::new(runner.clone());

        let output = executor.execute(&plan, &ledger).await.unwrap();

        assert_eq!(output, plan.stages[1].output);
        let calls = runner.calls.lock().unwrap();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0], plan.stages[0].args);
        assert_eq!(calls[1], plan.stages[1].args);
        assert!(ledger.has_pending());
    }

    #[tokio::test]
    async fn test_first_failure_stops_plan_and_releases() {
        let (fs, ledger) = setup();
        let plan = two_stage_plan(&ledger);
        let runner = Arc::new(ScriptedRunner::new(fs.clone(), vec![1, 0]));
        let executor = StageExecutor::new(runner.clone());

        let err = executor.execute(&plan, &ledger).await.unwrap_err();

        match &err {
            MediaError::TranscodeFailed { stage, exit_code, stderr } => {
                assert_eq!(stage, "render");
                assert_eq!(*exit_code, Some(1));
                assert!(stderr.contains("exit 1"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(runner.calls.lock().unwrap().len(), 1);
        assert!(!ledger.has_pending());
        assert!(!fs.exists(&plan.stages[0].output));
        for path in ledger.registered() {
            assert!(!fs.exists(&path));
        }
    }

    #[tokio::test]
    async fn test_second_stage_failure_is_reported() {
        let (fs, ledger) = setup();
        let plan = two_stage_plan(&ledger);
        let executor = StageExecutor::new(Arc::new(ScriptedRunner::new(fs.clone(), vec![0, 2])));

        let err = executor.execute(&plan, &ledger).await.unwrap_err();

        assert!(matches!(err, MediaError::TranscodeFailed { ref stage, exit_code: Some(2), .. } if stage == "concat"));
        assert!(fs.files.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_empty_output_is_failure() {
        let (fs, ledger) = setup();
        let plan = two_stage_plan(&ledger);
        let mut runner = ScriptedRunner::new(fs.clone(), vec![0, 0]);
        runner.write_output = false;
        let runner = Arc::new(runner);
        let executor = StageExecutor::new(runner.clone());

        let err = executor.execute(&plan, &ledger).await.unwrap_err();

        assert!(matches!(err, MediaError::MissingOutput { .. }));
        assert_eq!(runner.calls.lock().unwrap().len(), 1);
        assert!(!ledger.has_pending());
    }

    #[tokio::test]
    async fn test_launch_failure_propagates() {
        struct Missing;

        #[async_trait]
        impl ToolRunner for Missing {
            async fn run(&self, program: &str, _args: &[String]) -> MediaResult<ToolOutput> {
                Err(MediaError::tool_unavailable(program, "not on PATH"))
            }
        }

        let (_fs, ledger) = setup();
        let plan = two_stage_plan(&ledger);
        let err = StageExecutor::new(Arc::new(Missing)).execute(&plan, &ledger).await.unwrap_err();

        assert!(matches!(err, MediaError::ToolUnavailable { .. }));
        assert!(!ledger.has_pending());
    }
}
