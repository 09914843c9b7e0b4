//! One composition job, end to end.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use reel_media::{
    layout, AssetFs, AssetLedger, CompositionPlanner, MaterializedAsset, MediaError, MediaFacts, PlanInputs, PlanShape,
    Probe, ReleaseGuard, SecondaryClip, SourceResolver, StageExecutor, TokioFs, ToolRunner,
};
use reel_models::{CaptionRequest, CompositionRequest, ContentKind, JobId};
use reel_storage::ArtifactStore;
use serde::Serialize;
use tokio::sync::watch;
use tracing::Instrument;

use crate::config::PipelineConfig;
use crate::error::{PipelineError, PipelineResult};
use crate::logging::JobLogger;
use crate::metrics as job_metrics;

/// Result of a successful job.
#[derive(Debug, Clone, Serialize)]
pub struct ComposedVideo {
    pub job_id: JobId,
    /// Public URL of the uploaded artifact
    pub url: String,
    pub shape: PlanShape,
    pub stages: usize,
}

/// Inputs after materialization and probing.
struct ProbedInputs {
    primary: MaterializedAsset,
    primary_facts: MediaFacts,
    audio: Option<PathBuf>,
    secondary: Option<SecondaryClip>,
}

/// Runs composition jobs.
pub struct Composer {
    config: PipelineConfig,
    resolver: SourceResolver,
    probe: Probe,
    planner: CompositionPlanner,
    executor: StageExecutor,
    store: Arc<dyn ArtifactStore>,
    fs: Arc<dyn AssetFs>,
}

impl Composer {
    pub fn new(
        config: PipelineConfig,
        runner: Arc<dyn ToolRunner>,
        store: Arc<dyn ArtifactStore>,
    ) -> PipelineResult<Self> {
        let resolver = SourceResolver::with_timeout(config.fetch_timeout)?;
        let probe = Probe::new(Arc::clone(&runner), config.ffprobe_bin.clone());
        let planner = CompositionPlanner::new(
            config.encoding.clone(),
            config.font_file.clone(),
            config.ffmpeg_bin.clone(),
        );

        Ok(Self {
            resolver,
            probe,
            planner,
            executor: StageExecutor::new(runner),
            store,
            fs: Arc::new(TokioFs),
            config,
        })
    }

    /// Replace the filesystem used for temporary assets.
    pub fn with_fs(mut self, fs: Arc<dyn AssetFs>) -> Self {
        self.fs = fs;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn ArtifactStore> {
        &self.store
    }

    /// Run one job to completion.
    pub async fn compose(&self, request: CompositionRequest) -> PipelineResult<ComposedVideo> {
        self.run(request, None).await
    }

    /// Run one job, abandoning it as soon as `cancel` turns `true`.
    ///
    /// The in-flight tool process is killed when its future is dropped and
    /// every asset is released before `Cancelled` is returned.
    pub async fn compose_with_cancel(
        &self,
        request: CompositionRequest,
        cancel: watch::Receiver<bool>,
    ) -> PipelineResult<ComposedVideo> {
        self.run(request, Some(cancel)).await
    }

    async fn run(
        &self,
        request: CompositionRequest,
        cancel: Option<watch::Receiver<bool>>,
    ) -> PipelineResult<ComposedVideo> {
        let started = Instant::now();

        if request.primary.is_none() {
            let err = PipelineError::validation("No video source provided");
            job_metrics::record_job_failed(err.kind());
            return Err(err);
        }

        let job_id = JobId::new();
        let logger = JobLogger::new(&job_id, "compose");
        let span = logger.create_span();

        let ledger = Arc::new(AssetLedger::new(
            job_id.clone(),
            self.config.work_dir.clone(),
            Arc::clone(&self.fs),
        ));
        // Covers a dropped request future; the explicit release below covers the rest
        let _guard = ReleaseGuard::new(Arc::clone(&ledger));

        let outcome = async {
            logger.log_start(&format!(
                "audio={} second_clip={} caption={}",
                request.audio.is_some(),
                request.secondary.is_some(),
                request.caption_text.as_deref().is_some_and(|t| !t.trim().is_empty()),
            ));

            let result = tokio::select! {
                result = self.run_job(&request, &ledger, &logger) => result,
                _ = cancelled(cancel) => {
                    logger.log_warning("Cancellation requested, abandoning job");
                    Err(MediaError::Cancelled.into())
                }
            };

            ledger.release_all().await;
            result
        }
        .instrument(span)
        .await;

        match outcome {
            Ok(video) => {
                job_metrics::record_job_completed(started.elapsed().as_secs_f64());
                logger.log_completion(&video.url);
                Ok(video)
            }
            Err(e) => {
                if let Some(diagnostics) = e.diagnostics() {
                    logger.log_error(&format!("{} ({} diagnostics: {})", e, e.kind(), diagnostics.trim()));
                } else {
                    logger.log_error(&format!("{} ({})", e, e.kind()));
                }
                job_metrics::record_job_failed(e.kind());
                Err(e)
            }
        }
    }

    async fn run_job(
        &self,
        request: &CompositionRequest,
        ledger: &AssetLedger,
        logger: &JobLogger,
    ) -> PipelineResult<ComposedVideo> {
        ledger.prepare().await.map_err(MediaError::from)?;

        let inputs = self.materialize_and_probe(request, ledger, logger).await?;

        let encoding = self.planner.encoding();
        let overlay = layout(&CaptionRequest::new(
            request.caption_text.clone().unwrap_or_default(),
            request.anchor,
            encoding.width,
            encoding.height,
        ));

        let plan_inputs = PlanInputs {
            primary: inputs.primary.path.clone(),
            primary_facts: inputs.primary_facts,
            audio: inputs.audio,
            secondary: inputs.secondary,
            overlay,
        };
        let plan = self
            .planner
            .plan(&plan_inputs, |_| ledger.allocate(ContentKind::Video, "mp4").path)?;
        logger.log_progress(&format!("planned {} stage(s), shape {:?}", plan.len(), plan.shape));

        let final_output = self.executor.execute(&plan, ledger).await?;

        let upload_started = Instant::now();
        let url = self
            .store
            .upload_artifact(&final_output, &self.config.upload_folder, self.config.upload_chunk_size)
            .await?;
        job_metrics::record_upload_duration(upload_started.elapsed().as_secs_f64());

        Ok(ComposedVideo {
            job_id: ledger.job_id().clone(),
            url,
            shape: plan.shape,
            stages: plan.len(),
        })
    }

    /// Resolve all inputs concurrently, then probe them concurrently.
    async fn materialize_and_probe(
        &self,
        request: &CompositionRequest,
        ledger: &AssetLedger,
        logger: &JobLogger,
    ) -> PipelineResult<ProbedInputs> {
        let primary_spec = request
            .primary
            .as_ref()
            .ok_or_else(|| PipelineError::validation("No video source provided"))?;

        let (primary, audio, secondary) = tokio::try_join!(
            self.resolver.resolve(primary_spec, ContentKind::Video, ledger),
            self.resolver
                .resolve_optional(request.audio.as_ref(), ContentKind::Audio, ledger),
            self.resolver
                .resolve_optional(request.secondary.as_ref(), ContentKind::Video, ledger),
        )?;

        let (mut primary_facts, audio_has_stream, secondary_duration) = tokio::try_join!(
            self.probe.facts(&primary.path),
            async {
                match &audio {
                    Some(asset) => self.probe.has_audio_stream(&asset.path).await.map(Some),
                    None => Ok(None),
                }
            },
            async {
                match &secondary {
                    Some(asset) => self.probe.duration(&asset.path).await.map(Some),
                    None => Ok(None),
                }
            },
        )?;

        let audio = match (audio, audio_has_stream) {
            (Some(asset), Some(true)) => Some(asset.path),
            (Some(_), _) => {
                logger.log_warning("Background audio has no audio stream, ignoring it");
                None
            }
            (None, _) => None,
        };

        let mut secondary = secondary.zip(secondary_duration).map(|(asset, duration)| SecondaryClip {
            path: asset.path,
            duration,
        });

        // The combined audio trim needs both lengths; re-probe strictly so the
        // failure carries the tool's diagnostics
        if let (Some(clip), Some(_)) = (secondary.as_mut(), audio.as_ref()) {
            if primary_facts.duration.is_none() {
                primary_facts.duration = Some(self.probe.required_duration(&primary.path, "primary clip").await?);
            }
            if clip.duration.is_none() {
                clip.duration = Some(self.probe.required_duration(&clip.path, "appended clip").await?);
            }
        }

        Ok(ProbedInputs {
            primary,
            primary_facts,
            audio,
            secondary,
        })
    }
}

/// Resolves once the receiver reads `true`; never resolves without one.
async fn cancelled(cancel: Option<watch::Receiver<bool>>) {
    let Some(mut rx) = cancel else {
        return std::future::pending().await;
    };

    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            // Sender gone without cancelling
            return std::future::pending().await;
        }
    }
}
