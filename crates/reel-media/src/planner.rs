//! Composition planning.
//!
//! The branching on (audio present, primary duration known, second clip
//! present) is captured once in [`PlanShape`]; stage argument construction
//! then matches on the shape exhaustively.

use std::path::{Path, PathBuf};

use reel_models::EncodingConfig;
use serde::Serialize;
use tracing::debug;

use crate::caption::OverlayPlan;
use crate::command::{FfmpegCommand, Stage, StageKind};
use crate::error::{MediaError, MediaResult};
use crate::filters;
use crate::probe::MediaFacts;

/// How the first (render) stage treats audio.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RenderShape {
    /// No background audio. The primary's own audio is copied when present.
    VideoOnly { source_audio: bool },
    /// Background audio trimmed to the primary clip's duration.
    TrimmedAudio { duration: f64 },
    /// Background audio, primary duration unknown: stop at the shortest input.
    ShortestAudio,
}

/// Overall pipeline shape.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PlanShape {
    /// One render stage.
    Render(RenderShape),
    /// Render the primary, then append the second clip.
    ///
    /// `audio_duration` is the combined length the original background audio
    /// is trimmed to in the append stage; `None` when there is no audio.
    RenderThenAppend {
        render: RenderShape,
        audio_duration: Option<f64>,
    },
}

impl PlanShape {
    pub fn render(&self) -> RenderShape {
        match self {
            PlanShape::Render(render) | PlanShape::RenderThenAppend { render, .. } => *render,
        }
    }

    pub fn stage_count(&self) -> usize {
        match self {
            PlanShape::Render(_) => 1,
            PlanShape::RenderThenAppend { .. } => 2,
        }
    }
}

/// Second clip to append.
#[derive(Debug, Clone, PartialEq)]
pub struct SecondaryClip {
    pub path: PathBuf,
    /// Length in seconds, `None` when unknown; only needed with background audio
    pub duration: Option<f64>,
}

/// Everything the planner needs, already materialized and probed.
#[derive(Debug, Clone)]
pub struct PlanInputs {
    pub primary: PathBuf,
    pub primary_facts: MediaFacts,
    /// Background audio, only when it carries an audio stream
    pub audio: Option<PathBuf>,
    pub secondary: Option<SecondaryClip>,
    pub overlay: OverlayPlan,
}

/// Ordered stage list for one job.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompositionPlan {
    pub shape: PlanShape,
    pub stages: Vec<Stage>,
}

impl CompositionPlan {
    /// Output of the last stage.
    pub fn final_output(&self) -> Option<&Path> {
        self.stages.last().map(|s| s.output.as_path())
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }
}

/// Builds deterministic stage lists.
#[derive(Debug, Clone)]
pub struct CompositionPlanner {
    encoding: EncodingConfig,
    font_file: PathBuf,
    ffmpeg: String,
}

impl CompositionPlanner {
    pub fn new(encoding: EncodingConfig, font_file: impl Into<PathBuf>, ffmpeg: impl Into<String>) -> Self {
        Self {
            encoding,
            font_file: font_file.into(),
            ffmpeg: ffmpeg.into(),
        }
    }

    pub fn encoding(&self) -> &EncodingConfig {
        &self.encoding
    }

    /// Choose the pipeline shape.
    ///
    /// A second clip always yields the two-stage shape. With background audio
    /// it needs both durations to compute the combined trim, and a missing
    /// one is a probe failure.
    pub fn select_shape(inputs: &PlanInputs) -> MediaResult<PlanShape> {
        let has_audio = inputs.audio.is_some();

        // A zero length cannot drive a trim; fall back to the shortest policy
        let render_duration = inputs.primary_facts.duration.filter(|d| *d > 0.0);
        let render = match (has_audio, render_duration) {
            (false, _) => RenderShape::VideoOnly {
                source_audio: inputs.primary_facts.has_audio,
            },
            (true, Some(duration)) => RenderShape::TrimmedAudio { duration },
            (true, None) => RenderShape::ShortestAudio,
        };

        let Some(secondary) = &inputs.secondary else {
            return Ok(PlanShape::Render(render));
        };

        let audio_duration = if has_audio {
            let primary = inputs.primary_facts.duration.ok_or_else(|| {
                MediaError::probe_failed("primary clip duration is required to append a second clip", None)
            })?;
            let appended = secondary.duration.ok_or_else(|| {
                MediaError::probe_failed("appended clip duration is required to trim background audio", None)
            })?;
            Some(primary + appended)
        } else {
            None
        };

        Ok(PlanShape::RenderThenAppend { render, audio_duration })
    }

    /// Plan every stage.
    ///
    /// `allocate_output` is called once per stage, in order, for the path the
    /// stage writes; callers register it for cleanup.
    pub fn plan(
        &self,
        inputs: &PlanInputs,
        mut allocate_output: impl FnMut(StageKind) -> PathBuf,
    ) -> MediaResult<CompositionPlan> {
        let shape = Self::select_shape(inputs)?;

        let rendered = allocate_output(StageKind::Render);
        let mut stages = vec![self.render_stage(inputs, shape.render(), &rendered)];

        if let (PlanShape::RenderThenAppend { audio_duration, .. }, Some(secondary)) = (&shape, &inputs.secondary) {
            let appended = allocate_output(StageKind::Concat);
            stages.push(self.append_stage(
                &rendered,
                &secondary.path,
                inputs.audio.as_deref().zip(*audio_duration),
                &appended,
            ));
        }

        debug!(shape = ?shape, stages = stages.len(), "Planned composition");

        Ok(CompositionPlan { shape, stages })
    }

    fn render_stage(&self, inputs: &PlanInputs, render: RenderShape, output: &Path) -> Stage {
        let enc = &self.encoding;
        let chain = filters::render_chain(enc.width, enc.height, &inputs.overlay, &self.font_file);
        let mut cmd = FfmpegCommand::new(&inputs.primary, output);

        cmd = match (render, inputs.audio.as_deref()) {
            (RenderShape::TrimmedAudio { duration }, Some(audio)) => cmd
                .input(audio)
                .filter_complex(filters::audio_trim("1:a", duration, "a"))
                .map("0:v")
                .map("[a]")
                .output_args(enc.video_args())
                .output_args(enc.audio_args()),
            (RenderShape::ShortestAudio, Some(audio)) => cmd
                .input(audio)
                .map("0:v")
                .map("1:a")
                .output_args(enc.video_args())
                .output_args(enc.audio_args())
                .shortest(),
            (RenderShape::VideoOnly { source_audio: true }, _) => {
                cmd.output_args(enc.video_args()).audio_codec("copy")
            }
            // Audio shapes are only selected when audio is present
            (RenderShape::VideoOnly { source_audio: false }, _) | (_, None) => {
                cmd.output_args(enc.video_args()).no_audio()
            }
        };

        cmd.video_filter(chain).into_stage(StageKind::Render, &self.ffmpeg)
    }

    fn append_stage(&self, rendered: &Path, secondary: &Path, audio: Option<(&Path, f64)>, output: &Path) -> Stage {
        let enc = &self.encoding;
        let mut graph = filters::concat_video(enc.width, enc.height, enc.concat_fps);
        let mut cmd = FfmpegCommand::new(rendered, output).input(secondary);

        if let Some((audio, total)) = audio {
            graph.push(';');
            graph.push_str(&filters::audio_trim("2:a:0", total, "outa"));
            cmd = cmd.input(audio);
        }

        cmd = cmd.filter_complex(graph).map("[outv]");
        if audio.is_some() {
            cmd = cmd.map("[outa]");
        }
        cmd = cmd.output_args(enc.video_args());
        if audio.is_some() {
            cmd = cmd.output_args(enc.audio_args());
        }

        cmd.into_stage(StageKind::Concat, &self.ffmpeg)
    }
}
