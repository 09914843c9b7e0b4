#![deny(unreachable_patterns)]
//! FFmpeg CLI composition pipeline.
//!
//! This crate provides:
//! - Source resolution of uploaded bytes and remote URLs into temp assets
//! - FFprobe duration / audio-stream inspection
//! - Caption layout (wrapping and anchoring) for drawtext overlays
//! - Composition planning into an ordered list of transcode stages
//! - Sequential stage execution with diagnostics capture
//! - Per-job temporary asset tracking and release

pub mod assets;
pub mod caption;
pub mod command;
pub mod error;
pub mod executor;
pub mod filters;
pub mod planner;
pub mod probe;
pub mod progress;
pub mod runner;
pub mod source;

pub use assets::{AssetFs, AssetLedger, MaterializedAsset, ReleaseGuard, ReleaseReport, TokioFs};
pub use caption::{layout, OverlayLine, OverlayPlan, LINE_CHAR_BUDGET};
pub use command::{FfmpegCommand, Stage, StageKind};
pub use error::{MediaError, MediaResult};
pub use executor::StageExecutor;
pub use planner::{CompositionPlan, CompositionPlanner, PlanInputs, PlanShape, RenderShape, SecondaryClip};
pub use probe::{MediaFacts, Probe};
pub use progress::FfmpegProgress;
pub use runner::{ProcessRunner, ToolOutput, ToolRunner};
pub use source::SourceResolver;
