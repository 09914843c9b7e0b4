//! Composition job orchestration.
//!
//! One [`Composer::compose`] call runs a whole job: materialize inputs,
//! probe them, lay out the caption, plan and run the transcode stages,
//! upload the result and release every temporary file.

pub mod composer;
pub mod config;
pub mod error;
pub mod logging;
pub mod metrics;

pub use composer::{ComposedVideo, Composer};
pub use config::PipelineConfig;
pub use error::{ErrorKind, PipelineError, PipelineResult};
pub use logging::JobLogger;
