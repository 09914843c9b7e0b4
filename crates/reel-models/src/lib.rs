//! Shared data models for the Reelsmith composition service.
//!
//! This crate provides:
//! - Input declarations (inline bytes or remote URLs)
//! - Caption requests and vertical anchors
//! - Composition requests assembled by the HTTP layer
//! - Encoding configuration for the transcode stages
//! - Job identifiers

pub mod caption;
pub mod encoding;
pub mod input;
pub mod job;

// Re-export common types
pub use caption::{Anchor, AnchorParseError, CaptionRequest};
pub use encoding::EncodingConfig;
pub use input::{CompositionRequest, ContentKind, InputSpec, InputSpecError};
pub use job::JobId;
