//! Remote artifact storage.
//!
//! This crate provides:
//! - The `ArtifactStore` seam the pipeline uploads through
//! - An S3-compatible Cloudflare R2 client with chunked multipart upload

pub mod client;
pub mod error;
pub mod store;

pub use client::{R2Client, R2Config};
pub use error::{StorageError, StorageResult};
pub use store::ArtifactStore;
