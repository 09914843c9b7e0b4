//! Pipeline configuration.

use std::path::PathBuf;
use std::time::Duration;

use reel_models::EncodingConfig;

/// Default part size for chunked uploads.
pub const DEFAULT_UPLOAD_CHUNK_SIZE: usize = 6_000_000;

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Directory temporary assets are created in
    pub work_dir: PathBuf,
    /// Font used by caption overlays
    pub font_file: PathBuf,
    /// Folder final artifacts are uploaded into
    pub upload_folder: String,
    /// Part size hint for the artifact store
    pub upload_chunk_size: usize,
    /// Per-invocation limit for external tools
    pub stage_timeout_secs: Option<u64>,
    /// Timeout for fetching remote inputs
    pub fetch_timeout: Duration,
    pub ffmpeg_bin: String,
    pub ffprobe_bin: String,
    pub encoding: EncodingConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            work_dir: std::env::temp_dir().join("reel"),
            font_file: PathBuf::from("assets/fonts/Arial.ttf"),
            upload_folder: "ugc".to_string(),
            upload_chunk_size: DEFAULT_UPLOAD_CHUNK_SIZE,
            stage_timeout_secs: None,
            fetch_timeout: Duration::from_secs(120),
            ffmpeg_bin: "ffmpeg".to_string(),
            ffprobe_bin: "ffprobe".to_string(),
            encoding: EncodingConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            work_dir: std::env::var("REEL_WORK_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.work_dir),
            font_file: std::env::var("REEL_FONT_FILE")
                .map(PathBuf::from)
                .unwrap_or(defaults.font_file),
            upload_folder: std::env::var("REEL_UPLOAD_FOLDER").unwrap_or(defaults.upload_folder),
            upload_chunk_size: std::env::var("REEL_UPLOAD_CHUNK_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.upload_chunk_size),
            stage_timeout_secs: std::env::var("REEL_STAGE_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok()),
            fetch_timeout: std::env::var("REEL_FETCH_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.fetch_timeout),
            ffmpeg_bin: std::env::var("FFMPEG_BIN").unwrap_or(defaults.ffmpeg_bin),
            ffprobe_bin: std::env::var("FFPROBE_BIN").unwrap_or(defaults.ffprobe_bin),
            encoding: defaults.encoding,
        }
    }

    /// External binaries that cannot be resolved on this host.
    pub fn missing_tools(&self) -> Vec<String> {
        [&self.ffmpeg_bin, &self.ffprobe_bin]
            .into_iter()
            .filter(|bin| which::which(bin.as_str()).is_err())
            .cloned()
            .collect()
    }
}
