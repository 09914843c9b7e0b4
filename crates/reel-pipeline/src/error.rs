//! Job-level error types.

use std::fmt;

use reel_media::MediaError;
use reel_storage::StorageError;
use serde::Serialize;
use thiserror::Error;

pub type PipelineResult<T> = Result<T, PipelineError>;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("{0}")]
    Validation(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error(transparent)]
    Media(#[from] MediaError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Error category reported to callers and used as a metrics label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    Fetch,
    Probe,
    ToolUnavailable,
    Transcode,
    Upload,
    Cancelled,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::Fetch => "fetch",
            ErrorKind::Probe => "probe",
            ErrorKind::ToolUnavailable => "tool_unavailable",
            ErrorKind::Transcode => "transcode",
            ErrorKind::Upload => "upload",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::Internal => "internal",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl PipelineError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            PipelineError::Validation(_) => ErrorKind::Validation,
            PipelineError::ConfigError(_) => ErrorKind::Internal,
            PipelineError::Media(e) => match e {
                MediaError::FetchFailed { .. } => ErrorKind::Fetch,
                MediaError::ProbeFailed { .. } => ErrorKind::Probe,
                MediaError::ToolUnavailable { .. } => ErrorKind::ToolUnavailable,
                MediaError::TranscodeFailed { .. } | MediaError::MissingOutput { .. } | MediaError::Timeout(_) => {
                    ErrorKind::Transcode
                }
                MediaError::Cancelled => ErrorKind::Cancelled,
                MediaError::Io(_) | MediaError::Internal(_) => ErrorKind::Internal,
            },
            PipelineError::Storage(StorageError::ConfigError(_)) => ErrorKind::Internal,
            PipelineError::Storage(_) => ErrorKind::Upload,
        }
    }

    /// Tool diagnostics carried by the error, for server-side logs only.
    pub fn diagnostics(&self) -> Option<&str> {
        match self {
            PipelineError::Media(e) => e.diagnostics(),
            _ => None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.kind() == ErrorKind::Cancelled
    }
}
