//! Error types for media operations.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for media operations.
pub type MediaResult<T> = Result<T, MediaError>;

/// Errors that can occur while resolving, probing, planning or transcoding.
///
/// Captured tool diagnostics live in `stderr` fields and are deliberately
/// left out of the `Display` output; callers log them, clients never see them.
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("Failed to fetch {uri}: {message}")]
    FetchFailed {
        uri: String,
        message: String,
        detail: Option<String>,
    },

    #[error("Probe failed: {message}")]
    ProbeFailed {
        message: String,
        stderr: Option<String>,
    },

    #[error("{tool} is not available: {message}")]
    ToolUnavailable { tool: String, message: String },

    #[error("{stage} stage failed with exit code {}", .exit_code.map(|c| c.to_string()).unwrap_or_else(|| "none".to_string()))]
    TranscodeFailed {
        stage: String,
        exit_code: Option<i32>,
        stderr: String,
    },

    #[error("{stage} stage produced no output at {}", .path.display())]
    MissingOutput { stage: String, path: PathBuf },

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Operation timed out after {0} seconds")]
    Timeout(u64),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl MediaError {
    /// Create a fetch failure error.
    pub fn fetch_failed(uri: impl Into<String>, message: impl Into<String>) -> Self {
        Self::FetchFailed {
            uri: uri.into(),
            message: message.into(),
            detail: None,
        }
    }

    /// Create a fetch failure whose client-side error text is kept out of
    /// the message.
    pub fn fetch_failed_with_detail(
        uri: impl Into<String>,
        message: impl Into<String>,
        detail: impl Into<String>,
    ) -> Self {
        Self::FetchFailed {
            uri: uri.into(),
            message: message.into(),
            detail: Some(detail.into()),
        }
    }

    /// Create a probe failure error.
    pub fn probe_failed(message: impl Into<String>, stderr: Option<String>) -> Self {
        Self::ProbeFailed {
            message: message.into(),
            stderr,
        }
    }

    /// Create a tool-unavailable error.
    pub fn tool_unavailable(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ToolUnavailable {
            tool: tool.into(),
            message: message.into(),
        }
    }

    /// Create a transcode failure error.
    pub fn transcode_failed(stage: impl Into<String>, exit_code: Option<i32>, stderr: impl Into<String>) -> Self {
        Self::TranscodeFailed {
            stage: stage.into(),
            exit_code,
            stderr: stderr.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Captured tool diagnostics, if this error carries any.
    pub fn diagnostics(&self) -> Option<&str> {
        match self {
            MediaError::TranscodeFailed { stderr, .. } => Some(stderr),
            MediaError::ProbeFailed { stderr, .. } => stderr.as_deref(),
            MediaError::FetchFailed { detail, .. } => detail.as_deref(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transcode_message_omits_stderr() {
        let err = MediaError::transcode_failed("render", Some(1), "Invalid filter graph");
        let message = err.to_string();
        assert_eq!(message, "render stage failed with exit code 1");
        assert_eq!(err.diagnostics(), Some("Invalid filter graph"));
    }

    #[test]
    fn test_probe_message_omits_stderr() {
        let err = MediaError::probe_failed("duration unavailable", Some("moov atom not found".into()));
        assert!(!err.to_string().contains("moov"));
        assert_eq!(err.diagnostics(), Some("moov atom not found"));
    }

    #[test]
    fn test_fetch_message_omits_client_error_text() {
        let err = MediaError::fetch_failed_with_detail(
            "https://cdn.example.com/a.mp4",
            "could not connect",
            "error sending request for url (https://cdn.example.com/a.mp4): tcp connect error",
        );
        assert_eq!(err.to_string(), "Failed to fetch https://cdn.example.com/a.mp4: could not connect");
        assert!(err.diagnostics().is_some_and(|d| d.contains("tcp connect")));
    }
}
