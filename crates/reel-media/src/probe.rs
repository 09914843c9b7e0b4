//! FFprobe inspection: container duration and audio-stream presence.

use std::path::Path;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, warn};

use crate::error::{MediaError, MediaResult};
use crate::runner::{ToolOutput, ToolRunner};

/// Probed facts about one asset.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MediaFacts {
    /// Container duration in seconds, `None` when unknown
    pub duration: Option<f64>,
    /// Whether the file carries at least one audio stream
    pub has_audio: bool,
}

/// Wrapper around the inspection tool.
#[derive(Clone)]
pub struct Probe {
    runner: Arc<dyn ToolRunner>,
    program: String,
}

impl Probe {
    pub fn new(runner: Arc<dyn ToolRunner>, program: impl Into<String>) -> Self {
        Self {
            runner,
            program: program.into(),
        }
    }

    /// Container duration, or `None` when the tool fails or prints nothing usable.
    ///
    /// Only a launch failure is an error.
    pub async fn duration(&self, path: impl AsRef<Path>) -> MediaResult<Option<f64>> {
        let path = path.as_ref();
        let output = self.invoke(duration_args(path)).await?;

        if !output.success {
            warn!(
                path = %path.display(),
                exit_code = ?output.exit_code,
                stderr = %output.stderr.trim(),
                "FFprobe duration query failed, treating duration as unknown"
            );
            return Ok(None);
        }

        let duration = parse_duration(&output.stdout);
        if duration.is_none() {
            warn!(
                path = %path.display(),
                output = %output.stdout.trim(),
                "Could not parse duration, treating as unknown"
            );
        }
        Ok(duration)
    }

    /// Container duration when a later step cannot proceed without it.
    ///
    /// `label` names the input in the error message; the path only goes to
    /// the log. Zero is a valid length here.
    pub async fn required_duration(&self, path: impl AsRef<Path>, label: &str) -> MediaResult<f64> {
        let path = path.as_ref();
        let output = self.invoke(duration_args(path)).await?;

        if !output.success {
            warn!(
                path = %path.display(),
                exit_code = ?output.exit_code,
                "FFprobe duration query failed for {}", label
            );
            return Err(MediaError::probe_failed(
                format!("could not read duration of {}", label),
                Some(output.stderr),
            ));
        }

        parse_length(&output.stdout).ok_or_else(|| {
            warn!(
                path = %path.display(),
                output = %output.stdout.trim(),
                "Could not parse duration of {}", label
            );
            MediaError::probe_failed(format!("could not parse duration of {}", label), Some(output.stdout))
        })
    }

    /// Whether the file has a first audio stream.
    ///
    /// A clean run with empty output is a legitimate `false`.
    pub async fn has_audio_stream(&self, path: impl AsRef<Path>) -> MediaResult<bool> {
        let path = path.as_ref();
        let output = self.invoke(audio_stream_args(path)).await?;
        let has_audio = !output.stdout.trim().is_empty();

        debug!(path = %path.display(), has_audio, "Probed audio stream");
        Ok(has_audio)
    }

    /// Lenient duration plus audio presence, probed concurrently.
    pub async fn facts(&self, path: impl AsRef<Path>) -> MediaResult<MediaFacts> {
        let path = path.as_ref();
        let (duration, has_audio) = tokio::try_join!(self.duration(path), self.has_audio_stream(path))?;
        Ok(MediaFacts { duration, has_audio })
    }

    async fn invoke(&self, args: Vec<String>) -> MediaResult<ToolOutput> {
        self.runner
            .run(&self.program, &args)
            .await
            .map_err(|e| MediaError::probe_failed(format!("{} could not run: {}", self.program, e), None))
    }
}

fn duration_args(path: &Path) -> Vec<String> {
    vec![
        "-v".to_string(),
        "error".to_string(),
        "-show_entries".to_string(),
        "format=duration".to_string(),
        "-of".to_string(),
        "default=noprint_wrappers=1:nokey=1".to_string(),
        path.to_string_lossy().to_string(),
    ]
}

fn audio_stream_args(path: &Path) -> Vec<String> {
    vec![
        "-v".to_string(),
        "error".to_string(),
        "-select_streams".to_string(),
        "a:0".to_string(),
        "-show_entries".to_string(),
        "stream=codec_name".to_string(),
        "-of".to_string(),
        "default=noprint_wrappers=1:nokey=1".to_string(),
        path.to_string_lossy().to_string(),
    ]
}

/// Parse FFprobe's bare duration output for planning.
///
/// A duration is known only if it is a finite number greater than zero.
pub fn parse_duration(stdout: &str) -> Option<f64> {
    parse_length(stdout).filter(|d| *d > 0.0)
}

/// Parse FFprobe's bare duration output as a length; zero is accepted.
pub fn parse_length(stdout: &str) -> Option<f64> {
    stdout
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|d| d.is_finite() && *d >= 0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    /// Answers every invocation with the same canned output.
    struct CannedRunner(MediaResult<ToolOutput>);

    #[async_trait]
    impl ToolRunner for CannedRunner {
        async fn run(&self, _program: &str, _args: &[String]) -> MediaResult<ToolOutput> {
            match &self.0 {
                Ok(output) => Ok(output.clone()),
                Err(_) => Err(MediaError::tool_unavailable("ffprobe", "not found")),
            }
        }
    }

    fn probe_with(result: MediaResult<ToolOutput>) -> Probe {
        Probe::new(Arc::new(CannedRunner(result)), "ffprobe")
    }

    fn exited(code: i32, stdout: &str) -> MediaResult<ToolOutput> {
        Ok(ToolOutput {
            exit_code: Some(code),
            success: code == 0,
            stdout: stdout.to_string(),
            stderr: if code == 0 { String::new() } else { "Invalid data found".to_string() },
        })
    }

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("12.500000\n"), Some(12.5));
        assert_eq!(parse_duration("N/A"), None);
        assert_eq!(parse_duration(""), None);
        assert_eq!(parse_duration("0.000000"), None);
    }

    #[test]
    fn test_parse_length_accepts_zero() {
        assert_eq!(parse_length("0.000000\n"), Some(0.0));
        assert_eq!(parse_length("3.0"), Some(3.0));
        assert_eq!(parse_length("-1"), None);
        assert_eq!(parse_length("N/A"), None);
    }

    #[tokio::test]
    async fn test_required_duration_accepts_zero_length() {
        let probe = probe_with(exited(0, "0.000000\n"));
        assert_eq!(probe.required_duration("demo.mp4", "appended clip").await.unwrap(), 0.0);
        assert_eq!(probe.duration("demo.mp4").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_required_duration_message_names_input_not_path() {
        let probe = probe_with(exited(0, "N/A\n"));
        let err = probe
            .required_duration("/tmp/reel/0b6c_video.mp4", "appended clip")
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Probe failed: could not parse duration of appended clip");
        assert!(!err.to_string().contains("_video.mp4"));
    }

    #[tokio::test]
    async fn test_duration_unknown_on_nonzero_exit() {
        let probe = probe_with(exited(1, ""));
        assert_eq!(probe.duration("clip.mp4").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_required_duration_fails_on_nonzero_exit() {
        let probe = probe_with(exited(1, ""));
        let err = probe.required_duration("clip.mp4", "primary clip").await.unwrap_err();
        assert!(matches!(err, MediaError::ProbeFailed { .. }));
        assert_eq!(err.diagnostics(), Some("Invalid data found"));
    }

    #[tokio::test]
    async fn test_required_duration_fails_on_garbage() {
        let probe = probe_with(exited(0, "N/A\n"));
        assert!(probe.required_duration("clip.mp4", "primary clip").await.is_err());
    }

    #[tokio::test]
    async fn test_audio_stream_presence() {
        assert!(probe_with(exited(0, "aac\n")).has_audio_stream("a.mp4").await.unwrap());
        assert!(!probe_with(exited(0, "")).has_audio_stream("a.mp4").await.unwrap());
        // ffprobe may exit non-zero when no such stream exists; that is still "absent"
        assert!(!probe_with(exited(1, "")).has_audio_stream("a.mp4").await.unwrap());
    }

    #[tokio::test]
    async fn test_launch_failure_is_probe_error() {
        let probe = probe_with(Err(MediaError::internal("unused")));
        assert!(matches!(
            probe.has_audio_stream("a.mp4").await,
            Err(MediaError::ProbeFailed { .. })
        ));
        assert!(matches!(
            probe.duration("a.mp4").await,
            Err(MediaError::ProbeFailed { .. })
        ));
    }

    #[tokio::test]
    async fn test_facts_combines_both_queries() {
        let probe = probe_with(exited(0, "5.0\n"));
        let facts = probe.facts("a.mp4").await.unwrap();
        assert_eq!(facts.duration, Some(5.0));
        assert!(facts.has_audio);
    }
}
