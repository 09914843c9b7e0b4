//! External tool invocation.
//!
//! Every FFmpeg/FFprobe call goes through [`ToolRunner`], so the probe and
//! the stage executor can be driven by a scripted runner in tests.

use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};
use tokio::process::{Child, Command};
use tracing::{debug, trace, warn};

use crate::error::{MediaError, MediaResult};
use crate::progress::{is_progress_line, parse_progress_line, FfmpegProgress};

/// Result of one finished tool invocation.
#[derive(Debug, Clone, Default)]
pub struct ToolOutput {
    /// Exit code (`None` when terminated by a signal)
    pub exit_code: Option<i32>,
    /// Whether the process exited successfully
    pub success: bool,
    /// Full standard output
    pub stdout: String,
    /// Diagnostic lines from standard error (progress lines removed)
    pub stderr: String,
}

impl ToolOutput {
    pub fn from_status(status: ExitStatus, stdout: String, stderr: String) -> Self {
        Self {
            exit_code: status.code(),
            success: status.success(),
            stdout,
            stderr,
        }
    }
}

/// Runs an external program to completion.
///
/// Implementations return `ToolUnavailable` when the program cannot be
/// launched; a non-zero exit is reported through [`ToolOutput::success`].
#[async_trait]
pub trait ToolRunner: Send + Sync {
    async fn run(&self, program: &str, args: &[String]) -> MediaResult<ToolOutput>;
}

/// Runner backed by `tokio::process`.
///
/// Children are spawned with `kill_on_drop`, so dropping the future of an
/// in-flight invocation (job cancellation, client disconnect) terminates the
/// process.
#[derive(Debug, Clone, Default)]
pub struct ProcessRunner {
    /// Timeout in seconds
    timeout_secs: Option<u64>,
}

impl ProcessRunner {
    /// Create a new runner.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set timeout.
    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }

    /// Wait for child process, killing it if the timeout elapses.
    async fn wait_for_completion(&self, child: &mut Child, program: &str) -> MediaResult<ExitStatus> {
        let Some(timeout_secs) = self.timeout_secs else {
            return Ok(child.wait().await?);
        };

        match tokio::time::timeout(Duration::from_secs(timeout_secs), child.wait()).await {
            Ok(status) => Ok(status?),
            Err(_) => {
                warn!(program, timeout_secs, "External tool timed out, killing process");
                let _ = child.kill().await;
                Err(MediaError::Timeout(timeout_secs))
            }
        }
    }
}

#[async_trait]
impl ToolRunner for ProcessRunner {
    async fn run(&self, program: &str, args: &[String]) -> MediaResult<ToolOutput> {
        which::which(program).map_err(|e| MediaError::tool_unavailable(program, e.to_string()))?;

        debug!("Running {} {}", program, args.join(" "));

        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| MediaError::tool_unavailable(program, e.to_string()))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| MediaError::internal("stdout not captured"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| MediaError::internal("stderr not captured"))?;

        let stdout_handle = tokio::spawn(read_to_string(stdout));
        let stderr_handle = tokio::spawn(collect_diagnostics(stderr, program.to_string()));

        let result = self.wait_for_completion(&mut child, program).await;

        // Pipes close once the process is gone, so both readers finish
        let stdout = stdout_handle.await.unwrap_or_default();
        let stderr = stderr_handle.await.unwrap_or_default();

        let status = result?;
        Ok(ToolOutput::from_status(status, stdout, stderr))
    }
}

async fn read_to_string<R: AsyncRead + Unpin>(mut reader: R) -> String {
    let mut buf = Vec::new();
    if let Err(e) = reader.read_to_end(&mut buf).await {
        warn!("Failed to read tool stdout: {}", e);
    }
    String::from_utf8_lossy(&buf).into_owned()
}

/// Drain stderr, logging each line and keeping everything that is not a
/// `-progress` report.
async fn collect_diagnostics<R: AsyncRead + Unpin>(stderr: R, program: String) -> String {
    let mut lines = BufReader::new(stderr).lines();
    let mut progress = FfmpegProgress::default();
    let mut diagnostics = String::new();

    while let Ok(Some(line)) = lines.next_line().await {
        if is_progress_line(&line) {
            if let Some(snapshot) = parse_progress_line(&line, &mut progress) {
                trace!(
                    program = %program,
                    frame = snapshot.frame,
                    out_time_ms = snapshot.out_time_ms,
                    speed = snapshot.speed,
                    "Progress"
                );
            }
            continue;
        }

        debug!(program = %program, "{}", line);
        diagnostics.push_str(&line);
        diagnostics.push('\n');
    }

    diagnostics
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_binary_is_unavailable() {
        let runner = ProcessRunner::new();
        let err = runner
            .run("definitely-not-a-real-transcoder", &[])
            .await
            .unwrap_err();
        assert!(matches!(err, MediaError::ToolUnavailable { .. }));
    }

    #[tokio::test]
    async fn test_diagnostics_skip_progress_lines() {
        let input: &[u8] = b"frame=10\nfps=25.0\nprogress=continue\nUnknown encoder 'libx265'\n";
        let diagnostics = collect_diagnostics(input, "ffmpeg".to_string()).await;
        assert_eq!(diagnostics, "Unknown encoder 'libx265'\n");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_captures_exit_code_and_streams() {
        let runner = ProcessRunner::new();
        let args = vec!["-c".to_string(), "echo out; echo err 1>&2; exit 3".to_string()];
        let output = runner.run("sh", &args).await.unwrap();
        assert!(!output.success);
        assert_eq!(output.exit_code, Some(3));
        assert_eq!(output.stdout.trim(), "out");
        assert_eq!(output.stderr.trim(), "err");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_timeout_kills_process() {
        let runner = ProcessRunner::new().with_timeout(1);
        let args = vec!["-c".to_string(), "exec sleep 30".to_string()];
        let err = runner.run("sh", &args).await.unwrap_err();
        assert!(matches!(err, MediaError::Timeout(1)));
    }
}
