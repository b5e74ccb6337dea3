//! Talking-head video rendering through an external command.
//!
//! The command receives the request as JSON on stdin and the path it must
//! write the video to as its last argument. It runs in a scratch directory
//! that is removed afterwards, and is killed if it outlives the timeout.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info};

use crate::config::AvatarConfig;

const STDERR_TAIL: usize = 500;

#[derive(Debug, Error)]
pub enum AvatarError {
    #[error("Renderer could not be started: {0}")]
    Spawn(std::io::Error),

    #[error("Renderer I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Renderer exited with {code:?}: {stderr}")]
    Failed { code: Option<i32>, stderr: String },

    #[error("Renderer timed out after {0:?}")]
    TimedOut(Duration),

    #[error("Renderer produced no output")]
    EmptyOutput,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AvatarRequest {
    pub text: String,
    pub voice: Option<String>,
    pub image_url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AvatarRenderer {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl AvatarRenderer {
    pub fn new(program: impl Into<String>, args: Vec<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args,
            timeout,
        }
    }

    /// Builds a renderer from `AVATAR_RENDER_CMD`, split on whitespace.
    /// Returns `None` when no command is configured.
    pub fn from_config(config: &AvatarConfig) -> Option<Self> {
        let mut parts = config.render_cmd.as_deref()?.split_whitespace().map(str::to_string);
        let program = parts.next()?;
        Some(Self::new(
            program,
            parts.collect(),
            Duration::from_secs(config.timeout_secs),
        ))
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub async fn render(&self, request: &AvatarRequest) -> Result<Vec<u8>, AvatarError> {
        let scratch = tempfile::tempdir()?;
        let output_path = scratch.path().join("avatar.mp4");

        let started = std::time::Instant::now();
        let (status, stderr) = tokio::time::timeout(self.timeout, self.run(request, &output_path))
            .await
            .map_err(|_| AvatarError::TimedOut(self.timeout))??;
        debug!(elapsed_ms = started.elapsed().as_millis() as u64, "Renderer finished");

        if !status.success() {
            return Err(AvatarError::Failed {
                code: status.code(),
                stderr: stderr_tail(&stderr),
            });
        }

        let video = match tokio::fs::read(&output_path).await {
            Ok(video) if !video.is_empty() => video,
            Ok(_) => return Err(AvatarError::EmptyOutput),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(AvatarError::EmptyOutput)
            }
            Err(e) => return Err(e.into()),
        };
        info!(bytes = video.len(), "Avatar video rendered");
        Ok(video)
    }

    async fn run(
        &self,
        request: &AvatarRequest,
        output_path: &Path,
    ) -> Result<(std::process::ExitStatus, Vec<u8>), AvatarError> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .arg(output_path)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(AvatarError::Spawn)?;

        let payload = serde_json::to_vec(request).map_err(|e| AvatarError::Io(e.into()))?;
        if let Some(mut stdin) = child.stdin.take() {
            // A renderer that ignores stdin may close it early.
            match stdin.write_all(&payload).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => {}
                Err(e) => return Err(e.into()),
            }
        }

        let output = child.wait_with_output().await?;
        Ok((output.status, output.stderr))
    }
}

fn stderr_tail(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let text = text.trim();
    let skip = text.chars().count().saturating_sub(STDERR_TAIL);
    text.chars().skip(skip).collect()
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn shell(script: &str, timeout: Duration) -> AvatarRenderer {
        // `sh -c script path`: the output path arrives as $0.
        AvatarRenderer::new("sh", vec!["-c".into(), script.into()], timeout)
    }

    fn request() -> AvatarRequest {
        AvatarRequest {
            text: "Welcome to your interview.".into(),
            voice: None,
            image_url: None,
        }
    }

    #[tokio::test]
    async fn test_render_reads_output_file() {
        let renderer = shell(r#"cat > /dev/null; printf 'fake-mp4' > "$0""#, Duration::from_secs(5));
        let video = renderer.render(&request()).await.unwrap();
        assert_eq!(video, b"fake-mp4");
    }

    #[tokio::test]
    async fn test_request_arrives_on_stdin() {
        let renderer = shell(r#"cat > "$0""#, Duration::from_secs(5));
        let video = renderer.render(&request()).await.unwrap();
        let echoed: AvatarRequest = serde_json::from_slice(&video).unwrap();
        assert_eq!(echoed.text, "Welcome to your interview.");
    }

    #[tokio::test]
    async fn test_nonzero_exit_reports_stderr() {
        let renderer = shell("echo 'no gpu' >&2; exit 3", Duration::from_secs(5));
        match renderer.render(&request()).await {
            Err(AvatarError::Failed { code, stderr }) => {
                assert_eq!(code, Some(3));
                assert_eq!(stderr, "no gpu");
            }
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_slow_renderer_times_out() {
        let renderer = shell("sleep 5", Duration::from_millis(200));
        assert!(matches!(
            renderer.render(&request()).await,
            Err(AvatarError::TimedOut(_))
        ));
    }

    #[tokio::test]
    async fn test_missing_output_is_an_error() {
        let renderer = shell("exit 0", Duration::from_secs(5));
        assert!(matches!(
            renderer.render(&request()).await,
            Err(AvatarError::EmptyOutput)
        ));
    }

    #[tokio::test]
    async fn test_empty_output_is_an_error() {
        let renderer = shell(r#": > "$0""#, Duration::from_secs(5));
        assert!(matches!(
            renderer.render(&request()).await,
            Err(AvatarError::EmptyOutput)
        ));
    }

    #[test]
    fn test_from_config() {
        let config = AvatarConfig {
            render_cmd: Some("python3 render.py --fast".into()),
            timeout_secs: 30,
        };
        let renderer = AvatarRenderer::from_config(&config).unwrap();
        assert_eq!(renderer.program(), "python3");
        assert_eq!(renderer.args, vec!["render.py", "--fast"]);

        let unset = AvatarConfig {
            render_cmd: None,
            timeout_secs: 30,
        };
        assert!(AvatarRenderer::from_config(&unset).is_none());
    }
}
