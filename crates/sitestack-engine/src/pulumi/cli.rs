//! pulumi CLI wrapper
//!
//! Runs pulumi commands inside a project workspace directory. Long running
//! commands stream their stdout line by line to a [`ProgressSink`].

use crate::engine::ProgressSink;
use crate::error::{EngineError, Result};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command;

/// pulumi CLI wrapper
#[derive(Debug, Clone)]
pub struct PulumiCli {
    binary: PathBuf,
}

impl Default for PulumiCli {
    fn default() -> Self {
        Self::new("pulumi")
    }
}

impl PulumiCli {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }

    fn command(&self, cwd: &Path, args: &[&str]) -> Command {
        let mut cmd = Command::new(&self.binary);
        cmd.current_dir(cwd);
        cmd.args(args);
        cmd.arg("--non-interactive");
        cmd.env("PULUMI_SKIP_UPDATE_CHECK", "true");
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        cmd
    }

    fn spawn_error(&self, err: std::io::Error) -> EngineError {
        if err.kind() == std::io::ErrorKind::NotFound {
            EngineError::CommandNotFound(self.binary.display().to_string())
        } else {
            EngineError::Io(err)
        }
    }

    /// Run a pulumi command and return stdout
    pub async fn run(&self, cwd: &Path, args: &[&str]) -> Result<String> {
        tracing::debug!("Running: pulumi {}", args.join(" "));

        let output = self
            .command(cwd, args)
            .output()
            .await
            .map_err(|e| self.spawn_error(e))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(classify_failure(&stderr));
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    /// Run a pulumi command, forwarding every stdout line to `progress`
    pub async fn stream(
        &self,
        cwd: &Path,
        args: &[&str],
        progress: &dyn ProgressSink,
    ) -> Result<()> {
        tracing::debug!("Running: pulumi {}", args.join(" "));

        let mut child = self
            .command(cwd, args)
            .spawn()
            .map_err(|e| self.spawn_error(e))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| EngineError::CommandFailed("pulumi stdout unavailable".to_string()))?;
        let mut stderr = child
            .stderr
            .take()
            .ok_or_else(|| EngineError::CommandFailed("pulumi stderr unavailable".to_string()))?;

        let read_stdout = async {
            let mut diagnostics = Vec::new();
            let mut lines = BufReader::new(stdout).lines();
            while let Some(line) = lines.next_line().await? {
                progress.line(&line);
                if line.trim_start().starts_with("error:") {
                    diagnostics.push(line);
                }
            }
            Ok::<_, std::io::Error>(diagnostics)
        };
        let read_stderr = async {
            let mut buf = String::new();
            stderr.read_to_string(&mut buf).await?;
            Ok::<_, std::io::Error>(buf)
        };

        let (diagnostics, stderr) = tokio::try_join!(read_stdout, read_stderr)?;
        let status = child.wait().await?;

        if !status.success() {
            let mut message = stderr.trim().to_string();
            for line in diagnostics {
                if !message.contains(line.trim()) {
                    if !message.is_empty() {
                        message.push('\n');
                    }
                    message.push_str(line.trim());
                }
            }
            return Err(classify_failure(&message));
        }

        Ok(())
    }
}

/// Map pulumi's failure text onto an error kind, keeping the text verbatim
pub(crate) fn classify_failure(message: &str) -> EngineError {
    let text = message.trim().to_string();
    let lower = text.to_lowercase();

    if lower.contains("another update is currently in progress")
        || lower.contains("[409] conflict")
        || lower.contains("the stack is currently locked")
    {
        EngineError::ConcurrentUpdate(text)
    } else if lower.contains("no stack update") || lower.contains("no update is in progress") {
        EngineError::NoOperationInProgress(text)
    } else {
        EngineError::CommandFailed(text)
    }
}
