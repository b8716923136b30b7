// Subprocess execution
//
// Two modes: buffered (wait for exit, output surfaces only in the error)
// and streamed (bounded channel of stdout/stderr lines that closes on
// exit). Cancelling the caller abandons the wait but does not kill the
// subprocess; that is the host's responsibility.

use anyhow::{anyhow, Context, Result};
use std::path::PathBuf;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, error};

/// Capacity of the streamed-output channel. Callers must drain the
/// channel; a full channel blocks the reader tasks, not the subprocess.
const LOG_CHANNEL_CAPACITY: usize = 256;

/// A command to execute: program, arguments, extra environment and
/// working directory. The subprocess inherits the parent environment
/// plus the overrides listed here.
#[derive(Debug, Clone)]
pub struct CommandSpec {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
    pub working_dir: Option<PathBuf>,
}

impl CommandSpec {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
            working_dir: None,
        }
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    fn build(&self) -> tokio::process::Command {
        let mut command = tokio::process::Command::new(&self.program);
        command.args(&self.args);
        for (key, value) in &self.env {
            command.env(key, value);
        }
        if let Some(dir) = &self.working_dir {
            command.current_dir(dir);
        }
        command
    }
}

/// Runs subprocesses on behalf of workflow handlers.
#[derive(Debug, Clone, Default)]
pub struct ProcessRunner;

impl ProcessRunner {
    pub fn new() -> Self {
        Self
    }

    /// Buffered execution: wait for exit, discard output on success,
    /// return the captured output inside the error on failure.
    pub async fn run(&self, spec: &CommandSpec) -> Result<()> {
        debug!(program = %spec.program.display(), args = ?spec.args, "Executing command");

        let output = spec
            .build()
            .output()
            .await
            .with_context(|| format!("failed to spawn {}", spec.program.display()))?;

        if !output.status.success() {
            let stdout = String::from_utf8_lossy(&output.stdout);
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow!(
                "{} exited with {}: {}{}",
                spec.program.display(),
                output.status,
                stdout,
                stderr
            ));
        }

        debug!(program = %spec.program.display(), "Command succeeded");
        Ok(())
    }

    /// Streamed execution: spawn the subprocess and return a bounded
    /// channel of stdout/stderr lines. The channel closes when the
    /// subprocess exits; a failing exit status is logged, not returned.
    pub async fn run_streamed(&self, spec: &CommandSpec) -> Result<mpsc::Receiver<String>> {
        debug!(program = %spec.program.display(), args = ?spec.args, "Executing command (streamed)");

        let mut child = spec
            .build()
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("failed to spawn {}", spec.program.display()))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| anyhow!("child stdout not captured"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| anyhow!("child stderr not captured"))?;

        let (tx, rx) = mpsc::channel(LOG_CHANNEL_CAPACITY);

        let stdout_tx = tx.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if stdout_tx.send(line).await.is_err() {
                    break;
                }
            }
        });

        let stderr_tx = tx;
        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if stderr_tx.send(line).await.is_err() {
                    break;
                }
            }
        });

        let program = spec.program.display().to_string();
        tokio::spawn(async move {
            match child.wait().await {
                Ok(status) if status.success() => {
                    debug!(program = %program, "Command succeeded");
                }
                Ok(status) => {
                    error!(program = %program, status = %status, "Command failed");
                }
                Err(e) => {
                    error!(program = %program, error = %e, "Failed to wait for command");
                }
            }
        });

        Ok(rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn run_succeeds_silently() {
        let spec = CommandSpec::new("echo").args(["hello"]);
        ProcessRunner::new().run(&spec).await.unwrap();
    }

    #[tokio::test]
    async fn run_surfaces_output_on_failure() {
        let spec = CommandSpec::new("sh").args(["-c", "echo boom >&2; exit 3"]);
        let err = ProcessRunner::new().run(&spec).await.unwrap_err();
        let message = format!("{err:#}");
        assert!(message.contains("boom"));
    }

    #[tokio::test]
    async fn run_honors_env_and_working_dir() {
        let dir = tempfile::tempdir().unwrap();
        let spec = CommandSpec::new("sh")
            .args(["-c", "test \"$MARKER\" = on && test \"$(pwd)\" = \"$EXPECTED\""])
            .env("MARKER", "on")
            .env("EXPECTED", dir.path().to_string_lossy())
            .working_dir(dir.path());
        ProcessRunner::new().run(&spec).await.unwrap();
    }

    #[tokio::test]
    async fn run_streamed_yields_lines_then_closes() {
        let spec = CommandSpec::new("sh").args(["-c", "echo one; echo two >&2; echo three"]);
        let mut rx = ProcessRunner::new().run_streamed(&spec).await.unwrap();

        let mut lines = Vec::new();
        while let Some(line) = rx.recv().await {
            lines.push(line);
        }

        // stdout and stderr interleave, but nothing is lost and the
        // channel closed on exit
        lines.sort();
        assert_eq!(lines, vec!["one", "three", "two"]);
    }
}
