//! External command runner
//!
//! Shared by the CLI-driven backends (juju, usacloud). Every invocation is
//! bounded by a timeout and the child is killed when it expires.

use crate::error::{ProvisionError, Result};
use std::process::{Output, Stdio};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// Wrapper around one CLI binary
#[derive(Debug, Clone)]
pub struct CommandRunner {
    program: String,
    base_args: Vec<String>,
    timeout: Duration,
}

impl CommandRunner {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            base_args: Vec::new(),
            timeout: Duration::from_secs(10),
        }
    }

    /// Arguments prepended to every invocation (e.g. `--zone is1a`)
    pub fn with_base_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.base_args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn command(&self, args: &[&str]) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.base_args);
        cmd.args(args);
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        cmd.kill_on_drop(true);
        cmd
    }

    fn timed_out(&self, line: &str) -> ProvisionError {
        ProvisionError::Timeout(format!("{} did not finish within {:?}", line, self.timeout))
    }

    /// Run the command and return the raw output, whatever the exit status.
    pub async fn output(&self, args: &[&str]) -> Result<Output> {
        let mut cmd = self.command(args);
        let line = self.command_line(args);
        tracing::debug!("Running: {}", line);

        match tokio::time::timeout(self.timeout, cmd.output()).await {
            Ok(output) => Ok(output?),
            Err(_) => Err(self.timed_out(&line)),
        }
    }

    /// Run the command and return stdout. A non-zero exit becomes
    /// `ProvisionError::Command` carrying stderr.
    pub async fn run(&self, args: &[&str]) -> Result<String> {
        let output = self.output(args).await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ProvisionError::Command(stderr.trim().to_string()));
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    /// Run the command, copying its stdout and stderr into the sinks as
    /// they arrive, then fail with `ProvisionError::Command` on a non-zero
    /// exit.
    ///
    /// On timeout the child is killed; whatever it wrote before that is
    /// already in the sinks.
    pub async fn run_streamed(
        &self,
        args: &[&str],
        stdout: crate::provisioner::Output<'_>,
        stderr: crate::provisioner::Output<'_>,
    ) -> Result<()> {
        let line = self.command_line(args);
        tracing::debug!("Running: {}", line);

        let mut child = self.command(args).spawn()?;
        let (Some(mut child_out), Some(mut child_err)) = (child.stdout.take(), child.stderr.take())
        else {
            return Err(ProvisionError::Command(format!("{} has no output pipes", line)));
        };

        let finished = tokio::time::timeout(self.timeout, async {
            let (out, err) = tokio::join!(
                tokio::io::copy(&mut child_out, &mut *stdout),
                tokio::io::copy(&mut child_err, &mut *stderr)
            );
            out?;
            err?;
            child.wait().await
        })
        .await;

        stdout.flush().await?;
        stderr.flush().await?;

        let status = match finished {
            Ok(status) => status?,
            Err(_) => {
                if let Err(e) = child.kill().await {
                    tracing::warn!(error = %e, "failed to kill {}", self.program);
                }
                return Err(self.timed_out(&line));
            }
        };

        if !status.success() {
            return Err(ProvisionError::Command(format!("{} exited with {}", line, status)));
        }
        Ok(())
    }

    fn command_line(&self, args: &[&str]) -> String {
        let mut parts = Vec::with_capacity(1 + self.base_args.len() + args.len());
        parts.push(self.program.as_str());
        parts.extend(self.base_args.iter().map(String::as_str));
        parts.extend(args.iter().copied());
        parts.join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_run_returns_stdout() {
        let runner = CommandRunner::new("sh").with_base_args(["-c"]);
        let out = runner.run(&["echo hello"]).await.unwrap();
        assert_eq!(out.trim(), "hello");
    }

    #[tokio::test]
    async fn test_non_zero_exit_carries_stderr() {
        let runner = CommandRunner::new("sh").with_base_args(["-c"]);
        let err = runner.run(&["echo broken >&2; exit 3"]).await.unwrap_err();
        match err {
            ProvisionError::Command(msg) => assert_eq!(msg, "broken"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_run_streamed_writes_output_before_failing() {
        let runner = CommandRunner::new("sh").with_base_args(["-c"]);
        let mut stdout: Vec<u8> = Vec::new();
        let mut stderr: Vec<u8> = Vec::new();

        let err = runner
            .run_streamed(&["echo partial; echo oops >&2; exit 1"], &mut stdout, &mut stderr)
            .await
            .unwrap_err();

        assert!(matches!(err, ProvisionError::Command(_)));
        assert_eq!(stdout, b"partial\n");
        assert_eq!(stderr, b"oops\n");
    }

    #[tokio::test]
    async fn test_run_streamed_keeps_output_written_before_timeout() {
        let runner = CommandRunner::new("sh")
            .with_base_args(["-c"])
            .with_timeout(Duration::from_millis(300));
        let mut stdout: Vec<u8> = Vec::new();
        let mut stderr: Vec<u8> = Vec::new();

        let err = runner
            .run_streamed(&["echo partial; echo slow >&2; sleep 5"], &mut stdout, &mut stderr)
            .await
            .unwrap_err();

        assert!(matches!(err, ProvisionError::Timeout(_)));
        assert_eq!(stdout, b"partial\n");
        assert_eq!(stderr, b"slow\n");
    }

    #[tokio::test]
    async fn test_timeout_is_distinct_error() {
        let runner = CommandRunner::new("sleep").with_timeout(Duration::from_millis(50));
        let err = runner.run(&["5"]).await.unwrap_err();
        assert!(matches!(err, ProvisionError::Timeout(_)));
        assert_eq!(err.kind(), fleetstack_core::ErrorKind::Timeout);
    }

    #[tokio::test]
    async fn test_missing_binary_is_io_error() {
        let runner = CommandRunner::new("fleetstack-definitely-not-installed");
        let err = runner.run(&[]).await.unwrap_err();
        assert!(matches!(err, ProvisionError::Io(_)));
    }
}
