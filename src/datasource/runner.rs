use std::future::Future;
use std::io;
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;

/// Default upper bound for a single external tool invocation.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(5);

/// Captured output of a finished command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
}

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("{program} not found in PATH")]
    NotFound { program: String },
    #[error("failed to run {program}: {source}")]
    Io {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("{program} timed out after {after:?}")]
    Timeout { program: String, after: Duration },
    #[error("{program} exited with {code:?}: {stderr}")]
    Failed {
        program: String,
        code: Option<i32>,
        stderr: String,
        stdout: String,
    },
}

impl CommandError {
    /// Combined stdout/stderr of a failed command, empty for other kinds.
    pub fn output_text(&self) -> String {
        match self {
            CommandError::Failed { stdout, stderr, .. } => format!("{}{}", stdout, stderr),
            _ => String::new(),
        }
    }
}

/// Every external tool call goes through this trait.
pub trait CommandRunner: Send + Sync {
    fn run(
        &self,
        program: &str,
        args: &[String],
    ) -> impl Future<Output = Result<CommandOutput, CommandError>> + Send;
}

/// Runs commands on the host, each bounded by a timeout
#[derive(Debug, Clone)]
pub struct SystemCommandRunner {
    timeout: Duration,
}

impl Default for SystemCommandRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemCommandRunner {
    pub fn new() -> Self {
        Self {
            timeout: DEFAULT_COMMAND_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl CommandRunner for SystemCommandRunner {
    async fn run(&self, program: &str, args: &[String]) -> Result<CommandOutput, CommandError> {
        let child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output();

        let output = match tokio::time::timeout(self.timeout, child).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) if e.kind() == io::ErrorKind::NotFound => {
                return Err(CommandError::NotFound {
                    program: program.to_string(),
                });
            }
            Ok(Err(e)) => {
                return Err(CommandError::Io {
                    program: program.to_string(),
                    source: e,
                });
            }
            Err(_) => {
                tracing::debug!(program, ?args, "command timed out");
                return Err(CommandError::Timeout {
                    program: program.to_string(),
                    after: self.timeout,
                });
            }
        };

        // Non-UTF-8 bytes (e.g. odd process titles) are replaced, not rejected
        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

        if !output.status.success() {
            return Err(CommandError::Failed {
                program: program.to_string(),
                code: output.status.code(),
                stderr: stderr.trim().to_string(),
                stdout,
            });
        }

        Ok(CommandOutput { stdout, stderr })
    }
}

/// Build an owned argument list from string literals.
pub fn args<I, S>(items: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    items.into_iter().map(Into::into).collect()
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_builds_owned_list() {
        assert_eq!(args(["a", "b"]), vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_output_text_only_for_failed() {
        let failed = CommandError::Failed {
            program: "tmux".to_string(),
            code: Some(1),
            stderr: "no server running".to_string(),
            stdout: String::new(),
        };
        assert_eq!(failed.output_text(), "no server running");

        let missing = CommandError::NotFound {
            program: "tmux".to_string(),
        };
        assert!(missing.output_text().is_empty());
    }

    #[tokio::test]
    async fn test_missing_program_is_not_found() {
        let runner = SystemCommandRunner::new();
        let err = runner
            .run("definitely-not-a-real-binary-xyz", &[])
            .await
            .unwrap_err();
        assert!(matches!(err, CommandError::NotFound { .. }));
    }

    #[tokio::test]
    #[ignore] // needs a POSIX `sleep`
    async fn test_timeout_is_reported() {
        let runner = SystemCommandRunner::new().with_timeout(Duration::from_millis(50));
        let err = runner.run("sleep", &args(["5"])).await.unwrap_err();
        assert!(matches!(err, CommandError::Timeout { .. }));
    }
}
