use std::{process::Stdio, time::Duration};

use {
    async_trait::async_trait,
    tokio::process::Command,
    tracing::{debug, warn},
};

use crate::error::RunError;

/// Something that can run a command line and hand back its stdout.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run `command_line` to completion. Resolves with captured stdout when
    /// the command exits 0.
    async fn run(&self, command_line: &str) -> Result<String, RunError>;
}

/// Runs command lines through the platform shell with a timeout.
///
/// Stdout is captured. Stderr and stdin stay attached to the caller's
/// terminal so the operator sees warnings and can answer login prompts.
#[derive(Debug, Clone)]
pub struct ShellRunner {
    pub timeout: Duration,
}

impl Default for ShellRunner {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(180),
        }
    }
}

impl ShellRunner {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

fn shell_command(command_line: &str) -> Command {
    #[cfg(windows)]
    {
        let mut cmd = std::process::Command::new("cmd");
        cmd.arg("/C").arg(command_line);
        Command::from(cmd)
    }
    #[cfg(not(windows))]
    {
        use std::os::unix::process::CommandExt;

        let mut cmd = std::process::Command::new("sh");
        // Own process group, so a timeout can take down everything the
        // shell started and not just the shell.
        cmd.arg("-c").arg(command_line).process_group(0);
        Command::from(cmd)
    }
}

/// SIGKILL every process in the group led by `pgid`.
#[cfg(unix)]
async fn kill_process_group(pgid: u32) {
    let result = Command::new("kill")
        .arg("-KILL")
        .arg("--")
        .arg(format!("-{pgid}"))
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await;
    match result {
        Ok(status) if !status.success() => {
            debug!(pgid, exit_code = status.code(), "process group already gone");
        },
        Ok(_) => {},
        Err(error) => warn!(pgid, %error, "failed to kill process group"),
    }
}

#[async_trait]
impl CommandRunner for ShellRunner {
    async fn run(&self, command_line: &str) -> Result<String, RunError> {
        debug!(
            command = command_line,
            timeout_secs = self.timeout.as_secs(),
            "running command"
        );

        let mut cmd = shell_command(command_line);
        cmd.stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .stdin(Stdio::inherit())
            // Dropping the wait future on timeout kills the shell itself.
            .kill_on_drop(true);

        let child = cmd.spawn().map_err(|source| RunError::Spawn {
            command: command_line.to_string(),
            source,
        })?;
        let pid = child.id();

        match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => {
                let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
                let exit_code = output.status.code().unwrap_or(-1);
                debug!(
                    command = command_line,
                    exit_code,
                    stdout_len = stdout.len(),
                    "command done"
                );
                if output.status.success() {
                    Ok(stdout)
                } else {
                    Err(RunError::Exit {
                        command: command_line.to_string(),
                        exit_code,
                        output: stdout,
                    })
                }
            },
            Ok(Err(source)) => Err(RunError::Wait {
                command: command_line.to_string(),
                source,
            }),
            Err(_) => {
                warn!(command = command_line, pid, "command timed out");
                #[cfg(unix)]
                {
                    if let Some(pgid) = pid {
                        kill_process_group(pgid).await;
                    }
                }
                Err(RunError::Timeout {
                    command: command_line.to_string(),
                    timeout: self.timeout,
                })
            },
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_run_echo() {
        let out = ShellRunner::default().run("echo hello").await.unwrap();
        assert_eq!(out.trim(), "hello");
    }

    #[tokio::test]
    async fn test_stderr_is_not_captured() {
        let out = ShellRunner::default()
            .run("echo out; echo err >&2")
            .await
            .unwrap();
        assert_eq!(out.trim(), "out");
    }

    #[tokio::test]
    async fn test_exit_code_and_partial_output() {
        let err = ShellRunner::default()
            .run("echo partial; exit 42")
            .await
            .unwrap_err();
        match err {
            RunError::Exit {
                exit_code, output, ..
            } => {
                assert_eq!(exit_code, 42);
                assert_eq!(output.trim(), "partial");
            },
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_missing_command_is_127() {
        let err = ShellRunner::default()
            .run("nonexistent_command_xyz_42 --version")
            .await
            .unwrap_err();
        assert_eq!(err.exit_code(), Some(127));
        assert!(err.is_command_not_found());
    }

    #[tokio::test]
    async fn test_timeout() {
        let runner = ShellRunner::new(Duration::from_millis(100));
        let started = std::time::Instant::now();
        let err = runner.run("sleep 10").await.unwrap_err();
        assert!(matches!(err, RunError::Timeout { .. }));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_timeout_kills_grandchildren() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("marker");
        let runner = ShellRunner::new(Duration::from_millis(200));

        let err = runner
            .run(&format!("sh -c 'sleep 1; touch {}'", marker.display()))
            .await
            .unwrap_err();
        assert!(matches!(err, RunError::Timeout { .. }));

        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert!(!marker.exists(), "grandchild outlived the timeout");
    }
}
