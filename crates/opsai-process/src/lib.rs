//! Subprocess spawning with timeout enforcement. Dry-run interception is the
//! caller's responsibility (each worker decides what "would run" means for
//! its own action before reaching this layer).

use std::time::Duration;

use anyhow::{Context, Result};
use serde::Serialize;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::debug;

pub const DEFAULT_COMMAND_TIMEOUT_SECS: u64 = 60;

/// Output of one completed (or timed-out) shell invocation.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionResult {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    pub timed_out: bool,
}

impl ExecutionResult {
    pub fn success(&self) -> bool {
        !self.timed_out && self.exit_code == 0
    }
}

/// Runs `command` through `sh -c`, isolated in its own process group, with a
/// hard wall-clock timeout. A timed-out child is killed and `timed_out` is
/// set rather than returning `Err` — callers report this as a failed
/// `WorkerResult`, not a propagated error.
pub async fn run_shell(command: &str, timeout_duration: Duration) -> Result<ExecutionResult> {
    let mut cmd = Command::new("sh");
    cmd.arg("-c").arg(command);
    cmd.stdout(std::process::Stdio::piped());
    cmd.stderr(std::process::Stdio::piped());
    cmd.stdin(std::process::Stdio::null());
    cmd.kill_on_drop(true);

    #[cfg(unix)]
    unsafe {
        cmd.pre_exec(|| {
            libc::setsid();
            Ok(())
        });
    }

    debug!(command, "spawning shell command");
    let child = cmd.spawn().with_context(|| format!("failed to spawn command: {command}"))?;

    match timeout(timeout_duration, child.wait_with_output()).await {
        Ok(result) => {
            let output = result.with_context(|| format!("failed while waiting on command: {command}"))?;
            Ok(ExecutionResult {
                stdout: String::from_utf8_lossy(&output.stdout).to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).to_string(),
                exit_code: output.status.code().unwrap_or(1),
                timed_out: false,
            })
        }
        Err(_) => Ok(ExecutionResult {
            stdout: String::new(),
            stderr: format!("command timed out after {}s", timeout_duration.as_secs()),
            exit_code: 1,
            timed_out: true,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_successful_command_captures_stdout() {
        let result = run_shell("echo hello", Duration::from_secs(5)).await.unwrap();
        assert!(result.success());
        assert_eq!(result.stdout.trim(), "hello");
    }

    #[tokio::test]
    async fn test_nonzero_exit_is_not_success() {
        let result = run_shell("exit 2", Duration::from_secs(5)).await.unwrap();
        assert!(!result.success());
        assert_eq!(result.exit_code, 2);
    }

    #[tokio::test]
    async fn test_timeout_kills_and_marks_timed_out() {
        let result = run_shell("sleep 5", Duration::from_millis(100)).await.unwrap();
        assert!(result.timed_out);
        assert!(!result.success());
    }
}
