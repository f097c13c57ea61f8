use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use opsai_core::{ArgValue, WorkerResult};
use opsai_journal::ChangeJournal;
use opsai_policy::check_shell_command;
use opsai_process::{run_shell, DEFAULT_COMMAND_TIMEOUT_SECS};

use crate::registry::{dry_run_flag, Worker};

pub struct ShellWorker {
    journal: ChangeJournal,
}

impl ShellWorker {
    pub fn new(journal: ChangeJournal) -> Self {
        Self { journal }
    }
}

#[async_trait]
impl Worker for ShellWorker {
    fn name(&self) -> &str {
        "shell"
    }

    fn capabilities(&self) -> &[&str] {
        &["execute_command"]
    }

    fn describe(&self) -> Vec<String> {
        vec!["execute_command(command: string, working_dir: string?, timeout: integer?): runs a shell command".to_string()]
    }

    async fn execute(&self, action: &str, args: &HashMap<String, ArgValue>) -> WorkerResult {
        match action {
            "execute_command" => self.execute_command(args).await,
            other => WorkerResult::unknown_action(other),
        }
    }
}

impl ShellWorker {
    async fn execute_command(&self, args: &HashMap<String, ArgValue>) -> WorkerResult {
        let Some(command) = args.get("command").and_then(ArgValue::as_str) else {
            return WorkerResult::err("command parameter is required and must be a string");
        };

        let dry_run = dry_run_flag(args);
        if dry_run {
            return WorkerResult::simulated(format!("[DRY-RUN] Would run: {command}"));
        }

        if let Err(blocked) = check_shell_command(command) {
            let _ = self.journal.record_command(command);
            return WorkerResult::err(blocked.message());
        }

        let timeout_secs = args
            .get("timeout")
            .and_then(ArgValue::as_i64)
            .map(|secs| secs.max(1) as u64)
            .unwrap_or(DEFAULT_COMMAND_TIMEOUT_SECS);

        let working_dir = args.get("working_dir").and_then(ArgValue::as_str);
        let effective_command = match working_dir {
            Some(dir) => format!("cd {} && {}", shell_quote(dir), command),
            None => command.to_string(),
        };

        let outcome = match run_shell(&effective_command, Duration::from_secs(timeout_secs)).await {
            Ok(outcome) => outcome,
            Err(error) => return WorkerResult::err(format!("Failed to execute command: {error}")),
        };

        let _ = self.journal.record_command(command);

        let message = format!(
            "Command: {command}\nOutput:\n{}\nError:\n{}\nExit code: {}",
            outcome.stdout, outcome.stderr, outcome.exit_code
        );

        let mut result = if outcome.success() {
            WorkerResult::ok(message)
        } else {
            WorkerResult::err(message)
        };
        result = result.with_raw_output(format!("{}{}", outcome.stdout, outcome.stderr), false);
        result
    }
}

fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "'\\''"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn worker() -> ShellWorker {
        let dir = tempdir().unwrap();
        ShellWorker::new(ChangeJournal::new(dir.path().join("journal")))
    }

    fn args(pairs: &[(&str, ArgValue)]) -> HashMap<String, ArgValue> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[tokio::test]
    async fn test_dry_run_does_not_execute() {
        let worker = worker();
        let result = worker
            .execute(
                "execute_command",
                &args(&[("command", ArgValue::from("echo hi")), ("dry_run", ArgValue::Bool(true))]),
            )
            .await;
        assert!(result.simulated);
        assert!(result.message.contains("DRY-RUN"));
    }

    #[tokio::test]
    async fn test_successful_command() {
        let worker = worker();
        let result = worker
            .execute("execute_command", &args(&[("command", ArgValue::from("echo hello"))]))
            .await;
        assert!(result.success);
        assert!(result.message.contains("hello"));
    }

    #[tokio::test]
    async fn test_blocked_command_message_format() {
        let worker = worker();
        let result = worker
            .execute("execute_command", &args(&[("command", ArgValue::from("ls; rm -rf /"))]))
            .await;
        assert!(!result.success);
        assert!(result.message.contains("Command blocked: Dangerous pattern detected:"));
    }

    #[tokio::test]
    async fn test_unknown_action() {
        let worker = worker();
        let result = worker.execute("teleport", &HashMap::new()).await;
        assert!(!result.success);
        assert!(result.message.contains("Unknown action"));
    }
}
