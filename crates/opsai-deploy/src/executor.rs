use std::collections::HashMap;
use std::sync::OnceLock;
use std::sync::Arc;
use std::time::Duration;

use opsai_core::ArgValue;
use opsai_policy::DeployHost;
use opsai_workers::{ShellWorker, Worker};
use regex::Regex;

use crate::diagnose::DeployDiagnoser;
use crate::planner::PlanStep;

const DOCKER_VERIFY_SLEEP: Duration = Duration::from_secs(2);

fn container_name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"--name\s+(\S+)").unwrap())
}

/// The verified container's name and observed `docker ps` status string.
pub struct ContainerStatus {
    pub container_name: String,
    pub status: String,
}

/// Executes planned deploy steps with autonomous retry, and verifies a
/// Docker-based deployment actually stayed up after it started.
pub struct DeployExecutor {
    shell: Arc<ShellWorker>,
    diagnoser: Arc<DeployDiagnoser>,
    host: Arc<dyn DeployHost>,
}

impl DeployExecutor {
    pub fn new(shell: Arc<ShellWorker>, diagnoser: Arc<DeployDiagnoser>, host: Arc<dyn DeployHost>) -> Self {
        Self { shell, diagnoser, host }
    }

    async fn run_command(&self, command: &str, project_dir: &str) -> opsai_core::WorkerResult {
        let mut args = HashMap::new();
        args.insert("command".to_string(), ArgValue::from(command));
        if !project_dir.is_empty() {
            args.insert("working_dir".to_string(), ArgValue::from(project_dir));
        }
        self.shell.execute("execute_command", &args).await
    }

    /// Runs one planned step, retrying through the diagnoser's ReAct loop on
    /// failure. The first failure's error is always what's reported back,
    /// even if later retries fail differently, since it's the one the
    /// diagnoser's repair attempt was actually grounded on.
    pub async fn execute_with_retry(&self, step: &PlanStep, project_dir: &str, project_type: &str, known_files: &[String], max_retries: usize, dry_run: bool) -> (bool, String) {
        let description = if step.description.is_empty() { step.command.clone() } else { step.description.clone() };

        if step.command.is_empty() {
            return (false, "empty command".to_string());
        }

        if dry_run {
            return (true, format!("[DRY-RUN] would run: {}", step.command));
        }

        let mut current_command = step.command.clone();
        let mut first_error = String::new();

        for attempt in 0..=max_retries {
            self.host.progress("deploy", &format!("running: {}", truncate(&current_command, 80)));
            let result = self.run_command(&current_command, project_dir).await;

            if result.success {
                return (true, format!("done: {description}"));
            }

            if attempt == 0 {
                first_error = result.message.clone();
            }

            if attempt == max_retries {
                return (false, format!("failed: {description}\ncommand: {current_command}\nerror: {first_error}"));
            }

            self.host.progress("deploy", "command failed; starting autonomous diagnosis");
            let outcome = self.diagnoser.react_diagnose_loop(&current_command, &result.message, project_type, project_dir, known_files, 3).await;

            if !outcome.fixed {
                let mut detail = format!("failed: {description}\ncommand: {current_command}\nerror: {first_error}");
                if !outcome.message.is_empty() {
                    detail.push('\n');
                    detail.push_str(&outcome.message);
                }
                return (false, detail);
            }

            if let Some(new_command) = outcome.new_command {
                current_command = new_command;
                self.host.progress("deploy", "retrying with the modified command");
            } else if !outcome.fix_commands.is_empty() {
                self.host.progress("deploy", "fix applied; retrying the original command");
            }
        }

        (false, format!("failed: {description} (retries exhausted)\ncommand: {current_command}\nerror: {first_error}"))
    }

    /// Checks that a `docker run --name ...` step in the plan actually left
    /// a running container behind, autonomously repairing the small number
    /// of failure shapes the diagnoser knows, bounded by `max_fix_attempts`.
    pub async fn verify_docker_deployment(&self, deploy_steps: &[PlanStep], project_dir: &str, project_type: &str, known_files: &[String], max_fix_attempts: usize) -> (bool, String, Option<ContainerStatus>) {
        let mut container_name = None;
        let mut docker_run_command = None;

        for step in deploy_steps {
            if step.command.contains("docker run") && step.command.contains("--name") {
                if let Some(captures) = container_name_pattern().captures(&step.command) {
                    container_name = Some(captures[1].to_string());
                    docker_run_command = Some(step.command.clone());
                    break;
                }
            }
        }

        let Some(container_name) = container_name else {
            self.host.progress("deploy", "no docker container name detected; skipping verification");
            return (true, "no container name detected".to_string(), None);
        };
        let mut docker_run_command = docker_run_command;

        self.host.progress("deploy", &format!("checking status of container {container_name}"));

        for attempt in 0..=max_fix_attempts {
            let check = self.run_command(&format!("docker ps --filter name=^{container_name}$ --format '{{{{.Names}}}} {{{{.Status}}}}'"), "").await;

            if check.success && check.message.contains(&container_name) {
                let status = extract_status(&check.message, &container_name).unwrap_or_else(|| "running".to_string());
                if status.contains("Up") {
                    self.host.progress("deploy", &format!("container {container_name} is running: {status}"));
                    return (true, format!("container verified: {container_name} ({status})"), Some(ContainerStatus { container_name, status }));
                }
            }

            self.host.progress("deploy", &format!("container {container_name} is not running; checking why"));

            let all_containers = self.run_command(&format!("docker ps -a --filter name=^{container_name}$ --format '{{{{.Names}}}} {{{{.Status}}}}'"), "").await;
            let container_exists = all_containers.message.contains(&container_name);

            let error_message = if container_exists {
                self.host.progress("deploy", "fetching container logs");
                let logs = self.run_command(&format!("docker logs --tail 50 {container_name} 2>&1"), "").await;
                let container_logs = if logs.success { logs.message.clone() } else { "could not fetch logs".to_string() };
                format!("container {container_name} has exited.\nlogs:\n{}", truncate(&container_logs, 500))
            } else {
                format!("container {container_name} does not exist")
            };

            self.host.progress("deploy", &format!("{}", truncate(&error_message, 100)));

            if attempt < max_fix_attempts {
                if let Some(run_command) = docker_run_command.clone() {
                    self.host.progress("deploy", &format!("attempting a fix ({}/{max_fix_attempts})", attempt + 1));

                    let outcome = self.diagnoser.react_diagnose_loop(&run_command, &error_message, project_type, project_dir, known_files, 2).await;

                    if outcome.fixed {
                        if let Some(new_command) = outcome.new_command {
                            docker_run_command = Some(new_command.clone());
                            self.host.progress("deploy", "running the fixed command");
                            let run_result = self.run_command(&new_command, project_dir).await;
                            if !run_result.success {
                                self.host.progress("deploy", &format!("fix command failed: {}", truncate(&run_result.message, 100)));
                                continue;
                            }
                        }

                        tokio::time::sleep(DOCKER_VERIFY_SLEEP).await;
                        continue;
                    } else {
                        self.host.progress("deploy", &format!("could not fix automatically: {}", truncate(&outcome.message, 100)));
                    }
                }
            }

            return (false, format!("container {container_name} failed to start: {}", truncate(&error_message, 200)), None);
        }

        (false, format!("container {container_name} verification failed"), None)
    }
}

fn extract_status(message: &str, container_name: &str) -> Option<String> {
    for line in message.lines() {
        if let Some(rest) = line.strip_prefix(container_name) {
            return Some(rest.trim().to_string());
        }
    }
    None
}

fn truncate(value: &str, max_chars: usize) -> String {
    value.chars().take(max_chars).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_status_finds_matching_line() {
        let message = "web Up 5 minutes";
        assert_eq!(extract_status(message, "web"), Some("Up 5 minutes".to_string()));
    }

    #[test]
    fn test_extract_status_none_when_absent() {
        assert_eq!(extract_status("other Up 1 minute", "web"), None);
    }

    #[test]
    fn test_container_name_pattern_extracts_name() {
        let captures = container_name_pattern().captures("docker run -d --name web -p 5000:5000 app").unwrap();
        assert_eq!(&captures[1], "web");
    }
}
