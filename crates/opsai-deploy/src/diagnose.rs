use std::collections::HashMap;
use std::sync::Arc;
use std::sync::OnceLock;
use std::time::Duration;

use opsai_core::ArgValue;
use opsai_llm::LlmClient;
use opsai_policy::{is_destructive_command, DeployHost};
use opsai_workers::{ShellWorker, Worker};
use regex::Regex;
use serde::Deserialize;
use tracing::warn;

use crate::prompts::{build_diagnose_prompt, DIAGNOSE_SYSTEM_PROMPT};

const DIAGNOSE_TIMEOUT: Duration = Duration::from_secs(60);
const MAX_ERROR_CHARS: usize = 1500;
const MAX_KNOWN_FILES: usize = 30;
const MAX_FIX_COMMANDS: usize = 5;

fn port_mapping_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"-p\s+(\d+):(\d+)").unwrap())
}

fn container_name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"--name\s+(\S+)").unwrap())
}

/// A repair the Tier 1 local rule table produced without ever calling the
/// LLM.
enum LocalFix {
    /// Retry with this command substituted for the one that failed.
    ReplaceCommand { new_command: String, cause: String, thinking: Vec<String> },
    /// Run these commands first, then retry the original command unchanged.
    PrepareThenRetry { commands: Vec<String>, cause: String, thinking: Vec<String> },
}

/// What the diagnoser decided to do about one failure, after Tier 1 and (if
/// needed) Tier 2 both ran. Mirrors the closed `{fix, ask_user, edit_file,
/// give_up}` action set, collapsed to what the executor actually needs.
pub struct DiagnoseOutcome {
    pub fixed: bool,
    pub message: String,
    pub fix_commands: Vec<String>,
    pub new_command: Option<String>,
    pub cause: String,
}

#[derive(Debug, Clone, Deserialize, Default)]
struct AskUserInfo {
    #[serde(default)]
    question: String,
    #[serde(default)]
    options: Vec<String>,
    #[serde(default)]
    context: String,
}

#[derive(Debug, Clone, Deserialize, Default)]
struct EditFileInfo {
    #[serde(default)]
    path: String,
    #[serde(default)]
    content: String,
    #[serde(default)]
    reason: String,
}

#[derive(Debug, Clone, Deserialize)]
struct RawDiagnosis {
    #[serde(default = "default_action")]
    action: String,
    #[serde(default)]
    thinking: Vec<String>,
    #[serde(default)]
    cause: String,
    #[serde(default)]
    suggestion: String,
    #[serde(default)]
    new_command: Option<String>,
    #[serde(default)]
    commands: Vec<String>,
    #[serde(default)]
    ask_user: Option<AskUserInfo>,
    #[serde(default)]
    edit_file: Option<EditFileInfo>,
}

fn default_action() -> String {
    "give_up".to_string()
}

impl RawDiagnosis {
    fn give_up(cause: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self {
            action: "give_up".to_string(),
            thinking: Vec::new(),
            cause: cause.into(),
            suggestion: suggestion.into(),
            new_command: None,
            commands: Vec::new(),
            ask_user: None,
            edit_file: None,
        }
    }
}

/// Diagnoses a failed deploy command: a no-LLM local rule table for known
/// failure shapes, falling back to an LLM-driven ReAct mini-loop bounded by
/// a small iteration budget and a 60-second per-call timeout.
pub struct DeployDiagnoser {
    shell: Arc<ShellWorker>,
    llm: Arc<dyn LlmClient>,
    host: Arc<dyn DeployHost>,
}

impl DeployDiagnoser {
    pub fn new(shell: Arc<ShellWorker>, llm: Arc<dyn LlmClient>, host: Arc<dyn DeployHost>) -> Self {
        Self { shell, llm, host }
    }

    /// Tier 1: a fixed, ordered set of patterns over the (command, error)
    /// pair, checked entirely without calling the LLM.
    fn try_local_fix(command: &str, error: &str) -> Option<LocalFix> {
        let error_lower = error.to_ascii_lowercase();

        if error_lower.contains("command blocked") || error_lower.contains("dangerous pattern") {
            if let Some(fix) = Self::handle_blocked_command(command, error) {
                return Some(fix);
            }
        }

        if error_lower.contains("address already in use") || (error_lower.contains("port") && error_lower.contains("in use")) {
            if let Some(captures) = port_mapping_pattern().captures(command) {
                if let Ok(host_port) = captures[1].parse::<u32>() {
                    let container_port = captures[2].to_string();
                    let new_host_port = host_port + 1;
                    let replacement = format!("-p {new_host_port}:{container_port}");
                    let new_command = port_mapping_pattern().replace(command, replacement.as_str()).to_string();
                    return Some(LocalFix::ReplaceCommand {
                        new_command,
                        cause: format!("port {host_port} was in use; switched to {new_host_port}"),
                        thinking: vec![format!("observed: port {host_port} is already in use"), format!("decided: use port {new_host_port} instead")],
                    });
                }
            }
        }

        if error_lower.contains("container name") && error_lower.contains("already in use") {
            if let Some(captures) = container_name_pattern().captures(command) {
                let name = captures[1].to_string();
                return Some(LocalFix::PrepareThenRetry {
                    commands: vec![format!("docker rm -f {name}")],
                    cause: format!("container {name} already existed; removed it first"),
                    thinking: vec![format!("observed: container {name} already exists"), "decided: remove the old container, then retry".to_string()],
                });
            }
        }

        None
    }

    /// Smarter substitutes for commands the safety gate blocked outright.
    fn handle_blocked_command(command: &str, error: &str) -> Option<LocalFix> {
        let error_lower = error.to_ascii_lowercase();

        if command.contains("python") && (command.contains("secrets") || command.contains("random")) && (error.contains("';'") || error_lower.contains("dangerous pattern")) {
            let new_command = if command.contains("> .env") || command.contains(">> .env") {
                "echo SECRET_KEY=$(openssl rand -hex 32) > .env".to_string()
            } else {
                "openssl rand -hex 32".to_string()
            };
            return Some(LocalFix::ReplaceCommand {
                new_command,
                cause: "the python secret-generating command was blocked; substituted openssl".to_string(),
                thinking: vec![
                    "observed: the python command contained a semicolon and was blocked by the safety gate".to_string(),
                    "decided: use `openssl rand -hex 32` instead, which needs no semicolon".to_string(),
                ],
            });
        }

        if (command.contains("&&") || command.contains("||")) && (error.contains("'&&'") || error.contains("'||'") || error_lower.contains("dangerous pattern")) {
            let commands: Vec<String> = if command.contains("&&") {
                command.split("&&").map(|part| part.trim().to_string()).collect()
            } else {
                command.split("||").take(1).map(|part| part.trim().to_string()).collect()
            };

            if !commands.is_empty() {
                return Some(LocalFix::PrepareThenRetry {
                    commands,
                    cause: "the chained command was blocked; split into independent commands".to_string(),
                    thinking: vec!["observed: the command chain used && or || and was blocked".to_string(), "decided: split it into independent commands".to_string()],
                });
            }
        }

        None
    }

    async fn llm_diagnose(&self, command: &str, error: &str, project_type: &str, project_dir: &str, known_files: &[String], collected_info: &str) -> RawDiagnosis {
        if let Some(fix) = Self::try_local_fix(command, error) {
            self.host.progress("deploy", "applying a local rule-based fix");
            return match fix {
                LocalFix::ReplaceCommand { new_command, cause, thinking } => RawDiagnosis {
                    action: "fix".to_string(),
                    thinking,
                    cause,
                    suggestion: String::new(),
                    new_command: Some(new_command),
                    commands: Vec::new(),
                    ask_user: None,
                    edit_file: None,
                },
                LocalFix::PrepareThenRetry { commands, cause, thinking } => {
                    RawDiagnosis { action: "fix".to_string(), thinking, cause, suggestion: String::new(), new_command: None, commands, ask_user: None, edit_file: None }
                }
            };
        }

        let known_files_str = if known_files.is_empty() { "(unknown)".to_string() } else { known_files.iter().take(MAX_KNOWN_FILES).cloned().collect::<Vec<_>>().join(", ") };
        let error_truncated: String = error.chars().take(MAX_ERROR_CHARS).collect();
        let collected = if collected_info.is_empty() { "(none)".to_string() } else { collected_info.to_string() };

        let prompt = build_diagnose_prompt(command, &error_truncated, project_type, project_dir, &known_files_str, &collected);

        self.host.progress("deploy", "calling the model to diagnose the failure");

        let generation = tokio::time::timeout(DIAGNOSE_TIMEOUT, self.llm.generate_json(DIAGNOSE_SYSTEM_PROMPT, &prompt, &[])).await;

        match generation {
            Err(_) => {
                self.host.progress("deploy", "model diagnosis timed out");
                RawDiagnosis::give_up("the diagnosis request timed out", "check network connectivity or retry later")
            }
            Ok(Err(error)) => {
                warn!(%error, "llm diagnosis call failed");
                self.host.progress("deploy", &format!("diagnosis call failed: {error}"));
                RawDiagnosis::give_up(format!("diagnosis call failed: {error}"), "check the configured LLM settings")
            }
            Ok(Ok(None)) => {
                self.host.progress("deploy", "model returned a malformed diagnosis");
                RawDiagnosis::give_up("could not parse a diagnosis", "check manually")
            }
            Ok(Ok(Some(value))) => serde_json::from_value(value).unwrap_or_else(|_| RawDiagnosis::give_up("could not parse a diagnosis", "check manually")),
        }
    }

    /// The ReAct mini-loop: diagnose, (maybe) act, observe, repeat, bounded
    /// by `max_iterations`.
    pub async fn react_diagnose_loop(&self, command: &str, error: &str, project_type: &str, project_dir: &str, known_files: &[String], max_iterations: usize) -> DiagnoseOutcome {
        let mut collected_info: Vec<String> = Vec::new();

        for iteration in 0..max_iterations {
            self.host.progress("deploy", &format!("diagnosing (round {}/{max_iterations})", iteration + 1));

            let diagnosis = self.llm_diagnose(command, error, project_type, project_dir, known_files, &collected_info.join("\n")).await;

            for thought in &diagnosis.thinking {
                self.host.progress("deploy", thought);
            }
            if !diagnosis.cause.is_empty() {
                self.host.progress("deploy", &format!("analysis: {}", diagnosis.cause));
            }

            match diagnosis.action.as_str() {
                "give_up" => {
                    let suggestion = if diagnosis.suggestion.is_empty() { "check the project manually".to_string() } else { diagnosis.suggestion.clone() };
                    return DiagnoseOutcome {
                        fixed: false,
                        message: format!("cause: {}\nsuggestion: {}", diagnosis.cause, suggestion),
                        fix_commands: Vec::new(),
                        new_command: None,
                        cause: diagnosis.cause,
                    };
                }
                "fix" => {
                    if let Some(new_command) = diagnosis.new_command.filter(|c| !c.is_empty()) {
                        self.host.progress("deploy", "retrying with the modified command");
                        return DiagnoseOutcome { fixed: true, message: "generated a replacement command".to_string(), fix_commands: Vec::new(), new_command: Some(new_command), cause: diagnosis.cause };
                    }

                    let mut fix_commands = Vec::new();
                    for candidate in diagnosis.commands.iter().take(MAX_FIX_COMMANDS) {
                        if candidate.is_empty() {
                            continue;
                        }

                        if is_destructive_command(candidate) {
                            self.host.progress("deploy", &format!("confirmation required: {candidate}"));
                            if !self.host.confirm("execute command", candidate).await {
                                collected_info.push(format!("user declined to run: {candidate}"));
                                continue;
                            }
                        }

                        self.host.progress("deploy", &format!("fixing: {candidate}"));
                        let mut args = HashMap::new();
                        args.insert("command".to_string(), ArgValue::from(candidate.as_str()));
                        args.insert("working_dir".to_string(), ArgValue::from(project_dir));
                        let result = self.shell.execute("execute_command", &args).await;
                        if result.success {
                            self.host.progress("deploy", "succeeded");
                            fix_commands.push(candidate.clone());
                        } else {
                            self.host.progress("deploy", &format!("failed: {}", truncate(&result.message, 100)));
                            collected_info.push(format!("fix command `{candidate}` failed: {}", truncate(&result.message, 200)));
                        }
                    }

                    if !fix_commands.is_empty() {
                        return DiagnoseOutcome { fixed: true, message: "ran fix commands".to_string(), fix_commands, new_command: None, cause: diagnosis.cause };
                    }
                }
                "ask_user" => {
                    if let Some(ask) = diagnosis.ask_user {
                        let options = if ask.options.is_empty() { vec!["confirm".to_string(), "cancel".to_string()] } else { ask.options };
                        self.host.progress("deploy", &format!("question: {}", ask.question));
                        let choice = self.host.ask_user(&ask.question, &options, &ask.context).await;
                        if choice.is_empty() {
                            return DiagnoseOutcome { fixed: false, message: "the user cancelled the operation".to_string(), fix_commands: Vec::new(), new_command: None, cause: String::new() };
                        }
                        collected_info.push(format!("user chose: {choice}"));
                    }
                }
                "edit_file" => {
                    if let Some(edit) = diagnosis.edit_file {
                        if !edit.path.is_empty() && !edit.content.is_empty() {
                            let full_path = std::path::Path::new(project_dir).join(&edit.path);
                            let preview = format!("reason: {}\ncontent preview: {}", edit.reason, truncate(&edit.content, 200));
                            self.host.progress("deploy", &format!("edit requested: {}", edit.path));
                            if self.host.confirm(&format!("edit file {}", edit.path), &preview).await {
                                match std::fs::write(&full_path, &edit.content) {
                                    Ok(()) => {
                                        self.host.progress("deploy", "file updated");
                                        return DiagnoseOutcome {
                                            fixed: true,
                                            message: format!("edited file {}", edit.path),
                                            fix_commands: vec![format!("edit:{}", edit.path)],
                                            new_command: None,
                                            cause: diagnosis.cause,
                                        };
                                    }
                                    Err(error) => collected_info.push(format!("failed to edit file: {error}")),
                                }
                            } else {
                                collected_info.push(format!("user declined to edit: {}", edit.path));
                            }
                        }
                    }
                }
                other => {
                    collected_info.push(format!("skipped unsupported action: {other}"));
                }
            }
        }

        DiagnoseOutcome { fixed: false, message: "diagnosis exceeded the maximum number of attempts".to_string(), fix_commands: Vec::new(), new_command: None, cause: String::new() }
    }
}

fn truncate(value: &str, max_chars: usize) -> String {
    value.chars().take(max_chars).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_fix_port_in_use_increments_port() {
        let fix = DeployDiagnoser::try_local_fix("docker run -d --name web -p 5000:5000 app", "bind: address already in use");
        match fix {
            Some(LocalFix::ReplaceCommand { new_command, .. }) => assert!(new_command.contains("-p 5001:5000")),
            _ => panic!("expected a replace-command fix"),
        }
    }

    #[test]
    fn test_local_fix_container_conflict_removes_first() {
        let fix = DeployDiagnoser::try_local_fix("docker run -d --name web app", "Error: container name \"web\" is already in use");
        match fix {
            Some(LocalFix::PrepareThenRetry { commands, .. }) => assert_eq!(commands, vec!["docker rm -f web".to_string()]),
            _ => panic!("expected a prepare-then-retry fix"),
        }
    }

    #[test]
    fn test_blocked_python_secret_command_substitutes_openssl() {
        let fix = DeployDiagnoser::try_local_fix(
            "python -c 'import secrets; print(secrets.token_hex())' > .env",
            "Command blocked: Dangerous pattern detected: ';'",
        );
        match fix {
            Some(LocalFix::ReplaceCommand { new_command, .. }) => assert!(new_command.contains("openssl")),
            _ => panic!("expected a replace-command fix"),
        }
    }

    #[test]
    fn test_blocked_chain_splits_into_independent_commands() {
        let fix = DeployDiagnoser::try_local_fix("docker build . && docker run img", "Command blocked: Dangerous pattern detected: '&&'");
        match fix {
            Some(LocalFix::PrepareThenRetry { commands, .. }) => assert_eq!(commands, vec!["docker build .".to_string(), "docker run img".to_string()]),
            _ => panic!("expected a prepare-then-retry fix"),
        }
    }

    #[test]
    fn test_unrelated_error_has_no_local_fix() {
        assert!(DeployDiagnoser::try_local_fix("npm install", "network timeout").is_none());
    }
}
