use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use opsai_core::ArgValue;
use opsai_llm::LlmClient;
use opsai_workers::{ShellWorker, Worker};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::prompts::{build_plan_prompt, PLAN_SYSTEM_PROMPT};
use crate::state::ProjectType;

const PRIORITY_FILES: &[&str] =
    &["Dockerfile", "docker-compose.yml", "docker-compose.yaml", "package.json", "requirements.txt", "pyproject.toml", "go.mod", "Cargo.toml", "Makefile", "README.md"];
const MAX_KEY_FILES: usize = 5;
const MAX_FILE_LINES: usize = 100;
const MAX_FILE_BYTES: u64 = 50_000;
const MAX_README_CHARS: usize = 3000;
const MAX_LISTED_FILES: usize = 50;

/// One step of a planned deployment, as the LLM returned it. `risk_level` is
/// advisory; the orchestrator's own risk policy is what actually gates
/// execution elsewhere, never this field.
#[derive(Debug, Clone, Deserialize)]
pub struct PlanStep {
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub command: String,
    #[serde(default = "default_risk_level")]
    pub risk_level: String,
}

fn default_risk_level() -> String {
    "safe".to_string()
}

/// The quadruple the planner produces: ordered steps, the LLM's own project
/// classification, free-form notes, and its stepwise rationale.
#[derive(Debug, Clone, Default)]
pub struct DeployPlan {
    pub steps: Vec<PlanStep>,
    pub project_type: ProjectType,
    pub notes: String,
    pub thinking: Vec<String>,
}

impl Default for ProjectType {
    fn default() -> Self {
        Self::Unknown
    }
}

/// Collects local environment and project context, then asks the LLM for a
/// deployment plan grounded in the project's actual configuration files.
pub struct DeployPlanner {
    shell: Arc<ShellWorker>,
    llm: Arc<dyn LlmClient>,
}

impl DeployPlanner {
    pub fn new(shell: Arc<ShellWorker>, llm: Arc<dyn LlmClient>) -> Self {
        Self { shell, llm }
    }

    async fn probe_output(&self, command: &str) -> Option<String> {
        let mut args = HashMap::new();
        args.insert("command".to_string(), ArgValue::from(command));
        let result = self.shell.execute("execute_command", &args).await;
        if !result.success {
            return None;
        }
        result.raw_output.map(|raw| raw.content.trim().to_string()).filter(|s| !s.is_empty())
    }

    async fn probe_success(&self, command: &str) -> bool {
        let mut args = HashMap::new();
        args.insert("command".to_string(), ArgValue::from(command));
        self.shell.execute("execute_command", &args).await.success
    }

    /// Probes the local machine for what the deployment plan can rely on:
    /// OS, python/node/uv presence, and docker presence plus daemon
    /// reachability.
    pub async fn collect_env_info(&self) -> Vec<(String, String)> {
        let mut env = vec![("os".to_string(), std::env::consts::OS.to_string())];

        let python = self.probe_output("which python3").await;
        env.push(("python".to_string(), python.map(|p| format!("python3 ({p})")).unwrap_or_else(|| "not installed".to_string())));

        match self.probe_output("docker version").await {
            Some(output) => {
                let first_line = output.lines().next().unwrap_or_default().to_string();
                env.push(("docker".to_string(), first_line));
                let running = self.probe_success("docker info").await;
                env.push(("docker_running".to_string(), if running { "yes".to_string() } else { "no (Docker daemon not running)".to_string() }));
            }
            None => {
                env.push(("docker".to_string(), "not installed".to_string()));
                env.push(("docker_running".to_string(), "no".to_string()));
            }
        }

        let node = self.probe_output("which node").await;
        env.push(("node".to_string(), node.map(|p| format!("installed ({p})")).unwrap_or_else(|| "not installed".to_string())));

        let uv = self.probe_output("which uv").await;
        env.push(("uv".to_string(), uv.map(|p| format!("installed ({p})")).unwrap_or_else(|| "not installed".to_string())));

        env
    }

    /// Reads up to `MAX_FILE_LINES` lines of a project file, bounded to
    /// `MAX_FILE_BYTES` on disk, never erroring out of the caller's flow.
    fn read_local_file(project_dir: &str, filename: &str) -> String {
        let path = Path::new(project_dir).join(filename);
        if !path.is_file() {
            return String::new();
        }

        match std::fs::metadata(&path) {
            Ok(meta) if meta.len() > MAX_FILE_BYTES => return "(file too large, skipped)".to_string(),
            Err(error) => return format!("(failed to read: {error})"),
            _ => {}
        }

        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(error) => return format!("(failed to read: {error})"),
        };

        let lines: Vec<&str> = content.lines().collect();
        if lines.len() > MAX_FILE_LINES {
            let mut truncated = lines[..MAX_FILE_LINES].join("\n");
            truncated.push_str(&format!("\n... (truncated, showing the first {MAX_FILE_LINES} lines)"));
            truncated
        } else {
            content
        }
    }

    /// Reads up to five priority configuration files from the cloned
    /// project, in the fixed priority order.
    pub fn collect_key_file_contents(project_dir: &str) -> String {
        let mut sections = Vec::new();
        for filename in PRIORITY_FILES {
            if sections.len() >= MAX_KEY_FILES {
                break;
            }
            let content = Self::read_local_file(project_dir, filename);
            if !content.is_empty() && !content.starts_with('(') {
                sections.push(format!("=== {filename} ===\n{content}"));
            }
        }

        if sections.is_empty() {
            "(no key configuration files found; infer from filenames)".to_string()
        } else {
            sections.join("\n\n")
        }
    }

    /// Asks the LLM for a `(steps, project_type, notes, thinking)` plan.
    /// Never propagates an LLM failure as an error: a malformed or failed
    /// response degrades to an empty plan with an explanatory note, since
    /// the caller reports that to the user rather than aborting the whole
    /// deploy worker.
    pub async fn generate_plan(&self, readme: &str, files: &[String], env_info: &[(String, String)], project_dir: &str) -> Result<DeployPlan> {
        let readme_truncated = if readme.is_empty() { "(no README)".to_string() } else { readme.chars().take(MAX_README_CHARS).collect() };

        let files_str = if files.is_empty() { "(no file listing)".to_string() } else { files.iter().take(MAX_LISTED_FILES).cloned().collect::<Vec<_>>().join(", ") };

        let env_str = env_info.iter().map(|(key, value)| format!("- {key}: {value}")).collect::<Vec<_>>().join("\n");

        let key_file_contents = if project_dir.is_empty() { "(project not yet cloned)".to_string() } else { Self::collect_key_file_contents(project_dir) };

        let prompt = build_plan_prompt(&readme_truncated, &files_str, &key_file_contents, &env_str);

        let value = match self.llm.generate_json(PLAN_SYSTEM_PROMPT, &prompt, &[]).await {
            Ok(Some(value)) => value,
            Ok(None) => {
                return Ok(DeployPlan { notes: "the model's response could not be parsed as JSON".to_string(), ..Default::default() });
            }
            Err(error) => {
                debug!(%error, "deploy plan generation failed");
                return Ok(DeployPlan { notes: format!("plan generation failed: {error}"), ..Default::default() });
            }
        };

        Ok(parse_plan(&value))
    }
}

fn parse_plan(value: &Value) -> DeployPlan {
    let steps: Vec<PlanStep> = value.get("steps").and_then(|v| serde_json::from_value(v.clone()).ok()).unwrap_or_default();
    let thinking: Vec<String> = value.get("thinking").and_then(|v| serde_json::from_value(v.clone()).ok()).unwrap_or_default();
    let project_type = value.get("project_type").and_then(Value::as_str).map(ProjectType::parse).unwrap_or(ProjectType::Unknown);
    let notes = value.get("notes").and_then(Value::as_str).unwrap_or_default().to_string();

    DeployPlan { steps, project_type, notes, thinking }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    #[test]
    fn test_parse_plan_reads_steps_and_type() {
        let value = json!({
            "steps": [{"description": "build", "command": "docker build -t app .", "risk_level": "safe"}],
            "project_type": "docker",
            "notes": "needs docker",
            "thinking": ["saw a Dockerfile"],
        });
        let plan = parse_plan(&value);
        assert_eq!(plan.steps.len(), 1);
        assert_eq!(plan.steps[0].command, "docker build -t app .");
        assert_eq!(plan.project_type, ProjectType::Docker);
        assert_eq!(plan.thinking, vec!["saw a Dockerfile".to_string()]);
    }

    #[test]
    fn test_parse_plan_defaults_on_missing_fields() {
        let plan = parse_plan(&json!({}));
        assert!(plan.steps.is_empty());
        assert_eq!(plan.project_type, ProjectType::Unknown);
    }

    #[test]
    fn test_collect_key_file_contents_reads_dockerfile() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("Dockerfile"), "FROM python:3.12\nEXPOSE 5000\n").unwrap();

        let contents = DeployPlanner::collect_key_file_contents(dir.path().to_str().unwrap());
        assert!(contents.contains("=== Dockerfile ==="));
        assert!(contents.contains("EXPOSE 5000"));
    }

    #[test]
    fn test_collect_key_file_contents_empty_when_nothing_present() {
        let dir = tempdir().unwrap();
        let contents = DeployPlanner::collect_key_file_contents(dir.path().to_str().unwrap());
        assert!(contents.contains("no key configuration files"));
    }

    #[test]
    fn test_read_local_file_truncates_long_files() {
        let dir = tempdir().unwrap();
        let content = (0..200).map(|i| format!("line {i}")).collect::<Vec<_>>().join("\n");
        std::fs::write(dir.path().join("Makefile"), content).unwrap();

        let read = DeployPlanner::read_local_file(dir.path().to_str().unwrap(), "Makefile");
        assert!(read.contains("truncated"));
    }
}
