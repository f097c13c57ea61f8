use std::collections::HashMap;
use std::sync::Arc;

use opsai_core::{ArgValue, WorkerResult};
use opsai_policy::DeployHost;
use opsai_workers::{dry_run_flag, HttpWorker, ShellWorker, Worker};
use serde_json::{json, Value};

use crate::diagnose::DeployDiagnoser;
use crate::executor::DeployExecutor;
use crate::planner::{DeployPlanner, PlanStep};
use crate::state::parse_github_url;
use opsai_llm::LlmClient;

const MAX_LOGGED_KEY_FILES: usize = 10;

/// GitHub-project deploy worker: given a repository URL, clones it, asks
/// the model to classify the project and plan a deployment, runs the plan
/// with autonomous error recovery, and verifies a Docker deployment stayed
/// up.
pub struct DeployWorker {
    http: Arc<HttpWorker>,
    shell: Arc<ShellWorker>,
    planner: DeployPlanner,
    executor: DeployExecutor,
}

impl DeployWorker {
    pub fn new(http: Arc<HttpWorker>, shell: Arc<ShellWorker>, llm: Arc<dyn LlmClient>, host: Arc<dyn DeployHost>) -> Self {
        let planner = DeployPlanner::new(shell.clone(), llm.clone());
        let diagnoser = Arc::new(DeployDiagnoser::new(shell.clone(), llm, host.clone()));
        let executor = DeployExecutor::new(shell.clone(), diagnoser, host);
        Self { http, shell, planner, executor }
    }

    async fn intelligent_deploy(&self, args: &HashMap<String, ArgValue>) -> WorkerResult {
        let Some(repo_url) = args.get("repo_url").and_then(ArgValue::as_str) else {
            return WorkerResult::err("repo_url parameter is required");
        };

        let target_dir = args
            .get("target_dir")
            .and_then(ArgValue::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| std::env::current_dir().map(|p| p.display().to_string()).unwrap_or_else(|_| ".".to_string()));

        let dry_run = dry_run_flag(args);

        let mut steps_log: Vec<String> = Vec::new();

        steps_log.push("Step 1/4: collecting project information".to_string());

        let Some((owner, repo)) = parse_github_url(repo_url) else {
            return WorkerResult::err(format!("Invalid GitHub URL: {repo_url}"));
        };

        let mut readme_args = HashMap::new();
        readme_args.insert("repo_url".to_string(), ArgValue::from(repo_url));
        let readme_result = self.http.execute("fetch_github_readme", &readme_args).await;
        let readme_content = if readme_result.success { readme_result.message.clone() } else { String::new() };

        let files_result = self.http.execute("list_github_files", &readme_args).await;
        let key_files = extract_key_files(&files_result);

        steps_log.push(format!("  repository: {owner}/{repo}"));
        steps_log.push(format!("  key files: {}", if key_files.is_empty() { "none".to_string() } else { key_files.iter().take(MAX_LOGGED_KEY_FILES).cloned().collect::<Vec<_>>().join(", ") }));

        steps_log.push("Step 2/4: cloning the repository".to_string());

        let target_dir = expand_path(&target_dir);
        let clone_path = format!("{}/{repo}", target_dir.trim_end_matches('/'));

        if dry_run {
            steps_log.push(format!("  [DRY-RUN] would run: mkdir -p {target_dir}"));
            steps_log.push(format!("  [DRY-RUN] would run: git clone {repo_url}"));
        } else {
            let mkdir_result = self.run_shell(&format!("mkdir -p {}", shell_quote(&target_dir)), None).await;
            if !mkdir_result.success {
                return WorkerResult::err(format!("failed to create directory: {}", mkdir_result.message));
            }

            let check_result = self.run_shell(&format!("test -d {}", shell_quote(&clone_path)), None).await;
            let already_exists = check_result.success;

            if already_exists {
                steps_log.push(format!("  project already exists: {clone_path}"));
            } else {
                let clone_result = self.run_shell(&format!("git clone {} {}", shell_quote(repo_url), shell_quote(&clone_path)), None).await;
                if !clone_result.success {
                    return WorkerResult::err(format!("clone failed: {}", clone_result.message));
                }
                steps_log.push(format!("  cloned: {clone_path}"));
            }
        }

        steps_log.push("Step 3/4: the model is analyzing the project and generating a deployment plan".to_string());

        let env_info = self.planner.collect_env_info().await;
        let plan = match self.planner.generate_plan(&readme_content, &key_files, &env_info, &clone_path).await {
            Ok(plan) => plan,
            Err(error) => return WorkerResult::err(format!("plan generation failed: {error}")),
        };

        let mut deploy_steps: Vec<PlanStep> = Vec::new();
        let mut skipped_empty_commands = 0usize;
        for step in plan.steps {
            let command = step.command.trim().to_string();
            if command.is_empty() {
                skipped_empty_commands += 1;
                continue;
            }
            let description = if step.description.trim().is_empty() { command.clone() } else { step.description.trim().to_string() };
            deploy_steps.push(PlanStep { description, command, risk_level: step.risk_level });
        }

        if deploy_steps.is_empty() {
            return WorkerResult::err("could not produce a deployment plan: no executable commands were found. check the project structure or deploy manually.");
        }

        if skipped_empty_commands > 0 {
            steps_log.push(format!("  skipped {skipped_empty_commands} empty command step(s)"));
        }

        if !plan.thinking.is_empty() {
            steps_log.push("  reasoning:".to_string());
            for (index, thought) in plan.thinking.iter().enumerate() {
                steps_log.push(format!("    {}. {thought}", index + 1));
            }
        }

        steps_log.push(format!("  project type: {}", plan.project_type.as_str()));
        steps_log.push(format!("  deployment steps: {}", deploy_steps.len()));
        if !plan.notes.is_empty() {
            steps_log.push(format!("  notes: {}", plan.notes));
        }

        steps_log.push("Step 4/4: executing the deployment plan".to_string());

        let project_type = plan.project_type.as_str();
        let mut failed_step: Option<String> = None;
        let total = deploy_steps.len();

        for (index, step) in deploy_steps.iter().enumerate() {
            steps_log.push(format!("  [{}/{total}] {}", index + 1, step.description));

            let (success, message) = self.executor.execute_with_retry(step, &clone_path, project_type, &key_files, 3, dry_run).await;

            if !success {
                failed_step = Some(message.clone());
                steps_log.push(format!("    {message}"));
                break;
            }
            steps_log.push(format!("    {message}"));
        }

        let mut summary = steps_log.join("\n");

        let data = json!({"project_dir": clone_path, "project_type": project_type, "repo_url": repo_url});

        if let Some(failure) = failed_step {
            summary.push_str(&format!("\n\ndeployment failed: {failure}"));
            summary.push_str("\n\npossible next steps:");
            summary.push_str("\n1. check the project README for requirements");
            summary.push_str("\n2. investigate manually in the project directory");
            summary.push_str(&format!("\n   cd {clone_path}"));
            return WorkerResult::err(summary).with_data(data).completed().simulated_if(dry_run);
        }

        let uses_docker = deploy_steps.iter().any(|step| step.command.contains("docker run") || step.command.contains("docker compose") || step.command.contains("docker-compose"));

        if uses_docker && !dry_run {
            let (verify_success, verify_message, container_info) = self.executor.verify_docker_deployment(&deploy_steps, &clone_path, project_type, &key_files, 2).await;

            if !verify_success {
                summary.push_str(&format!("\n\ndeployment verification failed: {verify_message}"));
                summary.push_str("\n\npossible next steps:");
                summary.push_str("\n1. check `docker logs` for the container");
                summary.push_str("\n2. confirm the port isn't already in use");
                summary.push_str("\n3. check the environment variables are configured correctly");
                summary.push_str(&format!("\n4. investigate manually: cd {clone_path}"));
                return WorkerResult::err(summary).with_data(data).completed();
            }

            if container_info.is_some() {
                summary.push_str(&format!("\n\n{verify_message}"));
            }
        }

        summary.push_str("\n\ndeployment complete");
        summary.push_str(&format!("\nproject path: {clone_path}"));
        summary.push_str(&format!("\nproject type: {project_type}"));

        if dry_run {
            summary = format!("[DRY-RUN mode]\n\n{summary}");
        }

        WorkerResult::ok(summary).with_data(data).completed().simulated_if(dry_run)
    }

    async fn run_shell(&self, command: &str, working_dir: Option<&str>) -> WorkerResult {
        let mut args = HashMap::new();
        args.insert("command".to_string(), ArgValue::from(command));
        if let Some(dir) = working_dir {
            args.insert("working_dir".to_string(), ArgValue::from(dir));
        }
        self.shell.execute("execute_command", &args).await
    }
}

fn extract_key_files(result: &WorkerResult) -> Vec<String> {
    if !result.success {
        return Vec::new();
    }
    let Some(data) = &result.data else {
        return Vec::new();
    };
    let Value::Array(entries) = data else {
        return Vec::new();
    };
    entries.iter().filter_map(|entry| entry.get("name").and_then(Value::as_str)).map(str::to_string).collect()
}

fn expand_path(path: &str) -> String {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Ok(home) = std::env::var("HOME") {
            return format!("{}/{rest}", home.trim_end_matches('/'));
        }
    }
    path.to_string()
}

fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "'\\''"))
}

#[async_trait::async_trait]
impl Worker for DeployWorker {
    fn name(&self) -> &str {
        "deploy"
    }

    fn capabilities(&self) -> &[&str] {
        &["deploy"]
    }

    fn describe(&self) -> Vec<String> {
        vec!["deploy(repo_url: string, target_dir: string?, dry_run: bool?): clones and deploys a GitHub project".to_string()]
    }

    async fn execute(&self, action: &str, args: &HashMap<String, ArgValue>) -> WorkerResult {
        match action {
            "deploy" => self.intelligent_deploy(args).await,
            other => WorkerResult::unknown_action(other),
        }
    }
}

trait SimulatedIf {
    fn simulated_if(self, dry_run: bool) -> Self;
}

impl SimulatedIf for WorkerResult {
    fn simulated_if(mut self, dry_run: bool) -> Self {
        self.simulated = dry_run;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_path_home_prefix() {
        std::env::set_var("HOME", "/home/tester");
        assert_eq!(expand_path("~/work"), "/home/tester/work");
    }

    #[test]
    fn test_expand_path_leaves_absolute_untouched() {
        assert_eq!(expand_path("/tmp/work"), "/tmp/work");
    }

    #[test]
    fn test_extract_key_files_from_github_listing() {
        let result = WorkerResult::ok("found 2 entries").with_data(json!([{"name": "Dockerfile"}, {"name": "README.md"}]));
        assert_eq!(extract_key_files(&result), vec!["Dockerfile".to_string(), "README.md".to_string()]);
    }

    #[test]
    fn test_extract_key_files_empty_on_failure() {
        let result = WorkerResult::err("not found");
        assert!(extract_key_files(&result).is_empty());
    }

    #[test]
    fn test_shell_quote_escapes_single_quotes() {
        assert_eq!(shell_quote("it's"), "'it'\\''s'");
    }
}
