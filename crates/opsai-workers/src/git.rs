use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use opsai_core::{ArgValue, WorkerResult};
use regex::Regex;
use std::sync::OnceLock;

use crate::registry::{dry_run_flag, Worker};
use crate::shell::ShellWorker;

fn repo_name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"[/:]([^/:]+)$").unwrap())
}

fn extract_repo_name(url: &str) -> String {
    let trimmed = url.trim_end_matches('/');
    let without_git_suffix = trimmed.strip_suffix(".git").unwrap_or(trimmed);

    if let Some(captures) = repo_name_pattern().captures(without_git_suffix) {
        if let Some(m) = captures.get(1) {
            return m.as_str().to_string();
        }
    }

    without_git_suffix
        .rsplit('/')
        .next()
        .filter(|segment| !segment.is_empty())
        .unwrap_or("repo")
        .to_string()
}

/// Git operations composed on top of the shell worker. `clone` always
/// records explicitly where it cloned to, even when the caller left
/// `target_dir` unset.
pub struct GitWorker {
    shell: Arc<ShellWorker>,
}

impl GitWorker {
    pub fn new(shell: Arc<ShellWorker>) -> Self {
        Self { shell }
    }
}

#[async_trait]
impl Worker for GitWorker {
    fn name(&self) -> &str {
        "git"
    }

    fn capabilities(&self) -> &[&str] {
        &["clone", "pull", "status"]
    }

    fn describe(&self) -> Vec<String> {
        vec![
            "clone(url: string, target_dir: string?): clones a repository".to_string(),
            "pull(repo_dir: string): runs git pull in an existing repository".to_string(),
            "status(repo_dir: string): runs git status in an existing repository".to_string(),
        ]
    }

    async fn execute(&self, action: &str, args: &HashMap<String, ArgValue>) -> WorkerResult {
        match action {
            "clone" => self.clone_repo(args).await,
            "pull" => self.pull(args).await,
            "status" => self.status(args).await,
            other => WorkerResult::unknown_action(other),
        }
    }
}

impl GitWorker {
    async fn clone_repo(&self, args: &HashMap<String, ArgValue>) -> WorkerResult {
        let Some(url) = args.get("url").and_then(ArgValue::as_str).filter(|s| !s.is_empty()) else {
            return WorkerResult::err("url is required and must be a string");
        };

        let dry_run = dry_run_flag(args);

        let (target_dir, path_source) = match args.get("target_dir").and_then(ArgValue::as_str) {
            Some(dir) => (dir.to_string(), "specified path"),
            None => match std::env::current_dir() {
                Ok(cwd) => (cwd.to_string_lossy().to_string(), "current working directory"),
                Err(error) => return WorkerResult::err(format!("failed to resolve current directory: {error}")),
            },
        };

        let repo_name = extract_repo_name(url);
        let full_path = Path::new(&target_dir).join(&repo_name);
        let full_path_str = full_path.to_string_lossy().to_string();

        if dry_run {
            return WorkerResult::simulated(format!("[DRY-RUN] Would clone {url} to {full_path_str} ({path_source})"));
        }

        if full_path.exists() {
            return WorkerResult::err(format!("Target directory already exists: {full_path_str}"));
        }

        if let Err(error) = std::fs::create_dir_all(&target_dir) {
            return WorkerResult::err(format!("failed to create target directory: {error}"));
        }

        let command = format!("git clone {url} {full_path_str}");
        let mut shell_args = HashMap::new();
        shell_args.insert("command".to_string(), ArgValue::from(command));
        shell_args.insert("working_dir".to_string(), ArgValue::from(target_dir.clone()));

        let result = self.shell.execute("execute_command", &shell_args).await;
        if result.success {
            WorkerResult::ok(format!("Cloned {url} to {full_path_str} ({path_source})")).completed()
        } else {
            result
        }
    }

    async fn pull(&self, args: &HashMap<String, ArgValue>) -> WorkerResult {
        let Some(repo_dir) = args.get("repo_dir").and_then(ArgValue::as_str).filter(|s| !s.is_empty()) else {
            return WorkerResult::err("repo_dir is required and must be a string");
        };

        let dry_run = dry_run_flag(args);
        let expanded = expand_home(repo_dir);

        if dry_run {
            return WorkerResult::simulated(format!("[DRY-RUN] Would pull in {expanded}"));
        }

        if !Path::new(&expanded).exists() {
            return WorkerResult::err(format!("Repository directory not found: {expanded}"));
        }

        let mut shell_args = HashMap::new();
        shell_args.insert("command".to_string(), ArgValue::from("git pull"));
        shell_args.insert("working_dir".to_string(), ArgValue::from(expanded.clone()));

        let result = self.shell.execute("execute_command", &shell_args).await;
        if result.success {
            WorkerResult::ok(format!("Pulled updates in {expanded}")).completed()
        } else {
            result
        }
    }

    async fn status(&self, args: &HashMap<String, ArgValue>) -> WorkerResult {
        let Some(repo_dir) = args.get("repo_dir").and_then(ArgValue::as_str).filter(|s| !s.is_empty()) else {
            return WorkerResult::err("repo_dir is required and must be a string");
        };

        let expanded = expand_home(repo_dir);
        if !Path::new(&expanded).exists() {
            return WorkerResult::err(format!("Repository directory not found: {expanded}"));
        }

        let mut shell_args = HashMap::new();
        shell_args.insert("command".to_string(), ArgValue::from("git status"));
        shell_args.insert("working_dir".to_string(), ArgValue::from(expanded));

        let result = self.shell.execute("execute_command", &shell_args).await;
        if result.success {
            WorkerResult::ok(result.message.clone()).completed()
        } else {
            result
        }
    }
}

fn expand_home(path: &str) -> String {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = directories::BaseDirs::new().map(|dirs| dirs.home_dir().to_path_buf()) {
            return home.join(rest).to_string_lossy().to_string();
        }
    }
    path.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_repo_name_https_with_git_suffix() {
        assert_eq!(extract_repo_name("https://github.com/user/repo.git"), "repo");
    }

    #[test]
    fn test_extract_repo_name_https_no_suffix() {
        assert_eq!(extract_repo_name("https://github.com/user/repo"), "repo");
    }

    #[test]
    fn test_extract_repo_name_ssh_style() {
        assert_eq!(extract_repo_name("git@github.com:user/repo.git"), "repo");
    }

    #[test]
    fn test_extract_repo_name_trailing_slash() {
        assert_eq!(extract_repo_name("https://github.com/user/repo/"), "repo");
    }
}
