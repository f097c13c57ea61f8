use std::sync::OnceLock;

use regex::Regex;

fn github_url_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^https?://github\.com/([\w\-.]+)/([\w\-.]+?)(?:\.git)?/?$").unwrap())
}

/// Parses a GitHub repository URL into `(owner, repo)`, tolerating a
/// trailing slash and a `.git` suffix.
pub fn parse_github_url(url: &str) -> Option<(String, String)> {
    let captures = github_url_pattern().captures(url.trim())?;
    Some((captures[1].to_string(), captures[2].to_string()))
}

/// Project classification, either assigned deterministically from filename
/// signals during `analyze`, or refined by the planner's own LLM judgment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProjectType {
    Docker,
    Python,
    Nodejs,
    Go,
    Rust,
    Static,
    Unknown,
}

impl ProjectType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Docker => "docker",
            Self::Python => "python",
            Self::Nodejs => "nodejs",
            Self::Go => "go",
            Self::Rust => "rust",
            Self::Static => "static",
            Self::Unknown => "unknown",
        }
    }

    /// Parses the planner's free-form `project_type` string; anything
    /// unrecognized falls back to `Unknown` rather than erroring, since the
    /// planner's classification is advisory context, not a control input.
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "docker" => Self::Docker,
            "python" => Self::Python,
            "nodejs" | "node" => Self::Nodejs,
            "go" | "golang" => Self::Go,
            "rust" => Self::Rust,
            "static" => Self::Static,
            _ => Self::Unknown,
        }
    }

    /// Deterministic filename-signal classification, checked in this fixed
    /// priority order.
    pub fn classify(filenames: &[String]) -> Self {
        let has = |name: &str| filenames.iter().any(|f| f.eq_ignore_ascii_case(name));
        if has("Dockerfile") {
            Self::Docker
        } else if has("pyproject.toml") || has("requirements.txt") {
            Self::Python
        } else if has("package.json") {
            Self::Nodejs
        } else if has("go.mod") {
            Self::Go
        } else if has("Cargo.toml") {
            Self::Rust
        } else {
            Self::Unknown
        }
    }
}

/// The fixed deploy state machine: `analyze -> clone -> setup -> start ->
/// done`, with `error` reachable from any state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeployStep {
    Analyze,
    Clone,
    Setup,
    Start,
    Done,
    Error,
}

/// The shared bag threaded through the deploy state machine's transitions.
/// Advanced only by the worker's transition methods; never mutated
/// concurrently.
#[derive(Debug, Clone)]
pub struct DeployState {
    pub repo_url: String,
    pub target_dir: String,
    pub dry_run: bool,
    pub owner: String,
    pub repo: String,
    pub project_type: ProjectType,
    pub key_files: Vec<String>,
    pub clone_path: String,
    pub current_step: DeployStep,
    pub error_message: Option<String>,
    pub steps_completed: Vec<String>,
    pub final_message: Option<String>,
}

impl DeployState {
    pub fn new(repo_url: String, target_dir: String, dry_run: bool) -> Self {
        Self {
            repo_url,
            target_dir,
            dry_run,
            owner: String::new(),
            repo: String::new(),
            project_type: ProjectType::Unknown,
            key_files: Vec::new(),
            clone_path: String::new(),
            current_step: DeployStep::Analyze,
            error_message: None,
            steps_completed: Vec::new(),
            final_message: None,
        }
    }

    pub fn fail(&mut self, message: impl Into<String>) {
        self.error_message = Some(message.into());
        self.current_step = DeployStep::Error;
    }

    pub fn log(&mut self, line: impl Into<String>) {
        self.steps_completed.push(line.into());
    }

    pub fn is_error(&self) -> bool {
        self.current_step == DeployStep::Error
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_github_url_with_git_suffix() {
        assert_eq!(parse_github_url("https://github.com/acme/widget.git"), Some(("acme".to_string(), "widget".to_string())));
    }

    #[test]
    fn test_parse_github_url_rejects_other_hosts() {
        assert_eq!(parse_github_url("https://gitlab.com/acme/widget"), None);
    }

    #[test]
    fn test_classify_prefers_dockerfile() {
        let files = vec!["Dockerfile".to_string(), "package.json".to_string()];
        assert_eq!(ProjectType::classify(&files), ProjectType::Docker);
    }

    #[test]
    fn test_classify_python_from_requirements() {
        let files = vec!["requirements.txt".to_string()];
        assert_eq!(ProjectType::classify(&files), ProjectType::Python);
    }

    #[test]
    fn test_classify_unknown_when_no_signal_matches() {
        let files = vec!["notes.txt".to_string()];
        assert_eq!(ProjectType::classify(&files), ProjectType::Unknown);
    }

    #[test]
    fn test_parse_project_type_falls_back_to_unknown() {
        assert_eq!(ProjectType::parse("elixir"), ProjectType::Unknown);
    }

    #[test]
    fn test_state_fail_sets_error_step() {
        let mut state = DeployState::new("https://github.com/a/b".to_string(), "/tmp".to_string(), false);
        state.fail("boom");
        assert!(state.is_error());
        assert_eq!(state.error_message.as_deref(), Some("boom"));
    }
}
