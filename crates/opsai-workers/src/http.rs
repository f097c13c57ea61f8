use std::collections::HashMap;
use std::sync::OnceLock;
use std::time::Duration;

use async_trait::async_trait;
use opsai_core::{ArgValue, WorkerResult};
use regex::Regex;
use serde_json::{json, Value};

use crate::registry::Worker;

fn github_url_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^https?://github\.com/([^/]+)/([^/]+?)(?:\.git)?/?$").unwrap())
}

fn parse_github_url(url: &str) -> Option<(String, String)> {
    let captures = github_url_pattern().captures(url.trim())?;
    Some((captures[1].to_string(), captures[2].to_string()))
}

/// Read-only HTTP fetches: a generic GET, and two GitHub-specific helpers
/// used by the deploy analyzer (README content, top-level file listing).
pub struct HttpWorker {
    client: reqwest::Client,
}

impl HttpWorker {
    pub fn new(timeout_secs: u64) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .user_agent("opsai")
            .build()
            .unwrap_or_default();
        Self { client }
    }
}

#[async_trait]
impl Worker for HttpWorker {
    fn name(&self) -> &str {
        "http"
    }

    fn capabilities(&self) -> &[&str] {
        &["fetch_url", "fetch_github_readme", "list_github_files"]
    }

    fn describe(&self) -> Vec<String> {
        vec![
            "fetch_url(url: string): fetches raw content of a URL".to_string(),
            "fetch_github_readme(repo_url: string): fetches a GitHub repository's README".to_string(),
            "list_github_files(repo_url: string, path: string?): lists a GitHub repository's top-level files".to_string(),
        ]
    }

    async fn execute(&self, action: &str, args: &HashMap<String, ArgValue>) -> WorkerResult {
        match action {
            "fetch_url" => self.fetch_url(args).await,
            "fetch_github_readme" => self.fetch_github_readme(args).await,
            "list_github_files" => self.list_github_files(args).await,
            other => WorkerResult::unknown_action(other),
        }
    }
}

impl HttpWorker {
    async fn fetch_url(&self, args: &HashMap<String, ArgValue>) -> WorkerResult {
        let Some(url) = args.get("url").and_then(ArgValue::as_str) else {
            return WorkerResult::err("url parameter is required");
        };

        if reqwest::Url::parse(url).is_err() {
            return WorkerResult::err(format!("Invalid URL: {url}"));
        }

        match self.client.get(url).send().await {
            Ok(response) => match response.text().await {
                Ok(text) => WorkerResult::ok(text).completed(),
                Err(error) => WorkerResult::err(format!("Failed to read response body: {error}")),
            },
            Err(error) => WorkerResult::err(format!("Request failed: {error}")),
        }
    }

    async fn fetch_github_readme(&self, args: &HashMap<String, ArgValue>) -> WorkerResult {
        let Some(repo_url) = args.get("repo_url").and_then(ArgValue::as_str) else {
            return WorkerResult::err("repo_url parameter is required");
        };

        let Some((owner, repo)) = parse_github_url(repo_url) else {
            return WorkerResult::err(format!("Invalid GitHub URL: {repo_url}"));
        };

        let url = format!("https://raw.githubusercontent.com/{owner}/{repo}/HEAD/README.md");
        match self.client.get(&url).send().await {
            Ok(response) if response.status().is_success() => match response.text().await {
                Ok(text) => WorkerResult::ok(text).completed(),
                Err(error) => WorkerResult::err(format!("Failed to read README: {error}")),
            },
            Ok(response) => WorkerResult::err(format!("No README found (status {})", response.status())),
            Err(error) => WorkerResult::err(format!("Request failed: {error}")),
        }
    }

    async fn list_github_files(&self, args: &HashMap<String, ArgValue>) -> WorkerResult {
        let Some(repo_url) = args.get("repo_url").and_then(ArgValue::as_str) else {
            return WorkerResult::err("repo_url parameter is required");
        };

        let Some((owner, repo)) = parse_github_url(repo_url) else {
            return WorkerResult::err(format!("Invalid GitHub URL: {repo_url}"));
        };

        let subpath = args.get("path").and_then(ArgValue::as_str).unwrap_or("");
        let url = format!("https://api.github.com/repos/{owner}/{repo}/contents/{subpath}");

        let response = match self.client.get(&url).send().await {
            Ok(response) => response,
            Err(error) => return WorkerResult::err(format!("Request failed: {error}")),
        };

        if !response.status().is_success() {
            return WorkerResult::err(format!("GitHub API returned status {}", response.status()));
        }

        let entries: Vec<Value> = match response.json().await {
            Ok(entries) => entries,
            Err(error) => return WorkerResult::err(format!("Failed to parse GitHub API response: {error}")),
        };

        let names: Vec<&str> = entries.iter().filter_map(|entry| entry.get("name").and_then(Value::as_str)).collect();
        let has_dockerfile = names.iter().any(|name| *name == "Dockerfile");

        let message = if has_dockerfile {
            format!("Found {} entries, including Dockerfile", entries.len())
        } else {
            format!("Found {} entries", entries.len())
        };

        WorkerResult::ok(message).with_data(json!(entries)).completed()
    }
}
