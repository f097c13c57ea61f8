use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

/// One suggested diagnostic command inside a runbook.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiagnosticStep {
    pub description: String,
    pub command: String,
    #[serde(default = "default_risk")]
    pub risk: String,
}

fn default_risk() -> String {
    "safe".to_string()
}

/// A named bundle of diagnostic know-how, matched against a user's request
/// by keyword overlap and folded into the orchestrator's prompt when it hits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiagnosticRunbook {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub steps: Vec<DiagnosticStep>,
}

impl DiagnosticRunbook {
    /// Renders this runbook as prompt-injectable context text.
    pub fn to_prompt_context(&self) -> String {
        let mut lines = vec![format!("## Diagnostic reference: {}", self.name), self.description.clone(), String::new()];
        lines.push("Suggested diagnostic steps (adapt as needed):".to_string());
        for (i, step) in self.steps.iter().enumerate() {
            lines.push(format!("{}. {}", i + 1, step.description));
            lines.push(format!("   Command: `{}`", step.command));
        }
        lines.join("\n")
    }
}

/// Loads diagnostic runbooks from a directory of JSON files and matches
/// them against free-form user input by keyword overlap. Loading is lazy
/// and happens once per loader instance.
pub struct RunbookLoader {
    runbook_dir: PathBuf,
    runbooks: Mutex<Option<HashMap<String, DiagnosticRunbook>>>,
}

impl RunbookLoader {
    pub fn new(runbook_dir: PathBuf) -> Self {
        Self {
            runbook_dir,
            runbooks: Mutex::new(None),
        }
    }

    fn ensure_loaded(&self) {
        let mut guard = self.runbooks.lock().unwrap();
        if guard.is_some() {
            return;
        }

        let mut loaded = HashMap::new();
        if let Ok(entries) = std::fs::read_dir(&self.runbook_dir) {
            for entry in entries.flatten() {
                let path = entry.path();
                if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                    continue;
                }
                if let Some(runbook) = Self::load_file(&path) {
                    loaded.insert(runbook.name.clone(), runbook);
                }
            }
        }

        *guard = Some(loaded);
    }

    fn load_file(path: &Path) -> Option<DiagnosticRunbook> {
        let content = std::fs::read_to_string(path).ok()?;
        serde_json::from_str(&content).ok()
    }

    /// Keyword-overlap match, returning at most `top_k` runbooks ranked by
    /// hit count, highest first.
    pub fn match_input(&self, user_input: &str, top_k: usize) -> Vec<DiagnosticRunbook> {
        self.ensure_loaded();
        let guard = self.runbooks.lock().unwrap();
        let runbooks = guard.as_ref().expect("loaded above");

        let input_lower = user_input.to_lowercase();
        let mut scored: Vec<(usize, &DiagnosticRunbook)> = runbooks
            .values()
            .filter_map(|runbook| {
                let score = runbook.keywords.iter().filter(|keyword| input_lower.contains(&keyword.to_lowercase())).count();
                (score > 0).then_some((score, runbook))
            })
            .collect();

        scored.sort_by(|a, b| b.0.cmp(&a.0));
        scored.into_iter().take(top_k).map(|(_, runbook)| runbook.clone()).collect()
    }

    pub fn get(&self, name: &str) -> Option<DiagnosticRunbook> {
        self.ensure_loaded();
        let guard = self.runbooks.lock().unwrap();
        guard.as_ref().expect("loaded above").get(name).cloned()
    }

    pub fn list_all(&self) -> Vec<DiagnosticRunbook> {
        self.ensure_loaded();
        let guard = self.runbooks.lock().unwrap();
        guard.as_ref().expect("loaded above").values().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn write_runbook(dir: &Path, name: &str, keywords: &[&str]) {
        let runbook = DiagnosticRunbook {
            name: name.to_string(),
            description: "test runbook".to_string(),
            keywords: keywords.iter().map(|s| s.to_string()).collect(),
            steps: vec![DiagnosticStep {
                description: "check logs".to_string(),
                command: "journalctl -n 50".to_string(),
                risk: "safe".to_string(),
            }],
        };
        let content = serde_json::to_string(&runbook).unwrap();
        std::fs::write(dir.join(format!("{name}.json")), content).unwrap();
    }

    #[test]
    fn test_match_ranks_by_keyword_hits() {
        let dir = tempdir().unwrap();
        write_runbook(dir.path(), "disk-full", &["disk", "space", "full"]);
        write_runbook(dir.path(), "port-conflict", &["port", "bind"]);

        let loader = RunbookLoader::new(dir.path().to_path_buf());
        let matches = loader.match_input("the disk is full, no space left", 2);

        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].name, "disk-full");
    }

    #[test]
    fn test_match_returns_empty_for_no_hits() {
        let dir = tempdir().unwrap();
        write_runbook(dir.path(), "disk-full", &["disk", "space"]);

        let loader = RunbookLoader::new(dir.path().to_path_buf());
        assert!(loader.match_input("deploy my app", 2).is_empty());
    }

    #[test]
    fn test_missing_dir_yields_no_runbooks() {
        let loader = RunbookLoader::new(PathBuf::from("/nonexistent/runbooks"));
        assert!(loader.list_all().is_empty());
    }

    #[test]
    fn test_to_prompt_context_includes_steps() {
        let dir = tempdir().unwrap();
        write_runbook(dir.path(), "disk-full", &["disk"]);
        let loader = RunbookLoader::new(dir.path().to_path_buf());
        let runbook = loader.get("disk-full").unwrap();
        let context = runbook.to_prompt_context();
        assert!(context.contains("journalctl -n 50"));
    }
}
