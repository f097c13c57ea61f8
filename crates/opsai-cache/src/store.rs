use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing::warn;

use crate::template::AnalyzeTemplate;

/// Cache of per-`target_type` command templates for the analyze worker.
/// Backed by a single JSON document of `{target_type: AnalyzeTemplate}`.
#[derive(Debug, Clone)]
pub struct AnalyzeTemplateCache {
    file_path: PathBuf,
}

impl AnalyzeTemplateCache {
    pub fn new(file_path: PathBuf) -> Self {
        Self { file_path }
    }

    fn load(&self) -> Result<HashMap<String, AnalyzeTemplate>> {
        if !self.file_path.exists() {
            return Ok(HashMap::new());
        }
        let content = fs::read_to_string(&self.file_path)
            .with_context(|| format!("failed to read analyze cache: {}", self.file_path.display()))?;
        match serde_json::from_str(&content) {
            Ok(map) => Ok(map),
            Err(error) => {
                warn!(path = %self.file_path.display(), %error, "analyze cache is corrupt, starting empty");
                Ok(HashMap::new())
            }
        }
    }

    fn save(&self, templates: &HashMap<String, AnalyzeTemplate>) -> Result<()> {
        if let Some(parent) = self.file_path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create cache dir: {}", parent.display()))?;
        }
        let tmp_path = self.file_path.with_extension("json.tmp");
        let content = serde_json::to_string_pretty(templates).context("failed to serialize analyze cache")?;
        {
            let mut file = OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(&tmp_path)
                .with_context(|| format!("failed to open temp analyze cache: {}", tmp_path.display()))?;
            file.write_all(content.as_bytes())
                .context("failed to write analyze cache contents")?;
            file.flush().context("failed to flush analyze cache")?;
        }
        fs::rename(&tmp_path, &self.file_path)
            .with_context(|| format!("failed to atomically replace analyze cache: {}", self.file_path.display()))?;
        Ok(())
    }

    /// Returns the stored template for `target_type`, if any, bumping its
    /// hit count as a side effect of the lookup succeeding.
    pub fn get(&self, target_type: &str) -> Result<Option<AnalyzeTemplate>> {
        let mut templates = self.load()?;
        let Some(template) = templates.get_mut(target_type) else {
            return Ok(None);
        };
        template.hit_count += 1;
        let result = template.clone();
        self.save(&templates)?;
        Ok(Some(result))
    }

    pub fn set(&self, target_type: &str, commands: Vec<String>) -> Result<AnalyzeTemplate> {
        let mut templates = self.load()?;
        let template = AnalyzeTemplate::new(commands);
        templates.insert(target_type.to_string(), template.clone());
        self.save(&templates)?;
        Ok(template)
    }

    pub fn list_all(&self) -> Result<HashMap<String, AnalyzeTemplate>> {
        self.load()
    }

    /// Clears one target type, or the whole cache when `target_type` is
    /// `None`. Returns the number of templates removed.
    pub fn clear(&self, target_type: Option<&str>) -> Result<usize> {
        let mut templates = self.load()?;
        let removed = match target_type {
            Some(key) => usize::from(templates.remove(key).is_some()),
            None => {
                let count = templates.len();
                templates.clear();
                count
            }
        };
        self.save(&templates)?;
        Ok(removed)
    }
}
