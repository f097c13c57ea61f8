use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;
use tracing::warn;

use crate::entry::{MemoryCategory, MemoryEntry};

const RECENCY_WINDOW_DAYS: f64 = 30.0;

/// Cross-session key/value store with recency+hit weighted recall. Backed
/// by a single JSON document of `{key: MemoryEntry}`, rewritten whole on
/// every change.
#[derive(Debug, Clone)]
pub struct SessionMemory {
    file_path: PathBuf,
    max_entries: usize,
}

impl SessionMemory {
    pub fn new(file_path: PathBuf) -> Self {
        Self::with_bound(file_path, 200)
    }

    pub fn with_bound(file_path: PathBuf, max_entries: usize) -> Self {
        Self {
            file_path,
            max_entries,
        }
    }

    fn load(&self) -> Result<HashMap<String, MemoryEntry>> {
        if !self.file_path.exists() {
            return Ok(HashMap::new());
        }
        let content = fs::read_to_string(&self.file_path)
            .with_context(|| format!("failed to read memory file: {}", self.file_path.display()))?;
        match serde_json::from_str(&content) {
            Ok(map) => Ok(map),
            Err(error) => {
                warn!(path = %self.file_path.display(), %error, "memory file is corrupt, starting empty");
                Ok(HashMap::new())
            }
        }
    }

    fn save(&self, entries: &HashMap<String, MemoryEntry>) -> Result<()> {
        if let Some(parent) = self.file_path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create memory dir: {}", parent.display()))?;
        }
        let tmp_path = self.file_path.with_extension("json.tmp");
        let content = serde_json::to_string_pretty(entries).context("failed to serialize memory store")?;
        {
            let mut file = OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(&tmp_path)
                .with_context(|| format!("failed to open temp memory file: {}", tmp_path.display()))?;
            file.write_all(content.as_bytes())
                .context("failed to write memory file contents")?;
            file.flush().context("failed to flush memory file")?;
        }
        fs::rename(&tmp_path, &self.file_path)
            .with_context(|| format!("failed to atomically replace memory file: {}", self.file_path.display()))?;
        Ok(())
    }

    /// Upserts a key. A re-insertion always advances `updated_at`.
    pub fn remember(&self, key: &str, value: &str, category: MemoryCategory) -> Result<()> {
        let mut entries = self.load()?;
        match entries.get_mut(key) {
            Some(entry) => {
                entry.value = value.to_string();
                entry.category = category;
                entry.updated_at = Utc::now();
            }
            None => {
                entries.insert(key.to_string(), MemoryEntry::new(key, value, category));
            }
        }
        self.evict(&mut entries);
        self.save(&entries)
    }

    /// Returns the value and increments `hit_count` iff the key exists.
    pub fn recall(&self, key: &str) -> Result<Option<String>> {
        let mut entries = self.load()?;
        let Some(entry) = entries.get_mut(key) else {
            return Ok(None);
        };
        entry.hit_count += 1;
        let value = entry.value.clone();
        self.save(&entries)?;
        Ok(Some(value))
    }

    /// Case-insensitive substring match over key and value, ordered by
    /// `hit_count` descending.
    pub fn search(&self, query: &str, category: Option<MemoryCategory>) -> Result<Vec<MemoryEntry>> {
        let entries = self.load()?;
        let needle = query.to_lowercase();
        let mut matches: Vec<MemoryEntry> = entries
            .into_values()
            .filter(|entry| category.is_none_or(|cat| cat == entry.category))
            .filter(|entry| {
                entry.key.to_lowercase().contains(&needle) || entry.value.to_lowercase().contains(&needle)
            })
            .collect();
        matches.sort_by(|a, b| b.hit_count.cmp(&a.hit_count));
        Ok(matches)
    }

    /// Scores each entry as `0.3*hit_count + 0.7*recency` (recency
    /// normalized over a 30-day window, clamped non-negative), takes the
    /// top `max_entries`, and formats a `- [Fact|Pref|Note] key: value`
    /// block under a single header.
    pub fn get_context_prompt(&self, max_entries: usize) -> Result<String> {
        let entries = self.load()?;
        let now = Utc::now();

        let mut scored: Vec<(f64, MemoryEntry)> = entries
            .into_values()
            .map(|entry| {
                let age_days = (now - entry.updated_at).num_seconds() as f64 / 86_400.0;
                let recency = (1.0 - age_days / RECENCY_WINDOW_DAYS).max(0.0);
                let score = 0.3 * entry.hit_count as f64 + 0.7 * recency;
                (score, entry)
            })
            .collect();

        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));

        let mut lines = vec!["Known context:".to_string()];
        for (_, entry) in scored.into_iter().take(max_entries) {
            lines.push(format!("- [{}] {}: {}", entry.category.label(), entry.key, entry.value));
        }
        Ok(lines.join("\n"))
    }

    /// FIFO by ascending `(hit_count, updated_at)` once the count exceeds
    /// the bound.
    fn evict(&self, entries: &mut HashMap<String, MemoryEntry>) {
        while entries.len() > self.max_entries {
            let victim_key = entries
                .values()
                .min_by(|a, b| a.hit_count.cmp(&b.hit_count).then(a.updated_at.cmp(&b.updated_at)))
                .map(|entry| entry.key.clone());
            match victim_key {
                Some(key) => {
                    entries.remove(&key);
                }
                None => break,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn memory_at(dir: &Path) -> SessionMemory {
        SessionMemory::new(dir.join("memory.json"))
    }

    #[test]
    fn test_remember_then_recall_increments_hit_count() {
        let dir = tempdir().unwrap();
        let memory = memory_at(dir.path());

        memory.remember("env.db", "postgres", MemoryCategory::Fact).unwrap();
        let value = memory.recall("env.db").unwrap();
        assert_eq!(value.as_deref(), Some("postgres"));

        let entries = memory.search("postgres", None).unwrap();
        assert_eq!(entries[0].hit_count, 1);
    }

    #[test]
    fn test_recall_missing_key_returns_none() {
        let dir = tempdir().unwrap();
        let memory = memory_at(dir.path());
        assert!(memory.recall("nope").unwrap().is_none());
    }

    #[test]
    fn test_search_is_case_insensitive_substring() {
        let dir = tempdir().unwrap();
        let memory = memory_at(dir.path());
        memory.remember("env.db", "Postgres", MemoryCategory::Fact).unwrap();

        let found = memory.search("postgres", None).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].key, "env.db");
    }

    #[test]
    fn test_context_prompt_ranks_by_hit_count_and_recency() {
        let dir = tempdir().unwrap();
        let memory = memory_at(dir.path());

        memory.remember("env.db", "postgres", MemoryCategory::Fact).unwrap();
        for _ in 0..5 {
            memory.recall("env.db").unwrap();
        }
        memory.remember("pref.editor", "vim", MemoryCategory::Preference).unwrap();
        memory.remember("note.port", "6380", MemoryCategory::Note).unwrap();

        let prompt = memory.get_context_prompt(2).unwrap();
        assert!(prompt.contains("postgres"));
        assert!(prompt.contains("6380"));
        assert!(!prompt.contains("vim"));
    }

    #[test]
    fn test_eviction_drops_lowest_hit_count_first() {
        let dir = tempdir().unwrap();
        let memory = SessionMemory::with_bound(dir.path().join("memory.json"), 2);

        memory.remember("a", "1", MemoryCategory::Note).unwrap();
        memory.remember("b", "2", MemoryCategory::Note).unwrap();
        memory.recall("b").unwrap();
        memory.remember("c", "3", MemoryCategory::Note).unwrap();

        let remaining = memory.search("", None).unwrap();
        let keys: Vec<&str> = remaining.iter().map(|entry| entry.key.as_str()).collect();
        assert_eq!(remaining.len(), 2);
        assert!(keys.contains(&"b"));
        assert!(keys.contains(&"c"));
        assert!(!keys.contains(&"a"));
    }

    #[test]
    fn test_corrupt_file_starts_empty() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path()).unwrap();
        let path = dir.path().join("memory.json");
        fs::write(&path, "not json").unwrap();

        let memory = SessionMemory::new(path);
        assert!(memory.search("", None).unwrap().is_empty());
    }
}
