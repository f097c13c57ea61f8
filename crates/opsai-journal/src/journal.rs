use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::record::{ChangeRecord, ChangeType};

const DEFAULT_MAX_RECORDS: usize = 100;
const INDEX_FILE_NAME: &str = "index.json";

#[derive(Debug, Default, Serialize, Deserialize)]
struct IndexDocument {
    next_id: u64,
    records: Vec<ChangeRecord>,
}

/// Append-only record of destructive effects with pre-effect backups,
/// indexed for rollback. The index is rewritten as a whole document on
/// every change; backup blobs are addressed by change id.
#[derive(Debug, Clone)]
pub struct ChangeJournal {
    base_dir: PathBuf,
    max_records: usize,
}

impl ChangeJournal {
    pub fn new(base_dir: PathBuf) -> Self {
        Self::with_bound(base_dir, DEFAULT_MAX_RECORDS)
    }

    pub fn with_bound(base_dir: PathBuf, max_records: usize) -> Self {
        Self {
            base_dir,
            max_records,
        }
    }

    fn index_path(&self) -> PathBuf {
        self.base_dir.join(INDEX_FILE_NAME)
    }

    fn backups_dir(&self) -> PathBuf {
        self.base_dir.join("backups")
    }

    fn ensure_dirs(&self) -> Result<()> {
        fs::create_dir_all(&self.base_dir)
            .with_context(|| format!("failed to create journal dir: {}", self.base_dir.display()))?;
        fs::create_dir_all(self.backups_dir())
            .with_context(|| format!("failed to create backups dir: {}", self.backups_dir().display()))?;
        Ok(())
    }

    /// A journal opened over a corrupt index starts empty rather than
    /// failing; a missing index is treated the same way.
    fn load_index(&self) -> Result<IndexDocument> {
        let path = self.index_path();
        if !path.exists() {
            return Ok(IndexDocument::default());
        }
        let content = fs::read_to_string(&path)
            .with_context(|| format!("failed to read journal index: {}", path.display()))?;
        match serde_json::from_str(&content) {
            Ok(doc) => Ok(doc),
            Err(error) => {
                warn!(path = %path.display(), %error, "journal index is corrupt, starting empty");
                Ok(IndexDocument::default())
            }
        }
    }

    fn save_index(&self, doc: &IndexDocument) -> Result<()> {
        self.ensure_dirs()?;
        let path = self.index_path();
        let tmp_path = self.base_dir.join("index.json.tmp");
        let content = serde_json::to_string_pretty(doc).context("failed to serialize journal index")?;
        {
            let mut file = OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(&tmp_path)
                .with_context(|| format!("failed to open temp journal index: {}", tmp_path.display()))?;
            file.write_all(content.as_bytes())
                .context("failed to write journal index contents")?;
            file.flush().context("failed to flush journal index")?;
        }
        fs::rename(&tmp_path, &path)
            .with_context(|| format!("failed to atomically replace journal index: {}", path.display()))?;
        Ok(())
    }

    fn backup_path_for(&self, change_id: u64, original: &Path) -> PathBuf {
        let filename = original
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_else(|| "unnamed".to_string());
        self.backups_dir().join(format!("{change_id}_{filename}"))
    }

    /// Snapshot a file before it is mutated. If the file exists, copies it to
    /// a backup blob and emits a `file_modify` record; if it does not, emits
    /// a `file_write` record (rollback of a write means "delete the new
    /// file"). Reflects disk state at the moment of the call.
    pub fn snapshot_file(&self, path: &Path) -> Result<u64> {
        self.ensure_dirs()?;
        let mut doc = self.load_index()?;
        let change_id = doc.next_id;
        doc.next_id += 1;

        let record = if path.exists() {
            let backup_path = self.backup_path_for(change_id, path);
            fs::copy(path, &backup_path)
                .with_context(|| format!("failed to snapshot {}", path.display()))?;
            ChangeRecord {
                change_id,
                change_type: ChangeType::FileModify,
                timestamp: Utc::now(),
                description: format!("snapshot before modifying {}", path.display()),
                file_path: Some(path.to_path_buf()),
                backup_path: Some(backup_path),
                command: None,
                rollback_available: true,
                rolled_back: false,
            }
        } else {
            ChangeRecord {
                change_id,
                change_type: ChangeType::FileWrite,
                timestamp: Utc::now(),
                description: format!("new file write at {}", path.display()),
                file_path: Some(path.to_path_buf()),
                backup_path: None,
                command: None,
                rollback_available: false,
                rolled_back: false,
            }
        };

        doc.records.push(record);
        self.evict(&mut doc);
        self.save_index(&doc)?;
        Ok(change_id)
    }

    /// Snapshot a file that the caller is about to delete, then return so
    /// the caller performs the actual delete.
    pub fn record_delete(&self, path: &Path) -> Result<u64> {
        self.ensure_dirs()?;
        let mut doc = self.load_index()?;
        let change_id = doc.next_id;
        doc.next_id += 1;

        let backup_path = if path.exists() {
            let backup_path = self.backup_path_for(change_id, path);
            fs::copy(path, &backup_path)
                .with_context(|| format!("failed to snapshot before delete {}", path.display()))?;
            Some(backup_path)
        } else {
            None
        };

        let record = ChangeRecord {
            change_id,
            change_type: ChangeType::FileDelete,
            timestamp: Utc::now(),
            description: format!("delete {}", path.display()),
            file_path: Some(path.to_path_buf()),
            backup_path: backup_path.clone(),
            command: None,
            rollback_available: backup_path.is_some(),
            rolled_back: false,
        };

        doc.records.push(record);
        self.evict(&mut doc);
        self.save_index(&doc)?;
        Ok(change_id)
    }

    /// Metadata-only record; never rollbackable.
    pub fn record_command(&self, command: &str) -> Result<u64> {
        self.ensure_dirs()?;
        let mut doc = self.load_index()?;
        let change_id = doc.next_id;
        doc.next_id += 1;

        doc.records.push(ChangeRecord {
            change_id,
            change_type: ChangeType::Command,
            timestamp: Utc::now(),
            description: format!("ran command: {command}"),
            file_path: None,
            backup_path: None,
            command: Some(command.to_string()),
            rollback_available: false,
            rolled_back: false,
        });

        self.evict(&mut doc);
        self.save_index(&doc)?;
        Ok(change_id)
    }

    /// Rolls back one change by id. Refuses a record already rolled back.
    pub fn rollback(&self, change_id: u64) -> Result<()> {
        let mut doc = self.load_index()?;
        let record = doc
            .records
            .iter_mut()
            .find(|record| record.change_id == change_id)
            .ok_or_else(|| anyhow!("no change record with id {change_id}"))?;

        if record.rolled_back {
            return Err(anyhow!("change {change_id} was already rolled back"));
        }
        if !record.rollback_available {
            return Err(anyhow!("change {change_id} has no rollback available"));
        }

        match record.change_type {
            ChangeType::FileModify | ChangeType::FileDelete => {
                let backup = record
                    .backup_path
                    .as_ref()
                    .ok_or_else(|| anyhow!("change {change_id} is missing its backup blob"))?;
                let target = record
                    .file_path
                    .as_ref()
                    .ok_or_else(|| anyhow!("change {change_id} is missing its target path"))?;
                fs::copy(backup, target)
                    .with_context(|| format!("failed to restore {}", target.display()))?;
            }
            ChangeType::FileWrite => {
                let target = record
                    .file_path
                    .as_ref()
                    .ok_or_else(|| anyhow!("change {change_id} is missing its target path"))?;
                if target.exists() {
                    fs::remove_file(target)
                        .with_context(|| format!("failed to remove {}", target.display()))?;
                }
            }
            ChangeType::Command => {
                return Err(anyhow!("change {change_id} is a command record; not rollbackable"));
            }
        }

        record.rolled_back = true;
        self.save_index(&doc)?;
        Ok(())
    }

    pub fn list(&self) -> Result<Vec<ChangeRecord>> {
        Ok(self.load_index()?.records)
    }

    fn evict(&self, doc: &mut IndexDocument) {
        while doc.records.len() > self.max_records {
            let evicted = doc.records.remove(0);
            if let Some(backup) = &evicted.backup_path {
                if backup.exists() {
                    if let Err(error) = fs::remove_file(backup) {
                        warn!(path = %backup.display(), %error, "failed to remove evicted backup blob");
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn journal_at(dir: &Path) -> ChangeJournal {
        ChangeJournal::new(dir.to_path_buf())
    }

    #[test]
    fn test_snapshot_existing_file_is_modify() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("a.env");
        fs::write(&target, "X=1").unwrap();

        let journal = journal_at(&dir.path().join("journal"));
        let change_id = journal.snapshot_file(&target).unwrap();

        let records = journal.list().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].change_id, change_id);
        assert_eq!(records[0].change_type, ChangeType::FileModify);
        assert!(records[0].rollback_available);
    }

    #[test]
    fn test_snapshot_missing_file_is_write() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("new.txt");

        let journal = journal_at(&dir.path().join("journal"));
        journal.snapshot_file(&target).unwrap();

        let records = journal.list().unwrap();
        assert_eq!(records[0].change_type, ChangeType::FileWrite);
        assert!(!records[0].rollback_available);
    }

    #[test]
    fn test_rollback_round_trip() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("a.env");
        fs::write(&target, "X=1").unwrap();

        let journal = journal_at(&dir.path().join("journal"));
        let change_id = journal.snapshot_file(&target).unwrap();

        fs::write(&target, "X=2").unwrap();
        journal.rollback(change_id).unwrap();

        assert_eq!(fs::read_to_string(&target).unwrap(), "X=1");

        let records = journal.list().unwrap();
        assert!(records[0].rolled_back);

        let second = journal.rollback(change_id);
        assert!(second.is_err());
        assert!(second.unwrap_err().to_string().contains("already rolled back"));
    }

    #[test]
    fn test_rollback_of_write_deletes_file() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("new.txt");

        let journal = journal_at(&dir.path().join("journal"));
        let change_id = journal.snapshot_file(&target).unwrap();
        fs::write(&target, "created").unwrap();

        // a `file_write` record has no backup, so rollback means delete —
        // but rollback_available is false for writes per the spec contract.
        let result = journal.rollback(change_id);
        assert!(result.is_err());
    }

    #[test]
    fn test_eviction_is_fifo_and_deletes_backups() {
        let dir = tempdir().unwrap();
        let journal = ChangeJournal::with_bound(dir.path().join("journal"), 2);

        let mut ids = Vec::new();
        for i in 0..4 {
            let target = dir.path().join(format!("f{i}.txt"));
            fs::write(&target, "content").unwrap();
            ids.push(journal.snapshot_file(&target).unwrap());
        }

        let records = journal.list().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].change_id, ids[2]);
        assert_eq!(records[1].change_id, ids[3]);
    }

    #[test]
    fn test_corrupt_index_starts_empty() {
        let dir = tempdir().unwrap();
        let journal_dir = dir.path().join("journal");
        fs::create_dir_all(&journal_dir).unwrap();
        fs::write(journal_dir.join("index.json"), "{ not json").unwrap();

        let journal = journal_at(&journal_dir);
        let records = journal.list().unwrap();
        assert!(records.is_empty());
    }

    #[test]
    fn test_record_command_not_rollbackable() {
        let dir = tempdir().unwrap();
        let journal = journal_at(&dir.path().join("journal"));
        let change_id = journal.record_command("docker ps").unwrap();

        assert!(journal.rollback(change_id).is_err());
    }
}
