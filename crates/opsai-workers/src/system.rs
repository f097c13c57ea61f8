use std::collections::HashMap;
use std::fs;
use std::path::Path;

use async_trait::async_trait;
use opsai_core::{ArgValue, WorkerResult};
use opsai_journal::ChangeJournal;
use serde_json::json;

use crate::registry::{dry_run_flag, Worker};

const PREVIEW_LEN: usize = 200;

/// Local filesystem operations: listing, disk usage, deletion, and the
/// three file-mutation actions (write/append/replace), each snapshotted
/// through the change journal before it mutates anything.
pub struct SystemWorker {
    journal: ChangeJournal,
}

impl SystemWorker {
    pub fn new(journal: ChangeJournal) -> Self {
        Self { journal }
    }
}

#[async_trait]
impl Worker for SystemWorker {
    fn name(&self) -> &str {
        "system"
    }

    fn capabilities(&self) -> &[&str] {
        &[
            "list_files",
            "find_large_files",
            "check_disk_usage",
            "delete_files",
            "write_file",
            "append_to_file",
            "replace_in_file",
        ]
    }

    fn describe(&self) -> Vec<String> {
        vec![
            "list_files(path: string?): lists entries in a directory".to_string(),
            "find_large_files(path: string?, min_size_mb: integer?): finds files above a size threshold".to_string(),
            "check_disk_usage(path: string?): reports filesystem usage".to_string(),
            "delete_files(files: list): deletes one or more files".to_string(),
            "write_file(path: string, content: string): creates or overwrites a file".to_string(),
            "append_to_file(path: string, content: string): appends to an existing file".to_string(),
            "replace_in_file(path: string, old: string, new: string, regex: bool?, count: integer?): find/replace in a file".to_string(),
        ]
    }

    async fn execute(&self, action: &str, args: &HashMap<String, ArgValue>) -> WorkerResult {
        let dry_run = dry_run_flag(args);
        match action {
            "list_files" => list_files(args, dry_run),
            "find_large_files" => find_large_files(args, dry_run),
            "check_disk_usage" => check_disk_usage(args, dry_run),
            "delete_files" => self.delete_files(args, dry_run),
            "write_file" => self.write_file(args, dry_run),
            "append_to_file" => self.append_to_file(args, dry_run),
            "replace_in_file" => self.replace_in_file(args, dry_run),
            other => WorkerResult::unknown_action(other),
        }
    }
}

fn list_files(args: &HashMap<String, ArgValue>, dry_run: bool) -> WorkerResult {
    let path_str = args.get("path").and_then(ArgValue::as_str).unwrap_or(".");

    if dry_run {
        return WorkerResult::simulated(format!("[DRY-RUN] Would list files in {path_str}"));
    }

    let path = Path::new(path_str);
    if !path.exists() {
        return WorkerResult::err(format!("Path does not exist: {path_str}"));
    }
    if !path.is_dir() {
        return WorkerResult::err(format!("Path is not a directory: {path_str}"));
    }

    let entries = match fs::read_dir(path) {
        Ok(entries) => entries,
        Err(error) => return WorkerResult::err(format!("Cannot list directory: {error}")),
    };

    let mut items = Vec::new();
    for entry in entries.flatten() {
        let name = entry.file_name().to_string_lossy().to_string();
        let is_dir = entry.path().is_dir();
        items.push(json!({"name": name, "type": if is_dir { "dir" } else { "file" }}));
    }
    items.sort_by(|a, b| a["name"].as_str().cmp(&b["name"].as_str()));

    WorkerResult::ok(format!("Found {} items in {path_str}", items.len()))
        .with_data(json!(items))
        .completed()
}

fn find_large_files(args: &HashMap<String, ArgValue>, dry_run: bool) -> WorkerResult {
    let path_str = args.get("path").and_then(ArgValue::as_str).unwrap_or(".");
    let min_size_mb = args.get("min_size_mb").and_then(ArgValue::as_i64).unwrap_or(100).max(0);

    if dry_run {
        return WorkerResult::simulated(format!("[DRY-RUN] Would search for files larger than {min_size_mb}MB in {path_str}"));
    }

    let path = Path::new(path_str);
    if !path.exists() {
        return WorkerResult::err(format!("Path does not exist: {path_str}"));
    }

    let min_size_bytes = (min_size_mb as u64) * 1024 * 1024;
    let mut large_files = Vec::new();
    walk_files(path, &mut |file_path, size| {
        if size >= min_size_bytes {
            large_files.push(json!({
                "path": file_path.to_string_lossy(),
                "size_mb": size / (1024 * 1024),
            }));
        }
    });

    large_files.sort_by(|a, b| b["size_mb"].as_u64().cmp(&a["size_mb"].as_u64()));

    WorkerResult::ok(format!("Found {} files larger than {min_size_mb}MB", large_files.len())).with_data(json!(large_files))
}

fn walk_files(dir: &Path, visit: &mut impl FnMut(&Path, u64)) {
    let Ok(entries) = fs::read_dir(dir) else { return };
    for entry in entries.flatten() {
        let entry_path = entry.path();
        if entry_path.is_dir() {
            walk_files(&entry_path, visit);
        } else if let Ok(metadata) = entry.metadata() {
            visit(&entry_path, metadata.len());
        }
    }
}

fn check_disk_usage(args: &HashMap<String, ArgValue>, dry_run: bool) -> WorkerResult {
    let path_str = args.get("path").and_then(ArgValue::as_str).unwrap_or("/");

    if dry_run {
        return WorkerResult::simulated(format!("[DRY-RUN] Would check disk usage for {path_str}"));
    }

    match fs2_statvfs(path_str) {
        Ok((total, free)) => {
            let used = total.saturating_sub(free);
            let gb = |bytes: u64| bytes / (1024 * 1024 * 1024);
            let percent_used = if total > 0 { (used * 100 / total) as i64 } else { 0 };
            WorkerResult::ok(format!("Disk usage: {percent_used}% used")).with_data(json!({
                "total": gb(total),
                "used": gb(used),
                "free": gb(free),
                "percent_used": percent_used,
            }))
        }
        Err(error) => WorkerResult::err(format!("Cannot check disk usage: {error}")),
    }
}

#[cfg(unix)]
fn fs2_statvfs(path: &str) -> std::io::Result<(u64, u64)> {
    use std::ffi::CString;
    use std::mem::MaybeUninit;

    let c_path = CString::new(path).map_err(|_| std::io::Error::other("invalid path"))?;
    let mut stat = MaybeUninit::<libc::statvfs>::uninit();
    // SAFETY: c_path is a valid NUL-terminated string and stat is sized for statvfs.
    let ret = unsafe { libc::statvfs(c_path.as_ptr(), stat.as_mut_ptr()) };
    if ret != 0 {
        return Err(std::io::Error::last_os_error());
    }
    // SAFETY: statvfs succeeded, stat is fully initialized.
    let stat = unsafe { stat.assume_init() };
    let block_size = stat.f_frsize as u64;
    Ok((stat.f_blocks as u64 * block_size, stat.f_bavail as u64 * block_size))
}

#[cfg(not(unix))]
fn fs2_statvfs(_path: &str) -> std::io::Result<(u64, u64)> {
    Ok((0, 0))
}

impl SystemWorker {
    fn delete_files(&self, args: &HashMap<String, ArgValue>, dry_run: bool) -> WorkerResult {
        let mut files: Vec<String> = args
            .get("files")
            .map(|value| value.as_list().into_iter().filter_map(ArgValue::as_str).map(str::to_string).collect())
            .unwrap_or_default();

        if files.is_empty() {
            if let Some(path) = args.get("path").and_then(ArgValue::as_str) {
                files.push(path.to_string());
            }
        }

        if files.is_empty() {
            return WorkerResult::err("files list cannot be empty");
        }

        if dry_run {
            let preview: Vec<&str> = files.iter().take(3).map(String::as_str).collect();
            let suffix = if files.len() > 3 { "..." } else { "" };
            return WorkerResult::simulated(format!("[DRY-RUN] Would delete {} files: {}{}", files.len(), preview.join(", "), suffix));
        }

        let mut deleted = Vec::new();
        let mut errors = Vec::new();

        for file in &files {
            let path = Path::new(file);
            if path.is_file() {
                match self.journal.record_delete(path) {
                    Ok(_) => match fs::remove_file(path) {
                        Ok(()) => deleted.push(file.clone()),
                        Err(error) => errors.push(format!("Cannot delete {file}: {error}")),
                    },
                    Err(error) => errors.push(format!("Cannot snapshot {file}: {error}")),
                }
            } else if path.is_dir() {
                errors.push(format!("Cannot delete directory: {file}"));
            } else {
                errors.push(format!("File not found: {file}"));
            }
        }

        let success = errors.is_empty();
        let mut message_parts = Vec::new();
        if !deleted.is_empty() {
            message_parts.push(format!("Deleted {} files", deleted.len()));
        }
        if !errors.is_empty() {
            message_parts.push(format!("{} errors", errors.len()));
        }

        let mut data: Vec<_> = deleted.iter().map(|path| json!({"type": "deleted", "path": path})).collect();
        data.extend(errors.iter().map(|message| json!({"type": "error", "message": message})));

        let message = if message_parts.is_empty() { "No files to delete".to_string() } else { message_parts.join(", ") };
        let mut result = if success { WorkerResult::ok(message) } else { WorkerResult::err(message) };
        result = result.with_data(json!(data));
        if success {
            result = result.completed();
        }
        result
    }

    fn write_file(&self, args: &HashMap<String, ArgValue>, dry_run: bool) -> WorkerResult {
        let Some(path_str) = args.get("path").and_then(ArgValue::as_str) else {
            return WorkerResult::err("path parameter is required and must be a string");
        };
        let Some(content) = args.get("content").and_then(ArgValue::as_str) else {
            return WorkerResult::err("content parameter is required and must be a string");
        };

        let path = Path::new(path_str);
        if path.is_dir() {
            return WorkerResult::err(format!("Path is a directory: {path_str}"));
        }
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                return WorkerResult::err(format!("Parent directory does not exist: {}", parent.display()));
            }
        }

        if dry_run {
            let preview = preview_of(content);
            return WorkerResult::simulated(format!("[DRY-RUN] Would write {} chars to {path_str}\nContent preview:\n{preview}", content.len()));
        }

        if let Err(error) = self.journal.snapshot_file(path) {
            return WorkerResult::err(format!("Failed to snapshot before write: {error}"));
        }

        match fs::write(path, content) {
            Ok(()) => WorkerResult::ok(format!("Successfully wrote {} chars to {path_str}", content.len()))
                .with_data(json!({"path": path_str, "size": content.len()}))
                .completed(),
            Err(error) => WorkerResult::err(format!("Error writing file: {error}")),
        }
    }

    fn append_to_file(&self, args: &HashMap<String, ArgValue>, dry_run: bool) -> WorkerResult {
        let Some(path_str) = args.get("path").and_then(ArgValue::as_str) else {
            return WorkerResult::err("path parameter is required and must be a string");
        };
        let Some(content) = args.get("content").and_then(ArgValue::as_str) else {
            return WorkerResult::err("content parameter is required and must be a string");
        };

        let path = Path::new(path_str);
        if !path.exists() {
            return WorkerResult::err(format!("File not found: {path_str}"));
        }
        if !path.is_file() {
            return WorkerResult::err(format!("Path is not a file: {path_str}"));
        }

        if dry_run {
            let preview = preview_of(content);
            return WorkerResult::simulated(format!("[DRY-RUN] Would append {} chars to {path_str}\nContent to append:\n{preview}", content.len()));
        }

        if let Err(error) = self.journal.snapshot_file(path) {
            return WorkerResult::err(format!("Failed to snapshot before append: {error}"));
        }

        use std::io::Write;
        let result = fs::OpenOptions::new().append(true).open(path).and_then(|mut file| file.write_all(content.as_bytes()));

        match result {
            Ok(()) => WorkerResult::ok(format!("Successfully appended {} chars to {path_str}", content.len()))
                .with_data(json!({"path": path_str, "appended_size": content.len()}))
                .completed(),
            Err(error) => WorkerResult::err(format!("Error appending to file: {error}")),
        }
    }

    fn replace_in_file(&self, args: &HashMap<String, ArgValue>, dry_run: bool) -> WorkerResult {
        let Some(path_str) = args.get("path").and_then(ArgValue::as_str) else {
            return WorkerResult::err("path parameter is required and must be a string");
        };
        let Some(old) = args.get("old").and_then(ArgValue::as_str) else {
            return WorkerResult::err("old parameter is required and must be a string");
        };
        let Some(new) = args.get("new").and_then(ArgValue::as_str) else {
            return WorkerResult::err("new parameter is required and must be a string");
        };
        let use_regex = args.get("regex").and_then(ArgValue::as_bool).unwrap_or(false);
        let max_count = args.get("count").and_then(ArgValue::as_i64).map(|n| n.max(0) as usize);

        let path = Path::new(path_str);
        if !path.exists() {
            return WorkerResult::err(format!("File not found: {path_str}"));
        }
        if !path.is_file() {
            return WorkerResult::err(format!("Path is not a file: {path_str}"));
        }

        let file_content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(error) => return WorkerResult::err(format!("Error reading file: {error}")),
        };

        let regex = if use_regex {
            match regex::Regex::new(old) {
                Ok(regex) => Some(regex),
                Err(error) => return WorkerResult::err(format!("Invalid regex pattern: {error}")),
            }
        } else {
            None
        };

        let match_count = match &regex {
            Some(regex) => regex.find_iter(&file_content).count(),
            None => file_content.matches(old).count(),
        };

        if match_count == 0 {
            return WorkerResult::ok(format!("No matches found for '{old}'")).completed();
        }

        let effective_count = max_count.map(|n| n.min(match_count)).unwrap_or(match_count);

        if dry_run {
            return WorkerResult::simulated(format!(
                "[DRY-RUN] Would replace in {path_str}\n  \"{old}\" -> \"{new}\"\n  Matches found: {match_count}, would replace: {effective_count}"
            ));
        }

        if let Err(error) = self.journal.snapshot_file(path) {
            return WorkerResult::err(format!("Failed to snapshot before replace: {error}"));
        }

        let (new_content, actual_count) = match &regex {
            Some(regex) => replace_regex(regex, &file_content, new, max_count),
            None => replace_plain(&file_content, old, new, max_count),
        };

        match fs::write(path, new_content) {
            Ok(()) => WorkerResult::ok(format!("Replaced {actual_count} occurrence(s) in {path_str}"))
                .with_data(json!({"path": path_str, "replacements": actual_count}))
                .completed(),
            Err(error) => WorkerResult::err(format!("Error writing file: {error}")),
        }
    }
}

fn replace_plain(content: &str, old: &str, new: &str, max_count: Option<usize>) -> (String, usize) {
    match max_count {
        Some(limit) => {
            let mut remaining = limit;
            let mut result = String::with_capacity(content.len());
            let mut rest = content;
            let mut count = 0;
            while remaining > 0 {
                match rest.find(old) {
                    Some(idx) => {
                        result.push_str(&rest[..idx]);
                        result.push_str(new);
                        rest = &rest[idx + old.len()..];
                        remaining -= 1;
                        count += 1;
                    }
                    None => break,
                }
            }
            result.push_str(rest);
            (result, count)
        }
        None => {
            let count = content.matches(old).count();
            (content.replace(old, new), count)
        }
    }
}

fn replace_regex(regex: &regex::Regex, content: &str, new: &str, max_count: Option<usize>) -> (String, usize) {
    match max_count {
        Some(limit) => {
            let count = regex.find_iter(content).take(limit).count();
            (regex.replacen(content, limit, new).into_owned(), count)
        }
        None => {
            let count = regex.find_iter(content).count();
            (regex.replace_all(content, new).into_owned(), count)
        }
    }
}

fn preview_of(content: &str) -> String {
    if content.len() > PREVIEW_LEN {
        format!("{}...", &content[..PREVIEW_LEN])
    } else {
        content.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn worker() -> SystemWorker {
        let dir = tempdir().unwrap();
        SystemWorker::new(ChangeJournal::new(dir.path().join("journal")))
    }

    fn args(pairs: &[(&str, ArgValue)]) -> HashMap<String, ArgValue> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[tokio::test]
    async fn test_write_file_then_read_back() {
        let dir = tempdir().unwrap();
        let worker = SystemWorker::new(ChangeJournal::new(dir.path().join("journal")));
        let target = dir.path().join("out.txt");

        let result = worker
            .execute(
                "write_file",
                &args(&[
                    ("path", ArgValue::from(target.to_string_lossy().to_string())),
                    ("content", ArgValue::from("hello")),
                ]),
            )
            .await;

        assert!(result.success);
        assert_eq!(fs::read_to_string(&target).unwrap(), "hello");
    }

    #[tokio::test]
    async fn test_write_file_dry_run_does_not_touch_disk() {
        let dir = tempdir().unwrap();
        let worker = SystemWorker::new(ChangeJournal::new(dir.path().join("journal")));
        let target = dir.path().join("out.txt");

        let result = worker
            .execute(
                "write_file",
                &args(&[
                    ("path", ArgValue::from(target.to_string_lossy().to_string())),
                    ("content", ArgValue::from("hello")),
                    ("dry_run", ArgValue::Bool(true)),
                ]),
            )
            .await;

        assert!(result.simulated);
        assert!(!target.exists());
    }

    #[tokio::test]
    async fn test_replace_in_file_counts_occurrences() {
        let dir = tempdir().unwrap();
        let worker = SystemWorker::new(ChangeJournal::new(dir.path().join("journal")));
        let target = dir.path().join("a.txt");
        fs::write(&target, "foo foo foo").unwrap();

        let result = worker
            .execute(
                "replace_in_file",
                &args(&[
                    ("path", ArgValue::from(target.to_string_lossy().to_string())),
                    ("old", ArgValue::from("foo")),
                    ("new", ArgValue::from("bar")),
                ]),
            )
            .await;

        assert!(result.success);
        assert_eq!(fs::read_to_string(&target).unwrap(), "bar bar bar");
    }

    #[tokio::test]
    async fn test_delete_files_accepts_bare_path_fallback() {
        let dir = tempdir().unwrap();
        let worker = SystemWorker::new(ChangeJournal::new(dir.path().join("journal")));
        let target = dir.path().join("gone.txt");
        fs::write(&target, "bye").unwrap();

        let result = worker
            .execute("delete_files", &args(&[("path", ArgValue::from(target.to_string_lossy().to_string()))]))
            .await;

        assert!(result.success);
        assert!(!target.exists());
    }

    #[tokio::test]
    async fn test_list_files_missing_path() {
        let worker = worker();
        let result = worker.execute("list_files", &args(&[("path", ArgValue::from("/does/not/exist"))])).await;
        assert!(!result.success);
    }
}
