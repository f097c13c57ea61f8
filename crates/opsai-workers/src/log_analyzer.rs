use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use opsai_core::{ArgValue, WorkerResult};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::registry::{dry_run_flag, Worker};
use crate::shell::ShellWorker;

const DEFAULT_TAIL_FILE: usize = 1000;
const DEFAULT_TAIL_CONTAINER: usize = 500;
const DEFAULT_TOP_N: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
enum LogLevel {
    Fatal,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
    Unknown,
}

impl LogLevel {
    fn as_str(self) -> &'static str {
        match self {
            Self::Fatal => "FATAL",
            Self::Error => "ERROR",
            Self::Warn => "WARN",
            Self::Info => "INFO",
            Self::Debug => "DEBUG",
            Self::Trace => "TRACE",
            Self::Unknown => "UNKNOWN",
        }
    }

    fn is_error(self) -> bool {
        matches!(self, Self::Fatal | Self::Error)
    }

    fn is_warn(self) -> bool {
        matches!(self, Self::Warn)
    }
}

struct LevelPattern {
    regex: Regex,
    level: LogLevel,
}

fn level_patterns() -> &'static Vec<LevelPattern> {
    static PATTERNS: OnceLock<Vec<LevelPattern>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        vec![
            LevelPattern { regex: Regex::new(r"\bFATAL\b").unwrap(), level: LogLevel::Fatal },
            LevelPattern { regex: Regex::new(r"\bERROR\b").unwrap(), level: LogLevel::Error },
            LevelPattern { regex: Regex::new(r"\bERR\b").unwrap(), level: LogLevel::Error },
            LevelPattern { regex: Regex::new(r"\bWARN(?:ING)?\b").unwrap(), level: LogLevel::Warn },
            LevelPattern { regex: Regex::new(r"\bINFO\b").unwrap(), level: LogLevel::Info },
            LevelPattern { regex: Regex::new(r"\bDEBUG\b").unwrap(), level: LogLevel::Debug },
            LevelPattern { regex: Regex::new(r"\bTRACE\b").unwrap(), level: LogLevel::Trace },
        ]
    })
}

fn timestamp_patterns() -> &'static Vec<Regex> {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        vec![
            Regex::new(r"\d{4}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2}(?:\.\d+)?(?:Z|[+-]\d{2}:?\d{2})?").unwrap(),
            Regex::new(r"\d{4}-\d{2}-\d{2}\s+\d{2}:\d{2}:\d{2}(?:\.\d+)?").unwrap(),
            Regex::new(r"[A-Z][a-z]{2}\s+\d{1,2}\s+\d{2}:\d{2}:\d{2}").unwrap(),
            Regex::new(r"\d{4}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2}\.\d+Z").unwrap(),
            Regex::new(r"\d{2}/[A-Z][a-z]{2}/\d{4}:\d{2}:\d{2}:\d{2}\s+[+-]\d{4}").unwrap(),
            Regex::new(r"\d{2}:\d{2}:\d{2}").unwrap(),
        ]
    })
}

struct NormalizeRule {
    regex: Regex,
    replacement: &'static str,
}

fn normalize_rules() -> &'static Vec<NormalizeRule> {
    static RULES: OnceLock<Vec<NormalizeRule>> = OnceLock::new();
    RULES.get_or_init(|| {
        vec![
            NormalizeRule {
                regex: Regex::new(r"[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}").unwrap(),
                replacement: "<UUID>",
            },
            NormalizeRule {
                regex: Regex::new(r"\d{1,3}\.\d{1,3}\.\d{1,3}\.\d{1,3}").unwrap(),
                replacement: "<IP>",
            },
            NormalizeRule {
                regex: Regex::new(r"\b[0-9a-fA-F]{8,}\b").unwrap(),
                replacement: "<HEX>",
            },
            NormalizeRule { regex: Regex::new(r"\b\d+\b").unwrap(), replacement: "<N>" },
            NormalizeRule { regex: Regex::new(r"\s+").unwrap(), replacement: " " },
        ]
    })
}

fn extract_timestamp(line: &str) -> Option<String> {
    timestamp_patterns().iter().find_map(|pattern| pattern.find(line).map(|m| m.as_str().to_string()))
}

fn extract_level(line: &str) -> LogLevel {
    let upper = line.to_uppercase();
    level_patterns()
        .iter()
        .find(|pattern| pattern.regex.is_match(&upper))
        .map(|pattern| pattern.level)
        .unwrap_or(LogLevel::Unknown)
}

fn extract_message(line: &str, timestamp: Option<&str>) -> String {
    let mut message = line.to_string();
    if let Some(ts) = timestamp {
        if let Some(idx) = message.find(ts) {
            message = message[idx + ts.len()..].to_string();
        }
    }

    for pattern in level_patterns() {
        message = pattern.regex.replace_all(&message, "").to_string();
    }

    static LEADING: OnceLock<Regex> = OnceLock::new();
    let leading = LEADING.get_or_init(|| Regex::new(r"^[\s\-\[\]|:]+").unwrap());
    message = leading.replace(&message, "").to_string();
    message.trim().to_string()
}

fn normalize_message(message: &str) -> String {
    let mut result = message.to_string();
    for rule in normalize_rules() {
        result = rule.regex.replace_all(&result, rule.replacement).to_string();
    }
    result.trim().to_string()
}

struct LogEntry {
    raw: String,
    timestamp: Option<String>,
    level: LogLevel,
    message: String,
}

fn parse_line(line: &str) -> LogEntry {
    let timestamp = extract_timestamp(line);
    let level = extract_level(line);
    let message = extract_message(line, timestamp.as_deref());
    LogEntry { raw: line.to_string(), timestamp, level, message }
}

#[derive(Debug, Clone)]
struct PatternCount {
    pattern: String,
    count: usize,
    sample: String,
    level: LogLevel,
}

#[derive(Debug, Clone)]
struct TrendPoint {
    window: String,
    total: usize,
    errors: usize,
    warns: usize,
}

struct LogAnalysis {
    total_lines: usize,
    level_counts: HashMap<LogLevel, usize>,
    top_errors: Vec<PatternCount>,
    top_warns: Vec<PatternCount>,
    trend: Vec<TrendPoint>,
    dedup_count: usize,
    source: String,
}

fn analyze_lines(lines: &[String], source: &str, top_n: usize) -> LogAnalysis {
    let entries: Vec<LogEntry> = lines.iter().filter(|line| !line.trim().is_empty()).map(|line| parse_line(line.trim_end_matches('\n'))).collect();

    let mut level_counts: HashMap<LogLevel, usize> = HashMap::new();
    for entry in &entries {
        *level_counts.entry(entry.level).or_insert(0) += 1;
    }

    let mut error_counts: HashMap<String, usize> = HashMap::new();
    let mut warn_counts: HashMap<String, usize> = HashMap::new();
    let mut samples: HashMap<String, (String, LogLevel)> = HashMap::new();
    let mut all_patterns: std::collections::HashSet<String> = std::collections::HashSet::new();
    let mut error_order: Vec<String> = Vec::new();
    let mut warn_order: Vec<String> = Vec::new();

    for entry in &entries {
        let normalized = normalize_message(&entry.message);
        all_patterns.insert(normalized.clone());

        if entry.level.is_error() {
            if !error_counts.contains_key(&normalized) {
                error_order.push(normalized.clone());
            }
            *error_counts.entry(normalized.clone()).or_insert(0) += 1;
            samples.entry(normalized).or_insert_with(|| (entry.raw.clone(), entry.level));
        } else if entry.level.is_warn() {
            if !warn_counts.contains_key(&normalized) {
                warn_order.push(normalized.clone());
            }
            *warn_counts.entry(normalized.clone()).or_insert(0) += 1;
            samples.entry(normalized).or_insert_with(|| (entry.raw.clone(), entry.level));
        }
    }

    let top_errors = top_patterns(&error_counts, &error_order, &samples, top_n);
    let top_warns = top_patterns(&warn_counts, &warn_order, &samples, top_n);
    let trend = compute_trend(&entries);

    LogAnalysis {
        total_lines: entries.len(),
        level_counts,
        top_errors,
        top_warns,
        trend,
        dedup_count: all_patterns.len(),
        source: source.to_string(),
    }
}

fn top_patterns(
    counts: &HashMap<String, usize>,
    insertion_order: &[String],
    samples: &HashMap<String, (String, LogLevel)>,
    top_n: usize,
) -> Vec<PatternCount> {
    let mut ranked: Vec<&String> = insertion_order.iter().collect();
    ranked.sort_by(|a, b| counts[*b].cmp(&counts[*a]));
    ranked
        .into_iter()
        .take(top_n)
        .map(|pattern| {
            let (sample, level) = samples.get(pattern).cloned().unwrap_or_default();
            PatternCount { pattern: pattern.clone(), count: counts[pattern], sample, level }
        })
        .collect()
}

impl Default for LogLevel {
    fn default() -> Self {
        Self::Unknown
    }
}

fn compute_trend(entries: &[LogEntry]) -> Vec<TrendPoint> {
    static TIME_RE: OnceLock<Regex> = OnceLock::new();
    let time_re = TIME_RE.get_or_init(|| Regex::new(r"(\d{2}):(\d{2})").unwrap());

    let mut buckets: HashMap<String, (usize, usize, usize)> = HashMap::new();
    for entry in entries {
        let Some(timestamp) = &entry.timestamp else { continue };
        let Some(captures) = time_re.captures(timestamp) else { continue };
        let hour = &captures[1];
        let minute: u32 = captures[2].parse().unwrap_or(0);
        let bucket_minute = (minute / 5) * 5;
        let key = format!("{hour}:{bucket_minute:02}");

        let bucket = buckets.entry(key).or_insert((0, 0, 0));
        bucket.0 += 1;
        if entry.level.is_error() {
            bucket.1 += 1;
        } else if entry.level.is_warn() {
            bucket.2 += 1;
        }
    }

    let mut keys: Vec<&String> = buckets.keys().collect();
    keys.sort();
    keys.into_iter()
        .map(|key| {
            let (total, errors, warns) = buckets[key];
            TrendPoint { window: key.clone(), total, errors, warns }
        })
        .collect()
}

fn spikes(trend: &[TrendPoint]) -> Vec<&TrendPoint> {
    if trend.is_empty() {
        return Vec::new();
    }
    let avg_errors = trend.iter().map(|p| p.errors).sum::<usize>() as f64 / trend.len() as f64;
    trend.iter().filter(|p| p.errors >= 3 && (p.errors as f64) > avg_errors * 3.0).collect()
}

fn format_summary(analysis: &LogAnalysis) -> String {
    let mut lines = Vec::new();
    lines.push(format!("Log analysis ({})", analysis.source));
    lines.push(format!("  total lines: {}, distinct patterns: {}", analysis.total_lines, analysis.dedup_count));

    let ordered_levels = [LogLevel::Fatal, LogLevel::Error, LogLevel::Warn, LogLevel::Info, LogLevel::Debug, LogLevel::Unknown];
    let level_parts: Vec<String> = ordered_levels
        .iter()
        .filter_map(|level| {
            let count = *analysis.level_counts.get(level)?;
            if count == 0 {
                return None;
            }
            let pct = count as f64 / analysis.total_lines.max(1) as f64 * 100.0;
            Some(format!("{}: {} ({:.1}%)", level.as_str(), count, pct))
        })
        .collect();
    if !level_parts.is_empty() {
        lines.push(format!("  level distribution: {}", level_parts.join(", ")));
    }

    if !analysis.top_errors.is_empty() {
        lines.push(format!("  top {} errors:", analysis.top_errors.len()));
        for (i, err) in analysis.top_errors.iter().take(5).enumerate() {
            let truncated: String = err.pattern.chars().take(80).collect();
            lines.push(format!("    {}. [{}x] {}", i + 1, err.count, truncated));
        }
    }

    if !analysis.top_warns.is_empty() {
        lines.push(format!("  top {} warnings:", analysis.top_warns.len()));
        for (i, warn) in analysis.top_warns.iter().take(3).enumerate() {
            let truncated: String = warn.pattern.chars().take(80).collect();
            lines.push(format!("    {}. [{}x] {}", i + 1, warn.count, truncated));
        }
    }

    let spike_points = spikes(&analysis.trend);
    if !spike_points.is_empty() {
        let spike_str: Vec<String> = spike_points.iter().take(3).map(|p| format!("{}({}x)", p.window, p.errors)).collect();
        lines.push(format!("  spike windows: {}", spike_str.join(", ")));
    }

    lines.join("\n")
}

fn analysis_to_data(analysis: &LogAnalysis) -> serde_json::Value {
    let mut rows = vec![json!({
        "name": "summary",
        "total_lines": analysis.total_lines,
        "dedup_count": analysis.dedup_count,
        "source": analysis.source,
    })];

    for (level, count) in &analysis.level_counts {
        rows.push(json!({ "name": format!("level_{}", level.as_str()), "count": count }));
    }

    for (i, err) in analysis.top_errors.iter().take(10).enumerate() {
        let truncated: String = err.pattern.chars().take(100).collect();
        rows.push(json!({ "name": format!("error_{i}"), "pattern": truncated, "count": err.count }));
    }

    json!(rows)
}

/// Local log summarizer: parses timestamp/level/message out of free-form
/// log text, aggregates error/warn patterns after normalization, and buckets
/// entries into 5-minute windows to surface spikes. Never calls the LLM.
pub struct LogAnalyzerWorker {
    shell: Arc<ShellWorker>,
}

impl LogAnalyzerWorker {
    pub fn new(shell: Arc<ShellWorker>) -> Self {
        Self { shell }
    }
}

#[async_trait]
impl Worker for LogAnalyzerWorker {
    fn name(&self) -> &str {
        "log_analyzer"
    }

    fn capabilities(&self) -> &[&str] {
        &["analyze_lines", "analyze_file", "analyze_container"]
    }

    fn describe(&self) -> Vec<String> {
        vec![
            "analyze_lines(lines: string, source: string?, top_n: integer?): analyzes raw log text".to_string(),
            "analyze_file(path: string, tail: integer?, top_n: integer?): analyzes the tail of a log file".to_string(),
            "analyze_container(container: string, tail: integer?, top_n: integer?): analyzes a container's logs".to_string(),
        ]
    }

    async fn execute(&self, action: &str, args: &HashMap<String, ArgValue>) -> WorkerResult {
        if !matches!(action, "analyze_lines" | "analyze_file" | "analyze_container") {
            return WorkerResult::unknown_action(action);
        }

        if dry_run_flag(args) {
            return WorkerResult::simulated(format!("[DRY-RUN] Would execute log_analyzer.{action}"));
        }

        match action {
            "analyze_lines" => self.analyze_lines_action(args),
            "analyze_file" => self.analyze_file_action(args),
            "analyze_container" => self.analyze_container_action(args).await,
            _ => unreachable!(),
        }
    }
}

fn top_n_arg(args: &HashMap<String, ArgValue>) -> usize {
    args.get("top_n").and_then(ArgValue::as_i64).map(|n| n.max(1) as usize).unwrap_or(DEFAULT_TOP_N)
}

impl LogAnalyzerWorker {
    fn analyze_lines_action(&self, args: &HashMap<String, ArgValue>) -> WorkerResult {
        let Some(raw) = args.get("lines").and_then(ArgValue::as_str) else {
            return WorkerResult::err("lines parameter is required (raw log text)");
        };

        let source = args.get("source").and_then(ArgValue::as_str).unwrap_or("input");
        let top_n = top_n_arg(args);
        let lines: Vec<String> = raw.trim().split('\n').map(ToOwned::to_owned).collect();

        let analysis = analyze_lines(&lines, source, top_n);
        let summary = format_summary(&analysis);
        WorkerResult::ok(summary).with_data(analysis_to_data(&analysis)).completed()
    }

    fn analyze_file_action(&self, args: &HashMap<String, ArgValue>) -> WorkerResult {
        let Some(path_raw) = args.get("path").and_then(ArgValue::as_str) else {
            return WorkerResult::err("path parameter is required (log file path)");
        };

        let expanded = expand_home(path_raw);
        let path = Path::new(&expanded);
        if !path.exists() {
            return WorkerResult::err(format!("file does not exist: {}", path.display()));
        }

        let tail_n = args.get("tail").and_then(ArgValue::as_i64).map(|n| n.max(0) as usize).unwrap_or(DEFAULT_TAIL_FILE);
        let top_n = top_n_arg(args);

        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(error) => return WorkerResult::err(format!("failed to read {}: {error}", path.display())),
        };

        let all_lines: Vec<String> = content.lines().map(ToOwned::to_owned).collect();
        let start = all_lines.len().saturating_sub(tail_n);
        let tail_lines = all_lines[start..].to_vec();

        let analysis = analyze_lines(&tail_lines, &path.display().to_string(), top_n);
        let summary = format_summary(&analysis);
        WorkerResult::ok(summary).with_data(analysis_to_data(&analysis)).completed()
    }

    async fn analyze_container_action(&self, args: &HashMap<String, ArgValue>) -> WorkerResult {
        let Some(container) = args.get("container").and_then(ArgValue::as_str) else {
            return WorkerResult::err("container parameter is required (container name or id)");
        };

        let tail_n = args.get("tail").and_then(ArgValue::as_i64).map(|n| n.max(0) as usize).unwrap_or(DEFAULT_TAIL_CONTAINER);
        let top_n = top_n_arg(args);

        let mut shell_args = HashMap::new();
        shell_args.insert("command".to_string(), ArgValue::from(format!("docker logs --tail {tail_n} {container} 2>&1")));
        let result = self.shell.execute("execute_command", &shell_args).await;

        if !result.success {
            return WorkerResult::err(format!("failed to fetch container logs: {}", result.message));
        }

        let raw_output = result.raw_output.as_ref().map(|r| r.content.clone()).filter(|s| !s.is_empty()).unwrap_or(result.message);

        let lines: Vec<String> = raw_output.trim().split('\n').map(ToOwned::to_owned).collect();
        let analysis = analyze_lines(&lines, &format!("container:{container}"), top_n);
        let summary = format_summary(&analysis);
        WorkerResult::ok(summary).with_data(analysis_to_data(&analysis)).completed()
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
    fn test_extract_level_priority() {
        assert_eq!(extract_level("something FATAL happened"), LogLevel::Fatal);
        assert_eq!(extract_level("an ERROR occurred"), LogLevel::Error);
        assert_eq!(extract_level("WARNING: low disk"), LogLevel::Warn);
        assert_eq!(extract_level("just info"), LogLevel::Unknown);
    }

    #[test]
    fn test_extract_timestamp_iso8601() {
        let ts = extract_timestamp("2024-01-15T09:30:45.123Z ERROR boom").unwrap();
        assert_eq!(ts, "2024-01-15T09:30:45.123Z");
    }

    #[test]
    fn test_normalize_message_replaces_uuid_and_numbers() {
        let normalized = normalize_message("request 550e8400-e29b-41d4-a716-446655440000 failed after 42 retries");
        assert_eq!(normalized, "request <UUID> failed after <N> retries");
    }

    #[test]
    fn test_normalize_message_replaces_ip() {
        let normalized = normalize_message("connection from 10.0.0.5 refused");
        assert_eq!(normalized, "connection from <IP> refused");
    }

    #[test]
    fn test_analyze_lines_dedups_identical_patterns() {
        let lines = vec![
            "2024-01-15 09:30:00 ERROR connection to 10.0.0.1 failed".to_string(),
            "2024-01-15 09:30:05 ERROR connection to 10.0.0.2 failed".to_string(),
            "2024-01-15 09:30:10 INFO server started".to_string(),
        ];
        let analysis = analyze_lines(&lines, "test", 10);
        assert_eq!(analysis.total_lines, 3);
        assert_eq!(analysis.top_errors.len(), 1);
        assert_eq!(analysis.top_errors[0].count, 2);
    }

    #[test]
    fn test_spike_detection() {
        let trend = vec![
            TrendPoint { window: "09:00".to_string(), total: 1, errors: 0, warns: 0 },
            TrendPoint { window: "09:05".to_string(), total: 1, errors: 0, warns: 0 },
            TrendPoint { window: "09:10".to_string(), total: 10, errors: 9, warns: 0 },
        ];
        let found = spikes(&trend);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].window, "09:10");
    }

    #[tokio::test]
    async fn test_missing_lines_param() {
        let dir = tempfile::tempdir().unwrap();
        let shell = Arc::new(ShellWorker::new(opsai_journal::ChangeJournal::new(dir.path().join("journal"))));
        let worker = LogAnalyzerWorker::new(shell);
        let result = worker.execute("analyze_lines", &HashMap::new()).await;
        assert!(!result.success);
    }

    #[tokio::test]
    async fn test_unknown_action() {
        let dir = tempfile::tempdir().unwrap();
        let shell = Arc::new(ShellWorker::new(opsai_journal::ChangeJournal::new(dir.path().join("journal"))));
        let worker = LogAnalyzerWorker::new(shell);
        let result = worker.execute("teleport", &HashMap::new()).await;
        assert!(!result.success);
        assert!(result.message.contains("Unknown action"));
    }
}
