use std::fs::{self, OpenOptions};
use std::io::Write;

use anyhow::{Context, Result};
use opsai_core::RiskLevel;
use serde::{Deserialize, Serialize};

use crate::paths::OpsAiPaths;
use crate::perms::{set_dir_mode_700, set_file_mode_600};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpsAiConfig {
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub safety: SafetyConfig,
    #[serde(default)]
    pub audit: AuditConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout: u64,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_timeout_secs() -> u64 {
    60
}
fn default_max_tokens() -> u32 {
    2048
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            model: default_model(),
            api_key: String::new(),
            timeout: default_timeout_secs(),
            max_tokens: default_max_tokens(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SafetyConfig {
    #[serde(default = "default_auto_approve_safe")]
    pub auto_approve_safe: bool,
    #[serde(default = "default_cli_max_risk")]
    pub cli_max_risk: RiskLevel,
    #[serde(default = "default_tui_max_risk")]
    pub tui_max_risk: RiskLevel,
    #[serde(default)]
    pub require_dry_run_for_high_risk: bool,
}

fn default_auto_approve_safe() -> bool {
    true
}
fn default_cli_max_risk() -> RiskLevel {
    RiskLevel::Safe
}
fn default_tui_max_risk() -> RiskLevel {
    RiskLevel::High
}

impl Default for SafetyConfig {
    fn default() -> Self {
        Self {
            auto_approve_safe: default_auto_approve_safe(),
            cli_max_risk: default_cli_max_risk(),
            tui_max_risk: default_tui_max_risk(),
            require_dry_run_for_high_risk: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditConfig {
    #[serde(default = "default_audit_log_path")]
    pub log_path: String,
    #[serde(default = "default_max_log_size_mb")]
    pub max_log_size_mb: u64,
    #[serde(default = "default_retain_days")]
    pub retain_days: u32,
}

fn default_audit_log_path() -> String {
    "audit.log".to_string()
}
fn default_max_log_size_mb() -> u64 {
    50
}
fn default_retain_days() -> u32 {
    30
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            log_path: default_audit_log_path(),
            max_log_size_mb: default_max_log_size_mb(),
            retain_days: default_retain_days(),
        }
    }
}

impl Default for OpsAiConfig {
    fn default() -> Self {
        Self {
            llm: LlmConfig::default(),
            safety: SafetyConfig::default(),
            audit: AuditConfig::default(),
        }
    }
}

impl OpsAiConfig {
    /// Load from `paths.config_path()`. Returns built-in defaults, never an
    /// error, when the file does not exist yet.
    pub fn load(paths: &OpsAiPaths) -> Result<Self> {
        let path = paths.config_path();
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(&path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        let config: OpsAiConfig = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse config file: {}", path.display()))?;
        Ok(config)
    }

    /// Read-modify-atomic-write: serialize to a temp file in the same
    /// directory, then rename over the target.
    pub fn save(&self, paths: &OpsAiPaths) -> Result<()> {
        let base_dir = paths.base_dir();
        let dir_exists = base_dir.exists();
        fs::create_dir_all(base_dir)
            .with_context(|| format!("failed to create config dir: {}", base_dir.display()))?;
        if !dir_exists {
            set_dir_mode_700(base_dir)?;
        }

        let path = paths.config_path();
        let tmp_path = base_dir.join("config.json.tmp");
        let content = serde_json::to_string_pretty(self).context("failed to serialize config")?;

        {
            let mut file = OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(&tmp_path)
                .with_context(|| format!("failed to open temp config file: {}", tmp_path.display()))?;
            file.write_all(content.as_bytes())
                .context("failed to write config contents")?;
            file.flush().context("failed to flush config file")?;
        }
        set_file_mode_600(&tmp_path)?;

        fs::rename(&tmp_path, &path)
            .with_context(|| format!("failed to atomically replace config file: {}", path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_load_missing_returns_defaults() {
        let dir = tempdir().unwrap();
        let paths = OpsAiPaths::new(dir.path().to_path_buf());
        let config = OpsAiConfig::load(&paths).unwrap();
        assert_eq!(config.safety.cli_max_risk, RiskLevel::Safe);
        assert_eq!(config.safety.tui_max_risk, RiskLevel::High);
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = tempdir().unwrap();
        let paths = OpsAiPaths::new(dir.path().to_path_buf());

        let mut config = OpsAiConfig::default();
        config.llm.model = "qwen2.5:7b".to_string();
        config.llm.base_url = "http://localhost:11434/v1".to_string();
        config.save(&paths).unwrap();

        let loaded = OpsAiConfig::load(&paths).unwrap();
        assert_eq!(loaded.llm.model, "qwen2.5:7b");
        assert_eq!(loaded.llm.base_url, "http://localhost:11434/v1");
    }

    #[test]
    fn test_partial_document_fills_defaults() {
        let dir = tempdir().unwrap();
        let paths = OpsAiPaths::new(dir.path().to_path_buf());
        fs::create_dir_all(dir.path()).unwrap();
        fs::write(paths.config_path(), r#"{"llm":{"model":"custom-model"}}"#).unwrap();

        let config = OpsAiConfig::load(&paths).unwrap();
        assert_eq!(config.llm.model, "custom-model");
        assert_eq!(config.llm.base_url, default_base_url());
        assert!(config.safety.auto_approve_safe);
    }
}
