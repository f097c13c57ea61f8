use std::path::PathBuf;

const ENV_HOME_OVERRIDE: &str = "OPSAI_HOME";

/// Resolves every on-disk location OpsAI touches, rooted at `~/.opsai`
/// (or `$OPSAI_HOME` when set). Instantiable with an explicit base path so
/// tests never touch the real home directory.
#[derive(Debug, Clone)]
pub struct OpsAiPaths {
    base_dir: PathBuf,
}

impl OpsAiPaths {
    pub fn new(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    /// Resolve from `$OPSAI_HOME` if set, else `~/.opsai`, else a temp
    /// fallback when no home directory can be determined at all.
    pub fn resolve() -> Self {
        if let Ok(override_dir) = std::env::var(ENV_HOME_OVERRIDE) {
            return Self::new(PathBuf::from(override_dir));
        }

        let base_dir = directories::BaseDirs::new()
            .map(|dirs| dirs.home_dir().join(".opsai"))
            .unwrap_or_else(|| std::env::temp_dir().join("opsai-state"));

        Self::new(base_dir)
    }

    pub fn base_dir(&self) -> &std::path::Path {
        &self.base_dir
    }

    pub fn config_path(&self) -> PathBuf {
        self.base_dir.join("config.json")
    }

    pub fn memory_path(&self) -> PathBuf {
        self.base_dir.join("memory.json")
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.base_dir.join("cache")
    }

    pub fn analyze_templates_path(&self) -> PathBuf {
        self.cache_dir().join("analyze_templates.json")
    }

    pub fn changes_dir(&self) -> PathBuf {
        self.base_dir.join("changes")
    }

    pub fn changes_index_path(&self) -> PathBuf {
        self.changes_dir().join("index.json")
    }

    pub fn backups_dir(&self) -> PathBuf {
        self.changes_dir().join("backups")
    }

    pub fn audit_log_path(&self) -> PathBuf {
        self.base_dir.join("audit.log")
    }
}

impl Default for OpsAiPaths {
    fn default() -> Self {
        Self::resolve()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_relative_to_base_dir() {
        let paths = OpsAiPaths::new(PathBuf::from("/tmp/opsai-test"));
        assert_eq!(paths.config_path(), PathBuf::from("/tmp/opsai-test/config.json"));
        assert_eq!(
            paths.analyze_templates_path(),
            PathBuf::from("/tmp/opsai-test/cache/analyze_templates.json")
        );
        assert_eq!(
            paths.changes_index_path(),
            PathBuf::from("/tmp/opsai-test/changes/index.json")
        );
        assert_eq!(
            paths.backups_dir(),
            PathBuf::from("/tmp/opsai-test/changes/backups")
        );
    }
}
