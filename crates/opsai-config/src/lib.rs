mod config;
mod paths;
mod perms;

pub use config::{AuditConfig, LlmConfig, OpsAiConfig, SafetyConfig};
pub use paths::OpsAiPaths;
