use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A reusable command list for one `target_type`. Every command contains
/// the placeholder token `{name}` exactly where the target identity
/// belongs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzeTemplate {
    pub commands: Vec<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub hit_count: u64,
}

impl AnalyzeTemplate {
    pub fn new(commands: Vec<String>) -> Self {
        Self {
            commands,
            created_at: Utc::now(),
            hit_count: 0,
        }
    }

    pub fn substitute(&self, name: &str) -> Vec<String> {
        self.commands
            .iter()
            .map(|command| command.replace("{name}", name))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_substitute_replaces_all_placeholders() {
        let template = AnalyzeTemplate::new(vec!["lsof -i :{name}".to_string(), "ps -p {name}".to_string()]);
        let commands = template.substitute("8080");
        assert_eq!(commands, vec!["lsof -i :8080", "ps -p 8080"]);
    }
}
