use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::{ArgValue, RiskLevel};

/// A single planned tool call, produced by a planner and never mutated once
/// created.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Instruction {
    pub worker: String,
    pub action: String,
    #[serde(default)]
    pub args: HashMap<String, ArgValue>,
    pub risk_level: RiskLevel,
    #[serde(default)]
    pub task_completed: bool,
}

impl Instruction {
    pub fn new(worker: impl Into<String>, action: impl Into<String>, risk_level: RiskLevel) -> Self {
        Self {
            worker: worker.into(),
            action: action.into(),
            args: HashMap::new(),
            risk_level,
            task_completed: false,
        }
    }

    pub fn with_arg(mut self, key: impl Into<String>, value: impl Into<ArgValue>) -> Self {
        self.args.insert(key.into(), value.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder() {
        let instr = Instruction::new("shell", "execute_command", RiskLevel::Low)
            .with_arg("command", "ls")
            .with_arg("dry_run", true);

        assert_eq!(instr.worker, "shell");
        assert_eq!(instr.args.len(), 2);
        assert!(!instr.task_completed);
    }

    #[test]
    fn test_deserialize_defaults_task_completed_false() {
        let json = r#"{"worker":"shell","action":"execute_command","risk_level":"safe"}"#;
        let instr: Instruction = serde_json::from_str(json).unwrap();
        assert!(!instr.task_completed);
        assert!(instr.args.is_empty());
    }
}
