use serde::{Deserialize, Serialize};

use crate::{Instruction, WorkerResult};

/// One turn of an orchestrator run: the user's input (absent on internally
/// generated turns), the instruction the planner chose, and the result the
/// worker returned. The orchestrator feeds these back verbatim on every
/// subsequent prompt.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ConversationEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_input: Option<String>,
    pub instruction: Instruction,
    pub result: WorkerResult,
}

impl ConversationEntry {
    pub fn new(user_input: Option<String>, instruction: Instruction, result: WorkerResult) -> Self {
        Self {
            user_input,
            instruction,
            result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RiskLevel;

    #[test]
    fn test_construction_without_user_input() {
        let entry = ConversationEntry::new(
            None,
            Instruction::new("shell", "execute_command", RiskLevel::Safe),
            WorkerResult::ok("done"),
        );
        assert!(entry.user_input.is_none());
    }
}
