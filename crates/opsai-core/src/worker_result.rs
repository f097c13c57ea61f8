use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Outcome of one worker action. Immutable once returned; the orchestrator
/// only ever appends these to history, never edits them.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WorkerResult {
    pub success: bool,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_output: Option<RawOutput>,
    #[serde(default)]
    pub task_completed: bool,
    #[serde(default)]
    pub simulated: bool,
}

/// Captured stdout/stderr from a side effect, with truncation tracked
/// explicitly so the LLM client can mark it `[OUTPUT TRUNCATED]` in history.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RawOutput {
    pub content: String,
    #[serde(default)]
    pub truncated: bool,
}

impl WorkerResult {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: None,
            raw_output: None,
            task_completed: false,
            simulated: false,
        }
    }

    pub fn err(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            data: None,
            raw_output: None,
            task_completed: false,
            simulated: false,
        }
    }

    pub fn unknown_action(action: &str) -> Self {
        Self::err(format!("Unknown action: {action}"))
    }

    pub fn simulated(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: None,
            raw_output: None,
            task_completed: false,
            simulated: true,
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn with_raw_output(mut self, content: impl Into<String>, truncated: bool) -> Self {
        self.raw_output = Some(RawOutput {
            content: content.into(),
            truncated,
        });
        self
    }

    pub fn completed(mut self) -> Self {
        self.task_completed = true;
        self
    }

    /// True iff the caller observably marked the output as having been cut
    /// off short of its real length.
    pub fn is_output_truncated(&self) -> bool {
        self.raw_output.as_ref().is_some_and(|r| r.truncated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_action_message() {
        let result = WorkerResult::unknown_action("teleport");
        assert!(!result.success);
        assert!(result.message.contains("Unknown action"));
    }

    #[test]
    fn test_simulated_sets_flag() {
        let result = WorkerResult::simulated("would do it");
        assert!(result.success);
        assert!(result.simulated);
    }

    #[test]
    fn test_is_output_truncated_false_when_absent() {
        let result = WorkerResult::ok("done");
        assert!(!result.is_output_truncated());
    }

    #[test]
    fn test_is_output_truncated_true() {
        let result = WorkerResult::ok("done").with_raw_output("partial...", true);
        assert!(result.is_output_truncated());
    }

    #[test]
    fn test_serde_roundtrip_skips_none_data() {
        let result = WorkerResult::ok("done");
        let json = serde_json::to_string(&result).unwrap();
        assert!(!json.contains("\"data\""));
    }
}
