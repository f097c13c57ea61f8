use opsai_core::ConversationEntry;

use crate::runbook::DiagnosticRunbook;

/// Renders the full planning prompt for one ReAct iteration: the user's
/// request, prior history, the worker catalogue, any matched runbook
/// snippets, and the session-memory context, in that order.
pub fn build_prompt(
    user_request: &str,
    history: &[ConversationEntry],
    catalogue: &str,
    runbooks: &[DiagnosticRunbook],
    memory_context: &str,
) -> String {
    let mut sections = vec![format!("User request: {user_request}")];

    if !history.is_empty() {
        sections.push(format!("Conversation history:\n{}", render_history(history)));
    }

    sections.push(format!("Available workers:\n{catalogue}"));

    if !runbooks.is_empty() {
        let snippets: Vec<String> = runbooks.iter().map(DiagnosticRunbook::to_prompt_context).collect();
        sections.push(snippets.join("\n\n"));
    }

    if !memory_context.is_empty() {
        sections.push(memory_context.to_string());
    }

    sections.join("\n\n")
}

fn render_history(history: &[ConversationEntry]) -> String {
    history
        .iter()
        .enumerate()
        .map(|(i, entry)| {
            let outcome = if entry.result.success { "ok" } else { "error" };
            let note = if entry.result.is_output_truncated() { " [OUTPUT TRUNCATED]" } else { "" };
            format!(
                "{}. {}.{} -> {} ({}){}",
                i + 1,
                entry.instruction.worker,
                entry.instruction.action,
                entry.result.message,
                outcome,
                note
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub const SYSTEM_PROMPT: &str = "You are an operations assistant. Given the user's request, the available workers, and what has happened so far, respond with a single JSON object describing the next tool call: {\"worker\": string, \"action\": string, \"args\": object, \"risk_level\": \"safe\"|\"low\"|\"medium\"|\"high\", \"task_completed\": bool}. Set task_completed to true only once the user's request has actually been satisfied.";

#[cfg(test)]
mod tests {
    use super::*;
    use opsai_core::{Instruction, RiskLevel, WorkerResult};

    #[test]
    fn test_build_prompt_includes_all_sections() {
        let history = vec![ConversationEntry::new(
            Some("check disk".to_string()),
            Instruction::new("shell", "execute_command", RiskLevel::Safe),
            WorkerResult::ok("42% used"),
        )];
        let runbook = DiagnosticRunbook {
            name: "disk-full".to_string(),
            description: "disk space issues".to_string(),
            keywords: vec!["disk".to_string()],
            steps: vec![],
        };

        let prompt = build_prompt("check disk usage", &history, "shell:\n  execute_command", &[runbook], "Known context:\n- [Fact] os: linux");

        assert!(prompt.contains("check disk usage"));
        assert!(prompt.contains("shell.execute_command"));
        assert!(prompt.contains("disk-full"));
        assert!(prompt.contains("Known context"));
    }

    #[test]
    fn test_build_prompt_omits_empty_sections() {
        let prompt = build_prompt("hello", &[], "shell:\n  execute_command", &[], "");
        assert!(!prompt.contains("Conversation history"));
        assert!(!prompt.contains("Known context"));
    }
}
