use std::io::{self, Write};

use async_trait::async_trait;
use opsai_policy::{ApprovalHost, DeployHost};

/// A `DeployHost`/`ApprovalHost` backed by the process's own stdin/stdout:
/// progress goes to stderr, confirmations and choices are read from a line
/// of terminal input.
pub struct TerminalHost;

impl TerminalHost {
    pub fn new() -> Self {
        Self
    }

    fn prompt_yes_no(&self, question: &str) -> bool {
        eprint!("{question} [y/N]: ");
        let _ = io::stderr().flush();
        let mut line = String::new();
        if io::stdin().read_line(&mut line).is_err() {
            return false;
        }
        matches!(line.trim().to_ascii_lowercase().as_str(), "y" | "yes")
    }
}

impl Default for TerminalHost {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DeployHost for TerminalHost {
    fn progress(&self, step: &str, message: &str) {
        eprintln!("[{step}] {message}");
    }

    async fn confirm(&self, action: &str, detail: &str) -> bool {
        self.prompt_yes_no(&format!("Allow {action}?\n  {detail}"))
    }

    async fn ask_user(&self, question: &str, options: &[String], context: &str) -> String {
        eprintln!("{question}");
        if !context.is_empty() {
            eprintln!("{context}");
        }
        for (index, option) in options.iter().enumerate() {
            eprintln!("  {}. {option}", index + 1);
        }
        eprint!("> ");
        let _ = io::stderr().flush();

        let mut line = String::new();
        if io::stdin().read_line(&mut line).is_err() {
            return String::new();
        }
        let trimmed = line.trim();

        if let Ok(index) = trimmed.parse::<usize>() {
            if index >= 1 && index <= options.len() {
                return options[index - 1].clone();
            }
        }
        trimmed.to_string()
    }
}

#[async_trait]
impl ApprovalHost for TerminalHost {
    async fn approve(&self, worker: &str, action: &str, risk_level: &str) -> bool {
        self.prompt_yes_no(&format!("Approve {worker}.{action} (risk: {risk_level})?"))
    }
}
