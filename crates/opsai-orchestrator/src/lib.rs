mod prompt;
mod react;
mod runbook;

pub use prompt::{build_prompt, SYSTEM_PROMPT};
pub use react::{Orchestrator, OrchestratorOutcome, DEFAULT_MAX_ITERATIONS};
pub use runbook::{DiagnosticRunbook, DiagnosticStep, RunbookLoader};
