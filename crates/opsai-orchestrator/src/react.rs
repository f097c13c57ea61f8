use std::sync::Arc;

use anyhow::Result;
use opsai_core::{ArgValue, ConversationEntry, Instruction, RiskLevel, WorkerResult};
use opsai_llm::LlmClient;
use opsai_memory::SessionMemory;
use opsai_policy::{ApprovalHost, Mode, PolicyDecision, RiskPolicy};
use opsai_workers::WorkerRegistry;
use tracing::{info, warn};

use crate::prompt::{build_prompt, SYSTEM_PROMPT};
use crate::runbook::RunbookLoader;

pub const DEFAULT_MAX_ITERATIONS: usize = 10;
const MEMORY_CONTEXT_ENTRIES: usize = 10;
const RUNBOOK_TOP_K: usize = 2;

/// The full record of one `run` call: the observation history it built up,
/// whether the task reported itself complete, and a human-readable summary.
pub struct OrchestratorOutcome {
    pub history: Vec<ConversationEntry>,
    pub completed: bool,
    pub summary: String,
}

/// Drives the bounded plan-act-observe loop: build a prompt, ask the LLM for
/// one `Instruction`, gate it through the risk policy, dispatch it, and
/// repeat until the worker reports completion or the iteration budget runs
/// out.
pub struct Orchestrator {
    llm: Arc<dyn LlmClient>,
    workers: WorkerRegistry,
    memory: SessionMemory,
    runbooks: Option<RunbookLoader>,
    policy: RiskPolicy,
    mode: Mode,
    approval_host: Arc<dyn ApprovalHost>,
    max_iterations: usize,
}

impl Orchestrator {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        workers: WorkerRegistry,
        memory: SessionMemory,
        runbooks: Option<RunbookLoader>,
        policy: RiskPolicy,
        mode: Mode,
        approval_host: Arc<dyn ApprovalHost>,
    ) -> Self {
        Self {
            llm,
            workers,
            memory,
            runbooks,
            policy,
            mode,
            approval_host,
            max_iterations: DEFAULT_MAX_ITERATIONS,
        }
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub async fn run(&self, user_request: &str, dry_run: bool) -> Result<OrchestratorOutcome> {
        let mut history: Vec<ConversationEntry> = Vec::new();

        let runbook_matches = self.runbooks.as_ref().map(|loader| loader.match_input(user_request, RUNBOOK_TOP_K)).unwrap_or_default();
        let memory_context = self.memory.get_context_prompt(MEMORY_CONTEXT_ENTRIES).unwrap_or_default();

        for iteration in 0..self.max_iterations {
            let catalogue = self.workers.catalogue();
            let prompt = build_prompt(user_request, &history, &catalogue, &runbook_matches, &memory_context);

            let parsed = match self.llm.generate_json(SYSTEM_PROMPT, &prompt, &history).await {
                Ok(Some(value)) => serde_json::from_value::<Instruction>(value).ok(),
                Ok(None) => None,
                Err(error) => {
                    warn!(%error, iteration, "LLM call failed during orchestrator iteration");
                    None
                }
            };

            let Some(instruction) = parsed else {
                history.push(synthetic_entry(
                    Some(user_request).filter(|_| iteration == 0).map(ToOwned::to_owned),
                    "Failed to parse a valid instruction from the model response",
                ));
                continue;
            };

            let user_input_for_entry = (iteration == 0).then(|| user_request.to_string());

            match self.policy.evaluate(instruction.risk_level, self.mode) {
                PolicyDecision::Rejected => {
                    let message = format!(
                        "Rejected: {} risk exceeds the maximum allowed in this mode ({})",
                        instruction.risk_level,
                        self.policy.max_for(self.mode)
                    );
                    history.push(ConversationEntry::new(user_input_for_entry, instruction, WorkerResult::err(message)));
                    continue;
                }
                PolicyDecision::RequiresApproval => {
                    let approved = self.approval_host.approve(&instruction.worker, &instruction.action, instruction.risk_level.as_str()).await;
                    if !approved {
                        history.push(ConversationEntry::new(
                            user_input_for_entry,
                            instruction,
                            WorkerResult::err("Rejected: user denied approval for this action"),
                        ));
                        continue;
                    }
                }
                PolicyDecision::Allowed => {}
            }

            let mut dispatch_args = instruction.args.clone();
            dispatch_args.insert("dry_run".to_string(), ArgValue::Bool(dry_run));

            let result = self.workers.dispatch(&instruction.worker, &instruction.action, &dispatch_args).await;
            let completed = result.task_completed;

            history.push(ConversationEntry::new(user_input_for_entry, instruction, result));

            if completed {
                info!(iteration, "orchestrator run completed");
                return Ok(OrchestratorOutcome {
                    summary: summarize(&history, true),
                    history,
                    completed: true,
                });
            }
        }

        Ok(OrchestratorOutcome {
            summary: summarize(&history, false),
            history,
            completed: false,
        })
    }
}

fn synthetic_entry(user_input: Option<String>, message: &str) -> ConversationEntry {
    let instruction = Instruction::new("_orchestrator", "parse_error", RiskLevel::Safe);
    ConversationEntry::new(user_input, instruction, WorkerResult::err(message.to_string()))
}

fn summarize(history: &[ConversationEntry], completed: bool) -> String {
    if completed {
        history.last().map(|entry| entry.result.message.clone()).unwrap_or_else(|| "Task completed.".to_string())
    } else {
        let steps = history.len();
        format!("Reached the iteration limit after {steps} step(s) without the task reporting completion.")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use opsai_memory::MemoryCategory;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::tempdir;

    struct ScriptedLlm {
        responses: Vec<serde_json::Value>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl LlmClient for ScriptedLlm {
        async fn generate(&self, _system_prompt: &str, _user_prompt: &str, _history: &[ConversationEntry]) -> Result<String> {
            let idx = self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.responses.get(idx).cloned().unwrap_or(json!({})).to_string())
        }
    }

    struct AlwaysApprove;

    #[async_trait]
    impl ApprovalHost for AlwaysApprove {
        async fn approve(&self, _worker: &str, _action: &str, _risk_level: &str) -> bool {
            true
        }
    }

    struct AlwaysDeny;

    #[async_trait]
    impl ApprovalHost for AlwaysDeny {
        async fn approve(&self, _worker: &str, _action: &str, _risk_level: &str) -> bool {
            false
        }
    }

    fn registry() -> WorkerRegistry {
        let mut registry = WorkerRegistry::new();
        registry.register(Arc::new(StubWorker));
        registry
    }

    struct StubWorker;

    #[async_trait]
    impl opsai_workers::Worker for StubWorker {
        fn name(&self) -> &str {
            "stub"
        }
        fn capabilities(&self) -> &[&str] {
            &["done"]
        }
        fn describe(&self) -> Vec<String> {
            vec!["done(): completes the task".to_string()]
        }
        async fn execute(&self, action: &str, _args: &std::collections::HashMap<String, ArgValue>) -> WorkerResult {
            match action {
                "done" => WorkerResult::ok("all set").completed(),
                other => WorkerResult::unknown_action(other),
            }
        }
    }

    fn memory() -> SessionMemory {
        let dir = tempdir().unwrap();
        SessionMemory::new(dir.path().join("memory.json"))
    }

    fn permissive_policy() -> RiskPolicy {
        RiskPolicy {
            cli_max_risk: RiskLevel::High,
            tui_max_risk: RiskLevel::High,
            auto_approve_safe: true,
        }
    }

    #[tokio::test]
    async fn test_completes_on_first_task_completed_result() {
        let llm = Arc::new(ScriptedLlm {
            responses: vec![json!({"worker": "stub", "action": "done", "risk_level": "safe"})],
            calls: AtomicUsize::new(0),
        });
        let orchestrator = Orchestrator::new(llm, registry(), memory(), None, permissive_policy(), Mode::Cli, Arc::new(AlwaysApprove));

        let outcome = orchestrator.run("finish the task", false).await.unwrap();
        assert!(outcome.completed);
        assert_eq!(outcome.history.len(), 1);
    }

    #[tokio::test]
    async fn test_parse_failure_continues_to_next_iteration() {
        let llm = Arc::new(ScriptedLlm {
            responses: vec![json!({"not": "an instruction"}), json!({"worker": "stub", "action": "done", "risk_level": "safe"})],
            calls: AtomicUsize::new(0),
        });
        let orchestrator = Orchestrator::new(llm, registry(), memory(), None, permissive_policy(), Mode::Cli, Arc::new(AlwaysApprove));

        let outcome = orchestrator.run("finish the task", false).await.unwrap();
        assert!(outcome.completed);
        assert_eq!(outcome.history.len(), 2);
        assert!(!outcome.history[0].result.success);
    }

    #[tokio::test]
    async fn test_risk_rejected_does_not_dispatch() {
        let policy = RiskPolicy { cli_max_risk: RiskLevel::Safe, tui_max_risk: RiskLevel::High, auto_approve_safe: true };
        let llm = Arc::new(ScriptedLlm {
            responses: vec![
                json!({"worker": "stub", "action": "done", "risk_level": "high"}),
                json!({"worker": "stub", "action": "done", "risk_level": "safe"}),
            ],
            calls: AtomicUsize::new(0),
        });
        let orchestrator = Orchestrator::new(llm, registry(), memory(), None, policy, Mode::Cli, Arc::new(AlwaysApprove));

        let outcome = orchestrator.run("do something risky", false).await.unwrap();
        assert!(outcome.completed);
        assert_eq!(outcome.history.len(), 2);
        assert!(outcome.history[0].result.message.contains("Rejected"));
    }

    #[tokio::test]
    async fn test_approval_denied_does_not_dispatch() {
        let llm = Arc::new(ScriptedLlm {
            responses: vec![json!({"worker": "stub", "action": "done", "risk_level": "medium"})],
            calls: AtomicUsize::new(0),
        });
        let orchestrator = Orchestrator::new(llm, registry(), memory(), None, permissive_policy(), Mode::Cli, Arc::new(AlwaysDeny)).with_max_iterations(1);

        let outcome = orchestrator.run("do a medium risk thing", false).await.unwrap();
        assert!(!outcome.completed);
        assert!(outcome.history[0].result.message.contains("denied"));
    }

    #[tokio::test]
    async fn test_iteration_budget_exhausted_marks_incomplete() {
        let llm = Arc::new(ScriptedLlm {
            responses: vec![json!({"worker": "stub", "action": "nope", "risk_level": "safe"})],
            calls: AtomicUsize::new(0),
        });
        let orchestrator = Orchestrator::new(llm, registry(), memory(), None, permissive_policy(), Mode::Cli, Arc::new(AlwaysApprove)).with_max_iterations(2);

        let outcome = orchestrator.run("do something unsupported", false).await.unwrap();
        assert!(!outcome.completed);
        assert_eq!(outcome.history.len(), 2);
    }

    #[tokio::test]
    async fn test_dry_run_is_threaded_into_dispatch_args() {
        struct RecordingWorker {
            seen_dry_run: std::sync::Mutex<Option<bool>>,
        }

        #[async_trait]
        impl opsai_workers::Worker for RecordingWorker {
            fn name(&self) -> &str {
                "recorder"
            }
            fn capabilities(&self) -> &[&str] {
                &["go"]
            }
            fn describe(&self) -> Vec<String> {
                vec!["go(): records the dry_run flag it was given".to_string()]
            }
            async fn execute(&self, _action: &str, args: &std::collections::HashMap<String, ArgValue>) -> WorkerResult {
                *self.seen_dry_run.lock().unwrap() = args.get("dry_run").and_then(ArgValue::as_bool);
                WorkerResult::ok("recorded").completed()
            }
        }

        let worker = Arc::new(RecordingWorker { seen_dry_run: std::sync::Mutex::new(None) });
        let mut registry = WorkerRegistry::new();
        registry.register(worker.clone());

        let llm = Arc::new(ScriptedLlm {
            responses: vec![json!({"worker": "recorder", "action": "go", "risk_level": "safe"})],
            calls: AtomicUsize::new(0),
        });
        let orchestrator = Orchestrator::new(llm, registry, memory(), None, permissive_policy(), Mode::Cli, Arc::new(AlwaysApprove));

        orchestrator.run("do it for real, but dry", true).await.unwrap();
        assert_eq!(*worker.seen_dry_run.lock().unwrap(), Some(true));
    }

    #[test]
    fn test_memory_context_is_fetched_before_loop() {
        let mem = memory();
        mem.remember("os", "linux", MemoryCategory::Fact).unwrap();
        let context = mem.get_context_prompt(10).unwrap();
        assert!(context.contains("os"));
    }
}
