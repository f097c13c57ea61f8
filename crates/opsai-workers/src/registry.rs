use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use opsai_core::{ArgValue, WorkerResult};

/// One named, stable capability surface. `execute` is the only entry point;
/// every action reachable through it honors the `dry_run` argument.
#[async_trait]
pub trait Worker: Send + Sync {
    fn name(&self) -> &str;

    fn capabilities(&self) -> &[&str];

    /// One-line `action(param: kind)` description per capability, in the
    /// same order as `capabilities()`, used to render the catalogue shown
    /// to the planning LLM.
    fn describe(&self) -> Vec<String>;

    async fn execute(&self, action: &str, args: &HashMap<String, ArgValue>) -> WorkerResult;
}

/// Extracts and normalizes the `dry_run` argument per the coercion policy:
/// boolean-like strings are accepted anywhere a bool is expected.
pub fn dry_run_flag(args: &HashMap<String, ArgValue>) -> bool {
    args.get("dry_run").and_then(ArgValue::as_bool).unwrap_or(false)
}

/// Name-keyed, discovery-free worker mapping populated once at startup.
#[derive(Clone, Default)]
pub struct WorkerRegistry {
    workers: HashMap<String, Arc<dyn Worker>>,
}

impl WorkerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, worker: Arc<dyn Worker>) {
        self.workers.insert(worker.name().to_string(), worker);
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Worker>> {
        self.workers.get(name)
    }

    pub async fn dispatch(&self, worker: &str, action: &str, args: &HashMap<String, ArgValue>) -> WorkerResult {
        match self.get(worker) {
            Some(worker) => worker.execute(action, args).await,
            None => WorkerResult::err(format!("Unknown worker: {worker}")),
        }
    }

    /// Renders the full `worker.action(param: kind)` catalogue shown to the
    /// planning LLM, one worker block per registered worker.
    pub fn catalogue(&self) -> String {
        let mut names: Vec<&String> = self.workers.keys().collect();
        names.sort();

        let mut blocks = Vec::with_capacity(names.len());
        for name in names {
            let worker = &self.workers[name];
            let lines = worker.describe().join("\n");
            blocks.push(format!("{name}:\n{lines}"));
        }
        blocks.join("\n\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StubWorker;

    #[async_trait]
    impl Worker for StubWorker {
        fn name(&self) -> &str {
            "stub"
        }

        fn capabilities(&self) -> &[&str] {
            &["ping"]
        }

        fn describe(&self) -> Vec<String> {
            vec!["ping(): returns pong".to_string()]
        }

        async fn execute(&self, action: &str, _args: &HashMap<String, ArgValue>) -> WorkerResult {
            match action {
                "ping" => WorkerResult::ok("pong"),
                other => WorkerResult::unknown_action(other),
            }
        }
    }

    #[tokio::test]
    async fn test_dispatch_routes_to_registered_worker() {
        let mut registry = WorkerRegistry::new();
        registry.register(Arc::new(StubWorker));

        let result = registry.dispatch("stub", "ping", &HashMap::new()).await;
        assert!(result.success);
        assert_eq!(result.message, "pong");
    }

    #[tokio::test]
    async fn test_dispatch_unknown_worker() {
        let registry = WorkerRegistry::new();
        let result = registry.dispatch("ghost", "ping", &HashMap::new()).await;
        assert!(!result.success);
        assert!(result.message.contains("Unknown worker"));
    }

    #[test]
    fn test_dry_run_flag_accepts_string_booleans() {
        let mut args = HashMap::new();
        args.insert("dry_run".to_string(), ArgValue::String("TRUE".to_string()));
        assert!(dry_run_flag(&args));
    }

    #[test]
    fn test_dry_run_flag_defaults_false() {
        assert!(!dry_run_flag(&HashMap::new()));
    }

    #[test]
    fn test_catalogue_lists_registered_worker() {
        let mut registry = WorkerRegistry::new();
        registry.register(Arc::new(StubWorker));
        assert!(registry.catalogue().contains("stub:"));
        assert!(registry.catalogue().contains("ping()"));
    }
}
