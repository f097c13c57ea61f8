use std::sync::Arc;

use anyhow::Result;
use opsai_cache::AnalyzeTemplateCache;
use opsai_config::{OpsAiConfig, OpsAiPaths};
use opsai_deploy::DeployWorker;
use opsai_journal::ChangeJournal;
use opsai_llm::{ApiClient, LlmClient};
use opsai_memory::SessionMemory;
use opsai_orchestrator::Orchestrator;
use opsai_policy::{Mode, RiskPolicy};
use opsai_workers::{AnalyzeWorker, GitWorker, HttpWorker, LogAnalyzerWorker, ShellWorker, SystemWorker, WorkerRegistry};
use tracing::debug;

use crate::host::TerminalHost;

const HTTP_TIMEOUT_SECS: u64 = 30;

/// Everything a CLI subcommand needs: resolved paths, loaded config, and
/// the shared stdin/stdout host used by both the policy layer and the
/// deploy subsystem.
pub struct AppContext {
    pub paths: OpsAiPaths,
    pub config: OpsAiConfig,
    pub host: Arc<TerminalHost>,
}

impl AppContext {
    pub fn load() -> Result<Self> {
        let paths = OpsAiPaths::resolve();
        debug!(base_dir = %paths.base_dir().display(), "resolved opsai state directory");
        let config = OpsAiConfig::load(&paths)?;
        Ok(Self { paths, config, host: Arc::new(TerminalHost::new()) })
    }

    fn llm_client(&self) -> Result<Arc<dyn LlmClient>> {
        let llm = &self.config.llm;
        let client = ApiClient::new(llm.base_url.clone(), llm.api_key.clone(), &llm.model, llm.timeout, llm.max_tokens)?;
        Ok(Arc::new(client))
    }

    /// Builds the full worker registry (shell, system, git, http, analyze,
    /// log analyzer, deploy) backed by this context's journal and cache.
    pub fn build_registry(&self) -> Result<WorkerRegistry> {
        let llm = self.llm_client()?;
        let journal = ChangeJournal::new(self.paths.changes_dir());
        let cache = AnalyzeTemplateCache::new(self.paths.analyze_templates_path());

        let shell = Arc::new(ShellWorker::new(journal.clone()));
        let system = Arc::new(SystemWorker::new(journal));
        let git = Arc::new(GitWorker::new(shell.clone()));
        let http = Arc::new(HttpWorker::new(HTTP_TIMEOUT_SECS));
        let analyze = Arc::new(AnalyzeWorker::new(shell.clone(), cache, llm.clone()));
        let log_analyzer = Arc::new(LogAnalyzerWorker::new(shell.clone()));
        let deploy = Arc::new(DeployWorker::new(http.clone(), shell.clone(), llm, self.host.clone()));

        let mut registry = WorkerRegistry::new();
        registry.register(shell);
        registry.register(system);
        registry.register(git);
        registry.register(http);
        registry.register(analyze);
        registry.register(log_analyzer);
        registry.register(deploy);
        Ok(registry)
    }

    /// Builds one orchestrator instance for a single `query`/`template run`
    /// dispatch. A fresh instance per call keeps each run's history
    /// isolated, matching how the orchestrator is scoped to one request.
    pub fn build_orchestrator(&self, mode: Mode) -> Result<Orchestrator> {
        let llm = self.llm_client()?;
        let registry = self.build_registry()?;
        let memory = SessionMemory::new(self.paths.memory_path());
        let runbook_dir = self.paths.base_dir().join("runbooks");
        let runbooks = Some(opsai_orchestrator::RunbookLoader::new(runbook_dir));

        let policy = RiskPolicy {
            cli_max_risk: self.config.safety.cli_max_risk,
            tui_max_risk: self.config.safety.tui_max_risk,
            auto_approve_safe: self.config.safety.auto_approve_safe,
        };

        Ok(Orchestrator::new(llm, registry, memory, runbooks, policy, mode, self.host.clone()))
    }
}
