use async_trait::async_trait;

/// Capability bundle the deploy subsystem depends on instead of mutable
/// callback setters: progress reporting, destructive-action confirmation,
/// and user choice resolution, injected once at construction and passed by
/// value along the planner/executor/diagnoser chain.
#[async_trait]
pub trait DeployHost: Send + Sync {
    /// Report a human-readable progress line for one step of the deploy.
    fn progress(&self, step: &str, message: &str);

    /// Ask for approval before running a destructive command or writing a
    /// file. `detail` is the command or a truncated content preview.
    async fn confirm(&self, action: &str, detail: &str) -> bool;

    /// Present a question with a closed set of options; returns the user's
    /// choice verbatim.
    async fn ask_user(&self, question: &str, options: &[String], context: &str) -> String;
}

/// Capability the ReAct orchestrator depends on for risk-gated instructions
/// that require approval before dispatch.
#[async_trait]
pub trait ApprovalHost: Send + Sync {
    async fn approve(&self, worker: &str, action: &str, risk_level: &str) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct AlwaysApprove {
        confirm_calls: AtomicUsize,
    }

    #[async_trait]
    impl DeployHost for AlwaysApprove {
        fn progress(&self, _step: &str, _message: &str) {}

        async fn confirm(&self, _action: &str, _detail: &str) -> bool {
            self.confirm_calls.fetch_add(1, Ordering::SeqCst);
            true
        }

        async fn ask_user(&self, _question: &str, options: &[String], _context: &str) -> String {
            options.first().cloned().unwrap_or_default()
        }
    }

    #[tokio::test]
    async fn test_confirm_counts_calls() {
        let host = AlwaysApprove {
            confirm_calls: AtomicUsize::new(0),
        };
        assert!(host.confirm("execute command", "docker rm -f web").await);
        assert_eq!(host.confirm_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_ask_user_returns_first_option() {
        let host = AlwaysApprove {
            confirm_calls: AtomicUsize::new(0),
        };
        let choice = host
            .ask_user("continue?", &["yes".to_string(), "no".to_string()], "")
            .await;
        assert_eq!(choice, "yes");
    }
}
