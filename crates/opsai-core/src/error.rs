use std::path::PathBuf;

/// Fatal-category errors: the only ones that ever leave a worker boundary as
/// `Result::Err`. Everything below this line degrades to a `WorkerResult`
/// instead of propagating.
#[derive(thiserror::Error, Debug)]
pub enum OpsAiError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("journal index at {path} is corrupt: {reason}")]
    JournalCorrupt { path: PathBuf, reason: String },

    #[error("initialization failed: {0}")]
    Init(String),

    #[error("worker '{0}' is not registered")]
    WorkerNotFound(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_config() {
        let err = OpsAiError::Config("missing llm.api_key".into());
        assert_eq!(err.to_string(), "configuration error: missing llm.api_key");
    }

    #[test]
    fn test_display_journal_corrupt() {
        let err = OpsAiError::JournalCorrupt {
            path: PathBuf::from("/tmp/index.json"),
            reason: "unexpected EOF".into(),
        };
        assert!(err.to_string().contains("unexpected EOF"));
    }

    #[test]
    fn test_display_worker_not_found() {
        let err = OpsAiError::WorkerNotFound("teleport".into());
        assert_eq!(err.to_string(), "worker 'teleport' is not registered");
    }

    #[test]
    fn test_error_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<OpsAiError>();
    }
}
