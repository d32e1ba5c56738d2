use thiserror::Error;
use valvedesk_persist::PersistError;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("model invocation failed: {0}")]
    Model(#[source] anyhow::Error),

    #[error("model invocation timed out")]
    ModelTimeout,
}

#[derive(Error, Debug)]
pub enum OrchestratorError {
    /// Missing id or ownership mismatch, indistinguishable by design
    #[error("conversation not found: {0}")]
    ConversationNotFound(String),

    #[error(transparent)]
    Generation(#[from] EngineError),

    #[error(transparent)]
    Persist(#[from] PersistError),
}
