//! Provisioning engine error types

use crate::graph::GraphError;
use thiserror::Error;

/// Provisioning engine errors
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("stack not found: {0}")]
    StackNotFound(String),

    #[error("resource conflict: {0}")]
    ResourceConflict(String),

    #[error("provider rejected the operation: {0}")]
    ProviderRejected(String),

    #[error("concurrent update: {0}")]
    ConcurrentUpdate(String),

    #[error("{0}")]
    NoOperationInProgress(String),

    #[error("operation canceled: {0}")]
    Canceled(String),

    #[error("{0} not found. Please install it and make sure it is on PATH")]
    CommandNotFound(String),

    #[error("command execution failed: {0}")]
    CommandFailed(String),

    #[error("state error: {0}")]
    StateError(String),

    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl EngineError {
    /// Another operation holds the stack, or the declared graph clashes with
    /// what the stack already records.
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            EngineError::ConcurrentUpdate(_) | EngineError::ResourceConflict(_)
        )
    }

    /// The engine itself could not be reached or started.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, EngineError::CommandNotFound(_) | EngineError::Io(_))
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
