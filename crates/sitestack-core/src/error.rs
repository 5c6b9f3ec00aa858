use crate::lifecycle::LifecycleAction;
use serde::Serialize;
use sitestack_engine::{EngineError, GraphError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LifecycleError {
    #[error("invalid specification: {0}")]
    InvalidSpec(String),

    #[error("unknown action: {0}")]
    UnknownAction(String),

    #[error(transparent)]
    Graph(#[from] GraphError),

    /// The engine could not create or select the stack
    #[error("{source}")]
    Resolve { source: EngineError },

    /// Setting stack configuration failed
    #[error("{source}")]
    Config { source: EngineError },

    /// A lifecycle verb failed inside the engine
    #[error("{source}")]
    Operation {
        action: LifecycleAction,
        source: EngineError,
    },

    #[error("stack {stack} did not export a string output named {output}")]
    MissingOutput { stack: String, output: String },
}

/// Caller-facing error classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The request itself is wrong; retrying will not help
    Validation,
    /// The stack is busy or its state clashes with the request
    Conflict,
    /// The provisioning engine could not be reached
    UpstreamUnavailable,
    Internal,
}

impl ErrorKind {
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorKind::Conflict | ErrorKind::UpstreamUnavailable)
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::Validation => write!(f, "validation"),
            ErrorKind::Conflict => write!(f, "conflict"),
            ErrorKind::UpstreamUnavailable => write!(f, "upstream_unavailable"),
            ErrorKind::Internal => write!(f, "internal"),
        }
    }
}

impl LifecycleError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            LifecycleError::InvalidSpec(_)
            | LifecycleError::UnknownAction(_)
            | LifecycleError::Graph(_) => ErrorKind::Validation,
            LifecycleError::Resolve { source }
            | LifecycleError::Config { source }
            | LifecycleError::Operation { source, .. } => engine_kind(source),
            LifecycleError::MissingOutput { .. } => ErrorKind::Internal,
        }
    }
}

fn engine_kind(err: &EngineError) -> ErrorKind {
    match err {
        e if e.is_conflict() => ErrorKind::Conflict,
        e if e.is_unavailable() => ErrorKind::UpstreamUnavailable,
        EngineError::NoOperationInProgress(_) | EngineError::Canceled(_) => ErrorKind::Conflict,
        EngineError::Graph(_) => ErrorKind::Validation,
        _ => ErrorKind::Internal,
    }
}

pub type Result<T> = std::result::Result<T, LifecycleError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_errors_keep_their_description() {
        let err = LifecycleError::Operation {
            action: LifecycleAction::Cancel,
            source: EngineError::NoOperationInProgress("no update is in progress".to_string()),
        };
        assert_eq!(err.to_string(), "no update is in progress");
        assert_eq!(err.kind(), ErrorKind::Conflict);
    }

    #[test]
    fn test_error_kinds() {
        assert_eq!(
            LifecycleError::InvalidSpec("x".to_string()).kind(),
            ErrorKind::Validation
        );
        assert_eq!(
            LifecycleError::Resolve {
                source: EngineError::CommandNotFound("pulumi".to_string())
            }
            .kind(),
            ErrorKind::UpstreamUnavailable
        );
        assert_eq!(
            LifecycleError::Operation {
                action: LifecycleAction::Up,
                source: EngineError::ConcurrentUpdate("busy".to_string())
            }
            .kind(),
            ErrorKind::Conflict
        );
        assert_eq!(
            LifecycleError::Operation {
                action: LifecycleAction::Up,
                source: EngineError::CommandFailed("boom".to_string())
            }
            .kind(),
            ErrorKind::Internal
        );
        assert!(ErrorKind::Conflict.is_retryable());
        assert!(!ErrorKind::Validation.is_retryable());
    }
}
