use thiserror::Error;

use crate::seal::SealStatus;

/// Errors from storage port operations (used by trait definitions in courier-core).
#[derive(Debug, Clone, Error)]
pub enum RepositoryError {
    #[error("database connection error")]
    Connection,

    #[error("query error: {0}")]
    Query(String),

    #[error("entity not found")]
    NotFound,

    #[error("conflict: {0}")]
    Conflict(String),
}

/// Malformed enqueue input. Rejected synchronously, never queued.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("missing required field \"{0}\"")]
    MissingField(String),

    #[error("invalid field \"{field}\": {reason}")]
    InvalidField { field: String, reason: String },

    #[error("object may not have undefined for any nested values (at {0})")]
    UndefinedValue(String),
}

/// Failures reported by the transport collaborator.
///
/// The first three are permanent for the message in question; only
/// `Transient` is worth retrying.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("duplicate: {0}")]
    Duplicate(String),

    #[error("unknown user: {0}")]
    UnknownUser(String),

    #[error("transport failure: {0}")]
    Transient(String),
}

/// Failures reported by the ledger collaborator when submitting a seal.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LedgerError {
    /// The ledger will never accept this submission.
    #[error("seal rejected: {0}")]
    Rejected(String),

    #[error("ledger failure: {0}")]
    Transient(String),
}

/// A hook handler failed.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{event} hook failed: {message}")]
pub struct HookError {
    pub event: String,
    pub message: String,
}

impl HookError {
    pub fn new(event: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            event: event.into(),
            message: message.into(),
        }
    }
}

/// What a queue worker returns when processing an item fails.
#[derive(Debug, Clone, Error)]
pub enum ProcessError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    /// Handler or strategy bug. Always stalls the lane; never retried.
    #[error("developer error: {0}")]
    Developer(String),

    /// The lane's user record no longer exists.
    #[error("unknown user: {0}")]
    UnknownUser(String),

    #[error("storage error: {0}")]
    Storage(#[from] RepositoryError),
}

impl From<HookError> for ProcessError {
    fn from(err: HookError) -> Self {
        ProcessError::Developer(err.to_string())
    }
}

/// Errors surfaced by the durable queue engine.
#[derive(Debug, Clone, Error)]
pub enum QueueError {
    #[error("queue storage error: {0}")]
    Storage(#[from] RepositoryError),

    #[error("payload serialization error: {0}")]
    Serialization(String),

    /// The item failed permanently and its lane is halted until restart.
    #[error("queue '{queue}' stalled on key '{key}': {reason}")]
    Stalled {
        queue: String,
        key: String,
        reason: String,
    },

    /// The lane was cleared before the item completed.
    #[error("queue '{queue}' lane '{key}' was cleared")]
    Purged { queue: String, key: String },

    #[error("queue '{0}' shut down")]
    ShutDown(String),
}

/// Errors from the seal state machine.
#[derive(Debug, Clone, Error)]
pub enum SealError {
    /// The message contains "already exists" so callers can pattern-match it.
    #[error("seal for link '{0}' already exists")]
    AlreadyExists(String),

    #[error("seal for link '{0}' not found")]
    NotFound(String),

    #[error("invalid link: {0}")]
    InvalidLink(String),

    #[error("seal for link '{link}' cannot move from {from} to {to}")]
    InvalidTransition {
        link: String,
        from: SealStatus,
        to: SealStatus,
    },

    #[error("seal for link '{link}' has tx '{expected}', got '{actual}'")]
    TxMismatch {
        link: String,
        expected: String,
        actual: String,
    },

    #[error(transparent)]
    Hook(#[from] HookError),

    #[error("storage error: {0}")]
    Storage(#[from] RepositoryError),

    #[error(transparent)]
    Queue(#[from] QueueError),
}

/// Errors returned by the runtime facade.
#[derive(Debug, Clone, Error)]
pub enum BotError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("storage error: {0}")]
    Storage(#[from] RepositoryError),

    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error(transparent)]
    Seal(#[from] SealError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_seal_message_mentions_already_exists() {
        let err = SealError::AlreadyExists("abc".to_string());
        assert!(err.to_string().contains("already exists"));
    }

    #[test]
    fn test_validation_error_display() {
        let err = ValidationError::MissingField("author".to_string());
        assert_eq!(err.to_string(), "missing required field \"author\"");
    }

    #[test]
    fn test_hook_error_becomes_developer_error() {
        let err: ProcessError = HookError::new("receive", "boom").into();
        match err {
            ProcessError::Developer(msg) => assert_eq!(msg, "receive hook failed: boom"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_invalid_transition_display() {
        let err = SealError::InvalidTransition {
            link: "l".to_string(),
            from: SealStatus::Pushed,
            to: SealStatus::Confirmed,
        };
        assert_eq!(
            err.to_string(),
            "seal for link 'l' cannot move from pushed to confirmed"
        );
    }

    #[test]
    fn test_repository_error_display() {
        let err = RepositoryError::Query("syntax error".to_string());
        assert_eq!(err.to_string(), "query error: syntax error");
    }
}
