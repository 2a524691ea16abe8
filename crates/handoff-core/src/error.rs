//! Errors - エラー型と分類
//!
//! Every failure a caller can observe is one of the `HandoffError` variants.
//! Failures raised by a computation travel through the channel as data
//! (`TaskFailure`) and surface on the consumer side as
//! `HandoffError::ComputationFailure`.

use std::any::Any;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// How a computation failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureKind {
    /// The computation returned `Err(..)`.
    Error,

    /// The computation panicked; the panic was caught at the task boundary.
    Panic,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::Error => f.write_str("error"),
            FailureKind::Panic => f.write_str("panic"),
        }
    }
}

/// The failure payload carried through a channel.
///
/// Only the rendered message crosses the thread boundary, so the payload is
/// `Clone + Send + Sync` no matter what error type the computation used.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[error("{kind}: {message}")]
pub struct TaskFailure {
    kind: FailureKind,
    message: String,
}

impl TaskFailure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// A failure reported by the computation itself.
    pub fn error(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Error, message)
    }

    /// Build from anything displayable (typically the computation's `Err`).
    pub fn from_display(err: impl fmt::Display) -> Self {
        Self::error(err.to_string())
    }

    /// Build from a payload returned by `std::panic::catch_unwind`.
    pub fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&'static str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "non-string panic payload".to_string()
        };
        Self::new(FailureKind::Panic, message)
    }

    pub fn kind(&self) -> FailureKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HandoffError {
    /// The wrapped computation failed; the failure was relayed through the channel.
    #[error("computation failed: {0}")]
    ComputationFailure(TaskFailure),

    /// The producer was dropped without publishing anything.
    #[error("broken promise: producer dropped without publishing a result")]
    BrokenPromise,

    /// A set-once operation was attempted a second time.
    #[error("broken contract: {0}")]
    BrokenContract(&'static str),

    /// The result was already taken out of the channel.
    #[error("channel already consumed")]
    ChannelAlreadyConsumed,

    #[error("queue is closed")]
    QueueClosed,

    /// A bounded wait expired before an outcome arrived.
    #[error("timed out waiting for result")]
    TimedOut,

    #[error("worker {worker} panicked")]
    WorkerPanicked { worker: usize },

    /// The blocking-pool bridge used by async callers failed.
    #[error("blocking wait failed: {0}")]
    Blocking(String),
}

impl HandoffError {
    /// The computation's failure, if that is what this error carries.
    pub fn as_failure(&self) -> Option<&TaskFailure> {
        match self {
            HandoffError::ComputationFailure(failure) => Some(failure),
            _ => None,
        }
    }
}

impl From<TaskFailure> for HandoffError {
    fn from(failure: TaskFailure) -> Self {
        HandoffError::ComputationFailure(failure)
    }
}
