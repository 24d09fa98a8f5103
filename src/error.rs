// File: src/error.rs
use crate::model::ItemId;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOp {
    Insert,
    Update,
    Delete,
}

impl fmt::Display for WriteOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            WriteOp::Insert => "insert",
            WriteOp::Update => "update",
            WriteOp::Delete => "delete",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncError {
    /// The remote rejected a write. Any optimistic change was already undone.
    RemoteWriteFailed { op: WriteOp, reason: String },
    NotFound(ItemId),
    SubscriptionError(String),
    InitialLoadFailed(String),
    InvalidTask,
    SessionClosed,
}

impl SyncError {
    pub fn write_failed(op: WriteOp, e: anyhow::Error) -> Self {
        Self::RemoteWriteFailed {
            op,
            reason: format!("{:#}", e),
        }
    }

    /// Errors that only mean "already resolved" from the user's point of view.
    pub fn is_benign(&self) -> bool {
        matches!(self, SyncError::NotFound(_))
    }
}

impl fmt::Display for SyncError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncError::RemoteWriteFailed { op, reason } => {
                write!(f, "Remote {} failed: {}", op, reason)
            }
            SyncError::NotFound(id) => write!(f, "Item {} not found", id),
            SyncError::SubscriptionError(e) => write!(f, "Change stream error: {}", e),
            SyncError::InitialLoadFailed(e) => write!(f, "Initial load failed: {}", e),
            SyncError::InvalidTask => write!(f, "Task text must not be empty"),
            SyncError::SessionClosed => write!(f, "Session has ended"),
        }
    }
}

impl std::error::Error for SyncError {}
