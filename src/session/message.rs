// File: src/session/message.rs
use crate::error::SyncError;
use crate::list::RollbackToken;
use crate::model::{ItemId, StreamEvent};
use tokio::sync::oneshot;

pub(crate) type Reply<T> = oneshot::Sender<Result<T, SyncError>>;

/// Everything the session owner reacts to, in arrival order.
#[derive(Debug)]
pub(crate) enum Command {
    // Presentation intents
    Add { task: String, reply: Reply<ItemId> },
    Toggle { id: ItemId, reply: Reply<bool> },
    Delete { id: ItemId, reply: Reply<()> },

    // Remote completions
    Inserted {
        token: RollbackToken,
        result: anyhow::Result<()>,
        reply: Reply<ItemId>,
    },
    Updated {
        id: ItemId,
        previous: bool,
        result: anyhow::Result<()>,
        reply: Reply<bool>,
    },
    Deleted {
        id: ItemId,
        result: anyhow::Result<()>,
        reply: Reply<()>,
    },

    Stream(StreamEvent),

    // Lifecycle
    Shutdown,
}

/// Notices for whoever owns the session (reconnect / re-login policy).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    StreamOpened,
    StreamClosed,
    SubscriptionError(SyncError),
}
