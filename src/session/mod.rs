// File: src/session/mod.rs
//! A logged-in user's live view of their items.
//!
//! [`Session::start`] subscribes, fetches, and then hands the list to a
//! single owner task. Everything that touches the list (user intents,
//! remote completions, change events) is funneled through that task's
//! queue, so operations never interleave.

use crate::error::SyncError;
use crate::list::LiveList;
use crate::model::{Filter, Item, ItemId};
use crate::remote::RemoteCollection;
use log::{info, warn};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;

mod message;
mod owner;

pub use message::SessionEvent;
use message::{Command, Reply};
use owner::{Owner, spawn_forwarder};

const QUEUE_DEPTH: usize = 128;
const EVENT_BACKLOG: usize = 32;

/// Ordered items as last published by the owner.
pub type Snapshot = Arc<Vec<Item>>;

/// Who is logged in. Created at login, dropped at logout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionContext {
    pub owner_id: String,
}

impl SessionContext {
    pub fn new(owner_id: &str) -> Self {
        Self {
            owner_id: owner_id.to_string(),
        }
    }

    pub fn filter(&self) -> Filter {
        Filter::owner(&self.owner_id)
    }
}

pub struct Session {
    context: SessionContext,
    remote: Arc<dyn RemoteCollection>,
}

impl Session {
    pub fn new(context: SessionContext, remote: Arc<dyn RemoteCollection>) -> Self {
        Self { context, remote }
    }

    /// Opens the change stream, loads the current items, and starts the owner.
    ///
    /// The stream is opened first so that nothing written between the fetch
    /// and the first poll is missed; those early events are replayed on top
    /// of the fetched list, which the idempotent merge tolerates. If the
    /// fetch fails the stream is closed again and no session exists.
    pub async fn start(self) -> Result<SessionHandle, SyncError> {
        let filter = self.context.filter();
        info!("Watching changes for user {}", self.context.owner_id);

        let stream = self
            .remote
            .subscribe(&filter)
            .await
            .map_err(|e| SyncError::SubscriptionError(format!("{:#}", e)))?;

        let items = match self.remote.find(&filter).await {
            Ok(items) => items,
            Err(e) => {
                warn!("Initial load for {} failed: {:#}", self.context.owner_id, e);
                drop(stream);
                return Err(SyncError::InitialLoadFailed(format!("{:#}", e)));
            }
        };
        info!("Loaded {} items for {}", items.len(), self.context.owner_id);

        let mut list = LiveList::new();
        list.initialize(items);

        let (tx, rx) = mpsc::channel(QUEUE_DEPTH);
        let (view, view_rx) = watch::channel(Arc::new(list.snapshot()));
        let (events, _) = broadcast::channel(EVENT_BACKLOG);

        let forwarder = spawn_forwarder(stream, tx.downgrade());
        let owner = Owner {
            context: self.context.clone(),
            list,
            remote: self.remote,
            queue: tx.downgrade(),
            view,
            events: events.clone(),
            forwarder: Some(forwarder),
            parked: HashMap::new(),
        };
        let task = tokio::spawn(owner.run(rx));

        Ok(SessionHandle {
            context: self.context,
            tx,
            view: view_rx,
            events,
            task: Some(task),
        })
    }
}

/// What the presentation layer holds on to.
///
/// Intents resolve once the remote outcome has been reconciled, so a failed
/// write has already been rolled back by the time its error is returned.
#[derive(Debug)]
pub struct SessionHandle {
    context: SessionContext,
    tx: mpsc::Sender<Command>,
    view: watch::Receiver<Snapshot>,
    events: broadcast::Sender<SessionEvent>,
    task: Option<JoinHandle<()>>,
}

impl SessionHandle {
    pub fn context(&self) -> &SessionContext {
        &self.context
    }

    pub fn snapshot(&self) -> Snapshot {
        self.view.borrow().clone()
    }

    /// Receiver that wakes on every refresh.
    pub fn watch(&self) -> watch::Receiver<Snapshot> {
        self.view.clone()
    }

    pub fn events(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub async fn add(&self, task: &str) -> Result<ItemId, SyncError> {
        let task = task.to_string();
        self.request(|reply| Command::Add { task, reply }).await
    }

    /// Flips the done flag and returns the new value.
    pub async fn toggle(&self, id: ItemId) -> Result<bool, SyncError> {
        self.request(|reply| Command::Toggle { id, reply }).await
    }

    pub async fn delete(&self, id: ItemId) -> Result<(), SyncError> {
        self.request(|reply| Command::Delete { id, reply }).await
    }

    /// Stops the owner, closes the change stream, and clears the published
    /// list. Remote calls still in flight complete against the remote, but
    /// their results are discarded.
    pub async fn end(mut self) {
        let _ = self.tx.send(Command::Shutdown).await;
        if let Some(task) = self.task.take()
            && let Err(e) = task.await
        {
            warn!("Session task for {} failed: {}", self.context.owner_id, e);
        }
    }

    async fn request<T, F>(&self, make: F) -> Result<T, SyncError>
    where
        F: FnOnce(Reply<T>) -> Command,
    {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(make(reply))
            .await
            .map_err(|_| SyncError::SessionClosed)?;
        rx.await.unwrap_or(Err(SyncError::SessionClosed))
    }
}
