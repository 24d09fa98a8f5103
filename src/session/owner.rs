// File: src/session/owner.rs
use crate::error::{SyncError, WriteOp};
use crate::list::LiveList;
use crate::model::{Item, ItemId, StreamEvent};
use crate::remote::{ChangeStream, RemoteCollection};
use crate::session::message::{Command, Reply, SessionEvent};
use crate::session::{SessionContext, Snapshot};
use futures::StreamExt;
use log::{debug, info, warn};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;

/// An intent on an item whose insert has not been acknowledged yet.
#[derive(Debug)]
pub(crate) enum Parked {
    Toggle(Reply<bool>),
    Delete(Reply<()>),
}

/// Sole owner of a session's [`LiveList`]. Runs on one task and handles one
/// [`Command`] at a time.
pub(crate) struct Owner {
    pub(crate) context: SessionContext,
    pub(crate) list: LiveList,
    pub(crate) remote: Arc<dyn RemoteCollection>,
    pub(crate) queue: mpsc::WeakSender<Command>,
    pub(crate) view: watch::Sender<Snapshot>,
    pub(crate) events: broadcast::Sender<SessionEvent>,
    pub(crate) forwarder: Option<JoinHandle<()>>,
    // Held back until the item's insert resolves, in arrival order
    pub(crate) parked: HashMap<ItemId, Vec<Parked>>,
}

impl Owner {
    pub(crate) async fn run(mut self, mut rx: mpsc::Receiver<Command>) {
        while let Some(cmd) = rx.recv().await {
            if matches!(cmd, Command::Shutdown) {
                break;
            }
            let before = self.list.revision();
            self.handle(cmd);
            if self.list.revision() != before {
                self.publish();
            }
        }
        self.teardown().await;
    }

    fn handle(&mut self, cmd: Command) {
        match cmd {
            Command::Add { task, reply } => self.add(task, reply),
            Command::Toggle { id, reply } => self.toggle(id, reply),
            Command::Delete { id, reply } => self.delete(id, reply),

            Command::Inserted {
                token,
                result,
                reply,
            } => {
                let id = token.id();
                let outcome = match result {
                    Ok(()) => {
                        debug!("Insert of {} confirmed", id);
                        self.list.confirm(token);
                        Ok(id)
                    }
                    Err(e) => {
                        warn!("Error inserting item {}: {:#}", id, e);
                        self.list.rollback(token);
                        Err(SyncError::write_failed(WriteOp::Insert, e))
                    }
                };
                let _ = reply.send(outcome);
                self.release(id);
            }

            Command::Updated {
                id,
                previous,
                result,
                reply,
            } => {
                let outcome = match result {
                    Ok(()) => Ok(!previous),
                    Err(e) => {
                        warn!("Error updating item {}: {:#}", id, e);
                        self.list.restore_done(&id, previous);
                        Err(SyncError::write_failed(WriteOp::Update, e))
                    }
                };
                let _ = reply.send(outcome);
            }

            Command::Deleted { id, result, reply } => {
                let outcome = match result {
                    Ok(()) => {
                        self.list.remove_local(&id);
                        Ok(())
                    }
                    Err(e) => {
                        warn!("Could not delete {}: {:#}", id, e);
                        Err(SyncError::write_failed(WriteOp::Delete, e))
                    }
                };
                let _ = reply.send(outcome);
            }

            Command::Stream(event) => self.on_stream(event),

            Command::Shutdown => {}
        }
    }

    fn add(&mut self, task: String, reply: Reply<ItemId>) {
        let task = task.trim();
        if task.is_empty() {
            let _ = reply.send(Err(SyncError::InvalidTask));
            return;
        }

        let item = Item::new(&self.context.owner_id, task);
        let token = self.list.add_optimistic(item.clone());
        let remote = self.remote.clone();
        self.spawn_remote(async move {
            let result = remote.insert_one(&item).await;
            Command::Inserted {
                token,
                result,
                reply,
            }
        });
    }

    fn toggle(&mut self, id: ItemId, reply: Reply<bool>) {
        if self.awaiting_insert(&id) {
            debug!("Holding toggle of {} until its insert resolves", id);
            self.parked.entry(id).or_default().push(Parked::Toggle(reply));
            return;
        }
        let previous = match self.list.toggle_done(&id) {
            Ok(p) => p,
            Err(e) => {
                let _ = reply.send(Err(e));
                return;
            }
        };
        let Some(item) = self.list.get(&id).cloned() else {
            let _ = reply.send(Err(SyncError::NotFound(id)));
            return;
        };
        let remote = self.remote.clone();
        self.spawn_remote(async move {
            let result = remote.update_one(&item).await;
            Command::Updated {
                id,
                previous,
                result,
                reply,
            }
        });
    }

    fn delete(&mut self, id: ItemId, reply: Reply<()>) {
        if self.awaiting_insert(&id) {
            debug!("Holding delete of {} until its insert resolves", id);
            self.parked.entry(id).or_default().push(Parked::Delete(reply));
            return;
        }
        if !self.list.contains(&id) {
            let _ = reply.send(Err(SyncError::NotFound(id)));
            return;
        }
        let remote = self.remote.clone();
        self.spawn_remote(async move {
            let result = remote.delete_one(&id).await;
            Command::Deleted { id, result, reply }
        });
    }

    // A write racing the insert could reach the remote first and be undone by it
    fn awaiting_insert(&self, id: &ItemId) -> bool {
        self.list.is_pending(id) || self.parked.contains_key(id)
    }

    // Replays what was held back for `id`. A failed insert leaves nothing to
    // act on, so those intents come back as NotFound.
    fn release(&mut self, id: ItemId) {
        for intent in self.parked.remove(&id).unwrap_or_default() {
            match intent {
                Parked::Toggle(reply) => self.toggle(id, reply),
                Parked::Delete(reply) => self.delete(id, reply),
            }
        }
    }

    fn on_stream(&mut self, event: StreamEvent) {
        match event {
            StreamEvent::Opened => {
                debug!("Change stream open for {}", self.context.owner_id);
                self.notify(SessionEvent::StreamOpened);
            }
            StreamEvent::Change(change) => {
                debug!("Item refreshed: {:?}", change);
                self.list.apply_change_event(change);
            }
            StreamEvent::Error(e) => {
                warn!("Change stream error: {}", e);
                self.notify(SessionEvent::SubscriptionError(
                    SyncError::SubscriptionError(e),
                ));
            }
            StreamEvent::Closed => {
                info!("Change stream closed for {}", self.context.owner_id);
                self.notify(SessionEvent::StreamClosed);
            }
        }
    }

    // Runs remote I/O off the owner task and re-delivers its completion onto
    // the queue. If the session is gone by then the completion is dropped.
    fn spawn_remote<F>(&self, work: F)
    where
        F: Future<Output = Command> + Send + 'static,
    {
        let queue = self.queue.clone();
        tokio::spawn(async move {
            let done = work.await;
            match queue.upgrade() {
                Some(tx) => {
                    if tx.send(done).await.is_err() {
                        debug!("Session ended before completion arrived");
                    }
                }
                None => debug!("Session ended before completion arrived"),
            }
        });
    }

    fn publish(&self) {
        self.view.send_replace(Arc::new(self.list.snapshot()));
    }

    fn notify(&self, event: SessionEvent) {
        let _ = self.events.send(event);
    }

    async fn teardown(&mut self) {
        // Dropping the forwarder drops the stream, which closes the subscription
        if let Some(forwarder) = self.forwarder.take() {
            forwarder.abort();
            let _ = forwarder.await;
        }
        self.list = LiveList::new();
        self.view.send_replace(Arc::new(Vec::new()));
        info!("Session for {} ended", self.context.owner_id);
    }
}

/// Pumps the change stream into the owner queue until either side goes away.
pub(crate) fn spawn_forwarder(
    mut stream: ChangeStream,
    queue: mpsc::WeakSender<Command>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = stream.next().await {
            let Some(tx) = queue.upgrade() else {
                break;
            };
            if tx.send(Command::Stream(event)).await.is_err() {
                break;
            }
        }
        debug!("Change stream forwarder stopped");
    })
}
