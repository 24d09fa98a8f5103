// File: src/remote/memory.rs
use crate::model::{ChangeEvent, Filter, Item, ItemId, StreamEvent};
use crate::remote::{ChangeStream, RemoteCollection};
use anyhow::{anyhow, bail};
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;

const FEED_CAPACITY: usize = 256;

pub(crate) type Persist = Box<dyn Fn(&[Item]) -> anyhow::Result<()> + Send + Sync>;

#[derive(Debug, Clone)]
enum Feed {
    Change { owner_id: String, event: ChangeEvent },
    Error(String),
    Close,
}

#[derive(Debug, Default)]
struct Faults {
    find: Option<String>,
    insert: Option<String>,
    update: Option<String>,
    delete: Option<String>,
}

struct Inner {
    docs: Mutex<Vec<Item>>,
    faults: Mutex<Faults>,
    latency: Mutex<Option<Duration>>,
    feed: broadcast::Sender<Feed>,
    persist: Option<Persist>,
}

/// In-process collection shared by every clone. Writes from any clone are
/// echoed to all subscribers whose filter matches.
#[derive(Clone)]
pub struct MemoryCollection {
    inner: Arc<Inner>,
}

impl Default for MemoryCollection {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MemoryCollection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryCollection")
            .field("len", &self.len())
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

impl MemoryCollection {
    pub fn new() -> Self {
        Self::with_items(Vec::new())
    }

    pub fn with_items(items: Vec<Item>) -> Self {
        Self::build(items, None)
    }

    pub(crate) fn build(items: Vec<Item>, persist: Option<Persist>) -> Self {
        let (feed, _) = broadcast::channel(FEED_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                docs: Mutex::new(items),
                faults: Mutex::new(Faults::default()),
                latency: Mutex::new(None),
                feed,
                persist,
            }),
        }
    }

    pub fn items(&self) -> Vec<Item> {
        self.docs().clone()
    }

    pub fn len(&self) -> usize {
        self.docs().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of open change streams.
    pub fn subscriber_count(&self) -> usize {
        self.inner.feed.receiver_count()
    }

    pub fn fail_next_find(&self, reason: &str) {
        self.faults().find = Some(reason.to_string());
    }

    pub fn fail_next_insert(&self, reason: &str) {
        self.faults().insert = Some(reason.to_string());
    }

    pub fn fail_next_update(&self, reason: &str) {
        self.faults().update = Some(reason.to_string());
    }

    pub fn fail_next_delete(&self, reason: &str) {
        self.faults().delete = Some(reason.to_string());
    }

    /// Delays every call, to let other events overtake a write.
    pub fn set_latency(&self, latency: Option<Duration>) {
        *self.inner.latency.lock().unwrap_or_else(|e| e.into_inner()) = latency;
    }

    pub fn inject_stream_error(&self, reason: &str) {
        let _ = self.inner.feed.send(Feed::Error(reason.to_string()));
    }

    /// Ends every open stream, as a server hang-up would.
    pub fn close_streams(&self) {
        let _ = self.inner.feed.send(Feed::Close);
    }

    fn docs(&self) -> std::sync::MutexGuard<'_, Vec<Item>> {
        self.inner.docs.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn faults(&self) -> std::sync::MutexGuard<'_, Faults> {
        self.inner.faults.lock().unwrap_or_else(|e| e.into_inner())
    }

    async fn simulate_latency(&self) {
        let latency = *self.inner.latency.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(d) = latency {
            tokio::time::sleep(d).await;
        }
    }

    // Applies `change` to a copy, persists it, then commits and broadcasts.
    fn commit<F>(&self, event: ChangeEvent, owner_id: String, change: F) -> anyhow::Result<()>
    where
        F: FnOnce(&mut Vec<Item>) -> anyhow::Result<()>,
    {
        let mut docs = self.docs();
        let mut next = docs.clone();
        change(&mut next)?;
        if let Some(persist) = &self.inner.persist {
            persist(&next)?;
        }
        *docs = next;
        drop(docs);

        log::debug!("Broadcasting change for {}", event.id());
        let _ = self.inner.feed.send(Feed::Change { owner_id, event });
        Ok(())
    }
}

#[async_trait]
impl RemoteCollection for MemoryCollection {
    async fn find(&self, filter: &Filter) -> anyhow::Result<Vec<Item>> {
        self.simulate_latency().await;
        if let Some(reason) = self.faults().find.take() {
            bail!(reason);
        }
        Ok(self
            .docs()
            .iter()
            .filter(|i| filter.matches(i))
            .cloned()
            .collect())
    }

    async fn insert_one(&self, item: &Item) -> anyhow::Result<()> {
        self.simulate_latency().await;
        if let Some(reason) = self.faults().insert.take() {
            bail!(reason);
        }
        let doc = item.clone();
        self.commit(
            ChangeEvent::Upsert(item.clone()),
            item.owner_id.clone(),
            |docs| {
                if docs.iter().any(|d| d.id == doc.id) {
                    bail!("Duplicate key {}", doc.id);
                }
                docs.push(doc);
                Ok(())
            },
        )
    }

    async fn update_one(&self, item: &Item) -> anyhow::Result<()> {
        self.simulate_latency().await;
        if let Some(reason) = self.faults().update.take() {
            bail!(reason);
        }
        let doc = item.clone();
        self.commit(
            ChangeEvent::Upsert(item.clone()),
            item.owner_id.clone(),
            |docs| {
                let slot = docs
                    .iter_mut()
                    .find(|d| d.id == doc.id)
                    .ok_or_else(|| anyhow!("No document matches {}", doc.id))?;
                *slot = doc;
                Ok(())
            },
        )
    }

    async fn delete_one(&self, id: &ItemId) -> anyhow::Result<()> {
        self.simulate_latency().await;
        if let Some(reason) = self.faults().delete.take() {
            bail!(reason);
        }
        let owner_id = match self.docs().iter().find(|d| d.id == *id) {
            Some(d) => d.owner_id.clone(),
            // Nothing matched: deleting is already done, and there is nothing to announce
            None => return Ok(()),
        };
        let id = *id;
        self.commit(ChangeEvent::Delete(id), owner_id, |docs| {
            docs.retain(|d| d.id != id);
            Ok(())
        })
    }

    async fn subscribe(&self, filter: &Filter) -> anyhow::Result<ChangeStream> {
        // Registered before returning so nothing committed afterwards is lost
        let rx = self.inner.feed.subscribe();
        let filter = filter.clone();

        let live = stream::unfold((rx, filter), |(mut rx, filter)| async move {
            loop {
                match rx.recv().await {
                    Ok(Feed::Change { owner_id, event }) => {
                        if owner_id == filter.owner_id {
                            return Some((StreamEvent::Change(event), (rx, filter)));
                        }
                    }
                    Ok(Feed::Error(e)) => return Some((StreamEvent::Error(e), (rx, filter))),
                    Err(RecvError::Lagged(n)) => {
                        let msg = format!("Change feed lagged, {} events dropped", n);
                        return Some((StreamEvent::Error(msg), (rx, filter)));
                    }
                    Ok(Feed::Close) | Err(RecvError::Closed) => return None,
                }
            }
        });

        Ok(stream::once(async { StreamEvent::Opened })
            .chain(live)
            .chain(stream::once(async { StreamEvent::Closed }))
            .boxed())
    }
}
