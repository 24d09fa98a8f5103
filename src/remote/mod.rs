// File: src/remote/mod.rs
use crate::model::{Filter, Item, ItemId, StreamEvent};
use async_trait::async_trait;
use futures::stream::BoxStream;

pub mod file;
pub mod memory;

pub use file::FileCollection;
pub use memory::MemoryCollection;

/// Live change feed. Dropping it closes the subscription.
pub type ChangeStream = BoxStream<'static, StreamEvent>;

/// CRUD + watch access to a document collection.
///
/// Implementations own transport concerns (retries, reconnects). A session
/// only sees the outcome of each call and the events of the stream.
#[async_trait]
pub trait RemoteCollection: Send + Sync {
    async fn find(&self, filter: &Filter) -> anyhow::Result<Vec<Item>>;

    async fn insert_one(&self, item: &Item) -> anyhow::Result<()>;

    /// Replaces the stored document with the same id.
    async fn update_one(&self, item: &Item) -> anyhow::Result<()>;

    async fn delete_one(&self, id: &ItemId) -> anyhow::Result<()>;

    /// Starts watching. Changes made after this returns are never missed,
    /// even if the stream is not polled right away.
    async fn subscribe(&self, filter: &Filter) -> anyhow::Result<ChangeStream>;
}
