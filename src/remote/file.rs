// File: src/remote/file.rs
use crate::model::adapter::items_from_documents;
use crate::model::{Filter, Item, ItemId};
use crate::remote::memory::MemoryCollection;
use crate::remote::{ChangeStream, RemoteCollection};
use anyhow::Context;
use async_trait::async_trait;
use fs2::FileExt;
use serde_json::Value;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// A collection kept in a JSON file, for offline use.
///
/// A handle owns the file exclusively for as long as any clone of it is
/// alive; a second `open` of the same path fails instead of letting two
/// writers overwrite each other. Reads are served from memory; each
/// successful write rewrites the file before it is acknowledged or echoed
/// to subscribers.
#[derive(Clone, Debug)]
pub struct FileCollection {
    inner: MemoryCollection,
    _lock: Arc<File>,
}

impl FileCollection {
    pub fn open(path: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let path = path.into();
        let lock = Arc::new(acquire(&path)?);
        let items = load(&path)?;
        log::info!("Opened {} ({} documents)", path.display(), items.len());

        let held = lock.clone();
        let inner = MemoryCollection::build(
            items,
            Some(Box::new(move |docs: &[Item]| {
                let _held = &held;
                save(&path, docs)
            })),
        );
        Ok(Self { inner, _lock: lock })
    }

    #[cfg(test)]
    fn memory(&self) -> &MemoryCollection {
        &self.inner
    }
}

#[async_trait]
impl RemoteCollection for FileCollection {
    async fn find(&self, filter: &Filter) -> anyhow::Result<Vec<Item>> {
        self.inner.find(filter).await
    }

    async fn insert_one(&self, item: &Item) -> anyhow::Result<()> {
        self.inner.insert_one(item).await
    }

    async fn update_one(&self, item: &Item) -> anyhow::Result<()> {
        self.inner.update_one(item).await
    }

    async fn delete_one(&self, id: &ItemId) -> anyhow::Result<()> {
        self.inner.delete_one(id).await
    }

    async fn subscribe(&self, filter: &Filter) -> anyhow::Result<ChangeStream> {
        self.inner.subscribe(filter).await
    }
}

fn lock_path(path: &Path) -> PathBuf {
    path.with_extension("lock")
}

// Released when the returned file is closed.
fn acquire(path: &Path) -> anyhow::Result<File> {
    if let Some(dir) = path.parent()
        && !dir.as_os_str().is_empty()
    {
        fs::create_dir_all(dir)?;
    }
    let lock = OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(lock_path(path))?;
    lock.try_lock_exclusive()
        .with_context(|| format!("{} is already open elsewhere", path.display()))?;
    Ok(lock)
}

fn load(path: &Path) -> anyhow::Result<Vec<Item>> {
    if !path.exists() {
        return Ok(vec![]);
    }
    let raw =
        fs::read_to_string(path).with_context(|| format!("Opening {}", path.display()))?;
    if raw.trim().is_empty() {
        return Ok(vec![]);
    }
    let docs: Vec<Value> =
        serde_json::from_str(&raw).with_context(|| format!("Parsing {}", path.display()))?;
    Ok(items_from_documents(&docs))
}

fn save(path: &Path, items: &[Item]) -> anyhow::Result<()> {
    let docs: Vec<Value> = items.iter().map(Item::to_document).collect();
    let json = serde_json::to_string_pretty(&docs)?;

    let tmp = path.with_extension("tmp");
    let result = (|| -> anyhow::Result<()> {
        let mut file = File::create(&tmp)?;
        file.write_all(json.as_bytes())?;
        file.sync_all()?;
        fs::rename(&tmp, path)?;
        Ok(())
    })();
    result.with_context(|| format!("Writing {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[tokio::test]
    async fn writes_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("items.json");

        let coll = FileCollection::open(&path).unwrap();
        let mut keep = Item::new("alice", "keep");
        let drop_me = Item::new("alice", "drop");
        coll.insert_one(&keep).await.unwrap();
        coll.insert_one(&drop_me).await.unwrap();
        keep.done = true;
        coll.update_one(&keep).await.unwrap();
        coll.delete_one(&drop_me.id).await.unwrap();
        drop(coll);

        let reopened = FileCollection::open(&path).unwrap();
        let found = reopened.find(&Filter::owner("alice")).await.unwrap();
        assert_eq!(found, vec![keep]);
    }

    #[tokio::test]
    async fn second_handle_is_refused_while_first_is_open() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("items.json");

        let first = FileCollection::open(&path).unwrap();
        let clone = first.clone();
        assert!(FileCollection::open(&path).is_err());

        let a = Item::new("alice", "from a");
        first.insert_one(&a).await.unwrap();
        drop(first);
        // Clones share the lock
        assert!(FileCollection::open(&path).is_err());
        drop(clone);

        let again = FileCollection::open(&path).unwrap();
        let found = again.find(&Filter::owner("alice")).await.unwrap();
        assert_eq!(found, vec![a]);
    }

    #[tokio::test]
    async fn missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let coll = FileCollection::open(dir.path().join("nested/items.json")).unwrap();
        assert!(coll.memory().is_empty());
    }

    #[tokio::test]
    async fn failed_persist_is_not_echoed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("items.json");
        let coll = FileCollection::open(&path).unwrap();
        let mut stream = coll.subscribe(&Filter::owner("alice")).await.unwrap();
        assert_eq!(stream.next().await, Some(crate::model::StreamEvent::Opened));

        // A directory where the file should be makes the rename fail
        fs::create_dir_all(&path).unwrap();
        let item = Item::new("alice", "lost");
        assert!(coll.insert_one(&item).await.is_err());
        assert!(coll.memory().is_empty());

        coll.memory().close_streams();
        assert_eq!(stream.next().await, Some(crate::model::StreamEvent::Closed));
    }
}
