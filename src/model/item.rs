// File: src/model/item.rs
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Client-assigned identity of a to-do item. Never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(Uuid);

impl ItemId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ItemId {
    fn default() -> Self {
        Self::new()
    }
}

impl FromStr for ItemId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim()).map(Self)
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub id: ItemId,
    pub owner_id: String,
    pub task: String,
    pub done: bool,
}

impl Item {
    /// Builds a fresh, not-yet-done item with a newly assigned id.
    pub fn new(owner_id: &str, task: &str) -> Self {
        Self {
            id: ItemId::new(),
            owner_id: owner_id.to_string(),
            task: task.trim().to_string(),
            done: false,
        }
    }
}

/// Selects the items a session mirrors.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Filter {
    pub owner_id: String,
}

impl Filter {
    pub fn owner(owner_id: &str) -> Self {
        Self {
            owner_id: owner_id.to_string(),
        }
    }

    pub fn matches(&self, item: &Item) -> bool {
        item.owner_id == self.owner_id
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeEvent {
    Upsert(Item),
    Delete(ItemId),
}

impl ChangeEvent {
    pub fn id(&self) -> ItemId {
        match self {
            ChangeEvent::Upsert(item) => item.id,
            ChangeEvent::Delete(id) => *id,
        }
    }
}

/// What a live subscription yields over its lifetime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    Opened,
    Change(ChangeEvent),
    Error(String),
    Closed,
}
