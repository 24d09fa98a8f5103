// File: src/model/mod.rs
pub mod adapter;
pub mod item;

pub use item::{ChangeEvent, Filter, Item, ItemId, StreamEvent};
