// File: src/list.rs
//! The local mirror of a remote, filtered collection.
//!
//! Items are keyed by id, with a separate sequence index giving the order
//! they were first seen in. Every mutation that changes what a viewer would
//! see bumps [`LiveList::revision`] exactly once.

use crate::error::SyncError;
use crate::model::{ChangeEvent, Item, ItemId};
use std::collections::{BTreeMap, HashMap};

#[derive(Debug)]
struct Entry {
    seq: u64,
    item: Item,
    // Serial of the optimistic add still waiting for its echo
    pending: Option<u64>,
}

/// Proof of an optimistic add. Redeemable once with [`LiveList::rollback`].
#[derive(Debug, PartialEq, Eq)]
#[must_use = "dropping the token makes the optimistic add impossible to undo"]
pub struct RollbackToken {
    id: ItemId,
    serial: u64,
}

impl RollbackToken {
    pub fn id(&self) -> ItemId {
        self.id
    }
}

#[derive(Debug, Default)]
pub struct LiveList {
    entries: HashMap<ItemId, Entry>,
    order: BTreeMap<u64, ItemId>,
    next_seq: u64,
    next_serial: u64,
    revision: u64,
}

impl LiveList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the whole list with the result of the initial fetch.
    pub fn initialize(&mut self, items: Vec<Item>) {
        self.entries.clear();
        self.order.clear();
        for item in items {
            self.upsert(item, None);
        }
        self.touch();
    }

    pub fn add_optimistic(&mut self, item: Item) -> RollbackToken {
        self.next_serial += 1;
        let token = RollbackToken {
            id: item.id,
            serial: self.next_serial,
        };
        self.upsert(item, Some(token.serial));
        self.touch();
        token
    }

    /// Undoes an optimistic add, unless the change stream already confirmed
    /// the item or it is gone. Returns whether anything was removed.
    pub fn rollback(&mut self, token: RollbackToken) -> bool {
        let still_pending = self
            .entries
            .get(&token.id)
            .is_some_and(|e| e.pending == Some(token.serial));

        if still_pending {
            self.remove_entry(&token.id);
            self.touch();
        }
        still_pending
    }

    /// Marks an optimistic add as stored remotely, without waiting for its echo.
    pub fn confirm(&mut self, token: RollbackToken) {
        if let Some(entry) = self.entries.get_mut(&token.id)
            && entry.pending == Some(token.serial)
        {
            entry.pending = None;
        }
    }

    /// Flips the done flag and returns the value it had before.
    pub fn toggle_done(&mut self, id: &ItemId) -> Result<bool, SyncError> {
        let entry = self.entries.get_mut(id).ok_or(SyncError::NotFound(*id))?;
        let previous = entry.item.done;
        entry.item.done = !previous;
        self.touch();
        Ok(previous)
    }

    /// Puts back the flag captured by [`toggle_done`](Self::toggle_done).
    pub fn restore_done(&mut self, id: &ItemId, previous: bool) -> bool {
        match self.entries.get_mut(id) {
            Some(entry) if entry.item.done != previous => {
                entry.item.done = previous;
                self.touch();
                true
            }
            _ => false,
        }
    }

    pub fn remove_local(&mut self, id: &ItemId) -> bool {
        let removed = self.remove_entry(id);
        if removed {
            self.touch();
        }
        removed
    }

    pub fn apply_change_event(&mut self, event: ChangeEvent) {
        match event {
            ChangeEvent::Upsert(item) => self.upsert(item, None),
            ChangeEvent::Delete(id) => {
                self.remove_entry(&id);
            }
        }
        self.touch();
    }

    pub fn get(&self, id: &ItemId) -> Option<&Item> {
        self.entries.get(id).map(|e| &e.item)
    }

    pub fn contains(&self, id: &ItemId) -> bool {
        self.entries.contains_key(id)
    }

    pub fn is_pending(&self, id: &ItemId) -> bool {
        self.entries.get(id).is_some_and(|e| e.pending.is_some())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Count of refresh notifications emitted so far.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn iter(&self) -> impl Iterator<Item = &Item> {
        self.order.values().filter_map(|id| self.get(id))
    }

    pub fn snapshot(&self) -> Vec<Item> {
        self.iter().cloned().collect()
    }

    fn upsert(&mut self, item: Item, pending: Option<u64>) {
        if let Some(entry) = self.entries.get_mut(&item.id) {
            entry.item = item;
            entry.pending = pending;
            return;
        }
        let seq = self.next_seq;
        self.next_seq += 1;
        self.order.insert(seq, item.id);
        self.entries.insert(item.id, Entry { seq, item, pending });
    }

    fn remove_entry(&mut self, id: &ItemId) -> bool {
        match self.entries.remove(id) {
            Some(entry) => {
                self.order.remove(&entry.seq);
                true
            }
            None => false,
        }
    }

    fn touch(&mut self) {
        self.revision += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(task: &str) -> Item {
        Item::new("alice", task)
    }

    #[test]
    fn optimistic_add_then_echo_keeps_single_entry() {
        let mut list = LiveList::new();
        list.initialize(vec![]);
        let before = list.revision();

        let milk = item("milk");
        let _token = list.add_optimistic(milk.clone());
        assert_eq!(list.snapshot(), vec![milk.clone()]);
        assert_eq!(list.revision(), before + 1);

        list.apply_change_event(ChangeEvent::Upsert(milk.clone()));
        assert_eq!(list.snapshot(), vec![milk]);
        assert_eq!(list.revision(), before + 2);
    }

    #[test]
    fn repeated_upsert_is_idempotent() {
        let mut once = LiveList::new();
        let mut twice = LiveList::new();
        let a = item("a");
        let b = item("b");
        for list in [&mut once, &mut twice] {
            list.initialize(vec![a.clone()]);
            list.apply_change_event(ChangeEvent::Upsert(b.clone()));
        }
        twice.apply_change_event(ChangeEvent::Upsert(b.clone()));
        assert_eq!(once.snapshot(), twice.snapshot());
    }

    #[test]
    fn upsert_replaces_in_place() {
        let mut list = LiveList::new();
        let (a, b, c) = (item("a"), item("b"), item("c"));
        list.initialize(vec![a.clone(), b.clone(), c.clone()]);

        let mut edited = b.clone();
        edited.task = "b2".into();
        edited.done = true;
        list.apply_change_event(ChangeEvent::Upsert(edited.clone()));

        assert_eq!(list.snapshot(), vec![a, edited, c]);
    }

    #[test]
    fn delete_event_removes_item() {
        let mut list = LiveList::new();
        let one = item("one");
        list.initialize(vec![one.clone()]);
        list.apply_change_event(ChangeEvent::Delete(one.id));
        assert!(list.is_empty());
        // Unknown ids are harmless
        list.apply_change_event(ChangeEvent::Delete(ItemId::new()));
        assert!(list.is_empty());
    }

    #[test]
    fn remove_local_twice_is_noop() {
        let mut list = LiveList::new();
        let x = item("x");
        list.initialize(vec![x.clone()]);
        assert!(list.remove_local(&x.id));
        let rev = list.revision();
        assert!(!list.remove_local(&x.id));
        assert_eq!(list.revision(), rev);
        assert!(list.is_empty());
    }

    #[test]
    fn rollback_before_echo_removes() {
        let mut list = LiveList::new();
        list.initialize(vec![]);
        let two = item("two");
        let token = list.add_optimistic(two.clone());
        assert!(list.is_pending(&two.id));
        assert!(list.rollback(token));
        assert!(!list.contains(&two.id));
    }

    #[test]
    fn rollback_after_echo_is_ignored() {
        let mut list = LiveList::new();
        list.initialize(vec![]);
        let three = item("three");
        let token = list.add_optimistic(three.clone());
        list.apply_change_event(ChangeEvent::Upsert(three.clone()));
        assert!(!list.is_pending(&three.id));

        let rev = list.revision();
        assert!(!list.rollback(token));
        assert_eq!(list.snapshot(), vec![three]);
        assert_eq!(list.revision(), rev);
    }

    #[test]
    fn confirmed_add_cannot_be_rolled_back() {
        let mut list = LiveList::new();
        list.initialize(vec![]);
        let four = item("four");
        let token = list.add_optimistic(four.clone());
        let rev = list.revision();
        list.confirm(token);
        assert!(!list.is_pending(&four.id));
        assert_eq!(list.revision(), rev);
        assert_eq!(list.snapshot(), vec![four]);
    }

    #[test]
    fn rollback_targets_its_own_item_not_the_last() {
        let mut list = LiveList::new();
        list.initialize(vec![]);
        let first = item("first");
        let second = item("second");
        let t1 = list.add_optimistic(first.clone());
        let _t2 = list.add_optimistic(second.clone());
        let other = item("from elsewhere");
        list.apply_change_event(ChangeEvent::Upsert(other.clone()));

        assert!(list.rollback(t1));
        assert_eq!(list.snapshot(), vec![second, other]);
    }

    #[test]
    fn toggle_missing_is_not_found_and_untouched() {
        let mut list = LiveList::new();
        let a = item("a");
        list.initialize(vec![a.clone()]);
        let rev = list.revision();
        let ghost = ItemId::new();

        assert_eq!(list.toggle_done(&ghost), Err(SyncError::NotFound(ghost)));
        assert_eq!(list.snapshot(), vec![a]);
        assert_eq!(list.revision(), rev);
    }

    #[test]
    fn toggle_and_restore() {
        let mut list = LiveList::new();
        let a = item("a");
        list.initialize(vec![a.clone()]);

        let previous = list.toggle_done(&a.id).unwrap();
        assert!(!previous);
        assert!(list.get(&a.id).unwrap().done);

        assert!(list.restore_done(&a.id, previous));
        assert!(!list.get(&a.id).unwrap().done);
        // Already restored
        assert!(!list.restore_done(&a.id, previous));
    }

    #[test]
    fn upsert_and_delete_last_applied_wins() {
        let x = item("x");

        let mut list = LiveList::new();
        list.initialize(vec![]);
        list.apply_change_event(ChangeEvent::Upsert(x.clone()));
        list.apply_change_event(ChangeEvent::Delete(x.id));
        assert!(list.is_empty());

        let mut list = LiveList::new();
        list.initialize(vec![]);
        list.apply_change_event(ChangeEvent::Delete(x.id));
        list.apply_change_event(ChangeEvent::Upsert(x.clone()));
        assert_eq!(list.snapshot(), vec![x]);
    }

    #[test]
    fn initialize_collapses_duplicate_ids() {
        let mut list = LiveList::new();
        let a = item("a");
        let b = item("b");
        let mut a2 = a.clone();
        a2.task = "a again".into();
        list.initialize(vec![a, b.clone(), a2.clone()]);
        assert_eq!(list.snapshot(), vec![a2, b]);
    }

    #[test]
    fn initialize_discards_previous_state() {
        let mut list = LiveList::new();
        list.initialize(vec![item("old")]);
        let fresh = item("fresh");
        list.initialize(vec![fresh.clone()]);
        assert_eq!(list.snapshot(), vec![fresh]);
    }
}
