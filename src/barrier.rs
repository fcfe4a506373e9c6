//! Per-item fan-out/join barrier
//!
//! A barrier entry is opened once per item when its detail page is parsed,
//! sized to the number of tab requests about to be issued. Each tab arrival
//! merges a section and counts the barrier down; the arrival that reaches
//! zero takes the finished record out of the barrier, which guarantees
//! at-most-once emission. A permanently failed tab must still count down
//! (with its section absent) so no entry dangles forever.
//!
//! The barrier is owned and mutated by the single pipeline task; per-item
//! serialization falls out of that ownership rather than out of locking.

use crate::record::{ItemRecord, TabSection};
use std::collections::HashMap;

/// Result of an `open` or `arrive` call
#[derive(Debug)]
pub enum Arrival {
    /// Sections still outstanding
    Pending(u32),

    /// The last section arrived; the finished record is released
    Complete(ItemRecord),
}

#[derive(Debug)]
struct Entry {
    record: ItemRecord,
    pending: u32,
}

/// Tracks outstanding tab fetches per in-flight item
#[derive(Debug, Default)]
pub struct JoinBarrier {
    entries: HashMap<String, Entry>,
}

impl JoinBarrier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens the barrier for an item with `expected` outstanding tabs
    ///
    /// Called exactly once per item, at detail-parse time. An item with zero
    /// tabs completes immediately and never occupies an entry. Re-opening an
    /// id replaces the stale entry; extraction is deterministic, so the
    /// replacement record is identical.
    pub fn open(&mut self, record: ItemRecord, expected: u32) -> Arrival {
        if expected == 0 {
            return Arrival::Complete(record);
        }

        let item_id = record.item_id.clone();
        if self
            .entries
            .insert(
                item_id.clone(),
                Entry {
                    record,
                    pending: expected,
                },
            )
            .is_some()
        {
            tracing::warn!("barrier re-opened for item {}", item_id);
        }

        Arrival::Pending(expected)
    }

    /// Merges one tab's section and counts the barrier down
    ///
    /// Returns None when no barrier is open for the item (a late arrival
    /// after completion, or an item that was never opened).
    pub fn arrive(
        &mut self,
        item_id: &str,
        tab_key: &str,
        section: TabSection,
    ) -> Option<Arrival> {
        let entry = self.entries.get_mut(item_id)?;
        entry.record.merge_tab(tab_key, section);
        self.count_down(item_id)
    }

    /// Counts the barrier down without a section
    ///
    /// Used when a tab fetch is permanently abandoned: the item must still
    /// complete, with that tab's section absent, instead of dangling open.
    pub fn arrive_absent(&mut self, item_id: &str, tab_key: &str) -> Option<Arrival> {
        if !self.entries.contains_key(item_id) {
            return None;
        }
        tracing::debug!("counting down item {} without section {}", item_id, tab_key);
        self.count_down(item_id)
    }

    /// Number of items currently held open
    pub fn open_items(&self) -> usize {
        self.entries.len()
    }

    /// Ids of items still held open (for the shutdown report)
    pub fn open_item_ids(&self) -> Vec<&str> {
        self.entries.keys().map(String::as_str).collect()
    }

    fn count_down(&mut self, item_id: &str) -> Option<Arrival> {
        let entry = self.entries.get_mut(item_id)?;

        entry.pending -= 1;
        if entry.pending > 0 {
            return Some(Arrival::Pending(entry.pending));
        }

        // Removing the entry here is what makes emission at-most-once: a
        // second completion for the same id has nothing left to complete.
        let entry = self.entries.remove(item_id)?;
        Some(Arrival::Complete(entry.record))
    }
}
