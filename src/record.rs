//! Assembled item records
//!
//! An [`ItemRecord`] is created when an item's detail page is parsed, grows a
//! section per joined tab, and is emitted to the sink exactly once.

use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

/// One titled content block inside a tab section
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SectionBlock {
    pub title: String,
    pub body: String,
}

/// The content contributed by one tab page
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TabSection {
    /// Human-readable tab title as it appeared in the navigation
    pub tab: String,

    /// Content blocks found on the tab page, deduplicated by title
    pub blocks: Vec<SectionBlock>,
}

impl TabSection {
    pub fn new(tab: impl Into<String>) -> Self {
        Self {
            tab: tab.into(),
            blocks: Vec::new(),
        }
    }

    /// Appends a block unless one with the same title is already present
    pub fn push_block(&mut self, title: impl Into<String>, body: impl Into<String>) {
        let title = title.into();
        if self.blocks.iter().any(|b| b.title == title) {
            return;
        }
        self.blocks.push(SectionBlock {
            title,
            body: body.into(),
        });
    }
}

/// A fully- or partially-assembled item
#[derive(Debug, Clone, Serialize)]
pub struct ItemRecord {
    /// Unique id, derived from the detail-page URL
    pub item_id: String,

    /// Extracted field values; missing fields are recorded as null
    pub fields: BTreeMap<String, Value>,

    /// Joined tab sections, keyed by tab key
    pub tabs: BTreeMap<String, TabSection>,
}

impl ItemRecord {
    /// Creates a record from the fields known at detail-parse time
    pub fn new(item_id: impl Into<String>, fields: BTreeMap<String, Value>) -> Self {
        Self {
            item_id: item_id.into(),
            fields,
            tabs: BTreeMap::new(),
        }
    }

    /// Merges one tab's section content into the record
    pub fn merge_tab(&mut self, tab_key: impl Into<String>, section: TabSection) {
        self.tabs.insert(tab_key.into(), section);
    }
}
