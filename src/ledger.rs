//! Resumable progress ledger
//!
//! The ledger is the single source of truth for "is this item done". It
//! holds the completed and permanently-failed item ids plus the processed
//! and failed listing page numbers, and persists them as a JSON snapshot so
//! a restarted run never re-fetches an item it already completed.
//!
//! Durability contract: every completion acknowledged before the last
//! successful snapshot survives a crash. The tail since that snapshot may be
//! lost, costing at most an idempotent re-fetch. Snapshots are written to a
//! temp file in the same directory and renamed into place, so a crash
//! mid-write never leaves a corrupt ledger behind.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors from ledger persistence
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Failed to read ledger file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Ledger file is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),
}

/// Run statistics carried inside the ledger snapshot
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunStats {
    pub started_at: Option<String>,
    pub finished_at: Option<String>,
    pub pages_processed: u64,
    pub items_discovered: u64,
    pub items_completed: u64,
    pub items_failed: u64,
    pub failed_attempts: u64,
}

/// On-disk snapshot shape
#[derive(Debug, Serialize, Deserialize)]
struct LedgerSnapshot {
    config_hash: String,
    completed_items: Vec<String>,
    failed_items: Vec<String>,
    completed_pages: Vec<u32>,
    failed_pages: Vec<u32>,
    stats: RunStats,
}

/// Persisted set of completed/failed identifiers, with batched snapshots
#[derive(Debug)]
pub struct ProgressLedger {
    path: PathBuf,
    config_hash: String,
    completed_items: HashSet<String>,
    failed_items: HashSet<String>,
    completed_pages: BTreeSet<u32>,
    failed_pages: BTreeSet<u32>,
    stats: RunStats,
    snapshot_every: u32,
    dirty: u32,
}

impl ProgressLedger {
    /// Creates a fresh ledger that will snapshot to `path`
    pub fn new(path: impl Into<PathBuf>, config_hash: impl Into<String>, snapshot_every: u32) -> Self {
        let mut stats = RunStats::default();
        stats.started_at = Some(Utc::now().to_rfc3339());

        Self {
            path: path.into(),
            config_hash: config_hash.into(),
            completed_items: HashSet::new(),
            failed_items: HashSet::new(),
            completed_pages: BTreeSet::new(),
            failed_pages: BTreeSet::new(),
            stats,
            snapshot_every: snapshot_every.max(1),
            dirty: 0,
        }
    }

    /// Opens the ledger at `path`, restoring a previous run's snapshot
    ///
    /// With `fresh` set, any existing snapshot is ignored and the first
    /// write replaces it. A missing file is a fresh start, not an error; a
    /// corrupt file is an error, because silently dropping a ledger would
    /// re-crawl everything.
    pub fn open(
        path: impl Into<PathBuf>,
        config_hash: impl Into<String>,
        snapshot_every: u32,
        fresh: bool,
    ) -> Result<Self, LedgerError> {
        let path = path.into();
        let config_hash = config_hash.into();

        if fresh || !path.exists() {
            return Ok(Self::new(path, config_hash, snapshot_every));
        }

        let content = std::fs::read_to_string(&path)?;
        let snapshot: LedgerSnapshot = serde_json::from_str(&content)?;

        if snapshot.config_hash != config_hash {
            tracing::warn!(
                "resuming with a changed configuration (ledger hash {}, current {})",
                snapshot.config_hash,
                config_hash
            );
        }

        tracing::info!(
            "restored ledger: {} completed items, {} failed items, {} completed pages",
            snapshot.completed_items.len(),
            snapshot.failed_items.len(),
            snapshot.completed_pages.len()
        );

        let mut stats = snapshot.stats;
        stats.started_at = Some(Utc::now().to_rfc3339());
        stats.finished_at = None;

        Ok(Self {
            path,
            config_hash,
            completed_items: snapshot.completed_items.into_iter().collect(),
            failed_items: snapshot.failed_items.into_iter().collect(),
            completed_pages: snapshot.completed_pages.into_iter().collect(),
            failed_pages: snapshot.failed_pages.into_iter().collect(),
            stats,
            snapshot_every: snapshot_every.max(1),
            dirty: 0,
        })
    }

    /// Reads a snapshot without constructing a live ledger (for `--stats`)
    pub fn read_stats(path: &Path) -> Result<(RunStats, usize, usize, Vec<u32>), LedgerError> {
        let content = std::fs::read_to_string(path)?;
        let snapshot: LedgerSnapshot = serde_json::from_str(&content)?;
        Ok((
            snapshot.stats,
            snapshot.completed_items.len(),
            snapshot.failed_items.len(),
            snapshot.failed_pages,
        ))
    }

    pub fn is_completed(&self, item_id: &str) -> bool {
        self.completed_items.contains(item_id)
    }

    pub fn is_failed(&self, item_id: &str) -> bool {
        self.failed_items.contains(item_id)
    }

    /// Marks an item completed; idempotent
    ///
    /// A previously failed id that completes on a later run moves out of the
    /// failed set. Completed is final and wins over both.
    pub fn mark_completed(&mut self, item_id: &str) -> Result<(), LedgerError> {
        if self.completed_items.contains(item_id) {
            return Ok(());
        }
        self.failed_items.remove(item_id);
        self.completed_items.insert(item_id.to_string());
        self.touch()
    }

    /// Marks an item permanently failed; idempotent, never demotes a completion
    pub fn mark_failed(&mut self, item_id: &str) -> Result<(), LedgerError> {
        if self.completed_items.contains(item_id) || self.failed_items.contains(item_id) {
            return Ok(());
        }
        self.failed_items.insert(item_id.to_string());
        self.touch()
    }

    /// Marks a listing page processed; idempotent
    pub fn mark_page_completed(&mut self, page: u32) -> Result<(), LedgerError> {
        if !self.completed_pages.insert(page) {
            return Ok(());
        }
        self.failed_pages.remove(&page);
        self.touch()
    }

    /// Marks a listing page permanently failed; idempotent
    pub fn mark_page_failed(&mut self, page: u32) -> Result<(), LedgerError> {
        if self.completed_pages.contains(&page) || !self.failed_pages.insert(page) {
            return Ok(());
        }
        self.touch()
    }

    pub fn completed_items(&self) -> usize {
        self.completed_items.len()
    }

    pub fn failed_items(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.failed_items.iter().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }

    pub fn failed_pages(&self) -> &BTreeSet<u32> {
        &self.failed_pages
    }

    pub fn stats(&self) -> &RunStats {
        &self.stats
    }

    pub fn stats_mut(&mut self) -> &mut RunStats {
        &mut self.stats
    }

    /// Finalizes stats and writes a last snapshot
    pub fn finish(&mut self) -> Result<(), LedgerError> {
        self.stats.finished_at = Some(Utc::now().to_rfc3339());
        self.snapshot()
    }

    /// Writes the snapshot atomically: temp file in the same directory, then rename
    pub fn snapshot(&mut self) -> Result<(), LedgerError> {
        let mut completed_items: Vec<String> = self.completed_items.iter().cloned().collect();
        completed_items.sort_unstable();
        let mut failed_items: Vec<String> = self.failed_items.iter().cloned().collect();
        failed_items.sort_unstable();

        let snapshot = LedgerSnapshot {
            config_hash: self.config_hash.clone(),
            completed_items,
            failed_items,
            completed_pages: self.completed_pages.iter().copied().collect(),
            failed_pages: self.failed_pages.iter().copied().collect(),
            stats: self.stats.clone(),
        };

        let json = serde_json::to_string_pretty(&snapshot)?;
        let tmp_path = self.path.with_extension("json.tmp");
        std::fs::write(&tmp_path, json)?;
        std::fs::rename(&tmp_path, &self.path)?;

        self.dirty = 0;
        tracing::debug!("ledger snapshot written to {}", self.path.display());
        Ok(())
    }

    fn touch(&mut self) -> Result<(), LedgerError> {
        self.dirty += 1;
        if self.dirty >= self.snapshot_every {
            self.snapshot()?;
        }
        Ok(())
    }
}
