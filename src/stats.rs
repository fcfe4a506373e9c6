//! Run statistics and the shutdown report
//!
//! The collector counts scheduler and pipeline activity; the summary is
//! assembled at shutdown and enumerates failed pages and failed item ids
//! distinctly from successes, so operators can target re-runs.

use std::collections::BTreeMap;
use std::time::Duration;

/// Counters incremented as the crawl progresses
#[derive(Debug, Default, Clone)]
pub struct StatsCollector {
    /// Fetches dispatched, including retries
    pub attempts: u64,

    /// Fetches that returned a document
    pub successes: u64,

    /// Fetches that failed in transport
    pub failures: u64,

    /// Requests re-enqueued by the retry policy
    pub retries: u64,

    /// Requests abandoned after exhausting attempts
    pub give_ups: u64,

    /// Listing pages accepted and processed
    pub pages_processed: u64,

    /// Item ids discovered on listing pages (excluding ledger skips)
    pub items_discovered: u64,

    /// Item ids skipped because the ledger already had them
    pub items_skipped: u64,

    /// Items emitted to the sink
    pub items_completed: u64,

    /// Items marked permanently failed
    pub items_failed: u64,

    /// Tabs counted down without content after a permanent failure
    pub tabs_absent: u64,

    /// Item blocks seen per accepted listing page
    pub blocks_per_page: BTreeMap<u32, usize>,

    /// Pages accepted below the expected block minimum: page -> block count
    pub short_pages: BTreeMap<u32, usize>,
}

impl StatsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_blocks(&mut self, page: u32, blocks: usize) {
        self.blocks_per_page.insert(page, blocks);
    }

    pub fn record_short_page(&mut self, page: u32, blocks: usize) {
        self.short_pages.insert(page, blocks);
    }

    pub fn total_blocks(&self) -> usize {
        self.blocks_per_page.values().sum()
    }

    /// Pages that were accepted but carried zero item blocks
    pub fn empty_pages(&self) -> Vec<u32> {
        self.blocks_per_page
            .iter()
            .filter(|(_, count)| **count == 0)
            .map(|(page, _)| *page)
            .collect()
    }
}

/// Everything the shutdown report needs in one place
#[derive(Debug, Clone)]
pub struct CrawlSummary {
    pub stats: StatsCollector,
    pub failed_pages: Vec<u32>,
    pub failed_items: Vec<String>,
    pub unresolved_items: Vec<String>,
    pub elapsed: Duration,
    pub cancelled: bool,
}

impl CrawlSummary {
    /// Average item blocks per processed page
    pub fn average_blocks(&self) -> f64 {
        if self.stats.pages_processed == 0 {
            return 0.0;
        }
        self.stats.total_blocks() as f64 / self.stats.pages_processed as f64
    }
}

/// Prints the completion report to stdout
pub fn print_summary(summary: &CrawlSummary) {
    println!("=== Crawl Completion Report ===\n");

    if summary.cancelled {
        println!("Run was cancelled before the queue drained.\n");
    }

    println!("Overview:");
    println!("  Elapsed: {:.1}s", summary.elapsed.as_secs_f64());
    println!("  Pages processed: {}", summary.stats.pages_processed);
    println!("  Total item blocks: {}", summary.stats.total_blocks());
    println!("  Average blocks per page: {:.2}", summary.average_blocks());
    println!();

    println!("Items:");
    println!("  Discovered: {}", summary.stats.items_discovered);
    println!("  Skipped (already completed): {}", summary.stats.items_skipped);
    println!("  Completed: {}", summary.stats.items_completed);
    println!("  Failed: {}", summary.stats.items_failed);
    println!();

    println!("Fetching:");
    println!("  Attempts: {}", summary.stats.attempts);
    println!("  Successes: {}", summary.stats.successes);
    println!("  Failures: {}", summary.stats.failures);
    println!("  Retries: {}", summary.stats.retries);
    println!("  Give-ups: {}", summary.stats.give_ups);
    println!();

    let empty_pages = summary.stats.empty_pages();
    if !empty_pages.is_empty() {
        println!("Pages with no blocks: {:?}", empty_pages);
    }

    if !summary.stats.short_pages.is_empty() {
        println!("Pages accepted below the block minimum:");
        for (page, blocks) in &summary.stats.short_pages {
            println!("  Page {}: {} blocks", page, blocks);
        }
    }

    if !summary.failed_pages.is_empty() {
        println!("Failed pages: {:?}", summary.failed_pages);
    }

    if !summary.failed_items.is_empty() {
        println!("Failed items ({}):", summary.failed_items.len());
        for id in &summary.failed_items {
            println!("  - {}", id);
        }
    }

    if !summary.unresolved_items.is_empty() {
        println!(
            "Items still pending (resumed on next run): {}",
            summary.unresolved_items.len()
        );
    }

    if summary.failed_pages.is_empty() && summary.failed_items.is_empty() {
        println!("No failed pages or items.");
    }
}
