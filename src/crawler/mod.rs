//! Crawler module - orchestration engine and default collaborators
//!
//! This module contains the core crawling logic, including:
//! - The bounded-concurrency scheduler and its fetch-outcome routing
//! - The three-stage pipeline (listing -> detail -> tabs -> emit)
//! - Default implementations of the Fetcher, Extractor, and Sink contracts

mod extractor;
mod fetcher;
mod pipeline;
mod scheduler;
mod sink;

pub use extractor::{
    derive_tab_key, CssExtractor, DetailPage, ExtractError, Extractor, ListingItem, TabLink,
};
pub use fetcher::{
    build_http_client, format_user_agent, Document, Fetcher, HttpFetcher, TransportError,
};
pub use pipeline::CrawlPipeline;
pub use scheduler::{FetchEvent, Scheduler};
pub use sink::{JsonLinesSink, Sink, SinkError};

use crate::config::Config;
use crate::ledger::ProgressLedger;
use crate::stats::CrawlSummary;
use crate::LoomError;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Runs a complete crawl with the default collaborators
///
/// Builds the reqwest fetcher, the CSS extractor, and the JSON-lines sink
/// from the configuration, restores the ledger (unless `fresh`), and runs
/// the pipeline until the queue drains or `cancel` fires.
///
/// # Arguments
///
/// * `config` - Validated crawl configuration
/// * `config_hash` - Hash of the loaded configuration file
/// * `fresh` - Ignore any existing ledger snapshot
/// * `cancel` - Run-level cancellation signal
///
/// # Returns
///
/// * `Ok(CrawlSummary)` - The completed run's report
/// * `Err(LoomError)` - Configuration or ledger-durability failure
pub async fn crawl(
    config: Config,
    config_hash: &str,
    fresh: bool,
    cancel: CancellationToken,
) -> Result<CrawlSummary, LoomError> {
    let client = build_http_client(&config.user_agent)?;
    let fetcher = Arc::new(HttpFetcher::new(
        client,
        Duration::from_millis(config.crawler.request_delay_ms),
    ));
    let extractor = Box::new(CssExtractor::new(config.extractor.clone()));
    let sink = Box::new(JsonLinesSink::open(&config.output.records_path)?);
    let ledger = ProgressLedger::open(
        &config.output.ledger_path,
        config_hash,
        config.crawler.snapshot_every,
        fresh,
    )?;

    let pipeline = CrawlPipeline::new(config, fetcher, extractor, sink, ledger, cancel);
    pipeline.run().await
}
