//! Crawl pipeline - the three-stage control flow
//!
//! Listing pages fan out into item detail pages, detail pages fan out into
//! tab pages, and the join barrier folds tab sections back into one record
//! per item. The pipeline owns every piece of mutable orchestration state
//! (ledger, barrier, item states, retry policy) and mutates it from a single
//! task; fetch tasks only fetch. Suspension happens at the fetcher boundary
//! alone - every handler below is synchronous.

use crate::barrier::{Arrival, JoinBarrier};
use crate::config::Config;
use crate::crawler::extractor::Extractor;
use crate::crawler::fetcher::{Document, Fetcher, TransportError};
use crate::crawler::scheduler::{FetchEvent, Scheduler};
use crate::crawler::sink::Sink;
use crate::ledger::ProgressLedger;
use crate::record::ItemRecord;
use crate::request::{PageRequest, Stage};
use crate::retry::{FailureKind, RetryDecision, RetryPolicy};
use crate::state::{ItemState, TransitionError};
use crate::stats::CrawlSummary;
use crate::validate::{PageValidator, PageValidity};
use crate::LoomError;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use url::Url;

/// Capacity of the fetch-outcome channel; only ever holds up to the
/// concurrency limit, the headroom just avoids needless task wakeups.
const EVENT_CHANNEL_CAPACITY: usize = 100;

/// The crawl orchestration engine
pub struct CrawlPipeline {
    config: Config,
    scheduler: Scheduler,
    events: mpsc::Receiver<FetchEvent>,
    extractor: Box<dyn Extractor>,
    sink: Box<dyn Sink>,
    ledger: ProgressLedger,
    barrier: JoinBarrier,
    items: HashMap<String, ItemState>,
    listing_fields: HashMap<String, BTreeMap<String, Value>>,
    retry: RetryPolicy,
    validator: PageValidator,
    cancel: CancellationToken,
    handled: u64,
}

impl CrawlPipeline {
    /// Wires the pipeline to its collaborators
    ///
    /// # Arguments
    ///
    /// * `config` - Validated crawl configuration
    /// * `fetcher` - Transport collaborator
    /// * `extractor` - Field-extraction collaborator
    /// * `sink` - Destination for finished records
    /// * `ledger` - Restored or fresh progress ledger
    /// * `cancel` - Run-level cancellation signal
    pub fn new(
        config: Config,
        fetcher: Arc<dyn Fetcher>,
        extractor: Box<dyn Extractor>,
        sink: Box<dyn Sink>,
        ledger: ProgressLedger,
        cancel: CancellationToken,
    ) -> Self {
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let scheduler = Scheduler::new(
            fetcher,
            config.crawler.max_concurrent_fetches as usize,
            Duration::from_secs(config.crawler.fetch_timeout_secs),
            tx,
        );
        let validator = PageValidator::new(&config.validator);
        let retry = RetryPolicy::new(config.retry.clone());

        Self {
            config,
            scheduler,
            events: rx,
            extractor,
            sink,
            ledger,
            barrier: JoinBarrier::new(),
            items: HashMap::new(),
            listing_fields: HashMap::new(),
            retry,
            validator,
            cancel,
            handled: 0,
        }
    }

    /// Runs the crawl to completion (or cancellation) and returns the summary
    pub async fn run(mut self) -> Result<CrawlSummary, LoomError> {
        let started = Instant::now();
        self.seed()?;
        tracing::info!("seeded {} listing pages", self.scheduler.queued());

        loop {
            // Cancellation stops new dispatches; in-flight fetches drain below.
            let next_ready = if self.cancel.is_cancelled() {
                None
            } else {
                self.scheduler.pump(Instant::now())
            };

            if self.scheduler.in_flight() == 0 {
                if self.cancel.is_cancelled() {
                    break;
                }
                match next_ready {
                    // Everything queued is inside a backoff window
                    Some(wait) => {
                        tokio::select! {
                            _ = self.cancel.cancelled() => {}
                            _ = tokio::time::sleep(wait) => {}
                        }
                        continue;
                    }
                    // Queue empty and nothing airborne: done
                    None => break,
                }
            }

            tokio::select! {
                maybe_event = self.events.recv() => {
                    let Some(event) = maybe_event else { break };
                    self.scheduler.mark_settled();
                    self.handle_event(event)?;
                }
                _ = self.cancel.cancelled(), if !self.cancel.is_cancelled() => {
                    tracing::info!(
                        "cancellation requested; draining {} in-flight fetches",
                        self.scheduler.in_flight()
                    );
                }
            }
        }

        self.finish(started)
    }

    /// Seeds one request per listing page
    ///
    /// Every page is re-seeded on resume: deduplication happens per item, so
    /// an item left partially joined by a cancelled run is rediscovered and
    /// its detail page re-fetched, while completed items are skipped.
    fn seed(&mut self) -> Result<(), LoomError> {
        let base = Url::parse(&self.config.crawler.listing_url)?;
        for page in 1..=self.config.crawler.page_count {
            let mut url = base.clone();
            url.set_query(Some(&format!("page={}", page)));
            self.scheduler.enqueue(PageRequest::listing(url, page));
        }
        Ok(())
    }

    /// Routes one settled fetch to its stage handler
    fn handle_event(&mut self, event: FetchEvent) -> Result<(), LoomError> {
        self.handled += 1;
        if self.handled % 10 == 0 {
            tracing::info!(
                "progress: {} responses handled, {} queued, {} in flight, {} items open",
                self.handled,
                self.scheduler.queued(),
                self.scheduler.in_flight(),
                self.barrier.open_items()
            );
        }

        let FetchEvent { request, result } = event;
        match result {
            Ok(document) => {
                self.scheduler.stats_mut().successes += 1;
                match request.stage {
                    Stage::Listing => self.on_listing(request, document),
                    Stage::Detail => self.on_detail(request, document),
                    Stage::Tab => self.on_tab(request, document),
                }
            }
            Err(error) => {
                self.scheduler.stats_mut().failures += 1;
                self.ledger.stats_mut().failed_attempts += 1;
                self.on_transport_failure(request, error)
            }
        }
    }

    // ===== Listing stage =====

    fn on_listing(&mut self, request: PageRequest, document: Document) -> Result<(), LoomError> {
        let page = request.page_number.unwrap_or(0);

        match self.validator.validate(&document.body) {
            PageValidity::Invalid(reason) => {
                tracing::warn!("page {} invalid: {}", page, reason);
                self.retry_or_fail_listing(request, &reason.to_string())
            }
            PageValidity::Valid { block_count } => {
                if self.validator.is_shortfall(block_count) {
                    match self.retry.decide(&request, FailureKind::Validation) {
                        RetryDecision::Retry { delay, priority } => {
                            tracing::info!(
                                "page {}: {} blocks (expected >= {}), retrying in {:?}",
                                page,
                                block_count,
                                self.validator.min_blocks(),
                                delay
                            );
                            self.scheduler.stats_mut().retries += 1;
                            self.scheduler.enqueue(request.retried(delay, priority));
                            return Ok(());
                        }
                        RetryDecision::GiveUp => {
                            // Partial data beats none: accept the short page
                            tracing::warn!(
                                "page {}: still {} blocks after retries, accepting as-is",
                                page,
                                block_count
                            );
                            self.scheduler.stats_mut().record_short_page(page, block_count);
                        }
                    }
                }
                self.accept_listing(request, document, page, block_count)
            }
        }
    }

    fn accept_listing(
        &mut self,
        request: PageRequest,
        document: Document,
        page: u32,
        block_count: usize,
    ) -> Result<(), LoomError> {
        let items = match self.extractor.extract_listing(&document) {
            Ok(items) => items,
            Err(e) => {
                tracing::warn!("page {} extraction failed: {}", page, e);
                return self.retry_or_fail_listing(request, &e.to_string());
            }
        };

        tracing::info!("page {}: {} item blocks", page, block_count);
        self.scheduler.stats_mut().record_blocks(page, block_count);
        self.scheduler.stats_mut().pages_processed += 1;
        self.ledger.stats_mut().pages_processed += 1;

        for item in items {
            if self.ledger.is_completed(&item.item_id) {
                tracing::debug!("skipping already completed item {}", item.item_id);
                self.scheduler.stats_mut().items_skipped += 1;
                continue;
            }
            // Already discovered this run (duplicate across pages, or a
            // terminal state from earlier in the run)
            if self.items.contains_key(&item.item_id) {
                continue;
            }

            self.items.insert(item.item_id.clone(), ItemState::Discovered);
            self.listing_fields.insert(item.item_id.clone(), item.fields);
            self.scheduler.stats_mut().items_discovered += 1;
            self.ledger.stats_mut().items_discovered += 1;
            self.scheduler.enqueue(PageRequest::detail(item.detail_url));
        }

        self.ledger.mark_page_completed(page)?;
        self.retry.clear(&request);
        Ok(())
    }

    fn retry_or_fail_listing(
        &mut self,
        request: PageRequest,
        reason: &str,
    ) -> Result<(), LoomError> {
        let page = request.page_number.unwrap_or(0);
        match self.retry.decide(&request, FailureKind::Validation) {
            RetryDecision::Retry { delay, priority } => {
                tracing::info!("retrying page {} in {:?}: {}", page, delay, reason);
                self.scheduler.stats_mut().retries += 1;
                self.scheduler.enqueue(request.retried(delay, priority));
                Ok(())
            }
            RetryDecision::GiveUp => {
                tracing::error!("page {} failed permanently: {}", page, reason);
                self.scheduler.stats_mut().give_ups += 1;
                self.ledger.mark_page_failed(page)?;
                Ok(())
            }
        }
    }

    // ===== Detail stage =====

    fn on_detail(&mut self, request: PageRequest, document: Document) -> Result<(), LoomError> {
        let item_id = match request.parent_item.clone() {
            Some(id) => id,
            None => {
                tracing::error!("detail response without an item id: {}", request.url);
                return Ok(());
            }
        };

        let detail = match self.extractor.extract_detail(&document) {
            Ok(detail) => detail,
            Err(e) => {
                // A total extraction failure aborts this one item only
                tracing::warn!("detail extraction failed for {}: {}", item_id, e);
                return self.fail_item(&item_id);
            }
        };

        self.advance(&item_id, "detail_fetched", ItemState::detail_fetched);

        let mut fields = self.listing_fields.remove(&item_id).unwrap_or_default();
        fields.extend(detail.fields);
        let record = ItemRecord::new(item_id.clone(), fields);

        let expected = detail.tab_links.len() as u32;
        self.advance(&item_id, "tabs_opened", |s| s.tabs_opened(expected));
        tracing::debug!("item {}: {} tabs to fetch", item_id, expected);

        match self.barrier.open(record, expected) {
            Arrival::Complete(record) => self.complete_item(record)?,
            Arrival::Pending(_) => {
                for tab in detail.tab_links {
                    self.scheduler.enqueue(PageRequest::tab(
                        tab.url,
                        item_id.clone(),
                        tab.key,
                        tab.title,
                    ));
                }
            }
        }

        self.retry.clear(&request);
        Ok(())
    }

    // ===== Tab stage =====

    fn on_tab(&mut self, request: PageRequest, document: Document) -> Result<(), LoomError> {
        let (item_id, tab_key) = match (request.parent_item.clone(), request.tab_key.clone()) {
            (Some(id), Some(key)) => (id, key),
            _ => {
                tracing::error!("tab response without item id or tab key: {}", request.url);
                return Ok(());
            }
        };
        let tab_title = request.tab_title.clone().unwrap_or_else(|| tab_key.clone());

        let arrival = match self.extractor.extract_tab(&document, &tab_title) {
            Ok(section) => self.barrier.arrive(&item_id, &tab_key, section),
            Err(e) => {
                // The section is recorded as absent; the item must not dangle
                tracing::warn!("tab {} extraction failed for {}: {}", tab_key, item_id, e);
                self.scheduler.stats_mut().tabs_absent += 1;
                self.barrier.arrive_absent(&item_id, &tab_key)
            }
        };

        self.retry.clear(&request);
        self.settle_arrival(&item_id, arrival)
    }

    fn settle_arrival(
        &mut self,
        item_id: &str,
        arrival: Option<Arrival>,
    ) -> Result<(), LoomError> {
        match arrival {
            None => {
                tracing::warn!("tab arrival for item {} with no open barrier", item_id);
                Ok(())
            }
            Some(Arrival::Pending(remaining)) => {
                self.advance(item_id, "tab_arrived", ItemState::tab_arrived);
                tracing::debug!("item {}: {} tabs still pending", item_id, remaining);
                Ok(())
            }
            Some(Arrival::Complete(record)) => {
                self.advance(item_id, "tab_arrived", ItemState::tab_arrived);
                self.complete_item(record)
            }
        }
    }

    // ===== Failure handling =====

    fn on_transport_failure(
        &mut self,
        request: PageRequest,
        error: TransportError,
    ) -> Result<(), LoomError> {
        let retryable = match error.status() {
            Some(status) => self.retry.is_retryable_status(status),
            // Network errors and timeouts are always retryable
            None => true,
        };

        if retryable {
            match self.retry.decide(&request, FailureKind::Transport) {
                RetryDecision::Retry { delay, priority } => {
                    tracing::info!(
                        "retrying {} {} in {:?} (attempt {})",
                        request.stage,
                        request.url,
                        delay,
                        request.attempt + 1
                    );
                    self.scheduler.stats_mut().retries += 1;
                    self.scheduler.enqueue(request.retried(delay, priority));
                    return Ok(());
                }
                RetryDecision::GiveUp => {}
            }
        } else {
            tracing::warn!(
                "{} {} failed with non-retryable error: {}",
                request.stage,
                request.url,
                error
            );
        }

        self.give_up(request, error)
    }

    fn give_up(&mut self, request: PageRequest, error: TransportError) -> Result<(), LoomError> {
        self.scheduler.stats_mut().give_ups += 1;

        match request.stage {
            Stage::Listing => {
                let page = request.page_number.unwrap_or(0);
                tracing::error!("page {} abandoned: {}", page, error);
                self.ledger.mark_page_failed(page)?;
                Ok(())
            }
            Stage::Detail => {
                let Some(item_id) = request.parent_item.clone() else {
                    return Ok(());
                };
                tracing::error!("item {} abandoned: {}", item_id, error);
                self.fail_item(&item_id)
            }
            Stage::Tab => {
                let (Some(item_id), Some(tab_key)) =
                    (request.parent_item.clone(), request.tab_key.clone())
                else {
                    return Ok(());
                };
                // The barrier must still count down: a dangling entry would
                // hold the item open forever.
                tracing::warn!(
                    "tab {} of item {} abandoned ({}); completing without it",
                    tab_key,
                    item_id,
                    error
                );
                self.scheduler.stats_mut().tabs_absent += 1;
                let arrival = self.barrier.arrive_absent(&item_id, &tab_key);
                self.settle_arrival(&item_id, arrival)
            }
        }
    }

    // ===== Terminal transitions =====

    fn complete_item(&mut self, record: ItemRecord) -> Result<(), LoomError> {
        let item_id = record.item_id.clone();

        if let Err(e) = self.sink.emit(&record) {
            // Completion reflects "crawled", not "persisted downstream"
            tracing::error!("sink emission failed for {}: {}", item_id, e);
        }

        self.ledger.mark_completed(&item_id)?;
        self.scheduler.stats_mut().items_completed += 1;
        self.ledger.stats_mut().items_completed += 1;
        tracing::info!("item complete: {}", item_id);
        Ok(())
    }

    fn fail_item(&mut self, item_id: &str) -> Result<(), LoomError> {
        self.advance(item_id, "failed", ItemState::failed);
        self.listing_fields.remove(item_id);
        self.ledger.mark_failed(item_id)?;
        self.scheduler.stats_mut().items_failed += 1;
        self.ledger.stats_mut().items_failed += 1;
        Ok(())
    }

    /// Applies one state-machine transition for an item
    ///
    /// An invalid transition is an orchestration bug; it is logged loudly
    /// but never aborts the run, because a page-level inconsistency must not
    /// cost the rest of the crawl.
    fn advance(
        &mut self,
        item_id: &str,
        action: &str,
        transition: impl FnOnce(ItemState) -> Result<ItemState, TransitionError>,
    ) {
        let Some(state) = self.items.get_mut(item_id) else {
            tracing::warn!("no tracked state for item {} during {}", item_id, action);
            return;
        };
        match transition(*state) {
            Ok(next) => *state = next,
            Err(e) => tracing::error!("item {}: {}", item_id, e),
        }
    }

    // ===== Shutdown =====

    fn finish(mut self, started: Instant) -> Result<CrawlSummary, LoomError> {
        let cancelled = self.cancel.is_cancelled();

        // Items neither completed nor failed stay out of both terminal sets;
        // the next run rediscovers them and re-fetches their detail pages.
        let mut unresolved: Vec<String> = self
            .items
            .iter()
            .filter(|(_, state)| state.is_active())
            .map(|(id, _)| id.clone())
            .collect();
        unresolved.sort_unstable();

        if !unresolved.is_empty() {
            tracing::warn!(
                "{} items left unresolved; a later run resumes them",
                unresolved.len()
            );
        }

        self.ledger.finish()?;

        let stats = self.scheduler.stats().clone();
        let summary = CrawlSummary {
            failed_pages: self.ledger.failed_pages().iter().copied().collect(),
            failed_items: self
                .ledger
                .failed_items()
                .iter()
                .map(|id| id.to_string())
                .collect(),
            unresolved_items: unresolved,
            elapsed: started.elapsed(),
            cancelled,
            stats,
        };

        tracing::info!(
            "crawl finished: {} items completed, {} failed, {:.1}s elapsed",
            summary.stats.items_completed,
            summary.stats.items_failed,
            summary.elapsed.as_secs_f64()
        );

        Ok(summary)
    }
}
