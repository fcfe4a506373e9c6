//! Bounded-concurrency request dispatcher
//!
//! The scheduler owns the request queue, dispatches at most the configured
//! number of fetches at a time, and routes every outcome back to the
//! pipeline over a channel. Backoff is enforced here: a request whose
//! not-before time is in the future is held back without counting against
//! the concurrency limit.

use crate::crawler::fetcher::{Document, Fetcher, TransportError};
use crate::request::PageRequest;
use crate::stats::StatsCollector;
use std::collections::BinaryHeap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, Semaphore};

/// A settled fetch, routed back to the stage handlers
#[derive(Debug)]
pub struct FetchEvent {
    pub request: PageRequest,
    pub result: Result<Document, TransportError>,
}

/// Priority queue plus in-flight accounting around the fetcher
pub struct Scheduler {
    queue: BinaryHeap<PageRequest>,
    semaphore: Arc<Semaphore>,
    in_flight: usize,
    fetcher: Arc<dyn Fetcher>,
    events: mpsc::Sender<FetchEvent>,
    deadline: Duration,
    stats: StatsCollector,
}

impl Scheduler {
    /// Creates a scheduler dispatching through `fetcher`
    ///
    /// # Arguments
    ///
    /// * `fetcher` - Transport collaborator fetches are dispatched through
    /// * `concurrency` - Maximum in-flight fetches at any time
    /// * `deadline` - Per-request fetch deadline
    /// * `events` - Channel settled fetches are routed back on
    pub fn new(
        fetcher: Arc<dyn Fetcher>,
        concurrency: usize,
        deadline: Duration,
        events: mpsc::Sender<FetchEvent>,
    ) -> Self {
        Self {
            queue: BinaryHeap::new(),
            semaphore: Arc::new(Semaphore::new(concurrency.max(1))),
            in_flight: 0,
            fetcher,
            events,
            deadline,
            stats: StatsCollector::new(),
        }
    }

    /// Adds a request to the queue
    pub fn enqueue(&mut self, request: PageRequest) {
        tracing::trace!(
            "enqueue {} {} (priority {}, attempt {})",
            request.stage,
            request.url,
            request.priority,
            request.attempt
        );
        self.queue.push(request);
    }

    /// Dispatches every eligible queued request up to the concurrency limit
    ///
    /// Requests still inside their backoff window are put back untouched.
    /// Returns the wait until the soonest held-back request becomes
    /// eligible, so the caller knows when pumping again is worthwhile.
    pub fn pump(&mut self, now: Instant) -> Option<Duration> {
        let mut held: Vec<PageRequest> = Vec::new();
        let mut next_ready: Option<Duration> = None;

        while let Some(request) = self.queue.pop() {
            if !request.is_eligible(now) {
                if let Some(not_before) = request.not_before {
                    let wait = not_before.saturating_duration_since(now);
                    next_ready = Some(match next_ready {
                        Some(current) if current < wait => current,
                        _ => wait,
                    });
                }
                held.push(request);
                continue;
            }

            match Arc::clone(&self.semaphore).try_acquire_owned() {
                Ok(permit) => self.dispatch(request, permit),
                Err(_) => {
                    // At capacity; nothing frees a permit inside this call
                    held.push(request);
                    break;
                }
            }
        }

        for request in held {
            self.queue.push(request);
        }

        next_ready
    }

    fn dispatch(&mut self, request: PageRequest, permit: tokio::sync::OwnedSemaphorePermit) {
        self.in_flight += 1;
        self.stats.attempts += 1;
        tracing::debug!("dispatching {} {}", request.stage, request.url);

        let fetcher = Arc::clone(&self.fetcher);
        let events = self.events.clone();
        let deadline = self.deadline;

        tokio::spawn(async move {
            let result = fetcher.fetch(&request.url, deadline).await;
            // The permit must be released before the outcome is visible:
            // the pipeline re-pumps on receipt and expects the slot free.
            drop(permit);
            if events.send(FetchEvent { request, result }).await.is_err() {
                tracing::warn!("event receiver dropped; discarding fetch outcome");
            }
        });
    }

    /// Records that one dispatched fetch has been received and handled
    pub fn mark_settled(&mut self) {
        self.in_flight = self.in_flight.saturating_sub(1);
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    /// True while anything is queued or airborne
    pub fn has_work(&self) -> bool {
        !self.queue.is_empty() || self.in_flight > 0
    }

    pub fn stats(&self) -> &StatsCollector {
        &self.stats
    }

    pub fn stats_mut(&mut self) -> &mut StatsCollector {
        &mut self.stats
    }
}
