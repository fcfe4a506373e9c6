//! Retry policy and backoff
//!
//! Tracks attempts per (URL, stage) and decides whether a failed request is
//! retried or abandoned. Transport and content-validation failures are
//! counted independently, each against its own cap. Backoff is exponential
//! with multiplicative jitter so a burst of simultaneous failures does not
//! come back as a synchronized retry storm.

use crate::config::RetryConfig;
use crate::request::{PageRequest, Stage, RETRY_PRIORITY};
use std::collections::HashMap;
use std::time::Duration;

/// How a request failed, for attempt accounting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Network error, timeout, or retryable HTTP status
    Transport,

    /// Page fetched but structurally unusable or short on item blocks
    Validation,
}

/// The policy's verdict for a failed request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Re-enqueue after `delay` at `priority`
    Retry { delay: Duration, priority: u32 },

    /// Attempts exhausted; record the failure and stop scheduling
    GiveUp,
}

/// Attempt counters for one (URL, stage) identity
///
/// Held in memory only; a crash resets attempt counts, which is acceptable
/// because the ledger prevents redundant work on completed items.
#[derive(Debug, Default, Clone)]
struct RetryState {
    transport_attempts: u32,
    validation_attempts: u32,
}

/// Per-request retry decisions with exponential backoff
pub struct RetryPolicy {
    config: RetryConfig,
    states: HashMap<(String, Stage), RetryState>,
}

impl RetryPolicy {
    pub fn new(config: RetryConfig) -> Self {
        Self {
            config,
            states: HashMap::new(),
        }
    }

    /// Whether an HTTP status is in the configured retryable set
    pub fn is_retryable_status(&self, status: u16) -> bool {
        self.config.retryable_statuses.contains(&status)
    }

    /// Records one failure and decides what happens to the request
    ///
    /// The attempt count is the policy's own, keyed by URL and stage, so a
    /// re-created request cannot reset its history.
    pub fn decide(&mut self, request: &PageRequest, kind: FailureKind) -> RetryDecision {
        let state = self.states.entry(request.retry_key()).or_default();

        let (attempts, cap) = match kind {
            FailureKind::Transport => {
                state.transport_attempts += 1;
                (state.transport_attempts, self.config.transport_attempts)
            }
            FailureKind::Validation => {
                state.validation_attempts += 1;
                (state.validation_attempts, self.config.validation_attempts)
            }
        };

        if attempts > cap {
            return RetryDecision::GiveUp;
        }

        RetryDecision::Retry {
            delay: self.backoff_delay(attempts),
            priority: RETRY_PRIORITY,
        }
    }

    /// Forgets accumulated attempts for a request (after it succeeds)
    pub fn clear(&mut self, request: &PageRequest) {
        self.states.remove(&request.retry_key());
    }

    /// Exponential backoff with jitter: attempt n waits base * 2^(n-1),
    /// capped, then stretched by up to the jitter factor.
    fn backoff_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        let raw = self
            .config
            .base_delay_ms
            .saturating_mul(1u64 << exponent)
            .min(self.config.max_delay_ms);

        let jittered = raw as f64 * (1.0 + fastrand::f64() * self.config.jitter);
        Duration::from_millis(jittered as u64)
    }
}
