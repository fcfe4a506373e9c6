/// Item lifecycle state machine
///
/// Every item moves through `Discovered -> DetailFetched -> TabsPending(n)
/// -> Complete`, short-circuiting to `Complete` when a detail page lists no
/// tabs, or to `Failed` when retries for one of its requests are exhausted.
use std::fmt;
use thiserror::Error;

/// The lifecycle state of one item
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemState {
    /// Item id seen on a listing page; detail request enqueued
    Discovered,

    /// Detail page fetched and extracted; barrier not yet opened
    DetailFetched,

    /// Waiting on `n` outstanding tab fetches
    TabsPending(u32),

    /// All sections joined; record emitted
    Complete,

    /// Retries exhausted for a request belonging to this item
    Failed,
}

/// A transition the state machine does not allow
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("cannot {action} from {from}")]
pub struct TransitionError {
    pub from: ItemState,
    pub action: &'static str,
}

impl ItemState {
    /// Returns true if this is a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::Failed)
    }

    /// Returns true if the item is still in flight
    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }

    /// Discovered -> DetailFetched, on successful detail fetch + extraction
    pub fn detail_fetched(self) -> Result<Self, TransitionError> {
        match self {
            Self::Discovered => Ok(Self::DetailFetched),
            from => Err(TransitionError {
                from,
                action: "record detail fetch",
            }),
        }
    }

    /// DetailFetched -> TabsPending(n) for n > 0, or directly -> Complete for n = 0
    pub fn tabs_opened(self, expected: u32) -> Result<Self, TransitionError> {
        match self {
            Self::DetailFetched if expected == 0 => Ok(Self::Complete),
            Self::DetailFetched => Ok(Self::TabsPending(expected)),
            from => Err(TransitionError {
                from,
                action: "open tab barrier",
            }),
        }
    }

    /// TabsPending(n) -> TabsPending(n-1), or -> Complete when the last tab arrives
    pub fn tab_arrived(self) -> Result<Self, TransitionError> {
        match self {
            Self::TabsPending(1) => Ok(Self::Complete),
            Self::TabsPending(n) if n > 1 => Ok(Self::TabsPending(n - 1)),
            from => Err(TransitionError {
                from,
                action: "count a tab arrival",
            }),
        }
    }

    /// Any active state -> Failed
    pub fn failed(self) -> Result<Self, TransitionError> {
        match self {
            from if from.is_terminal() => Err(TransitionError {
                from,
                action: "fail",
            }),
            _ => Ok(Self::Failed),
        }
    }
}

impl fmt::Display for ItemState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Discovered => write!(f, "discovered"),
            Self::DetailFetched => write!(f, "detail_fetched"),
            Self::TabsPending(n) => write!(f, "tabs_pending({})", n),
            Self::Complete => write!(f, "complete"),
            Self::Failed => write!(f, "failed"),
        }
    }
}
