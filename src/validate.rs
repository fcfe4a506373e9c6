//! Listing-page validation
//!
//! Classifies a fetched listing document before any extraction happens. A
//! page is invalid when its structural markers are missing or the body is
//! implausibly short; a valid page additionally reports how many item blocks
//! it carries so short pages can be retried as soft failures.

use crate::config::ValidatorConfig;
use std::fmt;

/// Why a listing page was judged invalid
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvalidReason {
    /// The repeating item-block marker never appears
    MissingItemMarker,

    /// The structural container marker never appears
    MissingContainerMarker,

    /// Body is below the minimum plausible size
    BodyTooShort { length: usize },
}

impl fmt::Display for InvalidReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingItemMarker => write!(f, "item-block marker absent"),
            Self::MissingContainerMarker => write!(f, "container marker absent"),
            Self::BodyTooShort { length } => {
                write!(f, "body too short ({} bytes)", length)
            }
        }
    }
}

/// Result of validating a listing page
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageValidity {
    /// Page is usable and carries `block_count` item blocks
    Valid { block_count: usize },

    /// Page is structurally unusable
    Invalid(InvalidReason),
}

/// Validates listing documents against configured structural markers
#[derive(Debug, Clone)]
pub struct PageValidator {
    item_marker: String,
    container_marker: String,
    min_body_bytes: usize,
    min_blocks: usize,
}

impl PageValidator {
    pub fn new(config: &ValidatorConfig) -> Self {
        Self {
            item_marker: config.item_marker.clone(),
            container_marker: config.container_marker.clone(),
            min_body_bytes: config.min_body_bytes,
            min_blocks: config.min_blocks,
        }
    }

    /// Classifies a fetched listing document
    ///
    /// The size check runs first: a truncated response is rejected even when
    /// the fragment that did arrive happens to contain both markers.
    pub fn validate(&self, body: &str) -> PageValidity {
        if body.len() < self.min_body_bytes {
            return PageValidity::Invalid(InvalidReason::BodyTooShort { length: body.len() });
        }

        let block_count = body.matches(self.item_marker.as_str()).count();
        if block_count == 0 {
            return PageValidity::Invalid(InvalidReason::MissingItemMarker);
        }

        if !body.contains(self.container_marker.as_str()) {
            return PageValidity::Invalid(InvalidReason::MissingContainerMarker);
        }

        PageValidity::Valid { block_count }
    }

    /// Whether a valid page's block count is below the expected minimum
    ///
    /// A shortfall is a soft failure: retried up to the validation cap, then
    /// accepted as-is. Partial data beats none.
    pub fn is_shortfall(&self, block_count: usize) -> bool {
        block_count < self.min_blocks
    }

    pub fn min_blocks(&self) -> usize {
        self.min_blocks
    }
}
