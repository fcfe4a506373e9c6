//! Page requests and queue ordering
//!
//! A [`PageRequest`] is immutable once enqueued; retrying produces a new
//! request with the attempt count bumped and a not-before time attached.
//! The scheduler's queue orders requests by priority (descending), then by
//! eligibility time (ascending).

use std::cmp::Ordering;
use std::time::{Duration, Instant};
use url::Url;

/// Default priority for seeded listing-page requests
pub const LISTING_PRIORITY: u32 = 0;

/// Priority for item detail-page requests
pub const DETAIL_PRIORITY: u32 = 5;

/// Priority for tab-page requests
pub const TAB_PRIORITY: u32 = 5;

/// Priority assigned to retried requests so they jump the queue
pub const RETRY_PRIORITY: u32 = 10;

/// The crawl stage a request belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    /// A paginated listing page enumerating item blocks
    Listing,

    /// The primary page for one item
    Detail,

    /// A sub-page contributing one section of an item's data
    Tab,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Listing => "listing",
            Self::Detail => "detail",
            Self::Tab => "tab",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single fetch request flowing through the scheduler
#[derive(Debug, Clone)]
pub struct PageRequest {
    /// The URL to fetch
    pub url: Url,

    /// Which stage handler the response is routed to
    pub stage: Stage,

    /// Listing page number (listing requests only)
    pub page_number: Option<u32>,

    /// Owning item id (detail and tab requests)
    pub parent_item: Option<String>,

    /// Tab key (tab requests only)
    pub tab_key: Option<String>,

    /// Tab title as it appeared in the navigation (tab requests only)
    pub tab_title: Option<String>,

    /// How many times this request has been attempted
    pub attempt: u32,

    /// Queue priority; higher values are dispatched first
    pub priority: u32,

    /// Earliest time this request may be dispatched; None means immediately
    pub not_before: Option<Instant>,
}

impl PageRequest {
    /// Creates a seeded listing-page request
    pub fn listing(url: Url, page_number: u32) -> Self {
        Self {
            url,
            stage: Stage::Listing,
            page_number: Some(page_number),
            parent_item: None,
            tab_key: None,
            tab_title: None,
            attempt: 0,
            priority: LISTING_PRIORITY,
            not_before: None,
        }
    }

    /// Creates a detail-page request; the item id is the detail URL itself
    pub fn detail(url: Url) -> Self {
        let item_id = url.to_string();
        Self {
            url,
            stage: Stage::Detail,
            page_number: None,
            parent_item: Some(item_id),
            tab_key: None,
            tab_title: None,
            attempt: 0,
            priority: DETAIL_PRIORITY,
            not_before: None,
        }
    }

    /// Creates a tab-page request belonging to an item
    pub fn tab(url: Url, parent_item: String, tab_key: String, tab_title: String) -> Self {
        Self {
            url,
            stage: Stage::Tab,
            page_number: None,
            parent_item: Some(parent_item),
            tab_key: Some(tab_key),
            tab_title: Some(tab_title),
            attempt: 0,
            priority: TAB_PRIORITY,
            not_before: None,
        }
    }

    /// Derives the retried form of this request
    ///
    /// The original is left untouched; the copy carries attempt + 1, the
    /// given priority, and a not-before time `delay` from now.
    pub fn retried(&self, delay: Duration, priority: u32) -> Self {
        let mut next = self.clone();
        next.attempt = self.attempt + 1;
        next.priority = priority;
        next.not_before = Some(Instant::now() + delay);
        next
    }

    /// Whether this request may be dispatched at `now`
    pub fn is_eligible(&self, now: Instant) -> bool {
        self.not_before.map_or(true, |t| t <= now)
    }

    /// Identity used to key retry state: URL plus stage
    pub fn retry_key(&self) -> (String, Stage) {
        (self.url.to_string(), self.stage)
    }
}

// Heap ordering: higher priority first, then earlier eligibility, then URL
// for a deterministic tiebreak. BinaryHeap pops the greatest element.
impl Ord for PageRequest {
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.not_before.cmp(&self.not_before))
            .then_with(|| other.url.as_str().cmp(self.url.as_str()))
    }
}

impl PartialOrd for PageRequest {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for PageRequest {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.stage == other.stage && self.url == other.url
    }
}

impl Eq for PageRequest {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BinaryHeap;

    fn url(path: &str) -> Url {
        Url::parse(&format!("https://example.com{}", path)).unwrap()
    }

    #[test]
    fn test_listing_request_defaults() {
        let req = PageRequest::listing(url("/items/?page=3"), 3);
        assert_eq!(req.stage, Stage::Listing);
        assert_eq!(req.page_number, Some(3));
        assert_eq!(req.attempt, 0);
        assert_eq!(req.priority, LISTING_PRIORITY);
        assert!(req.not_before.is_none());
    }

    #[test]
    fn test_detail_request_derives_item_id_from_url() {
        let req = PageRequest::detail(url("/items/widget-1/"));
        assert_eq!(req.stage, Stage::Detail);
        assert_eq!(
            req.parent_item.as_deref(),
            Some("https://example.com/items/widget-1/")
        );
    }

    #[test]
    fn test_tab_request_carries_parent_and_key() {
        let req = PageRequest::tab(
            url("/items/widget-1/specs"),
            "item-1".to_string(),
            "specsTab".to_string(),
            "Specs".to_string(),
        );
        assert_eq!(req.parent_item.as_deref(), Some("item-1"));
        assert_eq!(req.tab_key.as_deref(), Some("specsTab"));
        assert_eq!(req.tab_title.as_deref(), Some("Specs"));
    }

    #[test]
    fn test_retried_is_a_new_request() {
        let req = PageRequest::listing(url("/items/?page=1"), 1);
        let retry = req.retried(Duration::from_secs(2), RETRY_PRIORITY);

        // original untouched
        assert_eq!(req.attempt, 0);
        assert!(req.not_before.is_none());

        assert_eq!(retry.attempt, 1);
        assert_eq!(retry.priority, RETRY_PRIORITY);
        assert!(retry.not_before.is_some());
        assert!(!retry.is_eligible(Instant::now()));
    }

    #[test]
    fn test_eligibility() {
        let now = Instant::now();
        let mut req = PageRequest::listing(url("/items/?page=1"), 1);
        assert!(req.is_eligible(now));

        req.not_before = Some(now + Duration::from_secs(5));
        assert!(!req.is_eligible(now));
        assert!(req.is_eligible(now + Duration::from_secs(6)));
    }

    #[test]
    fn test_heap_orders_by_priority_descending() {
        let mut heap = BinaryHeap::new();
        heap.push(PageRequest::listing(url("/a"), 1));
        heap.push(PageRequest::detail(url("/b")));
        let mut retry = PageRequest::listing(url("/c"), 2);
        retry.priority = RETRY_PRIORITY;
        heap.push(retry);

        assert_eq!(heap.pop().unwrap().priority, RETRY_PRIORITY);
        assert_eq!(heap.pop().unwrap().priority, DETAIL_PRIORITY);
        assert_eq!(heap.pop().unwrap().priority, LISTING_PRIORITY);
    }

    #[test]
    fn test_heap_prefers_earlier_eligibility_at_equal_priority() {
        let now = Instant::now();
        let mut early = PageRequest::detail(url("/early"));
        early.not_before = Some(now + Duration::from_secs(1));
        let mut late = PageRequest::detail(url("/late"));
        late.not_before = Some(now + Duration::from_secs(10));

        let mut heap = BinaryHeap::new();
        heap.push(late);
        heap.push(early);

        assert_eq!(heap.pop().unwrap().url.path(), "/early");
    }

    #[test]
    fn test_immediately_eligible_sorts_before_delayed() {
        let mut delayed = PageRequest::detail(url("/delayed"));
        delayed.not_before = Some(Instant::now() + Duration::from_secs(30));
        let ready = PageRequest::detail(url("/ready"));

        let mut heap = BinaryHeap::new();
        heap.push(delayed);
        heap.push(ready);

        assert_eq!(heap.pop().unwrap().url.path(), "/ready");
    }

    #[test]
    fn test_retry_key_distinguishes_stages() {
        let listing = PageRequest::listing(url("/same"), 1);
        let mut detail = PageRequest::detail(url("/same"));
        detail.parent_item = Some("x".to_string());
        assert_ne!(listing.retry_key(), detail.retry_key());
    }
}
