use serde::Deserialize;
use std::collections::BTreeMap;

/// Main configuration structure for Catalog-Loom
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub crawler: CrawlerConfig,
    #[serde(rename = "user-agent")]
    pub user_agent: UserAgentConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub validator: ValidatorConfig,
    pub extractor: ExtractorConfig,
    pub output: OutputConfig,
}

/// Crawler behavior configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CrawlerConfig {
    /// Base URL of the paginated listing (page numbers are appended as a query parameter)
    #[serde(rename = "listing-url")]
    pub listing_url: String,

    /// Number of listing pages to seed
    #[serde(rename = "page-count")]
    pub page_count: u32,

    /// Maximum number of concurrent in-flight fetches
    #[serde(rename = "max-concurrent-fetches")]
    pub max_concurrent_fetches: u32,

    /// Per-request fetch deadline (seconds)
    #[serde(rename = "fetch-timeout-secs")]
    pub fetch_timeout_secs: u64,

    /// Minimum time between request starts (milliseconds)
    #[serde(rename = "request-delay-ms")]
    pub request_delay_ms: u64,

    /// Ledger mutations between automatic snapshots
    #[serde(rename = "snapshot-every", default = "default_snapshot_every")]
    pub snapshot_every: u32,
}

fn default_snapshot_every() -> u32 {
    25
}

/// User agent identification configuration
#[derive(Debug, Clone, Deserialize)]
pub struct UserAgentConfig {
    /// Name of the crawler
    #[serde(rename = "crawler-name")]
    pub crawler_name: String,

    /// Version of the crawler
    #[serde(rename = "crawler-version")]
    pub crawler_version: String,

    /// URL with information about the crawler
    #[serde(rename = "contact-url")]
    pub contact_url: String,

    /// Email address for crawler-related contact
    #[serde(rename = "contact-email")]
    pub contact_email: String,
}

/// Retry and backoff configuration
#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
    /// Base backoff delay (milliseconds); attempt n waits base * 2^(n-1)
    #[serde(rename = "base-delay-ms", default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Upper bound on a single backoff delay (milliseconds)
    #[serde(rename = "max-delay-ms", default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Maximum attempts for transport failures before giving up
    #[serde(rename = "transport-attempts", default = "default_attempt_cap")]
    pub transport_attempts: u32,

    /// Maximum attempts for content-validation failures before giving up
    #[serde(rename = "validation-attempts", default = "default_attempt_cap")]
    pub validation_attempts: u32,

    /// Multiplicative jitter factor in [0, 1]; 0.25 stretches a delay by up to 25%
    #[serde(default = "default_jitter")]
    pub jitter: f64,

    /// HTTP status codes treated as retryable transport failures
    #[serde(rename = "retryable-statuses", default = "default_retryable_statuses")]
    pub retryable_statuses: Vec<u16>,
}

fn default_base_delay_ms() -> u64 {
    2000
}

fn default_max_delay_ms() -> u64 {
    300_000
}

fn default_attempt_cap() -> u32 {
    3
}

fn default_jitter() -> f64 {
    0.25
}

fn default_retryable_statuses() -> Vec<u16> {
    vec![500, 502, 503, 504, 408, 429, 403]
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            transport_attempts: default_attempt_cap(),
            validation_attempts: default_attempt_cap(),
            jitter: default_jitter(),
            retryable_statuses: default_retryable_statuses(),
        }
    }
}

/// Listing-page validation configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ValidatorConfig {
    /// Marker that every item block on a listing page carries
    #[serde(rename = "item-marker", default = "default_item_marker")]
    pub item_marker: String,

    /// Structural container marker a well-formed listing page carries
    #[serde(rename = "container-marker", default = "default_container_marker")]
    pub container_marker: String,

    /// Minimum plausible body size in bytes
    #[serde(rename = "min-body-bytes", default = "default_min_body_bytes")]
    pub min_body_bytes: usize,

    /// Minimum expected item blocks per listing page; fewer is a soft failure
    #[serde(rename = "min-blocks", default = "default_min_blocks")]
    pub min_blocks: usize,
}

fn default_item_marker() -> String {
    "itemCard".to_string()
}

fn default_container_marker() -> String {
    "listingContainer".to_string()
}

fn default_min_body_bytes() -> usize {
    1000
}

fn default_min_blocks() -> usize {
    10
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            item_marker: default_item_marker(),
            container_marker: default_container_marker(),
            min_body_bytes: default_min_body_bytes(),
            min_blocks: default_min_blocks(),
        }
    }
}

/// CSS selector configuration for the default extractor
#[derive(Debug, Clone, Deserialize)]
pub struct ExtractorConfig {
    /// Selector matching one item block on a listing page
    #[serde(rename = "item-selector")]
    pub item_selector: String,

    /// Selector (inside an item block) for the anchor linking to the detail page
    #[serde(rename = "link-selector")]
    pub link_selector: String,

    /// Listing-block field selectors: field name -> selector inside the block
    #[serde(default)]
    pub fields: BTreeMap<String, String>,

    /// Detail-page field selectors: field name -> selector
    #[serde(rename = "detail-fields", default)]
    pub detail_fields: BTreeMap<String, String>,

    /// Selector for the tab navigation anchors on a detail page
    #[serde(rename = "tab-nav-selector")]
    pub tab_nav_selector: String,

    /// Tab titles to skip entirely
    #[serde(rename = "excluded-tabs", default)]
    pub excluded_tabs: Vec<String>,

    /// Selector for one content section on a tab page
    #[serde(rename = "tab-section-selector")]
    pub tab_section_selector: String,

    /// Selector for a section's title inside a section block
    #[serde(rename = "tab-section-title-selector")]
    pub tab_section_title_selector: String,

    /// Selector for a section's body inside a section block
    #[serde(rename = "tab-section-body-selector")]
    pub tab_section_body_selector: String,
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// Path to the progress ledger snapshot file
    #[serde(rename = "ledger-path")]
    pub ledger_path: String,

    /// Path to the JSON-lines file completed item records are appended to
    #[serde(rename = "records-path")]
    pub records_path: String,
}
