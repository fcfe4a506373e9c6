//! Integration tests for the crawler
//!
//! These tests use wiremock to mock the catalog site and run the full
//! pipeline end-to-end: listing pages fan out into detail pages, detail
//! pages into tab pages, and assembled records land in the JSON-lines sink.

use catalog_loom::config::{
    Config, CrawlerConfig, ExtractorConfig, OutputConfig, RetryConfig, UserAgentConfig,
    ValidatorConfig,
};
use catalog_loom::crawler::crawl;
use catalog_loom::ledger::ProgressLedger;
use std::collections::BTreeMap;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Creates a test configuration against the given mock server
fn create_test_config(base_url: &str, out_dir: &TempDir, page_count: u32) -> Config {
    let mut fields = BTreeMap::new();
    fields.insert("title".to_string(), "h3 a".to_string());

    let mut detail_fields = BTreeMap::new();
    detail_fields.insert("description".to_string(), "div.overview".to_string());

    Config {
        crawler: CrawlerConfig {
            listing_url: format!("{}/items/", base_url),
            page_count,
            max_concurrent_fetches: 2,
            fetch_timeout_secs: 5,
            request_delay_ms: 0, // No pacing in tests
            snapshot_every: 1000,
        },
        user_agent: UserAgentConfig {
            crawler_name: "TestBot".to_string(),
            crawler_version: "1.0.0".to_string(),
            contact_url: "https://example.com/contact".to_string(),
            contact_email: "test@example.com".to_string(),
        },
        retry: RetryConfig {
            base_delay_ms: 1,
            max_delay_ms: 10,
            transport_attempts: 2,
            validation_attempts: 3,
            jitter: 0.0,
            retryable_statuses: vec![500, 502, 503, 504, 408, 429, 403],
        },
        validator: ValidatorConfig {
            item_marker: "itemCard".to_string(),
            container_marker: "listingContainer".to_string(),
            min_body_bytes: 50,
            min_blocks: 1,
        },
        extractor: ExtractorConfig {
            item_selector: "div.itemCard".to_string(),
            link_selector: "h3 a".to_string(),
            fields,
            detail_fields,
            tab_nav_selector: "nav.tabs a".to_string(),
            excluded_tabs: vec!["Gallery".to_string()],
            tab_section_selector: "div.section".to_string(),
            tab_section_title_selector: "h2".to_string(),
            tab_section_body_selector: "div.body".to_string(),
        },
        output: OutputConfig {
            ledger_path: out_dir
                .path()
                .join("progress.json")
                .to_string_lossy()
                .to_string(),
            records_path: out_dir
                .path()
                .join("records.jsonl")
                .to_string_lossy()
                .to_string(),
        },
    }
}

/// Builds a listing page body with one item block per slug
fn listing_page(slugs: &[&str]) -> String {
    let mut body = String::from("<html><body><div class=\"listingContainer\">");
    for slug in slugs {
        body.push_str(&format!(
            "<div class=\"itemCard\"><h3><a href=\"/items/{}/\">Item {}</a></h3></div>",
            slug, slug
        ));
    }
    body.push_str("</div></body></html>");
    body
}

/// Builds a detail page body with the given tab links
fn detail_page(slug: &str, tabs: &[&str]) -> String {
    let mut body = format!(
        "<html><body><div class=\"overview\">About {}.</div><nav class=\"tabs\">",
        slug
    );
    for tab in tabs {
        body.push_str(&format!(
            "<a href=\"/items/{}/{}\">{}</a>",
            slug,
            tab.to_lowercase(),
            tab
        ));
    }
    body.push_str("</nav></body></html>");
    body
}

/// Builds a tab page body with one titled section
fn tab_page(heading: &str, content: &str) -> String {
    format!(
        "<html><body><div class=\"section\"><h2>{}</h2><div class=\"body\"><p>{}</p></div></div></body></html>",
        heading, content
    )
}

/// Reads the emitted records back, keyed by item id
fn read_records(config: &Config) -> BTreeMap<String, serde_json::Value> {
    let content = std::fs::read_to_string(&config.output.records_path).unwrap_or_default();
    content
        .lines()
        .map(|line| {
            let value: serde_json::Value = serde_json::from_str(line).expect("valid JSON line");
            (value["item_id"].as_str().unwrap().to_string(), value)
        })
        .collect()
}

#[tokio::test]
async fn test_full_crawl_assembles_records() {
    let server = MockServer::start().await;
    let out_dir = TempDir::new().unwrap();
    let config = create_test_config(&server.uri(), &out_dir, 1);

    // One listing page with two items
    Mock::given(method("GET"))
        .and(path("/items/"))
        .and(query_param("page", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_string(listing_page(&["alpha", "beta"])))
        .mount(&server)
        .await;

    // Alpha has two tabs (Gallery is excluded by config)
    Mock::given(method("GET"))
        .and(path("/items/alpha/"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(detail_page("alpha", &["Specs", "Pricing", "Gallery"])),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/items/alpha/specs"))
        .respond_with(ResponseTemplate::new(200).set_body_string(tab_page("Dimensions", "10 x 10")))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/items/alpha/pricing"))
        .respond_with(ResponseTemplate::new(200).set_body_string(tab_page("List Price", "$10")))
        .mount(&server)
        .await;

    // Gallery must never be fetched
    Mock::given(method("GET"))
        .and(path("/items/alpha/gallery"))
        .respond_with(ResponseTemplate::new(200).set_body_string("should not happen"))
        .expect(0)
        .mount(&server)
        .await;

    // Beta has no tabs: completes straight from its detail page
    Mock::given(method("GET"))
        .and(path("/items/beta/"))
        .respond_with(ResponseTemplate::new(200).set_body_string(detail_page("beta", &[])))
        .mount(&server)
        .await;

    let summary = crawl(config.clone(), "hash-1", true, CancellationToken::new())
        .await
        .expect("crawl failed");

    assert_eq!(summary.stats.pages_processed, 1);
    assert_eq!(summary.stats.items_discovered, 2);
    assert_eq!(summary.stats.items_completed, 2);
    assert_eq!(summary.stats.items_failed, 0);
    assert!(summary.failed_pages.is_empty());
    assert!(summary.failed_items.is_empty());
    assert!(summary.unresolved_items.is_empty());

    let records = read_records(&config);
    assert_eq!(records.len(), 2);

    let alpha = &records[&format!("{}/items/alpha/", server.uri())];
    assert_eq!(alpha["fields"]["title"], "Item alpha");
    assert_eq!(alpha["fields"]["description"], "About alpha.");
    assert_eq!(alpha["tabs"]["specsTab"]["tab"], "Specs");
    assert_eq!(
        alpha["tabs"]["specsTab"]["blocks"][0]["title"],
        "Dimensions"
    );
    assert_eq!(alpha["tabs"]["pricingTab"]["blocks"][0]["body"], "<p>$10</p>");
    assert!(alpha["tabs"]["galleryTab"].is_null());

    let beta = &records[&format!("{}/items/beta/", server.uri())];
    assert_eq!(beta["fields"]["description"], "About beta.");
    assert_eq!(beta["tabs"], serde_json::json!({}));
}

#[tokio::test]
async fn test_resume_skips_completed_items() {
    let server = MockServer::start().await;
    let out_dir = TempDir::new().unwrap();
    let config = create_test_config(&server.uri(), &out_dir, 1);

    // Pre-populate the ledger: alpha already completed in a previous run
    let alpha_id = format!("{}/items/alpha/", server.uri());
    {
        let mut ledger = ProgressLedger::new(&config.output.ledger_path, "hash-1", 1000);
        ledger.mark_completed(&alpha_id).unwrap();
        ledger.snapshot().unwrap();
    }

    Mock::given(method("GET"))
        .and(path("/items/"))
        .and(query_param("page", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_string(listing_page(&["alpha", "beta"])))
        .mount(&server)
        .await;

    // Alpha's detail page must never be re-fetched
    Mock::given(method("GET"))
        .and(path("/items/alpha/"))
        .respond_with(ResponseTemplate::new(200).set_body_string(detail_page("alpha", &[])))
        .expect(0)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/items/beta/"))
        .respond_with(ResponseTemplate::new(200).set_body_string(detail_page("beta", &[])))
        .mount(&server)
        .await;

    let summary = crawl(config.clone(), "hash-1", false, CancellationToken::new())
        .await
        .expect("crawl failed");

    assert_eq!(summary.stats.items_skipped, 1);
    assert_eq!(summary.stats.items_discovered, 1);
    assert_eq!(summary.stats.items_completed, 1);

    // Only beta was emitted this run
    let records = read_records(&config);
    assert_eq!(records.len(), 1);
    assert!(records.contains_key(&format!("{}/items/beta/", server.uri())));

    // Alpha is still completed in the ledger
    let ledger = ProgressLedger::open(&config.output.ledger_path, "hash-1", 1000, false).unwrap();
    assert!(ledger.is_completed(&alpha_id));
}

#[tokio::test]
async fn test_permanently_failed_tab_still_completes_item() {
    let server = MockServer::start().await;
    let out_dir = TempDir::new().unwrap();
    let config = create_test_config(&server.uri(), &out_dir, 1);

    Mock::given(method("GET"))
        .and(path("/items/"))
        .and(query_param("page", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_string(listing_page(&["alpha"])))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/items/alpha/"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string(detail_page("alpha", &["Specs", "Pricing"])),
        )
        .mount(&server)
        .await;

    // Specs fails on every attempt; the item must complete without it
    Mock::given(method("GET"))
        .and(path("/items/alpha/specs"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/items/alpha/pricing"))
        .respond_with(ResponseTemplate::new(200).set_body_string(tab_page("List Price", "$10")))
        .mount(&server)
        .await;

    let summary = crawl(config.clone(), "hash-1", true, CancellationToken::new())
        .await
        .expect("crawl failed");

    // Not stuck in TabsPending, not failed: completed with the section absent
    assert_eq!(summary.stats.items_completed, 1);
    assert_eq!(summary.stats.items_failed, 0);
    assert!(summary.unresolved_items.is_empty());
    assert!(summary.stats.give_ups >= 1);
    assert_eq!(summary.stats.tabs_absent, 1);

    let records = read_records(&config);
    let alpha = &records[&format!("{}/items/alpha/", server.uri())];
    assert!(alpha["tabs"]["specsTab"].is_null());
    assert_eq!(alpha["tabs"]["pricingTab"]["tab"], "Pricing");
}

#[tokio::test]
async fn test_short_listing_page_retried_then_accepted() {
    let server = MockServer::start().await;
    let out_dir = TempDir::new().unwrap();
    let mut config = create_test_config(&server.uri(), &out_dir, 1);
    config.validator.min_blocks = 10;

    let short_slugs: Vec<String> = (0..4).map(|i| format!("short-{}", i)).collect();
    let full_slugs: Vec<String> = (0..12).map(|i| format!("full-{}", i)).collect();

    // First two responses carry 4 blocks, every later one carries 12
    Mock::given(method("GET"))
        .and(path("/items/"))
        .and(query_param("page", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_string(listing_page(
            &short_slugs.iter().map(String::as_str).collect::<Vec<_>>(),
        )))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/items/"))
        .and(query_param("page", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_string(listing_page(
            &full_slugs.iter().map(String::as_str).collect::<Vec<_>>(),
        )))
        .mount(&server)
        .await;

    // Every detail page is tab-less
    Mock::given(method("GET"))
        .and(wiremock::matchers::path_regex(r"^/items/(short|full)-\d+/$"))
        .respond_with(ResponseTemplate::new(200).set_body_string(detail_page("generic", &[])))
        .mount(&server)
        .await;

    let summary = crawl(config.clone(), "hash-1", true, CancellationToken::new())
        .await
        .expect("crawl failed");

    // Two shortfall retries, then the 12-block page is the one processed
    assert!(summary.stats.retries >= 2);
    assert_eq!(summary.stats.pages_processed, 1);
    assert_eq!(summary.stats.items_discovered, 12);
    assert_eq!(summary.stats.items_completed, 12);
    assert_eq!(summary.stats.blocks_per_page.get(&1), Some(&12));
    assert!(summary.stats.short_pages.is_empty());

    let records = read_records(&config);
    assert_eq!(records.len(), 12);
    assert!(records
        .keys()
        .all(|id| id.contains("/items/full-")));
}

#[tokio::test]
async fn test_short_page_accepted_after_cap() {
    let server = MockServer::start().await;
    let out_dir = TempDir::new().unwrap();
    let mut config = create_test_config(&server.uri(), &out_dir, 1);
    config.validator.min_blocks = 10;

    // Every response is short: retried up to the cap, then accepted as-is
    Mock::given(method("GET"))
        .and(path("/items/"))
        .and(query_param("page", "1"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string(listing_page(&["a", "b", "c", "d"])),
        )
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(wiremock::matchers::path_regex(r"^/items/[a-d]/$"))
        .respond_with(ResponseTemplate::new(200).set_body_string(detail_page("generic", &[])))
        .mount(&server)
        .await;

    let summary = crawl(config, "hash-1", true, CancellationToken::new())
        .await
        .expect("crawl failed");

    // The shortfall is recorded, not fatal: partial data beats none
    assert_eq!(summary.stats.pages_processed, 1);
    assert_eq!(summary.stats.items_discovered, 4);
    assert_eq!(summary.stats.items_completed, 4);
    assert_eq!(summary.stats.short_pages.get(&1), Some(&4));
    assert!(summary.failed_pages.is_empty());
}

#[tokio::test]
async fn test_transient_listing_failure_retried() {
    let server = MockServer::start().await;
    let out_dir = TempDir::new().unwrap();
    let config = create_test_config(&server.uri(), &out_dir, 1);

    // 503 twice, then a good page
    Mock::given(method("GET"))
        .and(path("/items/"))
        .and(query_param("page", "1"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/items/"))
        .and(query_param("page", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_string(listing_page(&["alpha"])))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/items/alpha/"))
        .respond_with(ResponseTemplate::new(200).set_body_string(detail_page("alpha", &[])))
        .mount(&server)
        .await;

    let summary = crawl(config, "hash-1", true, CancellationToken::new())
        .await
        .expect("crawl failed");

    assert!(summary.stats.retries >= 2);
    assert_eq!(summary.stats.pages_processed, 1);
    assert_eq!(summary.stats.items_completed, 1);
    assert!(summary.failed_pages.is_empty());
}

#[tokio::test]
async fn test_exhausted_listing_page_marked_failed() {
    let server = MockServer::start().await;
    let out_dir = TempDir::new().unwrap();
    let config = create_test_config(&server.uri(), &out_dir, 1);

    // Permanently broken page
    Mock::given(method("GET"))
        .and(path("/items/"))
        .and(query_param("page", "1"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let summary = crawl(config, "hash-1", true, CancellationToken::new())
        .await
        .expect("crawl failed");

    assert_eq!(summary.stats.pages_processed, 0);
    assert_eq!(summary.failed_pages, vec![1]);
    assert!(summary.stats.give_ups >= 1);
    // Attempts are bounded: initial try plus the transport cap
    assert!(summary.stats.attempts <= 3);
}

#[tokio::test]
async fn test_non_retryable_status_fails_immediately() {
    let server = MockServer::start().await;
    let out_dir = TempDir::new().unwrap();
    let config = create_test_config(&server.uri(), &out_dir, 1);

    Mock::given(method("GET"))
        .and(path("/items/"))
        .and(query_param("page", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_string(listing_page(&["alpha"])))
        .mount(&server)
        .await;

    // 404 is not in the retryable set: exactly one attempt
    Mock::given(method("GET"))
        .and(path("/items/alpha/"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let summary = crawl(config, "hash-1", true, CancellationToken::new())
        .await
        .expect("crawl failed");

    assert_eq!(summary.stats.items_failed, 1);
    assert_eq!(summary.stats.items_completed, 0);
    assert_eq!(summary.failed_items.len(), 1);
}

#[tokio::test]
async fn test_cancelled_run_dispatches_nothing() {
    let server = MockServer::start().await;
    let out_dir = TempDir::new().unwrap();
    let config = create_test_config(&server.uri(), &out_dir, 1);

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string(listing_page(&["alpha"])))
        .mount(&server)
        .await;

    // Cancel before the run starts: nothing is dispatched
    let cancel = CancellationToken::new();
    cancel.cancel();

    let summary = crawl(config.clone(), "hash-1", true, cancel)
        .await
        .expect("crawl failed");

    assert!(summary.cancelled);
    assert_eq!(summary.stats.attempts, 0);
    assert_eq!(summary.stats.items_completed, 0);

    // The ledger snapshot exists but carries no completions
    let ledger = ProgressLedger::open(&config.output.ledger_path, "hash-1", 1000, false).unwrap();
    assert_eq!(ledger.completed_items(), 0);
}

#[tokio::test]
async fn test_two_pages_fan_out() {
    let server = MockServer::start().await;
    let out_dir = TempDir::new().unwrap();
    let config = create_test_config(&server.uri(), &out_dir, 2);

    Mock::given(method("GET"))
        .and(path("/items/"))
        .and(query_param("page", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_string(listing_page(&["alpha"])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/items/"))
        .and(query_param("page", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_string(listing_page(&["beta"])))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(wiremock::matchers::path_regex(r"^/items/(alpha|beta)/$"))
        .respond_with(ResponseTemplate::new(200).set_body_string(detail_page("generic", &[])))
        .mount(&server)
        .await;

    let summary = crawl(config, "hash-1", true, CancellationToken::new())
        .await
        .expect("crawl failed");

    assert_eq!(summary.stats.pages_processed, 2);
    assert_eq!(summary.stats.items_completed, 2);
}
