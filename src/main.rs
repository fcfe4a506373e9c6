//! Catalog-Loom main entry point
//!
//! Command-line interface for the resumable catalog crawler.

use catalog_loom::config::load_config_with_hash;
use catalog_loom::crawler::crawl;
use catalog_loom::ledger::ProgressLedger;
use catalog_loom::stats::print_summary;
use clap::Parser;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// Catalog-Loom: a resumable catalog crawler
///
/// Crawls a paginated listing, the detail page of every item on it, and
/// every tab page under each detail page, emitting one assembled record per
/// item. Progress is persisted so an interrupted run picks up where it left
/// off without re-fetching completed items.
#[derive(Parser, Debug)]
#[command(name = "catalog-loom")]
#[command(version = "1.0.0")]
#[command(about = "A resumable catalog crawler", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Resume an interrupted crawl (default behavior)
    #[arg(long, conflicts_with = "fresh")]
    resume: bool,

    /// Start a fresh crawl, ignoring previous progress
    #[arg(long, conflicts_with = "resume")]
    fresh: bool,

    /// Validate config and show what would be crawled without crawling
    #[arg(long, conflicts_with = "stats")]
    dry_run: bool,

    /// Show the last run's statistics from the ledger and exit
    #[arg(long, conflicts_with = "dry_run")]
    stats: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = match load_config_with_hash(&cli.config) {
        Ok((cfg, hash)) => {
            tracing::info!("Configuration loaded successfully (hash: {})", hash);
            (cfg, hash)
        }
        Err(e) => {
            tracing::error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    if cli.dry_run {
        handle_dry_run(&config);
    } else if cli.stats {
        handle_stats(&config)?;
    } else {
        handle_crawl(config, &config_hash, cli.fresh).await?;
    }

    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("catalog_loom=info,warn"),
            1 => EnvFilter::new("catalog_loom=debug,info"),
            2 => EnvFilter::new("catalog_loom=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Handles the --dry-run mode: validates config and shows what would be crawled
fn handle_dry_run(config: &catalog_loom::config::Config) {
    println!("=== Catalog-Loom Dry Run ===\n");

    println!("Crawler Configuration:");
    println!("  Listing URL: {}", config.crawler.listing_url);
    println!("  Pages to seed: {}", config.crawler.page_count);
    println!(
        "  Max concurrent fetches: {}",
        config.crawler.max_concurrent_fetches
    );
    println!("  Fetch timeout: {}s", config.crawler.fetch_timeout_secs);
    println!("  Request delay: {}ms", config.crawler.request_delay_ms);

    println!("\nRetry Policy:");
    println!(
        "  Transport attempts: {}, validation attempts: {}",
        config.retry.transport_attempts, config.retry.validation_attempts
    );
    println!("  Base delay: {}ms, jitter: {}", config.retry.base_delay_ms, config.retry.jitter);
    println!("  Retryable statuses: {:?}", config.retry.retryable_statuses);

    println!("\nValidator:");
    println!(
        "  Minimum blocks per page: {}, minimum body bytes: {}",
        config.validator.min_blocks, config.validator.min_body_bytes
    );

    println!("\nExtractor:");
    println!("  Listing fields: {}", config.extractor.fields.len());
    println!("  Detail fields: {}", config.extractor.detail_fields.len());
    println!("  Excluded tabs: {:?}", config.extractor.excluded_tabs);

    println!("\nOutput:");
    println!("  Ledger: {}", config.output.ledger_path);
    println!("  Records: {}", config.output.records_path);

    println!("\n✓ Configuration is valid");
    println!(
        "✓ Would seed {} listing pages from {}",
        config.crawler.page_count, config.crawler.listing_url
    );
}

/// Handles the --stats mode: shows the last run's statistics from the ledger
fn handle_stats(
    config: &catalog_loom::config::Config,
) -> Result<(), Box<dyn std::error::Error>> {
    use std::path::Path;

    println!("Ledger: {}\n", config.output.ledger_path);

    let (stats, completed, failed, failed_pages) =
        ProgressLedger::read_stats(Path::new(&config.output.ledger_path))?;

    println!("=== Last Run Statistics ===\n");
    if let Some(started) = &stats.started_at {
        println!("Started: {}", started);
    }
    match &stats.finished_at {
        Some(finished) => println!("Finished: {}", finished),
        None => println!("Finished: (run did not finish)"),
    }
    println!();
    println!("Pages processed: {}", stats.pages_processed);
    println!("Items discovered: {}", stats.items_discovered);
    println!("Items completed: {} ({} in ledger)", stats.items_completed, completed);
    println!("Items failed: {} ({} in ledger)", stats.items_failed, failed);
    println!("Failed fetch attempts: {}", stats.failed_attempts);
    if !failed_pages.is_empty() {
        println!("Failed pages: {:?}", failed_pages);
    }

    Ok(())
}

/// Handles the main crawl operation
async fn handle_crawl(
    config: catalog_loom::config::Config,
    config_hash: &str,
    fresh: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    if fresh {
        tracing::info!("Starting fresh crawl (ignoring previous progress)");
    } else {
        tracing::info!("Starting crawl (will resume if a previous ledger exists)");
    }

    let cancel = CancellationToken::new();
    let signal_token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupt received, finishing in-flight fetches");
            signal_token.cancel();
        }
    });

    match crawl(config, config_hash, fresh, cancel).await {
        Ok(summary) => {
            print_summary(&summary);
            Ok(())
        }
        Err(e) => {
            tracing::error!("Crawl failed: {}", e);
            Err(e.into())
        }
    }
}
