//! Catalog-Loom: a resumable catalog crawler
//!
//! This crate implements the orchestration engine for crawling a hierarchical
//! site structure: a paginated listing, per-item detail pages, and per-item
//! sub-pages ("tabs"). An item record is assembled and emitted exactly once,
//! after every one of its tab pages has been fetched or permanently abandoned.
//! A persisted progress ledger makes interrupted runs resumable without
//! re-fetching items that already completed.

pub mod barrier;
pub mod config;
pub mod crawler;
pub mod ledger;
pub mod record;
pub mod request;
pub mod retry;
pub mod state;
pub mod stats;
pub mod validate;

use thiserror::Error;

/// Main error type for Catalog-Loom operations
#[derive(Debug, Error)]
pub enum LoomError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Ledger error: {0}")]
    Ledger(#[from] ledger::LedgerError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("Invalid CSS selector in config: {0}")]
    InvalidSelector(String),
}

/// Result type alias for Catalog-Loom operations
pub type Result<T> = std::result::Result<T, LoomError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use config::Config;
pub use record::{ItemRecord, TabSection};
pub use request::{PageRequest, Stage};
pub use state::ItemState;
