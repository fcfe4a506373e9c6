use crate::config::types::{
    Config, CrawlerConfig, ExtractorConfig, OutputConfig, RetryConfig, UserAgentConfig,
    ValidatorConfig,
};
use crate::ConfigError;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_crawler_config(&config.crawler)?;
    validate_user_agent_config(&config.user_agent)?;
    validate_retry_config(&config.retry)?;
    validate_validator_config(&config.validator)?;
    validate_extractor_config(&config.extractor)?;
    validate_output_config(&config.output)?;
    Ok(())
}

/// Validates crawler configuration
fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    let url = Url::parse(&config.listing_url)
        .map_err(|_| ConfigError::InvalidUrl(config.listing_url.clone()))?;
    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ConfigError::InvalidUrl(format!(
            "listing-url must be http or https, got '{}'",
            config.listing_url
        )));
    }

    if config.page_count < 1 {
        return Err(ConfigError::Validation(format!(
            "page-count must be >= 1, got {}",
            config.page_count
        )));
    }

    if config.max_concurrent_fetches < 1 || config.max_concurrent_fetches > 100 {
        return Err(ConfigError::Validation(format!(
            "max-concurrent-fetches must be between 1 and 100, got {}",
            config.max_concurrent_fetches
        )));
    }

    if config.fetch_timeout_secs < 1 {
        return Err(ConfigError::Validation(format!(
            "fetch-timeout-secs must be >= 1, got {}",
            config.fetch_timeout_secs
        )));
    }

    if config.snapshot_every < 1 {
        return Err(ConfigError::Validation(format!(
            "snapshot-every must be >= 1, got {}",
            config.snapshot_every
        )));
    }

    Ok(())
}

/// Validates user agent configuration
fn validate_user_agent_config(config: &UserAgentConfig) -> Result<(), ConfigError> {
    if config.crawler_name.is_empty() {
        return Err(ConfigError::Validation(
            "crawler-name cannot be empty".to_string(),
        ));
    }

    if !config
        .crawler_name
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-')
    {
        return Err(ConfigError::Validation(format!(
            "crawler-name must contain only alphanumeric characters and hyphens, got '{}'",
            config.crawler_name
        )));
    }

    if config.crawler_version.is_empty() {
        return Err(ConfigError::Validation(
            "crawler-version cannot be empty".to_string(),
        ));
    }

    Url::parse(&config.contact_url)
        .map_err(|_| ConfigError::InvalidUrl(config.contact_url.clone()))?;

    if !config.contact_email.contains('@') {
        return Err(ConfigError::Validation(format!(
            "contact-email must be a valid email address, got '{}'",
            config.contact_email
        )));
    }

    Ok(())
}

/// Validates retry configuration
fn validate_retry_config(config: &RetryConfig) -> Result<(), ConfigError> {
    if config.base_delay_ms < 1 {
        return Err(ConfigError::Validation(format!(
            "base-delay-ms must be >= 1, got {}",
            config.base_delay_ms
        )));
    }

    if config.max_delay_ms < config.base_delay_ms {
        return Err(ConfigError::Validation(format!(
            "max-delay-ms ({}) must be >= base-delay-ms ({})",
            config.max_delay_ms, config.base_delay_ms
        )));
    }

    if !(0.0..=1.0).contains(&config.jitter) {
        return Err(ConfigError::Validation(format!(
            "jitter must be between 0.0 and 1.0, got {}",
            config.jitter
        )));
    }

    for status in &config.retryable_statuses {
        if *status < 100 || *status > 599 {
            return Err(ConfigError::Validation(format!(
                "retryable-statuses entries must be HTTP status codes, got {}",
                status
            )));
        }
    }

    Ok(())
}

/// Validates listing-page validator configuration
fn validate_validator_config(config: &ValidatorConfig) -> Result<(), ConfigError> {
    if config.item_marker.is_empty() {
        return Err(ConfigError::Validation(
            "item-marker cannot be empty".to_string(),
        ));
    }

    if config.container_marker.is_empty() {
        return Err(ConfigError::Validation(
            "container-marker cannot be empty".to_string(),
        ));
    }

    if config.min_blocks < 1 {
        return Err(ConfigError::Validation(format!(
            "min-blocks must be >= 1, got {}",
            config.min_blocks
        )));
    }

    Ok(())
}

/// Validates extractor selector configuration
///
/// Every configured selector must parse; a typo here should fail at startup,
/// not in the middle of a crawl.
fn validate_extractor_config(config: &ExtractorConfig) -> Result<(), ConfigError> {
    let mut selectors: Vec<&str> = vec![
        &config.item_selector,
        &config.link_selector,
        &config.tab_nav_selector,
        &config.tab_section_selector,
        &config.tab_section_title_selector,
        &config.tab_section_body_selector,
    ];
    selectors.extend(config.fields.values().map(String::as_str));
    selectors.extend(config.detail_fields.values().map(String::as_str));

    for selector in selectors {
        if scraper::Selector::parse(selector).is_err() {
            return Err(ConfigError::InvalidSelector(selector.to_string()));
        }
    }

    Ok(())
}

/// Validates output configuration
fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    if config.ledger_path.is_empty() {
        return Err(ConfigError::Validation(
            "ledger-path cannot be empty".to_string(),
        ));
    }

    if config.records_path.is_empty() {
        return Err(ConfigError::Validation(
            "records-path cannot be empty".to_string(),
        ));
    }

    Ok(())
}
