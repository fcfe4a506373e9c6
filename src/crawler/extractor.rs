//! Document extraction
//!
//! The engine depends on the [`Extractor`] trait alone; nothing in the
//! pipeline knows how fields are located inside a document. [`CssExtractor`]
//! is the default implementation, driven entirely by configured CSS
//! selectors. Extraction is pure: the same document always yields the same
//! result, which is what makes re-fetching after a crash safe.

use crate::config::ExtractorConfig;
use crate::crawler::fetcher::Document;
use crate::record::TabSection;
use scraper::{ElementRef, Html, Selector};
use serde_json::Value;
use std::collections::BTreeMap;
use thiserror::Error;

/// One item block found on a listing page
#[derive(Debug, Clone)]
pub struct ListingItem {
    /// Unique id, derived from the detail-page URL
    pub item_id: String,

    /// Absolute URL of the item's detail page
    pub detail_url: url::Url,

    /// Fields extracted from the listing block itself
    pub fields: BTreeMap<String, Value>,
}

/// A tab link discovered on a detail page
#[derive(Debug, Clone)]
pub struct TabLink {
    /// Stable key the section is stored under
    pub key: String,

    /// Title as it appeared in the navigation
    pub title: String,

    /// Absolute URL of the tab page
    pub url: url::Url,
}

/// Everything extracted from a detail page
#[derive(Debug, Clone)]
pub struct DetailPage {
    pub fields: BTreeMap<String, Value>,
    pub tab_links: Vec<TabLink>,
}

/// Total extraction failures; a missing field is not an error, it is null
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("invalid selector '{0}'")]
    Selector(String),

    #[error("document unusable: {0}")]
    Malformed(String),
}

/// Contract for turning fetched documents into structured data
///
/// Implementations must be deterministic for a given document.
pub trait Extractor: Send + Sync {
    /// Extracts the item blocks from a listing page, in document order
    fn extract_listing(&self, doc: &Document) -> Result<Vec<ListingItem>, ExtractError>;

    /// Extracts an item's fields and tab links from its detail page
    fn extract_detail(&self, doc: &Document) -> Result<DetailPage, ExtractError>;

    /// Extracts one tab page's section content
    fn extract_tab(&self, doc: &Document, tab_title: &str) -> Result<TabSection, ExtractError>;
}

/// Derives the key a tab's section is stored under from its title
///
/// "Courses & Fees" becomes "courses&feesTab".
pub fn derive_tab_key(title: &str) -> String {
    format!("{}Tab", title.replace(' ', "").to_lowercase())
}

/// Selector-driven extractor configured from the `[extractor]` section
pub struct CssExtractor {
    config: ExtractorConfig,
}

impl CssExtractor {
    pub fn new(config: ExtractorConfig) -> Self {
        Self { config }
    }

    fn selector(raw: &str) -> Result<Selector, ExtractError> {
        Selector::parse(raw).map_err(|_| ExtractError::Selector(raw.to_string()))
    }

    fn base_url(doc: &Document) -> Result<url::Url, ExtractError> {
        url::Url::parse(&doc.url)
            .map_err(|e| ExtractError::Malformed(format!("document URL '{}': {}", doc.url, e)))
    }

    /// First matching element's text, trimmed; None when absent or empty
    fn select_text(scope: ElementRef<'_>, selector: &Selector) -> Option<String> {
        scope
            .select(selector)
            .next()
            .map(|el| el.text().collect::<String>().trim().to_string())
            .filter(|s| !s.is_empty())
    }

    /// Extracts a configured field map from a scope element
    fn extract_fields(
        scope: ElementRef<'_>,
        selectors: &BTreeMap<String, String>,
    ) -> Result<BTreeMap<String, Value>, ExtractError> {
        let mut fields = BTreeMap::new();
        for (name, raw) in selectors {
            let selector = Self::selector(raw)?;
            let value = match Self::select_text(scope, &selector) {
                Some(text) => Value::String(text),
                None => Value::Null,
            };
            fields.insert(name.clone(), value);
        }
        Ok(fields)
    }
}

impl Extractor for CssExtractor {
    fn extract_listing(&self, doc: &Document) -> Result<Vec<ListingItem>, ExtractError> {
        let base = Self::base_url(doc)?;
        let html = Html::parse_document(&doc.body);
        let item_selector = Self::selector(&self.config.item_selector)?;
        let link_selector = Self::selector(&self.config.link_selector)?;

        let mut items = Vec::new();
        for block in html.select(&item_selector) {
            let href = block
                .select(&link_selector)
                .next()
                .and_then(|el| el.value().attr("href"));

            let Some(href) = href else {
                tracing::debug!("listing block without a detail link, skipping");
                continue;
            };

            let detail_url = match base.join(href) {
                Ok(url) => url,
                Err(e) => {
                    tracing::debug!("unresolvable detail link '{}': {}", href, e);
                    continue;
                }
            };

            let fields = Self::extract_fields(block, &self.config.fields)?;
            items.push(ListingItem {
                item_id: detail_url.to_string(),
                detail_url,
                fields,
            });
        }

        Ok(items)
    }

    fn extract_detail(&self, doc: &Document) -> Result<DetailPage, ExtractError> {
        let base = Self::base_url(doc)?;
        let html = Html::parse_document(&doc.body);

        let root = html.root_element();
        let fields = Self::extract_fields(root, &self.config.detail_fields)?;

        let nav_selector = Self::selector(&self.config.tab_nav_selector)?;
        let mut tab_links = Vec::new();
        for anchor in html.select(&nav_selector) {
            let title = anchor.text().collect::<String>().trim().to_string();
            if title.is_empty() || self.config.excluded_tabs.contains(&title) {
                continue;
            }

            let Some(href) = anchor.value().attr("href") else {
                continue;
            };
            let url = match base.join(href) {
                Ok(url) => url,
                Err(e) => {
                    tracing::debug!("unresolvable tab link '{}': {}", href, e);
                    continue;
                }
            };

            tab_links.push(TabLink {
                key: derive_tab_key(&title),
                title,
                url,
            });
        }

        Ok(DetailPage { fields, tab_links })
    }

    fn extract_tab(&self, doc: &Document, tab_title: &str) -> Result<TabSection, ExtractError> {
        let html = Html::parse_document(&doc.body);
        let section_selector = Self::selector(&self.config.tab_section_selector)?;
        let title_selector = Self::selector(&self.config.tab_section_title_selector)?;
        let body_selector = Self::selector(&self.config.tab_section_body_selector)?;

        let mut section = TabSection::new(tab_title);
        for block in html.select(&section_selector) {
            let title = Self::select_text(block, &title_selector);
            let body = block
                .select(&body_selector)
                .next()
                .map(|el| el.inner_html().trim().to_string())
                .filter(|s| !s.is_empty());

            if let (Some(title), Some(body)) = (title, body) {
                section.push_block(title, body);
            }
        }

        Ok(section)
    }
}
