use async_trait::async_trait;
use thiserror::Error;

use crate::models::SelectorKind;
use crate::parser::PriceParser;

pub mod browser;
pub mod http;
pub mod xpath;

pub use browser::BrowserFetcher;
pub use http::HttpFetcher;

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("HTTP {status} fetching {url}")]
    Status { status: u16, url: String },

    #[error("Request to {url} failed: {source}")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Request to {url} timed out after {seconds}s")]
    Timeout { url: String, seconds: u64 },

    #[error("Browser error: {0}")]
    Browser(String),
}

impl FetchError {
    /// Only transport-level failures are worth retrying; a definite HTTP
    /// status is an answer, not a glitch.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            FetchError::Network { .. } | FetchError::Timeout { .. }
        )
    }
}

/// What a selector produced when tried against a live page. Used to vet a
/// selector before an item is saved.
#[derive(Debug, Clone)]
pub struct SelectorProbe {
    pub matched: bool,
    pub text: Option<String>,
    pub price: Option<f64>,
}

impl SelectorProbe {
    fn missed() -> Self {
        Self {
            matched: false,
            text: None,
            price: None,
        }
    }
}

/// Capability for turning a URL plus selector into a price.
///
/// Two implementations exist: `HttpFetcher` does a plain GET and a static
/// DOM query, `BrowserFetcher` drives a headless Chrome session for pages
/// that only render their price through scripts.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Download the page markup for `url`.
    async fn fetch_page(&self, url: &str) -> Result<String, FetchError>;

    /// Locate the selector's element and return its trimmed text. A missing
    /// element is a normal outcome, never an error.
    async fn extract_text(
        &self,
        html: &str,
        selector: &str,
        kind: SelectorKind,
    ) -> Option<String>;

    fn parser(&self) -> &PriceParser;

    /// Fetch, extract, and parse in one step. Any failure at any stage
    /// collapses to `None`; callers that need to tell "page unreachable"
    /// from "selector not found" use `fetch_page` / `extract_text` directly.
    async fn get_price(&self, url: &str, selector: &str, kind: SelectorKind) -> Option<f64> {
        let html = match self.fetch_page(url).await {
            Ok(html) => html,
            Err(err) => {
                tracing::debug!("Fetch of {} failed, treating price as absent: {}", url, err);
                return None;
            }
        };

        let text = self.extract_text(&html, selector, kind).await?;
        self.parser().parse(&text)
    }

    /// Try a selector against a page and report what came back.
    async fn probe_selector(
        &self,
        url: &str,
        selector: &str,
        kind: SelectorKind,
    ) -> SelectorProbe {
        let html = match self.fetch_page(url).await {
            Ok(html) => html,
            Err(err) => {
                tracing::debug!("Selector probe could not fetch {}: {}", url, err);
                return SelectorProbe::missed();
            }
        };

        match self.extract_text(&html, selector, kind).await {
            Some(text) => {
                let price = self.parser().parse(&text);
                SelectorProbe {
                    matched: true,
                    text: Some(text),
                    price,
                }
            }
            None => SelectorProbe::missed(),
        }
    }

    /// Fetch `url` and return its `<title>` text, for item name suggestions.
    async fn page_title(&self, url: &str) -> Option<String> {
        let html = self.fetch_page(url).await.ok()?;
        self.extract_text(&html, "title", SelectorKind::Css).await
    }

    /// Release any long-lived resources. Default is a no-op; the browser
    /// fetcher tears its Chrome session down here.
    async fn shutdown(&self) {}
}
