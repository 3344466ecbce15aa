use std::time::Duration;

use async_trait::async_trait;
use metrics::counter;
use reqwest::header::{self, HeaderMap, HeaderValue};
use reqwest::redirect::Policy;
use reqwest::{Client, StatusCode};
use scraper::{Html, Selector};
use tokio_retry::RetryIf;

use crate::config::HttpConfig;
use crate::fetcher::{xpath, FetchError, PageFetcher};
use crate::models::SelectorKind;
use crate::parser::PriceParser;
use crate::utils::error::AppError;

/// Plain-HTTP page fetcher. Handles the majority of shops whose prices sit
/// in the served markup; script-rendered pages go to `BrowserFetcher`.
pub struct HttpFetcher {
    client: Client,
    config: HttpConfig,
    parser: PriceParser,
}

impl HttpFetcher {
    pub fn new(config: HttpConfig) -> crate::Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::ACCEPT,
            HeaderValue::from_static(
                "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8",
            ),
        );
        headers.insert(
            header::ACCEPT_LANGUAGE,
            HeaderValue::from_str(&config.accept_language)
                .map_err(|e| AppError::Internal(format!("Invalid Accept-Language value: {e}")))?,
        );
        headers.insert(
            header::USER_AGENT,
            HeaderValue::from_str(&config.user_agent)
                .map_err(|e| AppError::Internal(format!("Invalid User-Agent value: {e}")))?,
        );
        headers.insert(header::UPGRADE_INSECURE_REQUESTS, HeaderValue::from_static("1"));

        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .redirect(Policy::limited(10))
            .build()
            .map_err(|e| AppError::Internal(format!("Could not build HTTP client: {e}")))?;

        Ok(Self {
            client,
            config,
            parser: PriceParser::new(),
        })
    }

    async fn fetch_once(&self, url: &str) -> Result<String, FetchError> {
        counter!("pricewatch_http_requests_total").increment(1);

        let response = self.client.get(url).send().await.map_err(|err| {
            if err.is_timeout() {
                FetchError::Timeout {
                    url: url.to_string(),
                    seconds: self.config.request_timeout_secs,
                }
            } else {
                FetchError::Network {
                    url: url.to_string(),
                    source: err,
                }
            }
        })?;

        // A definite status is not retried; only transport failures are.
        let status = response.status();
        if status != StatusCode::OK {
            return Err(FetchError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        response.text().await.map_err(|err| FetchError::Network {
            url: url.to_string(),
            source: err,
        })
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch_page(&self, url: &str) -> Result<String, FetchError> {
        tracing::debug!("Fetching {} over HTTP", url);

        // Gaps grow linearly: 500ms after the first failure, 1s after the
        // second, up to max_retries attempts in total.
        let delays = (1..self.config.max_retries)
            .map(|attempt| Duration::from_millis(self.config.retry_delay_ms) * attempt);

        RetryIf::spawn(delays, || self.fetch_once(url), FetchError::is_retryable).await
    }

    async fn extract_text(
        &self,
        html: &str,
        selector: &str,
        kind: SelectorKind,
    ) -> Option<String> {
        match kind {
            SelectorKind::Css => extract_css(html, selector),
            SelectorKind::Xpath => {
                let doc = Html::parse_document(html);
                xpath::evaluate_to_text(&doc, selector)
            }
        }
    }

    fn parser(&self) -> &PriceParser {
        &self.parser
    }
}

fn extract_css(html: &str, selector: &str) -> Option<String> {
    let doc = Html::parse_document(html);
    let parsed = match Selector::parse(selector) {
        Ok(parsed) => parsed,
        Err(err) => {
            tracing::warn!("Invalid CSS selector {}: {}", selector, err);
            return None;
        }
    };

    let element = doc.select(&parsed).next()?;
    let text = element
        .text()
        .collect::<Vec<_>>()
        .join(" ")
        .trim()
        .to_string();
    (!text.is_empty()).then_some(text)
}
