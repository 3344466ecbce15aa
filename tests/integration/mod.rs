// Integration tests for pricewatch
// These tests exercise the real flat-file store, the HTTP fetcher against
// a local mock server, and the checker wired from the same pieces the
// binary uses. No headless Chrome is involved; the rendered side is a
// stub fetcher defined here.

pub mod checker_tests;
pub mod storage_tests;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use pricewatch::config::{
    AppConfig, BrowserConfig, CheckerConfig, HttpConfig, MetricsConfig, StorageConfig,
};
use pricewatch::{
    FetchError, JsonStore, NewItem, PageFetcher, PriceParser, SelectorKind, TrackedItem,
};

/// Test configuration with fast timeouts and a throwaway data directory.
pub fn get_test_config(data_dir: &str) -> AppConfig {
    AppConfig {
        storage: StorageConfig {
            data_dir: data_dir.to_string(),
        },
        http: HttpConfig {
            request_timeout_secs: 5,
            max_retries: 3,
            retry_delay_ms: 100,
            user_agent: "pricewatch-test/1.0".to_string(),
            accept_language: "bg-BG,bg;q=0.9,en;q=0.8".to_string(),
        },
        browser: BrowserConfig {
            headless: true,
            page_load_timeout_secs: 10,
            body_wait_secs: 2,
            settle_delay_secs: 0,
            window_width: 1280,
            window_height: 800,
            user_agent: "pricewatch-test/1.0".to_string(),
            accept_language: "bg-BG,bg".to_string(),
            chrome_path: None,
        },
        checker: CheckerConfig {
            interval_minutes: 60,
            render_fallback: true,
        },
        metrics: MetricsConfig {
            enabled: false,
            port: 9184,
        },
    }
}

pub fn test_http_config() -> HttpConfig {
    get_test_config("unused").http
}

/// Fresh store in a temp directory. Keep the `TempDir` alive for the
/// duration of the test or the files vanish under the store.
pub fn temp_store() -> (TempDir, Arc<JsonStore>) {
    let dir = TempDir::new().expect("temp dir");
    let store = JsonStore::new(dir.path()).expect("store in temp dir");
    (dir, Arc::new(store))
}

pub fn make_item(name: &str, url: &str, selector: &str) -> TrackedItem {
    TrackedItem::new(NewItem {
        name: name.to_string(),
        url: url.to_string(),
        selector: selector.to_string(),
        selector_kind: None,
        render_required: None,
        target_price: None,
        notify_on_change: None,
    })
}

/// Mount a GET route on the mock server answering with the given markup.
pub async fn serve_page(server: &MockServer, route: &str, body: String) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/html; charset=utf-8")
                .set_body_string(body),
        )
        .mount(server)
        .await;
}

/// Minimal shop page with one price element.
pub fn price_page(price_text: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="bg">
<head><title>Тестов магазин</title></head>
<body>
  <h1 class="product-title">Тестов продукт</h1>
  <div class="price">{price_text}</div>
</body>
</html>"#
    )
}

/// Stand-in for the browser fetcher: answers every price lookup with a
/// fixed value (or nothing) and counts how often it was asked.
pub struct FixedPriceFetcher {
    parser: PriceParser,
    price: Option<f64>,
    calls: AtomicUsize,
}

impl FixedPriceFetcher {
    pub fn new(price: Option<f64>) -> Self {
        Self {
            parser: PriceParser::new(),
            price,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PageFetcher for FixedPriceFetcher {
    async fn fetch_page(&self, url: &str) -> Result<String, FetchError> {
        Err(FetchError::Browser(format!(
            "stub fetcher serves no markup for {}",
            url
        )))
    }

    async fn extract_text(
        &self,
        _html: &str,
        _selector: &str,
        _kind: SelectorKind,
    ) -> Option<String> {
        None
    }

    fn parser(&self) -> &PriceParser {
        &self.parser
    }

    async fn get_price(&self, _url: &str, _selector: &str, _kind: SelectorKind) -> Option<f64> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.price
    }
}
