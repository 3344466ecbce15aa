use std::ffi::OsStr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use headless_chrome::{Browser, LaunchOptions, Tab};
use tokio::sync::Mutex;
use tokio::task;

use crate::config::BrowserConfig;
use crate::fetcher::{FetchError, PageFetcher};
use crate::models::SelectorKind;
use crate::parser::PriceParser;

/// Headless-Chrome fetcher for pages that only show their price after
/// scripts run. The session launches lazily on first use and is reused
/// until `shutdown`; all browser work runs on the blocking pool behind a
/// single lock, so callers are serialized.
pub struct BrowserFetcher {
    config: BrowserConfig,
    parser: PriceParser,
    session: Mutex<Option<BrowserSession>>,
}

struct BrowserSession {
    // Kept alive so the Chrome process survives between checks.
    _browser: Browser,
    tab: Arc<Tab>,
}

impl BrowserFetcher {
    pub fn new(config: BrowserConfig) -> Self {
        Self {
            config,
            parser: PriceParser::new(),
            session: Mutex::new(None),
        }
    }

    /// Run `f` against the shared tab, launching the session first if
    /// needed. The session lock is held for the whole call.
    async fn with_tab<F, T>(&self, f: F) -> Result<T, FetchError>
    where
        F: FnOnce(Arc<Tab>) -> Result<T, FetchError> + Send + 'static,
        T: Send + 'static,
    {
        let mut guard = self.session.lock().await;

        if guard.is_none() {
            tracing::debug!("Launching headless browser session");
            let config = self.config.clone();
            let session = task::spawn_blocking(move || launch_session(&config))
                .await
                .map_err(join_error)??;
            *guard = Some(session);
        }

        let tab = guard
            .as_ref()
            .map(|session| session.tab.clone())
            .ok_or_else(|| FetchError::Browser("Browser session unavailable".to_string()))?;

        task::spawn_blocking(move || f(tab)).await.map_err(join_error)?
    }

    /// Navigate and wait up to `wait_secs` for the selector itself to show
    /// up, for shops that fill the price in well after page load. Returns
    /// `None` when the element never appears or its text does not parse.
    pub async fn get_price_with_wait(
        &self,
        url: &str,
        selector: &str,
        kind: SelectorKind,
        wait_secs: u64,
    ) -> Option<f64> {
        let target = url.to_string();
        let selector = selector.to_string();

        let result = self
            .with_tab(move |tab| {
                tab.navigate_to(&target).map_err(browser_error)?;
                tab.wait_until_navigated().map_err(browser_error)?;

                let waited = match kind {
                    SelectorKind::Css => tab.wait_for_element_with_custom_timeout(
                        &selector,
                        Duration::from_secs(wait_secs),
                    ),
                    SelectorKind::Xpath => tab.wait_for_xpath_with_custom_timeout(
                        &selector,
                        Duration::from_secs(wait_secs),
                    ),
                };
                let Ok(element) = waited else {
                    return Ok(None);
                };

                let text = element.get_inner_text().map_err(browser_error)?;
                let text = text.trim().to_string();
                Ok((!text.is_empty()).then_some(text))
            })
            .await;

        match result {
            Ok(Some(text)) => self.parser.parse(&text),
            Ok(None) => None,
            Err(err) => {
                tracing::debug!("Waited extraction on {} failed: {}", url, err);
                None
            }
        }
    }
}

#[async_trait]
impl PageFetcher for BrowserFetcher {
    async fn fetch_page(&self, url: &str) -> Result<String, FetchError> {
        tracing::debug!("Fetching {} through the headless browser", url);

        let target = url.to_string();
        let body_wait = self.config.body_wait_secs;
        let settle = self.config.settle_delay_secs;

        self.with_tab(move |tab| {
            tab.navigate_to(&target).map_err(browser_error)?;
            tab.wait_until_navigated().map_err(browser_error)?;

            tab.wait_for_element_with_custom_timeout("body", Duration::from_secs(body_wait))
                .map_err(|_| FetchError::Timeout {
                    url: target.clone(),
                    seconds: body_wait,
                })?;

            // Give late scripts a moment to fill prices in.
            std::thread::sleep(Duration::from_secs(settle));

            tab.get_content().map_err(browser_error)
        })
        .await
    }

    /// Reads from the live tab left by `fetch_page`; the passed markup is
    /// not consulted.
    async fn extract_text(
        &self,
        _html: &str,
        selector: &str,
        kind: SelectorKind,
    ) -> Option<String> {
        let sel = selector.to_string();

        let result = self
            .with_tab(move |tab| {
                let element = match kind {
                    SelectorKind::Css => tab.find_element(&sel),
                    SelectorKind::Xpath => tab.find_element_by_xpath(&sel),
                };
                // A missing element is a normal outcome.
                let Ok(element) = element else {
                    return Ok(None);
                };

                let text = element.get_inner_text().map_err(browser_error)?;
                let text = text.trim().to_string();
                Ok((!text.is_empty()).then_some(text))
            })
            .await;

        match result {
            Ok(text) => text,
            Err(err) => {
                tracing::debug!("Browser extraction with {} failed: {}", selector, err);
                None
            }
        }
    }

    fn parser(&self) -> &PriceParser {
        &self.parser
    }

    async fn page_title(&self, url: &str) -> Option<String> {
        if let Err(err) = self.fetch_page(url).await {
            tracing::debug!("Could not load {} for its title: {}", url, err);
            return None;
        }

        let result = self
            .with_tab(|tab| tab.get_title().map_err(browser_error))
            .await;

        match result {
            Ok(title) => {
                let title = title.trim().to_string();
                (!title.is_empty()).then_some(title)
            }
            Err(_) => None,
        }
    }

    async fn shutdown(&self) {
        let mut guard = self.session.lock().await;
        if let Some(session) = guard.take() {
            tracing::debug!("Shutting down browser session");
            // Dropping the handle kills the Chrome process; that can block,
            // so it happens on the blocking pool too.
            if let Err(err) = task::spawn_blocking(move || drop(session)).await {
                tracing::warn!("Browser shutdown task failed: {}", err);
            }
        }
    }
}

fn launch_session(config: &BrowserConfig) -> Result<BrowserSession, FetchError> {
    let lang = format!("--lang={}", config.accept_language);

    let mut launch_options = LaunchOptions::default_builder()
        .headless(config.headless)
        .sandbox(false)
        .window_size(Some((config.window_width, config.window_height)))
        .args(vec![
            OsStr::new("--disable-gpu"),
            OsStr::new("--disable-dev-shm-usage"),
            OsStr::new("--disable-blink-features=AutomationControlled"),
            OsStr::new("--disable-infobars"),
            OsStr::new("--disable-extensions"),
            OsStr::new("--disable-popup-blocking"),
            OsStr::new(&lang),
        ])
        .build()
        .map_err(|e| FetchError::Browser(format!("Could not configure browser: {e}")))?;

    if let Some(path) = &config.chrome_path {
        launch_options.path = Some(PathBuf::from(path));
    }

    let browser = Browser::new(launch_options)
        .map_err(|e| FetchError::Browser(format!("Could not launch browser: {e}")))?;
    let tab = browser
        .new_tab()
        .map_err(|e| FetchError::Browser(format!("Could not open tab: {e}")))?;

    tab.set_default_timeout(Duration::from_secs(config.page_load_timeout_secs));
    tab.enable_stealth_mode()
        .map_err(|e| FetchError::Browser(format!("Could not enable stealth mode: {e}")))?;
    tab.set_user_agent(
        &config.user_agent,
        Some(&config.accept_language),
        Some("Win32"),
    )
    .map_err(|e| FetchError::Browser(format!("Could not set user agent: {e}")))?;

    Ok(BrowserSession {
        _browser: browser,
        tab,
    })
}

fn browser_error(err: anyhow::Error) -> FetchError {
    FetchError::Browser(err.to_string())
}

fn join_error(err: task::JoinError) -> FetchError {
    FetchError::Browser(format!("Browser task failed: {err}"))
}
