use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use metrics_exporter_prometheus::PrometheusBuilder;
use tokio::sync::broadcast;
use tracing::{info, warn};

use pricewatch::{
    AppConfig, BackgroundChecker, BrowserFetcher, CheckEvent, CheckResult, HttpFetcher, ItemStore,
    JsonStore, NewItem, PageFetcher, SelectorKind, TrackedItem,
};

#[derive(Parser)]
#[command(name = "pricewatch", about = "Price tracker for Bulgarian web shops", version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Run one check cycle and exit
    #[arg(long)]
    once: bool,

    /// Minutes between check cycles (overrides config)
    #[arg(long, value_name = "MINUTES")]
    interval: Option<u64>,

    /// Directory for the JSON store (overrides config)
    #[arg(long, value_name = "DIR")]
    data_dir: Option<String>,
}

#[derive(Subcommand)]
enum Command {
    /// Track a new item
    Add {
        /// Display name; defaults to the page title
        #[arg(long)]
        name: Option<String>,

        /// Product page URL
        #[arg(long)]
        url: String,

        /// CSS selector or XPath locating the price element
        #[arg(long)]
        selector: String,

        /// Treat the selector as XPath instead of CSS
        #[arg(long)]
        xpath: bool,

        /// Always fetch this page with the headless browser
        #[arg(long)]
        render: bool,

        /// Notify once the price reaches this value
        #[arg(long, value_name = "PRICE")]
        target: Option<f64>,
    },

    /// List tracked items and their latest prices
    List,

    /// Stop tracking an item and drop its history
    Remove {
        /// Item id as shown by `list`
        id: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // Initialize tracing
    let (writer, _guard) = tracing_appender::non_blocking(std::io::stdout());
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("pricewatch=info".parse()?),
        )
        .with_writer(writer)
        .init();

    let mut config = AppConfig::from_env().context("Failed to load configuration")?;
    if let Some(minutes) = cli.interval {
        config.checker.interval_minutes = minutes;
    }
    if let Some(data_dir) = cli.data_dir {
        config.storage.data_dir = data_dir;
    }
    config
        .validate()
        .context("Invalid configuration after command-line overrides")?;

    match cli.command {
        Some(Command::Add {
            name,
            url,
            selector,
            xpath,
            render,
            target,
        }) => run_add(&config, name, url, selector, xpath, render, target).await,
        Some(Command::List) => run_list(&config).await,
        Some(Command::Remove { id }) => run_remove(&config, &id).await,
        None => run_daemon(&config, cli.once).await,
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_add(
    config: &AppConfig,
    name: Option<String>,
    url: String,
    selector: String,
    xpath: bool,
    render: bool,
    target: Option<f64>,
) -> Result<()> {
    let store = JsonStore::new(&config.storage.data_dir)?;
    let fetcher = HttpFetcher::new(config.http.clone())?;

    let kind = if xpath {
        SelectorKind::Xpath
    } else {
        SelectorKind::Css
    };
    let name = match name {
        Some(name) => name,
        None => fetcher.page_title(&url).await.unwrap_or_else(|| url.clone()),
    };

    let new_item = NewItem {
        name,
        url,
        selector,
        selector_kind: Some(kind),
        render_required: Some(render),
        target_price: target,
        notify_on_change: None,
    };
    new_item.validate()?;
    let item = TrackedItem::new(new_item);

    // Script-rendered pages cannot be vetted with a plain GET.
    if !item.render_required {
        let probe = fetcher
            .probe_selector(&item.url, &item.selector, item.selector_kind)
            .await;
        match (probe.matched, probe.price) {
            (true, Some(price)) => {
                info!(
                    "Selector finds \"{}\", parsed as {:.2}",
                    probe.text.as_deref().unwrap_or(""),
                    price
                );
            }
            (true, None) => {
                warn!(
                    "Selector finds \"{}\" but no price parses out of it",
                    probe.text.as_deref().unwrap_or("")
                );
            }
            (false, _) => {
                warn!("Selector matched nothing on {}, saving anyway", item.url);
            }
        }
    }

    store.save_item(&item).await?;
    info!("Tracking {} ({})", item.name, item.id);
    Ok(())
}

async fn run_list(config: &AppConfig) -> Result<()> {
    let store = JsonStore::new(&config.storage.data_dir)?;
    let items = store.list_items().await?;

    if items.is_empty() {
        info!("No items tracked yet");
        return Ok(());
    }

    for item in &items {
        let price = item
            .current_price
            .map(|p| format!("{:.2}", p))
            .unwrap_or_else(|| "never checked".to_string());
        let target = item
            .target_price
            .map(|t| format!(", target {:.2}", t))
            .unwrap_or_default();
        info!("{}  {} [{}{}] {}", item.id, item.name, price, target, item.url);
    }
    Ok(())
}

async fn run_remove(config: &AppConfig, id: &str) -> Result<()> {
    let store = JsonStore::new(&config.storage.data_dir)?;
    if store.delete_item(id).await? {
        info!("Removed item {}", id);
    } else {
        warn!("No item with id {}", id);
    }
    Ok(())
}

async fn run_daemon(config: &AppConfig, once: bool) -> Result<()> {
    if config.metrics.enabled {
        let addr = SocketAddr::from(([0, 0, 0, 0], config.metrics.port));
        PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()
            .context("Failed to start metrics exporter")?;
        info!("Prometheus metrics on http://{}/metrics", addr);
    }

    info!("Starting pricewatch...");

    let store = Arc::new(JsonStore::new(&config.storage.data_dir)?);
    let light = Arc::new(HttpFetcher::new(config.http.clone())?);
    let rendered = Arc::new(BrowserFetcher::new(config.browser.clone()));
    let checker = Arc::new(BackgroundChecker::new(
        store,
        light,
        rendered,
        &config.checker,
    ));

    // Log every check outcome as it happens.
    let mut events = checker.subscribe();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(CheckEvent::PriceUpdate(update)) => log_update(&update),
                Ok(CheckEvent::CycleComplete { succeeded, total }) => {
                    info!("Cycle finished: {}/{} checks succeeded", succeeded, total);
                }
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    warn!("Event logger lagged, {} events dropped", missed);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    if once {
        let results = checker.check_all().await?;
        let succeeded = results.iter().filter(|r| r.succeeded).count();
        info!(
            "Single pass done: {}/{} checks succeeded",
            succeeded,
            results.len()
        );
        checker.stop().await?;
        return Ok(());
    }

    Arc::clone(&checker).start().await?;
    info!(
        "Watching items in {} every {} minutes, press Ctrl-C to stop",
        config.storage.data_dir,
        checker.interval_minutes()
    );

    tokio::signal::ctrl_c().await?;
    info!("Shutting down...");
    checker.stop().await?;

    Ok(())
}

fn log_update(update: &CheckResult) {
    let item = &update.item;
    let Some(new_price) = update.new_price else {
        return;
    };

    match update.previous_price {
        Some(old) if (old - new_price).abs() > f64::EPSILON => {
            info!("{}: {:.2} -> {:.2}", item.name, old, new_price);
        }
        Some(_) => info!("{}: unchanged at {:.2}", item.name, new_price),
        None => info!("{}: first price {:.2}", item.name, new_price),
    }

    if item.should_notify() {
        match item.target_price {
            Some(target) => warn!(
                "Price alert for {}: {:.2} (target {:.2})",
                item.name, new_price, target
            ),
            None => warn!("Price alert for {}: dropped to {:.2}", item.name, new_price),
        }
    }
}
