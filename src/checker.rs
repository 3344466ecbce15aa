use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use metrics::{counter, histogram};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, Semaphore};
use tokio::time::Instant;

use crate::config::CheckerConfig;
use crate::fetcher::PageFetcher;
use crate::models::{PriceSample, TrackedItem};
use crate::scheduler::{PeriodicTrigger, TriggerJob};
use crate::storage::ItemStore;
use crate::utils::error::AppError;

const EVENT_CAPACITY: usize = 64;

/// Outcome of checking a single item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckResult {
    /// The item as stored after the check: updated prices on success,
    /// untouched on failure.
    pub item: TrackedItem,
    pub previous_price: Option<f64>,
    pub new_price: Option<f64>,
    pub succeeded: bool,
    pub failure_reason: Option<String>,
}

/// Broadcast to subscribers as checks complete.
#[derive(Debug, Clone)]
pub enum CheckEvent {
    /// An item's price was extracted and persisted.
    PriceUpdate(CheckResult),
    /// A cycle ended; `total` counts the items actually processed.
    CycleComplete { succeeded: usize, total: usize },
}

/// Walks every tracked item on a timer: fetch, extract, parse, persist,
/// broadcast. Cheap HTTP fetches first, escalating to the headless browser
/// for items that need one.
pub struct BackgroundChecker {
    store: Arc<dyn ItemStore>,
    light: Arc<dyn PageFetcher>,
    rendered: Arc<dyn PageFetcher>,
    render_fallback: bool,
    events: broadcast::Sender<CheckEvent>,
    cycle_gate: Semaphore,
    stopping: AtomicBool,
    trigger: PeriodicTrigger,
    interval_minutes: AtomicU64,
}

impl BackgroundChecker {
    pub fn new(
        store: Arc<dyn ItemStore>,
        light: Arc<dyn PageFetcher>,
        rendered: Arc<dyn PageFetcher>,
        config: &CheckerConfig,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        Self {
            store,
            light,
            rendered,
            render_fallback: config.render_fallback,
            events,
            cycle_gate: Semaphore::new(1),
            stopping: AtomicBool::new(false),
            trigger: PeriodicTrigger::new(Duration::from_secs(config.interval_minutes * 60)),
            interval_minutes: AtomicU64::new(config.interval_minutes),
        }
    }

    /// Subscribe to check events. Receivers that fall more than the channel
    /// capacity behind lose the oldest events.
    pub fn subscribe(&self) -> broadcast::Receiver<CheckEvent> {
        self.events.subscribe()
    }

    /// Check one item: fetch, extract, parse, persist. A price that cannot
    /// be extracted fails the check without touching the stored item;
    /// storage trouble is the only hard error.
    pub async fn check_one(&self, item: &TrackedItem) -> crate::Result<CheckResult> {
        tracing::debug!("Checking item {} ({})", item.name, item.url);

        let Some(price) = self.resolve_price(item).await else {
            counter!("pricewatch_checks_failed_total").increment(1);
            tracing::warn!("No price extracted for item {} ({})", item.name, item.url);
            return Ok(CheckResult {
                item: item.clone(),
                previous_price: item.current_price,
                new_price: None,
                succeeded: false,
                failure_reason: Some("price not extractable".to_string()),
            });
        };

        let mut updated = item.clone();
        updated.previous_price = updated.current_price;
        updated.current_price = Some(price);
        updated.last_checked_at = Some(Utc::now());

        self.store.save_item(&updated).await?;
        self.store
            .append_sample(&PriceSample::new(updated.id.clone(), price))
            .await?;

        counter!("pricewatch_checks_succeeded_total").increment(1);
        tracing::info!(
            "Item {} now {:.2} (was {})",
            updated.name,
            price,
            updated
                .previous_price
                .map(|p| format!("{p:.2}"))
                .unwrap_or_else(|| "unknown".to_string())
        );

        let result = CheckResult {
            previous_price: updated.previous_price,
            new_price: Some(price),
            succeeded: true,
            failure_reason: None,
            item: updated,
        };

        // Nobody listening is fine.
        let _ = self.events.send(CheckEvent::PriceUpdate(result.clone()));

        Ok(result)
    }

    /// Light fetch first unless the item is marked as browser-only;
    /// escalate to the browser when the light pass finds nothing.
    async fn resolve_price(&self, item: &TrackedItem) -> Option<f64> {
        if item.render_required {
            return self
                .rendered
                .get_price(&item.url, &item.selector, item.selector_kind)
                .await;
        }

        let price = self
            .light
            .get_price(&item.url, &item.selector, item.selector_kind)
            .await;
        if price.is_some() {
            return price;
        }

        if !self.render_fallback {
            return None;
        }

        tracing::debug!("Escalating item {} to browser fetch", item.name);
        self.rendered
            .get_price(&item.url, &item.selector, item.selector_kind)
            .await
    }

    /// Run one cycle over every stored item, sequentially and in store
    /// order. A second cycle requested while one runs is rejected with
    /// `CheckInProgress`.
    pub async fn check_all(&self) -> crate::Result<Vec<CheckResult>> {
        let Ok(_permit) = self.cycle_gate.try_acquire() else {
            return Err(AppError::CheckInProgress);
        };
        self.stopping.store(false, Ordering::SeqCst);

        let started = Instant::now();
        let items = self.store.list_items().await?;
        tracing::info!("Starting check cycle over {} items", items.len());

        let mut results = Vec::with_capacity(items.len());
        let mut succeeded = 0usize;

        for item in &items {
            if self.stopping.load(Ordering::SeqCst) {
                tracing::info!(
                    "Stop requested, ending cycle after {} of {} items",
                    results.len(),
                    items.len()
                );
                break;
            }

            let result = self.check_one(item).await?;
            if result.succeeded {
                succeeded += 1;
            }
            results.push(result);
        }

        let total = results.len();
        histogram!("pricewatch_check_cycle_seconds").record(started.elapsed().as_secs_f64());
        tracing::info!("Check cycle complete: {}/{} items succeeded", succeeded, total);

        let _ = self.events.send(CheckEvent::CycleComplete { succeeded, total });

        Ok(results)
    }

    /// Begin periodic cycles. The first runs one interval from now;
    /// starting while already running is a no-op.
    pub async fn start(self: Arc<Self>) -> crate::Result<()> {
        let minutes = self.interval_minutes.load(Ordering::SeqCst);
        let interval = Duration::from_secs(minutes * 60);

        let checker = Arc::clone(&self);
        let job: TriggerJob = Arc::new(move || {
            let checker = Arc::clone(&checker);
            Box::pin(async move {
                match checker.check_all().await {
                    Ok(_) => {}
                    Err(AppError::CheckInProgress) => {
                        tracing::warn!("Previous check cycle still running, skipping this tick");
                    }
                    Err(e) => {
                        tracing::error!("Scheduled check cycle failed: {}", e);
                    }
                }
            })
        });

        self.trigger.start(interval, job).await?;
        tracing::info!("Background checking every {} minutes", minutes);
        Ok(())
    }

    /// Stop periodic checking. An in-flight item finishes; the rest of the
    /// current cycle is skipped. The browser session always comes down,
    /// whether or not the trigger was running.
    pub async fn stop(&self) -> crate::Result<()> {
        self.stopping.store(true, Ordering::SeqCst);
        self.trigger.stop().await?;
        self.rendered.shutdown().await;
        tracing::info!("Background checker stopped");
        Ok(())
    }

    /// Change the cadence; takes effect immediately when running.
    pub async fn set_interval(&self, minutes: u64) -> crate::Result<()> {
        if minutes == 0 {
            return Err(AppError::Validation(
                "check interval must be at least one minute".to_string(),
            ));
        }
        self.interval_minutes.store(minutes, Ordering::SeqCst);
        self.trigger
            .reschedule(Duration::from_secs(minutes * 60))
            .await
    }

    pub fn interval_minutes(&self) -> u64 {
        self.interval_minutes.load(Ordering::SeqCst)
    }

    pub async fn is_running(&self) -> bool {
        self.trigger.is_running().await
    }

    pub async fn next_run_time(&self) -> Option<DateTime<Utc>> {
        self.trigger.next_run_time().await
    }
}
