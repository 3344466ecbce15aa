use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{SelectorKind, generate_id};
use crate::utils::error::AppError;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TrackedItem {
    pub id: String,
    pub name: String,
    pub url: String,

    // Where the price lives on the page
    pub selector: String,
    #[serde(default)]
    pub selector_kind: SelectorKind,
    /// Page needs a real browser (script-rendered price).
    #[serde(default)]
    pub render_required: bool,

    // Price state, mutated only by a successful check
    pub current_price: Option<f64>,
    pub previous_price: Option<f64>,
    pub last_checked_at: Option<DateTime<Utc>>,

    // Notification rules
    pub target_price: Option<f64>,
    #[serde(default = "default_notify")]
    pub notify_on_change: bool,

    // Metadata
    pub created_at: DateTime<Utc>,
}

fn default_notify() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewItem {
    pub name: String,
    pub url: String,
    pub selector: String,
    pub selector_kind: Option<SelectorKind>,
    pub render_required: Option<bool>,
    pub target_price: Option<f64>,
    pub notify_on_change: Option<bool>,
}

impl NewItem {
    /// Reject items that could never be checked. Selector syntax is not
    /// verified here; `probe_selector` vets that against the live page.
    pub fn validate(&self) -> crate::Result<()> {
        if self.name.trim().is_empty() {
            return Err(AppError::Validation("item name must not be empty".into()));
        }
        if url::Url::parse(&self.url).is_err() {
            return Err(AppError::Validation(format!("invalid URL: {}", self.url)));
        }
        if self.selector.trim().is_empty() {
            return Err(AppError::Validation(format!(
                "item {} has an empty selector",
                self.name
            )));
        }
        Ok(())
    }
}

impl TrackedItem {
    pub fn new(new_item: NewItem) -> Self {
        Self {
            id: generate_id(),
            name: new_item.name,
            url: new_item.url,
            selector: new_item.selector,
            selector_kind: new_item.selector_kind.unwrap_or_default(),
            render_required: new_item.render_required.unwrap_or(false),
            current_price: None,
            previous_price: None,
            last_checked_at: None,
            target_price: new_item.target_price,
            notify_on_change: new_item.notify_on_change.unwrap_or(true),
            created_at: Utc::now(),
        }
    }

    /// True if the current price is lower than the previous one.
    pub fn has_price_dropped(&self) -> bool {
        match (self.previous_price, self.current_price) {
            (Some(previous), Some(current)) => current < previous,
            _ => false,
        }
    }

    /// True if the price hit or went below the target.
    pub fn is_below_target(&self) -> bool {
        match (self.target_price, self.current_price) {
            (Some(target), Some(current)) => current <= target,
            _ => false,
        }
    }

    /// Whether downstream notifiers should care about this item's state.
    pub fn should_notify(&self) -> bool {
        if !self.notify_on_change {
            return false;
        }
        self.has_price_dropped() || self.is_below_target()
    }
}
