use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::generate_id;

/// One recorded price observation. Append-only, never mutated.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PriceSample {
    pub id: String,
    pub item_id: String,
    pub price: f64,
    pub recorded_at: DateTime<Utc>,
}

impl PriceSample {
    pub fn new(item_id: impl Into<String>, price: f64) -> Self {
        Self {
            id: generate_id(),
            item_id: item_id.into(),
            price,
            recorded_at: Utc::now(),
        }
    }
}
