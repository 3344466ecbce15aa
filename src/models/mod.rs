use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub mod item;
pub mod sample;

// Re-exports for convenience
pub use item::*;
pub use sample::*;

/// How an item's price element is located on the page.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SelectorKind {
    #[default]
    Css,
    Xpath,
}

// Helper function to generate ids in the format expected by the store
pub fn generate_id() -> String {
    Uuid::new_v4().simple().to_string()
}
