pub mod checker;
pub mod config;
pub mod fetcher;
pub mod models;
pub mod parser;
pub mod scheduler;
pub mod storage;
pub mod utils;

// Re-export commonly used types
pub use checker::{BackgroundChecker, CheckEvent, CheckResult};
pub use config::AppConfig;
pub use fetcher::{BrowserFetcher, FetchError, HttpFetcher, PageFetcher, SelectorProbe};
pub use models::{NewItem, PriceSample, SelectorKind, TrackedItem};
pub use parser::PriceParser;
pub use scheduler::PeriodicTrigger;
pub use storage::{ItemStore, JsonStore, StorageError};
pub use utils::error::AppError;

pub type Result<T> = std::result::Result<T, AppError>;
