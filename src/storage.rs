use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::Mutex;

use crate::models::{PriceSample, TrackedItem};

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Storage serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Persistence surface for tracked items and their price history.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ItemStore: Send + Sync {
    async fn list_items(&self) -> Result<Vec<TrackedItem>, StorageError>;

    async fn get_item(&self, id: &str) -> Result<Option<TrackedItem>, StorageError>;

    /// Insert, or replace the stored item with the same id.
    async fn save_item(&self, item: &TrackedItem) -> Result<(), StorageError>;

    /// Remove an item and all of its samples. Returns whether the item
    /// existed.
    async fn delete_item(&self, id: &str) -> Result<bool, StorageError>;

    async fn append_sample(&self, sample: &PriceSample) -> Result<(), StorageError>;

    /// Samples for one item, newest first, truncated to `limit` if given.
    async fn samples_for(
        &self,
        item_id: &str,
        limit: Option<usize>,
    ) -> Result<Vec<PriceSample>, StorageError>;
}

/// Flat-file store: `items.json` and `samples.json` under the data
/// directory, both pretty-printed so they stay hand-editable. A single
/// lock covers every operation; read-modify-write cycles never interleave.
pub struct JsonStore {
    items_path: PathBuf,
    samples_path: PathBuf,
    lock: Mutex<()>,
}

impl JsonStore {
    pub fn new(data_dir: impl AsRef<Path>) -> Result<Self, StorageError> {
        let data_dir = data_dir.as_ref();
        std::fs::create_dir_all(data_dir)?;

        Ok(Self {
            items_path: data_dir.join("items.json"),
            samples_path: data_dir.join("samples.json"),
            lock: Mutex::new(()),
        })
    }
}

#[async_trait]
impl ItemStore for JsonStore {
    async fn list_items(&self) -> Result<Vec<TrackedItem>, StorageError> {
        let _guard = self.lock.lock().await;
        Ok(read_collection(&self.items_path))
    }

    async fn get_item(&self, id: &str) -> Result<Option<TrackedItem>, StorageError> {
        let _guard = self.lock.lock().await;
        let items: Vec<TrackedItem> = read_collection(&self.items_path);
        Ok(items.into_iter().find(|item| item.id == id))
    }

    async fn save_item(&self, item: &TrackedItem) -> Result<(), StorageError> {
        let _guard = self.lock.lock().await;
        let mut items: Vec<TrackedItem> = read_collection(&self.items_path);
        match items.iter_mut().find(|existing| existing.id == item.id) {
            Some(existing) => *existing = item.clone(),
            None => items.push(item.clone()),
        }
        write_collection(&self.items_path, &items)
    }

    async fn delete_item(&self, id: &str) -> Result<bool, StorageError> {
        let _guard = self.lock.lock().await;
        let mut items: Vec<TrackedItem> = read_collection(&self.items_path);
        let before = items.len();
        items.retain(|item| item.id != id);
        if items.len() == before {
            return Ok(false);
        }
        write_collection(&self.items_path, &items)?;

        // History goes with the item.
        let mut samples: Vec<PriceSample> = read_collection(&self.samples_path);
        samples.retain(|sample| sample.item_id != id);
        write_collection(&self.samples_path, &samples)?;

        Ok(true)
    }

    async fn append_sample(&self, sample: &PriceSample) -> Result<(), StorageError> {
        let _guard = self.lock.lock().await;
        let mut samples: Vec<PriceSample> = read_collection(&self.samples_path);
        samples.push(sample.clone());
        write_collection(&self.samples_path, &samples)
    }

    async fn samples_for(
        &self,
        item_id: &str,
        limit: Option<usize>,
    ) -> Result<Vec<PriceSample>, StorageError> {
        let _guard = self.lock.lock().await;
        let samples: Vec<PriceSample> = read_collection(&self.samples_path);

        let mut matching: Vec<PriceSample> = samples
            .into_iter()
            .filter(|sample| sample.item_id == item_id)
            .collect();
        matching.sort_by(|a, b| b.recorded_at.cmp(&a.recorded_at));
        if let Some(limit) = limit {
            matching.truncate(limit);
        }
        Ok(matching)
    }
}

/// A missing or unreadable file is an empty collection, not an error;
/// tracking carries on and the next write replaces the file.
fn read_collection<T: DeserializeOwned>(path: &Path) -> Vec<T> {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Vec::new(),
        Err(err) => {
            tracing::warn!("Could not read {}, starting empty: {}", path.display(), err);
            return Vec::new();
        }
    };

    match serde_json::from_str(&raw) {
        Ok(values) => values,
        Err(err) => {
            tracing::warn!("Corrupt store file {}, starting empty: {}", path.display(), err);
            Vec::new()
        }
    }
}

fn write_collection<T: Serialize>(path: &Path, values: &[T]) -> Result<(), StorageError> {
    let raw = serde_json::to_string_pretty(values)?;
    std::fs::write(path, raw)?;
    Ok(())
}
