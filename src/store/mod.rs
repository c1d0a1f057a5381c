//! # Configuration Store
//!
//! Persistence boundary for printer and template records.
//!
//! ## Available Stores
//!
//! - [`memory`]: In-process store for tests and demos
//! - [`json`]: Single JSON file on disk
//!
//! Every call is atomic on its own. [`ConfigStore::upsert_printers`] is the
//! one multi-record operation; both provided stores commit the whole batch or
//! nothing.

pub mod json;
pub mod memory;

use async_trait::async_trait;
use thiserror::Error;

use crate::model::{PrinterConfig, PrinterId, TemplateConfig};

pub use json::JsonFileStore;
pub use memory::MemoryStore;

/// Store failure
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(String),

    /// Stored data could not be parsed or written
    #[error("Corrupt store: {0}")]
    Corrupt(String),

    /// Backend refused the operation
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

impl From<std::io::Error> for StoreError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        Self::Corrupt(e.to_string())
    }
}

/// Persists printer and template collections.
#[async_trait]
pub trait ConfigStore: Send + Sync {
    async fn list_printers(&self) -> Result<Vec<PrinterConfig>, StoreError>;

    /// Insert or replace the printer with the same id.
    async fn upsert_printer(&self, printer: &PrinterConfig) -> Result<(), StoreError>;

    /// Insert or replace several printers.
    ///
    /// The default implementation writes one record at a time and is only
    /// as atomic as the individual writes.
    async fn upsert_printers(&self, printers: &[PrinterConfig]) -> Result<(), StoreError> {
        for printer in printers {
            self.upsert_printer(printer).await?;
        }
        Ok(())
    }

    /// Remove a printer. Removing an unknown id is not an error.
    async fn delete_printer(&self, id: PrinterId) -> Result<(), StoreError>;

    async fn list_templates(&self) -> Result<Vec<TemplateConfig>, StoreError>;

    /// Insert or replace the template with the same `template_id`.
    async fn upsert_template(&self, template: &TemplateConfig) -> Result<(), StoreError>;

    /// Remove a template. Removing an unknown id is not an error.
    async fn delete_template(&self, id: &str) -> Result<(), StoreError>;
}

/// Replace-or-append by key, keeping insertion order.
pub(crate) fn upsert_by<T: Clone, K: PartialEq>(items: &mut Vec<T>, item: &T, key: impl Fn(&T) -> K) {
    let k = key(item);
    match items.iter_mut().find(|existing| key(existing) == k) {
        Some(existing) => *existing = item.clone(),
        None => items.push(item.clone()),
    }
}
