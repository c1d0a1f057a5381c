//! # JSON File Store
//!
//! Keeps both collections in one pretty-printed JSON document:
//!
//! ```json
//! { "printers": [ ... ], "templates": [ ... ] }
//! ```
//!
//! Every mutation reads the file, applies the change and writes the whole
//! document to a sibling temp file before renaming it over the original, so a
//! crash mid-write never leaves a truncated store behind. A missing file reads
//! as empty collections.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::debug;

use super::{ConfigStore, StoreError, upsert_by};
use crate::model::{PrinterConfig, PrinterId, TemplateConfig};

#[derive(Debug, Default, Serialize, Deserialize)]
struct Document {
    #[serde(default)]
    printers: Vec<PrinterConfig>,
    #[serde(default)]
    templates: Vec<TemplateConfig>,
}

/// File-backed store.
pub struct JsonFileStore {
    path: PathBuf,
    /// Serializes read-modify-write cycles within this process.
    lock: Mutex<()>,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> Result<Document, StoreError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => Ok(Document::default()),
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Document::default()),
            Err(e) => Err(StoreError::Io(format!(
                "Failed to read {}: {}",
                self.path.display(),
                e
            ))),
        }
    }

    async fn write(&self, doc: &Document) -> Result<(), StoreError> {
        let data = serde_json::to_vec_pretty(doc)?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        tokio::fs::write(&tmp, &data).await.map_err(|e| {
            StoreError::Io(format!("Failed to write {}: {}", tmp.display(), e))
        })?;
        tokio::fs::rename(&tmp, &self.path).await.map_err(|e| {
            StoreError::Io(format!("Failed to replace {}: {}", self.path.display(), e))
        })?;

        debug!(path = %self.path.display(), bytes = data.len(), "Store written");
        Ok(())
    }

    /// Run one read-modify-write cycle under the process-local lock.
    async fn modify(&self, change: impl FnOnce(&mut Document)) -> Result<(), StoreError> {
        let _guard = self.lock.lock().await;
        let mut doc = self.load().await?;
        change(&mut doc);
        self.write(&doc).await
    }
}

#[async_trait]
impl ConfigStore for JsonFileStore {
    async fn list_printers(&self) -> Result<Vec<PrinterConfig>, StoreError> {
        let _guard = self.lock.lock().await;
        Ok(self.load().await?.printers)
    }

    async fn upsert_printer(&self, printer: &PrinterConfig) -> Result<(), StoreError> {
        self.modify(|doc| upsert_by(&mut doc.printers, printer, |p| p.id))
            .await
    }

    async fn upsert_printers(&self, printers: &[PrinterConfig]) -> Result<(), StoreError> {
        self.modify(|doc| {
            for printer in printers {
                upsert_by(&mut doc.printers, printer, |p| p.id);
            }
        })
        .await
    }

    async fn delete_printer(&self, id: PrinterId) -> Result<(), StoreError> {
        self.modify(|doc| doc.printers.retain(|p| p.id != id)).await
    }

    async fn list_templates(&self) -> Result<Vec<TemplateConfig>, StoreError> {
        let _guard = self.lock.lock().await;
        Ok(self.load().await?.templates)
    }

    async fn upsert_template(&self, template: &TemplateConfig) -> Result<(), StoreError> {
        self.modify(|doc| {
            upsert_by(&mut doc.templates, template, |t| t.template_id.clone())
        })
        .await
    }

    async fn delete_template(&self, id: &str) -> Result<(), StoreError> {
        self.modify(|doc| doc.templates.retain(|t| t.template_id != id))
            .await
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{PaperWidth, TemplateType};
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("fleet.json"));
        assert!(store.list_printers().await.unwrap().is_empty());
        assert!(store.list_templates().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_round_trip_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("fleet.json");
        let store = JsonFileStore::new(&path);

        let mut printer = PrinterConfig::new("Bar", "00:11:62:01:02:03");
        printer.paper_width = PaperWidth::Mm80;
        store.upsert_printer(&printer).await.unwrap();
        store
            .upsert_template(&TemplateConfig::builtin(TemplateType::Delivery))
            .await
            .unwrap();

        let reopened = JsonFileStore::new(&path);
        assert_eq!(reopened.list_printers().await.unwrap(), vec![printer]);
        let templates = reopened.list_templates().await.unwrap();
        assert_eq!(templates.len(), 1);
        assert_eq!(templates[0].template_id, "delivery");
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[tokio::test]
    async fn test_batch_upsert() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("fleet.json"));

        let mut a = PrinterConfig::new("A", "00:00:00:00:00:01");
        let b = PrinterConfig::new("B", "00:00:00:00:00:02");
        store.upsert_printers(&[a.clone(), b.clone()]).await.unwrap();

        a.is_default = true;
        store.upsert_printers(&[a.clone()]).await.unwrap();

        let printers = store.list_printers().await.unwrap();
        assert_eq!(printers, vec![a, b]);
    }

    #[tokio::test]
    async fn test_delete() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("fleet.json"));
        let printer = PrinterConfig::new("A", "00:00:00:00:00:01");
        store.upsert_printer(&printer).await.unwrap();
        store.delete_printer(printer.id).await.unwrap();
        assert!(store.list_printers().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_corrupt_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fleet.json");
        std::fs::write(&path, "{ not json").unwrap();
        let store = JsonFileStore::new(&path);
        assert!(matches!(
            store.list_printers().await,
            Err(StoreError::Corrupt(_))
        ));
    }
}
