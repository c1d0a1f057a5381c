//! In-process [`ConfigStore`] backed by `tokio::sync::RwLock`.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{ConfigStore, StoreError, upsert_by};
use crate::model::{PrinterConfig, PrinterId, TemplateConfig};

#[derive(Debug, Default)]
struct Tables {
    printers: Vec<PrinterConfig>,
    templates: Vec<TemplateConfig>,
}

/// Memory-only store. Clones share the same tables.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    tables: Arc<RwLock<Tables>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-seeded with printers.
    pub fn with_printers(printers: Vec<PrinterConfig>) -> Self {
        Self {
            tables: Arc::new(RwLock::new(Tables {
                printers,
                templates: Vec::new(),
            })),
        }
    }
}

#[async_trait]
impl ConfigStore for MemoryStore {
    async fn list_printers(&self) -> Result<Vec<PrinterConfig>, StoreError> {
        Ok(self.tables.read().await.printers.clone())
    }

    async fn upsert_printer(&self, printer: &PrinterConfig) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        upsert_by(&mut tables.printers, printer, |p| p.id);
        Ok(())
    }

    async fn upsert_printers(&self, printers: &[PrinterConfig]) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        for printer in printers {
            upsert_by(&mut tables.printers, printer, |p| p.id);
        }
        Ok(())
    }

    async fn delete_printer(&self, id: PrinterId) -> Result<(), StoreError> {
        self.tables.write().await.printers.retain(|p| p.id != id);
        Ok(())
    }

    async fn list_templates(&self) -> Result<Vec<TemplateConfig>, StoreError> {
        Ok(self.tables.read().await.templates.clone())
    }

    async fn upsert_template(&self, template: &TemplateConfig) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        upsert_by(&mut tables.templates, template, |t| t.template_id.clone());
        Ok(())
    }

    async fn delete_template(&self, id: &str) -> Result<(), StoreError> {
        self.tables
            .write()
            .await
            .templates
            .retain(|t| t.template_id != id);
        Ok(())
    }
}
