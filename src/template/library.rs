//! # Template Library
//!
//! Store-backed operations on saved templates. Built-in templates always
//! exist: a built-in missing from the store is served from its default.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use super::{create_custom, normalize, reset_to_default};
use crate::error::{FleetError, FleetResult};
use crate::model::template::{generate_custom_id, is_builtin_id, is_custom_id};
use crate::model::{TemplateConfig, TemplateType};
use crate::store::ConfigStore;

/// Outcome of [`TemplateLibrary::reset_all`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResetSummary {
    /// Built-in templates restored to their defaults
    pub reset: Vec<String>,
    /// Custom templates removed
    pub deleted: Vec<String>,
    /// `(template_id, message)` for every step that failed
    pub failures: Vec<(String, String)>,
}

impl ResetSummary {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

pub struct TemplateLibrary {
    store: Arc<dyn ConfigStore>,
}

impl TemplateLibrary {
    pub fn new(store: Arc<dyn ConfigStore>) -> Self {
        Self { store }
    }

    /// Write the default of every built-in template missing from the store.
    ///
    /// Returns how many were created.
    pub async fn ensure_defaults(&self) -> FleetResult<usize> {
        let stored = self.store.list_templates().await?;
        let mut created = 0;
        for template_type in TemplateType::ALL {
            let id = template_type.builtin_id();
            if stored.iter().any(|t| t.template_id == id) {
                continue;
            }
            self.store
                .upsert_template(&TemplateConfig::builtin(template_type))
                .await?;
            debug!(template_id = id, "Built-in template created");
            created += 1;
        }
        if created > 0 {
            info!(created, "Default templates materialized");
        }
        Ok(created)
    }

    /// Every template: built-ins first, then custom ones in store order.
    pub async fn list(&self) -> FleetResult<Vec<TemplateConfig>> {
        let stored = self.store.list_templates().await?;

        let mut templates: Vec<TemplateConfig> = TemplateType::ALL
            .iter()
            .map(|t| {
                stored
                    .iter()
                    .find(|s| s.template_id == t.builtin_id())
                    .cloned()
                    .unwrap_or_else(|| TemplateConfig::builtin(*t))
            })
            .collect();
        templates.extend(stored.into_iter().filter(|t| !is_builtin_id(&t.template_id)));

        for template in &mut templates {
            normalize(template);
        }
        Ok(templates)
    }

    pub async fn list_by_type(&self, template_type: TemplateType) -> FleetResult<Vec<TemplateConfig>> {
        let mut templates = self.list().await?;
        templates.retain(|t| t.template_type == template_type);
        Ok(templates)
    }

    pub async fn load(&self, template_id: &str) -> FleetResult<TemplateConfig> {
        let stored = self.store.list_templates().await?;
        let mut template = match stored.into_iter().find(|t| t.template_id == template_id) {
            Some(template) => template,
            None => match TemplateType::from_builtin_id(template_id) {
                Some(template_type) => TemplateConfig::builtin(template_type),
                None => return Err(FleetError::NotFound(format!("template '{}'", template_id))),
            },
        };
        normalize(&mut template);
        Ok(template)
    }

    /// Persist a template, stamping `updated_at`.
    pub async fn save(&self, template: TemplateConfig) -> FleetResult<TemplateConfig> {
        if template.template_id.trim().is_empty() {
            return Err(FleetError::validation("template_id", "must not be blank"));
        }
        if template.template_name.trim().is_empty() {
            return Err(FleetError::validation("template_name", "must not be blank"));
        }

        let mut template = template;
        normalize(&mut template);
        template.updated_at = Utc::now();
        self.store.upsert_template(&template).await?;
        info!(template_id = %template.template_id, "Template saved");
        Ok(template)
    }

    /// Create and persist a blank custom template.
    pub async fn create_custom(&self, name: &str, template_type: TemplateType) -> FleetResult<TemplateConfig> {
        let template = create_custom(name, template_type)?;
        self.store.upsert_template(&template).await?;
        info!(template_id = %template.template_id, name = %template.template_name, "Custom template created");
        Ok(template)
    }

    /// Copy any template's flags into a new custom template.
    pub async fn copy(&self, source_id: &str, new_name: &str) -> FleetResult<TemplateConfig> {
        let new_name = new_name.trim();
        if new_name.is_empty() {
            return Err(FleetError::validation("template_name", "must not be blank"));
        }

        let source = self.load(source_id).await?;
        let now = Utc::now();
        let copy = TemplateConfig {
            template_id: generate_custom_id(),
            template_name: new_name.to_string(),
            created_at: now,
            updated_at: now,
            ..source
        };
        self.store.upsert_template(&copy).await?;
        info!(source = source_id, template_id = %copy.template_id, "Template copied");
        Ok(copy)
    }

    /// Restore a built-in template to its type's default.
    pub async fn reset_to_default(&self, template_id: &str) -> FleetResult<TemplateConfig> {
        let current = self.load(template_id).await?;
        let mut fresh = reset_to_default(template_id, current.template_type)?;
        fresh.created_at = current.created_at;
        self.store.upsert_template(&fresh).await?;
        info!(template_id, "Template reset to default");
        Ok(fresh)
    }

    /// Delete a custom template. Built-ins can only be reset.
    pub async fn delete(&self, template_id: &str) -> FleetResult<()> {
        if is_builtin_id(template_id) {
            return Err(FleetError::BuiltInTemplate {
                id: template_id.to_string(),
                action: "deleted",
            });
        }
        let stored = self.store.list_templates().await?;
        if !stored.iter().any(|t| t.template_id == template_id) {
            return Err(FleetError::NotFound(format!("template '{}'", template_id)));
        }
        self.store.delete_template(template_id).await?;
        info!(template_id, "Template deleted");
        Ok(())
    }

    /// Delete every custom template and reset every built-in.
    ///
    /// Each step runs even if earlier ones failed; failures are collected
    /// in the summary. Only a failure to list the templates aborts.
    pub async fn reset_all(&self) -> FleetResult<ResetSummary> {
        let stored = self.store.list_templates().await?;
        let mut summary = ResetSummary::default();

        for template in stored.iter().filter(|t| !is_builtin_id(&t.template_id)) {
            let id = &template.template_id;
            if !is_custom_id(id) {
                debug!(template_id = %id, "Removing template with unrecognized id");
            }
            match self.store.delete_template(id).await {
                Ok(()) => summary.deleted.push(id.clone()),
                Err(e) => {
                    warn!(template_id = %id, error = %e, "Template delete failed");
                    summary.failures.push((id.clone(), e.to_string()));
                }
            }
        }

        for template_type in TemplateType::ALL {
            let id = template_type.builtin_id();
            let mut fresh = TemplateConfig::builtin(template_type);
            if let Some(existing) = stored.iter().find(|t| t.template_id == id) {
                fresh.created_at = existing.created_at;
            }
            match self.store.upsert_template(&fresh).await {
                Ok(()) => summary.reset.push(id.to_string()),
                Err(e) => {
                    warn!(template_id = id, error = %e, "Template reset failed");
                    summary.failures.push((id.to_string(), e.to_string()));
                }
            }
        }

        info!(
            reset = summary.reset.len(),
            deleted = summary.deleted.len(),
            failed = summary.failures.len(),
            "All templates reset"
        );
        Ok(summary)
    }
}

// ============================================================================
// TESTS
// ============================================================================
