//! # Template Dependency Engine
//!
//! Keeps one template draft coherent under field edits.
//!
//! ## Cascade Rules
//!
//! 1. Toggling a cluster parent sets the parent and every child of that
//!    cluster to the new value.
//! 2. Toggling a child sets only that child, then re-derives the parent as
//!    the OR of the cluster's children.
//! 3. Clusters never affect each other.
//!
//! Payment info and footer have no children; their parent flag is a plain
//! switch.
//!
//! ## Gates
//!
//! Some children can only be switched on while another field is shown
//! (item prices need item details). Switching on a gated field with a
//! closed gate is rejected. Closing a gate later leaves the dependent field
//! as it is.
//!
//! Every edit is all-or-nothing: a rejected edit leaves the draft untouched.

pub mod library;

use crate::error::{FleetError, FleetResult};
use crate::model::template::is_builtin_id;
use crate::model::{Cluster, Field, TemplateConfig, TemplateType};

pub use library::{ResetSummary, TemplateLibrary};

/// One edit to a template draft.
#[derive(Debug, Clone, PartialEq)]
pub enum TemplateEdit {
    Toggle { field: Field, on: bool },
    SetFooterText(String),
    /// Custom templates only
    Rename(String),
}

/// Compute the draft that results from one edit.
pub fn apply(config: &TemplateConfig, edit: TemplateEdit) -> FleetResult<TemplateConfig> {
    let mut next = config.clone();

    match edit {
        TemplateEdit::Toggle { field, on } => toggle(&mut next, field, on)?,
        TemplateEdit::SetFooterText(text) => next.footer_text = text,
        TemplateEdit::Rename(name) => {
            if !next.is_custom() {
                return Err(FleetError::BuiltInTemplate {
                    id: next.template_id,
                    action: "renamed",
                });
            }
            let name = name.trim();
            if name.is_empty() {
                return Err(FleetError::validation("template_name", "must not be blank"));
            }
            next.template_name = name.to_string();
        }
    }

    Ok(next)
}

fn toggle(config: &mut TemplateConfig, field: Field, on: bool) -> FleetResult<()> {
    let cluster = field.cluster();

    if field.is_parent() {
        config.set(field, on);
        for child in cluster.children() {
            config.set(*child, on);
        }
        return Ok(());
    }

    if let Some(gate) = field.gate() {
        if on && !config.get(gate) {
            return Err(FleetError::FieldGated {
                field: field.name(),
                requires: gate.name(),
            });
        }
    }

    config.set(field, on);
    derive_parent(config, cluster);
    Ok(())
}

/// Set a cluster's parent to the OR of its children.
fn derive_parent(config: &mut TemplateConfig, cluster: Cluster) {
    let children = cluster.children();
    if children.is_empty() {
        return;
    }
    let any = children.iter().any(|child| config.get(*child));
    config.set(cluster.parent(), any);
}

/// Re-derive every parent from its children.
///
/// Stored configs may be incoherent; anything entering the engine passes
/// through here.
pub fn normalize(config: &mut TemplateConfig) {
    for cluster in Cluster::ALL {
        derive_parent(config, cluster);
    }
}

/// Whether every cluster's parent equals the OR of its children.
pub fn is_coherent(config: &TemplateConfig) -> bool {
    Cluster::ALL.iter().all(|cluster| {
        let children = cluster.children();
        children.is_empty()
            || config.get(cluster.parent()) == children.iter().any(|c| config.get(*c))
    })
}

/// A fresh custom template with every flag off.
pub fn create_custom(name: &str, template_type: TemplateType) -> FleetResult<TemplateConfig> {
    let name = name.trim();
    if name.is_empty() {
        return Err(FleetError::validation("template_name", "must not be blank"));
    }
    Ok(TemplateConfig::custom(name, template_type))
}

/// The built-in default for a template id.
///
/// Only built-in ids have a default; custom templates can only be deleted.
pub fn reset_to_default(template_id: &str, template_type: TemplateType) -> FleetResult<TemplateConfig> {
    if !is_builtin_id(template_id) {
        return Err(FleetError::CustomTemplateHasNoDefault {
            id: template_id.to_string(),
        });
    }
    Ok(TemplateConfig::default_for(template_type, template_id))
}

/// Holds the template currently being edited.
#[derive(Debug, Clone)]
pub struct TemplateDependencyEngine {
    draft: TemplateConfig,
}

impl TemplateDependencyEngine {
    /// Start editing `config`. Parents are re-derived on entry.
    pub fn new(mut config: TemplateConfig) -> Self {
        normalize(&mut config);
        Self { draft: config }
    }

    pub fn draft(&self) -> &TemplateConfig {
        &self.draft
    }

    pub fn into_draft(self) -> TemplateConfig {
        self.draft
    }

    /// Apply one edit. On error the draft is unchanged.
    pub fn apply(&mut self, edit: TemplateEdit) -> FleetResult<&TemplateConfig> {
        self.draft = apply(&self.draft, edit)?;
        Ok(&self.draft)
    }

    pub fn toggle(&mut self, field: Field, on: bool) -> FleetResult<&TemplateConfig> {
        self.apply(TemplateEdit::Toggle { field, on })
    }

    /// Discard the draft in favour of its type's default.
    ///
    /// Keeps the original creation time.
    pub fn reset_to_default(&mut self) -> FleetResult<&TemplateConfig> {
        let mut fresh = reset_to_default(&self.draft.template_id, self.draft.template_type)?;
        fresh.created_at = self.draft.created_at;
        self.draft = fresh;
        Ok(&self.draft)
    }
}

// ============================================================================
// TESTS
// ============================================================================
