//! Template engine and library scenarios.

mod common;

use std::sync::Arc;

use pretty_assertions::assert_eq;

use common::{Journal, RecordingStore};
use fleetprint::model::{Cluster, ClusterState, Field, TemplateConfig, TemplateType};
use fleetprint::store::{ConfigStore, JsonFileStore};
use fleetprint::template::{TemplateEdit, apply, is_coherent};
use fleetprint::{FleetError, TemplateDependencyEngine, TemplateLibrary};

fn store_cluster(config: &TemplateConfig) -> [bool; 4] {
    [
        config.show_store_info,
        config.show_store_name,
        config.show_store_address,
        config.show_store_phone,
    ]
}

// ============================================================================
// CASCADE
// ============================================================================

#[test]
fn test_store_info_on_shows_all_store_fields() {
    let config = TemplateConfig::custom("Counter", TemplateType::FullDetails);
    assert_eq!(store_cluster(&config), [false; 4]);

    let next = apply(
        &config,
        TemplateEdit::Toggle {
            field: Field::StoreInfo,
            on: true,
        },
    )
    .unwrap();
    assert_eq!(store_cluster(&next), [true; 4]);
}

#[test]
fn test_last_store_field_off_hides_store_info() {
    let mut config = TemplateConfig::custom("Counter", TemplateType::FullDetails);
    config.show_store_info = true;
    config.show_store_name = true;

    let mut engine = TemplateDependencyEngine::new(config);
    let draft = engine.toggle(Field::StoreName, false).unwrap();
    assert!(!draft.show_store_info);
}

#[test]
fn test_clusters_stay_coherent_under_any_edit_sequence() {
    // Deterministic pseudo-random walk over every field
    let mut engine = TemplateDependencyEngine::new(TemplateConfig::builtin(TemplateType::Kitchen));
    let mut seed: u32 = 0x2545_f491;
    for _ in 0..500 {
        seed ^= seed << 13;
        seed ^= seed >> 17;
        seed ^= seed << 5;
        let field = Field::ALL[(seed as usize) % Field::ALL.len()];
        let on = seed & 0x100 != 0;

        let before = engine.draft().clone();
        match engine.toggle(field, on).map(is_coherent) {
            Ok(coherent) => assert!(coherent, "{} -> {}", field, on),
            Err(FleetError::FieldGated { .. }) => assert_eq!(engine.draft(), &before),
            Err(e) => panic!("unexpected error: {}", e),
        }
    }
}

#[test]
fn test_clusters_are_independent() {
    let config = TemplateConfig::builtin(TemplateType::Delivery);
    let next = apply(
        &config,
        TemplateEdit::Toggle {
            field: Field::OrderContent,
            on: false,
        },
    )
    .unwrap();

    for cluster in Cluster::ALL {
        let expected = if cluster == Cluster::OrderContent {
            ClusterState::None
        } else {
            ClusterState::All
        };
        assert_eq!(next.cluster_state(cluster), expected, "{:?}", cluster);
    }
}

#[test]
fn test_custom_template_is_blank() {
    for template_type in TemplateType::ALL {
        let config = fleetprint::template::create_custom("Mine", template_type).unwrap();
        assert!(config.all_flags_off());
        assert!(config.template_id.starts_with("custom_"));
    }
}

// ============================================================================
// LIBRARY
// ============================================================================

#[tokio::test]
async fn test_edit_and_save_round_trip_through_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("fleet.json");
    let library = TemplateLibrary::new(Arc::new(JsonFileStore::new(&path)));
    library.ensure_defaults().await.unwrap();

    let mut engine = TemplateDependencyEngine::new(library.load("full_details").await.unwrap());
    engine.toggle(Field::CustomerInfo, false).unwrap();
    engine
        .apply(TemplateEdit::SetFooterText("Come again".into()))
        .unwrap();
    library.save(engine.into_draft()).await.unwrap();

    let reopened = TemplateLibrary::new(Arc::new(JsonFileStore::new(&path)));
    let saved = reopened.load("full_details").await.unwrap();
    assert_eq!(saved.cluster_state(Cluster::CustomerInfo), ClusterState::None);
    assert_eq!(saved.footer_text, "Come again");
}

#[tokio::test]
async fn test_reset_all_collects_failures() {
    let journal = Journal::default();
    let store = Arc::new(RecordingStore::new(journal.clone()));
    let library = TemplateLibrary::new(store.clone());
    library.ensure_defaults().await.unwrap();
    let a = library.create_custom("A", TemplateType::Kitchen).await.unwrap();
    let b = library.create_custom("B", TemplateType::Delivery).await.unwrap();
    journal.clear();

    store.fail_templates(&[a.template_id.as_str(), "delivery"]);
    let summary = library.reset_all().await.unwrap();

    assert!(!summary.is_complete());
    assert_eq!(summary.deleted, vec![b.template_id.clone()]);
    assert_eq!(summary.reset, vec!["full_details", "kitchen"]);
    let failed: Vec<&str> = summary.failures.iter().map(|(id, _)| id.as_str()).collect();
    assert_eq!(failed, vec![a.template_id.as_str(), "delivery"]);

    // Every step was attempted despite the failures
    let attempted = journal.entries();
    assert_eq!(attempted.len(), 5);

    let remaining: Vec<String> = store
        .list_templates()
        .await
        .unwrap()
        .into_iter()
        .map(|t| t.template_id)
        .collect();
    assert!(remaining.contains(&a.template_id));
    assert!(!remaining.contains(&b.template_id));
}

#[tokio::test]
async fn test_builtins_cannot_be_deleted_but_can_be_reset() {
    let store = Arc::new(RecordingStore::new(Journal::default()));
    let library = TemplateLibrary::new(store);

    assert!(matches!(
        library.delete("kitchen").await,
        Err(FleetError::BuiltInTemplate { .. })
    ));

    let mut kitchen = library.load("kitchen").await.unwrap();
    kitchen.show_payment_info = true;
    library.save(kitchen).await.unwrap();

    let reset = library.reset_to_default("kitchen").await.unwrap();
    assert!(!reset.show_payment_info);
    assert_eq!(reset.template_name, "Kitchen Order");
}

#[tokio::test]
async fn test_copy_of_custom_is_independent() {
    let store = Arc::new(RecordingStore::new(Journal::default()));
    let library = TemplateLibrary::new(store);

    let original = library.create_custom("Bar", TemplateType::FullDetails).await.unwrap();
    let mut engine = TemplateDependencyEngine::new(original.clone());
    engine.toggle(Field::Totals, true).unwrap();
    library.save(engine.into_draft()).await.unwrap();

    let copy = library.copy(&original.template_id, "Bar 2").await.unwrap();
    assert_ne!(copy.template_id, original.template_id);
    assert!(copy.show_totals);

    library.delete(&original.template_id).await.unwrap();
    assert!(library.load(&copy.template_id).await.unwrap().show_totals);
}
