// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use kasal_adapters::FakeVectorSearchClient;
use kasal_core::{crew_identity, CrewConfig, GroupId};
use serial_test::serial;

fn databricks_config() -> MemoryBackendConfig {
    MemoryBackendConfig {
        backend_type: MemoryBackendType::Databricks,
        enable_short_term: true,
        enable_long_term: true,
        enable_entity: false,
        embedder: None,
        endpoint: Some("vs-endpoint".into()),
    }
}

fn factory(client: Option<Arc<dyn kasal_adapters::VectorSearchClient>>) -> MemoryFactory {
    MemoryFactory::new(PathBuf::from("/tmp/kasal-test-memory"), client)
}

#[test]
#[serial]
fn no_config_means_library_default() {
    let attachment = factory(None).attach("acme_crew_ab12cd34", None, None);
    assert!(attachment.library_memory);
    assert!(attachment.stores.is_empty());
    // The storage directory env var is still bound for the run.
    assert!(std::env::var(MEMORY_DIR_ENV).unwrap().contains("kasal_default_acme_crew_ab12cd34"));
    drop(attachment);
    assert!(std::env::var(MEMORY_DIR_ENV).is_err());
}

#[test]
#[serial]
fn disabled_profile_means_library_default() {
    let config = MemoryBackendConfig {
        backend_type: MemoryBackendType::Databricks,
        ..Default::default()
    };
    let attachment = factory(None).attach("crew", Some(&config), None);
    assert!(attachment.library_memory);
    assert!(attachment.stores.is_empty());
}

#[test]
#[serial]
fn databricks_attaches_one_store_per_enabled_type() {
    let client = Arc::new(FakeVectorSearchClient::new());
    let attachment =
        factory(Some(client)).attach("acme_crew_ab12cd34", Some(&databricks_config()), None);

    assert!(!attachment.library_memory);
    assert_eq!(attachment.stores.len(), 2);
    let collections: Vec<_> =
        attachment.stores.iter().map(|s| s.collection().to_string()).collect();
    assert!(collections.contains(&"kasal_short_term_acme_crew_ab12cd34".to_string()));
    assert!(collections.contains(&"kasal_long_term_acme_crew_ab12cd34".to_string()));
    assert!(std::env::var(MEMORY_DIR_ENV)
        .unwrap()
        .contains("kasal_databricks_acme_crew_ab12cd34"));
}

#[test]
#[serial]
fn databricks_without_client_degrades_to_default() {
    let attachment = factory(None).attach("crew", Some(&databricks_config()), None);
    assert!(attachment.library_memory);
    assert!(attachment.stores.is_empty());
}

#[test]
#[serial]
fn databricks_without_endpoint_degrades_to_default() {
    let client: Arc<dyn kasal_adapters::VectorSearchClient> =
        Arc::new(FakeVectorSearchClient::new());
    let config = MemoryBackendConfig { endpoint: None, ..databricks_config() };
    let attachment = factory(Some(client)).attach("crew", Some(&config), None);
    assert!(attachment.library_memory);
}

#[test]
#[serial]
fn default_backend_with_embedder_uses_local_stores() {
    let config = MemoryBackendConfig {
        backend_type: MemoryBackendType::Default,
        enable_short_term: true,
        enable_long_term: false,
        enable_entity: true,
        embedder: Some(serde_json::json!({"provider": "custom", "model": "embed-1"})),
        endpoint: None,
    };
    let attachment = factory(None).attach("crew", Some(&config), None);
    assert!(!attachment.library_memory);
    assert_eq!(attachment.stores.len(), 2);
    assert_eq!(attachment.stores[0].backend(), "default");
}

#[test]
#[serial]
fn default_backend_without_embedder_is_library_default() {
    let config = MemoryBackendConfig {
        backend_type: MemoryBackendType::Default,
        enable_short_term: true,
        ..Default::default()
    };
    let attachment = factory(None).attach("crew", Some(&config), None);
    assert!(attachment.library_memory);
}

#[test]
#[serial]
fn dir_guard_restores_prior_value() {
    std::env::set_var(MEMORY_DIR_ENV, "/prior");
    {
        let _guard = MemoryDirGuard::set(Path::new("/tmp/next"));
        assert_eq!(std::env::var(MEMORY_DIR_ENV).unwrap(), "/tmp/next");
    }
    assert_eq!(std::env::var(MEMORY_DIR_ENV).unwrap(), "/prior");
    std::env::remove_var(MEMORY_DIR_ENV);
}

#[test]
fn crew_identity_drives_collection_reuse() {
    // Same config + group → same identity → same collections across
    // runs; different group → disjoint collections.
    let config = CrewConfig::from_value(serde_json::json!({
        "name": "research",
        "agents": {"a": {"role": "Researcher"}},
        "tasks": {"t": {"description": "find"}},
    }))
    .unwrap();

    let first = crew_identity(&config, &GroupId::new("acme"), None);
    let second = crew_identity(&config, &GroupId::new("acme"), None);
    let other = crew_identity(&config, &GroupId::new("globex"), None);
    assert_eq!(first, second);
    assert_ne!(first, other);
}
