// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Memory backend attachment.
//!
//! Binds per-crew storage deterministically to the crew identity. No
//! active backend config (or the explicit "disabled" profile) means
//! the orchestration library's default store applies untouched. Custom
//! backends attach one store per enabled memory type and turn the
//! library default off so both never run together. The per-run storage
//! directory travels through an environment variable scoped by an RAII
//! guard that restores the prior value on teardown.

use kasal_adapters::{
    DatabricksMemoryStore, LocalMemoryStore, MemoryStore, MemoryType, TraceSink, TraceTag,
    TracedMemoryStore, VectorSearchClient,
};
use kasal_core::{MemoryBackendConfig, MemoryBackendType};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Environment variable the orchestration library reads for its
/// storage directory.
pub const MEMORY_DIR_ENV: &str = "KASAL_MEMORY_DIR";

/// Restores the prior storage-directory variable when dropped.
pub struct MemoryDirGuard {
    prior: Option<String>,
}

impl MemoryDirGuard {
    pub fn set(dir: &Path) -> Self {
        let prior = std::env::var(MEMORY_DIR_ENV).ok();
        std::env::set_var(MEMORY_DIR_ENV, dir);
        Self { prior }
    }
}

impl Drop for MemoryDirGuard {
    fn drop(&mut self) {
        match &self.prior {
            Some(prior) => std::env::set_var(MEMORY_DIR_ENV, prior),
            None => std::env::remove_var(MEMORY_DIR_ENV),
        }
    }
}

/// The outcome of memory attachment for one run.
pub struct MemoryAttachment {
    pub crew_id: String,
    pub stores: Vec<Arc<dyn MemoryStore>>,
    /// True when the library's default store should run (no custom
    /// stores attached).
    pub library_memory: bool,
    /// Keeps the storage-directory env var bound for the run.
    pub dir_guard: Option<MemoryDirGuard>,
}

pub struct MemoryFactory {
    base_dir: PathBuf,
    vector_client: Option<Arc<dyn VectorSearchClient>>,
}

impl MemoryFactory {
    pub fn new(base_dir: PathBuf, vector_client: Option<Arc<dyn VectorSearchClient>>) -> Self {
        Self { base_dir, vector_client }
    }

    /// Attach storage for a crew from its resolved backend config.
    ///
    /// `trace` enables the save/search tracing hooks (debug tracing).
    pub fn attach(
        &self,
        crew_id: &str,
        backend: Option<&MemoryBackendConfig>,
        trace: Option<(TraceSink, TraceTag)>,
    ) -> MemoryAttachment {
        let backend_type = backend.map(|b| b.backend_type).unwrap_or_default();
        let dirname = format!("kasal_{backend_type}_{crew_id}");
        let dir_guard = Some(MemoryDirGuard::set(&self.base_dir.join(dirname)));

        let Some(config) = backend else {
            return self.library_default(crew_id, dir_guard, "no active memory backend config");
        };
        if config.is_disabled_profile() {
            return self.library_default(crew_id, dir_guard, "disabled memory profile");
        }

        let stores: Vec<Arc<dyn MemoryStore>> = match config.backend_type {
            MemoryBackendType::Databricks => {
                let Some(client) = &self.vector_client else {
                    // Vector Search scopes absent: degrade rather than
                    // fail the whole job.
                    return self.library_default(
                        crew_id,
                        dir_guard,
                        "databricks backend without a vector search client",
                    );
                };
                if config.endpoint.as_deref().unwrap_or_default().is_empty() {
                    return self.library_default(
                        crew_id,
                        dir_guard,
                        "databricks backend without an endpoint",
                    );
                }
                enabled_types(config)
                    .map(|memory_type| {
                        wrap(
                            DatabricksMemoryStore::new(client.clone(), memory_type, crew_id),
                            &trace,
                        )
                    })
                    .collect()
            }
            MemoryBackendType::Default => {
                if config.embedder.is_none() {
                    return self.library_default(
                        crew_id,
                        dir_guard,
                        "default backend without a custom embedder",
                    );
                }
                enabled_types(config)
                    .map(|memory_type| {
                        wrap(
                            LocalMemoryStore::new(&self.base_dir, memory_type, crew_id),
                            &trace,
                        )
                    })
                    .collect()
            }
        };

        tracing::info!(
            crew_id,
            backend = %config.backend_type,
            stores = stores.len(),
            "attached custom memory stores"
        );
        MemoryAttachment {
            crew_id: crew_id.to_string(),
            stores,
            library_memory: false,
            dir_guard,
        }
    }

    fn library_default(
        &self,
        crew_id: &str,
        dir_guard: Option<MemoryDirGuard>,
        why: &str,
    ) -> MemoryAttachment {
        tracing::info!(crew_id, why, "using library default memory");
        MemoryAttachment {
            crew_id: crew_id.to_string(),
            stores: Vec::new(),
            library_memory: true,
            dir_guard,
        }
    }
}

fn enabled_types(config: &MemoryBackendConfig) -> impl Iterator<Item = MemoryType> + '_ {
    MemoryType::ALL.into_iter().filter(move |memory_type| match memory_type {
        MemoryType::ShortTerm => config.enable_short_term,
        MemoryType::LongTerm => config.enable_long_term,
        MemoryType::Entity => config.enable_entity,
    })
}

fn wrap<S: MemoryStore + 'static>(
    store: S,
    trace: &Option<(TraceSink, TraceTag)>,
) -> Arc<dyn MemoryStore> {
    match trace {
        Some((sink, tag)) => {
            Arc::new(TracedMemoryStore::new(store, sink.clone(), tag.clone()))
        }
        None => Arc::new(store),
    }
}

#[cfg(test)]
#[path = "memory_tests.rs"]
mod tests;
