// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Memory storage seams.
//!
//! A [`MemoryStore`] is one crew's short-term, long-term, or entity
//! memory, bound to a collection name derived from the crew identity.
//! The Databricks store talks through a [`VectorSearchClient`] (the
//! network client is external); the local store backs the default
//! backend's custom-embedder path with an append-only JSON-lines file.
//! [`TracedMemoryStore`] wraps any store with trace-event hooks.

use async_trait::async_trait;
use kasal_core::{EventType, GroupId, JobId, TraceEvent};
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MemoryError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("vector search error: {0}")]
    VectorSearch(String),
    #[error("memory backend not configured: {0}")]
    NotConfigured(String),
}

/// Which memory a store holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryType {
    ShortTerm,
    LongTerm,
    Entity,
}

kasal_core::simple_display! {
    MemoryType {
        ShortTerm => "short_term",
        LongTerm => "long_term",
        Entity => "entity",
    }
}

impl MemoryType {
    pub const ALL: [MemoryType; 3] = [MemoryType::ShortTerm, MemoryType::LongTerm, MemoryType::Entity];
}

/// Per-crew memory storage: save and similarity search.
#[async_trait]
pub trait MemoryStore: Send + Sync {
    fn backend(&self) -> &str;
    fn memory_type(&self) -> MemoryType;
    fn collection(&self) -> &str;

    async fn save(&self, key: &str, value: &Value) -> Result<(), MemoryError>;
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<Value>, MemoryError>;
}

/// The external Vector Search client surface the Databricks store
/// consumes. Implemented outside the core (Databricks SDK); faked in
/// tests.
#[async_trait]
pub trait VectorSearchClient: Send + Sync {
    async fn upsert(
        &self,
        index: &str,
        key: &str,
        document: &Value,
    ) -> Result<(), MemoryError>;
    async fn query(
        &self,
        index: &str,
        text: &str,
        limit: usize,
    ) -> Result<Vec<Value>, MemoryError>;
}

/// Databricks-backed memory: one Vector Search index per memory type,
/// named after the crew identity.
pub struct DatabricksMemoryStore {
    client: Arc<dyn VectorSearchClient>,
    memory_type: MemoryType,
    collection: String,
}

impl DatabricksMemoryStore {
    pub fn new(client: Arc<dyn VectorSearchClient>, memory_type: MemoryType, crew_id: &str) -> Self {
        Self {
            client,
            memory_type,
            collection: format!("kasal_{memory_type}_{crew_id}"),
        }
    }
}

#[async_trait]
impl MemoryStore for DatabricksMemoryStore {
    fn backend(&self) -> &str {
        "databricks"
    }

    fn memory_type(&self) -> MemoryType {
        self.memory_type
    }

    fn collection(&self) -> &str {
        &self.collection
    }

    async fn save(&self, key: &str, value: &Value) -> Result<(), MemoryError> {
        self.client.upsert(&self.collection, key, value).await
    }

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<Value>, MemoryError> {
        self.client.query(&self.collection, query, limit).await
    }
}

/// Local JSON-lines store for the default backend's custom-embedder
/// path. One file per collection under the crew's storage directory.
pub struct LocalMemoryStore {
    memory_type: MemoryType,
    collection: String,
    path: PathBuf,
}

impl LocalMemoryStore {
    pub fn new(base_dir: &std::path::Path, memory_type: MemoryType, crew_id: &str) -> Self {
        let collection = format!("kasal_{memory_type}_{crew_id}");
        let path = base_dir.join(format!("{collection}.jsonl"));
        Self { memory_type, collection, path }
    }
}

#[async_trait]
impl MemoryStore for LocalMemoryStore {
    fn backend(&self) -> &str {
        "default"
    }

    fn memory_type(&self) -> MemoryType {
        self.memory_type
    }

    fn collection(&self) -> &str {
        &self.collection
    }

    async fn save(&self, key: &str, value: &Value) -> Result<(), MemoryError> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let line = serde_json::to_string(&json!({"key": key, "value": value}))?;
        let mut contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(e) => return Err(e.into()),
        };
        contents.push_str(&line);
        contents.push('\n');
        tokio::fs::write(&self.path, contents).await?;
        Ok(())
    }

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<Value>, MemoryError> {
        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let query_lower = query.to_lowercase();
        let mut hits = Vec::new();
        for line in contents.lines() {
            let entry: Value = serde_json::from_str(line)?;
            if entry.to_string().to_lowercase().contains(&query_lower) {
                hits.push(entry);
                if hits.len() >= limit {
                    break;
                }
            }
        }
        Ok(hits)
    }
}

/// Where memory tracing hooks publish their events. The engine passes
/// its trace-queue publisher; the hook never blocks on it.
pub type TraceSink = Arc<dyn Fn(TraceEvent) + Send + Sync>;

/// Identity of the job a traced store is attached to.
#[derive(Clone)]
pub struct TraceTag {
    pub job_id: JobId,
    pub group_id: GroupId,
    pub group_email: String,
}

/// Wraps a store so that every save/search emits `memory_write` /
/// `memory_retrieval` trace events (plus their `_started` companions).
pub struct TracedMemoryStore<S> {
    inner: S,
    sink: TraceSink,
    tag: TraceTag,
}

impl<S: MemoryStore> TracedMemoryStore<S> {
    pub fn new(inner: S, sink: TraceSink, tag: TraceTag) -> Self {
        Self { inner, sink, tag }
    }

    fn emit(&self, event_type: EventType, context: &str, output: String) {
        let event = TraceEvent::new(
            self.tag.job_id.clone(),
            event_type,
            format!("Memory[{}:{}]", self.inner.memory_type(), self.inner.backend()),
            self.tag.group_id.clone(),
            self.tag.group_email.clone(),
            chrono::Utc::now(),
        )
        .event_context(context)
        .output(output);
        (self.sink)(event);
    }
}

/// Truncate long memory payloads to a trace-friendly snippet.
fn snippet(value: &Value) -> String {
    let text = value.to_string();
    if text.len() > 200 {
        let mut cut = 200;
        while !text.is_char_boundary(cut) {
            cut -= 1;
        }
        format!("{}…", &text[..cut])
    } else {
        text
    }
}

#[async_trait]
impl<S: MemoryStore> MemoryStore for TracedMemoryStore<S> {
    fn backend(&self) -> &str {
        self.inner.backend()
    }

    fn memory_type(&self) -> MemoryType {
        self.inner.memory_type()
    }

    fn collection(&self) -> &str {
        self.inner.collection()
    }

    async fn save(&self, key: &str, value: &Value) -> Result<(), MemoryError> {
        self.emit(EventType::MemoryWriteStarted, key, String::new());
        let result = self.inner.save(key, value).await;
        if result.is_ok() {
            self.emit(EventType::MemoryWrite, key, snippet(value));
        }
        result
    }

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<Value>, MemoryError> {
        self.emit(EventType::MemoryRetrievalStarted, query, String::new());
        let result = self.inner.search(query, limit).await;
        if let Ok(hits) = &result {
            self.emit(
                EventType::MemoryRetrieval,
                query,
                snippet(&json!({"hits": hits.len()})),
            );
        }
        result
    }
}

// Test support - only compiled for tests or when explicitly requested
#[cfg(any(test, feature = "test-support"))]
#[path = "memory_fake.rs"]
mod fake;
#[cfg(any(test, feature = "test-support"))]
pub use fake::FakeVectorSearchClient;

#[cfg(test)]
#[path = "memory_tests.rs"]
mod tests;
