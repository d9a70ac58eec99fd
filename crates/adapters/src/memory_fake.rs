// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory Vector Search client for tests.

use super::{MemoryError, VectorSearchClient};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Default, Clone)]
pub struct FakeVectorSearchClient {
    indexes: Arc<Mutex<HashMap<String, Vec<(String, Value)>>>>,
}

impl FakeVectorSearchClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Documents in one index, for assertions.
    pub fn documents(&self, index: &str) -> Vec<(String, Value)> {
        self.indexes.lock().get(index).cloned().unwrap_or_default()
    }
}

#[async_trait]
impl VectorSearchClient for FakeVectorSearchClient {
    async fn upsert(&self, index: &str, key: &str, document: &Value) -> Result<(), MemoryError> {
        let mut indexes = self.indexes.lock();
        let entries = indexes.entry(index.to_string()).or_default();
        entries.retain(|(k, _)| k != key);
        entries.push((key.to_string(), document.clone()));
        Ok(())
    }

    async fn query(&self, index: &str, text: &str, limit: usize) -> Result<Vec<Value>, MemoryError> {
        let indexes = self.indexes.lock();
        let needle = text.to_lowercase();
        Ok(indexes
            .get(index)
            .map(|entries| {
                entries
                    .iter()
                    .filter(|(_, doc)| doc.to_string().to_lowercase().contains(&needle))
                    .take(limit)
                    .map(|(_, doc)| doc.clone())
                    .collect()
            })
            .unwrap_or_default())
    }
}
