//! In-memory [`VectorIndex`] for tests and single-process deployments.
//!
//! Records live in a `HashMap` behind a `RwLock`. Queries are brute-force
//! cosine similarity over every record that passes the metadata filter.

use std::collections::HashMap;
use std::sync::RwLock;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::embedding::cosine_similarity;
use crate::models::{IndexMatch, VectorRecord};

use super::{MetadataFilter, VectorIndex};

struct StoredVector {
    values: Vec<f32>,
    metadata: Map<String, Value>,
}

pub struct InMemoryIndex {
    records: RwLock<HashMap<String, StoredVector>>,
}

impl InMemoryIndex {
    pub fn new() -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.records.read().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InMemoryIndex {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VectorIndex for InMemoryIndex {
    async fn upsert(&self, records: &[VectorRecord]) -> Result<usize> {
        let mut stored = self
            .records
            .write()
            .map_err(|_| anyhow!("in-memory index lock poisoned"))?;
        for record in records {
            let metadata = match serde_json::to_value(&record.metadata)? {
                Value::Object(map) => map,
                _ => Map::new(),
            };
            stored.insert(
                record.id.clone(),
                StoredVector {
                    values: record.values.clone(),
                    metadata,
                },
            );
        }
        Ok(records.len())
    }

    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        filter: &MetadataFilter,
    ) -> Result<Vec<IndexMatch>> {
        let stored = self
            .records
            .read()
            .map_err(|_| anyhow!("in-memory index lock poisoned"))?;

        let mut matches: Vec<IndexMatch> = stored
            .iter()
            .filter(|(_, sv)| filter.matches(&sv.metadata))
            .map(|(id, sv)| IndexMatch {
                id: id.clone(),
                score: cosine_similarity(vector, &sv.values) as f64,
                metadata: sv.metadata.clone(),
            })
            .collect();

        matches.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });
        matches.truncate(top_k);
        Ok(matches)
    }
}
