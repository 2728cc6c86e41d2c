//! Vector index abstraction.
//!
//! The [`VectorIndex`] trait is the seam between the ingestion/retrieval
//! pipelines and the hosted vector database. The app crate provides a
//! Pinecone-backed implementation; [`memory::InMemoryIndex`] serves tests and
//! single-process deployments.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{json, Map, Value};

use crate::models::{IndexMatch, VectorRecord};

/// Metadata constraints applied to a query.
///
/// Every query is scoped to one user; `extra` adds constraints on further
/// metadata fields.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetadataFilter {
    pub user_id: String,
    pub extra: Map<String, Value>,
}

impl MetadataFilter {
    pub fn for_user(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            extra: Map::new(),
        }
    }

    pub fn with_extra(mut self, extra: Option<Map<String, Value>>) -> Self {
        if let Some(extra) = extra {
            self.extra.extend(extra);
        }
        // The user scope cannot be overridden.
        self.extra.remove("user_id");
        self
    }

    /// Render in Pinecone's filter language.
    ///
    /// A bare user filter is `{"user_id": {"$eq": u}}`. With extra fields the
    /// clauses are combined under `$and`. Extra values that are already
    /// operator objects are passed through unchanged.
    pub fn to_pinecone_filter(&self) -> Value {
        let user_clause = json!({ "user_id": { "$eq": self.user_id } });
        if self.extra.is_empty() {
            return user_clause;
        }

        let mut clauses = vec![user_clause];
        for (key, value) in &self.extra {
            let condition = if is_operator_object(value) {
                value.clone()
            } else {
                json!({ "$eq": value })
            };
            let mut clause = Map::new();
            clause.insert(key.clone(), condition);
            clauses.push(Value::Object(clause));
        }
        json!({ "$and": clauses })
    }

    /// Whether stored metadata satisfies this filter.
    ///
    /// Extra values are plain values (equality) or operator objects using
    /// `$eq`, `$ne`, `$gt`, `$gte`, `$lt`, `$lte`, `$in` and `$nin`, read
    /// the same way Pinecone reads them. A field missing from the metadata
    /// never matches, and neither does an unknown operator.
    pub fn matches(&self, metadata: &Map<String, Value>) -> bool {
        if metadata.get("user_id").and_then(Value::as_str) != Some(self.user_id.as_str()) {
            return false;
        }
        self.extra.iter().all(|(key, condition)| {
            let Some(actual) = metadata.get(key) else {
                return false;
            };
            match condition.as_object() {
                Some(ops) if is_operator_object(condition) => ops
                    .iter()
                    .all(|(op, operand)| apply_operator(op, actual, operand)),
                _ => values_equal(actual, condition),
            }
        })
    }
}

fn is_operator_object(value: &Value) -> bool {
    value
        .as_object()
        .is_some_and(|o| !o.is_empty() && o.keys().all(|k| k.starts_with('$')))
}

fn apply_operator(op: &str, actual: &Value, operand: &Value) -> bool {
    let in_list = || {
        operand
            .as_array()
            .is_some_and(|items| items.iter().any(|item| values_equal(actual, item)))
    };
    let compare = || match (actual.as_f64(), operand.as_f64()) {
        (Some(a), Some(b)) => a.partial_cmp(&b),
        _ => None,
    };

    match op {
        "$eq" => values_equal(actual, operand),
        "$ne" => !values_equal(actual, operand),
        "$gt" => compare().is_some_and(|o| o.is_gt()),
        "$gte" => compare().is_some_and(|o| o.is_ge()),
        "$lt" => compare().is_some_and(|o| o.is_lt()),
        "$lte" => compare().is_some_and(|o| o.is_le()),
        "$in" => in_list(),
        "$nin" => operand.is_array() && !in_list(),
        _ => false,
    }
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}

/// A store of vectors with metadata, queried by similarity.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Insert or replace records by id. Returns the number written.
    async fn upsert(&self, records: &[VectorRecord]) -> Result<usize>;

    /// Nearest neighbours of `vector` that satisfy `filter`, best first,
    /// at most `top_k`.
    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        filter: &MetadataFilter,
    ) -> Result<Vec<IndexMatch>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_only_filter() {
        let filter = MetadataFilter::for_user("alice");
        assert_eq!(
            filter.to_pinecone_filter(),
            json!({"user_id": {"$eq": "alice"}})
        );
    }

    #[test]
    fn test_extra_filters_and_together() {
        let mut extra = Map::new();
        extra.insert("doc_id".into(), json!("d1"));
        extra.insert("page".into(), json!({"$gte": 2}));
        let filter = MetadataFilter::for_user("alice").with_extra(Some(extra));
        assert_eq!(
            filter.to_pinecone_filter(),
            json!({"$and": [
                {"user_id": {"$eq": "alice"}},
                {"doc_id": {"$eq": "d1"}},
                {"page": {"$gte": 2}}
            ]})
        );
    }

    #[test]
    fn test_user_scope_not_overridable() {
        let mut extra = Map::new();
        extra.insert("user_id".into(), json!("mallory"));
        let filter = MetadataFilter::for_user("alice").with_extra(Some(extra));
        assert!(filter.extra.is_empty());
        assert_eq!(filter.user_id, "alice");
    }

    #[test]
    fn test_matches_metadata() {
        let mut extra = Map::new();
        extra.insert("chunk_index".into(), json!(2));
        let filter = MetadataFilter::for_user("u1").with_extra(Some(extra));

        let mut meta = Map::new();
        meta.insert("user_id".into(), json!("u1"));
        meta.insert("chunk_index".into(), json!(2.0));
        assert!(filter.matches(&meta));

        meta.insert("user_id".into(), json!("u2"));
        assert!(!filter.matches(&meta));
    }

    fn metadata(page: f64, file_name: &str) -> Map<String, Value> {
        let mut meta = Map::new();
        meta.insert("user_id".into(), json!("u"));
        meta.insert("page".into(), json!(page));
        meta.insert("file_name".into(), json!(file_name));
        meta
    }

    fn filter(extra: Value) -> MetadataFilter {
        MetadataFilter::for_user("u").with_extra(extra.as_object().cloned())
    }

    #[test]
    fn test_matches_range_operators() {
        let meta = metadata(3.0, "a.pdf");
        assert!(filter(json!({"page": {"$gte": 2}})).matches(&meta));
        assert!(filter(json!({"page": {"$gt": 2, "$lte": 3}})).matches(&meta));
        assert!(!filter(json!({"page": {"$lt": 3}})).matches(&meta));
        assert!(!filter(json!({"page": {"$gt": "2"}})).matches(&meta));
    }

    #[test]
    fn test_matches_set_operators() {
        let meta = metadata(1.0, "a.pdf");
        assert!(filter(json!({"file_name": {"$in": ["a.pdf", "b.pdf"]}})).matches(&meta));
        assert!(!filter(json!({"file_name": {"$nin": ["a.pdf"]}})).matches(&meta));
        assert!(filter(json!({"file_name": {"$ne": "b.pdf"}})).matches(&meta));
        assert!(filter(json!({"page": {"$eq": 1}})).matches(&meta));
    }

    #[test]
    fn test_missing_field_or_unknown_operator_never_matches() {
        let meta = metadata(1.0, "a.pdf");
        assert!(!filter(json!({"doc_id": {"$ne": "d1"}})).matches(&meta));
        assert!(!filter(json!({"page": {"$exists": true}})).matches(&meta));
    }
}
