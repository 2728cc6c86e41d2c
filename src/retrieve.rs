//! Retrieval: embed the query, search the index, deduplicate, rank.
//!
//! Two [`Retriever`] implementations:
//!
//! - [`RetrievalPipeline`] runs the search in process.
//! - [`RetrievalClient`] calls a remote retrieval service over HTTP.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use rag_relay_core::embedding::Embedder;
use rag_relay_core::index::{MetadataFilter, VectorIndex};
use rag_relay_core::metrics::Timer;
use rag_relay_core::models::{RetrievalRequest, RetrievalResult, RetrievedChunk};
use rag_relay_core::ranking::{deduplicate_chunks, rank_chunks};

use crate::error::ProviderError;
use crate::http::{send_json, RetryPolicy};

/// Rejected retrieval input.
#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    #[error("query must not be empty")]
    EmptyQuery,
}

/// Anything that can answer a [`RetrievalRequest`].
#[async_trait]
pub trait Retriever: Send + Sync {
    async fn retrieve(&self, request: RetrievalRequest) -> Result<RetrievalResult>;
}

pub struct RetrievalPipeline {
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
    max_top_k: usize,
}

impl RetrievalPipeline {
    pub fn new(embedder: Arc<dyn Embedder>, index: Arc<dyn VectorIndex>, max_top_k: usize) -> Self {
        Self {
            embedder,
            index,
            max_top_k: max_top_k.max(1),
        }
    }

    fn clamp_top_k(&self, top_k: usize) -> usize {
        top_k.clamp(1, self.max_top_k)
    }
}

#[async_trait]
impl Retriever for RetrievalPipeline {
    async fn retrieve(&self, request: RetrievalRequest) -> Result<RetrievalResult> {
        let timer = Timer::start();
        if request.query.trim().is_empty() {
            return Err(QueryError::EmptyQuery.into());
        }
        let top_k = self.clamp_top_k(request.top_k);

        tracing::info!(query = %request.query, user_id = %request.user_id, top_k, "embedding query");
        let vector = self.embedder.embed_one(&request.query).await?;

        let filter = MetadataFilter::for_user(&request.user_id).with_extra(request.filters.clone());
        let matches = self.index.query(&vector, top_k, &filter).await?;
        if matches.is_empty() {
            tracing::warn!(user_id = %request.user_id, "no matching chunks");
        }

        let chunks: Vec<RetrievedChunk> = matches.into_iter().map(RetrievedChunk::from_match).collect();
        let chunks = rank_chunks(deduplicate_chunks(chunks));

        Ok(RetrievalResult {
            query: request.query,
            num_chunks_searched: chunks.len(),
            chunks,
            retrieval_latency_ms: timer.elapsed_ms(),
        })
    }
}

/// HTTP client for `POST {base_url}/api/v1/retrieve`.
pub struct RetrievalClient {
    client: reqwest::Client,
    base_url: String,
}

impl RetrievalClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl Retriever for RetrievalClient {
    async fn retrieve(&self, request: RetrievalRequest) -> Result<RetrievalResult> {
        let url = format!("{}/api/v1/retrieve", self.base_url);
        tracing::info!(url = %url, "calling retrieval service");
        let value = send_json("retrieval service", RetryPolicy::none(), || {
            self.client.post(&url).json(&request)
        })
        .await?;
        let result = serde_json::from_value(value).map_err(|e| ProviderError::InvalidResponse {
            service: "retrieval service",
            message: e.to_string(),
        })?;
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rag_relay_core::index::memory::InMemoryIndex;
    use rag_relay_core::models::{ChunkMetadata, IndexMatch, VectorRecord};
    use serde_json::json;
    use std::sync::Mutex;

    struct AxisEmbedder;

    #[async_trait]
    impl Embedder for AxisEmbedder {
        fn model_name(&self) -> &str {
            "axis"
        }

        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|_| vec![1.0, 0.0]).collect())
        }
    }

    /// Returns canned matches and records the requested `top_k`.
    struct CannedIndex {
        matches: Vec<IndexMatch>,
        seen_top_k: Mutex<Option<usize>>,
    }

    #[async_trait]
    impl VectorIndex for CannedIndex {
        async fn upsert(&self, records: &[VectorRecord]) -> Result<usize> {
            Ok(records.len())
        }

        async fn query(
            &self,
            _vector: &[f32],
            top_k: usize,
            _filter: &MetadataFilter,
        ) -> Result<Vec<IndexMatch>> {
            *self.seen_top_k.lock().unwrap() = Some(top_k);
            Ok(self.matches.clone())
        }
    }

    fn canned(id: &str, doc_id: &str, chunk_index: u32, score: f64) -> IndexMatch {
        serde_json::from_value(json!({
            "id": id,
            "score": score,
            "metadata": {"text": format!("text {}", id), "doc_id": doc_id, "chunk_index": chunk_index}
        }))
        .unwrap()
    }

    fn record(id: &str, user: &str, values: Vec<f32>) -> VectorRecord {
        VectorRecord {
            id: id.into(),
            values,
            metadata: ChunkMetadata {
                doc_id: format!("doc-{}", id),
                source_url: String::new(),
                page: 1,
                chunk_index: 0,
                text: format!("text {}", id),
                user_id: user.into(),
                created_at: 0,
                file_name: "a.txt".into(),
                content_hash: String::new(),
            },
        }
    }

    #[tokio::test]
    async fn test_dedup_then_rank() {
        let index = Arc::new(CannedIndex {
            matches: vec![
                canned("a", "d1", 0, 0.5),
                canned("b", "d1", 0, 0.9),
                canned("c", "d2", 3, 0.7),
            ],
            seen_top_k: Mutex::new(None),
        });
        let pipeline = RetrievalPipeline::new(Arc::new(AxisEmbedder), index, 50);

        let result = pipeline
            .retrieve(RetrievalRequest::new("what is rust", "u1", 5))
            .await
            .unwrap();
        let ids: Vec<&str> = result.chunks.iter().map(|c| c.id.as_str()).collect();
        // "b" duplicates "a" on (d1, 0) and is dropped even though it scores higher
        assert_eq!(ids, vec!["c", "a"]);
        assert_eq!(result.num_chunks_searched, 2);
        assert_eq!(result.query, "what is rust");
    }

    #[tokio::test]
    async fn test_top_k_clamped() {
        let index = Arc::new(CannedIndex {
            matches: Vec::new(),
            seen_top_k: Mutex::new(None),
        });
        let pipeline = RetrievalPipeline::new(Arc::new(AxisEmbedder), index.clone(), 50);

        pipeline
            .retrieve(RetrievalRequest::new("q", "u", 500))
            .await
            .unwrap();
        assert_eq!(*index.seen_top_k.lock().unwrap(), Some(50));

        pipeline.retrieve(RetrievalRequest::new("q", "u", 0)).await.unwrap();
        assert_eq!(*index.seen_top_k.lock().unwrap(), Some(1));
    }

    #[tokio::test]
    async fn test_empty_query_rejected() {
        let pipeline = RetrievalPipeline::new(
            Arc::new(AxisEmbedder),
            Arc::new(InMemoryIndex::new()),
            50,
        );
        let err = pipeline
            .retrieve(RetrievalRequest::new("   ", "u", 5))
            .await
            .unwrap_err();
        assert!(matches!(err.downcast_ref::<QueryError>(), Some(QueryError::EmptyQuery)));
    }

    #[tokio::test]
    async fn test_user_isolation_with_memory_index() {
        let index = Arc::new(InMemoryIndex::new());
        index
            .upsert(&[
                record("mine", "alice", vec![1.0, 0.0]),
                record("theirs", "bob", vec![1.0, 0.0]),
            ])
            .await
            .unwrap();
        let pipeline = RetrievalPipeline::new(Arc::new(AxisEmbedder), index, 50);

        let result = pipeline
            .retrieve(RetrievalRequest::new("q", "alice", 5))
            .await
            .unwrap();
        assert_eq!(result.chunks.len(), 1);
        assert_eq!(result.chunks[0].id, "mine");
        assert_eq!(result.chunks[0].page, Some(1));
    }
}
