//! Request and response records exchanged between the RAG services.
//!
//! Every type here is a flat JSON record: constructed per request,
//! serialized onto the wire, and discarded after the response. Field names
//! are the wire names (snake_case).

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// User ID applied when a request does not name one.
pub const DEFAULT_USER_ID: &str = "default";

fn default_user_id() -> String {
    DEFAULT_USER_ID.to_string()
}

fn default_top_k() -> usize {
    5
}

fn default_max_tokens() -> u32 {
    1000
}

fn default_temperature() -> f32 {
    0.7
}

// ============ Ingestion ============

/// Outcome of an ingestion request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IngestStatus {
    Processing,
    Complete,
    Error,
}

/// Options accepted alongside an uploaded document.
#[derive(Debug, Clone, Deserialize)]
pub struct IngestOptions {
    #[serde(default = "default_user_id")]
    pub user_id: String,
    /// Characters per chunk; falls back to the service configuration.
    #[serde(default)]
    pub chunk_size: Option<usize>,
    /// Characters shared by consecutive chunks; falls back to the service configuration.
    #[serde(default)]
    pub overlap: Option<usize>,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            user_id: default_user_id(),
            chunk_size: None,
            overlap: None,
        }
    }
}

/// Response body of `POST /api/v1/ingest`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestResponse {
    pub status: IngestStatus,
    pub doc_id: String,
    pub chunks_created: usize,
    /// Estimated tokens sent to the embedding model.
    pub embedding_tokens: usize,
    /// Estimated embedding cost in USD.
    pub cost_estimate: f64,
    #[serde(default)]
    pub message: Option<String>,
}

impl IngestResponse {
    pub fn complete(doc_id: String, chunks_created: usize, tokens: usize, cost: f64) -> Self {
        Self {
            status: IngestStatus::Complete,
            doc_id,
            chunks_created,
            embedding_tokens: tokens,
            cost_estimate: cost,
            message: Some(format!("Ingested {} chunks", chunks_created)),
        }
    }

    /// An error outcome: nothing was stored for `doc_id`.
    pub fn failed(doc_id: String, message: impl Into<String>) -> Self {
        Self {
            status: IngestStatus::Error,
            doc_id,
            chunks_created: 0,
            embedding_tokens: 0,
            cost_estimate: 0.0,
            message: Some(message.into()),
        }
    }
}

// ============ Retrieval ============

/// Request body of `POST /api/v1/retrieve`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalRequest {
    pub query: String,
    #[serde(default = "default_user_id")]
    pub user_id: String,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// Extra metadata equality filters, AND-ed with the user filter.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filters: Option<Map<String, Value>>,
}

impl RetrievalRequest {
    pub fn new(query: impl Into<String>, user_id: impl Into<String>, top_k: usize) -> Self {
        Self {
            query: query.into(),
            user_id: user_id.into(),
            top_k,
            filters: None,
        }
    }
}

/// Metadata keys lifted into [`RetrievedChunk`] fields.
const LIFTED_KEYS: [&str; 5] = ["text", "doc_id", "source_url", "page", "chunk_index"];

/// A single chunk returned by the retrieval service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedChunk {
    pub id: String,
    pub text: String,
    pub doc_id: String,
    pub source_url: String,
    #[serde(default)]
    pub page: Option<u32>,
    pub chunk_index: u32,
    /// Similarity score from the vector index.
    #[serde(default)]
    pub score: Option<f64>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl RetrievedChunk {
    /// Builds a chunk from a raw index match.
    ///
    /// Missing `text`/`source_url` become empty strings and a missing
    /// `chunk_index` becomes 0. A stored page of 0 means "unknown" and maps
    /// to `None`. Metadata keys that are not lifted into fields are kept
    /// under [`metadata`](Self::metadata).
    pub fn from_match(m: IndexMatch) -> Self {
        let IndexMatch {
            id,
            score,
            mut metadata,
        } = m;

        let text = take_string(&metadata, "text");
        let doc_id = take_string(&metadata, "doc_id");
        let source_url = take_string(&metadata, "source_url");
        let page = metadata
            .get("page")
            .and_then(Value::as_f64)
            .map(|p| p as u32)
            .filter(|p| *p > 0);
        let chunk_index = metadata
            .get("chunk_index")
            .and_then(Value::as_f64)
            .map(|i| i as u32)
            .unwrap_or(0);

        for key in LIFTED_KEYS {
            metadata.remove(key);
        }

        Self {
            id,
            text,
            doc_id,
            source_url,
            page,
            chunk_index,
            score: Some(score),
            metadata,
        }
    }
}

fn take_string(metadata: &Map<String, Value>, key: &str) -> String {
    metadata
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

/// Response body of `POST /api/v1/retrieve`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalResult {
    pub query: String,
    pub chunks: Vec<RetrievedChunk>,
    pub retrieval_latency_ms: f64,
    pub num_chunks_searched: usize,
}

impl RetrievalResult {
    pub fn empty(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            chunks: Vec::new(),
            retrieval_latency_ms: 0.0,
            num_chunks_searched: 0,
        }
    }
}

// ============ Synthesis ============

/// Request body of `POST /api/v1/synthesize`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynthesisRequest {
    pub query: String,
    /// Pre-fetched retrieval output. When absent the synthesis service
    /// calls the retrieval service itself.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retrieval_result: Option<RetrievalResult>,
    #[serde(default = "default_user_id")]
    pub user_id: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

/// Reference back to the chunk an answer drew on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Citation {
    pub chunk_id: String,
    pub doc_id: String,
    pub source_url: String,
    #[serde(default)]
    pub page: Option<u32>,
    #[serde(default)]
    pub text_preview: Option<String>,
}

/// Response body of `POST /api/v1/synthesize`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynthesisResponse {
    pub answer: String,
    pub citations: Vec<Citation>,
    pub synthesis_latency_ms: f64,
    pub tokens_used: usize,
    pub cost_estimate: f64,
}

// ============ Frontend ============

/// Request body of the frontend `POST /api/v1/query`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrontendRequest {
    pub query: String,
    #[serde(default = "default_user_id")]
    pub user_id: String,
}

// ============ Health ============

/// Response body of `GET /api/v1/health` on every service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
}

impl HealthResponse {
    pub fn healthy(service: &str, version: &str) -> Self {
        Self {
            status: "healthy".to_string(),
            service: service.to_string(),
            version: version.to_string(),
        }
    }
}

// ============ Vector index records ============

/// Metadata stored next to each chunk vector.
///
/// Hosted indexes reject null metadata values, so `page` is `0` when the
/// page is unknown.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub doc_id: String,
    pub source_url: String,
    pub page: u32,
    pub chunk_index: u32,
    pub text: String,
    pub user_id: String,
    /// Unix timestamp (seconds) of the upsert.
    pub created_at: i64,
    pub file_name: String,
    /// SHA-256 of `text`.
    pub content_hash: String,
}

/// A vector plus metadata, ready for upsert.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorRecord {
    pub id: String,
    pub values: Vec<f32>,
    pub metadata: ChunkMetadata,
}

/// A raw nearest-neighbour match returned by a vector index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexMatch {
    pub id: String,
    pub score: f64,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_retrieval_request_defaults() {
        let req: RetrievalRequest = serde_json::from_value(json!({"query": "q"})).unwrap();
        assert_eq!(req.user_id, "default");
        assert_eq!(req.top_k, 5);
        assert!(req.filters.is_none());
    }

    #[test]
    fn test_synthesis_request_defaults() {
        let req: SynthesisRequest = serde_json::from_value(json!({"query": "q"})).unwrap();
        assert_eq!(req.max_tokens, 1000);
        assert!((req.temperature - 0.7).abs() < f32::EPSILON);
        assert!(req.retrieval_result.is_none());
    }

    #[test]
    fn test_frontend_request_requires_query() {
        let res: Result<FrontendRequest, _> = serde_json::from_value(json!({"user_id": "u"}));
        assert!(res.is_err());
    }

    #[test]
    fn test_ingest_status_wire_names() {
        let resp = IngestResponse::failed("d1".into(), "No chunks created");
        let v = serde_json::to_value(&resp).unwrap();
        assert_eq!(v["status"], "error");
        assert_eq!(v["chunks_created"], 0);
        assert_eq!(v["message"], "No chunks created");

        let ok = IngestResponse::complete("d1".into(), 3, 120, 0.0001);
        let v = serde_json::to_value(&ok).unwrap();
        assert_eq!(v["status"], "complete");
        assert_eq!(v["message"], "Ingested 3 chunks");
    }

    #[test]
    fn test_from_match_lifts_fields() {
        let m: IndexMatch = serde_json::from_value(json!({
            "id": "d1_chunk_2",
            "score": 0.91,
            "metadata": {
                "text": "hello",
                "doc_id": "d1",
                "source_url": "gs://b/d1/a.pdf",
                "page": 3.0,
                "chunk_index": 2.0,
                "user_id": "u1"
            }
        }))
        .unwrap();
        let chunk = RetrievedChunk::from_match(m);
        assert_eq!(chunk.id, "d1_chunk_2");
        assert_eq!(chunk.text, "hello");
        assert_eq!(chunk.page, Some(3));
        assert_eq!(chunk.chunk_index, 2);
        assert_eq!(chunk.score, Some(0.91));
        assert_eq!(chunk.metadata.len(), 1);
        assert_eq!(chunk.metadata["user_id"], "u1");
    }

    #[test]
    fn test_from_match_missing_metadata() {
        let m = IndexMatch {
            id: "x".into(),
            score: 0.5,
            metadata: Map::new(),
        };
        let chunk = RetrievedChunk::from_match(m);
        assert_eq!(chunk.text, "");
        assert_eq!(chunk.source_url, "");
        assert_eq!(chunk.page, None);
        assert_eq!(chunk.chunk_index, 0);
    }

    #[test]
    fn test_from_match_page_zero_is_unknown() {
        let m: IndexMatch = serde_json::from_value(json!({
            "id": "x", "score": 0.1, "metadata": {"page": 0}
        }))
        .unwrap();
        assert_eq!(RetrievedChunk::from_match(m).page, None);
    }
}
