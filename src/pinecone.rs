//! Pinecone-backed [`VectorIndex`] and vector store selection.
//!
//! Talks to the Pinecone REST API directly:
//!
//! | Call | Endpoint |
//! |------|----------|
//! | describe index | `GET {control_plane_url}/indexes/{index_name}` |
//! | upsert | `POST https://{host}/vectors/upsert` |
//! | query | `POST https://{host}/query` |
//!
//! The data-plane host comes from `pinecone.index_host` or, when unset, is
//! resolved from the control plane on first use and cached.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;
use rag_relay_core::index::memory::InMemoryIndex;
use rag_relay_core::index::{MetadataFilter, VectorIndex};
use rag_relay_core::models::{IndexMatch, VectorRecord};
use serde_json::{json, Value};
use tokio::sync::OnceCell;

use crate::config::{Config, PineconeConfig};
use crate::error::ProviderError;
use crate::http::{send_json, RetryPolicy};

const SERVICE: &str = "Pinecone";
const API_VERSION: &str = "2024-07";

/// Vectors per upsert request.
pub const UPSERT_BATCH_SIZE: usize = 100;

pub struct PineconeIndex {
    client: reqwest::Client,
    api_key: String,
    index_name: String,
    control_plane_url: String,
    namespace: String,
    host: OnceCell<String>,
    retry: RetryPolicy,
}

impl PineconeIndex {
    pub fn new(config: &PineconeConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .ok_or(ProviderError::MissingApiKey(SERVICE))?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        let host = match config.index_host.as_deref() {
            Some(h) if !h.is_empty() => OnceCell::new_with(Some(normalize_host(h))),
            _ => OnceCell::new(),
        };

        Ok(Self {
            client,
            api_key,
            index_name: config.index_name.clone(),
            control_plane_url: config.control_plane_url.trim_end_matches('/').to_string(),
            namespace: config.namespace.clone(),
            host,
            retry: RetryPolicy::new(config.max_retries),
        })
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    async fn host(&self) -> Result<&str> {
        let host = self
            .host
            .get_or_try_init(|| async {
                let url = format!("{}/indexes/{}", self.control_plane_url, self.index_name);
                let described = send_json(SERVICE, self.retry, || {
                    self.request(self.client.get(&url))
                })
                .await?;
                let host = described
                    .get("host")
                    .and_then(Value::as_str)
                    .ok_or_else(|| ProviderError::InvalidResponse {
                        service: SERVICE,
                        message: format!("index '{}' has no host", self.index_name),
                    })?;
                tracing::info!(index = %self.index_name, host, "resolved index host");
                Ok::<String, ProviderError>(normalize_host(host))
            })
            .await?;
        Ok(host.as_str())
    }

    fn request(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        builder
            .header("Api-Key", &self.api_key)
            .header("X-Pinecone-API-Version", API_VERSION)
    }
}

/// Prefix bare hostnames with `https://`; leave explicit schemes alone.
fn normalize_host(host: &str) -> String {
    let host = host.trim_end_matches('/');
    if host.starts_with("http://") || host.starts_with("https://") {
        host.to_string()
    } else {
        format!("https://{}", host)
    }
}

fn upsert_body(records: &[VectorRecord], namespace: &str) -> Value {
    let mut body = json!({ "vectors": records });
    if !namespace.is_empty() {
        body["namespace"] = json!(namespace);
    }
    body
}

fn query_body(vector: &[f32], top_k: usize, filter: &MetadataFilter, namespace: &str) -> Value {
    let mut body = json!({
        "vector": vector,
        "topK": top_k,
        "includeMetadata": true,
        "includeValues": false,
        "filter": filter.to_pinecone_filter(),
    });
    if !namespace.is_empty() {
        body["namespace"] = json!(namespace);
    }
    body
}

fn parse_matches(response: &Value) -> Result<Vec<IndexMatch>> {
    match response.get("matches") {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(matches) => Ok(serde_json::from_value(matches.clone())?),
    }
}

#[async_trait]
impl VectorIndex for PineconeIndex {
    async fn upsert(&self, records: &[VectorRecord]) -> Result<usize> {
        let url = format!("{}/vectors/upsert", self.host().await?);
        let mut written = 0;

        for batch in records.chunks(UPSERT_BATCH_SIZE) {
            let body = upsert_body(batch, &self.namespace);
            let response = send_json(SERVICE, self.retry, || {
                self.request(self.client.post(&url)).json(&body)
            })
            .await?;
            written += response
                .get("upsertedCount")
                .and_then(Value::as_u64)
                .map(|n| n as usize)
                .unwrap_or(batch.len());
        }

        tracing::info!(count = written, index = %self.index_name, "upserted vectors");
        Ok(written)
    }

    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        filter: &MetadataFilter,
    ) -> Result<Vec<IndexMatch>> {
        let url = format!("{}/query", self.host().await?);
        let body = query_body(vector, top_k, filter, &self.namespace);
        let response = send_json(SERVICE, self.retry, || {
            self.request(self.client.post(&url)).json(&body)
        })
        .await?;

        let matches = parse_matches(&response)?;
        tracing::info!(count = matches.len(), "retrieved matches");
        Ok(matches)
    }
}

/// Build the vector index named by `storage.vector_store`.
pub fn create_index(config: &Config) -> Result<Arc<dyn VectorIndex>> {
    match config.storage.vector_store.as_str() {
        "pinecone" => Ok(Arc::new(PineconeIndex::new(&config.pinecone)?)),
        "memory" => Ok(Arc::new(InMemoryIndex::new())),
        other => bail!("Unknown vector store: {}", other),
    }
}
