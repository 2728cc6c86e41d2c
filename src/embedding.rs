//! OpenAI embeddings client.
//!
//! [`OpenAiEmbedder`] calls `POST {base_url}/v1/embeddings` in batches with
//! retry and backoff (see [`crate::http`]).

use anyhow::{bail, Result};
use async_trait::async_trait;
use rag_relay_core::embedding::Embedder;
use serde_json::{json, Value};
use std::time::Duration;

use crate::config::OpenAiConfig;
use crate::error::ProviderError;
use crate::http::{send_json, RetryPolicy};

const SERVICE: &str = "OpenAI";

pub struct OpenAiEmbedder {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    batch_size: usize,
    retry: RetryPolicy,
}

impl OpenAiEmbedder {
    /// # Errors
    ///
    /// Fails when no API key is configured or `batch_size` is 0.
    pub fn new(config: &OpenAiConfig, batch_size: usize) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .ok_or(ProviderError::MissingApiKey(SERVICE))?;
        if batch_size == 0 {
            bail!("embedding batch size must be > 0");
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
            model: config.embedding_model.clone(),
            batch_size,
            retry: RetryPolicy::new(config.max_retries),
        })
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    async fn embed_batch(&self, batch: &[String]) -> Result<Vec<Vec<f32>>> {
        let url = format!("{}/v1/embeddings", self.base_url);
        let body = json!({
            "model": self.model,
            "input": batch,
        });

        let response = send_json(SERVICE, self.retry, || {
            self.client
                .post(&url)
                .bearer_auth(&self.api_key)
                .json(&body)
        })
        .await?;

        let vectors = parse_embeddings_response(&response)?;
        if vectors.len() != batch.len() {
            bail!(
                "OpenAI returned {} embeddings for {} inputs",
                vectors.len(),
                batch.len()
            );
        }
        Ok(vectors)
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut vectors = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size) {
            vectors.extend(self.embed_batch(batch).await?);
        }
        tracing::info!(count = vectors.len(), model = %self.model, "generated embeddings");
        Ok(vectors)
    }
}

/// Extract `data[].embedding`, ordered by each item's `index`.
fn parse_embeddings_response(json: &Value) -> Result<Vec<Vec<f32>>> {
    let data = json
        .get("data")
        .and_then(Value::as_array)
        .ok_or_else(|| anyhow::anyhow!("Invalid OpenAI response: missing data array"))?;

    let mut indexed = Vec::with_capacity(data.len());
    for (position, item) in data.iter().enumerate() {
        let embedding = item
            .get("embedding")
            .and_then(Value::as_array)
            .ok_or_else(|| anyhow::anyhow!("Invalid OpenAI response: missing embedding"))?;
        let index = item
            .get("index")
            .and_then(Value::as_u64)
            .map(|i| i as usize)
            .unwrap_or(position);
        let vector: Vec<f32> = embedding
            .iter()
            .map(|v| v.as_f64().unwrap_or(0.0) as f32)
            .collect();
        indexed.push((index, vector));
    }

    indexed.sort_by_key(|(index, _)| *index);
    Ok(indexed.into_iter().map(|(_, v)| v).collect())
}
