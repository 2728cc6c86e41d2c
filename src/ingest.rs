//! Ingestion pipeline: extract → clean → chunk → embed → upsert.
//!
//! [`IngestionPipeline::ingest`] never returns an error. Every failure after
//! the document ID is assigned is reported as an [`IngestResponse`] with
//! `status = "error"` and the failure message, so callers always learn the
//! `doc_id` the attempt was made under.

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use rag_relay_core::cost::estimate_embedding_cost;
use rag_relay_core::embedding::Embedder;
use rag_relay_core::index::VectorIndex;
use rag_relay_core::models::{ChunkMetadata, IngestOptions, IngestResponse, VectorRecord};
use rag_relay_core::text::{chunk_text, clean_text, estimate_tokens, TextChunk};

use crate::config::Config;
use crate::extract::extract_text;

pub struct IngestionPipeline {
    config: Arc<Config>,
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
}

impl IngestionPipeline {
    pub fn new(
        config: Arc<Config>,
        embedder: Arc<dyn Embedder>,
        index: Arc<dyn VectorIndex>,
    ) -> Self {
        Self {
            config,
            embedder,
            index,
        }
    }

    /// Chunk size and overlap for a request: explicit options win, the
    /// `[ingestion]` section fills the rest.
    pub fn chunking_for(&self, options: &IngestOptions) -> (usize, usize) {
        (
            options.chunk_size.unwrap_or(self.config.ingestion.chunk_size),
            options.overlap.unwrap_or(self.config.ingestion.chunk_overlap),
        )
    }

    pub async fn ingest(
        &self,
        bytes: &[u8],
        file_name: &str,
        options: &IngestOptions,
    ) -> IngestResponse {
        let doc_id = uuid::Uuid::new_v4().to_string();
        match self.run(&doc_id, bytes, file_name, options).await {
            Ok(response) => response,
            Err(e) => {
                tracing::error!(doc_id = %doc_id, file = %file_name, error = %e, "ingestion failed");
                IngestResponse::failed(doc_id, e.to_string())
            }
        }
    }

    async fn run(
        &self,
        doc_id: &str,
        bytes: &[u8],
        file_name: &str,
        options: &IngestOptions,
    ) -> Result<IngestResponse> {
        let (chunk_size, overlap) = self.chunking_for(options);
        let file_name = base_file_name(file_name);

        tracing::info!(doc_id, file = %file_name, bytes = bytes.len(), "extracting text");
        let chunks = {
            let bytes = bytes.to_vec();
            let file_name = file_name.clone();
            run_blocking(move || prepare_chunks(&bytes, &file_name, chunk_size, overlap)).await?
        };

        if chunks.is_empty() {
            tracing::warn!(doc_id, file = %file_name, "no chunks created");
            return Ok(IngestResponse::failed(doc_id.to_string(), "No chunks created"));
        }

        tracing::info!(doc_id, chunks = chunks.len(), "generating embeddings");
        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let vectors = self.embedder.embed(&texts).await?;
        if vectors.len() != chunks.len() {
            anyhow::bail!(
                "embedder returned {} vectors for {} chunks",
                vectors.len(),
                chunks.len()
            );
        }
        let (tokens, cost) = estimate_chunk_cost(&chunks, self.embedder.model_name());

        tracing::info!(doc_id, "storing vectors");
        let records = build_records(
            doc_id,
            &file_name,
            &self.config.source_url(doc_id, &file_name),
            &options.user_id,
            chunks,
            vectors,
        );
        self.index.upsert(&records).await?;

        tracing::info!(doc_id, chunks = records.len(), tokens, cost, "ingestion complete");
        Ok(IngestResponse::complete(
            doc_id.to_string(),
            records.len(),
            tokens,
            cost,
        ))
    }
}

/// Extract, clean and chunk a document without touching any provider.
pub fn prepare_chunks(
    bytes: &[u8],
    file_name: &str,
    chunk_size: usize,
    overlap: usize,
) -> Result<Vec<TextChunk>> {
    let text = extract_text(bytes, file_name)?;
    let text = clean_text(&text);
    chunk_text(&text, chunk_size, overlap)
}

/// Run CPU-bound document work off the async workers. A panic inside `work`
/// comes back as an error.
async fn run_blocking<T, F>(work: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| anyhow::anyhow!("document processing failed: {}", e))?
}

/// Estimated embedding tokens and USD cost for a set of chunks.
pub fn estimate_chunk_cost(chunks: &[TextChunk], model: &str) -> (usize, f64) {
    let tokens: usize = chunks.iter().map(|c| estimate_tokens(&c.text)).sum();
    (tokens, estimate_embedding_cost(tokens, model))
}

fn build_records(
    doc_id: &str,
    file_name: &str,
    source_url: &str,
    user_id: &str,
    chunks: Vec<TextChunk>,
    vectors: Vec<Vec<f32>>,
) -> Vec<VectorRecord> {
    let created_at = chrono::Utc::now().timestamp();
    chunks
        .into_iter()
        .zip(vectors)
        .enumerate()
        .map(|(i, (chunk, values))| VectorRecord {
            id: format!("{}_chunk_{}", doc_id, i),
            values,
            metadata: ChunkMetadata {
                doc_id: doc_id.to_string(),
                source_url: source_url.to_string(),
                page: chunk.page.unwrap_or(0),
                chunk_index: i as u32,
                text: chunk.text,
                user_id: user_id.to_string(),
                created_at,
                file_name: file_name.to_string(),
                content_hash: chunk.hash,
            },
        })
        .collect()
}

/// Strip any directory components a client sent with the upload name.
fn base_file_name(file_name: &str) -> String {
    Path::new(file_name)
        .file_name()
        .and_then(|n| n.to_str())
        .filter(|n| !n.is_empty())
        .unwrap_or("document")
        .to_string()
}
