//! Configuration parsing and validation.
//!
//! RAG Relay is configured via a TOML file (default: `config/rag.toml`).
//! Every section and field has a default, so an empty file is a valid
//! development configuration. Secrets and inter-service URLs may also be
//! supplied through the environment, which takes precedence over the file.
//!
//! # Example
//!
//! ```toml
//! [openai]
//! embedding_model = "text-embedding-3-small"
//! chat_model = "gpt-4-turbo-preview"
//!
//! [pinecone]
//! index_name = "rag-index"
//!
//! [storage]
//! vector_store = "pinecone"
//! gcs_bucket_name = "my-docs"
//!
//! [ingestion]
//! chunk_size = 512
//! chunk_overlap = 100
//!
//! [synthesis]
//! retrieval_service_url = "http://localhost:8001"
//! ```
//!
//! # Environment overrides
//!
//! | Variable | Field |
//! |----------|-------|
//! | `OPENAI_API_KEY` | `openai.api_key` |
//! | `PINECONE_API_KEY` | `pinecone.api_key` |
//! | `RETRIEVAL_SERVICE_URL` | `synthesis.retrieval_service_url` |
//! | `SYNTHESIS_SERVICE_URL` | `frontend.synthesis_service_url` |
//! | `GCS_BUCKET_NAME` | `storage.gcs_bucket_name` |
//! | `RAG_LOG_LEVEL` | `app.log_level` |

use anyhow::{bail, Context, Result};
use rag_relay_core::cost::{DEFAULT_CHAT_MODEL, DEFAULT_EMBEDDING_MODEL};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub app: AppConfig,
    #[serde(default)]
    pub openai: OpenAiConfig,
    #[serde(default)]
    pub pinecone: PineconeConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub ingestion: IngestionConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub synthesis: SynthesisConfig,
    #[serde(default)]
    pub frontend: FrontendConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    #[serde(default = "default_environment")]
    pub environment: String,
    /// `tracing` filter directive used when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// `text` or `json`.
    #[serde(default = "default_log_format")]
    pub log_format: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            environment: default_environment(),
            log_level: default_log_level(),
            log_format: default_log_format(),
        }
    }
}

fn default_environment() -> String {
    "development".to_string()
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_format() -> String {
    "text".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct OpenAiConfig {
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_openai_base_url")]
    pub base_url: String,
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,
    #[serde(default = "default_chat_model")]
    pub chat_model: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_openai_base_url(),
            embedding_model: default_embedding_model(),
            chat_model: default_chat_model(),
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
        }
    }
}

fn default_openai_base_url() -> String {
    "https://api.openai.com".to_string()
}
fn default_embedding_model() -> String {
    DEFAULT_EMBEDDING_MODEL.to_string()
}
fn default_chat_model() -> String {
    DEFAULT_CHAT_MODEL.to_string()
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_max_retries() -> u32 {
    3
}

#[derive(Debug, Deserialize, Clone)]
pub struct PineconeConfig {
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_index_name")]
    pub index_name: String,
    /// Data-plane host. Resolved from the control plane when unset.
    #[serde(default)]
    pub index_host: Option<String>,
    #[serde(default = "default_control_plane_url")]
    pub control_plane_url: String,
    #[serde(default)]
    pub namespace: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl Default for PineconeConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            index_name: default_index_name(),
            index_host: None,
            control_plane_url: default_control_plane_url(),
            namespace: String::new(),
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
        }
    }
}

fn default_index_name() -> String {
    "rag-index".to_string()
}
fn default_control_plane_url() -> String {
    "https://api.pinecone.io".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    /// `pinecone` or `memory`.
    #[serde(default = "default_vector_store")]
    pub vector_store: String,
    /// Bucket recorded in chunk `source_url`s.
    #[serde(default)]
    pub gcs_bucket_name: Option<String>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            vector_store: default_vector_store(),
            gcs_bucket_name: None,
        }
    }
}

fn default_vector_store() -> String {
    "pinecone".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct IngestionConfig {
    #[serde(default = "default_ingestion_bind")]
    pub bind: String,
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
    #[serde(default = "default_embedding_batch_size")]
    pub embedding_batch_size: usize,
    #[serde(default = "default_max_file_size_mb")]
    pub max_file_size_mb: usize,
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            bind: default_ingestion_bind(),
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
            embedding_batch_size: default_embedding_batch_size(),
            max_file_size_mb: default_max_file_size_mb(),
        }
    }
}

fn default_ingestion_bind() -> String {
    "0.0.0.0:8000".to_string()
}
fn default_chunk_size() -> usize {
    512
}
fn default_chunk_overlap() -> usize {
    100
}
fn default_embedding_batch_size() -> usize {
    20
}
fn default_max_file_size_mb() -> usize {
    100
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_retrieval_bind")]
    pub bind: String,
    #[serde(default = "default_max_top_k")]
    pub max_top_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            bind: default_retrieval_bind(),
            max_top_k: default_max_top_k(),
        }
    }
}

fn default_retrieval_bind() -> String {
    "0.0.0.0:8001".to_string()
}
fn default_max_top_k() -> usize {
    50
}

#[derive(Debug, Deserialize, Clone)]
pub struct SynthesisConfig {
    #[serde(default = "default_synthesis_bind")]
    pub bind: String,
    #[serde(default = "default_retrieval_service_url")]
    pub retrieval_service_url: String,
    #[serde(default = "default_retrieval_top_k")]
    pub retrieval_top_k: usize,
    #[serde(default = "default_retrieval_timeout_secs")]
    pub retrieval_timeout_secs: u64,
    #[serde(default = "default_context_budget_tokens")]
    pub context_budget_tokens: usize,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            bind: default_synthesis_bind(),
            retrieval_service_url: default_retrieval_service_url(),
            retrieval_top_k: default_retrieval_top_k(),
            retrieval_timeout_secs: default_retrieval_timeout_secs(),
            context_budget_tokens: default_context_budget_tokens(),
        }
    }
}

fn default_synthesis_bind() -> String {
    "0.0.0.0:8002".to_string()
}
fn default_retrieval_service_url() -> String {
    "http://localhost:8001".to_string()
}
fn default_retrieval_top_k() -> usize {
    5
}
fn default_retrieval_timeout_secs() -> u64 {
    30
}
fn default_context_budget_tokens() -> usize {
    rag_relay_core::context::DEFAULT_CONTEXT_BUDGET_TOKENS
}

#[derive(Debug, Deserialize, Clone)]
pub struct FrontendConfig {
    #[serde(default = "default_frontend_bind")]
    pub bind: String,
    #[serde(default = "default_synthesis_service_url")]
    pub synthesis_service_url: String,
    #[serde(default = "default_synthesis_timeout_secs")]
    pub synthesis_timeout_secs: u64,
    #[serde(default = "default_max_response_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

impl Default for FrontendConfig {
    fn default() -> Self {
        Self {
            bind: default_frontend_bind(),
            synthesis_service_url: default_synthesis_service_url(),
            synthesis_timeout_secs: default_synthesis_timeout_secs(),
            max_tokens: default_max_response_tokens(),
            temperature: default_temperature(),
        }
    }
}

fn default_frontend_bind() -> String {
    "0.0.0.0:8003".to_string()
}
fn default_synthesis_service_url() -> String {
    "http://localhost:8002".to_string()
}
fn default_synthesis_timeout_secs() -> u64 {
    60
}
fn default_max_response_tokens() -> u32 {
    1000
}
fn default_temperature() -> f32 {
    0.7
}

impl Config {
    /// All defaults, with environment overrides applied. Used when no
    /// config file exists.
    pub fn minimal() -> Self {
        let mut config = Config::default();
        config.apply_env(|key| std::env::var(key).ok());
        config
    }

    /// Overlay environment values onto the parsed file.
    ///
    /// `lookup` abstracts `std::env::var` so tests need not mutate the
    /// process environment. Empty values are ignored.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("OPENAI_API_KEY") {
            self.openai.api_key = Some(v);
        }
        if let Some(v) = get("PINECONE_API_KEY") {
            self.pinecone.api_key = Some(v);
        }
        if let Some(v) = get("RETRIEVAL_SERVICE_URL") {
            self.synthesis.retrieval_service_url = v;
        }
        if let Some(v) = get("SYNTHESIS_SERVICE_URL") {
            self.frontend.synthesis_service_url = v;
        }
        if let Some(v) = get("GCS_BUCKET_NAME") {
            self.storage.gcs_bucket_name = Some(v);
        }
        if let Some(v) = get("RAG_LOG_LEVEL") {
            self.app.log_level = v;
        }
    }

    /// Reject settings the pipelines cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.ingestion.chunk_size == 0 {
            bail!("ingestion.chunk_size must be > 0");
        }
        if self.ingestion.chunk_overlap >= self.ingestion.chunk_size {
            bail!(
                "ingestion.chunk_overlap ({}) must be smaller than ingestion.chunk_size ({})",
                self.ingestion.chunk_overlap,
                self.ingestion.chunk_size
            );
        }
        if self.ingestion.embedding_batch_size == 0 {
            bail!("ingestion.embedding_batch_size must be > 0");
        }
        if self.ingestion.max_file_size_mb == 0 {
            bail!("ingestion.max_file_size_mb must be > 0");
        }
        if self.retrieval.max_top_k == 0 {
            bail!("retrieval.max_top_k must be >= 1");
        }
        if self.synthesis.retrieval_top_k == 0 {
            bail!("synthesis.retrieval_top_k must be >= 1");
        }
        if !(0.0..=2.0).contains(&self.frontend.temperature) {
            bail!("frontend.temperature must be in [0.0, 2.0]");
        }

        match self.storage.vector_store.as_str() {
            "pinecone" | "memory" => {}
            other => bail!(
                "Unknown vector store: '{}'. Must be pinecone or memory.",
                other
            ),
        }

        match self.app.log_format.as_str() {
            "text" | "json" => {}
            other => bail!("Unknown log format: '{}'. Must be text or json.", other),
        }

        Ok(())
    }

    /// `gs://` URL recorded as the source of an ingested document, or an
    /// empty string when no bucket is configured.
    pub fn source_url(&self, doc_id: &str, file_name: &str) -> String {
        match self.storage.gcs_bucket_name.as_deref() {
            Some(bucket) if !bucket.is_empty() => {
                format!("gs://{}/{}/{}", bucket, doc_id, file_name)
            }
            _ => String::new(),
        }
    }
}

/// Read, parse, overlay the environment and validate a config file.
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let mut config = parse_config(&content)?;
    config.apply_env(|key| std::env::var(key).ok());
    config.validate()?;
    Ok(config)
}

/// Parse TOML without touching the environment.
pub fn parse_config(content: &str) -> Result<Config> {
    toml::from_str(content).with_context(|| "Failed to parse config file")
}
