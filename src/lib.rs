//! # RAG Relay
//!
//! A retrieval-augmented generation pipeline split into four HTTP services.
//! Documents are uploaded, chunked, embedded with OpenAI and stored in a
//! Pinecone index. Questions are answered from the closest chunks, with
//! citations, and streamed back to clients as server-sent events.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────┐   ┌───────────┐   ┌───────────┐   ┌───────────┐
//! │ ingestion │   │ retrieval │◀──│ synthesis │◀──│ frontend  │
//! │   :8000   │   │   :8001   │   │   :8002   │   │ :8003 SSE │
//! └─────┬─────┘   └─────┬─────┘   └─────┬─────┘   └───────────┘
//!       │ embed+upsert  │ embed+query   │ chat
//!       ▼               ▼               ▼
//!   OpenAI / Pinecone (or the in-memory index)
//! ```
//!
//! The pure pieces (chunking, ranking, context assembly, prompts, cost
//! tables, metrics, SSE events) live in the `rag-relay-core` crate. This
//! crate adds the provider clients, the pipelines and the axum services.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration with environment overrides |
//! | [`logging`] | `tracing` subscriber setup |
//! | [`error`] | Provider and HTTP error types |
//! | [`http`] | JSON requests with retry and backoff |
//! | [`extract`] | PDF, DOCX and plain-text extraction |
//! | [`embedding`] | OpenAI embeddings client |
//! | [`llm`] | OpenAI chat completions client |
//! | [`pinecone`] | Pinecone vector index client |
//! | [`ingest`] | Ingestion pipeline |
//! | [`retrieve`] | Retrieval pipeline and client |
//! | [`synthesize`] | Synthesis pipeline, service and client |
//! | [`server`] | The four axum services |

pub mod config;
pub mod embedding;
pub mod error;
pub mod extract;
pub mod http;
pub mod ingest;
pub mod llm;
pub mod logging;
pub mod pinecone;
pub mod retrieve;
pub mod server;
pub mod synthesize;
