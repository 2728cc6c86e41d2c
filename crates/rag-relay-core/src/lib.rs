//! # RAG Relay Core
//!
//! Shared, transport-free logic for RAG Relay: request/response models,
//! text windowing, ranking, context assembly, prompt text, cost estimation,
//! request metrics, and the provider traits the services are wired through.
//!
//! This crate performs no HTTP or filesystem I/O. Concrete OpenAI and
//! Pinecone clients live in the `rag-relay` service crate; the in-memory
//! [`index::memory::InMemoryIndex`] lives here so that tests and single
//! process deployments can run without a hosted index.

pub mod context;
pub mod cost;
pub mod embedding;
pub mod index;
pub mod llm;
pub mod metrics;
pub mod models;
pub mod prompt;
pub mod ranking;
pub mod stream;
pub mod text;
