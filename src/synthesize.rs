//! Answer synthesis: context assembly, prompting and cost accounting.
//!
//! - [`SynthesisPipeline`] turns a query plus retrieved chunks into a
//!   grounded answer with citations.
//! - [`SynthesisService`] is what the synthesis endpoint runs: it fetches
//!   chunks through a [`Retriever`] when the request did not bring any, then
//!   calls the pipeline.
//! - [`SynthesisClient`] calls a remote synthesis service over HTTP.
//!
//! The frontend talks to either of the last two through [`Synthesizer`].

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use rag_relay_core::context::{assemble_context, build_citations};
use rag_relay_core::cost::estimate_llm_cost;
use rag_relay_core::llm::ChatModel;
use rag_relay_core::metrics::Timer;
use rag_relay_core::models::{
    RetrievalRequest, RetrievalResult, SynthesisRequest, SynthesisResponse,
};
use rag_relay_core::prompt::PromptBuilder;
use rag_relay_core::text::estimate_tokens;

use crate::error::ProviderError;
use crate::http::{send_json, RetryPolicy};
use crate::retrieve::Retriever;

/// Answer returned when retrieval found nothing.
pub const NO_CONTEXT_ANSWER: &str = "I don't have relevant information to answer your question.";

pub struct SynthesisPipeline {
    llm: Arc<dyn ChatModel>,
    context_budget_tokens: usize,
}

impl SynthesisPipeline {
    pub fn new(llm: Arc<dyn ChatModel>, context_budget_tokens: usize) -> Self {
        Self {
            llm,
            context_budget_tokens,
        }
    }

    pub async fn synthesize(
        &self,
        query: &str,
        retrieval: &RetrievalResult,
        max_tokens: u32,
        temperature: f32,
    ) -> Result<SynthesisResponse> {
        let timer = Timer::start();

        if retrieval.chunks.is_empty() {
            tracing::warn!(query, "no chunks retrieved");
            return Ok(SynthesisResponse {
                answer: NO_CONTEXT_ANSWER.to_string(),
                citations: Vec::new(),
                synthesis_latency_ms: timer.elapsed_ms(),
                tokens_used: 0,
                cost_estimate: 0.0,
            });
        }

        let context = assemble_context(&retrieval.chunks, self.context_budget_tokens);
        let system_prompt = PromptBuilder::system_prompt();
        let user_prompt = PromptBuilder::user_prompt(query, &context);

        tracing::info!(chunks = retrieval.chunks.len(), model = %self.llm.model_name(), "generating response");
        let generation = self
            .llm
            .generate(&system_prompt, &user_prompt, max_tokens, temperature)
            .await?;

        let citations = build_citations(&retrieval.chunks);
        let tokens_in = estimate_tokens(&system_prompt) + estimate_tokens(&user_prompt);
        let tokens_out = generation.completion_tokens;
        let cost = estimate_llm_cost(tokens_in, tokens_out, self.llm.model_name());

        Ok(SynthesisResponse {
            answer: generation.text,
            citations,
            synthesis_latency_ms: timer.elapsed_ms(),
            tokens_used: tokens_in + tokens_out,
            cost_estimate: cost.total,
        })
    }
}

/// Anything that can answer a [`SynthesisRequest`] end to end.
#[async_trait]
pub trait Synthesizer: Send + Sync {
    async fn synthesize(&self, request: SynthesisRequest) -> Result<SynthesisResponse>;
}

pub struct SynthesisService {
    pipeline: SynthesisPipeline,
    retriever: Arc<dyn Retriever>,
    retrieval_top_k: usize,
}

impl SynthesisService {
    pub fn new(
        pipeline: SynthesisPipeline,
        retriever: Arc<dyn Retriever>,
        retrieval_top_k: usize,
    ) -> Self {
        Self {
            pipeline,
            retriever,
            retrieval_top_k,
        }
    }
}

#[async_trait]
impl Synthesizer for SynthesisService {
    async fn synthesize(&self, request: SynthesisRequest) -> Result<SynthesisResponse> {
        let retrieval = match request.retrieval_result {
            Some(result) => result,
            None => {
                self.retriever
                    .retrieve(RetrievalRequest::new(
                        request.query.clone(),
                        request.user_id.clone(),
                        self.retrieval_top_k,
                    ))
                    .await?
            }
        };

        self.pipeline
            .synthesize(
                &request.query,
                &retrieval,
                request.max_tokens,
                request.temperature,
            )
            .await
    }
}

/// HTTP client for `POST {base_url}/api/v1/synthesize`.
pub struct SynthesisClient {
    client: reqwest::Client,
    base_url: String,
}

impl SynthesisClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl Synthesizer for SynthesisClient {
    async fn synthesize(&self, request: SynthesisRequest) -> Result<SynthesisResponse> {
        let url = format!("{}/api/v1/synthesize", self.base_url);
        tracing::info!(url = %url, "calling synthesis service");
        let value = send_json("synthesis service", RetryPolicy::none(), || {
            self.client.post(&url).json(&request)
        })
        .await?;
        let response = serde_json::from_value(value).map_err(|e| ProviderError::InvalidResponse {
            service: "synthesis service",
            message: e.to_string(),
        })?;
        Ok(response)
    }
}
