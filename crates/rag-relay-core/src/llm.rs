//! Chat-completion provider trait.

use anyhow::Result;
use async_trait::async_trait;

/// Text produced by one chat completion.
#[derive(Debug, Clone, PartialEq)]
pub struct Generation {
    pub text: String,
    /// Output tokens as reported by the provider.
    pub completion_tokens: usize,
}

/// A chat model that answers a system + user prompt pair.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Model identifier used for cost estimation (e.g. `"gpt-4-turbo-preview"`).
    fn model_name(&self) -> &str;

    async fn generate(
        &self,
        system: &str,
        user: &str,
        max_tokens: u32,
        temperature: f32,
    ) -> Result<Generation>;
}
