//! OpenAI chat-completion client.

use anyhow::Result;
use async_trait::async_trait;
use rag_relay_core::llm::{ChatModel, Generation};
use serde_json::{json, Value};
use std::time::Duration;

use crate::config::OpenAiConfig;
use crate::error::ProviderError;
use crate::http::{send_json, RetryPolicy};

const SERVICE: &str = "OpenAI";

/// Calls `POST {base_url}/v1/chat/completions` with a system and a user
/// message.
pub struct OpenAiChatModel {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    retry: RetryPolicy,
}

impl OpenAiChatModel {
    pub fn new(config: &OpenAiConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .ok_or(ProviderError::MissingApiKey(SERVICE))?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
            model: config.chat_model.clone(),
            retry: RetryPolicy::new(config.max_retries),
        })
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

#[async_trait]
impl ChatModel for OpenAiChatModel {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(
        &self,
        system: &str,
        user: &str,
        max_tokens: u32,
        temperature: f32,
    ) -> Result<Generation> {
        let url = format!("{}/v1/chat/completions", self.base_url);
        let body = json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": system},
                {"role": "user", "content": user},
            ],
            "max_tokens": max_tokens,
            "temperature": temperature,
        });

        let response = send_json(SERVICE, self.retry, || {
            self.client
                .post(&url)
                .bearer_auth(&self.api_key)
                .json(&body)
        })
        .await?;

        Ok(parse_chat_response(&response)?)
    }
}

fn parse_chat_response(json: &Value) -> Result<Generation, ProviderError> {
    let text = json
        .pointer("/choices/0/message/content")
        .and_then(Value::as_str)
        .ok_or_else(|| ProviderError::InvalidResponse {
            service: SERVICE,
            message: "missing choices[0].message.content".to_string(),
        })?;
    let completion_tokens = json
        .pointer("/usage/completion_tokens")
        .and_then(Value::as_u64)
        .unwrap_or(0) as usize;

    Ok(Generation {
        text: text.to_string(),
        completion_tokens,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_chat_response() {
        let response = json!({
            "choices": [{"message": {"role": "assistant", "content": "Paris."}}],
            "usage": {"prompt_tokens": 40, "completion_tokens": 2}
        });
        let generation = parse_chat_response(&response).unwrap();
        assert_eq!(generation.text, "Paris.");
        assert_eq!(generation.completion_tokens, 2);
    }

    #[test]
    fn test_parse_missing_content() {
        let err = parse_chat_response(&json!({"choices": []})).unwrap_err();
        assert!(err.to_string().contains("choices[0]"));
    }
}
