//! JSON-over-HTTP calls with retry and exponential backoff.
//!
//! Shared by the OpenAI, Pinecone and inter-service clients.
//!
//! # Retry Strategy
//!
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors → retry
//! - Backoff: `base`, `2·base`, `4·base`, … (exponent capped at 5)

use std::time::Duration;

use serde_json::Value;

use crate::error::ProviderError;

/// Retry policy for one client.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            base_delay: Duration::from_secs(1),
        }
    }

    /// Single attempt, no retries.
    pub fn none() -> Self {
        Self::new(0)
    }

    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay * (1u32 << (attempt - 1).min(5))
    }
}

/// Send the request built by `build` until it succeeds or the policy gives
/// up, returning the decoded JSON body.
///
/// `build` is called once per attempt because a `RequestBuilder` is
/// consumed by `send`.
pub async fn send_json<F>(
    service: &'static str,
    policy: RetryPolicy,
    build: F,
) -> Result<Value, ProviderError>
where
    F: Fn() -> reqwest::RequestBuilder,
{
    let mut last_err = None;

    for attempt in 0..=policy.max_retries {
        if attempt > 0 {
            tokio::time::sleep(policy.delay_for(attempt)).await;
            tracing::debug!(service, attempt, "retrying request");
        }

        let err = match build().send().await {
            Ok(response) => {
                let status = response.status();
                if status.is_success() {
                    return response
                        .json::<Value>()
                        .await
                        .map_err(|e| ProviderError::InvalidResponse {
                            service,
                            message: e.to_string(),
                        });
                }
                let body = response.text().await.unwrap_or_default();
                ProviderError::Api {
                    service,
                    status: status.as_u16(),
                    body,
                }
            }
            Err(source) => ProviderError::Network { service, source },
        };

        if !err.is_retryable() {
            return Err(err);
        }
        tracing::warn!(service, attempt, error = %err, "request failed");
        last_err = Some(err);
    }

    Err(last_err.unwrap_or(ProviderError::InvalidResponse {
        service,
        message: "request failed after retries".to_string(),
    }))
}
