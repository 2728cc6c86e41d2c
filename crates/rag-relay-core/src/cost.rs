//! Linear USD cost estimates for embedding and chat-completion calls.
//!
//! Prices are per token. Unknown models fall back to the default model's
//! price so that an estimate is always produced.

use serde::Serialize;

const PER_MILLION: f64 = 1_000_000.0;

/// Default embedding model, also the price fallback.
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";
/// Default chat model, also the price fallback.
pub const DEFAULT_CHAT_MODEL: &str = "gpt-4-turbo-preview";

fn embedding_price(model: &str) -> f64 {
    match model {
        "text-embedding-3-large" => 0.13 / PER_MILLION,
        _ => 0.02 / PER_MILLION,
    }
}

/// `(input, output)` per-token prices.
fn chat_prices(model: &str) -> (f64, f64) {
    match model {
        "gpt-3.5-turbo" => (0.5 / PER_MILLION, 1.5 / PER_MILLION),
        // gpt-4, gpt-4-turbo-preview and anything unrecognised
        _ => (10.0 / PER_MILLION, 30.0 / PER_MILLION),
    }
}

/// Estimated cost of embedding `tokens` tokens with `model`.
pub fn estimate_embedding_cost(tokens: usize, model: &str) -> f64 {
    tokens as f64 * embedding_price(model)
}

/// Cost breakdown of one chat completion.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LlmCost {
    pub input: f64,
    pub output: f64,
    pub total: f64,
}

/// Estimated cost of a chat completion with the given token counts.
pub fn estimate_llm_cost(input_tokens: usize, output_tokens: usize, model: &str) -> LlmCost {
    let (input_price, output_price) = chat_prices(model);
    let input = input_tokens as f64 * input_price;
    let output = output_tokens as f64 * output_price;
    LlmCost {
        input,
        output,
        total: input + output,
    }
}
