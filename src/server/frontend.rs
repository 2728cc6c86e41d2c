//! Frontend service: streams a synthesized answer as server-sent events.
//!
//! `POST /api/v1/query` always answers `200 text/event-stream` once the
//! request body parses. Synthesis failures arrive in-band as a single
//! `error` event.

use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, State},
    response::sse::{Event, KeepAlive, Sse},
    routing::{get, post},
    Json, Router,
};
use futures::Stream;
use rag_relay_core::metrics::{MetricsCollector, Timer};
use rag_relay_core::models::{FrontendRequest, HealthResponse, SynthesisRequest};
use rag_relay_core::stream::{events_for_response, StreamEvent};
use serde_json::{json, Value};

use super::{health_response, new_query_id, with_common_layers};
use crate::error::AppError;
use crate::synthesize::Synthesizer;

pub const SERVICE_NAME: &str = "frontend";

#[derive(Clone)]
pub struct FrontendState {
    pub synthesizer: Arc<dyn Synthesizer>,
    pub metrics: Arc<MetricsCollector>,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl FrontendState {
    pub fn new(synthesizer: Arc<dyn Synthesizer>, max_tokens: u32, temperature: f32) -> Self {
        Self {
            synthesizer,
            metrics: Arc::new(MetricsCollector::new(SERVICE_NAME)),
            max_tokens,
            temperature,
        }
    }
}

pub fn router(state: FrontendState) -> Router {
    let router = Router::new()
        .route("/", get(handle_root))
        .route("/api/v1/query", post(handle_query))
        .route("/api/v1/health", get(handle_health))
        .with_state(state);
    with_common_layers(router)
}

async fn handle_root() -> Json<Value> {
    Json(json!({ "message": "RAG Frontend Service" }))
}

async fn handle_query(
    State(state): State<FrontendState>,
    payload: Result<Json<FrontendRequest>, JsonRejection>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    let Json(request) = payload?;
    tracing::info!(query = %request.query, user_id = %request.user_id, "frontend query");

    let stream = async_stream::stream! {
        let timer = Timer::start();
        let query_id = new_query_id();
        let synthesis = SynthesisRequest {
            query: request.query,
            retrieval_result: None,
            user_id: request.user_id,
            max_tokens: state.max_tokens,
            temperature: state.temperature,
        };

        let events = match state.synthesizer.synthesize(synthesis).await {
            Ok(response) => {
                state.metrics.record(&query_id, timer.elapsed_ms(), true, None);
                events_for_response(&response, response.synthesis_latency_ms)
            }
            Err(e) => {
                tracing::error!(error = %e, "query failed");
                state
                    .metrics
                    .record(&query_id, timer.elapsed_ms(), false, Some(e.to_string()));
                vec![StreamEvent::Error { error: e.to_string() }]
            }
        };

        for event in events {
            yield Ok::<Event, Infallible>(to_sse_event(&event));
        }
    };

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

fn to_sse_event(event: &StreamEvent) -> Event {
    Event::default()
        .event(event.event_name())
        .data(event.data().to_string())
}

async fn handle_health() -> Json<HealthResponse> {
    health_response(SERVICE_NAME)
}
