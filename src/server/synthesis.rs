//! Synthesis service.

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, State},
    routing::{get, post},
    Json, Router,
};
use rag_relay_core::metrics::{MetricsCollector, Timer};
use rag_relay_core::models::{HealthResponse, SynthesisRequest, SynthesisResponse};

use super::{health_response, metrics_response, new_query_id, with_common_layers, MetricsResponse};
use crate::error::AppError;
use crate::synthesize::Synthesizer;

pub const SERVICE_NAME: &str = "synthesis";

#[derive(Clone)]
pub struct SynthesisState {
    pub synthesizer: Arc<dyn Synthesizer>,
    pub metrics: Arc<MetricsCollector>,
}

impl SynthesisState {
    pub fn new(synthesizer: Arc<dyn Synthesizer>) -> Self {
        Self {
            synthesizer,
            metrics: Arc::new(MetricsCollector::new(SERVICE_NAME)),
        }
    }
}

pub fn router(state: SynthesisState) -> Router {
    let router = Router::new()
        .route("/api/v1/synthesize", post(handle_synthesize))
        .route("/api/v1/health", get(handle_health))
        .route("/api/v1/metrics", get(handle_metrics))
        .with_state(state);
    with_common_layers(router)
}

async fn handle_synthesize(
    State(state): State<SynthesisState>,
    payload: Result<Json<SynthesisRequest>, JsonRejection>,
) -> Result<Json<SynthesisResponse>, AppError> {
    let timer = Timer::start();
    let query_id = new_query_id();
    let Json(request) = payload?;

    tracing::info!(query = %request.query, user_id = %request.user_id, "synthesis request");
    match state.synthesizer.synthesize(request).await {
        Ok(response) => {
            state.metrics.record(&query_id, timer.elapsed_ms(), true, None);
            Ok(Json(response))
        }
        Err(e) => {
            tracing::error!(error = %e, "synthesis failed");
            state
                .metrics
                .record(&query_id, timer.elapsed_ms(), false, Some(e.to_string()));
            Err(AppError::internal(e.to_string()))
        }
    }
}

async fn handle_health() -> Json<HealthResponse> {
    health_response(SERVICE_NAME)
}

async fn handle_metrics(State(state): State<SynthesisState>) -> Json<MetricsResponse> {
    metrics_response(&state.metrics)
}
