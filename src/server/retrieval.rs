//! Retrieval service.

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, State},
    routing::{get, post},
    Json, Router,
};
use rag_relay_core::metrics::{MetricsCollector, Timer};
use rag_relay_core::models::{HealthResponse, RetrievalRequest, RetrievalResult};

use super::{health_response, metrics_response, new_query_id, with_common_layers, MetricsResponse};
use crate::error::AppError;
use crate::retrieve::{QueryError, Retriever};

pub const SERVICE_NAME: &str = "retrieval";

#[derive(Clone)]
pub struct RetrievalState {
    pub retriever: Arc<dyn Retriever>,
    pub metrics: Arc<MetricsCollector>,
}

impl RetrievalState {
    pub fn new(retriever: Arc<dyn Retriever>) -> Self {
        Self {
            retriever,
            metrics: Arc::new(MetricsCollector::new(SERVICE_NAME)),
        }
    }
}

pub fn router(state: RetrievalState) -> Router {
    let router = Router::new()
        .route("/api/v1/retrieve", post(handle_retrieve))
        .route("/api/v1/health", get(handle_health))
        .route("/api/v1/metrics", get(handle_metrics))
        .with_state(state);
    with_common_layers(router)
}

/// Handler for `POST /api/v1/retrieve`.
///
/// Returns `400` for an empty query and `500` for any other failure.
async fn handle_retrieve(
    State(state): State<RetrievalState>,
    payload: Result<Json<RetrievalRequest>, JsonRejection>,
) -> Result<Json<RetrievalResult>, AppError> {
    let timer = Timer::start();
    let query_id = new_query_id();
    let Json(request) = payload?;

    match state.retriever.retrieve(request).await {
        Ok(result) => {
            state.metrics.record(&query_id, timer.elapsed_ms(), true, None);
            Ok(Json(result))
        }
        Err(e) => {
            tracing::error!(error = %e, "retrieval failed");
            state
                .metrics
                .record(&query_id, timer.elapsed_ms(), false, Some(e.to_string()));
            if e.downcast_ref::<QueryError>().is_some() {
                Err(AppError::bad_request(e.to_string()))
            } else {
                Err(AppError::internal(e.to_string()))
            }
        }
    }
}

async fn handle_health() -> Json<HealthResponse> {
    health_response(SERVICE_NAME)
}

async fn handle_metrics(State(state): State<RetrievalState>) -> Json<MetricsResponse> {
    metrics_response(&state.metrics)
}
