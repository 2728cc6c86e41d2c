//! Ingestion service: document upload endpoint.

use std::sync::Arc;

use axum::{
    extract::{
        multipart::MultipartRejection, rejection::QueryRejection, DefaultBodyLimit, Multipart,
        Query, State,
    },
    routing::{get, post},
    Json, Router,
};
use rag_relay_core::metrics::{MetricsCollector, Timer};
use rag_relay_core::models::{HealthResponse, IngestOptions, IngestResponse, IngestStatus};

use super::{health_response, metrics_response, new_query_id, with_common_layers, MetricsResponse};
use crate::error::AppError;
use crate::ingest::IngestionPipeline;

pub const SERVICE_NAME: &str = "ingestion";

#[derive(Clone)]
pub struct IngestionState {
    pub pipeline: Arc<IngestionPipeline>,
    pub metrics: Arc<MetricsCollector>,
    pub max_file_size_mb: usize,
}

impl IngestionState {
    pub fn new(pipeline: Arc<IngestionPipeline>, max_file_size_mb: usize) -> Self {
        Self {
            pipeline,
            metrics: Arc::new(MetricsCollector::new(SERVICE_NAME)),
            max_file_size_mb,
        }
    }
}

pub fn router(state: IngestionState) -> Router {
    let body_limit = state.max_file_size_mb.saturating_mul(1024 * 1024);
    let router = Router::new()
        .route(
            "/api/v1/ingest",
            post(handle_ingest).layer(DefaultBodyLimit::max(body_limit)),
        )
        .route("/api/v1/health", get(handle_health))
        .route("/api/v1/metrics", get(handle_metrics))
        .with_state(state);
    with_common_layers(router)
}

/// Handler for `POST /api/v1/ingest`.
///
/// Reads the `file` part of a multipart upload and runs it through the
/// pipeline. Pipeline failures come back as `200` with `status = "error"`;
/// only a malformed request is an HTTP error. Every request is recorded in
/// the service metrics, rejected ones included.
async fn handle_ingest(
    State(state): State<IngestionState>,
    options: Result<Query<IngestOptions>, QueryRejection>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<IngestResponse>, AppError> {
    let timer = Timer::start();
    let query_id = new_query_id();

    let (options, file_name, bytes) = match read_upload(options, multipart).await {
        Ok(upload) => upload,
        Err(e) => {
            tracing::warn!(error = %e.message, "ingest request rejected");
            state
                .metrics
                .record(&query_id, timer.elapsed_ms(), false, Some(e.message.clone()));
            return Err(e);
        }
    };

    tracing::info!(file = %file_name, user_id = %options.user_id, bytes = bytes.len(), "ingest request");
    let response = state.pipeline.ingest(&bytes, &file_name, &options).await;

    let success = response.status == IngestStatus::Complete;
    let error = if success { None } else { response.message.clone() };
    state
        .metrics
        .record(&query_id, timer.elapsed_ms(), success, error);

    Ok(Json(response))
}

async fn read_upload(
    options: Result<Query<IngestOptions>, QueryRejection>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<(IngestOptions, String, Vec<u8>), AppError> {
    let Query(options) = options?;
    let mut multipart = multipart?;

    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some("file") {
            continue;
        }
        let file_name = field.file_name().unwrap_or("document").to_string();
        let bytes = field.bytes().await?;
        return Ok((options, file_name, bytes.to_vec()));
    }

    Err(AppError::bad_request("multipart field `file` is required"))
}

async fn handle_health() -> Json<HealthResponse> {
    health_response(SERVICE_NAME)
}

async fn handle_metrics(State(state): State<IngestionState>) -> Json<MetricsResponse> {
    metrics_response(&state.metrics)
}
