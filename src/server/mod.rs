//! HTTP services.
//!
//! Each RAG stage is an independent axum router with its own state and
//! [`MetricsCollector`]:
//!
//! | Service | Default bind | Endpoints |
//! |---------|--------------|-----------|
//! | ingestion | `0.0.0.0:8000` | `POST /api/v1/ingest`, `GET /api/v1/health`, `GET /api/v1/metrics` |
//! | retrieval | `0.0.0.0:8001` | `POST /api/v1/retrieve`, `GET /api/v1/health`, `GET /api/v1/metrics` |
//! | synthesis | `0.0.0.0:8002` | `POST /api/v1/synthesize`, `GET /api/v1/health`, `GET /api/v1/metrics` |
//! | frontend | `0.0.0.0:8003` | `GET /`, `POST /api/v1/query` (SSE), `GET /api/v1/health` |
//!
//! Run separately, the synthesis service reaches retrieval over HTTP and
//! the frontend reaches synthesis over HTTP. [`ServeTarget::All`] runs all
//! four in one process and wires them together in memory, sharing one
//! embedder and one vector index.
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted.

pub mod frontend;
pub mod ingestion;
pub mod retrieval;
pub mod synthesis;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::{Json, Router};
use rag_relay_core::embedding::Embedder;
use rag_relay_core::index::VectorIndex;
use rag_relay_core::llm::ChatModel;
use rag_relay_core::metrics::{MetricsCollector, MetricsStats};
use rag_relay_core::models::HealthResponse;
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::embedding::OpenAiEmbedder;
use crate::ingest::IngestionPipeline;
use crate::llm::OpenAiChatModel;
use crate::pinecone::create_index;
use crate::retrieve::{RetrievalClient, RetrievalPipeline, Retriever};
use crate::synthesize::{SynthesisClient, SynthesisPipeline, SynthesisService, Synthesizer};

/// Which services `rag serve` starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ServeTarget {
    Ingestion,
    Retrieval,
    Synthesis,
    Frontend,
    All,
}

/// A router ready to bind, plus the collector its handlers record into.
pub struct ServiceApp {
    pub name: &'static str,
    pub bind: String,
    pub router: Router,
    pub metrics: Arc<MetricsCollector>,
}

/// Lazily-built providers, shared between services in one process.
struct Providers<'a> {
    config: &'a Config,
    embedder: Option<Arc<dyn Embedder>>,
    index: Option<Arc<dyn VectorIndex>>,
}

impl<'a> Providers<'a> {
    fn new(config: &'a Config) -> Self {
        Self {
            config,
            embedder: None,
            index: None,
        }
    }

    fn embedder(&mut self) -> Result<Arc<dyn Embedder>> {
        if let Some(embedder) = &self.embedder {
            return Ok(embedder.clone());
        }
        let embedder: Arc<dyn Embedder> = Arc::new(OpenAiEmbedder::new(
            &self.config.openai,
            self.config.ingestion.embedding_batch_size,
        )?);
        self.embedder = Some(embedder.clone());
        Ok(embedder)
    }

    fn index(&mut self) -> Result<Arc<dyn VectorIndex>> {
        if let Some(index) = &self.index {
            return Ok(index.clone());
        }
        let index = create_index(self.config)?;
        self.index = Some(index.clone());
        Ok(index)
    }

    fn chat_model(&self) -> Result<Arc<dyn ChatModel>> {
        Ok(Arc::new(OpenAiChatModel::new(&self.config.openai)?))
    }
}

/// Build the routers for `target` from configuration.
pub fn build_apps(config: Arc<Config>, target: ServeTarget) -> Result<Vec<ServiceApp>> {
    let mut providers = Providers::new(&config);
    let mut apps = Vec::new();

    let wants = |t: ServeTarget| target == t || target == ServeTarget::All;

    if wants(ServeTarget::Ingestion) {
        let pipeline = IngestionPipeline::new(
            config.clone(),
            providers.embedder()?,
            providers.index()?,
        );
        let state = ingestion::IngestionState::new(
            Arc::new(pipeline),
            config.ingestion.max_file_size_mb,
        );
        apps.push(ServiceApp {
            name: ingestion::SERVICE_NAME,
            bind: config.ingestion.bind.clone(),
            metrics: state.metrics.clone(),
            router: ingestion::router(state),
        });
    }

    let mut local_retriever: Option<Arc<dyn Retriever>> = None;
    if wants(ServeTarget::Retrieval) {
        let retriever: Arc<dyn Retriever> = Arc::new(RetrievalPipeline::new(
            providers.embedder()?,
            providers.index()?,
            config.retrieval.max_top_k,
        ));
        local_retriever = Some(retriever.clone());
        let state = retrieval::RetrievalState::new(retriever);
        apps.push(ServiceApp {
            name: retrieval::SERVICE_NAME,
            bind: config.retrieval.bind.clone(),
            metrics: state.metrics.clone(),
            router: retrieval::router(state),
        });
    }

    let mut local_synthesizer: Option<Arc<dyn Synthesizer>> = None;
    if wants(ServeTarget::Synthesis) {
        let retriever: Arc<dyn Retriever> = match local_retriever {
            Some(r) => r,
            None => Arc::new(RetrievalClient::new(
                &config.synthesis.retrieval_service_url,
                Duration::from_secs(config.synthesis.retrieval_timeout_secs),
            )?),
        };
        let pipeline =
            SynthesisPipeline::new(providers.chat_model()?, config.synthesis.context_budget_tokens);
        let synthesizer: Arc<dyn Synthesizer> = Arc::new(SynthesisService::new(
            pipeline,
            retriever,
            config.synthesis.retrieval_top_k,
        ));
        local_synthesizer = Some(synthesizer.clone());
        let state = synthesis::SynthesisState::new(synthesizer);
        apps.push(ServiceApp {
            name: synthesis::SERVICE_NAME,
            bind: config.synthesis.bind.clone(),
            metrics: state.metrics.clone(),
            router: synthesis::router(state),
        });
    }

    if wants(ServeTarget::Frontend) {
        let synthesizer: Arc<dyn Synthesizer> = match local_synthesizer {
            Some(s) => s,
            None => Arc::new(SynthesisClient::new(
                &config.frontend.synthesis_service_url,
                Duration::from_secs(config.frontend.synthesis_timeout_secs),
            )?),
        };
        let state = frontend::FrontendState::new(
            synthesizer,
            config.frontend.max_tokens,
            config.frontend.temperature,
        );
        apps.push(ServiceApp {
            name: frontend::SERVICE_NAME,
            bind: config.frontend.bind.clone(),
            metrics: state.metrics.clone(),
            router: frontend::router(state),
        });
    }

    Ok(apps)
}

/// Bind and serve every app until Ctrl-C, then log each metrics summary.
pub async fn run_apps(apps: Vec<ServiceApp>) -> Result<()> {
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let mut tasks = Vec::new();
    let mut collectors = Vec::new();

    for app in apps {
        let listener = tokio::net::TcpListener::bind(&app.bind)
            .await
            .with_context(|| format!("Failed to bind {} service to {}", app.name, app.bind))?;
        tracing::info!(service = app.name, bind = %app.bind, "service listening");

        let mut rx = shutdown_rx.clone();
        let name = app.name;
        collectors.push(app.metrics);
        tasks.push(tokio::spawn(async move {
            let result = axum::serve(listener, app.router)
                .with_graceful_shutdown(async move {
                    let _ = rx.wait_for(|stop| *stop).await;
                })
                .await;
            if let Err(e) = &result {
                tracing::error!(service = name, error = %e, "server error");
            }
            result
        }));
    }

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    tracing::info!("shutting down");
    let _ = shutdown_tx.send(true);

    for task in tasks {
        task.await??;
    }
    for metrics in collectors {
        metrics.log_summary();
        tracing::info!(service = metrics.app_name(), "service stopped");
    }
    Ok(())
}

/// Layers shared by every service router.
pub(crate) fn with_common_layers(router: Router) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);
    router.layer(cors).layer(TraceLayer::new_for_http())
}

pub(crate) fn health_response(service: &str) -> Json<HealthResponse> {
    Json(HealthResponse::healthy(service, env!("CARGO_PKG_VERSION")))
}

/// JSON response body for `GET /api/v1/metrics`.
#[derive(Serialize)]
pub struct MetricsResponse {
    pub service: String,
    /// `null` until the first request completes.
    pub stats: Option<MetricsStats>,
}

pub(crate) fn metrics_response(metrics: &MetricsCollector) -> Json<MetricsResponse> {
    Json(MetricsResponse {
        service: metrics.app_name().to_string(),
        stats: metrics.stats(),
    })
}

/// Correlation ID for one request's metrics record.
pub(crate) fn new_query_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
