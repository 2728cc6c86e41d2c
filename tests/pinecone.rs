//! PineconeIndex against a mock control and data plane.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use rag_relay::config::PineconeConfig;
use rag_relay::http::RetryPolicy;
use rag_relay::pinecone::PineconeIndex;
use rag_relay_core::index::{MetadataFilter, VectorIndex};
use rag_relay_core::models::{ChunkMetadata, RetrievedChunk, VectorRecord};
use serde_json::{json, Value};

#[derive(Clone, Default)]
struct MockPinecone {
    host: String,
    describes: Arc<AtomicUsize>,
    upserts: Arc<Mutex<Vec<Value>>>,
    queries: Arc<Mutex<Vec<Value>>>,
    query_failures: Arc<AtomicUsize>,
}

fn authorized(headers: &HeaderMap) -> bool {
    headers.get("Api-Key").and_then(|v| v.to_str().ok()) == Some("pc-test")
        && headers
            .get("X-Pinecone-API-Version")
            .and_then(|v| v.to_str().ok())
            == Some("2024-07")
}

async fn describe(
    State(mock): State<MockPinecone>,
    headers: HeaderMap,
) -> Result<Json<Value>, StatusCode> {
    if !authorized(&headers) {
        return Err(StatusCode::UNAUTHORIZED);
    }
    mock.describes.fetch_add(1, Ordering::SeqCst);
    Ok(Json(json!({"name": "rag-index", "dimension": 2, "host": mock.host})))
}

async fn upsert(
    State(mock): State<MockPinecone>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Result<Json<Value>, StatusCode> {
    if !authorized(&headers) {
        return Err(StatusCode::UNAUTHORIZED);
    }
    let count = body["vectors"].as_array().map(Vec::len).unwrap_or(0);
    mock.upserts.lock().unwrap().push(body);
    Ok(Json(json!({"upsertedCount": count})))
}

async fn query(
    State(mock): State<MockPinecone>,
    Json(body): Json<Value>,
) -> Result<Json<Value>, StatusCode> {
    // Fail the first query to exercise retry
    if mock.query_failures.fetch_add(1, Ordering::SeqCst) == 0 {
        return Err(StatusCode::SERVICE_UNAVAILABLE);
    }
    mock.queries.lock().unwrap().push(body);
    Ok(Json(json!({
        "matches": [{
            "id": "d1_chunk_4",
            "score": 0.83,
            "metadata": {
                "text": "Pinecone stores vectors.",
                "doc_id": "d1",
                "source_url": "",
                "page": 0.0,
                "chunk_index": 4.0,
                "user_id": "alice",
                "file_name": "notes.txt"
            }
        }],
        "namespace": "docs"
    })))
}

async fn start_mock() -> MockPinecone {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    let mock = MockPinecone {
        host: base,
        ..Default::default()
    };
    let router = Router::new()
        .route("/indexes/rag-index", get(describe))
        .route("/vectors/upsert", post(upsert))
        .route("/query", post(query))
        .with_state(mock.clone());
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    mock
}

fn index_for(mock: &MockPinecone, index_host: Option<String>) -> PineconeIndex {
    let config = PineconeConfig {
        api_key: Some("pc-test".into()),
        control_plane_url: mock.host.clone(),
        namespace: "docs".into(),
        index_host,
        ..PineconeConfig::default()
    };
    PineconeIndex::new(&config)
        .unwrap()
        .with_retry(RetryPolicy::new(2).with_base_delay(Duration::from_millis(1)))
}

fn record(i: usize) -> VectorRecord {
    VectorRecord {
        id: format!("d1_chunk_{}", i),
        values: vec![0.1, 0.2],
        metadata: ChunkMetadata {
            doc_id: "d1".into(),
            source_url: String::new(),
            page: 0,
            chunk_index: i as u32,
            text: format!("chunk {}", i),
            user_id: "alice".into(),
            created_at: 1_700_000_000,
            file_name: "notes.txt".into(),
            content_hash: String::new(),
        },
    }
}

#[tokio::test]
async fn test_upsert_batches_and_caches_host() {
    let mock = start_mock().await;
    let index = index_for(&mock, None);

    let records: Vec<VectorRecord> = (0..250).map(record).collect();
    let written = index.upsert(&records).await.unwrap();
    assert_eq!(written, 250);

    let batches = mock.upserts.lock().unwrap().clone();
    let sizes: Vec<usize> = batches
        .iter()
        .map(|b| b["vectors"].as_array().unwrap().len())
        .collect();
    assert_eq!(sizes, vec![100, 100, 50]);
    assert_eq!(batches[0]["namespace"], "docs");
    assert_eq!(batches[0]["vectors"][0]["metadata"]["user_id"], "alice");

    index.upsert(&records[..1]).await.unwrap();
    assert_eq!(mock.describes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_query_sends_filter_and_retries() {
    let mock = start_mock().await;
    let index = index_for(&mock, Some(mock.host.clone()));

    let filter = MetadataFilter::for_user("alice").with_extra(Some(
        json!({"file_name": "notes.txt"}).as_object().unwrap().clone(),
    ));
    let matches = index.query(&[0.1, 0.2], 3, &filter).await.unwrap();

    assert_eq!(matches.len(), 1);
    let chunk = RetrievedChunk::from_match(matches[0].clone());
    assert_eq!(chunk.chunk_index, 4);
    assert_eq!(chunk.page, None);

    let queries = mock.queries.lock().unwrap();
    assert_eq!(queries.len(), 1);
    assert_eq!(queries[0]["topK"], 3);
    assert_eq!(
        queries[0]["filter"],
        json!({"$and": [
            {"user_id": {"$eq": "alice"}},
            {"file_name": {"$eq": "notes.txt"}}
        ]})
    );
    // index_host was given, so the control plane is never asked
    assert_eq!(mock.describes.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_wrong_key_is_not_retried() {
    let mock = start_mock().await;
    let config = PineconeConfig {
        api_key: Some("wrong".into()),
        control_plane_url: mock.host.clone(),
        ..PineconeConfig::default()
    };
    let index = PineconeIndex::new(&config).unwrap();

    let err = index.upsert(&[record(0)]).await.unwrap_err();
    assert!(err.to_string().contains("401"));
    assert_eq!(mock.describes.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_max_retries_from_config() {
    let mock = start_mock().await;
    let config = PineconeConfig {
        api_key: Some("pc-test".into()),
        index_host: Some(mock.host.clone()),
        max_retries: 0,
        ..PineconeConfig::default()
    };
    let index = PineconeIndex::new(&config).unwrap();

    // The first query fails with 503 and is not retried
    let err = index
        .query(&[0.1, 0.2], 3, &MetadataFilter::for_user("alice"))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("503"), "{}", err);
    assert_eq!(mock.query_failures.load(Ordering::SeqCst), 1);
    assert!(mock.queries.lock().unwrap().is_empty());
}
