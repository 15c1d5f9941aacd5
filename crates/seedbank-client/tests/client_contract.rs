use axum::{
    extract::{Path, RawQuery, State},
    http::StatusCode,
    routing::{get, patch, post},
    Json, Router,
};
use seedbank_client::{ClientError, Operation, SeedSource, StoreClient};
use seedbank_core::{MemoryType, Metadata, StoreOutcome};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};

#[derive(Clone, Default)]
struct Recorder {
    calls: Arc<Mutex<Vec<(String, Value)>>>,
}

impl Recorder {
    fn push(&self, route: impl Into<String>, body: Value) {
        self.calls.lock().unwrap().push((route.into(), body));
    }

    fn calls(&self) -> Vec<(String, Value)> {
        self.calls.lock().unwrap().clone()
    }
}

fn store_router(recorder: Recorder) -> Router {
    Router::new()
        .route(
            "/search",
            get(|State(rec): State<Recorder>, RawQuery(query): RawQuery| async move {
                rec.push(format!("GET /search?{}", query.unwrap_or_default()), Value::Null);
                Json(json!([
                    {"id": 1, "content": "Der Hund", "metadata": {"source": "telegram"}, "created_at": "2026-01-01T10:00:00Z", "score": 0.91},
                    {"id": 2, "content": "die Katze", "metadata": null, "created_at": "2026-01-02T10:00:00Z", "score": 0.42}
                ]))
            }),
        )
        .route(
            "/seeds/query",
            post(|State(rec): State<Recorder>, Json(body): Json<Value>| async move {
                rec.push("POST /seeds/query", body);
                Json(json!({"results": [{"seedId": "9", "content": "hit", "similarity": 0.7}]}))
            }),
        )
        .route(
            "/stats",
            get(|| async { Json(json!({"seedsCount": 120, "agentContextsCount": 8})) }),
        )
        .route("/health", get(|| async { "ok" }))
        .route(
            "/seeds",
            post(|State(rec): State<Recorder>, Json(body): Json<Value>| async move {
                let skipped = body["content"] == json!("duplicate");
                rec.push("POST /seeds", body);
                if skipped {
                    Json(json!({"id": 7, "skipped": 1}))
                } else {
                    Json(json!({"id": 8}))
                }
            }),
        )
        .route(
            "/seeds/:id",
            get(|Path(id): Path<i64>| async move {
                if id == 404 {
                    return Err(StatusCode::NOT_FOUND);
                }
                Ok(Json(json!({"id": id, "content": "one", "metadata": {}, "created_at": "", "score": 0.0})))
            })
            .put(
                |State(rec): State<Recorder>, Path(id): Path<i64>, Json(body): Json<Value>| async move {
                    rec.push(format!("PUT /seeds/{id}"), body);
                    StatusCode::NO_CONTENT
                },
            ),
        )
        .route(
            "/seeds/:id/metadata",
            patch(
                |State(rec): State<Recorder>, Path(id): Path<i64>, Json(body): Json<Value>| async move {
                    rec.push(format!("PATCH /seeds/{id}/metadata"), body);
                    StatusCode::NO_CONTENT
                },
            ),
        )
        .route(
            "/seeds/:id/tags",
            post(
                |State(rec): State<Recorder>, Path(id): Path<i64>, Json(body): Json<Value>| async move {
                    rec.push(format!("POST /seeds/{id}/tags"), body);
                    StatusCode::NO_CONTENT
                },
            ),
        )
        .route(
            "/agent-contexts",
            get(|State(rec): State<Recorder>, RawQuery(query): RawQuery| async move {
                rec.push(
                    format!("GET /agent-contexts?{}", query.unwrap_or_default()),
                    Value::Null,
                );
                Json(json!([
                    {"id": "c1", "agentId": "agent-a", "memoryType": "episodic", "payload": {"text": "hi"}, "createdAt": "2026-01-01T00:00:00Z"}
                ]))
            }),
        )
        .with_state(recorder)
}

fn failing_router() -> Router {
    Router::new()
        .route("/stats", get(|| async { StatusCode::SERVICE_UNAVAILABLE }))
        .route("/health", get(|| async { StatusCode::INTERNAL_SERVER_ERROR }))
        .route("/search", get(|| async { "not json" }))
}

async fn serve(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}/")
}

async fn unreachable_base() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{addr}")
}

#[tokio::test]
async fn search_omits_non_positive_threshold() {
    let recorder = Recorder::default();
    let client = StoreClient::new(&serve(store_router(recorder.clone())).await);

    let seeds = client.search("der", 100, 0.0).await.unwrap();
    assert_eq!(seeds.len(), 2);
    assert_eq!(seeds[0].meta_str("source"), "telegram");
    assert!(seeds[1].metadata.is_empty());

    client.search("der", 5, -1.0).await.unwrap();
    client.search("der", 5, 0.25).await.unwrap();

    let routes: Vec<String> = recorder.calls().into_iter().map(|(route, _)| route).collect();
    assert_eq!(
        routes,
        vec![
            "GET /search?q=der&limit=100".to_string(),
            "GET /search?q=der&limit=5".to_string(),
            "GET /search?q=der&limit=5&threshold=0.25".to_string(),
        ]
    );
}

#[tokio::test]
async fn query_compat_always_sends_all_fields() {
    let recorder = Recorder::default();
    let client = StoreClient::new(&serve(store_router(recorder.clone())).await);

    let results = client.query_compat("hund", 30, 0.0).await.unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].seed_id, "9");

    let (_, body) = recorder.calls().remove(0);
    assert_eq!(body, json!({"query": "hund", "limit": 30, "threshold": 0.0}));
}

#[tokio::test]
async fn status_errors_name_operation_and_code() {
    let client = StoreClient::new(&serve(failing_router()).await);

    let err = client.fetch_stats().await.unwrap_err();
    assert_eq!(err.operation(), Some(Operation::Stats));
    assert_eq!(err.status(), Some(seedbank_client::StatusCode::SERVICE_UNAVAILABLE));
    assert_eq!(err.to_string(), "stats failed: 503 Service Unavailable");

    let err = client.search("x", 1, 0.0).await.unwrap_err();
    assert!(matches!(err, ClientError::Decode { op: Operation::Search, .. }));
}

#[tokio::test]
async fn health_collapses_failures_to_false() {
    let healthy = StoreClient::new(&serve(store_router(Recorder::default())).await);
    assert!(healthy.fetch_health().await);

    let erroring = StoreClient::new(&serve(failing_router()).await);
    assert!(!erroring.fetch_health().await);

    let unreachable = StoreClient::new(&unreachable_base().await);
    assert!(!unreachable.fetch_health().await);
    let err = unreachable.fetch_stats().await.unwrap_err();
    assert!(matches!(err, ClientError::Transport { op: Operation::Stats, .. }));
}

#[tokio::test]
async fn create_record_reports_dedup_skip() {
    let recorder = Recorder::default();
    let client = StoreClient::new(&serve(store_router(recorder.clone())).await);

    let skipped = client.create_record("duplicate", None).await.unwrap();
    assert_eq!(skipped.outcome(), StoreOutcome::Skipped(7));

    let mut metadata = Metadata::new();
    metadata.insert("source".to_string(), json!("cli"));
    let created = client.create_record("fresh", Some(&metadata)).await.unwrap();
    assert_eq!(created.outcome(), StoreOutcome::Created(8));

    let bodies: Vec<Value> = recorder.calls().into_iter().map(|(_, body)| body).collect();
    assert_eq!(bodies[0], json!({"content": "duplicate", "metadata": {}}));
    assert_eq!(bodies[1], json!({"content": "fresh", "metadata": {"source": "cli"}}));
}

#[tokio::test]
async fn replace_merge_and_tags_hit_distinct_endpoints() {
    let recorder = Recorder::default();
    let client = StoreClient::new(&serve(store_router(recorder.clone())).await);

    let mut metadata = Metadata::new();
    metadata.insert("source".to_string(), json!("telegram"));
    client.replace_record(3, "new text", &metadata).await.unwrap();

    let mut patch = Metadata::new();
    patch.insert("tag".to_string(), json!("Title"));
    client.merge_metadata(3, &patch).await.unwrap();

    client
        .set_tags(3, &["a".to_string(), "b".to_string()])
        .await
        .unwrap();

    assert_eq!(
        recorder.calls(),
        vec![
            (
                "PUT /seeds/3".to_string(),
                json!({"content": "new text", "metadata": {"source": "telegram"}})
            ),
            ("PATCH /seeds/3/metadata".to_string(), json!({"tag": "Title"})),
            ("POST /seeds/3/tags".to_string(), json!(["a", "b"])),
        ]
    );
}

#[tokio::test]
async fn fetch_record_surfaces_not_found() {
    let client = StoreClient::new(&serve(store_router(Recorder::default())).await);
    assert_eq!(client.fetch_record(5).await.unwrap().id, 5);

    let err = client.fetch_record(404).await.unwrap_err();
    assert_eq!(err.operation(), Some(Operation::GetSeed));
    assert_eq!(err.status(), Some(seedbank_client::StatusCode::NOT_FOUND));
}

#[tokio::test]
async fn contexts_only_send_given_filters() {
    let recorder = Recorder::default();
    let client = StoreClient::new(&serve(store_router(recorder.clone())).await);

    let all = SeedSource::fetch_contexts(&client, None, None).await.unwrap();
    assert_eq!(all[0].memory_type, MemoryType::Episodic);
    client
        .fetch_contexts(Some(""), Some(MemoryType::Working))
        .await
        .unwrap();
    client
        .fetch_contexts(Some("agent-a"), None)
        .await
        .unwrap();

    let routes: Vec<String> = recorder.calls().into_iter().map(|(route, _)| route).collect();
    assert_eq!(
        routes,
        vec![
            "GET /agent-contexts?".to_string(),
            "GET /agent-contexts?memoryType=working".to_string(),
            "GET /agent-contexts?agentId=agent-a".to_string(),
        ]
    );
}
