/// End-to-end tests of the HTTP surface, with the request logger in front
use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    middleware,
    routing::get,
    Router,
};
use flexylog::{
    config::{InterceptorConfig, WriterConfig},
    error::handle_panic,
    handlers::AppState,
    request_log::{
        log_requests, FileSink, HttpMethod, Interceptor, LogDispatcher, LogEntry, LogFilter,
        LogStore, PendingLogEntry, SqliteLogStore, WriterTasks,
    },
    server::create_router,
};
use metrics_exporter_prometheus::PrometheusBuilder;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;
use tower_http::catch_panic::CatchPanicLayer;

struct TestApp {
    router: Router,
    store: Arc<SqliteLogStore>,
    file_sink: FileSink,
    tasks: WriterTasks,
    _dir: tempfile::TempDir,
}

impl TestApp {
    async fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(SqliteLogStore::connect("sqlite::memory:", 1).await.unwrap());
        let file_sink = FileSink::new(dir.path());
        let (dispatcher, tasks) = LogDispatcher::spawn(
            store.clone(),
            file_sink.clone(),
            &WriterConfig {
                batch_size: 10,
                flush_interval_ms: 20,
                max_buffer_size: 100,
            },
        );

        let interceptor_config = InterceptorConfig::default();
        let state = AppState {
            store: store.clone(),
            file_sink: file_sink.clone(),
            dispatcher: dispatcher.clone(),
            metrics: Arc::new(PrometheusBuilder::new().build_recorder().handle()),
            max_body_bytes: interceptor_config.max_body_bytes,
        };
        let router = create_router(state, Interceptor::new(dispatcher, &interceptor_config));

        Self {
            router,
            store,
            file_sink,
            tasks,
            _dir: dir,
        }
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    async fn get(&self, uri: &str) -> (StatusCode, Value) {
        self.send(Request::get(uri).body(Body::empty()).unwrap())
            .await
    }

    /// Close the writers and return everything that reached the store
    async fn drain(self) -> Vec<LogEntry> {
        let store = self.store.clone();
        drop(self.router);
        self.tasks.join().await;
        store.query(&LogFilter::default()).await.unwrap()
    }
}

fn json_request(method: Method, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::CONTENT_LENGTH, body.to_string().len())
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn test_index_and_health() {
    let app = TestApp::new().await;

    let (status, body) = app.get("/").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Welcome to Flexylog API");

    let (status, body) = app.get("/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "OK");
    assert!(body["timestamp"].as_str().unwrap().ends_with('Z'));
}

#[tokio::test]
async fn test_echo_is_logged_with_body() {
    let app = TestApp::new().await;

    let (status, body) = app
        .send(json_request(Method::POST, "/test?debug=1", json!({ "a": 1 })))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Test endpoint hit successfully");
    assert_eq!(body["receivedData"], json!({ "a": 1 }));

    let logs = app.drain().await;
    assert_eq!(logs.len(), 1);
    let entry = &logs[0];
    assert_eq!(entry.method, HttpMethod::Post);
    assert_eq!(entry.url, "/test?debug=1");
    assert_eq!(entry.status_code, Some(200));
    assert_eq!(entry.body, Some(json!({ "a": 1 })));
    assert_eq!(entry.query, Some(json!({ "debug": "1" })));
    assert_eq!(entry.source_ip, "Unknown");
}

#[tokio::test]
async fn test_unknown_route_is_404_and_logged() {
    let app = TestApp::new().await;

    let (status, body) = app.get("/nope").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, json!({ "error": "Route not found" }));

    let logs = app.drain().await;
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].status_code, Some(404));
    assert_eq!(logs[0].error.as_deref(), Some("Route not found"));
}

#[tokio::test]
async fn test_filter_with_unknown_method_is_server_error() {
    let app = TestApp::new().await;

    let (status, body) = app.get("/logs/filter?method=BOGUS").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body["error"].as_str().unwrap().contains("BOGUS"));
}

#[tokio::test]
async fn test_filter_and_list_read_the_store() {
    let app = TestApp::new().await;
    for (method, status) in [
        (HttpMethod::Get, 200),
        (HttpMethod::Get, 404),
        (HttpMethod::Delete, 404),
    ] {
        app.store
            .save(&PendingLogEntry::new(method, "/seed", "10.0.0.1").finish(status, 3))
            .await
            .unwrap();
    }

    let (status, body) = app.get("/logs?limit=2").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 2);
    // newest first
    assert_eq!(body["logs"][0]["method"], "DELETE");

    let (status, body) = app.get("/logs/filter?method=get&statusCode=404").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 1);
    assert_eq!(body["filters"], json!({ "method": "GET", "statusCode": 404 }));
}

#[tokio::test]
async fn test_stats_over_seeded_entries() {
    let app = TestApp::new().await;
    for (method, url, status, ms) in [
        (HttpMethod::Get, "/a", 200, 10),
        (HttpMethod::Get, "/a", 200, 20),
        (HttpMethod::Post, "/b", 201, 31),
    ] {
        app.store
            .save(&PendingLogEntry::new(method, url, "Unknown").finish(status, ms))
            .await
            .unwrap();
    }

    let (status, body) = app.get("/logger/stats").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["totalRequests"], 3);
    assert_eq!(body["methodCounts"], json!({ "GET": 2, "POST": 1 }));
    assert_eq!(body["statusCodeCounts"], json!({ "200": 2, "201": 1 }));
    assert_eq!(body["averageResponseTime"], 20);
    assert_eq!(body["topUrls"][0], json!({ "url": "/a", "count": 2 }));

    let (_, body) = app.get("/logger/stats?method=post").await;
    assert_eq!(body["totalRequests"], 1);
}

#[tokio::test]
async fn test_local_logs_read_day_files() {
    let app = TestApp::new().await;
    let entry = PendingLogEntry::new(HttpMethod::Put, "/files", "Unknown").finish(204, 2);
    app.file_sink.append(&entry).await.unwrap();

    let (status, body) = app.get("/logs/local").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 1);
    assert_eq!(body["logs"][0]["url"], "/files");
    assert!(body["logs"][0]["savedAt"].is_string());

    // unparseable days falls back to today only
    let (status, body) = app.get("/logs/local?days=abc").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["total"].as_u64().unwrap() >= 1);
}

#[tokio::test]
async fn test_manual_log_persists_entry() {
    let app = TestApp::new().await;

    let (status, body) = app
        .send(json_request(Method::POST, "/logger/log", json!({ "note": "hi" })))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["logged"], true);
    assert!(body["time"].is_string());
    let id = body["id"].as_str().unwrap().to_string();

    // the manual entry is written before the response is sent
    let stored = app.store.query(&LogFilter::default()).await.unwrap();
    let manual = stored.iter().find(|e| e.id.to_string() == id).unwrap();
    assert_eq!(manual.url, "/logger/log");
    assert_eq!(manual.body, Some(json!({ "note": "hi" })));
    assert_eq!(manual.status_code, Some(200));

    // the interceptor records the request as well
    let logs = app.drain().await;
    assert_eq!(logs.len(), 2);
}

#[tokio::test]
async fn test_clear_reports_days() {
    let app = TestApp::new().await;

    let (status, body) = app
        .send(
            Request::delete("/logger/clear?days=7")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Logs older than 7 days have been cleared");

    let (_, body) = app
        .send(Request::delete("/logger/clear").body(Body::empty()).unwrap())
        .await;
    assert_eq!(body["message"], "Logs older than 30 days have been cleared");

    let (status, body) = app
        .send(
            Request::delete("/logger/clear?days=4000000000")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body["message"],
        "Logs older than 4000000000 days have been cleared"
    );
}

#[tokio::test]
async fn test_metrics_endpoint_is_text() {
    let app = TestApp::new().await;

    let response = app
        .router
        .clone()
        .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers()[header::CONTENT_TYPE]
        .to_str()
        .unwrap()
        .starts_with("text/plain"));
}

async fn explode() -> &'static str {
    panic!("kaboom")
}

#[tokio::test]
async fn test_panicking_handler_is_logged_as_500() {
    let app = TestApp::new().await;
    let (dispatcher, tasks) = LogDispatcher::spawn(
        app.store.clone(),
        app.file_sink.clone(),
        &WriterConfig::default(),
    );

    let router = Router::new()
        .route(
            "/explode",
            get(explode),
        )
        .layer(CatchPanicLayer::custom(handle_panic))
        .layer(middleware::from_fn_with_state(
            Interceptor::new(dispatcher, &InterceptorConfig::default()),
            log_requests,
        ));

    let response = router
        .oneshot(Request::get("/explode").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body, json!({ "error": "kaboom" }));

    tasks.join().await;
    let logs = app.drain().await;
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].status_code, Some(500));
    assert_eq!(logs[0].error.as_deref(), Some("kaboom"));
}
