use axum::{http::StatusCode, response::IntoResponse, Json};
use chrono::{SecondsFormat, Utc};
use serde_json::{json, Value};

/// GET /
pub async fn index() -> impl IntoResponse {
    Json(json!({
        "message": "Welcome to Flexylog API",
        "endpoints": {
            "health": "GET /health",
            "test": "POST /test",
            "logs": "GET /logs?limit=100&method=GET",
            "localLogs": "GET /logs/local?days=1",
            "filter": "GET /logs/filter?method=POST&statusCode=200",
            "stats": "GET /logger/stats",
            "clear": "DELETE /logger/clear?days=30",
            "manualLog": "ANY /logger/log",
            "metrics": "GET /metrics"
        }
    }))
}

/// GET /health
pub async fn health_check() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(json!({
            "status": "OK",
            "timestamp": Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        })),
    )
}

/// POST /test - echo the request body
pub async fn echo(body: Option<Json<Value>>) -> Json<Value> {
    let received = body.map(|Json(v)| v).unwrap_or_else(|| json!({}));

    Json(json!({
        "message": "Test endpoint hit successfully",
        "receivedData": received,
    }))
}
