//! Request logging middleware
//!
//! [`log_requests`] wraps every route. Request-time fields are captured into a
//! [`PendingLogEntry`] before the inner service runs; the status code and
//! elapsed time are filled in through [`ResponseCapture`] once the inner
//! service has produced the response, and the finished entry is handed to
//! the [`LogDispatcher`] without waiting on either sink.

use super::client_ip::resolve_source_ip;
use super::entry::{HttpMethod, LogEntry, PendingLogEntry};
use super::writer::LogDispatcher;
use crate::config::InterceptorConfig;
use axum::{
    body::Body,
    extract::{ConnectInfo, FromRequestParts, OriginalUri, RawPathParams, Request, State},
    http::{header, request::Parts, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Map, Value};
use std::borrow::Cow;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

/// Request extension set once a request has been captured
///
/// Stops a second logging layer from recording the same request.
#[derive(Debug, Clone, Copy)]
pub struct RequestLogged;

/// Response extension carrying a handler error message into the log entry
#[derive(Debug, Clone)]
pub struct ResponseError(pub String);

/// State of the logging middleware
#[derive(Clone)]
pub struct Interceptor {
    dispatcher: LogDispatcher,
    max_body_bytes: usize,
    skip_paths: Arc<[String]>,
}

impl Interceptor {
    pub fn new(dispatcher: LogDispatcher, config: &InterceptorConfig) -> Self {
        Self {
            dispatcher,
            max_body_bytes: config.max_body_bytes,
            skip_paths: config.skip_paths.clone().into(),
        }
    }

    fn is_skipped(&self, path: &str) -> bool {
        self.skip_paths
            .iter()
            .any(|prefix| !prefix.is_empty() && path.starts_with(prefix.as_str()))
    }
}

/// Single-shot response hook
///
/// The first [`complete`](Self::complete) yields the finished entry; any
/// later call yields `None`.
#[derive(Debug)]
pub struct ResponseCapture {
    pending: Option<PendingLogEntry>,
    started: Instant,
}

impl ResponseCapture {
    pub fn new(pending: PendingLogEntry, started: Instant) -> Self {
        Self {
            pending: Some(pending),
            started,
        }
    }

    pub fn complete(&mut self, status: StatusCode, error: Option<&str>) -> Option<LogEntry> {
        let mut pending = self.pending.take()?;
        if let Some(error) = error {
            pending = pending.with_error(error);
        }
        Some(pending.finish(status.as_u16(), elapsed_millis(self.started)))
    }
}

pub async fn log_requests(
    State(interceptor): State<Interceptor>,
    mut request: Request,
    next: Next,
) -> Response {
    let started = Instant::now();

    if request.extensions().get::<RequestLogged>().is_some()
        || interceptor.is_skipped(request.uri().path())
    {
        return next.run(request).await;
    }

    let method = match HttpMethod::try_from(request.method()) {
        Ok(method) => method,
        Err(e) => {
            tracing::debug!(error = %e, uri = %request.uri(), "Not logging request");
            return next.run(request).await;
        }
    };

    request.extensions_mut().insert(RequestLogged);

    let (pending, request) = capture_request(method, request, interceptor.max_body_bytes).await;

    tracing::info!(
        id = %pending.id(),
        "REQUEST: {} {} from {}",
        pending.method(),
        pending.url(),
        pending.source_ip()
    );

    let mut capture = ResponseCapture::new(pending, started);

    let response = match request {
        Ok(request) => next.run(request).await,
        Err(e) => {
            tracing::warn!(error = %e, "Failed to read request body");
            let message = format!("Failed to read request body: {}", e);
            let mut response =
                (StatusCode::BAD_REQUEST, Json(json!({ "error": message }))).into_response();
            response.extensions_mut().insert(ResponseError(message));
            response
        }
    };

    let error = response
        .extensions()
        .get::<ResponseError>()
        .map(|e| e.0.as_str());

    if let Some(entry) = capture.complete(response.status(), error) {
        tracing::info!(
            id = %entry.id,
            response_time_ms = entry.response_time.unwrap_or_default(),
            "RESPONSE: {} for {} {}",
            response.status().as_u16(),
            entry.method,
            entry.url
        );
        crate::metrics::record_request_logged(
            entry.method.as_str(),
            response.status().as_u16(),
            started.elapsed(),
        );
        interceptor.dispatcher.dispatch(entry);
    }

    response
}

/// Capture the request-time fields of `request`
///
/// Returns the pending entry and the request to forward, rebuilt around the
/// buffered body when the body was captured. A body that fails to read is
/// returned as the error; the pending entry is still usable.
pub async fn capture_request(
    method: HttpMethod,
    request: Request,
    max_body_bytes: usize,
) -> (PendingLogEntry, Result<Request, axum::Error>) {
    let (mut parts, body) = request.into_parts();

    let url = request_url(&parts);
    let peer = parts
        .extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let user_agent = parts
        .headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let query = parts.uri.query().map(parse_urlencoded).unwrap_or(Value::Null);
    let params = route_params(&mut parts).await;

    let mut pending = PendingLogEntry::new(method, url, resolve_source_ip(&parts.headers, peer))
        .with_user_agent(user_agent)
        .with_query(query)
        .with_params(params);

    let Some(kind) = capturable_body(&parts, max_body_bytes) else {
        return (pending, Ok(Request::from_parts(parts, body)));
    };

    let bytes = match axum::body::to_bytes(body, max_body_bytes).await {
        Ok(bytes) => bytes,
        Err(e) => return (pending, Err(e)),
    };

    let captured = match kind {
        BodyKind::Json => serde_json::from_slice(&bytes).unwrap_or(Value::Null),
        BodyKind::Form => parse_urlencoded(&String::from_utf8_lossy(&bytes)),
    };
    pending = pending.with_body(captured);

    (pending, Ok(Request::from_parts(parts, Body::from(bytes))))
}

/// Path and query as the client sent them, before any nesting rewrote the URI
fn request_url(parts: &Parts) -> String {
    let uri = parts
        .extensions
        .get::<OriginalUri>()
        .map(|OriginalUri(uri)| uri)
        .unwrap_or(&parts.uri);

    uri.path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| uri.path().to_string())
}

async fn route_params(parts: &mut Parts) -> Value {
    match RawPathParams::from_request_parts(parts, &()).await {
        Ok(params) => Value::Object(
            params
                .iter()
                .map(|(key, value)| (key.to_string(), Value::String(value.to_string())))
                .collect(),
        ),
        Err(_) => Value::Null,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BodyKind {
    Json,
    Form,
}

/// Body kind when the body is JSON or a form of known length within `limit`
fn capturable_body(parts: &Parts, limit: usize) -> Option<BodyKind> {
    let content_type = parts
        .headers
        .get(header::CONTENT_TYPE)?
        .to_str()
        .ok()?
        .to_ascii_lowercase();
    let essence = content_type.split(';').next().unwrap_or_default().trim();

    let kind = if essence == "application/json" || essence.ends_with("+json") {
        BodyKind::Json
    } else if essence == "application/x-www-form-urlencoded" {
        BodyKind::Form
    } else {
        return None;
    };

    let length: usize = parts
        .headers
        .get(header::CONTENT_LENGTH)?
        .to_str()
        .ok()?
        .trim()
        .parse()
        .ok()?;

    (length > 0 && length <= limit).then_some(kind)
}

/// Decode `a=1&b=2&a=3` into `{"a": ["1", "3"], "b": "2"}`
pub fn parse_urlencoded(input: &str) -> Value {
    let mut map = Map::new();
    for (key, value) in url::form_urlencoded::parse(input.as_bytes()) {
        insert_repeated(&mut map, key, value);
    }
    Value::Object(map)
}

fn insert_repeated(map: &mut Map<String, Value>, key: Cow<'_, str>, value: Cow<'_, str>) {
    let value = Value::String(value.into_owned());
    match map.get_mut(key.as_ref()) {
        Some(Value::Array(items)) => items.push(value),
        Some(existing) => {
            let first = existing.take();
            *existing = Value::Array(vec![first, value]);
        }
        None => {
            map.insert(key.into_owned(), value);
        }
    }
}

fn elapsed_millis(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}
