//! Request log entry model
//!
//! An entry is built in two phases. Request-time fields are captured into a
//! [`PendingLogEntry`] as soon as the request arrives; the pending entry is
//! consumed by [`PendingLogEntry::finish`] once the response status and
//! latency are known, producing an immutable [`LogEntry`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicI64, Ordering};
use uuid::Uuid;

/// HTTP verbs accepted by the request log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
    Head,
    Options,
    Trace,
    Connect,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
            Self::Head => "HEAD",
            Self::Options => "OPTIONS",
            Self::Trace => "TRACE",
            Self::Connect => "CONNECT",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Method name outside the supported verb set
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unsupported HTTP method: {0}")]
pub struct UnsupportedMethod(pub String);

impl FromStr for HttpMethod {
    type Err = UnsupportedMethod;

    /// Parse a method name, case-insensitively
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "GET" => Ok(Self::Get),
            "POST" => Ok(Self::Post),
            "PUT" => Ok(Self::Put),
            "PATCH" => Ok(Self::Patch),
            "DELETE" => Ok(Self::Delete),
            "HEAD" => Ok(Self::Head),
            "OPTIONS" => Ok(Self::Options),
            "TRACE" => Ok(Self::Trace),
            "CONNECT" => Ok(Self::Connect),
            _ => Err(UnsupportedMethod(s.to_string())),
        }
    }
}

impl TryFrom<&axum::http::Method> for HttpMethod {
    type Error = UnsupportedMethod;

    fn try_from(method: &axum::http::Method) -> Result<Self, Self::Error> {
        method.as_str().parse()
    }
}

/// One recorded HTTP request/response observation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    pub id: Uuid,
    pub method: HttpMethod,
    pub url: String,
    pub source_ip: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    /// Milliseconds between request arrival and response
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_time: Option<u64>,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Request-time half of a log entry
///
/// Holds everything known when the request arrives. The only way to obtain a
/// [`LogEntry`] is [`finish`](Self::finish), which takes `self` by value, so
/// status and latency are set exactly once.
#[derive(Debug, Clone)]
pub struct PendingLogEntry {
    id: Uuid,
    method: HttpMethod,
    url: String,
    source_ip: String,
    user_agent: Option<String>,
    query: Option<Value>,
    body: Option<Value>,
    params: Option<Value>,
    timestamp: DateTime<Utc>,
    error: Option<String>,
}

impl PendingLogEntry {
    pub fn new(method: HttpMethod, url: impl Into<String>, source_ip: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            method,
            url: url.into(),
            source_ip: source_ip.into(),
            user_agent: None,
            query: None,
            body: None,
            params: None,
            timestamp: next_timestamp(),
            error: None,
        }
    }

    pub fn with_user_agent(mut self, user_agent: Option<String>) -> Self {
        self.user_agent = user_agent.filter(|ua| !ua.is_empty());
        self
    }

    pub fn with_query(mut self, query: Value) -> Self {
        self.query = non_empty(query);
        self
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = non_empty(body);
        self
    }

    pub fn with_params(mut self, params: Value) -> Self {
        self.params = non_empty(params);
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn method(&self) -> HttpMethod {
        self.method
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn source_ip(&self) -> &str {
        &self.source_ip
    }

    /// Fill in the response-time fields and freeze the entry
    pub fn finish(self, status_code: u16, response_time_ms: u64) -> LogEntry {
        LogEntry {
            id: self.id,
            method: self.method,
            url: self.url,
            source_ip: self.source_ip,
            user_agent: self.user_agent,
            query: self.query,
            body: self.body,
            params: self.params,
            status_code: Some(status_code),
            response_time: Some(response_time_ms),
            timestamp: self.timestamp,
            error: self.error,
        }
    }
}

/// `None` for null and empty containers/strings, so they are omitted on write
pub fn non_empty(value: Value) -> Option<Value> {
    match &value {
        Value::Null => None,
        Value::Object(map) if map.is_empty() => None,
        Value::Array(items) if items.is_empty() => None,
        Value::String(s) if s.is_empty() => None,
        _ => Some(value),
    }
}

static LAST_TIMESTAMP_MILLIS: AtomicI64 = AtomicI64::new(0);

/// Current time at millisecond precision, never earlier than a previous call
///
/// Wall-clock regressions are clamped to the last issued value.
pub fn next_timestamp() -> DateTime<Utc> {
    let now = Utc::now().timestamp_millis();
    let previous = LAST_TIMESTAMP_MILLIS.fetch_max(now, Ordering::SeqCst);
    millis_to_datetime(previous.max(now))
}

pub fn millis_to_datetime(millis: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(millis).unwrap_or_else(Utc::now)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_method_parse_is_case_insensitive() {
        assert_eq!("post".parse::<HttpMethod>().unwrap(), HttpMethod::Post);
        assert_eq!(" Get ".parse::<HttpMethod>().unwrap(), HttpMethod::Get);
        assert!("BREW".parse::<HttpMethod>().is_err());
    }

    #[test]
    fn test_method_from_http_method() {
        let method = HttpMethod::try_from(&axum::http::Method::DELETE).unwrap();
        assert_eq!(method, HttpMethod::Delete);
        assert_eq!(method.to_string(), "DELETE");
    }

    #[test]
    fn test_finish_sets_response_fields() {
        let pending = PendingLogEntry::new(HttpMethod::Get, "/health", "10.0.0.1");
        let id = pending.id();

        let entry = pending.finish(200, 12);
        assert_eq!(entry.id, id);
        assert_eq!(entry.status_code, Some(200));
        assert_eq!(entry.response_time, Some(12));
        assert_eq!(entry.url, "/health");
    }

    #[test]
    fn test_empty_optional_fields_are_omitted() {
        let entry = PendingLogEntry::new(HttpMethod::Post, "/test", "Unknown")
            .with_query(json!({}))
            .with_body(json!({"name": "flexy"}))
            .with_params(Value::Null)
            .with_user_agent(Some(String::new()))
            .finish(201, 3);

        let value = serde_json::to_value(&entry).unwrap();
        let obj = value.as_object().unwrap();
        assert!(!obj.contains_key("query"));
        assert!(!obj.contains_key("params"));
        assert!(!obj.contains_key("userAgent"));
        assert_eq!(obj["body"], json!({"name": "flexy"}));
        assert_eq!(obj["statusCode"], json!(201));
        assert_eq!(obj["responseTime"], json!(3));
        assert_eq!(obj["sourceIp"], json!("Unknown"));
        assert_eq!(obj["method"], json!("POST"));
    }

    #[test]
    fn test_timestamps_are_non_decreasing() {
        let mut previous = next_timestamp();
        for _ in 0..1000 {
            let current = next_timestamp();
            assert!(current >= previous);
            previous = current;
        }
    }

    #[test]
    fn test_entry_json_roundtrip_keeps_optional_fields() {
        let entry = PendingLogEntry::new(HttpMethod::Put, "/items/7", "127.0.0.1")
            .with_params(json!({"id": "7"}))
            .with_error("upstream closed")
            .finish(502, 40);

        let text = serde_json::to_string(&entry).unwrap();
        let decoded: LogEntry = serde_json::from_str(&text).unwrap();
        assert_eq!(decoded, entry);
    }
}
