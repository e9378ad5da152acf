//! Per-call request options and response normalization.

use reqwest::header::{CACHE_CONTROL, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use reqwest::{Method, StatusCode};
use serde::Serialize;
use serde_json::Value;

use tether_api::ErrorBody;

use crate::error::{ClientError, Result};

/// Options for a single [`fetch`](crate::SessionClient::fetch) call.
#[derive(Debug, Clone)]
pub struct RequestOptions {
    pub method: Method,
    /// Serialized into the path; `null` values are dropped and arrays repeat
    /// the key.
    pub query: Vec<(String, Value)>,
    /// Merged over the default headers, replacing them per key.
    pub headers: HeaderMap,
    pub body: Option<Value>,
    /// Bypass the freshness gate entirely.
    pub skip_refresh: bool,
    /// Treat HTTP 401 as success for this call.
    pub skip_401: bool,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            method: Method::GET,
            query: Vec::new(),
            headers: HeaderMap::new(),
            body: None,
            skip_refresh: false,
            skip_401: false,
        }
    }
}

impl RequestOptions {
    pub fn get() -> Self {
        Self::default()
    }

    pub fn post() -> Self {
        Self::with_method(Method::POST)
    }

    pub fn put() -> Self {
        Self::with_method(Method::PUT)
    }

    pub fn patch() -> Self {
        Self::with_method(Method::PATCH)
    }

    pub fn delete() -> Self {
        Self::with_method(Method::DELETE)
    }

    pub fn with_method(method: Method) -> Self {
        Self {
            method,
            ..Self::default()
        }
    }

    pub fn query(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn json<T: Serialize + ?Sized>(self, body: &T) -> Result<Self> {
        let body = serde_json::to_value(body).map_err(|e| ClientError::json_encode(&e))?;
        Ok(self.body(body))
    }

    pub fn skip_refresh(mut self) -> Self {
        self.skip_refresh = true;
        self
    }

    pub fn skip_401(mut self) -> Self {
        self.skip_401 = true;
        self
    }
}

/// Append `query` to `path`, omitting null values.
pub fn build_path(path: &str, query: &[(String, Value)]) -> String {
    let mut serializer = url::form_urlencoded::Serializer::new(String::new());
    let mut any = false;
    for (key, value) in query {
        let values: Vec<&Value> = match value {
            Value::Array(items) => items.iter().collect(),
            other => vec![other],
        };
        for value in values {
            let rendered = match value {
                Value::Null => continue,
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            serializer.append_pair(key, &rendered);
            any = true;
        }
    }
    if !any {
        return path.to_string();
    }
    let separator = if path.contains('?') { '&' } else { '?' };
    format!("{path}{separator}{}", serializer.finish())
}

/// Default headers with the caller's headers laid over them.
pub fn request_headers(overrides: &HeaderMap) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    for name in overrides.keys() {
        headers.remove(name);
        for value in overrides.get_all(name) {
            headers.append(name.clone(), value.clone());
        }
    }
    headers
}

/// Status to publish for a response: a tolerated 401 is reported as 200.
pub fn observed_status(status: StatusCode, skip_401: bool) -> u16 {
    if skip_401 && status == StatusCode::UNAUTHORIZED {
        200
    } else {
        status.as_u16()
    }
}

/// Map a completed response onto the success/error taxonomy.
pub fn normalize_response(status: StatusCode, text: String, skip_401: bool) -> Result<Value> {
    if status.is_success() {
        return parse_json_body(status.as_u16(), text);
    }
    if skip_401 && status == StatusCode::UNAUTHORIZED {
        return Ok(serde_json::from_str(&text).unwrap_or(Value::Null));
    }
    if status == StatusCode::GATEWAY_TIMEOUT {
        // Gateway bodies are usually HTML, never parse them.
        return Err(ClientError::gateway_timeout(text));
    }
    let body = serde_json::from_str(&text).unwrap_or_else(|_| Value::String(text.clone()));
    let message = error_message(status.as_u16(), &body, &text);
    Err(ClientError::http(status.as_u16(), body, message))
}

/// Parse a successful body. An empty body is `null`.
pub fn parse_json_body(status: u16, text: String) -> Result<Value> {
    if text.trim().is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_str(&text).map_err(|e| ClientError::json_decode(status, text, &e))
}

/// Prefer `error_description`, then `error`, else status plus raw body.
pub fn error_message(status: u16, body: &Value, raw: &str) -> String {
    serde_json::from_value::<ErrorBody>(body.clone())
        .ok()
        .and_then(|b| b.message().map(str::to_string))
        .unwrap_or_else(|| format!("Request failed with status {status}: {raw}"))
}
