//! Request parsing and response helpers for the HTTP layer.

use super::response::ResponseBuilder;
use crate::rule::parse_query_string;
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::{HeaderMap, Request, Response, StatusCode};
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::HashMap;

/// Error response structure
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub errors: Vec<ErrorDetail>,
}

/// Individual error detail
#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
}

// =============================================================================
// Response helper functions
// =============================================================================

/// Create a JSON response
pub fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response<Full<Bytes>> {
    let json = serde_json::to_string_pretty(body).unwrap_or_else(|_| "{}".to_string());
    ResponseBuilder::new(status)
        .header("Content-Type", "application/json")
        .body(json)
        .build()
}

/// Create a plain-text response
pub fn text_response(status: StatusCode, body: impl Into<Bytes>) -> Response<Full<Bytes>> {
    ResponseBuilder::new(status)
        .header("Content-Type", "text/plain; charset=utf-8")
        .body(body)
        .build()
}

/// Create an error response
pub fn error_response(status: StatusCode, message: &str) -> Response<Full<Bytes>> {
    let error = ErrorResponse {
        errors: vec![ErrorDetail {
            code: status.as_str().to_string(),
            message: message.to_string(),
        }],
    };
    json_response(status, &error)
}

// =============================================================================
// Request helpers
// =============================================================================

/// Collect request body into bytes
pub async fn collect_body(req: Request<Incoming>) -> Result<Bytes, String> {
    req.collect()
        .await
        .map(|c| c.to_bytes())
        .map_err(|e| format!("Failed to read request body: {e}"))
}

/// Header map with lower-case names; non-UTF-8 values are dropped.
pub fn header_map_to_hashmap(headers: &HeaderMap) -> HashMap<String, String> {
    headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_ascii_lowercase(), v.to_string()))
        })
        .collect()
}

/// Turn a raw request body into a JSON value.
///
/// Form posts become an object of strings, JSON parses as JSON, anything else
/// is kept as text. An empty body is `None`.
pub fn parse_body(content_type: Option<&str>, body: &[u8]) -> Option<Value> {
    if body.is_empty() {
        return None;
    }
    let text = String::from_utf8_lossy(body);

    if content_type.is_some_and(|ct| ct.contains("application/x-www-form-urlencoded")) {
        let fields: Map<String, Value> = parse_query_string(&text)
            .into_iter()
            .map(|(k, v)| (k, Value::String(v)))
            .collect();
        return Some(Value::Object(fields));
    }

    Some(serde_json::from_str(&text).unwrap_or_else(|_| Value::String(text.into_owned())))
}

/// Control endpoint parameters: query string fields overlaid by body fields.
pub fn request_params(query: Option<&str>, body: Option<Value>) -> Map<String, Value> {
    let mut params: Map<String, Value> = query
        .map(parse_query_string)
        .unwrap_or_default()
        .into_iter()
        .map(|(k, v)| (k, Value::String(v)))
        .collect();

    if let Some(Value::Object(fields)) = body {
        params.extend(fields);
    }
    params
}

/// Read the content type of a request, if any.
pub fn content_type(headers: &HeaderMap) -> Option<String> {
    headers
        .get(hyper::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}
