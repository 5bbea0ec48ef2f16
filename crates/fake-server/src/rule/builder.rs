//! Fluent construction of response rules from loosely-typed input.
//!
//! The builder is the only place external input (admin requests, route
//! files) is normalized into a [`ResponseRule`]. Optional fields that are
//! absent stay absent; body content problems degrade to a sentinel instead
//! of failing.

use super::types::{
    FieldMatchers, MatchValue, ResponseBody, ResponseRule, RoutePattern, RouteRecord, RuleError,
    CORRUPTED_BODY, DEFAULT_RESPONSE_CODE,
};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::warn;

/// Builder for [`ResponseRule`]
#[derive(Debug, Clone)]
pub struct ResponseRuleBuilder {
    route: String,
    verb: Option<String>,
    query_params: Option<FieldMatchers>,
    payload: Option<FieldMatchers>,
    required_headers: Option<FieldMatchers>,
    response_code: u16,
    response_body: Option<ResponseBody>,
    response_data: Option<PathBuf>,
    response_headers: Option<BTreeMap<String, String>>,
    delay: Option<u64>,
    at: Option<u64>,
}

impl ResponseRuleBuilder {
    pub fn new(route: impl Into<String>) -> Self {
        Self {
            route: route.into(),
            verb: None,
            query_params: None,
            payload: None,
            required_headers: None,
            response_code: DEFAULT_RESPONSE_CODE,
            response_body: None,
            response_data: None,
            response_headers: None,
            delay: None,
            at: None,
        }
    }

    /// Start a builder from a route file record.
    pub fn from_record(record: RouteRecord) -> Self {
        Self::new(record.route)
            .with_verb(record.verb)
            .with_query_params(record.query_params)
            .with_payload(record.payload)
            .with_required_headers(record.required_headers)
            .send_response_code(record.response_code)
            .send_response_body(record.response_body)
            .with_response_headers(record.response_headers)
            .with_response_data(record.response_data)
            .delay_response_by(record.delay)
            .respond_at_call(record.at)
    }

    pub fn with_verb(mut self, verb: Option<String>) -> Self {
        if let Some(verb) = verb.filter(|v| !v.is_empty()) {
            self.verb = Some(verb);
        }
        self
    }

    pub fn with_query_params(mut self, params: Option<Value>) -> Self {
        if let Some(matchers) = params.and_then(|v| to_matchers(v, "queryParams", false)) {
            self.query_params = Some(matchers);
        }
        self
    }

    pub fn with_payload(mut self, payload: Option<Value>) -> Self {
        if let Some(matchers) = payload.and_then(|v| to_matchers(v, "payload", false)) {
            self.payload = Some(matchers);
        }
        self
    }

    /// Header names are lower-cased here, once.
    pub fn with_required_headers(mut self, headers: Option<Value>) -> Self {
        if let Some(matchers) = headers.and_then(|v| to_matchers(v, "requiredHeaders", true)) {
            self.required_headers = Some(matchers);
        }
        self
    }

    /// Accepts a number or a numeric string; anything else keeps the 404 default.
    pub fn send_response_code(mut self, code: Option<Value>) -> Self {
        self.response_code = match code {
            None | Some(Value::Null) => DEFAULT_RESPONSE_CODE,
            Some(value) => match to_u64(&value).and_then(|c| u16::try_from(c).ok()) {
                Some(code) if (100..=999).contains(&code) => code,
                Some(0) => DEFAULT_RESPONSE_CODE,
                _ => {
                    warn!("Ignoring invalid responseCode {}, using {}", value, DEFAULT_RESPONSE_CODE);
                    DEFAULT_RESPONSE_CODE
                }
            },
        };
        self
    }

    pub fn send_response_body(mut self, body: Option<Value>) -> Self {
        self.response_body = body.map(normalize_body);
        self
    }

    pub fn with_response_headers(mut self, headers: Option<Value>) -> Self {
        let Some(headers) = headers.and_then(|v| parse_object(v, "responseHeaders")) else {
            return self;
        };
        let headers: BTreeMap<String, String> = headers
            .into_iter()
            .filter_map(|(name, value)| match value {
                Value::String(s) => Some((name, s)),
                Value::Number(_) | Value::Bool(_) => Some((name, value.to_string())),
                other => {
                    warn!("Dropping response header '{}' with non-scalar value {}", name, other);
                    None
                }
            })
            .collect();
        self.response_headers = Some(headers);
        self
    }

    pub fn with_response_data(mut self, path: Option<String>) -> Self {
        if let Some(path) = path.filter(|p| !p.is_empty()) {
            self.response_data = Some(PathBuf::from(path));
        }
        self
    }

    /// Delay in milliseconds; negative or non-numeric values are dropped.
    pub fn delay_response_by(mut self, ms: Option<Value>) -> Self {
        match ms.as_ref().filter(|v| !v.is_null()).map(|v| (v, to_millis(v))) {
            Some((_, Some(ms))) => self.delay = Some(ms),
            Some((raw, None)) => warn!("Ignoring invalid delay {}", raw),
            None => {}
        }
        self
    }

    /// A call number of 0 means "not gated".
    pub fn respond_at_call(mut self, call: Option<Value>) -> Self {
        match call.as_ref().filter(|v| !v.is_null()).map(|v| (v, to_u64(v))) {
            Some((_, Some(0))) => {}
            Some((_, Some(at))) => self.at = Some(at),
            Some((raw, None)) => warn!("Ignoring invalid call number {}", raw),
            None => {}
        }
        self
    }

    pub fn build(self) -> Result<ResponseRule, RuleError> {
        let route = RoutePattern::new(&self.route)
            .map_err(|e| RuleError::InvalidRoute(self.route.clone(), e))?;

        Ok(ResponseRule {
            route,
            verb: self.verb,
            query_params: self.query_params,
            payload: self.payload,
            required_headers: self.required_headers,
            response_code: self.response_code,
            response_body: self.response_body,
            response_data: self.response_data,
            response_headers: self.response_headers,
            delay: self.delay,
            at: self.at,
        })
    }
}

/// Structured bodies are kept; text is unescaped and percent-decoded;
/// anything else becomes the corruption sentinel.
fn normalize_body(body: Value) -> ResponseBody {
    match body {
        Value::String(text) => {
            let unescaped = text.replace("&quot;", "\"");
            match urlencoding::decode(&unescaped) {
                Ok(decoded) => ResponseBody::Text(decoded.into_owned()),
                Err(e) => {
                    warn!("Decoded response body is not UTF-8, keeping it verbatim: {}", e);
                    ResponseBody::Text(unescaped)
                }
            }
        }
        structured @ (Value::Object(_) | Value::Array(_)) => ResponseBody::Json(structured),
        other => {
            warn!("Unsupported response body {}, storing sentinel", other);
            ResponseBody::Text(CORRUPTED_BODY.to_string())
        }
    }
}

/// Objects pass through; text is parsed as JSON (form posts send maps as text).
pub(crate) fn parse_object(value: Value, field: &str) -> Option<serde_json::Map<String, Value>> {
    let value = match value {
        Value::Null => return None,
        Value::String(text) => match serde_json::from_str::<Value>(&text) {
            Ok(parsed) => parsed,
            Err(_) => {
                warn!("Ignoring '{}': expected an object, got text {:?}", field, text);
                return None;
            }
        },
        other => other,
    };

    match value {
        Value::Object(map) => Some(map),
        other => {
            warn!("Ignoring '{}': expected an object, got {}", field, other);
            None
        }
    }
}

fn to_matchers(value: Value, field: &str, lowercase_keys: bool) -> Option<FieldMatchers> {
    let map = parse_object(value, field)?;
    Some(
        map.into_iter()
            .map(|(key, expected)| {
                let key = if lowercase_keys {
                    key.to_ascii_lowercase()
                } else {
                    key
                };
                (key, MatchValue::from_value(expected))
            })
            .collect(),
    )
}

/// Non-negative whole number, from a JSON number or numeric text.
fn to_u64(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64().or_else(|| {
            n.as_f64()
                .filter(|f| *f >= 0.0 && f.fract() == 0.0)
                .map(|f| f as u64)
        }),
        Value::String(s) => s.trim().parse::<u64>().ok(),
        _ => None,
    }
}

/// Milliseconds; fractional values are truncated.
fn to_millis(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64)),
        _ => to_u64(value),
    }
}
