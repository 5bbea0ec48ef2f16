//! Predicate matching logic for response rules.
//!
//! Each predicate tests one request dimension (path, verb, query, payload,
//! headers, call count). A criterion the rule does not declare always passes.

use super::types::{FieldMatchers, RequestDescriptor, ResponseRule, RouteMatching};
use serde_json::{Map, Value};

/// Request data prepared once per match so every rule sees the same view.
pub(crate) struct MatchInput<'a> {
    pub path: &'a str,
    pub method: Option<&'a str>,
    pub query: Value,
    pub body: Option<&'a Value>,
    pub headers: Value,
}

impl<'a> MatchInput<'a> {
    pub fn new(request: &'a RequestDescriptor) -> Self {
        let query: Map<String, Value> = request
            .query
            .iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect();
        let headers: Map<String, Value> = request
            .headers
            .iter()
            .map(|(k, v)| (k.to_ascii_lowercase(), Value::String(v.clone())))
            .collect();

        Self {
            path: &request.path,
            method: request.method.as_deref(),
            query: Value::Object(query),
            body: request.body.as_ref(),
            headers: Value::Object(headers),
        }
    }
}

/// Route regex against the request path.
pub fn route_matches(rule: &ResponseRule, path: &str, mode: RouteMatching) -> bool {
    rule.route.is_match(path, mode)
}

/// Exact, case-sensitive verb comparison. An unknown request method does not
/// constrain the rule.
pub fn verb_matches(rule: &ResponseRule, method: Option<&str>) -> bool {
    match (&rule.verb, method) {
        (Some(expected), Some(actual)) => expected == actual,
        _ => true,
    }
}

pub fn query_matches(rule: &ResponseRule, query: &Value) -> bool {
    rule.query_params
        .as_ref()
        .is_none_or(|matchers| fields_match(matchers, Some(query)))
}

pub fn payload_matches(rule: &ResponseRule, body: Option<&Value>) -> bool {
    rule.payload
        .as_ref()
        .is_none_or(|matchers| fields_match(matchers, body))
}

/// Header keys are lower-case on both sides by the time this runs.
pub fn headers_match(rule: &ResponseRule, headers: &Value) -> bool {
    rule.required_headers
        .as_ref()
        .is_none_or(|matchers| fields_match(matchers, Some(headers)))
}

/// `at`-gated rules pass only on exactly their call number.
pub fn call_count_matches(rule: &ResponseRule, num_calls: u64) -> bool {
    rule.at.is_none_or(|at| num_calls == at)
}

/// Every declared matcher must find and accept its field in `source`.
pub fn fields_match(matchers: &FieldMatchers, source: Option<&Value>) -> bool {
    let Some(source) = source.filter(|v| v.is_object() || v.is_array()) else {
        return false;
    };
    matchers
        .iter()
        .all(|(key, matcher)| matcher.matches(lookup_field(source, key)))
}

/// Look up a field by its literal key first, then as a nested path.
pub fn lookup_field<'a>(source: &'a Value, key: &str) -> Option<&'a Value> {
    if let Some(value) = source.as_object().and_then(|obj| obj.get(key)) {
        return Some(value);
    }
    resolve_path(source, key)
}

/// One step of a field path.
#[derive(Debug, Clone, PartialEq)]
enum PathSegment<'a> {
    Key(&'a str),
    Index(usize),
}

/// Split `a.b[0].c` / `a[b].c` into segments.
fn split_path(path: &str) -> Option<Vec<PathSegment<'_>>> {
    let mut segments = Vec::new();
    for part in path.split('.') {
        let mut rest = part;
        // Leading key before any bracket
        let key_end = rest.find('[').unwrap_or(rest.len());
        if key_end > 0 {
            segments.push(PathSegment::Key(&rest[..key_end]));
        }
        rest = &rest[key_end..];

        while let Some(stripped) = rest.strip_prefix('[') {
            let end = stripped.find(']')?;
            let inner = stripped[..end].trim_matches(|c| c == '"' || c == '\'');
            segments.push(match inner.parse::<usize>() {
                Ok(index) => PathSegment::Index(index),
                Err(_) => PathSegment::Key(inner),
            });
            rest = &stripped[end + 1..];
        }

        if !rest.is_empty() {
            return None;
        }
    }
    Some(segments)
}

/// Walk a JSON value following a dotted / bracket-indexed path.
pub fn resolve_path<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    let segments = split_path(path)?;
    if segments.is_empty() {
        return None;
    }

    segments
        .iter()
        .try_fold(value, |current, segment| match (segment, current) {
            (PathSegment::Key(key), Value::Object(obj)) => obj.get(*key),
            (PathSegment::Key(key), Value::Array(arr)) => {
                key.parse::<usize>().ok().and_then(|i| arr.get(i))
            }
            (PathSegment::Index(index), Value::Array(arr)) => arr.get(*index),
            (PathSegment::Index(index), Value::Object(obj)) => obj.get(&index.to_string()),
            _ => None,
        })
}
