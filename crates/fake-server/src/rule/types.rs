//! Type definitions for the rule store.
//!
//! This module contains the response rule model, matcher values, the request
//! descriptor consumed by matching, and the error types of the rule layer.

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

/// Sentinel stored in place of a response body the builder cannot use.
pub const CORRUPTED_BODY: &str = "Corrupted Data.";

/// Status code used when a rule does not declare one.
pub const DEFAULT_RESPONSE_CODE: u16 = 404;

// ============================================================================
// Route Patterns
// ============================================================================

/// How a rule's route pattern is tested against the request path.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RouteMatching {
    /// The pattern may match anywhere in the path (`/foo` matches `/api/foo/1`)
    #[default]
    Substring,
    /// The pattern must match the whole path
    Anchored,
}

impl RouteMatching {
    pub fn as_str(&self) -> &'static str {
        match self {
            RouteMatching::Substring => "substring",
            RouteMatching::Anchored => "anchored",
        }
    }
}

impl FromStr for RouteMatching {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "substring" => Ok(RouteMatching::Substring),
            "anchored" => Ok(RouteMatching::Anchored),
            other => Err(format!(
                "unknown route matching mode '{other}' (expected 'substring' or 'anchored')"
            )),
        }
    }
}

impl fmt::Display for RouteMatching {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Compiled route regex, kept in both substring and full-path forms.
#[derive(Debug, Clone)]
pub struct RoutePattern {
    source: String,
    unanchored: Regex,
    anchored: Regex,
}

impl RoutePattern {
    pub fn new(source: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            source: source.to_string(),
            unanchored: Regex::new(source)?,
            // The trailing `(?x)` and newline end any `#` comment left open by an
            // extended-mode source; otherwise they match nothing.
            anchored: Regex::new(&format!("^(?:{source}(?x)\n)$"))?,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    pub fn is_match(&self, path: &str, mode: RouteMatching) -> bool {
        match mode {
            RouteMatching::Substring => self.unanchored.is_match(path),
            RouteMatching::Anchored => self.anchored.is_match(path),
        }
    }
}

impl Serialize for RoutePattern {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.source)
    }
}

// ============================================================================
// Matcher Values
// ============================================================================

/// Expected value for one query parameter, payload field or header.
///
/// The variant is decided once when the rule is built: strings become
/// regular expressions, other scalars and structures compare by equality.
#[derive(Debug, Clone)]
pub enum MatchValue {
    /// Equality against the actual value
    Exact(Value),
    /// Regex test against the stringified actual value
    Pattern(Regex),
    /// Unusable matcher (null, or a string that is not a valid regex); never matches
    Invalid(Value),
}

impl MatchValue {
    /// Classify a loosely-typed matcher value.
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::String(source) => match Regex::new(&source) {
                Ok(regex) => MatchValue::Pattern(regex),
                Err(e) => {
                    warn!("Matcher '{}' is not a valid regex, it will never match: {}", source, e);
                    MatchValue::Invalid(Value::String(source))
                }
            },
            Value::Null => MatchValue::Invalid(Value::Null),
            other => MatchValue::Exact(other),
        }
    }

    /// Test an actual request value. A missing or null actual never matches.
    pub fn matches(&self, actual: Option<&Value>) -> bool {
        let actual = match actual {
            None | Some(Value::Null) => return false,
            Some(v) => v,
        };

        match self {
            MatchValue::Pattern(regex) => regex.is_match(&stringify_value(actual)),
            MatchValue::Exact(expected) => {
                if expected == actual {
                    return true;
                }
                // Query strings and headers only carry text, so `1` must match "1"
                match (expected, actual) {
                    (Value::Number(_) | Value::Bool(_), Value::String(s)) => {
                        *s == expected.to_string()
                    }
                    _ => false,
                }
            }
            MatchValue::Invalid(_) => false,
        }
    }

    /// The matcher in its configuration form.
    pub fn to_value(&self) -> Value {
        match self {
            MatchValue::Exact(v) | MatchValue::Invalid(v) => v.clone(),
            MatchValue::Pattern(regex) => Value::String(regex.as_str().to_string()),
        }
    }
}

/// Render a JSON value the way it is compared against a regex.
pub fn stringify_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Named matchers for one request dimension.
#[derive(Debug, Clone, Default)]
pub struct FieldMatchers(BTreeMap<String, MatchValue>);

impl FieldMatchers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: MatchValue) {
        self.0.insert(key.into(), value);
    }

    pub fn get(&self, key: &str) -> Option<&MatchValue> {
        self.0.get(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &MatchValue)> {
        self.0.iter()
    }
}

impl FromIterator<(String, MatchValue)> for FieldMatchers {
    fn from_iter<I: IntoIterator<Item = (String, MatchValue)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl Serialize for FieldMatchers {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (key, matcher) in &self.0 {
            map.serialize_entry(key, &matcher.to_value())?;
        }
        map.end()
    }
}

// ============================================================================
// Response Rule
// ============================================================================

/// Canned response body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResponseBody {
    Text(String),
    Json(Value),
}

impl ResponseBody {
    /// Render the body as it is written to the wire.
    pub fn render(&self) -> Result<String, serde_json::Error> {
        match self {
            ResponseBody::Text(text) => Ok(text.clone()),
            ResponseBody::Json(value) => serde_json::to_string(value),
        }
    }
}

/// A registered canned response together with its match criteria.
///
/// Rules are built by [`crate::rule::ResponseRuleBuilder`]; the call counter
/// and insertion time live in the store, not here.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseRule {
    pub route: RoutePattern,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verb: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query_params: Option<FieldMatchers>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<FieldMatchers>,
    /// Keys are lower-case
    #[serde(skip_serializing_if = "Option::is_none")]
    pub required_headers: Option<FieldMatchers>,
    pub response_code: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_body: Option<ResponseBody>,
    /// File whose contents replace `response_body` when set
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_data: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_headers: Option<BTreeMap<String, String>>,
    /// Delay in milliseconds before the response completes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delay: Option<u64>,
    /// Respond only on exactly this call number (1-based)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub at: Option<u64>,
}

impl ResponseRule {
    /// Number of declared query parameter and payload matchers.
    pub fn param_count(&self) -> usize {
        self.query_params.as_ref().map_or(0, FieldMatchers::len)
            + self.payload.as_ref().map_or(0, FieldMatchers::len)
    }

    /// Number of declared header matchers.
    pub fn header_count(&self) -> usize {
        self.required_headers.as_ref().map_or(0, FieldMatchers::len)
    }

    pub fn delay_duration(&self) -> Option<Duration> {
        self.delay.filter(|ms| *ms > 0).map(Duration::from_millis)
    }
}

/// Point-in-time copy of a stored rule, as returned by matching and listing.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleSnapshot {
    pub id: u64,
    #[serde(flatten)]
    pub rule: ResponseRule,
    pub num_calls: u64,
    pub timestamp: DateTime<Utc>,
}

// ============================================================================
// Configuration Records
// ============================================================================

/// One entry of a configuration file's `routes` array.
///
/// Every field except `route` is loosely typed; the builder normalizes them.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteRecord {
    pub route: String,
    #[serde(default)]
    pub verb: Option<String>,
    #[serde(default)]
    pub query_params: Option<Value>,
    #[serde(default)]
    pub payload: Option<Value>,
    #[serde(default)]
    pub required_headers: Option<Value>,
    #[serde(default)]
    pub response_code: Option<Value>,
    #[serde(default)]
    pub response_body: Option<Value>,
    #[serde(default)]
    pub response_headers: Option<Value>,
    #[serde(default)]
    pub response_data: Option<String>,
    #[serde(default)]
    pub delay: Option<Value>,
    #[serde(default)]
    pub at: Option<Value>,
}

/// A configuration file: `{ "routes": [ ... ] }`
#[derive(Debug, Clone, Deserialize)]
pub struct RouteFile {
    pub routes: Vec<RouteRecord>,
}

// ============================================================================
// Request Descriptor
// ============================================================================

/// The parts of an incoming request that rules are matched against.
#[derive(Debug, Clone, Default)]
pub struct RequestDescriptor {
    pub path: String,
    /// `None` leaves verb-filtered rules unconstrained (used by removal)
    pub method: Option<String>,
    pub query: HashMap<String, String>,
    pub body: Option<Value>,
    pub headers: HashMap<String, String>,
}

impl RequestDescriptor {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }

    /// Build a descriptor from a URI, splitting off and decoding the query string.
    pub fn from_uri(uri: &str) -> Self {
        match uri.split_once('?') {
            Some((path, query)) => Self {
                path: path.to_string(),
                query: parse_query_string(query),
                ..Default::default()
            },
            None => Self::new(uri),
        }
    }

    pub fn with_method(mut self, method: impl Into<String>) -> Self {
        self.method = Some(method.into());
        self
    }

    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.insert(key.into(), value.into());
        self
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }
}

/// Parse a query string, URL-decoding both keys and values.
pub fn parse_query_string(query: &str) -> HashMap<String, String> {
    query
        .split('&')
        .filter(|s| !s.is_empty())
        .map(|pair| {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            (decode_component(key), decode_component(value))
        })
        .collect()
}

fn decode_component(raw: &str) -> String {
    let spaced = raw.replace('+', " ");
    urlencoding::decode(&spaced)
        .map(|s| s.into_owned())
        .unwrap_or(spaced)
}

// ============================================================================
// Errors
// ============================================================================

/// Errors raised while building a rule.
#[derive(Debug, Error)]
pub enum RuleError {
    #[error("Invalid route pattern '{0}': {1}")]
    InvalidRoute(String, #[source] regex::Error),
}

/// Errors raised while preloading rules from a directory.
#[derive(Debug, Error)]
pub enum PreloadError {
    #[error("Failed to read routes from {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Wrong configuration format in {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("Invalid route in {path}: {source}")]
    Rule {
        path: PathBuf,
        #[source]
        source: RuleError,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_match_value_pattern() {
        let matcher = MatchValue::from_value(json!("[0-9]+"));
        assert!(matches!(matcher, MatchValue::Pattern(_)));
        assert!(matcher.matches(Some(&json!("42"))));
        assert!(!matcher.matches(Some(&json!("abc"))));
        // Numbers are stringified before the regex test
        assert!(matcher.matches(Some(&json!(42))));
    }

    #[test]
    fn test_match_value_exact() {
        let matcher = MatchValue::from_value(json!(1));
        assert!(matches!(matcher, MatchValue::Exact(_)));
        assert!(matcher.matches(Some(&json!(1))));
        assert!(matcher.matches(Some(&json!("1"))));
        assert!(!matcher.matches(Some(&json!(2))));
        assert!(!matcher.matches(Some(&json!("12"))));

        let matcher = MatchValue::from_value(json!(true));
        assert!(matcher.matches(Some(&json!(true))));
        assert!(matcher.matches(Some(&json!("true"))));
        assert!(!matcher.matches(Some(&json!(false))));
    }

    #[test]
    fn test_match_value_missing_actual() {
        let matcher = MatchValue::from_value(json!(".*"));
        assert!(!matcher.matches(None));
        assert!(!matcher.matches(Some(&Value::Null)));
    }

    #[test]
    fn test_match_value_fails_closed() {
        let null_matcher = MatchValue::from_value(Value::Null);
        assert!(matches!(null_matcher, MatchValue::Invalid(_)));
        assert!(!null_matcher.matches(Some(&json!("anything"))));

        let bad_regex = MatchValue::from_value(json!("(unclosed"));
        assert!(matches!(bad_regex, MatchValue::Invalid(_)));
        assert!(!bad_regex.matches(Some(&json!("(unclosed"))));
        assert_eq!(bad_regex.to_value(), json!("(unclosed"));
    }

    #[test]
    fn test_route_pattern_modes() {
        let pattern = RoutePattern::new("/foo").unwrap();
        assert!(pattern.is_match("/api/foo/1", RouteMatching::Substring));
        assert!(!pattern.is_match("/api/foo/1", RouteMatching::Anchored));
        assert!(pattern.is_match("/foo", RouteMatching::Anchored));

        let alternation = RoutePattern::new("/a|/b").unwrap();
        assert!(alternation.is_match("/b", RouteMatching::Anchored));
        assert!(!alternation.is_match("/b/c", RouteMatching::Anchored));
    }

    #[test]
    fn test_route_pattern_extended_mode_comment() {
        let pattern = RoutePattern::new("(?x)/a # trailing comment").unwrap();
        assert!(pattern.is_match("/a/b", RouteMatching::Substring));
        assert!(pattern.is_match("/a", RouteMatching::Anchored));
        assert!(!pattern.is_match("/a/b", RouteMatching::Anchored));

        // Whitespace in a plain route stays literal
        let plain = RoutePattern::new("/a b").unwrap();
        assert!(plain.is_match("/a b", RouteMatching::Anchored));
        assert!(!plain.is_match("/ab", RouteMatching::Anchored));
    }

    #[test]
    fn test_route_matching_from_str() {
        assert_eq!(
            "Anchored".parse::<RouteMatching>().unwrap(),
            RouteMatching::Anchored
        );
        assert_eq!(
            "substring".parse::<RouteMatching>().unwrap(),
            RouteMatching::Substring
        );
        assert!("prefix".parse::<RouteMatching>().is_err());
    }

    #[test]
    fn test_request_descriptor_from_uri() {
        let request = RequestDescriptor::from_uri("/search?q=hello%20world&page=2&flag");
        assert_eq!(request.path, "/search");
        assert_eq!(request.query.get("q").unwrap(), "hello world");
        assert_eq!(request.query.get("page").unwrap(), "2");
        assert_eq!(request.query.get("flag").unwrap(), "");

        let request = RequestDescriptor::from_uri("/plain");
        assert_eq!(request.path, "/plain");
        assert!(request.query.is_empty());
    }

    #[test]
    fn test_response_body_render() {
        assert_eq!(
            ResponseBody::Text("plain".to_string()).render().unwrap(),
            "plain"
        );
        assert_eq!(
            ResponseBody::Json(json!({"a": 1})).render().unwrap(),
            r#"{"a":1}"#
        );
    }
}
