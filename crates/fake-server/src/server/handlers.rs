//! Control endpoint handlers: add, delOne, flush, getAll.

use super::types::{
    collect_body, content_type, error_response, json_response, parse_body, request_params,
    text_response,
};
use crate::rule::{
    parse_object, stringify_value, RequestDescriptor, ResponseRuleBuilder, RouteRecord, RuleStore,
};
use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::{Request, Response, StatusCode};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Read the merged query + body parameters of a control request.
async fn read_params(req: Request<Incoming>) -> Result<Map<String, Value>, String> {
    let query = req.uri().query().map(str::to_string);
    let content_type = content_type(req.headers());
    let body = collect_body(req).await?;
    Ok(request_params(
        query.as_deref(),
        parse_body(content_type.as_deref(), &body),
    ))
}

/// POST /add - Register a rule
pub async fn handle_add(req: Request<Incoming>, store: Arc<RuleStore>) -> Response<Full<Bytes>> {
    let params = match read_params(req).await {
        Ok(p) => p,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, &e),
    };
    add_rule(params, &store)
}

fn add_rule(params: Map<String, Value>, store: &RuleStore) -> Response<Full<Bytes>> {
    let record: RouteRecord = match serde_json::from_value(Value::Object(params)) {
        Ok(r) => r,
        Err(e) => {
            return error_response(StatusCode::BAD_REQUEST, &format!("Invalid rule: {e}"));
        }
    };

    match ResponseRuleBuilder::from_record(record).build() {
        Ok(rule) => {
            store.add(rule);
            text_response(StatusCode::OK, "OK")
        }
        Err(e) => error_response(StatusCode::BAD_REQUEST, &e.to_string()),
    }
}

/// DELETE /delOne - Remove the rule that best matches the given criteria
pub async fn handle_del_one(
    req: Request<Incoming>,
    store: Arc<RuleStore>,
) -> Response<Full<Bytes>> {
    let params = match read_params(req).await {
        Ok(p) => p,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, &e),
    };
    remove_rule(params, &store)
}

fn remove_rule(mut params: Map<String, Value>, store: &RuleStore) -> Response<Full<Bytes>> {
    let Some(request) = removal_request(&mut params) else {
        return error_response(StatusCode::BAD_REQUEST, "Missing required field 'route'");
    };

    debug!(path = %request.path, "Removing best matching rule");
    if store.remove(&request) {
        text_response(StatusCode::OK, "OK")
    } else {
        text_response(StatusCode::CONFLICT, "NOT OK")
    }
}

/// Describe the request whose best match should be removed.
fn removal_request(params: &mut Map<String, Value>) -> Option<RequestDescriptor> {
    let route = match params.remove("route")? {
        Value::String(route) => route,
        other => stringify_value(&other),
    };

    let mut request = RequestDescriptor::new(route);
    request.method = params
        .remove("verb")
        .as_ref()
        .and_then(Value::as_str)
        .map(str::to_string);
    request.query = params
        .remove("queryParams")
        .map(|v| string_entries(v, "queryParams"))
        .unwrap_or_default();
    request.headers = params
        .remove("requiredHeaders")
        .map(|v| string_entries(v, "requiredHeaders"))
        .unwrap_or_default();
    request.body = params
        .remove("payload")
        .and_then(|v| parse_object(v, "payload"))
        .map(Value::Object);
    Some(request)
}

fn string_entries(value: Value, field: &str) -> HashMap<String, String> {
    parse_object(value, field)
        .unwrap_or_default()
        .into_iter()
        .map(|(k, v)| (k, stringify_value(&v)))
        .collect()
}

/// DELETE /flush - Remove every rule
pub async fn handle_flush(store: Arc<RuleStore>) -> Response<Full<Bytes>> {
    store.flush();
    text_response(StatusCode::OK, "OK")
}

/// GET /getAll - List every rule in insertion order
pub async fn handle_get_all(store: Arc<RuleStore>) -> Response<Full<Bytes>> {
    json_response(StatusCode::OK, &store.get_all())
}
