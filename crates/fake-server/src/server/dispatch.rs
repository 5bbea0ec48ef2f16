//! Request dispatch: resolve an incoming request against the rule store and
//! render the selected rule.
//!
//! The store lock is only held while matching. Reading `responseData` and
//! waiting out `delay` happen afterwards, so slow responses never block other
//! requests from being matched.

use super::response::ResponseBuilder;
use super::types::{
    collect_body, content_type, error_response, header_map_to_hashmap, parse_body, text_response,
};
use crate::rule::{parse_query_string, RequestDescriptor, RuleSnapshot, RuleStore};
use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::{Request, Response, StatusCode};
use std::sync::Arc;
use tracing::{debug, warn};

pub const NO_MATCH_BODY: &str = "no match!";
pub const MISCONFIGURED_BODY: &str = "FAKE-SERVER is misconfigured";

/// Match a request and answer with the best rule, or 404.
pub async fn handle_match(req: Request<Incoming>, store: Arc<RuleStore>) -> Response<Full<Bytes>> {
    let method = req.method().to_string();
    let uri = req.uri().clone();
    let headers = header_map_to_hashmap(req.headers());
    let content_type = content_type(req.headers());

    let body = match collect_body(req).await {
        Ok(b) => b,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, &e),
    };

    let request = RequestDescriptor {
        path: uri.path().to_string(),
        method: Some(method),
        query: uri.query().map(parse_query_string).unwrap_or_default(),
        body: parse_body(content_type.as_deref(), &body),
        headers,
    };

    match store.find_match(&request) {
        Some(matched) => {
            debug!(
                rule_id = matched.id,
                num_calls = matched.num_calls,
                "{} {} matched rule",
                request.method.as_deref().unwrap_or("-"),
                request.path
            );
            render_rule(&matched).await
        }
        None => {
            debug!(
                "{} {} did not match any rule",
                request.method.as_deref().unwrap_or("-"),
                request.path
            );
            text_response(StatusCode::NOT_FOUND, NO_MATCH_BODY)
        }
    }
}

/// Render the selected rule, waiting out its delay first.
pub async fn render_rule(matched: &RuleSnapshot) -> Response<Full<Bytes>> {
    let rule = &matched.rule;

    let body = match load_body(matched).await {
        Ok(body) => body,
        Err(response) => return response,
    };

    let Ok(status) = StatusCode::from_u16(rule.response_code) else {
        warn!("Rule {} has unusable status {}", matched.id, rule.response_code);
        return text_response(StatusCode::INTERNAL_SERVER_ERROR, MISCONFIGURED_BODY);
    };

    if let Some(delay) = rule.delay_duration() {
        debug!("Delaying response by {:?}", delay);
        tokio::time::sleep(delay).await;
    }

    let mut builder = ResponseBuilder::new(status).header("Content-Type", "application/json");
    if let Some(ref headers) = rule.response_headers {
        builder = builder.merge_headers(headers);
    }
    builder.body(body).build()
}

/// Body from `responseData` when set, otherwise from `responseBody`.
async fn load_body(matched: &RuleSnapshot) -> Result<Bytes, Response<Full<Bytes>>> {
    let rule = &matched.rule;

    if let Some(ref path) = rule.response_data {
        return tokio::fs::read(path).await.map(Bytes::from).map_err(|e| {
            warn!("Failed to read responseData {}: {}", path.display(), e);
            text_response(StatusCode::INTERNAL_SERVER_ERROR, MISCONFIGURED_BODY)
        });
    }

    match rule.response_body {
        Some(ref body) => body.render().map(Bytes::from).map_err(|e| {
            warn!("Failed to serialize responseBody of rule {}: {}", matched.id, e);
            text_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Unable to serialize responseBody",
            )
        }),
        None => Ok(Bytes::new()),
    }
}
