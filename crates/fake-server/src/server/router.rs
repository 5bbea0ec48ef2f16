//! Route dispatch logic for the fake server.
//!
//! Control endpoints are matched by exact method and path; every other
//! request is resolved against the rule store.

use super::dispatch::handle_match;
use super::handlers;
use crate::rule::RuleStore;
use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::{Method, Request, Response};
use std::convert::Infallible;
use std::sync::Arc;
use tracing::debug;

/// Control endpoints that manage the rule store
#[derive(Debug, PartialEq, Eq)]
enum ControlRoute {
    /// POST /add
    Add,
    /// DELETE /delOne
    DelOne,
    /// DELETE /flush
    Flush,
    /// GET /getAll
    GetAll,
}

impl ControlRoute {
    fn parse(method: &Method, path: &str) -> Option<Self> {
        match (method, path) {
            (&Method::POST, "/add") => Some(ControlRoute::Add),
            (&Method::DELETE, "/delOne") => Some(ControlRoute::DelOne),
            (&Method::DELETE, "/flush") => Some(ControlRoute::Flush),
            (&Method::GET, "/getAll") => Some(ControlRoute::GetAll),
            _ => None,
        }
    }
}

/// Main request router
pub async fn route_request(
    req: Request<Incoming>,
    store: Arc<RuleStore>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let route = ControlRoute::parse(req.method(), req.uri().path());
    debug!("{} {} -> {:?}", req.method(), req.uri(), route);

    let response = match route {
        Some(ControlRoute::Add) => handlers::handle_add(req, store).await,
        Some(ControlRoute::DelOne) => handlers::handle_del_one(req, store).await,
        Some(ControlRoute::Flush) => handlers::handle_flush(store).await,
        Some(ControlRoute::GetAll) => handlers::handle_get_all(store).await,
        None => handle_match(req, store).await,
    };
    Ok(response)
}
