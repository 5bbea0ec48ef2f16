//! HTTP front end for the rule store.
//!
//! This module provides:
//! - Control endpoints: `POST /add`, `DELETE /delOne`, `DELETE /flush`, `GET /getAll`
//! - Request dispatch: every other request is matched against the store and
//!   answered with the selected rule's canned response, or `404 no match!`

mod dispatch;
mod handlers;
mod response;
mod router;
#[allow(clippy::module_inception)]
mod server;
mod types;

pub use dispatch::{render_rule, MISCONFIGURED_BODY, NO_MATCH_BODY};
pub use response::ResponseBuilder;
pub use server::FakeServer;
