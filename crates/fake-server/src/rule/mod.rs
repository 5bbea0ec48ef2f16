//! Response rules and the matching engine.
//!
//! This module provides:
//! - `RuleStore`: the shared rule registry with add / match / remove / flush
//! - `ResponseRuleBuilder`: normalization of loosely-typed input into rules
//! - `preload`: bulk loading of route files at startup
//!
//! ## Module Structure
//!
//! - `types`: rule model, matcher values, request descriptor, errors
//! - `predicates`: per-dimension match tests and nested field lookup
//! - `ranker`: ordering among rules that all match one request
//! - `builder`: `ResponseRuleBuilder`
//! - `store`: `RuleStore`
//! - `preload`: route file loading

mod builder;
mod predicates;
mod preload;
mod ranker;
mod store;
mod types;

#[cfg(test)]
mod tests;

pub use builder::ResponseRuleBuilder;
pub(crate) use builder::parse_object;
pub use predicates::{lookup_field, resolve_path};
pub use preload::{load_route_file, preload};
pub use ranker::{select_best, Specificity};
pub use store::RuleStore;
pub use types::{
    parse_query_string, stringify_value, FieldMatchers, MatchValue, PreloadError,
    RequestDescriptor, ResponseBody, ResponseRule, RouteFile, RouteMatching, RoutePattern,
    RouteRecord, RuleError, RuleSnapshot, CORRUPTED_BODY, DEFAULT_RESPONSE_CODE,
};
