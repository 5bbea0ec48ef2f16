//! Programmable HTTP stub server.
//!
//! Rules registered at runtime (or preloaded from route files) describe which
//! requests they answer and the canned response to send back. Incoming
//! requests are matched against every rule and answered by the most specific
//! one.

pub mod config;
pub mod rule;
pub mod server;

pub use config::ServerConfig;
pub use rule::{RequestDescriptor, ResponseRule, ResponseRuleBuilder, RuleSnapshot, RuleStore};
pub use server::FakeServer;
