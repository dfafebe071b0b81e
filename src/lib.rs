//! Repo Events - turns GitHub App webhooks into a typed, durable repository event stream.
//!
//! Installation lifecycle deliveries drive a per-installation orchestration
//! that provisions the team and its repositories. Repository deliveries are
//! gated against the tracked repositories, normalized into canonical events,
//! persisted, and signalled to the downstream repository controller.

pub mod config;
pub mod dispatcher;
pub mod events;
pub mod orchestrator;
pub mod server;
pub mod store;
pub mod types;
pub mod webhooks;
