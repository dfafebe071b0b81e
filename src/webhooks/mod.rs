//! Webhook handling for GitHub events.
//!
//! This module provides:
//! - Signature verification for webhook payloads (HMAC-SHA256)
//! - Typed payloads and classification by the `X-GitHub-Event` header
//! - Dispatch keys identifying the unit of work a delivery routes to

pub mod dispatch_key;
pub mod events;
pub mod parser;
pub mod signature;

pub use dispatch_key::DispatchKey;
pub use events::{GithubEvent, NO_COMMIT, RepoEvent};
pub use parser::{ParseError, WebhookKind, parse_webhook};
pub use signature::{
    SignatureError, WebhookSecret, format_signature_header, parse_signature_header,
};
