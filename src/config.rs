//! Service configuration from environment variables.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::webhooks::WebhookSecret;

pub const ENV_WEBHOOK_SECRET: &str = "REPO_EVENTS_WEBHOOK_SECRET";
pub const ENV_LISTEN_ADDR: &str = "REPO_EVENTS_LISTEN_ADDR";
pub const ENV_STATE_DIR: &str = "REPO_EVENTS_STATE_DIR";
pub const ENV_ACTIVITY_TIMEOUT_SECS: &str = "REPO_EVENTS_ACTIVITY_TIMEOUT_SECS";
pub const ENV_DEDUPE_WINDOW_HOURS: &str = "REPO_EVENTS_DEDUPE_WINDOW_HOURS";

const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:3000";
const DEFAULT_STATE_DIR: &str = "./state";
const DEFAULT_ACTIVITY_TIMEOUT_SECS: u64 = 60;
const DEFAULT_DEDUPE_WINDOW_HOURS: u64 = 24;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),

    #[error("invalid value for {name}: {value:?}")]
    Invalid { name: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub webhook_secret: WebhookSecret,
    pub listen_addr: SocketAddr,
    /// Holds the store journal, controller journal and orchestration logs.
    pub state_dir: PathBuf,
    pub activity_timeout: Duration,
    /// How long finished delivery keys are remembered.
    pub dedupe_window: Duration,
}

/// Reads a positive integer, falling back to `default` when unset.
fn positive(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    default: u64,
) -> Result<u64, ConfigError> {
    match lookup(name) {
        Some(raw) => match raw.parse::<u64>() {
            Ok(n) if n > 0 => Ok(n),
            _ => Err(ConfigError::Invalid { name, value: raw }),
        },
        None => Ok(default),
    }
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds the configuration from any variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let webhook_secret = lookup(ENV_WEBHOOK_SECRET)
            .filter(|s| !s.is_empty())
            .ok_or(ConfigError::Missing(ENV_WEBHOOK_SECRET))?;

        let listen_addr = lookup(ENV_LISTEN_ADDR).unwrap_or_else(|| DEFAULT_LISTEN_ADDR.to_string());
        let listen_addr = listen_addr.parse::<SocketAddr>().map_err(|_| ConfigError::Invalid {
            name: ENV_LISTEN_ADDR,
            value: listen_addr.clone(),
        })?;

        let state_dir = lookup(ENV_STATE_DIR).unwrap_or_else(|| DEFAULT_STATE_DIR.to_string());

        let activity_timeout =
            positive(&lookup, ENV_ACTIVITY_TIMEOUT_SECS, DEFAULT_ACTIVITY_TIMEOUT_SECS)?;
        let dedupe_window_hours =
            positive(&lookup, ENV_DEDUPE_WINDOW_HOURS, DEFAULT_DEDUPE_WINDOW_HOURS)?;

        Ok(ServiceConfig {
            webhook_secret: WebhookSecret::new(webhook_secret),
            listen_addr,
            state_dir: PathBuf::from(state_dir),
            activity_timeout: Duration::from_secs(activity_timeout),
            dedupe_window: Duration::from_secs(dedupe_window_hours * 60 * 60),
        })
    }
}
