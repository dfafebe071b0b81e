//! The downstream repository controller: where normalized events are sent.
//!
//! The dispatcher is the only writer of this contract. What the controller
//! does with a signal is outside this crate; the binary ships a controller
//! that appends every signal to a JSON Lines journal for a consumer to tail.

use std::fmt;
use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::debug;

use crate::events::{Event, EventPayload};
use crate::store::{EventLog, LogError};
use crate::types::CoreRepoId;

/// Signal names understood by the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControllerSignal {
    CreateOrDelete,
    Push,
    PullRequest,
    PullRequestLabel,
    PullRequestReview,
    PullRequestComment,
}

impl ControllerSignal {
    pub fn as_str(&self) -> &'static str {
        match self {
            ControllerSignal::CreateOrDelete => "create_or_delete",
            ControllerSignal::Push => "push",
            ControllerSignal::PullRequest => "pull_request",
            ControllerSignal::PullRequestLabel => "pull_request_label",
            ControllerSignal::PullRequestReview => "pull_request_review",
            ControllerSignal::PullRequestComment => "pull_request_comment",
        }
    }
}

impl fmt::Display for ControllerSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("controller journal error: {0}")]
    Log(#[from] LogError),

    #[error("controller rejected signal: {0}")]
    Rejected(String),
}

#[async_trait]
pub trait RepoController: Send + Sync {
    /// Delivers `event` to the controller instance for repository `target`.
    async fn signal(
        &self,
        signal: ControllerSignal,
        target: CoreRepoId,
        event: &Event<EventPayload>,
    ) -> Result<(), ControllerError>;
}

/// One journaled controller signal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalRecord {
    pub signal: ControllerSignal,
    pub target: CoreRepoId,
    pub event: Event<EventPayload>,
}

/// A controller that appends each signal to a JSON Lines journal.
pub struct JournalController {
    log: Mutex<EventLog<SignalRecord>>,
}

impl JournalController {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, ControllerError> {
        let (log, records) = EventLog::<SignalRecord>::recover(path)?;
        debug!(existing = records.len(), "Opened controller journal");
        Ok(JournalController {
            log: Mutex::new(log),
        })
    }
}

#[async_trait]
impl RepoController for JournalController {
    async fn signal(
        &self,
        signal: ControllerSignal,
        target: CoreRepoId,
        event: &Event<EventPayload>,
    ) -> Result<(), ControllerError> {
        let mut log = self.log.lock().await;
        log.append(SignalRecord {
            signal,
            target,
            event: event.clone(),
        })?;
        Ok(())
    }
}
