//! The per-event unit of work.
//!
//! One run resolves metadata in a child task, normalizes the payload, checks
//! the envelope, persists its flat record, and signals the controller. Gates
//! and unmapped actions end the run with an outcome instead of an error.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, instrument};

use crate::events::{CodecError, ValidationError, flatten};
use crate::store::{Store, StoreError, StoreExt};
use crate::types::{CoreRepoId, EventId};
use crate::webhooks::RepoEvent;

use super::controller::{ControllerError, ControllerSignal, RepoController};
use super::metadata::{MetadataError, MetadataQuery, RepoEventReason, collect_metadata};
use super::normalize::{Normalized, normalize};

#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("metadata error: {0}")]
    Metadata(MetadataError),

    #[error("{activity} timed out after {after:?}")]
    Timeout {
        activity: &'static str,
        after: Duration,
    },

    #[error("metadata task failed: {0}")]
    Child(#[from] tokio::task::JoinError),

    #[error("normalized event is invalid: {0}")]
    Validation(#[from] ValidationError),

    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("controller error: {0}")]
    Controller(#[from] ControllerError),
}

pub type Result<T> = std::result::Result<T, WorkflowError>;

/// How a repository event run ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DispatchOutcome {
    Forwarded {
        signal: ControllerSignal,
        target: CoreRepoId,
        event_id: EventId,
    },
    Skipped {
        reason: String,
    },
    Rejected {
        reason: RepoEventReason,
    },
    /// The run errored; the error text is kept for operators.
    Failed {
        error: String,
    },
}

impl DispatchOutcome {
    pub fn name(&self) -> &'static str {
        match self {
            DispatchOutcome::Forwarded { .. } => "forwarded",
            DispatchOutcome::Skipped { .. } => "skipped",
            DispatchOutcome::Rejected { .. } => "rejected",
            DispatchOutcome::Failed { .. } => "failed",
        }
    }
}

#[derive(Clone)]
pub struct RepoEventWorkflow {
    store: Arc<dyn Store>,
    controller: Arc<dyn RepoController>,
    timeout: Duration,
}

impl RepoEventWorkflow {
    pub fn new(store: Arc<dyn Store>, controller: Arc<dyn RepoController>, timeout: Duration) -> Self {
        RepoEventWorkflow {
            store,
            controller,
            timeout,
        }
    }

    async fn timed<T, F>(&self, activity: &'static str, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        tokio::time::timeout(self.timeout, fut)
            .await
            .map_err(|_| WorkflowError::Timeout {
                activity,
                after: self.timeout,
            })?
    }

    #[instrument(skip_all, fields(event = raw.event_name(), installation_id = %raw.installation_id()))]
    pub async fn run(&self, raw: &RepoEvent) -> Result<DispatchOutcome> {
        let query = MetadataQuery::from_event(raw);

        let store = Arc::clone(&self.store);
        let child = tokio::spawn(async move { collect_metadata(store.as_ref(), &query).await });
        let collected = self
            .timed("collect_metadata", async { Ok(child.await?) })
            .await?;

        let meta = match collected {
            Ok(meta) => meta,
            Err(MetadataError::Rejected(rejection)) => {
                info!(%rejection, "Repository event rejected");
                return Ok(DispatchOutcome::Rejected {
                    reason: rejection.reason,
                });
            }
            Err(e) => return Err(WorkflowError::Metadata(e)),
        };

        let (signal, event) = match normalize(raw, &meta) {
            Normalized::Forward { signal, event } => (signal, event),
            Normalized::Skip { reason } => {
                debug!(%reason, "Repository event skipped");
                return Ok(DispatchOutcome::Skipped { reason });
            }
        };

        event.validate()?;
        let flat = flatten(&event)?;
        self.timed("save_event", async { Ok(self.store.save(&flat).await?) })
            .await?;

        let target = meta.core_repo.id;
        self.timed("signal_controller", async {
            Ok(self.controller.signal(signal, target, &event).await?)
        })
        .await?;

        info!(%signal, %target, event_id = %event.id, "Forwarded repository event");
        Ok(DispatchOutcome::Forwarded {
            signal,
            target,
            event_id: event.id,
        })
    }
}
