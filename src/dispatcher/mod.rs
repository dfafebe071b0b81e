//! Repository event dispatch host.
//!
//! Each repository webhook becomes one run addressed by its dispatch key. A
//! key that was already accepted within the dedupe window, in this process or
//! a previous one, is not run again. Accepted runs are journaled under
//! `<state_dir>/repo_events.log` before they start, so runs interrupted by a
//! restart are picked up again by [`RepoEventDispatcher::resume_pending`].
//! Finished runs older than the window are forgotten, both in memory and in
//! the journal.

pub mod controller;
pub mod journal;
pub mod metadata;
pub mod normalize;
pub mod workflow;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{Mutex, RwLock, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, trace, warn};

use crate::store::fsync::ensure_dir;
use crate::store::{LogError, Store};
use crate::types::RunId;
use crate::webhooks::{DispatchKey, RepoEvent};

pub use controller::{
    ControllerError, ControllerSignal, JournalController, RepoController, SignalRecord,
};
pub use journal::DispatchJournal;
pub use metadata::{MetadataError, MetadataQuery, RepoEventError, RepoEventReason, collect_metadata};
pub use normalize::{Normalized, normalize};
pub use workflow::{DispatchOutcome, RepoEventWorkflow, WorkflowError};

#[derive(Debug, Error)]
pub enum DispatcherError {
    #[error("journal error: {0}")]
    Log(#[from] LogError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("dispatcher is shutting down")]
    ShuttingDown,
}

pub type Result<T> = std::result::Result<T, DispatcherError>;

/// One line of the dispatcher journal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DispatchLogEntry {
    Started {
        key: DispatchKey,
        run_id: RunId,
        event: RepoEvent,
    },
    Finished {
        key: DispatchKey,
        run_id: RunId,
        outcome: DispatchOutcome,
    },
}

/// How long a finished delivery key is remembered.
pub const DEFAULT_DEDUPE_WINDOW: Duration = Duration::from_secs(24 * 60 * 60);

/// Journal size that triggers the first compaction.
pub const DEFAULT_COMPACT_THRESHOLD: u64 = 8 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    pub state_dir: PathBuf,

    /// Time budget of each step of a run.
    pub activity_timeout: Duration,

    /// How long finished keys are kept for deduplication.
    pub dedupe_window: Duration,

    /// Journal size in bytes at which expired entries are compacted away.
    pub compact_threshold: u64,
}

impl DispatcherConfig {
    pub fn new(state_dir: impl Into<PathBuf>, activity_timeout: Duration) -> Self {
        DispatcherConfig {
            state_dir: state_dir.into(),
            activity_timeout,
            dedupe_window: DEFAULT_DEDUPE_WINDOW,
            compact_threshold: DEFAULT_COMPACT_THRESHOLD,
        }
    }

    pub fn with_dedupe_window(mut self, window: Duration) -> Self {
        self.dedupe_window = window;
        self
    }

    pub fn with_compact_threshold(mut self, bytes: u64) -> Self {
        self.compact_threshold = bytes;
        self
    }

    fn window(&self) -> TimeDelta {
        TimeDelta::from_std(self.dedupe_window).unwrap_or(TimeDelta::MAX)
    }

    fn journal_path(&self) -> PathBuf {
        self.state_dir.join("repo_events.log")
    }
}

/// A run's outcome and when it was journaled.
#[derive(Debug, Clone)]
struct Settled {
    outcome: DispatchOutcome,
    at: DateTime<Utc>,
}

struct DispatchHandle {
    run_id: RunId,
    task: Option<JoinHandle<()>>,
    cancel: CancellationToken,
    outcome: watch::Receiver<Option<Settled>>,
}

impl DispatchHandle {
    fn is_expired(&self, now: DateTime<Utc>, window: TimeDelta) -> bool {
        self.outcome
            .borrow()
            .as_ref()
            .is_some_and(|settled| {
                settled
                    .at
                    .checked_add_signed(window)
                    .is_some_and(|expiry| expiry <= now)
            })
    }
}

struct Pending {
    key: DispatchKey,
    run_id: RunId,
    event: RepoEvent,
}

pub struct RepoEventDispatcher {
    workflow: RepoEventWorkflow,
    window: TimeDelta,
    journal: Arc<Mutex<DispatchJournal>>,
    runs: RwLock<HashMap<DispatchKey, DispatchHandle>>,
    pending: Mutex<Vec<Pending>>,
    shutdown: CancellationToken,
}

impl RepoEventDispatcher {
    /// Opens the journal and restores the set of known keys. Runs that were
    /// started but never finished are held back until
    /// [`resume_pending`](Self::resume_pending).
    pub fn open(
        config: DispatcherConfig,
        store: Arc<dyn Store>,
        controller: Arc<dyn RepoController>,
    ) -> Result<Self> {
        Self::open_with_shutdown(config, store, controller, CancellationToken::new())
    }

    pub fn open_with_shutdown(
        config: DispatcherConfig,
        store: Arc<dyn Store>,
        controller: Arc<dyn RepoController>,
        shutdown: CancellationToken,
    ) -> Result<Self> {
        ensure_dir(&config.state_dir)?;
        let (journal, records) = DispatchJournal::open(
            config.journal_path(),
            config.window(),
            config.compact_threshold,
        )?;

        let mut started: Vec<Pending> = Vec::new();
        let mut finished: HashMap<DispatchKey, (RunId, Settled)> = HashMap::new();
        for record in records {
            match record.payload {
                DispatchLogEntry::Started { key, run_id, event } => {
                    started.push(Pending { key, run_id, event })
                }
                DispatchLogEntry::Finished {
                    key,
                    run_id,
                    outcome,
                } => {
                    let settled = Settled {
                        outcome,
                        at: record.ts,
                    };
                    finished.insert(key, (run_id, settled));
                }
            }
        }

        let mut runs = HashMap::new();
        for (key, (run_id, settled)) in finished {
            let (_, rx) = watch::channel(Some(settled));
            runs.insert(
                key,
                DispatchHandle {
                    run_id,
                    task: None,
                    cancel: CancellationToken::new(),
                    outcome: rx,
                },
            );
        }
        let pending: Vec<Pending> = started
            .into_iter()
            .filter(|p| !runs.contains_key(&p.key))
            .collect();

        info!(
            journal = %config.journal_path().display(),
            finished = runs.len(),
            pending = pending.len(),
            "Opened repository event dispatcher"
        );

        Ok(RepoEventDispatcher {
            workflow: RepoEventWorkflow::new(store, controller, config.activity_timeout),
            window: config.window(),
            journal: Arc::new(Mutex::new(journal)),
            runs: RwLock::new(runs),
            pending: Mutex::new(pending),
            shutdown,
        })
    }

    /// Starts a run for `event` unless `key` is already known. Either way the
    /// run id serving `key` is returned.
    #[instrument(skip(self, event), fields(dispatch_key = %key, event = event.event_name()))]
    pub async fn dispatch(&self, key: DispatchKey, event: RepoEvent) -> Result<RunId> {
        if self.shutdown.is_cancelled() {
            return Err(DispatcherError::ShuttingDown);
        }

        {
            let runs = self.runs.read().await;
            if let Some(handle) = runs.get(&key) {
                debug!(run_id = %handle.run_id, "Duplicate delivery, not dispatching");
                return Ok(handle.run_id);
            }
        }

        let mut runs = self.runs.write().await;
        self.prune(&mut runs);
        if let Some(handle) = runs.get(&key) {
            debug!(run_id = %handle.run_id, "Duplicate delivery, not dispatching");
            return Ok(handle.run_id);
        }

        let run_id = RunId::new();
        self.journal.lock().await.append(DispatchLogEntry::Started {
            key: key.clone(),
            run_id,
            event: event.clone(),
        })?;

        let handle = self.spawn_run(key.clone(), run_id, event);
        runs.insert(key, handle);
        Ok(run_id)
    }

    /// Forgets finished runs older than the dedupe window.
    fn prune(&self, runs: &mut HashMap<DispatchKey, DispatchHandle>) {
        let now = Utc::now();
        let before = runs.len();
        runs.retain(|_, handle| !handle.is_expired(now, self.window));
        let pruned = before - runs.len();
        if pruned > 0 {
            trace!(pruned, "Pruned expired dispatch keys");
        }
    }

    /// Restarts every run the journal shows as started but not finished.
    pub async fn resume_pending(&self) -> usize {
        let pending: Vec<Pending> = std::mem::take(&mut *self.pending.lock().await);
        let mut runs = self.runs.write().await;
        let mut resumed = 0;
        for Pending { key, run_id, event } in pending {
            if runs.contains_key(&key) {
                continue;
            }
            info!(dispatch_key = %key, run_id = %run_id, "Resuming repository event run");
            let handle = self.spawn_run(key.clone(), run_id, event);
            runs.insert(key, handle);
            resumed += 1;
        }
        resumed
    }

    fn spawn_run(&self, key: DispatchKey, run_id: RunId, event: RepoEvent) -> DispatchHandle {
        let (outcome_tx, outcome) = watch::channel(None);
        let cancel = self.shutdown.child_token();
        let cancel_for_task = cancel.clone();
        let workflow = self.workflow.clone();
        let journal = Arc::clone(&self.journal);

        let task = tokio::spawn(async move {
            let result = tokio::select! {
                biased;
                _ = cancel_for_task.cancelled() => {
                    debug!(dispatch_key = %key, "Repository event run cancelled");
                    return;
                }
                result = workflow.run(&event) => result,
            };

            let outcome = match result {
                Ok(outcome) => outcome,
                Err(e) => {
                    error!(dispatch_key = %key, run_id = %run_id, error = %e, "Repository event run failed");
                    DispatchOutcome::Failed {
                        error: e.to_string(),
                    }
                }
            };

            let entry = DispatchLogEntry::Finished {
                key: key.clone(),
                run_id,
                outcome: outcome.clone(),
            };
            if let Err(e) = journal.lock().await.append(entry) {
                warn!(dispatch_key = %key, error = %e, "Failed to journal run outcome");
            }
            debug!(dispatch_key = %key, outcome = outcome.name(), "Repository event run finished");
            outcome_tx.send_replace(Some(Settled {
                outcome,
                at: Utc::now(),
            }));
        });

        DispatchHandle {
            run_id,
            task: Some(task),
            cancel,
            outcome,
        }
    }

    /// Waits for the run serving `key` to finish. `None` if the key is
    /// unknown or the run was cancelled.
    pub async fn wait(&self, key: &DispatchKey) -> Option<DispatchOutcome> {
        let mut outcome = {
            let runs = self.runs.read().await;
            runs.get(key)?.outcome.clone()
        };
        let done = outcome.wait_for(Option::is_some).await.ok()?;
        done.as_ref().map(|settled| settled.outcome.clone())
    }

    pub async fn run_count(&self) -> usize {
        self.runs.read().await.len()
    }

    pub async fn is_known(&self, key: &DispatchKey) -> bool {
        self.runs.read().await.contains_key(key)
    }

    /// Cancels in-flight runs and waits for their tasks. Cancelled runs stay
    /// pending in the journal.
    pub async fn shutdown_all(&self) {
        info!("Shutting down repository event runs");
        self.shutdown.cancel();

        let handles: Vec<(DispatchKey, DispatchHandle)> = self.runs.write().await.drain().collect();
        for (key, handle) in handles {
            handle.cancel.cancel();
            if let Some(task) = handle.task
                && let Err(e) = task.await
            {
                error!(dispatch_key = %key, error = %e, "Run task panicked");
            }
        }
    }
}
