//! Installation orchestration host.
//!
//! The orchestrator owns one task per installation dispatch key. A signal for
//! a key that has no task starts one (signal-with-start); later signals for
//! the same key are delivered to the running task in arrival order. Each task
//! keeps a signal log under `<state_dir>/installations/`, so a key that is
//! signalled again after a restart picks up the run where it stopped.
//!
//! A run that reaches `Done` releases its task and channel. The handle is
//! pruned on a later insert, and the next signal for the key rebuilds the run
//! from its log.
//!
//! `installation_repositories` deliveries are one-shot units of work keyed by
//! delivery, so a redelivery within the dedupe window returns the original run
//! instead of re-running.

pub mod activities;
pub mod install;
pub mod signal;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use thiserror::Error;
use tokio::sync::{RwLock, mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, trace};

use crate::store::Store;
use crate::store::fsync::ensure_dir;
use crate::types::RunId;
use crate::webhooks::DispatchKey;
use crate::webhooks::events::InstallationRepositoriesEvent;

pub use activities::{ActivityError, InstallActivities, RepositorySync, ResolvedTeam};
pub use install::{InstallError, InstallRun, InstallationWorkflowStatus, RunState, SignalLogEntry};
pub use signal::{CompleteInstallationRequest, InstallSignal};

use signal::RunMessage;

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("installation run error: {0}")]
    Install(#[from] InstallError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to send signal to run {0}: channel closed")]
    ChannelClosed(DispatchKey),

    #[error("orchestrator is shutting down")]
    ShuttingDown,
}

pub type Result<T> = std::result::Result<T, OrchestratorError>;

/// Channel buffer size for run signals.
const RUN_CHANNEL_BUFFER: usize = 100;

/// Attempts to hand a signal to a run that may be releasing its task.
const SEND_ATTEMPTS: usize = 3;

/// How long a finished `installation_repositories` key is remembered.
pub const DEFAULT_DEDUPE_WINDOW: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Base directory; signal logs live under `<state_dir>/installations/`.
    pub state_dir: PathBuf,

    /// Time budget of every dispatched activity.
    pub activity_timeout: Duration,

    /// How long finished one-shot keys are kept for deduplication.
    pub dedupe_window: Duration,
}

impl OrchestratorConfig {
    pub fn new(state_dir: impl Into<PathBuf>, activity_timeout: Duration) -> Self {
        OrchestratorConfig {
            state_dir: state_dir.into(),
            activity_timeout,
            dedupe_window: DEFAULT_DEDUPE_WINDOW,
        }
    }

    pub fn with_dedupe_window(mut self, window: Duration) -> Self {
        self.dedupe_window = window;
        self
    }

    fn runs_dir(&self) -> PathBuf {
        self.state_dir.join("installations")
    }

    fn log_path(&self, key: &DispatchKey) -> PathBuf {
        self.runs_dir().join(format!("{}.log", key.file_stem()))
    }
}

struct RunHandle {
    run_id: RunId,
    tx: Option<mpsc::Sender<RunMessage>>,
    task: JoinHandle<()>,
    cancel: CancellationToken,
    state: watch::Receiver<RunState>,
    started_at: DateTime<Utc>,
}

impl RunHandle {
    fn is_closed(&self) -> bool {
        self.tx.as_ref().is_none_or(|tx| tx.is_closed())
    }

    /// Installation runs can go once their task is gone, since their log
    /// rebuilds them. One-shot syncs are kept for the dedupe window.
    fn is_prunable(&self, now: DateTime<Utc>, window: TimeDelta) -> bool {
        if !self.task.is_finished() {
            return false;
        }
        match self.tx {
            Some(_) => true,
            None => self
                .started_at
                .checked_add_signed(window)
                .is_some_and(|expiry| expiry <= now),
        }
    }
}

pub struct Orchestrator {
    config: OrchestratorConfig,
    activities: InstallActivities,
    runs: RwLock<HashMap<DispatchKey, RunHandle>>,
    shutdown: CancellationToken,
}

impl Orchestrator {
    pub fn new(config: OrchestratorConfig, store: Arc<dyn Store>) -> Self {
        Self::new_with_shutdown(config, store, CancellationToken::new())
    }

    pub fn new_with_shutdown(
        config: OrchestratorConfig,
        store: Arc<dyn Store>,
        shutdown: CancellationToken,
    ) -> Self {
        info!(state_dir = %config.state_dir.display(), "Creating installation orchestrator");
        Orchestrator {
            activities: InstallActivities::new(store, config.activity_timeout),
            config,
            runs: RwLock::new(HashMap::new()),
            shutdown,
        }
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Delivers `signal` to the run for `key`, starting the run first if needed.
    #[instrument(skip(self, signal), fields(dispatch_key = %key, signal = signal.name()))]
    pub async fn signal_with_start(&self, key: &DispatchKey, signal: InstallSignal) -> Result<RunId> {
        if self.shutdown.is_cancelled() {
            return Err(OrchestratorError::ShuttingDown);
        }

        let mut signal = signal;
        for _ in 0..SEND_ATTEMPTS {
            let (run_id, tx) = self.get_or_spawn_run(key).await?;
            match tx.send(RunMessage::Signal(signal)).await {
                Ok(()) => {
                    debug!(run_id = %run_id, "Signal delivered");
                    return Ok(run_id);
                }
                Err(mpsc::error::SendError(RunMessage::Signal(returned))) => {
                    debug!(run_id = %run_id, "Run released its task, rebuilding");
                    signal = returned;
                }
                Err(_) => break,
            }
        }
        Err(OrchestratorError::ChannelClosed(key.clone()))
    }

    fn prune(&self, runs: &mut HashMap<DispatchKey, RunHandle>) {
        let window = TimeDelta::from_std(self.config.dedupe_window).unwrap_or(TimeDelta::MAX);
        let now = Utc::now();
        let before = runs.len();
        runs.retain(|_, handle| !handle.is_prunable(now, window));
        let pruned = before - runs.len();
        if pruned > 0 {
            trace!(pruned, "Pruned finished runs");
        }
    }

    async fn get_or_spawn_run(&self, key: &DispatchKey) -> Result<(RunId, mpsc::Sender<RunMessage>)> {
        {
            let runs = self.runs.read().await;
            if let Some(handle) = runs.get(key)
                && let Some(tx) = handle.tx.as_ref().filter(|tx| !tx.is_closed())
            {
                return Ok((handle.run_id, tx.clone()));
            }
        }

        let mut runs = self.runs.write().await;

        // Double-check after acquiring write lock. A run whose task exited
        // (finished or failed finalization) is rebuilt from its log once the
        // old task has drained its channel.
        if let Some(handle) = runs.get(key)
            && let Some(tx) = handle.tx.as_ref().filter(|tx| !tx.is_closed())
        {
            return Ok((handle.run_id, tx.clone()));
        }
        if let Some(previous) = runs.remove(key) {
            debug!(dispatch_key = %key, "Previous run task exited, rebuilding from log");
            if let Err(e) = previous.task.await {
                error!(dispatch_key = %key, error = %e, "Run task panicked");
            }
        }

        self.prune(&mut runs);
        ensure_dir(&self.config.runs_dir())?;
        let run = InstallRun::open(
            key.clone(),
            self.config.log_path(key),
            self.activities.clone(),
        )?;
        let run_id = run.run_id();
        let state = run.subscribe();

        let (tx, rx) = mpsc::channel(RUN_CHANNEL_BUFFER);
        let cancel = self.shutdown.child_token();
        let cancel_for_handle = cancel.clone();

        let key_for_task = key.clone();
        let task = tokio::spawn(async move {
            if let Err(e) = run.run(rx, cancel).await {
                error!(dispatch_key = %key_for_task, error = %e, "Installation run failed");
            }
        });

        info!(dispatch_key = %key, run_id = %run_id, "Started installation run");
        runs.insert(
            key.clone(),
            RunHandle {
                run_id,
                tx: Some(tx.clone()),
                task,
                cancel: cancel_for_handle,
                state,
                started_at: Utc::now(),
            },
        );

        Ok((run_id, tx))
    }

    /// Applies an `installation_repositories` delivery once per key.
    #[instrument(skip(self, event), fields(dispatch_key = %key, installation_id = %event.installation.id))]
    pub async fn sync_repositories(
        &self,
        key: &DispatchKey,
        event: InstallationRepositoriesEvent,
    ) -> Result<RunId> {
        if self.shutdown.is_cancelled() {
            return Err(OrchestratorError::ShuttingDown);
        }

        let mut runs = self.runs.write().await;
        self.prune(&mut runs);
        if let Some(handle) = runs.get(key) {
            debug!(run_id = %handle.run_id, "Duplicate delivery, returning existing run");
            return Ok(handle.run_id);
        }

        let run_id = RunId::new();
        let (state_tx, state) = watch::channel(RunState::Finalizing);
        let activities = self.activities.clone();
        let cancel = self.shutdown.child_token();
        let cancel_for_task = cancel.clone();
        let key_for_task = key.clone();

        let task = tokio::spawn(async move {
            tokio::select! {
                _ = cancel_for_task.cancelled() => {
                    debug!(dispatch_key = %key_for_task, "Repository sync cancelled");
                }
                result = activities.sync_repositories(&event) => {
                    if let Err(e) = result {
                        error!(dispatch_key = %key_for_task, error = %e, "Repository sync failed");
                    }
                }
            }
            state_tx.send_replace(RunState::Done);
        });

        runs.insert(
            key.clone(),
            RunHandle {
                run_id,
                tx: None,
                task,
                cancel,
                state,
                started_at: Utc::now(),
            },
        );
        Ok(run_id)
    }

    /// Current state of the run for `key`, if this process knows it.
    pub async fn run_state(&self, key: &DispatchKey) -> Option<RunState> {
        let runs = self.runs.read().await;
        runs.get(key).map(|handle| *handle.state.borrow())
    }

    /// Waits until the run for `key` reaches `Done`. Returns `false` if the key
    /// is unknown or the run stopped first.
    pub async fn wait_until_done(&self, key: &DispatchKey) -> bool {
        let mut state = {
            let runs = self.runs.read().await;
            match runs.get(key) {
                Some(handle) => handle.state.clone(),
                None => return false,
            }
        };
        state.wait_for(|s| *s == RunState::Done).await.is_ok()
    }

    pub async fn run_count(&self) -> usize {
        self.runs.read().await.len()
    }

    /// Whether a live task serves `key`.
    pub async fn has_live_run(&self, key: &DispatchKey) -> bool {
        self.runs
            .read()
            .await
            .get(key)
            .is_some_and(|handle| !handle.is_closed())
    }

    /// Stops every run and waits for the tasks to exit. Signals already
    /// queued are logged first, so they survive for the next process.
    pub async fn shutdown_all(&self) {
        info!("Shutting down installation runs");
        self.shutdown.cancel();

        let handles: Vec<(DispatchKey, RunHandle)> = self.runs.write().await.drain().collect();
        for (key, handle) in handles {
            trace!(dispatch_key = %key, "Sending shutdown to run");
            if let Some(tx) = &handle.tx {
                let _ = tx.send(RunMessage::Shutdown).await;
            }
            handle.cancel.cancel();
            if let Err(e) = handle.task.await {
                error!(dispatch_key = %key, error = %e, "Run task panicked");
            }
        }
    }
}
