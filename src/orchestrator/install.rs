//! The installation run: a durable state machine fed by two signal sources.
//!
//! ```text
//!   webhook ──┐
//!             ├──► AwaitingSignals ──(both halves)──► Finalizing ──► Done
//!   request ──┘
//! ```
//!
//! A GitHub App installation is reported twice: once by the `installation`
//! webhook and once by the setup redirect carrying the authenticated user.
//! Either may arrive first. The run records each signal in its own log before
//! acting on it, so a restarted process rebuilds the run by replaying that log
//! and resumes a finalization that was interrupted.
//!
//! Finalization is idempotent: every write it makes is an upsert. A finished
//! `created` run ignores later signals. A finished status run (`deleted`,
//! `suspend`, `unsuspend`) applies each new webhook again, since the provider
//! may toggle an installation back and forth under the same key.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::store::{EventLog, LogError};
use crate::types::{GithubUserId, Installation, InstallationStatus, RunId, TeamId};
use crate::webhooks::DispatchKey;
use crate::webhooks::events::InstallationEvent;

use super::activities::{ActivityError, InstallActivities};
use super::signal::{CompleteInstallationRequest, InstallSignal, RunMessage, SELF_SUFFICIENT_ACTIONS};

#[derive(Debug, Error)]
pub enum InstallError {
    #[error("signal log error: {0}")]
    Log(#[from] LogError),

    #[error("activity failed: {0}")]
    Activity(#[from] ActivityError),

    #[error("both signals recorded but no webhook payload for {0}")]
    MissingWebhook(DispatchKey),
}

pub type Result<T> = std::result::Result<T, InstallError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    AwaitingSignals,
    Finalizing,
    Done,
}

/// Which halves of the installation have been reported.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallationWorkflowStatus {
    pub webhook_done: bool,
    pub request_done: bool,
}

impl InstallationWorkflowStatus {
    pub fn is_complete(&self) -> bool {
        self.webhook_done && self.request_done
    }
}

/// What finalization did. Recorded in the signal log.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalizeSummary {
    pub team_id: Option<TeamId>,
    pub status: Option<InstallationStatus>,
    pub repos_saved: usize,
    pub repos_failed: usize,
}

/// One line of a run's signal log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SignalLogEntry {
    Started { key: DispatchKey, run_id: RunId },
    WebhookReceived { event: InstallationEvent },
    RequestReceived { request: CompleteInstallationRequest },
    Finalized { summary: FinalizeSummary },
}

pub struct InstallRun {
    key: DispatchKey,
    run_id: RunId,
    state: RunState,
    status: InstallationWorkflowStatus,
    webhook: Option<InstallationEvent>,
    request: Option<CompleteInstallationRequest>,
    log: EventLog<SignalLogEntry>,
    activities: InstallActivities,
    state_tx: watch::Sender<RunState>,
}

impl InstallRun {
    /// Opens the run for `key`, replaying its signal log if one exists.
    pub fn open(
        key: DispatchKey,
        log_path: impl AsRef<Path>,
        activities: InstallActivities,
    ) -> Result<Self> {
        let (log, records) = EventLog::<SignalLogEntry>::recover(log_path)?;
        let (state_tx, _) = watch::channel(RunState::AwaitingSignals);

        let mut run = InstallRun {
            key,
            run_id: RunId::nil(),
            state: RunState::AwaitingSignals,
            status: InstallationWorkflowStatus::default(),
            webhook: None,
            request: None,
            log,
            activities,
            state_tx,
        };

        let replayed = records.len();
        for record in records {
            match record.payload {
                SignalLogEntry::Started { run_id, .. } => run.run_id = run_id,
                SignalLogEntry::WebhookReceived { event } => {
                    let signal = InstallSignal::Webhook(event);
                    if run.reopens(&signal) {
                        run.set_state(RunState::AwaitingSignals);
                    }
                    run.apply(signal);
                }
                SignalLogEntry::RequestReceived { request } => {
                    run.apply(InstallSignal::Request(request))
                }
                SignalLogEntry::Finalized { .. } => run.set_state(RunState::Done),
            }
        }

        if run.run_id.is_nil() {
            run.run_id = RunId::new();
            run.log.append(SignalLogEntry::Started {
                key: run.key.clone(),
                run_id: run.run_id,
            })?;
        } else {
            debug!(dispatch_key = %run.key, run_id = %run.run_id, replayed, state = ?run.state, "Rebuilt installation run");
        }

        Ok(run)
    }

    pub fn key(&self) -> &DispatchKey {
        &self.key
    }

    pub fn run_id(&self) -> RunId {
        self.run_id
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn status(&self) -> InstallationWorkflowStatus {
        self.status
    }

    /// A receiver that observes every state change of this run.
    pub fn subscribe(&self) -> watch::Receiver<RunState> {
        self.state_tx.subscribe()
    }

    fn set_state(&mut self, state: RunState) {
        self.state = state;
        self.state_tx.send_replace(state);
    }

    /// Whether `signal` starts another round on a finished run.
    fn reopens(&self, signal: &InstallSignal) -> bool {
        self.state == RunState::Done && signal.is_status_change()
    }

    /// Records a signal in memory. The caller has already logged it.
    fn apply(&mut self, signal: InstallSignal) {
        match signal {
            InstallSignal::Webhook(event) => {
                self.status.webhook_done = true;
                if SELF_SUFFICIENT_ACTIONS.contains(&event.action.as_str()) {
                    debug!(dispatch_key = %self.key, action = %event.action, "Webhook needs no completion request");
                    self.status.request_done = true;
                }
                self.webhook = Some(event);
            }
            InstallSignal::Request(request) => {
                self.status.request_done = true;
                self.request = Some(request);
            }
        }
    }

    /// Logs and applies one signal, then advances the run as far as it can go.
    #[instrument(skip(self, signal), fields(dispatch_key = %self.key, signal = signal.name()))]
    pub async fn handle(&mut self, signal: InstallSignal) -> Result<RunState> {
        let reopens = self.reopens(&signal);
        if self.state == RunState::Done && !reopens {
            info!(run_id = %self.run_id, "Installation already finalized, ignoring signal");
            return Ok(self.state);
        }

        let entry = match &signal {
            InstallSignal::Webhook(event) => SignalLogEntry::WebhookReceived {
                event: event.clone(),
            },
            InstallSignal::Request(request) => SignalLogEntry::RequestReceived {
                request: request.clone(),
            },
        };
        self.log.append(entry)?;
        if reopens {
            info!(run_id = %self.run_id, "Applying repeated status change");
            self.set_state(RunState::AwaitingSignals);
        }
        self.apply(signal);

        self.advance().await
    }

    /// Finalizes the run once both halves are in. A no-op otherwise.
    pub async fn advance(&mut self) -> Result<RunState> {
        if self.state != RunState::AwaitingSignals || !self.status.is_complete() {
            return Ok(self.state);
        }

        self.set_state(RunState::Finalizing);
        info!(dispatch_key = %self.key, run_id = %self.run_id, "All signals received, finalizing installation");

        let summary = match self.finalize().await {
            Ok(summary) => summary,
            Err(e) => {
                // Leave the run resumable: a rebuilt run finalizes again.
                self.set_state(RunState::AwaitingSignals);
                return Err(e);
            }
        };

        self.log.append(SignalLogEntry::Finalized {
            summary: summary.clone(),
        })?;
        self.set_state(RunState::Done);
        info!(
            dispatch_key = %self.key,
            team_id = ?summary.team_id,
            repos_saved = summary.repos_saved,
            repos_failed = summary.repos_failed,
            "Installation complete"
        );
        Ok(self.state)
    }

    async fn finalize(&self) -> Result<FinalizeSummary> {
        let webhook = self
            .webhook
            .as_ref()
            .ok_or_else(|| InstallError::MissingWebhook(self.key.clone()))?;
        let installation_id = webhook.installation.id;
        let status = InstallationStatus::from_action(&webhook.action);

        let request = match &self.request {
            Some(request) if !SELF_SUFFICIENT_ACTIONS.contains(&webhook.action.as_str()) => request,
            _ => {
                // Lifecycle change of an existing installation; nothing is cascaded.
                info!(installation_id = %installation_id, action = %webhook.action, "Installation lifecycle event");
                if let Some(status) = status {
                    match self
                        .activities
                        .update_installation_status(installation_id, status)
                        .await
                    {
                        Ok(true) => {}
                        Ok(false) => {
                            warn!(installation_id = %installation_id, "No installation record to update")
                        }
                        Err(e) => {
                            error!(installation_id = %installation_id, error = %e, "Failed to update installation status")
                        }
                    }
                }
                return Ok(FinalizeSummary {
                    status,
                    ..FinalizeSummary::default()
                });
            }
        };

        let account = &webhook.installation.account;
        let resolved = self
            .activities
            .resolve_team(request.user_id, &account.login)
            .await?;
        let team_id = resolved.team.id;

        let installation = Installation {
            team_id,
            installation_id,
            installation_login: account.login.clone(),
            installation_type: account.account_type.clone(),
            sender_id: webhook.sender.id,
            sender_login: webhook.sender.login.clone(),
            status: status.unwrap_or(InstallationStatus::Created),
        };
        if let Err(e) = self.activities.upsert_installation(&installation).await {
            error!(installation_id = %installation_id, error = %e, "Failed to save installation");
        }

        let github_user: (GithubUserId, String) = (webhook.sender.id, webhook.sender.login.clone());
        if let Err(e) = self
            .activities
            .upsert_team_admin(team_id, resolved.user.id, Some(github_user))
            .await
        {
            error!(team_id = %team_id, user_id = %resolved.user.id, error = %e, "Failed to save team membership");
        }

        let mut summary = FinalizeSummary {
            team_id: Some(team_id),
            status: Some(installation.status),
            ..FinalizeSummary::default()
        };

        if webhook.action != "created" {
            return Ok(summary);
        }

        let mut saves = JoinSet::new();
        for repository in webhook.repositories.iter().cloned() {
            let activities = self.activities.clone();
            saves.spawn(async move {
                let result = activities.add_repo(team_id, installation_id, &repository).await;
                (repository, result)
            });
        }

        while let Some(joined) = saves.join_next().await {
            match joined {
                Ok((repository, Ok(_))) => {
                    debug!(repo = %repository.full_name, "Repository saved");
                    summary.repos_saved += 1;
                }
                Ok((repository, Err(e))) => {
                    error!(repo = %repository.full_name, error = %e, "Failed to save repository");
                    summary.repos_failed += 1;
                }
                Err(e) => {
                    error!(error = %e, "Repository save task panicked");
                    summary.repos_failed += 1;
                }
            }
        }

        Ok(summary)
    }

    /// Drives the run from its channel until it is `Done` or shut down.
    ///
    /// A failed finalization leaves the run waiting: the next signal (say, a
    /// corrected completion request) retries it. Log write failures end the run.
    /// A finished run gives up its task; a later signal for the key rebuilds it
    /// from the log.
    pub(crate) async fn run(
        mut self,
        mut rx: mpsc::Receiver<RunMessage>,
        shutdown: CancellationToken,
    ) -> Result<()> {
        // Resume a finalization interrupted by a restart.
        let resumed = self.advance().await;
        self.settle(resumed)?;

        loop {
            tokio::select! {
                biased;

                msg = rx.recv() => {
                    match msg {
                        Some(RunMessage::Signal(signal)) => {
                            let outcome = self.handle(signal).await;
                            self.settle(outcome)?;
                            if self.state == RunState::Done {
                                return self.release(rx).await;
                            }
                        }
                        Some(RunMessage::Shutdown) | None => break,
                    }
                }

                _ = shutdown.cancelled() => {
                    debug!(dispatch_key = %self.key, "Shutdown signal received, stopping run");
                    break;
                }
            }
        }

        Ok(())
    }

    /// Closes the channel and handles whatever was already queued before the
    /// task exits. Senders racing with the close see a closed channel.
    async fn release(&mut self, mut rx: mpsc::Receiver<RunMessage>) -> Result<()> {
        rx.close();
        while let Some(msg) = rx.recv().await {
            match msg {
                RunMessage::Signal(signal) => {
                    let outcome = self.handle(signal).await;
                    self.settle(outcome)?;
                }
                RunMessage::Shutdown => break,
            }
        }
        debug!(dispatch_key = %self.key, run_id = %self.run_id, "Installation run finished, releasing task");
        Ok(())
    }

    fn settle(&self, outcome: Result<RunState>) -> Result<()> {
        match outcome {
            Ok(_) => Ok(()),
            Err(InstallError::Log(e)) => Err(InstallError::Log(e)),
            Err(e) => {
                error!(dispatch_key = %self.key, error = %e, "Finalization failed, waiting for further signals");
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{Filter, MemoryStore, StoreExt};
    use crate::types::{GithubRepoId, InstallationId, Repo, Team, TeamUser, User, UserId};
    use crate::webhooks::events::{Account, InstallationInfo, PartialRepository};
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::tempdir;

    // ─── Fixtures ───

    fn webhook(action: &str, repos: &[(i64, &str)]) -> InstallationEvent {
        InstallationEvent {
            action: action.to_string(),
            installation: InstallationInfo {
                id: InstallationId(42),
                account: Account {
                    id: GithubUserId(9),
                    login: "acme".to_string(),
                    account_type: "Organization".to_string(),
                },
            },
            repositories: repos
                .iter()
                .map(|(id, name)| PartialRepository {
                    id: GithubRepoId(*id),
                    name: name.to_string(),
                    full_name: format!("acme/{name}"),
                    private: false,
                })
                .collect(),
            sender: Account {
                id: GithubUserId(1001),
                login: "alice".to_string(),
                account_type: "User".to_string(),
            },
        }
    }

    fn request(user_id: UserId) -> CompleteInstallationRequest {
        CompleteInstallationRequest {
            installation_id: InstallationId(42),
            setup_action: "install".to_string(),
            user_id,
        }
    }

    struct Harness {
        store: Arc<MemoryStore>,
        activities: InstallActivities,
        dir: tempfile::TempDir,
        user: User,
    }

    impl Harness {
        async fn new() -> Self {
            let store = Arc::new(MemoryStore::new());
            let user = User {
                id: UserId::new(),
                team_id: None,
                email: "alice@example.com".to_string(),
                name: "Alice".to_string(),
            };
            store.save(&user).await.unwrap();
            Harness {
                activities: InstallActivities::new(store.clone(), Duration::from_secs(5)),
                store,
                dir: tempdir().unwrap(),
                user,
            }
        }

        fn open(&self) -> InstallRun {
            let key = DispatchKey::installation(InstallationId(42), "created");
            InstallRun::open(key, self.dir.path().join("run.log"), self.activities.clone()).unwrap()
        }

        /// Opens the run for one status action, each with its own log.
        fn open_status(&self, action: &str) -> InstallRun {
            let key = DispatchKey::installation(InstallationId(42), action);
            let path = self.dir.path().join(format!("{action}.log"));
            InstallRun::open(key, path, self.activities.clone()).unwrap()
        }

        async fn seed_installation(&self, status: InstallationStatus) {
            self.activities
                .upsert_installation(&Installation {
                    team_id: TeamId::new(),
                    installation_id: InstallationId(42),
                    installation_login: "acme".to_string(),
                    installation_type: "Organization".to_string(),
                    sender_id: GithubUserId(1001),
                    sender_login: "alice".to_string(),
                    status,
                })
                .await
                .unwrap();
        }

        async fn installation_status(&self) -> InstallationStatus {
            let installation: Installation = self.store.get("42").await.unwrap().unwrap();
            installation.status
        }
    }

    // ─── Signal ordering ───

    #[tokio::test]
    async fn webhook_then_request_finalizes() {
        let h = Harness::new().await;
        let mut run = h.open();

        let state = run.handle(InstallSignal::Webhook(webhook("created", &[(7, "api")]))).await.unwrap();
        assert_eq!(state, RunState::AwaitingSignals);
        assert_eq!(
            run.status(),
            InstallationWorkflowStatus { webhook_done: true, request_done: false }
        );

        let state = run.handle(InstallSignal::Request(request(h.user.id))).await.unwrap();
        assert_eq!(state, RunState::Done);
    }

    #[tokio::test]
    async fn request_then_webhook_finalizes() {
        let h = Harness::new().await;
        let mut run = h.open();

        let state = run.handle(InstallSignal::Request(request(h.user.id))).await.unwrap();
        assert_eq!(state, RunState::AwaitingSignals);

        let state = run.handle(InstallSignal::Webhook(webhook("created", &[(7, "api")]))).await.unwrap();
        assert_eq!(state, RunState::Done);
    }

    /// Webhook `created` for 42/acme with one repository, plus a request from
    /// a user without a team.
    #[tokio::test]
    async fn created_installation_builds_team_installation_and_repos() {
        let h = Harness::new().await;
        let mut run = h.open();
        run.handle(InstallSignal::Webhook(webhook("created", &[(7, "api")]))).await.unwrap();
        run.handle(InstallSignal::Request(request(h.user.id))).await.unwrap();

        let teams: Vec<Team> = h.store.filter(&Filter::new()).await.unwrap();
        assert_eq!(teams.len(), 1);
        assert_eq!(teams[0].name, "acme");

        let user: User = h.store.get(&h.user.id.to_string()).await.unwrap().unwrap();
        assert_eq!(user.team_id, Some(teams[0].id));

        let installation: Installation = h.store.get("42").await.unwrap().unwrap();
        assert_eq!(installation.team_id, teams[0].id);
        assert_eq!(installation.status, InstallationStatus::Created);
        assert_eq!(installation.installation_login, "acme");
        assert_eq!(installation.sender_login, "alice");

        let repos: Vec<Repo> = h.store.filter(&Filter::new()).await.unwrap();
        assert_eq!(repos.len(), 1);
        assert_eq!(repos[0].github_id, GithubRepoId(7));
        assert_eq!(repos[0].name, "api");

        let membership: TeamUser = h
            .store
            .get(&format!("{}/{}", teams[0].id, h.user.id))
            .await
            .unwrap()
            .unwrap();
        assert!(membership.is_admin);
        assert_eq!(membership.provider_user_id, Some(GithubUserId(1001)));
    }

    #[tokio::test]
    async fn fan_out_saves_every_repository() {
        let h = Harness::new().await;
        let mut run = h.open();
        let repos = [(1, "a"), (2, "b"), (3, "c"), (4, "d"), (5, "e")];
        run.handle(InstallSignal::Webhook(webhook("created", &repos))).await.unwrap();
        run.handle(InstallSignal::Request(request(h.user.id))).await.unwrap();
        assert_eq!(h.store.len("repos").await, 5);
        assert_eq!(h.store.len("core_repos").await, 5);
    }

    // ─── Lifecycle actions ───

    #[tokio::test]
    async fn deleted_webhook_finalizes_without_request() {
        let h = Harness::new().await;
        h.activities
            .upsert_installation(&Installation {
                team_id: TeamId::new(),
                installation_id: InstallationId(42),
                installation_login: "acme".to_string(),
                installation_type: "Organization".to_string(),
                sender_id: GithubUserId(1001),
                sender_login: "alice".to_string(),
                status: InstallationStatus::Created,
            })
            .await
            .unwrap();

        let dir = tempdir().unwrap();
        let key = DispatchKey::installation(InstallationId(42), "deleted");
        let mut run = InstallRun::open(key, dir.path().join("run.log"), h.activities.clone()).unwrap();

        let state = run.handle(InstallSignal::Webhook(webhook("deleted", &[]))).await.unwrap();
        assert_eq!(state, RunState::Done);

        let installation: Installation = h.store.get("42").await.unwrap().unwrap();
        assert_eq!(installation.status, InstallationStatus::Deleted);
        assert_eq!(h.store.len("teams").await, 0);
    }

    #[tokio::test]
    async fn suspend_of_unknown_installation_still_completes() {
        let h = Harness::new().await;
        let mut run = h.open();
        let state = run.handle(InstallSignal::Webhook(webhook("suspend", &[]))).await.unwrap();
        assert_eq!(state, RunState::Done);
        assert_eq!(h.store.len("installations").await, 0);
    }

    #[tokio::test]
    async fn signals_after_done_are_ignored() {
        let h = Harness::new().await;
        let mut run = h.open();
        run.handle(InstallSignal::Webhook(webhook("created", &[(7, "api")]))).await.unwrap();
        run.handle(InstallSignal::Request(request(h.user.id))).await.unwrap();

        // A redelivered webhook with more repositories changes nothing.
        let state = run
            .handle(InstallSignal::Webhook(webhook("created", &[(7, "api"), (8, "web")])))
            .await
            .unwrap();
        assert_eq!(state, RunState::Done);
        assert_eq!(h.store.len("repos").await, 1);
        assert_eq!(h.store.len("teams").await, 1);
    }

    #[tokio::test]
    async fn suspend_after_unsuspend_is_applied_again() {
        let h = Harness::new().await;
        h.seed_installation(InstallationStatus::Created).await;
        let mut suspend = h.open_status("suspend");
        let mut unsuspend = h.open_status("unsuspend");

        let state = suspend.handle(InstallSignal::Webhook(webhook("suspend", &[]))).await.unwrap();
        assert_eq!(state, RunState::Done);
        assert_eq!(h.installation_status().await, InstallationStatus::Suspend);

        let state = unsuspend.handle(InstallSignal::Webhook(webhook("unsuspend", &[]))).await.unwrap();
        assert_eq!(state, RunState::Done);
        assert_eq!(h.installation_status().await, InstallationStatus::Unsuspend);

        let state = suspend.handle(InstallSignal::Webhook(webhook("suspend", &[]))).await.unwrap();
        assert_eq!(state, RunState::Done);
        assert_eq!(h.installation_status().await, InstallationStatus::Suspend);
    }

    #[tokio::test]
    async fn requests_do_not_reopen_a_finished_status_run() {
        let h = Harness::new().await;
        h.seed_installation(InstallationStatus::Created).await;
        let mut run = h.open_status("deleted");
        run.handle(InstallSignal::Webhook(webhook("deleted", &[]))).await.unwrap();
        h.seed_installation(InstallationStatus::Created).await;

        let state = run.handle(InstallSignal::Request(request(h.user.id))).await.unwrap();
        assert_eq!(state, RunState::Done);
        assert_eq!(h.installation_status().await, InstallationStatus::Created);
    }

    // ─── Failure ───

    #[tokio::test]
    async fn unknown_user_fails_and_stays_resumable() {
        let h = Harness::new().await;
        let mut run = h.open();
        run.handle(InstallSignal::Webhook(webhook("created", &[(7, "api")]))).await.unwrap();
        let err = run
            .handle(InstallSignal::Request(request(UserId::new())))
            .await
            .unwrap_err();
        assert!(matches!(err, InstallError::Activity(ActivityError::UserNotFound(_))));
        assert_eq!(run.state(), RunState::AwaitingSignals);
        assert_eq!(h.store.len("installations").await, 0);
    }

    // ─── Recovery ───

    #[tokio::test]
    async fn reopened_run_keeps_its_id_and_signals() {
        let h = Harness::new().await;
        let run_id = {
            let mut run = h.open();
            run.handle(InstallSignal::Webhook(webhook("created", &[(7, "api")]))).await.unwrap();
            run.run_id()
        };

        let mut run = h.open();
        assert_eq!(run.run_id(), run_id);
        assert!(run.status().webhook_done);
        assert!(!run.status().request_done);

        let state = run.handle(InstallSignal::Request(request(h.user.id))).await.unwrap();
        assert_eq!(state, RunState::Done);
        assert_eq!(h.store.len("repos").await, 1);
    }

    #[tokio::test]
    async fn reopened_finished_run_is_done() {
        let h = Harness::new().await;
        {
            let mut run = h.open();
            run.handle(InstallSignal::Webhook(webhook("created", &[(7, "api")]))).await.unwrap();
            run.handle(InstallSignal::Request(request(h.user.id))).await.unwrap();
        }
        let run = h.open();
        assert_eq!(run.state(), RunState::Done);
    }

    #[tokio::test]
    async fn interrupted_finalization_resumes_on_advance() {
        let h = Harness::new().await;
        let path = h.dir.path().join("run.log");
        {
            // Both signals logged, no Finalized entry: a crash mid-finalize.
            let mut log = EventLog::<SignalLogEntry>::open(&path).unwrap();
            log.append(SignalLogEntry::Started {
                key: DispatchKey::installation(InstallationId(42), "created"),
                run_id: RunId::new(),
            })
            .unwrap();
            log.append(SignalLogEntry::WebhookReceived { event: webhook("created", &[(7, "api")]) })
                .unwrap();
            log.append(SignalLogEntry::RequestReceived { request: request(h.user.id) })
                .unwrap();
        }

        let mut run = h.open();
        assert_eq!(run.state(), RunState::AwaitingSignals);
        assert!(run.status().is_complete());
        assert_eq!(run.advance().await.unwrap(), RunState::Done);
        assert_eq!(h.store.len("repos").await, 1);
    }

    #[tokio::test]
    async fn repeated_status_change_without_finalized_resumes() {
        let h = Harness::new().await;
        h.seed_installation(InstallationStatus::Created).await;
        {
            let mut run = h.open_status("suspend");
            run.handle(InstallSignal::Webhook(webhook("suspend", &[]))).await.unwrap();
        }
        {
            // A second suspend was logged but the process died before
            // finalizing it.
            let (mut log, records) =
                EventLog::<SignalLogEntry>::recover(h.dir.path().join("suspend.log")).unwrap();
            assert!(matches!(records.last().unwrap().payload, SignalLogEntry::Finalized { .. }));
            log.append(SignalLogEntry::WebhookReceived { event: webhook("suspend", &[]) })
                .unwrap();
        }
        h.seed_installation(InstallationStatus::Unsuspend).await;

        let mut run = h.open_status("suspend");
        assert_eq!(run.state(), RunState::AwaitingSignals);
        assert_eq!(run.advance().await.unwrap(), RunState::Done);
        assert_eq!(h.installation_status().await, InstallationStatus::Suspend);
    }

    #[tokio::test]
    async fn subscribers_observe_completion() {
        let h = Harness::new().await;
        let mut run = h.open();
        let mut states = run.subscribe();
        run.handle(InstallSignal::Webhook(webhook("deleted", &[]))).await.unwrap();
        states.wait_for(|s| *s == RunState::Done).await.unwrap();
    }
}
