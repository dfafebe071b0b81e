//! Units of work an installation run dispatches against the store.
//!
//! Every activity runs under the configured time budget. The store offers no
//! cross-row transactions, so each activity is written as a sequence of
//! single-row upserts that converges when re-run.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, error, info};

use crate::store::{Filter, Store, StoreError, StoreExt};
use crate::types::{
    CoreRepo, CoreRepoId, GithubUserId, Installation, InstallationId, InstallationStatus, Repo,
    RepoRowId, Team, TeamId, TeamUser, User, UserId,
};
use crate::webhooks::events::{InstallationRepositoriesEvent, PartialRepository};

/// Default branch recorded for repositories learned from installation payloads,
/// which do not carry one.
const DEFAULT_BRANCH: &str = "main";

#[derive(Debug, Error)]
pub enum ActivityError {
    #[error("activity {activity} timed out after {after:?}")]
    Timeout {
        activity: &'static str,
        after: Duration,
    },

    #[error("user not found: {0}")]
    UserNotFound(UserId),

    #[error("team not found: {0}")]
    TeamNotFound(TeamId),

    #[error("installation not found: {0}")]
    InstallationNotFound(InstallationId),

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

pub type Result<T> = std::result::Result<T, ActivityError>;

/// Outcome of an `installation_repositories` delivery.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RepositorySync {
    pub added: usize,
    pub removed: usize,
    pub failed: usize,
}

/// The user completing an installation, and the team the installation joins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedTeam {
    pub user: User,
    pub team: Team,
    /// Whether the team was created by this resolution.
    pub created: bool,
}

#[derive(Clone)]
pub struct InstallActivities {
    store: Arc<dyn Store>,
    timeout: Duration,
}

impl InstallActivities {
    pub fn new(store: Arc<dyn Store>, timeout: Duration) -> Self {
        InstallActivities { store, timeout }
    }

    async fn timed<T>(
        &self,
        activity: &'static str,
        work: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        tokio::time::timeout(self.timeout, work)
            .await
            .map_err(|_| ActivityError::Timeout {
                activity,
                after: self.timeout,
            })?
    }

    /// Fetches the user's team, or creates one named `team_name` and assigns it.
    pub async fn resolve_team(&self, user_id: UserId, team_name: &str) -> Result<ResolvedTeam> {
        self.timed("resolve_team", async {
            let mut user: User = self
                .store
                .get(&user_id.to_string())
                .await?
                .ok_or(ActivityError::UserNotFound(user_id))?;

            if let Some(team_id) = user.team_id {
                let team: Team = self
                    .store
                    .get(&team_id.to_string())
                    .await?
                    .ok_or(ActivityError::TeamNotFound(team_id))?;
                return Ok(ResolvedTeam {
                    user,
                    team,
                    created: false,
                });
            }

            let team = Team::new(team_name);
            self.store.save(&team).await?;
            user.team_id = Some(team.id);
            self.store.save(&user).await?;
            info!(user_id = %user.id, team_id = %team.id, team = %team.name, "Created team for user");

            Ok(ResolvedTeam {
                user,
                team,
                created: true,
            })
        })
        .await
    }

    pub async fn upsert_installation(&self, installation: &Installation) -> Result<()> {
        self.timed("upsert_installation", async {
            self.store.save(installation).await?;
            Ok(())
        })
        .await
    }

    /// Updates the status of an existing installation. Returns `false` when
    /// the installation is unknown.
    pub async fn update_installation_status(
        &self,
        installation_id: InstallationId,
        status: InstallationStatus,
    ) -> Result<bool> {
        self.timed("update_installation_status", async {
            let Some(mut installation) = self
                .store
                .get::<Installation>(&installation_id.to_string())
                .await?
            else {
                return Ok(false);
            };
            installation.status = status;
            self.store.save(&installation).await?;
            Ok(true)
        })
        .await
    }

    /// Makes `user` an active admin of `team`, linked to their GitHub account.
    pub async fn upsert_team_admin(
        &self,
        team_id: TeamId,
        user_id: UserId,
        github_user: Option<(GithubUserId, String)>,
    ) -> Result<TeamUser> {
        self.timed("upsert_team_admin", async {
            let key = format!("{team_id}/{user_id}");
            let existing: Option<TeamUser> = self.store.get(&key).await?;
            let (provider_user_id, provider_login) = match github_user {
                Some((id, login)) => (Some(id), Some(login)),
                None => existing
                    .as_ref()
                    .map(|m| (m.provider_user_id, m.provider_login.clone()))
                    .unwrap_or_default(),
            };
            let membership = TeamUser {
                team_id,
                user_id,
                is_admin: true,
                is_active: true,
                provider_user_id,
                provider_login,
            };
            self.store.save(&membership).await?;
            Ok(membership)
        })
        .await
    }

    /// Adds a repository to the installation, or re-activates it if it is
    /// already known. The controller-side repository is kept in step.
    pub async fn add_repo(
        &self,
        team_id: TeamId,
        installation_id: InstallationId,
        repository: &PartialRepository,
    ) -> Result<Repo> {
        self.timed("add_repo", async {
            let url = format!("https://github.com/{}", repository.full_name);

            if let Some(mut repo) = self.find_repo(installation_id, repository).await? {
                repo.is_active = true;
                self.store.save(&repo).await?;
                match self.find_core_repo(repo.id).await? {
                    Some(mut core) => {
                        core.is_active = true;
                        self.store.save(&core).await?;
                    }
                    None => self.save_core_repo(&repo).await?,
                }
                debug!(installation_id = %installation_id, repo = %repo.full_name, "Re-activated repository");
                return Ok(repo);
            }

            let repo = Repo {
                id: RepoRowId::new(),
                github_id: repository.id,
                installation_id,
                team_id,
                name: repository.name.clone(),
                full_name: repository.full_name.clone(),
                url,
                default_branch: DEFAULT_BRANCH.to_string(),
                is_active: true,
                has_early_warning: false,
            };
            self.store.save(&repo).await?;
            self.save_core_repo(&repo).await?;
            debug!(installation_id = %installation_id, repo = %repo.full_name, "Added repository");
            Ok(repo)
        })
        .await
    }

    /// Marks a repository and its controller-side twin inactive. Unknown
    /// repositories are ignored.
    pub async fn suspend_repo(
        &self,
        installation_id: InstallationId,
        repository: &PartialRepository,
    ) -> Result<bool> {
        self.timed("suspend_repo", async {
            let Some(mut repo) = self.find_repo(installation_id, repository).await? else {
                return Ok(false);
            };
            repo.is_active = false;
            self.store.save(&repo).await?;
            if let Some(mut core) = self.find_core_repo(repo.id).await? {
                core.is_active = false;
                self.store.save(&core).await?;
            }
            debug!(installation_id = %installation_id, repo = %repo.full_name, "Suspended repository");
            Ok(true)
        })
        .await
    }

    /// Applies an `installation_repositories` delivery to the installation's
    /// team. Individual repository failures are logged and counted.
    pub async fn sync_repositories(
        &self,
        event: &InstallationRepositoriesEvent,
    ) -> Result<RepositorySync> {
        let installation_id = event.installation.id;
        let installation: Installation = self
            .timed("get_installation", async {
                Ok(self.store.get::<Installation>(&installation_id.to_string()).await?)
            })
            .await?
            .ok_or(ActivityError::InstallationNotFound(installation_id))?;

        let mut sync = RepositorySync::default();
        for repository in &event.repositories_added {
            match self
                .add_repo(installation.team_id, installation_id, repository)
                .await
            {
                Ok(_) => sync.added += 1,
                Err(e) => {
                    error!(installation_id = %installation_id, repo = %repository.full_name, error = %e, "Failed to add repository");
                    sync.failed += 1;
                }
            }
        }
        for repository in &event.repositories_removed {
            match self.suspend_repo(installation_id, repository).await {
                Ok(_) => sync.removed += 1,
                Err(e) => {
                    error!(installation_id = %installation_id, repo = %repository.full_name, error = %e, "Failed to suspend repository");
                    sync.failed += 1;
                }
            }
        }

        info!(
            installation_id = %installation_id,
            action = %event.action,
            added = sync.added,
            removed = sync.removed,
            failed = sync.failed,
            "Synced installation repositories"
        );
        Ok(sync)
    }

    async fn find_repo(
        &self,
        installation_id: InstallationId,
        repository: &PartialRepository,
    ) -> Result<Option<Repo>> {
        Ok(self
            .store
            .find(
                &Filter::new()
                    .eq("installation_id", installation_id)
                    .eq("github_id", repository.id),
            )
            .await?)
    }

    async fn find_core_repo(&self, hook_id: RepoRowId) -> Result<Option<CoreRepo>> {
        Ok(self
            .store
            .find(&Filter::new().eq("hook_id", hook_id))
            .await?)
    }

    async fn save_core_repo(&self, repo: &Repo) -> Result<()> {
        let core = CoreRepo {
            id: CoreRepoId::new(),
            team_id: repo.team_id,
            hook_id: repo.id,
            name: repo.name.clone(),
            url: repo.url.clone(),
            default_branch: repo.default_branch.clone(),
            is_active: true,
        };
        self.store.save(&core).await?;
        Ok(())
    }
}
