//! Resolves the repository, controller and sender behind a repository event.
//!
//! A repository event is only worth forwarding when it belongs to exactly one
//! tracked repository that is active and has early warning switched on. Every
//! other outcome is a [`RepoEventError`] naming the reason; these are gates,
//! not faults in GitHub's data, and they stop the event before normalization.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::store::{Filter, Store, StoreError, StoreExt};
use crate::types::{
    CoreRepo, GithubRepoId, GithubUserId, InstallationId, Repo, RepoEventMetadata, RepoRowId,
    TeamUser,
};
use crate::webhooks::RepoEvent;

/// Why a repository event was not dispatched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RepoEventReason {
    RepoNotFound,
    MultipleReposAssociated,
    RepoNotActive,
    RepoHasNoEarlyWarning,
}

impl RepoEventReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RepoEventReason::RepoNotFound => "repo_not_found",
            RepoEventReason::MultipleReposAssociated => "multiple_repos_associated",
            RepoEventReason::RepoNotActive => "repo_not_active",
            RepoEventReason::RepoHasNoEarlyWarning => "repo_has_no_early_warning",
        }
    }
}

impl fmt::Display for RepoEventReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error(
    "repo_event_error: installation_id: {installation_id}, github_repo_id: {repo_id}, repo_name: {repo_name}, details: {reason}"
)]
pub struct RepoEventError {
    pub installation_id: InstallationId,
    pub repo_id: GithubRepoId,
    pub repo_name: String,
    pub reason: RepoEventReason,
}

#[derive(Debug, Error)]
pub enum MetadataError {
    #[error(transparent)]
    Rejected(#[from] RepoEventError),

    /// The repository is tracked but its controller-side twin is missing.
    #[error("no controller repository for repo row {0}")]
    CoreRepoMissing(RepoRowId),

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

/// The identifying dimensions of a repository event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataQuery {
    pub repo_id: GithubRepoId,
    pub repo_name: String,
    pub installation_id: InstallationId,
    pub sender_id: GithubUserId,
}

impl MetadataQuery {
    pub fn from_event(event: &RepoEvent) -> Self {
        let repository = event.repository();
        MetadataQuery {
            repo_id: repository.id,
            repo_name: repository.name.clone(),
            installation_id: event.installation_id(),
            sender_id: event.sender().id,
        }
    }

    fn reject(&self, reason: RepoEventReason) -> RepoEventError {
        RepoEventError {
            installation_id: self.installation_id,
            repo_id: self.repo_id,
            repo_name: self.repo_name.clone(),
            reason,
        }
    }
}

/// Looks up everything needed to dispatch the event described by `query`.
pub async fn collect_metadata(
    store: &dyn Store,
    query: &MetadataQuery,
) -> Result<RepoEventMetadata, MetadataError> {
    let mut repos: Vec<Repo> = store
        .filter(
            &Filter::new()
                .eq("installation_id", query.installation_id)
                .eq("github_id", query.repo_id),
        )
        .await?;

    let repo = match repos.len() {
        0 => return Err(query.reject(RepoEventReason::RepoNotFound).into()),
        1 => repos.remove(0),
        _ => return Err(query.reject(RepoEventReason::MultipleReposAssociated).into()),
    };

    if !repo.is_active {
        return Err(query.reject(RepoEventReason::RepoNotActive).into());
    }
    if !repo.has_early_warning {
        return Err(query.reject(RepoEventReason::RepoHasNoEarlyWarning).into());
    }

    let core_repo: CoreRepo = store
        .find(&Filter::new().eq("hook_id", repo.id))
        .await?
        .ok_or(MetadataError::CoreRepoMissing(repo.id))?;

    let user: Option<TeamUser> = store
        .find(
            &Filter::new()
                .eq("team_id", repo.team_id)
                .eq("provider_user_id", query.sender_id),
        )
        .await?;
    if user.is_none() {
        warn!(
            installation_id = %query.installation_id,
            repo = %repo.full_name,
            sender_id = %query.sender_id,
            "Sender is not a team member, event will carry no user"
        );
    }

    debug!(repo = %repo.full_name, core_repo_id = %core_repo.id, "Collected repository metadata");
    Ok(RepoEventMetadata {
        repo,
        core_repo,
        user,
    })
}
