//! Persisted records the service reads and writes through the [`Store`](crate::store::Store).
//!
//! Each record implements [`Entity`], which names its table and derives its
//! primary key. Lookups by secondary attributes go through
//! [`Filter`](crate::store::Filter) on the serialized field names used here.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::ids::{CoreRepoId, GithubRepoId, GithubUserId, InstallationId, RepoRowId, TeamId, UserId};
use crate::store::Entity;

/// An internal team. Every installation belongs to exactly one team.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Team {
    pub id: TeamId,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

impl Team {
    pub fn new(name: impl Into<String>) -> Self {
        Team {
            id: TeamId::new(),
            name: name.into(),
            created_at: Utc::now(),
        }
    }
}

impl Entity for Team {
    const TABLE: &'static str = "teams";

    fn key(&self) -> String {
        self.id.to_string()
    }
}

/// An internal user. `team_id` is `None` until the user completes an installation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub team_id: Option<TeamId>,
    pub email: String,
    pub name: String,
}

impl Entity for User {
    const TABLE: &'static str = "users";

    fn key(&self) -> String {
        self.id.to_string()
    }
}

/// Membership of a user in a team, with the provider account that maps to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamUser {
    pub team_id: TeamId,
    pub user_id: UserId,
    pub is_admin: bool,
    pub is_active: bool,
    /// The GitHub account id of this user, used to attribute webhook senders.
    pub provider_user_id: Option<GithubUserId>,
    pub provider_login: Option<String>,
}

impl Entity for TeamUser {
    const TABLE: &'static str = "team_users";

    fn key(&self) -> String {
        format!("{}/{}", self.team_id, self.user_id)
    }
}

/// Lifecycle status of a GitHub App installation, mirroring the provider's actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstallationStatus {
    Created,
    Deleted,
    Suspend,
    Unsuspend,
}

impl InstallationStatus {
    /// Maps a webhook `action` string to a status. Unknown actions have no status.
    pub fn from_action(action: &str) -> Option<Self> {
        match action {
            "created" => Some(InstallationStatus::Created),
            "deleted" => Some(InstallationStatus::Deleted),
            "suspend" => Some(InstallationStatus::Suspend),
            "unsuspend" => Some(InstallationStatus::Unsuspend),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            InstallationStatus::Created => "created",
            InstallationStatus::Deleted => "deleted",
            InstallationStatus::Suspend => "suspend",
            InstallationStatus::Unsuspend => "unsuspend",
        }
    }
}

impl fmt::Display for InstallationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Join of a GitHub App installation to an internal team.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Installation {
    pub team_id: TeamId,
    pub installation_id: InstallationId,
    pub installation_login: String,
    pub installation_type: String,
    pub sender_id: GithubUserId,
    pub sender_login: String,
    pub status: InstallationStatus,
}

impl Entity for Installation {
    const TABLE: &'static str = "installations";

    fn key(&self) -> String {
        self.installation_id.to_string()
    }
}

/// A GitHub repository tracked under an installation.
///
/// `is_active` and `has_early_warning` gate whether events for the repository
/// are dispatched at all.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Repo {
    pub id: RepoRowId,
    pub github_id: GithubRepoId,
    pub installation_id: InstallationId,
    pub team_id: TeamId,
    pub name: String,
    pub full_name: String,
    pub url: String,
    pub default_branch: String,
    pub is_active: bool,
    pub has_early_warning: bool,
}

impl Entity for Repo {
    const TABLE: &'static str = "repos";

    fn key(&self) -> String {
        self.id.to_string()
    }
}

/// The downstream controller's own view of a repository.
///
/// `hook_id` points back at the provider-specific [`Repo`] row it was created from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoreRepo {
    pub id: CoreRepoId,
    pub team_id: TeamId,
    pub hook_id: RepoRowId,
    pub name: String,
    pub url: String,
    pub default_branch: String,
    pub is_active: bool,
}

impl Entity for CoreRepo {
    const TABLE: &'static str = "core_repos";

    fn key(&self) -> String {
        self.id.to_string()
    }
}

/// Repository context resolved for one repository event. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoEventMetadata {
    pub repo: Repo,
    pub core_repo: CoreRepo,
    pub user: Option<TeamUser>,
}
