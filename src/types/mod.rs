//! Identifiers and persisted records shared across the service.

pub mod entities;
pub mod ids;

pub use entities::{
    CoreRepo, Installation, InstallationStatus, Repo, RepoEventMetadata, Team, TeamUser, User,
};
pub use ids::{
    CoreRepoId, DeliveryId, EventId, GithubRepoId, GithubUserId, InstallationId, RepoRowId, RunId,
    TeamId, UserId,
};
