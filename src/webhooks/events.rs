//! GitHub webhook payload types.
//!
//! Each struct keeps only the fields the service reads; everything else in
//! GitHub's payload is ignored on deserialization. The types also serialize,
//! so a repository event can be journaled and replayed after a restart.
//!
//! # Event Types
//!
//! - `installation` - App installed, deleted, suspended or unsuspended
//! - `installation_repositories` - Repositories added to or removed from an installation
//! - `push` - Commits pushed to a ref
//! - `create` / `delete` - Branch or tag created or deleted
//! - `pull_request` - PR lifecycle and label changes
//! - `pull_request_review` - Review submitted, edited or dismissed
//! - `pull_request_review_comment` - Line comment created, edited or deleted
//! - `workflow_run` - Actions workflow run requested or completed

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{GithubRepoId, GithubUserId, InstallationId};

/// The `after` SHA GitHub sends when a push deletes a ref (tag removal or the
/// branch cleanup after a squash merge).
pub const NO_COMMIT: &str = "0000000000000000000000000000000000000000";

// ============================================================================
// Shared fragments
// ============================================================================

/// A user or organization account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: GithubUserId,
    pub login: String,
    /// `User` or `Organization`.
    #[serde(rename = "type", default)]
    pub account_type: String,
}

/// The `installation` object attached to repository events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallationRef {
    pub id: InstallationId,
}

/// The full `installation` object of installation events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallationInfo {
    pub id: InstallationId,
    pub account: Account,
}

/// Repository summary listed by installation events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartialRepository {
    pub id: GithubRepoId,
    pub name: String,
    pub full_name: String,
    #[serde(default)]
    pub private: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Repository {
    pub id: GithubRepoId,
    pub name: String,
    pub full_name: String,
    #[serde(default)]
    pub html_url: String,
    #[serde(default)]
    pub default_branch: String,
}

// ============================================================================
// installation / installation_repositories
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallationEvent {
    /// `created`, `deleted`, `suspend`, `unsuspend`, `new_permissions_accepted`.
    pub action: String,
    pub installation: InstallationInfo,
    #[serde(default)]
    pub repositories: Vec<PartialRepository>,
    pub sender: Account,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallationRepositoriesEvent {
    /// `added` or `removed`.
    pub action: String,
    pub installation: InstallationInfo,
    #[serde(default)]
    pub repository_selection: String,
    #[serde(default)]
    pub repositories_added: Vec<PartialRepository>,
    #[serde(default)]
    pub repositories_removed: Vec<PartialRepository>,
    pub sender: Account,
}

// ============================================================================
// push
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitAuthor {
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushCommit {
    pub id: String,
    pub message: String,
    #[serde(default)]
    pub url: String,
    pub timestamp: DateTime<Utc>,
    pub author: CommitAuthor,
    pub committer: CommitAuthor,
    #[serde(default)]
    pub added: Vec<String>,
    #[serde(default)]
    pub removed: Vec<String>,
    #[serde(default)]
    pub modified: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushEvent {
    #[serde(rename = "ref")]
    pub ref_name: String,
    pub before: String,
    pub after: String,
    #[serde(default)]
    pub commits: Vec<PushCommit>,
    pub repository: Repository,
    pub sender: Account,
    pub installation: InstallationRef,
}

impl PushEvent {
    /// Whether this push only deleted a ref and carries nothing to process.
    pub fn is_ref_deletion(&self) -> bool {
        self.after == NO_COMMIT
    }
}

// ============================================================================
// create / delete
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefEvent {
    #[serde(rename = "ref")]
    pub ref_name: String,
    /// `branch` or `tag`.
    pub ref_type: String,
    /// Only present on `create`.
    #[serde(default)]
    pub master_branch: Option<String>,
    pub repository: Repository,
    pub sender: Account,
    pub installation: InstallationRef,
}

// ============================================================================
// pull_request / pull_request_review / pull_request_review_comment
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchRef {
    #[serde(rename = "ref")]
    pub ref_name: String,
    pub sha: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequestBody {
    pub number: i64,
    pub title: String,
    #[serde(default)]
    pub body: Option<String>,
    pub state: String,
    #[serde(default)]
    pub merged: bool,
    #[serde(default)]
    pub merge_commit_sha: Option<String>,
    pub user: Account,
    pub head: BranchRef,
    pub base: BranchRef,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Label {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequestEvent {
    /// `opened`, `edited`, `synchronize`, `closed`, `reopened`, `labeled`, `unlabeled`, ...
    pub action: String,
    pub number: i64,
    pub pull_request: PullRequestBody,
    /// Present on `labeled` and `unlabeled`.
    #[serde(default)]
    pub label: Option<Label>,
    pub repository: Repository,
    pub sender: Account,
    pub installation: InstallationRef,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Review {
    pub id: i64,
    pub state: String,
    #[serde(default)]
    pub submitted_at: Option<DateTime<Utc>>,
    pub user: Account,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequestReviewEvent {
    /// `submitted`, `edited` or `dismissed`.
    pub action: String,
    pub review: Review,
    pub pull_request: PullRequestBody,
    pub repository: Repository,
    pub sender: Account,
    pub installation: InstallationRef,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewComment {
    pub id: i64,
    #[serde(default)]
    pub pull_request_review_id: Option<i64>,
    #[serde(default)]
    pub in_reply_to_id: Option<i64>,
    pub commit_id: String,
    pub path: String,
    #[serde(default)]
    pub position: Option<i64>,
    pub user: Account,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequestReviewCommentEvent {
    /// `created`, `edited` or `deleted`.
    pub action: String,
    pub comment: ReviewComment,
    pub pull_request: PullRequestBody,
    pub repository: Repository,
    pub sender: Account,
    pub installation: InstallationRef,
}

// ============================================================================
// workflow_run
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowRun {
    pub id: i64,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub head_branch: Option<String>,
    pub head_sha: String,
    pub status: String,
    #[serde(default)]
    pub conclusion: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowRunEvent {
    /// `requested`, `in_progress` or `completed`.
    pub action: String,
    pub workflow_run: WorkflowRun,
    pub repository: Repository,
    pub sender: Account,
    pub installation: InstallationRef,
}

// ============================================================================
// Classified events
// ============================================================================

/// A webhook event scoped to one repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "payload", rename_all = "snake_case")]
pub enum RepoEvent {
    Push(PushEvent),
    Create(RefEvent),
    Delete(RefEvent),
    PullRequest(PullRequestEvent),
    PullRequestReview(PullRequestReviewEvent),
    PullRequestReviewComment(PullRequestReviewCommentEvent),
    WorkflowRun(WorkflowRunEvent),
}

impl RepoEvent {
    pub fn installation_id(&self) -> InstallationId {
        match self {
            RepoEvent::Push(e) => e.installation.id,
            RepoEvent::Create(e) | RepoEvent::Delete(e) => e.installation.id,
            RepoEvent::PullRequest(e) => e.installation.id,
            RepoEvent::PullRequestReview(e) => e.installation.id,
            RepoEvent::PullRequestReviewComment(e) => e.installation.id,
            RepoEvent::WorkflowRun(e) => e.installation.id,
        }
    }

    pub fn repository(&self) -> &Repository {
        match self {
            RepoEvent::Push(e) => &e.repository,
            RepoEvent::Create(e) | RepoEvent::Delete(e) => &e.repository,
            RepoEvent::PullRequest(e) => &e.repository,
            RepoEvent::PullRequestReview(e) => &e.repository,
            RepoEvent::PullRequestReviewComment(e) => &e.repository,
            RepoEvent::WorkflowRun(e) => &e.repository,
        }
    }

    pub fn sender(&self) -> &Account {
        match self {
            RepoEvent::Push(e) => &e.sender,
            RepoEvent::Create(e) | RepoEvent::Delete(e) => &e.sender,
            RepoEvent::PullRequest(e) => &e.sender,
            RepoEvent::PullRequestReview(e) => &e.sender,
            RepoEvent::PullRequestReviewComment(e) => &e.sender,
            RepoEvent::WorkflowRun(e) => &e.sender,
        }
    }

    /// The `X-GitHub-Event` name this event was delivered under.
    pub fn event_name(&self) -> &'static str {
        match self {
            RepoEvent::Push(_) => "push",
            RepoEvent::Create(_) => "create",
            RepoEvent::Delete(_) => "delete",
            RepoEvent::PullRequest(_) => "pull_request",
            RepoEvent::PullRequestReview(_) => "pull_request_review",
            RepoEvent::PullRequestReviewComment(_) => "pull_request_review_comment",
            RepoEvent::WorkflowRun(_) => "workflow_run",
        }
    }
}

/// A parsed webhook delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GithubEvent {
    Installation(InstallationEvent),
    InstallationRepositories(InstallationRepositoriesEvent),
    Repo(RepoEvent),
}
