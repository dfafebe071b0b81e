//! Payload variants carried by the canonical envelope.
//!
//! Every payload struct implements [`Payload`], which binds it to the scopes it
//! may be stored under and the actions it may carry. The same table drives
//! validation, scope-directed decoding and the type check on deflate.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt::Debug;

use super::kinds::{Action, Scope};

/// Errors decoding a payload blob for a given scope.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("malformed event envelope: {0}")]
    Envelope(#[source] serde_json::Error),

    #[error("unsupported event scope: {0}")]
    UnsupportedScope(String),

    #[error("mismatch between event type and scope: {requested} and scope {scope}")]
    ScopeMismatch { requested: &'static str, scope: Scope },

    #[error("invalid {scope} payload: {source}")]
    Json {
        scope: Scope,
        #[source]
        source: serde_json::Error,
    },
}

/// A payload the envelope can carry.
pub trait Payload: Serialize + Clone + Debug + PartialEq + Send + Sync + 'static {
    /// Type name reported in mismatch errors.
    const NAME: &'static str;

    /// Scopes this type can be decoded from.
    const SCOPES: &'static [Scope];

    /// Actions this type may carry.
    const ACTIONS: &'static [Action];

    /// Scopes this particular value may carry. Differs from [`Payload::SCOPES`]
    /// only for the [`EventPayload`] sum type.
    fn scopes(&self) -> &'static [Scope] {
        Self::SCOPES
    }

    fn actions(&self) -> &'static [Action] {
        Self::ACTIONS
    }

    /// The scope a freshly built envelope gets for this value.
    fn default_scope(&self) -> Scope;

    /// Whether a record stored under `scope` can be decoded as this type.
    fn accepts(scope: Scope) -> bool {
        Self::SCOPES.contains(&scope)
    }

    /// Decodes a raw payload stored under `scope`.
    fn decode(scope: Scope, raw: Value) -> Result<Self, DecodeError>;
}

fn decode_as<T: DeserializeOwned>(
    name: &'static str,
    accepts: bool,
    scope: Scope,
    raw: Value,
) -> Result<T, DecodeError> {
    if !accepts {
        return Err(DecodeError::ScopeMismatch {
            requested: name,
            scope,
        });
    }
    serde_json::from_value(raw).map_err(|source| DecodeError::Json { scope, source })
}

// ─── Payload structs ───

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commit {
    pub sha: String,
    pub message: String,
    pub url: String,
    pub added: Vec<String>,
    pub removed: Vec<String>,
    pub modified: Vec<String>,
    pub author: String,
    pub committer: String,
    pub timestamp: DateTime<Utc>,
}

/// A branch or tag being created or deleted. `kind` is `"branch"` or `"tag"`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchOrTag {
    #[serde(rename = "ref")]
    pub ref_name: String,
    pub kind: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Push {
    #[serde(rename = "ref")]
    pub ref_name: String,
    pub before: String,
    pub after: String,
    pub repository: String,
    pub sender_id: i64,
    pub commits: Vec<Commit>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequest {
    pub number: i64,
    pub title: String,
    pub body: String,
    pub state: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merge_commit_sha: Option<String>,
    pub author_id: i64,
    pub head_branch: String,
    pub base_branch: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequestReview {
    pub id: i64,
    pub pull_request_number: i64,
    pub branch: String,
    pub state: String,
    pub author_id: i64,
    pub submitted_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequestLabel {
    pub name: String,
    pub pull_request_number: i64,
    pub branch: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequestComment {
    pub id: i64,
    pub pull_request_number: i64,
    pub branch: String,
    pub review_id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub in_reply_to: Option<i64>,
    pub commit_sha: String,
    pub path: String,
    pub position: i64,
    pub author_id: i64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequestThread {
    pub id: i64,
    pub pull_request_number: i64,
    pub comment_ids: Vec<i64>,
    pub timestamp: DateTime<Utc>,
}

/// Line statistics for a commit measured against a threshold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitDiff {
    pub added: i64,
    pub removed: i64,
    pub threshold: i64,
    pub delta: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeConflict {
    pub head_branch: String,
    pub head_commit: Commit,
    pub base_branch: String,
    pub base_commit: Commit,
    pub files: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinesExceed {
    pub branch: String,
    pub commit: Commit,
    pub diff: CommitDiff,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RebaseRequest {
    #[serde(rename = "ref")]
    pub ref_name: String,
    pub before: String,
    pub after: String,
    pub head_branch: String,
    pub head_commit: Commit,
    pub base_branch: String,
    pub base_commit: Commit,
    pub timestamp: DateTime<Utc>,
}

// ─── Compatibility table ───

macro_rules! payload_kind {
    ($ty:ident => [$($scope:ident),+], [$($action:ident),+]) => {
        impl Payload for $ty {
            const NAME: &'static str = stringify!($ty);
            const SCOPES: &'static [Scope] = &[$(Scope::$scope),+];
            const ACTIONS: &'static [Action] = &[$(Action::$action),+];

            fn default_scope(&self) -> Scope {
                Self::SCOPES[0]
            }

            fn decode(scope: Scope, raw: Value) -> Result<Self, DecodeError> {
                decode_as(Self::NAME, Self::accepts(scope), scope, raw)
            }
        }

        impl From<$ty> for EventPayload {
            fn from(p: $ty) -> Self {
                EventPayload::$ty(p)
            }
        }
    };
}

impl Payload for BranchOrTag {
    const NAME: &'static str = "BranchOrTag";
    const SCOPES: &'static [Scope] = &[Scope::Branch, Scope::Tag];
    const ACTIONS: &'static [Action] = &[Action::Created, Action::Deleted];

    fn default_scope(&self) -> Scope {
        if self.kind == "tag" {
            Scope::Tag
        } else {
            Scope::Branch
        }
    }

    fn decode(scope: Scope, raw: Value) -> Result<Self, DecodeError> {
        decode_as(Self::NAME, Self::accepts(scope), scope, raw)
    }
}

impl From<BranchOrTag> for EventPayload {
    fn from(p: BranchOrTag) -> Self {
        EventPayload::BranchOrTag(p)
    }
}

payload_kind!(Push => [Push], [Created]);
payload_kind!(PullRequest => [PullRequest], [Created, Updated, Reopened, Closed, Merged]);
payload_kind!(PullRequestReview => [PullRequestReview], [Created, Updated, Dismissed, Requested]);
payload_kind!(PullRequestLabel => [PullRequestLabel], [Added, Deleted]);
payload_kind!(PullRequestComment => [PullRequestComment], [Created, Updated, Deleted]);
payload_kind!(PullRequestThread => [PullRequestThread], [Created, Deleted]);
payload_kind!(RebaseRequest => [Rebase], [Created, Abandoned]);
payload_kind!(MergeConflict => [MergeConflict], [Created]);
payload_kind!(LinesExceed => [LineExceed], [Created]);

// ─── Sum type ───

/// Any payload, discriminated at run time by the envelope's scope.
///
/// Serializes as the inner payload with no tag; the scope travels in the
/// envelope context.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum EventPayload {
    BranchOrTag(BranchOrTag),
    Push(Push),
    PullRequest(PullRequest),
    PullRequestReview(PullRequestReview),
    PullRequestLabel(PullRequestLabel),
    PullRequestComment(PullRequestComment),
    PullRequestThread(PullRequestThread),
    RebaseRequest(RebaseRequest),
    MergeConflict(MergeConflict),
    LinesExceed(LinesExceed),
}

macro_rules! each_variant {
    ($self:expr, $p:ident => $body:expr) => {
        match $self {
            EventPayload::BranchOrTag($p) => $body,
            EventPayload::Push($p) => $body,
            EventPayload::PullRequest($p) => $body,
            EventPayload::PullRequestReview($p) => $body,
            EventPayload::PullRequestLabel($p) => $body,
            EventPayload::PullRequestComment($p) => $body,
            EventPayload::PullRequestThread($p) => $body,
            EventPayload::RebaseRequest($p) => $body,
            EventPayload::MergeConflict($p) => $body,
            EventPayload::LinesExceed($p) => $body,
        }
    };
}

impl EventPayload {
    /// Name of the concrete variant.
    pub fn kind_name(&self) -> &'static str {
        fn name_of<P: Payload>(_: &P) -> &'static str {
            P::NAME
        }
        each_variant!(self, p => name_of(p))
    }
}

impl Payload for EventPayload {
    const NAME: &'static str = "EventPayload";
    const SCOPES: &'static [Scope] = &Scope::ALL;
    const ACTIONS: &'static [Action] = &[];

    fn scopes(&self) -> &'static [Scope] {
        each_variant!(self, p => p.scopes())
    }

    fn actions(&self) -> &'static [Action] {
        each_variant!(self, p => p.actions())
    }

    fn default_scope(&self) -> Scope {
        each_variant!(self, p => p.default_scope())
    }

    fn decode(scope: Scope, raw: Value) -> Result<Self, DecodeError> {
        Ok(match scope {
            Scope::Branch | Scope::Tag => BranchOrTag::decode(scope, raw)?.into(),
            Scope::Push => Push::decode(scope, raw)?.into(),
            Scope::PullRequest => PullRequest::decode(scope, raw)?.into(),
            Scope::PullRequestReview => PullRequestReview::decode(scope, raw)?.into(),
            Scope::PullRequestLabel => PullRequestLabel::decode(scope, raw)?.into(),
            Scope::PullRequestComment => PullRequestComment::decode(scope, raw)?.into(),
            Scope::PullRequestThread => PullRequestThread::decode(scope, raw)?.into(),
            Scope::Rebase => RebaseRequest::decode(scope, raw)?.into(),
            Scope::MergeConflict => MergeConflict::decode(scope, raw)?.into(),
            Scope::LineExceed => LinesExceed::decode(scope, raw)?.into(),
        })
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    //! Sample payloads shared by the envelope, validator and codec tests.

    use super::*;
    use chrono::TimeZone;

    pub fn ts() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 11, 5, 12, 30, 0).unwrap()
    }

    pub fn commit(sha: &str) -> Commit {
        Commit {
            sha: sha.to_string(),
            message: "fix: handle empty diff".to_string(),
            url: format!("https://github.com/acme/api/commit/{sha}"),
            added: vec!["src/new.rs".to_string()],
            removed: vec![],
            modified: vec!["src/lib.rs".to_string()],
            author: "alice".to_string(),
            committer: "alice".to_string(),
            timestamp: ts(),
        }
    }

    pub fn branch() -> BranchOrTag {
        BranchOrTag {
            ref_name: "feature/login".to_string(),
            kind: "branch".to_string(),
        }
    }

    pub fn push() -> Push {
        Push {
            ref_name: "refs/heads/main".to_string(),
            before: "a".repeat(40),
            after: "b".repeat(40),
            repository: "acme/api".to_string(),
            sender_id: 1001,
            commits: vec![commit(&"b".repeat(40))],
            timestamp: ts(),
        }
    }

    pub fn pull_request() -> PullRequest {
        PullRequest {
            number: 17,
            title: "Add login".to_string(),
            body: String::new(),
            state: "open".to_string(),
            merge_commit_sha: None,
            author_id: 1001,
            head_branch: "feature/login".to_string(),
            base_branch: "main".to_string(),
            timestamp: ts(),
        }
    }

    pub fn label() -> PullRequestLabel {
        PullRequestLabel {
            name: "ready".to_string(),
            pull_request_number: 17,
            branch: "feature/login".to_string(),
            timestamp: ts(),
        }
    }

    pub fn review() -> PullRequestReview {
        PullRequestReview {
            id: 88,
            pull_request_number: 17,
            branch: "feature/login".to_string(),
            state: "approved".to_string(),
            author_id: 1002,
            submitted_at: ts(),
        }
    }

    pub fn comment() -> PullRequestComment {
        PullRequestComment {
            id: 501,
            pull_request_number: 17,
            branch: "feature/login".to_string(),
            review_id: 88,
            in_reply_to: Some(500),
            commit_sha: "c".repeat(40),
            path: "src/lib.rs".to_string(),
            position: 12,
            author_id: 1002,
            timestamp: ts(),
        }
    }

    pub fn thread() -> PullRequestThread {
        PullRequestThread {
            id: 9,
            pull_request_number: 17,
            comment_ids: vec![500, 501],
            timestamp: ts(),
        }
    }

    pub fn rebase() -> RebaseRequest {
        RebaseRequest {
            ref_name: "refs/heads/feature/login".to_string(),
            before: "a".repeat(40),
            after: "b".repeat(40),
            head_branch: "feature/login".to_string(),
            head_commit: commit(&"b".repeat(40)),
            base_branch: "main".to_string(),
            base_commit: commit(&"d".repeat(40)),
            timestamp: ts(),
        }
    }

    pub fn merge_conflict() -> MergeConflict {
        MergeConflict {
            head_branch: "feature/login".to_string(),
            head_commit: commit(&"b".repeat(40)),
            base_branch: "main".to_string(),
            base_commit: commit(&"d".repeat(40)),
            files: vec!["src/lib.rs".to_string()],
            timestamp: ts(),
        }
    }

    pub fn lines_exceed() -> LinesExceed {
        LinesExceed {
            branch: "feature/login".to_string(),
            commit: commit(&"b".repeat(40)),
            diff: CommitDiff {
                added: 600,
                removed: 20,
                threshold: 500,
                delta: 580,
            },
            timestamp: ts(),
        }
    }

    /// One value of every variant.
    pub fn all() -> Vec<EventPayload> {
        vec![
            branch().into(),
            push().into(),
            pull_request().into(),
            review().into(),
            label().into(),
            comment().into(),
            thread().into(),
            rebase().into(),
            merge_conflict().into(),
            lines_exceed().into(),
        ]
    }
}
