//! Scalar vocabulary of the canonical event envelope.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Schema version tag carried by every event.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventVersion(pub String);

impl EventVersion {
    pub const CURRENT: &'static str = "0.1.0";

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for EventVersion {
    fn default() -> Self {
        EventVersion(Self::CURRENT.to_string())
    }
}

impl fmt::Display for EventVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Where an event originated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    #[default]
    Github,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Github => "github",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The category of an event. Acts as the payload discriminant on the wire and in storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    Branch,
    Tag,
    Push,
    PullRequest,
    PullRequestReview,
    PullRequestLabel,
    PullRequestComment,
    PullRequestThread,
    Rebase,
    MergeConflict,
    LineExceed,
}

impl Scope {
    pub const ALL: [Scope; 11] = [
        Scope::Branch,
        Scope::Tag,
        Scope::Push,
        Scope::PullRequest,
        Scope::PullRequestReview,
        Scope::PullRequestLabel,
        Scope::PullRequestComment,
        Scope::PullRequestThread,
        Scope::Rebase,
        Scope::MergeConflict,
        Scope::LineExceed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Scope::Branch => "branch",
            Scope::Tag => "tag",
            Scope::Push => "push",
            Scope::PullRequest => "pull_request",
            Scope::PullRequestReview => "pull_request_review",
            Scope::PullRequestLabel => "pull_request_label",
            Scope::PullRequestComment => "pull_request_comment",
            Scope::PullRequestThread => "pull_request_thread",
            Scope::Rebase => "rebase",
            Scope::MergeConflict => "merge_conflict",
            Scope::LineExceed => "line_exceed",
        }
    }

    /// Looks up a scope by its wire name.
    pub fn parse(s: &str) -> Option<Scope> {
        Scope::ALL.into_iter().find(|scope| scope.as_str() == s)
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a string names no known [`Scope`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unsupported event scope: {0}")]
pub struct UnknownScope(pub String);

impl FromStr for Scope {
    type Err = UnknownScope;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Scope::parse(s).ok_or_else(|| UnknownScope(s.to_string()))
    }
}

/// The verb that triggered an event within its scope.
///
/// Unrecognized verbs survive decoding as [`Action::Unknown`] so that the
/// validator, not the parser, decides whether they are acceptable. The empty
/// string decodes as `Unknown("")` and is reported as a missing action.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Action {
    Created,
    Deleted,
    Updated,
    Forced,
    Reopened,
    Closed,
    Merged,
    Started,
    Completed,
    Dismissed,
    Abandoned,
    Added,
    Requested,
    Unknown(String),
}

impl Action {
    pub const KNOWN: [Action; 13] = [
        Action::Created,
        Action::Deleted,
        Action::Updated,
        Action::Forced,
        Action::Reopened,
        Action::Closed,
        Action::Merged,
        Action::Started,
        Action::Completed,
        Action::Dismissed,
        Action::Abandoned,
        Action::Added,
        Action::Requested,
    ];

    pub fn as_str(&self) -> &str {
        match self {
            Action::Created => "created",
            Action::Deleted => "deleted",
            Action::Updated => "updated",
            Action::Forced => "forced",
            Action::Reopened => "reopened",
            Action::Closed => "closed",
            Action::Merged => "merged",
            Action::Started => "started",
            Action::Completed => "completed",
            Action::Dismissed => "dismissed",
            Action::Abandoned => "abandoned",
            Action::Added => "added",
            Action::Requested => "requested",
            Action::Unknown(s) => s,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.as_str().is_empty()
    }
}

impl From<&str> for Action {
    fn from(s: &str) -> Self {
        match s {
            "created" => Action::Created,
            "deleted" => Action::Deleted,
            "updated" => Action::Updated,
            "forced" => Action::Forced,
            "reopened" => Action::Reopened,
            "closed" => Action::Closed,
            "merged" => Action::Merged,
            "started" => Action::Started,
            "completed" => Action::Completed,
            "dismissed" => Action::Dismissed,
            "abandoned" => Action::Abandoned,
            "added" => Action::Added,
            "requested" => Action::Requested,
            other => Action::Unknown(other.to_string()),
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Action {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Action {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(Action::from(s.as_str()))
    }
}

/// Tables an event may be anchored to through `Subject.name`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubjectName {
    Repos,
    Stack,
}

impl SubjectName {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubjectName::Repos => "repos",
            SubjectName::Stack => "stack",
        }
    }

    pub fn parse(s: &str) -> Option<SubjectName> {
        match s {
            "repos" => Some(SubjectName::Repos),
            "stack" => Some(SubjectName::Stack),
            _ => None,
        }
    }
}

impl fmt::Display for SubjectName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
