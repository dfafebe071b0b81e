//! Canonical repository events: envelope, payloads, validation and storage codec.

pub mod envelope;
pub mod flat;
pub mod kinds;
pub mod payload;
pub mod validation;

pub use envelope::{Event, EventContext, EventSubject};
pub use flat::{CodecError, FlatEvent, deflate, flatten, inflate};
pub use kinds::{Action, EventVersion, Provider, Scope, SubjectName, UnknownScope};
pub use payload::{
    BranchOrTag, Commit, CommitDiff, DecodeError, EventPayload, LinesExceed, MergeConflict,
    Payload, PullRequest, PullRequestComment, PullRequestLabel, PullRequestReview,
    PullRequestThread, Push, RebaseRequest,
};
pub use validation::{EventField, ValidationError};
