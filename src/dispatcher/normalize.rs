//! Maps GitHub repository events onto canonical events.
//!
//! | GitHub event / action                         | Scope                 | Action                      | Signal                 |
//! |-----------------------------------------------|-----------------------|-----------------------------|------------------------|
//! | create / delete                               | branch or tag         | created / deleted           | `create_or_delete`     |
//! | push                                          | push                  | created                     | `push`                 |
//! | pull_request opened                           | pull_request          | created                     | `pull_request`         |
//! | pull_request edited, synchronize              | pull_request          | updated                     | `pull_request`         |
//! | pull_request reopened                         | pull_request          | reopened                    | `pull_request`         |
//! | pull_request closed                           | pull_request          | merged or closed            | `pull_request`         |
//! | pull_request labeled / unlabeled              | pull_request_label    | added / deleted             | `pull_request_label`   |
//! | pull_request_review submitted/edited/dismissed| pull_request_review   | created/updated/dismissed   | `pull_request_review`  |
//! | pull_request_review_comment created/edited/deleted | pull_request_comment | created/updated/deleted | `pull_request_comment` |
//!
//! Anything else, including every `workflow_run`, is skipped.

use chrono::Utc;

use crate::events::{
    Action, BranchOrTag, Commit, Event, EventPayload, Payload, Provider, PullRequest,
    PullRequestComment, PullRequestLabel, PullRequestReview, Push, SubjectName,
};
use crate::types::RepoEventMetadata;
use crate::webhooks::RepoEvent;
use crate::webhooks::events::{
    PullRequestBody, PullRequestEvent, PullRequestReviewCommentEvent, PullRequestReviewEvent,
    PushCommit, PushEvent, RefEvent,
};

use super::controller::ControllerSignal;

#[derive(Debug, Clone, PartialEq)]
pub enum Normalized {
    Forward {
        signal: ControllerSignal,
        event: Event<EventPayload>,
    },
    Skip {
        reason: String,
    },
}

fn skip(reason: impl Into<String>) -> Normalized {
    Normalized::Skip {
        reason: reason.into(),
    }
}

/// Builds the canonical event for `raw`, anchored to the resolved repository.
pub fn normalize(raw: &RepoEvent, meta: &RepoEventMetadata) -> Normalized {
    match raw {
        RepoEvent::Create(e) => ref_event(e, Action::Created, meta),
        RepoEvent::Delete(e) => ref_event(e, Action::Deleted, meta),
        RepoEvent::Push(e) => push(e, meta),
        RepoEvent::PullRequest(e) => pull_request(e, meta),
        RepoEvent::PullRequestReview(e) => review(e, meta),
        RepoEvent::PullRequestReviewComment(e) => review_comment(e, meta),
        RepoEvent::WorkflowRun(e) => skip(format!("workflow_run {} is not forwarded", e.action)),
    }
}

fn forward<P>(signal: ControllerSignal, payload: P, action: Action, meta: &RepoEventMetadata) -> Normalized
where
    P: Payload + Into<EventPayload>,
{
    let mut event = Event::new(Provider::Github, payload, action)
        .with_source(meta.repo.url.clone())
        .with_subject(*meta.core_repo.id.as_uuid(), SubjectName::Repos.as_str())
        .with_team(meta.repo.team_id);
    if let Some(user) = &meta.user {
        event = event.with_user(user.user_id);
    }
    Normalized::Forward {
        signal,
        event: event.erase(),
    }
}

fn ref_event(e: &RefEvent, action: Action, meta: &RepoEventMetadata) -> Normalized {
    let payload = BranchOrTag {
        ref_name: e.ref_name.clone(),
        kind: e.ref_type.clone(),
    };
    forward(ControllerSignal::CreateOrDelete, payload, action, meta)
}

fn commit(c: &PushCommit) -> Commit {
    Commit {
        sha: c.id.clone(),
        message: c.message.clone(),
        url: c.url.clone(),
        added: c.added.clone(),
        removed: c.removed.clone(),
        modified: c.modified.clone(),
        author: c.author.username.clone().unwrap_or_else(|| c.author.name.clone()),
        committer: c
            .committer
            .username
            .clone()
            .unwrap_or_else(|| c.committer.name.clone()),
        timestamp: c.timestamp,
    }
}

fn push(e: &PushEvent, meta: &RepoEventMetadata) -> Normalized {
    if e.is_ref_deletion() {
        return skip("push deleted a ref");
    }
    let timestamp = e.commits.last().map(|c| c.timestamp).unwrap_or_else(Utc::now);
    let payload = Push {
        ref_name: e.ref_name.clone(),
        before: e.before.clone(),
        after: e.after.clone(),
        repository: e.repository.full_name.clone(),
        sender_id: e.sender.id.0,
        commits: e.commits.iter().map(commit).collect(),
        timestamp,
    };
    forward(ControllerSignal::Push, payload, Action::Created, meta).with_timestamp(timestamp)
}

fn pull_request_payload(pr: &PullRequestBody) -> PullRequest {
    PullRequest {
        number: pr.number,
        title: pr.title.clone(),
        body: pr.body.clone().unwrap_or_default(),
        state: pr.state.clone(),
        merge_commit_sha: pr.merge_commit_sha.clone(),
        author_id: pr.user.id.0,
        head_branch: pr.head.ref_name.clone(),
        base_branch: pr.base.ref_name.clone(),
        timestamp: pr.updated_at,
    }
}

fn pull_request(e: &PullRequestEvent, meta: &RepoEventMetadata) -> Normalized {
    let pr = &e.pull_request;
    let action = match e.action.as_str() {
        "opened" => Action::Created,
        "edited" | "synchronize" => Action::Updated,
        "reopened" => Action::Reopened,
        "closed" if pr.merged => Action::Merged,
        "closed" => Action::Closed,
        "labeled" | "unlabeled" => return label(e, meta),
        other => return skip(format!("pull_request {other} is not forwarded")),
    };
    forward(ControllerSignal::PullRequest, pull_request_payload(pr), action, meta)
        .with_timestamp(pr.updated_at)
}

fn label(e: &PullRequestEvent, meta: &RepoEventMetadata) -> Normalized {
    let Some(label) = &e.label else {
        return skip(format!("pull_request {} without a label", e.action));
    };
    let action = if e.action == "labeled" {
        Action::Added
    } else {
        Action::Deleted
    };
    let pr = &e.pull_request;
    let payload = PullRequestLabel {
        name: label.name.clone(),
        pull_request_number: pr.number,
        branch: pr.head.ref_name.clone(),
        timestamp: pr.updated_at,
    };
    forward(ControllerSignal::PullRequestLabel, payload, action, meta).with_timestamp(pr.updated_at)
}

fn review(e: &PullRequestReviewEvent, meta: &RepoEventMetadata) -> Normalized {
    let action = match e.action.as_str() {
        "submitted" => Action::Created,
        "edited" => Action::Updated,
        "dismissed" => Action::Dismissed,
        other => return skip(format!("pull_request_review {other} is not forwarded")),
    };
    let pr = &e.pull_request;
    let submitted_at = e.review.submitted_at.unwrap_or(pr.updated_at);
    let payload = PullRequestReview {
        id: e.review.id,
        pull_request_number: pr.number,
        branch: pr.head.ref_name.clone(),
        state: e.review.state.clone(),
        author_id: e.review.user.id.0,
        submitted_at,
    };
    forward(ControllerSignal::PullRequestReview, payload, action, meta).with_timestamp(submitted_at)
}

fn review_comment(e: &PullRequestReviewCommentEvent, meta: &RepoEventMetadata) -> Normalized {
    let action = match e.action.as_str() {
        "created" => Action::Created,
        "edited" => Action::Updated,
        "deleted" => Action::Deleted,
        other => return skip(format!("pull_request_review_comment {other} is not forwarded")),
    };
    let c = &e.comment;
    let payload = PullRequestComment {
        id: c.id,
        pull_request_number: e.pull_request.number,
        branch: e.pull_request.head.ref_name.clone(),
        review_id: c.pull_request_review_id.unwrap_or_default(),
        in_reply_to: c.in_reply_to_id,
        commit_sha: c.commit_id.clone(),
        path: c.path.clone(),
        position: c.position.unwrap_or_default(),
        author_id: c.user.id.0,
        timestamp: c.updated_at,
    };
    forward(ControllerSignal::PullRequestComment, payload, action, meta).with_timestamp(c.updated_at)
}

impl Normalized {
    fn with_timestamp(self, timestamp: chrono::DateTime<Utc>) -> Self {
        match self {
            Normalized::Forward { signal, event } => Normalized::Forward {
                signal,
                event: event.with_timestamp(timestamp),
            },
            skipped => skipped,
        }
    }
}
