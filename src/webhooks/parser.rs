//! GitHub webhook payload parser.
//!
//! This module classifies a delivery by its `X-GitHub-Event` header and parses
//! the raw JSON body into a typed [`GithubEvent`].
//!
//! # Parsing Strategy
//!
//! 1. The event type is classified with [`WebhookKind::from_header`]
//! 2. Unknown event types are rejected; the service never silently drops a
//!    signed delivery it does not understand
//! 3. The payload is parsed according to the event type
//! 4. Malformed payloads return `Err` with details

use serde::de::DeserializeOwned;
use thiserror::Error;

use super::events::{
    GithubEvent, InstallationEvent, InstallationRepositoriesEvent, PullRequestEvent,
    PullRequestReviewCommentEvent, PullRequestReviewEvent, PushEvent, RefEvent, RepoEvent,
    WorkflowRunEvent,
};

/// Error type for webhook parsing failures.
#[derive(Debug, Error)]
pub enum ParseError {
    /// JSON deserialization failed (includes missing required fields).
    #[error("JSON parse error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// Field has invalid value (e.g. a `ref_type` other than branch or tag).
    #[error("invalid field value for {field}: {value}")]
    InvalidField { field: &'static str, value: String },
}

/// The webhook event types the service accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WebhookKind {
    Installation,
    InstallationRepositories,
    Push,
    Create,
    Delete,
    PullRequest,
    PullRequestReview,
    PullRequestReviewComment,
    WorkflowRun,
}

impl WebhookKind {
    pub const ALL: [WebhookKind; 9] = [
        WebhookKind::Installation,
        WebhookKind::InstallationRepositories,
        WebhookKind::Push,
        WebhookKind::Create,
        WebhookKind::Delete,
        WebhookKind::PullRequest,
        WebhookKind::PullRequestReview,
        WebhookKind::PullRequestReviewComment,
        WebhookKind::WorkflowRun,
    ];

    /// Classifies an `X-GitHub-Event` header value. `None` means unsupported.
    pub fn from_header(event_type: &str) -> Option<Self> {
        WebhookKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == event_type)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            WebhookKind::Installation => "installation",
            WebhookKind::InstallationRepositories => "installation_repositories",
            WebhookKind::Push => "push",
            WebhookKind::Create => "create",
            WebhookKind::Delete => "delete",
            WebhookKind::PullRequest => "pull_request",
            WebhookKind::PullRequestReview => "pull_request_review",
            WebhookKind::PullRequestReviewComment => "pull_request_review_comment",
            WebhookKind::WorkflowRun => "workflow_run",
        }
    }

    /// Whether events of this kind go to the installation orchestrator rather
    /// than a per-repository workflow.
    pub fn is_installation_scoped(self) -> bool {
        matches!(
            self,
            WebhookKind::Installation | WebhookKind::InstallationRepositories
        )
    }
}

/// Parses a webhook payload of a known kind into a typed event.
///
/// # Examples
///
/// ```
/// use repo_events::webhooks::{parse_webhook, GithubEvent, WebhookKind};
///
/// let payload = br#"{
///     "ref": "feature/x",
///     "ref_type": "branch",
///     "repository": { "id": 7, "name": "api", "full_name": "acme/api" },
///     "sender": { "id": 1001, "login": "alice" },
///     "installation": { "id": 42 }
/// }"#;
///
/// let event = parse_webhook(WebhookKind::Create, payload).unwrap();
/// assert!(matches!(event, GithubEvent::Repo(_)));
/// ```
pub fn parse_webhook(kind: WebhookKind, payload: &[u8]) -> Result<GithubEvent, ParseError> {
    Ok(match kind {
        WebhookKind::Installation => GithubEvent::Installation(parse::<InstallationEvent>(payload)?),
        WebhookKind::InstallationRepositories => {
            GithubEvent::InstallationRepositories(parse::<InstallationRepositoriesEvent>(payload)?)
        }
        WebhookKind::Push => GithubEvent::Repo(RepoEvent::Push(parse::<PushEvent>(payload)?)),
        WebhookKind::Create => GithubEvent::Repo(RepoEvent::Create(parse_ref(payload)?)),
        WebhookKind::Delete => GithubEvent::Repo(RepoEvent::Delete(parse_ref(payload)?)),
        WebhookKind::PullRequest => {
            GithubEvent::Repo(RepoEvent::PullRequest(parse::<PullRequestEvent>(payload)?))
        }
        WebhookKind::PullRequestReview => GithubEvent::Repo(RepoEvent::PullRequestReview(
            parse::<PullRequestReviewEvent>(payload)?,
        )),
        WebhookKind::PullRequestReviewComment => GithubEvent::Repo(
            RepoEvent::PullRequestReviewComment(parse::<PullRequestReviewCommentEvent>(payload)?),
        ),
        WebhookKind::WorkflowRun => {
            GithubEvent::Repo(RepoEvent::WorkflowRun(parse::<WorkflowRunEvent>(payload)?))
        }
    })
}

fn parse<T: DeserializeOwned>(payload: &[u8]) -> Result<T, ParseError> {
    Ok(serde_json::from_slice(payload)?)
}

fn parse_ref(payload: &[u8]) -> Result<RefEvent, ParseError> {
    let event: RefEvent = parse(payload)?;
    match event.ref_type.as_str() {
        "branch" | "tag" => Ok(event),
        other => Err(ParseError::InvalidField {
            field: "ref_type",
            value: other.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{GithubRepoId, GithubUserId, InstallationId};

    const REPO: &str = r#"{ "id": 7, "name": "api", "full_name": "acme/api", "html_url": "https://github.com/acme/api", "default_branch": "main" }"#;
    const SENDER: &str = r#"{ "id": 1001, "login": "alice", "type": "User" }"#;

    fn pull_request_json(merged: bool) -> String {
        format!(
            r#"{{
                "number": 12,
                "title": "Add widgets",
                "body": null,
                "state": "closed",
                "merged": {merged},
                "merge_commit_sha": "abc123",
                "user": {SENDER},
                "head": {{ "ref": "feature/widgets", "sha": "1111111111111111111111111111111111111111" }},
                "base": {{ "ref": "main", "sha": "2222222222222222222222222222222222222222" }},
                "created_at": "2024-01-01T00:00:00Z",
                "updated_at": "2024-01-02T00:00:00Z"
            }}"#
        )
    }

    fn unwrap_repo(event: GithubEvent) -> RepoEvent {
        match event {
            GithubEvent::Repo(e) => e,
            other => panic!("expected repo event, got {other:?}"),
        }
    }

    // ─── Classification ───

    #[test]
    fn classifies_every_supported_header() {
        for kind in WebhookKind::ALL {
            assert_eq!(WebhookKind::from_header(kind.as_str()), Some(kind));
        }
    }

    #[test]
    fn unknown_headers_are_unsupported() {
        for header in ["", "issue_comment", "check_suite", "status", "PUSH", "ping"] {
            assert_eq!(WebhookKind::from_header(header), None, "{header:?}");
        }
    }

    #[test]
    fn installation_kinds_are_installation_scoped() {
        let scoped: Vec<_> = WebhookKind::ALL
            .into_iter()
            .filter(|k| k.is_installation_scoped())
            .collect();
        assert_eq!(
            scoped,
            vec![
                WebhookKind::Installation,
                WebhookKind::InstallationRepositories
            ]
        );
    }

    // ─── Installation events ───

    #[test]
    fn parse_installation_created() {
        let payload = format!(
            r#"{{
                "action": "created",
                "installation": {{ "id": 42, "account": {{ "id": 9, "login": "acme", "type": "Organization" }} }},
                "repositories": [
                    {{ "id": 7, "name": "api", "full_name": "acme/api", "private": true }},
                    {{ "id": 8, "name": "web", "full_name": "acme/web" }}
                ],
                "sender": {SENDER}
            }}"#
        );

        let GithubEvent::Installation(event) =
            parse_webhook(WebhookKind::Installation, payload.as_bytes()).unwrap()
        else {
            panic!("expected installation event");
        };
        assert_eq!(event.action, "created");
        assert_eq!(event.installation.id, InstallationId(42));
        assert_eq!(event.installation.account.login, "acme");
        assert_eq!(event.installation.account.account_type, "Organization");
        assert_eq!(event.repositories.len(), 2);
        assert!(event.repositories[0].private);
        assert!(!event.repositories[1].private);
        assert_eq!(event.sender.id, GithubUserId(1001));
    }

    #[test]
    fn parse_installation_deleted_without_repositories() {
        let payload = format!(
            r#"{{
                "action": "deleted",
                "installation": {{ "id": 42, "account": {{ "id": 9, "login": "acme", "type": "Organization" }} }},
                "sender": {SENDER}
            }}"#
        );
        let GithubEvent::Installation(event) =
            parse_webhook(WebhookKind::Installation, payload.as_bytes()).unwrap()
        else {
            panic!("expected installation event");
        };
        assert!(event.repositories.is_empty());
    }

    #[test]
    fn parse_installation_repositories_added() {
        let payload = format!(
            r#"{{
                "action": "added",
                "installation": {{ "id": 42, "account": {{ "id": 9, "login": "acme", "type": "Organization" }} }},
                "repository_selection": "selected",
                "repositories_added": [{{ "id": 8, "name": "web", "full_name": "acme/web" }}],
                "repositories_removed": [],
                "sender": {SENDER}
            }}"#
        );
        let GithubEvent::InstallationRepositories(event) =
            parse_webhook(WebhookKind::InstallationRepositories, payload.as_bytes()).unwrap()
        else {
            panic!("expected installation_repositories event");
        };
        assert_eq!(event.action, "added");
        assert_eq!(event.repositories_added[0].id, GithubRepoId(8));
        assert!(event.repositories_removed.is_empty());
    }

    // ─── Repository events ───

    #[test]
    fn parse_push_with_commits() {
        let payload = format!(
            r#"{{
                "ref": "refs/heads/main",
                "before": "1111111111111111111111111111111111111111",
                "after": "2222222222222222222222222222222222222222",
                "commits": [{{
                    "id": "2222222222222222222222222222222222222222",
                    "message": "Fix build",
                    "timestamp": "2024-01-01T10:00:00+05:30",
                    "author": {{ "name": "Alice", "email": "alice@example.com", "username": "alice" }},
                    "committer": {{ "name": "Alice", "email": "alice@example.com" }},
                    "modified": ["src/lib.rs"]
                }}],
                "repository": {REPO},
                "sender": {SENDER},
                "installation": {{ "id": 42 }}
            }}"#
        );

        let RepoEvent::Push(push) =
            unwrap_repo(parse_webhook(WebhookKind::Push, payload.as_bytes()).unwrap())
        else {
            panic!("expected push");
        };
        assert_eq!(push.ref_name, "refs/heads/main");
        assert!(!push.is_ref_deletion());
        assert_eq!(push.commits.len(), 1);
        assert_eq!(push.commits[0].modified, vec!["src/lib.rs"]);
        assert_eq!(
            push.commits[0].timestamp.to_rfc3339(),
            "2024-01-01T04:30:00+00:00"
        );
    }

    #[test]
    fn push_to_no_commit_is_a_ref_deletion() {
        let payload = format!(
            r#"{{
                "ref": "refs/tags/v1",
                "before": "1111111111111111111111111111111111111111",
                "after": "0000000000000000000000000000000000000000",
                "repository": {REPO},
                "sender": {SENDER},
                "installation": {{ "id": 42 }}
            }}"#
        );
        let RepoEvent::Push(push) =
            unwrap_repo(parse_webhook(WebhookKind::Push, payload.as_bytes()).unwrap())
        else {
            panic!("expected push");
        };
        assert!(push.is_ref_deletion());
        assert!(push.commits.is_empty());
    }

    #[test]
    fn parse_create_and_delete() {
        for (kind, ref_type) in [(WebhookKind::Create, "branch"), (WebhookKind::Delete, "tag")] {
            let payload = format!(
                r#"{{
                    "ref": "v1",
                    "ref_type": "{ref_type}",
                    "repository": {REPO},
                    "sender": {SENDER},
                    "installation": {{ "id": 42 }}
                }}"#
            );
            let event = unwrap_repo(parse_webhook(kind, payload.as_bytes()).unwrap());
            assert_eq!(event.event_name(), kind.as_str());
            assert_eq!(event.installation_id(), InstallationId(42));
            assert_eq!(event.repository().name, "api");
        }
    }

    #[test]
    fn invalid_ref_type_returns_error() {
        let payload = format!(
            r#"{{
                "ref": "v1",
                "ref_type": "repository",
                "repository": {REPO},
                "sender": {SENDER},
                "installation": {{ "id": 42 }}
            }}"#
        );
        let err = parse_webhook(WebhookKind::Create, payload.as_bytes()).unwrap_err();
        assert!(matches!(
            err,
            ParseError::InvalidField { field: "ref_type", .. }
        ));
    }

    #[test]
    fn parse_pull_request_closed_merged() {
        let payload = format!(
            r#"{{
                "action": "closed",
                "number": 12,
                "pull_request": {},
                "repository": {REPO},
                "sender": {SENDER},
                "installation": {{ "id": 42 }}
            }}"#,
            pull_request_json(true)
        );
        let RepoEvent::PullRequest(pr) =
            unwrap_repo(parse_webhook(WebhookKind::PullRequest, payload.as_bytes()).unwrap())
        else {
            panic!("expected pull_request");
        };
        assert_eq!(pr.action, "closed");
        assert!(pr.pull_request.merged);
        assert_eq!(pr.pull_request.merge_commit_sha.as_deref(), Some("abc123"));
        assert_eq!(pr.pull_request.head.ref_name, "feature/widgets");
        assert!(pr.label.is_none());
    }

    #[test]
    fn parse_pull_request_labeled() {
        let payload = format!(
            r#"{{
                "action": "labeled",
                "number": 12,
                "pull_request": {},
                "label": {{ "name": "ready" }},
                "repository": {REPO},
                "sender": {SENDER},
                "installation": {{ "id": 42 }}
            }}"#,
            pull_request_json(false)
        );
        let RepoEvent::PullRequest(pr) =
            unwrap_repo(parse_webhook(WebhookKind::PullRequest, payload.as_bytes()).unwrap())
        else {
            panic!("expected pull_request");
        };
        assert_eq!(pr.label.map(|l| l.name).as_deref(), Some("ready"));
    }

    #[test]
    fn parse_pull_request_review_submitted() {
        let payload = format!(
            r#"{{
                "action": "submitted",
                "review": {{ "id": 5, "state": "approved", "submitted_at": "2024-01-03T00:00:00Z", "user": {SENDER} }},
                "pull_request": {},
                "repository": {REPO},
                "sender": {SENDER},
                "installation": {{ "id": 42 }}
            }}"#,
            pull_request_json(false)
        );
        let RepoEvent::PullRequestReview(review) = unwrap_repo(
            parse_webhook(WebhookKind::PullRequestReview, payload.as_bytes()).unwrap(),
        ) else {
            panic!("expected pull_request_review");
        };
        assert_eq!(review.review.state, "approved");
        assert!(review.review.submitted_at.is_some());
    }

    #[test]
    fn parse_pull_request_review_comment_reply() {
        let payload = format!(
            r#"{{
                "action": "created",
                "comment": {{
                    "id": 77,
                    "pull_request_review_id": 5,
                    "in_reply_to_id": 76,
                    "commit_id": "1111111111111111111111111111111111111111",
                    "path": "src/lib.rs",
                    "position": 3,
                    "user": {SENDER},
                    "created_at": "2024-01-03T00:00:00Z",
                    "updated_at": "2024-01-03T00:00:00Z"
                }},
                "pull_request": {},
                "repository": {REPO},
                "sender": {SENDER},
                "installation": {{ "id": 42 }}
            }}"#,
            pull_request_json(false)
        );
        let RepoEvent::PullRequestReviewComment(c) = unwrap_repo(
            parse_webhook(WebhookKind::PullRequestReviewComment, payload.as_bytes()).unwrap(),
        ) else {
            panic!("expected pull_request_review_comment");
        };
        assert_eq!(c.comment.in_reply_to_id, Some(76));
        assert_eq!(c.comment.path, "src/lib.rs");
    }

    #[test]
    fn parse_workflow_run_completed() {
        let payload = format!(
            r#"{{
                "action": "completed",
                "workflow_run": {{
                    "id": 99,
                    "name": "CI",
                    "head_branch": "main",
                    "head_sha": "1111111111111111111111111111111111111111",
                    "status": "completed",
                    "conclusion": "success"
                }},
                "repository": {REPO},
                "sender": {SENDER},
                "installation": {{ "id": 42 }}
            }}"#
        );
        let event = unwrap_repo(parse_webhook(WebhookKind::WorkflowRun, payload.as_bytes()).unwrap());
        assert_eq!(event.event_name(), "workflow_run");
        assert_eq!(event.sender().login, "alice");
    }

    // ─── Errors ───

    #[test]
    fn malformed_json_returns_error() {
        let err = parse_webhook(WebhookKind::Push, b"{not json").unwrap_err();
        assert!(matches!(err, ParseError::JsonError(_)));
    }

    #[test]
    fn missing_required_field_returns_error() {
        // No installation object.
        let payload = format!(
            r#"{{ "ref": "v1", "ref_type": "tag", "repository": {REPO}, "sender": {SENDER} }}"#
        );
        let err = parse_webhook(WebhookKind::Delete, payload.as_bytes()).unwrap_err();
        assert!(matches!(err, ParseError::JsonError(_)));
    }

    #[test]
    fn repo_events_roundtrip_through_journal_encoding() {
        let payload = format!(
            r#"{{
                "ref": "feature/x",
                "ref_type": "branch",
                "repository": {REPO},
                "sender": {SENDER},
                "installation": {{ "id": 42 }}
            }}"#
        );
        let event = unwrap_repo(parse_webhook(WebhookKind::Create, payload.as_bytes()).unwrap());
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""event":"create""#));
        let back: RepoEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);
    }
}
