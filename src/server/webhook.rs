//! Webhook endpoint handler.
//!
//! Verifies the signature on the raw body, classifies the delivery, and routes
//! it: installation lifecycle events to the installation orchestrator,
//! `installation_repositories` to a one-shot repository sync, and everything
//! repository-scoped to the repo event dispatcher.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use thiserror::Error;
use tracing::{debug, info, warn};

use super::{AppState, RunAccepted};
use crate::dispatcher::DispatcherError;
use crate::orchestrator::{InstallSignal, OrchestratorError};
use crate::types::DeliveryId;
use crate::webhooks::{
    DispatchKey, GithubEvent, ParseError, RepoEvent, SignatureError, WebhookKind, parse_webhook,
};

/// Header name for GitHub event type.
pub const HEADER_EVENT: &str = "x-github-event";
/// Header name for GitHub delivery ID.
pub const HEADER_DELIVERY: &str = "x-github-delivery";
/// Header name for GitHub signature.
pub const HEADER_SIGNATURE: &str = "x-hub-signature-256";

#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("missing signature header")]
    MissingSignature,

    #[error("invalid signature: {0}")]
    InvalidSignature(#[from] SignatureError),

    #[error("missing required header: {0}")]
    MissingHeader(&'static str),

    #[error("unsupported event type: {0}")]
    UnknownEvent(String),

    #[error("invalid payload: {0}")]
    Parse(#[from] ParseError),

    #[error("{0}")]
    Orchestrator(#[from] OrchestratorError),

    #[error("{0}")]
    Dispatcher(#[from] DispatcherError),
}

impl IntoResponse for WebhookError {
    fn into_response(self) -> Response {
        let status = match &self {
            WebhookError::MissingSignature | WebhookError::InvalidSignature(_) => {
                StatusCode::UNAUTHORIZED
            }
            WebhookError::MissingHeader(_)
            | WebhookError::UnknownEvent(_)
            | WebhookError::Parse(_) => StatusCode::BAD_REQUEST,
            WebhookError::Orchestrator(OrchestratorError::ShuttingDown)
            | WebhookError::Dispatcher(DispatcherError::ShuttingDown) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            WebhookError::Orchestrator(_) | WebhookError::Dispatcher(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        (status, self.to_string()).into_response()
    }
}

/// Webhook handler.
///
/// # Response
///
/// - 201 Created with `{run_id, status}`: installation event accepted
/// - 204 No Content: repository event accepted (or a push that deleted a ref)
/// - 400 Bad Request: missing event or delivery header, unknown event, bad JSON
/// - 401 Unauthorized: missing or invalid signature
/// - 500 Internal Server Error: orchestration failure
pub async fn webhook_handler(
    State(app_state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, WebhookError> {
    let signature = get_header(&headers, HEADER_SIGNATURE).ok_or(WebhookError::MissingSignature)?;
    if let Err(e) = app_state.webhook_secret().verify(&body, &signature) {
        warn!(error = %e, "Rejected webhook signature");
        return Err(e.into());
    }

    let event_type =
        get_header(&headers, HEADER_EVENT).ok_or(WebhookError::MissingHeader(HEADER_EVENT))?;
    let kind = WebhookKind::from_header(&event_type).ok_or(WebhookError::UnknownEvent(event_type))?;

    let delivery = match kind {
        WebhookKind::Installation => None,
        _ => Some(DeliveryId::new(
            get_header(&headers, HEADER_DELIVERY)
                .ok_or(WebhookError::MissingHeader(HEADER_DELIVERY))?,
        )),
    };

    let event = parse_webhook(kind, &body)?;
    debug!(event_type = kind.as_str(), delivery_id = ?delivery, "Received webhook");

    match (event, delivery) {
        (GithubEvent::Installation(event), _) => {
            let key = DispatchKey::installation(event.installation.id, &event.action);
            let run_id = app_state
                .orchestrator()
                .signal_with_start(&key, InstallSignal::Webhook(event))
                .await?;
            info!(dispatch_key = %key, run_id = %run_id, "Installation webhook queued");
            Ok(RunAccepted::queued(run_id).into_response())
        }
        (GithubEvent::InstallationRepositories(event), Some(delivery)) => {
            let key = DispatchKey::installation_repositories(event.installation.id, &delivery);
            let run_id = app_state
                .orchestrator()
                .sync_repositories(&key, event)
                .await?;
            info!(dispatch_key = %key, run_id = %run_id, "Repository sync queued");
            Ok(RunAccepted::queued(run_id).into_response())
        }
        (GithubEvent::Repo(RepoEvent::Push(push)), _) if push.is_ref_deletion() => {
            debug!(ref_name = %push.ref_name, "Push deleted a ref, nothing to dispatch");
            Ok(StatusCode::NO_CONTENT.into_response())
        }
        (GithubEvent::Repo(event), Some(delivery)) => {
            let key = DispatchKey::repo_event(
                event.installation_id(),
                &event.repository().name,
                kind.as_str(),
                &delivery,
            );
            let run_id = app_state.dispatcher().dispatch(key.clone(), event).await?;
            debug!(dispatch_key = %key, run_id = %run_id, delivery_id = %delivery, "Repository event dispatched");
            Ok(StatusCode::NO_CONTENT.into_response())
        }
        (_, None) => Err(WebhookError::MissingHeader(HEADER_DELIVERY)),
    }
}

/// Extracts a header value as a string.
fn get_header(headers: &HeaderMap, name: &'static str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
}
