//! Installation completion, listing and repository settings endpoints.

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use thiserror::Error;
use tracing::info;

use super::{AppState, RunAccepted};
use crate::orchestrator::{CompleteInstallationRequest, InstallSignal, OrchestratorError};
use crate::store::{Filter, StoreError, StoreExt};
use crate::types::{Installation, Repo, RepoRowId, TeamId};
use crate::webhooks::DispatchKey;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Orchestrator(#[from] OrchestratorError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("repository {0} not found")]
    RepoNotFound(RepoRowId),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::Orchestrator(OrchestratorError::ShuttingDown) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            ApiError::RepoNotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Orchestrator(_) | ApiError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, self.to_string()).into_response()
    }
}

/// `POST /github/complete-installation`
///
/// Signals the run for the installation, starting it if the webhook has not
/// arrived yet. Returns 201 with `{run_id, status}`.
pub async fn complete_installation_handler(
    State(app_state): State<AppState>,
    Json(request): Json<CompleteInstallationRequest>,
) -> Result<RunAccepted, ApiError> {
    let key = DispatchKey::installation(request.installation_id, request.lifecycle_action());
    let run_id = app_state
        .orchestrator()
        .signal_with_start(&key, InstallSignal::Request(request))
        .await?;
    info!(dispatch_key = %key, run_id = %run_id, "Installation completion queued");
    Ok(RunAccepted::queued(run_id))
}

#[derive(Debug, Deserialize)]
pub struct TeamQuery {
    pub team_id: TeamId,
}

/// `GET /github/repos?team_id=<uuid>`
pub async fn list_repos_handler(
    State(app_state): State<AppState>,
    Query(query): Query<TeamQuery>,
) -> Result<Json<Vec<Repo>>, ApiError> {
    let repos: Vec<Repo> = app_state
        .store()
        .filter(&Filter::new().eq("team_id", query.team_id))
        .await?;
    Ok(Json(repos))
}

/// `GET /github/installations?team_id=<uuid>`
pub async fn list_installations_handler(
    State(app_state): State<AppState>,
    Query(query): Query<TeamQuery>,
) -> Result<Json<Vec<Installation>>, ApiError> {
    let installations: Vec<Installation> = app_state
        .store()
        .filter(&Filter::new().eq("team_id", query.team_id))
        .await?;
    Ok(Json(installations))
}

#[derive(Debug, Deserialize)]
pub struct EarlyWarningRequest {
    pub value: bool,
}

/// `POST /github/repos/{repo_id}/early-warning`
///
/// Turns event forwarding on or off for one tracked repository. Returns the
/// updated row.
pub async fn set_early_warning_handler(
    State(app_state): State<AppState>,
    Path(repo_id): Path<RepoRowId>,
    Json(request): Json<EarlyWarningRequest>,
) -> Result<Json<Repo>, ApiError> {
    let store = app_state.store();
    let mut repo: Repo = store
        .get(&repo_id.to_string())
        .await?
        .ok_or(ApiError::RepoNotFound(repo_id))?;
    if repo.has_early_warning != request.value {
        repo.has_early_warning = request.value;
        store.save(&repo).await?;
    }
    info!(repo_id = %repo_id, repo = %repo.full_name, enabled = request.value, "Set early warning");
    Ok(Json(repo))
}
