//! HTTP server.
//!
//! # Endpoints
//!
//! - `POST /webhook` - GitHub webhook deliveries
//! - `POST /github/complete-installation` - the app's setup redirect, relayed
//! - `GET /github/repos?team_id=<uuid>` - repositories tracked for a team
//! - `POST /github/repos/{repo_id}/early-warning` - turn forwarding on or off
//! - `GET /github/installations?team_id=<uuid>` - installations of a team
//! - `GET /health` - Returns 200 if server is running

use std::sync::Arc;

use serde::Serialize;

pub mod api;
pub mod health;
pub mod webhook;

pub use api::{
    ApiError, complete_installation_handler, list_installations_handler, list_repos_handler,
    set_early_warning_handler,
};
pub use health::health_handler;
pub use webhook::{WebhookError, webhook_handler};

use crate::dispatcher::RepoEventDispatcher;
use crate::orchestrator::Orchestrator;
use crate::store::Store;
use crate::types::RunId;
use crate::webhooks::WebhookSecret;

/// Shared application state, passed to all handlers via Axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    webhook_secret: WebhookSecret,
    store: Arc<dyn Store>,
    orchestrator: Arc<Orchestrator>,
    dispatcher: Arc<RepoEventDispatcher>,
}

impl AppState {
    pub fn new(
        webhook_secret: WebhookSecret,
        store: Arc<dyn Store>,
        orchestrator: Arc<Orchestrator>,
        dispatcher: Arc<RepoEventDispatcher>,
    ) -> Self {
        AppState {
            inner: Arc::new(AppStateInner {
                webhook_secret,
                store,
                orchestrator,
                dispatcher,
            }),
        }
    }

    pub fn webhook_secret(&self) -> &WebhookSecret {
        &self.inner.webhook_secret
    }

    pub fn store(&self) -> &dyn Store {
        self.inner.store.as_ref()
    }

    pub fn orchestrator(&self) -> &Orchestrator {
        &self.inner.orchestrator
    }

    pub fn dispatcher(&self) -> &RepoEventDispatcher {
        &self.inner.dispatcher
    }
}

/// Body of a 201 response for work handed to the installation orchestrator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunAccepted {
    pub run_id: RunId,
    pub status: &'static str,
}

impl RunAccepted {
    pub fn queued(run_id: RunId) -> Self {
        RunAccepted {
            run_id,
            status: "queued",
        }
    }
}

impl axum::response::IntoResponse for RunAccepted {
    fn into_response(self) -> axum::response::Response {
        (axum::http::StatusCode::CREATED, axum::Json(self)).into_response()
    }
}

/// Builds the axum Router with all endpoints.
pub fn build_router(app_state: AppState) -> axum::Router {
    use axum::routing::{get, post};

    axum::Router::new()
        .route("/webhook", post(webhook_handler))
        .route(
            "/github/complete-installation",
            post(complete_installation_handler),
        )
        .route("/github/repos", get(list_repos_handler))
        .route(
            "/github/repos/{repo_id}/early-warning",
            post(set_early_warning_handler),
        )
        .route("/github/installations", get(list_installations_handler))
        .route("/health", get(health_handler))
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(app_state)
}
