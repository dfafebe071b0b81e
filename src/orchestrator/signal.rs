//! Inbound signals of an installation run.

use serde::{Deserialize, Serialize};

use crate::types::{InstallationId, UserId};
use crate::webhooks::events::InstallationEvent;

/// Webhook actions that finalize without a completion request.
pub const SELF_SUFFICIENT_ACTIONS: [&str; 4] = ["deleted", "suspend", "unsuspend", "request"];

/// Webhook actions that set the status of an existing installation. The
/// provider can repeat these any number of times, so each delivery is applied
/// even when the run for its key has already finished.
pub const STATUS_ACTIONS: [&str; 3] = ["deleted", "suspend", "unsuspend"];

/// The out-of-band "complete installation" request, sent by the app's setup
/// redirect once the user is authenticated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompleteInstallationRequest {
    pub installation_id: InstallationId,
    /// GitHub's `setup_action` query parameter: `install` or `update`.
    pub setup_action: String,
    pub user_id: UserId,
}

impl CompleteInstallationRequest {
    /// The webhook action this request pairs with.
    ///
    /// GitHub reports a new installation as `setup_action=install` on the
    /// redirect and `action=created` on the webhook; both must address the
    /// same run.
    pub fn lifecycle_action(&self) -> &str {
        match self.setup_action.as_str() {
            "install" => "created",
            other => other,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "signal", content = "payload", rename_all = "snake_case")]
pub enum InstallSignal {
    Webhook(InstallationEvent),
    Request(CompleteInstallationRequest),
}

impl InstallSignal {
    pub fn installation_id(&self) -> InstallationId {
        match self {
            InstallSignal::Webhook(event) => event.installation.id,
            InstallSignal::Request(request) => request.installation_id,
        }
    }

    /// The action segment of the run's dispatch key.
    pub fn lifecycle_action(&self) -> &str {
        match self {
            InstallSignal::Webhook(event) => &event.action,
            InstallSignal::Request(request) => request.lifecycle_action(),
        }
    }

    /// Whether this signal changes the status of an existing installation.
    pub fn is_status_change(&self) -> bool {
        matches!(self, InstallSignal::Webhook(event) if STATUS_ACTIONS.contains(&event.action.as_str()))
    }

    pub fn name(&self) -> &'static str {
        match self {
            InstallSignal::Webhook(_) => "webhook",
            InstallSignal::Request(_) => "request",
        }
    }
}

/// Messages delivered to a running installation task.
#[derive(Debug)]
pub(crate) enum RunMessage {
    Signal(InstallSignal),
    Shutdown,
}
