//! Storage projection of [`Event`].
//!
//! A [`FlatEvent`] keeps every scalar envelope field as a column and the
//! payload as opaque bytes. The compile-time payload type is gone, so
//! reading it back ([`deflate`]) re-checks at run time that the stored scope
//! belongs to the requested payload type.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::envelope::{Event, EventContext, EventSubject};
use super::kinds::{Action, EventVersion, Provider, Scope};
use super::payload::{DecodeError, EventPayload, Payload};
use crate::store::Entity;
use crate::types::ids::{EventId, TeamId, UserId};

/// Errors converting between [`Event`] and [`FlatEvent`].
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("failed to encode payload: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("unsupported event scope: {0}")]
    UnsupportedScope(String),

    #[error("mismatch between requested type and stored scope: {requested} and scope {scope}")]
    ScopeMismatch { requested: &'static str, scope: Scope },

    #[error("failed to decode payload: {0}")]
    Json(#[source] serde_json::Error),
}

impl From<DecodeError> for CodecError {
    fn from(err: DecodeError) -> Self {
        match err {
            DecodeError::Envelope(e) => CodecError::Json(e),
            DecodeError::UnsupportedScope(s) => CodecError::UnsupportedScope(s),
            DecodeError::ScopeMismatch { requested, scope } => {
                CodecError::ScopeMismatch { requested, scope }
            }
            DecodeError::Json { source, .. } => CodecError::Json(source),
        }
    }
}

pub type Result<T> = std::result::Result<T, CodecError>;

/// Append-only storage record of an event. Partitioned by `(subject_id, team_id)`.
///
/// Absent `parent_id` and `user_id` are stored as the nil UUID.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlatEvent {
    pub version: EventVersion,
    pub id: EventId,
    pub parent_id: Uuid,
    pub provider: Provider,
    pub scope: String,
    pub action: Action,
    pub source: String,
    pub subject_id: Uuid,
    pub subject_name: String,
    pub payload: Vec<u8>,
    pub team_id: TeamId,
    pub user_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FlatEvent {
    pub fn partition_key(&self) -> (Uuid, TeamId) {
        (self.subject_id, self.team_id)
    }
}

impl Entity for FlatEvent {
    const TABLE: &'static str = "flat_events";

    fn key(&self) -> String {
        self.id.to_string()
    }
}

/// Projects an event into its storage record.
pub fn flatten<P: Payload>(event: &Event<P>) -> Result<FlatEvent> {
    let payload = serde_json::to_vec(&event.payload).map_err(CodecError::Encode)?;

    Ok(FlatEvent {
        version: event.version.clone(),
        id: event.id,
        parent_id: event.context.parent_id.map(Uuid::from).unwrap_or_else(Uuid::nil),
        provider: event.context.provider,
        scope: event.context.scope.as_str().to_string(),
        action: event.context.action.clone(),
        source: event.context.source.clone(),
        subject_id: event.subject.id,
        subject_name: event.subject.name.clone(),
        payload,
        team_id: event.subject.team_id,
        user_id: event.subject.user_id.map(Uuid::from).unwrap_or_else(Uuid::nil),
        created_at: event.context.timestamp,
        updated_at: event.context.timestamp,
    })
}

/// Rebuilds a typed event from its storage record.
///
/// Fails with [`CodecError::ScopeMismatch`] when the stored scope does not
/// belong to `P`, before any payload bytes are decoded.
pub fn deflate<P: Payload>(flat: &FlatEvent) -> Result<Event<P>> {
    let scope = Scope::parse(&flat.scope)
        .ok_or_else(|| CodecError::UnsupportedScope(flat.scope.clone()))?;

    if !P::accepts(scope) {
        return Err(CodecError::ScopeMismatch {
            requested: P::NAME,
            scope,
        });
    }

    let raw: Value = serde_json::from_slice(&flat.payload).map_err(CodecError::Json)?;
    let payload = P::decode(scope, raw)?;

    Ok(Event {
        version: flat.version.clone(),
        id: flat.id,
        context: EventContext {
            parent_id: Some(EventId(flat.parent_id)).filter(|id| !id.is_nil()),
            provider: flat.provider,
            scope,
            action: flat.action.clone(),
            source: flat.source.clone(),
            timestamp: flat.created_at,
        },
        subject: EventSubject {
            id: flat.subject_id,
            name: flat.subject_name.clone(),
            team_id: flat.team_id,
            user_id: Some(UserId(flat.user_id)).filter(|id| !id.is_nil()),
        },
        payload,
    })
}

/// Rebuilds an event whose payload type is chosen by the stored scope.
pub fn inflate(flat: &FlatEvent) -> Result<Event<EventPayload>> {
    deflate::<EventPayload>(flat)
}
