//! The canonical event envelope.
//!
//! An [`Event`] wraps a payload with the context (who, what, when) and the
//! subject it is anchored to. The payload type is a parameter: `Event<Push>`
//! when the kind is statically known, `Event<EventPayload>` when it is not.
//!
//! Decoding is two-phase. The envelope is read with the payload left as raw
//! JSON, the scope is resolved, and only then is the payload decoded into the
//! type that scope selects.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::kinds::{Action, EventVersion, Provider, Scope};
use super::payload::{DecodeError, EventPayload, Payload};
use crate::types::ids::{EventId, TeamId, UserId, nil_as_none};

/// Where, how and when an event happened.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventContext {
    /// Preceding event in a causal chain. Nil UUID on the wire when absent.
    #[serde(default, with = "nil_as_none")]
    pub parent_id: Option<EventId>,
    pub provider: Provider,
    pub scope: Scope,
    pub action: Action,
    /// Origin of the event, e.g. the repository URL.
    pub source: String,
    pub timestamp: DateTime<Utc>,
}

/// The record an event is about.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventSubject {
    /// Primary key of the subject within the table named by `name`.
    pub id: Uuid,
    /// Table the subject lives in.
    pub name: String,
    pub team_id: TeamId,
    #[serde(default, with = "nil_as_none")]
    pub user_id: Option<UserId>,
}

impl Default for EventSubject {
    fn default() -> Self {
        EventSubject {
            id: Uuid::nil(),
            name: String::new(),
            team_id: TeamId::nil(),
            user_id: None,
        }
    }
}

/// A canonical event carrying payload `P`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Event<P> {
    pub version: EventVersion,
    pub id: EventId,
    pub context: EventContext,
    pub subject: EventSubject,
    pub payload: P,
}

impl<P: Payload> Event<P> {
    /// Builds an event with a fresh id, the current schema version, the
    /// payload's default scope and the current time. Source and subject are
    /// left unset and must be filled in before the event validates.
    pub fn new(provider: Provider, payload: P, action: Action) -> Self {
        Event {
            version: EventVersion::default(),
            id: EventId::new(),
            context: EventContext {
                parent_id: None,
                provider,
                scope: payload.default_scope(),
                action,
                source: String::new(),
                timestamp: Utc::now(),
            },
            subject: EventSubject::default(),
            payload,
        }
    }

    /// Decodes an event from JSON, resolving the payload type from the scope.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, DecodeError> {
        let raw: RawEvent = serde_json::from_slice(bytes).map_err(DecodeError::Envelope)?;
        raw.into_event()
    }
}

impl<P> Event<P> {
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.context.source = source.into();
        self
    }

    pub fn with_parent(mut self, parent: EventId) -> Self {
        self.context.parent_id = Some(parent);
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.context.timestamp = timestamp;
        self
    }

    pub fn with_scope(mut self, scope: Scope) -> Self {
        self.context.scope = scope;
        self
    }

    pub fn with_action(mut self, action: Action) -> Self {
        self.context.action = action;
        self
    }

    /// Anchors the event to row `id` of table `name`.
    pub fn with_subject(mut self, id: Uuid, name: impl Into<String>) -> Self {
        self.subject.id = id;
        self.subject.name = name.into();
        self
    }

    pub fn with_team(mut self, team_id: TeamId) -> Self {
        self.subject.team_id = team_id;
        self
    }

    pub fn with_user(mut self, user_id: UserId) -> Self {
        self.subject.user_id = Some(user_id);
        self
    }

    /// Replaces the payload, keeping every envelope field.
    pub fn map_payload<Q>(self, f: impl FnOnce(P) -> Q) -> Event<Q> {
        Event {
            version: self.version,
            id: self.id,
            context: self.context,
            subject: self.subject,
            payload: f(self.payload),
        }
    }
}

impl<P: Into<EventPayload>> Event<P> {
    /// Forgets the static payload type.
    pub fn erase(self) -> Event<EventPayload> {
        self.map_payload(Into::into)
    }
}

// ─── Two-phase decode ───

#[derive(Deserialize)]
struct RawContext {
    #[serde(default, with = "nil_as_none")]
    parent_id: Option<EventId>,
    provider: Provider,
    scope: String,
    action: Action,
    source: String,
    timestamp: DateTime<Utc>,
}

#[derive(Deserialize)]
struct RawEvent {
    version: EventVersion,
    id: EventId,
    context: RawContext,
    subject: EventSubject,
    payload: Value,
}

impl RawEvent {
    fn into_event<P: Payload>(self) -> Result<Event<P>, DecodeError> {
        let scope = Scope::parse(&self.context.scope)
            .ok_or_else(|| DecodeError::UnsupportedScope(self.context.scope.clone()))?;
        let payload = P::decode(scope, self.payload)?;

        Ok(Event {
            version: self.version,
            id: self.id,
            context: EventContext {
                parent_id: self.context.parent_id,
                provider: self.context.provider,
                scope,
                action: self.context.action,
                source: self.context.source,
                timestamp: self.context.timestamp,
            },
            subject: self.subject,
            payload,
        })
    }
}

impl<'de, P: Payload> Deserialize<'de> for Event<P> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = RawEvent::deserialize(deserializer)?;
        raw.into_event().map_err(serde::de::Error::custom)
    }
}
