//! Field and compatibility checks for [`Event`].

use chrono::{DateTime, Utc};
use std::fmt;

use super::envelope::Event;
use super::kinds::SubjectName;
use super::payload::Payload;

/// Envelope fields a validation error can point at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventField {
    Version,
    Id,
    ContextAction,
    ContextScope,
    ContextSource,
    ContextTimestamp,
    SubjectId,
    SubjectTeamId,
    SubjectName,
}

impl EventField {
    pub fn path(&self) -> &'static str {
        match self {
            EventField::Version => "Version",
            EventField::Id => "ID",
            EventField::ContextAction => "Context.Action",
            EventField::ContextScope => "Context.Scope",
            EventField::ContextSource => "Context.Source",
            EventField::ContextTimestamp => "Context.Timestamp",
            EventField::SubjectId => "Subject.ID",
            EventField::SubjectTeamId => "Subject.TeamID",
            EventField::SubjectName => "Subject.Name",
        }
    }
}

impl fmt::Display for EventField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path())
    }
}

/// A field-scoped validation failure. `value` is the offending value as text.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid {field}: {value}")]
pub struct ValidationError {
    pub field: EventField,
    pub value: String,
}

impl ValidationError {
    fn new(field: EventField, value: impl fmt::Display) -> Self {
        ValidationError {
            field,
            value: value.to_string(),
        }
    }
}

fn is_unset(ts: &DateTime<Utc>) -> bool {
    *ts == DateTime::<Utc>::default()
}

impl<P: Payload> Event<P> {
    /// Checks that every required field is set and that the payload's scope
    /// and action are allowed for its kind. Reports the first failure.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.must()?;
        self.types()
    }

    fn must(&self) -> Result<(), ValidationError> {
        if self.version.is_empty() {
            return Err(ValidationError::new(EventField::Version, &self.version));
        }
        if self.id.is_nil() {
            return Err(ValidationError::new(EventField::Id, self.id));
        }
        if self.context.action.is_empty() {
            return Err(ValidationError::new(
                EventField::ContextAction,
                &self.context.action,
            ));
        }
        if self.context.source.is_empty() {
            return Err(ValidationError::new(
                EventField::ContextSource,
                &self.context.source,
            ));
        }
        if is_unset(&self.context.timestamp) {
            return Err(ValidationError::new(
                EventField::ContextTimestamp,
                self.context.timestamp.to_rfc3339(),
            ));
        }
        if self.subject.id.is_nil() {
            return Err(ValidationError::new(EventField::SubjectId, self.subject.id));
        }
        if self.subject.team_id.is_nil() {
            return Err(ValidationError::new(
                EventField::SubjectTeamId,
                self.subject.team_id,
            ));
        }
        if SubjectName::parse(&self.subject.name).is_none() {
            return Err(ValidationError::new(
                EventField::SubjectName,
                &self.subject.name,
            ));
        }
        Ok(())
    }

    fn types(&self) -> Result<(), ValidationError> {
        if !self.payload.scopes().contains(&self.context.scope) {
            return Err(ValidationError::new(
                EventField::ContextScope,
                self.context.scope,
            ));
        }
        if !self.payload.actions().contains(&self.context.action) {
            return Err(ValidationError::new(
                EventField::ContextAction,
                &self.context.action,
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::kinds::{Action, EventVersion, Provider, Scope};
    use crate::events::payload::{EventPayload, fixtures};
    use crate::types::ids::{EventId, TeamId};
    use proptest::prelude::*;
    use uuid::Uuid;

    fn complete(payload: EventPayload) -> Event<EventPayload> {
        let action = payload.actions()[0].clone();
        Event::new(Provider::Github, payload, action)
            .with_source("https://github.com/acme/api")
            .with_subject(Uuid::now_v7(), "repos")
            .with_team(TeamId::new())
            .with_timestamp(fixtures::ts())
    }

    fn field_of(event: &Event<EventPayload>) -> Option<EventField> {
        event.validate().err().map(|e| e.field)
    }

    // ─── Required fields ───

    #[test]
    fn complete_events_validate() {
        for payload in fixtures::all() {
            let event = complete(payload);
            assert_eq!(event.validate(), Ok(()), "{}", event.payload.kind_name());
        }
    }

    #[test]
    fn empty_version_is_rejected() {
        let mut event = complete(fixtures::push().into());
        event.version = EventVersion(String::new());
        assert_eq!(field_of(&event), Some(EventField::Version));
    }

    #[test]
    fn nil_id_is_rejected() {
        let mut event = complete(fixtures::push().into());
        event.id = EventId::nil();
        assert_eq!(field_of(&event), Some(EventField::Id));
    }

    #[test]
    fn empty_action_is_rejected_before_scope_check() {
        let event = complete(fixtures::push().into())
            .with_action(Action::from(""))
            .with_scope(Scope::Tag);
        assert_eq!(field_of(&event), Some(EventField::ContextAction));
    }

    #[test]
    fn empty_source_is_rejected() {
        let event = complete(fixtures::push().into()).with_source("");
        assert_eq!(field_of(&event), Some(EventField::ContextSource));
    }

    #[test]
    fn unset_timestamp_is_rejected() {
        let event = complete(fixtures::push().into()).with_timestamp(DateTime::<Utc>::default());
        assert_eq!(field_of(&event), Some(EventField::ContextTimestamp));
    }

    #[test]
    fn nil_subject_and_team_are_rejected() {
        let event = complete(fixtures::push().into()).with_subject(Uuid::nil(), "repos");
        assert_eq!(field_of(&event), Some(EventField::SubjectId));

        let event = complete(fixtures::push().into()).with_team(TeamId::nil());
        assert_eq!(field_of(&event), Some(EventField::SubjectTeamId));
    }

    #[test]
    fn subject_must_name_an_allowed_table() {
        for name in ["users", "", "Repos"] {
            let event = complete(fixtures::push().into()).with_subject(Uuid::now_v7(), name);
            assert_eq!(field_of(&event), Some(EventField::SubjectName), "{name:?}");
        }
        let event = complete(fixtures::push().into()).with_subject(Uuid::now_v7(), "stack");
        assert_eq!(event.validate(), Ok(()));
    }

    #[test]
    fn error_message_names_field_and_value() {
        let event = complete(fixtures::push().into()).with_subject(Uuid::now_v7(), "users");
        let err = event.validate().unwrap_err();
        assert_eq!(err.to_string(), "invalid Subject.Name: users");
    }

    // ─── Compatibility table ───

    fn allowed(scope: Scope) -> &'static [Action] {
        match scope {
            Scope::Branch | Scope::Tag => &[Action::Created, Action::Deleted],
            Scope::Push => &[Action::Created],
            Scope::PullRequest => &[
                Action::Created,
                Action::Updated,
                Action::Reopened,
                Action::Closed,
                Action::Merged,
            ],
            Scope::PullRequestReview => &[
                Action::Created,
                Action::Updated,
                Action::Dismissed,
                Action::Requested,
            ],
            Scope::PullRequestLabel => &[Action::Added, Action::Deleted],
            Scope::PullRequestComment => &[Action::Created, Action::Updated, Action::Deleted],
            Scope::PullRequestThread => &[Action::Created, Action::Deleted],
            Scope::Rebase => &[Action::Created, Action::Abandoned],
            Scope::MergeConflict => &[Action::Created],
            Scope::LineExceed => &[Action::Created],
        }
    }

    #[test]
    fn table_is_exhaustive_over_variants_scopes_and_actions() {
        for payload in fixtures::all() {
            let home = payload.scopes();
            for scope in Scope::ALL {
                for action in Action::KNOWN {
                    let event = complete(payload.clone())
                        .with_scope(scope)
                        .with_action(action.clone());
                    let result = event.validate();

                    if !home.contains(&scope) {
                        assert_eq!(
                            result.map_err(|e| e.field),
                            Err(EventField::ContextScope),
                            "{} under {scope}",
                            payload.kind_name()
                        );
                    } else if allowed(scope).contains(&action) {
                        assert_eq!(result, Ok(()), "{} {scope}/{action}", payload.kind_name());
                    } else {
                        assert_eq!(
                            result.map_err(|e| e.field),
                            Err(EventField::ContextAction),
                            "{} {scope}/{action}",
                            payload.kind_name()
                        );
                    }
                }
            }
        }
    }

    #[test]
    fn branch_payload_accepts_tag_scope() {
        let event = complete(fixtures::branch().into())
            .with_scope(Scope::Tag)
            .with_action(Action::Deleted);
        assert_eq!(event.validate(), Ok(()));
    }

    proptest! {
        #[test]
        fn unknown_actions_never_validate(verb in "[a-z]{1,10}") {
            prop_assume!(Action::KNOWN.iter().all(|a| a.as_str() != verb));
            for payload in fixtures::all() {
                let event = complete(payload).with_action(Action::from(verb.as_str()));
                prop_assert_eq!(field_of(&event), Some(EventField::ContextAction));
            }
        }
    }
}
