//! Newtype wrappers for domain identifiers.
//!
//! Internal identifiers are UUIDs (v7, so they sort by creation time). Provider
//! identifiers are the integers GitHub assigns. Keeping them apart in the type
//! system prevents passing a GitHub repository id where an internal repo row id
//! is expected.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            /// Generates a fresh, time-ordered identifier.
            pub fn new() -> Self {
                $name(Uuid::now_v7())
            }

            /// The nil identifier, used as the "absent" sentinel on the wire.
            pub const fn nil() -> Self {
                $name(Uuid::nil())
            }

            pub fn is_nil(&self) -> bool {
                self.0.is_nil()
            }

            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::nil()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<Uuid> for $name {
            fn from(id: Uuid) -> Self {
                $name(id)
            }
        }
    };
}

uuid_id!(
    /// Identifier of a canonical event.
    EventId
);
uuid_id!(
    /// Identifier of an internal team.
    TeamId
);
uuid_id!(
    /// Identifier of an internal user.
    UserId
);
uuid_id!(
    /// Identifier of a tracked repository row.
    RepoRowId
);
uuid_id!(
    /// Identity of a repository as known to the downstream repository controller.
    CoreRepoId
);
uuid_id!(
    /// Identifier of one orchestration run.
    RunId
);

/// A GitHub App installation id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstallationId(pub i64);

impl fmt::Display for InstallationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for InstallationId {
    fn from(n: i64) -> Self {
        InstallationId(n)
    }
}

/// GitHub's numeric id for a repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GithubRepoId(pub i64);

impl fmt::Display for GithubRepoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for GithubRepoId {
    fn from(n: i64) -> Self {
        GithubRepoId(n)
    }
}

/// GitHub's numeric id for a user or organization account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GithubUserId(pub i64);

impl fmt::Display for GithubUserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for GithubUserId {
    fn from(n: i64) -> Self {
        GithubUserId(n)
    }
}

/// A GitHub webhook delivery ID (the `X-GitHub-Delivery` header).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeliveryId(pub String);

impl DeliveryId {
    pub fn new(s: impl Into<String>) -> Self {
        DeliveryId(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeliveryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for DeliveryId {
    fn from(s: String) -> Self {
        DeliveryId(s)
    }
}

/// Serde adapter for optional ids that travel as the nil UUID when absent.
///
/// `None` serializes as `00000000-0000-0000-0000-000000000000` and the nil UUID
/// deserializes back to `None`, so the field is always present on the wire.
pub mod nil_as_none {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use uuid::Uuid;

    pub fn serialize<T, S>(value: &Option<T>, serializer: S) -> Result<S::Ok, S::Error>
    where
        T: Copy + Into<Uuid>,
        S: Serializer,
    {
        value
            .map(Into::into)
            .unwrap_or_else(Uuid::nil)
            .serialize(serializer)
    }

    pub fn deserialize<'de, T, D>(deserializer: D) -> Result<Option<T>, D::Error>
    where
        T: From<Uuid>,
        D: Deserializer<'de>,
    {
        let raw = Option::<Uuid>::deserialize(deserializer)?;
        Ok(raw.filter(|id| !id.is_nil()).map(T::from))
    }
}

macro_rules! into_uuid {
    ($($name:ident),*) => {
        $(impl From<$name> for Uuid {
            fn from(id: $name) -> Uuid {
                id.0
            }
        })*
    };
}

into_uuid!(EventId, TeamId, UserId, RepoRowId, CoreRepoId, RunId);
