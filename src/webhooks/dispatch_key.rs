//! Dispatch keys: the identity of a routed unit of work.
//!
//! Keys are dotted `block.element.element_id.mod.mod_id...` paths built from
//! stable dimensions of a delivery. Two deliveries that agree on every
//! dimension get the same key, which is what lets the orchestrator and the
//! repo dispatcher treat re-deliveries as the same instance.
//!
//! Caller-supplied segments are percent-escaped (`%` and `.`) so a value can
//! never spill into the next segment.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::{DeliveryId, InstallationId};

const PROVIDER: &str = "github";

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DispatchKey(String);

impl DispatchKey {
    /// `github.installation.<id>.action.<action>`
    pub fn installation(installation_id: InstallationId, action: &str) -> Self {
        DispatchKey(format!(
            "{PROVIDER}.installation.{}.action.{}",
            installation_id,
            escape(action)
        ))
    }

    /// `github.installation.<id>.repo.<name>.event.<kind>.eventid.<delivery>`
    pub fn repo_event(
        installation_id: InstallationId,
        repo_name: &str,
        event_kind: &str,
        delivery: &DeliveryId,
    ) -> Self {
        DispatchKey(format!(
            "{PROVIDER}.installation.{}.repo.{}.event.{}.eventid.{}",
            installation_id,
            escape(repo_name),
            escape(event_kind),
            escape(delivery.as_str())
        ))
    }

    /// `github.installation.<id>.event.installation_repositories.eventid.<delivery>`
    pub fn installation_repositories(
        installation_id: InstallationId,
        delivery: &DeliveryId,
    ) -> Self {
        DispatchKey(format!(
            "{PROVIDER}.installation.{}.event.installation_repositories.eventid.{}",
            installation_id,
            escape(delivery.as_str())
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// A form of the key usable as a file name.
    pub fn file_stem(&self) -> String {
        self.0
            .chars()
            .map(|c| match c {
                'a'..='z' | 'A'..='Z' | '0'..='9' | '.' | '-' | '_' | '%' => c,
                _ => '_',
            })
            .collect()
    }
}

impl fmt::Display for DispatchKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn escape(segment: &str) -> String {
    let mut out = String::with_capacity(segment.len());
    for c in segment.chars() {
        match c {
            '%' => out.push_str("%25"),
            '.' => out.push_str("%2E"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn installation_key_shape() {
        let key = DispatchKey::installation(InstallationId(42), "created");
        assert_eq!(key.as_str(), "github.installation.42.action.created");
    }

    #[test]
    fn repo_event_key_shape() {
        let key = DispatchKey::repo_event(
            InstallationId(42),
            "api",
            "push",
            &DeliveryId::new("72d3162e-cc78-11e3-81ab-4c9367dc0958"),
        );
        assert_eq!(
            key.as_str(),
            "github.installation.42.repo.api.event.push.eventid.72d3162e-cc78-11e3-81ab-4c9367dc0958"
        );
    }

    #[test]
    fn installation_repositories_key_shape() {
        let key = DispatchKey::installation_repositories(InstallationId(42), &DeliveryId::new("d1"));
        assert_eq!(
            key.as_str(),
            "github.installation.42.event.installation_repositories.eventid.d1"
        );
    }

    #[test]
    fn dotted_repo_names_do_not_collide() {
        // "a.b" + kind "c" must differ from "a" + kind "b.c".
        let d = DeliveryId::new("1");
        let left = DispatchKey::repo_event(InstallationId(1), "a.b", "c", &d);
        let right = DispatchKey::repo_event(InstallationId(1), "a", "b.c", &d);
        assert_ne!(left, right);
        assert_eq!(left.as_str(), "github.installation.1.repo.a%2Eb.event.c.eventid.1");
    }

    #[test]
    fn escaping_is_injective_on_percent() {
        assert_ne!(escape("%2E"), escape("."));
        assert_eq!(escape("%2E"), "%252E");
    }

    #[test]
    fn file_stem_replaces_path_separators() {
        let key = DispatchKey::repo_event(InstallationId(1), "a/b", "push", &DeliveryId::new("x"));
        assert!(!key.file_stem().contains('/'));
    }

    proptest! {
        /// Identical dimensions give identical keys; changing any one changes the key.
        #[test]
        fn prop_repo_key_is_deterministic_and_injective(
            inst in any::<i64>(),
            repo in ".{0,12}",
            kind in "[a-z_.%]{1,12}",
            delivery in ".{0,12}",
            other in ".{0,12}",
        ) {
            let d = DeliveryId::new(delivery.clone());
            let key = DispatchKey::repo_event(InstallationId(inst), &repo, &kind, &d);
            prop_assert_eq!(&key, &DispatchKey::repo_event(InstallationId(inst), &repo, &kind, &d));

            prop_assert_ne!(
                &key,
                &DispatchKey::repo_event(InstallationId(inst.wrapping_add(1)), &repo, &kind, &d)
            );
            if other != repo {
                prop_assert_ne!(&key, &DispatchKey::repo_event(InstallationId(inst), &other, &kind, &d));
            }
            if other != kind {
                prop_assert_ne!(&key, &DispatchKey::repo_event(InstallationId(inst), &repo, &other, &d));
            }
            if other != delivery {
                let d2 = DeliveryId::new(other.clone());
                prop_assert_ne!(&key, &DispatchKey::repo_event(InstallationId(inst), &repo, &kind, &d2));
            }
        }

        #[test]
        fn prop_installation_key_is_injective(inst in any::<i64>(), a in ".{0,12}", b in ".{0,12}") {
            let ka = DispatchKey::installation(InstallationId(inst), &a);
            let kb = DispatchKey::installation(InstallationId(inst), &b);
            prop_assert_eq!(a == b, ka == kb);
        }
    }
}
