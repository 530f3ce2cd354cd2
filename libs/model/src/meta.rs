//! Object metadata, ownership and label selection.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::child::ChildKind;
use crate::error::ModelError;
use crate::object::ObjectKind;

/// Label keys the engine stamps on every child object.
pub mod labels {
    /// Name of the owning object (fleet for records, record for instances).
    pub const OWNER: &str = "fleet.celeryproject.org/owner";

    /// Child kind (`broker`, `scheduler`, `worker`).
    pub const KIND: &str = "fleet.celeryproject.org/kind";

    /// Zero-based ordinal for index-addressable children.
    ///
    /// Informational only; selectors never include it.
    pub const INDEX: &str = "fleet.celeryproject.org/index";
}

/// Label set attached to an object.
pub type Labels = BTreeMap<String, String>;

/// Store-assigned unique object identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Uid(Ulid);

impl Uid {
    /// Creates a fresh identifier.
    #[must_use]
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for Uid {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for Uid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "uid_{}", self.0)
    }
}

/// Reference from a child to the object that controls it.
///
/// The store deletes every object whose owner reference points at a deleted
/// object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnerReference {
    pub kind: ObjectKind,
    pub name: String,
    pub uid: Uid,
}

impl std::fmt::Display for OwnerReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.kind, self.name)
    }
}

/// Metadata common to every stored object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectMeta {
    pub name: String,
    pub namespace: String,

    #[serde(default)]
    pub uid: Uid,

    #[serde(default)]
    pub labels: Labels,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<OwnerReference>,

    /// Optimistic concurrency token. Zero means "never stored".
    #[serde(default)]
    pub resource_version: u64,

    /// Bumped by the store when the spec changes; status writes leave it alone.
    #[serde(default)]
    pub generation: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl ObjectMeta {
    /// Metadata for a new, not yet stored object.
    pub fn new(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            uid: Uid::new(),
            labels: Labels::new(),
            owner: None,
            resource_version: 0,
            generation: 0,
            created_at: None,
        }
    }

    /// Adds labels, replacing existing keys.
    #[must_use]
    pub fn with_labels(mut self, labels: Labels) -> Self {
        self.labels.extend(labels);
        self
    }

    /// Makes `owner` the controlling owner of this object.
    ///
    /// Setting the same owner twice is a no-op. An object can have only one
    /// controlling owner, and it must live in the same namespace.
    pub fn set_owner(&mut self, kind: ObjectKind, owner: &ObjectMeta) -> Result<(), ModelError> {
        if owner.namespace != self.namespace {
            return Err(ModelError::CrossNamespaceOwner {
                child: self.namespace.clone(),
                owner: owner.namespace.clone(),
            });
        }

        let reference = OwnerReference {
            kind,
            name: owner.name.clone(),
            uid: owner.uid,
        };

        match &self.owner {
            Some(existing) if existing.uid != reference.uid => Err(ModelError::AlreadyOwned {
                name: self.name.clone(),
                owner: existing.to_string(),
            }),
            _ => {
                self.owner = Some(reference);
                Ok(())
            }
        }
    }

    /// Ordinal from the index label, if present and well formed.
    pub fn index(&self) -> Option<usize> {
        self.labels.get(labels::INDEX)?.parse().ok()
    }

    /// Owner identity recorded in the labels, if any.
    pub fn owner_identity(&self) -> Option<OwnerIdentity> {
        self.labels
            .get(labels::OWNER)
            .map(|name| OwnerIdentity::new(self.namespace.clone(), name.clone()))
    }
}

/// Identity that partitions "my children" from every other object.
///
/// Carried on child records (owner = fleet) and instances (owner = record)
/// as the `{owner, kind}` label pair.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct OwnerIdentity {
    pub namespace: String,
    pub name: String,
}

impl OwnerIdentity {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Identity of the object described by `meta`.
    pub fn of(meta: &ObjectMeta) -> Self {
        Self::new(meta.namespace.clone(), meta.name.clone())
    }

    /// The `{owner, kind}` labels for a child of this owner.
    pub fn labels(&self, kind: ChildKind) -> Labels {
        let mut set = Labels::new();
        set.insert(labels::OWNER.to_string(), self.name.clone());
        set.insert(labels::KIND.to_string(), kind.as_str().to_string());
        set
    }

    /// Same as [`OwnerIdentity::labels`] plus the ordinal label.
    pub fn indexed_labels(&self, kind: ChildKind, index: usize) -> Labels {
        let mut set = self.labels(kind);
        set.insert(labels::INDEX.to_string(), index.to_string());
        set
    }

    /// Selector for the children of this owner with the given kind.
    pub fn selector(&self, kind: ChildKind) -> LabelSelector {
        LabelSelector::new(self.labels(kind))
    }
}

impl std::fmt::Display for OwnerIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Returns true if `meta` is a `kind` child of `owner`.
pub fn matches(meta: &ObjectMeta, owner: &OwnerIdentity, kind: ChildKind) -> bool {
    meta.namespace == owner.namespace && owner.selector(kind).matches(&meta.labels)
}

/// Exact-match conjunction over labels.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelSelector {
    pub match_labels: Labels,
}

impl LabelSelector {
    pub fn new(match_labels: Labels) -> Self {
        Self { match_labels }
    }

    /// Selector that matches everything.
    pub fn everything() -> Self {
        Self::default()
    }

    pub fn matches(&self, labels: &Labels) -> bool {
        self.match_labels
            .iter()
            .all(|(k, v)| labels.get(k) == Some(v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_selector_is_exact_conjunction() {
        let owner = OwnerIdentity::new("default", "fleet-a");
        let selector = owner.selector(ChildKind::Worker);

        let mut set = owner.indexed_labels(ChildKind::Worker, 3);
        assert!(selector.matches(&set));

        set.insert(labels::KIND.to_string(), "scheduler".to_string());
        assert!(!selector.matches(&set));

        assert!(!selector.matches(&Labels::new()));
        assert!(LabelSelector::everything().matches(&Labels::new()));
    }

    #[test]
    fn test_matches_respects_namespace() {
        let owner = OwnerIdentity::new("default", "fleet-a");
        let meta = ObjectMeta::new("fleet-a-worker-1", "default")
            .with_labels(owner.labels(ChildKind::Worker));
        assert!(matches(&meta, &owner, ChildKind::Worker));
        assert!(!matches(&meta, &owner, ChildKind::Scheduler));

        let elsewhere = OwnerIdentity::new("other", "fleet-a");
        assert!(!matches(&meta, &elsewhere, ChildKind::Worker));
    }

    #[test]
    fn test_set_owner() {
        let parent = ObjectMeta::new("fleet-a", "default");
        let mut child = ObjectMeta::new("fleet-a-broker", "default");

        child.set_owner(ObjectKind::Fleet, &parent).unwrap();
        // Same owner again is fine.
        child.set_owner(ObjectKind::Fleet, &parent).unwrap();
        assert_eq!(child.owner.as_ref().unwrap().name, "fleet-a");

        let other = ObjectMeta::new("fleet-b", "default");
        let err = child.set_owner(ObjectKind::Fleet, &other).unwrap_err();
        assert!(err.is_ownership_error());

        let foreign = ObjectMeta::new("fleet-c", "kube-system");
        let mut orphan = ObjectMeta::new("x", "default");
        assert!(matches!(
            orphan.set_owner(ObjectKind::Fleet, &foreign),
            Err(ModelError::CrossNamespaceOwner { .. })
        ));
    }

    #[test]
    fn test_index_label() {
        let owner = OwnerIdentity::new("default", "fleet-a");
        let meta = ObjectMeta::new("fleet-a-worker-3", "default")
            .with_labels(owner.indexed_labels(ChildKind::Worker, 2));
        assert_eq!(meta.index(), Some(2));
        assert_eq!(meta.owner_identity(), Some(owner));

        let bare = ObjectMeta::new("x", "default");
        assert_eq!(bare.index(), None);
        assert_eq!(bare.owner_identity(), None);
    }
}
