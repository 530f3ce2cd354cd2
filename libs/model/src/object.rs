//! Type-erased store objects.

use serde::{Deserialize, Serialize};

use crate::child::ChildRecord;
use crate::error::ModelError;
use crate::fleet::Fleet;
use crate::instance::{Instance, Service};
use crate::meta::ObjectMeta;

/// Kinds of object held by the cluster state store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectKind {
    Fleet,
    Child,
    Instance,
    Service,
}

impl ObjectKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectKind::Fleet => "fleet",
            ObjectKind::Child => "child",
            ObjectKind::Instance => "instance",
            ObjectKind::Service => "service",
        }
    }
}

impl std::fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ObjectKind {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fleet" => Ok(ObjectKind::Fleet),
            "child" => Ok(ObjectKind::Child),
            "instance" => Ok(ObjectKind::Instance),
            "service" => Ok(ObjectKind::Service),
            other => Err(ModelError::UnknownObjectKind(other.to_string())),
        }
    }
}

/// Address of an object in the store.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ObjectKey {
    pub kind: ObjectKind,
    pub namespace: String,
    pub name: String,
}

impl ObjectKey {
    pub fn new(kind: ObjectKind, namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind,
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    pub fn fleet(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self::new(ObjectKind::Fleet, namespace, name)
    }

    pub fn child(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self::new(ObjectKind::Child, namespace, name)
    }
}

impl std::fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.kind, self.namespace, self.name)
    }
}

/// Any object the store can hold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Object {
    Fleet(Fleet),
    Child(ChildRecord),
    Instance(Instance),
    Service(Service),
}

impl Object {
    pub fn kind(&self) -> ObjectKind {
        match self {
            Object::Fleet(_) => ObjectKind::Fleet,
            Object::Child(_) => ObjectKind::Child,
            Object::Instance(_) => ObjectKind::Instance,
            Object::Service(_) => ObjectKind::Service,
        }
    }

    pub fn meta(&self) -> &ObjectMeta {
        match self {
            Object::Fleet(o) => &o.metadata,
            Object::Child(o) => &o.metadata,
            Object::Instance(o) => &o.metadata,
            Object::Service(o) => &o.metadata,
        }
    }

    pub fn meta_mut(&mut self) -> &mut ObjectMeta {
        match self {
            Object::Fleet(o) => &mut o.metadata,
            Object::Child(o) => &mut o.metadata,
            Object::Instance(o) => &mut o.metadata,
            Object::Service(o) => &mut o.metadata,
        }
    }

    pub fn key(&self) -> ObjectKey {
        let meta = self.meta();
        ObjectKey::new(self.kind(), meta.namespace.clone(), meta.name.clone())
    }

    /// Returns true if both objects are the same kind with equal specs.
    ///
    /// Metadata and status are ignored.
    pub fn same_spec(&self, other: &Object) -> bool {
        match (self, other) {
            (Object::Fleet(a), Object::Fleet(b)) => a.spec == b.spec,
            (Object::Child(a), Object::Child(b)) => a.spec == b.spec,
            (Object::Instance(a), Object::Instance(b)) => a.spec == b.spec,
            (Object::Service(a), Object::Service(b)) => a.spec == b.spec,
            _ => false,
        }
    }

    pub fn into_fleet(self) -> Option<Fleet> {
        match self {
            Object::Fleet(o) => Some(o),
            _ => None,
        }
    }

    pub fn into_child(self) -> Option<ChildRecord> {
        match self {
            Object::Child(o) => Some(o),
            _ => None,
        }
    }

    pub fn into_instance(self) -> Option<Instance> {
        match self {
            Object::Instance(o) => Some(o),
            _ => None,
        }
    }

    pub fn into_service(self) -> Option<Service> {
        match self {
            Object::Service(o) => Some(o),
            _ => None,
        }
    }
}

impl From<Fleet> for Object {
    fn from(o: Fleet) -> Self {
        Object::Fleet(o)
    }
}

impl From<ChildRecord> for Object {
    fn from(o: ChildRecord) -> Self {
        Object::Child(o)
    }
}

impl From<Instance> for Object {
    fn from(o: Instance) -> Self {
        Object::Instance(o)
    }
}

impl From<Service> for Object {
    fn from(o: Service) -> Self {
        Object::Service(o)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fleet::FleetSpec;

    #[test]
    fn test_object_key_and_kind() {
        let fleet = Fleet::new(
            ObjectMeta::new("celery-test-1", "default"),
            FleetSpec {
                image: "celery:4".to_string(),
                ..Default::default()
            },
        );
        let object = Object::from(fleet.clone());
        assert_eq!(object.kind(), ObjectKind::Fleet);
        assert_eq!(object.key(), ObjectKey::fleet("default", "celery-test-1"));
        assert_eq!(object.key().to_string(), "fleet/default/celery-test-1");
        assert_eq!(object.clone().into_fleet(), Some(fleet));
        assert_eq!(object.into_child(), None);
    }

    #[test]
    fn test_same_spec_ignores_status() {
        let fleet = Fleet::new(
            ObjectMeta::new("celery-test-1", "default"),
            FleetSpec {
                image: "celery:4".to_string(),
                ..Default::default()
            },
        );
        let mut reported = fleet.clone();
        reported.status.workers = 2;
        reported.metadata.resource_version = 7;
        assert!(Object::from(fleet.clone()).same_spec(&Object::from(reported)));

        let mut changed = fleet.clone();
        changed.spec.image = "celery:5".to_string();
        assert!(!Object::from(fleet).same_spec(&Object::from(changed)));
    }

    #[test]
    fn test_object_kind_parse() {
        assert_eq!("service".parse::<ObjectKind>().unwrap(), ObjectKind::Service);
        assert!("pod".parse::<ObjectKind>().is_err());
    }
}
