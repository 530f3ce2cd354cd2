//! Running instances and the services fronting them.

use serde::{Deserialize, Serialize};

use crate::child::ResourceRequirements;
use crate::meta::{Labels, ObjectMeta};
use crate::object::{ObjectKey, ObjectKind};

/// A named port exposed by a container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerPort {
    pub name: String,
    pub container_port: u16,
}

/// One execution unit inside an instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Container {
    pub name: String,
    pub image: String,

    #[serde(default)]
    pub command: Vec<String>,

    #[serde(default)]
    pub resources: ResourceRequirements,

    #[serde(default)]
    pub ports: Vec<ContainerPort>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceSpec {
    pub containers: Vec<Container>,
}

/// Lifecycle phase reported for an instance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstancePhase {
    #[default]
    Pending,
    Running,
    Failed,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceStatus {
    #[serde(default)]
    pub phase: InstancePhase,
}

/// A running unit tracked by the store (the engine's observed instance).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instance {
    pub metadata: ObjectMeta,
    pub spec: InstanceSpec,

    #[serde(default)]
    pub status: InstanceStatus,
}

impl Instance {
    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    /// Ordinal of an index-addressable instance.
    pub fn index(&self) -> Option<usize> {
        self.metadata.index()
    }

    pub fn key(&self) -> ObjectKey {
        ObjectKey::new(
            ObjectKind::Instance,
            self.metadata.namespace.clone(),
            self.metadata.name.clone(),
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServicePort {
    pub name: String,
    pub port: u16,
    pub target_port: u16,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceSpec {
    /// Instances whose labels match this selector receive traffic.
    pub selector: Labels,
    pub ports: Vec<ServicePort>,
}

/// Cluster-internal endpoint, used to expose a provisioned broker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Service {
    pub metadata: ObjectMeta,
    pub spec: ServiceSpec,
}
