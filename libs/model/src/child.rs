//! Child records: the per-entry expansion of a fleet.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::ModelError;
use crate::instance::ContainerPort;
use crate::meta::ObjectMeta;

/// The kinds of child a fleet expands into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChildKind {
    Broker,
    Scheduler,
    Worker,
}

impl ChildKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChildKind::Broker => "broker",
            ChildKind::Scheduler => "scheduler",
            ChildKind::Worker => "worker",
        }
    }
}

impl std::fmt::Display for ChildKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ChildKind {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "broker" => Ok(ChildKind::Broker),
            "scheduler" => Ok(ChildKind::Scheduler),
            "worker" => Ok(ChildKind::Worker),
            other => Err(ModelError::UnknownKind(other.to_string())),
        }
    }
}

/// Compute resources for an execution unit, e.g. `{"cpu": "500m"}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceRequirements {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub limits: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub requests: BTreeMap<String, String>,
}

/// Fully derived execution template for one child.
///
/// Computed from the fleet spec plus the resolved broker address; never
/// mutated after derivation within a pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChildTemplate {
    pub image: String,

    /// Full command line. Empty means "use the image entrypoint".
    #[serde(default)]
    pub command: Vec<String>,

    #[serde(default)]
    pub resources: ResourceRequirements,

    #[serde(default)]
    pub target_queues: Vec<String>,

    #[serde(default)]
    pub broker_address: String,

    #[serde(default)]
    pub ports: Vec<ContainerPort>,
}

/// Desired state of one child record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChildSpec {
    pub kind: ChildKind,
    pub replicas: u32,
    pub template: ChildTemplate,
}

/// Convergence status for a child record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConvergenceStatus {
    /// Observed instances match the record.
    Converged,

    /// Actions were applied this pass; the next pass should find it converged.
    Converging,

    /// Instances drifted from the template and are being replaced.
    Diverged,

    /// Not reconciled yet.
    #[default]
    Unknown,
}

/// Observed state of a child record, written by the engine.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChildStatus {
    /// Instances present after the last pass.
    #[serde(default)]
    pub replicas: u32,

    #[serde(default)]
    pub convergence: ConvergenceStatus,

    /// Set on broker records only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub broker_address: Option<String>,
}

/// Stored child record (one broker, one per scheduler entry, one per worker entry).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChildRecord {
    pub metadata: ObjectMeta,
    pub spec: ChildSpec,

    #[serde(default)]
    pub status: ChildStatus,
}

impl ChildRecord {
    pub fn kind(&self) -> ChildKind {
        self.spec.kind
    }
}
