//! The user-declared fleet (the parent object).

use serde::{Deserialize, Serialize};

use crate::child::ResourceRequirements;
use crate::meta::ObjectMeta;

/// How the broker is supplied.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BrokerMode {
    /// Provision a redis broker inside the cluster.
    #[default]
    Redis,

    /// Use the address given in the descriptor.
    External,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrokerDescriptor {
    #[serde(default, rename = "type")]
    pub mode: BrokerMode,

    /// Required in external mode, ignored otherwise.
    #[serde(default, rename = "brokerAddress", skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchedulerDescriptor {
    /// Omitted means the kind default (1). Zero is honored.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replicas: Option<u32>,

    pub app_name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduler_class: Option<String>,

    #[serde(default)]
    pub resources: ResourceRequirements,

    /// Falls back to the fleet image.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerDescriptor {
    /// Omitted means the kind default (1). Zero is honored.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replicas: Option<u32>,

    pub app_name: String,

    #[serde(default)]
    pub target_queues: Vec<String>,

    #[serde(default)]
    pub resources: ResourceRequirements,

    /// Falls back to the fleet image.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,

    // Autoscaling bounds are accepted for schema compatibility; nothing
    // reads them.
    #[serde(default)]
    pub autoscaling: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FleetSpec {
    #[serde(default)]
    pub broker: BrokerDescriptor,

    #[serde(default)]
    pub schedulers: Vec<SchedulerDescriptor>,

    #[serde(default)]
    pub workers: Vec<WorkerDescriptor>,

    /// Default execution image for schedulers and workers.
    pub image: String,
}

/// Status written back onto the fleet by the engine.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FleetStatus {
    /// How to reach the fleet's broker.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub broker_address: Option<String>,

    #[serde(default)]
    pub schedulers: u32,

    #[serde(default)]
    pub workers: u32,

    /// Configuration error from the last pass, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,

    /// Generation of the spec this status describes.
    #[serde(default)]
    pub observed_generation: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fleet {
    pub metadata: ObjectMeta,
    pub spec: FleetSpec,

    #[serde(default)]
    pub status: FleetStatus,
}

impl Fleet {
    pub fn new(metadata: ObjectMeta, spec: FleetSpec) -> Self {
        Self {
            metadata,
            spec,
            status: FleetStatus::default(),
        }
    }
}
