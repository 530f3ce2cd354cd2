//! Broker address resolution.
//!
//! External brokers pass their declared address through. Provisioned brokers
//! get a deterministic canonical address derived from the fleet identity,
//! so it is known before the broker instance exists.

use fleet_model::{
    BrokerMode, ChildKind, ChildRecord, Fleet, ObjectKind, ObjectMeta, OwnerIdentity, Service,
    ServicePort, ServiceSpec,
};

use crate::composer::broker_record;
use crate::error::{ReconcileError, ReconcileResult};
use crate::identity::{broker_record_name, broker_service_name};
use crate::profile::BROKER_PORT;

/// Object that must exist for a provisioned broker to be reachable.
#[derive(Debug, Clone, PartialEq)]
pub enum ProvisionAction {
    EnsureService(Service),
    EnsureRecord(ChildRecord),
}

impl ProvisionAction {
    pub fn name(&self) -> &str {
        match self {
            ProvisionAction::EnsureService(service) => &service.metadata.name,
            ProvisionAction::EnsureRecord(record) => &record.metadata.name,
        }
    }
}

/// Result of [`resolve_broker_address`].
#[derive(Debug, Clone, PartialEq)]
pub struct BrokerResolution {
    /// Never empty.
    pub address: String,

    /// Empty for external brokers.
    pub actions: Vec<ProvisionAction>,
}

/// `redis://{fleet}-broker-service.{namespace}`.
pub fn canonical_address(fleet: &ObjectMeta) -> String {
    format!(
        "redis://{}.{}",
        broker_service_name(&fleet.name),
        fleet.namespace
    )
}

/// Resolves the address schedulers and workers connect to.
///
/// An external broker without an address is a configuration error; no
/// partial state is produced.
pub fn resolve_broker_address(fleet: &Fleet) -> ReconcileResult<BrokerResolution> {
    match fleet.spec.broker.mode {
        BrokerMode::External => {
            let address = fleet
                .spec
                .broker
                .address
                .as_deref()
                .map(str::trim)
                .filter(|address| !address.is_empty())
                .ok_or_else(|| {
                    ReconcileError::Configuration(
                        "broker address hasn't been set for external broker".to_string(),
                    )
                })?;

            Ok(BrokerResolution {
                address: address.to_string(),
                actions: Vec::new(),
            })
        }
        BrokerMode::Redis => {
            let address = canonical_address(&fleet.metadata);
            let record = broker_record(fleet, &address)?;
            let service = broker_service(fleet)?;

            Ok(BrokerResolution {
                address,
                actions: vec![
                    ProvisionAction::EnsureService(service),
                    ProvisionAction::EnsureRecord(record),
                ],
            })
        }
    }
}

/// Service routing the canonical address to the broker record's instances.
fn broker_service(fleet: &Fleet) -> ReconcileResult<Service> {
    let record_name = broker_record_name(&fleet.metadata.name);
    let selector = OwnerIdentity::new(fleet.metadata.namespace.clone(), record_name)
        .labels(ChildKind::Broker);

    let mut metadata = ObjectMeta::new(
        broker_service_name(&fleet.metadata.name),
        fleet.metadata.namespace.clone(),
    )
    .with_labels(OwnerIdentity::of(&fleet.metadata).labels(ChildKind::Broker));
    metadata.set_owner(ObjectKind::Fleet, &fleet.metadata)?;

    Ok(Service {
        metadata,
        spec: ServiceSpec {
            selector,
            ports: vec![ServicePort {
                name: "redis".to_string(),
                port: BROKER_PORT,
                target_port: BROKER_PORT,
            }],
        },
    })
}
