//! Pure planning of one fleet pass and one child pass.
//!
//! The orchestrators read observed state, call into here, and apply the
//! returned plan. Nothing in this module touches the store.

use fleet_model::{
    matches, ChildKind, ChildRecord, ChildStatus, ConvergenceStatus, Fleet, FleetStatus, Instance,
    InstanceSpec, InstanceStatus, ObjectKey, ObjectKind, ObjectMeta, OwnerIdentity, Service,
};
use tracing::debug;

use crate::balancer::{self, plan_records, Creation, PlanPath, RecordPlan};
use crate::composer::expand;
use crate::error::ReconcileResult;
use crate::profile::KindProfile;
use crate::propagator::{resolve_broker_address, BrokerResolution, ProvisionAction};
use crate::IdentityAllocator;

/// Child records currently stored for a fleet.
#[derive(Debug, Clone, Default)]
pub struct ObservedChildren {
    /// Broker records and services, selected by `kind=broker`.
    pub brokers: Vec<ChildRecord>,
    pub services: Vec<Service>,

    pub schedulers: Vec<ChildRecord>,
    pub workers: Vec<ChildRecord>,
}

/// Everything a fleet pass has to apply, in order.
#[derive(Debug, Clone)]
pub struct FleetPlan {
    /// Broker objects to ensure before any other child is touched.
    pub broker: BrokerResolution,

    /// Broker objects the resolution no longer ensures, e.g. after a switch
    /// to an external broker. Deleting a record collects its instances.
    pub retired: Vec<ObjectKey>,

    pub schedulers: RecordPlan,
    pub workers: RecordPlan,

    /// Status to write once the plan is applied.
    pub status: FleetStatus,
}

impl FleetPlan {
    pub fn is_empty(&self) -> bool {
        self.retired.is_empty() && self.schedulers.is_empty() && self.workers.is_empty()
    }
}

/// Plans a fleet pass.
///
/// The broker address is resolved first; a configuration error there aborts
/// the pass before any record plan exists. Observed records that do not
/// carry this fleet's identity are ignored.
pub fn plan_fleet(fleet: &Fleet, observed: ObservedChildren) -> ReconcileResult<FleetPlan> {
    let broker = resolve_broker_address(fleet)?;
    let expansion = expand(fleet, &broker.address)?;
    let owner = OwnerIdentity::of(&fleet.metadata);

    let status = FleetStatus {
        broker_address: Some(broker.address.clone()),
        schedulers: count(&expansion.schedulers),
        workers: count(&expansion.workers),
        last_error: None,
        observed_generation: fleet.metadata.generation,
    };

    let schedulers = plan_records(
        expansion.schedulers,
        owned(observed.schedulers, &owner, ChildKind::Scheduler),
    );
    let workers = plan_records(
        expansion.workers,
        owned(observed.workers, &owner, ChildKind::Worker),
    );
    let retired = retired_broker_objects(&broker, &owner, &observed.brokers, &observed.services);

    Ok(FleetPlan {
        broker,
        retired,
        schedulers,
        workers,
        status,
    })
}

/// Status recording a configuration error on `fleet`.
///
/// Previously reported counts and address are kept.
pub fn failed_status(fleet: &Fleet, message: impl Into<String>) -> FleetStatus {
    FleetStatus {
        last_error: Some(message.into()),
        observed_generation: fleet.metadata.generation,
        ..fleet.status.clone()
    }
}

/// Owned broker objects that `broker` does not ensure, services first.
fn retired_broker_objects(
    broker: &BrokerResolution,
    owner: &OwnerIdentity,
    records: &[ChildRecord],
    services: &[Service],
) -> Vec<ObjectKey> {
    let ensured = |kind: ObjectKind, name: &str| {
        broker.actions.iter().any(|action| {
            let action_kind = match action {
                ProvisionAction::EnsureService(_) => ObjectKind::Service,
                ProvisionAction::EnsureRecord(_) => ObjectKind::Child,
            };
            action_kind == kind && action.name() == name
        })
    };

    let services = services
        .iter()
        .map(|service| (ObjectKind::Service, &service.metadata));
    let records = records
        .iter()
        .map(|record| (ObjectKind::Child, &record.metadata));

    services
        .chain(records)
        .filter(|(_, meta)| matches(meta, owner, ChildKind::Broker))
        .filter(|(kind, meta)| !ensured(*kind, meta.name.as_str()))
        .map(|(kind, meta)| ObjectKey::new(kind, meta.namespace.clone(), meta.name.clone()))
        .collect()
}

fn count(records: &[ChildRecord]) -> u32 {
    u32::try_from(records.len()).unwrap_or(u32::MAX)
}

fn owned(records: Vec<ChildRecord>, owner: &OwnerIdentity, kind: ChildKind) -> Vec<ChildRecord> {
    records
        .into_iter()
        .filter(|record| {
            let mine = matches(&record.metadata, owner, kind);
            if !mine {
                debug!(record = %record.metadata.name, owner = %owner, "ignoring foreign record");
            }
            mine
        })
        .collect()
}

/// Everything a child pass has to apply, in order.
#[derive(Debug, Clone, PartialEq)]
pub struct ChildPlan {
    pub path: PlanPath,

    /// Applied first.
    pub to_delete: Vec<Instance>,

    /// Fully materialized, applied after deletions.
    pub to_create: Vec<Instance>,

    /// Status to write once the plan is applied.
    pub status: ChildStatus,
}

impl ChildPlan {
    pub fn is_empty(&self) -> bool {
        self.to_delete.is_empty() && self.to_create.is_empty()
    }
}

/// Plans a child pass for a stored `record`.
///
/// `observed` may contain instances of other owners; they are filtered out
/// and never planned for deletion.
pub fn plan_child(
    record: &ChildRecord,
    observed: Vec<Instance>,
    allocator: &mut IdentityAllocator,
) -> ReconcileResult<ChildPlan> {
    let kind = record.kind();
    let profile = KindProfile::of(kind);
    let owner = OwnerIdentity::of(&record.metadata);

    let mine: Vec<Instance> = observed
        .into_iter()
        .filter(|instance| matches(&instance.metadata, &owner, kind))
        .collect();

    let desired = record.spec.replicas as usize;
    let plan = balancer::plan(
        desired,
        &record.spec.template,
        mine,
        &record.metadata.name,
        profile.identity_style,
        allocator,
    );

    let to_create = plan
        .to_create
        .iter()
        .map(|creation| materialize(record, creation))
        .collect::<ReconcileResult<Vec<_>>>()?;

    let convergence = match plan.path {
        PlanPath::Steady => ConvergenceStatus::Converged,
        PlanPath::Scale => ConvergenceStatus::Converging,
        PlanPath::Drift => ConvergenceStatus::Diverged,
    };

    let broker_address = (kind == ChildKind::Broker)
        .then(|| record.spec.template.broker_address.clone())
        .filter(|address| !address.is_empty());

    Ok(ChildPlan {
        path: plan.path,
        to_delete: plan.to_delete,
        to_create,
        status: ChildStatus {
            replicas: record.spec.replicas,
            convergence,
            broker_address,
        },
    })
}

/// Builds the instance for `creation`, labelled and owned by `record`.
pub fn materialize(record: &ChildRecord, creation: &Creation) -> ReconcileResult<Instance> {
    let kind = record.kind();
    let owner = OwnerIdentity::of(&record.metadata);
    let labels = match creation.index {
        Some(index) => owner.indexed_labels(kind, index),
        None => owner.labels(kind),
    };

    let mut metadata = ObjectMeta::new(creation.name.clone(), record.metadata.namespace.clone())
        .with_labels(labels);
    metadata.set_owner(ObjectKind::Child, &record.metadata)?;

    Ok(Instance {
        metadata,
        spec: InstanceSpec {
            containers: vec![KindProfile::of(kind).container(&record.spec.template)],
        },
        status: InstanceStatus::default(),
    })
}
