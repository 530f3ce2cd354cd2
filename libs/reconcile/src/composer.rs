//! Fleet expansion into child records.
//!
//! One record per scheduler entry, one per worker entry, and one broker
//! record when the broker is provisioned. Records are owned by the fleet and
//! labelled with the fleet identity so the fleet pass can find them again.

use fleet_model::{
    BrokerMode, ChildKind, ChildRecord, ChildSpec, ChildStatus, Fleet, ObjectKind, ObjectMeta,
    OwnerIdentity,
};

use crate::error::{ReconcileError, ReconcileResult};
use crate::identity::{broker_record_name, ordered_name};
use crate::profile::{broker_template, KindProfile, TemplateSource};

/// Desired child records of one fleet.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Expansion {
    /// Present only for provisioned brokers.
    pub broker: Option<ChildRecord>,

    /// In declaration order.
    pub schedulers: Vec<ChildRecord>,

    /// In declaration order.
    pub workers: Vec<ChildRecord>,
}

/// Expands `fleet` against an already resolved `broker_address`.
///
/// Fails if the address is empty: no scheduler or worker template may be
/// finalized without a broker to point at.
pub fn expand(fleet: &Fleet, broker_address: &str) -> ReconcileResult<Expansion> {
    if broker_address.trim().is_empty() {
        return Err(ReconcileError::Internal(format!(
            "fleet {} expanded before its broker address was resolved",
            fleet.metadata.name
        )));
    }

    let broker = match fleet.spec.broker.mode {
        BrokerMode::Redis => Some(broker_record(fleet, broker_address)?),
        BrokerMode::External => None,
    };

    Ok(Expansion {
        broker,
        schedulers: entry_records(fleet, &fleet.spec.schedulers, broker_address)?,
        workers: entry_records(fleet, &fleet.spec.workers, broker_address)?,
    })
}

/// The single broker record of a fleet with a provisioned broker.
///
/// `address` is the canonical address the broker will be reachable at; it is
/// carried on the template so the record can report it.
pub fn broker_record(fleet: &Fleet, address: &str) -> ReconcileResult<ChildRecord> {
    let owner = OwnerIdentity::of(&fleet.metadata);
    let mut metadata = ObjectMeta::new(
        broker_record_name(&fleet.metadata.name),
        fleet.metadata.namespace.clone(),
    )
    .with_labels(owner.indexed_labels(ChildKind::Broker, 0));
    metadata.set_owner(ObjectKind::Fleet, &fleet.metadata)?;

    let mut template = broker_template();
    template.broker_address = address.to_string();

    Ok(ChildRecord {
        metadata,
        spec: ChildSpec {
            kind: ChildKind::Broker,
            replicas: KindProfile::of(ChildKind::Broker).default_replicas,
            template,
        },
        status: ChildStatus::default(),
    })
}

fn entry_records<D: TemplateSource>(
    fleet: &Fleet,
    entries: &[D],
    broker_address: &str,
) -> ReconcileResult<Vec<ChildRecord>> {
    let owner = OwnerIdentity::of(&fleet.metadata);

    entries
        .iter()
        .enumerate()
        .map(|(index, entry)| {
            let template = entry.derive_template(&fleet.spec.image, broker_address);
            if template.image.is_empty() {
                return Err(ReconcileError::Configuration(format!(
                    "{} entry {} has no image and the fleet declares no default",
                    D::KIND,
                    index + 1
                )));
            }

            let mut metadata = ObjectMeta::new(
                ordered_name(&fleet.metadata.name, D::KIND, index),
                fleet.metadata.namespace.clone(),
            )
            .with_labels(owner.indexed_labels(D::KIND, index));
            metadata.set_owner(ObjectKind::Fleet, &fleet.metadata)?;

            Ok(ChildRecord {
                metadata,
                spec: ChildSpec {
                    kind: D::KIND,
                    replicas: entry.desired_replicas(),
                    template,
                },
                status: ChildStatus::default(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleet_model::{labels, BrokerDescriptor, FleetSpec, SchedulerDescriptor, WorkerDescriptor};

    fn fleet(mode: BrokerMode) -> Fleet {
        Fleet::new(
            ObjectMeta::new("celery-test-1", "default"),
            FleetSpec {
                broker: BrokerDescriptor {
                    mode,
                    address: None,
                },
                schedulers: vec![SchedulerDescriptor {
                    app_name: "app1".into(),
                    ..Default::default()
                }],
                workers: vec![
                    WorkerDescriptor {
                        app_name: "app1".into(),
                        replicas: Some(2),
                        target_queues: vec!["test1".into()],
                        ..Default::default()
                    },
                    WorkerDescriptor {
                        app_name: "app1".into(),
                        image: Some("celery:5".into()),
                        ..Default::default()
                    },
                ],
                image: "celery:4".into(),
            },
        )
    }

    #[test]
    fn test_expand_external() {
        let f = fleet(BrokerMode::External);
        let expansion = expand(&f, "redis://127.0.0.1/1").unwrap();

        assert!(expansion.broker.is_none());
        assert_eq!(expansion.schedulers.len(), 1);
        assert_eq!(expansion.workers.len(), 2);

        let first = &expansion.workers[0];
        assert_eq!(first.metadata.name, "celery-test-1-worker-1");
        assert_eq!(first.spec.replicas, 2);
        assert_eq!(first.spec.template.image, "celery:4");
        assert_eq!(first.spec.template.broker_address, "redis://127.0.0.1/1");
        assert_eq!(first.metadata.labels[labels::OWNER], "celery-test-1");
        assert_eq!(first.metadata.labels[labels::INDEX], "0");
        assert_eq!(first.metadata.owner.as_ref().unwrap().uid, f.metadata.uid);

        let second = &expansion.workers[1];
        assert_eq!(second.metadata.name, "celery-test-1-worker-2");
        assert_eq!(second.spec.replicas, 1);
        assert_eq!(second.spec.template.image, "celery:5");

        assert_eq!(
            expansion.schedulers[0].metadata.name,
            "celery-test-1-scheduler-1"
        );
    }

    #[test]
    fn test_expand_provisioned_broker() {
        let f = fleet(BrokerMode::Redis);
        let expansion = expand(&f, "redis://celery-test-1-broker-service.default").unwrap();

        let broker = expansion.broker.as_ref().unwrap();
        assert_eq!(broker.metadata.name, "celery-test-1-broker");
        assert_eq!(broker.spec.replicas, 1);
        assert_eq!(broker.spec.template.image, "redis:3.0.5");
        assert!(broker.spec.template.command.is_empty());
    }

    #[test]
    fn test_expand_requires_broker_address() {
        let f = fleet(BrokerMode::External);
        assert!(matches!(expand(&f, ""), Err(ReconcileError::Internal(_))));
    }

    #[test]
    fn test_missing_image_is_configuration_error() {
        let mut f = fleet(BrokerMode::External);
        f.spec.image.clear();
        assert!(matches!(
            expand(&f, "redis://b"),
            Err(ReconcileError::Configuration(_))
        ));
    }
}
