//! End-to-end passes against the in-memory store.

use std::sync::Arc;
use std::time::Duration;

use fleet_controller::store::{get_as, list_as, Operation};
use fleet_controller::{
    ClusterStore, ControllerWorker, FleetReconciler, MemoryStore, Outcome, StoreError,
    WorkerConfig,
};
use fleet_model::{
    BrokerDescriptor, BrokerMode, ChildKind, ChildRecord, ConvergenceStatus, Fleet, FleetSpec,
    Instance, ObjectKey, ObjectKind, ObjectMeta, OwnerIdentity, SchedulerDescriptor, Service,
    WorkerDescriptor,
};
use fleet_reconcile::IdentityAllocator;
use tokio::sync::watch;

const NS: &str = "default";
const FLEET: &str = "celery-test-1";

fn worker(replicas: u32, queues: &[&str]) -> WorkerDescriptor {
    WorkerDescriptor {
        app_name: "app1".into(),
        replicas: Some(replicas),
        target_queues: queues.iter().map(|q| q.to_string()).collect(),
        ..Default::default()
    }
}

fn external(workers: Vec<WorkerDescriptor>) -> FleetSpec {
    FleetSpec {
        broker: BrokerDescriptor {
            mode: BrokerMode::External,
            address: Some("redis://127.0.0.1/1".into()),
        },
        workers,
        image: "celery:4".into(),
        ..Default::default()
    }
}

struct Harness {
    store: Arc<MemoryStore>,
    reconciler: FleetReconciler,
}

impl Harness {
    async fn with_fleet(spec: FleetSpec) -> Self {
        let store = Arc::new(MemoryStore::new());
        store
            .create(Fleet::new(ObjectMeta::new(FLEET, NS), spec).into())
            .await
            .unwrap();
        let reconciler =
            FleetReconciler::with_allocator(store.clone(), IdentityAllocator::seeded(7));
        Self { store, reconciler }
    }

    async fn pass(&self) -> Outcome {
        self.reconciler.reconcile(&ObjectKey::fleet(NS, FLEET)).await
    }

    async fn fleet(&self) -> Fleet {
        get_as(self.store.as_ref(), NS, FLEET).await.unwrap()
    }

    async fn respec(&self, change: impl FnOnce(&mut FleetSpec)) {
        let mut fleet = self.fleet().await;
        change(&mut fleet.spec);
        self.store.update(fleet.into()).await.unwrap();
    }

    async fn record(&self, name: &str) -> ChildRecord {
        get_as(self.store.as_ref(), NS, name).await.unwrap()
    }

    async fn instances(&self, record: &str, kind: ChildKind) -> Vec<Instance> {
        let selector = OwnerIdentity::new(NS, record).selector(kind);
        let mut instances: Vec<Instance> =
            list_as(self.store.as_ref(), NS, &selector).await.unwrap();
        instances.sort_by(|a, b| a.metadata.name.cmp(&b.metadata.name));
        instances
    }

    async fn instance_names(&self, record: &str, kind: ChildKind) -> Vec<String> {
        self.instances(record, kind)
            .await
            .into_iter()
            .map(|i| i.metadata.name)
            .collect()
    }
}

#[tokio::test]
async fn test_external_broker_two_workers() {
    let h = Harness::with_fleet(external(vec![worker(2, &[])])).await;
    assert_eq!(h.pass().await, Outcome::Done);

    let instances = h.instances("celery-test-1-worker-1", ChildKind::Worker).await;
    assert_eq!(instances.len(), 2);
    for instance in &instances {
        assert!(instance.metadata.name.starts_with("celery-test-1-worker-1-"));
        assert_eq!(
            instance.spec.containers[0].command,
            vec!["celery", "worker", "-A", "app1", "-b", "redis://127.0.0.1/1"]
        );
    }

    let fleet = h.fleet().await;
    assert_eq!(
        fleet.status.broker_address.as_deref(),
        Some("redis://127.0.0.1/1")
    );
    assert_eq!(fleet.status.workers, 1);
    assert_eq!(fleet.status.last_error, None);
    assert_eq!(h.store.count(ObjectKind::Service).await, 0);
}

#[tokio::test]
async fn test_scale_down_keeps_one() {
    let h = Harness::with_fleet(external(vec![worker(4, &[])])).await;
    h.pass().await;
    assert_eq!(h.instances("celery-test-1-worker-1", ChildKind::Worker).await.len(), 4);

    h.respec(|spec| spec.workers[0].replicas = Some(1)).await;
    assert_eq!(h.pass().await, Outcome::Done);
    assert_eq!(h.instances("celery-test-1-worker-1", ChildKind::Worker).await.len(), 1);

    let record = h.record("celery-test-1-worker-1").await;
    assert_eq!(record.status.replicas, 1);
}

#[tokio::test]
async fn test_queue_change_replaces_instances() {
    let h = Harness::with_fleet(external(vec![worker(2, &["q1", "q2"])])).await;
    h.pass().await;
    let before = h.instance_names("celery-test-1-worker-1", ChildKind::Worker).await;

    h.respec(|spec| spec.workers[0].target_queues = vec!["q1".into()]).await;
    h.pass().await;

    let after = h.instances("celery-test-1-worker-1", ChildKind::Worker).await;
    assert_eq!(after.len(), 2);
    for instance in &after {
        assert!(!before.contains(&instance.metadata.name));
        let command = &instance.spec.containers[0].command;
        assert_eq!(&command[command.len() - 2..], ["--queues", "q1"]);
    }
    assert_eq!(
        h.record("celery-test-1-worker-1").await.status.convergence,
        ConvergenceStatus::Diverged
    );
}

#[tokio::test]
async fn test_provisioned_broker() {
    let h = Harness::with_fleet(FleetSpec {
        schedulers: vec![SchedulerDescriptor {
            app_name: "app1".into(),
            ..Default::default()
        }],
        workers: vec![worker(1, &[])],
        image: "celery:4".into(),
        ..Default::default()
    })
    .await;
    assert_eq!(h.pass().await, Outcome::Done);

    let address = "redis://celery-test-1-broker-service.default";
    let service: Service = get_as(h.store.as_ref(), NS, "celery-test-1-broker-service")
        .await
        .unwrap();
    assert_eq!(service.spec.ports[0].port, 6379);

    let broker = h.record("celery-test-1-broker").await;
    assert_eq!(broker.status.broker_address.as_deref(), Some(address));
    assert_eq!(
        h.instance_names("celery-test-1-broker", ChildKind::Broker).await,
        vec!["celery-test-1-broker-1"]
    );

    let scheduler = h.instances("celery-test-1-scheduler-1", ChildKind::Scheduler).await;
    assert_eq!(scheduler.len(), 1);
    assert_eq!(
        scheduler[0].spec.containers[0].command,
        vec!["celery", "beat", "-A", "app1", "-b", address]
    );

    let fleet = h.fleet().await;
    assert_eq!(fleet.status.broker_address.as_deref(), Some(address));
    assert_eq!(fleet.status.schedulers, 1);
}

#[tokio::test]
async fn test_switch_to_external_broker_removes_provisioned_broker() {
    let h = Harness::with_fleet(FleetSpec {
        workers: vec![worker(1, &[])],
        image: "celery:4".into(),
        ..Default::default()
    })
    .await;
    assert_eq!(h.pass().await, Outcome::Done);
    assert_eq!(h.store.count(ObjectKind::Service).await, 1);
    assert_eq!(h.instances("celery-test-1-broker", ChildKind::Broker).await.len(), 1);

    h.respec(|spec| {
        spec.broker = BrokerDescriptor {
            mode: BrokerMode::External,
            address: Some("redis://ext/1".into()),
        }
    })
    .await;
    assert_eq!(h.pass().await, Outcome::Done);
    assert_eq!(h.pass().await, Outcome::Done);

    assert_eq!(h.store.count(ObjectKind::Service).await, 0);
    let broker = get_as::<ChildRecord>(h.store.as_ref(), NS, "celery-test-1-broker").await;
    assert!(matches!(broker, Err(StoreError::NotFound(_))));
    assert!(h.instances("celery-test-1-broker", ChildKind::Broker).await.is_empty());

    let workers = h.instances("celery-test-1-worker-1", ChildKind::Worker).await;
    assert_eq!(workers.len(), 1);
    assert_eq!(
        workers[0].spec.containers[0].command,
        vec!["celery", "worker", "-A", "app1", "-b", "redis://ext/1"]
    );
    assert_eq!(
        h.fleet().await.status.broker_address.as_deref(),
        Some("redis://ext/1")
    );
}

#[tokio::test]
async fn test_missing_external_address_is_reported() {
    let mut spec = external(vec![worker(2, &[])]);
    spec.broker.address = None;
    let h = Harness::with_fleet(spec).await;

    assert_eq!(h.pass().await, Outcome::Done);
    let fleet = h.fleet().await;
    assert!(fleet
        .status
        .last_error
        .as_deref()
        .is_some_and(|e| e.contains("broker address")));
    assert_eq!(h.store.count(ObjectKind::Child).await, 0);
    assert_eq!(h.store.count(ObjectKind::Instance).await, 0);

    // Reporting the same error again writes nothing.
    let writes = h.store.writes();
    h.pass().await;
    assert_eq!(h.store.writes(), writes);

    h.respec(|spec| spec.broker.address = Some("redis://127.0.0.1/1".into()))
        .await;
    h.pass().await;
    assert_eq!(h.fleet().await.status.last_error, None);
    assert_eq!(h.store.count(ObjectKind::Instance).await, 2);
}

#[tokio::test]
async fn test_repeated_passes_converge_to_no_writes() {
    let h = Harness::with_fleet(external(vec![worker(2, &["q1"]), worker(1, &[])])).await;
    h.pass().await;
    h.pass().await;
    assert_eq!(
        h.record("celery-test-1-worker-2").await.status.convergence,
        ConvergenceStatus::Converged
    );

    let writes = h.store.writes();
    assert_eq!(h.pass().await, Outcome::Done);
    assert_eq!(h.store.writes(), writes);
}

#[tokio::test]
async fn test_external_deletion_is_repaired() {
    let h = Harness::with_fleet(external(vec![worker(3, &[])])).await;
    h.pass().await;

    let victim = h.instances("celery-test-1-worker-1", ChildKind::Worker).await[0].key();
    h.store.delete(&victim).await.unwrap();
    assert_eq!(h.instances("celery-test-1-worker-1", ChildKind::Worker).await.len(), 2);

    h.pass().await;
    assert_eq!(h.instances("celery-test-1-worker-1", ChildKind::Worker).await.len(), 3);
}

#[tokio::test]
async fn test_removed_entry_deletes_record_and_instances() {
    let h = Harness::with_fleet(external(vec![worker(1, &[]), worker(2, &[])])).await;
    h.pass().await;
    assert_eq!(h.store.count(ObjectKind::Instance).await, 3);

    h.respec(|spec| spec.workers.truncate(1)).await;
    h.pass().await;

    assert_eq!(h.store.count(ObjectKind::Child).await, 1);
    assert_eq!(h.store.count(ObjectKind::Instance).await, 1);
    assert_eq!(h.fleet().await.status.workers, 1);
}

#[tokio::test]
async fn test_deleting_fleet_collects_children() {
    let h = Harness::with_fleet(FleetSpec {
        workers: vec![worker(2, &[])],
        image: "celery:4".into(),
        ..Default::default()
    })
    .await;
    h.pass().await;
    assert!(h.store.count(ObjectKind::Instance).await > 0);

    h.store.delete(&ObjectKey::fleet(NS, FLEET)).await.unwrap();
    for kind in [ObjectKind::Child, ObjectKind::Instance, ObjectKind::Service] {
        assert_eq!(h.store.count(kind).await, 0);
    }

    // Missing parent ends the pass quietly.
    assert_eq!(h.pass().await, Outcome::Done);
}

#[tokio::test]
async fn test_transient_failure_requeues_and_resumes() {
    let h = Harness::with_fleet(external(vec![worker(3, &[])])).await;
    h.store
        .fail_next(Operation::Create, StoreError::Unavailable("etcd down".into()))
        .await;

    // The worker record create fails; nothing else is attempted.
    assert!(h.pass().await.is_requeue());
    assert_eq!(h.store.count(ObjectKind::Instance).await, 0);

    assert_eq!(h.pass().await, Outcome::Done);
    assert_eq!(h.store.count(ObjectKind::Instance).await, 3);
}

#[tokio::test]
async fn test_stale_write_is_a_conflict() {
    let h = Harness::with_fleet(external(vec![worker(1, &[])])).await;
    let key = ObjectKey::fleet(NS, FLEET);
    h.store
        .fail_next(
            Operation::Update,
            StoreError::Conflict {
                key: key.clone(),
                expected: 1,
                found: 2,
            },
        )
        .await;

    // Child record status write loses the race.
    assert!(h.pass().await.is_requeue());
    assert_eq!(h.pass().await, Outcome::Done);
    assert_eq!(h.fleet().await.status.workers, 1);
}

#[tokio::test]
async fn test_worker_reconciles_new_fleets() {
    let store = Arc::new(MemoryStore::new());
    let controller = ControllerWorker::new(
        store.clone(),
        WorkerConfig {
            resync_interval: Duration::from_secs(60),
            requeue_base: Duration::from_millis(10),
            requeue_max: Duration::from_millis(100),
        },
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = tokio::spawn(async move { controller.run(shutdown_rx).await });

    // Let the worker subscribe before the first write.
    tokio::time::sleep(Duration::from_millis(50)).await;
    store
        .create(Fleet::new(ObjectMeta::new(FLEET, NS), external(vec![worker(2, &[])])).into())
        .await
        .unwrap();

    let converged = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if store.count(ObjectKind::Instance).await == 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(converged.is_ok(), "worker did not converge the fleet");

    shutdown_tx.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .unwrap()
        .unwrap();
}
