//! Fleet-level pass: broker provisioning, child records, status.

use std::sync::Arc;

use fleet_model::{
    ChildKind, ChildRecord, Fleet, FleetStatus, ObjectKey, ObjectMeta, OwnerIdentity, Service,
};
use fleet_reconcile::{
    failed_status, plan_fleet, plan_records, IdentityAllocator, ObservedChildren, ProvisionAction,
    ReconcileError, ReconcileResult, RecordPlan,
};
use tracing::{info, instrument, warn};

use super::{ChildReconciler, Outcome};
use crate::store::{create_as, get_as, list_as, update_as, ClusterStore, StoreError};

/// Reconciles fleets and, through [`ChildReconciler`], their instances.
pub struct FleetReconciler {
    store: Arc<dyn ClusterStore>,
    children: ChildReconciler,
}

impl FleetReconciler {
    pub fn new(store: Arc<dyn ClusterStore>) -> Self {
        Self::with_allocator(store, IdentityAllocator::new())
    }

    /// Uses `allocator` for pool names, e.g. a seeded one in tests.
    pub fn with_allocator(store: Arc<dyn ClusterStore>, allocator: IdentityAllocator) -> Self {
        Self {
            children: ChildReconciler::with_allocator(store.clone(), allocator),
            store,
        }
    }

    /// Runs one pass for the fleet `key` and classifies the result.
    #[instrument(skip(self), fields(fleet = %key))]
    pub async fn reconcile(&self, key: &ObjectKey) -> Outcome {
        let result = match self.reconcile_fleet(&key.namespace, &key.name).await {
            Err(ReconcileError::Configuration(message)) => {
                self.report_error(&key.namespace, &key.name, &message)
                    .await
                    .and(Err(ReconcileError::Configuration(message)))
            }
            other => other,
        };
        Outcome::from_result(result)
    }

    async fn reconcile_fleet(&self, namespace: &str, name: &str) -> ReconcileResult<()> {
        let store = self.store.as_ref();
        let fleet: Fleet = get_as(store, namespace, name).await?;
        let owner = OwnerIdentity::of(&fleet.metadata);

        let observed = ObservedChildren {
            brokers: list_as(store, namespace, &owner.selector(ChildKind::Broker)).await?,
            services: list_as(store, namespace, &owner.selector(ChildKind::Broker)).await?,
            schedulers: list_as(store, namespace, &owner.selector(ChildKind::Scheduler)).await?,
            workers: list_as(store, namespace, &owner.selector(ChildKind::Worker)).await?,
        };

        // Fails before anything is written if the broker cannot be resolved.
        let plan = plan_fleet(&fleet, observed)?;

        for key in &plan.retired {
            match store.delete(key).await {
                Ok(()) | Err(StoreError::NotFound(_)) => {
                    info!(object = %key, "deleted retired broker object");
                }
                Err(err) => return Err(err.into()),
            }
        }

        let mut records = Vec::new();
        for action in plan.broker.actions {
            match action {
                ProvisionAction::EnsureService(service) => {
                    self.ensure_service(&fleet, service).await?;
                }
                ProvisionAction::EnsureRecord(record) => {
                    records.push(record.metadata.name.clone());
                    self.ensure_record(&fleet, record).await?;
                }
            }
        }

        for kind_plan in [plan.schedulers, plan.workers] {
            self.apply_records(kind_plan).await?;
        }

        // Re-list after applying so every desired record is covered,
        // including unchanged ones the plan left out.
        for kind in [ChildKind::Scheduler, ChildKind::Worker] {
            let mut current: Vec<ChildRecord> =
                list_as(store, namespace, &owner.selector(kind)).await?;
            current.sort_by_key(|record| record.metadata.index());
            records.extend(current.into_iter().map(|record| record.metadata.name));
        }

        for record in &records {
            self.children.reconcile(namespace, record).await?;
        }

        self.write_status(fleet, plan.status).await
    }

    async fn apply_records(&self, plan: RecordPlan) -> ReconcileResult<()> {
        let store = self.store.as_ref();

        for record in plan.to_delete {
            let key = ObjectKey::child(&record.metadata.namespace, &record.metadata.name);
            match store.delete(&key).await {
                Ok(()) | Err(StoreError::NotFound(_)) => {
                    info!(record = %record.metadata.name, "deleted child record");
                }
                Err(err) => return Err(err.into()),
            }
        }

        for record in plan.to_update {
            let updated = update_as(store, record).await?;
            info!(record = %updated.metadata.name, "updated child record");
        }

        for record in plan.to_create {
            let created = create_as(store, record).await?;
            info!(record = %created.metadata.name, "created child record");
        }

        Ok(())
    }

    /// Creates the broker service if absent, updates it if it differs.
    async fn ensure_service(&self, fleet: &Fleet, desired: Service) -> ReconcileResult<()> {
        let store = self.store.as_ref();
        let namespace = &desired.metadata.namespace;

        match get_as::<Service>(store, namespace, &desired.metadata.name).await {
            Err(StoreError::NotFound(_)) => {
                let created = create_as(store, desired).await?;
                info!(service = %created.metadata.name, "created broker service");
                Ok(())
            }
            Err(err) => Err(err.into()),
            Ok(current) => {
                check_owner(fleet, &current.metadata)?;
                let labels_match = current.metadata.labels == desired.metadata.labels;
                if current.spec == desired.spec && labels_match {
                    return Ok(());
                }
                let mut updated = current;
                updated.spec = desired.spec;
                updated.metadata.labels = desired.metadata.labels;
                update_as(store, updated).await?;
                info!(service = %desired.metadata.name, "updated broker service");
                Ok(())
            }
        }
    }

    /// Creates the broker record if absent, updates it if it differs.
    async fn ensure_record(&self, fleet: &Fleet, desired: ChildRecord) -> ReconcileResult<()> {
        let store = self.store.as_ref();
        let namespace = desired.metadata.namespace.clone();

        let current = match get_as::<ChildRecord>(store, &namespace, &desired.metadata.name).await {
            Ok(current) => {
                check_owner(fleet, &current.metadata)?;
                vec![current]
            }
            Err(StoreError::NotFound(_)) => Vec::new(),
            Err(err) => return Err(err.into()),
        };

        let plan = plan_records(vec![desired], current);
        self.apply_records(plan).await
    }

    /// Writes `status` if it differs from what the fleet reports.
    async fn write_status(&self, fleet: Fleet, status: FleetStatus) -> ReconcileResult<()> {
        if fleet.status == status {
            return Ok(());
        }

        let mut updated = fleet;
        updated.status = status;
        let updated = update_as(self.store.as_ref(), updated).await?;
        info!(
            broker_address = updated.status.broker_address.as_deref().unwrap_or_default(),
            schedulers = updated.status.schedulers,
            workers = updated.status.workers,
            "updated fleet status"
        );
        Ok(())
    }

    /// Surfaces a configuration error on the fleet status.
    async fn report_error(&self, namespace: &str, name: &str, message: &str) -> ReconcileResult<()> {
        let fleet: Fleet = get_as(self.store.as_ref(), namespace, name).await?;
        let status = failed_status(&fleet, message);
        if fleet.status != status {
            warn!(error = %message, "reporting configuration error on fleet status");
        }
        self.write_status(fleet, status).await
    }
}

/// Fails if `meta` belongs to another object, e.g. a fleet that was deleted
/// and recreated under the same name before collection finished.
fn check_owner(fleet: &Fleet, meta: &ObjectMeta) -> ReconcileResult<()> {
    match &meta.owner {
        Some(owner) if owner.uid == fleet.metadata.uid => Ok(()),
        Some(owner) => Err(ReconcileError::Conflict(format!(
            "{} is owned by {} ({})",
            meta.name, owner, owner.uid
        ))),
        None => Err(ReconcileError::Configuration(format!(
            "{} exists and is not owned by fleet {}",
            meta.name, fleet.metadata.name
        ))),
    }
}
