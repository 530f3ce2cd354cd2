//! Child-level pass: converges the instances of one child record.

use std::sync::{Arc, Mutex, PoisonError};

use fleet_model::{ChildRecord, ChildStatus, Instance, OwnerIdentity};
use fleet_reconcile::{plan_child, IdentityAllocator, ReconcileResult};
use tracing::{debug, info, instrument};

use crate::store::{create_as, get_as, list_as, update_as, ClusterStore, StoreError};

/// Reconciles instances of child records.
pub struct ChildReconciler {
    store: Arc<dyn ClusterStore>,
    allocator: Mutex<IdentityAllocator>,
}

impl ChildReconciler {
    pub fn new(store: Arc<dyn ClusterStore>) -> Self {
        Self::with_allocator(store, IdentityAllocator::new())
    }

    /// Uses `allocator` for pool names, e.g. a seeded one in tests.
    pub fn with_allocator(store: Arc<dyn ClusterStore>, allocator: IdentityAllocator) -> Self {
        Self {
            store,
            allocator: Mutex::new(allocator),
        }
    }

    /// Runs one pass for the record `namespace/name`.
    ///
    /// Returns the status the record reports afterwards.
    #[instrument(skip(self), fields(record = %name))]
    pub async fn reconcile(&self, namespace: &str, name: &str) -> ReconcileResult<ChildStatus> {
        let store = self.store.as_ref();
        let record: ChildRecord = get_as(store, namespace, name).await?;

        let owner = OwnerIdentity::of(&record.metadata);
        let observed: Vec<Instance> =
            list_as(store, namespace, &owner.selector(record.kind())).await?;
        let observed_count = observed.len();

        let plan = {
            let mut allocator = self
                .allocator
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            plan_child(&record, observed, &mut allocator)?
        };

        debug!(
            kind = %record.kind(),
            desired = record.spec.replicas,
            observed = observed_count,
            path = ?plan.path,
            "planned child pass"
        );

        // Delete first so capacity never exceeds the desired count.
        for instance in &plan.to_delete {
            match store.delete(&instance.key()).await {
                Ok(()) | Err(StoreError::NotFound(_)) => {
                    info!(instance = %instance.name(), "deleted instance");
                }
                Err(err) => return Err(err.into()),
            }
        }

        for instance in plan.to_create.iter().cloned() {
            let created = create_as(store, instance).await?;
            info!(instance = %created.name(), "created instance");
        }

        if record.status != plan.status {
            let status = plan.status.clone();
            let mut updated = record;
            updated.status = plan.status;
            update_as(store, updated).await?;
            return Ok(status);
        }

        Ok(record.status)
    }
}
