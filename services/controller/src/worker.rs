//! Controller background worker.
//!
//! Stands in for the manager's work queue:
//! - periodic resync enqueues every fleet
//! - store watch events enqueue the fleet owning the changed object
//! - requeued keys wait out a per-key exponential backoff
//!
//! Each batch runs distinct keys concurrently, so a key never has two passes
//! in flight.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

use fleet_model::{ChildRecord, LabelSelector, Object, ObjectKey, ObjectKind};
use fleet_reconcile::{
    RequeueBackoff, DEFAULT_REQUEUE_BASE, DEFAULT_REQUEUE_MAX, DEFAULT_RESYNC_INTERVAL,
};
use futures_util::future::join_all;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, instrument, warn};

use crate::orchestrator::{FleetReconciler, Outcome};
use crate::store::{get_as, ClusterStore, StoreResult};

/// Worker timing.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub resync_interval: Duration,
    pub requeue_base: Duration,
    pub requeue_max: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            resync_interval: DEFAULT_RESYNC_INTERVAL,
            requeue_base: DEFAULT_REQUEUE_BASE,
            requeue_max: DEFAULT_REQUEUE_MAX,
        }
    }
}

/// Worker that dispatches fleet passes.
pub struct ControllerWorker {
    store: Arc<dyn ClusterStore>,
    reconciler: FleetReconciler,
    config: WorkerConfig,
}

#[derive(Default)]
struct Queue {
    pending: BTreeSet<ObjectKey>,
    delayed: BTreeMap<ObjectKey, Instant>,
}

impl Queue {
    fn push(&mut self, key: ObjectKey) {
        // Backing-off keys wait for their deadline.
        if !self.delayed.contains_key(&key) {
            self.pending.insert(key);
        }
    }

    fn next_deadline(&self) -> Option<Instant> {
        self.delayed.values().min().copied()
    }

    fn promote_due(&mut self, now: Instant) {
        let due: Vec<ObjectKey> = self
            .delayed
            .iter()
            .filter(|(_, deadline)| **deadline <= now)
            .map(|(key, _)| key.clone())
            .collect();
        for key in due {
            self.delayed.remove(&key);
            self.pending.insert(key);
        }
    }
}

impl ControllerWorker {
    pub fn new(store: Arc<dyn ClusterStore>, config: WorkerConfig) -> Self {
        let reconciler = FleetReconciler::new(store.clone());
        Self::with_reconciler(store, reconciler, config)
    }

    pub fn with_reconciler(
        store: Arc<dyn ClusterStore>,
        reconciler: FleetReconciler,
        config: WorkerConfig,
    ) -> Self {
        Self {
            store,
            reconciler,
            config,
        }
    }

    /// Run the worker until shutdown is signaled.
    #[instrument(skip(self, shutdown))]
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            resync_secs = self.config.resync_interval.as_secs(),
            "Starting controller worker"
        );

        let mut events = self.store.watch();
        let mut resync = tokio::time::interval(self.config.resync_interval);
        resync.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut backoff = RequeueBackoff::new(self.config.requeue_base, self.config.requeue_max);
        let mut queue = Queue::default();

        loop {
            let deadline = queue.next_deadline();

            tokio::select! {
                _ = resync.tick() => {
                    match self.list_fleets().await {
                        Ok(keys) => keys.into_iter().for_each(|key| queue.push(key)),
                        Err(e) => warn!(error = %e, "Resync listing failed"),
                    }
                    backoff.prune();
                }
                event = events.recv() => match event {
                    Ok(event) => {
                        if let Some(key) = self.fleet_for(event.object()).await {
                            queue.push(key);
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Watch lagged, resyncing");
                        resync.reset_immediately();
                    }
                    Err(RecvError::Closed) => {
                        info!("Watch closed, controller worker stopping");
                        break;
                    }
                },
                _ = sleep_until(deadline) => {
                    queue.promote_due(Instant::now());
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("Controller worker shutting down");
                        break;
                    }
                }
            }

            // Fold in whatever else is already buffered before running a batch.
            loop {
                match events.try_recv() {
                    Ok(event) => {
                        if let Some(key) = self.fleet_for(event.object()).await {
                            queue.push(key);
                        }
                    }
                    Err(TryRecvError::Lagged(_)) => resync.reset_immediately(),
                    Err(TryRecvError::Empty | TryRecvError::Closed) => break,
                }
            }

            if queue.pending.is_empty() {
                continue;
            }

            let keys: Vec<ObjectKey> = std::mem::take(&mut queue.pending).into_iter().collect();
            for (key, outcome) in self.reconcile_batch(keys).await {
                let tracked = key.to_string();
                match outcome {
                    Outcome::Done => backoff.clear(&tracked),
                    Outcome::Requeue { reason } => {
                        let delay = backoff.record_failure(&tracked);
                        debug!(
                            fleet = %key,
                            reason = %reason,
                            delay_ms = delay.as_millis() as u64,
                            "Requeued"
                        );
                        queue.delayed.insert(key, Instant::now() + delay);
                    }
                }
            }
        }
    }

    /// Runs one pass per key, concurrently.
    pub async fn reconcile_batch(&self, keys: Vec<ObjectKey>) -> Vec<(ObjectKey, Outcome)> {
        let passes = keys.into_iter().map(|key| async move {
            let outcome = self.reconciler.reconcile(&key).await;
            (key, outcome)
        });
        join_all(passes).await
    }

    async fn list_fleets(&self) -> StoreResult<Vec<ObjectKey>> {
        let fleets = self
            .store
            .list(ObjectKind::Fleet, None, &LabelSelector::everything())
            .await?;
        Ok(fleets.iter().map(Object::key).collect())
    }

    /// Fleet whose pass should react to a change of `object`.
    ///
    /// Instances are resolved through their child record.
    async fn fleet_for(&self, object: &Object) -> Option<ObjectKey> {
        let meta = object.meta();
        if object.kind() == ObjectKind::Fleet {
            return Some(object.key());
        }

        let owner = meta.owner.as_ref()?;
        match owner.kind {
            ObjectKind::Fleet => Some(ObjectKey::fleet(&meta.namespace, &owner.name)),
            ObjectKind::Child => {
                let record: ChildRecord =
                    get_as(self.store.as_ref(), &meta.namespace, &owner.name)
                        .await
                        .ok()?;
                let fleet = record.metadata.owner?;
                Some(ObjectKey::fleet(&meta.namespace, fleet.name))
            }
            _ => None,
        }
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
