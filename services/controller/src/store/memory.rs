//! In-memory cluster state store.

use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use fleet_model::{LabelSelector, Object, ObjectKey, ObjectKind, Uid};
use tokio::sync::{broadcast, Mutex};
use tracing::debug;

use super::{ClusterStore, StoreError, StoreResult, WatchEvent};

const WATCH_CAPACITY: usize = 1024;

/// Store operation, used to target injected faults.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Get,
    List,
    Create,
    Update,
    Delete,
}

#[derive(Default)]
struct State {
    objects: BTreeMap<ObjectKey, Object>,
    last_version: u64,
    faults: VecDeque<(Operation, StoreError)>,
}

impl State {
    fn take_fault(&mut self, op: Operation) -> StoreResult<()> {
        match self.faults.iter().position(|(target, _)| *target == op) {
            Some(pos) => match self.faults.remove(pos) {
                Some((_, err)) => Err(err),
                None => Ok(()),
            },
            None => Ok(()),
        }
    }

    fn next_version(&mut self) -> u64 {
        self.last_version += 1;
        self.last_version
    }

    /// Removes `root` and everything transitively owned by it.
    fn remove_cascading(&mut self, root: &ObjectKey) -> Vec<Object> {
        let mut removed = Vec::new();
        let mut pending = vec![root.clone()];

        while let Some(key) = pending.pop() {
            let Some(object) = self.objects.remove(&key) else {
                continue;
            };
            let uid = object.meta().uid;
            pending.extend(owned_by(&self.objects, uid));
            removed.push(object);
        }

        removed
    }
}

fn owned_by(objects: &BTreeMap<ObjectKey, Object>, uid: Uid) -> Vec<ObjectKey> {
    objects
        .iter()
        .filter(|(_, object)| object.meta().owner.as_ref().is_some_and(|o| o.uid == uid))
        .map(|(key, _)| key.clone())
        .collect()
}

/// In-memory store with ownership garbage collection and a watch stream.
///
/// Owned objects are removed in the same call as their owner.
pub struct MemoryStore {
    state: Mutex<State>,
    events: broadcast::Sender<WatchEvent>,
    writes: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(WATCH_CAPACITY);
        Self {
            state: Mutex::new(State::default()),
            events,
            writes: AtomicU64::new(0),
        }
    }

    /// Makes the next `op` fail with `err`.
    pub async fn fail_next(&self, op: Operation, err: StoreError) {
        self.state.lock().await.faults.push_back((op, err));
    }

    /// Successful create, update and delete calls so far.
    pub fn writes(&self) -> u64 {
        self.writes.load(Ordering::SeqCst)
    }

    /// Number of stored objects of `kind`.
    pub async fn count(&self, kind: ObjectKind) -> usize {
        self.state
            .lock()
            .await
            .objects
            .keys()
            .filter(|key| key.kind == kind)
            .count()
    }

    fn publish(&self, event: WatchEvent) {
        // No receivers is fine.
        let _ = self.events.send(event);
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ClusterStore for MemoryStore {
    async fn get(&self, key: &ObjectKey) -> StoreResult<Object> {
        let mut state = self.state.lock().await;
        state.take_fault(Operation::Get)?;
        state
            .objects
            .get(key)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(key.clone()))
    }

    async fn list(
        &self,
        kind: ObjectKind,
        namespace: Option<&str>,
        selector: &LabelSelector,
    ) -> StoreResult<Vec<Object>> {
        let mut state = self.state.lock().await;
        state.take_fault(Operation::List)?;
        Ok(state
            .objects
            .iter()
            .filter(|(key, _)| key.kind == kind)
            .filter(|(key, _)| namespace.is_none_or(|ns| key.namespace == ns))
            .filter(|(_, object)| selector.matches(&object.meta().labels))
            .map(|(_, object)| object.clone())
            .collect())
    }

    async fn create(&self, mut object: Object) -> StoreResult<Object> {
        let mut state = self.state.lock().await;
        state.take_fault(Operation::Create)?;

        let key = object.key();
        if state.objects.contains_key(&key) {
            return Err(StoreError::AlreadyExists(key));
        }

        let version = state.next_version();
        let meta = object.meta_mut();
        meta.resource_version = version;
        meta.generation = 1;
        meta.created_at = Some(Utc::now());

        state.objects.insert(key.clone(), object.clone());
        drop(state);

        debug!(object = %key, version, "created");
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.publish(WatchEvent::Applied(object.clone()));
        Ok(object)
    }

    async fn update(&self, mut object: Object) -> StoreResult<Object> {
        let mut state = self.state.lock().await;
        state.take_fault(Operation::Update)?;

        let key = object.key();
        let current = state
            .objects
            .get(&key)
            .ok_or_else(|| StoreError::NotFound(key.clone()))?;

        let stored = current.meta();
        if stored.resource_version != object.meta().resource_version {
            return Err(StoreError::Conflict {
                key,
                expected: object.meta().resource_version,
                found: stored.resource_version,
            });
        }

        let spec_changed = !current.same_spec(&object);
        let (uid, created_at, generation) = (stored.uid, stored.created_at, stored.generation);

        let version = state.next_version();
        let meta = object.meta_mut();
        meta.uid = uid;
        meta.created_at = created_at;
        meta.resource_version = version;
        meta.generation = if spec_changed { generation + 1 } else { generation };

        state.objects.insert(key.clone(), object.clone());
        drop(state);

        debug!(object = %key, version, spec_changed, "updated");
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.publish(WatchEvent::Applied(object.clone()));
        Ok(object)
    }

    async fn delete(&self, key: &ObjectKey) -> StoreResult<()> {
        let mut state = self.state.lock().await;
        state.take_fault(Operation::Delete)?;

        if !state.objects.contains_key(key) {
            return Err(StoreError::NotFound(key.clone()));
        }
        let removed = state.remove_cascading(key);
        drop(state);

        debug!(object = %key, cascaded = removed.len() - 1, "deleted");
        self.writes.fetch_add(1, Ordering::SeqCst);
        for object in removed {
            self.publish(WatchEvent::Deleted(object));
        }
        Ok(())
    }

    fn watch(&self) -> broadcast::Receiver<WatchEvent> {
        self.events.subscribe()
    }
}
