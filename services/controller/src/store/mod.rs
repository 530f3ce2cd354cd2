//! Cluster state store interface.
//!
//! The store holds typed, namespaced objects and exposes:
//! - get/list/create/update/delete with optimistic concurrency
//! - label-selected listing
//! - a watch stream of changes
//!
//! Deleting an object deletes everything that names it as owner. An
//! in-memory implementation is provided for tests and local runs.

mod memory;

pub use memory::{MemoryStore, Operation};

use async_trait::async_trait;
use fleet_model::{
    ChildRecord, Fleet, Instance, LabelSelector, Object, ObjectKey, ObjectKind, Service,
};
use fleet_reconcile::ReconcileError;
use thiserror::Error;
use tokio::sync::broadcast;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Store errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("{0} not found")]
    NotFound(ObjectKey),

    #[error("{0} already exists")]
    AlreadyExists(ObjectKey),

    /// Stale resource version on update.
    #[error("conflict on {key}: expected version {expected}, found {found}")]
    Conflict {
        key: ObjectKey,
        expected: u64,
        found: u64,
    },

    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// Stored object has a different kind than requested.
    #[error("unexpected object for {0}")]
    UnexpectedKind(ObjectKey),
}

impl From<StoreError> for ReconcileError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(_) => ReconcileError::NotFound(err.to_string()),
            StoreError::AlreadyExists(_) | StoreError::Conflict { .. } => {
                ReconcileError::Conflict(err.to_string())
            }
            StoreError::Unavailable(_) => ReconcileError::StoreUnavailable(err.to_string()),
            StoreError::UnexpectedKind(_) => ReconcileError::Internal(err.to_string()),
        }
    }
}

/// A change observed through [`ClusterStore::watch`].
#[derive(Debug, Clone, PartialEq)]
pub enum WatchEvent {
    /// Created or updated; carries the stored object.
    Applied(Object),

    /// Deleted, directly or through its owner.
    Deleted(Object),
}

impl WatchEvent {
    pub fn object(&self) -> &Object {
        match self {
            WatchEvent::Applied(object) | WatchEvent::Deleted(object) => object,
        }
    }
}

/// Cluster state store interface.
#[async_trait]
pub trait ClusterStore: Send + Sync {
    async fn get(&self, key: &ObjectKey) -> StoreResult<Object>;

    /// Objects of `kind` matching `selector`; `namespace = None` spans all.
    async fn list(
        &self,
        kind: ObjectKind,
        namespace: Option<&str>,
        selector: &LabelSelector,
    ) -> StoreResult<Vec<Object>>;

    /// Stores a new object. The store assigns version and creation time.
    async fn create(&self, object: Object) -> StoreResult<Object>;

    /// Replaces an object whose resource version matches the stored one.
    async fn update(&self, object: Object) -> StoreResult<Object>;

    /// Deletes an object and, eventually, everything it owns.
    async fn delete(&self, key: &ObjectKey) -> StoreResult<()>;

    /// Subscribes to changes made after this call.
    fn watch(&self) -> broadcast::Receiver<WatchEvent>;
}

/// Typed view of [`Object`] variants.
pub trait Stored: Sized + Into<Object> {
    const KIND: ObjectKind;

    fn from_object(object: Object) -> Option<Self>;
}

impl Stored for Fleet {
    const KIND: ObjectKind = ObjectKind::Fleet;

    fn from_object(object: Object) -> Option<Self> {
        object.into_fleet()
    }
}

impl Stored for ChildRecord {
    const KIND: ObjectKind = ObjectKind::Child;

    fn from_object(object: Object) -> Option<Self> {
        object.into_child()
    }
}

impl Stored for Instance {
    const KIND: ObjectKind = ObjectKind::Instance;

    fn from_object(object: Object) -> Option<Self> {
        object.into_instance()
    }
}

impl Stored for Service {
    const KIND: ObjectKind = ObjectKind::Service;

    fn from_object(object: Object) -> Option<Self> {
        object.into_service()
    }
}

fn downcast<T: Stored>(object: Object) -> StoreResult<T> {
    let key = object.key();
    T::from_object(object).ok_or(StoreError::UnexpectedKind(key))
}

/// Fetches `namespace/name` as a `T`.
pub async fn get_as<T: Stored>(
    store: &dyn ClusterStore,
    namespace: &str,
    name: &str,
) -> StoreResult<T> {
    let object = store.get(&ObjectKey::new(T::KIND, namespace, name)).await?;
    downcast(object)
}

/// Lists `T`s in `namespace` matching `selector`.
pub async fn list_as<T: Stored>(
    store: &dyn ClusterStore,
    namespace: &str,
    selector: &LabelSelector,
) -> StoreResult<Vec<T>> {
    store
        .list(T::KIND, Some(namespace), selector)
        .await?
        .into_iter()
        .map(downcast)
        .collect()
}

/// Creates `value` and returns the stored copy.
pub async fn create_as<T: Stored>(store: &dyn ClusterStore, value: T) -> StoreResult<T> {
    downcast(store.create(value.into()).await?)
}

/// Updates `value` and returns the stored copy.
pub async fn update_as<T: Stored>(store: &dyn ClusterStore, value: T) -> StoreResult<T> {
    downcast(store.update(value.into()).await?)
}
