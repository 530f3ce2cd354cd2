//! Celery fleet controller.
//!
//! Drives the reconciliation engine against a cluster state store:
//! - fleet passes provision the broker, maintain child records and report
//!   status back onto the fleet
//! - child passes converge the instances of each record
//! - a background worker turns store events, resyncs and requeues into passes
//!
//! See the `fleet-reconcile` crate for the planning rules.

pub mod config;
pub mod manifest;
pub mod orchestrator;
pub mod store;
pub mod worker;

pub use orchestrator::{ChildReconciler, FleetReconciler, Outcome};
pub use store::{ClusterStore, MemoryStore, StoreError, WatchEvent};
pub use worker::{ControllerWorker, WorkerConfig};
