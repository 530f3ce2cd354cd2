//! Reconciliation engine for celery fleets.
//!
//! Pure functions that turn a declared fleet plus the observed cluster state
//! into an ordered list of actions. Key concepts:
//!
//! - **Desired state**: the fleet spec, expanded into one child record per
//!   broker, scheduler entry and worker entry.
//! - **Observed state**: child records and instances found in the store by
//!   their `{owner, kind}` labels.
//! - **Convergence**: one applied plan moves observed to desired; the next
//!   plan over the result is empty.
//!
//! # Invariants
//!
//! - Plans are idempotent: re-planning an applied plan yields no actions
//! - Ordered children always occupy the contiguous indices `0..desired`
//! - One stale instance replaces the whole set (delete first, then create)
//! - No scheduler or worker template is built without a broker address
//!
//! Nothing here performs I/O. Applying plans, retrying and status writes
//! belong to the controller.

use std::time::Duration;

pub mod backoff;
pub mod balancer;
pub mod composer;
pub mod differ;
pub mod error;
pub mod identity;
pub mod planner;
pub mod profile;
pub mod propagator;

pub use backoff::RequeueBackoff;
pub use balancer::{plan, plan_records, Creation, DrainPriority, Plan, PlanPath, RecordPlan};
pub use composer::{expand, Expansion};
pub use differ::{instance_is_up_to_date, is_up_to_date};
pub use error::{ReconcileError, ReconcileResult};
pub use identity::{IdentityAllocator, IdentityStyle};
pub use planner::{
    failed_status, materialize, plan_child, plan_fleet, ChildPlan, FleetPlan, ObservedChildren,
};
pub use profile::{KindProfile, TemplateSource};
pub use propagator::{canonical_address, resolve_broker_address, BrokerResolution, ProvisionAction};

/// Default interval between full resyncs of every fleet.
pub const DEFAULT_RESYNC_INTERVAL: Duration = Duration::from_secs(30);

/// Default delay before the first requeue of a failing key.
pub const DEFAULT_REQUEUE_BASE: Duration = Duration::from_secs(1);

/// Default cap on requeue delays.
pub const DEFAULT_REQUEUE_MAX: Duration = Duration::from_secs(5 * 60);
