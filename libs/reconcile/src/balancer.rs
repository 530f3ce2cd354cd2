//! Replica balancing.
//!
//! Computes the create/delete set that moves the observed instances of one
//! child to its desired count and template.
//!
//! - Drift (any observed instance stale): delete all, create `desired` fresh.
//!   Deletions are applied before creations so capacity never exceeds the
//!   desired count.
//! - Scale up: ordered kinds fill missing indices of `0..desired` in
//!   ascending order; pool kinds draw random names.
//! - Scale down: ordered kinds delete indices `>= desired` in descending
//!   order; pool kinds delete exactly the excess, worst instances first.
//!
//! Child records are balanced with the same ordered rules by
//! [`plan_records`], except that a changed record is updated in place.

use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet};

use fleet_model::{ChildRecord, ChildTemplate, Instance, InstancePhase};

use crate::differ::is_up_to_date;
use crate::identity::{ordinal_instance_name, IdentityAllocator, IdentityStyle};

/// Which algorithmic path produced a plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanPath {
    /// Up to date and at the desired count.
    Steady,

    /// Up to date, count differs (or ordinal gaps need filling).
    Scale,

    /// At least one instance is stale; full replacement.
    Drift,
}

/// An instance the balancer wants created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Creation {
    pub name: String,

    /// Ordinal for ordered kinds.
    pub index: Option<usize>,
}

/// Output of [`plan`].
#[derive(Debug, Clone, PartialEq)]
pub struct Plan {
    pub path: PlanPath,

    /// Applied first, in order.
    pub to_delete: Vec<Instance>,

    /// Applied after deletions, in order.
    pub to_create: Vec<Creation>,
}

impl Plan {
    pub fn is_empty(&self) -> bool {
        self.to_delete.is_empty() && self.to_create.is_empty()
    }
}

/// Plans the actions converging `observed` to `desired` copies of `template`.
///
/// `owner` is the name new instances are derived from. `desired == 0` deletes
/// everything.
pub fn plan(
    desired: usize,
    template: &ChildTemplate,
    observed: Vec<Instance>,
    owner: &str,
    style: IdentityStyle,
    allocator: &mut IdentityAllocator,
) -> Plan {
    if !is_up_to_date(template, &observed) {
        let taken: BTreeSet<String> = observed.iter().map(|i| i.name().to_string()).collect();
        let to_create = match style {
            IdentityStyle::Ordered => (0..desired)
                .map(|index| Creation {
                    name: ordinal_instance_name(owner, index),
                    index: Some(index),
                })
                .collect(),
            IdentityStyle::Pool => pool_creations(desired, owner, taken, allocator),
        };
        return Plan {
            path: PlanPath::Drift,
            to_delete: observed,
            to_create,
        };
    }

    let plan = match style {
        IdentityStyle::Ordered => plan_ordered(desired, observed, owner),
        IdentityStyle::Pool => plan_pool(desired, observed, owner, allocator),
    };

    if plan.is_empty() {
        Plan {
            path: PlanPath::Steady,
            ..plan
        }
    } else {
        plan
    }
}

fn plan_ordered(desired: usize, observed: Vec<Instance>, owner: &str) -> Plan {
    let names: BTreeSet<String> = observed.iter().map(|i| i.name().to_string()).collect();

    let mut slots: BTreeMap<usize, Instance> = BTreeMap::new();
    let mut strays = Vec::new();
    for instance in observed {
        match ordinal_of(&instance, owner) {
            Some(index) if index < desired && !slots.contains_key(&index) => {
                slots.insert(index, instance);
            }
            Some(index) => strays.push((Some(index), instance)),
            None => strays.push((None, instance)),
        }
    }

    // Highest ordinal first; unindexed leftovers after the indexed ones.
    strays.sort_by_key(|(index, instance)| {
        (index.is_none(), Reverse(*index), instance.name().to_string())
    });
    let to_delete: Vec<Instance> = strays.into_iter().map(|(_, i)| i).collect();

    let to_create = (0..desired)
        .filter(|index| !slots.contains_key(index))
        .map(|index| Creation {
            name: ordinal_instance_name(owner, index),
            index: Some(index),
        })
        // Already created by an earlier partial pass.
        .filter(|creation| !names.contains(&creation.name))
        .collect();

    Plan {
        path: PlanPath::Scale,
        to_delete,
        to_create,
    }
}

fn plan_pool(
    desired: usize,
    observed: Vec<Instance>,
    owner: &str,
    allocator: &mut IdentityAllocator,
) -> Plan {
    let actual = observed.len();
    let taken: BTreeSet<String> = observed.iter().map(|i| i.name().to_string()).collect();

    let to_delete = if actual > desired {
        drain_order(observed)
            .into_iter()
            .take(actual - desired)
            .collect()
    } else {
        Vec::new()
    };

    let to_create = pool_creations(desired.saturating_sub(actual), owner, taken, allocator);

    Plan {
        path: PlanPath::Scale,
        to_delete,
        to_create,
    }
}

fn pool_creations(
    count: usize,
    owner: &str,
    mut taken: BTreeSet<String>,
    allocator: &mut IdentityAllocator,
) -> Vec<Creation> {
    (0..count)
        .map(|_| {
            let name = allocator.pool_name_avoiding(owner, &taken);
            taken.insert(name.clone());
            Creation { name, index: None }
        })
        .collect()
}

/// Ordinal of an ordered instance: the index label, else the name suffix.
fn ordinal_of(instance: &Instance, owner: &str) -> Option<usize> {
    instance.index().or_else(|| {
        let ordinal: usize = instance
            .name()
            .strip_prefix(owner)?
            .strip_prefix('-')?
            .parse()
            .ok()?;
        ordinal.checked_sub(1)
    })
}

/// Drain selection priority for pool instances.
///
/// Lower priority values are drained first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum DrainPriority {
    /// Instance has failed (drain first).
    Failed = 0,

    /// Instance has not started yet.
    Pending = 1,

    /// Instance is running (drain last).
    Running = 2,
}

impl From<InstancePhase> for DrainPriority {
    fn from(phase: InstancePhase) -> Self {
        match phase {
            InstancePhase::Failed => DrainPriority::Failed,
            InstancePhase::Pending => DrainPriority::Pending,
            InstancePhase::Running => DrainPriority::Running,
        }
    }
}

/// Sorts pool instances into drain order.
///
/// Failed before pending before running; within a priority the newest goes
/// first, ties broken by name for determinism.
pub fn drain_order(mut instances: Vec<Instance>) -> Vec<Instance> {
    instances.sort_by(|a, b| {
        DrainPriority::from(a.status.phase)
            .cmp(&DrainPriority::from(b.status.phase))
            .then_with(|| b.metadata.created_at.cmp(&a.metadata.created_at))
            .then_with(|| b.metadata.name.cmp(&a.metadata.name))
    });
    instances
}

/// Output of [`plan_records`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordPlan {
    /// Ascending index order.
    pub to_create: Vec<ChildRecord>,

    /// Observed metadata with the desired spec and labels.
    pub to_update: Vec<ChildRecord>,

    /// Descending index order.
    pub to_delete: Vec<ChildRecord>,
}

impl RecordPlan {
    pub fn is_empty(&self) -> bool {
        self.to_create.is_empty() && self.to_update.is_empty() && self.to_delete.is_empty()
    }
}

/// Balances index-addressable child records.
///
/// `desired` must be the composer's output for one kind (names unique and
/// derived from the index). Records are declarative, so a changed record is
/// updated in place; its instances are replaced by the child pass.
pub fn plan_records(desired: Vec<ChildRecord>, observed: Vec<ChildRecord>) -> RecordPlan {
    let mut observed: BTreeMap<String, ChildRecord> = observed
        .into_iter()
        .map(|record| (record.metadata.name.clone(), record))
        .collect();

    let mut desired = desired;
    desired.sort_by_key(|record| record.metadata.index());

    let mut plan = RecordPlan::default();
    for record in desired {
        match observed.remove(&record.metadata.name) {
            None => plan.to_create.push(record),
            Some(current) => {
                if current.spec != record.spec || current.metadata.labels != record.metadata.labels
                {
                    let mut updated = current;
                    updated.spec = record.spec;
                    updated.metadata.labels = record.metadata.labels;
                    plan.to_update.push(updated);
                }
            }
        }
    }

    let mut leftovers: Vec<ChildRecord> = observed.into_values().collect();
    leftovers.sort_by_key(|record| {
        (
            Reverse(record.metadata.index()),
            Reverse(record.metadata.name.clone()),
        )
    });
    plan.to_delete = leftovers;
    plan
}
