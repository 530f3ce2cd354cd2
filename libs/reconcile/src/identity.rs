//! Identity allocation for child records and instances.
//!
//! Two styles:
//! - ordered: `{base}-{kind}-{index+1}`, reproducible across passes so an
//!   update targets the same object instead of creating a duplicate
//! - pool: `{owner}-{suffix}` with a short random suffix for fungible
//!   members; a collision surfaces as a retryable store conflict

use std::collections::BTreeSet;

use fleet_model::ChildKind;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Length of the random suffix for pool members.
pub const POOL_SUFFIX_LEN: usize = 5;

/// Draws attempted before accepting a name that is already known to exist.
const MAX_SUFFIX_ATTEMPTS: usize = 16;

// No vowels, no easily confused characters.
const SUFFIX_ALPHABET: &[u8] = b"bcdfghjklmnpqrstvwxz2456789";

/// How members of a kind are named.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentityStyle {
    /// Stable ordinal position; survivors are always the prefix `0..n`.
    Ordered,

    /// Fungible members with random suffixes.
    Pool,
}

/// `{base}-{kind}-{index+1}`.
pub fn ordered_name(base: &str, kind: ChildKind, index: usize) -> String {
    format!("{}-{}-{}", base, kind, index + 1)
}

/// Parses the zero-based index back out of an [`ordered_name`].
pub fn parse_ordered_name(name: &str, base: &str, kind: ChildKind) -> Option<usize> {
    let ordinal: usize = name
        .strip_prefix(base)?
        .strip_prefix('-')?
        .strip_prefix(kind.as_str())?
        .strip_prefix('-')?
        .parse()
        .ok()?;
    ordinal.checked_sub(1)
}

/// `{owner}-{index+1}` for ordered instances of a record.
pub fn ordinal_instance_name(owner: &str, index: usize) -> String {
    format!("{}-{}", owner, index + 1)
}

/// Name of the single broker record of a fleet.
pub fn broker_record_name(fleet: &str) -> String {
    format!("{}-{}", fleet, ChildKind::Broker)
}

/// Name of the service fronting a provisioned broker.
pub fn broker_service_name(fleet: &str) -> String {
    format!("{}-service", broker_record_name(fleet))
}

/// Allocates names for children.
#[derive(Debug)]
pub struct IdentityAllocator {
    rng: StdRng,
}

impl IdentityAllocator {
    /// Allocator seeded from the operating system.
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_os_rng(),
        }
    }

    /// Deterministic allocator, for tests and replays.
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Ordered name when `index` is given, pool name otherwise.
    pub fn allocate(&mut self, base: &str, kind: ChildKind, index: Option<usize>) -> String {
        match index {
            Some(index) => ordered_name(base, kind, index),
            None => self.pool_name(base),
        }
    }

    /// `{owner}-{suffix}`.
    pub fn pool_name(&mut self, owner: &str) -> String {
        let suffix: String = (0..POOL_SUFFIX_LEN)
            .map(|_| SUFFIX_ALPHABET[self.rng.random_range(0..SUFFIX_ALPHABET.len())] as char)
            .collect();
        format!("{}-{}", owner, suffix)
    }

    /// Pool name that is not in `taken`.
    ///
    /// Gives up after a bounded number of draws and returns the last one;
    /// the store then rejects it as already existing.
    pub fn pool_name_avoiding(&mut self, owner: &str, taken: &BTreeSet<String>) -> String {
        let mut name = self.pool_name(owner);
        for _ in 1..MAX_SUFFIX_ATTEMPTS {
            if !taken.contains(&name) {
                break;
            }
            name = self.pool_name(owner);
        }
        name
    }
}

impl Default for IdentityAllocator {
    fn default() -> Self {
        Self::new()
    }
}
