//! Pool selection for registrations and promotions.
//!
//! The functions here are pure: they see one user's view of an event as a
//! slice of [`PoolLoad`]s and decide where that user goes. Locking, clocks
//! and bookkeeping live in [`super::Event`].

use std::cmp::{Ordering, Reverse};

use super::PoolId;

/// Whether pools of an event still admit separately or share capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Before the merge time: every pool is its own bucket.
    Distinct,
    /// At or after the merge time: activated pools form one virtual bucket.
    Merged,
}

/// One pool as seen by one user at one instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolLoad {
    /// Pool identifier.
    pub pool_id: PoolId,
    /// Position of the pool in the event (creation order).
    pub position: usize,
    /// Nominal capacity.
    pub capacity: u32,
    /// Active registrations currently bound to the pool.
    pub registered: u32,
    /// Whether the activation date has passed.
    pub activated: bool,
    /// User's membership depth for the pool's groups, `None` if not a member.
    pub depth: Option<u32>,
}

impl PoolLoad {
    /// Capacity left in the pool; negative once a merged bump overfilled it.
    #[must_use]
    pub fn remaining(&self) -> i64 {
        i64::from(self.capacity) - i64::from(self.registered)
    }

    /// Returns `true` if at least one seat is free.
    #[must_use]
    pub fn has_spare(&self) -> bool {
        self.registered < self.capacity
    }

    /// Activated and the user is a member of one of its groups.
    #[must_use]
    pub const fn is_permitted(&self) -> bool {
        self.activated && self.depth.is_some()
    }
}

/// Outcome of an admission attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Seat the user in this pool.
    Pool(PoolId),
    /// Permitted somewhere but out of capacity: queue the user.
    WaitingList,
    /// No activated pool admits the user.
    Rejected,
}

/// Spare seats of the virtual bucket formed by all activated pools.
#[must_use]
pub fn combined_spare(loads: &[PoolLoad]) -> i64 {
    loads
        .iter()
        .filter(|load| load.activated)
        .map(PoolLoad::remaining)
        .sum()
}

/// Preference order between two permitted pools: free seats first, then the
/// most specific group, then most remaining capacity, then creation order.
fn preference(a: &PoolLoad, b: &PoolLoad) -> Ordering {
    let key = |load: &PoolLoad| {
        (
            Reverse(load.has_spare()),
            load.depth.unwrap_or(u32::MAX),
            Reverse(load.remaining()),
            load.position,
        )
    };
    key(a).cmp(&key(b))
}

/// Picks the preferred pool among `candidates`.
fn select<'a>(candidates: impl Iterator<Item = &'a PoolLoad>) -> Option<PoolId> {
    candidates.min_by(|a, b| preference(a, b)).map(|load| load.pool_id)
}

/// Decides where a new registration goes.
#[must_use]
pub fn admit(phase: Phase, loads: &[PoolLoad]) -> Admission {
    if !loads.iter().any(PoolLoad::is_permitted) {
        return Admission::Rejected;
    }
    let chosen = match phase {
        Phase::Distinct => select(
            loads
                .iter()
                .filter(|load| load.is_permitted() && load.has_spare()),
        ),
        Phase::Merged if combined_spare(loads) > 0 => {
            select(loads.iter().filter(|load| load.is_permitted()))
        }
        Phase::Merged => None,
    };
    chosen.map_or(Admission::WaitingList, Admission::Pool)
}

/// Decides which pool a waiting user is promoted into, if any.
///
/// With a source pool in the distinct phase the user must be permitted for
/// exactly that pool. Otherwise any permitted pool qualifies and the
/// preferred one wins. Promotion is forced: capacity is not re-checked.
#[must_use]
pub fn promotion_target(
    phase: Phase,
    from_pool: Option<PoolId>,
    loads: &[PoolLoad],
) -> Option<PoolId> {
    match (phase, from_pool) {
        (Phase::Distinct, Some(from)) => loads
            .iter()
            .find(|load| load.pool_id == from && load.is_permitted())
            .map(|load| load.pool_id),
        _ => select(loads.iter().filter(|load| load.is_permitted())),
    }
}
