//! Capacity-bounded admission buckets.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{GroupId, MembershipProvider, PoolId, UserId};

/// One admission bucket of an event.
///
/// A pool accepts registrations once its activation date has passed, and
/// only from users in at least one of its permission groups. `capacity` is
/// a soft ceiling checked at admission time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pool {
    /// Unique pool identifier (immutable after creation).
    pub id: PoolId,

    /// Display name, e.g. `"Abakus"`.
    pub name: String,

    /// Number of registrations the pool admits.
    pub capacity: u32,

    /// Instant from which the pool accepts registrations.
    pub activation_date: DateTime<Utc>,

    /// Membership in ANY of these groups makes a user eligible.
    pub permission_groups: Vec<GroupId>,
}

impl Pool {
    /// Creates a pool with a fresh id.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        capacity: u32,
        activation_date: DateTime<Utc>,
        permission_groups: Vec<GroupId>,
    ) -> Self {
        Self {
            id: PoolId::new(),
            name: name.into(),
            capacity,
            activation_date,
            permission_groups,
        }
    }

    /// Returns `true` once `now` has reached the activation date.
    #[must_use]
    pub fn is_activated(&self, now: DateTime<Utc>) -> bool {
        now >= self.activation_date
    }

    /// Smallest membership depth of `user` across the pool's groups, or
    /// `None` if the user is in none of them.
    #[must_use]
    pub fn membership_depth(&self, user: UserId, membership: &dyn MembershipProvider) -> Option<u32> {
        self.permission_groups
            .iter()
            .filter_map(|group| membership.membership_depth(user, *group))
            .min()
    }

    /// Returns `true` if `user` belongs to any of the pool's groups.
    #[must_use]
    pub fn admits(&self, user: UserId, membership: &dyn MembershipProvider) -> bool {
        self.membership_depth(user, membership).is_some()
    }
}

/// Read-only view of a pool with its live registration count.
#[derive(Debug, Clone, Serialize)]
pub struct PoolSummary {
    /// Pool identifier.
    pub pool_id: PoolId,
    /// Pool name.
    pub name: String,
    /// Nominal capacity.
    pub capacity: u32,
    /// Active registrations bound to the pool.
    pub number_of_registrations: u32,
    /// Activation instant.
    pub activation_date: DateTime<Utc>,
    /// Whether the pool was activated when the summary was taken.
    pub is_activated: bool,
}

impl PoolSummary {
    /// Builds a summary from a pool and its current count.
    #[must_use]
    pub fn new(pool: &Pool, number_of_registrations: u32, now: DateTime<Utc>) -> Self {
        Self {
            pool_id: pool.id,
            name: pool.name.clone(),
            capacity: pool.capacity,
            number_of_registrations,
            activation_date: pool.activation_date,
            is_activated: pool.is_activated(now),
        }
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::domain::GroupDirectory;
    use chrono::Duration;

    #[test]
    fn activation_is_inclusive() {
        let now = Utc::now();
        let pool = Pool::new("Abakus", 3, now, Vec::new());
        assert!(pool.is_activated(now));
        assert!(!pool.is_activated(now - Duration::seconds(1)));
    }

    #[test]
    fn admits_member_of_any_group() {
        let dir = GroupDirectory::new();
        let Ok(abakus) = dir.add_group("Abakus", None) else {
            panic!("group creation failed");
        };
        let Ok(bedkom) = dir.add_group("Bedkom", None) else {
            panic!("group creation failed");
        };
        let user = UserId::new();
        let _ = dir.add_user(bedkom, user);

        let pool = Pool::new("Mixed", 5, Utc::now(), vec![abakus, bedkom]);
        assert!(pool.admits(user, &dir));
        assert_eq!(pool.membership_depth(user, &dir), Some(0));

        let closed = Pool::new("Abakus", 5, Utc::now(), vec![abakus]);
        assert!(!closed.admits(user, &dir));
    }

    #[test]
    fn summary_reflects_count() {
        let now = Utc::now();
        let pool = Pool::new("Webkom", 2, now + Duration::hours(1), Vec::new());
        let summary = PoolSummary::new(&pool, 1, now);
        assert_eq!(summary.number_of_registrations, 1);
        assert_eq!(summary.capacity, 2);
        assert!(!summary.is_activated);
    }
}
