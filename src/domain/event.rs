//! Event aggregate: pools, registration history and the waiting list.
//!
//! An [`Event`] owns everything the admission engine reads and writes for
//! one event. Every decision takes the current instant and a
//! [`MembershipProvider`] explicitly, so the aggregate itself holds no
//! clock and no group state. Callers serialize access per event (see
//! [`super::EventRegistry`]).
//!
//! Each operation comes in two halves. `plan_*` methods borrow the event
//! immutably and return the rows the operation would write; [`Event::apply`]
//! folds those rows back in and keeps the per-pool seat counts, the user
//! index and the waiting index current. Callers that persist rows plan,
//! write, then apply, so a failed write never touches the aggregate.

use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::admission::{self, Admission, Phase, PoolLoad};
use super::pool::PoolSummary;
use super::registration::WaitingKey;
use super::{EventId, MembershipProvider, Pool, PoolId, Registration, UserId};
use crate::error::AdmissionError;

/// Result of a withdrawal: the withdrawn row and the waiting registration
/// promoted into the freed seat, if any.
#[derive(Debug, Clone, Serialize)]
pub struct Unregistration {
    /// The registration as it looks after withdrawal.
    pub withdrawn: Registration,
    /// Waiting registration bumped into a pool as a consequence.
    pub bumped: Option<Registration>,
}

impl Unregistration {
    /// Rows touched by the withdrawal, in write order.
    #[must_use]
    pub fn rows(&self) -> Vec<Registration> {
        std::iter::once(&self.withdrawn)
            .chain(self.bumped.as_ref())
            .cloned()
            .collect()
    }
}

/// Aggregate counts of an event.
#[derive(Debug, Clone, Serialize)]
pub struct EventSummary {
    /// Event identifier.
    pub event_id: EventId,
    /// Event title.
    pub title: String,
    /// Merge instant, if any.
    pub merge_time: Option<DateTime<Utc>>,
    /// Whether pools were merged when the summary was taken.
    pub is_merged: bool,
    /// Sum of pool capacities.
    pub capacity: u64,
    /// Active pooled registrations.
    pub number_of_registrations: usize,
    /// Active waiting registrations.
    pub waiting_count: usize,
    /// Per-pool view.
    pub pools: Vec<PoolSummary>,
}

/// An event with its pools and registrations.
#[derive(Debug, Clone)]
pub struct Event {
    /// Unique event identifier (immutable after creation).
    pub id: EventId,

    /// Event title.
    pub title: String,

    /// Instant at which pools merge into one shared bucket.
    pub merge_time: Option<DateTime<Utc>>,

    /// Creation timestamp.
    pub created_at: DateTime<Utc>,

    pools: Vec<Pool>,

    /// Every registration ever created, indexed by sequence.
    registrations: Vec<Registration>,

    /// Active registration per user, as an index into `registrations`.
    active_by_user: HashMap<UserId, usize>,

    /// Active pooled registrations per pool.
    seated: HashMap<PoolId, u32>,

    waiting: BTreeSet<WaitingKey>,
}

impl Event {
    /// Creates an event without pools.
    #[must_use]
    pub fn new(title: impl Into<String>, merge_time: Option<DateTime<Utc>>) -> Self {
        Self::empty(EventId::new(), title.into(), merge_time, Utc::now(), Vec::new())
    }

    fn empty(
        id: EventId,
        title: String,
        merge_time: Option<DateTime<Utc>>,
        created_at: DateTime<Utc>,
        pools: Vec<Pool>,
    ) -> Self {
        Self {
            id,
            title,
            merge_time,
            created_at,
            pools,
            registrations: Vec::new(),
            active_by_user: HashMap::new(),
            seated: HashMap::new(),
            waiting: BTreeSet::new(),
        }
    }

    /// Rebuilds an event from stored rows, restoring the seat counts, the
    /// user index and the waiting list.
    ///
    /// # Errors
    ///
    /// Returns [`AdmissionError::InvalidRequest`] if the rows are
    /// inconsistent (foreign registrations, sequence gaps, two active
    /// registrations for one user) and [`AdmissionError::PoolNotFound`] for
    /// rows pointing at an unknown pool.
    pub fn from_parts(
        id: EventId,
        title: String,
        merge_time: Option<DateTime<Utc>>,
        created_at: DateTime<Utc>,
        pools: Vec<Pool>,
        mut registrations: Vec<Registration>,
    ) -> Result<Self, AdmissionError> {
        registrations.sort_by_key(|reg| reg.sequence);
        let mut event = Self::empty(id, title, merge_time, created_at, pools);
        event.registrations.reserve(registrations.len());
        for reg in &registrations {
            event.apply(std::slice::from_ref(reg))?;
        }
        Ok(event)
    }

    /// Adds a pool to the event.
    ///
    /// # Errors
    ///
    /// Returns [`AdmissionError::InvalidRequest`] if a pool with the same id
    /// is already attached.
    pub fn add_pool(&mut self, pool: Pool) -> Result<PoolId, AdmissionError> {
        if self.pool(pool.id).is_some() {
            return Err(AdmissionError::InvalidRequest(format!(
                "pool {} already exists",
                pool.id
            )));
        }
        let id = pool.id;
        self.pools.push(pool);
        Ok(id)
    }

    /// Pools in creation order.
    #[must_use]
    pub fn pools(&self) -> &[Pool] {
        &self.pools
    }

    /// Looks a pool up by id.
    #[must_use]
    pub fn pool(&self, pool_id: PoolId) -> Option<&Pool> {
        self.pools.iter().find(|pool| pool.id == pool_id)
    }

    /// Looks a pool up by name.
    #[must_use]
    pub fn pool_by_name(&self, name: &str) -> Option<&Pool> {
        self.pools.iter().find(|pool| pool.name == name)
    }

    /// Returns `true` once `now` has reached the merge time.
    #[must_use]
    pub fn is_merged(&self, now: DateTime<Utc>) -> bool {
        self.merge_time.is_some_and(|merge| now >= merge)
    }

    /// Admission phase at `now`.
    #[must_use]
    pub fn phase(&self, now: DateTime<Utc>) -> Phase {
        if self.is_merged(now) {
            Phase::Merged
        } else {
            Phase::Distinct
        }
    }

    /// Sum of all pool capacities.
    #[must_use]
    pub fn capacity(&self) -> u64 {
        self.pools.iter().map(|pool| u64::from(pool.capacity)).sum()
    }

    /// Active registrations holding a seat (waiting list excluded).
    #[must_use]
    pub fn number_of_registrations(&self) -> usize {
        self.seated.values().map(|n| *n as usize).sum()
    }

    /// Active registrations seated in `pool_id`.
    #[must_use]
    pub fn pool_registrations(&self, pool_id: PoolId) -> u32 {
        self.seated.get(&pool_id).copied().unwrap_or(0)
    }

    /// Waiting registrations, earliest first.
    pub fn waiting_pool_registrations(&self) -> impl Iterator<Item = &Registration> + '_ {
        self.waiting
            .iter()
            .filter_map(|key| self.registration_at(key.sequence))
    }

    /// Number of waiting registrations.
    #[must_use]
    pub fn waiting_count(&self) -> usize {
        self.waiting.len()
    }

    /// Full registration history, in creation order.
    #[must_use]
    pub fn registrations(&self) -> &[Registration] {
        &self.registrations
    }

    /// The user's active registration, if any.
    #[must_use]
    pub fn active_registration(&self, user: UserId) -> Option<&Registration> {
        self.active_by_user
            .get(&user)
            .and_then(|index| self.registrations.get(*index))
    }

    /// Decides where `user` would be registered, without changing the event.
    ///
    /// # Errors
    ///
    /// Returns [`AdmissionError::NoAvailablePools`] if the user already
    /// holds an active registration or no activated pool admits them.
    pub fn plan_register(
        &self,
        user: UserId,
        membership: &dyn MembershipProvider,
        now: DateTime<Utc>,
    ) -> Result<Registration, AdmissionError> {
        if self.active_by_user.contains_key(&user) {
            return Err(AdmissionError::NoAvailablePools);
        }

        let loads = self.loads_for(user, membership, now, &self.seated);
        let pool = match admission::admit(self.phase(now), &loads) {
            Admission::Rejected => return Err(AdmissionError::NoAvailablePools),
            Admission::WaitingList => None,
            Admission::Pool(pool_id) => Some(pool_id),
        };

        let sequence = u64::try_from(self.registrations.len())
            .map_err(|_| AdmissionError::Internal("registration sequence overflow".to_string()))?;
        Ok(Registration::new(self.id, user, sequence, now, pool))
    }

    /// Registers `user`, seating them in a pool or queueing them.
    ///
    /// # Errors
    ///
    /// Returns [`AdmissionError::NoAvailablePools`] if the user already
    /// holds an active registration or no activated pool admits them.
    pub fn register(
        &mut self,
        user: UserId,
        membership: &dyn MembershipProvider,
        now: DateTime<Utc>,
    ) -> Result<Registration, AdmissionError> {
        let registration = self.plan_register(user, membership, now)?;
        self.apply(std::slice::from_ref(&registration))?;
        Ok(registration)
    }

    /// Computes the withdrawal of the user's active registration and, if
    /// that frees a seat, the waiting registration bumped into it.
    ///
    /// # Errors
    ///
    /// Returns [`AdmissionError::RegistrationNotFound`] if the user has no
    /// active registration.
    pub fn plan_unregister(
        &self,
        user: UserId,
        membership: &dyn MembershipProvider,
        now: DateTime<Utc>,
    ) -> Result<Unregistration, AdmissionError> {
        let Some(current) = self.active_registration(user) else {
            return Err(AdmissionError::RegistrationNotFound {
                event_id: *self.id.as_uuid(),
                user_id: *user.as_uuid(),
            });
        };
        let mut withdrawn = current.clone();
        withdrawn.withdraw(now)?;

        let bumped = match current.pool() {
            None => None,
            Some(pool_id) => {
                let mut counts = self.seated.clone();
                if let Some(count) = counts.get_mut(&pool_id) {
                    *count = count.saturating_sub(1);
                }
                if self.has_spare(pool_id, now, &counts) {
                    self.next_promotion(Some(pool_id), membership, now, &counts)?
                } else {
                    None
                }
            }
        };

        Ok(Unregistration { withdrawn, bumped })
    }

    /// Withdraws the user's active registration and, if that freed a seat,
    /// bumps the earliest eligible waiting registration into it.
    ///
    /// # Errors
    ///
    /// Returns [`AdmissionError::RegistrationNotFound`] if the user has no
    /// active registration.
    pub fn unregister(
        &mut self,
        user: UserId,
        membership: &dyn MembershipProvider,
        now: DateTime<Utc>,
    ) -> Result<Unregistration, AdmissionError> {
        let outcome = self.plan_unregister(user, membership, now)?;
        self.apply(&outcome.rows())?;
        Ok(outcome)
    }

    /// Finds the earliest waiting registration eligible for `from_pool` and
    /// returns it promoted, without changing the event.
    ///
    /// Capacity is not re-checked: the caller asserts a seat is available.
    ///
    /// # Errors
    ///
    /// Returns [`AdmissionError::PoolNotFound`] if the pool is not part of
    /// this event.
    pub fn plan_bump(
        &self,
        from_pool: PoolId,
        membership: &dyn MembershipProvider,
        now: DateTime<Utc>,
    ) -> Result<Option<Registration>, AdmissionError> {
        if self.pool(from_pool).is_none() {
            return Err(AdmissionError::PoolNotFound(*from_pool.as_uuid()));
        }
        self.next_promotion(Some(from_pool), membership, now, &self.seated)
    }

    /// Promotes the earliest waiting registration eligible for `from_pool`.
    ///
    /// # Errors
    ///
    /// Returns [`AdmissionError::PoolNotFound`] if the pool is not part of
    /// this event.
    pub fn bump(
        &mut self,
        from_pool: PoolId,
        membership: &dyn MembershipProvider,
        now: DateTime<Utc>,
    ) -> Result<Option<Registration>, AdmissionError> {
        let promoted = self.plan_bump(from_pool, membership, now)?;
        self.apply(promoted.as_slice())?;
        Ok(promoted)
    }

    /// Finds the earliest eligible waiting registration and returns it
    /// promoted into its preferred pool, without changing the event.
    ///
    /// # Errors
    ///
    /// Returns [`AdmissionError::Internal`] if the waiting index is corrupt.
    pub fn plan_pop(
        &self,
        membership: &dyn MembershipProvider,
        now: DateTime<Utc>,
    ) -> Result<Option<Registration>, AdmissionError> {
        self.next_promotion(None, membership, now, &self.seated)
    }

    /// Promotes the earliest eligible waiting registration into its
    /// preferred pool, without a source pool.
    ///
    /// # Errors
    ///
    /// Returns [`AdmissionError::Internal`] if the waiting index is corrupt.
    pub fn pop_from_waiting_pool(
        &mut self,
        membership: &dyn MembershipProvider,
        now: DateTime<Utc>,
    ) -> Result<Option<Registration>, AdmissionError> {
        let promoted = self.plan_pop(membership, now)?;
        self.apply(promoted.as_slice())?;
        Ok(promoted)
    }

    /// Folds planned or stored rows into the event.
    ///
    /// A row whose sequence is already known replaces that row; a row with
    /// the next free sequence is appended. The batch is validated before
    /// anything changes.
    ///
    /// # Errors
    ///
    /// Returns [`AdmissionError::InvalidRequest`] for foreign rows, sequence
    /// gaps or a second active registration for one user, and
    /// [`AdmissionError::PoolNotFound`] for rows pointing at an unknown pool.
    pub fn apply(&mut self, rows: &[Registration]) -> Result<(), AdmissionError> {
        let known = self.registrations.len();
        let mut next = known;
        for row in rows {
            if row.event_id != self.id {
                return Err(AdmissionError::InvalidRequest(format!(
                    "registration {} belongs to event {}",
                    row.id, row.event_id
                )));
            }
            let index = Self::index_of(row)?;
            if index == next {
                next = next.saturating_add(1);
            } else if index >= known {
                return Err(AdmissionError::InvalidRequest(format!(
                    "registration sequence gap at {next}"
                )));
            }
            if let Some(pool_id) = row.pool()
                && self.pool(pool_id).is_none()
            {
                return Err(AdmissionError::PoolNotFound(*pool_id.as_uuid()));
            }
            if row.is_active()
                && self
                    .active_by_user
                    .get(&row.user_id)
                    .is_some_and(|active| *active != index)
            {
                return Err(AdmissionError::InvalidRequest(format!(
                    "user {} has two active registrations",
                    row.user_id
                )));
            }
        }

        for row in rows {
            let index = Self::index_of(row)?;
            let replaced = match self.registrations.get_mut(index) {
                Some(slot) => Some(std::mem::replace(slot, row.clone())),
                None => {
                    self.registrations.push(row.clone());
                    None
                }
            };
            if let Some(old) = replaced {
                self.unindex(&old);
            }
            self.index(index, row);
        }
        Ok(())
    }

    /// Aggregate view at `now`.
    #[must_use]
    pub fn summary(&self, now: DateTime<Utc>) -> EventSummary {
        EventSummary {
            event_id: self.id,
            title: self.title.clone(),
            merge_time: self.merge_time,
            is_merged: self.is_merged(now),
            capacity: self.capacity(),
            number_of_registrations: self.number_of_registrations(),
            waiting_count: self.waiting.len(),
            pools: self
                .pools
                .iter()
                .map(|pool| PoolSummary::new(pool, self.pool_registrations(pool.id), now))
                .collect(),
        }
    }

    fn index_of(row: &Registration) -> Result<usize, AdmissionError> {
        usize::try_from(row.sequence)
            .map_err(|_| AdmissionError::Internal("registration sequence overflow".to_string()))
    }

    fn index(&mut self, index: usize, reg: &Registration) {
        if !reg.is_active() {
            return;
        }
        self.active_by_user.insert(reg.user_id, index);
        match reg.pool() {
            Some(pool_id) => {
                let count = self.seated.entry(pool_id).or_insert(0);
                *count = count.saturating_add(1);
            }
            None => {
                self.waiting.insert(reg.waiting_key());
            }
        }
    }

    fn unindex(&mut self, reg: &Registration) {
        if !reg.is_active() {
            return;
        }
        self.active_by_user.remove(&reg.user_id);
        match reg.pool() {
            Some(pool_id) => {
                if let Some(count) = self.seated.get_mut(&pool_id) {
                    *count = count.saturating_sub(1);
                }
            }
            None => {
                self.waiting.remove(&reg.waiting_key());
            }
        }
    }

    fn registration_at(&self, sequence: u64) -> Option<&Registration> {
        usize::try_from(sequence)
            .ok()
            .and_then(|index| self.registrations.get(index))
    }

    fn loads_for(
        &self,
        user: UserId,
        membership: &dyn MembershipProvider,
        now: DateTime<Utc>,
        counts: &HashMap<PoolId, u32>,
    ) -> Vec<PoolLoad> {
        self.pools
            .iter()
            .enumerate()
            .map(|(position, pool)| PoolLoad {
                pool_id: pool.id,
                position,
                capacity: pool.capacity,
                registered: counts.get(&pool.id).copied().unwrap_or(0),
                activated: pool.is_activated(now),
                depth: pool.membership_depth(user, membership),
            })
            .collect()
    }

    /// Whether `counts` leave room for a promotion released from `pool_id`:
    /// the pool itself before the merge, the shared bucket after it.
    fn has_spare(
        &self,
        pool_id: PoolId,
        now: DateTime<Utc>,
        counts: &HashMap<PoolId, u32>,
    ) -> bool {
        let seated = |pool: &Pool| counts.get(&pool.id).copied().unwrap_or(0);
        match self.phase(now) {
            Phase::Distinct => self
                .pool(pool_id)
                .is_some_and(|pool| seated(pool) < pool.capacity),
            Phase::Merged => {
                let spare: i64 = self
                    .pools
                    .iter()
                    .filter(|pool| pool.is_activated(now))
                    .map(|pool| i64::from(pool.capacity) - i64::from(seated(pool)))
                    .sum();
                spare > 0
            }
        }
    }

    fn next_promotion(
        &self,
        from_pool: Option<PoolId>,
        membership: &dyn MembershipProvider,
        now: DateTime<Utc>,
        counts: &HashMap<PoolId, u32>,
    ) -> Result<Option<Registration>, AdmissionError> {
        let phase = self.phase(now);
        let found = self.waiting.iter().find_map(|key| {
            let reg = self.registration_at(key.sequence)?;
            let loads = self.loads_for(reg.user_id, membership, now, counts);
            admission::promotion_target(phase, from_pool, &loads).map(|target| (reg, target))
        });
        let Some((reg, target)) = found else {
            return Ok(None);
        };

        let mut promoted = reg.clone();
        promoted.promote(target)?;
        Ok(Some(promoted))
    }
}

#[cfg(test)]
#[allow(clippy::panic, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::domain::{GroupDirectory, GroupId, RegistrationState};
    use chrono::Duration;

    /// Abakus with Webkom nested inside, and a ticking clock.
    struct Fixture {
        groups: GroupDirectory,
        abakus: GroupId,
        webkom: GroupId,
        base: DateTime<Utc>,
        clock: DateTime<Utc>,
    }

    impl Fixture {
        fn new() -> Self {
            let groups = GroupDirectory::new();
            let Ok(abakus) = groups.add_group("Abakus", None) else {
                panic!("group creation failed");
            };
            let Ok(webkom) = groups.add_group("Webkom", Some(abakus)) else {
                panic!("group creation failed");
            };
            let base = Utc::now();
            Self {
                groups,
                abakus,
                webkom,
                base,
                clock: base,
            }
        }

        fn now(&mut self) -> DateTime<Utc> {
            self.clock += Duration::seconds(1);
            self.clock
        }

        fn users(&self, group: GroupId, n: usize) -> Vec<UserId> {
            (0..n)
                .map(|_| {
                    let user = UserId::new();
                    if self.groups.add_user(group, user).is_err() {
                        panic!("unknown group");
                    }
                    user
                })
                .collect()
        }

        fn pool(&self, name: &str, capacity: u32, group: GroupId) -> Pool {
            Pool::new(name, capacity, self.base - Duration::hours(24), vec![group])
        }

        fn event(&self, title: &str, pools: Vec<Pool>) -> Event {
            let mut event = Event::new(title, Some(self.base + Duration::hours(12)));
            for pool in pools {
                if event.add_pool(pool).is_err() {
                    panic!("duplicate pool");
                }
            }
            event
        }

        fn single_pool(&self, capacity: u32) -> (Event, PoolId) {
            let pool = self.pool("Abakus", capacity, self.abakus);
            let id = pool.id;
            (self.event("SINGLE_POOL", vec![pool]), id)
        }

        fn two_pools(&self) -> (Event, PoolId, PoolId) {
            let abakus = self.pool("Abakus", 3, self.abakus);
            let webkom = self.pool("Webkom", 2, self.webkom);
            let ids = (abakus.id, webkom.id);
            (self.event("TWO_POOLS", vec![abakus, webkom]), ids.0, ids.1)
        }

        fn merge(&self, event: &mut Event) {
            event.merge_time = Some(self.base - Duration::hours(12));
        }

        fn register(&mut self, event: &mut Event, user: UserId) -> Registration {
            let now = self.now();
            let Ok(reg) = event.register(user, &self.groups, now) else {
                panic!("registration failed");
            };
            reg
        }

        fn unregister(&mut self, event: &mut Event, user: UserId) -> Unregistration {
            let now = self.now();
            let Ok(out) = event.unregister(user, &self.groups, now) else {
                panic!("unregistration failed");
            };
            out
        }
    }

    fn assert_waiting_sorted(event: &Event) {
        let keys: Vec<_> = event
            .waiting_pool_registrations()
            .map(Registration::waiting_key)
            .collect();
        assert!(keys.windows(2).all(|w| matches!(w, [a, b] if a <= b)));
    }

    #[test]
    fn capacity_sums_pools() {
        let fx = Fixture::new();
        let event = fx.event(
            "NO_POOLS_ABAKUS",
            vec![fx.pool("A", 10, fx.abakus), fx.pool("B", 20, fx.abakus)],
        );
        assert_eq!(event.capacity(), 30);
        assert_eq!(Event::new("NO_POOLS", None).capacity(), 0);
    }

    #[test]
    fn can_register_single_pool() {
        let mut fx = Fixture::new();
        let (mut event, pool) = fx.single_pool(3);
        for user in fx.users(fx.abakus, 1) {
            let reg = fx.register(&mut event, user);
            assert_eq!(reg.state(), RegistrationState::ActivePooled);
        }
        assert_eq!(event.pool_registrations(pool), 1);
        assert_eq!(event.number_of_registrations(), 1);
    }

    #[test]
    fn child_group_fills_own_pool_then_parent_pool() {
        let mut fx = Fixture::new();
        let (mut event, abakus_pool, webkom_pool) = fx.two_pools();
        for user in fx.users(fx.webkom, 4) {
            fx.register(&mut event, user);
        }
        assert_eq!(event.pool_registrations(abakus_pool), 2);
        assert_eq!(event.pool_registrations(webkom_pool), 2);
        assert_eq!(event.number_of_registrations(), 4);
    }

    #[test]
    fn cannot_register_before_activation() {
        let mut fx = Fixture::new();
        let pool = Pool::new("Abakus", 1, fx.base + Duration::hours(24), vec![fx.abakus]);
        let mut event = fx.event("NO_POOLS_ABAKUS", vec![pool]);
        let users = fx.users(fx.abakus, 1);
        let now = fx.now();
        for user in users {
            let result = event.register(user, &fx.groups, now);
            assert!(matches!(result, Err(AdmissionError::NoAvailablePools)));
        }
        assert_eq!(event.number_of_registrations(), 0);
        assert_eq!(event.waiting_count(), 0);
        assert!(event.registrations().is_empty());
    }

    #[test]
    fn registration_picks_correct_pool_pre_merge() {
        let mut fx = Fixture::new();
        let (mut event, abakus_pool, webkom_pool) = fx.two_pools();
        let mut users = fx.users(fx.abakus, 3);
        users.extend(fx.users(fx.webkom, 2));
        for user in users {
            fx.register(&mut event, user);
        }
        assert_eq!(event.pool_registrations(abakus_pool), 3);
        assert_eq!(event.pool_registrations(webkom_pool), 2);
        assert_eq!(event.number_of_registrations(), 5);
        assert_eq!(event.waiting_count(), 0);
    }

    #[test]
    fn can_register_post_merge() {
        let mut fx = Fixture::new();
        let (mut event, abakus_pool, webkom_pool) = fx.two_pools();
        fx.merge(&mut event);
        let mut users = fx.users(fx.abakus, 4);
        users.extend(fx.users(fx.webkom, 1));
        for user in users {
            fx.register(&mut event, user);
        }
        assert_eq!(event.pool_registrations(abakus_pool), 4);
        assert_eq!(event.pool_registrations(webkom_pool), 1);
        assert_eq!(event.number_of_registrations(), 5);
    }

    #[test]
    fn no_duplicate_registrations() {
        let mut fx = Fixture::new();
        let (mut event, _, _) = fx.two_pools();
        let users = fx.users(fx.webkom, 1);
        for user in users {
            fx.register(&mut event, user);
            let now = fx.now();
            let result = event.register(user, &fx.groups, now);
            assert!(matches!(result, Err(AdmissionError::NoAvailablePools)));
        }
        assert_eq!(event.number_of_registrations(), 1);
        assert_eq!(event.registrations().len(), 1);
    }

    #[test]
    fn can_only_register_with_correct_permission_group() {
        let mut fx = Fixture::new();
        let pool = fx.pool("Webkom", 1, fx.webkom);
        let pool_id = pool.id;
        let mut event = fx.event("NO_POOLS_ABAKUS", vec![pool]);
        fx.merge(&mut event);
        let now = fx.now();
        for user in fx.users(fx.abakus, 1) {
            let result = event.register(user, &fx.groups, now);
            assert!(matches!(result, Err(AdmissionError::NoAvailablePools)));
        }
        assert_eq!(event.pool_registrations(pool_id), 0);
    }

    #[test]
    fn waiting_list_if_full() {
        let mut fx = Fixture::new();
        let (mut event, pool) = fx.single_pool(1);
        let users = fx.users(fx.abakus, 2);
        let first = fx.register(&mut event, users[0]);
        let second = fx.register(&mut event, users[1]);
        assert_eq!(first.state(), RegistrationState::ActivePooled);
        assert_eq!(second.state(), RegistrationState::ActiveWaiting);
        assert_eq!(event.waiting_count(), 1);
        assert_eq!(event.pool_registrations(pool), 1);
        assert_eq!(event.number_of_registrations(), 1);
    }

    #[test]
    fn number_of_waiting_registrations() {
        let mut fx = Fixture::new();
        let (mut event, _, _) = fx.two_pools();
        for user in fx.users(fx.abakus, 6) {
            fx.register(&mut event, user);
        }
        assert_eq!(event.waiting_count(), 3);
    }

    #[test]
    fn placed_in_waiting_list_post_merge() {
        let mut fx = Fixture::new();
        let (mut event, _, _) = fx.two_pools();
        fx.merge(&mut event);
        for user in fx.users(fx.abakus, 6) {
            fx.register(&mut event, user);
        }
        assert_eq!(event.number_of_registrations(), 5);
        assert_eq!(event.waiting_count(), 1);
    }

    #[test]
    fn merged_single_pool_overflows_to_waiting_list() {
        let mut fx = Fixture::new();
        let (mut event, pool) = fx.single_pool(4);
        fx.merge(&mut event);
        for user in fx.users(fx.abakus, 5) {
            fx.register(&mut event, user);
        }
        assert_eq!(event.pool_registrations(pool), 4);
        assert_eq!(event.waiting_count(), 1);
    }

    #[test]
    fn popping_from_waiting_list_pre_merge() {
        let mut fx = Fixture::new();
        let (mut event, _) = fx.single_pool(0);
        for user in fx.users(fx.abakus, 10) {
            fx.register(&mut event, user);
        }
        assert_eq!(event.waiting_count(), 10);

        let now = fx.now();
        let Ok(Some(popped)) = event.pop_from_waiting_pool(&fx.groups, now) else {
            panic!("expected a promotion");
        };
        assert_eq!(popped.state(), RegistrationState::ActivePooled);
        assert_eq!(event.waiting_count(), 9);
        assert!(
            event
                .waiting_pool_registrations()
                .all(|reg| popped.registration_date <= reg.registration_date)
        );
        assert_waiting_sorted(&event);
    }

    #[test]
    fn popping_from_waiting_list_post_merge() {
        let mut fx = Fixture::new();
        let (mut event, _, _) = fx.two_pools();
        fx.merge(&mut event);
        for user in fx.users(fx.webkom, 10) {
            fx.register(&mut event, user);
        }
        let mut previous = None;
        while let Ok(Some(popped)) = event.pop_from_waiting_pool(&fx.groups, fx.clock) {
            assert!(
                event
                    .waiting_pool_registrations()
                    .all(|reg| popped.registration_date <= reg.registration_date)
            );
            if let Some(prev) = previous {
                assert!(prev <= popped.registration_date);
            }
            previous = Some(popped.registration_date);
        }
        assert_eq!(event.waiting_count(), 0);
    }

    #[test]
    fn unregistering_from_event() {
        let mut fx = Fixture::new();
        let (mut event, pool) = fx.single_pool(3);
        let users = fx.users(fx.abakus, 1);
        fx.register(&mut event, users[0]);
        let out = fx.unregister(&mut event, users[0]);
        assert_eq!(out.withdrawn.state(), RegistrationState::Withdrawn);
        assert_eq!(out.withdrawn.pool(), Some(pool));
        assert!(out.bumped.is_none());
        assert_eq!(event.pool_registrations(pool), 0);
        assert_eq!(event.number_of_registrations(), 0);
    }

    #[test]
    fn register_after_unregister_creates_fresh_row() {
        let mut fx = Fixture::new();
        let (mut event, _) = fx.single_pool(3);
        let users = fx.users(fx.abakus, 1);
        let first = fx.register(&mut event, users[0]);
        fx.unregister(&mut event, users[0]);
        let second = fx.register(&mut event, users[0]);
        assert_ne!(first.id, second.id);
        assert_eq!(event.number_of_registrations(), 1);
        fx.unregister(&mut event, users[0]);

        let withdrawn = event
            .registrations()
            .iter()
            .filter(|reg| reg.state() == RegistrationState::Withdrawn)
            .count();
        assert_eq!(withdrawn, 2);
        assert_eq!(event.registrations().len(), 2);
    }

    #[test]
    fn unregistering_non_existing_user() {
        let mut fx = Fixture::new();
        let (mut event, _) = fx.single_pool(3);
        let now = fx.now();
        let result = event.unregister(UserId::new(), &fx.groups, now);
        assert!(matches!(
            result,
            Err(AdmissionError::RegistrationNotFound { .. })
        ));
    }

    #[test]
    fn unregister_promotes_waiting_user() {
        let mut fx = Fixture::new();
        let (mut event, pool) = fx.single_pool(1);
        let users = fx.users(fx.abakus, 2);
        fx.register(&mut event, users[0]);
        let waiting = fx.register(&mut event, users[1]);
        assert_eq!(event.waiting_count(), 1);

        let out = fx.unregister(&mut event, users[0]);
        let Some(bumped) = out.bumped else {
            panic!("expected a bump");
        };
        assert_eq!(bumped.id, waiting.id);
        assert_eq!(bumped.registration_date, waiting.registration_date);
        assert!(bumped.is_pooled_in(pool));
        assert_eq!(event.pool_registrations(pool), 1);
        assert_eq!(event.waiting_count(), 0);
        assert_eq!(event.registrations().len(), 2);
    }

    #[test]
    fn explicit_bump_is_forced() {
        let mut fx = Fixture::new();
        let (mut event, pool) = fx.single_pool(1);
        let users = fx.users(fx.abakus, 3);
        for user in &users {
            fx.register(&mut event, *user);
        }
        let now = fx.now();
        let Ok(Some(bumped)) = event.bump(pool, &fx.groups, now) else {
            panic!("expected a bump");
        };
        assert_eq!(bumped.user_id, users[1]);
        assert_eq!(event.number_of_registrations(), 2);
        assert_eq!(event.pool_registrations(pool), 2);
        assert_eq!(event.waiting_count(), 1);
        let next = event.waiting_pool_registrations().next().map(|reg| reg.user_id);
        assert_eq!(next, Some(users[2]));
    }

    #[test]
    fn bump_unknown_pool_fails() {
        let mut fx = Fixture::new();
        let (mut event, _) = fx.single_pool(1);
        let now = fx.now();
        let result = event.bump(PoolId::new(), &fx.groups, now);
        assert!(matches!(result, Err(AdmissionError::PoolNotFound(_))));
    }

    #[test]
    fn bumping_pre_merge() {
        let mut fx = Fixture::new();
        let (mut event, abakus_pool, _) = fx.two_pools();
        let users = fx.users(fx.abakus, 13);
        for user in &users {
            fx.register(&mut event, *user);
        }
        let waiting_before = event.waiting_count();
        let event_before = event.number_of_registrations();
        let pool_before = event.pool_registrations(abakus_pool);

        fx.unregister(&mut event, users[0]);

        assert_eq!(event.pool_registrations(abakus_pool), pool_before);
        assert_eq!(event.number_of_registrations(), event_before);
        assert_eq!(event.waiting_count(), waiting_before - 1);
        assert!(event.number_of_registrations() as u64 <= event.capacity());
    }

    #[test]
    fn bumping_post_merge_may_overfill_pool() {
        let mut fx = Fixture::new();
        let (mut event, abakus_pool, webkom_pool) = fx.two_pools();
        fx.merge(&mut event);
        let abakus_users = fx.users(fx.abakus, 5);
        let webkom_users = fx.users(fx.webkom, 1);
        fx.register(&mut event, webkom_users[0]);
        for user in &abakus_users {
            fx.register(&mut event, *user);
        }

        let waiting_before = event.waiting_count();
        let event_before = event.number_of_registrations();
        let abakus_before = event.pool_registrations(abakus_pool);
        let webkom_before = event.pool_registrations(webkom_pool);

        fx.unregister(&mut event, webkom_users[0]);

        assert_eq!(event.number_of_registrations(), event_before);
        assert_eq!(event.waiting_count(), waiting_before - 1);
        assert_eq!(event.pool_registrations(abakus_pool), abakus_before + 1);
        assert!(event.pool_registrations(abakus_pool) > 3);
        assert_eq!(event.pool_registrations(webkom_pool), webkom_before - 1);
        assert!(event.number_of_registrations() as u64 <= event.capacity());
    }

    #[test]
    fn bumping_when_bumped_has_multiple_pools_available() {
        let mut fx = Fixture::new();
        let (mut event, _, webkom_pool) = fx.two_pools();
        let users = fx.users(fx.webkom, 6);
        for user in &users {
            fx.register(&mut event, *user);
        }
        assert_eq!(event.pool_registrations(webkom_pool), 2);
        assert_eq!(event.waiting_count(), 1);
        assert_eq!(event.number_of_registrations(), 5);

        fx.unregister(&mut event, users[0]);
        assert_eq!(event.pool_registrations(webkom_pool), 2);
        assert_eq!(event.waiting_count(), 0);
        assert_eq!(event.number_of_registrations(), 5);

        fx.unregister(&mut event, users[1]);
        assert_eq!(event.number_of_registrations(), 4);
    }

    #[test]
    fn pre_merge_bump_skips_ineligible_waiting_entries() {
        let mut fx = Fixture::new();
        let (mut event, abakus_pool, webkom_pool) = fx.two_pools();
        let seated_abakus = fx.users(fx.abakus, 3);
        let seated_webkom = fx.users(fx.webkom, 2);
        for user in seated_abakus.iter().chain(&seated_webkom) {
            fx.register(&mut event, *user);
        }
        let queued_abakus = fx.users(fx.abakus, 1);
        let queued_webkom = fx.users(fx.webkom, 1);
        fx.register(&mut event, queued_abakus[0]);
        fx.register(&mut event, queued_webkom[0]);
        assert_eq!(event.waiting_count(), 2);

        let out = fx.unregister(&mut event, seated_webkom[0]);
        let Some(bumped) = out.bumped else {
            panic!("expected a bump");
        };
        assert_eq!(bumped.user_id, queued_webkom[0]);
        assert!(bumped.is_pooled_in(webkom_pool));
        assert_eq!(event.pool_registrations(abakus_pool), 3);
        let left: Vec<_> = event.waiting_pool_registrations().map(|r| r.user_id).collect();
        assert_eq!(left, vec![queued_abakus[0]]);
    }

    #[test]
    fn unregistration_date_is_set_at_unregistration() {
        let mut fx = Fixture::new();
        let (mut event, _, _) = fx.two_pools();
        let users = fx.users(fx.webkom, 1);
        let reg = fx.register(&mut event, users[0]);
        assert!(reg.unregistration_date().is_none());
        let out = fx.unregister(&mut event, users[0]);
        assert_eq!(out.withdrawn.unregistration_date(), Some(fx.clock));
        let stored = event.registrations().first().and_then(Registration::unregistration_date);
        assert!(stored.is_some());
    }

    #[test]
    fn unregistering_from_waiting_list() {
        let mut fx = Fixture::new();
        let (mut event, abakus_pool, _) = fx.two_pools();
        let users = fx.users(fx.abakus, 13);
        for user in &users {
            fx.register(&mut event, *user);
        }
        let event_before = event.number_of_registrations();
        let pool_before = event.pool_registrations(abakus_pool);
        let waiting_before = event.waiting_count();

        let out = fx.unregister(&mut event, users[12]);
        assert!(out.bumped.is_none());
        assert_eq!(out.withdrawn.pool(), None);
        assert_eq!(event.number_of_registrations(), event_before);
        assert_eq!(event.pool_registrations(abakus_pool), pool_before);
        assert_eq!(event.waiting_count(), waiting_before - 1);
        assert_waiting_sorted(&event);
    }

    #[test]
    fn capacity_invariants_hold_under_churn() {
        for merged in [false, true] {
            let mut fx = Fixture::new();
            let (mut event, abakus_pool, webkom_pool) = fx.two_pools();
            if merged {
                fx.merge(&mut event);
            }
            let mut users = fx.users(fx.abakus, 6);
            users.extend(fx.users(fx.webkom, 6));

            let mut seed = 0x2545_f491_u64;
            let mut history = 0;
            for _ in 0..200 {
                seed = seed.wrapping_mul(6_364_136_223_846_793_005).wrapping_add(1);
                let pick = usize::try_from(seed >> 33).unwrap_or(0) % users.len();
                let Some(user) = users.get(pick).copied() else {
                    continue;
                };
                let now = fx.now();
                if event.active_registration(user).is_some() {
                    let _ = event.unregister(user, &fx.groups, now);
                } else {
                    let _ = event.register(user, &fx.groups, now);
                }

                assert!(event.registrations().len() >= history);
                history = event.registrations().len();
                assert!(event.number_of_registrations() as u64 <= event.capacity());
                if !merged {
                    assert!(event.pool_registrations(abakus_pool) <= 3);
                    assert!(event.pool_registrations(webkom_pool) <= 2);
                }
                let active = event.registrations().iter().filter(|r| r.is_active()).count();
                assert_eq!(active, event.number_of_registrations() + event.waiting_count());
                assert_waiting_sorted(&event);
            }
        }
    }

    #[test]
    fn from_parts_restores_indexes() {
        let mut fx = Fixture::new();
        let (mut event, _) = fx.single_pool(1);
        let users = fx.users(fx.abakus, 3);
        for user in &users {
            fx.register(&mut event, *user);
        }
        fx.unregister(&mut event, users[0]);

        let mut rows = event.registrations().to_vec();
        rows.reverse();
        let Ok(restored) = Event::from_parts(
            event.id,
            event.title.clone(),
            event.merge_time,
            event.created_at,
            event.pools().to_vec(),
            rows,
        ) else {
            panic!("restore failed");
        };
        assert_eq!(restored.number_of_registrations(), 1);
        assert_eq!(restored.waiting_count(), 1);
        assert_eq!(
            restored.active_registration(users[2]).map(|r| r.id),
            event.active_registration(users[2]).map(|r| r.id)
        );
    }

    #[test]
    fn from_parts_rejects_duplicate_active_rows() {
        let fx = Fixture::new();
        let (event, pool) = fx.single_pool(2);
        let user = UserId::new();
        let rows = vec![
            Registration::new(event.id, user, 0, fx.base, Some(pool)),
            Registration::new(event.id, user, 1, fx.base, None),
        ];
        let result = Event::from_parts(
            event.id,
            event.title.clone(),
            None,
            event.created_at,
            event.pools().to_vec(),
            rows,
        );
        assert!(matches!(result, Err(AdmissionError::InvalidRequest(_))));
    }

    #[test]
    fn summary_reports_counts() {
        let mut fx = Fixture::new();
        let (mut event, _, _) = fx.two_pools();
        for user in fx.users(fx.abakus, 4) {
            fx.register(&mut event, user);
        }
        let summary = event.summary(fx.clock);
        assert_eq!(summary.capacity, 5);
        assert_eq!(summary.number_of_registrations, 3);
        assert_eq!(summary.waiting_count, 1);
        assert!(!summary.is_merged);
        assert_eq!(summary.pools.len(), 2);
    }

    #[test]
    fn planning_leaves_event_untouched() {
        let mut fx = Fixture::new();
        let (mut event, pool) = fx.single_pool(1);
        let users = fx.users(fx.abakus, 2);
        for user in &users {
            fx.register(&mut event, *user);
        }
        let now = fx.now();

        let Ok(planned) = event.plan_unregister(users[0], &fx.groups, now) else {
            panic!("plan failed");
        };
        assert_eq!(planned.bumped.as_ref().map(|r| r.user_id), Some(users[1]));
        assert_eq!(event.pool_registrations(pool), 1);
        assert_eq!(event.waiting_count(), 1);
        assert!(event.active_registration(users[0]).is_some());

        let Ok(()) = event.apply(&planned.rows()) else {
            panic!("apply failed");
        };
        assert_eq!(event.pool_registrations(pool), 1);
        assert_eq!(event.waiting_count(), 0);
        assert!(event.active_registration(users[0]).is_none());
        assert_eq!(
            event.active_registration(users[1]).map(Registration::pool),
            Some(Some(pool))
        );
    }

    #[test]
    fn apply_rejects_sequence_gap_without_partial_writes() {
        let mut fx = Fixture::new();
        let (mut event, pool) = fx.single_pool(5);
        let now = fx.now();
        let rows = vec![
            Registration::new(event.id, UserId::new(), 0, now, Some(pool)),
            Registration::new(event.id, UserId::new(), 2, now, Some(pool)),
        ];
        assert!(matches!(
            event.apply(&rows),
            Err(AdmissionError::InvalidRequest(_))
        ));
        assert!(event.registrations().is_empty());
        assert_eq!(event.pool_registrations(pool), 0);
    }

    #[test]
    fn seat_counts_follow_every_transition() {
        let mut fx = Fixture::new();
        let (mut event, pool) = fx.single_pool(2);
        let users = fx.users(fx.abakus, 4);
        for user in &users {
            fx.register(&mut event, *user);
        }
        assert_eq!(event.pool_registrations(pool), 2);

        let now = fx.now();
        let Ok(Some(_)) = event.pop_from_waiting_pool(&fx.groups, now) else {
            panic!("pop failed");
        };
        assert_eq!(event.pool_registrations(pool), 3);

        fx.unregister(&mut event, users[0]);
        fx.unregister(&mut event, users[3]);
        assert_eq!(event.pool_registrations(pool), 2);
        assert_eq!(event.number_of_registrations(), 2);
        assert_eq!(event.waiting_count(), 0);

        let seated = event
            .registrations()
            .iter()
            .filter(|r| r.is_pooled_in(pool))
            .count();
        assert_eq!(seated, 2);
    }
}
