//! Registration service: serializes writers per event, persists the rows
//! each operation touched and emits domain events.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::OwnedMutexGuard;

use crate::domain::{
    Event, EventBus, EventId, EventRegistry, EventSummary, MembershipProvider, Pool, PoolId,
    Registration, RegistrationEvent, Unregistration, UserId,
};
use crate::error::AdmissionError;
use crate::persistence::EntityStore;
use crate::persistence::models::{StoredEvent, StoredPool, StoredRegistration};

/// Orchestration layer for all registration operations.
///
/// Every mutation follows the same pattern: lock the event, plan the change
/// against the locked state, persist the planned rows, apply them, release
/// the lock, then emit events. A persistence failure leaves the in-memory
/// event untouched.
#[derive(Debug, Clone)]
pub struct RegistrationService {
    registry: Arc<EventRegistry>,
    membership: Arc<dyn MembershipProvider>,
    store: Option<Arc<dyn EntityStore>>,
    event_bus: EventBus,
    event_log_enabled: bool,
}

impl RegistrationService {
    /// Creates a service without persistence.
    #[must_use]
    pub fn new(
        registry: Arc<EventRegistry>,
        membership: Arc<dyn MembershipProvider>,
        event_bus: EventBus,
    ) -> Self {
        Self {
            registry,
            membership,
            store: None,
            event_bus,
            event_log_enabled: false,
        }
    }

    /// Attaches a store. When `event_log_enabled` is set, every emitted
    /// domain event is also appended to the store's log.
    #[must_use]
    pub fn with_store(mut self, store: Arc<dyn EntityStore>, event_log_enabled: bool) -> Self {
        self.store = Some(store);
        self.event_log_enabled = event_log_enabled;
        self
    }

    /// Returns a reference to the inner [`EventBus`].
    #[must_use]
    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    /// Returns a reference to the inner [`EventRegistry`].
    #[must_use]
    pub fn registry(&self) -> &Arc<EventRegistry> {
        &self.registry
    }

    /// Creates an event without pools.
    ///
    /// # Errors
    ///
    /// Returns [`AdmissionError::PersistenceError`] if the event row cannot
    /// be written.
    pub async fn create_event(
        &self,
        title: &str,
        merge_time: Option<DateTime<Utc>>,
    ) -> Result<EventId, AdmissionError> {
        let event = Event::new(title, merge_time);
        if let Some(store) = &self.store {
            store.save_event(StoredEvent::from(&event)).await?;
        }
        let event_id = self.registry.insert(event).await?;

        self.emit(RegistrationEvent::EventCreated {
            event_id,
            title: title.to_string(),
            timestamp: Utc::now(),
        })
        .await;
        tracing::info!(%event_id, title, "event created");
        Ok(event_id)
    }

    /// Attaches a pool to an event.
    ///
    /// # Errors
    ///
    /// Returns [`AdmissionError::EventNotFound`] for an unknown event,
    /// [`AdmissionError::InvalidRequest`] for a duplicate pool id, or
    /// [`AdmissionError::PersistenceError`] if the pool row cannot be
    /// written.
    pub async fn add_pool(&self, event_id: EventId, pool: Pool) -> Result<PoolId, AdmissionError> {
        let mut event = self.lock_event(event_id).await?;

        if event.pool(pool.id).is_some() {
            return Err(AdmissionError::InvalidRequest(format!(
                "pool {} already exists",
                pool.id
            )));
        }
        if let Some(store) = &self.store {
            let position = u32::try_from(event.pools().len())
                .map_err(|_| AdmissionError::Internal("pool position overflow".to_string()))?;
            store
                .save_pool(StoredPool::from_pool(event_id, position, &pool))
                .await?;
        }
        let name = pool.name.clone();
        let capacity = pool.capacity;
        let pool_id = event.add_pool(pool)?;
        drop(event);

        self.emit(RegistrationEvent::PoolAdded {
            event_id,
            pool_id,
            name: name.clone(),
            capacity,
            timestamp: Utc::now(),
        })
        .await;
        tracing::info!(%event_id, %pool_id, %name, capacity, "pool added");
        Ok(pool_id)
    }

    /// Sets or clears the merge time of an event.
    ///
    /// # Errors
    ///
    /// Returns [`AdmissionError::EventNotFound`] for an unknown event or
    /// [`AdmissionError::PersistenceError`] if the event row cannot be
    /// written.
    pub async fn set_merge_time(
        &self,
        event_id: EventId,
        merge_time: Option<DateTime<Utc>>,
    ) -> Result<(), AdmissionError> {
        let mut event = self.lock_event(event_id).await?;

        if let Some(store) = &self.store {
            let row = StoredEvent {
                merge_time,
                ..StoredEvent::from(&*event)
            };
            store.save_event(row).await?;
        }
        event.merge_time = merge_time;
        drop(event);

        self.emit(RegistrationEvent::MergeTimeChanged {
            event_id,
            merge_time,
            timestamp: Utc::now(),
        })
        .await;
        tracing::info!(%event_id, ?merge_time, "merge time changed");
        Ok(())
    }

    /// Removes an event with all its pools and registrations.
    ///
    /// The registry entry is dropped while the event lock is held, so an
    /// operation already waiting on that lock fails with
    /// [`AdmissionError::EventNotFound`] instead of touching the removed
    /// event.
    ///
    /// # Errors
    ///
    /// Returns [`AdmissionError::EventNotFound`] for an unknown event or
    /// [`AdmissionError::PersistenceError`] if the store delete fails.
    pub async fn remove_event(&self, event_id: EventId) -> Result<(), AdmissionError> {
        let event = self.lock_event(event_id).await?;
        if let Some(store) = &self.store {
            let deleted = store.delete_event(*event_id.as_uuid()).await?;
            tracing::debug!(%event_id, deleted, "event rows deleted");
        }
        self.registry.remove(event_id).await?;
        let registrations = event.registrations().len();
        drop(event);

        self.emit(RegistrationEvent::EventRemoved {
            event_id,
            timestamp: Utc::now(),
        })
        .await;
        tracing::info!(%event_id, registrations, "event removed");
        Ok(())
    }

    /// Registers `user` for an event, seating them in a pool or queueing
    /// them on the waiting list.
    ///
    /// # Errors
    ///
    /// Returns [`AdmissionError::NoAvailablePools`] if the user is already
    /// registered or no activated pool admits them,
    /// [`AdmissionError::EventNotFound`] for an unknown event, or
    /// [`AdmissionError::PersistenceError`] if the row cannot be written.
    pub async fn register(
        &self,
        event_id: EventId,
        user: UserId,
    ) -> Result<Registration, AdmissionError> {
        let mut event = self.lock_event(event_id).await?;

        let now = Utc::now();
        let registration = match event.plan_register(user, self.membership.as_ref(), now) {
            Ok(registration) => registration,
            Err(e) => {
                tracing::warn!(%event_id, %user, error = %e, "registration rejected");
                return Err(e);
            }
        };
        self.persist(std::slice::from_ref(&registration)).await?;
        event.apply(std::slice::from_ref(&registration))?;
        drop(event);

        self.emit(RegistrationEvent::Registered {
            event_id,
            registration_id: registration.id,
            user_id: user,
            pool_id: registration.pool(),
            timestamp: now,
        })
        .await;
        match registration.pool() {
            Some(pool_id) => tracing::info!(%event_id, %user, %pool_id, "registered"),
            None => tracing::info!(%event_id, %user, "registered on waiting list"),
        }
        Ok(registration)
    }

    /// Withdraws the user's active registration and bumps a waiting
    /// registration into the freed seat when there is one.
    ///
    /// # Errors
    ///
    /// Returns [`AdmissionError::RegistrationNotFound`] if the user holds no
    /// active registration, [`AdmissionError::EventNotFound`] for an unknown
    /// event, or [`AdmissionError::PersistenceError`] if the rows cannot be
    /// written.
    pub async fn unregister(
        &self,
        event_id: EventId,
        user: UserId,
    ) -> Result<Unregistration, AdmissionError> {
        let mut event = self.lock_event(event_id).await?;

        let now = Utc::now();
        let outcome = event.plan_unregister(user, self.membership.as_ref(), now)?;
        let rows = outcome.rows();
        self.persist(&rows).await?;
        event.apply(&rows)?;
        drop(event);

        self.emit(RegistrationEvent::Unregistered {
            event_id,
            registration_id: outcome.withdrawn.id,
            user_id: user,
            pool_id: outcome.withdrawn.pool(),
            timestamp: now,
        })
        .await;
        tracing::info!(%event_id, %user, "unregistered");
        if let Some(bumped) = &outcome.bumped {
            self.emit_bumped(bumped, now).await;
        } else {
            tracing::debug!(%event_id, "no waiting registration eligible for freed seat");
        }
        Ok(outcome)
    }

    /// Promotes the earliest waiting registration eligible for `from_pool`.
    ///
    /// Capacity is not re-checked.
    ///
    /// # Errors
    ///
    /// Returns [`AdmissionError::EventNotFound`] or
    /// [`AdmissionError::PoolNotFound`] for unknown ids, or
    /// [`AdmissionError::PersistenceError`] if the row cannot be written.
    pub async fn bump(
        &self,
        event_id: EventId,
        from_pool: PoolId,
    ) -> Result<Option<Registration>, AdmissionError> {
        let event = self.lock_event(event_id).await?;

        let now = Utc::now();
        let planned = event.plan_bump(from_pool, self.membership.as_ref(), now)?;
        self.commit_promotion(event, planned, now).await
    }

    /// Promotes the earliest eligible waiting registration into its
    /// preferred pool.
    ///
    /// # Errors
    ///
    /// Returns [`AdmissionError::EventNotFound`] for an unknown event or
    /// [`AdmissionError::PersistenceError`] if the row cannot be written.
    pub async fn pop_from_waiting_pool(
        &self,
        event_id: EventId,
    ) -> Result<Option<Registration>, AdmissionError> {
        let event = self.lock_event(event_id).await?;

        let now = Utc::now();
        let planned = event.plan_pop(self.membership.as_ref(), now)?;
        self.commit_promotion(event, planned, now).await
    }

    /// Aggregate counts of an event.
    ///
    /// # Errors
    ///
    /// Returns [`AdmissionError::EventNotFound`] for an unknown event.
    pub async fn event_summary(&self, event_id: EventId) -> Result<EventSummary, AdmissionError> {
        let event = self.lock_event(event_id).await?;
        Ok(event.summary(Utc::now()))
    }

    /// Waiting registrations, earliest first.
    ///
    /// # Errors
    ///
    /// Returns [`AdmissionError::EventNotFound`] for an unknown event.
    pub async fn waiting_list(&self, event_id: EventId) -> Result<Vec<Registration>, AdmissionError> {
        let event = self.lock_event(event_id).await?;
        Ok(event.waiting_pool_registrations().cloned().collect())
    }

    /// Full registration history, withdrawn rows included.
    ///
    /// # Errors
    ///
    /// Returns [`AdmissionError::EventNotFound`] for an unknown event.
    pub async fn registrations(
        &self,
        event_id: EventId,
    ) -> Result<Vec<Registration>, AdmissionError> {
        let event = self.lock_event(event_id).await?;
        Ok(event.registrations().to_vec())
    }

    /// Summaries of every event, ordered by title.
    pub async fn list_events(&self) -> Vec<EventSummary> {
        self.registry.list(Utc::now()).await
    }

    /// Rebuilds the registry from the attached store and returns the number
    /// of events loaded. Without a store this is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`AdmissionError::PersistenceError`] if the store cannot be
    /// read or holds rows that do not convert, and
    /// [`AdmissionError::InvalidRequest`] if an event's rows are
    /// inconsistent.
    pub async fn restore(&self) -> Result<usize, AdmissionError> {
        let Some(store) = &self.store else {
            return Ok(0);
        };

        let mut restored = 0usize;
        for row in store.load_events().await? {
            let pools = store
                .load_pools(row.id)
                .await?
                .into_iter()
                .map(Pool::from)
                .collect();
            let registrations = store
                .load_registrations(row.id)
                .await?
                .into_iter()
                .map(Registration::try_from)
                .collect::<Result<Vec<_>, _>>()?;

            let event = Event::from_parts(
                EventId::from_uuid(row.id),
                row.title,
                row.merge_time,
                row.created_at,
                pools,
                registrations,
            )?;
            tracing::debug!(
                event_id = %event.id,
                registrations = event.registrations().len(),
                waiting = event.waiting_count(),
                "event restored"
            );
            self.registry.insert(event).await?;
            restored = restored.saturating_add(1);
        }

        tracing::info!(restored, "registry restored from store");
        Ok(restored)
    }

    /// Locks the event and checks it was not removed while waiting.
    async fn lock_event(
        &self,
        event_id: EventId,
    ) -> Result<OwnedMutexGuard<Event>, AdmissionError> {
        let entry = self.registry.get(event_id).await?;
        let event = Arc::clone(&entry).lock_owned().await;
        if !self.registry.is_current(event_id, &entry).await {
            return Err(AdmissionError::EventNotFound(*event_id.as_uuid()));
        }
        Ok(event)
    }

    async fn commit_promotion(
        &self,
        mut event: OwnedMutexGuard<Event>,
        planned: Option<Registration>,
        now: DateTime<Utc>,
    ) -> Result<Option<Registration>, AdmissionError> {
        let Some(promoted) = planned else {
            tracing::debug!(event_id = %event.id, "no eligible waiting registration");
            return Ok(None);
        };
        self.persist(std::slice::from_ref(&promoted)).await?;
        event.apply(std::slice::from_ref(&promoted))?;
        drop(event);

        self.emit_bumped(&promoted, now).await;
        Ok(Some(promoted))
    }

    async fn emit_bumped(&self, bumped: &Registration, now: DateTime<Utc>) {
        let Some(pool_id) = bumped.pool() else {
            return;
        };
        self.emit(RegistrationEvent::Bumped {
            event_id: bumped.event_id,
            registration_id: bumped.id,
            user_id: bumped.user_id,
            pool_id,
            timestamp: now,
        })
        .await;
        tracing::info!(
            event_id = %bumped.event_id,
            user = %bumped.user_id,
            %pool_id,
            "bumped from waiting list"
        );
    }

    async fn persist(&self, rows: &[Registration]) -> Result<(), AdmissionError> {
        let Some(store) = &self.store else {
            return Ok(());
        };
        let rows = rows.iter().map(StoredRegistration::from).collect();
        store.save_registrations(rows).await.inspect_err(|e| {
            tracing::warn!(error = %e, "registration rows not persisted, change discarded");
        })
    }

    async fn emit(&self, event: RegistrationEvent) {
        if self.event_log_enabled
            && let Some(store) = &self.store
        {
            let event_type = event.event_type_str();
            match serde_json::to_value(&event) {
                Ok(payload) => {
                    if let Err(e) = store
                        .append_log(*event.event_id().as_uuid(), event_type, payload)
                        .await
                    {
                        tracing::warn!(event_type, error = %e, "event log append failed");
                    }
                }
                Err(e) => tracing::warn!(event_type, error = %e, "event not serializable"),
            }
        }
        let _ = self.event_bus.publish(event);
    }
}
