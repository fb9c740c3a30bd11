//! Storage row models and their mapping to domain types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{
    Event, EventId, GroupId, Pool, PoolId, Registration, RegistrationId, RegistrationStatus,
    UserId,
};
use crate::error::AdmissionError;

/// A row of the `events` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredEvent {
    /// Event id.
    pub id: Uuid,
    /// Title.
    pub title: String,
    /// Merge time, if any.
    pub merge_time: Option<DateTime<Utc>>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

impl From<&Event> for StoredEvent {
    fn from(event: &Event) -> Self {
        Self {
            id: *event.id.as_uuid(),
            title: event.title.clone(),
            merge_time: event.merge_time,
            created_at: event.created_at,
        }
    }
}

/// A row of the `pools` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredPool {
    /// Pool id.
    pub id: Uuid,
    /// Owning event.
    pub event_id: Uuid,
    /// Position within the event (creation order).
    pub position: u32,
    /// Name.
    pub name: String,
    /// Capacity.
    pub capacity: u32,
    /// Activation instant.
    pub activation_date: DateTime<Utc>,
    /// Permission group ids.
    pub permission_groups: Vec<Uuid>,
}

impl StoredPool {
    /// Builds the row for `pool` at `position` in `event_id`.
    #[must_use]
    pub fn from_pool(event_id: EventId, position: u32, pool: &Pool) -> Self {
        Self {
            id: *pool.id.as_uuid(),
            event_id: *event_id.as_uuid(),
            position,
            name: pool.name.clone(),
            capacity: pool.capacity,
            activation_date: pool.activation_date,
            permission_groups: pool
                .permission_groups
                .iter()
                .map(|group| *group.as_uuid())
                .collect(),
        }
    }
}

impl From<StoredPool> for Pool {
    fn from(row: StoredPool) -> Self {
        Self {
            id: PoolId::from_uuid(row.id),
            name: row.name,
            capacity: row.capacity,
            activation_date: row.activation_date,
            permission_groups: row
                .permission_groups
                .into_iter()
                .map(GroupId::from_uuid)
                .collect(),
        }
    }
}

/// A row of the `registrations` table.
///
/// Status is flattened into two nullable columns: `pool_id` and
/// `unregistration_date`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredRegistration {
    /// Registration id.
    pub id: Uuid,
    /// Owning event.
    pub event_id: Uuid,
    /// Registered user.
    pub user_id: Uuid,
    /// Seat pool; null while waiting.
    pub pool_id: Option<Uuid>,
    /// Creation sequence within the event.
    pub sequence: i64,
    /// Registration instant.
    pub registration_date: DateTime<Utc>,
    /// Withdrawal instant; null while active.
    pub unregistration_date: Option<DateTime<Utc>>,
}

impl From<&Registration> for StoredRegistration {
    fn from(reg: &Registration) -> Self {
        Self {
            id: *reg.id.as_uuid(),
            event_id: *reg.event_id.as_uuid(),
            user_id: *reg.user_id.as_uuid(),
            pool_id: reg.pool().map(|pool| *pool.as_uuid()),
            sequence: i64::try_from(reg.sequence).unwrap_or(i64::MAX),
            registration_date: reg.registration_date,
            unregistration_date: reg.unregistration_date(),
        }
    }
}

impl TryFrom<StoredRegistration> for Registration {
    type Error = AdmissionError;

    fn try_from(row: StoredRegistration) -> Result<Self, Self::Error> {
        let sequence = u64::try_from(row.sequence).map_err(|_| {
            AdmissionError::PersistenceError(format!(
                "registration {} has negative sequence {}",
                row.id, row.sequence
            ))
        })?;
        let pool_id = row.pool_id.map(PoolId::from_uuid);
        let status = match (row.unregistration_date, pool_id) {
            (Some(unregistration_date), pool_id) => RegistrationStatus::Withdrawn {
                pool_id,
                unregistration_date,
            },
            (None, Some(pool_id)) => RegistrationStatus::Pooled { pool_id },
            (None, None) => RegistrationStatus::Waiting,
        };
        Ok(Self::from_parts(
            RegistrationId::from_uuid(row.id),
            EventId::from_uuid(row.event_id),
            UserId::from_uuid(row.user_id),
            sequence,
            row.registration_date,
            status,
        ))
    }
}

/// A row of the `registration_log` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredLogEntry {
    /// Auto-increment row ID.
    pub id: i64,
    /// Event that generated the entry.
    pub event_id: Uuid,
    /// Event type discriminator (e.g. `"bumped"`).
    pub event_type: String,
    /// JSON payload with event-specific data.
    pub payload: serde_json::Value,
    /// Server-side creation timestamp.
    pub created_at: DateTime<Utc>,
}
