//! Domain events reflecting registration state changes.
//!
//! Every mutation emits a [`RegistrationEvent`] through the
//! [`super::EventBus`]. Events are broadcast to subscribers and optionally
//! appended to the store's event log.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::{EventId, PoolId, RegistrationId, UserId};

/// Domain event emitted after every state mutation.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum RegistrationEvent {
    /// Emitted when an event is created.
    EventCreated {
        /// Event identifier.
        event_id: EventId,
        /// Event title.
        title: String,
        /// Creation timestamp.
        timestamp: DateTime<Utc>,
    },

    /// Emitted when a pool is attached to an event.
    PoolAdded {
        /// Event identifier.
        event_id: EventId,
        /// New pool.
        pool_id: PoolId,
        /// Pool name.
        name: String,
        /// Pool capacity.
        capacity: u32,
        /// Timestamp.
        timestamp: DateTime<Utc>,
    },

    /// Emitted when the merge time is set or cleared.
    MergeTimeChanged {
        /// Event identifier.
        event_id: EventId,
        /// New merge time.
        merge_time: Option<DateTime<Utc>>,
        /// Timestamp.
        timestamp: DateTime<Utc>,
    },

    /// Emitted when an event is removed.
    EventRemoved {
        /// Event identifier.
        event_id: EventId,
        /// Removal timestamp.
        timestamp: DateTime<Utc>,
    },

    /// Emitted after a successful registration.
    Registered {
        /// Event identifier.
        event_id: EventId,
        /// New registration.
        registration_id: RegistrationId,
        /// Registered user.
        user_id: UserId,
        /// Seat pool, `None` when placed on the waiting list.
        pool_id: Option<PoolId>,
        /// Registration timestamp.
        timestamp: DateTime<Utc>,
    },

    /// Emitted after a withdrawal.
    Unregistered {
        /// Event identifier.
        event_id: EventId,
        /// Withdrawn registration.
        registration_id: RegistrationId,
        /// Withdrawing user.
        user_id: UserId,
        /// Pool the registration held, `None` if it was waiting.
        pool_id: Option<PoolId>,
        /// Withdrawal timestamp.
        timestamp: DateTime<Utc>,
    },

    /// Emitted when a waiting registration is promoted into a pool.
    Bumped {
        /// Event identifier.
        event_id: EventId,
        /// Promoted registration.
        registration_id: RegistrationId,
        /// Promoted user.
        user_id: UserId,
        /// Pool the registration now holds.
        pool_id: PoolId,
        /// Promotion timestamp.
        timestamp: DateTime<Utc>,
    },
}

impl RegistrationEvent {
    /// Returns the event ID associated with this domain event.
    #[must_use]
    pub fn event_id(&self) -> EventId {
        match self {
            Self::EventCreated { event_id, .. }
            | Self::PoolAdded { event_id, .. }
            | Self::MergeTimeChanged { event_id, .. }
            | Self::EventRemoved { event_id, .. }
            | Self::Registered { event_id, .. }
            | Self::Unregistered { event_id, .. }
            | Self::Bumped { event_id, .. } => *event_id,
        }
    }

    /// Returns the event type as a static string slice.
    #[must_use]
    pub const fn event_type_str(&self) -> &'static str {
        match self {
            Self::EventCreated { .. } => "event_created",
            Self::PoolAdded { .. } => "pool_added",
            Self::MergeTimeChanged { .. } => "merge_time_changed",
            Self::EventRemoved { .. } => "event_removed",
            Self::Registered { .. } => "registered",
            Self::Unregistered { .. } => "unregistered",
            Self::Bumped { .. } => "bumped",
        }
    }
}
