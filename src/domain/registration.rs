//! Registrations and their state machine.
//!
//! ```text
//!            register                 bump / pop
//!   ──────┬──────────────▶ ActivePooled ◀──────────── ActiveWaiting ◀── register
//!         │                     │                          │
//!         │                     └──── unregister ──┐       │
//!         │                                        ▼       │
//!         └────────────────────────────────────▶ Withdrawn ◀┘ unregister
//! ```
//!
//! Rows are never deleted: withdrawal is terminal and keeps the pool the
//! registration last held.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{EventId, PoolId, RegistrationId, UserId};
use crate::error::AdmissionError;

/// Coarse lifecycle state of a registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegistrationState {
    /// Holds a seat in a pool.
    ActivePooled,
    /// Queued on the event's waiting list.
    ActiveWaiting,
    /// Withdrawn by the user. Terminal.
    Withdrawn,
}

/// Full status of a registration, carrying the data each state owns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RegistrationStatus {
    /// Seated in `pool_id`.
    Pooled {
        /// Pool holding the seat.
        pool_id: PoolId,
    },
    /// On the waiting list.
    Waiting,
    /// Withdrawn at `unregistration_date`.
    Withdrawn {
        /// Pool held at withdrawal time, `None` if it was waiting.
        pool_id: Option<PoolId>,
        /// Withdrawal instant.
        unregistration_date: DateTime<Utc>,
    },
}

/// Position of a waiting registration: ordered by registration date, then
/// by creation sequence within the event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct WaitingKey {
    /// Registration timestamp.
    pub registration_date: DateTime<Utc>,
    /// Creation sequence within the event.
    pub sequence: u64,
}

/// A user's claim on a pool or on the waiting list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registration {
    /// Unique registration identifier.
    pub id: RegistrationId,
    /// Event the registration belongs to.
    pub event_id: EventId,
    /// Registered user.
    pub user_id: UserId,
    /// Creation sequence within the event, used to break date ties.
    pub sequence: u64,
    /// Creation instant. Kept when the registration is bumped.
    pub registration_date: DateTime<Utc>,
    status: RegistrationStatus,
}

impl Registration {
    /// Creates an active registration, pooled when `pool` is set and
    /// waiting otherwise.
    #[must_use]
    pub fn new(
        event_id: EventId,
        user_id: UserId,
        sequence: u64,
        registration_date: DateTime<Utc>,
        pool: Option<PoolId>,
    ) -> Self {
        let status = match pool {
            Some(pool_id) => RegistrationStatus::Pooled { pool_id },
            None => RegistrationStatus::Waiting,
        };
        Self {
            id: RegistrationId::new(),
            event_id,
            user_id,
            sequence,
            registration_date,
            status,
        }
    }

    /// Rebuilds a registration from stored parts.
    #[must_use]
    pub fn from_parts(
        id: RegistrationId,
        event_id: EventId,
        user_id: UserId,
        sequence: u64,
        registration_date: DateTime<Utc>,
        status: RegistrationStatus,
    ) -> Self {
        Self {
            id,
            event_id,
            user_id,
            sequence,
            registration_date,
            status,
        }
    }

    /// Returns the full status.
    #[must_use]
    pub const fn status(&self) -> &RegistrationStatus {
        &self.status
    }

    /// Returns the coarse lifecycle state.
    #[must_use]
    pub const fn state(&self) -> RegistrationState {
        match self.status {
            RegistrationStatus::Pooled { .. } => RegistrationState::ActivePooled,
            RegistrationStatus::Waiting => RegistrationState::ActiveWaiting,
            RegistrationStatus::Withdrawn { .. } => RegistrationState::Withdrawn,
        }
    }

    /// Pool currently (or, once withdrawn, last) held.
    #[must_use]
    pub const fn pool(&self) -> Option<PoolId> {
        match self.status {
            RegistrationStatus::Pooled { pool_id } => Some(pool_id),
            RegistrationStatus::Waiting => None,
            RegistrationStatus::Withdrawn { pool_id, .. } => pool_id,
        }
    }

    /// Withdrawal instant, if withdrawn.
    #[must_use]
    pub const fn unregistration_date(&self) -> Option<DateTime<Utc>> {
        match self.status {
            RegistrationStatus::Withdrawn {
                unregistration_date,
                ..
            } => Some(unregistration_date),
            _ => None,
        }
    }

    /// Returns `true` unless withdrawn.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        !matches!(self.status, RegistrationStatus::Withdrawn { .. })
    }

    /// Returns `true` if the registration is seated in `pool_id`.
    #[must_use]
    pub fn is_pooled_in(&self, pool_id: PoolId) -> bool {
        self.status == RegistrationStatus::Pooled { pool_id }
    }

    /// Ordering key on the waiting list.
    #[must_use]
    pub const fn waiting_key(&self) -> WaitingKey {
        WaitingKey {
            registration_date: self.registration_date,
            sequence: self.sequence,
        }
    }

    /// Moves a waiting registration into `pool_id`.
    ///
    /// # Errors
    ///
    /// Returns [`AdmissionError::InvalidTransition`] unless the registration
    /// is waiting.
    pub fn promote(&mut self, pool_id: PoolId) -> Result<(), AdmissionError> {
        match self.status {
            RegistrationStatus::Waiting => {
                self.status = RegistrationStatus::Pooled { pool_id };
                Ok(())
            }
            _ => Err(self.invalid_transition()),
        }
    }

    /// Withdraws an active registration at `now`, freezing its pool.
    ///
    /// # Errors
    ///
    /// Returns [`AdmissionError::InvalidTransition`] if already withdrawn.
    pub fn withdraw(&mut self, now: DateTime<Utc>) -> Result<(), AdmissionError> {
        match self.status {
            RegistrationStatus::Pooled { pool_id } => {
                self.status = RegistrationStatus::Withdrawn {
                    pool_id: Some(pool_id),
                    unregistration_date: now,
                };
                Ok(())
            }
            RegistrationStatus::Waiting => {
                self.status = RegistrationStatus::Withdrawn {
                    pool_id: None,
                    unregistration_date: now,
                };
                Ok(())
            }
            RegistrationStatus::Withdrawn { .. } => Err(self.invalid_transition()),
        }
    }

    fn invalid_transition(&self) -> AdmissionError {
        AdmissionError::InvalidTransition {
            registration_id: *self.id.as_uuid(),
            from: self.state(),
        }
    }
}
