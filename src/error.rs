//! Admission error types with stable numeric codes.
//!
//! [`AdmissionError`] is the central error type for the engine. Business
//! rule failures (`NoAvailablePools`, `RegistrationNotFound`) are expected
//! outcomes that callers map to client errors; the remaining variants cover
//! lookups, invalid input, configuration and the persistence contract.

use uuid::Uuid;

use crate::domain::RegistrationState;

/// Engine-wide error enum.
///
/// # Error Code Ranges
///
/// | Range     | Category            |
/// |-----------|---------------------|
/// | 1000–1999 | Validation          |
/// | 2000–2999 | Not Found           |
/// | 3000–3999 | Server / Storage    |
/// | 4000–4999 | Registration rules  |
#[derive(Debug, thiserror::Error)]
pub enum AdmissionError {
    /// The user has no eligible pool, or already holds an active
    /// registration on the event.
    #[error("no available pools")]
    NoAvailablePools,

    /// `unregister` was called for a user without an active registration.
    #[error("no active registration for user {user_id} on event {event_id}")]
    RegistrationNotFound {
        /// Event that was queried.
        event_id: Uuid,
        /// User that was queried.
        user_id: Uuid,
    },

    /// Event with the given ID was not found.
    #[error("event not found: {0}")]
    EventNotFound(Uuid),

    /// Pool with the given ID does not belong to the event.
    #[error("pool not found: {0}")]
    PoolNotFound(Uuid),

    /// Permission group with the given ID or name is unknown.
    #[error("group not found: {0}")]
    GroupNotFound(String),

    /// A registration was asked to make a transition its state forbids.
    #[error("registration {registration_id} cannot leave state {from:?}")]
    InvalidTransition {
        /// Registration that rejected the transition.
        registration_id: Uuid,
        /// State the registration was in.
        from: RegistrationState,
    },

    /// Request validation failed.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Configuration could not be loaded.
    #[error("configuration error: {0}")]
    Config(String),

    /// Persistence layer failure.
    #[error("persistence error: {0}")]
    PersistenceError(String),

    /// Internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl AdmissionError {
    /// Returns the numeric error code for this variant.
    #[must_use]
    pub const fn error_code(&self) -> u32 {
        match self {
            Self::InvalidRequest(_) => 1001,
            Self::Config(_) => 1002,
            Self::EventNotFound(_) => 2001,
            Self::PoolNotFound(_) => 2002,
            Self::GroupNotFound(_) => 2003,
            Self::RegistrationNotFound { .. } => 2004,
            Self::Internal(_) => 3000,
            Self::PersistenceError(_) => 3001,
            Self::NoAvailablePools => 4001,
            Self::InvalidTransition { .. } => 4002,
        }
    }

    /// Returns `true` for expected business-rule rejections that must be
    /// reported to the caller as-is and never retried.
    #[must_use]
    pub const fn is_business_rule(&self) -> bool {
        matches!(
            self,
            Self::NoAvailablePools | Self::RegistrationNotFound { .. }
        )
    }
}

impl From<serde_json::Error> for AdmissionError {
    fn from(err: serde_json::Error) -> Self {
        Self::PersistenceError(err.to_string())
    }
}
