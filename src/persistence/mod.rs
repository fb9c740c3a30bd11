//! Persistence layer: the store contract for events, pools, registrations
//! and the domain event log.
//!
//! The engine never talks to a database directly. It writes rows through
//! the [`EntityStore`] trait and rebuilds its registry from them on
//! startup. [`memory::InMemoryStore`] is the bundled implementation.

pub mod memory;
pub mod models;

use std::fmt;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::AdmissionError;
use models::{StoredEvent, StoredLogEntry, StoredPool, StoredRegistration};

pub use memory::InMemoryStore;

/// Durable storage consumed by [`crate::service::RegistrationService`].
///
/// Writes are upserts keyed by row id. `save_registrations` must apply the
/// whole batch or nothing, since one unregister can touch two rows.
#[async_trait]
pub trait EntityStore: Send + Sync + fmt::Debug {
    /// Inserts or replaces an event row.
    ///
    /// # Errors
    ///
    /// Returns [`AdmissionError::PersistenceError`] on storage failure.
    async fn save_event(&self, event: StoredEvent) -> Result<(), AdmissionError>;

    /// Inserts or replaces a pool row.
    ///
    /// # Errors
    ///
    /// Returns [`AdmissionError::PersistenceError`] on storage failure.
    async fn save_pool(&self, pool: StoredPool) -> Result<(), AdmissionError>;

    /// Inserts or replaces registration rows atomically.
    ///
    /// # Errors
    ///
    /// Returns [`AdmissionError::PersistenceError`] on storage failure.
    async fn save_registrations(&self, rows: Vec<StoredRegistration>)
    -> Result<(), AdmissionError>;

    /// Appends a domain event to the log, returning its row id.
    ///
    /// # Errors
    ///
    /// Returns [`AdmissionError::PersistenceError`] on storage failure.
    async fn append_log(
        &self,
        event_id: Uuid,
        event_type: &str,
        payload: serde_json::Value,
    ) -> Result<i64, AdmissionError>;

    /// Loads all event rows.
    ///
    /// # Errors
    ///
    /// Returns [`AdmissionError::PersistenceError`] on storage failure.
    async fn load_events(&self) -> Result<Vec<StoredEvent>, AdmissionError>;

    /// Loads the pools of an event ordered by position.
    ///
    /// # Errors
    ///
    /// Returns [`AdmissionError::PersistenceError`] on storage failure.
    async fn load_pools(&self, event_id: Uuid) -> Result<Vec<StoredPool>, AdmissionError>;

    /// Loads the registrations of an event ordered by sequence.
    ///
    /// # Errors
    ///
    /// Returns [`AdmissionError::PersistenceError`] on storage failure.
    async fn load_registrations(
        &self,
        event_id: Uuid,
    ) -> Result<Vec<StoredRegistration>, AdmissionError>;

    /// Loads log entries in append order, optionally for one event.
    ///
    /// # Errors
    ///
    /// Returns [`AdmissionError::PersistenceError`] on storage failure.
    async fn load_log(&self, event_id: Option<Uuid>) -> Result<Vec<StoredLogEntry>, AdmissionError>;

    /// Deletes an event with its pools and registrations, returning the
    /// number of rows removed. Log entries are kept.
    ///
    /// # Errors
    ///
    /// Returns [`AdmissionError::PersistenceError`] on storage failure.
    async fn delete_event(&self, event_id: Uuid) -> Result<u64, AdmissionError>;
}
