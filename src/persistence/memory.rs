//! In-memory implementation of the store contract.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::EntityStore;
use super::models::{StoredEvent, StoredLogEntry, StoredPool, StoredRegistration};
use crate::error::AdmissionError;

#[derive(Debug, Default)]
struct Tables {
    events: HashMap<Uuid, StoredEvent>,
    pools: HashMap<Uuid, StoredPool>,
    registrations: HashMap<Uuid, StoredRegistration>,
    log: Vec<StoredLogEntry>,
}

/// Process-local store for development, tests and the seed runner.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    tables: RwLock<Tables>,
    unavailable: AtomicBool,
}

impl InMemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulates an outage: while set, every write fails.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<(), AdmissionError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(AdmissionError::PersistenceError(
                "store unavailable".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl EntityStore for InMemoryStore {
    async fn save_event(&self, event: StoredEvent) -> Result<(), AdmissionError> {
        self.check_available()?;
        self.tables.write().await.events.insert(event.id, event);
        Ok(())
    }

    async fn save_pool(&self, pool: StoredPool) -> Result<(), AdmissionError> {
        self.check_available()?;
        let mut tables = self.tables.write().await;
        if !tables.events.contains_key(&pool.event_id) {
            return Err(AdmissionError::PersistenceError(format!(
                "pool {} references missing event {}",
                pool.id, pool.event_id
            )));
        }
        tables.pools.insert(pool.id, pool);
        Ok(())
    }

    async fn save_registrations(
        &self,
        rows: Vec<StoredRegistration>,
    ) -> Result<(), AdmissionError> {
        self.check_available()?;
        let mut tables = self.tables.write().await;
        if let Some(orphan) = rows
            .iter()
            .find(|row| !tables.events.contains_key(&row.event_id))
        {
            return Err(AdmissionError::PersistenceError(format!(
                "registration {} references missing event {}",
                orphan.id, orphan.event_id
            )));
        }
        for row in rows {
            tables.registrations.insert(row.id, row);
        }
        Ok(())
    }

    async fn append_log(
        &self,
        event_id: Uuid,
        event_type: &str,
        payload: serde_json::Value,
    ) -> Result<i64, AdmissionError> {
        self.check_available()?;
        let mut tables = self.tables.write().await;
        let id = i64::try_from(tables.log.len())
            .map_err(|e| AdmissionError::PersistenceError(e.to_string()))?
            .saturating_add(1);
        tables.log.push(StoredLogEntry {
            id,
            event_id,
            event_type: event_type.to_string(),
            payload,
            created_at: Utc::now(),
        });
        Ok(id)
    }

    async fn load_events(&self) -> Result<Vec<StoredEvent>, AdmissionError> {
        let tables = self.tables.read().await;
        let mut events: Vec<_> = tables.events.values().cloned().collect();
        events.sort_by_key(|event| event.created_at);
        Ok(events)
    }

    async fn load_pools(&self, event_id: Uuid) -> Result<Vec<StoredPool>, AdmissionError> {
        let tables = self.tables.read().await;
        let mut pools: Vec<_> = tables
            .pools
            .values()
            .filter(|pool| pool.event_id == event_id)
            .cloned()
            .collect();
        pools.sort_by_key(|pool| pool.position);
        Ok(pools)
    }

    async fn load_registrations(
        &self,
        event_id: Uuid,
    ) -> Result<Vec<StoredRegistration>, AdmissionError> {
        let tables = self.tables.read().await;
        let mut rows: Vec<_> = tables
            .registrations
            .values()
            .filter(|row| row.event_id == event_id)
            .cloned()
            .collect();
        rows.sort_by_key(|row| row.sequence);
        Ok(rows)
    }

    async fn load_log(&self, event_id: Option<Uuid>) -> Result<Vec<StoredLogEntry>, AdmissionError> {
        let tables = self.tables.read().await;
        Ok(tables
            .log
            .iter()
            .filter(|entry| event_id.is_none_or(|id| entry.event_id == id))
            .cloned()
            .collect())
    }

    async fn delete_event(&self, event_id: Uuid) -> Result<u64, AdmissionError> {
        self.check_available()?;
        let mut tables = self.tables.write().await;
        let before = tables.events.len() + tables.pools.len() + tables.registrations.len();
        tables.events.remove(&event_id);
        tables.pools.retain(|_, pool| pool.event_id != event_id);
        tables.registrations.retain(|_, row| row.event_id != event_id);
        let after = tables.events.len() + tables.pools.len() + tables.registrations.len();
        Ok(u64::try_from(before.saturating_sub(after)).unwrap_or(u64::MAX))
    }
}
