//! Concurrent event storage with one writer lock per event.
//!
//! [`EventRegistry`] stores every event in a `HashMap` where each entry sits
//! behind its own [`tokio::sync::Mutex`]. Register, unregister and bump are
//! read-check-write sequences over capacity and the waiting list, so they
//! hold that mutex for their whole duration. Different events never contend.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, RwLock};

use super::EventId;
use super::event::{Event, EventSummary};
use crate::error::AdmissionError;

/// Central store for all live events.
///
/// Uses a `RwLock<HashMap<...>>` for the outer map and per-entry
/// `Arc<Mutex<Event>>` for single-writer access per event.
#[derive(Debug)]
pub struct EventRegistry {
    events: RwLock<HashMap<EventId, Arc<Mutex<Event>>>>,
}

impl EventRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            events: RwLock::new(HashMap::new()),
        }
    }

    /// Inserts a new event into the registry.
    ///
    /// # Errors
    ///
    /// Returns [`AdmissionError::InvalidRequest`] if an event with the same
    /// ID already exists.
    pub async fn insert(&self, event: Event) -> Result<EventId, AdmissionError> {
        let event_id = event.id;
        let mut map = self.events.write().await;
        if map.contains_key(&event_id) {
            return Err(AdmissionError::InvalidRequest(format!(
                "event {event_id} already exists"
            )));
        }
        map.insert(event_id, Arc::new(Mutex::new(event)));
        Ok(event_id)
    }

    /// Returns the event behind its per-event lock.
    ///
    /// # Errors
    ///
    /// Returns [`AdmissionError::EventNotFound`] if no event with the given
    /// ID exists.
    pub async fn get(&self, event_id: EventId) -> Result<Arc<Mutex<Event>>, AdmissionError> {
        let map = self.events.read().await;
        map.get(&event_id)
            .cloned()
            .ok_or(AdmissionError::EventNotFound(*event_id.as_uuid()))
    }

    /// Removes an event from the registry, returning its entry.
    ///
    /// The per-event lock is not taken here: callers that must exclude
    /// in-flight operations hold it while removing, and operations that
    /// acquired the entry earlier detect the removal with
    /// [`EventRegistry::is_current`].
    ///
    /// # Errors
    ///
    /// Returns [`AdmissionError::EventNotFound`] if no event with the given
    /// ID exists.
    pub async fn remove(&self, event_id: EventId) -> Result<Arc<Mutex<Event>>, AdmissionError> {
        self.events
            .write()
            .await
            .remove(&event_id)
            .ok_or(AdmissionError::EventNotFound(*event_id.as_uuid()))
    }

    /// Returns `true` if `entry` is still the registered entry for
    /// `event_id`.
    pub async fn is_current(&self, event_id: EventId, entry: &Arc<Mutex<Event>>) -> bool {
        self.events
            .read()
            .await
            .get(&event_id)
            .is_some_and(|current| Arc::ptr_eq(current, entry))
    }

    /// Returns summaries of all events at `now`.
    pub async fn list(&self, now: DateTime<Utc>) -> Vec<EventSummary> {
        let entries: Vec<_> = self.events.read().await.values().cloned().collect();
        let mut summaries = Vec::with_capacity(entries.len());
        for entry in entries {
            summaries.push(entry.lock().await.summary(now));
        }
        summaries.sort_by(|a, b| a.title.cmp(&b.title));
        summaries
    }

    /// Returns the number of events in the registry.
    pub async fn len(&self) -> usize {
        self.events.read().await.len()
    }

    /// Returns `true` if the registry contains no events.
    pub async fn is_empty(&self) -> bool {
        self.events.read().await.is_empty()
    }
}

impl Default for EventRegistry {
    fn default() -> Self {
        Self::new()
    }
}
