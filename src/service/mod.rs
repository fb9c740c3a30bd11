//! Service layer: registration orchestration.
//!
//! [`RegistrationService`] serializes writers per event, runs the admission
//! rules on the event aggregate, persists through an optional
//! [`crate::persistence::EntityStore`] and emits events through the
//! [`super::domain::EventBus`].

pub mod registration_service;

pub use registration_service::RegistrationService;
