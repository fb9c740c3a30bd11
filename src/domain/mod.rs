//! Domain layer: entities, admission rules, and the event registry.
//!
//! This module contains the registration domain model: typed identifiers,
//! permission-group membership, pools, registrations with their state
//! machine, the event aggregate that runs admission and bump, the domain
//! event bus, and the registry that serializes writers per event.

pub mod admission;
pub mod event;
pub mod event_bus;
pub mod event_registry;
pub mod ids;
pub mod membership;
pub mod pool;
pub mod registration;
pub mod registration_event;

pub use admission::{Admission, Phase, PoolLoad};
pub use event::{Event, EventSummary, Unregistration};
pub use event_bus::EventBus;
pub use event_registry::EventRegistry;
pub use ids::{EventId, GroupId, PoolId, RegistrationId, UserId};
pub use membership::{GroupDirectory, MembershipProvider};
pub use pool::{Pool, PoolSummary};
pub use registration::{Registration, RegistrationState, RegistrationStatus, WaitingKey};
pub use registration_event::RegistrationEvent;
