//! # event-admission
//!
//! Capacity-constrained, multi-pool event registration engine.
//!
//! An event owns pools, each with a capacity, an activation date and a set
//! of permission groups. Registering seats a user in the best pool they are
//! permitted to join, or queues them on the waiting list. After the event's
//! merge time all pools share one combined capacity. Withdrawing a seat
//! bumps the earliest eligible waiting registration into it.
//!
//! ## Architecture
//!
//! ```text
//! Callers (seed runner, embedding application)
//!     │
//!     ├── RegistrationService (service/)
//!     ├── EventBus (domain/)
//!     │
//!     ├── EventRegistry (domain/)
//!     ├── Event aggregate + admission rules (domain/)
//!     ├── MembershipProvider / GroupDirectory (domain/)
//!     │
//!     └── EntityStore (persistence/)
//! ```

pub mod config;
pub mod domain;
pub mod error;
pub mod persistence;
pub mod seed;
pub mod service;
