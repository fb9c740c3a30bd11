//! JSON seed files: groups, users, events, pools and a command script.
//!
//! Instants are given as hour offsets from the moment the seed is applied,
//! so a seed stays meaningful whenever it runs.
//!
//! ```json
//! {
//!   "groups": [{ "name": "Abakus" }, { "name": "Webkom", "parent": "Abakus" }],
//!   "users": [{ "name": "alice", "groups": ["Webkom"] }],
//!   "events": [{
//!     "title": "TWO_POOLS",
//!     "merge_offset_hours": 12,
//!     "pools": [{ "name": "Abakus", "capacity": 3, "groups": ["Abakus"] }]
//!   }],
//!   "commands": [{ "action": "register", "event": "TWO_POOLS", "user": "alice" }]
//! }
//! ```

use std::collections::HashMap;
use std::path::Path;

use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::domain::{EventId, EventSummary, GroupDirectory, GroupId, Pool, UserId};
use crate::error::AdmissionError;
use crate::service::RegistrationService;

/// A permission group, optionally nested under a parent declared earlier.
#[derive(Debug, Clone, Deserialize)]
pub struct SeedGroup {
    /// Unique group name.
    pub name: String,
    /// Parent group name.
    #[serde(default)]
    pub parent: Option<String>,
}

/// A user and the groups they belong to directly.
#[derive(Debug, Clone, Deserialize)]
pub struct SeedUser {
    /// Name used by commands.
    pub name: String,
    /// Direct group memberships.
    #[serde(default)]
    pub groups: Vec<String>,
}

/// A pool definition.
#[derive(Debug, Clone, Deserialize)]
pub struct SeedPool {
    /// Pool name, unique within its event.
    pub name: String,
    /// Capacity.
    pub capacity: u32,
    /// Activation relative to now; negative means already open.
    #[serde(default)]
    pub activation_offset_hours: i64,
    /// Permission group names.
    pub groups: Vec<String>,
}

/// An event definition.
#[derive(Debug, Clone, Deserialize)]
pub struct SeedEvent {
    /// Title, used by commands to refer to the event.
    pub title: String,
    /// Merge time relative to now.
    #[serde(default)]
    pub merge_offset_hours: Option<i64>,
    /// Pools in creation order.
    #[serde(default)]
    pub pools: Vec<SeedPool>,
}

/// One scripted operation.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum SeedCommand {
    /// Register a user.
    Register {
        /// Event title.
        event: String,
        /// User name.
        user: String,
    },
    /// Unregister a user.
    Unregister {
        /// Event title.
        event: String,
        /// User name.
        user: String,
    },
    /// Bump from a named pool.
    Bump {
        /// Event title.
        event: String,
        /// Pool name.
        pool: String,
    },
    /// Pop the waiting list.
    Pop {
        /// Event title.
        event: String,
    },
}

/// A whole seed file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Seed {
    /// Groups, parents first.
    #[serde(default)]
    pub groups: Vec<SeedGroup>,
    /// Users.
    #[serde(default)]
    pub users: Vec<SeedUser>,
    /// Events.
    #[serde(default)]
    pub events: Vec<SeedEvent>,
    /// Commands applied in order.
    #[serde(default)]
    pub commands: Vec<SeedCommand>,
}

/// Outcome of applying a seed.
#[derive(Debug, Clone, Serialize)]
pub struct SeedReport {
    /// Commands that succeeded.
    pub applied: usize,
    /// Commands refused by an admission rule.
    pub rejected: usize,
    /// Summaries of every event after the script ran.
    pub events: Vec<EventSummary>,
}

impl Seed {
    /// Parses a seed from JSON text.
    ///
    /// # Errors
    ///
    /// Returns [`AdmissionError::Config`] if the text is not a valid seed.
    pub fn from_json(text: &str) -> Result<Self, AdmissionError> {
        serde_json::from_str(text)
            .map_err(|e| AdmissionError::Config(format!("invalid seed: {e}")))
    }

    /// Reads and parses a seed file.
    ///
    /// # Errors
    ///
    /// Returns [`AdmissionError::Config`] if the file cannot be read or
    /// parsed.
    pub async fn load(path: &Path) -> Result<Self, AdmissionError> {
        let text = tokio::fs::read_to_string(path).await.map_err(|e| {
            AdmissionError::Config(format!("cannot read seed {}: {e}", path.display()))
        })?;
        Self::from_json(&text)
    }

    /// Creates the groups, users and events, then runs the commands.
    ///
    /// Commands refused by an admission rule are logged and counted;
    /// anything else aborts the run.
    ///
    /// # Errors
    ///
    /// Returns [`AdmissionError::InvalidRequest`] or
    /// [`AdmissionError::GroupNotFound`] for dangling names, and any
    /// non-business-rule error raised by the service.
    pub async fn apply(
        &self,
        directory: &GroupDirectory,
        service: &RegistrationService,
    ) -> Result<SeedReport, AdmissionError> {
        let now = Utc::now();

        let mut groups: HashMap<&str, GroupId> = HashMap::new();
        for group in &self.groups {
            let parent = group
                .parent
                .as_deref()
                .map(|name| lookup(&groups, name, "group"))
                .transpose()?;
            groups.insert(&group.name, directory.add_group(&group.name, parent)?);
        }

        let mut users: HashMap<&str, UserId> = HashMap::new();
        for user in &self.users {
            let id = UserId::new();
            for group in &user.groups {
                directory.add_user(lookup(&groups, group, "group")?, id)?;
            }
            users.insert(&user.name, id);
        }

        let mut events: HashMap<&str, EventId> = HashMap::new();
        for event in &self.events {
            let merge_time = event
                .merge_offset_hours
                .map(|hours| now + Duration::hours(hours));
            let event_id = service.create_event(&event.title, merge_time).await?;
            for pool in &event.pools {
                let permission_groups = pool
                    .groups
                    .iter()
                    .map(|name| lookup(&groups, name, "group"))
                    .collect::<Result<Vec<_>, _>>()?;
                let activation = now + Duration::hours(pool.activation_offset_hours);
                service
                    .add_pool(
                        event_id,
                        Pool::new(&pool.name, pool.capacity, activation, permission_groups),
                    )
                    .await?;
            }
            events.insert(&event.title, event_id);
        }

        let mut applied = 0usize;
        let mut rejected = 0usize;
        for (index, command) in self.commands.iter().enumerate() {
            match self
                .run_command(command, &events, &users, service)
                .await
            {
                Ok(()) => applied = applied.saturating_add(1),
                Err(e) if e.is_business_rule() => {
                    warn!(index, ?command, error = %e, "seed command rejected");
                    rejected = rejected.saturating_add(1);
                }
                Err(e) => return Err(e),
            }
        }

        info!(
            groups = groups.len(),
            users = users.len(),
            events = events.len(),
            applied,
            rejected,
            "seed applied"
        );
        Ok(SeedReport {
            applied,
            rejected,
            events: service.list_events().await,
        })
    }

    async fn run_command(
        &self,
        command: &SeedCommand,
        events: &HashMap<&str, EventId>,
        users: &HashMap<&str, UserId>,
        service: &RegistrationService,
    ) -> Result<(), AdmissionError> {
        match command {
            SeedCommand::Register { event, user } => {
                let event_id = lookup(events, event, "event")?;
                service
                    .register(event_id, lookup(users, user, "user")?)
                    .await?;
            }
            SeedCommand::Unregister { event, user } => {
                let event_id = lookup(events, event, "event")?;
                service
                    .unregister(event_id, lookup(users, user, "user")?)
                    .await?;
            }
            SeedCommand::Bump { event, pool } => {
                let event_id = lookup(events, event, "event")?;
                let summary = service.event_summary(event_id).await?;
                let Some(pool_id) = summary
                    .pools
                    .iter()
                    .find(|p| p.name == *pool)
                    .map(|p| p.pool_id)
                else {
                    return Err(AdmissionError::InvalidRequest(format!(
                        "unknown pool `{pool}` in event `{event}`"
                    )));
                };
                service.bump(event_id, pool_id).await?;
            }
            SeedCommand::Pop { event } => {
                service
                    .pop_from_waiting_pool(lookup(events, event, "event")?)
                    .await?;
            }
        }
        Ok(())
    }
}

fn lookup<T: Copy>(map: &HashMap<&str, T>, name: &str, kind: &str) -> Result<T, AdmissionError> {
    map.get(name)
        .copied()
        .ok_or_else(|| AdmissionError::InvalidRequest(format!("unknown {kind} `{name}`")))
}
