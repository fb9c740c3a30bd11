//! event-admission entry point.
//!
//! Builds the registration service, applies the optional seed script and
//! prints every event summary as JSON.

use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::EnvFilter;

use event_admission::config::{AdmissionConfig, LogFormat};
use event_admission::domain::{EventBus, EventRegistry, GroupDirectory, MembershipProvider};
use event_admission::persistence::{EntityStore, InMemoryStore};
use event_admission::seed::Seed;
use event_admission::service::RegistrationService;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AdmissionConfig::from_env().context("failed to load configuration")?;

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match config.log_format {
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init(),
        LogFormat::Pretty => tracing_subscriber::fmt().with_env_filter(filter).init(),
    }
    tracing::info!(
        log_format = %config.log_format,
        persistence = config.persistence_enabled,
        event_log = config.event_log_enabled,
        "starting event-admission"
    );

    // Build domain layer
    let directory = Arc::new(GroupDirectory::new());
    let registry = Arc::new(EventRegistry::new());
    let event_bus = EventBus::new(config.event_bus_capacity);

    // Build service layer
    let mut service = RegistrationService::new(
        registry,
        Arc::clone(&directory) as Arc<dyn MembershipProvider>,
        event_bus,
    );
    let store = config.persistence_enabled.then(|| Arc::new(InMemoryStore::new()));
    if let Some(store) = &store {
        service = service.with_store(
            Arc::clone(store) as Arc<dyn EntityStore>,
            config.event_log_enabled,
        );
        let restored = service
            .restore()
            .await
            .context("failed to restore events from store")?;
        tracing::info!(restored, "persistence ready");
    }

    let summaries = match &config.seed_path {
        Some(path) => {
            let seed = Seed::load(path)
                .await
                .with_context(|| format!("failed to load seed {}", path.display()))?;
            let report = seed
                .apply(&directory, &service)
                .await
                .context("failed to apply seed")?;
            tracing::info!(
                applied = report.applied,
                rejected = report.rejected,
                "seed finished"
            );
            report.events
        }
        None => {
            tracing::warn!("SEED_PATH not set, nothing to apply");
            service.list_events().await
        }
    };

    if let Some(store) = &store {
        let entries = store.load_log(None).await.context("failed to read event log")?;
        tracing::info!(entries = entries.len(), "event log");
    }

    let json = serde_json::to_string_pretty(&summaries).context("failed to encode summaries")?;
    println!("{json}");

    Ok(())
}
