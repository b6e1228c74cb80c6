//! # hearthd — hearth daemon
//!
//! Composition root that wires all adapters together and runs the
//! automations until interrupted.
//!
//! ## Responsibilities
//! - Parse configuration (env vars, config file)
//! - Initialize logging
//! - Initialize the `SQLite` connection pool and run migrations
//! - Construct the hub and storage adapters
//! - Construct application services, injecting adapters via port traits
//! - Feed hub events to the automation runtime
//! - Handle graceful shutdown (SIGINT)
//!
//! ## Dependency rule
//! This is the **only** crate that depends on all other crates.
//! It is the wiring layer — no domain logic belongs here.

mod config;

use std::sync::Arc;

use hearth_adapter_storage_sqlite_sqlx::{Config as DatabaseConfig, SqliteKeyValueStore};
use hearth_adapter_virtual::VirtualHub;
use hearth_app::automation_runtime::AutomationRuntime;
use hearth_app::event_bus::InProcessEventBus;
use hearth_app::ports::{Job, Scheduler, SystemClock};
use hearth_app::scheduler::TokioScheduler;
use hearth_app::services::{NotificationDispatcher, PresenceStateMachine};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = config::Config::load()?;
    let database_url = config.database_url().to_string();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&config.logging.filter))
        .init();

    // Database
    let db = DatabaseConfig {
        database_url: database_url.clone(),
    }
    .build()
    .await?;
    let store = SqliteKeyValueStore::new(db.pool().clone());

    // Hub and event bus
    let event_bus = InProcessEventBus::new(256);
    let events = event_bus.subscribe();
    let hub = Arc::new(VirtualHub::with_demo_entities(event_bus));

    // Services
    let scheduler = TokioScheduler::new();
    let dispatcher = Arc::new(NotificationDispatcher::new(
        Arc::clone(&hub),
        store,
        SystemClock,
        config.notifications,
        config.resilience.notifications,
    ));
    let presence = PresenceStateMachine::new(
        Arc::clone(&hub),
        Arc::clone(&dispatcher),
        scheduler.clone(),
        SystemClock,
        config.presence,
        config.resilience.general,
    );

    let housekeeping = Arc::clone(&dispatcher);
    scheduler.run_on_cron(&config.maintenance.purge_cron, move || -> Job {
        let dispatcher = Arc::clone(&housekeeping);
        Box::pin(async move {
            let purged = dispatcher.actions().purge_expired();
            tracing::debug!(purged, "expired notification actions purged");
        })
    })?;

    // Runtime
    let shutdown = CancellationToken::new();
    let runtime = AutomationRuntime::new(presence, dispatcher);
    let worker = tokio::spawn(runtime.run(events, shutdown.clone()));

    tracing::info!(
        database = %database_url,
        entities = hub.entities().len(),
        "hearthd started"
    );

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutting down");
    scheduler.shutdown();
    shutdown.cancel();
    worker.await?;
    db.close().await;

    Ok(())
}
