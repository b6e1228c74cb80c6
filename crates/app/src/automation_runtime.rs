//! Automation runtime — feeds hub events to the apps, in order.
//!
//! The runtime owns the event bus receiver. Each event is handed to the
//! presence state machine, then to the notification action registry, before
//! the next one is read. A lagging receiver skips the lost events with a
//! warning; a closed bus or a cancelled token stops the loop.

use std::sync::Arc;

use tokio::sync::broadcast::Receiver;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;

use hearth_domain::event::HubEvent;

use crate::ports::{Clock, HubClient, KeyValueStore, Notifier, Scheduler, SystemClock};
use crate::services::{NotificationDispatcher, PresenceStateMachine};

/// Drives the apps from the event bus.
pub struct AutomationRuntime<H, K, N, S, C = SystemClock> {
    presence: PresenceStateMachine<H, N, S, C>,
    dispatcher: Arc<NotificationDispatcher<H, K, C>>,
}

impl<H, K, N, S, C> AutomationRuntime<H, K, N, S, C>
where
    H: HubClient + 'static,
    K: KeyValueStore + 'static,
    N: Notifier + 'static,
    S: Scheduler + 'static,
    C: Clock + Clone + 'static,
{
    pub fn new(
        presence: PresenceStateMachine<H, N, S, C>,
        dispatcher: Arc<NotificationDispatcher<H, K, C>>,
    ) -> Self {
        Self {
            presence,
            dispatcher,
        }
    }

    pub fn presence(&self) -> &PresenceStateMachine<H, N, S, C> {
        &self.presence
    }

    /// Hand one event to every app.
    pub async fn process_event(&self, event: &HubEvent) {
        tracing::trace!(event = %event.id, "processing hub event");
        self.presence.handle_event(event).await;
        self.dispatcher.actions().handle_event(event).await;
    }

    /// Process events until the bus closes or `shutdown` is cancelled.
    pub async fn run(self, mut events: Receiver<HubEvent>, shutdown: CancellationToken) {
        tracing::info!("automation runtime started");
        loop {
            tokio::select! {
                () = shutdown.cancelled() => break,
                received = events.recv() => match received {
                    Ok(event) => self.process_event(&event).await,
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "automation runtime lagged, events dropped");
                    }
                    Err(RecvError::Closed) => break,
                },
            }
        }
        tracing::info!("automation runtime stopped");
    }
}
