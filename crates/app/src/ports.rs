//! Port definitions — traits that adapters implement.
//!
//! Ports are the boundaries between the application core and the outside world.
//! They are defined here (in `app`) so that both the services and the
//! adapter layer can depend on them without creating circular dependencies.

pub mod clock;
pub mod event_bus;
pub mod hub;
pub mod key_value;
pub mod notifier;
pub mod scheduler;

pub use clock::{Clock, SystemClock};
pub use event_bus::EventPublisher;
pub use hub::HubClient;
pub use key_value::KeyValueStore;
pub use notifier::Notifier;
pub use scheduler::{Job, ScheduledTask, Scheduler};
