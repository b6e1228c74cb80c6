//! Application services — the apps and the infrastructure they share.

pub mod action_registry;
pub mod notification_dispatcher;
pub mod notification_history;
pub mod presence;

pub use action_registry::ActionRegistry;
pub use notification_dispatcher::{NotificationDispatcher, NotificationSettings};
pub use notification_history::NotificationHistory;
pub use presence::{PresenceSettings, PresenceStateMachine, SceneSettings};
