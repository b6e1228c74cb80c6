//! Notifier port — how apps ask for a notification to be delivered.

use std::future::Future;
use std::sync::Arc;

use hearth_domain::error::HearthError;
use hearth_domain::notification::{Delivery, Notification};

/// Delivers notifications, applying throttling and resilience.
pub trait Notifier: Send + Sync {
    /// Deliver `notification`, or report it as throttled.
    fn notify(
        &self,
        notification: Notification,
    ) -> impl Future<Output = Result<Delivery, HearthError>> + Send;

    /// Forget when `title` was last sent so the next send is not throttled.
    fn reset_history(&self, title: &str) -> impl Future<Output = ()> + Send;
}

impl<T: Notifier> Notifier for Arc<T> {
    fn notify(
        &self,
        notification: Notification,
    ) -> impl Future<Output = Result<Delivery, HearthError>> + Send {
        (**self).notify(notification)
    }

    fn reset_history(&self, title: &str) -> impl Future<Output = ()> + Send {
        (**self).reset_history(title)
    }
}
