//! Interactive actions attached to a push notification.

use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};

/// Maximum number of actions a single notification can carry.
pub const MAX_ACTIONS: usize = 3;

/// Future returned by an action callback.
pub type CallbackFuture = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// One-shot callback run when the user presses an action.
pub type ActionCallback = Box<dyn FnOnce() -> CallbackFuture + Send + 'static>;

/// Button shown on a push notification.
///
/// When a callback is attached, the dispatcher rewrites `action` into a
/// unique correlation token before delivery.
#[derive(Serialize, Deserialize)]
pub struct NotificationAction {
    pub action: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
    #[serde(skip)]
    pub callback: Option<ActionCallback>,
}

impl NotificationAction {
    #[must_use]
    pub fn new(action: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            title: title.into(),
            uri: None,
            callback: None,
        }
    }

    /// Open `uri` when pressed.
    #[must_use]
    pub fn uri(mut self, uri: impl Into<String>) -> Self {
        self.uri = Some(uri.into());
        self
    }

    /// Run `callback` when pressed.
    #[must_use]
    pub fn on_press<F, Fut>(mut self, callback: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.callback = Some(Box::new(move || -> CallbackFuture { Box::pin(callback()) }));
        self
    }
}

impl std::fmt::Debug for NotificationAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationAction")
            .field("action", &self.action)
            .field("title", &self.title)
            .field("uri", &self.uri)
            .field("callback", &self.callback.is_some())
            .finish()
    }
}
