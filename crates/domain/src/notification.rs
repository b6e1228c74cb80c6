//! Notification — a human-facing message delivered through one channel.
//!
//! A notification is identified for throttling purposes by its `title`.
//! Delivery happens on a [`Channel`]; push notifications may carry up to
//! [`MAX_ACTIONS`] interactive [`NotificationAction`]s.

mod action;
mod record;

pub use action::{ActionCallback, CallbackFuture, MAX_ACTIONS, NotificationAction};
pub use record::{
    DEFAULT_MIN_INTERVAL_MINUTES, NotificationRecord, NotificationRecords, may_send,
};

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Where a notification is delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    /// Speech synthesis on the house-wide speaker group.
    HouseSpeaker,
    /// Mobile push notification.
    Phone,
    /// Mobile push read aloud by the phone.
    PhoneTts,
    /// Chat webhook (e.g. a Discord channel).
    Chat,
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::HouseSpeaker => f.write_str("house_speaker"),
            Self::Phone => f.write_str("phone"),
            Self::PhoneTts => f.write_str("phone_tts"),
            Self::Chat => f.write_str("chat"),
        }
    }
}

/// Presentation options for push notifications.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushOptions {
    pub image: Option<String>,
    /// Android notification channel.
    pub channel: Option<String>,
    /// e.g. `"100, 1000, 100, 1000, 100"`.
    pub vibration_pattern: Option<String>,
    pub led_color: Option<String>,
}

/// Rich embed attached to a chat message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatEmbed {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

/// What happened to a notification handed to the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Delivered on the requested channel.
    Sent,
    /// The primary channel failed and the fallback channel delivered it.
    SentViaFallback,
    /// Suppressed by the throttle.
    Throttled,
}

/// A notification request.
#[derive(Debug)]
pub struct Notification {
    pub channel: Channel,
    pub title: String,
    pub message: String,
    /// Bypass the throttle.
    pub force: bool,
    /// Minimum minutes between two sends of the same title.
    /// [`DEFAULT_MIN_INTERVAL_MINUTES`] when unset.
    pub min_interval_minutes: Option<f64>,
    pub actions: Vec<NotificationAction>,
    pub push: PushOptions,
    /// Chat targets; the dispatcher's default target when empty.
    pub chat_targets: Vec<String>,
    pub embed: Option<ChatEmbed>,
    /// Channel used when delivery on `channel` ultimately fails.
    pub fallback: Option<Channel>,
}

impl Notification {
    #[must_use]
    pub fn new(channel: Channel, title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            channel,
            title: title.into(),
            message: message.into(),
            force: false,
            min_interval_minutes: None,
            actions: Vec::new(),
            push: PushOptions::default(),
            chat_targets: Vec::new(),
            embed: None,
            fallback: None,
        }
    }

    #[must_use]
    pub fn house(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(Channel::HouseSpeaker, title, message)
    }

    #[must_use]
    pub fn phone(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(Channel::Phone, title, message)
    }

    #[must_use]
    pub fn chat(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(Channel::Chat, title, message)
    }

    #[must_use]
    pub fn forced(mut self) -> Self {
        self.force = true;
        self
    }

    #[must_use]
    pub fn force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    #[must_use]
    pub fn min_interval_minutes(mut self, minutes: f64) -> Self {
        self.min_interval_minutes = Some(minutes);
        self
    }

    #[must_use]
    pub fn action(mut self, action: NotificationAction) -> Self {
        self.actions.push(action);
        self
    }

    #[must_use]
    pub fn push_options(mut self, push: PushOptions) -> Self {
        self.push = push;
        self
    }

    #[must_use]
    pub fn chat_target(mut self, target: impl Into<String>) -> Self {
        self.chat_targets.push(target.into());
        self
    }

    #[must_use]
    pub fn embed(mut self, embed: ChatEmbed) -> Self {
        self.embed = Some(embed);
        self
    }

    #[must_use]
    pub fn fallback(mut self, channel: Channel) -> Self {
        self.fallback = Some(channel);
        self
    }

    /// The throttle interval for this notification.
    #[must_use]
    pub fn min_interval(&self) -> chrono::Duration {
        crate::time::minutes(
            self.min_interval_minutes
                .unwrap_or(DEFAULT_MIN_INTERVAL_MINUTES),
        )
    }

    /// Check caller-side invariants.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::EmptyName`] when the title is empty and
    /// [`ValidationError::TooManyActions`] when more than [`MAX_ACTIONS`]
    /// actions are attached.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.title.is_empty() {
            return Err(ValidationError::EmptyName);
        }
        if self.actions.len() > MAX_ACTIONS {
            return Err(ValidationError::TooManyActions {
                max: MAX_ACTIONS,
                count: self.actions.len(),
            });
        }
        Ok(())
    }
}
