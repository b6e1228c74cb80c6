//! Notification dispatcher — throttled, resilient delivery on every channel.
//!
//! A request goes through these steps:
//!
//! 1. caller-side validation (title, at most three actions);
//! 2. the throttle check and history update, serialized so two concurrent
//!    requests with the same title cannot both pass;
//! 3. registration of action callbacks under unique correlation tokens;
//! 4. delivery through the channel's [`ResilientExecutor`], with an optional
//!    fallback channel.
//!
//! The history is updated before delivery: a failed delivery still counts
//! as a send for throttling purposes.

use serde::{Deserialize, Serialize};
use serde_json::json;

use hearth_domain::error::HearthError;
use hearth_domain::notification::{
    Channel, ChatEmbed, Delivery, Notification, NotificationAction, PushOptions,
};
use hearth_domain::resilience::ResiliencePolicy;
use hearth_domain::service::ServiceCall;

use crate::ports::{Clock, HubClient, KeyValueStore, Notifier, SystemClock};
use crate::resilience::ResilientExecutor;
use crate::services::action_registry::{ActionRegistry, DEFAULT_ACTION_TTL_HOURS};
use crate::services::notification_history::NotificationHistory;

/// Entities and services used to reach each channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationSettings {
    /// Speaker group used for house announcements.
    pub speaker_entity: String,
    /// Volume set before every announcement.
    pub speaker_volume: f64,
    /// `tts.<service>` used for announcements.
    pub tts_service: String,
    /// `notify.<service>` of the phone companion app.
    pub phone_service: String,
    /// `notify.<service>` of the chat integration.
    pub chat_service: String,
    /// Chat targets used when a notification names none.
    pub chat_default_targets: Vec<String>,
    /// Hours an action callback waits for its press.
    pub action_ttl_hours: i64,
}

impl Default for NotificationSettings {
    fn default() -> Self {
        Self {
            speaker_entity: "media_player.whole_house".to_string(),
            speaker_volume: 0.4,
            tts_service: "cloud_say".to_string(),
            phone_service: "mobile_app_phone".to_string(),
            chat_service: "discord_homeassistant".to_string(),
            chat_default_targets: Vec::new(),
            action_ttl_hours: DEFAULT_ACTION_TTL_HOURS,
        }
    }
}

/// A notification after throttling, with actions rewritten to tokens.
struct Outbound {
    title: String,
    message: String,
    push: PushOptions,
    actions: Vec<serde_json::Value>,
    chat_targets: Vec<String>,
    embed: Option<ChatEmbed>,
}

/// Delivers [`Notification`]s through the hub.
pub struct NotificationDispatcher<H, K, C = SystemClock> {
    hub: H,
    settings: NotificationSettings,
    history: NotificationHistory<K, C>,
    actions: ActionRegistry<C>,
    throttle_gate: tokio::sync::Mutex<()>,
    speaker: ResilientExecutor,
    phone: ResilientExecutor,
    chat: ResilientExecutor,
}

impl<H, K, C> NotificationDispatcher<H, K, C>
where
    H: HubClient,
    K: KeyValueStore,
    C: Clock + Clone,
{
    pub fn new(
        hub: H,
        store: K,
        clock: C,
        settings: NotificationSettings,
        policy: ResiliencePolicy,
    ) -> Self {
        let ttl = chrono::Duration::hours(settings.action_ttl_hours);
        Self {
            hub,
            history: NotificationHistory::new(store, clock.clone()),
            actions: ActionRegistry::new(clock, ttl),
            throttle_gate: tokio::sync::Mutex::new(()),
            speaker: ResilientExecutor::new("notify.house_speaker", policy),
            phone: ResilientExecutor::new("notify.phone", policy),
            chat: ResilientExecutor::new("notify.chat", policy),
            settings,
        }
    }

    /// Registry receiving notification action presses.
    pub fn actions(&self) -> &ActionRegistry<C> {
        &self.actions
    }

    pub fn history(&self) -> &NotificationHistory<K, C> {
        &self.history
    }

    pub fn settings(&self) -> &NotificationSettings {
        &self.settings
    }

    /// Deliver `notification` unless throttled.
    ///
    /// # Errors
    ///
    /// Returns a validation error before anything is recorded, or the
    /// delivery error once the channel (and its fallback) gave up.
    pub async fn send(&self, notification: Notification) -> Result<Delivery, HearthError> {
        notification.validate()?;
        let Notification {
            channel,
            title,
            message,
            force,
            min_interval_minutes,
            actions,
            push,
            chat_targets,
            embed,
            fallback,
        } = notification;

        {
            let _gate = self.throttle_gate.lock().await;
            if !self
                .history
                .can_send(&title, force, min_interval_minutes)
                .await
            {
                tracing::debug!(%channel, title, "notification throttled");
                return Ok(Delivery::Throttled);
            }
            self.history.record_send(&title, &message).await;
        }

        let outbound = Outbound {
            actions: self.register_actions(actions),
            title,
            message,
            push,
            chat_targets,
            embed,
        };
        let hub = &self.hub;
        let primary_calls = &self.calls_for(channel, &outbound);

        let delivery = match fallback.filter(|fallback| *fallback != channel) {
            None => {
                self.executor(channel)
                    .execute(move || send_all(hub, primary_calls))
                    .await?;
                Delivery::Sent
            }
            Some(fallback) => {
                let fallback_calls = &self.calls_for(fallback, &outbound);
                let fallback_executor = self.executor(fallback);
                self.executor(channel)
                    .execute_with_fallback(
                        move || async move {
                            send_all(hub, primary_calls)
                                .await
                                .map(|()| Delivery::Sent)
                        },
                        move || async move {
                            fallback_executor
                                .execute(move || send_all(hub, fallback_calls))
                                .await
                                .map(|()| Delivery::SentViaFallback)
                        },
                    )
                    .await?
            }
        };

        tracing::info!(%channel, title = %outbound.title, ?delivery, "notification delivered");
        Ok(delivery)
    }

    /// Forget when `title` was last sent.
    pub async fn reset(&self, title: &str) {
        let _gate = self.throttle_gate.lock().await;
        self.history.reset_history(title).await;
    }

    /// Play `content_id` on the house speakers at `volume`.
    ///
    /// Not throttled.
    ///
    /// # Errors
    ///
    /// Returns the delivery error once the speaker executor gave up.
    pub async fn play_media(&self, content_id: &str, volume: f64) -> Result<(), HearthError> {
        let speaker = self.settings.speaker_entity.as_str();
        let calls = &[
            ServiceCall::for_entity(speaker, "play_media").data(json!({
                "media_content_id": content_id,
                "media_content_type": "music",
            })),
            ServiceCall::for_entity(speaker, "volume_set").data(json!({ "volume_level": volume })),
        ];
        let hub = &self.hub;
        self.speaker.execute(move || send_all(hub, calls)).await
    }

    fn executor(&self, channel: Channel) -> &ResilientExecutor {
        match channel {
            Channel::HouseSpeaker => &self.speaker,
            Channel::Phone | Channel::PhoneTts => &self.phone,
            Channel::Chat => &self.chat,
        }
    }

    fn register_actions(&self, actions: Vec<NotificationAction>) -> Vec<serde_json::Value> {
        actions
            .into_iter()
            .map(|mut action| {
                if let Some(callback) = action.callback.take() {
                    action.action = self.actions.register(&action.action, callback);
                }
                let mut value = json!({ "action": action.action, "title": action.title });
                if let Some(uri) = action.uri {
                    value["uri"] = json!(uri);
                }
                value
            })
            .collect()
    }

    fn calls_for(&self, channel: Channel, outbound: &Outbound) -> Vec<ServiceCall> {
        let settings = &self.settings;
        match channel {
            Channel::HouseSpeaker => vec![
                ServiceCall::for_entity(&settings.speaker_entity, "volume_set")
                    .data(json!({ "volume_level": settings.speaker_volume })),
                ServiceCall::new("tts", settings.tts_service.as_str()).data(json!({
                    "entity_id": settings.speaker_entity,
                    "message": outbound.message,
                })),
            ],
            Channel::Phone => vec![
                ServiceCall::new("notify", settings.phone_service.as_str()).data(json!({
                    "title": outbound.title,
                    "message": outbound.message,
                    "data": push_data(&outbound.push, &outbound.actions),
                })),
            ],
            Channel::PhoneTts => {
                let mut data = push_data(&PushOptions::default(), &[]);
                data["tts_text"] = json!(outbound.message);
                vec![
                    ServiceCall::new("notify", settings.phone_service.as_str())
                        .data(json!({ "message": "TTS", "data": data })),
                ]
            }
            Channel::Chat => {
                let targets = if outbound.chat_targets.is_empty() {
                    &settings.chat_default_targets
                } else {
                    &outbound.chat_targets
                };
                let mut payload = json!({ "message": outbound.message, "target": targets });
                if let Some(embed) = &outbound.embed {
                    payload["data"] = json!({ "embed": embed });
                }
                vec![ServiceCall::new("notify", settings.chat_service.as_str()).data(payload)]
            }
        }
    }
}

/// Companion-app `data` block of a push notification.
fn push_data(push: &PushOptions, actions: &[serde_json::Value]) -> serde_json::Value {
    let mut data = json!({
        "priority": "high",
        "ttl": 0,
        "color": "",
        "sticky": "true",
    });
    let optional = [
        ("image", &push.image),
        ("channel", &push.channel),
        ("vibrationPattern", &push.vibration_pattern),
        ("ledColor", &push.led_color),
    ];
    for (key, value) in optional {
        if let Some(value) = value {
            data[key] = json!(value);
        }
    }
    if !actions.is_empty() {
        data["actions"] = json!(actions);
    }
    data
}

async fn send_all<H: HubClient>(hub: &H, calls: &[ServiceCall]) -> Result<(), HearthError> {
    for call in calls {
        hub.call_service(call.clone()).await?;
    }
    Ok(())
}

impl<H, K, C> Notifier for NotificationDispatcher<H, K, C>
where
    H: HubClient,
    K: KeyValueStore,
    C: Clock + Clone,
{
    async fn notify(&self, notification: Notification) -> Result<Delivery, HearthError> {
        self.send(notification).await
    }

    async fn reset_history(&self, title: &str) {
        self.reset(title).await;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use hearth_domain::error::ValidationError;
    use hearth_domain::event::{HubEvent, NOTIFICATION_ACTION_EVENT};
    use hearth_domain::resilience::{BreakerPolicy, RetryPolicy};

    use super::*;
    use crate::testing::{InMemoryStore, ManualClock, SpyHub};

    type TestDispatcher = NotificationDispatcher<SpyHub, InMemoryStore, ManualClock>;

    fn policy() -> ResiliencePolicy {
        ResiliencePolicy {
            retry: RetryPolicy {
                max_attempts: 2,
                base_delay: Duration::from_millis(10),
                max_delay: Duration::from_millis(20),
                max_jitter: Duration::ZERO,
            },
            breaker: BreakerPolicy {
                failure_ratio: 0.6,
                sampling_window: Duration::from_secs(30),
                minimum_throughput: 100,
                break_duration: Duration::from_secs(60),
            },
        }
    }

    fn dispatcher() -> (TestDispatcher, SpyHub, ManualClock) {
        let hub = SpyHub::default();
        let clock = ManualClock::default();
        let dispatcher = NotificationDispatcher::new(
            hub.clone(),
            InMemoryStore::default(),
            clock.clone(),
            NotificationSettings {
                chat_default_targets: vec!["1234".to_string()],
                ..NotificationSettings::default()
            },
            policy(),
        );
        (dispatcher, hub, clock)
    }

    #[tokio::test(start_paused = true)]
    async fn should_announce_on_house_speaker_at_fixed_volume() {
        let (dispatcher, hub, _) = dispatcher();

        let delivery = dispatcher
            .send(Notification::house("welcomeHome", "Welcome home!"))
            .await
            .unwrap();

        assert_eq!(delivery, Delivery::Sent);
        let calls = hub.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].qualified_name(), "media_player.volume_set");
        assert_eq!(calls[0].target, vec!["media_player.whole_house"]);
        assert_eq!(calls[0].data["volume_level"], 0.4);
        assert_eq!(calls[1].qualified_name(), "tts.cloud_say");
        assert_eq!(calls[1].data["message"], "Welcome home!");
        assert_eq!(calls[1].data["entity_id"], "media_player.whole_house");
    }

    #[tokio::test(start_paused = true)]
    async fn should_send_phone_push_with_companion_data() {
        let (dispatcher, hub, _) = dispatcher();

        dispatcher
            .send(Notification::phone("Washer", "Done").push_options(PushOptions {
                image: Some("/local/washer.png".to_string()),
                vibration_pattern: Some("100, 1000, 100".to_string()),
                ..PushOptions::default()
            }))
            .await
            .unwrap();

        let calls = hub.calls_to("notify.mobile_app_phone");
        assert_eq!(calls.len(), 1);
        let payload = &calls[0].data;
        assert_eq!(payload["title"], "Washer");
        assert_eq!(payload["message"], "Done");
        assert_eq!(payload["data"]["priority"], "high");
        assert_eq!(payload["data"]["ttl"], 0);
        assert_eq!(payload["data"]["sticky"], "true");
        assert_eq!(payload["data"]["image"], "/local/washer.png");
        assert_eq!(payload["data"]["vibrationPattern"], "100, 1000, 100");
        assert!(payload["data"].get("ledColor").is_none());
        assert!(payload["data"].get("actions").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn should_read_phone_tts_aloud() {
        let (dispatcher, hub, _) = dispatcher();

        dispatcher
            .send(Notification::new(Channel::PhoneTts, "Door", "Front door open"))
            .await
            .unwrap();

        let calls = hub.calls_to("notify.mobile_app_phone");
        assert_eq!(calls[0].data["message"], "TTS");
        assert_eq!(calls[0].data["data"]["tts_text"], "Front door open");
    }

    #[tokio::test(start_paused = true)]
    async fn should_send_chat_to_default_targets_with_embed() {
        let (dispatcher, hub, _) = dispatcher();

        dispatcher
            .send(Notification::chat("Energy", "Daily report").embed(ChatEmbed {
                title: Some("Energy".to_string()),
                color: Some(0x00ff00),
                ..ChatEmbed::default()
            }))
            .await
            .unwrap();

        let calls = hub.calls_to("notify.discord_homeassistant");
        assert_eq!(calls[0].data["message"], "Daily report");
        assert_eq!(calls[0].data["target"], json!(["1234"]));
        assert_eq!(calls[0].data["data"]["embed"]["color"], 0x00ff00);
    }

    #[tokio::test(start_paused = true)]
    async fn should_throttle_same_title_within_interval() {
        let (dispatcher, hub, clock) = dispatcher();

        let first = dispatcher.send(Notification::phone("Battery", "Low")).await.unwrap();
        clock.advance_minutes(30);
        let second = dispatcher.send(Notification::phone("Battery", "Low")).await.unwrap();
        clock.advance_minutes(31);
        let third = dispatcher.send(Notification::phone("Battery", "Low")).await.unwrap();

        assert_eq!(first, Delivery::Sent);
        assert_eq!(second, Delivery::Throttled);
        assert_eq!(third, Delivery::Sent);
        assert_eq!(hub.calls().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn should_let_forced_notification_through_throttle() {
        let (dispatcher, hub, _) = dispatcher();

        dispatcher.send(Notification::phone("Home", "Welcome")).await.unwrap();
        let forced = dispatcher
            .send(Notification::phone("Home", "Welcome").forced())
            .await
            .unwrap();

        assert_eq!(forced, Delivery::Sent);
        assert_eq!(hub.calls().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn should_allow_send_after_history_reset() {
        let (dispatcher, hub, _) = dispatcher();

        dispatcher.send(Notification::phone("Cat", "Feed")).await.unwrap();
        dispatcher.reset_history("Cat").await;
        let delivery = dispatcher.send(Notification::phone("Cat", "Feed")).await.unwrap();

        assert_eq!(delivery, Delivery::Sent);
        assert_eq!(hub.calls().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn should_pass_only_one_of_concurrent_same_title_sends() {
        let (dispatcher, hub, _) = dispatcher();

        let (a, b) = tokio::join!(
            dispatcher.send(Notification::phone("Door", "Open")),
            dispatcher.send(Notification::phone("Door", "Open")),
        );

        let mut deliveries = [a.unwrap(), b.unwrap()];
        deliveries.sort_by_key(|delivery| *delivery == Delivery::Sent);
        assert_eq!(deliveries, [Delivery::Throttled, Delivery::Sent]);
        assert_eq!(hub.calls().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn should_reject_too_many_actions_before_recording() {
        let (dispatcher, hub, _) = dispatcher();
        let notification = Notification::phone("Cat", "Feed?")
            .action(NotificationAction::new("a", "A"))
            .action(NotificationAction::new("b", "B"))
            .action(NotificationAction::new("c", "C"))
            .action(NotificationAction::new("d", "D"));

        let result = dispatcher.send(notification).await;

        assert!(matches!(
            result,
            Err(HearthError::Validation(ValidationError::TooManyActions { max: 3, count: 4 }))
        ));
        assert!(hub.calls().is_empty());
        assert!(dispatcher.history().record("Cat").await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn should_run_action_callback_once_when_pressed() {
        let (dispatcher, hub, _) = dispatcher();
        let pressed = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&pressed);

        dispatcher
            .send(
                Notification::phone("Cat", "Feed?")
                    .action(NotificationAction::new("fed", "Fed").on_press(move || async move {
                        counter.fetch_add(1, Ordering::SeqCst);
                    }))
                    .action(NotificationAction::new("URI", "Open").uri("/lovelace/cat")),
            )
            .await
            .unwrap();

        let payload = &hub.calls()[0].data;
        let actions = payload["data"]["actions"].as_array().unwrap();
        let token = actions[0]["action"].as_str().unwrap().to_string();
        assert!(token.starts_with("fed-"));
        assert_eq!(actions[1]["action"], "URI");
        assert_eq!(actions[1]["uri"], "/lovelace/cat");

        let event = HubEvent::custom(NOTIFICATION_ACTION_EVENT, json!({ "action": token }));
        assert!(dispatcher.actions().handle_event(&event).await);
        assert!(!dispatcher.actions().handle_event(&event).await);
        assert_eq!(pressed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn should_not_register_callbacks_when_throttled() {
        let (dispatcher, _, _) = dispatcher();
        dispatcher.send(Notification::phone("Cat", "Feed?")).await.unwrap();

        let delivery = dispatcher
            .send(
                Notification::phone("Cat", "Feed?")
                    .action(NotificationAction::new("fed", "Fed").on_press(|| async {})),
            )
            .await
            .unwrap();

        assert_eq!(delivery, Delivery::Throttled);
        assert_eq!(dispatcher.actions().pending(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn should_retry_transient_channel_failure() {
        let (dispatcher, hub, _) = dispatcher();
        hub.fail_times("notify.mobile_app_phone", 1);

        let delivery = dispatcher.send(Notification::phone("Door", "Open")).await.unwrap();

        assert_eq!(delivery, Delivery::Sent);
        assert_eq!(hub.attempts_to("notify.mobile_app_phone"), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn should_deliver_via_fallback_channel() {
        let (dispatcher, hub, _) = dispatcher();
        hub.fail_always("notify.mobile_app_phone");

        let delivery = dispatcher
            .send(Notification::phone("Leak", "Water detected").fallback(Channel::Chat))
            .await
            .unwrap();

        assert_eq!(delivery, Delivery::SentViaFallback);
        assert_eq!(hub.attempts_to("notify.mobile_app_phone"), 2);
        let chat = hub.calls_to("notify.discord_homeassistant");
        assert_eq!(chat[0].data["message"], "Water detected");
    }

    #[tokio::test(start_paused = true)]
    async fn should_report_failure_when_fallback_fails_too() {
        let (dispatcher, hub, _) = dispatcher();
        hub.fail_always("notify.mobile_app_phone");
        hub.reject("notify.discord_homeassistant");

        let result = dispatcher
            .send(Notification::phone("Leak", "Water detected").fallback(Channel::Chat))
            .await;

        assert!(matches!(result, Err(HearthError::FallbackFailed { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn should_still_record_history_when_delivery_fails() {
        let (dispatcher, hub, _) = dispatcher();
        hub.reject("notify.mobile_app_phone");

        let result = dispatcher.send(Notification::phone("Door", "Open")).await;

        assert!(result.is_err());
        assert!(dispatcher.history().record("Door").await.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn should_play_media_on_house_speaker() {
        let (dispatcher, hub, _) = dispatcher();

        dispatcher.play_media("spotify:playlist:1", 0.5).await.unwrap();

        let calls = hub.calls();
        assert_eq!(calls[0].qualified_name(), "media_player.play_media");
        assert_eq!(calls[0].data["media_content_type"], "music");
        assert_eq!(calls[1].data["volume_level"], 0.5);
    }
}
