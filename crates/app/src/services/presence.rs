//! Presence state machine — away, returning, welcoming home, home.
//!
//! The current [`PresenceState`] lives in a single lock-protected cell.
//! Every entry point validates and applies its transition while holding the
//! lock, then runs the entry actions of the new state after releasing it.
//!
//! Entering [`PresenceState::WelcomingHome`] starts the welcome sequence on
//! its own task: a greeting and a lighting scene right away, then a delayed
//! announcement on the house speakers followed by the move to
//! [`PresenceState::Home`]. Each sequence carries a generation number so a
//! continuation scheduled for an earlier arrival can never complete a later
//! one. Leaving cancels the pending continuation.
//!
//! When the resident's phone stays far from home for long enough while
//! travelling away, the away flag is switched on automatically; the flag
//! change then drives the usual transition to [`PresenceState::Away`].

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{Datelike, Timelike, Weekday};
use serde::{Deserialize, Serialize};

use hearth_domain::entity::states;
use hearth_domain::error::HearthError;
use hearth_domain::event::HubEvent;
use hearth_domain::house_mode::HouseMode;
use hearth_domain::notification::Notification;
use hearth_domain::presence::PresenceState;
use hearth_domain::resilience::ResiliencePolicy;
use hearth_domain::service::ServiceCall;

use crate::ports::{Clock, HubClient, Notifier, ScheduledTask, Scheduler, SystemClock};
use crate::resilience::ResilientExecutor;

const GREETING_TITLE: &str = "Home";
const WELCOME_TITLE: &str = "welcomeHome";
const LEAVING_INTERVAL_MINUTES: f64 = 5.0;
/// Direction-of-travel states that allow setting the away flag.
const AUTO_AWAY_DIRECTIONS: &[&str] = &["away_from", "stationary"];

/// Lighting scene activated on arrival, per house mode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SceneSettings {
    pub morning: String,
    pub day: String,
    pub evening: String,
    pub night: String,
}

impl SceneSettings {
    #[must_use]
    pub fn for_mode(&self, mode: HouseMode) -> &str {
        match mode {
            HouseMode::Morning => &self.morning,
            HouseMode::Day => &self.day,
            HouseMode::Evening => &self.evening,
            HouseMode::Night => &self.night,
        }
    }
}

impl Default for SceneSettings {
    fn default() -> Self {
        Self {
            morning: "scene.living_room_morning".to_string(),
            day: "scene.living_room_day".to_string(),
            evening: "scene.living_room_evening".to_string(),
            night: "scene.living_room_night".to_string(),
        }
    }
}

/// Entities and timings of the presence automation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PresenceSettings {
    /// Boolean helper that is `on` while nobody is home.
    pub away_flag_entity: String,
    /// Motion sensor confirming an arrival.
    pub motion_entity: String,
    /// Person tracker; arriving home clears a forgotten away flag.
    pub person_entity: Option<String>,
    /// Selector holding the house mode (`Morning`, `Day`, …).
    pub house_mode_entity: String,
    pub holiday_entity: Option<String>,
    /// Sensor reporting `full` while the pet food storage is stocked.
    pub food_storage_entity: Option<String>,
    /// Players turned off when leaving.
    pub media_players: Vec<String>,
    pub scenes: SceneSettings,
    /// Weekdays on which the resident commutes to the office.
    pub office_days: Vec<Weekday>,
    /// Leaving before this local hour on an office day counts as commuting.
    pub office_hours_end: u32,
    /// Delay between the greeting and the final announcement.
    pub welcome_delay_ms: u64,
    /// Distance of the resident's phone from home. Unset disables auto away.
    pub distance_entity: Option<String>,
    /// Direction of travel reported alongside the distance.
    pub direction_entity: Option<String>,
    /// Distance above which the phone counts as far from home.
    pub auto_away_threshold: f64,
    /// How long the phone must stay far before the away flag is set.
    pub auto_away_hold_ms: u64,
    /// Zone in which leaving is expected to be short (e.g. groceries).
    pub auto_away_exclusion_zone: Option<String>,
}

impl PresenceSettings {
    #[must_use]
    pub fn welcome_delay(&self) -> Duration {
        Duration::from_millis(self.welcome_delay_ms)
    }

    #[must_use]
    pub fn auto_away_hold(&self) -> Duration {
        Duration::from_millis(self.auto_away_hold_ms)
    }
}

impl Default for PresenceSettings {
    fn default() -> Self {
        Self {
            away_flag_entity: "input_boolean.away".to_string(),
            motion_entity: "binary_sensor.hall_motion".to_string(),
            person_entity: Some("person.resident".to_string()),
            house_mode_entity: "input_select.house_mode".to_string(),
            holiday_entity: Some("input_boolean.holiday".to_string()),
            food_storage_entity: Some("sensor.pet_food_storage".to_string()),
            media_players: vec![
                "media_player.tv".to_string(),
                "media_player.soundbar".to_string(),
            ],
            scenes: SceneSettings::default(),
            office_days: Vec::new(),
            office_hours_end: 9,
            welcome_delay_ms: 15_000,
            distance_entity: Some("sensor.phone_distance".to_string()),
            direction_entity: Some("sensor.phone_direction_of_travel".to_string()),
            auto_away_threshold: 300.0,
            auto_away_hold_ms: 5 * 60 * 1000,
            auto_away_exclusion_zone: Some("zone.groceries".to_string()),
        }
    }
}

#[derive(Debug)]
struct PendingWelcome {
    generation: u64,
    continuation: Option<ScheduledTask>,
}

#[derive(Debug, Default)]
struct PresenceCell {
    state: PresenceState,
    generation: u64,
    welcome: Option<PendingWelcome>,
    /// Armed while the phone is far from home.
    auto_away: Option<ScheduledTask>,
}

enum EntryAction {
    Away,
    Welcome(u64),
}

struct Inner<H, N, S, C> {
    hub: H,
    notifier: N,
    scheduler: S,
    clock: C,
    settings: PresenceSettings,
    executor: ResilientExecutor,
    cell: Mutex<PresenceCell>,
}

/// Tracks home presence and drives the leaving and arriving automations.
pub struct PresenceStateMachine<H, N, S, C = SystemClock> {
    inner: Arc<Inner<H, N, S, C>>,
}

impl<H, N, S, C> Clone for PresenceStateMachine<H, N, S, C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<H, N, S, C> PresenceStateMachine<H, N, S, C>
where
    H: HubClient + 'static,
    N: Notifier + 'static,
    S: Scheduler + 'static,
    C: Clock + 'static,
{
    pub fn new(
        hub: H,
        notifier: N,
        scheduler: S,
        clock: C,
        settings: PresenceSettings,
        policy: ResiliencePolicy,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                hub,
                notifier,
                scheduler,
                clock,
                settings,
                executor: ResilientExecutor::new("presence", policy),
                cell: Mutex::new(PresenceCell::default()),
            }),
        }
    }

    pub fn settings(&self) -> &PresenceSettings {
        &self.inner.settings
    }

    fn lock(&self) -> MutexGuard<'_, PresenceCell> {
        self.inner.cell.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[must_use]
    pub fn state(&self) -> PresenceState {
        self.lock().state
    }

    /// Move to `target` when the transition is legal, then run its entry
    /// actions. Illegal transitions and re-entering the current state are
    /// no-ops.
    pub async fn transition_to(&self, target: PresenceState) {
        let entry = transition(&mut self.lock(), target);
        if let Some(entry) = entry {
            self.run_entry(entry).await;
        }
    }

    /// Everybody left: turn things off and say goodbye.
    pub async fn request_away(&self) {
        self.transition_to(PresenceState::Away).await;
    }

    /// The away flag cleared; wait for motion before welcoming.
    pub async fn request_returning(&self) {
        self.transition_to(PresenceState::Returning).await;
    }

    /// Motion in the hall. Starts the welcome sequence when returning,
    /// ignored otherwise.
    pub fn on_motion_detected(&self) {
        let entry = {
            let mut cell = self.lock();
            if cell.state == PresenceState::Returning {
                transition(&mut cell, PresenceState::WelcomingHome)
            } else {
                tracing::debug!(state = %cell.state, "motion ignored");
                None
            }
        };
        if let Some(EntryAction::Welcome(generation)) = entry {
            self.spawn_welcome(generation);
        }
    }

    /// React to a hub event.
    pub async fn handle_event(&self, event: &HubEvent) {
        let Some(change) = event.as_state_change() else {
            return;
        };
        let settings = self.settings();
        if change.entity_id == settings.away_flag_entity {
            if change.turned_on() {
                self.request_away().await;
            } else if change.turned_off() {
                self.request_returning().await;
            }
        } else if change.entity_id == settings.motion_entity {
            if change.turned_on() {
                self.on_motion_detected();
            }
        } else if settings.person_entity.as_deref() == Some(change.entity_id.as_str()) {
            if change.entered(states::HOME) {
                self.clear_away_flag().await;
            }
        } else if settings.distance_entity.as_deref() == Some(change.entity_id.as_str()) {
            self.on_distance_changed(change.new_state.as_deref());
        }
    }

    /// Arm the auto-away timer when the phone moves out of range and
    /// disarm it when it comes back. Further changes while out of range
    /// keep the running timer, so it fires at most once per departure.
    fn on_distance_changed(&self, state: Option<&str>) {
        let settings = self.settings();
        let far = state
            .and_then(|state| state.parse::<f64>().ok())
            .is_some_and(|distance| distance > settings.auto_away_threshold);
        let mut cell = self.lock();
        if !far {
            if let Some(timer) = cell.auto_away.take() {
                timer.cancel();
                tracing::debug!("phone back in range, auto away disarmed");
            }
            return;
        }
        if cell.auto_away.is_some() {
            return;
        }
        let this = self.clone();
        cell.auto_away = Some(self.inner.scheduler.run_after(
            settings.auto_away_hold(),
            Box::pin(async move { this.auto_away().await }),
        ));
        tracing::debug!(
            hold_ms = settings.auto_away_hold_ms,
            "phone out of range, auto away armed"
        );
    }

    async fn auto_away(&self) {
        let settings = self.settings();
        if let Some(entity) = settings.direction_entity.as_deref() {
            let direction = self.read_state(entity).await;
            if !direction
                .as_deref()
                .is_some_and(|direction| AUTO_AWAY_DIRECTIONS.contains(&direction))
            {
                tracing::debug!(?direction, "phone not travelling away, auto away skipped");
                return;
            }
        }
        let flag = settings.away_flag_entity.as_str();
        if self.is_on(Some(flag)).await {
            return;
        }
        if self.is_on(settings.auto_away_exclusion_zone.as_deref()).await {
            tracing::debug!("resident in excluded zone, auto away skipped");
            return;
        }
        tracing::info!("phone far from home, setting the away flag");
        if let Err(err) = self.command(&ServiceCall::for_entity(flag, "turn_on")).await {
            tracing::error!(error = %err, "failed to set away flag");
        }
    }

    async fn run_entry(&self, entry: EntryAction) {
        match entry {
            EntryAction::Away => self.run_away_actions().await,
            EntryAction::Welcome(generation) => self.spawn_welcome(generation),
        }
    }

    async fn run_away_actions(&self) {
        let notification = self.leaving_notification().await;
        if let Err(err) = self.inner.notifier.notify(notification).await {
            tracing::error!(error = %err, "failed to send leaving notification");
        }

        let settings = self.settings();
        let commands = std::iter::once(ServiceCall::new("light", "turn_off").target("all")).chain(
            settings
                .media_players
                .iter()
                .map(|player| ServiceCall::for_entity(player, "turn_off")),
        );
        for call in commands {
            if let Err(err) = self.command(&call).await {
                tracing::error!(service = %call, error = %err, "away command failed");
            }
        }
    }

    async fn leaving_notification(&self) -> Notification {
        let (title, message) = if self.is_office_morning().await {
            ("Have a good day", "Good luck at the office :)")
        } else {
            ("Goodbye", "Leaving the house all alone again :(")
        };
        Notification::phone(title, message).min_interval_minutes(LEAVING_INTERVAL_MINUTES)
    }

    async fn is_office_morning(&self) -> bool {
        let settings = self.settings();
        let now = self.inner.clock.local_now();
        if !settings.office_days.contains(&now.weekday()) || now.hour() >= settings.office_hours_end
        {
            return false;
        }
        !self.is_on(settings.holiday_entity.as_deref()).await
    }

    async fn clear_away_flag(&self) {
        let flag = self.settings().away_flag_entity.as_str();
        if !self.is_on(Some(flag)).await {
            return;
        }
        tracing::info!("resident arrived home with the away flag set, clearing it");
        if let Err(err) = self.command(&ServiceCall::for_entity(flag, "turn_off")).await {
            tracing::error!(error = %err, "failed to clear away flag");
        }
    }

    fn spawn_welcome(&self, generation: u64) {
        let this = self.clone();
        tokio::spawn(async move { this.welcome_sequence(generation).await });
    }

    async fn welcome_sequence(&self, generation: u64) {
        tracing::info!(generation, "starting welcome home sequence");
        if let Err(err) = self.welcome_immediate(generation).await {
            tracing::error!(generation, error = %err, "welcome home sequence failed");
            if self.complete_welcome(generation) {
                tracing::warn!(generation, "reset to home after welcome failure");
            }
        }
    }

    async fn welcome_immediate(&self, generation: u64) -> Result<(), HearthError> {
        if !self.is_current_welcome(generation) {
            return Ok(());
        }
        let mode = self.house_mode().await?;
        self.inner
            .notifier
            .notify(Notification::phone(GREETING_TITLE, greeting(mode)).forced())
            .await?;
        let scene = self.settings().scenes.for_mode(mode);
        self.command(&ServiceCall::for_entity(scene, "turn_on")).await?;

        let this = self.clone();
        let continuation = self.inner.scheduler.run_after(
            self.settings().welcome_delay(),
            Box::pin(async move { this.welcome_delayed(generation).await }),
        );
        let mut cell = self.lock();
        match cell.welcome.as_mut() {
            Some(pending) if pending.generation == generation => {
                pending.continuation = Some(continuation);
            }
            _ => continuation.cancel(),
        }
        Ok(())
    }

    async fn welcome_delayed(&self, generation: u64) {
        if !self.is_current_welcome(generation) {
            tracing::debug!(generation, "welcome continuation superseded");
            return;
        }
        let message = self.final_welcome_message().await;
        if let Err(err) = self
            .inner
            .notifier
            .notify(Notification::house(WELCOME_TITLE, message).forced())
            .await
        {
            tracing::error!(generation, error = %err, "failed to announce welcome");
        }
        if self.complete_welcome(generation) {
            tracing::info!(generation, "welcome home sequence completed");
        }
    }

    async fn final_welcome_message(&self) -> String {
        let mut message = "Welcome home!".to_string();
        let Some(sensor) = self.settings().food_storage_entity.as_deref() else {
            return message;
        };
        let hub = &self.inner.hub;
        match self.inner.executor.execute(move || hub.get_state(sensor)).await {
            Ok(snapshot)
                if snapshot
                    .as_ref()
                    .is_none_or(|snapshot| snapshot.state != "full") =>
            {
                message.push_str(" The pet food is almost out!");
            }
            Ok(_) => {}
            Err(err) => tracing::warn!(error = %err, "could not read food storage"),
        }
        message
    }

    /// Move a still-current welcome to `Home`. Returns whether it did.
    fn complete_welcome(&self, generation: u64) -> bool {
        let mut cell = self.lock();
        if cell
            .welcome
            .as_ref()
            .is_some_and(|pending| pending.generation == generation)
        {
            transition(&mut cell, PresenceState::Home);
            true
        } else {
            tracing::debug!(generation, state = %cell.state, "welcome no longer current");
            false
        }
    }

    fn is_current_welcome(&self, generation: u64) -> bool {
        let cell = self.lock();
        cell.state == PresenceState::WelcomingHome
            && cell
                .welcome
                .as_ref()
                .is_some_and(|pending| pending.generation == generation)
    }

    async fn house_mode(&self) -> Result<HouseMode, HearthError> {
        let hub = &self.inner.hub;
        let entity = self.settings().house_mode_entity.as_str();
        let snapshot = self
            .inner
            .executor
            .execute(move || hub.get_state(entity))
            .await?;
        Ok(HouseMode::from_selector(
            snapshot.as_ref().map(|snapshot| snapshot.state.as_str()),
        ))
    }

    /// Whether `entity` reports `on`. Unset, unknown or unreadable → `false`.
    async fn is_on(&self, entity: Option<&str>) -> bool {
        match entity {
            Some(entity) => self.read_state(entity).await.as_deref() == Some(states::ON),
            None => false,
        }
    }

    /// Current state of `entity`; `None` when unknown or unreadable.
    async fn read_state(&self, entity: &str) -> Option<String> {
        let hub = &self.inner.hub;
        match self.inner.executor.execute(move || hub.get_state(entity)).await {
            Ok(snapshot) => snapshot.map(|snapshot| snapshot.state),
            Err(err) => {
                tracing::warn!(entity, error = %err, "could not read entity state");
                None
            }
        }
    }

    async fn command(&self, call: &ServiceCall) -> Result<(), HearthError> {
        let hub = &self.inner.hub;
        self.inner
            .executor
            .execute(move || hub.call_service(call.clone()))
            .await
    }
}

fn greeting(mode: HouseMode) -> &'static str {
    match mode {
        HouseMode::Morning => "Good morning!",
        HouseMode::Day => "Welcome home!",
        HouseMode::Evening => "Good evening!",
        HouseMode::Night => "Welcome home (keep it down, it's late!)",
    }
}

/// Validate and apply `target` on the locked cell.
fn transition(cell: &mut PresenceCell, target: PresenceState) -> Option<EntryAction> {
    let from = cell.state;
    if from == target {
        tracing::debug!(state = %from, "already in presence state");
        return None;
    }
    if !from.can_transition_to(target) {
        tracing::warn!(%from, to = %target, "invalid presence transition");
        return None;
    }
    cell.state = target;
    tracing::info!(%from, to = %target, "presence transition");

    match target {
        PresenceState::Away => {
            if let Some(pending) = cell.welcome.take() {
                if let Some(continuation) = pending.continuation {
                    continuation.cancel();
                }
                tracing::info!(generation = pending.generation, "pending welcome cancelled");
            }
            Some(EntryAction::Away)
        }
        PresenceState::Returning => {
            tracing::info!("returning home, waiting for motion");
            None
        }
        PresenceState::WelcomingHome => {
            cell.generation += 1;
            cell.welcome = Some(PendingWelcome {
                generation: cell.generation,
                continuation: None,
            });
            Some(EntryAction::Welcome(cell.generation))
        }
        PresenceState::Home => {
            cell.welcome = None;
            tracing::info!("home, normal automation active");
            None
        }
    }
}
