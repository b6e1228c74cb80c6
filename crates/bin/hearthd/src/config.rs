//! Configuration loading — TOML file with environment variable overrides.
//!
//! Looks for `hearth.toml` in the working directory. Every field has a
//! sensible default so the file is optional. Environment variables take
//! precedence over file values.

use hearth_app::scheduler::parse_cron;
use hearth_app::services::{NotificationSettings, PresenceSettings};
use hearth_domain::resilience::{PolicyOverrides, ResiliencePolicy};
use serde::Deserialize;

/// Top-level configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Database settings.
    pub database: DatabaseConfig,
    /// Logging settings.
    pub logging: LoggingConfig,
    /// Presence automation entities and timings.
    pub presence: PresenceSettings,
    /// Notification channels.
    pub notifications: NotificationSettings,
    /// Retry and circuit-breaker policies.
    pub resilience: ResilienceConfig,
    /// Periodic housekeeping.
    pub maintenance: MaintenanceConfig,
}

/// `SQLite` database configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// `SQLite` connection URL or file path.
    pub url: String,
}

/// Logging configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive (`RUST_LOG` syntax).
    pub filter: String,
}

/// Policies per category of outbound calls.
///
/// Each table only overrides the fields it sets; everything else keeps the
/// preset of its own category.
#[derive(Debug, Deserialize)]
#[serde(from = "ResilienceOverrides")]
pub struct ResilienceConfig {
    /// Device control, scenes and state reads.
    pub general: ResiliencePolicy,
    /// Notification delivery.
    pub notifications: ResiliencePolicy,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct ResilienceOverrides {
    general: PolicyOverrides,
    notifications: PolicyOverrides,
}

impl From<ResilienceOverrides> for ResilienceConfig {
    fn from(overrides: ResilienceOverrides) -> Self {
        Self {
            general: ResiliencePolicy::general().with_overrides(&overrides.general),
            notifications: ResiliencePolicy::notifications()
                .with_overrides(&overrides.notifications),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct MaintenanceConfig {
    /// Cron expression for purging expired notification actions.
    pub purge_cron: String,
}

impl Config {
    /// Load configuration from `hearth.toml` (if present) then apply
    /// environment-variable overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML file exists but is malformed, or if the
    /// resulting configuration is invalid.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Self::from_file("hearth.toml")?;
        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    fn from_file(path: &str) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content).map_err(ConfigError::Parse),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(err) => Err(ConfigError::Io(err)),
        }
    }

    fn apply_overrides<F>(&mut self, var: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(val) = var("HEARTH_DATABASE_URL") {
            self.database.url = val;
        }
        if let Some(val) = var("HEARTH_LOG") {
            self.logging.filter = val;
        }
        if let Some(val) = var("RUST_LOG") {
            self.logging.filter = val;
        }
        if let Some(val) = var("HEARTH_WELCOME_DELAY_MS")
            && let Ok(delay) = val.parse()
        {
            self.presence.welcome_delay_ms = delay;
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.presence.away_flag_entity.is_empty() || self.presence.motion_entity.is_empty() {
            return Err(ConfigError::Validation(
                "presence entities must not be empty".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.notifications.speaker_volume) {
            return Err(ConfigError::Validation(
                "speaker volume must be between 0 and 1".to_string(),
            ));
        }
        for (name, policy) in [
            ("general", &self.resilience.general),
            ("notifications", &self.resilience.notifications),
        ] {
            validate_policy(name, policy)?;
        }
        parse_cron(&self.maintenance.purge_cron)
            .map_err(|err| ConfigError::Validation(err.to_string()))?;
        Ok(())
    }

    /// Return the database URL in `sqlx`-compatible format.
    #[must_use]
    pub fn database_url(&self) -> &str {
        &self.database.url
    }
}

fn validate_policy(name: &str, policy: &ResiliencePolicy) -> Result<(), ConfigError> {
    if policy.retry.max_attempts == 0 {
        return Err(ConfigError::Validation(format!(
            "resilience.{name}: max_attempts must be at least 1"
        )));
    }
    let ratio = policy.breaker.failure_ratio;
    if ratio <= 0.0 || ratio > 1.0 {
        return Err(ConfigError::Validation(format!(
            "resilience.{name}: failure_ratio must be in (0, 1]"
        )));
    }
    if policy.breaker.minimum_throughput == 0 {
        return Err(ConfigError::Validation(format!(
            "resilience.{name}: minimum_throughput must be at least 1"
        )));
    }
    Ok(())
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite:hearth.db?mode=rwc".to_string(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "hearthd=info,hearth_app=info,hearth_adapter_virtual=info".to_string(),
        }
    }
}

impl Default for ResilienceConfig {
    fn default() -> Self {
        ResilienceOverrides::default().into()
    }
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            purge_cron: "0 * * * *".to_string(),
        }
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// TOML parse failure.
    #[error("failed to parse config file")]
    Parse(#[from] toml::de::Error),
    /// File I/O failure.
    #[error("failed to read config file")]
    Io(#[from] std::io::Error),
    /// Semantic validation failure.
    #[error("invalid configuration: {0}")]
    Validation(String),
}
