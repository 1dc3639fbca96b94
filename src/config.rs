//! Configuration types for the progress engine and dispatcher.

use crate::error::{Result, StrideError};
use chrono::Weekday;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Environment variable consulted when `channel.bot_token` is empty.
pub const BOT_TOKEN_ENV: &str = "STRIDE_TELEGRAM_TOKEN";

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StrideConfig {
    /// Hierarchy store settings.
    pub store: StoreConfig,
    /// Dispatcher tick and action windows.
    pub scheduler: SchedulerConfig,
    /// Outbound messaging channel settings.
    pub channel: ChannelConfig,
    /// Log output settings.
    pub logging: LoggingConfig,
}

/// Hierarchy store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Path of the SQLite database file.
    pub db_path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            db_path: default_data_dir().join("stride.db"),
        }
    }
}

/// Dispatcher configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Seconds between dispatcher ticks. Windows are minute-granular, so
    /// anything above 60 can skip a target minute.
    pub tick_interval_secs: u64,
    /// Upper bound on subjects processed concurrently within one tick.
    pub max_concurrent_subjects: usize,
    /// Daily reminder window (subject-local time).
    pub daily_reminder: DailyWindowConfig,
    /// Weekly check-in window (subject-local time).
    pub weekly_checkin: WeeklyWindowConfig,
    /// Deferred deletion sweep.
    pub deletion: DeletionConfig,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval_secs: 60,
            max_concurrent_subjects: 16,
            daily_reminder: DailyWindowConfig::default(),
            weekly_checkin: WeeklyWindowConfig::default(),
            deletion: DeletionConfig::default(),
        }
    }
}

/// Exact local hour:minute at which the daily reminder fires.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DailyWindowConfig {
    pub enabled: bool,
    pub hour: u8,
    pub minute: u8,
}

impl Default for DailyWindowConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            hour: 8,
            minute: 0,
        }
    }
}

/// Local ISO weekday plus hour:minute at which the weekly check-in fires.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WeeklyWindowConfig {
    pub enabled: bool,
    /// Weekday name, e.g. `"sunday"` or `"sun"`.
    pub weekday: String,
    pub hour: u8,
    pub minute: u8,
}

impl Default for WeeklyWindowConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            weekday: "sunday".to_owned(),
            hour: 18,
            minute: 0,
        }
    }
}

impl WeeklyWindowConfig {
    /// Parsed weekday. Falls back to Sunday when unparseable; `validate`
    /// rejects such configs up front.
    #[must_use]
    pub fn weekday(&self) -> Weekday {
        self.weekday.trim().parse::<Weekday>().unwrap_or(Weekday::Sun)
    }
}

/// Deferred deletion configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeletionConfig {
    pub enabled: bool,
    /// Delay between a deletion request and its `eta`.
    pub grace_period_hours: u64,
}

impl Default for DeletionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            grace_period_hours: 72,
        }
    }
}

impl DeletionConfig {
    #[must_use]
    pub fn grace_period(&self) -> Duration {
        Duration::from_secs(self.grace_period_hours.saturating_mul(3600))
    }
}

/// Telegram Bot API channel configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    /// Bot API base URL (overridable for tests and self-hosted API servers).
    pub api_base: String,
    /// Bot token. Empty means "read from `STRIDE_TELEGRAM_TOKEN`".
    pub bot_token: String,
    /// Per-request HTTP timeout.
    pub timeout_secs: u64,
    /// Total send attempts, including the first.
    pub max_attempts: u32,
    /// Linear backoff unit for transient failures.
    pub backoff_unit_ms: u64,
    /// Added on top of the provider's retry hint.
    pub rate_limit_margin_ms: u64,
    /// Local outbound throttle.
    pub max_messages_per_minute: u32,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.telegram.org".to_owned(),
            bot_token: String::new(),
            timeout_secs: 15,
            max_attempts: 4,
            backoff_unit_ms: 1000,
            rate_limit_margin_ms: 250,
            max_messages_per_minute: 1200,
        }
    }
}

impl ChannelConfig {
    /// Configured token, or the environment fallback.
    #[must_use]
    pub fn resolved_bot_token(&self) -> Option<String> {
        let token = self.bot_token.trim();
        if !token.is_empty() {
            return Some(token.to_owned());
        }
        std::env::var(BOT_TOKEN_ENV)
            .ok()
            .map(|t| t.trim().to_owned())
            .filter(|t| !t.is_empty())
    }
}

/// Log output configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `tracing_subscriber::EnvFilter` directive; `RUST_LOG` wins when set.
    pub filter: String,
    /// When set, logs are also written to daily-rolling files here.
    pub log_dir: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "stride=info".to_owned(),
            log_dir: None,
        }
    }
}

fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join(".stride")
}

impl StrideConfig {
    /// Load configuration from a TOML file, falling back to defaults for missing fields.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| StrideError::Config(e.to_string()))
    }

    /// Save configuration to a TOML file, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written or the config cannot be serialized.
    pub fn save_to_file(&self, path: &std::path::Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| StrideError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Returns the default config file path: `~/.config/stride/config.toml`.
    pub fn default_config_path() -> PathBuf {
        if let Some(config) = std::env::var_os("XDG_CONFIG_HOME") {
            PathBuf::from(config).join("stride").join("config.toml")
        } else if let Some(dir) = dirs::config_dir() {
            dir.join("stride").join("config.toml")
        } else {
            PathBuf::from("/tmp/stride-config/config.toml")
        }
    }

    /// Reject values the dispatcher cannot honor.
    ///
    /// # Errors
    ///
    /// Returns [`StrideError::Config`] describing the first offending field.
    pub fn validate(&self) -> Result<()> {
        let s = &self.scheduler;
        if s.tick_interval_secs == 0 {
            return Err(StrideError::Config(
                "scheduler.tick_interval_secs must be > 0".to_owned(),
            ));
        }
        if s.max_concurrent_subjects == 0 {
            return Err(StrideError::Config(
                "scheduler.max_concurrent_subjects must be > 0".to_owned(),
            ));
        }
        check_clock("scheduler.daily_reminder", s.daily_reminder.hour, s.daily_reminder.minute)?;
        check_clock("scheduler.weekly_checkin", s.weekly_checkin.hour, s.weekly_checkin.minute)?;
        if s.weekly_checkin.weekday.trim().parse::<Weekday>().is_err() {
            return Err(StrideError::Config(format!(
                "scheduler.weekly_checkin.weekday `{}` is not a weekday",
                s.weekly_checkin.weekday
            )));
        }
        if self.channel.max_attempts == 0 {
            return Err(StrideError::Config(
                "channel.max_attempts must be >= 1".to_owned(),
            ));
        }
        if self.channel.max_messages_per_minute == 0 {
            return Err(StrideError::Config(
                "channel.max_messages_per_minute must be > 0".to_owned(),
            ));
        }
        Ok(())
    }
}

fn check_clock(section: &str, hour: u8, minute: u8) -> Result<()> {
    if hour > 23 || minute > 59 {
        return Err(StrideError::Config(format!(
            "{section}: {hour:02}:{minute:02} is not a valid time of day"
        )));
    }
    Ok(())
}
