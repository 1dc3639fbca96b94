//! Scheduled action kinds and their local-time windows.
//!
//! Windows are evaluated in each subject's own time zone. A window is due
//! only during its exact local minute; the period key names the
//! recurrence window the delivery belongs to.

use chrono::{DateTime, Datelike, TimeZone, Timelike, Utc, Weekday};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::SchedulerConfig;

/// What a scheduled action does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    DailyReminder,
    WeeklyCheckin,
    DeletionSweep,
}

impl ActionKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::DailyReminder => "daily_reminder",
            Self::WeeklyCheckin => "weekly_checkin",
            Self::DeletionSweep => "deletion_sweep",
        }
    }
}

impl std::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// When a recurring action fires, in subject-local time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LocalSchedule {
    /// Every day at `hour:minute`.
    Daily { hour: u8, minute: u8 },
    /// Once per ISO week, on `weekday` at `hour:minute`.
    Weekly { weekday: Weekday, hour: u8, minute: u8 },
}

impl std::fmt::Display for LocalSchedule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Daily { hour, minute } => write!(f, "daily at {hour:02}:{minute:02} local"),
            Self::Weekly {
                weekday,
                hour,
                minute,
            } => write!(f, "{weekday} at {hour:02}:{minute:02} local"),
        }
    }
}

impl LocalSchedule {
    /// Whether `local` falls inside this schedule's minute.
    pub fn is_due_at<T: TimeZone>(&self, local: &DateTime<T>) -> bool {
        let at = |hour: u8, minute: u8| {
            local.hour() == u32::from(hour) && local.minute() == u32::from(minute)
        };
        match *self {
            Self::Daily { hour, minute } => at(hour, minute),
            Self::Weekly {
                weekday,
                hour,
                minute,
            } => local.weekday() == weekday && at(hour, minute),
        }
    }

    /// Recurrence window containing `local`: the local date for daily
    /// schedules, the local ISO week for weekly ones.
    pub fn period_key<T: TimeZone>(&self, local: &DateTime<T>) -> String {
        match self {
            Self::Daily { .. } => local.date_naive().format("%Y-%m-%d").to_string(),
            Self::Weekly { .. } => {
                let week = local.iso_week();
                format!("{}-W{:02}", week.year(), week.week())
            }
        }
    }
}

/// A recurring per-subject action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduledAction {
    pub kind: ActionKind,
    pub schedule: LocalSchedule,
}

impl ScheduledAction {
    /// Enabled recurring actions from config. The deletion sweep is not a
    /// per-subject window and is handled separately.
    #[must_use]
    pub fn from_config(config: &SchedulerConfig) -> Vec<Self> {
        let mut actions = Vec::new();
        if config.daily_reminder.enabled {
            actions.push(Self {
                kind: ActionKind::DailyReminder,
                schedule: LocalSchedule::Daily {
                    hour: config.daily_reminder.hour,
                    minute: config.daily_reminder.minute,
                },
            });
        }
        if config.weekly_checkin.enabled {
            actions.push(Self {
                kind: ActionKind::WeeklyCheckin,
                schedule: LocalSchedule::Weekly {
                    weekday: config.weekly_checkin.weekday(),
                    hour: config.weekly_checkin.hour,
                    minute: config.weekly_checkin.minute,
                },
            });
        }
        actions
    }
}

/// Resolve a stored zone name. Missing or unknown names mean UTC.
#[must_use]
pub fn resolve_timezone(name: Option<&str>) -> Tz {
    let Some(name) = name.map(str::trim).filter(|n| !n.is_empty()) else {
        return Tz::UTC;
    };
    match name.parse::<Tz>() {
        Ok(tz) => tz,
        Err(_) => {
            debug!(timezone = %name, "unknown time zone, using UTC");
            Tz::UTC
        }
    }
}

/// `now` as wall-clock time in the subject's zone.
#[must_use]
pub fn local_time(now: DateTime<Utc>, timezone: Option<&str>) -> DateTime<Tz> {
    now.with_timezone(&resolve_timezone(timezone))
}
