//! TOML-based application configuration.
//!
//! Stores the target calendar, display timezone, protected calendar names,
//! the weekly availability grid, and the default session length.
//!
//! Configuration is stored at `~/.config/timeblock/config.toml`.

use std::path::PathBuf;

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};

use super::data_dir;
use crate::error::ConfigError;
use crate::windows::{AvailabilityWindows, SchedulingWindow, WindowTier};

/// Application configuration.
///
/// Serialized to/from TOML at `~/.config/timeblock/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Calendar that receives the events this engine creates.
    #[serde(default = "default_calendar_id")]
    pub calendar_id: String,
    /// Display timezone attached to created events. Engine arithmetic
    /// stays in UTC.
    #[serde(default = "default_timezone")]
    pub timezone: String,
    /// Calendar names whose entries may never be bumped or overlapped.
    #[serde(default)]
    pub protected_calendars: Vec<String>,
    #[serde(default = "default_duration_minutes")]
    pub default_duration_minutes: i64,
    /// The weekly availability grid.
    #[serde(default = "default_windows", rename = "window")]
    pub windows: Vec<SchedulingWindow>,
}

fn default_calendar_id() -> String {
    "primary".to_string()
}

fn default_timezone() -> String {
    "Australia/Melbourne".to_string()
}

fn default_duration_minutes() -> i64 {
    30
}

fn default_windows() -> Vec<SchedulingWindow> {
    let mut windows = Vec::new();
    // Weekday evenings, any priority.
    for weekday in 0..5u8 {
        windows.push(SchedulingWindow {
            name: format!("evening-{weekday}"),
            weekday,
            start: NaiveTime::from_hms_opt(19, 0, 0).unwrap_or(NaiveTime::MIN),
            end: NaiveTime::from_hms_opt(21, 30, 0).unwrap_or(NaiveTime::MIN),
            tier: WindowTier::All,
            active: true,
        });
        // Weekday lunch break, reserved for Critical work.
        windows.push(SchedulingWindow {
            name: format!("lunch-{weekday}"),
            weekday,
            start: NaiveTime::from_hms_opt(12, 30, 0).unwrap_or(NaiveTime::MIN),
            end: NaiveTime::from_hms_opt(13, 0, 0).unwrap_or(NaiveTime::MIN),
            tier: WindowTier::CriticalOnly,
            active: true,
        });
    }
    // Weekend mornings.
    for weekday in 5..7u8 {
        windows.push(SchedulingWindow {
            name: format!("morning-{weekday}"),
            weekday,
            start: NaiveTime::from_hms_opt(9, 0, 0).unwrap_or(NaiveTime::MIN),
            end: NaiveTime::from_hms_opt(12, 0, 0).unwrap_or(NaiveTime::MIN),
            tier: WindowTier::All,
            active: true,
        });
    }
    windows
}

impl Default for Config {
    fn default() -> Self {
        Self {
            calendar_id: default_calendar_id(),
            timezone: default_timezone(),
            protected_calendars: Vec::new(),
            default_duration_minutes: default_duration_minutes(),
            windows: default_windows(),
        }
    }
}

impl Config {
    fn path() -> Result<PathBuf, ConfigError> {
        Ok(data_dir()?.join("config.toml"))
    }

    /// Load from disk; a missing file writes and returns the default.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::path()?;
        match std::fs::read_to_string(&path) {
            Ok(content) => {
                toml::from_str(&content).map_err(|e| ConfigError::ParseFailed(e.to_string()))
            }
            Err(_) => {
                let cfg = Self::default();
                cfg.save()?;
                Ok(cfg)
            }
        }
    }

    /// Load from disk, returning the default on any error.
    pub fn load_or_default() -> Self {
        Self::load().unwrap_or_default()
    }

    /// Persist to disk.
    pub fn save(&self) -> Result<(), ConfigError> {
        let path = Self::path()?;
        let content =
            toml::to_string_pretty(self).map_err(|e| ConfigError::ParseFailed(e.to_string()))?;
        std::fs::write(&path, content).map_err(|e| ConfigError::SaveFailed {
            path,
            message: e.to_string(),
        })
    }

    pub fn availability(&self) -> AvailabilityWindows {
        AvailabilityWindows::new(self.windows.clone())
    }
}
