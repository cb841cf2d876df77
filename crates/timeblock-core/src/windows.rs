//! Recurring weekly availability grid.
//!
//! Named windows per weekday during which tasks may be booked. Windows are
//! configuration, owned externally and only read here.

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

use crate::model::Interval;

/// Who may book into a window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum WindowTier {
    /// Open to every priority.
    #[default]
    All,
    /// Reserved for Critical requests.
    CriticalOnly,
}

/// A recurring named interval on a given weekday (0 = Monday .. 6 = Sunday).
///
/// Windows on one weekday need not be disjoint; the search tries them in
/// ascending start order and stops at the first viable one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulingWindow {
    pub name: String,
    pub weekday: u8,
    #[serde(with = "hhmm")]
    pub start: NaiveTime,
    #[serde(with = "hhmm")]
    pub end: NaiveTime,
    #[serde(default)]
    pub tier: WindowTier,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

impl SchedulingWindow {
    /// The window's absolute interval on a concrete date.
    pub fn interval_on(&self, date: NaiveDate) -> Interval {
        Interval::new(
            date.and_time(self.start).and_utc(),
            date.and_time(self.end).and_utc(),
        )
    }
}

/// The configured weekly grid, queried per weekday.
#[derive(Debug, Clone, Default)]
pub struct AvailabilityWindows {
    windows: Vec<SchedulingWindow>,
}

impl AvailabilityWindows {
    pub fn new(windows: Vec<SchedulingWindow>) -> Self {
        Self { windows }
    }

    /// Active windows for a weekday, ordered by start time ascending.
    ///
    /// `critical-only` windows are kept only for Critical requests. An empty
    /// result is valid (no availability that day); callers advance to the
    /// next day.
    pub fn windows_for(&self, weekday: u8, is_critical_request: bool) -> Vec<SchedulingWindow> {
        let mut matched: Vec<SchedulingWindow> = self
            .windows
            .iter()
            .filter(|w| w.active && w.weekday == weekday)
            .filter(|w| match w.tier {
                WindowTier::All => true,
                WindowTier::CriticalOnly => is_critical_request,
            })
            .cloned()
            .collect();
        matched.sort_by_key(|w| w.start);
        matched
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }
}

/// Serde helper for `HH:MM` times in config files.
mod hhmm {
    use chrono::NaiveTime;
    use serde::{self, Deserialize, Deserializer, Serializer};

    const FORMAT: &str = "%H:%M";

    pub fn serialize<S: Serializer>(time: &NaiveTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&time.format(FORMAT).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveTime, D::Error> {
        let s = String::deserialize(deserializer)?;
        NaiveTime::parse_from_str(&s, FORMAT).map_err(serde::de::Error::custom)
    }
}
