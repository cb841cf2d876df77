//! Shared data model for the scheduling engine.
//!
//! Defines the priority ladder, half-open time intervals, managed event
//! records, probe conflicts, and the slot search result. All instants are
//! UTC; a single fixed display timezone is attached only when events are
//! written out to the external calendar.

use chrono::{DateTime, Duration, TimeZone, Timelike, Utc};
use serde::{Deserialize, Serialize};

/// Task priority, strictly ordered: Critical > High > Normal > Low.
///
/// The order is used both for bump eligibility (who may displace whom) and
/// window-tier eligibility (only Critical tasks may use critical-only
/// windows).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Normal,
    High,
    Critical,
}

impl Priority {
    /// Numeric rank, Low = 1 up to Critical = 4.
    pub fn rank(self) -> u8 {
        match self {
            Priority::Low => 1,
            Priority::Normal => 2,
            Priority::High => 3,
            Priority::Critical => 4,
        }
    }

    pub fn is_critical(self) -> bool {
        matches!(self, Priority::Critical)
    }

    /// Critical and High requests may force a slot over bumpable occupants.
    pub fn may_force(self) -> bool {
        matches!(self, Priority::Critical | Priority::High)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Normal => "normal",
            Priority::High => "high",
            Priority::Critical => "critical",
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "low" => Ok(Priority::Low),
            "normal" => Ok(Priority::Normal),
            "high" => Ok(Priority::High),
            "critical" => Ok(Priority::Critical),
            other => Err(format!("unknown priority: {other}")),
        }
    }
}

/// A half-open time interval `[start, end)`.
///
/// This is the single overlap predicate used everywhere in the engine;
/// boundary-touching intervals do not overlap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interval {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl Interval {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    pub fn overlaps(&self, other: &Interval) -> bool {
        self.start < other.end && self.end > other.start
    }

    pub fn duration_minutes(&self) -> i64 {
        (self.end - self.start).num_minutes()
    }
}

/// Round an instant up to the next 30-minute boundary.
///
/// Instants already on a boundary are returned unchanged (with sub-minute
/// precision dropped).
pub fn round_up_half_hour(t: DateTime<Utc>) -> DateTime<Utc> {
    let step = 30 * 60;
    let secs = t.timestamp();
    let rem = secs.rem_euclid(step);
    let rounded = if rem == 0 && t.nanosecond() == 0 {
        secs
    } else {
        secs - rem + step
    };
    Utc.timestamp_opt(rounded, 0).single().unwrap_or(t)
}

/// A calendar entry this engine created and fully owns bookkeeping for.
///
/// Only active records participate in conflict and bump searches. The
/// original interval is captured at creation so a bump can be undone.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManagedEvent {
    pub id: String,
    pub source_task_id: String,
    pub external_event_id: String,
    pub title: String,
    pub scheduled_start: DateTime<Utc>,
    pub scheduled_end: DateTime<Utc>,
    pub priority: Priority,
    pub deadline: Option<DateTime<Utc>>,
    pub original_start: DateTime<Utc>,
    pub original_end: DateTime<Utc>,
    /// Task id of the request that displaced this event, if any.
    pub bumped_by: Option<String>,
    pub bump_count: i32,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

impl ManagedEvent {
    /// Build a fresh record for a just-booked slot. The original interval
    /// equals the scheduled interval until the first bump.
    pub fn new(
        source_task_id: impl Into<String>,
        external_event_id: impl Into<String>,
        title: impl Into<String>,
        slot: Interval,
        priority: Priority,
        deadline: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            source_task_id: source_task_id.into(),
            external_event_id: external_event_id.into(),
            title: title.into(),
            scheduled_start: slot.start,
            scheduled_end: slot.end,
            priority,
            deadline,
            original_start: slot.start,
            original_end: slot.end,
            bumped_by: None,
            bump_count: 0,
            active: true,
            created_at: Utc::now(),
        }
    }

    pub fn scheduled_interval(&self) -> Interval {
        Interval::new(self.scheduled_start, self.scheduled_end)
    }

    pub fn duration_minutes(&self) -> i64 {
        (self.scheduled_end - self.scheduled_start).num_minutes()
    }
}

/// A single busy entry found by the conflict probe. Transient, not persisted.
#[derive(Debug, Clone)]
pub struct Conflict {
    pub external_event_id: String,
    pub title: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    /// Entries from protected calendars may never be bumped or overlapped
    /// outside the forced Critical fallback.
    pub is_protected: bool,
}

impl Conflict {
    pub fn interval(&self) -> Interval {
        Interval::new(self.start, self.end)
    }
}

/// Outcome of a slot search. Transient, not persisted.
#[derive(Debug, Clone, Default)]
pub struct SlotResult {
    pub slot: Option<Interval>,
    pub requires_bumping: bool,
    pub events_to_bump: Vec<ManagedEvent>,
    pub cascade_warning: Option<String>,
    pub double_book_warning: Option<String>,
}

impl SlotResult {
    /// The "no slot before deadline" outcome for non-Critical requests.
    pub fn none() -> Self {
        Self::default()
    }

    pub fn clean(slot: Interval) -> Self {
        Self {
            slot: Some(slot),
            ..Self::default()
        }
    }
}

/// Default deadline applied when a task arrives without one:
/// Critical due today 17:00, High +3 days, Normal +7, Low +14.
pub fn default_deadline(priority: Priority, now: DateTime<Utc>) -> DateTime<Utc> {
    match priority {
        Priority::Critical => now
            .date_naive()
            .and_hms_opt(17, 0, 0)
            .map(|dt| dt.and_utc())
            .unwrap_or(now),
        Priority::High => now + Duration::days(3),
        Priority::Normal => now + Duration::days(7),
        Priority::Low => now + Duration::days(14),
    }
}
