//! Booking a task into the calendar.
//!
//! The committer runs the whole pipeline for one task: pick a deadline if
//! none was given, search for a slot, run the bump cascade when the slot is
//! occupied, create the calendar entry, and record the managed event. The
//! calendar entry is only created after every planned relocation has been
//! committed, so the winning slot is actually free by the time it is taken.

use chrono::{DateTime, Utc};
use tracing::info;

use crate::bump::BumpCoordinator;
use crate::calendar::{CalendarService, EventDraft};
use crate::error::CoreError;
use crate::model::{default_deadline, ManagedEvent, Priority};
use crate::search::{SlotRequest, SlotSearchEngine};
use crate::store::ManagedEventStore;
use crate::windows::AvailabilityWindows;

/// A task to place on the calendar.
#[derive(Debug, Clone)]
pub struct TaskBooking {
    pub task_id: String,
    pub title: String,
    /// Life domain the task belongs to, shown as a title prefix.
    pub domain: String,
    pub duration_minutes: i64,
    pub priority: Priority,
    pub deadline: Option<DateTime<Utc>>,
}

/// Everything a caller needs to show after a successful booking.
#[derive(Debug, Clone)]
pub struct BookingConfirmation {
    pub managed_event_id: String,
    pub event_id: String,
    pub event_url: Option<String>,
    pub scheduled_start: DateTime<Utc>,
    pub scheduled_end: DateTime<Utc>,
    /// Managed event ids relocated to make room.
    pub bumped: Vec<String>,
    /// Managed event ids that could not be relocated and stayed put.
    pub stranded: Vec<String>,
    pub cascade_warning: Option<String>,
    pub double_book_warning: Option<String>,
}

/// Runs search, cascade, and calendar writes for one booking.
pub struct ScheduleCommitter<'a> {
    windows: &'a AvailabilityWindows,
    calendar: &'a dyn CalendarService,
    store: &'a dyn ManagedEventStore,
    protected_calendars: &'a [String],
    calendar_id: &'a str,
    timezone: &'a str,
    now: DateTime<Utc>,
}

impl<'a> ScheduleCommitter<'a> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        windows: &'a AvailabilityWindows,
        calendar: &'a dyn CalendarService,
        store: &'a dyn ManagedEventStore,
        protected_calendars: &'a [String],
        calendar_id: &'a str,
        timezone: &'a str,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            windows,
            calendar,
            store,
            protected_calendars,
            calendar_id,
            timezone,
            now,
        }
    }

    /// Book one task. `Ok(None)` means no slot exists before the deadline
    /// (never the case for Critical, which falls back to double-booking).
    pub fn schedule_task(
        &self,
        booking: &TaskBooking,
    ) -> Result<Option<BookingConfirmation>, CoreError> {
        let deadline = booking
            .deadline
            .unwrap_or_else(|| default_deadline(booking.priority, self.now));

        let engine = SlotSearchEngine::new(
            self.windows,
            self.calendar,
            self.store,
            self.protected_calendars,
            self.now,
        );
        let req = SlotRequest::new(booking.duration_minutes, booking.priority, deadline);
        let result = engine.find_slot(&req)?;

        let Some(slot) = result.slot else {
            info!(task = %booking.task_id, deadline = %deadline, "no slot before deadline");
            return Ok(None);
        };

        let mut bumped = Vec::new();
        let mut stranded = Vec::new();
        if result.requires_bumping {
            let coordinator = BumpCoordinator::new(
                self.windows,
                self.calendar,
                self.store,
                self.protected_calendars,
                self.calendar_id,
                self.now,
            );
            let report =
                coordinator.relocate_all(&result.events_to_bump, &booking.task_id, slot)?;
            bumped = report.moved;
            stranded = report.stranded;
        }
        // The search only sees direct victims; nested cascades can displace
        // more, so the warning counts what actually moved.
        let cascade_warning =
            (bumped.len() > 1).then(|| format!("scheduling bumped {} existing tasks", bumped.len()));

        let draft = EventDraft {
            title: format!("[{}] {}", booking.domain, booking.title),
            description: Some(format!(
                "Task: {}\nDomain: {}\nPriority: {}\n\nScheduled by timeblock",
                booking.task_id, booking.domain, booking.priority
            )),
            start: slot.start,
            end: slot.end,
            timezone: self.timezone.to_string(),
        };
        let created = self.calendar.create_event(self.calendar_id, &draft)?;

        let record = ManagedEvent::new(
            booking.task_id.clone(),
            created.id.clone(),
            draft.title.clone(),
            slot,
            booking.priority,
            Some(deadline),
        );
        self.store.insert(&record)?;
        info!(
            task = %booking.task_id,
            start = %slot.start,
            bumped = bumped.len(),
            "task scheduled"
        );

        Ok(Some(BookingConfirmation {
            managed_event_id: record.id,
            event_id: created.id,
            event_url: created.url,
            scheduled_start: slot.start,
            scheduled_end: slot.end,
            bumped,
            stranded,
            cascade_warning,
            double_book_warning: result.double_book_warning,
        }))
    }

    /// Drop all managed records for a task after its calendar entries were
    /// removed elsewhere. Returns how many records were deactivated.
    pub fn clear_task(&self, task_id: &str) -> Result<usize, CoreError> {
        let cleared = self.store.deactivate_for_task(task_id)?;
        if cleared > 0 {
            info!(task = %task_id, cleared, "deactivated managed records");
        }
        Ok(cleared)
    }
}
