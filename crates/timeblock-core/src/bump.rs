//! Bump cascade planning and execution.
//!
//! When a slot search decides existing managed events must move, this module
//! finds every victim a new home first, then writes all moves out. Nested
//! displacements (a relocated victim landing on another bumpable event) are
//! resolved during planning, so by the time the calendar is touched the full
//! set of moves is known. A victim with nowhere to go is stranded: logged and
//! reported, never a hard failure.

use std::collections::{HashSet, VecDeque};

use chrono::{DateTime, Duration, Utc};
use tracing::{info, warn};

use crate::calendar::CalendarService;
use crate::error::CoreError;
use crate::model::{Interval, ManagedEvent};
use crate::search::{SlotRequest, SlotSearchEngine};
use crate::store::ManagedEventStore;
use crate::windows::AvailabilityWindows;

/// Relocation searches look this far ahead for a victim's new slot,
/// regardless of the victim's original deadline.
const RELOCATION_SCAN_DAYS: i64 = 14;

/// One planned relocation, resolved before anything is written.
#[derive(Debug, Clone)]
struct PlannedMove {
    event: ManagedEvent,
    target: Interval,
    bumped_by: String,
}

/// What a cascade actually did.
#[derive(Debug, Clone, Default)]
pub struct BumpReport {
    /// Managed event ids that were relocated, in commit order.
    pub moved: Vec<String>,
    /// Managed event ids left in place because no slot could be found.
    pub stranded: Vec<String>,
}

/// Plans and commits bump cascades, and undoes single bumps.
pub struct BumpCoordinator<'a> {
    windows: &'a AvailabilityWindows,
    calendar: &'a dyn CalendarService,
    store: &'a dyn ManagedEventStore,
    protected_calendars: &'a [String],
    calendar_id: &'a str,
    now: DateTime<Utc>,
}

impl<'a> BumpCoordinator<'a> {
    pub fn new(
        windows: &'a AvailabilityWindows,
        calendar: &'a dyn CalendarService,
        store: &'a dyn ManagedEventStore,
        protected_calendars: &'a [String],
        calendar_id: &'a str,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            windows,
            calendar,
            store,
            protected_calendars,
            calendar_id,
            now,
        }
    }

    /// Relocate `victims` out of `winning_slot`, claimed by
    /// `requester_task_id`, cascading through any further managed events the
    /// relocations themselves displace.
    ///
    /// Planning finishes before any write happens. Commit writes are applied
    /// one victim at a time, calendar first, record second, so a partial
    /// failure leaves each already-committed victim fully consistent.
    pub fn relocate_all(
        &self,
        victims: &[ManagedEvent],
        requester_task_id: &str,
        winning_slot: Interval,
    ) -> Result<BumpReport, CoreError> {
        let mut report = BumpReport::default();
        let mut planned: Vec<PlannedMove> = Vec::new();
        // Slots already spoken for: the requester's slot plus every target
        // chosen so far. Relocations must steer clear of all of them.
        let mut reserved = vec![winning_slot];
        let mut visited: HashSet<String> = HashSet::new();

        let mut queue: VecDeque<(ManagedEvent, String)> = victims
            .iter()
            .cloned()
            .map(|v| (v, requester_task_id.to_string()))
            .collect();

        while let Some((victim, cause_task)) = queue.pop_front() {
            if !visited.insert(victim.id.clone()) {
                continue;
            }

            match self.plan_move(&victim, &reserved)? {
                Some((target, displaced)) => {
                    // A relocated victim may itself land on bumpable events;
                    // they join the cascade with the victim's task as cause.
                    for next in displaced {
                        if next.id == victim.id || visited.contains(&next.id) {
                            continue;
                        }
                        queue.push_back((next, victim.source_task_id.clone()));
                    }
                    reserved.push(target);
                    planned.push(PlannedMove {
                        event: victim,
                        target,
                        bumped_by: cause_task,
                    });
                }
                None => {
                    warn!(
                        managed_event = %victim.id,
                        task = %victim.source_task_id,
                        "no relocation slot found, leaving event in place"
                    );
                    report.stranded.push(victim.id.clone());
                }
            }
        }

        for mv in planned {
            self.calendar.patch_event(
                self.calendar_id,
                &mv.event.external_event_id,
                mv.target.start,
                mv.target.end,
            )?;
            self.store
                .relocate(&mv.event.id, mv.target.start, mv.target.end, &mv.bumped_by)?;
            info!(
                managed_event = %mv.event.id,
                start = %mv.target.start,
                bumped_by = %mv.bumped_by,
                "relocated managed event"
            );
            report.moved.push(mv.event.id);
        }

        Ok(report)
    }

    /// Find a new interval for one victim, honoring its own priority and
    /// deadline, ignoring its own calendar entry, and avoiding every
    /// already-reserved interval. Returns the target plus any further
    /// managed events that target displaces.
    fn plan_move(
        &self,
        victim: &ManagedEvent,
        reserved: &[Interval],
    ) -> Result<Option<(Interval, Vec<ManagedEvent>)>, CoreError> {
        let engine = SlotSearchEngine::new(
            self.windows,
            self.calendar,
            self.store,
            self.protected_calendars,
            self.now,
        );
        // The victim's own deadline may be exactly why it lost the slot;
        // relocation always scans the full extended horizon instead.
        let deadline = self.now + Duration::days(RELOCATION_SCAN_DAYS);
        let mut req = SlotRequest::new(victim.duration_minutes(), victim.priority, deadline);
        req.exclude = reserved.to_vec();
        req.ignore_event_ids = vec![victim.external_event_id.clone()];

        let result = engine.find_slot(&req)?;
        // A forced double-booked fallback is no home for a relocation.
        if result.double_book_warning.is_some() {
            return Ok(None);
        }
        Ok(result.slot.map(|slot| (slot, result.events_to_bump)))
    }

    /// Put a bumped event back in its original slot. Returns `Ok(false)`
    /// when the id is unknown or the event was never bumped.
    pub fn undo_bump(&self, managed_event_id: &str) -> Result<bool, CoreError> {
        let Some(event) = self.store.get(managed_event_id)? else {
            return Ok(false);
        };
        if event.bump_count == 0 {
            return Ok(false);
        }

        self.calendar.patch_event(
            self.calendar_id,
            &event.external_event_id,
            event.original_start,
            event.original_end,
        )?;
        self.store.restore_original(&event.id)?;
        info!(managed_event = %event.id, "restored original slot");
        Ok(true)
    }
}
