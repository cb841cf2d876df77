//! Slot search.
//!
//! Enumerates candidate slots over the availability grid and decides, per
//! candidate, whether the request can take it: clean, by bumping
//! lower-eligibility managed occupants, or not at all. The first acceptable
//! candidate wins; the search never looks for a globally optimal placement.

use chrono::{DateTime, Duration, Utc};
use tracing::debug;

use crate::calendar::CalendarService;
use crate::candidates::{weekday_of, CandidateSlots};
use crate::error::CoreError;
use crate::model::{round_up_half_hour, Interval, ManagedEvent, Priority, SlotResult};
use crate::probe::ConflictProbe;
use crate::store::ManagedEventStore;
use crate::windows::AvailabilityWindows;

/// How far the forced Critical fallback scans for a window start.
pub const FORCED_SCAN_DAYS: i64 = 14;

/// One slot search invocation.
#[derive(Debug, Clone)]
pub struct SlotRequest {
    pub duration_minutes: i64,
    pub priority: Priority,
    pub deadline: DateTime<Utc>,
    /// Earliest acceptable start; clamped to now.
    pub search_start: Option<DateTime<Utc>>,
    /// Intervals this request must stay clear of (sibling sessions of a
    /// multi-session task, slots already promised to other relocations).
    pub exclude: Vec<Interval>,
    /// External event ids invisible to this search. Used during victim
    /// relocation so an event does not conflict with its own old entry.
    pub ignore_event_ids: Vec<String>,
    /// Scan from the day before the deadline back toward now instead of
    /// forward from now.
    pub backward: bool,
}

impl SlotRequest {
    pub fn new(duration_minutes: i64, priority: Priority, deadline: DateTime<Utc>) -> Self {
        Self {
            duration_minutes,
            priority,
            deadline,
            search_start: None,
            exclude: Vec::new(),
            ignore_event_ids: Vec::new(),
            backward: false,
        }
    }
}

/// Whether an occupant may be displaced for this request.
///
/// Critical occupants are immovable. Otherwise a strictly lower priority
/// loses its slot, and "deadline is king": an occupant due strictly later
/// than the requester may be bumped even at equal or higher priority.
fn bump_eligible(occupant: &ManagedEvent, req: &SlotRequest) -> bool {
    if occupant.priority.is_critical() {
        return false;
    }
    if occupant.priority < req.priority {
        return true;
    }
    matches!(occupant.deadline, Some(due) if due > req.deadline)
}

/// The core search over windows, conflicts, and managed occupants.
pub struct SlotSearchEngine<'a> {
    windows: &'a AvailabilityWindows,
    calendar: &'a dyn CalendarService,
    store: &'a dyn ManagedEventStore,
    protected_calendars: &'a [String],
    now: DateTime<Utc>,
}

impl<'a> SlotSearchEngine<'a> {
    pub fn new(
        windows: &'a AvailabilityWindows,
        calendar: &'a dyn CalendarService,
        store: &'a dyn ManagedEventStore,
        protected_calendars: &'a [String],
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            windows,
            calendar,
            store,
            protected_calendars,
            now,
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.now
    }

    /// Find the first workable slot for the request.
    ///
    /// Returns `slot: None` when nothing fits before the deadline, except
    /// for Critical requests, which fall through to a forced overlapping
    /// booking flagged with `double_book_warning`.
    pub fn find_slot(&self, req: &SlotRequest) -> Result<SlotResult, CoreError> {
        let probe = ConflictProbe::new(self.calendar, self.protected_calendars);
        let critical = req.priority.is_critical();

        let candidates = if req.backward {
            CandidateSlots::backward(
                self.windows,
                req.duration_minutes,
                critical,
                self.now,
                req.deadline,
                req.exclude.clone(),
            )
        } else {
            let scan_start = self.now.max(req.search_start.unwrap_or(self.now));
            CandidateSlots::forward(
                self.windows,
                req.duration_minutes,
                critical,
                scan_start,
                req.deadline,
                req.exclude.clone(),
            )
        };

        for candidate in candidates {
            let slot = candidate.slot;
            let conflicts: Vec<_> = probe
                .conflicts_in(slot.start, slot.end)
                .into_iter()
                .filter(|c| !req.ignore_event_ids.contains(&c.external_event_id))
                .collect();

            if conflicts.is_empty() {
                debug!(window = %candidate.window_name, start = %slot.start, "clean slot");
                return Ok(SlotResult::clean(slot));
            }

            let protected_count = conflicts.iter().filter(|c| c.is_protected).count();
            let open_count = conflicts.len() - protected_count;

            let occupants: Vec<ManagedEvent> = self
                .store
                .active_overlapping(slot.start, slot.end)?
                .into_iter()
                .filter(|e| !req.ignore_event_ids.contains(&e.external_event_id))
                .collect();
            let critical_occupied = occupants.iter().any(|e| e.priority.is_critical());
            let victims: Vec<ManagedEvent> = occupants
                .into_iter()
                .filter(|e| bump_eligible(e, req))
                .collect();

            // Protected entries can be neither bumped nor overlapped here,
            // and Critical occupants are immovable for everyone.
            let acceptable = if req.priority.may_force() {
                protected_count == 0 && !critical_occupied
            } else {
                protected_count == 0 && !critical_occupied && victims.len() == open_count
            };

            if !acceptable {
                debug!(
                    window = %candidate.window_name,
                    start = %slot.start,
                    protected = protected_count,
                    open = open_count,
                    victims = victims.len(),
                    "candidate rejected"
                );
                continue;
            }

            let cascade_warning = (victims.len() > 1)
                .then(|| format!("scheduling will bump {} existing tasks", victims.len()));
            return Ok(SlotResult {
                slot: Some(slot),
                requires_bumping: !victims.is_empty(),
                events_to_bump: victims,
                cascade_warning,
                double_book_warning: None,
            });
        }

        if critical {
            return Ok(self.forced_slot(req));
        }
        Ok(SlotResult::none())
    }

    /// Last resort for Critical work: take the first window start at or
    /// after now within two weeks, ignoring conflicts entirely.
    fn forced_slot(&self, req: &SlotRequest) -> SlotResult {
        let duration = Duration::minutes(req.duration_minutes);
        let warning =
            "no conflict-free slot before the deadline; booked over existing events".to_string();

        let mut day = self.now.date_naive();
        for _ in 0..FORCED_SCAN_DAYS {
            for window in self.windows.windows_for(weekday_of(day), true) {
                let iv = window.interval_on(day);
                if iv.start < self.now {
                    continue;
                }
                if iv.start + duration > iv.end {
                    continue;
                }
                return SlotResult {
                    slot: Some(Interval::new(iv.start, iv.start + duration)),
                    double_book_warning: Some(warning),
                    ..SlotResult::default()
                };
            }
            day = match day.succ_opt() {
                Some(d) => d,
                None => break,
            };
        }

        // No window fits the duration at all; book from the next half-hour
        // boundary so Critical work still lands somewhere.
        let start = round_up_half_hour(self.now);
        SlotResult {
            slot: Some(Interval::new(start, start + duration)),
            double_book_warning: Some(warning),
            ..SlotResult::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryManagedEventStore;
    use crate::testutil::FakeCalendar;
    use crate::windows::{SchedulingWindow, WindowTier};
    use chrono::{NaiveTime, TimeZone};

    // 2026-03-02 is a Monday.
    fn monday(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, h, m, 0).unwrap()
    }

    fn window(name: &str, weekday: u8, start: (u32, u32), end: (u32, u32)) -> SchedulingWindow {
        SchedulingWindow {
            name: name.to_string(),
            weekday,
            start: NaiveTime::from_hms_opt(start.0, start.1, 0).unwrap(),
            end: NaiveTime::from_hms_opt(end.0, end.1, 0).unwrap(),
            tier: WindowTier::All,
            active: true,
        }
    }

    fn occupant(
        task: &str,
        priority: Priority,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        deadline: Option<DateTime<Utc>>,
    ) -> ManagedEvent {
        ManagedEvent::new(
            task,
            format!("ext-{task}"),
            format!("task {task}"),
            Interval::new(start, end),
            priority,
            deadline,
        )
    }

    struct Fixture {
        windows: AvailabilityWindows,
        calendar: FakeCalendar,
        store: InMemoryManagedEventStore,
        protected: Vec<String>,
    }

    impl Fixture {
        fn new(windows: Vec<SchedulingWindow>) -> Self {
            Self {
                windows: AvailabilityWindows::new(windows),
                calendar: FakeCalendar::with_primary(),
                store: InMemoryManagedEventStore::new(),
                protected: Vec::new(),
            }
        }

        fn engine(&self, now: DateTime<Utc>) -> SlotSearchEngine<'_> {
            SlotSearchEngine::new(&self.windows, &self.calendar, &self.store, &self.protected, now)
        }

        fn book(&self, event: &ManagedEvent) {
            self.store.insert(event).unwrap();
            self.calendar.add_event(
                "primary",
                &event.external_event_id,
                &event.title,
                event.scheduled_start,
                event.scheduled_end,
                false,
            );
        }
    }

    #[test]
    fn empty_calendar_yields_first_window_slot() {
        let fx = Fixture::new(vec![window("mon-am", 0, (9, 0), (10, 0))]);
        let engine = fx.engine(monday(7, 0));
        let req = SlotRequest::new(30, Priority::Normal, monday(12, 0) + Duration::days(7));

        let result = engine.find_slot(&req).unwrap();
        let slot = result.slot.unwrap();
        assert_eq!(slot.start, monday(9, 0));
        assert_eq!(slot.end, monday(9, 30));
        assert!(!result.requires_bumping);
    }

    #[test]
    fn high_request_bumps_normal_occupant() {
        let fx = Fixture::new(vec![window("mon-am", 0, (9, 0), (10, 0))]);
        let victim = occupant("victim", Priority::Normal, monday(9, 0), monday(10, 0), None);
        fx.book(&victim);

        let engine = fx.engine(monday(7, 0));
        let req = SlotRequest::new(30, Priority::High, monday(12, 0) + Duration::days(7));

        let result = engine.find_slot(&req).unwrap();
        assert_eq!(result.slot.unwrap().start, monday(9, 0));
        assert!(result.requires_bumping);
        assert_eq!(result.events_to_bump.len(), 1);
        assert_eq!(result.events_to_bump[0].id, victim.id);
    }

    #[test]
    fn critical_occupant_is_immovable_even_for_critical() {
        let fx = Fixture::new(vec![
            window("mon-am", 0, (9, 0), (10, 0)),
            window("tue-am", 1, (9, 0), (10, 0)),
        ]);
        fx.book(&occupant(
            "anchor",
            Priority::Critical,
            monday(9, 0),
            monday(10, 0),
            None,
        ));

        let engine = fx.engine(monday(7, 0));
        let req = SlotRequest::new(30, Priority::Critical, monday(12, 0) + Duration::days(7));

        let result = engine.find_slot(&req).unwrap();
        // Monday is blocked by the Critical occupant; Tuesday wins.
        assert_eq!(result.slot.unwrap().start, monday(9, 0) + Duration::days(1));
        assert!(!result.requires_bumping);
    }

    #[test]
    fn deadline_is_king_between_equal_priorities() {
        let fx = Fixture::new(vec![window("mon-am", 0, (9, 0), (10, 0))]);
        let far_deadline = monday(12, 0) + Duration::days(10);
        fx.book(&occupant(
            "later",
            Priority::Normal,
            monday(9, 0),
            monday(10, 0),
            Some(far_deadline),
        ));

        let engine = fx.engine(monday(7, 0));
        let req = SlotRequest::new(30, Priority::Normal, monday(12, 0) + Duration::days(2));

        let result = engine.find_slot(&req).unwrap();
        assert!(result.requires_bumping);
        assert_eq!(result.events_to_bump.len(), 1);
    }

    #[test]
    fn equal_deadlines_do_not_bump() {
        let fx = Fixture::new(vec![window("mon-am", 0, (9, 0), (10, 0))]);
        let deadline = monday(12, 0) + Duration::days(2);
        fx.book(&occupant(
            "peer",
            Priority::Normal,
            monday(9, 0),
            monday(10, 0),
            Some(deadline),
        ));

        let engine = fx.engine(monday(7, 0));
        let req = SlotRequest::new(60, Priority::Normal, deadline);

        let result = engine.find_slot(&req).unwrap();
        assert!(result.slot.is_none());
    }

    #[test]
    fn normal_cannot_take_slot_with_unmanaged_conflict() {
        let fx = Fixture::new(vec![window("mon-am", 0, (9, 0), (10, 0))]);
        // External meeting the engine does not manage.
        fx.calendar
            .add_event("primary", "mtg", "standup", monday(9, 0), monday(10, 0), false);

        let engine = fx.engine(monday(7, 0));
        let req = SlotRequest::new(60, Priority::Normal, monday(12, 0));

        let result = engine.find_slot(&req).unwrap();
        assert!(result.slot.is_none());
    }

    #[test]
    fn protected_conflict_blocks_forcing() {
        let fx = {
            let mut fx = Fixture::new(vec![
                window("mon-am", 0, (9, 0), (10, 0)),
                window("tue-am", 1, (9, 0), (10, 0)),
            ]);
            fx.protected = vec!["Family".to_string()];
            fx
        };
        fx.calendar.add_calendar("fam", "Family", false);
        fx.calendar
            .add_event("fam", "pickup", "school pickup", monday(9, 0), monday(10, 0), false);

        let engine = fx.engine(monday(7, 0));
        let req = SlotRequest::new(30, Priority::High, monday(12, 0) + Duration::days(7));

        let result = engine.find_slot(&req).unwrap();
        assert_eq!(result.slot.unwrap().start, monday(9, 0) + Duration::days(1));
        assert!(result.events_to_bump.is_empty());
    }

    #[test]
    fn critical_falls_back_to_forced_double_booking() {
        let fx = Fixture::new(vec![window("mon-am", 0, (9, 0), (10, 0))]);
        fx.book(&occupant(
            "anchor",
            Priority::Critical,
            monday(9, 0),
            monday(10, 0),
            None,
        ));

        let engine = fx.engine(monday(7, 0));
        // Deadline today: no other window is reachable in time.
        let req = SlotRequest::new(30, Priority::Critical, monday(12, 0));

        let result = engine.find_slot(&req).unwrap();
        assert!(result.slot.is_some());
        assert!(result.double_book_warning.is_some());
        assert!(!result.requires_bumping);
    }

    #[test]
    fn normal_request_gets_plain_failure() {
        let fx = Fixture::new(vec![window("mon-am", 0, (9, 0), (10, 0))]);
        fx.book(&occupant(
            "anchor",
            Priority::Critical,
            monday(9, 0),
            monday(10, 0),
            None,
        ));

        let engine = fx.engine(monday(7, 0));
        let req = SlotRequest::new(30, Priority::Normal, monday(12, 0));

        let result = engine.find_slot(&req).unwrap();
        assert!(result.slot.is_none());
        assert!(!result.requires_bumping);
        assert!(result.double_book_warning.is_none());
    }

    #[test]
    fn backward_search_lands_latest_slot_before_deadline() {
        let fx = Fixture::new(vec![
            window("mon-am", 0, (9, 0), (12, 0)),
            window("tue-am", 1, (9, 0), (12, 0)),
        ]);
        let engine = fx.engine(monday(7, 0));
        // Deadline Wednesday: the Tuesday window wins over Monday's.
        let mut req = SlotRequest::new(60, Priority::Normal, monday(12, 0) + Duration::days(2));
        req.backward = true;

        let result = engine.find_slot(&req).unwrap();
        let slot = result.slot.unwrap();
        assert_eq!(slot.start, monday(9, 0) + Duration::days(1));
        assert_eq!(slot.end, monday(10, 0) + Duration::days(1));
        assert!(!result.requires_bumping);
    }

    #[test]
    fn backward_search_falls_back_past_conflicted_day() {
        let fx = Fixture::new(vec![
            window("mon-am", 0, (9, 0), (12, 0)),
            window("tue-am", 1, (9, 0), (12, 0)),
        ]);
        // Unmanaged meeting fills Tuesday's candidate; Normal cannot take it.
        fx.calendar.add_event(
            "primary",
            "mtg",
            "offsite",
            monday(9, 0) + Duration::days(1),
            monday(12, 0) + Duration::days(1),
            false,
        );

        let engine = fx.engine(monday(7, 0));
        let mut req = SlotRequest::new(60, Priority::Normal, monday(12, 0) + Duration::days(2));
        req.backward = true;

        let result = engine.find_slot(&req).unwrap();
        assert_eq!(result.slot.unwrap().start, monday(9, 0));
        assert!(!result.requires_bumping);
    }

    #[test]
    fn backward_search_bumps_occupant_on_latest_day() {
        let fx = Fixture::new(vec![
            window("mon-am", 0, (9, 0), (12, 0)),
            window("tue-am", 1, (9, 0), (12, 0)),
        ]);
        let victim = occupant(
            "victim",
            Priority::Low,
            monday(9, 0) + Duration::days(1),
            monday(10, 0) + Duration::days(1),
            None,
        );
        fx.book(&victim);

        let engine = fx.engine(monday(7, 0));
        let mut req = SlotRequest::new(60, Priority::High, monday(12, 0) + Duration::days(2));
        req.backward = true;

        let result = engine.find_slot(&req).unwrap();
        // High keeps the latest day by displacing the Low occupant.
        assert_eq!(result.slot.unwrap().start, monday(9, 0) + Duration::days(1));
        assert!(result.requires_bumping);
        assert_eq!(result.events_to_bump[0].id, victim.id);
    }

    #[test]
    fn cascade_warning_names_victim_count() {
        let fx = Fixture::new(vec![window("mon-am", 0, (9, 0), (11, 0))]);
        fx.book(&occupant("a", Priority::Low, monday(9, 0), monday(10, 0), None));
        fx.book(&occupant("b", Priority::Low, monday(10, 0), monday(11, 0), None));

        let engine = fx.engine(monday(7, 0));
        let req = SlotRequest::new(120, Priority::High, monday(12, 0) + Duration::days(7));

        let result = engine.find_slot(&req).unwrap();
        assert!(result.requires_bumping);
        assert_eq!(result.events_to_bump.len(), 2);
        assert!(result.cascade_warning.as_deref().unwrap().contains('2'));
    }
}
