//! Conflict probing against the external calendar.
//!
//! Queries every calendar the service knows for busy entries overlapping a
//! candidate slot and classifies each source calendar as protected or
//! ordinary. Reads are fail-open: an unreachable service or a single flaky
//! calendar yields fewer conflicts rather than blocking the search. That
//! trade-off is deliberate and logged.

use chrono::{DateTime, Utc};
use tracing::warn;

use crate::calendar::CalendarService;
use crate::model::{Conflict, Interval};

/// Probes busy intervals for candidate slots.
pub struct ConflictProbe<'a> {
    calendar: &'a dyn CalendarService,
    protected_calendars: &'a [String],
}

impl<'a> ConflictProbe<'a> {
    pub fn new(calendar: &'a dyn CalendarService, protected_calendars: &'a [String]) -> Self {
        Self {
            calendar,
            protected_calendars,
        }
    }

    /// Case-insensitive exact match against the configured protected names.
    fn is_protected(&self, calendar_name: &str) -> bool {
        self.protected_calendars
            .iter()
            .any(|name| name.eq_ignore_ascii_case(calendar_name))
    }

    /// All conflicts overlapping `[start, end)` across every known calendar.
    ///
    /// All-day entries on ordinary calendars are informational noise and
    /// dropped; on protected calendars they are kept as full-day conflicts.
    pub fn conflicts_in(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Vec<Conflict> {
        let probe = Interval::new(start, end);

        let calendars = match self.calendar.list_calendars() {
            Ok(calendars) => calendars,
            Err(e) => {
                warn!(error = %e, "calendar list unavailable, treating slot as conflict-free");
                return Vec::new();
            }
        };

        let mut conflicts = Vec::new();
        for calendar in calendars {
            let protected = self.is_protected(&calendar.name);
            let events = match self.calendar.list_events(&calendar.id, start, end) {
                Ok(events) => events,
                Err(e) => {
                    warn!(calendar = %calendar.name, error = %e, "busy query failed, skipping calendar");
                    continue;
                }
            };

            for event in events {
                if !Interval::new(event.start, event.end).overlaps(&probe) {
                    continue;
                }
                if event.all_day && !protected {
                    continue;
                }
                conflicts.push(Conflict {
                    external_event_id: event.id,
                    title: event.title,
                    start: event.start,
                    end: event.end,
                    is_protected: protected,
                });
            }
        }
        conflicts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calendar::{BusyEvent, CalendarInfo, CreatedEvent, EventDraft};
    use crate::error::CalendarError;
    use chrono::{Duration, TimeZone};

    struct StubCalendar {
        calendars: Vec<CalendarInfo>,
        events: Vec<(String, BusyEvent)>,
        fail_calendar: Option<String>,
        fail_listing: bool,
    }

    impl CalendarService for StubCalendar {
        fn list_calendars(&self) -> Result<Vec<CalendarInfo>, CalendarError> {
            if self.fail_listing {
                return Err(CalendarError::Unavailable("down".into()));
            }
            Ok(self.calendars.clone())
        }

        fn list_events(
            &self,
            calendar_id: &str,
            _from: DateTime<Utc>,
            _to: DateTime<Utc>,
        ) -> Result<Vec<BusyEvent>, CalendarError> {
            if self.fail_calendar.as_deref() == Some(calendar_id) {
                return Err(CalendarError::Api("flaky".into()));
            }
            Ok(self
                .events
                .iter()
                .filter(|(cal, _)| cal == calendar_id)
                .map(|(_, e)| e.clone())
                .collect())
        }

        fn create_event(
            &self,
            _calendar_id: &str,
            _draft: &EventDraft,
        ) -> Result<CreatedEvent, CalendarError> {
            unimplemented!("probe never writes")
        }

        fn patch_event(
            &self,
            _calendar_id: &str,
            _event_id: &str,
            _start: DateTime<Utc>,
            _end: DateTime<Utc>,
        ) -> Result<(), CalendarError> {
            unimplemented!("probe never writes")
        }

        fn get_event(
            &self,
            _calendar_id: &str,
            _event_id: &str,
        ) -> Result<BusyEvent, CalendarError> {
            unimplemented!("probe never reads single events")
        }
    }

    fn cal(id: &str, name: &str) -> CalendarInfo {
        CalendarInfo {
            id: id.to_string(),
            name: name.to_string(),
            primary: id == "primary",
        }
    }

    fn at(h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, h, 0, 0).unwrap()
    }

    fn busy(id: &str, start: DateTime<Utc>, end: DateTime<Utc>, all_day: bool) -> BusyEvent {
        BusyEvent {
            id: id.to_string(),
            title: format!("event {id}"),
            start,
            end,
            all_day,
        }
    }

    #[test]
    fn classifies_protected_calendars_case_insensitively() {
        let stub = StubCalendar {
            calendars: vec![cal("primary", "Work"), cal("fam", "Family")],
            events: vec![
                ("primary".into(), busy("a", at(9), at(10), false)),
                ("fam".into(), busy("b", at(9), at(10), false)),
            ],
            fail_calendar: None,
            fail_listing: false,
        };
        let protected = vec!["family".to_string()];
        let probe = ConflictProbe::new(&stub, &protected);

        let conflicts = probe.conflicts_in(at(9), at(10));
        assert_eq!(conflicts.len(), 2);
        assert!(!conflicts.iter().find(|c| c.external_event_id == "a").unwrap().is_protected);
        assert!(conflicts.iter().find(|c| c.external_event_id == "b").unwrap().is_protected);
    }

    #[test]
    fn all_day_noise_dropped_unless_protected() {
        let day_start = at(0);
        let day_end = day_start + Duration::days(1);
        let stub = StubCalendar {
            calendars: vec![cal("primary", "Work"), cal("fam", "Family")],
            events: vec![
                ("primary".into(), busy("noise", day_start, day_end, true)),
                ("fam".into(), busy("leave", day_start, day_end, true)),
            ],
            fail_calendar: None,
            fail_listing: false,
        };
        let protected = vec!["Family".to_string()];
        let probe = ConflictProbe::new(&stub, &protected);

        let conflicts = probe.conflicts_in(at(9), at(10));
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].external_event_id, "leave");
        assert!(conflicts[0].is_protected);
    }

    #[test]
    fn boundary_touch_is_not_a_conflict() {
        let stub = StubCalendar {
            calendars: vec![cal("primary", "Work")],
            events: vec![("primary".into(), busy("a", at(8), at(9), false))],
            fail_calendar: None,
            fail_listing: false,
        };
        let probe = ConflictProbe::new(&stub, &[]);
        assert!(probe.conflicts_in(at(9), at(10)).is_empty());
    }

    #[test]
    fn unreachable_service_fails_open() {
        let stub = StubCalendar {
            calendars: vec![],
            events: vec![],
            fail_calendar: None,
            fail_listing: true,
        };
        let probe = ConflictProbe::new(&stub, &[]);
        assert!(probe.conflicts_in(at(9), at(10)).is_empty());
    }

    #[test]
    fn flaky_calendar_is_skipped_not_fatal() {
        let stub = StubCalendar {
            calendars: vec![cal("primary", "Work"), cal("flaky", "Side")],
            events: vec![("primary".into(), busy("a", at(9), at(10), false))],
            fail_calendar: Some("flaky".into()),
            fail_listing: false,
        };
        let probe = ConflictProbe::new(&stub, &[]);
        let conflicts = probe.conflicts_in(at(9), at(10));
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].external_event_id, "a");
    }
}
