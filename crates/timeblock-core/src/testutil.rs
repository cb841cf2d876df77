//! In-memory calendar fake shared by the engine unit tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use chrono::{DateTime, Utc};

use crate::calendar::{BusyEvent, CalendarInfo, CalendarService, CreatedEvent, EventDraft};
use crate::error::CalendarError;

/// Fake calendar service. Created events become visible to later probes,
/// and patches are applied in place, so multi-step scenarios behave like a
/// real backend.
pub struct FakeCalendar {
    calendars: Mutex<Vec<CalendarInfo>>,
    events: Mutex<Vec<(String, BusyEvent)>>,
    counter: AtomicUsize,
}

impl FakeCalendar {
    /// A fake with a single primary calendar named "Tasks".
    pub fn with_primary() -> Self {
        let fake = Self {
            calendars: Mutex::new(Vec::new()),
            events: Mutex::new(Vec::new()),
            counter: AtomicUsize::new(0),
        };
        fake.add_calendar("primary", "Tasks", true);
        fake
    }

    pub fn add_calendar(&self, id: &str, name: &str, primary: bool) {
        self.calendars.lock().unwrap().push(CalendarInfo {
            id: id.to_string(),
            name: name.to_string(),
            primary,
        });
    }

    pub fn add_event(
        &self,
        calendar_id: &str,
        event_id: &str,
        title: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        all_day: bool,
    ) {
        self.events.lock().unwrap().push((
            calendar_id.to_string(),
            BusyEvent {
                id: event_id.to_string(),
                title: title.to_string(),
                start,
                end,
                all_day,
            },
        ));
    }

    pub fn event_interval(&self, event_id: &str) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .find(|(_, e)| e.id == event_id)
            .map(|(_, e)| (e.start, e.end))
    }

}

impl CalendarService for FakeCalendar {
    fn list_calendars(&self) -> Result<Vec<CalendarInfo>, CalendarError> {
        Ok(self.calendars.lock().unwrap().clone())
    }

    fn list_events(
        &self,
        calendar_id: &str,
        _from: DateTime<Utc>,
        _to: DateTime<Utc>,
    ) -> Result<Vec<BusyEvent>, CalendarError> {
        Ok(self
            .events
            .lock()
            .unwrap()
            .iter()
            .filter(|(cal, _)| cal == calendar_id)
            .map(|(_, e)| e.clone())
            .collect())
    }

    fn create_event(
        &self,
        calendar_id: &str,
        draft: &EventDraft,
    ) -> Result<CreatedEvent, CalendarError> {
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        let id = format!("fake-{n}");
        self.events.lock().unwrap().push((
            calendar_id.to_string(),
            BusyEvent {
                id: id.clone(),
                title: draft.title.clone(),
                start: draft.start,
                end: draft.end,
                all_day: false,
            },
        ));
        Ok(CreatedEvent {
            url: Some(format!("https://calendar.example/{id}")),
            id,
        })
    }

    fn patch_event(
        &self,
        _calendar_id: &str,
        event_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<(), CalendarError> {
        let mut events = self.events.lock().unwrap();
        let entry = events
            .iter_mut()
            .find(|(_, e)| e.id == event_id)
            .ok_or_else(|| CalendarError::Api(format!("no event {event_id}")))?;
        entry.1.start = start;
        entry.1.end = end;
        Ok(())
    }

    fn get_event(&self, _calendar_id: &str, event_id: &str) -> Result<BusyEvent, CalendarError> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .find(|(_, e)| e.id == event_id)
            .map(|(_, e)| e.clone())
            .ok_or_else(|| CalendarError::Api(format!("no event {event_id}")))
    }
}
