//! External calendar access.
//!
//! The engine talks to the calendar through the [`CalendarService`] trait so
//! tests can substitute an in-memory fake. The production implementation is
//! the Google Calendar REST client in [`google`].

pub mod google;
pub mod oauth;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CalendarError;

/// A calendar visible to the connected account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalendarInfo {
    pub id: String,
    pub name: String,
    pub primary: bool,
}

/// A busy entry on one calendar.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusyEvent {
    pub id: String,
    pub title: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    /// Date-only entries with no time of day. Informational on ordinary
    /// calendars, occupying on protected ones.
    pub all_day: bool,
}

/// Payload for creating a calendar entry.
#[derive(Debug, Clone)]
pub struct EventDraft {
    pub title: String,
    pub description: Option<String>,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    /// Display timezone attached to the payload; engine arithmetic is UTC.
    pub timezone: String,
}

/// Handle returned for a created entry.
#[derive(Debug, Clone)]
pub struct CreatedEvent {
    pub id: String,
    pub url: Option<String>,
}

/// Blocking calendar operations. One logical request performs these as a
/// sequence of ordered round-trips; nothing here is retried or cached.
pub trait CalendarService: Send + Sync {
    /// All calendars visible to the account, subscribed ones included.
    fn list_calendars(&self) -> Result<Vec<CalendarInfo>, CalendarError>;

    /// Events on one calendar overlapping `[from, to)`.
    fn list_events(
        &self,
        calendar_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<BusyEvent>, CalendarError>;

    /// Create an entry, returning its id and (if available) a link.
    fn create_event(
        &self,
        calendar_id: &str,
        draft: &EventDraft,
    ) -> Result<CreatedEvent, CalendarError>;

    /// Move an existing entry to a new interval.
    fn patch_event(
        &self,
        calendar_id: &str,
        event_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<(), CalendarError>;

    /// Fetch a single entry.
    fn get_event(&self, calendar_id: &str, event_id: &str) -> Result<BusyEvent, CalendarError>;
}

/// Thin wrapper around the OS keyring for credential storage.
pub mod keyring_store {
    const SERVICE: &str = "timeblock";

    pub fn get(key: &str) -> Result<Option<String>, Box<dyn std::error::Error>> {
        let entry = keyring::Entry::new(SERVICE, key)?;
        match entry.get_password() {
            Ok(pw) => Ok(Some(pw)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn set(key: &str, value: &str) -> Result<(), Box<dyn std::error::Error>> {
        let entry = keyring::Entry::new(SERVICE, key)?;
        entry.set_password(value)?;
        Ok(())
    }

    pub fn delete(key: &str) -> Result<(), Box<dyn std::error::Error>> {
        let entry = keyring::Entry::new(SERVICE, key)?;
        match entry.delete_credential() {
            Ok(()) => Ok(()),
            Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
