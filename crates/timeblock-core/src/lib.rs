//! # Timeblock Core Library
//!
//! Core scheduling engine for the timeblock task-triage dashboard. It books
//! tasks into recurring availability windows on an external calendar,
//! displacing lower-eligibility bookings when a higher-eligibility request
//! needs the slot. The CLI binary is a thin layer over this library.
//!
//! ## Architecture
//!
//! - **Windows**: the configured weekly availability grid
//! - **Search**: candidate enumeration plus conflict/occupant triage
//! - **Bump**: plan-then-commit relocation cascades with undo
//! - **Storage**: SQLite managed event records and TOML configuration
//! - **Calendar**: Google Calendar REST client behind a service trait
//!
//! ## Key Components
//!
//! - [`SlotSearchEngine`]: finds the first workable slot for a request
//! - [`BumpCoordinator`]: relocates displaced bookings and undoes bumps
//! - [`ScheduleCommitter`]: end-to-end booking of one task
//! - [`CalendarService`]: trait the engine talks to calendars through

pub mod booking;
pub mod bump;
pub mod calendar;
pub mod candidates;
pub mod error;
pub mod model;
pub mod probe;
pub mod search;
pub mod storage;
pub mod store;
pub mod windows;

#[cfg(test)]
pub(crate) mod testutil;

pub use booking::{BookingConfirmation, ScheduleCommitter, TaskBooking};
pub use bump::{BumpCoordinator, BumpReport};
pub use calendar::{BusyEvent, CalendarInfo, CalendarService, CreatedEvent, EventDraft};
pub use error::{CalendarError, ConfigError, CoreError, DatabaseError, ValidationError};
pub use model::{default_deadline, Conflict, Interval, ManagedEvent, Priority, SlotResult};
pub use probe::ConflictProbe;
pub use search::{SlotRequest, SlotSearchEngine};
pub use storage::{Config, ManagedEventDb};
pub use store::{InMemoryManagedEventStore, ManagedEventStore};
pub use windows::{AvailabilityWindows, SchedulingWindow, WindowTier};
