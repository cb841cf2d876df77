//! Managed event repository.
//!
//! Records the engine owns for events it booked. The trait is injected into
//! the search and bump components so tests (and the simulator-style CLI dry
//! runs) can run against [`InMemoryManagedEventStore`] while production uses
//! the SQLite store in [`crate::storage`].

use std::sync::Mutex;

use chrono::{DateTime, Utc};

use crate::error::DatabaseError;
use crate::model::{Interval, ManagedEvent};

/// Read/write access to the engine's own scheduling records.
///
/// Only this engine writes these records; the UI layer reads them for
/// display. Filters on the active flag happen inside the store.
pub trait ManagedEventStore: Send + Sync {
    fn insert(&self, event: &ManagedEvent) -> Result<(), DatabaseError>;

    fn get(&self, id: &str) -> Result<Option<ManagedEvent>, DatabaseError>;

    fn list_active(&self) -> Result<Vec<ManagedEvent>, DatabaseError>;

    /// Active records whose scheduled interval overlaps `[start, end)`.
    fn active_overlapping(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<ManagedEvent>, DatabaseError>;

    /// Move a record to a new interval after a bump: updates the scheduled
    /// interval, increments bump_count, records the displacing task.
    fn relocate(
        &self,
        id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        bumped_by: &str,
    ) -> Result<(), DatabaseError>;

    /// Undo a bump: scheduled interval back to the original, bumped_by
    /// cleared, bump_count decremented with a floor of zero.
    fn restore_original(&self, id: &str) -> Result<(), DatabaseError>;

    /// Deactivate all records for a task whose calendar data was cleared.
    /// Returns the number of records touched.
    fn deactivate_for_task(&self, task_id: &str) -> Result<usize, DatabaseError>;
}

/// In-memory store backed by a mutex-guarded vector.
#[derive(Debug, Default)]
pub struct InMemoryManagedEventStore {
    events: Mutex<Vec<ManagedEvent>>,
}

impl InMemoryManagedEventStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ManagedEventStore for InMemoryManagedEventStore {
    fn insert(&self, event: &ManagedEvent) -> Result<(), DatabaseError> {
        let mut events = self.events.lock().map_err(|_| DatabaseError::Locked)?;
        events.push(event.clone());
        Ok(())
    }

    fn get(&self, id: &str) -> Result<Option<ManagedEvent>, DatabaseError> {
        let events = self.events.lock().map_err(|_| DatabaseError::Locked)?;
        Ok(events.iter().find(|e| e.id == id).cloned())
    }

    fn list_active(&self) -> Result<Vec<ManagedEvent>, DatabaseError> {
        let events = self.events.lock().map_err(|_| DatabaseError::Locked)?;
        Ok(events.iter().filter(|e| e.active).cloned().collect())
    }

    fn active_overlapping(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<ManagedEvent>, DatabaseError> {
        let probe = Interval::new(start, end);
        let events = self.events.lock().map_err(|_| DatabaseError::Locked)?;
        Ok(events
            .iter()
            .filter(|e| e.active && e.scheduled_interval().overlaps(&probe))
            .cloned()
            .collect())
    }

    fn relocate(
        &self,
        id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        bumped_by: &str,
    ) -> Result<(), DatabaseError> {
        let mut events = self.events.lock().map_err(|_| DatabaseError::Locked)?;
        let event = events
            .iter_mut()
            .find(|e| e.id == id)
            .ok_or_else(|| DatabaseError::QueryFailed(format!("no managed event {id}")))?;
        event.scheduled_start = start;
        event.scheduled_end = end;
        event.bump_count += 1;
        event.bumped_by = Some(bumped_by.to_string());
        Ok(())
    }

    fn restore_original(&self, id: &str) -> Result<(), DatabaseError> {
        let mut events = self.events.lock().map_err(|_| DatabaseError::Locked)?;
        let event = events
            .iter_mut()
            .find(|e| e.id == id)
            .ok_or_else(|| DatabaseError::QueryFailed(format!("no managed event {id}")))?;
        event.scheduled_start = event.original_start;
        event.scheduled_end = event.original_end;
        event.bumped_by = None;
        event.bump_count = (event.bump_count - 1).max(0);
        Ok(())
    }

    fn deactivate_for_task(&self, task_id: &str) -> Result<usize, DatabaseError> {
        let mut events = self.events.lock().map_err(|_| DatabaseError::Locked)?;
        let mut touched = 0;
        for event in events.iter_mut().filter(|e| e.source_task_id == task_id) {
            if event.active {
                event.active = false;
                touched += 1;
            }
        }
        Ok(touched)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Priority;
    use chrono::TimeZone;

    fn at(h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, h, 0, 0).unwrap()
    }

    fn sample(task: &str, start: DateTime<Utc>, end: DateTime<Utc>) -> ManagedEvent {
        ManagedEvent::new(
            task,
            format!("ext-{task}"),
            "sample",
            Interval::new(start, end),
            Priority::Normal,
            None,
        )
    }

    #[test]
    fn overlap_query_is_half_open() {
        let store = InMemoryManagedEventStore::new();
        store.insert(&sample("a", at(9), at(10))).unwrap();

        assert_eq!(store.active_overlapping(at(10), at(11)).unwrap().len(), 0);
        assert_eq!(store.active_overlapping(at(9), at(10)).unwrap().len(), 1);
    }

    #[test]
    fn relocate_and_restore_round_trip() {
        let store = InMemoryManagedEventStore::new();
        let event = sample("a", at(9), at(10));
        store.insert(&event).unwrap();

        store.relocate(&event.id, at(14), at(15), "task-b").unwrap();
        let moved = store.get(&event.id).unwrap().unwrap();
        assert_eq!(moved.scheduled_start, at(14));
        assert_eq!(moved.bump_count, 1);
        assert_eq!(moved.bumped_by.as_deref(), Some("task-b"));

        store.restore_original(&event.id).unwrap();
        let restored = store.get(&event.id).unwrap().unwrap();
        assert_eq!(restored.scheduled_start, at(9));
        assert_eq!(restored.bump_count, 0);
        assert!(restored.bumped_by.is_none());
    }

    #[test]
    fn deactivated_records_leave_queries() {
        let store = InMemoryManagedEventStore::new();
        store.insert(&sample("a", at(9), at(10))).unwrap();
        store.insert(&sample("a", at(11), at(12))).unwrap();

        assert_eq!(store.deactivate_for_task("a").unwrap(), 2);
        assert!(store.list_active().unwrap().is_empty());
        assert!(store.active_overlapping(at(9), at(12)).unwrap().is_empty());
        // Second clear is a no-op.
        assert_eq!(store.deactivate_for_task("a").unwrap(), 0);
    }
}
