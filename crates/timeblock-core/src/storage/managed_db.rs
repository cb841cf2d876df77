//! SQLite-backed managed event store.

use std::path::Path;
use std::str::FromStr;
use std::sync::Mutex;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use super::{data_dir, migrations};
use crate::error::{ConfigError, DatabaseError};
use crate::model::{ManagedEvent, Priority};
use crate::store::ManagedEventStore;

/// Format an instant for storage. Second precision, `Z` suffix, so SQL
/// string comparison equals chronological comparison.
fn format_instant(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn parse_instant(s: &str) -> Result<DateTime<Utc>, DatabaseError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| DatabaseError::QueryFailed(format!("bad stored instant '{s}': {e}")))
}

fn row_to_managed_event(row: &rusqlite::Row) -> Result<ManagedEvent, rusqlite::Error> {
    let to_sql_err = |e: DatabaseError| {
        rusqlite::Error::FromSqlConversionFailure(
            0,
            rusqlite::types::Type::Text,
            Box::new(std::io::Error::other(e.to_string())),
        )
    };

    let scheduled_start: String = row.get(4)?;
    let scheduled_end: String = row.get(5)?;
    let priority_str: String = row.get(6)?;
    let deadline: Option<String> = row.get(7)?;
    let original_start: String = row.get(8)?;
    let original_end: String = row.get(9)?;
    let created_at: String = row.get(13)?;

    Ok(ManagedEvent {
        id: row.get(0)?,
        source_task_id: row.get(1)?,
        external_event_id: row.get(2)?,
        title: row.get(3)?,
        scheduled_start: parse_instant(&scheduled_start).map_err(to_sql_err)?,
        scheduled_end: parse_instant(&scheduled_end).map_err(to_sql_err)?,
        priority: Priority::from_str(&priority_str).unwrap_or(Priority::Normal),
        deadline: deadline
            .map(|s| parse_instant(&s))
            .transpose()
            .map_err(to_sql_err)?,
        original_start: parse_instant(&original_start).map_err(to_sql_err)?,
        original_end: parse_instant(&original_end).map_err(to_sql_err)?,
        bumped_by: row.get(10)?,
        bump_count: row.get(11)?,
        active: row.get(12)?,
        created_at: parse_instant(&created_at).map_err(to_sql_err)?,
    })
}

const SELECT_COLUMNS: &str = "id, source_task_id, external_event_id, title, \
     scheduled_start, scheduled_end, priority, deadline, \
     original_start, original_end, bumped_by, bump_count, active, created_at";

/// SQLite database for managed event records.
pub struct ManagedEventDb {
    conn: Mutex<Connection>,
}

impl ManagedEventDb {
    /// Open (creating if needed) the database at the default location,
    /// `~/.config/timeblock/timeblock.db`.
    pub fn open_default() -> Result<Self, DatabaseError> {
        let dir = data_dir().map_err(|e: ConfigError| DatabaseError::OpenFailed {
            path: "~/.config/timeblock".into(),
            source: rusqlite::Error::InvalidPath(e.to_string().into()),
        })?;
        Self::open(dir.join("timeblock.db"))
    }

    /// Open (creating if needed) a database at an explicit path and run
    /// migrations.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, DatabaseError> {
        let path = path.as_ref();
        let conn = Connection::open(path).map_err(|source| DatabaseError::OpenFailed {
            path: path.to_path_buf(),
            source,
        })?;
        migrations::migrate(&conn)
            .map_err(|e| DatabaseError::MigrationFailed(e.to_string()))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn with_conn<T>(
        &self,
        f: impl FnOnce(&Connection) -> Result<T, DatabaseError>,
    ) -> Result<T, DatabaseError> {
        let conn = self.conn.lock().map_err(|_| DatabaseError::Locked)?;
        f(&conn)
    }
}

impl ManagedEventStore for ManagedEventDb {
    fn insert(&self, event: &ManagedEvent) -> Result<(), DatabaseError> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO managed_events (
                    id, source_task_id, external_event_id, title,
                    scheduled_start, scheduled_end, priority, deadline,
                    original_start, original_end, bumped_by, bump_count,
                    active, created_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
                params![
                    event.id,
                    event.source_task_id,
                    event.external_event_id,
                    event.title,
                    format_instant(event.scheduled_start),
                    format_instant(event.scheduled_end),
                    event.priority.as_str(),
                    event.deadline.map(format_instant),
                    format_instant(event.original_start),
                    format_instant(event.original_end),
                    event.bumped_by,
                    event.bump_count,
                    event.active,
                    format_instant(event.created_at),
                ],
            )?;
            Ok(())
        })
    }

    fn get(&self, id: &str) -> Result<Option<ManagedEvent>, DatabaseError> {
        self.with_conn(|conn| {
            let event = conn
                .query_row(
                    &format!("SELECT {SELECT_COLUMNS} FROM managed_events WHERE id = ?1"),
                    params![id],
                    row_to_managed_event,
                )
                .optional()?;
            Ok(event)
        })
    }

    fn list_active(&self) -> Result<Vec<ManagedEvent>, DatabaseError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {SELECT_COLUMNS} FROM managed_events
                 WHERE active = 1 ORDER BY scheduled_start"
            ))?;
            let events = stmt
                .query_map([], row_to_managed_event)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(events)
        })
    }

    fn active_overlapping(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<ManagedEvent>, DatabaseError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {SELECT_COLUMNS} FROM managed_events
                 WHERE active = 1 AND scheduled_start < ?2 AND scheduled_end > ?1
                 ORDER BY scheduled_start"
            ))?;
            let events = stmt
                .query_map(
                    params![format_instant(start), format_instant(end)],
                    row_to_managed_event,
                )?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(events)
        })
    }

    fn relocate(
        &self,
        id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        bumped_by: &str,
    ) -> Result<(), DatabaseError> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE managed_events
                 SET scheduled_start = ?2, scheduled_end = ?3,
                     bump_count = bump_count + 1, bumped_by = ?4
                 WHERE id = ?1",
                params![id, format_instant(start), format_instant(end), bumped_by],
            )?;
            if changed == 0 {
                return Err(DatabaseError::QueryFailed(format!("no managed event {id}")));
            }
            Ok(())
        })
    }

    fn restore_original(&self, id: &str) -> Result<(), DatabaseError> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE managed_events
                 SET scheduled_start = original_start, scheduled_end = original_end,
                     bumped_by = NULL, bump_count = MAX(bump_count - 1, 0)
                 WHERE id = ?1",
                params![id],
            )?;
            if changed == 0 {
                return Err(DatabaseError::QueryFailed(format!("no managed event {id}")));
            }
            Ok(())
        })
    }

    fn deactivate_for_task(&self, task_id: &str) -> Result<usize, DatabaseError> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE managed_events SET active = 0
                 WHERE source_task_id = ?1 AND active = 1",
                params![task_id],
            )?;
            Ok(changed)
        })
    }
}
