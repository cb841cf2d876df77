//! Candidate slot enumeration.
//!
//! A pure, restartable sequence of candidate slots over the weekly grid.
//! No I/O happens here; the search engine probes each yielded candidate
//! against the external calendar and stops at the first acceptable one.
//!
//! Forward mode walks day by day from the scan start up to the horizon
//! (deadline capped at thirty days out). Backward mode walks from the day
//! before the deadline back toward now, used when packing sessions against
//! a fixed end date. Candidate starts are aligned to 30-minute boundaries,
//! and exclusion intervals (other sessions of the same task) push a
//! candidate forward inside its window in 30-minute steps.

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, Utc};

use crate::model::{round_up_half_hour, Interval};
use crate::windows::{AvailabilityWindows, SchedulingWindow};

/// How far forward a search may scan past its start.
pub const FORWARD_SCAN_DAYS: i64 = 30;

/// A candidate slot and the window it was derived from.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub slot: Interval,
    pub window_name: String,
}

/// Lazy enumeration of candidate slots. Each window yields at most one
/// candidate per day; a rejected candidate means moving on to the next
/// window or day, never retrying within the same window (only exclusion
/// overlaps shift a candidate inside its window).
pub struct CandidateSlots<'a> {
    grid: &'a AvailabilityWindows,
    duration: Duration,
    critical: bool,
    exclude: Vec<Interval>,
    backward: bool,
    now: DateTime<Utc>,
    scan_start: DateTime<Utc>,
    horizon: DateTime<Utc>,
    floor_day: NaiveDate,
    day: Option<NaiveDate>,
    day_windows: Vec<SchedulingWindow>,
    window_idx: usize,
}

pub(crate) fn weekday_of(date: NaiveDate) -> u8 {
    date.weekday().num_days_from_monday() as u8
}

impl<'a> CandidateSlots<'a> {
    /// Forward scan from `scan_start` up to `min(deadline, scan_start + 30d)`.
    pub fn forward(
        grid: &'a AvailabilityWindows,
        duration_minutes: i64,
        critical: bool,
        scan_start: DateTime<Utc>,
        deadline: DateTime<Utc>,
        exclude: Vec<Interval>,
    ) -> Self {
        let horizon = deadline.min(scan_start + Duration::days(FORWARD_SCAN_DAYS));
        let first_day = scan_start.date_naive();
        let mut slots = Self {
            grid,
            duration: Duration::minutes(duration_minutes),
            critical,
            exclude,
            backward: false,
            now: scan_start,
            scan_start,
            horizon,
            floor_day: first_day,
            day: Some(first_day),
            day_windows: Vec::new(),
            window_idx: 0,
        };
        slots.day_windows = grid.windows_for(weekday_of(first_day), critical);
        slots
    }

    /// Backward scan from the day before `deadline` toward `now`.
    pub fn backward(
        grid: &'a AvailabilityWindows,
        duration_minutes: i64,
        critical: bool,
        now: DateTime<Utc>,
        deadline: DateTime<Utc>,
        exclude: Vec<Interval>,
    ) -> Self {
        let floor_day = now.date_naive();
        let start_day = deadline.date_naive().pred_opt().filter(|d| *d >= floor_day);
        let mut slots = Self {
            grid,
            duration: Duration::minutes(duration_minutes),
            critical,
            exclude,
            backward: true,
            now,
            scan_start: now,
            horizon: deadline,
            floor_day,
            day: start_day,
            day_windows: Vec::new(),
            window_idx: 0,
        };
        if let Some(day) = start_day {
            slots.day_windows = grid.windows_for(weekday_of(day), critical);
        }
        slots
    }

    fn candidate_in_window(&self, window: &SchedulingWindow, day: NaiveDate) -> Option<Candidate> {
        let window_iv = window.interval_on(day);

        let floor = if !self.backward && day == self.scan_start.date_naive() {
            self.scan_start.max(window_iv.start)
        } else {
            window_iv.start
        };

        let mut start = round_up_half_hour(floor);
        let mut slot = Interval::new(start, start + self.duration);

        // Sessions of the same multi-session task must not collide; shift
        // ahead in half-hour steps until clear of the exclusions.
        while self.exclude.iter().any(|x| x.overlaps(&slot)) {
            start += Duration::minutes(30);
            slot = Interval::new(start, start + self.duration);
        }

        if slot.end > window_iv.end {
            return None;
        }
        if start >= self.horizon || start < self.now {
            return None;
        }

        Some(Candidate {
            slot,
            window_name: window.name.clone(),
        })
    }

    fn advance_day(&mut self) -> Option<NaiveDate> {
        let day = self.day?;
        let next = if self.backward {
            if day <= self.floor_day {
                None
            } else {
                day.pred_opt()
            }
        } else {
            let next = day.succ_opt()?;
            let day_start = next.and_time(NaiveTime::MIN).and_utc();
            if day_start > self.horizon {
                None
            } else {
                Some(next)
            }
        };

        self.day = next;
        self.window_idx = 0;
        self.day_windows = match next {
            Some(d) => self.grid.windows_for(weekday_of(d), self.critical),
            None => Vec::new(),
        };
        next
    }
}

impl Iterator for CandidateSlots<'_> {
    type Item = Candidate;

    fn next(&mut self) -> Option<Candidate> {
        loop {
            let day = self.day?;
            while self.window_idx < self.day_windows.len() {
                let window = self.day_windows[self.window_idx].clone();
                self.window_idx += 1;
                if let Some(candidate) = self.candidate_in_window(&window, day) {
                    return Some(candidate);
                }
            }
            self.advance_day()?;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::windows::WindowTier;
    use chrono::TimeZone;

    fn grid(windows: Vec<(&str, u8, (u32, u32), (u32, u32))>) -> AvailabilityWindows {
        AvailabilityWindows::new(
            windows
                .into_iter()
                .map(|(name, weekday, start, end)| SchedulingWindow {
                    name: name.to_string(),
                    weekday,
                    start: NaiveTime::from_hms_opt(start.0, start.1, 0).unwrap(),
                    end: NaiveTime::from_hms_opt(end.0, end.1, 0).unwrap(),
                    tier: WindowTier::All,
                    active: true,
                })
                .collect(),
        )
    }

    // 2026-03-02 is a Monday.
    fn monday(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, h, m, 0).unwrap()
    }

    #[test]
    fn first_candidate_starts_at_window_open() {
        let grid = grid(vec![("mon-am", 0, (9, 0), (12, 0))]);
        let mut slots = CandidateSlots::forward(
            &grid,
            30,
            false,
            monday(7, 0),
            monday(7, 0) + Duration::days(7),
            Vec::new(),
        );
        let first = slots.next().unwrap();
        assert_eq!(first.slot.start, monday(9, 0));
        assert_eq!(first.slot.end, monday(9, 30));
        assert_eq!(first.window_name, "mon-am");
    }

    #[test]
    fn cursor_mid_window_rounds_up() {
        let grid = grid(vec![("mon-am", 0, (9, 0), (12, 0))]);
        let mut slots = CandidateSlots::forward(
            &grid,
            30,
            false,
            monday(9, 40),
            monday(9, 0) + Duration::days(7),
            Vec::new(),
        );
        assert_eq!(slots.next().unwrap().slot.start, monday(10, 0));
    }

    #[test]
    fn exclusions_shift_within_window() {
        let grid = grid(vec![("mon-am", 0, (9, 0), (12, 0))]);
        let exclude = vec![Interval::new(monday(9, 0), monday(10, 0))];
        let mut slots = CandidateSlots::forward(
            &grid,
            30,
            false,
            monday(7, 0),
            monday(7, 0) + Duration::days(7),
            exclude,
        );
        assert_eq!(slots.next().unwrap().slot.start, monday(10, 0));
    }

    #[test]
    fn slot_must_fit_inside_window() {
        // 90 minutes cannot fit a 60-minute window; next week's Monday is
        // beyond the horizon, so the sequence is empty.
        let grid = grid(vec![("mon-short", 0, (9, 0), (10, 0))]);
        let mut slots = CandidateSlots::forward(
            &grid,
            90,
            false,
            monday(7, 0),
            monday(7, 0) + Duration::days(3),
            Vec::new(),
        );
        assert!(slots.next().is_none());
    }

    #[test]
    fn advances_to_next_day_with_windows() {
        let grid = grid(vec![("tue-am", 1, (9, 0), (12, 0))]);
        let mut slots = CandidateSlots::forward(
            &grid,
            30,
            false,
            monday(7, 0),
            monday(7, 0) + Duration::days(7),
            Vec::new(),
        );
        let first = slots.next().unwrap();
        assert_eq!(first.slot.start, monday(9, 0) + Duration::days(1));
    }

    #[test]
    fn candidates_stop_at_horizon() {
        let grid = grid(vec![("mon-am", 0, (9, 0), (12, 0))]);
        // Deadline before the window opens: nothing to yield.
        let mut slots =
            CandidateSlots::forward(&grid, 30, false, monday(7, 0), monday(8, 0), Vec::new());
        assert!(slots.next().is_none());
    }

    #[test]
    fn backward_yields_latest_day_first() {
        let grid = grid(vec![
            ("mon-am", 0, (9, 0), (12, 0)),
            ("tue-am", 1, (9, 0), (12, 0)),
        ]);
        // Deadline Wednesday: backward starts on Tuesday.
        let deadline = monday(12, 0) + Duration::days(2);
        let mut slots = CandidateSlots::backward(&grid, 30, false, monday(7, 0), deadline, Vec::new());
        let first = slots.next().unwrap();
        assert_eq!(first.window_name, "tue-am");
        let second = slots.next().unwrap();
        assert_eq!(second.window_name, "mon-am");
        assert!(slots.next().is_none());
    }

    #[test]
    fn backward_never_yields_before_now() {
        let grid = grid(vec![("mon-am", 0, (9, 0), (12, 0))]);
        let deadline = monday(12, 0) + Duration::days(1);
        // Now is already past the Monday window.
        let mut slots =
            CandidateSlots::backward(&grid, 30, false, monday(13, 0), deadline, Vec::new());
        assert!(slots.next().is_none());
    }
}
