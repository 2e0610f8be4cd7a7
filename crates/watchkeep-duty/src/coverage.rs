//! Coverage analysis over generated shifts.
//!
//! Answers two questions operators ask of a preview: when is nobody on
//! duty, and when are two shifts on duty at once. Windows are treated as
//! half-open; touching windows merge.

use chrono::NaiveDateTime;
use serde::Serialize;

use crate::manager::DutyShift;
use crate::worktime::WorkWindow;

/// Merge overlapping or touching windows into a sorted, disjoint list.
#[must_use]
pub fn merge_windows(windows: &[WorkWindow]) -> Vec<WorkWindow> {
    let mut sorted = windows.to_vec();
    sorted.sort_unstable();

    let mut merged: Vec<WorkWindow> = Vec::with_capacity(sorted.len());
    for window in sorted {
        match merged.last_mut() {
            Some(last) if window.start <= last.end => last.end = last.end.max(window.end),
            _ => merged.push(window),
        }
    }
    merged
}

/// Gaps and double-booked stretches inside `[from, to)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CoverageReport {
    pub from: NaiveDateTime,
    pub to: NaiveDateTime,
    pub covered: Vec<WorkWindow>,
    pub gaps: Vec<WorkWindow>,
    pub overlaps: Vec<WorkWindow>,
}

impl CoverageReport {
    #[must_use]
    pub fn is_fully_covered(&self) -> bool {
        self.gaps.is_empty()
    }
}

/// Analyse `shifts` over `[from, to)`.
#[must_use]
pub fn analyze(shifts: &[DutyShift], from: NaiveDateTime, to: NaiveDateTime) -> CoverageReport {
    let clip = |window: &WorkWindow| -> Option<WorkWindow> {
        let start = window.start.max(from);
        let end = window.end.min(to);
        (start < end).then_some(WorkWindow { start, end })
    };

    // Each shift's own windows are merged first so a shift never overlaps
    // itself.
    let per_shift: Vec<Vec<WorkWindow>> = shifts
        .iter()
        .map(|shift| {
            let clipped: Vec<WorkWindow> = shift.work_times.iter().filter_map(clip).collect();
            merge_windows(&clipped)
        })
        .collect();

    let all: Vec<WorkWindow> = per_shift.iter().flatten().copied().collect();
    let covered = merge_windows(&all);

    let mut gaps = Vec::new();
    let mut cursor = from;
    for window in &covered {
        if window.start > cursor {
            gaps.push(WorkWindow {
                start: cursor,
                end: window.start,
            });
        }
        cursor = cursor.max(window.end);
    }
    if cursor < to {
        gaps.push(WorkWindow { start: cursor, end: to });
    }

    // Sweep: +1 at each start, -1 at each end; ends sort before starts at
    // the same instant so touching windows do not count as overlap.
    let mut events: Vec<(NaiveDateTime, i32)> = all
        .iter()
        .flat_map(|w| [(w.start, 1), (w.end, -1)])
        .collect();
    events.sort_unstable();

    let mut overlaps = Vec::new();
    let mut depth = 0;
    let mut opened: Option<NaiveDateTime> = None;
    for (instant, delta) in events {
        depth += delta;
        match (depth >= 2, opened) {
            (true, None) => opened = Some(instant),
            (false, Some(start)) => {
                if start < instant {
                    overlaps.push(WorkWindow { start, end: instant });
                }
                opened = None;
            }
            _ => {}
        }
    }

    CoverageReport {
        from,
        to,
        covered,
        gaps,
        overlaps: merge_windows(&overlaps),
    }
}
