//! Temporal aggregation of session metrics
//!
//! Windows are rolling and overlapping: a session created an hour ago counts
//! toward the day, the week and the month at once. Sessions without a
//! timestamp only contribute to the batch-wide totals.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::types::SessionMetrics;

/// Named rolling window, serialized as `{ "name": ..., "seconds": ... }`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub name: String,
    pub seconds: i64,
}

impl TimeWindow {
    pub fn new(name: impl Into<String>, seconds: i64) -> Self {
        Self {
            name: name.into(),
            seconds,
        }
    }

    pub fn day() -> Self {
        Self::new("day", 24 * 60 * 60)
    }

    pub fn week() -> Self {
        Self::new("week", 7 * 24 * 60 * 60)
    }

    pub fn month() -> Self {
        Self::new("month", 30 * 24 * 60 * 60)
    }

    /// Saturates for windows longer than chrono can represent
    pub fn duration(&self) -> Duration {
        Duration::try_seconds(self.seconds).unwrap_or(Duration::MAX)
    }

    /// Inclusive membership: `created_at >= now - duration`
    pub fn contains(&self, created_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        match now.checked_sub_signed(self.duration()) {
            Some(start) => created_at >= start,
            None => true,
        }
    }
}

/// The day/week/month set shown on the dashboard
pub fn default_windows() -> Vec<TimeWindow> {
    vec![TimeWindow::day(), TimeWindow::week(), TimeWindow::month()]
}

/// Aggregates for one window after a pass over the batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowSummary {
    pub name: String,
    pub seconds: i64,
    pub session_count: u64,
    pub dwell_seconds_sum: u64,
    /// `None` when the window holds no sessions
    pub average_dwell_seconds: Option<f64>,
}

impl WindowSummary {
    pub fn has_data(&self) -> bool {
        self.session_count > 0
    }
}

/// Batch-wide and per-window session statistics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemporalSummary {
    pub windows: Vec<WindowSummary>,
    pub total_sessions: u64,
    pub total_dwell_seconds: u64,
    pub max_dwell_seconds: u64,
    pub average_dwell_seconds: Option<f64>,
    /// Sessions that could not be placed in any window
    pub undated_sessions: u64,
}

impl TemporalSummary {
    pub fn window(&self, name: &str) -> Option<&WindowSummary> {
        self.windows.iter().find(|w| w.name == name)
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct RunningTotals {
    session_count: u64,
    dwell_seconds_sum: u64,
}

impl RunningTotals {
    fn add(&mut self, dwell_seconds: u64) {
        self.session_count += 1;
        self.dwell_seconds_sum = self.dwell_seconds_sum.saturating_add(dwell_seconds);
    }

    fn average(&self) -> Option<f64> {
        if self.session_count == 0 {
            None
        } else {
            Some(self.dwell_seconds_sum as f64 / self.session_count as f64)
        }
    }
}

/// Buckets sessions into a configured set of rolling windows
#[derive(Debug, Clone)]
pub struct TemporalAggregator {
    windows: Vec<TimeWindow>,
}

impl Default for TemporalAggregator {
    fn default() -> Self {
        Self::new(default_windows())
    }
}

impl TemporalAggregator {
    pub fn new(windows: Vec<TimeWindow>) -> Self {
        Self { windows }
    }

    pub fn windows(&self) -> &[TimeWindow] {
        &self.windows
    }

    /// One pass over the batch; every window is reset first
    pub fn aggregate(&self, sessions: &[SessionMetrics], now: DateTime<Utc>) -> TemporalSummary {
        let mut per_window = vec![RunningTotals::default(); self.windows.len()];
        let mut totals = RunningTotals::default();
        let mut max_dwell_seconds = 0;
        let mut undated_sessions = 0;

        for session in sessions {
            totals.add(session.dwell_seconds);
            max_dwell_seconds = max_dwell_seconds.max(session.dwell_seconds);

            let Some(created_at) = session.created_at else {
                undated_sessions += 1;
                continue;
            };

            for (window, running) in self.windows.iter().zip(per_window.iter_mut()) {
                if window.contains(created_at, now) {
                    running.add(session.dwell_seconds);
                }
            }
        }

        let windows = self
            .windows
            .iter()
            .zip(per_window)
            .map(|(window, running)| WindowSummary {
                name: window.name.clone(),
                seconds: window.seconds,
                session_count: running.session_count,
                dwell_seconds_sum: running.dwell_seconds_sum,
                average_dwell_seconds: running.average(),
            })
            .collect();

        TemporalSummary {
            windows,
            total_sessions: totals.session_count,
            total_dwell_seconds: totals.dwell_seconds_sum,
            max_dwell_seconds,
            average_dwell_seconds: totals.average(),
            undated_sessions,
        }
    }
}
