//! Core data types for pageheat
//!
//! These types flow through the pipeline: decoded behavior records come in,
//! normalized points and per-session metrics come out of the normalizer and
//! feed the aggregator and the rasterizer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Fields of a behavior record that are decoded independently
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordField {
    Id,
    CreatedAt,
    DwellSeconds,
    Clicks,
    CursorTrail,
}

impl RecordField {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordField::Id => "id",
            RecordField::CreatedAt => "created_at",
            RecordField::DwellSeconds => "dwell_seconds",
            RecordField::Clicks => "clicks",
            RecordField::CursorTrail => "cursor_trail",
        }
    }
}

/// A single field that could not be decoded.
///
/// The field falls back to its empty value; the rest of the record is
/// still used.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldIssue {
    pub field: RecordField,
    pub reason: String,
}

impl FieldIssue {
    pub fn new(field: RecordField, reason: impl Into<String>) -> Self {
        Self {
            field,
            reason: reason.into(),
        }
    }
}

/// Cursor trail captured by the tracker, in raw pixels of the capturing
/// session's document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CursorTrail {
    /// Document width at capture time (`w`)
    pub document_width: Option<f64>,
    /// Document height at capture time (`h`)
    pub document_height: Option<f64>,
    /// Raw `(x, y)` samples
    pub points: Vec<(f64, f64)>,
}

/// One visitor session as delivered by the record store
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BehaviorRecord {
    /// Position of the record in its input array or NDJSON stream
    #[serde(default)]
    pub index: usize,
    /// Store identifier, if present
    pub id: Option<i64>,
    /// Capture time; records without it are never bucketed into time windows
    pub created_at: Option<DateTime<Utc>>,
    /// Time spent on the page
    pub dwell_seconds: u64,
    /// Raw click tag → click count
    pub clicks: Option<Vec<(String, u64)>>,
    /// Cursor trail, absent when missing or malformed
    pub trail: Option<CursorTrail>,
    /// Per-field decoding problems
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub issues: Vec<FieldIssue>,
}

impl BehaviorRecord {
    /// Whether every field decoded cleanly
    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }
}

/// A cursor sample normalized to page-relative coordinates in `[0, 1]²`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NormalizedPoint {
    pub x_pct: f32,
    pub y_pct: f32,
}

impl NormalizedPoint {
    pub fn new(x_pct: f32, y_pct: f32) -> Self {
        Self { x_pct, y_pct }
    }
}

/// Scalar metrics of one session used for temporal aggregation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionMetrics {
    pub created_at: Option<DateTime<Utc>>,
    pub dwell_seconds: u64,
}

/// Render surface dimensions supplied by the host layout
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Surface {
    pub width: u32,
    pub height: u32,
}

impl Surface {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// A surface with no pixels renders nothing
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn cell_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// `None` when the cell count does not fit in `usize`
    pub fn checked_cell_count(&self) -> Option<usize> {
        (self.width as usize).checked_mul(self.height as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_surface_empty() {
        assert!(Surface::new(0, 100).is_empty());
        assert!(Surface::new(100, 0).is_empty());
        assert!(!Surface::new(1, 1).is_empty());
        assert_eq!(Surface::new(4, 3).cell_count(), 12);
    }

    #[test]
    fn test_checked_cell_count() {
        assert_eq!(Surface::new(4, 3).checked_cell_count(), Some(12));
        assert_eq!(Surface::new(0, 7).checked_cell_count(), Some(0));
        let huge = Surface::new(u32::MAX, u32::MAX);
        let expected = (u32::MAX as usize).checked_mul(u32::MAX as usize);
        assert_eq!(huge.checked_cell_count(), expected);
    }

    #[test]
    fn test_record_field_names() {
        assert_eq!(RecordField::CursorTrail.as_str(), "cursor_trail");
        let json = serde_json::to_string(&RecordField::DwellSeconds).unwrap();
        assert_eq!(json, "\"dwell_seconds\"");
    }
}
