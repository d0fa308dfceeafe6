//! Record normalization
//!
//! Converts raw cursor samples into page-relative points and folds click
//! tags into batch-wide label totals.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::classifier::{ClickLabel, ClickLabelClassifier};
use crate::types::{BehaviorRecord, CursorTrail, NormalizedPoint, SessionMetrics};

/// Document width assumed when a trail has no usable width
pub const DEFAULT_DOCUMENT_WIDTH: f64 = 1920.0;

/// Document height assumed when a trail has no usable height (nominal
/// scroll height of the landing page)
pub const DEFAULT_DOCUMENT_HEIGHT: f64 = 3500.0;

/// Fallback document geometry for trails with missing or broken dimensions
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DocumentDefaults {
    pub width: f64,
    pub height: f64,
}

impl Default for DocumentDefaults {
    fn default() -> Self {
        Self {
            width: DEFAULT_DOCUMENT_WIDTH,
            height: DEFAULT_DOCUMENT_HEIGHT,
        }
    }
}

/// One record after normalization and click classification
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NormalizedRecord {
    pub points: Vec<NormalizedPoint>,
    /// Label → clicks for this record; unclassified tags are dropped
    pub clicks: BTreeMap<ClickLabel, u64>,
    pub dwell_seconds: u64,
    pub created_at: Option<DateTime<Utc>>,
}

impl NormalizedRecord {
    pub fn session(&self) -> SessionMetrics {
        SessionMetrics {
            created_at: self.created_at,
            dwell_seconds: self.dwell_seconds,
        }
    }
}

/// Everything the rest of the pipeline needs from one batch
#[derive(Debug, Clone, Default)]
pub struct NormalizedBatch {
    /// All cursor samples of the batch, page-relative
    pub points: Vec<NormalizedPoint>,
    /// Label → clicks summed over every record
    pub click_totals: BTreeMap<ClickLabel, u64>,
    /// Per-session scalars, one entry per record
    pub sessions: Vec<SessionMetrics>,
}

impl NormalizedBatch {
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// Normalizer for behavior records
#[derive(Debug, Clone, Default)]
pub struct RecordNormalizer {
    defaults: DocumentDefaults,
}

impl RecordNormalizer {
    pub fn new(defaults: DocumentDefaults) -> Self {
        Self { defaults }
    }

    /// Normalize the cursor trail of one record. Records without a usable
    /// trail produce no points.
    pub fn normalize_points(&self, record: &BehaviorRecord) -> Vec<NormalizedPoint> {
        match &record.trail {
            Some(trail) => self.normalize_trail(trail),
            None => Vec::new(),
        }
    }

    /// Normalize raw samples against the capturing document's size
    pub fn normalize_trail(&self, trail: &CursorTrail) -> Vec<NormalizedPoint> {
        let width = usable_dimension(trail.document_width).unwrap_or(self.defaults.width);
        let height = usable_dimension(trail.document_height).unwrap_or(self.defaults.height);

        trail
            .points
            .iter()
            .filter(|(x, y)| x.is_finite() && y.is_finite())
            .map(|&(x, y)| {
                NormalizedPoint::new(
                    (x / width).clamp(0.0, 1.0) as f32,
                    (y / height).clamp(0.0, 1.0) as f32,
                )
            })
            .collect()
    }

    /// Normalize one record: page-relative points plus its classified clicks.
    /// Tags mapping to the same label are summed.
    pub fn normalize(
        &self,
        record: &BehaviorRecord,
        classifier: &ClickLabelClassifier,
    ) -> NormalizedRecord {
        let mut clicks = BTreeMap::new();
        for (tag, count) in record.clicks.iter().flatten() {
            if let Some(label) = classifier.classify(tag) {
                let total: &mut u64 = clicks.entry(label).or_insert(0);
                *total = total.saturating_add(*count);
            }
        }

        NormalizedRecord {
            points: self.normalize_points(record),
            clicks,
            dwell_seconds: record.dwell_seconds,
            created_at: record.created_at,
        }
    }

    /// Normalize a whole batch, summing click labels across all records
    pub fn normalize_batch(
        &self,
        records: &[BehaviorRecord],
        classifier: &ClickLabelClassifier,
    ) -> NormalizedBatch {
        let mut batch = NormalizedBatch {
            sessions: Vec::with_capacity(records.len()),
            ..NormalizedBatch::default()
        };

        for record in records {
            let normalized = self.normalize(record, classifier);
            batch.sessions.push(normalized.session());
            batch.points.extend(normalized.points);
            for (label, count) in normalized.clicks {
                let total = batch.click_totals.entry(label).or_insert(0);
                *total = total.saturating_add(count);
            }
        }

        tracing::debug!(
            records = records.len(),
            points = batch.points.len(),
            labels = batch.click_totals.len(),
            "normalized record batch"
        );
        batch
    }
}

/// A dimension is usable when it is finite and strictly positive
fn usable_dimension(value: Option<f64>) -> Option<f64> {
    value.filter(|v| v.is_finite() && *v > 0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;

    fn trail(w: Option<f64>, h: Option<f64>, points: Vec<(f64, f64)>) -> CursorTrail {
        CursorTrail {
            document_width: w,
            document_height: h,
            points,
        }
    }

    fn record_with(trail: Option<CursorTrail>, clicks: Vec<(&str, u64)>, dwell: u64) -> BehaviorRecord {
        BehaviorRecord {
            dwell_seconds: dwell,
            clicks: Some(clicks.into_iter().map(|(t, c)| (t.to_string(), c)).collect()),
            trail,
            ..BehaviorRecord::default()
        }
    }

    #[test]
    fn test_points_scaled_by_document_size() {
        let normalizer = RecordNormalizer::default();
        let points = normalizer.normalize_trail(&trail(
            Some(1000.0),
            Some(2000.0),
            vec![(500.0, 500.0), (1000.0, 2000.0)],
        ));
        assert_eq!(points, vec![NormalizedPoint::new(0.5, 0.25), NormalizedPoint::new(1.0, 1.0)]);
    }

    #[test]
    fn test_missing_or_zero_dimensions_use_defaults() {
        let normalizer = RecordNormalizer::default();
        let points = normalizer.normalize_trail(&trail(
            Some(0.0),
            None,
            vec![(960.0, 1750.0)],
        ));
        assert_eq!(points, vec![NormalizedPoint::new(0.5, 0.5)]);

        let points = normalizer.normalize_trail(&trail(
            Some(f64::NAN),
            Some(-20.0),
            vec![(1920.0, 3500.0)],
        ));
        assert_eq!(points, vec![NormalizedPoint::new(1.0, 1.0)]);
    }

    #[test]
    fn test_out_of_document_samples_are_clamped() {
        let normalizer = RecordNormalizer::default();
        let points = normalizer.normalize_trail(&trail(
            Some(100.0),
            Some(100.0),
            vec![(-10.0, 250.0)],
        ));
        assert_eq!(points, vec![NormalizedPoint::new(0.0, 1.0)]);
    }

    #[test]
    fn test_non_finite_samples_skipped() {
        let normalizer = RecordNormalizer::default();
        let points = normalizer.normalize_trail(&trail(
            Some(100.0),
            Some(100.0),
            vec![(f64::INFINITY, 1.0), (10.0, 10.0)],
        ));
        assert_eq!(points.len(), 1);
    }

    #[test]
    fn test_custom_defaults() {
        let normalizer = RecordNormalizer::new(DocumentDefaults {
            width: 200.0,
            height: 400.0,
        });
        let points = normalizer.normalize_trail(&trail(None, None, vec![(100.0, 100.0)]));
        assert_eq!(points, vec![NormalizedPoint::new(0.5, 0.25)]);
    }

    #[test]
    fn test_batch_sums_clicks_across_records() {
        let normalizer = RecordNormalizer::default();
        let classifier = ClickLabelClassifier::default();
        let records = vec![
            record_with(None, vec![("Отправить заявку", 2), ("div", 9)], 10),
            record_with(
                Some(trail(Some(10.0), Some(10.0), vec![(5.0, 5.0)])),
                vec![("Отправить заявку", 3), ("input#name", 1)],
                20,
            ),
            BehaviorRecord {
                dwell_seconds: 30,
                ..BehaviorRecord::default()
            },
        ];

        let batch = normalizer.normalize_batch(&records, &classifier);

        assert_eq!(batch.points, vec![NormalizedPoint::new(0.5, 0.5)]);
        assert_eq!(batch.sessions.len(), 3);
        assert_eq!(batch.sessions[2].dwell_seconds, 30);
        assert_eq!(batch.click_totals.len(), 2);
        assert_eq!(batch.click_totals[&ClickLabel::text("Отправить заявку")], 5);
        assert_eq!(batch.click_totals[&ClickLabel::field("Имя")], 1);
    }

    #[test]
    fn test_normalize_single_record() {
        let normalizer = RecordNormalizer::default();
        let classifier = ClickLabelClassifier::default();
        let created_at = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap();
        let record = BehaviorRecord {
            created_at: Some(created_at),
            ..record_with(
                Some(trail(Some(200.0), Some(100.0), vec![(50.0, 50.0), (200.0, 0.0)])),
                vec![("input#name", 2), ("textarea#name", 1), ("Позвонить", 4), ("svg", 7)],
                45,
            )
        };

        let normalized = normalizer.normalize(&record, &classifier);

        assert_eq!(
            normalized.points,
            vec![NormalizedPoint::new(0.25, 0.5), NormalizedPoint::new(1.0, 0.0)]
        );
        assert_eq!(normalized.dwell_seconds, 45);
        assert_eq!(normalized.created_at, Some(created_at));
        assert_eq!(normalized.clicks.len(), 2);
        assert_eq!(normalized.clicks[&ClickLabel::field("Имя")], 3);
        assert_eq!(normalized.clicks[&ClickLabel::text("Позвонить")], 4);
        assert_eq!(normalized.session().dwell_seconds, 45);
    }

    #[test]
    fn test_record_without_trail_keeps_metrics() {
        let normalizer = RecordNormalizer::default();
        let record = record_with(None, vec![("Позвонить", 1)], 12);
        assert!(normalizer.normalize_points(&record).is_empty());

        let batch = normalizer.normalize_batch(&[record], &ClickLabelClassifier::default());
        assert!(batch.is_empty());
        assert_eq!(batch.sessions[0].dwell_seconds, 12);
        assert_eq!(batch.click_totals[&ClickLabel::text("Позвонить")], 1);
    }

    proptest! {
        #[test]
        fn prop_points_always_in_unit_square(
            w in prop::option::of(-100.0f64..5000.0),
            h in prop::option::of(-100.0f64..5000.0),
            samples in prop::collection::vec((-1e6f64..1e6, -1e6f64..1e6), 0..32),
        ) {
            let points = RecordNormalizer::default().normalize_trail(&trail(w, h, samples));
            for p in points {
                prop_assert!((0.0..=1.0).contains(&p.x_pct));
                prop_assert!((0.0..=1.0).contains(&p.y_pct));
            }
        }
    }
}
