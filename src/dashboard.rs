//! Dashboard encoding
//!
//! Turns temporal aggregates and click totals into the value set shown next
//! to the heatmap: session and point counts, dwell statistics with human
//! formatting, rolling-window cards and the ranked click list.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::aggregator::TemporalSummary;
use crate::classifier::ClickLabel;
use crate::error::HeatmapError;
use crate::{PAGEHEAT_VERSION, PRODUCER_NAME};

/// Default length of the ranked click list
pub const DEFAULT_TOP_CLICKS: usize = 8;

/// Unit words for duration text: `45 сек`, `2 мин 5 сек`, `1 ч 3 мин`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DurationUnits {
    pub seconds: String,
    pub minutes: String,
    pub hours: String,
}

impl Default for DurationUnits {
    fn default() -> Self {
        Self {
            seconds: "сек".to_string(),
            minutes: "мин".to_string(),
            hours: "ч".to_string(),
        }
    }
}

impl DurationUnits {
    /// Seconds below a minute, minutes and seconds below an hour, then
    /// hours and minutes
    pub fn format(&self, seconds: u64) -> String {
        if seconds < 60 {
            return format!("{} {}", seconds, self.seconds);
        }
        let minutes = seconds / 60;
        if minutes < 60 {
            return format!("{} {} {} {}", minutes, self.minutes, seconds % 60, self.seconds);
        }
        format!("{} {} {} {}", minutes / 60, self.hours, minutes % 60, self.minutes)
    }

    /// Averages are rounded to whole seconds
    pub fn format_average(&self, seconds: f64) -> String {
        self.format(seconds.max(0.0).round() as u64)
    }
}

/// Producer metadata embedded in every dashboard
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardProducer {
    pub name: String,
    pub version: String,
    pub instance_id: String,
}

/// Dwell statistics over the whole batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DwellSummary {
    pub total_seconds: u64,
    pub average_seconds: Option<f64>,
    pub max_seconds: u64,
    pub total_text: String,
    pub average_text: Option<String>,
    pub max_text: String,
}

/// One rolling-window card
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowCard {
    pub name: String,
    pub session_count: u64,
    pub average_dwell_seconds: Option<f64>,
    /// `None` renders as "no data"
    pub average_dwell_text: Option<String>,
}

/// A ranked click label
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClickCount {
    pub label: String,
    pub count: u64,
}

/// Record-level decoding health
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputQuality {
    pub rejected_records: usize,
    pub records_with_issues: usize,
}

/// Everything the dashboard shows
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardSummary {
    pub producer: DashboardProducer,
    pub computed_at: String,
    /// `false` when the batch holds no usable cursor points
    pub has_data: bool,
    pub total_sessions: u64,
    pub total_points: usize,
    pub dwell: DwellSummary,
    pub windows: Vec<WindowCard>,
    pub top_clicks: Vec<ClickCount>,
    pub quality: InputQuality,
}

impl DashboardSummary {
    pub fn window(&self, name: &str) -> Option<&WindowCard> {
        self.windows.iter().find(|w| w.name == name)
    }
}

/// Dashboard encoder
pub struct DashboardEncoder {
    instance_id: String,
    top_clicks: usize,
    units: DurationUnits,
}

impl Default for DashboardEncoder {
    fn default() -> Self {
        Self::new(DEFAULT_TOP_CLICKS)
    }
}

impl DashboardEncoder {
    /// Create an encoder with a unique instance ID
    pub fn new(top_clicks: usize) -> Self {
        Self::with_instance_id(Uuid::new_v4().to_string(), top_clicks)
    }

    /// Create an encoder with a specific instance ID
    pub fn with_instance_id(instance_id: String, top_clicks: usize) -> Self {
        Self {
            instance_id,
            top_clicks,
            units: DurationUnits::default(),
        }
    }

    pub fn with_units(mut self, units: DurationUnits) -> Self {
        self.units = units;
        self
    }

    pub fn units(&self) -> &DurationUnits {
        &self.units
    }

    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    pub fn top_clicks(&self) -> usize {
        self.top_clicks
    }

    pub fn encode(
        &self,
        temporal: &TemporalSummary,
        click_totals: &BTreeMap<ClickLabel, u64>,
        total_points: usize,
        quality: InputQuality,
        computed_at: DateTime<Utc>,
    ) -> DashboardSummary {
        let dwell = DwellSummary {
            total_seconds: temporal.total_dwell_seconds,
            average_seconds: temporal.average_dwell_seconds,
            max_seconds: temporal.max_dwell_seconds,
            total_text: self.units.format(temporal.total_dwell_seconds),
            average_text: temporal.average_dwell_seconds.map(|s| self.units.format_average(s)),
            max_text: self.units.format(temporal.max_dwell_seconds),
        };

        let windows = temporal
            .windows
            .iter()
            .map(|w| WindowCard {
                name: w.name.clone(),
                session_count: w.session_count,
                average_dwell_seconds: w.average_dwell_seconds,
                average_dwell_text: w.average_dwell_seconds.map(|s| self.units.format_average(s)),
            })
            .collect();

        DashboardSummary {
            producer: DashboardProducer {
                name: PRODUCER_NAME.to_string(),
                version: PAGEHEAT_VERSION.to_string(),
                instance_id: self.instance_id.clone(),
            },
            computed_at: computed_at.to_rfc3339(),
            has_data: total_points > 0,
            total_sessions: temporal.total_sessions,
            total_points,
            dwell,
            windows,
            top_clicks: rank_clicks(click_totals, self.top_clicks),
            quality,
        }
    }

    /// Encode to a pretty-printed JSON string
    pub fn encode_to_json(&self, summary: &DashboardSummary) -> Result<String, HeatmapError> {
        serde_json::to_string_pretty(summary).map_err(HeatmapError::JsonError)
    }
}

/// Highest counts first, ties by label, at most `limit` entries
pub fn rank_clicks(click_totals: &BTreeMap<ClickLabel, u64>, limit: usize) -> Vec<ClickCount> {
    let mut ranked: Vec<(&ClickLabel, u64)> = click_totals
        .iter()
        .map(|(label, count)| (label, *count))
        .collect();
    // BTreeMap iteration is label-ordered; a stable sort keeps that for ties
    ranked.sort_by(|a, b| b.1.cmp(&a.1));
    ranked
        .into_iter()
        .take(limit)
        .map(|(label, count)| ClickCount {
            label: label.to_string(),
            count,
        })
        .collect()
}

/// Duration text with the default unit words
pub fn format_duration(seconds: u64) -> String {
    DurationUnits::default().format(seconds)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::TemporalAggregator;
    use crate::types::SessionMetrics;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 30, 12, 0, 0).unwrap()
    }

    fn english() -> DurationUnits {
        DurationUnits {
            seconds: "sec".to_string(),
            minutes: "min".to_string(),
            hours: "h".to_string(),
        }
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(0), "0 сек");
        assert_eq!(format_duration(45), "45 сек");
        assert_eq!(format_duration(60), "1 мин 0 сек");
        assert_eq!(format_duration(125), "2 мин 5 сек");
        assert_eq!(format_duration(3599), "59 мин 59 сек");
        assert_eq!(format_duration(3780), "1 ч 3 мин");
        assert_eq!(format_duration(90_000), "25 ч 0 мин");
    }

    #[test]
    fn test_custom_duration_units() {
        let units = english();
        assert_eq!(units.format(45), "45 sec");
        assert_eq!(units.format(125), "2 min 5 sec");
        assert_eq!(units.format(3780), "1 h 3 min");
        assert_eq!(units.format_average(19.6), "20 sec");
        assert_eq!(units.format_average(-3.0), "0 sec");

        let partial: DurationUnits = serde_json::from_str(r#"{"hours": "hr"}"#).unwrap();
        assert_eq!(partial.format(7200), "2 hr 0 мин");
    }

    #[test]
    fn test_rank_clicks_orders_by_count_then_label() {
        let mut totals = BTreeMap::new();
        totals.insert(ClickLabel::text("Позвонить"), 3);
        totals.insert(ClickLabel::text("Заказать"), 7);
        totals.insert(ClickLabel::text("Написать"), 3);
        totals.insert(ClickLabel::field("Имя"), 1);

        let ranked = rank_clicks(&totals, 3);
        assert_eq!(
            ranked,
            vec![
                ClickCount { label: "Заказать".to_string(), count: 7 },
                ClickCount { label: "Написать".to_string(), count: 3 },
                ClickCount { label: "Позвонить".to_string(), count: 3 },
            ]
        );
    }

    #[test]
    fn test_encode_no_timestamps() {
        let sessions: Vec<SessionMetrics> = [10, 20, 30]
            .into_iter()
            .map(|dwell_seconds| SessionMetrics {
                created_at: None,
                dwell_seconds,
            })
            .collect();
        let temporal = TemporalAggregator::default().aggregate(&sessions, now());
        let encoder = DashboardEncoder::with_instance_id("test-instance".to_string(), 8);

        let summary = encoder.encode(&temporal, &BTreeMap::new(), 0, InputQuality::default(), now());

        assert!(!summary.has_data);
        assert_eq!(summary.total_sessions, 3);
        assert_eq!(summary.dwell.total_seconds, 60);
        assert_eq!(summary.dwell.average_seconds, Some(20.0));
        assert_eq!(summary.dwell.average_text.as_deref(), Some("20 сек"));
        assert_eq!(summary.dwell.max_seconds, 30);
        assert_eq!(summary.dwell.total_text, "1 мин 0 сек");
        assert_eq!(summary.windows.len(), 3);
        assert!(summary.windows.iter().all(|w| w.average_dwell_text.is_none()));
        assert_eq!(summary.producer.instance_id, "test-instance");
        assert_eq!(summary.producer.name, PRODUCER_NAME);
    }

    #[test]
    fn test_encoder_uses_configured_units() {
        let sessions = [SessionMetrics {
            created_at: Some(now()),
            dwell_seconds: 125,
        }];
        let temporal = TemporalAggregator::default().aggregate(&sessions, now());
        let encoder = DashboardEncoder::default().with_units(english());

        let summary = encoder.encode(&temporal, &BTreeMap::new(), 0, InputQuality::default(), now());

        assert_eq!(summary.dwell.max_text, "2 min 5 sec");
        assert_eq!(summary.window("day").unwrap().average_dwell_text.as_deref(), Some("2 min 5 sec"));
        assert_eq!(encoder.units(), &english());
    }

    #[test]
    fn test_encode_to_json_fields() {
        let temporal = TemporalAggregator::default().aggregate(&[], now());
        let encoder = DashboardEncoder::default();
        let summary = encoder.encode(&temporal, &BTreeMap::new(), 0, InputQuality::default(), now());
        let json = encoder.encode_to_json(&summary).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(value["total_sessions"], 0);
        assert_eq!(value["has_data"], false);
        assert!(value["dwell"]["average_seconds"].is_null());
        assert_eq!(value["windows"][0]["name"], "day");
        assert_eq!(value["computed_at"], "2024-06-30T12:00:00+00:00");
    }
}
