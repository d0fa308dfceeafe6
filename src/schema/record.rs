//! Behavior record wire schema
//!
//! The record store serves one object per visitor session. Field names
//! follow the store (`time_on_page_seconds`, `buttons_clicked`,
//! `cursor_hover_data`); the tracker-side names are accepted too, and the
//! store name wins when a record carries both.
//! Click counts and cursor trails arrive either JSON-encoded in a string or
//! inline as objects.
//!
//! Each field is decoded on its own: a broken field becomes a
//! [`FieldIssue`] on the record and falls back to its empty value.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::{BehaviorRecord, CursorTrail, FieldIssue, RecordField};

/// Record schema identifier reported by tooling
pub const SCHEMA_VERSION: &str = "lead_metrics.v1";

/// Naive timestamp layouts accepted when no UTC offset is present
const NAIVE_TIMESTAMP_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

/// A record as it appears on the wire, before per-field decoding
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawBehaviorRecord {
    #[serde(default)]
    pub id: Option<Value>,

    #[serde(default)]
    pub created_at: Option<Value>,

    #[serde(default)]
    pub time_on_page_seconds: Option<Value>,

    #[serde(default)]
    pub buttons_clicked: Option<Value>,

    #[serde(default)]
    pub cursor_hover_data: Option<Value>,

    /// Tracker name for `time_on_page_seconds`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dwell_seconds: Option<Value>,

    /// Tracker name for `buttons_clicked`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub click_counts: Option<Value>,

    /// Tracker name for `cursor_hover_data`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cursor_trail: Option<Value>,
}

impl RawBehaviorRecord {
    /// Decode every field independently into a [`BehaviorRecord`]
    pub fn decode(self) -> BehaviorRecord {
        let mut issues = Vec::new();

        let id = capture(decode_id(self.id), RecordField::Id, &mut issues);
        let created_at = capture(
            decode_created_at(self.created_at),
            RecordField::CreatedAt,
            &mut issues,
        );
        let dwell_seconds = capture(
            decode_dwell(prefer(self.time_on_page_seconds, self.dwell_seconds)),
            RecordField::DwellSeconds,
            &mut issues,
        )
        .unwrap_or(0);
        let clicks = capture(
            decode_clicks(prefer(self.buttons_clicked, self.click_counts)),
            RecordField::Clicks,
            &mut issues,
        );
        let trail = capture(
            decode_trail(prefer(self.cursor_hover_data, self.cursor_trail)),
            RecordField::CursorTrail,
            &mut issues,
        );

        BehaviorRecord {
            index: 0,
            id,
            created_at,
            dwell_seconds,
            clicks,
            trail,
            issues,
        }
    }
}

fn capture<T>(
    result: Result<Option<T>, String>,
    field: RecordField,
    issues: &mut Vec<FieldIssue>,
) -> Option<T> {
    match result {
        Ok(value) => value,
        Err(reason) => {
            issues.push(FieldIssue::new(field, reason));
            None
        }
    }
}

/// Store name first; the tracker name only fills in when the store name is absent
fn prefer(store: Option<Value>, tracker: Option<Value>) -> Option<Value> {
    match store {
        Some(value) if !is_absent(&value) => Some(value),
        store => tracker.or(store),
    }
}

/// Values that mean "field not provided"
fn is_absent(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        _ => false,
    }
}

fn decode_id(value: Option<Value>) -> Result<Option<i64>, String> {
    match value {
        None => Ok(None),
        Some(v) if is_absent(&v) => Ok(None),
        Some(Value::Number(n)) => n
            .as_i64()
            .map(Some)
            .ok_or_else(|| format!("id {} is not an integer", n)),
        Some(Value::String(s)) => s
            .trim()
            .parse::<i64>()
            .map(Some)
            .map_err(|_| format!("id {:?} is not an integer", s)),
        Some(other) => Err(format!("unexpected id type: {}", type_name(&other))),
    }
}

fn decode_created_at(value: Option<Value>) -> Result<Option<DateTime<Utc>>, String> {
    match value {
        None => Ok(None),
        Some(v) if is_absent(&v) => Ok(None),
        Some(Value::String(s)) => parse_timestamp(&s)
            .map(Some)
            .ok_or_else(|| format!("unrecognized timestamp {:?}", s)),
        Some(other) => Err(format!(
            "unexpected timestamp type: {}",
            type_name(&other)
        )),
    }
}

/// Parse an ISO 8601 timestamp. Naive timestamps are taken as UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let trimmed = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(dt.with_timezone(&Utc));
    }
    NAIVE_TIMESTAMP_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(trimmed, fmt).ok())
        .map(|naive| naive.and_utc())
}

fn decode_dwell(value: Option<Value>) -> Result<Option<u64>, String> {
    match value {
        None => Ok(None),
        Some(v) if is_absent(&v) => Ok(None),
        Some(Value::Number(n)) => match n.as_u64() {
            Some(secs) => Ok(Some(secs)),
            None => n
                .as_f64()
                .and_then(non_negative_count)
                .map(Some)
                .ok_or_else(|| format!("dwell time {} is negative or not finite", n)),
        },
        Some(Value::String(s)) => s
            .trim()
            .parse::<f64>()
            .ok()
            .and_then(non_negative_count)
            .map(Some)
            .ok_or_else(|| format!("dwell time {:?} is not a non-negative number", s)),
        Some(other) => Err(format!("unexpected dwell type: {}", type_name(&other))),
    }
}

fn non_negative_count(value: f64) -> Option<u64> {
    if value.is_finite() && value >= 0.0 {
        Some(value.round() as u64)
    } else {
        None
    }
}

/// Unwrap a field that may be an inline object or a JSON-encoded string
fn embedded_object(
    value: Value,
    what: &str,
) -> Result<Option<serde_json::Map<String, Value>>, String> {
    let value = match value {
        Value::String(s) => serde_json::from_str::<Value>(&s)
            .map_err(|e| format!("{} is not valid JSON: {}", what, e))?,
        other => other,
    };
    match value {
        Value::Null => Ok(None),
        Value::Object(map) => Ok(Some(map)),
        other => Err(format!(
            "{} must be an object, got {}",
            what,
            type_name(&other)
        )),
    }
}

fn decode_clicks(value: Option<Value>) -> Result<Option<Vec<(String, u64)>>, String> {
    let Some(value) = value.filter(|v| !is_absent(v)) else {
        return Ok(None);
    };
    let Some(map) = embedded_object(value, "click map")? else {
        return Ok(None);
    };

    let mut clicks: Vec<(String, u64)> = map
        .into_iter()
        .filter_map(|(tag, count)| {
            let count = count
                .as_u64()
                .or_else(|| count.as_f64().and_then(non_negative_count))?;
            Some((tag, count))
        })
        .collect();
    clicks.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(Some(clicks))
}

fn decode_trail(value: Option<Value>) -> Result<Option<CursorTrail>, String> {
    let Some(value) = value.filter(|v| !is_absent(v)) else {
        return Ok(None);
    };
    let Some(map) = embedded_object(value, "cursor trail")? else {
        return Ok(None);
    };

    let document_width = map.get("w").and_then(Value::as_f64);
    let document_height = map.get("h").and_then(Value::as_f64);

    let points = match map.get("pts") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(samples)) => samples.iter().filter_map(sample_pair).collect(),
        Some(other) => {
            return Err(format!(
                "cursor trail points must be an array, got {}",
                type_name(other)
            ))
        }
    };

    Ok(Some(CursorTrail {
        document_width,
        document_height,
        points,
    }))
}

/// `[x, y, ...]` → `(x, y)`; anything shorter or non-numeric is dropped
fn sample_pair(sample: &Value) -> Option<(f64, f64)> {
    let coords = sample.as_array()?;
    if coords.len() < 2 {
        return None;
    }
    Some((coords[0].as_f64()?, coords[1].as_f64()?))
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
