//! Batch adapter for behavior records
//!
//! Splits a response body into records and decodes each one on its own, so a
//! single broken element never takes the rest of the batch down.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::str::FromStr;

use crate::error::HeatmapError;
use crate::schema::record::RawBehaviorRecord;
use crate::types::{BehaviorRecord, FieldIssue};

/// A record that could not be decoded at all
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordIssue {
    /// Position in the input (array index or zero-based line number)
    pub index: usize,
    pub reason: String,
}

impl From<RecordIssue> for HeatmapError {
    fn from(issue: RecordIssue) -> Self {
        HeatmapError::MalformedRecord {
            index: issue.index,
            reason: issue.reason,
        }
    }
}

/// Decoded records plus the elements that were rejected
#[derive(Debug, Clone, Default)]
pub struct RecordBatch {
    pub records: Vec<BehaviorRecord>,
    pub rejected: Vec<RecordIssue>,
}

impl RecordBatch {
    pub fn from_records(records: Vec<BehaviorRecord>) -> Self {
        Self {
            records,
            rejected: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Number of decoded records carrying at least one field issue
    pub fn records_with_issues(&self) -> usize {
        self.records.iter().filter(|r| !r.is_clean()).count()
    }
}

/// Layout of a record body
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputFormat {
    /// A single JSON array
    #[default]
    Json,
    /// One JSON object per line
    Ndjson,
}

impl FromStr for InputFormat {
    type Err = HeatmapError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(InputFormat::Json),
            "ndjson" | "jsonl" => Ok(InputFormat::Ndjson),
            other => Err(HeatmapError::ParseError(format!(
                "Unknown input format: {}",
                other
            ))),
        }
    }
}

/// Adapter for turning response bodies into behavior records
pub struct RecordAdapter;

impl RecordAdapter {
    /// Parse a body in the given layout
    pub fn parse(body: &str, format: InputFormat) -> Result<RecordBatch, HeatmapError> {
        match format {
            InputFormat::Json => Self::parse_array(body),
            InputFormat::Ndjson => Ok(Self::parse_ndjson(body)),
        }
    }

    /// Parse a JSON array of records
    pub fn parse_array(json: &str) -> Result<RecordBatch, HeatmapError> {
        let value: Value = serde_json::from_str(json)?;
        let Value::Array(items) = value else {
            return Err(HeatmapError::ParseError(
                "Expected a JSON array of records".to_string(),
            ));
        };

        let mut batch = RecordBatch::default();
        for (index, item) in items.into_iter().enumerate() {
            match Self::decode_value(index, item) {
                Ok(record) => batch.records.push(record),
                Err(issue) => batch.rejected.push(issue),
            }
        }
        Self::log_batch(&batch);
        Ok(batch)
    }

    /// Parse NDJSON (one record per line). Blank lines are skipped, lines
    /// that fail to parse are rejected individually.
    pub fn parse_ndjson(ndjson: &str) -> RecordBatch {
        let mut batch = RecordBatch::default();
        for (line_num, line) in ndjson.lines().enumerate() {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            let decoded = serde_json::from_str::<Value>(trimmed)
                .map_err(|e| RecordIssue {
                    index: line_num,
                    reason: format!("Failed to parse line {}: {}", line_num + 1, e),
                })
                .and_then(|value| Self::decode_value(line_num, value));
            match decoded {
                Ok(record) => batch.records.push(record),
                Err(issue) => batch.rejected.push(issue),
            }
        }
        Self::log_batch(&batch);
        batch
    }

    /// Decode a single JSON value into a record
    pub fn decode_value(index: usize, value: Value) -> Result<BehaviorRecord, RecordIssue> {
        if !value.is_object() {
            return Err(RecordIssue {
                index,
                reason: "record is not a JSON object".to_string(),
            });
        }
        let raw = serde_json::from_value::<RawBehaviorRecord>(value).map_err(|e| RecordIssue {
            index,
            reason: e.to_string(),
        })?;
        let mut record = raw.decode();
        record.index = index;
        Ok(record)
    }

    /// Collect every problem in a batch, rejected elements and field issues alike
    pub fn validate(batch: &RecordBatch) -> Vec<ValidationResult> {
        let rejected = batch.rejected.iter().map(|issue| ValidationResult {
            index: issue.index,
            record_id: None,
            rejected: Some(issue.reason.clone()),
            field_issues: Vec::new(),
        });

        let degraded = batch
            .records
            .iter()
            .filter(|record| !record.is_clean())
            .map(|record| ValidationResult {
                index: record.index,
                record_id: record.id,
                rejected: None,
                field_issues: record.issues.clone(),
            });

        rejected.chain(degraded).collect()
    }

    fn log_batch(batch: &RecordBatch) {
        for issue in &batch.rejected {
            tracing::warn!(index = issue.index, reason = %issue.reason, "rejected behavior record");
        }
        let degraded = batch.records_with_issues();
        if degraded > 0 {
            tracing::warn!(degraded, "behavior records decoded with field fallbacks");
        }
        tracing::debug!(
            records = batch.records.len(),
            rejected = batch.rejected.len(),
            "decoded record batch"
        );
    }
}

/// Problems found for one input element
#[derive(Debug, Clone, Serialize)]
pub struct ValidationResult {
    /// Position in the input (array index or zero-based line number)
    pub index: usize,
    pub record_id: Option<i64>,
    /// Why the whole element was rejected
    pub rejected: Option<String>,
    /// Fields that fell back to empty values
    pub field_issues: Vec<FieldIssue>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RecordField;

    #[test]
    fn test_parse_array_isolates_bad_elements() {
        let json = r#"[
            {"id": 1, "time_on_page_seconds": 10},
            42,
            {"id": 3, "cursor_hover_data": "{broken"},
            {"id": 4, "time_on_page_seconds": "20"}
        ]"#;

        let batch = RecordAdapter::parse_array(json).unwrap();
        assert_eq!(batch.records.len(), 3);
        assert_eq!(batch.rejected.len(), 1);
        assert_eq!(batch.rejected[0].index, 1);
        assert_eq!(batch.records_with_issues(), 1);
        assert_eq!(batch.records[2].dwell_seconds, 20);
    }

    #[test]
    fn test_parse_array_requires_array() {
        let result = RecordAdapter::parse_array(r#"{"id": 1}"#);
        assert!(matches!(result, Err(HeatmapError::ParseError(_))));

        let result = RecordAdapter::parse_array("not json");
        assert!(matches!(result, Err(HeatmapError::JsonError(_))));
    }

    #[test]
    fn test_parse_ndjson() {
        let ndjson = "{\"time_on_page_seconds\": 5}\n\n{oops}\n{\"time_on_page_seconds\": 7}\n";
        let batch = RecordAdapter::parse_ndjson(ndjson);
        assert_eq!(batch.records.len(), 2);
        assert_eq!(batch.rejected.len(), 1);
        assert_eq!(batch.rejected[0].index, 2);
        assert!(batch.rejected[0].reason.contains("line 3"));
    }

    #[test]
    fn test_validate_reports_rejections_and_field_issues() {
        let json = r#"[
            "nope",
            {"id": 9, "buttons_clicked": "{bad", "time_on_page_seconds": 3},
            {"id": 10}
        ]"#;
        let batch = RecordAdapter::parse_array(json).unwrap();
        let results = RecordAdapter::validate(&batch);

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].index, 0);
        assert!(results[0].rejected.is_some());
        assert_eq!(results[1].index, 1);
        assert_eq!(results[1].record_id, Some(9));
        assert_eq!(results[1].field_issues[0].field, RecordField::Clicks);
    }

    #[test]
    fn test_records_keep_input_index() {
        let ndjson = "{\"id\": 1}\n\nnot json\n{\"id\": 4, \"created_at\": \"someday\"}\n";
        let batch = RecordAdapter::parse_ndjson(ndjson);
        assert_eq!(batch.records.len(), 2);
        assert_eq!(batch.records[0].index, 0);
        assert_eq!(batch.records[1].index, 3);

        let results = RecordAdapter::validate(&batch);
        let indices: Vec<usize> = results.iter().map(|r| r.index).collect();
        assert_eq!(indices, vec![2, 3]);
    }

    #[test]
    fn test_store_and_tracker_names_do_not_reject() {
        let json = r#"[{
            "time_on_page_seconds": 5,
            "dwell_seconds": 5,
            "cursor_hover_data": {"w": 100, "h": 100, "pts": [[50, 50]]}
        }]"#;
        let batch = RecordAdapter::parse_array(json).unwrap();
        assert!(batch.rejected.is_empty());
        assert_eq!(batch.records.len(), 1);
        assert_eq!(batch.records[0].dwell_seconds, 5);
        assert!(batch.records[0].trail.is_some());
    }

    #[test]
    fn test_parse_dispatches_on_format() {
        assert_eq!("NDJSON".parse::<InputFormat>().unwrap(), InputFormat::Ndjson);
        assert!("csv".parse::<InputFormat>().is_err());

        let batch = RecordAdapter::parse("{\"id\": 1}\n{\"id\": 2}", InputFormat::Ndjson).unwrap();
        assert_eq!(batch.records.len(), 2);
        assert!(RecordAdapter::parse("{\"id\": 1}", InputFormat::Json).is_err());
    }

    #[test]
    fn test_record_issue_into_error() {
        let err: HeatmapError = RecordIssue {
            index: 2,
            reason: "bad".to_string(),
        }
        .into();
        assert!(matches!(err, HeatmapError::MalformedRecord { index: 2, .. }));
    }
}
