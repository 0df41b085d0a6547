//! Metrics record adapter
//!
//! Parses front-end metrics JSON and labeled datasets into typed records, running
//! schema validation before anything reaches feature engineering.

use crate::error::ComputeError;
use crate::types::{LabeledRecord, RawMetricsRecord};

/// Parse a single metrics record JSON object and validate it
pub fn parse_record(json: &str) -> Result<RawMetricsRecord, ComputeError> {
    let record: RawMetricsRecord = serde_json::from_str(json).map_err(map_serde_error)?;
    record.validate()?;
    Ok(record)
}

/// Parse a newline-delimited JSON dataset of labeled records.
///
/// Blank lines are skipped. Errors carry the 1-based line number.
pub fn parse_dataset_ndjson(data: &str) -> Result<Vec<LabeledRecord>, ComputeError> {
    let mut records = Vec::new();

    for (line_no, line) in data.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let labeled: LabeledRecord = serde_json::from_str(trimmed).map_err(|e| {
            ComputeError::ParseError(format!("line {}: {}", line_no + 1, describe_serde_error(&e)))
        })?;
        labeled
            .record
            .validate()
            .map_err(|e| ComputeError::SchemaError(format!("line {}: {}", line_no + 1, e)))?;
        records.push(labeled);
    }

    Ok(records)
}

/// Parse a JSON array of labeled records
pub fn parse_dataset_array(data: &str) -> Result<Vec<LabeledRecord>, ComputeError> {
    let records: Vec<LabeledRecord> = serde_json::from_str(data).map_err(map_serde_error)?;
    for (index, labeled) in records.iter().enumerate() {
        labeled
            .record
            .validate()
            .map_err(|e| ComputeError::SchemaError(format!("record {}: {}", index, e)))?;
    }
    Ok(records)
}

/// Serialize labeled records as newline-delimited JSON
pub fn to_ndjson(records: &[LabeledRecord]) -> Result<String, ComputeError> {
    let mut out = String::new();
    for record in records {
        out.push_str(&serde_json::to_string(record)?);
        out.push('\n');
    }
    Ok(out)
}

fn map_serde_error(e: serde_json::Error) -> ComputeError {
    let message = e.to_string();
    if let Some(field) = missing_field_name(&message) {
        return ComputeError::MissingField(field);
    }
    ComputeError::ParseError(describe_serde_error(&e))
}

fn describe_serde_error(e: &serde_json::Error) -> String {
    format!("{} (line {}, column {})", e, e.line(), e.column())
}

/// Extract the field name from serde's "missing field `x`" message
fn missing_field_name(message: &str) -> Option<String> {
    let rest = message.strip_prefix("missing field `")?;
    let end = rest.find('`')?;
    Some(rest[..end].to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::LearningStyle;
    use pretty_assertions::assert_eq;

    fn sample_record_json() -> &'static str {
        r#"{
            "engagement": {
                "visual": {"clicks": 15, "timeSpent": 300, "videoPlays": 4, "videoCompletion": 85.0},
                "auditory": {"clicks": 3, "timeSpent": 45},
                "reading": {"clicks": 5, "timeSpent": 80, "maxScroll": 40},
                "kinesthetic": {"clicks": 2, "timeSpent": 30, "firstSuccess": true}
            },
            "questionnaire": [0, 0, 1, 0, 2, 0, 0, 1, 0, 0]
        }"#
    }

    #[test]
    fn test_parse_record() {
        let record = parse_record(sample_record_json()).unwrap();
        assert_eq!(record.engagement.visual.clicks, 15);
        assert_eq!(record.engagement.visual.video_plays, 4);
        assert_eq!(record.engagement.reading.max_scroll, 40.0);
        assert!(record.engagement.kinesthetic.first_success);
        assert_eq!(record.questionnaire.len(), 10);
    }

    #[test]
    fn test_missing_required_clicks() {
        let json = r#"{
            "engagement": {
                "visual": {"timeSpent": 300},
                "auditory": {"clicks": 3, "timeSpent": 45},
                "reading": {"clicks": 5, "timeSpent": 80},
                "kinesthetic": {"clicks": 2, "timeSpent": 30}
            },
            "questionnaire": [0, 0, 1, 0, 2, 0, 0, 1, 0, 0]
        }"#;
        match parse_record(json) {
            Err(ComputeError::MissingField(field)) => assert_eq!(field, "clicks"),
            other => panic!("expected MissingField, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_questionnaire() {
        let json = r#"{
            "engagement": {
                "visual": {"clicks": 1, "timeSpent": 3},
                "auditory": {"clicks": 3, "timeSpent": 45},
                "reading": {"clicks": 5, "timeSpent": 80},
                "kinesthetic": {"clicks": 2, "timeSpent": 30}
            }
        }"#;
        assert!(matches!(
            parse_record(json),
            Err(ComputeError::MissingField(field)) if field == "questionnaire"
        ));
    }

    #[test]
    fn test_short_questionnaire_rejected() {
        let json = sample_record_json().replace("[0, 0, 1, 0, 2, 0, 0, 1, 0, 0]", "[0, 1, 2]");
        assert!(matches!(
            parse_record(&json),
            Err(ComputeError::QuestionnaireLength { actual: 3, .. })
        ));
    }

    #[test]
    fn test_negative_clicks_rejected() {
        let json = sample_record_json().replace("\"clicks\": 15", "\"clicks\": -15");
        assert!(matches!(parse_record(&json), Err(ComputeError::ParseError(_))));
    }

    #[test]
    fn test_invalid_json() {
        assert!(parse_record("not valid json").is_err());
    }

    #[test]
    fn test_ndjson_roundtrip() {
        let record = parse_record(sample_record_json()).unwrap();
        let labeled = vec![
            LabeledRecord {
                record: record.clone(),
                label: LearningStyle::Visual,
            },
            LabeledRecord {
                record,
                label: LearningStyle::Reading,
            },
        ];

        let ndjson = to_ndjson(&labeled).unwrap();
        assert_eq!(ndjson.lines().count(), 2);

        let parsed = parse_dataset_ndjson(&format!("\n{}\n", ndjson)).unwrap();
        assert_eq!(parsed, labeled);
    }

    #[test]
    fn test_ndjson_reports_line_number() {
        let record = parse_record(sample_record_json()).unwrap();
        let good = serde_json::to_string(&LabeledRecord {
            record,
            label: LearningStyle::Auditory,
        })
        .unwrap();
        let data = format!("{}\n{{\"label\": \"Visual\"}}\n", good);

        match parse_dataset_ndjson(&data) {
            Err(ComputeError::ParseError(msg)) => assert!(msg.starts_with("line 2:")),
            other => panic!("expected ParseError, got {:?}", other),
        }
    }

    #[test]
    fn test_dataset_array_validates_records() {
        let data = r#"[{
            "engagement": {
                "visual": {"clicks": 1, "timeSpent": 3},
                "auditory": {"clicks": 3, "timeSpent": 45},
                "reading": {"clicks": 5, "timeSpent": 80},
                "kinesthetic": {"clicks": 2, "timeSpent": 30}
            },
            "questionnaire": [0, 0, 0],
            "label": "Visual"
        }]"#;
        assert!(matches!(
            parse_dataset_array(data),
            Err(ComputeError::SchemaError(_))
        ));
    }

    #[test]
    fn test_missing_field_name_extraction() {
        assert_eq!(
            missing_field_name("missing field `timeSpent` at line 1 column 2"),
            Some("timeSpent".to_string())
        );
        assert_eq!(missing_field_name("expected value"), None);
    }
}
