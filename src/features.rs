//! Feature engineering
//!
//! Turns a validated [`RawMetricsRecord`] into a named, fixed-width numeric feature
//! vector. Engineering is a pure function of its input: the same record always
//! produces bit-identical output.
//!
//! Smoothed ratios divide by `total + 1` (and per-click averages by `clicks + 1`)
//! so that an all-zero session still yields finite features.

use serde::{Deserialize, Serialize};

use crate::error::ComputeError;
use crate::types::{RawMetricsRecord, NUM_STYLES, QUESTIONNAIRE_LEN};

// Engagement score weights
pub const VISUAL_VIDEO_PLAY_WEIGHT: f64 = 2.0;
pub const VISUAL_COMPLETION_WEIGHT: f64 = 5.0;
pub const VISUAL_PAUSE_WEIGHT: f64 = 0.5;

pub const AUDITORY_PLAY_WEIGHT: f64 = 2.0;
pub const AUDITORY_COMPLETION_WEIGHT: f64 = 5.0;
pub const AUDITORY_SEEK_WEIGHT: f64 = 1.5;
pub const AUDITORY_PAUSE_WEIGHT: f64 = 0.5;

/// Applied to `max_scroll / 100`
pub const READING_SCROLL_WEIGHT: f64 = 5.0;
pub const READING_SELECTION_WEIGHT: f64 = 2.0;

pub const KINESTHETIC_DRAG_WEIGHT: f64 = 0.5;
pub const KINESTHETIC_CORRECT_DROP_WEIGHT: f64 = 3.0;
pub const KINESTHETIC_INCORRECT_DROP_WEIGHT: f64 = -0.5;
pub const KINESTHETIC_FIRST_SUCCESS_WEIGHT: f64 = 5.0;

/// Percent-to-fraction divisor for completion and scroll signals
pub const PERCENT_SCALE: f64 = 100.0;

// Interaction quality scaling
pub const MEDIA_QUALITY_DIVISOR: f64 = 1000.0;
pub const READING_QUALITY_DIVISOR: f64 = 10.0;
pub const KINESTHETIC_QUALITY_MULTIPLIER: f64 = 100.0;

/// Additive smoothing for ratio and per-click denominators
pub const RATIO_SMOOTHING: f64 = 1.0;

const QUESTION_COLUMNS: [&str; QUESTIONNAIRE_LEN] =
    ["q1", "q2", "q3", "q4", "q5", "q6", "q7", "q8", "q9", "q10"];

const ANSWER_COUNT_COLUMNS: [&str; NUM_STYLES] = [
    "answer_0_count",
    "answer_1_count",
    "answer_2_count",
    "answer_3_count",
];

const MODALITIES: [&str; NUM_STYLES] = ["visual", "auditory", "reading", "kinesthetic"];

/// Which raw signals a feature vector is built from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureSchema {
    /// All engagement signals, including media and interaction secondaries
    #[default]
    Full,
    /// Only clicks, time spent and questionnaire answers
    Compact,
}

impl FeatureSchema {
    pub fn as_str(self) -> &'static str {
        match self {
            FeatureSchema::Full => "full",
            FeatureSchema::Compact => "compact",
        }
    }
}

/// A single engineered feature vector
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureVector {
    columns: Vec<&'static str>,
    values: Vec<f64>,
}

impl FeatureVector {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            columns: Vec::with_capacity(capacity),
            values: Vec::with_capacity(capacity),
        }
    }

    fn push(&mut self, column: &'static str, value: f64) {
        self.columns.push(column);
        self.values.push(value);
    }

    pub fn columns(&self) -> &[&'static str] {
        &self.columns
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Look up a feature by name
    pub fn get(&self, column: &str) -> Option<f64> {
        self.columns
            .iter()
            .position(|&c| c == column)
            .map(|i| self.values[i])
    }
}

/// Row-major matrix of feature vectors sharing one column layout
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureMatrix {
    columns: Vec<String>,
    rows: Vec<Vec<f64>>,
}

impl FeatureMatrix {
    /// Build a matrix, checking every row has one value per column
    pub fn new(columns: Vec<String>, rows: Vec<Vec<f64>>) -> Result<Self, ComputeError> {
        if let Some((i, row)) = rows.iter().enumerate().find(|(_, r)| r.len() != columns.len()) {
            return Err(ComputeError::ShapeMismatch(format!(
                "row {} has {} values but there are {} columns",
                i,
                row.len(),
                columns.len()
            )));
        }
        Ok(Self { columns, rows })
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<f64>] {
        &self.rows
    }

    pub fn n_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn n_columns(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Fail on the first NaN or infinite value
    pub fn ensure_numeric(&self) -> Result<(), ComputeError> {
        for (row_idx, row) in self.rows.iter().enumerate() {
            if let Some(col) = row.iter().position(|v| !v.is_finite()) {
                return Err(ComputeError::NonNumericFeature {
                    column: self.columns[col].clone(),
                    row: row_idx,
                });
            }
        }
        Ok(())
    }
}

impl From<FeatureVector> for FeatureMatrix {
    fn from(vector: FeatureVector) -> Self {
        Self {
            columns: vector.columns.iter().map(|c| c.to_string()).collect(),
            rows: vec![vector.values],
        }
    }
}

/// Engineer features for one record.
///
/// The record is validated first; invalid records are rejected rather than coerced.
pub fn engineer(
    record: &RawMetricsRecord,
    schema: FeatureSchema,
) -> Result<FeatureVector, ComputeError> {
    record.validate()?;

    let mut fv = FeatureVector::with_capacity(feature_count(schema));
    push_raw_signals(&mut fv, record, schema);
    push_questionnaire_answers(&mut fv, &record.questionnaire);
    push_engagement_aggregates(&mut fv, record, schema);
    push_questionnaire_summary(&mut fv, &record.questionnaire);
    if schema == FeatureSchema::Full {
        push_interaction_quality(&mut fv, record);
    }

    if let Some(i) = fv.values.iter().position(|v| !v.is_finite()) {
        return Err(ComputeError::NonNumericFeature {
            column: fv.columns[i].to_string(),
            row: 0,
        });
    }

    Ok(fv)
}

/// Engineer features for a batch of records into one matrix
pub fn engineer_batch(
    records: &[RawMetricsRecord],
    schema: FeatureSchema,
) -> Result<FeatureMatrix, ComputeError> {
    let columns = feature_columns(schema);
    let mut rows = Vec::with_capacity(records.len());

    for (row_idx, record) in records.iter().enumerate() {
        let fv = engineer(record, schema).map_err(|e| match e {
            ComputeError::NonNumericFeature { column, .. } => ComputeError::NonNumericFeature {
                column,
                row: row_idx,
            },
            other => other,
        })?;
        rows.push(fv.values);
    }

    FeatureMatrix::new(columns, rows)
}

/// Ordered feature names produced for a schema
pub fn feature_columns(schema: FeatureSchema) -> Vec<String> {
    let mut fv = FeatureVector::with_capacity(feature_count(schema));
    let record = RawMetricsRecord::new(Default::default(), vec![0; QUESTIONNAIRE_LEN]);
    push_raw_signals(&mut fv, &record, schema);
    push_questionnaire_answers(&mut fv, &record.questionnaire);
    push_engagement_aggregates(&mut fv, &record, schema);
    push_questionnaire_summary(&mut fv, &record.questionnaire);
    if schema == FeatureSchema::Full {
        push_interaction_quality(&mut fv, &record);
    }
    fv.columns.iter().map(|c| c.to_string()).collect()
}

fn feature_count(schema: FeatureSchema) -> usize {
    match schema {
        FeatureSchema::Full => 72,
        FeatureSchema::Compact => 38,
    }
}

fn push_raw_signals(fv: &mut FeatureVector, record: &RawMetricsRecord, schema: FeatureSchema) {
    let e = &record.engagement;
    let full = schema == FeatureSchema::Full;

    fv.push("visual_clicks", e.visual.clicks as f64);
    fv.push("visual_time", e.visual.time_spent);
    if full {
        fv.push("video_plays", e.visual.video_plays as f64);
        fv.push("video_pauses", e.visual.video_pauses as f64);
        fv.push("video_completion", e.visual.video_completion);
        fv.push("visual_hover", e.visual.hover_time);
        fv.push("visual_revisits", e.visual.revisits as f64);
    }

    fv.push("auditory_clicks", e.auditory.clicks as f64);
    fv.push("auditory_time", e.auditory.time_spent);
    if full {
        fv.push("audio_plays", e.auditory.audio_plays as f64);
        fv.push("audio_pauses", e.auditory.audio_pauses as f64);
        fv.push("audio_completion", e.auditory.audio_completion);
        fv.push("audio_seeks", e.auditory.audio_seeks as f64);
        fv.push("auditory_hover", e.auditory.hover_time);
        fv.push("auditory_revisits", e.auditory.revisits as f64);
    }

    fv.push("reading_clicks", e.reading.clicks as f64);
    fv.push("reading_time", e.reading.time_spent);
    if full {
        fv.push("scroll_depth", e.reading.scroll_depth);
        fv.push("max_scroll", e.reading.max_scroll);
        fv.push("text_selections", e.reading.text_selections as f64);
        fv.push("reading_hover", e.reading.hover_time);
        fv.push("reading_revisits", e.reading.revisits as f64);
    }

    fv.push("kinesthetic_clicks", e.kinesthetic.clicks as f64);
    fv.push("kinesthetic_time", e.kinesthetic.time_spent);
    if full {
        fv.push("drag_attempts", e.kinesthetic.drag_attempts as f64);
        fv.push("incorrect_drops", e.kinesthetic.incorrect_drops as f64);
        fv.push("correct_drops", e.kinesthetic.correct_drops as f64);
        fv.push("completion_time", e.kinesthetic.completion_time);
        fv.push("first_success", bool_to_f64(e.kinesthetic.first_success));
        fv.push("reset_clicks", e.kinesthetic.reset_clicks as f64);
        fv.push("kinesthetic_hover", e.kinesthetic.hover_time);
        fv.push("kinesthetic_revisits", e.kinesthetic.revisits as f64);
    }
}

fn push_questionnaire_answers(fv: &mut FeatureVector, answers: &[u8]) {
    for (&column, &answer) in QUESTION_COLUMNS.iter().zip(answers) {
        fv.push(column, answer as f64);
    }
}

fn push_engagement_aggregates(
    fv: &mut FeatureVector,
    record: &RawMetricsRecord,
    schema: FeatureSchema,
) {
    let e = &record.engagement;
    let clicks = [
        e.visual.clicks as f64,
        e.auditory.clicks as f64,
        e.reading.clicks as f64,
        e.kinesthetic.clicks as f64,
    ];
    let times = [
        e.visual.time_spent,
        e.auditory.time_spent,
        e.reading.time_spent,
        e.kinesthetic.time_spent,
    ];
    let total_clicks: f64 = clicks.iter().sum();
    let total_time: f64 = times.iter().sum();

    fv.push("total_clicks", total_clicks);
    fv.push("total_time", total_time);
    if schema == FeatureSchema::Full {
        let hover = [
            e.visual.hover_time,
            e.auditory.hover_time,
            e.reading.hover_time,
            e.kinesthetic.hover_time,
        ];
        let revisits = [
            e.visual.revisits,
            e.auditory.revisits,
            e.reading.revisits,
            e.kinesthetic.revisits,
        ];
        fv.push("total_hover", hover.iter().sum());
        fv.push("total_revisits", revisits.iter().map(|&r| f64::from(r)).sum());
    }

    const CLICK_RATIO: [&str; NUM_STYLES] = [
        "visual_click_ratio",
        "auditory_click_ratio",
        "reading_click_ratio",
        "kinesthetic_click_ratio",
    ];
    const TIME_RATIO: [&str; NUM_STYLES] = [
        "visual_time_ratio",
        "auditory_time_ratio",
        "reading_time_ratio",
        "kinesthetic_time_ratio",
    ];
    const AVG_TIME: [&str; NUM_STYLES] = [
        "visual_avg_time",
        "auditory_avg_time",
        "reading_avg_time",
        "kinesthetic_avg_time",
    ];

    for m in 0..MODALITIES.len() {
        fv.push(CLICK_RATIO[m], smoothed_ratio(clicks[m], total_clicks));
    }
    for m in 0..MODALITIES.len() {
        fv.push(TIME_RATIO[m], smoothed_ratio(times[m], total_time));
    }

    if schema == FeatureSchema::Full {
        fv.push("visual_engagement_score", visual_engagement_score(record));
        fv.push("auditory_engagement_score", auditory_engagement_score(record));
        fv.push("reading_engagement_score", reading_engagement_score(record));
        fv.push("kinesthetic_engagement_score", kinesthetic_engagement_score(record));
    }

    for m in 0..MODALITIES.len() {
        fv.push(AVG_TIME[m], smoothed_ratio(times[m], clicks[m]));
    }
}

fn push_questionnaire_summary(fv: &mut FeatureVector, answers: &[u8]) {
    let counts = answer_counts(answers);
    for (&column, &count) in ANSWER_COUNT_COLUMNS.iter().zip(counts.iter()) {
        fv.push(column, count as f64);
    }

    let (dominant, max_count) = dominant_answer(&counts);
    fv.push("dominant_answer", dominant as f64);
    fv.push("answer_consistency", max_count as f64 / answers.len() as f64);
}

fn push_interaction_quality(fv: &mut FeatureVector, record: &RawMetricsRecord) {
    let e = &record.engagement;
    fv.push(
        "visual_quality",
        e.visual.video_completion * e.visual.time_spent / MEDIA_QUALITY_DIVISOR,
    );
    fv.push(
        "auditory_quality",
        e.auditory.audio_completion * e.auditory.time_spent / MEDIA_QUALITY_DIVISOR,
    );
    fv.push(
        "reading_quality",
        e.reading.max_scroll * e.reading.text_selections as f64 / READING_QUALITY_DIVISOR,
    );
    fv.push(
        "kinesthetic_quality",
        e.kinesthetic.correct_drops as f64 / (e.kinesthetic.drag_attempts as f64 + RATIO_SMOOTHING)
            * KINESTHETIC_QUALITY_MULTIPLIER,
    );
}

/// `part / (whole + 1)`
fn smoothed_ratio(part: f64, whole: f64) -> f64 {
    part / (whole + RATIO_SMOOTHING)
}

fn bool_to_f64(flag: bool) -> f64 {
    if flag {
        1.0
    } else {
        0.0
    }
}

fn visual_engagement_score(record: &RawMetricsRecord) -> f64 {
    let v = &record.engagement.visual;
    v.video_plays as f64 * VISUAL_VIDEO_PLAY_WEIGHT
        + v.video_completion / PERCENT_SCALE * VISUAL_COMPLETION_WEIGHT
        + v.video_pauses as f64 * VISUAL_PAUSE_WEIGHT
}

fn auditory_engagement_score(record: &RawMetricsRecord) -> f64 {
    let a = &record.engagement.auditory;
    a.audio_plays as f64 * AUDITORY_PLAY_WEIGHT
        + a.audio_completion / PERCENT_SCALE * AUDITORY_COMPLETION_WEIGHT
        + a.audio_seeks as f64 * AUDITORY_SEEK_WEIGHT
        + a.audio_pauses as f64 * AUDITORY_PAUSE_WEIGHT
}

fn reading_engagement_score(record: &RawMetricsRecord) -> f64 {
    let r = &record.engagement.reading;
    r.max_scroll / PERCENT_SCALE * READING_SCROLL_WEIGHT
        + r.text_selections as f64 * READING_SELECTION_WEIGHT
}

fn kinesthetic_engagement_score(record: &RawMetricsRecord) -> f64 {
    let k = &record.engagement.kinesthetic;
    k.drag_attempts as f64 * KINESTHETIC_DRAG_WEIGHT
        + k.correct_drops as f64 * KINESTHETIC_CORRECT_DROP_WEIGHT
        + k.incorrect_drops as f64 * KINESTHETIC_INCORRECT_DROP_WEIGHT
        + bool_to_f64(k.first_success) * KINESTHETIC_FIRST_SUCCESS_WEIGHT
}

/// Count answers per style code
fn answer_counts(answers: &[u8]) -> [usize; NUM_STYLES] {
    let mut counts = [0usize; NUM_STYLES];
    for &answer in answers {
        if let Some(slot) = counts.get_mut(answer as usize) {
            *slot += 1;
        }
    }
    counts
}

/// Modal answer code and its count; ties resolve to the lowest code
fn dominant_answer(counts: &[usize; NUM_STYLES]) -> (usize, usize) {
    let mut best = (0, counts[0]);
    for (code, &count) in counts.iter().enumerate().skip(1) {
        if count > best.1 {
            best = (code, count);
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{
        AuditoryEngagement, Engagement, KinestheticEngagement, ReadingEngagement,
        VisualEngagement,
    };
    use pretty_assertions::assert_eq;

    fn make_test_record() -> RawMetricsRecord {
        RawMetricsRecord::new(
            Engagement {
                visual: VisualEngagement {
                    clicks: 15,
                    time_spent: 300.0,
                    video_plays: 4,
                    video_pauses: 2,
                    video_completion: 80.0,
                    hover_time: 30.0,
                    revisits: 1,
                },
                auditory: AuditoryEngagement {
                    clicks: 3,
                    time_spent: 45.0,
                    audio_plays: 1,
                    audio_pauses: 1,
                    audio_completion: 20.0,
                    audio_seeks: 2,
                    hover_time: 5.0,
                    revisits: 0,
                },
                reading: ReadingEngagement {
                    clicks: 5,
                    time_spent: 80.0,
                    scroll_depth: 30.0,
                    max_scroll: 50.0,
                    text_selections: 3,
                    hover_time: 10.0,
                    revisits: 2,
                },
                kinesthetic: KinestheticEngagement {
                    clicks: 2,
                    time_spent: 30.0,
                    drag_attempts: 4,
                    incorrect_drops: 2,
                    correct_drops: 1,
                    completion_time: 25.0,
                    first_success: true,
                    reset_clicks: 1,
                    hover_time: 3.0,
                    revisits: 0,
                },
            },
            vec![0, 0, 1, 0, 2, 0, 0, 1, 0, 0],
        )
    }

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-12
    }

    #[test]
    fn test_column_counts() {
        assert_eq!(feature_columns(FeatureSchema::Full).len(), 72);
        assert_eq!(feature_columns(FeatureSchema::Compact).len(), 38);

        let fv = engineer(&make_test_record(), FeatureSchema::Full).unwrap();
        assert_eq!(fv.len(), 72);
        let columns: Vec<String> = fv.columns().iter().map(|c| c.to_string()).collect();
        assert_eq!(columns, feature_columns(FeatureSchema::Full));
    }

    #[test]
    fn test_column_order_prefix() {
        let columns = feature_columns(FeatureSchema::Full);
        assert_eq!(columns[0], "visual_clicks");
        assert_eq!(columns[31], "kinesthetic_revisits");
        assert_eq!(columns[32], "q1");
        assert_eq!(columns[41], "q10");
        assert_eq!(columns[42], "total_clicks");
        assert_eq!(columns[71], "kinesthetic_quality");
    }

    #[test]
    fn test_totals_and_ratios() {
        let fv = engineer(&make_test_record(), FeatureSchema::Full).unwrap();

        assert_eq!(fv.get("total_clicks"), Some(25.0));
        assert_eq!(fv.get("total_time"), Some(455.0));
        assert_eq!(fv.get("total_hover"), Some(48.0));
        assert_eq!(fv.get("total_revisits"), Some(3.0));

        assert!(approx(fv.get("visual_click_ratio").unwrap(), 15.0 / 26.0));
        assert!(approx(fv.get("kinesthetic_time_ratio").unwrap(), 30.0 / 456.0));
        assert!(approx(fv.get("reading_avg_time").unwrap(), 80.0 / 6.0));
    }

    #[test]
    fn test_total_revisits_does_not_overflow() {
        let mut record = make_test_record();
        record.engagement.visual.revisits = u32::MAX;
        record.engagement.auditory.revisits = 1;
        record.engagement.reading.revisits = 0;
        record.engagement.kinesthetic.revisits = 0;

        let fv = engineer(&record, FeatureSchema::Full).unwrap();
        assert_eq!(fv.get("total_revisits"), Some(u32::MAX as f64 + 1.0));
    }

    #[test]
    fn test_engagement_scores() {
        let fv = engineer(&make_test_record(), FeatureSchema::Full).unwrap();

        // 4*2 + 0.8*5 + 2*0.5
        assert!(approx(fv.get("visual_engagement_score").unwrap(), 13.0));
        // 1*2 + 0.2*5 + 2*1.5 + 1*0.5
        assert!(approx(fv.get("auditory_engagement_score").unwrap(), 6.5));
        // 0.5*5 + 3*2
        assert!(approx(fv.get("reading_engagement_score").unwrap(), 8.5));
        // 4*0.5 + 1*3 - 2*0.5 + 5
        assert!(approx(fv.get("kinesthetic_engagement_score").unwrap(), 9.0));
    }

    #[test]
    fn test_interaction_quality() {
        let fv = engineer(&make_test_record(), FeatureSchema::Full).unwrap();

        assert!(approx(fv.get("visual_quality").unwrap(), 80.0 * 300.0 / 1000.0));
        assert!(approx(fv.get("auditory_quality").unwrap(), 20.0 * 45.0 / 1000.0));
        assert!(approx(fv.get("reading_quality").unwrap(), 50.0 * 3.0 / 10.0));
        assert!(approx(fv.get("kinesthetic_quality").unwrap(), 1.0 / 5.0 * 100.0));
    }

    #[test]
    fn test_questionnaire_features() {
        let fv = engineer(&make_test_record(), FeatureSchema::Full).unwrap();

        assert_eq!(fv.get("answer_0_count"), Some(7.0));
        assert_eq!(fv.get("answer_1_count"), Some(2.0));
        assert_eq!(fv.get("answer_2_count"), Some(1.0));
        assert_eq!(fv.get("answer_3_count"), Some(0.0));
        assert_eq!(fv.get("dominant_answer"), Some(0.0));
        assert!(approx(fv.get("answer_consistency").unwrap(), 0.7));
        assert_eq!(fv.get("q5"), Some(2.0));
    }

    #[test]
    fn test_dominant_answer_tie_picks_lowest_code() {
        // 3x code 1, 3x code 3, 2x code 0, 2x code 2
        let counts = answer_counts(&[3, 1, 3, 1, 3, 1, 0, 0, 2, 2]);
        assert_eq!(counts, [2, 3, 2, 3]);
        assert_eq!(dominant_answer(&counts), (1, 3));
    }

    #[test]
    fn test_compact_schema_subset() {
        let record = make_test_record();
        let full = engineer(&record, FeatureSchema::Full).unwrap();
        let compact = engineer(&record, FeatureSchema::Compact).unwrap();

        assert_eq!(compact.len(), 38);
        assert!(compact.get("video_plays").is_none());
        assert!(compact.get("visual_quality").is_none());
        for (column, value) in compact.columns().iter().zip(compact.values()) {
            assert_eq!(full.get(column), Some(*value), "column {}", column);
        }
    }

    #[test]
    fn test_all_zero_session_ratios_are_finite() {
        let record =
            RawMetricsRecord::new(Engagement::default(), vec![0, 1, 2, 3, 0, 1, 2, 3, 0, 1]);
        let fv = engineer(&record, FeatureSchema::Full).unwrap();

        for modality in MODALITIES {
            for kind in ["click_ratio", "time_ratio"] {
                let value = fv.get(&format!("{}_{}", modality, kind)).unwrap();
                assert!((0.0..1.0).contains(&value));
            }
            assert_eq!(fv.get(&format!("{}_avg_time", modality)), Some(0.0));
        }
        assert!(fv.values().iter().all(|v| v.is_finite()));
        assert_eq!(fv.get("dominant_answer"), Some(0.0));
        assert!(approx(fv.get("answer_consistency").unwrap(), 0.3));
    }

    #[test]
    fn test_ratios_stay_below_one() {
        let mut record = make_test_record();
        record.engagement.auditory.clicks = 0;
        record.engagement.reading.clicks = 0;
        record.engagement.kinesthetic.clicks = 0;
        record.engagement.visual.clicks = 1_000_000;
        let fv = engineer(&record, FeatureSchema::Compact).unwrap();

        let ratio = fv.get("visual_click_ratio").unwrap();
        assert!(ratio > 0.0 && ratio < 1.0);
    }

    #[test]
    fn test_engineering_is_deterministic() {
        let record = make_test_record();
        let a = engineer(&record, FeatureSchema::Full).unwrap();
        let b = engineer(&record, FeatureSchema::Full).unwrap();

        let bits_a: Vec<u64> = a.values().iter().map(|v| v.to_bits()).collect();
        let bits_b: Vec<u64> = b.values().iter().map(|v| v.to_bits()).collect();
        assert_eq!(bits_a, bits_b);
    }

    #[test]
    fn test_invalid_record_rejected() {
        let mut record = make_test_record();
        record.questionnaire.push(1);
        assert!(matches!(
            engineer(&record, FeatureSchema::Full),
            Err(ComputeError::QuestionnaireLength { .. })
        ));
    }

    #[test]
    fn test_engineer_batch() {
        let records = vec![make_test_record(), make_test_record()];
        let matrix = engineer_batch(&records, FeatureSchema::Compact).unwrap();

        assert_eq!(matrix.n_rows(), 2);
        assert_eq!(matrix.n_columns(), 38);
        assert_eq!(matrix.rows()[0], matrix.rows()[1]);
        assert!(matrix.ensure_numeric().is_ok());
    }

    #[test]
    fn test_matrix_shape_and_numeric_checks() {
        let columns = vec!["a".to_string(), "b".to_string()];
        assert!(matches!(
            FeatureMatrix::new(columns.clone(), vec![vec![1.0]]),
            Err(ComputeError::ShapeMismatch(_))
        ));

        let matrix =
            FeatureMatrix::new(columns, vec![vec![1.0, 2.0], vec![f64::NAN, 0.0]]).unwrap();
        match matrix.ensure_numeric() {
            Err(ComputeError::NonNumericFeature { column, row }) => {
                assert_eq!(column, "a");
                assert_eq!(row, 1);
            }
            other => panic!("expected NonNumericFeature, got {:?}", other),
        }
    }
}
