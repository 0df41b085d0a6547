//! Core data types
//!
//! This module defines the learning style domain, the raw engagement record that
//! flows into feature engineering, and the score types that flow out of prediction.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ComputeError;

/// Number of questionnaire answers per record
pub const QUESTIONNAIRE_LEN: usize = 10;

/// Number of learning style categories
pub const NUM_STYLES: usize = 4;

/// VARK learning style categories, in canonical class-index order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum LearningStyle {
    Visual,
    Auditory,
    Reading,
    Kinesthetic,
}

impl LearningStyle {
    /// All styles in class-index order
    pub const ALL: [LearningStyle; NUM_STYLES] = [
        LearningStyle::Visual,
        LearningStyle::Auditory,
        LearningStyle::Reading,
        LearningStyle::Kinesthetic,
    ];

    /// Dense code (0=Visual, 1=Auditory, 2=Reading, 3=Kinesthetic).
    ///
    /// This is also the questionnaire answer encoding.
    pub fn code(self) -> u8 {
        match self {
            LearningStyle::Visual => 0,
            LearningStyle::Auditory => 1,
            LearningStyle::Reading => 2,
            LearningStyle::Kinesthetic => 3,
        }
    }

    /// Style for a dense code, if the code is in range
    pub fn from_code(code: u8) -> Option<Self> {
        Self::ALL.get(code as usize).copied()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LearningStyle::Visual => "Visual",
            LearningStyle::Auditory => "Auditory",
            LearningStyle::Reading => "Reading",
            LearningStyle::Kinesthetic => "Kinesthetic",
        }
    }

    /// Prose description shown alongside a prediction
    pub fn description(self) -> &'static str {
        match self {
            LearningStyle::Visual => {
                "You learn best through visual aids such as diagrams, charts, videos, and spatial \
                 understanding. Visual learners often prefer to see information presented \
                 graphically and may think in pictures. To optimize your learning, use \
                 color-coding, mind maps, and visual cues when studying."
            }
            LearningStyle::Auditory => {
                "You learn best through listening and verbal communication. Auditory learners \
                 benefit from discussions, lectures, and talking through concepts. To enhance \
                 your learning, consider reading aloud, participating in group discussions, and \
                 using voice recordings for review."
            }
            LearningStyle::Reading => {
                "You learn best through written words and text-based input. Reading/writing \
                 learners excel when information is displayed as text and benefit from making \
                 lists, reading textbooks, and taking detailed notes. To maximize your learning, \
                 focus on text-based resources and writing summaries of information."
            }
            LearningStyle::Kinesthetic => {
                "You learn best through physical activities and hands-on experiences. \
                 Kinesthetic learners need to touch, move, and do in order to understand concepts \
                 fully. To improve your learning, incorporate movement into study sessions, use \
                 hands-on experiments, and take frequent breaks for physical activity."
            }
        }
    }
}

impl fmt::Display for LearningStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LearningStyle {
    type Err = ComputeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "Visual" | "visual" => Ok(LearningStyle::Visual),
            "Auditory" | "auditory" => Ok(LearningStyle::Auditory),
            "Reading" | "reading" => Ok(LearningStyle::Reading),
            "Kinesthetic" | "kinesthetic" => Ok(LearningStyle::Kinesthetic),
            other => Err(ComputeError::UnknownStyle(other.to_string())),
        }
    }
}

/// Engagement with visual (video/diagram) content
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VisualEngagement {
    pub clicks: u32,
    /// Seconds spent on visual content
    pub time_spent: f64,
    #[serde(default)]
    pub video_plays: u32,
    #[serde(default)]
    pub video_pauses: u32,
    /// Video completion in percent (0-100)
    #[serde(default)]
    pub video_completion: f64,
    #[serde(default)]
    pub hover_time: f64,
    #[serde(default)]
    pub revisits: u32,
}

/// Engagement with auditory (audio/narration) content
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditoryEngagement {
    pub clicks: u32,
    pub time_spent: f64,
    #[serde(default)]
    pub audio_plays: u32,
    #[serde(default)]
    pub audio_pauses: u32,
    /// Audio completion in percent (0-100)
    #[serde(default)]
    pub audio_completion: f64,
    #[serde(default)]
    pub audio_seeks: u32,
    #[serde(default)]
    pub hover_time: f64,
    #[serde(default)]
    pub revisits: u32,
}

/// Engagement with reading (text) content
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadingEngagement {
    pub clicks: u32,
    pub time_spent: f64,
    /// Final scroll depth in percent
    #[serde(default)]
    pub scroll_depth: f64,
    /// Deepest scroll position reached in percent
    #[serde(default)]
    pub max_scroll: f64,
    #[serde(default)]
    pub text_selections: u32,
    #[serde(default)]
    pub hover_time: f64,
    #[serde(default)]
    pub revisits: u32,
}

/// Engagement with kinesthetic (drag-and-drop) activities
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KinestheticEngagement {
    pub clicks: u32,
    pub time_spent: f64,
    #[serde(default)]
    pub drag_attempts: u32,
    #[serde(default)]
    pub incorrect_drops: u32,
    #[serde(default)]
    pub correct_drops: u32,
    /// Seconds taken to finish the activity
    #[serde(default)]
    pub completion_time: f64,
    /// Whether the activity succeeded on the first attempt
    #[serde(default)]
    pub first_success: bool,
    #[serde(default)]
    pub reset_clicks: u32,
    #[serde(default)]
    pub hover_time: f64,
    #[serde(default)]
    pub revisits: u32,
}

/// The four per-modality engagement blocks of a session
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Engagement {
    pub visual: VisualEngagement,
    pub auditory: AuditoryEngagement,
    pub reading: ReadingEngagement,
    pub kinesthetic: KinestheticEngagement,
}

/// One user session: engagement telemetry plus questionnaire answers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawMetricsRecord {
    pub engagement: Engagement,
    /// Exactly [`QUESTIONNAIRE_LEN`] answer codes in 0..=3
    pub questionnaire: Vec<u8>,
}

impl RawMetricsRecord {
    /// Build a record from engagement blocks and answers
    pub fn new(engagement: Engagement, questionnaire: Vec<u8>) -> Self {
        Self {
            engagement,
            questionnaire,
        }
    }

    /// Check record invariants.
    ///
    /// Rejects questionnaires that are not exactly 10 codes in 0..=3 and any
    /// negative or non-finite time/percent value.
    pub fn validate(&self) -> Result<(), ComputeError> {
        if self.questionnaire.len() != QUESTIONNAIRE_LEN {
            return Err(ComputeError::QuestionnaireLength {
                expected: QUESTIONNAIRE_LEN,
                actual: self.questionnaire.len(),
            });
        }
        for (index, &code) in self.questionnaire.iter().enumerate() {
            if LearningStyle::from_code(code).is_none() {
                return Err(ComputeError::QuestionnaireCode { index, code });
            }
        }

        let e = &self.engagement;
        let continuous = [
            ("visual.timeSpent", e.visual.time_spent),
            ("visual.videoCompletion", e.visual.video_completion),
            ("visual.hoverTime", e.visual.hover_time),
            ("auditory.timeSpent", e.auditory.time_spent),
            ("auditory.audioCompletion", e.auditory.audio_completion),
            ("auditory.hoverTime", e.auditory.hover_time),
            ("reading.timeSpent", e.reading.time_spent),
            ("reading.scrollDepth", e.reading.scroll_depth),
            ("reading.maxScroll", e.reading.max_scroll),
            ("reading.hoverTime", e.reading.hover_time),
            ("kinesthetic.timeSpent", e.kinesthetic.time_spent),
            ("kinesthetic.completionTime", e.kinesthetic.completion_time),
            ("kinesthetic.hoverTime", e.kinesthetic.hover_time),
        ];
        for (field, value) in continuous {
            if !value.is_finite() || value < 0.0 {
                return Err(ComputeError::SchemaError(format!(
                    "{} must be a non-negative number, got {}",
                    field, value
                )));
            }
        }

        Ok(())
    }
}

/// A metrics record with its ground-truth learning style
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabeledRecord {
    #[serde(flatten)]
    pub record: RawMetricsRecord,
    pub label: LearningStyle,
}

/// Per-style probability mapping
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StyleScores {
    #[serde(rename = "Visual")]
    pub visual: f64,
    #[serde(rename = "Auditory")]
    pub auditory: f64,
    #[serde(rename = "Reading")]
    pub reading: f64,
    #[serde(rename = "Kinesthetic")]
    pub kinesthetic: f64,
}

impl StyleScores {
    /// Build from a probability vector in class-index order
    pub fn from_probabilities(probs: &[f64]) -> Result<Self, ComputeError> {
        if probs.len() != NUM_STYLES {
            return Err(ComputeError::ShapeMismatch(format!(
                "expected {} class probabilities, got {}",
                NUM_STYLES,
                probs.len()
            )));
        }
        Ok(Self {
            visual: probs[0],
            auditory: probs[1],
            reading: probs[2],
            kinesthetic: probs[3],
        })
    }

    pub fn get(&self, style: LearningStyle) -> f64 {
        match style {
            LearningStyle::Visual => self.visual,
            LearningStyle::Auditory => self.auditory,
            LearningStyle::Reading => self.reading,
            LearningStyle::Kinesthetic => self.kinesthetic,
        }
    }

    pub fn to_vec(&self) -> Vec<f64> {
        LearningStyle::ALL.iter().map(|&s| self.get(s)).collect()
    }
}

/// Fused classification of a single record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StylePrediction {
    pub style: LearningStyle,
    /// Maximum entry of the fused probability vector
    pub confidence: f64,
    pub scores: StyleScores,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn record_with_answers(answers: Vec<u8>) -> RawMetricsRecord {
        RawMetricsRecord::new(Engagement::default(), answers)
    }

    #[test]
    fn test_style_codes_roundtrip() {
        for style in LearningStyle::ALL {
            assert_eq!(LearningStyle::from_code(style.code()), Some(style));
        }
        assert_eq!(LearningStyle::from_code(4), None);
    }

    #[test]
    fn test_style_from_str() {
        assert_eq!("Visual".parse::<LearningStyle>().unwrap(), LearningStyle::Visual);
        assert_eq!(
            " kinesthetic ".parse::<LearningStyle>().unwrap(),
            LearningStyle::Kinesthetic
        );
        assert!(matches!(
            "Musical".parse::<LearningStyle>(),
            Err(ComputeError::UnknownStyle(_))
        ));
    }

    #[test]
    fn test_validate_questionnaire_length() {
        let record = record_with_answers(vec![0; 9]);
        assert!(matches!(
            record.validate(),
            Err(ComputeError::QuestionnaireLength {
                expected: 10,
                actual: 9
            })
        ));
    }

    #[test]
    fn test_validate_questionnaire_code() {
        let mut answers = vec![0; 10];
        answers[7] = 4;
        assert!(matches!(
            record_with_answers(answers).validate(),
            Err(ComputeError::QuestionnaireCode { index: 7, code: 4 })
        ));
    }

    #[test]
    fn test_validate_negative_time() {
        let mut record = record_with_answers(vec![1; 10]);
        record.engagement.reading.time_spent = -3.0;
        assert!(matches!(record.validate(), Err(ComputeError::SchemaError(_))));

        record.engagement.reading.time_spent = f64::NAN;
        assert!(record.validate().is_err());
    }

    #[test]
    fn test_secondary_signals_default_to_zero() {
        let json = r#"{
            "engagement": {
                "visual": {"clicks": 15, "timeSpent": 300},
                "auditory": {"clicks": 3, "timeSpent": 45},
                "reading": {"clicks": 5, "timeSpent": 80},
                "kinesthetic": {"clicks": 2, "timeSpent": 30}
            },
            "questionnaire": [0, 0, 1, 0, 2, 0, 0, 1, 0, 0]
        }"#;
        let record: RawMetricsRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.engagement.visual.video_plays, 0);
        assert_eq!(record.engagement.kinesthetic.first_success, false);
        assert_eq!(record.engagement.reading.max_scroll, 0.0);
        assert!(record.validate().is_ok());
    }

    #[test]
    fn test_style_scores_order() {
        let scores = StyleScores::from_probabilities(&[0.1, 0.2, 0.3, 0.4]).unwrap();
        assert_eq!(scores.get(LearningStyle::Reading), 0.3);
        assert_eq!(scores.to_vec(), vec![0.1, 0.2, 0.3, 0.4]);
        assert!(StyleScores::from_probabilities(&[0.5, 0.5]).is_err());

        let json = serde_json::to_value(scores).unwrap();
        assert_eq!(json["Kinesthetic"], 0.4);
    }
}
