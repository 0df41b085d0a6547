//! Synthetic training data
//!
//! Generates class-balanced labeled records for bootstrapping a model before real
//! labeled sessions exist. The true style's modality is drawn from "high engagement"
//! ranges and the other modalities from "low engagement" ranges, so the dominant
//! engagement pattern identifies the label by construction. Questionnaire answers
//! follow the label with probability 0.7 and are uniform noise otherwise.
//!
//! All integer ranges are half-open (`lo..hi`).

use std::ops::Range;

use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::types::{
    AuditoryEngagement, Engagement, KinestheticEngagement, LabeledRecord, LearningStyle,
    RawMetricsRecord, ReadingEngagement, VisualEngagement, NUM_STYLES, QUESTIONNAIRE_LEN,
};

/// Probability that a questionnaire answer matches the true style
pub const QUESTIONNAIRE_FIDELITY: f64 = 0.7;

/// Default number of synthesized sessions
pub const DEFAULT_SAMPLES: usize = 5000;

/// Default generator seed
pub const DEFAULT_SEED: u64 = 42;

/// Ranges for a visual block
struct VisualRanges {
    clicks: Range<u32>,
    time: Range<u32>,
    plays: Range<u32>,
    pauses: Range<u32>,
    completion: Range<u32>,
    hover: Range<u32>,
    revisits: Range<u32>,
}

struct AuditoryRanges {
    clicks: Range<u32>,
    time: Range<u32>,
    plays: Range<u32>,
    pauses: Range<u32>,
    completion: Range<u32>,
    seeks: Range<u32>,
    hover: Range<u32>,
    revisits: Range<u32>,
}

struct ReadingRanges {
    clicks: Range<u32>,
    time: Range<u32>,
    scroll_depth: Range<u32>,
    max_scroll: Range<u32>,
    selections: Range<u32>,
    hover: Range<u32>,
    revisits: Range<u32>,
}

struct KinestheticRanges {
    clicks: Range<u32>,
    time: Range<u32>,
    drag_attempts: Range<u32>,
    incorrect_drops: Range<u32>,
    correct_drops: Range<u32>,
    completion_time: Range<u32>,
    first_success_p: f64,
    reset_clicks: Range<u32>,
    hover: Range<u32>,
    revisits: Range<u32>,
}

const VISUAL_HIGH: VisualRanges = VisualRanges {
    clicks: 8..25,
    time: 120..600,
    plays: 3..10,
    pauses: 1..5,
    completion: 60..100,
    hover: 10..60,
    revisits: 0..3,
};

const VISUAL_LOW: VisualRanges = VisualRanges {
    clicks: 0..8,
    time: 0..120,
    plays: 0..3,
    pauses: 0..2,
    completion: 0..40,
    hover: 0..20,
    revisits: 0..1,
};

/// Visual block drawn for Auditory-true sessions
const VISUAL_LOW_WIDE: VisualRanges = VisualRanges {
    clicks: 0..10,
    time: 0..180,
    ..VISUAL_LOW
};

const AUDITORY_HIGH: AuditoryRanges = AuditoryRanges {
    clicks: 8..25,
    time: 120..600,
    plays: 3..10,
    pauses: 1..5,
    completion: 60..100,
    seeks: 1..5,
    hover: 10..60,
    revisits: 0..3,
};

const AUDITORY_LOW: AuditoryRanges = AuditoryRanges {
    clicks: 0..8,
    time: 0..120,
    plays: 0..3,
    pauses: 0..2,
    completion: 0..40,
    seeks: 0..2,
    hover: 0..20,
    revisits: 0..1,
};

const READING_HIGH: ReadingRanges = ReadingRanges {
    clicks: 8..25,
    time: 120..600,
    scroll_depth: 60..100,
    max_scroll: 70..100,
    selections: 2..8,
    hover: 10..60,
    revisits: 0..3,
};

const READING_LOW: ReadingRanges = ReadingRanges {
    clicks: 0..8,
    time: 0..120,
    scroll_depth: 0..40,
    max_scroll: 0..50,
    selections: 0..2,
    hover: 0..20,
    revisits: 0..1,
};

/// Reading block drawn for Visual-true sessions
const READING_LOW_WIDE: ReadingRanges = ReadingRanges {
    clicks: 0..10,
    time: 0..180,
    scroll_depth: 0..50,
    max_scroll: 0..60,
    selections: 0..3,
    ..READING_LOW
};

const KINESTHETIC_HIGH: KinestheticRanges = KinestheticRanges {
    clicks: 8..25,
    time: 120..600,
    drag_attempts: 5..15,
    incorrect_drops: 1..5,
    correct_drops: 2..4,
    completion_time: 30..180,
    first_success_p: 0.6,
    reset_clicks: 0..4,
    hover: 10..60,
    revisits: 0..3,
};

const KINESTHETIC_LOW: KinestheticRanges = KinestheticRanges {
    clicks: 0..8,
    time: 0..120,
    drag_attempts: 0..5,
    incorrect_drops: 0..3,
    correct_drops: 0..2,
    completion_time: 0..60,
    first_success_p: 0.3,
    reset_clicks: 0..2,
    hover: 0..20,
    revisits: 0..1,
};

/// Kinesthetic block drawn for Reading-true sessions
const KINESTHETIC_LOW_WIDE: KinestheticRanges = KinestheticRanges {
    clicks: 0..10,
    time: 0..180,
    drag_attempts: 0..6,
    correct_drops: 0..3,
    completion_time: 0..80,
    first_success_p: 0.4,
    reset_clicks: 0..3,
    hover: 0..30,
    revisits: 0..2,
    ..KINESTHETIC_LOW
};

/// Seeded generator of labeled training sessions
pub struct Synthesizer {
    rng: ChaCha8Rng,
}

impl Synthesizer {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    /// Generate `n` labeled records
    pub fn generate(&mut self, n: usize) -> Vec<LabeledRecord> {
        (0..n).map(|_| self.next_record()).collect()
    }

    /// Generate one labeled record
    pub fn next_record(&mut self) -> LabeledRecord {
        let label = LearningStyle::ALL[self.rng.gen_range(0..NUM_STYLES)];

        let (visual, auditory, reading, kinesthetic) = match label {
            LearningStyle::Visual => (
                &VISUAL_HIGH,
                &AUDITORY_LOW,
                &READING_LOW_WIDE,
                &KINESTHETIC_LOW,
            ),
            LearningStyle::Auditory => (
                &VISUAL_LOW_WIDE,
                &AUDITORY_HIGH,
                &READING_LOW,
                &KINESTHETIC_LOW,
            ),
            LearningStyle::Reading => (
                &VISUAL_LOW,
                &AUDITORY_LOW,
                &READING_HIGH,
                &KINESTHETIC_LOW_WIDE,
            ),
            LearningStyle::Kinesthetic => (
                &VISUAL_LOW,
                &AUDITORY_LOW,
                &READING_LOW,
                &KINESTHETIC_HIGH,
            ),
        };

        let engagement = Engagement {
            visual: self.draw_visual(visual),
            auditory: self.draw_auditory(auditory),
            reading: self.draw_reading(reading),
            kinesthetic: self.draw_kinesthetic(kinesthetic),
        };
        let questionnaire = self.draw_questionnaire(label);

        LabeledRecord {
            record: RawMetricsRecord::new(engagement, questionnaire),
            label,
        }
    }

    fn draw(&mut self, range: &Range<u32>) -> u32 {
        self.rng.gen_range(range.clone())
    }

    fn draw_f64(&mut self, range: &Range<u32>) -> f64 {
        self.draw(range) as f64
    }

    fn draw_visual(&mut self, r: &VisualRanges) -> VisualEngagement {
        VisualEngagement {
            clicks: self.draw(&r.clicks),
            time_spent: self.draw_f64(&r.time),
            video_plays: self.draw(&r.plays),
            video_pauses: self.draw(&r.pauses),
            video_completion: self.draw_f64(&r.completion),
            hover_time: self.draw_f64(&r.hover),
            revisits: self.draw(&r.revisits),
        }
    }

    fn draw_auditory(&mut self, r: &AuditoryRanges) -> AuditoryEngagement {
        AuditoryEngagement {
            clicks: self.draw(&r.clicks),
            time_spent: self.draw_f64(&r.time),
            audio_plays: self.draw(&r.plays),
            audio_pauses: self.draw(&r.pauses),
            audio_completion: self.draw_f64(&r.completion),
            audio_seeks: self.draw(&r.seeks),
            hover_time: self.draw_f64(&r.hover),
            revisits: self.draw(&r.revisits),
        }
    }

    fn draw_reading(&mut self, r: &ReadingRanges) -> ReadingEngagement {
        ReadingEngagement {
            clicks: self.draw(&r.clicks),
            time_spent: self.draw_f64(&r.time),
            scroll_depth: self.draw_f64(&r.scroll_depth),
            max_scroll: self.draw_f64(&r.max_scroll),
            text_selections: self.draw(&r.selections),
            hover_time: self.draw_f64(&r.hover),
            revisits: self.draw(&r.revisits),
        }
    }

    fn draw_kinesthetic(&mut self, r: &KinestheticRanges) -> KinestheticEngagement {
        KinestheticEngagement {
            clicks: self.draw(&r.clicks),
            time_spent: self.draw_f64(&r.time),
            drag_attempts: self.draw(&r.drag_attempts),
            incorrect_drops: self.draw(&r.incorrect_drops),
            correct_drops: self.draw(&r.correct_drops),
            completion_time: self.draw_f64(&r.completion_time),
            first_success: self.rng.gen_bool(r.first_success_p),
            reset_clicks: self.draw(&r.reset_clicks),
            hover_time: self.draw_f64(&r.hover),
            revisits: self.draw(&r.revisits),
        }
    }

    fn draw_questionnaire(&mut self, label: LearningStyle) -> Vec<u8> {
        (0..QUESTIONNAIRE_LEN)
            .map(|_| {
                if self.rng.gen::<f64>() < QUESTIONNAIRE_FIDELITY {
                    label.code()
                } else {
                    self.rng.gen_range(0..NUM_STYLES as u8)
                }
            })
            .collect()
    }
}

/// Generate `n` labeled records from a fixed seed
pub fn synthesize(n: usize, seed: u64) -> Vec<LabeledRecord> {
    Synthesizer::new(seed).generate(n)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_fixed_seed_is_reproducible() {
        let a = synthesize(200, 7);
        let b = synthesize(200, 7);
        assert_eq!(a, b);
    }

    #[test]
    fn test_different_seeds_differ() {
        assert_ne!(synthesize(50, 1), synthesize(50, 2));
    }

    #[test]
    fn test_records_are_valid() {
        for labeled in synthesize(500, DEFAULT_SEED) {
            assert!(labeled.record.validate().is_ok());
        }
    }

    #[test]
    fn test_roughly_class_balanced() {
        let records = synthesize(4000, DEFAULT_SEED);
        for style in LearningStyle::ALL {
            let count = records.iter().filter(|r| r.label == style).count();
            assert!(count > 850 && count < 1150, "{} has {} records", style, count);
        }
    }

    #[test]
    fn test_true_modality_dominates_engagement() {
        for labeled in synthesize(1000, 3) {
            let e = &labeled.record.engagement;
            let (clicks, time) = match labeled.label {
                LearningStyle::Visual => (e.visual.clicks, e.visual.time_spent),
                LearningStyle::Auditory => (e.auditory.clicks, e.auditory.time_spent),
                LearningStyle::Reading => (e.reading.clicks, e.reading.time_spent),
                LearningStyle::Kinesthetic => (e.kinesthetic.clicks, e.kinesthetic.time_spent),
            };
            assert!((8..25).contains(&clicks));
            assert!((120.0..600.0).contains(&time));
        }
    }

    #[test]
    fn test_low_ranges_respected() {
        for labeled in synthesize(1000, 11) {
            let e = &labeled.record.engagement;
            match labeled.label {
                LearningStyle::Kinesthetic => {
                    assert!(e.visual.video_plays < 3);
                    assert!(e.auditory.audio_seeks < 2);
                    assert!(e.reading.max_scroll < 50.0);
                    assert!((5..15).contains(&e.kinesthetic.drag_attempts));
                }
                LearningStyle::Visual => {
                    assert!(e.reading.clicks < 10);
                    assert!(e.reading.max_scroll < 60.0);
                    assert!(e.kinesthetic.correct_drops < 2);
                }
                _ => {}
            }
        }
    }

    #[test]
    fn test_questionnaire_follows_label() {
        let records = synthesize(2000, 5);
        let mut matching = 0usize;
        let mut total = 0usize;
        for labeled in &records {
            assert_eq!(labeled.record.questionnaire.len(), QUESTIONNAIRE_LEN);
            total += QUESTIONNAIRE_LEN;
            matching += labeled
                .record
                .questionnaire
                .iter()
                .filter(|&&a| a == labeled.label.code())
                .count();
        }
        // 0.7 + 0.3 * 0.25 = 0.775 expected agreement
        let agreement = matching as f64 / total as f64;
        assert!((agreement - 0.775).abs() < 0.02, "agreement {}", agreement);
    }
}
