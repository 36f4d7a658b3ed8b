//! Score aggregation. Total functions — any input yields a value in [0,10].

use crate::models::{FeedbackRecord, InterviewSummary};

/// Counteracts model leniency in self-reported scores.
const CALIBRATION: f64 = 0.85;

fn clamp_score(value: f64) -> Option<f64> {
    if value.is_finite() {
        Some(value.clamp(0.0, 10.0))
    } else {
        None
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Aggregate a per-answer feedback record into one bounded score.
///
/// Out-of-range values are clamped into [0,10]; non-finite values are
/// ignored. No usable score at all yields 0.
pub fn score(feedback: &FeedbackRecord) -> f64 {
    let scores: Vec<f64> = [feedback.correctness, feedback.clarity, feedback.confidence]
        .into_iter()
        .flatten()
        .filter_map(clamp_score)
        .collect();

    if scores.is_empty() {
        return 0.0;
    }

    let mean = scores.iter().sum::<f64>() / scores.len() as f64;
    round2(mean * CALIBRATION)
}

/// Final interview score: the summary's overall score, clamped and rounded.
pub fn summary_score(summary: &InterviewSummary) -> f64 {
    round2(clamp_score(summary.overall_score).unwrap_or(0.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feedback(c: Option<f64>, cl: Option<f64>, co: Option<f64>) -> FeedbackRecord {
        FeedbackRecord {
            correctness: c,
            clarity: cl,
            confidence: co,
            ..Default::default()
        }
    }

    #[test]
    fn test_score_is_calibrated_mean() {
        let s = score(&feedback(Some(8.0), Some(7.0), Some(9.0)));
        assert_eq!(s, 6.8); // mean 8.0 * 0.85
    }

    #[test]
    fn test_score_with_partial_fields() {
        let s = score(&feedback(Some(10.0), None, None));
        assert_eq!(s, 8.5);
    }

    #[test]
    fn test_score_empty_is_zero() {
        assert_eq!(score(&feedback(None, None, None)), 0.0);
    }

    #[test]
    fn test_score_clamps_out_of_range_values() {
        let s = score(&feedback(Some(15.0), Some(-3.0), None));
        // 15 → 10, -3 → 0, mean 5.0, calibrated 4.25
        assert_eq!(s, 4.25);
    }

    #[test]
    fn test_score_ignores_non_finite_values() {
        let s = score(&feedback(Some(f64::NAN), Some(f64::INFINITY), Some(8.0)));
        assert_eq!(s, 6.8);
    }

    #[test]
    fn test_score_stays_in_bounds() {
        for c in [-100.0, -1.0, 0.0, 5.0, 10.0, 11.0, 1e9] {
            let s = score(&feedback(Some(c), Some(c), Some(c)));
            assert!((0.0..=10.0).contains(&s), "score {s} out of bounds for {c}");
        }
    }

    #[test]
    fn test_score_is_idempotent() {
        let record = feedback(Some(7.3), Some(6.1), Some(8.8));
        assert_eq!(score(&record), score(&record));
    }

    #[test]
    fn test_score_rounds_to_two_decimals() {
        let s = score(&feedback(Some(7.0), Some(7.0), Some(8.0)));
        // mean 7.3333... * 0.85 = 6.2333... → 6.23
        assert_eq!(s, 6.23);
    }

    #[test]
    fn test_summary_score_clamps() {
        let mut summary = InterviewSummary {
            overall_score: 12.0,
            ..Default::default()
        };
        assert_eq!(summary_score(&summary), 10.0);

        summary.overall_score = f64::NAN;
        assert_eq!(summary_score(&summary), 0.0);

        summary.overall_score = 7.456;
        assert_eq!(summary_score(&summary), 7.46);
    }
}
