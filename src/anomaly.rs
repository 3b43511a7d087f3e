use tracing::debug;

use crate::history::History;
use crate::models::{AnomalyResult, Severity};
use crate::stats::{mad, mean, median, quantile, round_to, std_deviation};

pub const MIN_CYCLES: usize = 3;
const MODIFIED_Z_SCALE: f64 = 0.6745;
const IQR_FENCE: f64 = 1.5;

/// Raw scores for one cycle against its history.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnomalyScores {
    pub z_score: f64,
    pub modified_z_score: f64,
    pub iqr_outlier: bool,
    pub score: f64,
}

/// Score `current` against `historical` lengths.
///
/// A zero spread (std or MAD) yields a zero score for that measure, so an
/// otherwise perfectly regular history never divides by zero.
pub fn score(current: f64, historical: &[f64]) -> AnomalyScores {
    let mean = mean(historical);
    let std = std_deviation(historical);
    let z_score = if std > 0.0 {
        (current - mean).abs() / std
    } else {
        0.0
    };

    let spread = mad(historical);
    let modified_z_score = if spread > 0.0 {
        MODIFIED_Z_SCALE * (current - median(historical)) / spread
    } else {
        0.0
    };

    let q1 = quantile(historical, 0.25);
    let q3 = quantile(historical, 0.75);
    let iqr = q3 - q1;
    let iqr_outlier = current < q1 - IQR_FENCE * iqr || current > q3 + IQR_FENCE * iqr;

    let combined = z_score / 3.0
        + modified_z_score.abs() / 3.5
        + if iqr_outlier { 0.5 } else { 0.0 };

    AnomalyScores {
        z_score,
        modified_z_score,
        iqr_outlier,
        score: (combined / 2.5).clamp(0.0, 1.0),
    }
}

/// Compare the newest completed cycle with every older completed cycle.
pub fn detect(history: &History) -> AnomalyResult {
    if history.record_count() < MIN_CYCLES {
        return AnomalyResult::not_enough_data("Not enough data for anomaly detection");
    }
    let lengths = history.completed_lengths();
    let Some((&current, historical)) = lengths.split_last() else {
        return AnomalyResult::not_enough_data("Need completed cycle data");
    };
    if lengths.len() < MIN_CYCLES {
        return AnomalyResult::not_enough_data("Need completed cycle data");
    }

    let scores = score(current, historical);
    let average = mean(historical);
    let severity = Severity::from_z_score(scores.z_score);
    let detected = severity != Severity::None;
    let longer = current > average;
    debug!(current, average, ?severity, score = scores.score, "anomaly scored");

    AnomalyResult {
        detected,
        score: round_to(scores.score, 2),
        severity,
        current_length: Some(current as u32),
        average_length: Some(round_to(average, 1)),
        z_score: round_to(scores.z_score, 2),
        modified_z_score: round_to(scores.modified_z_score, 2),
        iqr_outlier: scores.iqr_outlier,
        description: describe(detected, scores.iqr_outlier, current, average),
        recommendation: recommend(severity, longer),
    }
}

fn describe(detected: bool, iqr_outlier: bool, current: f64, average: f64) -> String {
    let difference = (current - average).abs().round() as i64;
    if detected {
        if current > average {
            format!("This cycle was {difference} days longer than your usual pattern")
        } else {
            format!("This cycle was {difference} days shorter than your usual pattern")
        }
    } else if iqr_outlier {
        "This cycle length is outside your typical range, but not far enough to flag".to_string()
    } else {
        "This cycle length is within your normal range".to_string()
    }
}

fn recommend(severity: Severity, longer: bool) -> Option<String> {
    let text = match (severity, longer) {
        (Severity::None, _) => return None,
        (Severity::Mild, _) => "Keep tracking - a single unusual cycle is common",
        (Severity::Moderate, _) => "Note any changes in stress, sleep, travel or routine this cycle",
        (Severity::Significant, true) => {
            "Consider consulting a healthcare provider if long cycles continue"
        }
        (Severity::Significant, false) => {
            "Consider consulting a healthcare provider if short cycles continue"
        }
    };
    Some(text.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CycleRecord;
    use approx::assert_abs_diff_eq;
    use chrono::{Duration, NaiveDate};

    /// Chronological lengths; the last one is the cycle being scored.
    fn make_history(lengths: &[u32]) -> History {
        let mut start = NaiveDate::from_ymd_opt(2025, 1, 2).unwrap();
        let mut records = Vec::new();
        for &len in lengths {
            records.push(CycleRecord::new(start, Some(len)));
            start += Duration::days(i64::from(len));
        }
        records.push(CycleRecord::new(start, None));
        records.reverse();
        History::from_newest_first(&records)
    }

    #[test]
    fn needs_three_completed_cycles() {
        let result = detect(&make_history(&[28, 28]));
        assert!(!result.detected);
        assert_eq!(result.description, "Need completed cycle data");

        let result = detect(&make_history(&[28]));
        assert_eq!(result.description, "Not enough data for anomaly detection");
    }

    #[test]
    fn regular_history_is_not_anomalous() {
        let result = detect(&make_history(&[28; 11]));
        assert!(!result.detected);
        assert_eq!(result.severity, Severity::None);
        assert_eq!(result.z_score, 0.0);
        assert_eq!(result.current_length, Some(28));
    }

    #[test]
    fn zero_spread_history_guards_z_score() {
        let mut lengths = vec![28; 9];
        lengths.push(40);
        let result = detect(&make_history(&lengths));
        assert_eq!(result.z_score, 0.0);
        assert_eq!(result.modified_z_score, 0.0);
        assert!(!result.detected);
        assert_eq!(result.severity, Severity::None);
        // only the IQR rule fires: 0.5 / 2.5
        assert!(result.iqr_outlier);
        assert_abs_diff_eq!(result.score, 0.2);
        assert_eq!(result.current_length, Some(40));
        assert_eq!(result.average_length, Some(28.0));
    }

    #[test]
    fn long_cycle_is_flagged() {
        // historical mean 28, population std 1
        let result = detect(&make_history(&[27, 29, 27, 29, 27, 29, 31]));
        assert_abs_diff_eq!(result.z_score, 3.0);
        assert!(result.detected);
        assert_eq!(result.severity, Severity::Significant);
        assert_eq!(
            result.description,
            "This cycle was 3 days longer than your usual pattern"
        );
        assert_eq!(
            result.recommendation.as_deref(),
            Some("Consider consulting a healthcare provider if long cycles continue")
        );
    }

    #[test]
    fn severity_bands_follow_z_score() {
        let historical = [27.0, 29.0, 27.0, 29.0];
        assert_eq!(Severity::from_z_score(score(29.6, &historical).z_score), Severity::Mild);
        assert_eq!(Severity::from_z_score(score(30.2, &historical).z_score), Severity::Moderate);
        assert_eq!(Severity::from_z_score(score(25.0, &historical).z_score), Severity::Significant);
    }

    #[test]
    fn deviations_above_and_below_score_the_same() {
        let historical = [26.0, 27.0, 28.0, 29.0, 30.0];
        let std = std_deviation(&historical);
        let above = score(28.0 + 2.0 * std, &historical);
        let below = score(28.0 - 2.0 * std, &historical);
        assert_abs_diff_eq!(above.z_score, below.z_score, epsilon = 1e-12);
        assert_abs_diff_eq!(above.score, below.score, epsilon = 1e-12);
        assert_eq!(above.iqr_outlier, below.iqr_outlier);
    }
}
