use chrono::{Duration, NaiveDate};
use tracing::{debug, warn};

use crate::config::EngineConfig;
use crate::error::EstimatorError;
use crate::estimators::statistical::{self, StatisticalSummary};
use crate::estimators::{self, EstimationContext, Estimate};
use crate::health::BmiCategory;
use crate::history::History;
use crate::models::{
    FertilityWindow, HealthMetrics, Method, Prediction, PredictionQuality, ProbabilityWindow,
};
use crate::stats::round_to;

pub const BASELINE_CYCLE_LENGTH: f64 = 28.0;
pub const BASELINE_CONFIDENCE: f64 = 0.35;
pub const BASELINE_HALF_WIDTH: i64 = 4;
/// Never report full certainty.
pub const MAX_CONFIDENCE: f64 = 0.95;

/// Confidence-weighted blend of the estimates that cleared the floor.
#[derive(Debug, Clone, PartialEq)]
pub struct Reconciled {
    pub predicted_length: f64,
    pub confidence: f64,
    pub methods: Vec<Method>,
}

/// Predict the next period start from a cycle history.
///
/// Returns `None` for an empty history, or when the last start sits so close
/// to the end of the calendar that no later date exists. Fewer than two
/// completed cycles gives the fixed 28-day baseline.
pub fn predict(
    history: &History,
    health: Option<&HealthMetrics>,
    today: NaiveDate,
    config: &EngineConfig,
) -> Option<Prediction> {
    let last_start = history.last_start()?;

    let lengths = history.completed_lengths();
    let summary = match statistical::summarize(&lengths) {
        Ok(summary) => summary,
        Err(_) => return baseline(last_start, history.record_count()),
    };

    let ctx = EstimationContext {
        history,
        health: health.map(|m| m.features_on(today)).unwrap_or_default(),
        config,
    };

    let mut insights = Vec::new();
    let mut estimates = Vec::new();
    for estimator in estimators::enabled(config) {
        match estimator.estimate(&ctx) {
            Ok(estimate) => {
                debug!(
                    method = ?estimate.method,
                    length = estimate.predicted_length,
                    confidence = estimate.confidence,
                    "estimate"
                );
                estimates.push(estimate);
            }
            Err(EstimatorError::InsufficientData { needed, got }) => {
                debug!(method = ?estimator.method(), needed, got, "estimator skipped");
            }
            Err(EstimatorError::Failure(reason)) => {
                warn!(method = ?estimator.method(), %reason, "estimator failed");
                insights.push(format!("Pattern learning unavailable this time: {reason}"));
            }
        }
    }

    let reconciled =
        reconcile(&estimates, config.min_confidence).unwrap_or_else(|| Reconciled {
            predicted_length: summary.predicted_length,
            confidence: summary.confidence,
            methods: vec![Method::Statistical],
        });

    let trend_slope = estimates.iter().find_map(|e| e.slope);
    let category = health.and_then(HealthMetrics::bmi_category);
    let confidence = apply_health_factor(reconciled.confidence, category);

    insights.extend(describe(&summary, &reconciled, trend_slope, category));

    assemble(
        last_start,
        &summary,
        reconciled.predicted_length,
        confidence,
        reconciled.methods,
        insights,
    )
    .or_else(|| {
        warn!(%last_start, "predicted date falls off the calendar, using baseline");
        baseline(last_start, history.record_count())
    })
}

/// Drop estimates at or below `min_confidence` and average the rest,
/// weighting each by its own confidence.
pub fn reconcile(estimates: &[Estimate], min_confidence: f64) -> Option<Reconciled> {
    let surviving: Vec<&Estimate> = estimates
        .iter()
        .filter(|e| e.confidence > min_confidence && e.predicted_length.is_finite())
        .collect();
    let total: f64 = surviving.iter().map(|e| e.confidence).sum();
    if surviving.is_empty() || total <= 0.0 {
        return None;
    }

    let (length, confidence) = surviving.iter().fold((0.0, 0.0), |(len, conf), e| {
        let weight = e.confidence / total;
        (len + weight * e.predicted_length, conf + weight * e.confidence)
    });
    debug!(methods = surviving.len(), length, confidence, "reconciled");

    Some(Reconciled {
        predicted_length: length,
        confidence,
        methods: surviving.iter().map(|e| e.method).collect(),
    })
}

/// Scale by the BMI discount and cap below certainty.
pub fn apply_health_factor(confidence: f64, category: Option<BmiCategory>) -> f64 {
    let factor = category.map_or(1.0, BmiCategory::confidence_factor);
    (confidence * factor).clamp(0.0, MAX_CONFIDENCE)
}

fn assemble(
    last_start: NaiveDate,
    summary: &StatisticalSummary,
    predicted_length: f64,
    confidence: f64,
    methods_used: Vec<Method>,
    insights: Vec<String>,
) -> Option<Prediction> {
    let offset = Duration::try_days(predicted_length.round() as i64)?;
    let next_period_date = last_start.checked_add_signed(offset)?;
    let confidence = round_to(confidence, 3);

    Some(Prediction {
        next_period_date,
        confidence,
        probability_window: ProbabilityWindow::around(
            next_period_date,
            statistical::window_half_width(summary.std),
        )?,
        predicted_cycle_length: round_to(predicted_length, 1),
        average_cycle_length: round_to(summary.mean, 1),
        median_cycle_length: round_to(summary.median, 1),
        variability: round_to(summary.variability, 2),
        regularity_score: round_to(1.0 - summary.variability.min(1.0), 2),
        cycles_analyzed: summary.count,
        prediction_quality: PredictionQuality::grade(summary.count, confidence),
        methods_used,
        insights,
    })
}

fn baseline(last_start: NaiveDate, records: usize) -> Option<Prediction> {
    let next_period_date =
        last_start.checked_add_signed(Duration::days(BASELINE_CYCLE_LENGTH as i64))?;
    Some(Prediction {
        next_period_date,
        confidence: BASELINE_CONFIDENCE,
        probability_window: ProbabilityWindow::around(next_period_date, BASELINE_HALF_WIDTH)?,
        predicted_cycle_length: BASELINE_CYCLE_LENGTH,
        average_cycle_length: BASELINE_CYCLE_LENGTH,
        median_cycle_length: BASELINE_CYCLE_LENGTH,
        variability: 0.0,
        regularity_score: 1.0,
        cycles_analyzed: records,
        prediction_quality: PredictionQuality::Baseline,
        methods_used: vec![Method::Baseline],
        insights: vec![
            "Using baseline prediction - log more cycles for better accuracy".to_string(),
        ],
    })
}

fn describe(
    summary: &StatisticalSummary,
    reconciled: &Reconciled,
    trend_slope: Option<f64>,
    category: Option<BmiCategory>,
) -> Vec<String> {
    let mut insights = Vec::new();

    if reconciled.methods.contains(&Method::MlEnsemble) {
        insights.push(format!(
            "Prediction refined with pattern learning across {} cycles",
            summary.count
        ));
    }

    if summary.variability < 0.1 && summary.count >= 3 {
        insights.push("Your cycle length is very consistent".to_string());
    } else if summary.variability > 0.2 {
        insights.push("Your cycle length varies - this is normal for many people".to_string());
    }

    match trend_slope {
        Some(slope) if slope >= 0.5 => {
            insights.push("Your cycles have been getting longer recently".to_string())
        }
        Some(slope) if slope <= -0.5 => {
            insights.push("Your cycles have been getting shorter recently".to_string())
        }
        _ => {}
    }

    match category {
        Some(BmiCategory::Underweight) => {
            insights.push("Low BMI may affect cycle regularity.".to_string())
        }
        Some(BmiCategory::Obese) => {
            insights.push("High BMI may affect cycle regularity.".to_string())
        }
        _ => {}
    }

    insights
}

/// Fertile days implied by a prediction's next start date: ovulation two
/// weeks earlier, the five days before it fertile, the last two peak.
pub fn fertility_window(prediction: &Prediction) -> Option<FertilityWindow> {
    let ovulation_day = prediction
        .next_period_date
        .checked_sub_signed(Duration::days(14))?;

    Some(FertilityWindow {
        fertile_start: ovulation_day.checked_sub_signed(Duration::days(5))?,
        fertile_end: ovulation_day,
        ovulation_day,
        peak_start: ovulation_day.checked_sub_signed(Duration::days(2))?,
        peak_end: ovulation_day,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CycleRecord;
    use approx::assert_abs_diff_eq;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn today() -> NaiveDate {
        date("2026-10-16")
    }

    /// Newest-first history from chronological lengths, ending with an open cycle.
    fn make_history(first_start: &str, lengths: &[u32]) -> History {
        let mut start = date(first_start);
        let mut records = Vec::new();
        for &len in lengths {
            records.push(CycleRecord::new(start, Some(len)));
            start += Duration::days(i64::from(len));
        }
        records.push(CycleRecord::new(start, None));
        records.reverse();
        History::from_newest_first(&records)
    }

    fn estimate(method: Method, predicted_length: f64, confidence: f64) -> Estimate {
        Estimate {
            method,
            predicted_length,
            confidence,
            slope: None,
        }
    }

    #[test]
    fn no_prediction_without_cycles() {
        let history = History::default();
        assert!(predict(&history, None, today(), &EngineConfig::default()).is_none());
    }

    #[test]
    fn single_open_cycle_uses_baseline() {
        let history =
            History::from_newest_first(&[CycleRecord::parse("2024-05-01", None).unwrap()]);
        let pred = predict(&history, None, today(), &EngineConfig::default()).unwrap();
        assert_eq!(pred.predicted_cycle_length, 28.0);
        assert_eq!(pred.confidence, 0.35);
        assert_eq!(pred.next_period_date, date("2024-05-29"));
        assert_eq!(pred.probability_window.start, date("2024-05-25"));
        assert_eq!(pred.probability_window.end, date("2024-06-02"));
        assert_eq!(pred.prediction_quality, PredictionQuality::Baseline);
        assert_eq!(pred.methods_used, vec![Method::Baseline]);
    }

    #[test]
    fn predicts_with_two_cycles() {
        let history = make_history("2026-01-01", &[28, 28]);
        let pred = predict(&history, None, today(), &EngineConfig::default()).unwrap();
        // last start 2026-02-26, 28 days later
        assert_eq!(pred.next_period_date, date("2026-03-26"));
        assert_eq!(pred.cycles_analyzed, 2);
        assert_eq!(pred.prediction_quality, PredictionQuality::Limited);
        assert_eq!(pred.methods_used, vec![Method::Statistical]);
    }

    #[test]
    fn uniform_history_is_confident_and_regular() {
        let history = make_history("2025-01-01", &[28; 10]);
        let pred = predict(&history, None, today(), &EngineConfig::default()).unwrap();
        assert!(pred.confidence >= 0.9, "confidence {}", pred.confidence);
        assert!(pred.confidence <= MAX_CONFIDENCE);
        assert!(pred.regularity_score >= 0.95);
        assert_eq!(pred.predicted_cycle_length, 28.0);
        assert_eq!(
            pred.methods_used,
            vec![Method::Statistical, Method::Trend, Method::MlEnsemble]
        );
        assert_eq!(pred.prediction_quality, PredictionQuality::ExcellentMl);
        assert!(pred.probability_window.contains(pred.next_period_date));
    }

    #[test]
    fn disabling_the_ensemble_drops_it() {
        let history = make_history("2025-01-01", &[28; 10]);
        let config = EngineConfig {
            ml_ensemble: false,
            ..EngineConfig::default()
        };
        let pred = predict(&history, None, today(), &config).unwrap();
        assert_eq!(pred.methods_used, vec![Method::Statistical, Method::Trend]);
    }

    #[test]
    fn reconcile_discards_weak_methods() {
        let reconciled = reconcile(
            &[
                estimate(Method::Statistical, 28.0, 0.8),
                estimate(Method::Trend, 35.0, 0.3),
            ],
            0.3,
        )
        .unwrap();
        assert_eq!(reconciled.methods, vec![Method::Statistical]);
        assert_abs_diff_eq!(reconciled.predicted_length, 28.0);
        assert_abs_diff_eq!(reconciled.confidence, 0.8);
    }

    #[test]
    fn reconcile_weights_by_confidence() {
        let reconciled = reconcile(
            &[
                estimate(Method::Statistical, 28.0, 0.9),
                estimate(Method::Trend, 31.0, 0.6),
            ],
            0.3,
        )
        .unwrap();
        let (w1, w2) = (0.9 / 1.5, 0.6 / 1.5);
        assert_abs_diff_eq!(reconciled.predicted_length, w1 * 28.0 + w2 * 31.0, epsilon = 1e-12);
        assert_abs_diff_eq!(reconciled.confidence, w1 * 0.9 + w2 * 0.6, epsilon = 1e-12);
    }

    #[test]
    fn reconcile_with_nothing_surviving() {
        assert!(reconcile(&[estimate(Method::Trend, 30.0, 0.2)], 0.3).is_none());
        assert!(reconcile(&[], 0.3).is_none());
    }

    #[test]
    fn underweight_discount() {
        let reconciled = reconcile(&[estimate(Method::Statistical, 28.0, 0.8)], 0.3).unwrap();
        let confidence = apply_health_factor(reconciled.confidence, Some(BmiCategory::from_bmi(17.0)));
        assert_abs_diff_eq!(confidence, 0.736, epsilon = 1e-12);
        assert_abs_diff_eq!(round_to(confidence, 3), 0.736);
    }

    #[test]
    fn health_factor_caps_confidence() {
        assert_eq!(apply_health_factor(0.99, None), MAX_CONFIDENCE);
        assert_eq!(apply_health_factor(0.99, Some(BmiCategory::Normal)), MAX_CONFIDENCE);
    }

    #[test]
    fn obese_metrics_lower_confidence_and_add_note() {
        let history = make_history("2025-06-01", &[27, 29, 28, 30, 28]);
        let config = EngineConfig::default();
        let plain = predict(&history, None, today(), &config).unwrap();
        let metrics = HealthMetrics {
            height: 160.0,
            weight: 90.0,
            use_metric: true,
            birthdate: None,
        };
        let adjusted = predict(&history, Some(&metrics), today(), &config).unwrap();
        assert!(adjusted.confidence < plain.confidence);
        assert!(adjusted
            .insights
            .iter()
            .any(|i| i == "High BMI may affect cycle regularity."));
    }

    #[test]
    fn window_widens_with_variability() {
        let steady = predict(
            &make_history("2025-06-01", &[28, 28, 28, 28]),
            None,
            today(),
            &EngineConfig::default(),
        )
        .unwrap();
        let erratic = predict(
            &make_history("2025-06-01", &[24, 34, 25, 33]),
            None,
            today(),
            &EngineConfig::default(),
        )
        .unwrap();
        let width = |p: &Prediction| (p.probability_window.end - p.probability_window.start).num_days();
        assert_eq!(width(&steady), 4);
        assert!(width(&erratic) > width(&steady));
        assert!(erratic.probability_window.contains(erratic.next_period_date));
    }

    #[test]
    fn fertility_window_calculated() {
        let history = make_history("2026-01-01", &[28, 28]);
        let pred = predict(&history, None, today(), &EngineConfig::default()).unwrap();
        let fw = fertility_window(&pred).unwrap();
        // Predicted period: Mar 26. Ovulation: Mar 26 - 14 = Mar 12
        assert_eq!(fw.ovulation_day, date("2026-03-12"));
        assert_eq!(fw.fertile_start, date("2026-03-07"));
        assert_eq!(fw.peak_start, date("2026-03-10"));
    }

    #[test]
    fn repeated_calls_are_identical() {
        let history = make_history("2024-02-01", &[27, 29, 28, 31, 26, 30, 28, 29, 27, 30, 28]);
        let config = EngineConfig::default();
        let a = predict(&history, None, today(), &config);
        let b = predict(&history, None, today(), &config);
        assert_eq!(a, b);
    }

    #[test]
    fn failing_ensemble_is_dropped_and_noted() {
        let history = make_history("2025-01-01", &[27, 29, 28, 30, 28, 27, 29, 28, 30, 28]);
        let config = EngineConfig {
            boosting_rounds: 0,
            ..EngineConfig::default()
        };
        let pred = predict(&history, None, today(), &config).unwrap();
        assert_eq!(pred.methods_used, vec![Method::Statistical, Method::Trend]);
        assert!(pred
            .insights
            .iter()
            .any(|i| i.starts_with("Pattern learning unavailable this time: invalid boosting schedule")));
        assert!(pred.confidence > 0.0);
        assert!(pred.probability_window.contains(pred.next_period_date));
    }

    #[test]
    fn implausible_lengths_fall_back_to_baseline() {
        let cycles: Vec<CycleRecord> = serde_json::from_str(
            r#"[
                {"startDate": "2024-05-01", "cycleLength": null},
                {"startDate": "2024-04-03", "cycleLength": 4000000000},
                {"startDate": "2024-03-06", "cycleLength": 4000000000}
            ]"#,
        )
        .unwrap();
        let history = History::from_newest_first(&cycles);
        let pred = predict(&history, None, today(), &EngineConfig::default()).unwrap();
        assert_eq!(pred.methods_used, vec![Method::Baseline]);
        assert_eq!(pred.next_period_date, date("2024-05-29"));
    }

    #[test]
    fn start_at_calendar_end_has_no_prediction() {
        let history = History::from_newest_first(&[
            CycleRecord::new(NaiveDate::MAX, None),
            CycleRecord::new(NaiveDate::MAX - Duration::days(28), Some(28)),
            CycleRecord::new(NaiveDate::MAX - Duration::days(56), Some(28)),
        ]);
        assert!(predict(&history, None, today(), &EngineConfig::default()).is_none());
    }

    #[test]
    fn trend_slope_drives_lengthening_note() {
        let history = make_history("2025-01-01", &[24, 25, 26, 27, 28, 29, 30]);
        let config = EngineConfig {
            ml_ensemble: false,
            ..EngineConfig::default()
        };
        let pred = predict(&history, None, today(), &config).unwrap();
        assert!(pred
            .insights
            .iter()
            .any(|i| i == "Your cycles have been getting longer recently"));

        let steady = predict(&make_history("2025-01-01", &[28; 7]), None, today(), &config).unwrap();
        assert!(!steady.insights.iter().any(|i| i.contains("getting")));
    }
}
