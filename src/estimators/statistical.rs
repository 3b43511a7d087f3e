use crate::error::EstimatorError;
use crate::models::Method;
use crate::stats::{exp_weighted_average, median, mean, std_deviation, trimmed_mean};

use super::{EstimationContext, Estimate, Estimator};

pub const MIN_CYCLES: usize = 2;
const CONFIDENCE_FLOOR: f64 = 0.3;
const CONFIDENCE_CAP: f64 = 0.95;

/// Summary statistics of completed cycle lengths and the blended estimate.
#[derive(Debug, Clone, PartialEq)]
pub struct StatisticalSummary {
    pub count: usize,
    pub mean: f64,
    pub median: f64,
    pub std: f64,
    pub weighted_avg: f64,
    pub trimmed_mean: f64,
    /// `std / mean`, 0 for a degenerate mean.
    pub variability: f64,
    pub predicted_length: f64,
    pub confidence: f64,
}

/// Summarise chronological cycle lengths. Needs at least two.
pub fn summarize(lengths: &[f64]) -> Result<StatisticalSummary, EstimatorError> {
    let n = lengths.len();
    if n < MIN_CYCLES {
        return Err(EstimatorError::InsufficientData {
            needed: MIN_CYCLES,
            got: n,
        });
    }

    let mean = mean(lengths);
    let median = median(lengths);
    let std = std_deviation(lengths);
    let weighted_avg = exp_weighted_average(lengths);
    let trimmed_mean = trimmed_mean(lengths, 0.1);

    let predicted_length = match n {
        6.. => 0.4 * weighted_avg + 0.3 * median + 0.3 * trimmed_mean,
        4..=5 => 0.5 * weighted_avg + 0.5 * median,
        _ => 0.6 * weighted_avg + 0.4 * median,
    };

    let (variability, confidence) = if mean > 0.0 {
        let variability = std / mean;
        let base = (1.0 - 1.5 * variability).clamp(CONFIDENCE_FLOOR, CONFIDENCE_CAP);
        (variability, base * data_quantity_factor(n))
    } else {
        (0.0, CONFIDENCE_FLOOR)
    };

    Ok(StatisticalSummary {
        count: n,
        mean,
        median,
        std,
        weighted_avg,
        trimmed_mean,
        variability,
        predicted_length,
        confidence,
    })
}

/// Grows linearly from 0.7 to 1.0 over the first ten cycles.
pub fn data_quantity_factor(n: usize) -> f64 {
    0.7 + 0.3 * (n as f64 / 10.0).min(1.0)
}

/// Half-width in days of the ~95% window, assuming roughly normal lengths.
pub fn window_half_width(std: f64) -> i64 {
    ((1.96 * std).round() as i64).max(2)
}

pub struct StatisticalEstimator;

impl Estimator for StatisticalEstimator {
    fn method(&self) -> Method {
        Method::Statistical
    }

    fn estimate(&self, ctx: &EstimationContext<'_>) -> Result<Estimate, EstimatorError> {
        let summary = summarize(&ctx.history.completed_lengths())?;
        Ok(Estimate {
            method: Method::Statistical,
            predicted_length: summary.predicted_length,
            confidence: summary.confidence,
            slope: None,
        })
    }
}
