use std::collections::BTreeMap;

use chrono::Datelike;
use tracing::debug;

use crate::error::EstimatorError;
use crate::history::CompletedCycle;
use crate::models::Method;
use crate::stats::{linear_fit, mean, std_deviation};

use super::{EstimationContext, Estimate, Estimator};

pub const MIN_CYCLES: usize = 4;
pub const MIN_SEASONAL_CYCLES: usize = 12;
/// Physiologically plausible bounds for a projected length.
pub const MIN_LENGTH: f64 = 21.0;
pub const MAX_LENGTH: f64 = 40.0;

#[derive(Debug, Clone, PartialEq)]
pub struct TrendEstimate {
    pub predicted_length: f64,
    pub confidence: f64,
    /// Days gained (or lost) per cycle.
    pub slope: f64,
    /// Coefficient of determination of the fit.
    pub trend_strength: f64,
    pub seasonal_adjustment: Option<f64>,
}

/// Project the next length from a linear trend over chronological cycles,
/// with an additive monthly adjustment once a year of history exists.
pub fn fit_trend(
    cycles: &[CompletedCycle],
    current_month: u32,
) -> Result<TrendEstimate, EstimatorError> {
    let n = cycles.len();
    if n < MIN_CYCLES {
        return Err(EstimatorError::InsufficientData {
            needed: MIN_CYCLES,
            got: n,
        });
    }

    let lengths: Vec<f64> = cycles.iter().map(|c| c.length).collect();
    let fit = linear_fit(&lengths)
        .ok_or_else(|| EstimatorError::Failure("trend fit on non-finite lengths".into()))?;

    let mut predicted_length = fit.at(n as f64).clamp(MIN_LENGTH, MAX_LENGTH);

    let seasonal_adjustment = if n >= MIN_SEASONAL_CYCLES {
        seasonal_adjustment(cycles, current_month)
    } else {
        None
    };
    if let Some(adjustment) = seasonal_adjustment {
        predicted_length = (predicted_length + adjustment).clamp(MIN_LENGTH, MAX_LENGTH);
    }

    let confidence = (fit.r.abs() * (n as f64 / 10.0).min(1.0)).clamp(0.4, 0.9);

    Ok(TrendEstimate {
        predicted_length,
        confidence,
        slope: fit.slope,
        trend_strength: fit.r_squared,
        seasonal_adjustment,
    })
}

/// `current month mean - overall mean`, when month-to-month spread exceeds
/// half the overall spread.
fn seasonal_adjustment(cycles: &[CompletedCycle], current_month: u32) -> Option<f64> {
    let mut by_month: BTreeMap<u32, Vec<f64>> = BTreeMap::new();
    for cycle in cycles {
        by_month.entry(cycle.month()).or_default().push(cycle.length);
    }
    if by_month.len() < 2 {
        return None;
    }

    let lengths: Vec<f64> = cycles.iter().map(|c| c.length).collect();
    let overall_mean = mean(&lengths);
    let overall_std = std_deviation(&lengths);
    let monthly_means: Vec<f64> = by_month.values().map(|v| mean(v)).collect();

    if std_deviation(&monthly_means) <= 0.5 * overall_std {
        return None;
    }

    let current = by_month.get(&current_month)?;
    let adjustment = mean(current) - overall_mean;
    debug!(current_month, adjustment, "seasonal adjustment applied");
    Some(adjustment)
}

pub struct TrendEstimator;

impl Estimator for TrendEstimator {
    fn method(&self) -> Method {
        Method::Trend
    }

    fn estimate(&self, ctx: &EstimationContext<'_>) -> Result<Estimate, EstimatorError> {
        let current_month = ctx
            .history
            .last_start()
            .map(|d| d.month())
            .ok_or(EstimatorError::InsufficientData {
                needed: MIN_CYCLES,
                got: 0,
            })?;
        let trend = fit_trend(&ctx.history.completed(), current_month)?;
        Ok(Estimate {
            method: Method::Trend,
            predicted_length: trend.predicted_length,
            confidence: trend.confidence,
            slope: Some(trend.slope),
        })
    }
}
