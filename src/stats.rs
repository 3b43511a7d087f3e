//! Small numeric toolkit shared by the estimators and the rule engines.
//!
//! Standard deviations are population (ddof = 0). Empty inputs yield 0
//! rather than NaN so degenerate histories never poison a result.

const NEAR_ZERO: f64 = 1e-12;

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

pub fn std_deviation(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let avg = mean(values);
    let variance = values.iter().map(|v| (v - avg).powi(2)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}

fn sorted(values: &[f64]) -> Vec<f64> {
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    sorted
}

pub fn median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let sorted = sorted(values);
    let len = sorted.len();
    if len % 2 == 0 {
        (sorted[len / 2 - 1] + sorted[len / 2]) / 2.0
    } else {
        sorted[len / 2]
    }
}

/// Quantile with linear interpolation between closest ranks, `q` in [0, 1].
pub fn quantile(values: &[f64], q: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let sorted = sorted(values);
    let pos = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lower = pos.floor() as usize;
    let upper = pos.ceil() as usize;
    let frac = pos - lower as f64;
    sorted[lower] + (sorted[upper] - sorted[lower]) * frac
}

/// Median absolute deviation around the median.
pub fn mad(values: &[f64]) -> f64 {
    let center = median(values);
    let deviations: Vec<f64> = values.iter().map(|v| (v - center).abs()).collect();
    median(&deviations)
}

/// Mean after cutting `floor(proportion * n)` values from each end.
pub fn trimmed_mean(values: &[f64], proportion: f64) -> f64 {
    let sorted = sorted(values);
    let cut = (proportion * sorted.len() as f64).floor() as usize;
    if sorted.len() <= 2 * cut {
        return median(values);
    }
    mean(&sorted[cut..sorted.len() - cut])
}

/// Exponentially weighted average of a chronological series; weights are
/// `exp(linspace(-1, 0, n))`, so the latest value weighs the most.
pub fn exp_weighted_average(chronological: &[f64]) -> f64 {
    let n = chronological.len();
    match n {
        0 => 0.0,
        1 => chronological[0],
        _ => {
            let step = 1.0 / (n - 1) as f64;
            let (sum, total) = chronological.iter().enumerate().fold(
                (0.0, 0.0),
                |(sum, total), (i, value)| {
                    let weight = (-1.0 + i as f64 * step).exp();
                    (sum + weight * value, total + weight)
                },
            );
            sum / total
        }
    }
}

pub fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

/// Ordinary least squares of a series against its index.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearFit {
    pub slope: f64,
    pub intercept: f64,
    /// Signed square root of `r_squared`.
    pub r: f64,
    pub r_squared: f64,
    /// Two-tailed p-value of the slope; `None` when it cannot be tested.
    pub p_value: Option<f64>,
}

impl LinearFit {
    pub fn at(&self, x: f64) -> f64 {
        self.slope.mul_add(x, self.intercept)
    }

    pub fn is_significant(&self, alpha: f64) -> bool {
        self.p_value.is_some_and(|p| p < alpha)
    }
}

pub fn linear_fit(values: &[f64]) -> Option<LinearFit> {
    if values.len() < 2 || values.iter().any(|v| !v.is_finite()) {
        return None;
    }

    let n = values.len() as f64;
    let mean_x = (n - 1.0) / 2.0;
    let mean_y = mean(values);

    let (sxx, sxy) = values
        .iter()
        .enumerate()
        .fold((0.0, 0.0), |(sxx, sxy), (i, y)| {
            let dx = i as f64 - mean_x;
            (sxx + dx * dx, sxy + dx * (y - mean_y))
        });

    let slope = sxy / sxx;
    let intercept = slope.mul_add(-mean_x, mean_y);

    let ss_tot: f64 = values.iter().map(|y| (y - mean_y).powi(2)).sum();
    let ss_res: f64 = values
        .iter()
        .enumerate()
        .map(|(i, y)| (y - slope.mul_add(i as f64, intercept)).powi(2))
        .sum();

    // A constant series is fitted exactly by a flat line.
    let r_squared = if ss_tot < NEAR_ZERO {
        if ss_res < NEAR_ZERO { 1.0 } else { 0.0 }
    } else {
        (1.0 - ss_res / ss_tot).clamp(0.0, 1.0)
    };
    let r = if slope < 0.0 { -r_squared.sqrt() } else { r_squared.sqrt() };

    let degrees_of_freedom = values.len() - 2;
    let p_value = if degrees_of_freedom == 0 {
        None
    } else if ss_res < NEAR_ZERO {
        if slope.abs() > NEAR_ZERO { Some(0.0) } else { None }
    } else {
        let standard_error = (ss_res / degrees_of_freedom as f64).sqrt();
        let t_stat = slope / (standard_error / sxx.sqrt());
        Some(t_test_p_value(t_stat.abs(), degrees_of_freedom))
    };

    Some(LinearFit {
        slope,
        intercept,
        r,
        r_squared,
        p_value,
    })
}

/// Two-tailed p-value from a t statistic, via a normal approximation.
fn t_test_p_value(t_stat: f64, df: usize) -> f64 {
    let z = t_stat / (1.0 + t_stat * t_stat / (4.0 * df as f64)).sqrt();
    (2.0 * (1.0 - standard_normal_cdf(z.abs()))).clamp(0.0, 1.0)
}

/// Abramowitz and Stegun 7.1.26.
fn standard_normal_cdf(x: f64) -> f64 {
    let z = x.abs() / std::f64::consts::SQRT_2;
    let t = 1.0 / (1.0 + 0.327_591_1 * z);
    let poly = t
        * (0.254_829_592
            + t * (-0.284_496_736 + t * (1.421_413_741 + t * (-1.453_152_027 + t * 1.061_405_429))));
    let erf = 1.0 - poly * (-z * z).exp();
    if x >= 0.0 {
        0.5 * (1.0 + erf)
    } else {
        0.5 * (1.0 - erf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn population_std() {
        assert_abs_diff_eq!(std_deviation(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]), 2.0);
        assert_eq!(std_deviation(&[28.0]), 0.0);
    }

    #[test]
    fn median_even_and_odd() {
        assert_eq!(median(&[3.0, 1.0, 2.0]), 2.0);
        assert_eq!(median(&[4.0, 1.0, 3.0, 2.0]), 2.5);
        assert_eq!(median(&[]), 0.0);
    }

    #[test]
    fn quantiles_interpolate() {
        let values = [1.0, 2.0, 3.0, 4.0];
        assert_abs_diff_eq!(quantile(&values, 0.25), 1.75);
        assert_abs_diff_eq!(quantile(&values, 0.75), 3.25);
    }

    #[test]
    fn mad_of_spread() {
        assert_abs_diff_eq!(mad(&[1.0, 1.0, 2.0, 2.0, 4.0, 6.0, 9.0]), 1.0);
    }

    #[test]
    fn trimmed_mean_cuts_tails_from_ten_values() {
        let values = [1.0, 28.0, 28.0, 28.0, 28.0, 28.0, 28.0, 28.0, 28.0, 90.0];
        assert_abs_diff_eq!(trimmed_mean(&values, 0.1), 28.0);
        // Fewer than ten values: nothing is cut.
        assert_abs_diff_eq!(trimmed_mean(&[26.0, 28.0, 30.0], 0.1), 28.0);
    }

    #[test]
    fn weighted_average_favours_latest() {
        let avg = exp_weighted_average(&[20.0, 30.0]);
        // weights e^-1 and e^0
        let expected = (20.0 * (-1.0f64).exp() + 30.0) / ((-1.0f64).exp() + 1.0);
        assert_abs_diff_eq!(avg, expected, epsilon = 1e-12);
        assert!(avg > 25.0);
    }

    #[test]
    fn linear_fit_recovers_line() {
        let fit = linear_fit(&[26.0, 27.0, 28.0, 29.0, 30.0]).unwrap();
        assert_abs_diff_eq!(fit.slope, 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(fit.intercept, 26.0, epsilon = 1e-12);
        assert_abs_diff_eq!(fit.r, 1.0, epsilon = 1e-12);
        assert!(fit.is_significant(0.05));
        assert_abs_diff_eq!(fit.at(5.0), 31.0, epsilon = 1e-12);
    }

    #[test]
    fn constant_series_is_a_perfect_flat_fit() {
        let fit = linear_fit(&[28.0; 6]).unwrap();
        assert_eq!(fit.slope, 0.0);
        assert_eq!(fit.r_squared, 1.0);
        assert!(!fit.is_significant(0.05));
    }

    #[test]
    fn noisy_flat_series_is_not_significant() {
        let fit = linear_fit(&[28.0, 30.0, 27.0, 29.0, 28.0, 30.0, 27.0, 29.0]).unwrap();
        assert!(!fit.is_significant(0.05));
    }

    #[test]
    fn normal_cdf_reference_points() {
        assert_abs_diff_eq!(standard_normal_cdf(0.0), 0.5, epsilon = 1e-6);
        assert_abs_diff_eq!(standard_normal_cdf(1.96), 0.975, epsilon = 1e-3);
    }
}
