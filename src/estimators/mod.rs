//! Independent next-cycle-length estimators.
//!
//! Each estimator is a pure function of the history handed to it: nothing
//! is fitted ahead of time or kept between calls.

pub mod ensemble;
pub mod statistical;
pub mod trees;
pub mod trend;

use crate::config::EngineConfig;
use crate::error::EstimatorError;
use crate::features::HealthFeatures;
use crate::history::History;
use crate::models::Method;

pub use ensemble::EnsembleEstimator;
pub use statistical::StatisticalEstimator;
pub use trend::TrendEstimator;

/// Everything an estimator may look at for one call.
pub struct EstimationContext<'a> {
    pub history: &'a History,
    pub health: HealthFeatures,
    pub config: &'a EngineConfig,
}

/// A single method's view of the next cycle length.
#[derive(Debug, Clone, PartialEq)]
pub struct Estimate {
    pub method: Method,
    pub predicted_length: f64,
    pub confidence: f64,
    /// Days per cycle, from methods that fit a trend.
    pub slope: Option<f64>,
}

pub trait Estimator {
    fn method(&self) -> Method;

    fn estimate(&self, ctx: &EstimationContext<'_>) -> Result<Estimate, EstimatorError>;
}

/// Estimators enabled by the config, in reconciliation order.
pub fn enabled(config: &EngineConfig) -> Vec<Box<dyn Estimator>> {
    let mut estimators: Vec<Box<dyn Estimator>> =
        vec![Box::new(StatisticalEstimator), Box::new(TrendEstimator)];
    if config.ml_ensemble {
        estimators.push(Box::new(EnsembleEstimator));
    }
    estimators
}
