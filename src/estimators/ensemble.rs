use tracing::{debug, warn};

use crate::config::EngineConfig;
use crate::error::EstimatorError;
use crate::features::{self, FeatureTable, HealthFeatures};
use crate::history::History;
use crate::models::Method;

use super::trees::{BaggedTrees, BoostedTrees, TreeParams};
use super::{EstimationContext, Estimate, Estimator};

/// Complete feature rows (query row included) needed to train.
pub const MIN_FEATURE_ROWS: usize = 4;
const CONFIDENCE_CAP: f64 = 0.92;

#[derive(Debug, Clone, PartialEq)]
pub struct EnsembleEstimate {
    pub predicted_length: f64,
    pub confidence: f64,
    pub model_agreement: f64,
    pub bagged_prediction: f64,
    pub boosted_prediction: f64,
}

/// Train a bagged and a boosted model on the history and blend their
/// predictions for the next cycle.
pub fn fit_ensemble(
    history: &History,
    health: HealthFeatures,
    config: &EngineConfig,
) -> Result<EnsembleEstimate, EstimatorError> {
    if history.record_count() < config.min_ml_records {
        return Err(EstimatorError::InsufficientData {
            needed: config.min_ml_records,
            got: history.record_count(),
        });
    }

    let completed = history.completed();
    let table = features::build(&completed, health).ok_or(EstimatorError::InsufficientData {
        needed: MIN_FEATURE_ROWS,
        got: 0,
    })?;
    if table.usable_rows() < MIN_FEATURE_ROWS {
        return Err(EstimatorError::InsufficientData {
            needed: MIN_FEATURE_ROWS,
            got: table.usable_rows(),
        });
    }

    let (bagged_prediction, boosted_prediction) = train_and_predict(&table, config)?;

    let larger = bagged_prediction.max(boosted_prediction);
    if !(larger > 0.0) {
        return Err(EstimatorError::Failure(format!(
            "models produced non-positive lengths ({bagged_prediction}, {boosted_prediction})"
        )));
    }
    let model_agreement = 1.0 - (bagged_prediction - boosted_prediction).abs() / larger;
    let predicted_length = 0.6 * bagged_prediction + 0.4 * boosted_prediction;

    let n = completed.len() as f64;
    let confidence =
        (0.6 + 0.3 * model_agreement + 0.1 * (n / 10.0).min(1.0)).clamp(0.0, CONFIDENCE_CAP);

    debug!(
        bagged_prediction,
        boosted_prediction, model_agreement, confidence, "ensemble fitted"
    );

    Ok(EnsembleEstimate {
        predicted_length,
        confidence,
        model_agreement,
        bagged_prediction,
        boosted_prediction,
    })
}

fn train_and_predict(
    table: &FeatureTable,
    config: &EngineConfig,
) -> Result<(f64, f64), EstimatorError> {
    let params = TreeParams {
        max_depth: config.max_tree_depth,
        ..TreeParams::default()
    };

    let bagged = BaggedTrees::fit(
        &table.training,
        &table.labels,
        config.bagged_trees,
        params,
        config.random_seed,
    )?;
    let boosted = BoostedTrees::fit(
        &table.training,
        &table.labels,
        config.boosting_rounds,
        config.learning_rate,
        params,
    )?;

    let predictions = (bagged.predict(&table.query), boosted.predict(&table.query));
    if !predictions.0.is_finite() || !predictions.1.is_finite() {
        return Err(EstimatorError::Failure("model prediction is not finite".into()));
    }
    Ok(predictions)
}

pub struct EnsembleEstimator;

impl Estimator for EnsembleEstimator {
    fn method(&self) -> Method {
        Method::MlEnsemble
    }

    fn estimate(&self, ctx: &EstimationContext<'_>) -> Result<Estimate, EstimatorError> {
        let fitted = fit_ensemble(ctx.history, ctx.health, ctx.config).inspect_err(|err| {
            if let EstimatorError::Failure(reason) = err {
                warn!(%reason, "regression ensemble failed, excluding it");
            }
        })?;
        Ok(Estimate {
            method: Method::MlEnsemble,
            predicted_length: fitted.predicted_length,
            confidence: fitted.confidence,
            slope: None,
        })
    }
}
