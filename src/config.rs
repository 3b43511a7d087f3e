use serde::{Deserialize, Serialize};

use crate::error::InsightError;

/// Tunables for the prediction engine. Missing JSON fields fall back to the defaults.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct EngineConfig {
    /// Run the regression ensemble when enough history exists.
    pub ml_ensemble: bool,
    pub min_ml_records: usize,
    /// Methods with a confidence at or below this are discarded.
    pub min_confidence: f64,
    pub random_seed: u64,
    pub bagged_trees: usize,
    pub boosting_rounds: usize,
    pub learning_rate: f64,
    pub max_tree_depth: usize,
    pub max_recommendations: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            ml_ensemble: true,
            min_ml_records: 8,
            min_confidence: 0.3,
            random_seed: 42,
            bagged_trees: 30,
            boosting_rounds: 40,
            learning_rate: 0.1,
            max_tree_depth: 3,
            max_recommendations: 10,
        }
    }
}

impl EngineConfig {
    /// Parse a config from JSON and validate it.
    pub fn from_json(json: &str) -> Result<Self, InsightError> {
        let config: EngineConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), InsightError> {
        if self.bagged_trees == 0 || self.boosting_rounds == 0 {
            return Err(InsightError::InvalidConfig(
                "ensemble needs at least one tree per model".into(),
            ));
        }
        if !(self.learning_rate > 0.0 && self.learning_rate <= 1.0) {
            return Err(InsightError::InvalidConfig(format!(
                "learning rate {} outside (0, 1]",
                self.learning_rate
            )));
        }
        if !(0.0..1.0).contains(&self.min_confidence) {
            return Err(InsightError::InvalidConfig(format!(
                "confidence floor {} outside [0, 1)",
                self.min_confidence
            )));
        }
        if self.max_tree_depth == 0 {
            return Err(InsightError::InvalidConfig("tree depth must be positive".into()));
        }
        if self.max_recommendations == 0 {
            return Err(InsightError::InvalidConfig(
                "recommendation cap must be positive".into(),
            ));
        }
        Ok(())
    }
}
