/// Outcome of a single estimator that could not produce an estimate.
///
/// Kept separate from [`InsightError`]: an estimator error is absorbed by the
/// reconciler and never reaches the caller.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EstimatorError {
    #[error("insufficient data: need {needed}, got {got}")]
    InsufficientData { needed: usize, got: usize },
    #[error("estimator failed: {0}")]
    Failure(String),
}

#[derive(Debug, thiserror::Error)]
pub enum InsightError {
    #[error("invalid date: {0}")]
    InvalidDate(String),
    #[error("invalid config: {0}")]
    InvalidConfig(String),
    #[error("config parse error: {0}")]
    ConfigParse(#[from] serde_json::Error),
    #[error(transparent)]
    Estimator(#[from] EstimatorError),
}
