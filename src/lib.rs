//! Cycle prediction, anomaly scoring and symptom insights for cykel.
//!
//! Everything runs in memory on the records handed in. Start with
//! [`InsightEngine`]; the modules below are public for callers that want a
//! single piece.

pub mod anomaly;
pub mod config;
pub mod engine;
pub mod error;
pub mod estimators;
pub mod features;
pub mod health;
pub mod history;
pub mod insights;
pub mod models;
pub mod prediction;
pub mod recommend;
pub mod stats;
pub mod symptoms;

pub use config::EngineConfig;
pub use engine::{AnalysisRequest, FullAnalysis, InsightEngine};
pub use error::{EstimatorError, InsightError};
pub use health::HealthInsights;
pub use history::History;
pub use insights::CycleInsights;
pub use models::{
    AnomalyResult, CycleRecord, FertilityWindow, HealthMetrics, Method, Phase, Prediction,
    PredictionQuality, ProbabilityWindow, Severity, SymptomLog,
};
pub use recommend::{LogPrompt, RecommendationInput, RecommendationSet};
pub use symptoms::{SymptomInsights, SymptomPrediction};
