use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::anomaly;
use crate::config::EngineConfig;
use crate::error::InsightError;
use crate::health::{self, HealthInsights};
use crate::history::History;
use crate::insights::{self, CycleInsights};
use crate::models::{AnomalyResult, CycleRecord, HealthMetrics, Prediction, SymptomLog};
use crate::prediction;
use crate::recommend::{self, Engagement, LogPrompt, RecommendationInput, RecommendationSet};
use crate::symptoms::{self, SymptomInsights, SymptomPrediction};

/// Stateless entry point. Every call builds its own history and models, so
/// one engine can serve any number of callers.
#[derive(Debug, Clone, Default)]
pub struct InsightEngine {
    config: EngineConfig,
    today: Option<NaiveDate>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct AnalysisRequest {
    pub user_id: Option<String>,
    pub cycles: Vec<CycleRecord>,
    pub symptoms: Vec<SymptomLog>,
    pub health_metrics: Option<HealthMetrics>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CycleData {
    pub average_length: f64,
    pub variability: f64,
    pub total_cycles_analyzed: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FullAnalysis {
    pub user_id: Option<String>,
    pub has_data: bool,
    pub message: Option<String>,
    pub prediction: Option<Prediction>,
    pub anomaly: Option<AnomalyResult>,
    pub cycle_insights: Option<CycleInsights>,
    pub symptom_insights: Option<SymptomInsights>,
    pub health_insights: Option<HealthInsights>,
    pub recommendations: Option<RecommendationSet>,
    pub cycle_data: Option<CycleData>,
    pub should_display: bool,
    pub display_priority: u8,
}

impl FullAnalysis {
    fn no_data(user_id: Option<String>) -> Self {
        Self {
            user_id,
            has_data: false,
            message: Some("No cycle data to analyze".into()),
            prediction: None,
            anomaly: None,
            cycle_insights: None,
            symptom_insights: None,
            health_insights: None,
            recommendations: None,
            cycle_data: None,
            should_display: false,
            display_priority: 0,
        }
    }
}

impl InsightEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: EngineConfig) -> Result<Self, InsightError> {
        config.validate()?;
        Ok(Self {
            config,
            today: None,
        })
    }

    /// Pin "today" for age calculations and engagement, mainly for tests.
    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = Some(today);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn today(&self) -> NaiveDate {
        self.today
            .unwrap_or_else(|| chrono::Local::now().date_naive())
    }

    /// `None` when `cycles` is empty or its latest start sits at the end of the calendar.
    pub fn predict_next_period(
        &self,
        cycles: &[CycleRecord],
        health: Option<&HealthMetrics>,
    ) -> Option<Prediction> {
        let history = History::from_newest_first(cycles);
        prediction::predict(&history, health, self.today(), &self.config)
    }

    pub fn detect_anomaly(&self, cycles: &[CycleRecord]) -> AnomalyResult {
        anomaly::detect(&History::from_newest_first(cycles))
    }

    pub fn detailed_insights(&self, cycles: &[CycleRecord]) -> CycleInsights {
        let history = History::from_newest_first(cycles);
        let prediction = prediction::predict(&history, None, self.today(), &self.config);
        insights::detailed(&history, prediction.as_ref())
    }

    pub fn analyze_symptom_patterns(
        &self,
        symptoms: &[SymptomLog],
        cycles: &[CycleRecord],
        health: Option<&HealthMetrics>,
    ) -> SymptomInsights {
        symptoms::analyze_patterns(symptoms, &History::from_newest_first(cycles), health)
    }

    pub fn predict_symptom_likelihood(
        &self,
        symptoms: &[SymptomLog],
        current_cycle_day: u32,
        cycles: &[CycleRecord],
    ) -> SymptomPrediction {
        symptoms::predict_likelihood(
            symptoms,
            current_cycle_day,
            &History::from_newest_first(cycles),
        )
    }

    pub fn health_analysis(
        &self,
        metrics: &HealthMetrics,
        cycles: &[CycleRecord],
        symptoms: &[SymptomLog],
    ) -> HealthInsights {
        health::analyze(
            metrics,
            &History::from_newest_first(cycles),
            symptoms,
            self.today(),
        )
    }

    pub fn generate_recommendations(&self, input: &RecommendationInput) -> RecommendationSet {
        recommend::recommend(input, self.config.max_recommendations)
    }

    pub fn should_prompt_symptom_log(
        &self,
        last_log: Option<NaiveDate>,
        current_cycle_day: u32,
        today: NaiveDate,
    ) -> LogPrompt {
        recommend::should_prompt_symptom_log(last_log, current_cycle_day, today)
    }

    /// Everything at once: prediction, anomaly, insights and what to display.
    pub fn full_analysis(&self, request: &AnalysisRequest) -> FullAnalysis {
        let history = History::from_newest_first(&request.cycles);
        let today = self.today();
        let health = request.health_metrics.as_ref();

        let Some(prediction) = prediction::predict(&history, health, today, &self.config) else {
            return FullAnalysis::no_data(request.user_id.clone());
        };
        let anomaly = anomaly::detect(&history);
        let cycle_insights = insights::detailed(&history, Some(&prediction));
        let symptom_insights = symptoms::analyze_patterns(&request.symptoms, &history, health);
        let health_insights =
            health.map(|metrics| health::analyze(metrics, &history, &request.symptoms, today));

        let input = RecommendationInput {
            prediction: Some(prediction.clone()),
            anomaly: anomaly.clone(),
            symptom_insights: Some(symptom_insights.clone()),
            health_insights: health_insights.clone(),
            engagement: Engagement::from_logs(&request.symptoms, today),
            cycles: request.cycles.clone(),
        };
        let recommendations = self.generate_recommendations(&input);
        let strategy = &recommendations.strategy;
        debug!(
            user = request.user_id.as_deref().unwrap_or("-"),
            priority = strategy.display_priority,
            confidence = prediction.confidence,
            "analysis complete"
        );

        FullAnalysis {
            user_id: request.user_id.clone(),
            has_data: true,
            message: None,
            should_display: strategy.show_prediction || strategy.show_anomaly_alert,
            display_priority: strategy.display_priority,
            cycle_data: Some(CycleData {
                average_length: prediction.average_cycle_length,
                variability: prediction.variability,
                total_cycles_analyzed: history.record_count(),
            }),
            prediction: Some(prediction),
            anomaly: Some(anomaly),
            cycle_insights: Some(cycle_insights),
            symptom_insights: Some(symptom_insights),
            health_insights,
            recommendations: Some(recommendations),
        }
    }
}
