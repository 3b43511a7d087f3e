use std::collections::HashSet;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::health::{HealthInsights, RiskLevel};
use crate::history::History;
use crate::models::{AnomalyResult, CycleRecord, Method, Prediction, Severity, SymptomLog};
use crate::symptoms::{SymptomInsights, SymptomSeverity, SymptomTrend};

pub const HIGH_CONFIDENCE: f64 = 0.75;
pub const MEDIUM_CONFIDENCE: f64 = 0.50;
pub const ANOMALY_ALERT_SCORE: f64 = 0.65;
/// Days without a log after which the UI switches to gentle re-entry.
const REENTRY_AFTER_DAYS: u32 = 7;
const MIN_CYCLES_FOR_CONFIDENCE: usize = 3;
/// Logs in 30 days that count as fully consistent tracking.
const CONSISTENT_LOGS: f64 = 30.0;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum UiMode {
    Minimal,
    Standard,
    Detailed,
    GentleReentry,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DisplayStrategy {
    pub show_prediction: bool,
    pub show_anomaly_alert: bool,
    pub show_confidence_level: bool,
    pub ui_mode: UiMode,
    pub prompt_for_more_data: bool,
    /// 0 (background) to 3 (urgent).
    pub display_priority: u8,
    pub message: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct Engagement {
    pub days_since_last_log: u32,
    pub total_logs: usize,
    pub consistency_score: f64,
}

impl Engagement {
    pub fn from_logs(logs: &[SymptomLog], today: NaiveDate) -> Self {
        let days_since_last_log = logs
            .iter()
            .map(|l| l.date)
            .max()
            .map(|last| (today - last).num_days().max(0) as u32)
            .unwrap_or(0);
        Self {
            days_since_last_log,
            total_logs: logs.len(),
            consistency_score: (logs.len() as f64 / CONSISTENT_LOGS).min(1.0),
        }
    }
}

/// Ordered so that sorting puts `High` first.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "camelCase")]
pub enum PriorityTier {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum Category {
    Anomaly,
    Tracking,
    Prediction,
    Regularity,
    Symptoms,
    Health,
    Engagement,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Recommendation {
    pub category: Category,
    pub priority: PriorityTier,
    pub title: String,
    pub message: String,
}

impl Recommendation {
    fn new(
        category: Category,
        priority: PriorityTier,
        title: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            category,
            priority,
            title: title.into(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RecommendationInput {
    #[serde(default)]
    pub prediction: Option<Prediction>,
    pub anomaly: AnomalyResult,
    #[serde(default)]
    pub symptom_insights: Option<SymptomInsights>,
    #[serde(default)]
    pub health_insights: Option<HealthInsights>,
    #[serde(default)]
    pub engagement: Engagement,
    #[serde(default)]
    pub cycles: Vec<CycleRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RecommendationSet {
    pub strategy: DisplayStrategy,
    pub insight_texts: Vec<String>,
    pub recommendations: Vec<Recommendation>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LogPrompt {
    pub should_prompt: bool,
    pub reason: Option<String>,
}

/// What a rule sees: the caller's input plus the canonical history.
pub struct RuleContext<'a> {
    pub input: &'a RecommendationInput,
    pub history: History,
}

impl RuleContext<'_> {
    fn completed_cycles(&self) -> usize {
        self.history.completed().len()
    }
}

pub type RecommendationRule = fn(&RuleContext<'_>) -> Vec<Recommendation>;

/// Rules run in this order; within a tier, earlier rules come first.
const RULES: &[RecommendationRule] = &[
    anomaly_rule,
    data_quantity_rule,
    prediction_quality_rule,
    regularity_rule,
    symptom_rule,
    health_rule,
    engagement_rule,
];

pub fn recommend(input: &RecommendationInput, max_recommendations: usize) -> RecommendationSet {
    let ctx = RuleContext {
        input,
        history: History::from_newest_first(&input.cycles),
    };

    let mut seen = HashSet::new();
    let mut recommendations: Vec<Recommendation> = RULES
        .iter()
        .flat_map(|rule| rule(&ctx))
        .filter(|r| seen.insert(r.title.clone()))
        .collect();
    recommendations.sort_by_key(|r| r.priority);
    recommendations.truncate(max_recommendations);
    debug!(count = recommendations.len(), "recommendations ranked");

    let strategy = display_strategy(
        input.prediction.as_ref(),
        &input.anomaly,
        &input.engagement,
    );
    let insight_texts = insight_texts(input.prediction.as_ref(), &input.anomaly, &strategy);
    RecommendationSet {
        strategy,
        insight_texts,
        recommendations,
    }
}

/// Decide which UI elements to show and how prominently.
pub fn display_strategy(
    prediction: Option<&Prediction>,
    anomaly: &AnomalyResult,
    engagement: &Engagement,
) -> DisplayStrategy {
    let confidence = prediction.map_or(0.0, |p| p.confidence);
    let cycles_analyzed = prediction.map_or(0, |p| p.cycles_analyzed);

    let mut strategy = DisplayStrategy {
        show_prediction: false,
        show_anomaly_alert: false,
        show_confidence_level: false,
        ui_mode: UiMode::Minimal,
        prompt_for_more_data: false,
        display_priority: 0,
        message: None,
    };

    if confidence >= MEDIUM_CONFIDENCE && cycles_analyzed >= 2 {
        strategy.show_prediction = true;
        if confidence >= HIGH_CONFIDENCE {
            strategy.message = Some("Based on your past patterns".into());
        } else {
            strategy.ui_mode = UiMode::Standard;
            strategy.show_confidence_level = true;
            strategy.message = Some("Predicted from your cycle history".into());
        }
    }

    if anomaly.detected && anomaly.score >= ANOMALY_ALERT_SCORE {
        strategy.show_anomaly_alert = true;
        strategy.ui_mode = UiMode::Detailed;
        strategy.message = Some("We noticed a change compared to your usual cycle".into());
    }

    if cycles_analyzed < MIN_CYCLES_FOR_CONFIDENCE {
        strategy.prompt_for_more_data = true;
        strategy.message = Some("Log a few more cycles to improve predictions".into());
    }

    if engagement.days_since_last_log > REENTRY_AFTER_DAYS {
        strategy.ui_mode = UiMode::GentleReentry;
        strategy.message = Some("Welcome back! Log your current state".into());
    }

    strategy.display_priority = if anomaly.detected {
        3
    } else if strategy.show_prediction && confidence >= HIGH_CONFIDENCE {
        2
    } else if strategy.prompt_for_more_data {
        1
    } else {
        0
    };
    strategy
}

/// Short lines of copy to go with the strategy.
pub fn insight_texts(
    prediction: Option<&Prediction>,
    anomaly: &AnomalyResult,
    strategy: &DisplayStrategy,
) -> Vec<String> {
    let Some(prediction) = prediction else {
        return vec!["Start logging your cycle to see personalized insights".into()];
    };

    let mut texts = Vec::new();
    if strategy.show_prediction {
        if prediction.confidence >= HIGH_CONFIDENCE {
            texts.push("Your cycle patterns are becoming clear".to_string());
        } else {
            texts.push(format!("Based on {} cycles logged", prediction.cycles_analyzed));
        }
    } else if prediction.cycles_analyzed > 0 {
        texts.push("Early predictions - keep logging for better accuracy".to_string());
    }

    if strategy.show_anomaly_alert {
        texts.push(anomaly.description.clone());
    }

    if prediction.variability < 0.1 && prediction.cycles_analyzed >= MIN_CYCLES_FOR_CONFIDENCE {
        texts.push("Your cycle length is very consistent".to_string());
    } else if prediction.variability > 0.2 {
        texts.push("Your cycle length varies - this is normal for many people".to_string());
    }
    texts
}

/// Whether to nudge for a symptom log today.
pub fn should_prompt_symptom_log(
    last_log: Option<NaiveDate>,
    current_cycle_day: u32,
    today: NaiveDate,
) -> LogPrompt {
    let Some(last_log) = last_log else {
        return LogPrompt {
            should_prompt: true,
            reason: Some("How are you feeling today?".into()),
        };
    };
    let days_since = (today - last_log).num_days();

    let reason = if (1..=5).contains(&current_cycle_day) && days_since >= 1 {
        Some("Track your symptoms during your period")
    } else if days_since >= 3 {
        Some("Log your symptoms to spot patterns")
    } else {
        None
    };
    LogPrompt {
        should_prompt: reason.is_some(),
        reason: reason.map(str::to_string),
    }
}

fn anomaly_rule(ctx: &RuleContext<'_>) -> Vec<Recommendation> {
    let anomaly = &ctx.input.anomaly;
    let tier = match anomaly.severity {
        Severity::Significant => PriorityTier::High,
        Severity::Moderate => PriorityTier::Medium,
        Severity::Mild => PriorityTier::Low,
        Severity::None if anomaly.iqr_outlier => {
            return vec![Recommendation::new(
                Category::Anomaly,
                PriorityTier::Low,
                "Cycle outside your typical range",
                anomaly.description.clone(),
            )];
        }
        Severity::None => return Vec::new(),
    };
    let message = match &anomaly.recommendation {
        Some(advice) => format!("{}. {advice}", anomaly.description),
        None => anomaly.description.clone(),
    };
    vec![Recommendation::new(Category::Anomaly, tier, "Unusual cycle length", message)]
}

fn data_quantity_rule(ctx: &RuleContext<'_>) -> Vec<Recommendation> {
    if ctx.history.is_empty() {
        return vec![Recommendation::new(
            Category::Tracking,
            PriorityTier::High,
            "Log your first period",
            "Add the start date of your last period to begin predictions",
        )];
    }
    let completed = ctx.completed_cycles();
    if completed >= MIN_CYCLES_FOR_CONFIDENCE {
        return Vec::new();
    }
    let remaining = MIN_CYCLES_FOR_CONFIDENCE - completed;
    let noun = if remaining == 1 { "cycle" } else { "cycles" };
    vec![Recommendation::new(
        Category::Tracking,
        PriorityTier::Medium,
        "Keep logging cycles",
        format!("Log {remaining} more complete {noun} for personalized predictions"),
    )]
}

fn prediction_quality_rule(ctx: &RuleContext<'_>) -> Vec<Recommendation> {
    let Some(prediction) = &ctx.input.prediction else {
        return Vec::new();
    };
    if prediction.methods_used.contains(&Method::Baseline) {
        return vec![Recommendation::new(
            Category::Prediction,
            PriorityTier::Low,
            "Using a typical cycle",
            "Predictions assume a 28-day cycle until more of your history is logged",
        )];
    }
    if prediction.confidence < MEDIUM_CONFIDENCE {
        return vec![Recommendation::new(
            Category::Prediction,
            PriorityTier::Medium,
            "Predictions are still uncertain",
            format!(
                "Expect your period between {} and {}",
                prediction.probability_window.start, prediction.probability_window.end
            ),
        )];
    }
    if prediction.methods_used.contains(&Method::MlEnsemble)
        && prediction.confidence >= HIGH_CONFIDENCE
    {
        return vec![Recommendation::new(
            Category::Prediction,
            PriorityTier::Low,
            "Predictions are reliable",
            "Your history is long enough for the full prediction model",
        )];
    }
    Vec::new()
}

fn regularity_rule(ctx: &RuleContext<'_>) -> Vec<Recommendation> {
    let Some(prediction) = &ctx.input.prediction else {
        return Vec::new();
    };
    if prediction.cycles_analyzed < MIN_CYCLES_FOR_CONFIDENCE {
        return Vec::new();
    }
    if prediction.variability > 0.2 {
        vec![Recommendation::new(
            Category::Regularity,
            PriorityTier::Medium,
            "Irregular cycles",
            "Your cycle length varies a lot. If this continues, consider talking to a healthcare provider",
        )]
    } else if prediction.variability < 0.1 {
        vec![Recommendation::new(
            Category::Regularity,
            PriorityTier::Low,
            "Consistent cycles",
            "Your cycles are regular, so predictions should stay accurate",
        )]
    } else {
        Vec::new()
    }
}

fn symptom_rule(ctx: &RuleContext<'_>) -> Vec<Recommendation> {
    let Some(insights) = ctx.input.symptom_insights.as_ref().filter(|s| s.has_data) else {
        return Vec::new();
    };

    let mut found = Vec::new();
    for (name, summary) in &insights.symptoms {
        if !summary.is_significant {
            continue;
        }
        if summary.severity >= SymptomSeverity::Significant {
            found.push(Recommendation::new(
                Category::Symptoms,
                PriorityTier::High,
                format!("Strong {name}"),
                format!("Your {name} is often intense. Consider discussing it with a healthcare provider"),
            ));
        } else {
            let when = summary
                .peak_phase
                .map(|p| format!(" during your {} phase", p.name()))
                .unwrap_or_default();
            found.push(Recommendation::new(
                Category::Symptoms,
                PriorityTier::Medium,
                format!("Plan for {name}"),
                format!("{name} tends to peak{when}, so plan ahead"),
            ));
        }
        if summary.trend == SymptomTrend::Increasing {
            found.push(Recommendation::new(
                Category::Symptoms,
                PriorityTier::Medium,
                format!("{name} is increasing"),
                format!("Your {name} has been getting stronger over recent logs"),
            ));
        }
    }
    found
}

fn health_rule(ctx: &RuleContext<'_>) -> Vec<Recommendation> {
    let Some(health) = &ctx.input.health_insights else {
        return Vec::new();
    };

    let mut found = Vec::new();
    match health.health_risk.level {
        RiskLevel::High => found.push(Recommendation::new(
            Category::Health,
            PriorityTier::High,
            "Check in with a professional",
            health.health_risk.description.clone(),
        )),
        RiskLevel::Moderate => found.push(Recommendation::new(
            Category::Health,
            PriorityTier::Medium,
            "Health check-in",
            health.health_risk.description.clone(),
        )),
        RiskLevel::Low | RiskLevel::Unknown => {}
    }
    if health.cycle_impact.consistent_with_history == Some(false) {
        let message = if health.cycle_impact.notes.is_empty() {
            "Your cycles are steadier than your health profile would suggest".to_string()
        } else {
            health.cycle_impact.notes.join(" ")
        };
        found.push(Recommendation::new(
            Category::Health,
            PriorityTier::Low,
            "Cycle pattern and health profile differ",
            message,
        ));
    }
    found.extend(health.recommendations.iter().map(|tip| {
        Recommendation::new(Category::Health, PriorityTier::Low, tip.clone(), tip.clone())
    }));
    found
}

fn engagement_rule(ctx: &RuleContext<'_>) -> Vec<Recommendation> {
    let engagement = &ctx.input.engagement;
    if engagement.days_since_last_log > REENTRY_AFTER_DAYS {
        return vec![Recommendation::new(
            Category::Engagement,
            PriorityTier::Medium,
            "Welcome back",
            "Log how you are feeling today to pick up where you left off",
        )];
    }
    if engagement.total_logs < 7 {
        return vec![Recommendation::new(
            Category::Engagement,
            PriorityTier::Low,
            "Track symptoms daily",
            "A week of symptom logs unlocks your symptom patterns",
        )];
    }
    Vec::new()
}
