use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::features::HealthFeatures;
use crate::history::History;
use crate::models::{HealthMetrics, SymptomLog};
use crate::stats::{mean, round_to, std_deviation};

const CM_PER_FOOT: f64 = 30.48;
const KG_PER_POUND: f64 = 0.453_592;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum BmiCategory {
    Underweight,
    Normal,
    Overweight,
    Obese,
}

impl BmiCategory {
    pub fn from_bmi(bmi: f64) -> Self {
        if bmi < 18.5 {
            BmiCategory::Underweight
        } else if bmi < 25.0 {
            BmiCategory::Normal
        } else if bmi < 30.0 {
            BmiCategory::Overweight
        } else {
            BmiCategory::Obese
        }
    }

    /// Discount applied to a prediction's confidence for this category.
    pub fn confidence_factor(self) -> f64 {
        match self {
            BmiCategory::Underweight => 0.92,
            BmiCategory::Normal => 1.0,
            BmiCategory::Overweight => 0.96,
            BmiCategory::Obese => 0.90,
        }
    }
}

impl HealthMetrics {
    pub fn height_cm(&self) -> f64 {
        if self.use_metric {
            self.height
        } else {
            self.height * CM_PER_FOOT
        }
    }

    pub fn weight_kg(&self) -> f64 {
        if self.use_metric {
            self.weight
        } else {
            self.weight * KG_PER_POUND
        }
    }

    /// `weight_kg / height_m²`; `None` for non-positive measurements.
    pub fn bmi(&self) -> Option<f64> {
        let (height_cm, weight_kg) = (self.height_cm(), self.weight_kg());
        if !(height_cm > 0.0 && weight_kg > 0.0) {
            return None;
        }
        let height_m = height_cm / 100.0;
        Some(weight_kg / (height_m * height_m))
    }

    pub fn bmi_category(&self) -> Option<BmiCategory> {
        self.bmi().map(BmiCategory::from_bmi)
    }

    /// Whole years on `today`, one less if the birthday is still ahead this year.
    pub fn age_on(&self, today: NaiveDate) -> Option<u32> {
        let birthdate = self.birthdate?;
        let mut years = today.year() - birthdate.year();
        if (today.month(), today.day()) < (birthdate.month(), birthdate.day()) {
            years -= 1;
        }
        u32::try_from(years).ok()
    }

    pub(crate) fn features_on(&self, today: NaiveDate) -> HealthFeatures {
        HealthFeatures {
            bmi: self.bmi(),
            age: self.age_on(today).map(f64::from),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "camelCase")]
pub enum RiskLevel {
    Low,
    Moderate,
    High,
    Unknown,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HealthRisk {
    pub level: RiskLevel,
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WeightRange {
    pub min: f64,
    pub max: f64,
    pub unit: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "camelCase")]
pub enum ImpactLevel {
    Low,
    Moderate,
    High,
}

impl ImpactLevel {
    fn raised(self) -> Self {
        match self {
            ImpactLevel::Low => ImpactLevel::Moderate,
            _ => ImpactLevel::High,
        }
    }
}

/// How much health factors are expected to disturb cycles, against what the
/// history actually shows.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CycleImpact {
    pub expected: ImpactLevel,
    pub observed_variability: Option<f64>,
    pub consistent_with_history: Option<bool>,
    pub notes: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HealthInsights {
    pub age: Option<u32>,
    pub bmi: Option<f64>,
    pub bmi_category: Option<BmiCategory>,
    pub health_risk: HealthRisk,
    pub ideal_weight_range: Option<WeightRange>,
    pub recommendations: Vec<String>,
    pub cycle_impact: CycleImpact,
    pub symptom_burden: Option<f64>,
}

/// Variability above which a history counts as irregular.
const IRREGULAR_VARIABILITY: f64 = 0.1;

pub fn analyze(
    metrics: &HealthMetrics,
    history: &History,
    symptoms: &[SymptomLog],
    today: NaiveDate,
) -> HealthInsights {
    let age = metrics.age_on(today);
    let bmi = metrics.bmi();
    let category = bmi.map(BmiCategory::from_bmi);

    HealthInsights {
        age,
        bmi: bmi.map(|b| round_to(b, 1)),
        bmi_category: category,
        health_risk: assess_risk(category, age),
        ideal_weight_range: ideal_weight_range(metrics),
        recommendations: recommendations(category, age),
        cycle_impact: cycle_impact(category, age, history),
        symptom_burden: symptom_burden(symptoms),
    }
}

fn assess_risk(category: Option<BmiCategory>, age: Option<u32>) -> HealthRisk {
    let level = match category {
        Some(BmiCategory::Normal) => RiskLevel::Low,
        Some(BmiCategory::Underweight | BmiCategory::Overweight) => RiskLevel::Moderate,
        Some(BmiCategory::Obese) => RiskLevel::High,
        None => RiskLevel::Unknown,
    };
    let level = match (category, age) {
        (Some(BmiCategory::Overweight | BmiCategory::Obese), Some(age)) if age >= 40 => {
            RiskLevel::High
        }
        _ => level,
    };
    let description = match level {
        RiskLevel::Low => "Your BMI is in the healthy range",
        RiskLevel::Moderate => "Consider consulting a healthcare provider",
        RiskLevel::High => "Recommend speaking with a healthcare professional",
        RiskLevel::Unknown => "Add your height and weight for a health assessment",
    };
    HealthRisk {
        level,
        description: description.to_string(),
    }
}

/// Weights for a BMI of 18.5-24.9 at this height, in the user's unit.
fn ideal_weight_range(metrics: &HealthMetrics) -> Option<WeightRange> {
    let height_cm = metrics.height_cm();
    if height_cm <= 0.0 {
        return None;
    }
    let height_m2 = (height_cm / 100.0).powi(2);
    let (min_kg, max_kg) = (18.5 * height_m2, 24.9 * height_m2);
    let (min, max, unit) = if metrics.use_metric {
        (min_kg, max_kg, "kg")
    } else {
        (min_kg / KG_PER_POUND, max_kg / KG_PER_POUND, "lbs")
    };
    Some(WeightRange {
        min: round_to(min, 1),
        max: round_to(max, 1),
        unit: unit.to_string(),
    })
}

fn recommendations(category: Option<BmiCategory>, age: Option<u32>) -> Vec<String> {
    let mut items: Vec<&str> = match category {
        Some(BmiCategory::Underweight) => vec![
            "Increase caloric intake with nutrient-dense foods",
            "Include protein-rich foods in every meal",
            "Consider consulting a nutritionist",
            "Adequate nutrition supports healthy cycles",
        ],
        Some(BmiCategory::Overweight | BmiCategory::Obese) => vec![
            "Aim for 30 minutes of moderate exercise daily",
            "Focus on whole foods and vegetables",
            "Practice portion control",
            "Maintaining healthy weight can improve cycle regularity",
        ],
        Some(BmiCategory::Normal) => vec![
            "Maintain your healthy habits",
            "Continue regular physical activity",
            "Eat a balanced diet",
            "Your weight supports optimal cycle health",
        ],
        None => Vec::new(),
    };
    if let Some(age) = age {
        if age >= 35 {
            items.push("Regular health screenings recommended");
        }
        if age >= 40 {
            items.push("Bone density monitoring important");
        }
    }
    items.into_iter().map(String::from).collect()
}

fn cycle_impact(category: Option<BmiCategory>, age: Option<u32>, history: &History) -> CycleImpact {
    let mut notes = Vec::new();
    let mut expected = match category {
        Some(BmiCategory::Underweight) => {
            notes.push("Low BMI may affect cycle regularity.".to_string());
            ImpactLevel::High
        }
        Some(BmiCategory::Obese) => {
            notes.push("High BMI may affect cycle regularity.".to_string());
            ImpactLevel::High
        }
        Some(BmiCategory::Overweight) => ImpactLevel::Moderate,
        Some(BmiCategory::Normal) | None => ImpactLevel::Low,
    };
    if let Some(age) = age {
        if age < 20 || age >= 40 {
            notes.push(format!("Cycle length naturally varies more at age {age}."));
            expected = expected.raised();
        }
    }

    let lengths = history.completed_lengths();
    let observed_variability = if lengths.len() >= 2 && mean(&lengths) > 0.0 {
        Some(std_deviation(&lengths) / mean(&lengths))
    } else {
        None
    };
    let consistent_with_history = observed_variability.map(|variability| {
        let irregular = variability > IRREGULAR_VARIABILITY;
        irregular == (expected >= ImpactLevel::Moderate)
    });
    if consistent_with_history == Some(false) && expected == ImpactLevel::Low {
        notes.push("Your cycle variability is not explained by weight or age.".to_string());
    }

    CycleImpact {
        expected,
        observed_variability: observed_variability.map(|v| round_to(v, 2)),
        consistent_with_history,
        notes,
    }
}

/// Mean of the daily summed intensities.
fn symptom_burden(symptoms: &[SymptomLog]) -> Option<f64> {
    let totals: Vec<f64> = symptoms
        .iter()
        .filter(|log| !log.symptoms.is_empty())
        .map(|log| log.symptoms.values().sum())
        .collect();
    if totals.is_empty() {
        None
    } else {
        Some(round_to(mean(&totals), 1))
    }
}
