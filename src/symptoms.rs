use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::health::BmiCategory;
use crate::history::History;
use crate::models::{HealthMetrics, Phase, SymptomLog};
use crate::stats::{linear_fit, mean, round_to, std_deviation};

pub const MIN_PATTERN_LOGS: usize = 7;
pub const MIN_PREDICTION_LOGS: usize = 14;
/// Intensity at which a symptom counts towards a co-occurring combination.
const COMBINATION_INTENSITY: f64 = 4.0;
const MIN_COMBINATION_COUNT: usize = 3;
const MAX_COMBINATIONS: usize = 5;
const MIN_PHASE_SAMPLES: usize = 3;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "camelCase")]
pub enum SymptomSeverity {
    Minimal,
    Mild,
    Moderate,
    Significant,
    Severe,
}

impl SymptomSeverity {
    pub fn from_intensity(intensity: f64) -> Self {
        if intensity < 2.0 {
            SymptomSeverity::Minimal
        } else if intensity < 4.0 {
            SymptomSeverity::Mild
        } else if intensity < 6.0 {
            SymptomSeverity::Moderate
        } else if intensity < 8.0 {
            SymptomSeverity::Significant
        } else {
            SymptomSeverity::Severe
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum SymptomTrend {
    Increasing,
    Decreasing,
    Stable,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SymptomSummary {
    pub average: f64,
    pub variability: f64,
    pub maximum: f64,
    pub severity: SymptomSeverity,
    pub is_significant: bool,
    pub trend: SymptomTrend,
    /// Share of logs where the symptom was present.
    pub persistence: f64,
    pub phase_averages: BTreeMap<Phase, f64>,
    pub peak_phase: Option<Phase>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PhaseCluster {
    pub phase: Phase,
    pub symptoms: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Combination {
    pub symptoms: Vec<String>,
    pub occurrences: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SymptomInsights {
    pub has_data: bool,
    pub message: Option<String>,
    pub total_logs_analyzed: usize,
    pub symptoms: BTreeMap<String, SymptomSummary>,
    pub phase_clusters: Vec<PhaseCluster>,
    pub combinations: Vec<Combination>,
    pub health_note: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum LikelihoodBasis {
    PhaseHistory,
    OverallAverage,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SymptomLikelihood {
    pub likelihood: f64,
    pub confidence: f64,
    pub basis: LikelihoodBasis,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SymptomPrediction {
    pub has_data: bool,
    pub message: Option<String>,
    pub phase: Phase,
    pub cycle_day: u32,
    pub predictions: BTreeMap<String, SymptomLikelihood>,
}

/// A log with its resolved phase, ordered by date.
struct PhasedLog<'a> {
    log: &'a SymptomLog,
    phase: Option<Phase>,
}

impl PhasedLog<'_> {
    fn intensity(&self, symptom: &str) -> f64 {
        self.log.symptoms.get(symptom).copied().unwrap_or(0.0)
    }
}

/// Logs with at least one symptom, oldest first, each placed in a phase
/// by its own cycle day or by the cycle it falls in.
fn prepare<'a>(logs: &'a [SymptomLog], history: &History) -> Vec<PhasedLog<'a>> {
    let mut prepared: Vec<PhasedLog<'a>> = logs
        .iter()
        .filter(|log| !log.symptoms.is_empty())
        .map(|log| PhasedLog {
            log,
            phase: log
                .cycle_day
                .filter(|day| *day > 0)
                .or_else(|| history.cycle_day_for(log.date))
                .map(Phase::from_cycle_day),
        })
        .collect();
    prepared.sort_by_key(|p| p.log.date);
    prepared
}

fn symptom_types(logs: &[PhasedLog<'_>]) -> BTreeSet<String> {
    logs.iter()
        .flat_map(|p| p.log.symptoms.keys().cloned())
        .collect()
}

fn phase_values(logs: &[PhasedLog<'_>], symptom: &str, phase: Phase) -> Vec<f64> {
    logs.iter()
        .filter(|p| p.phase == Some(phase))
        .map(|p| p.intensity(symptom))
        .collect()
}

pub fn analyze_patterns(
    logs: &[SymptomLog],
    history: &History,
    health: Option<&HealthMetrics>,
) -> SymptomInsights {
    let prepared = prepare(logs, history);
    if prepared.len() < MIN_PATTERN_LOGS {
        return SymptomInsights {
            has_data: false,
            message: Some("Log symptoms for at least a week to see patterns".into()),
            total_logs_analyzed: prepared.len(),
            symptoms: BTreeMap::new(),
            phase_clusters: Vec::new(),
            combinations: Vec::new(),
            health_note: None,
        };
    }

    let mut symptoms = BTreeMap::new();
    for symptom in symptom_types(&prepared) {
        let values: Vec<f64> = prepared.iter().map(|p| p.intensity(&symptom)).collect();
        if values.iter().all(|v| *v == 0.0) {
            continue;
        }
        symptoms.insert(symptom.clone(), summarize(&prepared, &symptom, &values));
    }

    let phase_clusters = Phase::ALL
        .iter()
        .filter_map(|&phase| {
            let members: Vec<String> = symptoms
                .iter()
                .filter(|(_, s)| s.peak_phase == Some(phase))
                .map(|(name, _)| name.clone())
                .collect();
            (!members.is_empty()).then_some(PhaseCluster {
                phase,
                symptoms: members,
            })
        })
        .collect();

    let health_note = match health.and_then(HealthMetrics::bmi_category) {
        Some(BmiCategory::Underweight) => {
            Some("Low body weight can make cycle symptoms less predictable".to_string())
        }
        Some(BmiCategory::Obese) => {
            Some("Higher body weight is linked to stronger cycle symptoms for some people".to_string())
        }
        _ => None,
    };

    SymptomInsights {
        has_data: true,
        message: None,
        total_logs_analyzed: prepared.len(),
        symptoms,
        phase_clusters,
        combinations: combinations(&prepared),
        health_note,
    }
}

fn summarize(logs: &[PhasedLog<'_>], symptom: &str, values: &[f64]) -> SymptomSummary {
    let average = mean(values);
    let maximum = values.iter().copied().fold(0.0, f64::max);

    let trend = match linear_fit(values) {
        Some(fit) if fit.is_significant(0.05) && fit.slope > 0.0 => SymptomTrend::Increasing,
        Some(fit) if fit.is_significant(0.05) && fit.slope < 0.0 => SymptomTrend::Decreasing,
        _ => SymptomTrend::Stable,
    };

    let phase_averages: BTreeMap<Phase, f64> = Phase::ALL
        .iter()
        .filter_map(|&phase| {
            let in_phase = phase_values(logs, symptom, phase);
            (!in_phase.is_empty()).then(|| (phase, round_to(mean(&in_phase), 1)))
        })
        .collect();

    // Ties go to the earlier phase.
    let peak_phase = phase_averages
        .iter()
        .filter(|(_, avg)| **avg > 0.0)
        .fold(None, |best: Option<(Phase, f64)>, (&phase, &avg)| match best {
            Some((_, best_avg)) if best_avg >= avg => best,
            _ => Some((phase, avg)),
        })
        .map(|(phase, _)| phase);

    SymptomSummary {
        average: round_to(average, 1),
        variability: round_to(std_deviation(values), 2),
        maximum,
        severity: SymptomSeverity::from_intensity(average),
        is_significant: average > 3.0 || maximum > 6.0,
        trend,
        persistence: round_to(
            values.iter().filter(|v| **v > 0.0).count() as f64 / values.len() as f64,
            2,
        ),
        phase_averages,
        peak_phase,
    }
}

/// Pairs that were both strong on the same day, most frequent first.
fn combinations(logs: &[PhasedLog<'_>]) -> Vec<Combination> {
    let mut counts: BTreeMap<(String, String), usize> = BTreeMap::new();
    for p in logs {
        let strong: Vec<&String> = p
            .log
            .symptoms
            .iter()
            .filter(|(_, v)| **v >= COMBINATION_INTENSITY)
            .map(|(name, _)| name)
            .collect();
        for (i, a) in strong.iter().enumerate() {
            for b in &strong[i + 1..] {
                *counts.entry(((*a).clone(), (*b).clone())).or_default() += 1;
            }
        }
    }

    let mut found: Vec<Combination> = counts
        .into_iter()
        .filter(|(_, n)| *n >= MIN_COMBINATION_COUNT)
        .map(|((a, b), occurrences)| Combination {
            symptoms: vec![a, b],
            occurrences,
        })
        .collect();
    found.sort_by(|x, y| y.occurrences.cmp(&x.occurrences));
    found.truncate(MAX_COMBINATIONS);
    found
}

/// Multipliers for phases where a symptom is commonly stronger.
fn phase_multiplier(phase: Phase, symptom: &str) -> f64 {
    match (phase, symptom) {
        (Phase::Menstrual, "cramps" | "headache") => 1.3,
        (Phase::Ovulation, "energy") => 1.2,
        (Phase::Luteal, "mood" | "bloating") => 1.2,
        _ => 1.0,
    }
}

pub fn predict_likelihood(
    logs: &[SymptomLog],
    current_cycle_day: u32,
    history: &History,
) -> SymptomPrediction {
    let phase = Phase::from_cycle_day(current_cycle_day);
    let prepared = prepare(logs, history);
    if prepared.len() < MIN_PREDICTION_LOGS {
        return SymptomPrediction {
            has_data: false,
            message: Some("Need more symptom history for predictions".into()),
            phase,
            cycle_day: current_cycle_day,
            predictions: BTreeMap::new(),
        };
    }

    let predictions = symptom_types(&prepared)
        .into_iter()
        .map(|symptom| {
            let in_phase = phase_values(&prepared, &symptom, phase);
            let prediction = if in_phase.len() >= MIN_PHASE_SAMPLES {
                SymptomLikelihood {
                    likelihood: round_to(mean(&in_phase).min(10.0), 1),
                    confidence: if in_phase.len() > 20 { 0.7 } else { 0.55 },
                    basis: LikelihoodBasis::PhaseHistory,
                }
            } else {
                let values: Vec<f64> = prepared.iter().map(|p| p.intensity(&symptom)).collect();
                let adjusted = mean(&values) * phase_multiplier(phase, &symptom);
                SymptomLikelihood {
                    likelihood: round_to(adjusted.min(10.0), 1),
                    confidence: if values.len() > 20 { 0.6 } else { 0.4 },
                    basis: LikelihoodBasis::OverallAverage,
                }
            };
            (symptom, prediction)
        })
        .collect();

    SymptomPrediction {
        has_data: true,
        message: None,
        phase,
        cycle_day: current_cycle_day,
        predictions,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CycleRecord;
    use chrono::{Duration, NaiveDate};

    fn first_day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 1, 1).unwrap()
    }

    fn log(offset: i64, entries: &[(&str, f64)]) -> SymptomLog {
        SymptomLog {
            date: first_day() + Duration::days(offset),
            cycle_day: None,
            symptoms: entries.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
        }
    }

    fn history() -> History {
        History::from_newest_first(&[
            CycleRecord::new(first_day() + Duration::days(28), None),
            CycleRecord::new(first_day(), Some(28)),
        ])
    }

    /// Cramps strong in the first five days, bloating in the luteal phase.
    fn month_of_logs() -> Vec<SymptomLog> {
        (0..28)
            .map(|day| {
                let cramps = if day < 5 { 7.0 } else { 0.0 };
                let bloating = if day >= 17 { 5.0 } else { 1.0 };
                let headache = if day < 5 { 5.0 } else { 0.0 };
                log(day, &[("cramps", cramps), ("bloating", bloating), ("headache", headache)])
            })
            .collect()
    }

    #[test]
    fn needs_a_week_of_logs() {
        let logs: Vec<SymptomLog> = (0..6).map(|d| log(d, &[("cramps", 3.0)])).collect();
        let insights = analyze_patterns(&logs, &history(), None);
        assert!(!insights.has_data);
        assert_eq!(insights.total_logs_analyzed, 6);
    }

    #[test]
    fn empty_logs_are_skipped() {
        let mut logs: Vec<SymptomLog> = (0..6).map(|d| log(d, &[("cramps", 3.0)])).collect();
        logs.push(log(7, &[]));
        assert!(!analyze_patterns(&logs, &history(), None).has_data);
    }

    #[test]
    fn severity_bands() {
        assert_eq!(SymptomSeverity::from_intensity(1.9), SymptomSeverity::Minimal);
        assert_eq!(SymptomSeverity::from_intensity(2.0), SymptomSeverity::Mild);
        assert_eq!(SymptomSeverity::from_intensity(5.9), SymptomSeverity::Moderate);
        assert_eq!(SymptomSeverity::from_intensity(7.0), SymptomSeverity::Significant);
        assert_eq!(SymptomSeverity::from_intensity(8.0), SymptomSeverity::Severe);
    }

    #[test]
    fn finds_phase_peaks_and_clusters() {
        let insights = analyze_patterns(&month_of_logs(), &history(), None);
        assert!(insights.has_data);

        let cramps = &insights.symptoms["cramps"];
        assert_eq!(cramps.peak_phase, Some(Phase::Menstrual));
        assert_eq!(cramps.phase_averages[&Phase::Menstrual], 7.0);
        assert!(cramps.is_significant);
        assert_eq!(cramps.persistence, round_to(5.0 / 28.0, 2));

        let bloating = &insights.symptoms["bloating"];
        assert_eq!(bloating.peak_phase, Some(Phase::Luteal));

        let menstrual = insights
            .phase_clusters
            .iter()
            .find(|c| c.phase == Phase::Menstrual)
            .unwrap();
        assert_eq!(menstrual.symptoms, vec!["cramps", "headache"]);
    }

    #[test]
    fn detects_co_occurring_pairs() {
        let insights = analyze_patterns(&month_of_logs(), &history(), None);
        assert_eq!(insights.combinations.len(), 1);
        assert_eq!(insights.combinations[0].symptoms, vec!["cramps", "headache"]);
        assert_eq!(insights.combinations[0].occurrences, 5);
    }

    #[test]
    fn rising_symptom_trend() {
        let logs: Vec<SymptomLog> = (0..10)
            .map(|d| log(d, &[("fatigue", d as f64 * 0.8)]))
            .collect();
        let insights = analyze_patterns(&logs, &history(), None);
        assert_eq!(insights.symptoms["fatigue"].trend, SymptomTrend::Increasing);
    }

    #[test]
    fn explicit_cycle_day_wins() {
        let mut logs = month_of_logs();
        for l in logs.iter_mut() {
            l.cycle_day = Some(20);
        }
        let insights = analyze_patterns(&logs, &history(), None);
        assert_eq!(insights.symptoms["cramps"].peak_phase, Some(Phase::Luteal));
    }

    #[test]
    fn likelihood_uses_phase_history() {
        let prediction = predict_likelihood(&month_of_logs(), 2, &history());
        assert!(prediction.has_data);
        assert_eq!(prediction.phase, Phase::Menstrual);
        let cramps = &prediction.predictions["cramps"];
        assert_eq!(cramps.basis, LikelihoodBasis::PhaseHistory);
        assert_eq!(cramps.likelihood, 7.0);
        assert_eq!(cramps.confidence, 0.55);
    }

    #[test]
    fn likelihood_falls_back_to_adjusted_average() {
        // No cycle context and no cycle days: no phase history at all.
        let logs: Vec<SymptomLog> = (0..14).map(|d| log(d, &[("cramps", 5.0)])).collect();
        let prediction = predict_likelihood(&logs, 3, &History::default());
        let cramps = &prediction.predictions["cramps"];
        assert_eq!(cramps.basis, LikelihoodBasis::OverallAverage);
        assert_eq!(cramps.likelihood, 6.5);
        assert_eq!(cramps.confidence, 0.4);
    }

    #[test]
    fn likelihood_needs_two_weeks() {
        let logs: Vec<SymptomLog> = (0..13).map(|d| log(d, &[("cramps", 5.0)])).collect();
        let prediction = predict_likelihood(&logs, 20, &history());
        assert!(!prediction.has_data);
        assert_eq!(prediction.phase, Phase::Luteal);
    }
}
