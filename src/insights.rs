use serde::{Deserialize, Serialize};

use crate::estimators::statistical;
use crate::history::History;
use crate::models::{FertilityWindow, Prediction};
use crate::prediction::fertility_window;
use crate::stats::{linear_fit, mean, round_to};

/// Cycle lengths considered typical, in days.
const TYPICAL_RANGE: std::ops::RangeInclusive<f64> = 21.0..=35.0;
const RECENT_CYCLES: usize = 3;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CycleStatistics {
    pub mean: f64,
    pub median: f64,
    pub std: f64,
    pub min: f64,
    pub max: f64,
    pub range: f64,
    pub coefficient_of_variation: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum RegularityLabel {
    #[serde(rename = "Very Regular")]
    VeryRegular,
    #[serde(rename = "Regular")]
    Regular,
    #[serde(rename = "Somewhat Irregular")]
    SomewhatIrregular,
    #[serde(rename = "Irregular")]
    Irregular,
}

impl RegularityLabel {
    pub fn from_variability(variability: f64) -> Self {
        if variability < 0.05 {
            RegularityLabel::VeryRegular
        } else if variability < 0.10 {
            RegularityLabel::Regular
        } else if variability < 0.20 {
            RegularityLabel::SomewhatIrregular
        } else {
            RegularityLabel::Irregular
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Regularity {
    pub score: f64,
    pub label: RegularityLabel,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum TrendDirection {
    Lengthening,
    Shortening,
    Stable,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CycleTrend {
    pub direction: TrendDirection,
    /// Days per cycle.
    pub slope: f64,
    pub significant: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Consistency {
    /// Share of cycles within 21-35 days.
    pub within_typical_range: f64,
    /// Mean of the last three cycles minus the overall mean.
    pub recent_vs_overall: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PhaseBreakdown {
    pub menstrual_days: u32,
    pub follicular_days: u32,
    pub ovulation_days: u32,
    pub luteal_days: u32,
    pub estimated_ovulation_day: u32,
}

impl PhaseBreakdown {
    /// Fixed phase lengths, with the luteal phase taking the remainder.
    pub fn for_length(average_length: f64) -> Self {
        let length = average_length.round().max(0.0) as u32;
        Self {
            menstrual_days: 5,
            follicular_days: 8,
            ovulation_days: 4,
            luteal_days: length.saturating_sub(17),
            estimated_ovulation_day: length.saturating_sub(14).max(1),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CycleInsights {
    pub has_data: bool,
    pub message: Option<String>,
    pub cycles_analyzed: usize,
    pub statistics: Option<CycleStatistics>,
    pub regularity: Option<Regularity>,
    pub trend: Option<CycleTrend>,
    pub consistency: Option<Consistency>,
    pub phase_breakdown: Option<PhaseBreakdown>,
    pub fertility_window: Option<FertilityWindow>,
    pub shortest_cycle: Option<u32>,
    pub longest_cycle: Option<u32>,
}

impl CycleInsights {
    fn no_data(cycles_analyzed: usize) -> Self {
        Self {
            has_data: false,
            message: Some("Log at least two complete cycles to see detailed insights".into()),
            cycles_analyzed,
            statistics: None,
            regularity: None,
            trend: None,
            consistency: None,
            phase_breakdown: None,
            fertility_window: None,
            shortest_cycle: None,
            longest_cycle: None,
        }
    }
}

/// Statistics, regularity, trend, consistency and phase layout of a history.
pub fn detailed(history: &History, prediction: Option<&Prediction>) -> CycleInsights {
    let lengths = history.completed_lengths();
    let Ok(summary) = statistical::summarize(&lengths) else {
        return CycleInsights::no_data(lengths.len());
    };

    let min = lengths.iter().copied().fold(f64::INFINITY, f64::min);
    let max = lengths.iter().copied().fold(f64::NEG_INFINITY, f64::max);

    let trend = linear_fit(&lengths).map(|fit| {
        let significant = fit.is_significant(0.05);
        let direction = if !significant || fit.slope.abs() < 0.1 {
            TrendDirection::Stable
        } else if fit.slope > 0.0 {
            TrendDirection::Lengthening
        } else {
            TrendDirection::Shortening
        };
        CycleTrend {
            direction,
            slope: round_to(fit.slope, 2),
            significant,
        }
    });

    let within = lengths.iter().filter(|l| TYPICAL_RANGE.contains(*l)).count();
    let recent = &lengths[lengths.len().saturating_sub(RECENT_CYCLES)..];

    CycleInsights {
        has_data: true,
        message: None,
        cycles_analyzed: summary.count,
        statistics: Some(CycleStatistics {
            mean: round_to(summary.mean, 1),
            median: round_to(summary.median, 1),
            std: round_to(summary.std, 2),
            min,
            max,
            range: max - min,
            coefficient_of_variation: round_to(summary.variability, 3),
        }),
        regularity: Some(Regularity {
            score: round_to(1.0 - summary.variability.min(1.0), 2),
            label: RegularityLabel::from_variability(summary.variability),
        }),
        trend,
        consistency: Some(Consistency {
            within_typical_range: round_to(within as f64 / lengths.len() as f64, 2),
            recent_vs_overall: round_to(mean(recent) - summary.mean, 1),
        }),
        phase_breakdown: Some(PhaseBreakdown::for_length(summary.mean)),
        fertility_window: prediction.and_then(fertility_window),
        shortest_cycle: Some(min as u32),
        longest_cycle: Some(max as u32),
    }
}
