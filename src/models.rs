use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::error::InsightError;

/// Longest cycle length, in days, still taken as a real observation.
pub const MAX_PLAUSIBLE_LENGTH: u32 = 180;

/// One logged cycle as supplied by the record store (newest first).
///
/// `cycle_length` is only present once the following cycle has started.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CycleRecord {
    #[serde(with = "flexible_date")]
    pub start_date: NaiveDate,
    #[serde(default)]
    pub cycle_length: Option<u32>,
}

impl CycleRecord {
    pub fn new(start_date: NaiveDate, cycle_length: Option<u32>) -> Self {
        Self {
            start_date,
            cycle_length,
        }
    }

    /// Build a record from an ISO date or RFC 3339 timestamp.
    pub fn parse(start_date: &str, cycle_length: Option<u32>) -> Result<Self, InsightError> {
        Ok(Self::new(parse_date(start_date)?, cycle_length))
    }

    /// The completed length, if this record carries a usable one.
    pub fn completed_length(&self) -> Option<u32> {
        self.cycle_length
            .filter(|len| (1..=MAX_PLAUSIBLE_LENGTH).contains(len))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HealthMetrics {
    /// Centimetres when `use_metric`, feet otherwise.
    pub height: f64,
    /// Kilograms when `use_metric`, pounds otherwise.
    pub weight: f64,
    #[serde(default = "default_true")]
    pub use_metric: bool,
    #[serde(default, with = "flexible_date_opt")]
    pub birthdate: Option<NaiveDate>,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SymptomLog {
    #[serde(with = "flexible_date")]
    pub date: NaiveDate,
    #[serde(default)]
    pub cycle_day: Option<u32>,
    /// Symptom type to intensity on a 0-10 scale.
    #[serde(default)]
    pub symptoms: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "camelCase")]
pub enum Phase {
    Menstrual,
    Follicular,
    Ovulation,
    Luteal,
}

impl Phase {
    pub const ALL: [Phase; 4] = [
        Phase::Menstrual,
        Phase::Follicular,
        Phase::Ovulation,
        Phase::Luteal,
    ];

    /// Day 1-5 menstrual, 6-13 follicular, 14-17 ovulation, 18+ luteal.
    pub fn from_cycle_day(day: u32) -> Self {
        match day.max(1) {
            1..=5 => Phase::Menstrual,
            6..=13 => Phase::Follicular,
            14..=17 => Phase::Ovulation,
            _ => Phase::Luteal,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Phase::Menstrual => "menstrual",
            Phase::Follicular => "follicular",
            Phase::Ovulation => "ovulation",
            Phase::Luteal => "luteal",
        }
    }
}

/// Method that contributed to a reconciled prediction.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum Method {
    Statistical,
    Trend,
    MlEnsemble,
    Baseline,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum PredictionQuality {
    #[serde(rename = "Baseline")]
    Baseline,
    #[serde(rename = "Limited")]
    Limited,
    #[serde(rename = "Developing")]
    Developing,
    #[serde(rename = "Fair")]
    Fair,
    #[serde(rename = "Good")]
    Good,
    #[serde(rename = "Very Good")]
    VeryGood,
    #[serde(rename = "Excellent")]
    Excellent,
    #[serde(rename = "Excellent - ML Enhanced")]
    ExcellentMl,
}

impl PredictionQuality {
    /// Ordered thresholds on (cycles analysed, confidence).
    pub fn grade(cycles_analyzed: usize, confidence: f64) -> Self {
        if cycles_analyzed < 3 {
            PredictionQuality::Limited
        } else if cycles_analyzed >= 8 && confidence >= 0.85 {
            PredictionQuality::ExcellentMl
        } else if confidence >= 0.80 {
            PredictionQuality::Excellent
        } else if confidence >= 0.70 {
            PredictionQuality::VeryGood
        } else if confidence >= 0.60 {
            PredictionQuality::Good
        } else if confidence >= 0.50 {
            PredictionQuality::Fair
        } else {
            PredictionQuality::Developing
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ProbabilityWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl ProbabilityWindow {
    /// Symmetric window of `half_width` days around `center`, `None` if it
    /// runs off the calendar.
    pub fn around(center: NaiveDate, half_width: i64) -> Option<Self> {
        let offset = chrono::Duration::try_days(half_width)?;
        Some(Self {
            start: center.checked_sub_signed(offset)?,
            end: center.checked_add_signed(offset)?,
        })
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Prediction {
    pub next_period_date: NaiveDate,
    pub confidence: f64,
    pub probability_window: ProbabilityWindow,
    pub predicted_cycle_length: f64,
    pub average_cycle_length: f64,
    pub median_cycle_length: f64,
    pub variability: f64,
    pub regularity_score: f64,
    pub cycles_analyzed: usize,
    pub prediction_quality: PredictionQuality,
    pub methods_used: Vec<Method>,
    pub insights: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FertilityWindow {
    pub fertile_start: NaiveDate,
    pub fertile_end: NaiveDate,
    pub ovulation_day: NaiveDate,
    pub peak_start: NaiveDate,
    pub peak_end: NaiveDate,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "camelCase")]
pub enum Severity {
    None,
    Mild,
    Moderate,
    Significant,
}

impl Severity {
    /// Bands on the absolute z-score.
    pub fn from_z_score(z: f64) -> Self {
        if z >= 2.5 {
            Severity::Significant
        } else if z >= 2.0 {
            Severity::Moderate
        } else if z >= 1.5 {
            Severity::Mild
        } else {
            Severity::None
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AnomalyResult {
    pub detected: bool,
    pub score: f64,
    pub severity: Severity,
    pub current_length: Option<u32>,
    pub average_length: Option<f64>,
    pub z_score: f64,
    pub modified_z_score: f64,
    pub iqr_outlier: bool,
    pub description: String,
    pub recommendation: Option<String>,
}

impl AnomalyResult {
    pub(crate) fn not_enough_data(description: &str) -> Self {
        Self {
            detected: false,
            score: 0.0,
            severity: Severity::None,
            current_length: None,
            average_length: None,
            z_score: 0.0,
            modified_z_score: 0.0,
            iqr_outlier: false,
            description: description.to_string(),
            recommendation: None,
        }
    }
}

/// Accepts `2024-05-01`, `2024-05-01T08:30:00Z`, `2024-05-01T08:30:00+02:00`
/// and naive `2024-05-01T08:30:00[.fff]`. The calendar date is kept.
pub fn parse_date(raw: &str) -> Result<NaiveDate, InsightError> {
    let raw = raw.trim();
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Ok(date);
    }
    if let Ok(stamp) = DateTime::parse_from_rfc3339(raw) {
        return Ok(stamp.date_naive());
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|stamp| stamp.date())
        .map_err(|_| InsightError::InvalidDate(raw.to_string()))
}

pub(crate) mod flexible_date {
    use chrono::NaiveDate;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(date: &NaiveDate, serializer: S) -> Result<S::Ok, S::Error> {
        date.serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveDate, D::Error> {
        let raw = String::deserialize(deserializer)?;
        super::parse_date(&raw).map_err(serde::de::Error::custom)
    }
}

pub(crate) mod flexible_date_opt {
    use chrono::NaiveDate;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(
        date: &Option<NaiveDate>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        date.serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<NaiveDate>, D::Error> {
        match Option::<String>::deserialize(deserializer)? {
            Some(raw) => super::parse_date(&raw)
                .map(Some)
                .map_err(serde::de::Error::custom),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_dates_and_timestamps() {
        let expected = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
        assert_eq!(parse_date("2024-05-01").unwrap(), expected);
        assert_eq!(parse_date("2024-05-01T00:00:00Z").unwrap(), expected);
        assert_eq!(parse_date("2024-05-01T23:10:00+02:00").unwrap(), expected);
        assert_eq!(parse_date("2024-05-01T08:30:00.000").unwrap(), expected);
    }

    #[test]
    fn rejects_unparsable_dates() {
        assert!(matches!(
            parse_date("01/05/2024"),
            Err(InsightError::InvalidDate(_))
        ));
    }

    #[test]
    fn cycle_record_from_json() {
        let record: CycleRecord =
            serde_json::from_str(r#"{"startDate":"2024-05-01T00:00:00Z","cycleLength":null}"#)
                .unwrap();
        assert_eq!(record.start_date, NaiveDate::from_ymd_opt(2024, 5, 1).unwrap());
        assert_eq!(record.cycle_length, None);

        let bad = serde_json::from_str::<CycleRecord>(r#"{"startDate":"yesterday"}"#);
        assert!(bad.is_err());
    }

    #[test]
    fn zero_length_is_not_completed() {
        let record = CycleRecord::parse("2024-05-01", Some(0)).unwrap();
        assert_eq!(record.completed_length(), None);
    }

    #[test]
    fn implausible_length_is_not_completed() {
        let record: CycleRecord =
            serde_json::from_str(r#"{"startDate":"2024-04-03","cycleLength":4000000000}"#)
                .unwrap();
        assert_eq!(record.completed_length(), None);
        let longest = CycleRecord::parse("2024-04-03", Some(MAX_PLAUSIBLE_LENGTH)).unwrap();
        assert_eq!(longest.completed_length(), Some(MAX_PLAUSIBLE_LENGTH));
    }

    #[test]
    fn window_off_the_calendar_is_none() {
        assert!(ProbabilityWindow::around(NaiveDate::MAX, 2).is_none());
        assert!(ProbabilityWindow::around(NaiveDate::MIN, 2).is_none());
        let window =
            ProbabilityWindow::around(NaiveDate::from_ymd_opt(2024, 5, 29).unwrap(), 4).unwrap();
        assert_eq!(window.start, NaiveDate::from_ymd_opt(2024, 5, 25).unwrap());
        assert_eq!(window.end, NaiveDate::from_ymd_opt(2024, 6, 2).unwrap());
    }

    #[test]
    fn fertility_window_fields_are_camel_case() {
        let day = NaiveDate::from_ymd_opt(2026, 3, 12).unwrap();
        let window = FertilityWindow {
            fertile_start: day,
            fertile_end: day,
            ovulation_day: day,
            peak_start: day,
            peak_end: day,
        };
        let json = serde_json::to_value(&window).unwrap();
        assert_eq!(json["fertileStart"], "2026-03-12");
        assert_eq!(json["ovulationDay"], "2026-03-12");
        assert!(json.get("fertile_start").is_none());
    }

    #[test]
    fn phase_boundaries() {
        assert_eq!(Phase::from_cycle_day(1), Phase::Menstrual);
        assert_eq!(Phase::from_cycle_day(5), Phase::Menstrual);
        assert_eq!(Phase::from_cycle_day(6), Phase::Follicular);
        assert_eq!(Phase::from_cycle_day(13), Phase::Follicular);
        assert_eq!(Phase::from_cycle_day(14), Phase::Ovulation);
        assert_eq!(Phase::from_cycle_day(17), Phase::Ovulation);
        assert_eq!(Phase::from_cycle_day(18), Phase::Luteal);
        assert_eq!(Phase::from_cycle_day(40), Phase::Luteal);
    }

    #[test]
    fn quality_labels_serialize_with_spaces() {
        let json = serde_json::to_string(&PredictionQuality::ExcellentMl).unwrap();
        assert_eq!(json, r#""Excellent - ML Enhanced""#);
        assert_eq!(PredictionQuality::grade(2, 0.99), PredictionQuality::Limited);
        assert_eq!(PredictionQuality::grade(8, 0.86), PredictionQuality::ExcellentMl);
        assert_eq!(PredictionQuality::grade(7, 0.86), PredictionQuality::Excellent);
        assert_eq!(PredictionQuality::grade(5, 0.65), PredictionQuality::Good);
        assert_eq!(PredictionQuality::grade(5, 0.4), PredictionQuality::Developing);
    }

    #[test]
    fn severity_bands() {
        assert_eq!(Severity::from_z_score(1.49), Severity::None);
        assert_eq!(Severity::from_z_score(1.5), Severity::Mild);
        assert_eq!(Severity::from_z_score(2.0), Severity::Moderate);
        assert_eq!(Severity::from_z_score(3.1), Severity::Significant);
    }
}
