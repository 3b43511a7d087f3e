use crate::history::CompletedCycle;
use crate::stats::mean;

/// Health values folded into every feature row when known.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct HealthFeatures {
    pub bmi: Option<f64>,
    pub age: Option<f64>,
}

/// Supervised view of a cycle history: each row is labelled with the
/// length of the cycle that followed it, and the newest row is left over
/// as the query.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureTable {
    pub names: Vec<&'static str>,
    pub training: Vec<Vec<f64>>,
    pub labels: Vec<f64>,
    pub query: Vec<f64>,
}

impl FeatureTable {
    /// Complete rows, including the query row.
    pub fn usable_rows(&self) -> usize {
        self.training.len() + 1
    }
}

const SHORT_WINDOW: usize = 3;
const LONG_WINDOW: usize = 5;

/// 0 winter, 1 spring, 2 summer, 3 autumn.
pub fn season(month: u32) -> u32 {
    (month % 12) / 3
}

/// Build the feature table from chronological completed cycles.
///
/// Rows without a full rolling window are dropped. Returns `None` when no
/// complete row remains.
pub fn build(cycles: &[CompletedCycle], health: HealthFeatures) -> Option<FeatureTable> {
    let lengths: Vec<f64> = cycles.iter().map(|c| c.length).collect();

    let mut names = vec!["cycle_index", "rolling_3", "rolling_5", "month", "season"];
    if health.bmi.is_some() {
        names.push("bmi");
    }
    if health.age.is_some() {
        names.push("age");
    }

    let mut rows: Vec<(Vec<f64>, usize)> = Vec::new();
    for (i, cycle) in cycles.iter().enumerate() {
        if i + 1 < LONG_WINDOW {
            continue;
        }
        let rolling_short = mean(&lengths[i + 1 - SHORT_WINDOW..=i]);
        let rolling_long = mean(&lengths[i + 1 - LONG_WINDOW..=i]);
        let month = cycle.month();

        let mut row = vec![
            i as f64,
            rolling_short,
            rolling_long,
            f64::from(month),
            f64::from(season(month)),
        ];
        row.extend(health.bmi);
        row.extend(health.age);
        rows.push((row, i));
    }

    let (query, _) = rows.pop()?;
    let labels = rows.iter().map(|(_, i)| lengths[i + 1]).collect();
    let training = rows.into_iter().map(|(row, _)| row).collect();

    Some(FeatureTable {
        names,
        training,
        labels,
        query,
    })
}
