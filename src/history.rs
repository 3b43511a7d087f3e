use chrono::{Datelike, NaiveDate};

use crate::models::CycleRecord;

/// Cycle history in chronological order (oldest first).
///
/// Callers hand records over newest-first; this is the only place that
/// ordering is converted. Everything downstream reads lengths from here so
/// the predictor and the anomaly scorer agree on what "history" means.
#[derive(Debug, Clone, Default)]
pub struct History {
    records: Vec<CycleRecord>,
}

/// A completed cycle: start date and length in days.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompletedCycle {
    pub start_date: NaiveDate,
    pub length: f64,
}

impl CompletedCycle {
    pub fn month(&self) -> u32 {
        self.start_date.month()
    }
}

impl History {
    pub fn from_newest_first(records: &[CycleRecord]) -> Self {
        let mut records = records.to_vec();
        records.sort_by_key(|r| r.start_date);
        Self { records }
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn record_count(&self) -> usize {
        self.records.len()
    }

    pub fn last_start(&self) -> Option<NaiveDate> {
        self.records.last().map(|r| r.start_date)
    }

    /// Records with a usable length, oldest first. Missing, zero or implausibly long lengths are skipped.
    pub fn completed(&self) -> Vec<CompletedCycle> {
        self.records
            .iter()
            .filter_map(|r| {
                r.completed_length().map(|len| CompletedCycle {
                    start_date: r.start_date,
                    length: f64::from(len),
                })
            })
            .collect()
    }

    pub fn completed_lengths(&self) -> Vec<f64> {
        self.completed().iter().map(|c| c.length).collect()
    }

    /// Start of the cycle that contains `date`, if any record began on or before it.
    pub fn cycle_start_for(&self, date: NaiveDate) -> Option<NaiveDate> {
        self.records
            .iter()
            .rev()
            .map(|r| r.start_date)
            .find(|start| *start <= date)
    }

    /// 1-based day of the cycle containing `date`.
    pub fn cycle_day_for(&self, date: NaiveDate) -> Option<u32> {
        let start = self.cycle_start_for(date)?;
        u32::try_from((date - start).num_days() + 1).ok()
    }
}
