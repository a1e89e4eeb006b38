use std::collections::BTreeMap;

use chrono::NaiveDate;

use crate::error::{Result, TrackerError};
use crate::models::{Category, TestResult};

/// Validated category scores plus the derived total.
#[derive(Debug, Clone)]
pub struct AggregatedScores {
    pub categories: BTreeMap<Category, f64>,
    pub total: f64,
}

impl AggregatedScores {
    /// Assembles the stored test row. `aggregate` has already checked that
    /// every category is present, so the lookups cannot miss.
    pub fn into_test_result(self, participant: &str, date: NaiveDate) -> TestResult {
        let value = |category: Category| self.categories[&category] as u32;
        TestResult {
            participant: participant.to_string(),
            date,
            textaufgaben: value(Category::Textaufgaben),
            raumvorstellung: value(Category::Raumvorstellung),
            gleichungen: value(Category::Gleichungen),
            brueche: value(Category::Brueche),
            grundrechenarten: value(Category::Grundrechenarten),
            zahlenraum: value(Category::Zahlenraum),
            total: self.total,
        }
    }
}

/// Validates the six category scores and derives the total.
///
/// Scores arrive already on the 0-100 scale and pass through unchanged; the
/// total is their arithmetic mean, rounded to two decimals. Aggregating the
/// output again yields the same result.
pub fn aggregate(raw: &BTreeMap<Category, f64>) -> Result<AggregatedScores> {
    let mut values = [0.0f64; 6];
    for (slot, category) in values.iter_mut().zip(Category::ALL) {
        let value = *raw.get(&category).ok_or_else(|| {
            TrackerError::Validation(format!("missing score for category {category}"))
        })?;
        if !(0.0..=100.0).contains(&value) {
            return Err(TrackerError::Validation(format!(
                "{category} score {value} is outside 0-100"
            )));
        }
        *slot = value;
    }

    Ok(AggregatedScores {
        categories: raw.clone(),
        total: total_of(&values),
    })
}

/// Mean of the six category scores, on the 0-100 scale, two decimals.
pub fn total_of(values: &[f64; 6]) -> f64 {
    round2(values.iter().sum::<f64>() / values.len() as f64)
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
