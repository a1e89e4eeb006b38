use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// The six test categories, in canonical column order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Category {
    Textaufgaben,
    Raumvorstellung,
    Gleichungen,
    Brueche,
    Grundrechenarten,
    Zahlenraum,
}

impl Category {
    pub const ALL: [Category; 6] = [
        Category::Textaufgaben,
        Category::Raumvorstellung,
        Category::Gleichungen,
        Category::Brueche,
        Category::Grundrechenarten,
        Category::Zahlenraum,
    ];

    /// Column header as written in the test file.
    pub fn label(&self) -> &'static str {
        match self {
            Category::Textaufgaben => "Textaufgaben",
            Category::Raumvorstellung => "Raumvorstellung",
            Category::Gleichungen => "Gleichungen",
            Category::Brueche => "Brüche",
            Category::Grundrechenarten => "Grundrechenarten",
            Category::Zahlenraum => "Zahlenraum",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Derived participant status; computed on read, never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Active,
    Inactive,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Active => f.write_str("Aktiv"),
            Status::Inactive => f.write_str("Inaktiv"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Participant {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "SV-Nummer")]
    pub sv_number: String,
    #[serde(rename = "Berufswunsch")]
    pub career_goal: Option<String>,
    #[serde(rename = "Eintrittsdatum")]
    pub entry_date: NaiveDate,
    #[serde(rename = "Austrittsdatum")]
    pub exit_date: NaiveDate,
    #[serde(rename = "Zielwert (%)")]
    pub target_score: Option<f64>,
}

impl Participant {
    /// Active while the exit date lies strictly in the future; a participant
    /// whose exit date is `today` is already inactive.
    pub fn status_on(&self, today: NaiveDate) -> Status {
        if self.exit_date > today {
            Status::Active
        } else {
            Status::Inactive
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestResult {
    #[serde(rename = "Teilnehmer")]
    pub participant: String,
    #[serde(rename = "Datum")]
    pub date: NaiveDate,
    #[serde(rename = "Textaufgaben")]
    pub textaufgaben: u32,
    #[serde(rename = "Raumvorstellung")]
    pub raumvorstellung: u32,
    #[serde(rename = "Gleichungen")]
    pub gleichungen: u32,
    #[serde(rename = "Brüche")]
    pub brueche: u32,
    #[serde(rename = "Grundrechenarten")]
    pub grundrechenarten: u32,
    #[serde(rename = "Zahlenraum")]
    pub zahlenraum: u32,
    #[serde(rename = "Gesamt (%)")]
    pub total: f64,
}

impl TestResult {
    /// Category scores in canonical order, widened for arithmetic.
    pub fn category_values(&self) -> [f64; 6] {
        [
            self.textaufgaben as f64,
            self.raumvorstellung as f64,
            self.gleichungen as f64,
            self.brueche as f64,
            self.grundrechenarten as f64,
            self.zahlenraum as f64,
        ]
    }
}
