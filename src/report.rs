//! Assembles the per-participant report and renders it as markdown or CSV.
//!
//! The document is a flat list of labelled sections so that external writers
//! (PDF, spreadsheet) can consume it without knowing the domain types.

use std::fmt::Write as _;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;

use crate::error::{Result, TrackerError};
use crate::forecast::{PointKind, SeriesPoint};
use crate::models::{Participant, TestResult};

#[derive(Debug, Clone)]
pub struct ReportSection {
    pub title: String,
    pub rows: Vec<(String, String)>,
}

impl ReportSection {
    fn new(title: &str) -> Self {
        Self {
            title: title.to_string(),
            rows: Vec::new(),
        }
    }

    fn push(&mut self, label: impl Into<String>, value: impl Into<String>) {
        self.rows.push((label.into(), value.into()));
    }
}

#[derive(Debug, Clone)]
pub struct ReportDocument {
    pub participant: String,
    pub generated_on: NaiveDate,
    pub sections: Vec<ReportSection>,
}

/// Collects master data, test history and forecast into one document.
/// The participant is looked up by name; the forecast section takes only
/// the predicted points from the series.
pub fn assemble(
    name: &str,
    roster: &[Participant],
    tests: &[TestResult],
    series: &[SeriesPoint],
    today: NaiveDate,
) -> Result<ReportDocument> {
    let participant = roster
        .iter()
        .find(|p| p.name == name)
        .ok_or_else(|| TrackerError::ParticipantNotFound(name.to_string()))?;

    let mut master = ReportSection::new("Stammdaten");
    master.push("Name", participant.name.clone());
    master.push("SV-Nummer", participant.sv_number.clone());
    master.push(
        "Berufswunsch",
        participant.career_goal.clone().unwrap_or_default(),
    );
    master.push("Eintrittsdatum", participant.entry_date.to_string());
    master.push("Austrittsdatum", participant.exit_date.to_string());
    master.push(
        "Zielwert (%)",
        match participant.target_score {
            Some(value) => format!("{value:.2}"),
            None => String::new(),
        },
    );
    master.push("Status", participant.status_on(today).to_string());

    let mut history: Vec<&TestResult> = tests.iter().filter(|t| t.participant == name).collect();
    history.sort_by_key(|t| t.date);
    let mut results = ReportSection::new("Testergebnisse");
    for test in history {
        results.push(test.date.to_string(), format!("{:.2}", test.total));
    }

    let mut outlook = ReportSection::new("Prognose");
    for point in series.iter().filter(|p| p.kind == PointKind::Predicted) {
        outlook.push(point.date.to_string(), format!("{:.2}", point.value));
    }

    Ok(ReportDocument {
        participant: participant.name.clone(),
        generated_on: today,
        sections: vec![master, results, outlook],
    })
}

impl ReportDocument {
    pub fn to_markdown(&self) -> String {
        let mut output = String::new();

        let _ = writeln!(output, "# Bericht für {}", self.participant);
        let _ = writeln!(output, "Stand: {}", self.generated_on);

        for section in &self.sections {
            let _ = writeln!(output);
            let _ = writeln!(output, "## {}", section.title);

            if section.rows.is_empty() {
                let _ = writeln!(output, "Keine Einträge.");
            } else {
                for (label, value) in &section.rows {
                    let _ = writeln!(output, "- {}: {}", label, value);
                }
            }
        }

        output
    }

    /// Two-column CSV with single-cell section title rows in between, the
    /// layout the spreadsheet export used. Needs a flexible writer because
    /// the record widths differ.
    pub fn to_csv(&self) -> Result<String> {
        let mut writer = csv::WriterBuilder::new().flexible(true).from_writer(vec![]);

        writer
            .write_record([format!("Bericht für {}", self.participant)])
            .map_err(render_error)?;
        let stand = self.generated_on.to_string();
        writer
            .write_record(["Stand", stand.as_str()])
            .map_err(render_error)?;

        for section in &self.sections {
            writer
                .write_record([section.title.as_str()])
                .map_err(render_error)?;
            for (label, value) in &section.rows {
                writer
                    .write_record([label.as_str(), value.as_str()])
                    .map_err(render_error)?;
            }
        }

        let bytes = writer
            .into_inner()
            .map_err(|err| TrackerError::Io(err.into_error()))?;
        String::from_utf8(bytes).map_err(|err| TrackerError::Io(io::Error::other(err)))
    }

    /// Writes `<name>-bericht.md` and `<name>-bericht.csv` into `out_dir`,
    /// creating the directory if needed. Returns both paths.
    pub fn write_files(&self, out_dir: &Path) -> Result<(PathBuf, PathBuf)> {
        fs::create_dir_all(out_dir)?;

        let stem = file_stem(&self.participant);
        let markdown_path = out_dir.join(format!("{stem}-bericht.md"));
        let csv_path = out_dir.join(format!("{stem}-bericht.csv"));

        fs::write(&markdown_path, self.to_markdown())?;
        fs::write(&csv_path, self.to_csv()?)?;
        tracing::info!(participant = %self.participant, dir = %out_dir.display(), "report written");

        Ok((markdown_path, csv_path))
    }
}

fn file_stem(name: &str) -> String {
    name.chars()
        .map(|c| if matches!(c, '/' | '\\') { '-' } else { c })
        .collect()
}

fn render_error(err: csv::Error) -> TrackerError {
    match err.into_kind() {
        csv::ErrorKind::Io(err) => TrackerError::Io(err),
        kind => TrackerError::Io(io::Error::other(format!("{kind:?}"))),
    }
}
