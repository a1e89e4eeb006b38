use std::fs;
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{Result, TrackerError};
use crate::models::{Participant, TestResult};
use crate::score;

pub const PARTICIPANT_COLUMNS: [&str; 6] = [
    "Name",
    "SV-Nummer",
    "Berufswunsch",
    "Eintrittsdatum",
    "Austrittsdatum",
    "Zielwert (%)",
];

pub const TEST_COLUMNS: [&str; 9] = [
    "Teilnehmer",
    "Datum",
    "Textaufgaben",
    "Raumvorstellung",
    "Gleichungen",
    "Brüche",
    "Grundrechenarten",
    "Zahlenraum",
    "Gesamt (%)",
];

pub fn load_participants(path: &Path) -> Result<Vec<Participant>> {
    load_table(path, &PARTICIPANT_COLUMNS)
}

pub fn load_tests(path: &Path) -> Result<Vec<TestResult>> {
    load_table(path, &TEST_COLUMNS)
}

pub fn save_participants(rows: &[Participant], path: &Path) -> Result<()> {
    save_table(rows, path, &PARTICIPANT_COLUMNS)
}

/// Totals are recomputed from the category scores here; a caller-supplied
/// total never reaches the file.
pub fn save_tests(rows: &[TestResult], path: &Path) -> Result<()> {
    let rows: Vec<TestResult> = rows
        .iter()
        .map(|row| {
            let mut row = row.clone();
            row.total = score::total_of(&row.category_values());
            row
        })
        .collect();
    save_table(&rows, path, &TEST_COLUMNS)
}

/// Functional append: returns the grown table, callers re-save the whole file.
pub fn append<T>(mut table: Vec<T>, row: T) -> Vec<T> {
    table.push(row);
    table
}

fn load_table<T: DeserializeOwned>(path: &Path, columns: &[&str]) -> Result<Vec<T>> {
    if !path.exists() {
        return Ok(Vec::new());
    }

    let mut reader = csv::Reader::from_path(path).map_err(|e| from_csv_error(path, e))?;

    let headers = reader.headers().map_err(|e| from_csv_error(path, e))?;
    let found: Vec<&str> = headers.iter().collect();
    if found != columns {
        return Err(TrackerError::FileFormat {
            path: path.to_path_buf(),
            message: format!("expected columns {columns:?}, found {found:?}"),
        });
    }

    let mut rows = Vec::new();
    for row in reader.deserialize::<T>() {
        rows.push(row.map_err(|e| from_csv_error(path, e))?);
    }
    Ok(rows)
}

fn save_table<T: Serialize>(rows: &[T], path: &Path, columns: &[&str]) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    // Written to a sibling tmp file first so a failed write cannot truncate
    // the previous table.
    let tmp = path.with_extension("csv.tmp");
    {
        let mut writer = csv::Writer::from_path(&tmp).map_err(|e| from_csv_error(&tmp, e))?;
        if rows.is_empty() {
            writer
                .write_record(columns)
                .map_err(|e| from_csv_error(&tmp, e))?;
        }
        for row in rows {
            writer.serialize(row).map_err(|e| from_csv_error(&tmp, e))?;
        }
        writer.flush()?;
    }
    fs::rename(&tmp, path)?;

    tracing::debug!(path = %path.display(), rows = rows.len(), "table saved");
    Ok(())
}

fn from_csv_error(path: &Path, err: csv::Error) -> TrackerError {
    let message = err.to_string();
    match err.into_kind() {
        csv::ErrorKind::Io(e) => TrackerError::Io(e),
        _ => TrackerError::FileFormat {
            path: path.to_path_buf(),
            message,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use tempfile::TempDir;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn sample_participant(name: &str) -> Participant {
        Participant {
            name: name.to_string(),
            sv_number: "4321150399".to_string(),
            career_goal: None,
            entry_date: date(2024, 1, 8),
            exit_date: date(2024, 7, 31),
            target_score: Some(80.0),
        }
    }

    fn sample_test(name: &str, day: u32, scores: [u32; 6]) -> TestResult {
        let mut test = TestResult {
            participant: name.to_string(),
            date: date(2024, 1, day),
            textaufgaben: scores[0],
            raumvorstellung: scores[1],
            gleichungen: scores[2],
            brueche: scores[3],
            grundrechenarten: scores[4],
            zahlenraum: scores[5],
            total: 0.0,
        };
        test.total = score::total_of(&test.category_values());
        test
    }

    #[test]
    fn missing_file_loads_as_empty_table() {
        let dir = TempDir::new().unwrap();
        let participants = load_participants(&dir.path().join("participants.csv")).unwrap();
        assert!(participants.is_empty());
        let tests = load_tests(&dir.path().join("tests.csv")).unwrap();
        assert!(tests.is_empty());
    }

    #[test]
    fn empty_save_writes_exactly_the_schema_header() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("participants.csv");
        save_participants(&[], &path).unwrap();
        let contents = fs::read_to_string(&path).unwrap();
        assert_eq!(
            contents,
            "Name,SV-Nummer,Berufswunsch,Eintrittsdatum,Austrittsdatum,Zielwert (%)\n"
        );
        assert!(load_participants(&path).unwrap().is_empty());
    }

    #[test]
    fn participants_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("participants.csv");
        let mut anna = sample_participant("Anna Meier");
        anna.career_goal = Some("Bürokauffrau".to_string());
        let jonas = Participant {
            target_score: None,
            ..sample_participant("Jonas Huber")
        };

        save_participants(&[anna, jonas], &path).unwrap();
        let loaded = load_participants(&path).unwrap();

        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].name, "Anna Meier");
        assert_eq!(loaded[0].career_goal.as_deref(), Some("Bürokauffrau"));
        assert_eq!(loaded[0].entry_date, date(2024, 1, 8));
        assert_eq!(loaded[0].target_score, Some(80.0));
        assert_eq!(loaded[1].career_goal, None);
        assert_eq!(loaded[1].target_score, None);
    }

    #[test]
    fn tests_round_trip_with_totals() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tests.csv");
        let test = sample_test("Anna Meier", 15, [80, 70, 90, 60, 85, 95]);

        save_tests(&[test], &path).unwrap();
        let loaded = load_tests(&path).unwrap();

        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].date, date(2024, 1, 15));
        assert_eq!(loaded[0].brueche, 60);
        assert!((loaded[0].total - 80.0).abs() < 1e-9);
    }

    #[test]
    fn supplied_total_is_replaced_on_save() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tests.csv");
        let mut test = sample_test("Anna Meier", 15, [50, 50, 50, 50, 50, 50]);
        test.total = 999.0;

        save_tests(&[test], &path).unwrap();
        let loaded = load_tests(&path).unwrap();
        assert!((loaded[0].total - 50.0).abs() < 1e-9);
    }

    #[test]
    fn wrong_header_is_a_format_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("participants.csv");
        fs::write(&path, "Vorname,Nachname\nAnna,Meier\n").unwrap();

        let err = load_participants(&path).unwrap_err();
        assert!(matches!(err, TrackerError::FileFormat { .. }));
        assert!(err.to_string().contains("expected columns"));
    }

    #[test]
    fn corrupt_row_fails_the_whole_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tests.csv");
        let header = TEST_COLUMNS.join(",");
        fs::write(
            &path,
            format!("{header}\nAnna Meier,2024-01-15,80,70,neunzig,60,85,95,80.0\n"),
        )
        .unwrap();

        let err = load_tests(&path).unwrap_err();
        assert!(matches!(err, TrackerError::FileFormat { .. }));
    }

    #[test]
    fn append_grows_the_table() {
        let table = vec![sample_participant("Anna Meier")];
        let table = append(table, sample_participant("Jonas Huber"));
        assert_eq!(table.len(), 2);
        assert_eq!(table[1].name, "Jonas Huber");
    }

    #[test]
    fn save_overwrites_the_previous_table() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("participants.csv");

        save_participants(&[sample_participant("Anna Meier")], &path).unwrap();
        save_participants(&[sample_participant("Jonas Huber")], &path).unwrap();

        let loaded = load_participants(&path).unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].name, "Jonas Huber");
    }
}
