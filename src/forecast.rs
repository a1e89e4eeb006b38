//! Historical + predicted score series for one participant, ready for
//! chart rendering.

use std::fmt;

use chrono::{Duration, NaiveDate};

use crate::error::{Result, TrackerError};
use crate::models::TestResult;
use crate::predict::{FeatureRow, Predictor};

pub const DEFAULT_HORIZON_DAYS: u32 = 60;

/// Largest accepted forecast horizon, ten years. Longer horizons would run
/// the future dates off the end of chrono's calendar.
pub const MAX_HORIZON_DAYS: u32 = 3650;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointKind {
    Historical,
    Predicted,
}

impl fmt::Display for PointKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PointKind::Historical => f.write_str("historical"),
            PointKind::Predicted => f.write_str("predicted"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SeriesPoint {
    pub date: NaiveDate,
    pub value: f64,
    pub kind: PointKind,
}

/// Builds the chronological series: all recorded totals for the participant,
/// then `horizon_days` predicted values starting the day after the last test.
/// The future feature rows are zero-filled, so the prediction leans on the
/// date feature only. Horizons above `MAX_HORIZON_DAYS` are rejected.
pub fn build_series(
    name: &str,
    tests: &[TestResult],
    predictor: &Predictor,
    horizon_days: u32,
) -> Result<Vec<SeriesPoint>> {
    if horizon_days > MAX_HORIZON_DAYS {
        return Err(TrackerError::Validation(format!(
            "forecast horizon {horizon_days} exceeds the maximum of {MAX_HORIZON_DAYS} days"
        )));
    }
    let mut history: Vec<&TestResult> = tests.iter().filter(|t| t.participant == name).collect();
    if history.is_empty() {
        return Err(TrackerError::NoHistory(name.to_string()));
    }
    history.sort_by_key(|t| t.date);

    let mut series: Vec<SeriesPoint> = history
        .iter()
        .map(|t| SeriesPoint {
            date: t.date,
            value: t.total,
            kind: PointKind::Historical,
        })
        .collect();

    let last_date = history[history.len() - 1].date;
    for offset in 1..=i64::from(horizon_days) {
        let date = last_date
            .checked_add_signed(Duration::days(offset))
            .ok_or_else(|| {
                TrackerError::Validation(format!(
                    "forecast dates past {last_date} leave the supported calendar range"
                ))
            })?;
        let value = predictor.predict_one(&FeatureRow::future(date))?;
        series.push(SeriesPoint {
            date,
            value,
            kind: PointKind::Predicted,
        });
    }

    Ok(series)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::predict::TrainedModel;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn sample_test(name: &str, date: NaiveDate, total: f64) -> TestResult {
        TestResult {
            participant: name.to_string(),
            date,
            textaufgaben: 80,
            raumvorstellung: 80,
            gleichungen: 80,
            brueche: 80,
            grundrechenarten: 80,
            zahlenraum: 80,
            total,
        }
    }

    fn stub_predictor(value: f64) -> Predictor {
        Predictor::with_model(TrainedModel::LastValue { value })
    }

    #[test]
    fn anna_two_tests_five_day_forecast() {
        let tests = vec![
            sample_test("Anna", date(2024, 1, 1), 80.0),
            sample_test("Anna", date(2024, 1, 8), 85.0),
        ];
        let series = build_series("Anna", &tests, &stub_predictor(85.0), 5).unwrap();

        assert_eq!(series.len(), 7);
        assert_eq!(series[0].date, date(2024, 1, 1));
        assert_eq!(series[0].kind, PointKind::Historical);
        assert!((series[0].value - 80.0).abs() < 1e-9);
        assert_eq!(series[1].date, date(2024, 1, 8));
        assert!((series[1].value - 85.0).abs() < 1e-9);

        let predicted: Vec<&SeriesPoint> = series
            .iter()
            .filter(|p| p.kind == PointKind::Predicted)
            .collect();
        assert_eq!(predicted.len(), 5);
        assert_eq!(predicted[0].date, date(2024, 1, 9));
        assert_eq!(predicted[4].date, date(2024, 1, 13));
        assert!(predicted.iter().all(|p| (p.value - 85.0).abs() < 1e-9));
    }

    #[test]
    fn series_has_k_plus_n_points() {
        let tests = vec![
            sample_test("Anna", date(2024, 2, 1), 70.0),
            sample_test("Anna", date(2024, 2, 8), 75.0),
            sample_test("Anna", date(2024, 2, 15), 72.0),
        ];
        let series = build_series("Anna", &tests, &stub_predictor(72.0), 10).unwrap();
        assert_eq!(series.len(), 13);
    }

    #[test]
    fn boundary_is_exactly_one_day_and_dates_increase() {
        let tests = vec![
            sample_test("Anna", date(2024, 3, 5), 60.0),
            sample_test("Anna", date(2024, 3, 1), 55.0),
        ];
        let series = build_series("Anna", &tests, &stub_predictor(60.0), 3).unwrap();

        // input order does not matter, the series is sorted
        assert_eq!(series[0].date, date(2024, 3, 1));
        assert_eq!(series[1].date, date(2024, 3, 5));
        assert_eq!(series[2].date, date(2024, 3, 6));

        for pair in series.windows(2) {
            assert!(pair[0].date < pair[1].date);
        }
    }

    #[test]
    fn horizon_zero_yields_history_only() {
        let tests = vec![sample_test("Anna", date(2024, 1, 1), 80.0)];
        let series = build_series("Anna", &tests, &stub_predictor(80.0), 0).unwrap();
        assert_eq!(series.len(), 1);
        assert_eq!(series[0].kind, PointKind::Historical);
    }

    #[test]
    fn unknown_participant_has_no_history() {
        let tests = vec![sample_test("Anna", date(2024, 1, 1), 80.0)];
        let err = build_series("Jonas", &tests, &stub_predictor(80.0), 5).unwrap_err();
        assert!(matches!(err, TrackerError::NoHistory(name) if name == "Jonas"));
    }

    #[test]
    fn other_participants_are_filtered_out() {
        let tests = vec![
            sample_test("Anna", date(2024, 1, 1), 80.0),
            sample_test("Jonas", date(2024, 1, 2), 40.0),
            sample_test("Anna", date(2024, 1, 8), 85.0),
        ];
        let series = build_series("Anna", &tests, &stub_predictor(85.0), 2).unwrap();
        assert_eq!(series.len(), 4);
        assert!(series
            .iter()
            .filter(|p| p.kind == PointKind::Historical)
            .all(|p| p.value > 50.0));
    }

    #[test]
    fn oversized_horizon_is_rejected() {
        let tests = vec![sample_test("Anna", date(2024, 1, 1), 80.0)];
        let err = build_series("Anna", &tests, &stub_predictor(80.0), u32::MAX).unwrap_err();
        assert!(matches!(err, TrackerError::Validation(_)));

        let series =
            build_series("Anna", &tests, &stub_predictor(80.0), MAX_HORIZON_DAYS).unwrap();
        assert_eq!(series.len(), 1 + MAX_HORIZON_DAYS as usize);
    }

    #[test]
    fn forecast_past_the_calendar_edge_is_rejected() {
        let tests = vec![sample_test("Anna", NaiveDate::MAX, 80.0)];
        let err = build_series("Anna", &tests, &stub_predictor(80.0), 1).unwrap_err();
        assert!(matches!(err, TrackerError::Validation(_)));
    }
}
