//! Trainable score predictors over the recorded test history.

use std::fs;
use std::path::Path;

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

use crate::error::{Result, TrackerError};
use crate::models::TestResult;

/// Date timestamp plus the six category scores.
pub const FEATURE_COUNT: usize = 7;

/// Ridge term keeping the normal equations solvable on degenerate histories
/// (constant columns, fewer rows than features).
const RIDGE: f64 = 1e-6;

/// Below this many rows the model search scores candidates on training error
/// instead of a holdout.
const MIN_HOLDOUT_ROWS: usize = 5;

#[derive(Debug, Clone, PartialEq)]
pub struct FeatureRow {
    pub timestamp: f64,
    pub categories: [f64; 6],
}

impl FeatureRow {
    pub fn from_test(test: &TestResult) -> Self {
        Self {
            timestamp: date_timestamp(test.date),
            categories: test.category_values(),
        }
    }

    /// Feature row for a day with no recorded test. The categories are
    /// zero-filled, so the forecast effectively predicts from the date alone.
    pub fn future(date: NaiveDate) -> Self {
        Self {
            timestamp: date_timestamp(date),
            categories: [0.0; 6],
        }
    }

    fn values(&self) -> [f64; FEATURE_COUNT] {
        let c = self.categories;
        [self.timestamp, c[0], c[1], c[2], c[3], c[4], c[5]]
    }
}

/// Seconds since the Unix epoch at midnight UTC of the given day.
pub fn date_timestamp(date: NaiveDate) -> f64 {
    date.and_time(NaiveTime::MIN).and_utc().timestamp() as f64
}

/// A fitted model, serialisable as the opaque artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TrainedModel {
    Mean {
        value: f64,
    },
    LastValue {
        value: f64,
    },
    Linear {
        means: Vec<f64>,
        scales: Vec<f64>,
        weights: Vec<f64>,
        intercept: f64,
    },
}

impl TrainedModel {
    pub fn predict_one(&self, row: &FeatureRow) -> f64 {
        match self {
            TrainedModel::Mean { value } | TrainedModel::LastValue { value } => *value,
            TrainedModel::Linear {
                means,
                scales,
                weights,
                intercept,
            } => {
                let mut prediction = *intercept;
                for (i, x) in row.values().iter().enumerate() {
                    prediction += weights[i] * ((x - means[i]) / scales[i]);
                }
                prediction
            }
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            TrainedModel::Mean { .. } => "mean",
            TrainedModel::LastValue { .. } => "last_value",
            TrainedModel::Linear { .. } => "linear",
        }
    }

    /// Valid JSON does not guarantee a valid shape: a linear model must carry
    /// exactly one mean, scale and weight per feature before it may predict.
    fn feature_width_ok(&self) -> bool {
        match self {
            TrainedModel::Mean { .. } | TrainedModel::LastValue { .. } => true,
            TrainedModel::Linear {
                means,
                scales,
                weights,
                ..
            } => {
                means.len() == FEATURE_COUNT
                    && scales.len() == FEATURE_COUNT
                    && weights.len() == FEATURE_COUNT
            }
        }
    }
}

/// Fits a model to feature rows and targets.
pub trait Trainer {
    fn fit(&self, rows: &[FeatureRow], targets: &[f64]) -> Result<TrainedModel>;
}

/// Plain least-squares regression on all seven features.
pub struct LeastSquaresTrainer;

impl Trainer for LeastSquaresTrainer {
    fn fit(&self, rows: &[FeatureRow], targets: &[f64]) -> Result<TrainedModel> {
        if rows.is_empty() {
            return Err(TrackerError::InsufficientData);
        }
        fit_linear(rows, targets)
    }
}

/// Fits every candidate model, scores RMSE on a chronological holdout and
/// refits the winner on the full history.
pub struct ModelSearchTrainer {
    pub holdout_ratio: f64,
}

impl Default for ModelSearchTrainer {
    fn default() -> Self {
        Self { holdout_ratio: 0.8 }
    }
}

impl Trainer for ModelSearchTrainer {
    fn fit(&self, rows: &[FeatureRow], targets: &[f64]) -> Result<TrainedModel> {
        if rows.is_empty() {
            return Err(TrackerError::InsufficientData);
        }

        let mut order: Vec<usize> = (0..rows.len()).collect();
        order.sort_by(|&a, &b| {
            rows[a]
                .timestamp
                .partial_cmp(&rows[b].timestamp)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        let rows: Vec<FeatureRow> = order.iter().map(|&i| rows[i].clone()).collect();
        let targets: Vec<f64> = order.iter().map(|&i| targets[i]).collect();

        let n = rows.len();
        let split = ((n as f64) * self.holdout_ratio).ceil() as usize;
        let (fit_rows, fit_targets, eval_rows, eval_targets) =
            if n >= MIN_HOLDOUT_ROWS && split < n {
                (&rows[..split], &targets[..split], &rows[split..], &targets[split..])
            } else {
                (&rows[..], &targets[..], &rows[..], &targets[..])
            };

        let candidates = vec![
            mean_model(fit_targets),
            last_value_model(fit_targets),
            fit_linear(fit_rows, fit_targets)?,
        ];

        let mut best: Option<(f64, TrainedModel)> = None;
        for candidate in candidates {
            let err = rmse(&candidate, eval_rows, eval_targets);
            match &best {
                Some((best_err, _)) if *best_err <= err => {}
                _ => best = Some((err, candidate)),
            }
        }
        let (err, winner) =
            best.ok_or_else(|| TrackerError::Training("no candidate model fitted".to_string()))?;

        tracing::info!(model = winner.kind_name(), rmse = err, "model search finished");

        match winner {
            TrainedModel::Mean { .. } => Ok(mean_model(&targets)),
            TrainedModel::LastValue { .. } => Ok(last_value_model(&targets)),
            TrainedModel::Linear { .. } => fit_linear(&rows, &targets),
        }
    }
}

fn mean_model(targets: &[f64]) -> TrainedModel {
    let value = targets.iter().sum::<f64>() / targets.len().max(1) as f64;
    TrainedModel::Mean { value }
}

fn last_value_model(targets: &[f64]) -> TrainedModel {
    TrainedModel::LastValue {
        value: targets.last().copied().unwrap_or_default(),
    }
}

pub fn rmse(model: &TrainedModel, rows: &[FeatureRow], targets: &[f64]) -> f64 {
    let squares: f64 = rows
        .iter()
        .zip(targets)
        .map(|(row, &target)| {
            let diff = model.predict_one(row) - target;
            diff * diff
        })
        .sum();
    (squares / rows.len().max(1) as f64).sqrt()
}

/// Ridge-stabilised least squares on standardised features. Standardising
/// keeps the epoch-seconds column from swamping the category columns in the
/// normal equations; constant columns end up with zero weight.
fn fit_linear(rows: &[FeatureRow], targets: &[f64]) -> Result<TrainedModel> {
    let n = rows.len() as f64;

    let mut means = vec![0.0f64; FEATURE_COUNT];
    for row in rows {
        for (mean, x) in means.iter_mut().zip(row.values()) {
            *mean += x;
        }
    }
    for mean in &mut means {
        *mean /= n;
    }

    let mut scales = vec![0.0f64; FEATURE_COUNT];
    for row in rows {
        for (i, x) in row.values().iter().enumerate() {
            let diff = x - means[i];
            scales[i] += diff * diff;
        }
    }
    for scale in &mut scales {
        *scale = (*scale / n).sqrt();
        if *scale < 1e-12 {
            *scale = 1.0;
        }
    }

    let intercept = targets.iter().sum::<f64>() / n;

    let mut xtx = vec![vec![0.0f64; FEATURE_COUNT]; FEATURE_COUNT];
    let mut xty = vec![0.0f64; FEATURE_COUNT];
    for (row, &target) in rows.iter().zip(targets) {
        let z: Vec<f64> = row
            .values()
            .iter()
            .enumerate()
            .map(|(i, x)| (x - means[i]) / scales[i])
            .collect();
        let centred = target - intercept;
        for i in 0..FEATURE_COUNT {
            xty[i] += z[i] * centred;
            for j in 0..FEATURE_COUNT {
                xtx[i][j] += z[i] * z[j];
            }
        }
    }
    for (i, row) in xtx.iter_mut().enumerate() {
        row[i] += RIDGE * n;
    }

    let weights = solve(xtx, xty)
        .ok_or_else(|| TrackerError::Training("normal equations are singular".to_string()))?;

    Ok(TrainedModel::Linear {
        means,
        scales,
        weights,
        intercept,
    })
}

/// Gaussian elimination with partial pivoting.
fn solve(mut a: Vec<Vec<f64>>, mut b: Vec<f64>) -> Option<Vec<f64>> {
    let n = b.len();
    for col in 0..n {
        let pivot = (col..n).max_by(|&r, &s| {
            a[r][col]
                .abs()
                .partial_cmp(&a[s][col].abs())
                .unwrap_or(std::cmp::Ordering::Equal)
        })?;
        if !(a[pivot][col].abs() > 1e-12) {
            return None;
        }
        a.swap(col, pivot);
        b.swap(col, pivot);

        let pivot_row = a[col].clone();
        let pivot_b = b[col];
        for row in (col + 1)..n {
            let factor = a[row][col] / pivot_row[col];
            if factor == 0.0 {
                continue;
            }
            for k in col..n {
                a[row][k] -= factor * pivot_row[k];
            }
            b[row] -= factor * pivot_b;
        }
    }

    let mut x = vec![0.0f64; n];
    for row in (0..n).rev() {
        let mut sum = b[row];
        for k in (row + 1)..n {
            sum -= a[row][k] * x[k];
        }
        x[row] = sum / a[row][row];
    }
    Some(x)
}

/// The scoped predictor resource: construct, train or load, predict, drop.
#[derive(Debug)]
pub struct Predictor {
    model: Option<TrainedModel>,
}

impl Predictor {
    pub fn untrained() -> Self {
        Self { model: None }
    }

    pub fn with_model(model: TrainedModel) -> Self {
        Self { model: Some(model) }
    }

    pub fn model_kind(&self) -> Option<&'static str> {
        self.model.as_ref().map(TrainedModel::kind_name)
    }

    /// Fits on the full test history: features are the test date (epoch
    /// seconds) plus the six category scores, the target is the stored total.
    pub fn train(&mut self, history: &[TestResult], trainer: &dyn Trainer) -> Result<()> {
        if history.is_empty() {
            return Err(TrackerError::InsufficientData);
        }
        let rows: Vec<FeatureRow> = history.iter().map(FeatureRow::from_test).collect();
        let targets: Vec<f64> = history.iter().map(|t| t.total).collect();
        self.model = Some(trainer.fit(&rows, &targets)?);
        Ok(())
    }

    pub fn predict_one(&self, row: &FeatureRow) -> Result<f64> {
        let model = self.model.as_ref().ok_or(TrackerError::ModelNotTrained)?;
        Ok(model.predict_one(row))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let model = self.model.as_ref().ok_or(TrackerError::ModelNotTrained)?;
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(path, serde_json::to_string_pretty(model)?)?;
        Ok(())
    }

    /// An absent artifact means nothing was ever trained.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(TrackerError::ModelNotTrained);
        }
        let model: TrainedModel = serde_json::from_str(&fs::read_to_string(path)?)?;
        if !model.feature_width_ok() {
            return Err(TrackerError::FileFormat {
                path: path.to_path_buf(),
                message: format!("linear model vectors must have {FEATURE_COUNT} entries each"),
            });
        }
        Ok(Self::with_model(model))
    }
}
