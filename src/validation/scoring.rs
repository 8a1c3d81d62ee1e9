//! Scoring metrics resolved by name
//!
//! Every metric is "greater is better"; error metrics are negated.

use crate::error::{PipelinerError, Result};
use crate::pipeline::Pipeline;
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A named scoring metric
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    Accuracy,
    Precision,
    Recall,
    F1,
    RocAuc,
    NegMeanSquaredError,
    NegMeanAbsoluteError,
    R2,
}

impl Metric {
    pub fn name(&self) -> &'static str {
        match self {
            Metric::Accuracy => "accuracy",
            Metric::Precision => "precision",
            Metric::Recall => "recall",
            Metric::F1 => "f1",
            Metric::RocAuc => "roc_auc",
            Metric::NegMeanSquaredError => "neg_mean_squared_error",
            Metric::NegMeanAbsoluteError => "neg_mean_absolute_error",
            Metric::R2 => "r2",
        }
    }

    /// Ranking metrics score continuous decision values instead of labels
    pub fn needs_decision_scores(&self) -> bool {
        matches!(self, Metric::RocAuc)
    }

    /// Score a fitted pipeline on held-out data
    pub fn score(&self, pipeline: &Pipeline, x: &Array2<f64>, y: &Array1<f64>) -> Result<f64> {
        let output = if self.needs_decision_scores() {
            pipeline.decision_function(x)?
        } else {
            pipeline.predict(x)?
        };
        self.score_predictions(y, &output)
    }

    /// The metric's score function applied to true and predicted values
    pub fn score_predictions(&self, y_true: &Array1<f64>, y_pred: &Array1<f64>) -> Result<f64> {
        if y_true.len() != y_pred.len() {
            return Err(PipelinerError::ShapeError {
                expected: format!("{} predictions", y_true.len()),
                actual: format!("{} predictions", y_pred.len()),
            });
        }
        if y_true.is_empty() {
            return Err(PipelinerError::DataError(format!(
                "cannot compute {} on zero samples",
                self.name()
            )));
        }

        let n = y_true.len() as f64;
        let score = match self {
            Metric::Accuracy => {
                let correct = y_true.iter().zip(y_pred.iter()).filter(|(t, p)| t == p).count();
                correct as f64 / n
            }
            Metric::Precision => {
                let (tp, fp, _) = confusion(y_true, y_pred);
                ratio(tp, tp + fp)
            }
            Metric::Recall => {
                let (tp, _, fn_) = confusion(y_true, y_pred);
                ratio(tp, tp + fn_)
            }
            Metric::F1 => {
                let (tp, fp, fn_) = confusion(y_true, y_pred);
                ratio(2 * tp, 2 * tp + fp + fn_)
            }
            Metric::RocAuc => roc_auc(y_true, y_pred)?,
            Metric::NegMeanSquaredError => {
                -y_true.iter().zip(y_pred.iter()).map(|(t, p)| (t - p).powi(2)).sum::<f64>() / n
            }
            Metric::NegMeanAbsoluteError => {
                -y_true.iter().zip(y_pred.iter()).map(|(t, p)| (t - p).abs()).sum::<f64>() / n
            }
            Metric::R2 => {
                let mean = y_true.sum() / n;
                let ss_res: f64 = y_true.iter().zip(y_pred.iter()).map(|(t, p)| (t - p).powi(2)).sum();
                let ss_tot: f64 = y_true.iter().map(|t| (t - mean).powi(2)).sum();
                if ss_tot == 0.0 {
                    if ss_res == 0.0 { 1.0 } else { 0.0 }
                } else {
                    1.0 - ss_res / ss_tot
                }
            }
        };
        Ok(score)
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Metric {
    type Err = PipelinerError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "accuracy" => Ok(Metric::Accuracy),
            "precision" => Ok(Metric::Precision),
            "recall" => Ok(Metric::Recall),
            "f1" => Ok(Metric::F1),
            "roc_auc" => Ok(Metric::RocAuc),
            "neg_mean_squared_error" => Ok(Metric::NegMeanSquaredError),
            "neg_mean_absolute_error" => Ok(Metric::NegMeanAbsoluteError),
            "r2" => Ok(Metric::R2),
            other => Err(PipelinerError::ConfigError(format!("unknown scoring metric '{}'", other))),
        }
    }
}

/// (true positives, false positives, false negatives) for positive label 1
fn confusion(y_true: &Array1<f64>, y_pred: &Array1<f64>) -> (usize, usize, usize) {
    y_true.iter().zip(y_pred.iter()).fold((0, 0, 0), |(tp, fp, fn_), (&t, &p)| {
        match (t == 1.0, p == 1.0) {
            (true, true) => (tp + 1, fp, fn_),
            (false, true) => (tp, fp + 1, fn_),
            (true, false) => (tp, fp, fn_ + 1),
            (false, false) => (tp, fp, fn_),
        }
    })
}

/// Zero-division yields 0.0
fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 { 0.0 } else { num as f64 / den as f64 }
}

/// Area under the ROC curve via the rank-sum statistic, averaging tied ranks
fn roc_auc(y_true: &Array1<f64>, scores: &Array1<f64>) -> Result<f64> {
    let n_pos = y_true.iter().filter(|&&t| t == 1.0).count();
    let n_neg = y_true.len() - n_pos;
    if n_pos == 0 || n_neg == 0 {
        return Err(PipelinerError::EvaluationError(
            "roc_auc is undefined when only one class is present".to_string(),
        ));
    }

    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| scores[a].total_cmp(&scores[b]));

    let mut ranks = vec![0.0; scores.len()];
    let mut i = 0;
    while i < order.len() {
        let mut j = i;
        while j + 1 < order.len() && scores[order[j + 1]] == scores[order[i]] {
            j += 1;
        }
        let avg_rank = (i + j) as f64 / 2.0 + 1.0;
        for &idx in &order[i..=j] {
            ranks[idx] = avg_rank;
        }
        i = j + 1;
    }

    let pos_rank_sum: f64 = y_true
        .iter()
        .zip(ranks.iter())
        .filter(|(&t, _)| t == 1.0)
        .map(|(_, r)| r)
        .sum();
    let n_pos = n_pos as f64;
    Ok((pos_rank_sum - n_pos * (n_pos + 1.0) / 2.0) / (n_pos * n_neg as f64))
}
