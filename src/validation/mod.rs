//! Cross-validated scoring and prediction
//!
//! Folds are fitted in parallel on independent clones of a template
//! pipeline. Any failure inside a fold surfaces as an evaluation error.

mod cross_validation;
mod scoring;

pub use cross_validation::{CVSplit, CVStrategy, CrossValidator, ScoreSummary, Splitter};
pub use scoring::Metric;

use crate::error::{PipelinerError, Result};
use crate::pipeline::Pipeline;
use ndarray::{Array1, Array2, Axis};
use rayon::prelude::*;

/// Rows of `x` (and `y`) at `indices`
fn take(x: &Array2<f64>, y: &Array1<f64>, indices: &[usize]) -> (Array2<f64>, Array1<f64>) {
    (x.select(Axis(0), indices), y.select(Axis(0), indices))
}

fn fit_fold(template: &Pipeline, x: &Array2<f64>, y: &Array1<f64>, split: &CVSplit) -> Result<Pipeline> {
    let (x_train, y_train) = take(x, y, &split.train_indices);
    let mut pipeline = template.clone();
    pipeline.fit(&x_train, Some(&y_train))?;
    Ok(pipeline)
}

fn check_lengths(x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
    if x.nrows() != y.len() {
        return Err(PipelinerError::ShapeError {
            expected: format!("y length = {}", x.nrows()),
            actual: format!("y length = {}", y.len()),
        });
    }
    Ok(())
}

/// One score per fold, in fold order
pub fn cross_val_score(
    template: &Pipeline,
    x: &Array2<f64>,
    y: &Array1<f64>,
    splitter: &dyn Splitter,
    metric: Metric,
) -> Result<Vec<f64>> {
    check_lengths(x, y)?;
    let splits = splitter.split(x.nrows(), Some(y))?;

    splits
        .par_iter()
        .map(|split| fit_and_score(template, x, y, split, metric))
        .collect()
}

/// Fit a clone of `template` on the training rows of `split` and score it
/// on the test rows
pub fn fit_and_score(
    template: &Pipeline,
    x: &Array2<f64>,
    y: &Array1<f64>,
    split: &CVSplit,
    metric: Metric,
) -> Result<f64> {
    let score = || -> Result<f64> {
        let pipeline = fit_fold(template, x, y, split)?;
        let (x_test, y_test) = take(x, y, &split.test_indices);
        metric.score(&pipeline, &x_test, &y_test)
    };
    score().map_err(PipelinerError::into_evaluation)
}

/// Held-out prediction for every sample.
///
/// The test folds must partition the samples; otherwise a sample would be
/// predicted zero or several times.
pub fn cross_val_predict(
    template: &Pipeline,
    x: &Array2<f64>,
    y: &Array1<f64>,
    splitter: &dyn Splitter,
    decision_scores: bool,
) -> Result<Array1<f64>> {
    check_lengths(x, y)?;
    let n_samples = x.nrows();
    let splits = splitter.split(n_samples, Some(y))?;

    let mut seen = vec![false; n_samples];
    for idx in splits.iter().flat_map(|s| s.test_indices.iter()) {
        if seen[*idx] {
            return Err(PipelinerError::EvaluationError(format!(
                "sample {} appears in more than one test fold",
                idx
            )));
        }
        seen[*idx] = true;
    }
    if seen.iter().any(|s| !s) {
        return Err(PipelinerError::EvaluationError(
            "test folds do not cover every sample".to_string(),
        ));
    }

    let fold_predictions = splits
        .par_iter()
        .map(|split| {
            let pipeline = fit_fold(template, x, y, split)?;
            let x_test = x.select(Axis(0), &split.test_indices);
            let pred = if decision_scores {
                pipeline.decision_function(&x_test)?
            } else {
                pipeline.predict(&x_test)?
            };
            Ok((split.test_indices.clone(), pred))
        })
        .map(|r: Result<_>| r.map_err(PipelinerError::into_evaluation))
        .collect::<Result<Vec<_>>>()?;

    let mut predictions = Array1::zeros(n_samples);
    for (indices, pred) in fold_predictions {
        for (&idx, &p) in indices.iter().zip(pred.iter()) {
            predictions[idx] = p;
        }
    }
    Ok(predictions)
}
