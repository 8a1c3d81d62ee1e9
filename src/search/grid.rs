//! Exhaustive grid search over cross-validated scores

use crate::error::{PipelinerError, Result};
use crate::pipeline::Pipeline;
use crate::stage::ParamSet;
use crate::utils::try_parallel_map;
use crate::validation::{fit_and_score, Metric, ScoreSummary, Splitter};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Cross-validated score of one parameter assignment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateScore {
    /// The assignment evaluated on the final stage
    pub params: ParamSet,
    /// Score on each fold
    pub fold_scores: Vec<f64>,
    /// Mean score across folds
    pub mean_score: f64,
    /// Standard deviation of scores across folds
    pub std_score: f64,
}

/// Result of a grid search
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GridSearchResult {
    /// Every candidate, in declared grid order
    pub candidates: Vec<CandidateScore>,
    /// Index of the best candidate
    pub best_idx: usize,
    /// Metric used for ranking
    pub metric: Metric,
    /// Number of folds used
    pub n_splits: usize,
}

impl GridSearchResult {
    pub fn best_result(&self) -> &CandidateScore {
        &self.candidates[self.best_idx]
    }

    pub fn best_params(&self) -> &ParamSet {
        &self.best_result().params
    }

    /// Candidates ordered by mean score, best first
    pub fn ranked(&self) -> Vec<&CandidateScore> {
        let mut sorted: Vec<_> = self.candidates.iter().collect();
        sorted.sort_by(|a, b| b.mean_score.total_cmp(&a.mean_score));
        sorted
    }

    pub fn top_n(&self, n: usize) -> Vec<&CandidateScore> {
        self.ranked().into_iter().take(n).collect()
    }
}

/// Grid search with a fixed splitter and metric
#[derive(Debug)]
pub struct GridSearch<'a> {
    splitter: &'a dyn Splitter,
    metric: Metric,
}

impl<'a> GridSearch<'a> {
    pub fn new(splitter: &'a dyn Splitter, metric: Metric) -> Self {
        Self { splitter, metric }
    }

    /// Score every candidate on the same folds and pick the best.
    ///
    /// Candidates are assigned to the template's final stage. Ties keep the
    /// earliest candidate; candidates with a non-finite mean never win.
    pub fn run(
        &self,
        template: &Pipeline,
        candidates: Vec<ParamSet>,
        x: &Array2<f64>,
        y: &Array1<f64>,
    ) -> Result<GridSearchResult> {
        if candidates.is_empty() {
            return Err(PipelinerError::SearchError("parameter grid has no candidates".to_string()));
        }
        if x.nrows() != y.len() {
            return Err(PipelinerError::ShapeError {
                expected: format!("y length = {}", x.nrows()),
                actual: format!("y length = {}", y.len()),
            });
        }
        let splits = self.splitter.split(x.nrows(), Some(y))?;
        if splits.is_empty() {
            return Err(PipelinerError::SearchError("splitter produced no folds".to_string()));
        }

        // Parameter assignment is configuration: fail fast, before any fit
        let pipelines = candidates
            .iter()
            .map(|params| {
                let mut p = template.clone();
                p.set_final_params(params)?;
                Ok(p)
            })
            .collect::<Result<Vec<_>>>()?;

        let tasks: Vec<(usize, usize)> = (0..pipelines.len())
            .flat_map(|c| (0..splits.len()).map(move |f| (c, f)))
            .collect();
        let scores = try_parallel_map(tasks, |(c, f)| {
            fit_and_score(&pipelines[c], x, y, &splits[f], self.metric)
        })?;

        let results: Vec<CandidateScore> = candidates
            .into_iter()
            .zip(scores.chunks(splits.len()))
            .map(|(params, fold_scores)| {
                let summary = ScoreSummary::from_scores(fold_scores.to_vec());
                debug!(
                    params = %params,
                    mean = summary.mean_score,
                    std = summary.std_score,
                    "Scored grid candidate"
                );
                CandidateScore {
                    params,
                    fold_scores: summary.scores,
                    mean_score: summary.mean_score,
                    std_score: summary.std_score,
                }
            })
            .collect();

        let best_idx = results
            .iter()
            .enumerate()
            .filter(|(_, c)| c.mean_score.is_finite())
            .fold(None::<(usize, f64)>, |best, (i, c)| match best {
                Some((_, b)) if b >= c.mean_score => best,
                _ => Some((i, c.mean_score)),
            })
            .map(|(i, _)| i)
            .ok_or_else(|| {
                PipelinerError::SearchError("no grid candidate produced a finite score".to_string())
            })?;

        Ok(GridSearchResult {
            candidates: results,
            best_idx,
            metric: self.metric,
            n_splits: splits.len(),
        })
    }
}
