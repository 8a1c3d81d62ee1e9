//! Result table and run log
//!
//! Each plan row produces one [`ResultRow`], built completely before it is
//! appended. Per metric, the table carries six columns: grid mean, grid std,
//! grid best parameters, evaluation mean, evaluation std and evaluation
//! scores. Grid columns hold [`NOT_APPLICABLE`] when the row's model declares
//! no parameter space.

mod log;

pub use log::{FileLogSink, LogSink, MemoryLogSink, NullLogSink, ProgressLog};

use crate::plan::PlanRow;
use crate::search::GridOutcome;
use crate::validation::{Metric, ScoreSummary};
use serde::{Deserialize, Serialize};

/// Grid cells for variants without a parameter space
pub const NOT_APPLICABLE: &str = "NaN";

/// Search and evaluation results for one (row, metric)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricResult {
    pub grid: GridOutcome,
    pub eval_scores: Vec<f64>,
    pub eval_mean: f64,
    pub eval_std: f64,
}

impl MetricResult {
    pub fn new(grid: GridOutcome, eval_scores: Vec<f64>) -> Self {
        let summary = ScoreSummary::from_scores(eval_scores);
        Self {
            grid,
            eval_scores: summary.scores,
            eval_mean: summary.mean_score,
            eval_std: summary.std_score,
        }
    }

    pub fn grid_mean_cell(&self) -> String {
        let [mean, _, _] = grid_cells(&self.grid);
        mean
    }

    pub fn grid_std_cell(&self) -> String {
        let [_, std, _] = grid_cells(&self.grid);
        std
    }

    pub fn grid_best_params_cell(&self) -> String {
        let [_, _, params] = grid_cells(&self.grid);
        params
    }

    /// Scores rendered as `[a, b, c]`
    pub fn eval_scores_cell(&self) -> String {
        let scores: Vec<String> = self.eval_scores.iter().map(|s| s.to_string()).collect();
        format!("[{}]", scores.join(", "))
    }
}

/// Mean, std and best-parameter cells of a grid outcome
pub fn grid_cells(grid: &GridOutcome) -> [String; 3] {
    match grid {
        GridOutcome::Tuned {
            mean_score,
            std_score,
            best_params,
        } => [mean_score.to_string(), std_score.to_string(), best_params.to_string()],
        GridOutcome::NotApplicable => [
            NOT_APPLICABLE.to_string(),
            NOT_APPLICABLE.to_string(),
            NOT_APPLICABLE.to_string(),
        ],
    }
}

/// What happened for one metric of one row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MetricOutcome {
    Completed(MetricResult),
    /// Recorded instead of aborting when the run isolates row failures
    Failed { kind: String, message: String },
}

impl MetricOutcome {
    fn cells(&self) -> [String; 6] {
        match self {
            MetricOutcome::Completed(r) => [
                r.grid_mean_cell(),
                r.grid_std_cell(),
                r.grid_best_params_cell(),
                r.eval_mean.to_string(),
                r.eval_std.to_string(),
                r.eval_scores_cell(),
            ],
            MetricOutcome::Failed { kind, .. } => {
                let marker = format!("failed({})", kind);
                [
                    marker.clone(),
                    marker.clone(),
                    marker.clone(),
                    marker.clone(),
                    marker.clone(),
                    marker,
                ]
            }
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, MetricOutcome::Failed { .. })
    }

    pub fn as_completed(&self) -> Option<&MetricResult> {
        match self {
            MetricOutcome::Completed(r) => Some(r),
            MetricOutcome::Failed { .. } => None,
        }
    }
}

/// A plan row with its per-metric outcomes, in requested metric order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultRow {
    pub row: PlanRow,
    pub metrics: Vec<(Metric, MetricOutcome)>,
}

impl ResultRow {
    pub fn outcome(&self, metric: Metric) -> Option<&MetricOutcome> {
        self.metrics.iter().find(|(m, _)| *m == metric).map(|(_, o)| o)
    }
}

/// The final table of a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultTable {
    step_names: Vec<String>,
    metrics: Vec<Metric>,
    rows: Vec<ResultRow>,
}

impl ResultTable {
    pub fn new(step_names: Vec<String>, metrics: Vec<Metric>) -> Self {
        Self {
            step_names,
            metrics,
            rows: Vec::new(),
        }
    }

    pub fn push(&mut self, row: ResultRow) {
        self.rows.push(row);
    }

    pub fn rows(&self) -> &[ResultRow] {
        &self.rows
    }

    pub fn get(&self, index: usize) -> Option<&ResultRow> {
        self.rows.get(index)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn metrics(&self) -> &[Metric] {
        &self.metrics
    }

    /// Step names, then six columns per metric
    pub fn columns(&self) -> Vec<String> {
        let mut columns = self.step_names.clone();
        for m in &self.metrics {
            columns.extend([
                format!("grid_{}_mean", m),
                format!("grid_{}_std", m),
                format!("grid_{}_best_params", m),
                format!("eval_{}_mean", m),
                format!("eval_{}_std", m),
                format!("eval_{}_scores", m),
            ]);
        }
        columns
    }

    /// Rendered cells of one row, aligned with [`ResultTable::columns`]
    pub fn cells(&self, index: usize) -> Option<Vec<String>> {
        let row = self.rows.get(index)?;
        let mut cells: Vec<String> = row.row.variants().map(str::to_string).collect();
        for metric in &self.metrics {
            match row.outcome(*metric) {
                Some(outcome) => cells.extend(outcome.cells()),
                None => cells.extend(std::iter::repeat(String::new()).take(6)),
            }
        }
        Some(cells)
    }
}
