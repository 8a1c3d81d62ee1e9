//! Orchestration of plan rows
//!
//! The [`Pipeliner`] owns the step registry, the plan built from it and the
//! best parameters found so far. [`Pipeliner::get_results`] visits the plan
//! rows in order: it resolves the cached prefix of each row, searches the
//! remaining suffix per metric, evaluates it with the best parameters and
//! appends one result row.
//!
//! # Example
//!
//! ```no_run
//! use kolosal_pipeliner::prelude::*;
//! use ndarray::array;
//!
//! let mut pipeliner = Pipeliner::builder()
//!     .step(Step::new("Scaler")
//!         .with_variant("MinMax", Scaler::new(ScalerType::MinMax))
//!         .with_variant("Standard", Scaler::new(ScalerType::Standard)))
//!     .step(Step::new("Classifier")
//!         .with_variant("LR", LogisticRegression::new())
//!         .with_variant("KNN", KNNClassifier::with_k(3)))
//!     .banned_combo("Standard", "KNN")
//!     .build()?;
//!
//! let x = array![[0.0], [0.1], [0.2], [5.0], [5.1], [5.2]];
//! let y = array![0.0, 0.0, 0.0, 1.0, 1.0, 1.0];
//! let options = RunOptions::new().with_caching_steps(["Scaler"]);
//! let table = pipeliner.get_results(&x, Some(&y), &options, &mut NullLogSink)?;
//! # Ok::<(), kolosal_pipeliner::PipelinerError>(())
//! ```

use crate::cache::{CacheStats, PrefixCache};
use crate::config::{PipelinerConfig, RunOptions};
use crate::error::{PipelinerError, Result};
use crate::evaluate::Evaluator;
use crate::plan::{validate_banned_combos, BannedCombo, PlanTable, Step, StepRegistry};
use crate::results::{LogSink, MetricOutcome, MetricResult, ProgressLog, ResultRow, ResultTable};
use crate::search::{BestParamsKey, BestParamsStore, HyperparameterSearch};
use crate::stage::{ParamGrid, ParamSet, Stage};
use crate::validation::{CrossValidator, Metric, Splitter};
use ndarray::{Array1, Array2};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// Collects the construction surface of a [`Pipeliner`]
#[derive(Debug, Default)]
pub struct PipelinerBuilder {
    steps: Vec<Step>,
    banned: Vec<BannedCombo>,
    grid_cv: Option<Box<dyn Splitter>>,
    eval_cv: Option<Box<dyn Splitter>>,
    param_grids: HashMap<String, ParamGrid>,
    config: PipelinerConfig,
}

impl PipelinerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a step; step order is evaluation order
    pub fn step(mut self, step: Step) -> Self {
        self.steps.push(step);
        self
    }

    pub fn steps(mut self, steps: Vec<Step>) -> Self {
        self.steps.extend(steps);
        self
    }

    pub fn banned_combo(mut self, a: impl Into<String>, b: impl Into<String>) -> Self {
        self.banned.push(BannedCombo::new(a, b));
        self
    }

    pub fn banned_combos(mut self, combos: impl IntoIterator<Item = BannedCombo>) -> Self {
        self.banned.extend(combos);
        self
    }

    /// Splitter used inside grid search
    pub fn grid_cv(mut self, splitter: impl Splitter + 'static) -> Self {
        self.grid_cv = Some(Box::new(splitter));
        self
    }

    /// Splitter used for the final evaluation
    pub fn eval_cv(mut self, splitter: impl Splitter + 'static) -> Self {
        self.eval_cv = Some(Box::new(splitter));
        self
    }

    /// Parameter grid for every stage registered under `variant`; overrides
    /// what the stage declares itself
    pub fn param_grid(mut self, variant: impl Into<String>, grid: ParamGrid) -> Self {
        self.param_grids.insert(variant.into(), grid);
        self
    }

    pub fn config(mut self, config: PipelinerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> Result<Pipeliner> {
        let registry = StepRegistry::new(self.steps)?;

        if self.config.strict_names {
            validate_banned_combos(&registry, &self.banned)?;
            for (variant, grid) in &self.param_grids {
                validate_grid(&registry, variant, grid)?;
            }
        }

        let plan = PlanTable::build(&registry, &self.banned);
        info!(
            steps = registry.steps().len(),
            combinations = registry.n_combinations(),
            rows = plan.len(),
            banned = self.banned.len(),
            "Built plan table"
        );

        Ok(Pipeliner {
            registry,
            banned: self.banned,
            plan,
            grid_cv: self.grid_cv.unwrap_or_else(|| Box::new(CrossValidator::default())),
            eval_cv: self.eval_cv.unwrap_or_else(|| Box::new(CrossValidator::default())),
            param_grids: self.param_grids,
            config: self.config,
            best_params: BestParamsStore::new(),
            last_cache_stats: None,
        })
    }
}

/// A configured grid tunes the final stage of a row, so it must name a
/// variant of the last step and that stage must accept each axis
fn validate_grid(registry: &StepRegistry, variant: &str, grid: &ParamGrid) -> Result<()> {
    let last = registry.steps().last().ok_or_else(|| {
        PipelinerError::ConfigError("at least one step is required".to_string())
    })?;
    let stage = last.variant(variant).ok_or_else(|| {
        PipelinerError::ConfigError(format!(
            "parameter grid names '{}', which is not a variant of final step '{}'",
            variant,
            last.name()
        ))
    })?;
    for axis in grid.axes() {
        let value = axis.values.first().ok_or_else(|| {
            PipelinerError::ConfigError(format!(
                "parameter '{}' of variant '{}' has no candidate values",
                axis.name, variant
            ))
        })?;
        stage.box_clone().set_param(&axis.name, value).map_err(|e| {
            PipelinerError::ConfigError(format!("grid for variant '{}': {}", variant, e))
        })?;
    }
    Ok(())
}

/// Evaluates every row of a plan of pipeline variants
#[derive(Debug)]
pub struct Pipeliner {
    registry: StepRegistry,
    banned: Vec<BannedCombo>,
    plan: PlanTable,
    grid_cv: Box<dyn Splitter>,
    eval_cv: Box<dyn Splitter>,
    param_grids: HashMap<String, ParamGrid>,
    config: PipelinerConfig,
    best_params: BestParamsStore,
    last_cache_stats: Option<CacheStats>,
}

impl Pipeliner {
    pub fn builder() -> PipelinerBuilder {
        PipelinerBuilder::new()
    }

    pub fn plan(&self) -> &PlanTable {
        &self.plan
    }

    pub fn registry(&self) -> &StepRegistry {
        &self.registry
    }

    pub fn banned_combos(&self) -> &[BannedCombo] {
        &self.banned
    }

    pub fn config(&self) -> &PipelinerConfig {
        &self.config
    }

    /// The stage registered for a (step, variant) choice
    pub fn named_steps(&self, step: &str, variant: &str) -> Result<&dyn Stage> {
        self.registry.stage(step, variant)
    }

    /// Best parameters recorded for a suffix of variant names and a metric
    pub fn best_params(&self, suffix: &[&str], metric: Metric) -> Option<&ParamSet> {
        self.best_params.get(&BestParamsKey {
            suffix: suffix.iter().map(|s| s.to_string()).collect(),
            metric,
        })
    }

    pub fn best_params_store(&self) -> &BestParamsStore {
        &self.best_params
    }

    /// Cache counters of the most recent run
    pub fn cache_stats(&self) -> Option<CacheStats> {
        self.last_cache_stats
    }

    fn check_options(&self, x: &Array2<f64>, y: Option<&Array1<f64>>, options: &RunOptions) -> Result<()> {
        if options.metrics.is_empty() {
            return Err(PipelinerError::ConfigError("at least one metric is required".to_string()));
        }
        if options.collect_n == Some(0) {
            return Err(PipelinerError::ConfigError("collect_n must be at least 1".to_string()));
        }
        let y = y.ok_or_else(|| {
            PipelinerError::ConfigError("labels are required to score plan rows".to_string())
        })?;
        if x.nrows() != y.len() {
            return Err(PipelinerError::ShapeError {
                expected: format!("y length = {}", x.nrows()),
                actual: format!("y length = {}", y.len()),
            });
        }

        let step_names = self.registry.step_names();
        for name in &options.caching_steps {
            if self.registry.step(name).is_none() {
                return Err(PipelinerError::ConfigError(format!("unknown caching step '{}'", name)));
            }
        }
        let k = options.caching_steps.len();
        if k >= step_names.len() {
            return Err(PipelinerError::ConfigError(
                "caching every step leaves no model to search".to_string(),
            ));
        }
        let leading = &step_names[..k];
        if !leading.iter().all(|s| options.caching_steps.iter().any(|c| c == s)) {
            return Err(PipelinerError::ConfigError(format!(
                "caching steps {:?} must be the leading steps {:?}",
                options.caching_steps, leading
            )));
        }
        Ok(())
    }

    /// Run every plan row and collect the result table.
    ///
    /// Configuration problems are reported before any row runs. Errors abort
    /// the run unless `continue_on_error` is set and the error is an
    /// evaluation failure, in which case it is recorded in the row.
    pub fn get_results(
        &mut self,
        x: &Array2<f64>,
        y: Option<&Array1<f64>>,
        options: &RunOptions,
        sink: &mut dyn LogSink,
    ) -> Result<ResultTable> {
        self.check_options(x, y, options)?;
        let y = y.ok_or_else(|| PipelinerError::ConfigError("labels are required".to_string()))?;

        let parallel = self.config.parallel();
        parallel.install(|| self.run_rows(x, y, options, sink))?
    }

    fn run_rows(
        &mut self,
        x: &Array2<f64>,
        y: &Array1<f64>,
        options: &RunOptions,
        sink: &mut dyn LogSink,
    ) -> Result<ResultTable> {
        let started = Instant::now();
        let total = self.plan.len();
        info!(
            rows = total,
            metrics = ?options.metrics,
            caching_steps = ?options.caching_steps,
            collect_n = ?options.collect_n,
            "Starting pipeliner run"
        );

        let mut cache = PrefixCache::new(Arc::new(x.clone()));
        let mut table = ResultTable::new(self.plan.step_names().to_vec(), options.metrics.clone());
        let mut log = ProgressLog::new(sink);
        let search = HyperparameterSearch::new(&self.registry, self.grid_cv.as_ref(), &self.param_grids);
        let evaluator = Evaluator::new(&self.registry, self.eval_cv.as_ref());
        let store = &mut self.best_params;

        let mut outcome = Ok(());
        for (index, row) in self.plan.iter().enumerate() {
            info!(row = index + 1, total, plan = %row, "Processing plan row");
            if let Err(e) = log.row_started(index, total, row) {
                outcome = Err(e);
                break;
            }

            let feature_start = Instant::now();
            let prefix = row.select(&options.caching_steps);
            let suffix = row.select_other(&options.caching_steps);
            let features = match cache.resolve(&self.registry, Some(y), &prefix) {
                Ok(f) => f,
                Err(e) => {
                    outcome = Err(e);
                    break;
                }
            };
            if let Err(e) = log.features(feature_start.elapsed()) {
                outcome = Err(e);
                break;
            }

            let mut metrics = Vec::with_capacity(options.metrics.len());
            for &metric in &options.metrics {
                let step = RowStep {
                    search: &search,
                    evaluator: &evaluator,
                    x: &features,
                    y,
                    suffix: &suffix,
                    collect_n: options.collect_n,
                };
                match step.run(metric, store, &mut log) {
                    Ok(result) => metrics.push((metric, MetricOutcome::Completed(result))),
                    Err(e) => {
                        // The row error takes precedence over a sink failure
                        if let Err(log_err) = log.failure(metric, e.kind(), &e.to_string()) {
                            warn!(row = index + 1, %metric, error = %log_err, "Failed to log row failure");
                        }
                        if options.continue_on_error && e.is_recoverable() {
                            warn!(row = index + 1, %metric, error = %e, "Row failed, continuing");
                            metrics.push((
                                metric,
                                MetricOutcome::Failed {
                                    kind: e.kind().to_string(),
                                    message: e.to_string(),
                                },
                            ));
                        } else {
                            outcome = Err(e);
                            break;
                        }
                    }
                }
            }
            if outcome.is_err() {
                break;
            }

            table.push(ResultRow {
                row: row.clone(),
                metrics,
            });
        }

        let stats = cache.stats();
        info!(
            hits = stats.hits,
            misses = stats.misses,
            evictions = stats.evictions,
            hit_rate = stats.hit_rate(),
            "Prefix cache statistics"
        );
        self.last_cache_stats = Some(stats);

        outcome?;
        info!(
            rows = table.len(),
            elapsed_secs = started.elapsed().as_secs_f64(),
            "Pipeliner run complete"
        );
        Ok(table)
    }
}

/// Search then evaluate one (row, metric)
struct RowStep<'a> {
    search: &'a HyperparameterSearch<'a>,
    evaluator: &'a Evaluator<'a>,
    x: &'a Array2<f64>,
    y: &'a Array1<f64>,
    suffix: &'a [(&'a str, &'a str)],
    collect_n: Option<usize>,
}

impl RowStep<'_> {
    fn run(&self, metric: Metric, store: &mut BestParamsStore, log: &mut ProgressLog<'_>) -> Result<MetricResult> {
        log.scoring(metric)?;

        let grid_start = Instant::now();
        let grid = self.search.run(self.x, self.y, self.suffix, metric, store)?;
        log.grid_search(grid_start.elapsed(), &grid)?;

        let eval_start = Instant::now();
        let scores = self
            .evaluator
            .evaluate(self.x, self.y, self.suffix, metric, store, self.collect_n)?;
        let result = MetricResult::new(grid, scores);
        log.scores(eval_start.elapsed(), &result)?;

        info!(
            %metric,
            eval_mean = result.eval_mean,
            eval_std = result.eval_std,
            "Evaluated plan row"
        );
        Ok(result)
    }
}
