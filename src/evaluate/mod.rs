//! Cross-validated evaluation of a suffix with its best parameters
//!
//! A single evaluation returns one score per fold. A repeated evaluation
//! (`collect_n = Some(n)`) runs `n` cross-validated prediction passes, each
//! with a splitter re-seeded to `base + i`, and returns one score per pass.
//! The configured splitter itself is never modified.

use crate::error::{PipelinerError, Result};
use crate::pipeline::Pipeline;
use crate::plan::StepRegistry;
use crate::search::{BestParamsKey, BestParamsStore};
use crate::validation::{cross_val_predict, cross_val_score, Metric, Splitter};
use ndarray::{Array1, Array2};
use tracing::{debug, warn};

#[derive(Debug)]
pub struct Evaluator<'a> {
    registry: &'a StepRegistry,
    splitter: &'a dyn Splitter,
}

impl<'a> Evaluator<'a> {
    pub fn new(registry: &'a StepRegistry, splitter: &'a dyn Splitter) -> Self {
        Self { registry, splitter }
    }

    /// Suffix pipeline with the stored best parameters applied to its final
    /// stage
    fn tuned_pipeline(
        &self,
        suffix: &[(&str, &str)],
        metric: Metric,
        store: &BestParamsStore,
    ) -> Result<Pipeline> {
        let key = BestParamsKey::new(suffix, metric);
        let params = store.get(&key).ok_or_else(|| {
            PipelinerError::SearchError(format!("no best parameters recorded for {}", key))
        })?;

        let mut pipeline = Pipeline::from_registry(self.registry, suffix)?;
        pipeline.set_final_params(params)?;
        Ok(pipeline)
    }

    pub fn evaluate(
        &self,
        x: &Array2<f64>,
        y: &Array1<f64>,
        suffix: &[(&str, &str)],
        metric: Metric,
        store: &BestParamsStore,
        collect_n: Option<usize>,
    ) -> Result<Vec<f64>> {
        let pipeline = self.tuned_pipeline(suffix, metric, store)?;

        let n = match collect_n {
            None => return cross_val_score(&pipeline, x, y, self.splitter, metric),
            Some(0) => {
                return Err(PipelinerError::ConfigError(
                    "collect_n must be at least 1".to_string(),
                ))
            }
            Some(n) => n,
        };

        let base = match self.splitter.random_state() {
            Some(seed) => seed,
            None => {
                warn!("Evaluation splitter is unseeded, repeated evaluation starts from seed 0");
                0
            }
        };

        (0..n)
            .map(|i| {
                let seed = base.wrapping_add(i as u64);
                let splitter = self.splitter.with_seed(seed);
                let pred = cross_val_predict(
                    &pipeline,
                    x,
                    y,
                    splitter.as_ref(),
                    metric.needs_decision_scores(),
                )?;
                let score = metric
                    .score_predictions(y, &pred)
                    .map_err(PipelinerError::into_evaluation)?;
                debug!(seed, score, "Repeated evaluation pass");
                Ok(score)
            })
            .collect()
    }
}
