//! Hyperparameter search for a plan row's modelling suffix
//!
//! The final variant of the suffix decides whether there is anything to tune:
//! a grid configured for its variant name wins, otherwise the stage's own
//! [`Stage::declare_grid`](crate::stage::Stage::declare_grid) is consulted.
//! The best assignment is stored under a [`BestParamsKey`] for the evaluator.

mod grid;

pub use grid::{CandidateScore, GridSearch, GridSearchResult};

use crate::error::{PipelinerError, Result};
use crate::pipeline::Pipeline;
use crate::plan::StepRegistry;
use crate::stage::{ParamGrid, ParamSet};
use crate::validation::{Metric, Splitter};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use tracing::{debug, info};

/// Outcome of searching one (suffix, metric)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum GridOutcome {
    /// A grid was searched; `best_params` are relative to the final stage
    Tuned {
        mean_score: f64,
        std_score: f64,
        best_params: ParamSet,
    },
    /// The final stage declares no parameter space
    NotApplicable,
}

/// Identifies the best parameters of a suffix under one metric
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BestParamsKey {
    /// Variant names of the modelling suffix, in step order
    pub suffix: Vec<String>,
    pub metric: Metric,
}

impl BestParamsKey {
    pub fn new(suffix: &[(&str, &str)], metric: Metric) -> Self {
        Self {
            suffix: suffix.iter().map(|(_, v)| v.to_string()).collect(),
            metric,
        }
    }
}

impl fmt::Display for BestParamsKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} @ {}", self.suffix.join(" -> "), self.metric)
    }
}

/// Best parameters found so far; accumulates across runs
#[derive(Debug, Clone, Default)]
pub struct BestParamsStore {
    entries: HashMap<BestParamsKey, ParamSet>,
}

impl BestParamsStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: BestParamsKey, params: ParamSet) {
        self.entries.insert(key, params);
    }

    pub fn get(&self, key: &BestParamsKey) -> Option<&ParamSet> {
        self.entries.get(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&BestParamsKey, &ParamSet)> {
        self.entries.iter()
    }
}

/// Runs grid search for plan-row suffixes
#[derive(Debug)]
pub struct HyperparameterSearch<'a> {
    registry: &'a StepRegistry,
    splitter: &'a dyn Splitter,
    grids: &'a HashMap<String, ParamGrid>,
}

impl<'a> HyperparameterSearch<'a> {
    pub fn new(
        registry: &'a StepRegistry,
        splitter: &'a dyn Splitter,
        grids: &'a HashMap<String, ParamGrid>,
    ) -> Self {
        Self { registry, splitter, grids }
    }

    /// Grid for a variant: configured first, then the stage's declaration
    fn grid_for(&self, step: &str, variant: &str, metric: Metric) -> Result<Option<ParamGrid>> {
        if let Some(grid) = self.grids.get(variant) {
            return Ok(Some(grid.clone()));
        }
        Ok(self.registry.stage(step, variant)?.declare_grid(metric.name()))
    }

    /// Search the suffix and store its best parameters.
    ///
    /// Without a parameter space an empty assignment is stored and
    /// [`GridOutcome::NotApplicable`] returned.
    pub fn run(
        &self,
        x: &Array2<f64>,
        y: &Array1<f64>,
        suffix: &[(&str, &str)],
        metric: Metric,
        store: &mut BestParamsStore,
    ) -> Result<GridOutcome> {
        let &(final_step, final_variant) = suffix.last().ok_or_else(|| {
            PipelinerError::ConfigError("modelling suffix is empty".to_string())
        })?;
        let key = BestParamsKey::new(suffix, metric);

        let grid = match self.grid_for(final_step, final_variant, metric)? {
            Some(grid) if !grid.is_empty() => grid,
            _ => {
                debug!(key = %key, "No parameter space, skipping grid search");
                store.insert(key, ParamSet::new());
                return Ok(GridOutcome::NotApplicable);
            }
        };

        let template = Pipeline::from_registry(self.registry, suffix)?;
        let candidates = grid.candidates()?;

        let result = GridSearch::new(self.splitter, metric).run(&template, candidates, x, y)?;
        let best = result.best_result();
        let best_params = result.best_params().clone();
        for (rank, candidate) in result.top_n(3).into_iter().enumerate() {
            debug!(
                key = %key,
                rank = rank + 1,
                params = %candidate.params,
                mean = candidate.mean_score,
                "Top grid candidate"
            );
        }

        info!(
            key = %key,
            n_candidates = result.candidates.len(),
            n_splits = result.n_splits,
            best_score = best.mean_score,
            best_params = %best_params,
            "Grid search complete"
        );

        store.insert(key, best_params.clone());
        Ok(GridOutcome::Tuned {
            mean_score: best.mean_score,
            std_score: best.std_score,
            best_params,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::Step;
    use crate::stage::{FunctionTransformer, KNNClassifier, Scaler, ScalerType};
    use crate::validation::{CVStrategy, CrossValidator};
    use ndarray::array;

    fn data() -> (Array2<f64>, Array1<f64>) {
        let x = array![
            [0.0], [0.1], [0.2], [0.3], [0.4], [0.5],
            [5.0], [5.1], [5.2], [5.3], [5.4], [5.5]
        ];
        let y = array![0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0];
        (x, y)
    }

    fn registry() -> StepRegistry {
        StepRegistry::new(vec![
            Step::new("Scaler").with_variant("Standard", Scaler::new(ScalerType::Standard)),
            Step::new("Classifier").with_variant("KNN", KNNClassifier::with_k(5)),
        ])
        .unwrap()
    }

    fn cv() -> CrossValidator {
        CrossValidator::new(CVStrategy::StratifiedKFold { n_splits: 3, shuffle: false })
    }

    #[test]
    fn test_declared_grid_is_searched() {
        let (x, y) = data();
        let registry = registry();
        let grids = HashMap::new();
        let splitter = cv();
        let search = HyperparameterSearch::new(&registry, &splitter, &grids);
        let mut store = BestParamsStore::new();

        let suffix = [("Classifier", "KNN")];
        let outcome = search.run(&x, &y, &suffix, Metric::Accuracy, &mut store).unwrap();

        match outcome {
            GridOutcome::Tuned { mean_score, best_params, .. } => {
                assert_eq!(mean_score, 1.0);
                // Every k separates the clusters; the first candidate wins the tie
                assert_eq!(best_params, ParamSet::new().with("n_neighbors", 3i64));
            }
            GridOutcome::NotApplicable => panic!("expected a tuned outcome"),
        }
        assert_eq!(
            store.get(&BestParamsKey::new(&suffix, Metric::Accuracy)),
            Some(&ParamSet::new().with("n_neighbors", 3i64))
        );
    }

    #[test]
    fn test_configured_grid_overrides_declared() {
        let (x, y) = data();
        let registry = registry();
        let mut grids = HashMap::new();
        grids.insert("KNN".to_string(), ParamGrid::new().with("n_neighbors", vec![1i64, 2]));
        let splitter = cv();
        let search = HyperparameterSearch::new(&registry, &splitter, &grids);
        let mut store = BestParamsStore::new();

        let outcome = search
            .run(&x, &y, &[("Scaler", "Standard"), ("Classifier", "KNN")], Metric::Accuracy, &mut store)
            .unwrap();
        assert!(matches!(
            outcome,
            GridOutcome::Tuned { ref best_params, .. } if best_params.get("n_neighbors") == Some(&1i64.into())
        ));
    }

    #[test]
    fn test_no_grid_is_not_applicable() {
        let (x, y) = data();
        let registry = StepRegistry::new(vec![
            Step::new("Scaler").with_variant("Standard", Scaler::new(ScalerType::Standard)),
        ])
        .unwrap();
        let grids = HashMap::new();
        let splitter = cv();
        let search = HyperparameterSearch::new(&registry, &splitter, &grids);
        let mut store = BestParamsStore::new();

        let suffix = [("Scaler", "Standard")];
        let outcome = search.run(&x, &y, &suffix, Metric::Accuracy, &mut store).unwrap();
        assert_eq!(outcome, GridOutcome::NotApplicable);
        assert_eq!(store.get(&BestParamsKey::new(&suffix, Metric::Accuracy)), Some(&ParamSet::new()));
    }

    #[test]
    fn test_unknown_grid_param_fails_fast() {
        let (x, y) = data();
        let registry = registry();
        let mut grids = HashMap::new();
        grids.insert("KNN".to_string(), ParamGrid::new().with("leaf_size", vec![10i64]));
        let splitter = cv();
        let search = HyperparameterSearch::new(&registry, &splitter, &grids);

        let err = search
            .run(&x, &y, &[("Classifier", "KNN")], Metric::Accuracy, &mut BestParamsStore::new())
            .unwrap_err();
        assert!(matches!(err, PipelinerError::InvalidParameter { .. }));
    }

    #[test]
    fn test_empty_axis_is_config_error() {
        let (x, y) = data();
        let registry = registry();
        let mut grids = HashMap::new();
        let no_values: Vec<i64> = Vec::new();
        grids.insert("KNN".to_string(), ParamGrid::new().with("n_neighbors", no_values));
        let splitter = cv();
        let search = HyperparameterSearch::new(&registry, &splitter, &grids);

        let err = search
            .run(&x, &y, &[("Classifier", "KNN")], Metric::Accuracy, &mut BestParamsStore::new())
            .unwrap_err();
        assert!(matches!(err, PipelinerError::ConfigError(_)));
    }

    #[test]
    fn test_variant_names_do_not_route_params() {
        let (x, y) = data();
        let identity = FunctionTransformer::new("identity", |x: &Array2<f64>| Ok(x.clone()));
        let registry = StepRegistry::new(vec![
            Step::new("Pre").with_variant("default", identity),
            Step::new("Classifier")
                .with_variant("default", KNNClassifier::with_k(5))
                .with_variant("knn__fast", KNNClassifier::with_k(5)),
        ])
        .unwrap();
        let grids = HashMap::new();
        let splitter = cv();
        let search = HyperparameterSearch::new(&registry, &splitter, &grids);
        let mut store = BestParamsStore::new();

        for suffix in [
            [("Pre", "default"), ("Classifier", "default")],
            [("Pre", "default"), ("Classifier", "knn__fast")],
        ] {
            let outcome = search.run(&x, &y, &suffix, Metric::Accuracy, &mut store).unwrap();
            assert!(matches!(
                outcome,
                GridOutcome::Tuned { ref best_params, .. } if best_params.get("n_neighbors") == Some(&3i64.into())
            ));
        }
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_grid_result_ranking() {
        let (x, y) = data();
        let registry = registry();
        let template = Pipeline::from_registry(&registry, &[("Classifier", "KNN")]).unwrap();
        let splitter = cv();
        let candidates = ParamGrid::new()
            .with("n_neighbors", vec![1i64, 11])
            .candidates()
            .unwrap();

        let result = GridSearch::new(&splitter, Metric::Accuracy)
            .run(&template, candidates, &x, &y)
            .unwrap();
        assert_eq!(result.n_splits, 3);
        assert_eq!(result.best_params(), &ParamSet::new().with("n_neighbors", 1i64));

        // Eleven neighbours out of eight training samples always mixes classes
        let ranked = result.ranked();
        assert!(ranked[0].mean_score >= ranked[1].mean_score);
        assert_eq!(result.top_n(1).len(), 1);
        assert_eq!(result.top_n(5).len(), 2);
        assert_eq!(result.top_n(1)[0].params, *result.best_params());
    }
}
