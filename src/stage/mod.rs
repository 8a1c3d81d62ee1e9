//! Pipeline stages
//!
//! A stage is one variant of a pipeline step: a transformer (scaler,
//! function transformer) or an estimator (classifier). Every stage can be
//! fitted and transformed; estimators also predict. Stages that expose
//! tunable parameters accept assignments through [`Stage::set_param`].
//!
//! Built-in stages:
//! - [`Scaler`] - standard, min-max, robust and max-abs scaling
//! - [`FunctionTransformer`] / [`RowTransformer`] - wrap plain functions
//! - [`LogisticRegression`] - binary logistic regression
//! - [`KNNClassifier`] - k-nearest neighbours classifier

mod params;
mod scaler;
mod function;
pub mod linear;
pub mod knn;

pub use params::{ParamAxis, ParamGrid, ParamSet, ParamValue};
pub use scaler::{Scaler, ScalerType};
pub use function::{FunctionTransformer, RowTransformer};
pub use linear::{LogisticRegression, Penalty};
pub use knn::{DistanceMetric, KNNClassifier, KNNConfig, WeightScheme};

use crate::error::{PipelinerError, Result};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use std::fmt::Debug;

/// A pipeline stage
pub trait Stage: Debug + Send + Sync {
    /// Learn whatever the stage needs from the data
    fn fit(&mut self, x: &Array2<f64>, y: Option<&Array1<f64>>) -> Result<()>;

    /// Transform data with a fitted stage
    fn transform(&self, _x: &Array2<f64>) -> Result<Array2<f64>> {
        Err(PipelinerError::Unsupported(format!(
            "{} does not transform data",
            self.kind()
        )))
    }

    /// Fit and transform in one step
    fn fit_transform(&mut self, x: &Array2<f64>, y: Option<&Array1<f64>>) -> Result<Array2<f64>> {
        self.fit(x, y)?;
        self.transform(x)
    }

    /// Predict targets with a fitted estimator
    fn predict(&self, _x: &Array2<f64>) -> Result<Array1<f64>> {
        Err(PipelinerError::Unsupported(format!(
            "{} is not an estimator",
            self.kind()
        )))
    }

    /// Continuous scores used by ranking metrics; defaults to predictions
    fn decision_function(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        self.predict(x)
    }

    /// Assign one parameter by name
    fn set_param(&mut self, name: &str, value: &ParamValue) -> Result<()> {
        Err(PipelinerError::InvalidParameter {
            name: name.to_string(),
            value: value.to_string(),
            reason: format!("{} has no tunable parameters", self.kind()),
        })
    }

    /// Assign every parameter of an assignment
    fn set_params(&mut self, params: &ParamSet) -> Result<()> {
        for (name, value) in params.iter() {
            self.set_param(name, value)?;
        }
        Ok(())
    }

    /// Parameter space this stage wants searched for `metric`, if any
    fn declare_grid(&self, _metric: &str) -> Option<ParamGrid> {
        None
    }

    /// Short human readable kind, used in error messages
    fn kind(&self) -> &'static str;

    /// Clone into a fresh box
    fn box_clone(&self) -> Box<dyn Stage>;
}

impl Clone for Box<dyn Stage> {
    fn clone(&self) -> Self {
        self.box_clone()
    }
}

/// Parse a required float parameter
pub(crate) fn expect_float(name: &str, value: &ParamValue) -> Result<f64> {
    value.as_float().ok_or_else(|| PipelinerError::InvalidParameter {
        name: name.to_string(),
        value: value.to_string(),
        reason: "expected a number".to_string(),
    })
}

/// Parse a required non-negative integer parameter
pub(crate) fn expect_usize(name: &str, value: &ParamValue) -> Result<usize> {
    value
        .as_int()
        .filter(|v| *v >= 0)
        .map(|v| v as usize)
        .ok_or_else(|| PipelinerError::InvalidParameter {
            name: name.to_string(),
            value: value.to_string(),
            reason: "expected a non-negative integer".to_string(),
        })
}

/// Declarative description of a built-in stage, used by experiment configs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StageSpec {
    StandardScaler,
    MinMaxScaler,
    RobustScaler,
    MaxAbsScaler,
    LogisticRegression {
        #[serde(default)]
        penalty: Option<Penalty>,
        #[serde(default)]
        alpha: Option<f64>,
        #[serde(default)]
        max_iter: Option<usize>,
        #[serde(default)]
        learning_rate: Option<f64>,
    },
    Knn {
        #[serde(default)]
        n_neighbors: Option<usize>,
        #[serde(default)]
        weights: Option<WeightScheme>,
        #[serde(default)]
        metric: Option<DistanceMetric>,
    },
}

impl StageSpec {
    /// Instantiate the described stage
    pub fn build(&self) -> Box<dyn Stage> {
        match self {
            StageSpec::StandardScaler => Box::new(Scaler::new(ScalerType::Standard)),
            StageSpec::MinMaxScaler => Box::new(Scaler::new(ScalerType::MinMax)),
            StageSpec::RobustScaler => Box::new(Scaler::new(ScalerType::Robust)),
            StageSpec::MaxAbsScaler => Box::new(Scaler::new(ScalerType::MaxAbs)),
            StageSpec::LogisticRegression { penalty, alpha, max_iter, learning_rate } => {
                let mut model = LogisticRegression::new();
                if let Some(p) = penalty {
                    model = model.with_penalty(*p);
                }
                if let Some(a) = alpha {
                    model = model.with_alpha(*a);
                }
                if let Some(m) = max_iter {
                    model = model.with_max_iter(*m);
                }
                if let Some(lr) = learning_rate {
                    model = model.with_learning_rate(*lr);
                }
                Box::new(model)
            }
            StageSpec::Knn { n_neighbors, weights, metric } => {
                let defaults = KNNConfig::default();
                Box::new(KNNClassifier::new(KNNConfig {
                    n_neighbors: n_neighbors.unwrap_or(defaults.n_neighbors),
                    weights: weights.unwrap_or(defaults.weights),
                    metric: metric.unwrap_or(defaults.metric),
                }))
            }
        }
    }
}
