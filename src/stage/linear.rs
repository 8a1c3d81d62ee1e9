//! Logistic regression estimator

use super::{expect_float, expect_usize, ParamValue, Stage};
use crate::error::{PipelinerError, Result};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

/// Regularization penalty
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Penalty {
    L1,
    L2,
    None,
}

impl Penalty {
    fn parse(value: &ParamValue) -> Result<Self> {
        match value.as_str() {
            Some("l1") => Ok(Penalty::L1),
            Some("l2") => Ok(Penalty::L2),
            Some("none") => Ok(Penalty::None),
            _ => Err(PipelinerError::InvalidParameter {
                name: "penalty".to_string(),
                value: value.to_string(),
                reason: "expected one of l1, l2, none".to_string(),
            }),
        }
    }
}

/// Binary logistic regression fitted with batch gradient descent.
///
/// Labels must be 0.0 or 1.0.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogisticRegression {
    /// Fitted coefficients
    pub coefficients: Option<Array1<f64>>,
    /// Fitted intercept
    pub intercept: Option<f64>,
    /// Whether to fit intercept
    pub fit_intercept: bool,
    /// Regularization penalty
    pub penalty: Penalty,
    /// Regularization strength
    pub alpha: f64,
    /// Maximum iterations
    pub max_iter: usize,
    /// Convergence tolerance
    pub tol: f64,
    /// Learning rate
    pub learning_rate: f64,
}

impl Default for LogisticRegression {
    fn default() -> Self {
        Self::new()
    }
}

impl LogisticRegression {
    /// Create a new logistic regression model
    pub fn new() -> Self {
        Self {
            coefficients: None,
            intercept: None,
            fit_intercept: true,
            penalty: Penalty::L2,
            alpha: 0.01,
            max_iter: 500,
            tol: 1e-6,
            learning_rate: 0.1,
        }
    }

    pub fn with_penalty(mut self, penalty: Penalty) -> Self {
        self.penalty = penalty;
        self
    }

    /// Set regularization strength
    pub fn with_alpha(mut self, alpha: f64) -> Self {
        self.alpha = alpha;
        self
    }

    /// Set maximum iterations
    pub fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }

    /// Set learning rate
    pub fn with_learning_rate(mut self, lr: f64) -> Self {
        self.learning_rate = lr;
        self
    }

    fn sigmoid(z: &Array1<f64>) -> Array1<f64> {
        z.mapv(|v| 1.0 / (1.0 + (-v).exp()))
    }

    /// Predict probabilities of the positive class
    pub fn predict_proba(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let coefficients = self.coefficients.as_ref().ok_or(PipelinerError::ModelNotFitted)?;
        if x.ncols() != coefficients.len() {
            return Err(PipelinerError::ShapeError {
                expected: format!("{} features", coefficients.len()),
                actual: format!("{} features", x.ncols()),
            });
        }
        let intercept = self.intercept.unwrap_or(0.0);
        Ok(Self::sigmoid(&(x.dot(coefficients) + intercept)))
    }
}

impl Stage for LogisticRegression {
    fn fit(&mut self, x: &Array2<f64>, y: Option<&Array1<f64>>) -> Result<()> {
        let y = y.ok_or_else(|| {
            PipelinerError::DataError("LogisticRegression requires labels".to_string())
        })?;
        let n_samples = x.nrows();
        let n_features = x.ncols();

        if n_samples != y.len() {
            return Err(PipelinerError::ShapeError {
                expected: format!("y length = {}", n_samples),
                actual: format!("y length = {}", y.len()),
            });
        }
        if y.iter().any(|&v| v != 0.0 && v != 1.0) {
            return Err(PipelinerError::DataError(
                "LogisticRegression expects binary 0/1 labels".to_string(),
            ));
        }

        let mut weights: Array1<f64> = Array1::zeros(n_features);
        let mut bias = 0.0;
        let lr = self.learning_rate;
        let alpha = self.alpha;

        for _iter in 0..self.max_iter {
            let predictions = Self::sigmoid(&(x.dot(&weights) + bias));
            let errors = &predictions - y;

            let penalty_grad = match self.penalty {
                Penalty::L2 => alpha * &weights,
                Penalty::L1 => weights.mapv(|w: f64| if w == 0.0 { 0.0 } else { alpha * w.signum() }),
                Penalty::None => Array1::zeros(n_features),
            };
            let dw = (x.t().dot(&errors) / n_samples as f64) + penalty_grad;
            let db = if self.fit_intercept { errors.mean().unwrap_or(0.0) } else { 0.0 };

            let grad_norm = (dw.mapv(|v| v * v).sum() + db * db).sqrt();
            if grad_norm < self.tol {
                break;
            }

            weights = weights - lr * dw;
            bias -= lr * db;
        }

        if weights.iter().any(|w| !w.is_finite()) || !bias.is_finite() {
            return Err(PipelinerError::EvaluationError(
                "LogisticRegression diverged".to_string(),
            ));
        }

        self.coefficients = Some(weights);
        self.intercept = Some(bias);
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let proba = self.predict_proba(x)?;
        Ok(proba.mapv(|p| if p >= 0.5 { 1.0 } else { 0.0 }))
    }

    fn decision_function(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        self.predict_proba(x)
    }

    fn set_param(&mut self, name: &str, value: &ParamValue) -> Result<()> {
        match name {
            "penalty" => self.penalty = Penalty::parse(value)?,
            "alpha" => self.alpha = expect_float(name, value)?,
            "C" => {
                let c = expect_float(name, value)?;
                if c <= 0.0 {
                    return Err(PipelinerError::InvalidParameter {
                        name: name.to_string(),
                        value: value.to_string(),
                        reason: "C must be positive".to_string(),
                    });
                }
                self.alpha = 1.0 / c;
            }
            "learning_rate" => self.learning_rate = expect_float(name, value)?,
            "max_iter" => self.max_iter = expect_usize(name, value)?,
            "fit_intercept" => {
                self.fit_intercept = value.as_bool().ok_or_else(|| PipelinerError::InvalidParameter {
                    name: name.to_string(),
                    value: value.to_string(),
                    reason: "expected a boolean".to_string(),
                })?
            }
            _ => {
                return Err(PipelinerError::InvalidParameter {
                    name: name.to_string(),
                    value: value.to_string(),
                    reason: "unknown LogisticRegression parameter".to_string(),
                })
            }
        }
        Ok(())
    }

    fn kind(&self) -> &'static str {
        "LogisticRegression"
    }

    fn box_clone(&self) -> Box<dyn Stage> {
        Box::new(self.clone())
    }
}
