//! Feature scaling stages

use super::Stage;
use crate::error::{PipelinerError, Result};
use ndarray::{Array1, Array2, ArrayView1, Axis};
use serde::{Deserialize, Serialize};

/// Type of scaler to use
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ScalerType {
    /// Standard scaling (z-score normalization): (x - mean) / std
    Standard,
    /// Min-Max scaling: (x - min) / (max - min)
    MinMax,
    /// Robust scaling using median and IQR
    Robust,
    /// Max absolute scaling: x / max(|x|)
    MaxAbs,
}

/// Parameters for one fitted column
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ScalerParams {
    center: f64, // mean, min, or median
    scale: f64,  // std, range, or IQR
}

/// Column-wise feature scaler
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scaler {
    scaler_type: ScalerType,
    params: Vec<ScalerParams>,
    is_fitted: bool,
}

impl Scaler {
    /// Create a new scaler
    pub fn new(scaler_type: ScalerType) -> Self {
        Self {
            scaler_type,
            params: Vec::new(),
            is_fitted: false,
        }
    }

    pub fn scaler_type(&self) -> ScalerType {
        self.scaler_type
    }

    /// Inverse transform the data
    pub fn inverse_transform(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        self.check_width(x)?;
        let mut out = x.clone();
        for (mut col, p) in out.axis_iter_mut(Axis(1)).zip(self.params.iter()) {
            col.mapv_inplace(|v| v * p.scale + p.center);
        }
        Ok(out)
    }

    fn check_width(&self, x: &Array2<f64>) -> Result<()> {
        if !self.is_fitted {
            return Err(PipelinerError::ModelNotFitted);
        }
        if x.ncols() != self.params.len() {
            return Err(PipelinerError::ShapeError {
                expected: format!("{} columns", self.params.len()),
                actual: format!("{} columns", x.ncols()),
            });
        }
        Ok(())
    }

    fn compute_params(&self, col: ArrayView1<f64>) -> ScalerParams {
        let (center, scale) = match self.scaler_type {
            ScalerType::Standard => {
                let mean = col.mean().unwrap_or(0.0);
                (mean, col.std(0.0))
            }
            ScalerType::MinMax => {
                let min = col.iter().copied().fold(f64::INFINITY, f64::min);
                let max = col.iter().copied().fold(f64::NEG_INFINITY, f64::max);
                (min, max - min)
            }
            ScalerType::Robust => {
                let mut sorted: Vec<f64> = col.to_vec();
                sorted.sort_by(|a, b| a.total_cmp(b));
                let median = quantile(&sorted, 0.5);
                (median, quantile(&sorted, 0.75) - quantile(&sorted, 0.25))
            }
            ScalerType::MaxAbs => {
                let max_abs = col.iter().fold(0.0f64, |a, &b| a.max(b.abs()));
                (0.0, max_abs)
            }
        };

        ScalerParams {
            center: if center.is_finite() { center } else { 0.0 },
            scale: if scale == 0.0 || !scale.is_finite() { 1.0 } else { scale },
        }
    }
}

/// Linear-interpolated quantile of an already sorted slice
fn quantile(sorted: &[f64], q: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let pos = q * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let frac = pos - lo as f64;
    sorted[lo] + (sorted[hi] - sorted[lo]) * frac
}

impl Stage for Scaler {
    fn fit(&mut self, x: &Array2<f64>, _y: Option<&Array1<f64>>) -> Result<()> {
        if x.nrows() == 0 {
            return Err(PipelinerError::DataError("cannot fit a scaler on zero rows".to_string()));
        }
        self.params = x.axis_iter(Axis(1)).map(|col| self.compute_params(col)).collect();
        self.is_fitted = true;
        Ok(())
    }

    fn transform(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        self.check_width(x)?;
        let mut out = x.clone();
        for (mut col, p) in out.axis_iter_mut(Axis(1)).zip(self.params.iter()) {
            col.mapv_inplace(|v| (v - p.center) / p.scale);
        }
        Ok(out)
    }

    fn kind(&self) -> &'static str {
        "Scaler"
    }

    fn box_clone(&self) -> Box<dyn Stage> {
        Box::new(self.clone())
    }
}
