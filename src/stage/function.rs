//! Stateless transformers built from plain functions

use super::Stage;
use crate::error::{PipelinerError, Result};
use ndarray::{Array1, Array2, ArrayView1, Axis};
use std::fmt;
use std::sync::Arc;

type MatrixFn = dyn Fn(&Array2<f64>) -> Result<Array2<f64>> + Send + Sync;
type RowFn = dyn Fn(ArrayView1<f64>) -> Array1<f64> + Send + Sync;

/// Applies a function to the whole feature matrix. Fitting is a no-op.
#[derive(Clone)]
pub struct FunctionTransformer {
    name: String,
    func: Arc<MatrixFn>,
}

impl FunctionTransformer {
    pub fn new<F>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(&Array2<f64>) -> Result<Array2<f64>> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            func: Arc::new(func),
        }
    }
}

impl fmt::Debug for FunctionTransformer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionTransformer").field("name", &self.name).finish()
    }
}

impl Stage for FunctionTransformer {
    fn fit(&mut self, _x: &Array2<f64>, _y: Option<&Array1<f64>>) -> Result<()> {
        Ok(())
    }

    fn transform(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        (self.func)(x)
    }

    fn kind(&self) -> &'static str {
        "FunctionTransformer"
    }

    fn box_clone(&self) -> Box<dyn Stage> {
        Box::new(self.clone())
    }
}

/// Applies a function to each sample (row) and stacks the outputs.
///
/// Every output row must have the same length.
#[derive(Clone)]
pub struct RowTransformer {
    name: String,
    func: Arc<RowFn>,
}

impl RowTransformer {
    pub fn new<F>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(ArrayView1<f64>) -> Array1<f64> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            func: Arc::new(func),
        }
    }
}

impl fmt::Debug for RowTransformer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RowTransformer").field("name", &self.name).finish()
    }
}

impl Stage for RowTransformer {
    fn fit(&mut self, _x: &Array2<f64>, _y: Option<&Array1<f64>>) -> Result<()> {
        Ok(())
    }

    fn transform(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        let rows: Vec<Array1<f64>> = x.axis_iter(Axis(0)).map(|row| (self.func)(row)).collect();
        let width = rows.first().map(|r| r.len()).unwrap_or(0);
        if let Some(bad) = rows.iter().find(|r| r.len() != width) {
            return Err(PipelinerError::ShapeError {
                expected: format!("rows of length {}", width),
                actual: format!("row of length {}", bad.len()),
            });
        }

        let flat: Vec<f64> = rows.iter().flat_map(|r| r.iter().copied()).collect();
        Ok(Array2::from_shape_vec((rows.len(), width), flat)?)
    }

    fn kind(&self) -> &'static str {
        "RowTransformer"
    }

    fn box_clone(&self) -> Box<dyn Stage> {
        Box::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_function_transformer() {
        let mut t = FunctionTransformer::new("square", |x: &Array2<f64>| Ok(x.mapv(|v| v * v)));
        let out = t.fit_transform(&array![[1.0, 2.0], [3.0, 4.0]], None).unwrap();
        assert_eq!(out, array![[1.0, 4.0], [9.0, 16.0]]);
    }

    #[test]
    fn test_row_transformer_changes_width() {
        let mut t = RowTransformer::new("row_stats", |row: ArrayView1<f64>| {
            array![row.sum(), row.len() as f64]
        });
        let out = t.fit_transform(&array![[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]], None).unwrap();
        assert_eq!(out, array![[6.0, 3.0], [15.0, 3.0]]);
    }

    #[test]
    fn test_row_transformer_ragged_output() {
        let t = RowTransformer::new("ragged", |row: ArrayView1<f64>| {
            Array1::zeros(if row[0] > 0.0 { 2 } else { 1 })
        });
        let err = t.transform(&array![[1.0], [-1.0]]).unwrap_err();
        assert!(matches!(err, PipelinerError::ShapeError { .. }));
    }
}
