//! Ordered chain of fitted stages
//!
//! A [`Pipeline`] is what search and evaluation actually fit: the row's
//! modelling suffix, each stage labelled by its variant name. Tuned
//! parameters always belong to the final stage.

use crate::error::{PipelinerError, Result};
use crate::plan::StepRegistry;
use crate::stage::{ParamSet, Stage};
use ndarray::{Array1, Array2};
use std::borrow::Cow;

#[derive(Debug, Clone)]
pub struct Pipeline {
    steps: Vec<(String, Box<dyn Stage>)>,
}

impl Pipeline {
    pub fn new(steps: Vec<(String, Box<dyn Stage>)>) -> Self {
        Self { steps }
    }

    /// Fresh copies of the registry stages for the given (step, variant)
    /// choices, keyed by variant name
    pub fn from_registry(registry: &StepRegistry, choices: &[(&str, &str)]) -> Result<Self> {
        let steps = choices
            .iter()
            .map(|&(step, variant)| {
                registry
                    .stage(step, variant)
                    .map(|stage| (variant.to_string(), stage.box_clone()))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::new(steps))
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn step_names(&self) -> impl Iterator<Item = &str> {
        self.steps.iter().map(|(n, _)| n.as_str())
    }

    /// Name of the last stage, conventionally the model
    pub fn final_name(&self) -> Option<&str> {
        self.steps.last().map(|(n, _)| n.as_str())
    }

    pub fn final_stage_mut(&mut self) -> Option<&mut Box<dyn Stage>> {
        self.steps.last_mut().map(|(_, s)| s)
    }

    /// Fit every stage: all but the last are fit-transformed in order, the
    /// last is fitted on their output.
    pub fn fit(&mut self, x: &Array2<f64>, y: Option<&Array1<f64>>) -> Result<()> {
        let (last, head) = self
            .steps
            .split_last_mut()
            .ok_or_else(|| PipelinerError::ConfigError("cannot fit an empty pipeline".to_string()))?;

        let mut data: Cow<'_, Array2<f64>> = Cow::Borrowed(x);
        for (_, stage) in head.iter_mut() {
            data = Cow::Owned(stage.fit_transform(&data, y)?);
        }
        last.1.fit(&data, y)
    }

    /// Apply every stage except the last
    fn transform_head<'a>(&self, x: &'a Array2<f64>) -> Result<(Cow<'a, Array2<f64>>, &dyn Stage)> {
        let (last, head) = self
            .steps
            .split_last()
            .ok_or_else(|| PipelinerError::ConfigError("empty pipeline".to_string()))?;

        let mut data: Cow<'a, Array2<f64>> = Cow::Borrowed(x);
        for (_, stage) in head {
            data = Cow::Owned(stage.transform(&data)?);
        }
        Ok((data, last.1.as_ref()))
    }

    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let (data, last) = self.transform_head(x)?;
        last.predict(&data)
    }

    pub fn decision_function(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let (data, last) = self.transform_head(x)?;
        last.decision_function(&data)
    }

    /// Apply every stage, including the last, as a transformer
    pub fn transform(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        let (data, last) = self.transform_head(x)?;
        last.transform(&data)
    }

    /// Assign parameters to the final stage; earlier stages are untouched
    pub fn set_final_params(&mut self, params: &ParamSet) -> Result<()> {
        let stage = self.final_stage_mut().ok_or_else(|| {
            PipelinerError::ConfigError("cannot assign parameters to an empty pipeline".to_string())
        })?;
        stage.set_params(params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stage::{LogisticRegression, ParamValue, Scaler, ScalerType};
    use ndarray::array;

    fn pipeline() -> Pipeline {
        let scaler: Box<dyn Stage> = Box::new(Scaler::new(ScalerType::Standard));
        let model: Box<dyn Stage> = Box::new(LogisticRegression::new());
        Pipeline::new(vec![("Standard".to_string(), scaler), ("LR".to_string(), model)])
    }

    #[test]
    fn test_fit_predict() {
        let x = array![[-20.0], [-15.0], [-10.0], [10.0], [15.0], [20.0]];
        let y = array![0.0, 0.0, 0.0, 1.0, 1.0, 1.0];
        let mut p = pipeline();
        p.fit(&x, Some(&y)).unwrap();
        assert_eq!(p.predict(&x).unwrap(), y);
        assert_eq!(p.final_name(), Some("LR"));
    }

    #[test]
    fn test_final_params_skip_earlier_stages() {
        let mut p = pipeline();
        p.set_final_params(&ParamSet::new().with("penalty", "l1").with("C", 2.0)).unwrap();

        let err = p
            .set_final_params(&ParamSet::new().with("kernel", ParamValue::from("rbf")))
            .unwrap_err();
        assert!(matches!(err, PipelinerError::InvalidParameter { .. }));

        // A shared label and separator-like names do not affect assignment
        let scaler: Box<dyn Stage> = Box::new(Scaler::new(ScalerType::MinMax));
        let model: Box<dyn Stage> = Box::new(LogisticRegression::new());
        let mut shared = Pipeline::new(vec![
            ("default".to_string(), scaler),
            ("default__fast".to_string(), model),
        ]);
        shared.set_final_params(&ParamSet::new().with("C", 0.5)).unwrap();

        let mut empty = Pipeline::new(Vec::new());
        assert!(matches!(
            empty.set_final_params(&ParamSet::new()),
            Err(PipelinerError::ConfigError(_))
        ));
    }

    #[test]
    fn test_empty_pipeline() {
        let mut p = Pipeline::new(Vec::new());
        assert!(p.fit(&array![[1.0]], None).is_err());
        assert!(p.final_name().is_none());
    }
}
