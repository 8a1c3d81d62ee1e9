//! K-nearest neighbours classifier

use super::{expect_usize, ParamGrid, ParamValue, Stage};
use crate::error::{PipelinerError, Result};
use ndarray::{Array1, Array2, ArrayView1};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BinaryHeap;

/// Distance metric for KNN
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistanceMetric {
    /// Euclidean distance (L2)
    #[default]
    Euclidean,
    /// Manhattan distance (L1)
    Manhattan,
}

/// Weighting scheme for neighbours
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WeightScheme {
    /// All neighbours have equal weight
    #[default]
    Uniform,
    /// Closer neighbours have more weight (inverse distance)
    Distance,
}

/// KNN configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KNNConfig {
    /// Number of neighbours
    pub n_neighbors: usize,
    /// Distance metric
    pub metric: DistanceMetric,
    /// Weighting scheme
    pub weights: WeightScheme,
}

impl Default for KNNConfig {
    fn default() -> Self {
        Self {
            n_neighbors: 5,
            metric: DistanceMetric::Euclidean,
            weights: WeightScheme::Uniform,
        }
    }
}

/// K-nearest neighbours classifier.
///
/// Declares a default `n_neighbors` grid of 3, 5 and 7 for every metric.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KNNClassifier {
    config: KNNConfig,
    x_train: Option<Array2<f64>>,
    y_train: Option<Array1<f64>>,
}

impl KNNClassifier {
    pub fn new(config: KNNConfig) -> Self {
        Self {
            config,
            x_train: None,
            y_train: None,
        }
    }

    /// Create with default config and specified k
    pub fn with_k(k: usize) -> Self {
        Self::new(KNNConfig {
            n_neighbors: k,
            ..Default::default()
        })
    }

    pub fn config(&self) -> &KNNConfig {
        &self.config
    }
}

impl Stage for KNNClassifier {
    fn fit(&mut self, x: &Array2<f64>, y: Option<&Array1<f64>>) -> Result<()> {
        let y = y.ok_or_else(|| PipelinerError::DataError("KNNClassifier requires labels".to_string()))?;
        if x.nrows() != y.len() {
            return Err(PipelinerError::ShapeError {
                expected: format!("y length = {}", x.nrows()),
                actual: format!("y length = {}", y.len()),
            });
        }
        if self.config.n_neighbors == 0 {
            return Err(PipelinerError::InvalidParameter {
                name: "n_neighbors".to_string(),
                value: "0".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        self.x_train = Some(x.clone());
        self.y_train = Some(y.clone());
        Ok(())
    }

    /// Predict class labels (parallelized over test samples)
    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let x_train = self.x_train.as_ref().ok_or(PipelinerError::ModelNotFitted)?;
        let y_train = self.y_train.as_ref().ok_or(PipelinerError::ModelNotFitted)?;
        if x.ncols() != x_train.ncols() {
            return Err(PipelinerError::ShapeError {
                expected: format!("{} features", x_train.ncols()),
                actual: format!("{} features", x.ncols()),
            });
        }
        let k = self.config.n_neighbors;
        let metric = self.config.metric;
        let weights = self.config.weights;

        let predictions: Vec<f64> = (0..x.nrows())
            .into_par_iter()
            .map(|i| {
                let neighbors = find_k_nearest(x.row(i), x_train, y_train, k, metric);
                vote(&neighbors, weights)
            })
            .collect();

        Ok(Array1::from_vec(predictions))
    }

    fn set_param(&mut self, name: &str, value: &ParamValue) -> Result<()> {
        match name {
            "n_neighbors" => self.config.n_neighbors = expect_usize(name, value)?,
            "weights" => {
                self.config.weights = match value.as_str() {
                    Some("uniform") => WeightScheme::Uniform,
                    Some("distance") => WeightScheme::Distance,
                    _ => return Err(invalid(name, value, "expected uniform or distance")),
                }
            }
            "metric" => {
                self.config.metric = match value.as_str() {
                    Some("euclidean") => DistanceMetric::Euclidean,
                    Some("manhattan") => DistanceMetric::Manhattan,
                    _ => return Err(invalid(name, value, "expected euclidean or manhattan")),
                }
            }
            _ => return Err(invalid(name, value, "unknown KNNClassifier parameter")),
        }
        Ok(())
    }

    fn declare_grid(&self, _metric: &str) -> Option<ParamGrid> {
        Some(ParamGrid::new().with("n_neighbors", vec![3i64, 5, 7]))
    }

    fn kind(&self) -> &'static str {
        "KNNClassifier"
    }

    fn box_clone(&self) -> Box<dyn Stage> {
        Box::new(self.clone())
    }
}

fn invalid(name: &str, value: &ParamValue, reason: &str) -> PipelinerError {
    PipelinerError::InvalidParameter {
        name: name.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

/// Max-heap entry for partial sort (keeps k smallest distances)
#[derive(PartialEq)]
struct DistLabel(f64, f64);

impl Eq for DistLabel {}
impl PartialOrd for DistLabel {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for DistLabel {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

/// Find k nearest neighbours using a max-heap
fn find_k_nearest(
    point: ArrayView1<f64>,
    x_train: &Array2<f64>,
    y_train: &Array1<f64>,
    k: usize,
    metric: DistanceMetric,
) -> Vec<(f64, f64)> {
    let mut heap = BinaryHeap::with_capacity(k + 1);

    for (row, &label) in x_train.rows().into_iter().zip(y_train.iter()) {
        let dist = distance(point, row, metric);
        if heap.len() < k {
            heap.push(DistLabel(dist, label));
        } else if let Some(top) = heap.peek() {
            if dist < top.0 {
                heap.pop();
                heap.push(DistLabel(dist, label));
            }
        }
    }

    heap.into_iter().map(|dl| (dl.0, dl.1)).collect()
}

fn distance(a: ArrayView1<f64>, b: ArrayView1<f64>, metric: DistanceMetric) -> f64 {
    match metric {
        DistanceMetric::Euclidean => a
            .iter()
            .zip(b.iter())
            .map(|(x, y)| (x - y) * (x - y))
            .sum::<f64>()
            .sqrt(),
        DistanceMetric::Manhattan => a.iter().zip(b.iter()).map(|(x, y)| (x - y).abs()).sum(),
    }
}

/// Weighted majority vote; ties go to the smaller label
fn vote(neighbors: &[(f64, f64)], weights: WeightScheme) -> f64 {
    let mut tally: Vec<(f64, f64)> = Vec::new();
    for &(dist, label) in neighbors {
        let w = match weights {
            WeightScheme::Uniform => 1.0,
            WeightScheme::Distance => 1.0 / (dist + 1e-12),
        };
        match tally.iter_mut().find(|(l, _)| *l == label) {
            Some(entry) => entry.1 += w,
            None => tally.push((label, w)),
        }
    }
    tally.sort_by(|a, b| a.0.total_cmp(&b.0));
    tally
        .iter()
        .fold(None::<(f64, f64)>, |best, &(label, w)| match best {
            Some((_, bw)) if bw >= w => best,
            _ => Some((label, w)),
        })
        .map(|(label, _)| label)
        .unwrap_or(0.0)
}
