//! Cross-validation splitters
//!
//! Splitters are immutable. Repeated evaluation asks for re-seeded copies
//! through [`Splitter::with_seed`] instead of changing a shared generator.

use crate::error::{PipelinerError, Result};
use ndarray::Array1;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Debug;

/// Row indices of one fold
#[derive(Debug, Clone, PartialEq)]
pub struct CVSplit {
    pub train_indices: Vec<usize>,
    pub test_indices: Vec<usize>,
    pub fold_idx: usize,
}

/// Anything that produces train/test splits.
///
/// Implementations are immutable: re-seeding returns a new splitter.
pub trait Splitter: Debug + Send + Sync {
    /// Generate train/test splits for `n_samples` rows
    fn split(&self, n_samples: usize, y: Option<&Array1<f64>>) -> Result<Vec<CVSplit>>;

    /// Seed controlling split randomness, if any
    fn random_state(&self) -> Option<u64>;

    /// A copy of this splitter using `seed`
    fn with_seed(&self, seed: u64) -> Box<dyn Splitter>;
}

/// How samples are assigned to folds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CVStrategy {
    /// Contiguous folds, optionally shuffled first
    KFold { n_splits: usize, shuffle: bool },
    /// Folds that keep each label's share of samples
    StratifiedKFold { n_splits: usize, shuffle: bool },
    /// One fold per sample
    LeaveOneOut,
}

impl Default for CVStrategy {
    fn default() -> Self {
        CVStrategy::StratifiedKFold { n_splits: 5, shuffle: true }
    }
}

/// Splitter over a [`CVStrategy`], seeded by `random_state`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrossValidator {
    strategy: CVStrategy,
    random_state: Option<u64>,
}

impl Default for CrossValidator {
    fn default() -> Self {
        Self::new(CVStrategy::default())
    }
}

impl CrossValidator {
    pub fn new(strategy: CVStrategy) -> Self {
        Self {
            strategy,
            random_state: None,
        }
    }

    /// Fix the shuffle seed
    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = Some(seed);
        self
    }

    pub fn strategy(&self) -> &CVStrategy {
        &self.strategy
    }

    fn rng(&self) -> ChaCha8Rng {
        match self.random_state {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        }
    }

    fn k_fold_split(&self, n_samples: usize, n_splits: usize, shuffle: bool) -> Result<Vec<CVSplit>> {
        check_n_splits(n_samples, n_splits)?;

        let mut indices: Vec<usize> = (0..n_samples).collect();
        if shuffle {
            indices.shuffle(&mut self.rng());
        }

        let mut splits = Vec::with_capacity(n_splits);
        let mut current = 0;

        for fold_idx in 0..n_splits {
            let base = n_samples / n_splits;
            let fold_size = if fold_idx < n_samples % n_splits { base + 1 } else { base };
            let test_indices = indices[current..current + fold_size].to_vec();
            let train_indices: Vec<usize> = indices[..current]
                .iter()
                .chain(indices[current + fold_size..].iter())
                .copied()
                .collect();

            splits.push(CVSplit {
                train_indices,
                test_indices,
                fold_idx,
            });
            current += fold_size;
        }

        Ok(splits)
    }

    fn stratified_k_fold_split(
        &self,
        n_samples: usize,
        y: &Array1<f64>,
        n_splits: usize,
        shuffle: bool,
    ) -> Result<Vec<CVSplit>> {
        check_n_splits(n_samples, n_splits)?;
        if y.len() != n_samples {
            return Err(PipelinerError::ShapeError {
                expected: format!("y length = {}", n_samples),
                actual: format!("y length = {}", y.len()),
            });
        }

        // Group samples by class, in class order so splits are reproducible
        let mut class_indices: BTreeMap<i64, Vec<usize>> = BTreeMap::new();
        for (idx, &val) in y.iter().enumerate() {
            class_indices.entry(val.round() as i64).or_default().push(idx);
        }

        if shuffle {
            let mut rng = self.rng();
            for indices in class_indices.values_mut() {
                indices.shuffle(&mut rng);
            }
        }

        // Deal samples round-robin, continuing across classes so fold sizes
        // stay balanced
        let mut folds: Vec<Vec<usize>> = vec![Vec::new(); n_splits];
        let mut next = 0;
        for indices in class_indices.values() {
            for &idx in indices {
                folds[next % n_splits].push(idx);
                next += 1;
            }
        }

        let splits = (0..n_splits)
            .map(|fold_idx| CVSplit {
                train_indices: folds
                    .iter()
                    .enumerate()
                    .filter(|(i, _)| *i != fold_idx)
                    .flat_map(|(_, f)| f.iter().copied())
                    .collect(),
                test_indices: folds[fold_idx].clone(),
                fold_idx,
            })
            .collect();

        Ok(splits)
    }

    fn leave_one_out_split(&self, n_samples: usize) -> Result<Vec<CVSplit>> {
        check_n_splits(n_samples, 2)?;
        Ok((0..n_samples)
            .map(|i| CVSplit {
                train_indices: (0..n_samples).filter(|&j| j != i).collect(),
                test_indices: vec![i],
                fold_idx: i,
            })
            .collect())
    }
}

fn check_n_splits(n_samples: usize, n_splits: usize) -> Result<()> {
    if n_splits < 2 {
        return Err(PipelinerError::ConfigError("n_splits must be at least 2".to_string()));
    }
    if n_samples < n_splits {
        return Err(PipelinerError::DataError(format!(
            "n_samples ({}) must be >= n_splits ({})",
            n_samples, n_splits
        )));
    }
    Ok(())
}

impl Splitter for CrossValidator {
    fn split(&self, n_samples: usize, y: Option<&Array1<f64>>) -> Result<Vec<CVSplit>> {
        match &self.strategy {
            CVStrategy::KFold { n_splits, shuffle } => self.k_fold_split(n_samples, *n_splits, *shuffle),
            CVStrategy::StratifiedKFold { n_splits, shuffle } => {
                let y = y.ok_or_else(|| {
                    PipelinerError::DataError("StratifiedKFold requires target array".to_string())
                })?;
                self.stratified_k_fold_split(n_samples, y, *n_splits, *shuffle)
            }
            CVStrategy::LeaveOneOut => self.leave_one_out_split(n_samples),
        }
    }

    fn random_state(&self) -> Option<u64> {
        self.random_state
    }

    fn with_seed(&self, seed: u64) -> Box<dyn Splitter> {
        Box::new(self.clone().with_random_state(seed))
    }
}

/// Mean and population standard deviation of fold scores
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreSummary {
    /// Score per fold or per repeat
    pub scores: Vec<f64>,
    pub mean_score: f64,
    /// Population standard deviation
    pub std_score: f64,
}

impl ScoreSummary {
    /// Summarise fold scores; an empty list yields NaN statistics
    pub fn from_scores(scores: Vec<f64>) -> Self {
        let n = scores.len() as f64;
        let mean_score = scores.iter().sum::<f64>() / n;
        let variance = scores.iter().map(|s| (s - mean_score).powi(2)).sum::<f64>() / n;

        Self {
            scores,
            mean_score,
            std_score: variance.sqrt(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn covered_once(splits: &[CVSplit], n: usize) -> bool {
        let mut seen = vec![0usize; n];
        for &i in splits.iter().flat_map(|s| s.test_indices.iter()) {
            seen[i] += 1;
        }
        seen.iter().all(|&c| c == 1)
    }

    #[test]
    fn test_k_fold_uneven_sizes() {
        let cv = CrossValidator::new(CVStrategy::KFold { n_splits: 3, shuffle: false });
        let splits = cv.split(10, None).unwrap();

        let sizes: Vec<usize> = splits.iter().map(|s| s.test_indices.len()).collect();
        assert_eq!(sizes, vec![4, 3, 3]);
        assert_eq!(splits[0].test_indices, vec![0, 1, 2, 3]);
        assert!(splits.iter().all(|s| s.train_indices.len() + s.test_indices.len() == 10));
        assert!(covered_once(&splits, 10));
    }

    #[test]
    fn test_stratified_keeps_both_labels() {
        let y = Array1::from_vec(vec![1.0, 0.0, 1.0, 0.0, 1.0, 0.0, 1.0, 0.0, 1.0, 0.0]);
        let cv = CrossValidator::new(CVStrategy::StratifiedKFold { n_splits: 5, shuffle: true })
            .with_random_state(3);
        let splits = cv.split(10, Some(&y)).unwrap();

        assert_eq!(splits.len(), 5);
        for split in &splits {
            assert_eq!(split.test_indices.len(), 2);
            let classes: Vec<f64> = split.test_indices.iter().map(|&i| y[i]).collect();
            assert!(classes.contains(&0.0) && classes.contains(&1.0));
        }
        assert!(covered_once(&splits, 10));
    }

    #[test]
    fn test_stratified_requires_labels() {
        let cv = CrossValidator::default();
        assert!(matches!(cv.split(10, None), Err(PipelinerError::DataError(_))));
    }

    #[test]
    fn test_leave_one_out() {
        let cv = CrossValidator::new(CVStrategy::LeaveOneOut);
        let splits = cv.split(6, None).unwrap();
        assert_eq!(splits.len(), 6);
        assert!(splits.iter().all(|s| s.test_indices == vec![s.fold_idx] && s.train_indices.len() == 5));
    }

    #[test]
    fn test_seed_controls_shuffle() {
        let cv = CrossValidator::new(CVStrategy::KFold { n_splits: 4, shuffle: true }).with_random_state(7);
        let a = cv.split(40, None).unwrap();
        let b = cv.with_seed(7).split(40, None).unwrap();
        let c = cv.with_seed(8).split(40, None).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(cv.random_state(), Some(7));
    }

    #[test]
    fn test_too_few_samples() {
        let cv = CrossValidator::new(CVStrategy::KFold { n_splits: 5, shuffle: false });
        assert!(cv.split(3, None).is_err());
    }

    #[test]
    fn test_cv_results() {
        let res = ScoreSummary::from_scores(vec![1.0, 3.0]);
        assert_eq!(res.mean_score, 2.0);
        assert_eq!(res.std_score, 1.0);
    }
}
