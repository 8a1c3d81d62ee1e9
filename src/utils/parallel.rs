//! Parallel processing utilities

use crate::error::{PipelinerError, Result};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Configuration for parallel processing
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParallelConfig {
    /// Number of threads (None = use all available)
    pub n_threads: Option<usize>,
}

impl ParallelConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set number of threads
    pub fn with_threads(mut self, n: usize) -> Self {
        self.n_threads = Some(n);
        self
    }

    /// Get the number of threads to use
    pub fn num_threads(&self) -> usize {
        self.n_threads.unwrap_or_else(rayon::current_num_threads)
    }

    /// Run `op` inside a pool sized by this config.
    ///
    /// Without an explicit thread count the global rayon pool is used.
    pub fn install<R, F>(&self, op: F) -> Result<R>
    where
        R: Send,
        F: FnOnce() -> R + Send,
    {
        match self.n_threads {
            None => Ok(op()),
            Some(0) => Err(PipelinerError::ConfigError(
                "n_jobs must be at least 1".to_string(),
            )),
            Some(n) => {
                let pool = rayon::ThreadPoolBuilder::new()
                    .num_threads(n)
                    .build()
                    .map_err(|e| PipelinerError::ConfigError(format!("thread pool: {}", e)))?;
                Ok(pool.install(op))
            }
        }
    }
}

/// Map `f` over `items` in parallel and collect the first error, if any
pub fn try_parallel_map<T, U, F>(items: Vec<T>, f: F) -> Result<Vec<U>>
where
    T: Send,
    U: Send,
    F: Fn(T) -> Result<U> + Send + Sync,
{
    items.into_par_iter().map(f).collect()
}
