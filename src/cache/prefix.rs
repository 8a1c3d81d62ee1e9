//! Incremental prefix cache
//!
//! Holds at most one chain of transformed feature matrices. Entry `k` is the
//! output of fitting and transforming stage `k` on entry `k - 1`; the root is
//! the raw input. Resolving a new prefix keeps the longest common leading
//! run, evicts everything after it, and computes only the missing tail.

use crate::error::{PipelinerError, Result};
use crate::plan::StepRegistry;
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

/// Counters describing how much work the cache saved
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    /// Chain positions reused from a previous resolve
    pub hits: u64,
    /// Chain positions computed by fitting a stage
    pub misses: u64,
    /// Entries dropped because a new prefix diverged from them
    pub evictions: u64,
    /// Number of resolve calls
    pub resolves: u64,
}

impl CacheStats {
    /// Fraction of requested positions served from the chain
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// One materialized position of the chain
#[derive(Debug, Clone)]
struct CacheEntry {
    step: String,
    variant: String,
    data: Arc<Array2<f64>>,
    created_at: Instant,
}

/// Chain of transformed data for the current prefix
#[derive(Debug)]
pub struct PrefixCache {
    root: Arc<Array2<f64>>,
    chain: Vec<CacheEntry>,
    stats: CacheStats,
}

impl PrefixCache {
    pub fn new(root: Arc<Array2<f64>>) -> Self {
        Self {
            root,
            chain: Vec::new(),
            stats: CacheStats::default(),
        }
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    /// (step, variant) keys of the materialized chain, root excluded
    pub fn cached_keys(&self) -> Vec<(&str, &str)> {
        self.chain
            .iter()
            .map(|e| (e.step.as_str(), e.variant.as_str()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.chain.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chain.is_empty()
    }

    /// Data after applying `prefix`, computing only what the chain lacks.
    ///
    /// `prefix` lists (step, variant) choices in registry step order with no
    /// step repeated. Labels are passed to each fit unchanged.
    pub fn resolve(
        &mut self,
        registry: &StepRegistry,
        y: Option<&Array1<f64>>,
        prefix: &[(&str, &str)],
    ) -> Result<Arc<Array2<f64>>> {
        // Every key must exist before anything is evicted
        for &(step, variant) in prefix {
            registry.stage(step, variant)?;
        }
        check_lineage(registry, prefix)?;

        self.stats.resolves += 1;

        let common = self
            .chain
            .iter()
            .zip(prefix.iter())
            .take_while(|(entry, &(step, variant))| entry.step == step && entry.variant == variant)
            .count();

        // Truncate from the tail inward; the root is never evicted
        while self.chain.len() > common {
            if let Some(entry) = self.chain.pop() {
                debug!(
                    step = %entry.step,
                    variant = %entry.variant,
                    age_ms = entry.created_at.elapsed().as_millis() as u64,
                    "Evicting cache entry"
                );
                self.stats.evictions += 1;
            }
        }
        self.stats.hits += common as u64;

        for &(step, variant) in &prefix[common..] {
            let mut stage = registry.stage(step, variant)?.box_clone();
            let input = self.chain.last().map(|e| &e.data).unwrap_or(&self.root);
            let output = stage.fit_transform(input, y)?;
            debug!(step, variant, shape = ?output.shape(), "Computed cache entry");

            self.chain.push(CacheEntry {
                step: step.to_string(),
                variant: variant.to_string(),
                data: Arc::new(output),
                created_at: Instant::now(),
            });
            self.stats.misses += 1;
        }

        Ok(Arc::clone(
            self.chain.last().map(|e| &e.data).unwrap_or(&self.root),
        ))
    }
}

/// Keys must follow registry step order strictly
fn check_lineage(registry: &StepRegistry, prefix: &[(&str, &str)]) -> Result<()> {
    let mut last: Option<usize> = None;
    for &(step, _) in prefix {
        let idx = registry
            .step_index(step)
            .ok_or_else(|| PipelinerError::ConfigError(format!("unknown step '{}'", step)))?;
        if let Some(prev) = last {
            if idx <= prev {
                return Err(PipelinerError::CacheConsistencyError(format!(
                    "step '{}' is repeated or out of step order in the cache prefix",
                    step
                )));
            }
        }
        last = Some(idx);
    }
    Ok(())
}
