//! Configuration for pipeliner construction, runs and JSON experiments

use crate::error::{PipelinerError, Result};
use crate::pipeliner::{Pipeliner, PipelinerBuilder};
use crate::plan::{BannedCombo, Step};
use crate::stage::{ParamGrid, StageSpec};
use crate::utils::ParallelConfig;
use crate::validation::{CrossValidator, Metric};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Settings fixed when a pipeliner is built
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelinerConfig {
    /// Worker threads for fold and candidate work (None = all available)
    pub n_jobs: Option<usize>,

    /// Reject banned combos and grids that name unknown variants or
    /// parameters
    pub strict_names: bool,
}

impl Default for PipelinerConfig {
    fn default() -> Self {
        Self {
            n_jobs: None,
            strict_names: true,
        }
    }
}

impl PipelinerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_n_jobs(mut self, n_jobs: usize) -> Self {
        self.n_jobs = Some(n_jobs);
        self
    }

    pub fn with_strict_names(mut self, strict: bool) -> Self {
        self.strict_names = strict;
        self
    }

    pub fn parallel(&self) -> ParallelConfig {
        ParallelConfig {
            n_threads: self.n_jobs,
        }
    }
}

/// Settings for one call to [`Pipeliner::get_results`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunOptions {
    /// Steps whose output is cached across rows; must be a leading run of
    /// the declared steps
    pub caching_steps: Vec<String>,

    /// Metrics to search and evaluate, in column order
    pub metrics: Vec<Metric>,

    /// Repeat evaluation this many times under shifted seeds
    pub collect_n: Option<usize>,

    /// Record evaluation failures per (row, metric) instead of aborting
    pub continue_on_error: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            caching_steps: Vec::new(),
            metrics: vec![Metric::Accuracy],
            collect_n: None,
            continue_on_error: false,
        }
    }
}

impl RunOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_caching_steps<I, S>(mut self, steps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.caching_steps = steps.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_metrics(mut self, metrics: Vec<Metric>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn with_collect_n(mut self, n: usize) -> Self {
        self.collect_n = Some(n);
        self
    }

    pub fn with_continue_on_error(mut self, enabled: bool) -> Self {
        self.continue_on_error = enabled;
        self
    }
}

/// One variant of a step in an experiment file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariantConfig {
    pub name: String,
    pub stage: StageSpec,
}

/// One step of an experiment file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepConfig {
    pub name: String,
    pub variants: Vec<VariantConfig>,
}

/// A complete experiment described in JSON
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentConfig {
    pub steps: Vec<StepConfig>,

    #[serde(default)]
    pub banned_combos: Vec<BannedCombo>,

    /// Parameter grids keyed by variant name
    #[serde(default)]
    pub param_grids: HashMap<String, ParamGrid>,

    #[serde(default)]
    pub grid_cv: CrossValidator,

    #[serde(default)]
    pub eval_cv: CrossValidator,

    #[serde(default)]
    pub run: RunOptions,

    #[serde(default)]
    pub pipeliner: PipelinerConfig,
}

impl ExperimentConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            PipelinerError::ConfigError(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_json(&json)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Instantiate the declared stages and build the pipeliner
    pub fn build(&self) -> Result<Pipeliner> {
        let steps = self
            .steps
            .iter()
            .map(|step| {
                step.variants.iter().fold(Step::new(&step.name), |s, v| {
                    s.with_boxed_variant(&v.name, v.stage.build())
                })
            })
            .collect();

        let mut builder = PipelinerBuilder::new()
            .steps(steps)
            .banned_combos(self.banned_combos.iter().cloned())
            .grid_cv(self.grid_cv.clone())
            .eval_cv(self.eval_cv.clone())
            .config(self.pipeliner.clone());
        for (variant, grid) in &self.param_grids {
            builder = builder.param_grid(variant, grid.clone());
        }
        builder.build()
    }
}
