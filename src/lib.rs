//! Kolosal Pipeliner - grid search and evaluation over pipeline variants
//!
//! Given several variants for each step of a processing-plus-model pipeline
//! (scalers crossed with classifiers, say), the pipeliner enumerates every
//! allowed combination, tunes each one by cross-validated grid search and
//! reports a cross-validated score for the tuned pipeline. Data produced by
//! leading steps is cached so that consecutive rows sharing a prefix reuse
//! it instead of refitting.
//!
//! # Modules
//!
//! ## Core
//! - [`plan`] - Steps, variants, banned combinations and the plan table
//! - [`cache`] - Incremental prefix cache
//! - [`search`] - Hyperparameter grid search and best-parameter store
//! - [`evaluate`] - Single and repeated cross-validated evaluation
//! - [`pipeliner`] - Row-by-row orchestration
//! - [`results`] - Result table and text log sinks
//!
//! ## Collaborators
//! - [`stage`] - Stage trait, parameters and built-in transformers/estimators
//! - [`pipeline`] - Fitted chains of stages
//! - [`validation`] - Cross-validation splitters and scoring metrics
//!
//! ## Utilities
//! - [`config`] - Pipeliner, run and experiment configuration
//! - [`utils`] - CSV loading and parallel helpers
//! - [`cli`] - Command-line interface

// Core error handling
pub mod error;

pub mod stage;
pub mod pipeline;
pub mod validation;

pub mod plan;
pub mod cache;
pub mod search;
pub mod evaluate;
pub mod results;
pub mod pipeliner;

pub mod config;
pub mod utils;
pub mod cli;

pub use error::{PipelinerError, Result};
pub use pipeliner::{Pipeliner, PipelinerBuilder};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::cache::{CacheStats, PrefixCache};
    pub use crate::config::{ExperimentConfig, PipelinerConfig, RunOptions};
    pub use crate::error::{PipelinerError, Result};
    pub use crate::pipeline::Pipeline;
    pub use crate::pipeliner::{Pipeliner, PipelinerBuilder};
    pub use crate::plan::{BannedCombo, PlanRow, PlanTable, Step, StepRegistry};
    pub use crate::results::{
        FileLogSink, LogSink, MemoryLogSink, MetricOutcome, MetricResult, NullLogSink, ResultRow,
        ResultTable, NOT_APPLICABLE,
    };
    pub use crate::search::{BestParamsKey, BestParamsStore, GridOutcome};
    pub use crate::stage::{
        FunctionTransformer, KNNClassifier, LogisticRegression, ParamGrid, ParamSet, ParamValue,
        RowTransformer, Scaler, ScalerType, Stage,
    };
    pub use crate::validation::{CVStrategy, CrossValidator, Metric, Splitter};
}
