//! Steps, variants and the evaluation plan
//!
//! A [`StepRegistry`] holds the ordered steps of a pipeline and, per step,
//! the ordered variants that may fill it. [`PlanTable::build`] enumerates
//! every combination of variants in product order and drops the rows that
//! contain both names of a [`BannedCombo`].

use crate::error::{PipelinerError, Result};
use crate::stage::Stage;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// A named pipeline step with its ordered variants
#[derive(Debug, Clone)]
pub struct Step {
    name: String,
    variants: Vec<(String, Box<dyn Stage>)>,
}

impl Step {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            variants: Vec::new(),
        }
    }

    /// Append a variant. Insertion order is evaluation order.
    pub fn with_variant(mut self, name: impl Into<String>, stage: impl Stage + 'static) -> Self {
        self.variants.push((name.into(), Box::new(stage)));
        self
    }

    /// Append an already boxed variant
    pub fn with_boxed_variant(mut self, name: impl Into<String>, stage: Box<dyn Stage>) -> Self {
        self.variants.push((name.into(), stage));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn variant_names(&self) -> impl Iterator<Item = &str> {
        self.variants.iter().map(|(n, _)| n.as_str())
    }

    pub fn variant(&self, name: &str) -> Option<&dyn Stage> {
        self.variants
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, s)| s.as_ref())
    }

    pub fn len(&self) -> usize {
        self.variants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variants.is_empty()
    }
}

/// Ordered, validated collection of steps
#[derive(Debug, Clone)]
pub struct StepRegistry {
    steps: Vec<Step>,
}

impl StepRegistry {
    /// Validate and wrap the steps.
    ///
    /// Step names must be unique, every step needs at least one variant and
    /// variant names must be unique within their step.
    pub fn new(steps: Vec<Step>) -> Result<Self> {
        if steps.is_empty() {
            return Err(PipelinerError::ConfigError("at least one step is required".to_string()));
        }

        let mut seen_steps = HashSet::new();
        for step in &steps {
            if !seen_steps.insert(step.name.as_str()) {
                return Err(PipelinerError::ConfigError(format!(
                    "duplicate step name '{}'",
                    step.name
                )));
            }
            if step.is_empty() {
                return Err(PipelinerError::ConfigError(format!(
                    "step '{}' has no variants",
                    step.name
                )));
            }
            let mut seen_variants = HashSet::new();
            for name in step.variant_names() {
                if !seen_variants.insert(name) {
                    return Err(PipelinerError::ConfigError(format!(
                        "duplicate variant '{}' in step '{}'",
                        name, step.name
                    )));
                }
            }
        }

        Ok(Self { steps })
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn step_names(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.name()).collect()
    }

    pub fn step(&self, name: &str) -> Option<&Step> {
        self.steps.iter().find(|s| s.name == name)
    }

    pub fn step_index(&self, name: &str) -> Option<usize> {
        self.steps.iter().position(|s| s.name == name)
    }

    /// Look up the stage for a (step, variant) choice
    pub fn stage(&self, step: &str, variant: &str) -> Result<&dyn Stage> {
        let s = self
            .step(step)
            .ok_or_else(|| PipelinerError::ConfigError(format!("unknown step '{}'", step)))?;
        s.variant(variant).ok_or_else(|| {
            PipelinerError::ConfigError(format!("unknown variant '{}' in step '{}'", variant, step))
        })
    }

    /// Whether any step declares a variant with this name
    pub fn contains_variant(&self, name: &str) -> bool {
        self.steps.iter().any(|s| s.variant(name).is_some())
    }

    /// Upper bound on the plan size: product of variant counts
    pub fn n_combinations(&self) -> usize {
        self.steps.iter().map(|s| s.len()).product()
    }
}

/// An unordered pair of variant names that may not share a plan row
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BannedCombo(pub String, pub String);

impl BannedCombo {
    pub fn new(a: impl Into<String>, b: impl Into<String>) -> Self {
        Self(a.into(), b.into())
    }

    /// True when both names are among the chosen variants
    pub fn matches<'a>(&self, chosen: impl Iterator<Item = &'a str> + Clone) -> bool {
        chosen.clone().any(|v| v == self.0) && chosen.into_iter().any(|v| v == self.1)
    }
}

/// Report banned combos that name a variant no step declares.
///
/// [`PlanTable::build`] silently ignores such names; call this to catch typos.
pub fn validate_banned_combos(registry: &StepRegistry, banned: &[BannedCombo]) -> Result<()> {
    for combo in banned {
        for name in [&combo.0, &combo.1] {
            if !registry.contains_variant(name) {
                return Err(PipelinerError::ConfigError(format!(
                    "banned combo ({}, {}) names unknown variant '{}'",
                    combo.0, combo.1, name
                )));
            }
        }
    }
    Ok(())
}

/// One fully specified pipeline: a variant choice per step, in step order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanRow {
    choices: Vec<(String, String)>,
}

impl PlanRow {
    /// (step, variant) pairs in step order
    pub fn choices(&self) -> &[(String, String)] {
        &self.choices
    }

    /// Chosen variant names in step order
    pub fn variants(&self) -> impl Iterator<Item = &str> + Clone {
        self.choices.iter().map(|(_, v)| v.as_str())
    }

    /// Variant chosen for a step
    pub fn variant_for(&self, step: &str) -> Option<&str> {
        self.choices
            .iter()
            .find(|(s, _)| s == step)
            .map(|(_, v)| v.as_str())
    }

    /// The (step, variant) choices restricted to `steps`, in row order
    pub fn select<'a>(&'a self, steps: &[String]) -> Vec<(&'a str, &'a str)> {
        self.choices
            .iter()
            .filter(|(s, _)| steps.iter().any(|x| x == s))
            .map(|(s, v)| (s.as_str(), v.as_str()))
            .collect()
    }

    /// The (step, variant) choices for steps not in `steps`, in row order
    pub fn select_other<'a>(&'a self, steps: &[String]) -> Vec<(&'a str, &'a str)> {
        self.choices
            .iter()
            .filter(|(s, _)| !steps.iter().any(|x| x == s))
            .map(|(s, v)| (s.as_str(), v.as_str()))
            .collect()
    }
}

impl fmt::Display for PlanRow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (step, variant)) in self.choices.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}={}", step, variant)?;
        }
        Ok(())
    }
}

/// Ordered table of plan rows
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanTable {
    step_names: Vec<String>,
    rows: Vec<PlanRow>,
}

impl PlanTable {
    /// Enumerate the Cartesian product of variants (last step varies
    /// fastest) and drop rows matching any banned combo.
    pub fn build(registry: &StepRegistry, banned: &[BannedCombo]) -> Self {
        let steps = registry.steps();
        let names: Vec<Vec<&str>> = steps.iter().map(|s| s.variant_names().collect()).collect();
        let mut rows = Vec::new();
        let mut cursor = vec![0usize; steps.len()];

        'product: loop {
            let chosen = || cursor.iter().zip(names.iter()).map(|(&i, n)| n[i]);
            if !banned.iter().any(|combo| combo.matches(chosen())) {
                rows.push(PlanRow {
                    choices: steps
                        .iter()
                        .zip(chosen())
                        .map(|(s, v)| (s.name().to_string(), v.to_string()))
                        .collect(),
                });
            }

            let mut pos = steps.len();
            loop {
                if pos == 0 {
                    break 'product;
                }
                pos -= 1;
                cursor[pos] += 1;
                if cursor[pos] < names[pos].len() {
                    break;
                }
                cursor[pos] = 0;
            }
        }

        Self {
            step_names: steps.iter().map(|s| s.name().to_string()).collect(),
            rows,
        }
    }

    pub fn step_names(&self) -> &[String] {
        &self.step_names
    }

    pub fn rows(&self) -> &[PlanRow] {
        &self.rows
    }

    pub fn get(&self, index: usize) -> Option<&PlanRow> {
        self.rows.get(index)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PlanRow> {
        self.rows.iter()
    }
}
