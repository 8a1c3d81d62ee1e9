//! Integration test: plan → cached features → grid search → evaluation

use kolosal_pipeliner::evaluate::Evaluator;
use kolosal_pipeliner::prelude::*;
use ndarray::{Array1, Array2, ArrayView1};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Wraps a stage and counts how often it is fitted
#[derive(Debug, Clone)]
struct Counting {
    inner: Box<dyn Stage>,
    fits: Arc<AtomicUsize>,
}

impl Counting {
    fn new(inner: impl Stage + 'static) -> (Self, Arc<AtomicUsize>) {
        let fits = Arc::new(AtomicUsize::new(0));
        let stage = Self {
            inner: Box::new(inner),
            fits: Arc::clone(&fits),
        };
        (stage, fits)
    }
}

impl Stage for Counting {
    fn fit(&mut self, x: &Array2<f64>, y: Option<&Array1<f64>>) -> Result<()> {
        self.fits.fetch_add(1, Ordering::SeqCst);
        self.inner.fit(x, y)
    }

    fn transform(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        self.inner.transform(x)
    }

    fn kind(&self) -> &'static str {
        "Counting"
    }

    fn box_clone(&self) -> Box<dyn Stage> {
        Box::new(self.clone())
    }
}

/// An estimator that never fits
#[derive(Debug, Clone)]
struct Broken;

impl Stage for Broken {
    fn fit(&mut self, _x: &Array2<f64>, _y: Option<&Array1<f64>>) -> Result<()> {
        Err(PipelinerError::DataError("singular design matrix".to_string()))
    }

    fn kind(&self) -> &'static str {
        "Broken"
    }

    fn box_clone(&self) -> Box<dyn Stage> {
        Box::new(self.clone())
    }
}

fn create_dataset() -> (Array2<f64>, Array1<f64>) {
    let n = 40;
    let mut flat = Vec::with_capacity(n * 2);
    let mut target = Vec::with_capacity(n);

    for i in 0..n {
        let class = if i % 2 == 0 { 0.0 } else { 1.0 };
        let jitter = (i as f64 * 0.37).sin() * 0.3;
        flat.push(class * 4.0 + jitter);
        flat.push(class * -2.0 + jitter * 0.5 + 1.0);
        target.push(class);
    }

    (Array2::from_shape_vec((n, 2), flat).unwrap(), Array1::from(target))
}

fn stratified(n_splits: usize) -> CrossValidator {
    CrossValidator::new(CVStrategy::StratifiedKFold { n_splits, shuffle: false })
}

fn scaler_step() -> Step {
    Step::new("Scaler")
        .with_variant("MinMax", Scaler::new(ScalerType::MinMax))
        .with_variant("Standard", Scaler::new(ScalerType::Standard))
}

fn classifier_step() -> Step {
    Step::new("Classifier")
        .with_variant("LR", LogisticRegression::new())
        .with_variant("KNN", KNNClassifier::with_k(3))
}

fn base_builder() -> PipelinerBuilder {
    Pipeliner::builder()
        .step(scaler_step())
        .step(classifier_step())
        .grid_cv(stratified(3))
        .eval_cv(stratified(4))
}

#[test]
fn test_plan_excludes_banned_pairs() {
    let pipeliner = base_builder().banned_combo("Standard", "KNN").build().unwrap();
    let plan = pipeliner.plan();

    let rows: Vec<Vec<&str>> = plan.iter().map(|r| r.variants().collect()).collect();
    assert_eq!(
        rows,
        vec![vec!["MinMax", "LR"], vec!["MinMax", "KNN"], vec!["Standard", "LR"]]
    );
    assert!(plan.len() < pipeliner.registry().n_combinations());

    for row in plan.iter() {
        for combo in pipeliner.banned_combos() {
            assert!(!combo.matches(row.variants()));
        }
    }
}

#[test]
fn test_plan_without_bans_is_full_product() {
    let pipeliner = base_builder().build().unwrap();
    assert_eq!(pipeliner.plan().len(), pipeliner.registry().n_combinations());
    assert_eq!(pipeliner.plan().len(), 4);
}

#[test]
fn test_cached_prefix_is_fitted_once_per_variant() {
    let (x, y) = create_dataset();
    let (minmax, minmax_fits) = Counting::new(Scaler::new(ScalerType::MinMax));
    let (standard, standard_fits) = Counting::new(Scaler::new(ScalerType::Standard));

    let mut pipeliner = Pipeliner::builder()
        .step(
            Step::new("Scaler")
                .with_variant("MinMax", minmax)
                .with_variant("Standard", standard),
        )
        .step(classifier_step())
        .grid_cv(stratified(3))
        .eval_cv(stratified(4))
        .build()
        .unwrap();

    let options = RunOptions::new().with_caching_steps(["Scaler"]);
    let table = pipeliner.get_results(&x, Some(&y), &options, &mut NullLogSink).unwrap();
    assert_eq!(table.len(), 4);

    // (MinMax, LR), (MinMax, KNN) share one fit; Standard evicts and refits once
    assert_eq!(minmax_fits.load(Ordering::SeqCst), 1);
    assert_eq!(standard_fits.load(Ordering::SeqCst), 1);

    let stats = pipeliner.cache_stats().unwrap();
    assert_eq!(stats.misses, 2);
    assert_eq!(stats.hits, 2);
    assert_eq!(stats.evictions, 1);
}

#[test]
fn test_uncached_prefix_is_fitted_per_fold() {
    let (x, y) = create_dataset();
    let (minmax, minmax_fits) = Counting::new(Scaler::new(ScalerType::MinMax));

    let mut pipeliner = Pipeliner::builder()
        .step(Step::new("Scaler").with_variant("MinMax", minmax))
        .step(Step::new("Classifier").with_variant("LR", LogisticRegression::new()))
        .grid_cv(stratified(3))
        .eval_cv(stratified(4))
        .build()
        .unwrap();

    let table = pipeliner
        .get_results(&x, Some(&y), &RunOptions::new(), &mut NullLogSink)
        .unwrap();
    assert_eq!(table.len(), 1);
    // LR has no grid, so only the four evaluation folds fit the scaler
    assert_eq!(minmax_fits.load(Ordering::SeqCst), 4);
    assert_eq!(pipeliner.cache_stats().unwrap().resolves, 1);
}

#[test]
fn test_cache_matches_recomputation() {
    let (x, y) = create_dataset();
    let registry = StepRegistry::new(vec![
        scaler_step(),
        Step::new("Square").with_variant(
            "square",
            FunctionTransformer::new("square", |x: &Array2<f64>| Ok(x.mapv(|v| v * v))),
        ),
        classifier_step(),
    ])
    .unwrap();

    let mut cache = PrefixCache::new(Arc::new(x.clone()));
    cache
        .resolve(&registry, Some(&y), &[("Scaler", "Standard"), ("Square", "square")])
        .unwrap();
    let cached = cache
        .resolve(&registry, Some(&y), &[("Scaler", "MinMax"), ("Square", "square")])
        .unwrap();

    let mut scaler = Scaler::new(ScalerType::MinMax);
    let expected = scaler.fit_transform(&x, Some(&y)).unwrap().mapv(|v| v * v);
    assert_eq!(*cached, expected);
}

#[test]
fn test_repeated_evaluation_keeps_seed() {
    let (x, y) = create_dataset();
    let registry = StepRegistry::new(vec![classifier_step()]).unwrap();
    let cv = CrossValidator::new(CVStrategy::StratifiedKFold { n_splits: 4, shuffle: true })
        .with_random_state(11);
    let before = cv.clone();

    let suffix = [("Classifier", "LR")];
    let mut store = BestParamsStore::new();
    store.insert(BestParamsKey::new(&suffix, Metric::Accuracy), ParamSet::new());

    let evaluator = Evaluator::new(&registry, &cv);
    let scores = evaluator
        .evaluate(&x, &y, &suffix, Metric::Accuracy, &store, Some(3))
        .unwrap();

    assert_eq!(scores.len(), 3);
    assert!(scores.iter().all(|s| s.is_finite() && (0.0..=1.0).contains(s)));
    assert_eq!(cv, before);
    assert_eq!(cv.random_state(), Some(11));
}

#[test]
fn test_collect_n_gives_one_score_per_repeat() {
    let (x, y) = create_dataset();
    let mut pipeliner = base_builder()
        .eval_cv(CrossValidator::new(CVStrategy::StratifiedKFold { n_splits: 4, shuffle: true }).with_random_state(3))
        .build()
        .unwrap();

    let options = RunOptions::new()
        .with_caching_steps(["Scaler"])
        .with_collect_n(3);
    let table = pipeliner.get_results(&x, Some(&y), &options, &mut NullLogSink).unwrap();

    for row in table.rows() {
        let result = row.outcome(Metric::Accuracy).and_then(|o| o.as_completed()).unwrap();
        assert_eq!(result.eval_scores.len(), 3);
        assert!(result.eval_scores.iter().all(|s| s.is_finite()));
    }
}

#[test]
fn test_best_params_are_stripped_of_variant_prefix() {
    let (x, y) = create_dataset();
    let mut pipeliner = base_builder()
        .param_grid("LR", ParamGrid::new().with("penalty", vec!["l1", "l2"]))
        .build()
        .unwrap();

    let options = RunOptions::new().with_caching_steps(["Scaler"]);
    let table = pipeliner.get_results(&x, Some(&y), &options, &mut NullLogSink).unwrap();

    let best = pipeliner.best_params(&["LR"], Metric::Accuracy).unwrap();
    assert_eq!(best.len(), 1);
    let penalty = best.get("penalty").and_then(|v| v.as_str()).unwrap();
    assert!(penalty == "l1" || penalty == "l2");

    let lr_row = table.get(0).unwrap();
    let result = lr_row.outcome(Metric::Accuracy).and_then(|o| o.as_completed()).unwrap();
    assert!(matches!(result.grid, GridOutcome::Tuned { .. }));
    assert!(!result.grid_best_params_cell().contains("LR__"));
}

#[test]
fn test_variant_without_grid_reports_sentinel() {
    let (x, y) = create_dataset();
    let mut pipeliner = base_builder().build().unwrap();

    let options = RunOptions::new().with_caching_steps(["Scaler"]);
    let table = pipeliner.get_results(&x, Some(&y), &options, &mut NullLogSink).unwrap();

    for row in table.rows() {
        let result = row.outcome(Metric::Accuracy).and_then(|o| o.as_completed()).unwrap();
        match row.row.variant_for("Classifier") {
            Some("LR") => {
                assert_eq!(result.grid, GridOutcome::NotApplicable);
                assert_eq!(result.grid_mean_cell(), NOT_APPLICABLE);
                assert_eq!(result.grid_std_cell(), NOT_APPLICABLE);
                assert_eq!(result.grid_best_params_cell(), NOT_APPLICABLE);
            }
            Some("KNN") => {
                assert!(matches!(result.grid, GridOutcome::Tuned { .. }));
                assert_ne!(result.grid_mean_cell(), NOT_APPLICABLE);
            }
            other => panic!("unexpected classifier {:?}", other),
        }
        assert!(result.eval_mean.is_finite());
    }
}

#[test]
fn test_continue_on_error_records_failure() {
    let (x, y) = create_dataset();
    let build = || {
        Pipeliner::builder()
            .step(scaler_step())
            .step(
                Step::new("Classifier")
                    .with_variant("LR", LogisticRegression::new())
                    .with_variant("Broken", Broken),
            )
            .grid_cv(stratified(3))
            .eval_cv(stratified(4))
            .build()
            .unwrap()
    };
    let options = RunOptions::new().with_caching_steps(["Scaler"]);

    let err = build()
        .get_results(&x, Some(&y), &options, &mut NullLogSink)
        .unwrap_err();
    assert!(matches!(err, PipelinerError::EvaluationError(_)));

    let mut sink = MemoryLogSink::new();
    let table = build()
        .get_results(&x, Some(&y), &options.with_continue_on_error(true), &mut sink)
        .unwrap();
    assert_eq!(table.len(), 4);

    let failed: Vec<&ResultRow> = table
        .rows()
        .iter()
        .filter(|r| r.outcome(Metric::Accuracy).map_or(false, |o| o.is_failed()))
        .collect();
    assert_eq!(failed.len(), 2);
    for row in failed {
        assert_eq!(row.row.variant_for("Classifier"), Some("Broken"));
        match row.outcome(Metric::Accuracy) {
            Some(MetricOutcome::Failed { kind, .. }) => assert_eq!(kind, "evaluation"),
            other => panic!("expected failure, got {:?}", other),
        }
    }
    assert!(sink.contents().contains("singular design matrix"));
}

#[test]
fn test_log_records_every_row() {
    let (x, y) = create_dataset();
    let mut pipeliner = base_builder()
        .param_grid("LR", ParamGrid::new().with("C", vec![0.1, 1.0]))
        .build()
        .unwrap();
    let options = RunOptions::new()
        .with_caching_steps(["Scaler"])
        .with_metrics(vec![Metric::Accuracy, Metric::RocAuc]);

    let mut sink = MemoryLogSink::new();
    let table = pipeliner.get_results(&x, Some(&y), &options, &mut sink).unwrap();
    let log = sink.contents();

    assert!(log.starts_with("Line: 1/4\nScaler=MinMax, Classifier=LR\n"));
    for i in 1..=4 {
        assert!(log.contains(&format!("Line: {}/4\n", i)));
    }
    assert_eq!(log.matches("Got Features: ").count(), 4);
    assert_eq!(log.matches("Scoring: accuracy\n").count(), 4);
    assert_eq!(log.matches("Scoring: roc_auc\n").count(), 4);
    assert_eq!(log.matches("Grid Search: ").count(), 8);
    assert_eq!(log.matches("Scores mean: ").count(), 8);

    assert_eq!(table.columns().len(), 2 + 2 * 6);
    for i in 0..table.len() {
        assert_eq!(table.cells(i).unwrap().len(), table.columns().len());
    }
}

#[test]
fn test_row_transformer_step() {
    let (x, y) = create_dataset();
    let mut pipeliner = Pipeliner::builder()
        .step(Step::new("Features").with_variant(
            "pairwise",
            RowTransformer::new("pairwise", |row: ArrayView1<f64>| {
                Array1::from(vec![row[0], row[1], row[0] * row[1]])
            }),
        ))
        .step(scaler_step())
        .step(Step::new("Classifier").with_variant("KNN", KNNClassifier::with_k(3)))
        .grid_cv(stratified(3))
        .eval_cv(stratified(4))
        .build()
        .unwrap();

    let options = RunOptions::new().with_caching_steps(["Features", "Scaler"]);
    let table = pipeliner.get_results(&x, Some(&y), &options, &mut NullLogSink).unwrap();
    assert_eq!(table.len(), 2);

    let stats = pipeliner.cache_stats().unwrap();
    // The row transformer is shared by both rows
    assert_eq!(stats.hits, 1);
    assert_eq!(stats.misses, 3);
    assert!(pipeliner.best_params(&["KNN"], Metric::Accuracy).is_some());
}

#[test]
fn test_variant_names_are_plain_labels() {
    let (x, y) = create_dataset();
    let identity = FunctionTransformer::new("identity", |x: &Array2<f64>| Ok(x.clone()));
    let mut pipeliner = Pipeliner::builder()
        .step(Step::new("Pre").with_variant("default", identity))
        .step(
            Step::new("Classifier")
                .with_variant("default", KNNClassifier::with_k(3))
                .with_variant("knn__fast", KNNClassifier::with_k(3)),
        )
        .param_grid("knn__fast", ParamGrid::new().with("n_neighbors", vec![1i64, 3]))
        .grid_cv(stratified(3))
        .eval_cv(stratified(4))
        .build()
        .unwrap();

    let table = pipeliner
        .get_results(&x, Some(&y), &RunOptions::new(), &mut NullLogSink)
        .unwrap();
    assert_eq!(table.len(), 2);
    for row in table.rows() {
        let result = row.outcome(Metric::Accuracy).and_then(|o| o.as_completed()).unwrap();
        assert!(matches!(result.grid, GridOutcome::Tuned { .. }));
    }

    let shared = pipeliner.best_params(&["default", "default"], Metric::Accuracy).unwrap();
    assert!(shared.get("n_neighbors").is_some());
    let fast = pipeliner.best_params(&["default", "knn__fast"], Metric::Accuracy).unwrap();
    assert_eq!(fast.len(), 1);
    let k = fast.get("n_neighbors").and_then(|v| v.as_int()).unwrap();
    assert!(k == 1 || k == 3);
}

/// Accepts progress lines but refuses failure records
struct RefusingFailureSink(MemoryLogSink);

impl LogSink for RefusingFailureSink {
    fn append(&mut self, text: &str) -> Result<()> {
        if text.starts_with("Failed") {
            return Err(PipelinerError::IoError(std::io::Error::new(
                std::io::ErrorKind::Other,
                "disk full",
            )));
        }
        self.0.append(text)
    }
}

#[test]
fn test_failure_record_error_does_not_abort() {
    let (x, y) = create_dataset();
    let mut pipeliner = Pipeliner::builder()
        .step(scaler_step())
        .step(Step::new("Classifier").with_variant("Broken", Broken))
        .grid_cv(stratified(3))
        .eval_cv(stratified(4))
        .build()
        .unwrap();
    let options = RunOptions::new()
        .with_caching_steps(["Scaler"])
        .with_continue_on_error(true);

    let memory = MemoryLogSink::new();
    let mut sink = RefusingFailureSink(memory.clone());
    let table = pipeliner.get_results(&x, Some(&y), &options, &mut sink).unwrap();

    assert_eq!(table.len(), 2);
    assert!(table.rows().iter().all(|r| r.outcome(Metric::Accuracy).map_or(false, |o| o.is_failed())));
    assert!(memory.contents().contains("Line: 2/2"));
    assert!(!memory.contents().contains("Failed"));
}
