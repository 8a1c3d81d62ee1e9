use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use kolosal_pipeliner::prelude::*;
use ndarray::{Array1, Array2};
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;

fn create_classification_data(n_rows: usize, n_features: usize) -> (Array2<f64>, Array1<f64>) {
    let mut rng = ChaCha8Rng::seed_from_u64(42);

    let y: Array1<f64> = (0..n_rows).map(|i| (i % 2) as f64).collect();
    let x = Array2::from_shape_fn((n_rows, n_features), |(i, j)| {
        y[i] * (j as f64 + 1.0) + rng.gen::<f64>() * 2.0
    });
    (x, y)
}

fn build_pipeliner() -> Pipeliner {
    let cv = || CrossValidator::new(CVStrategy::StratifiedKFold { n_splits: 3, shuffle: false });

    Pipeliner::builder()
        .step(
            Step::new("Scaler")
                .with_variant("MinMax", Scaler::new(ScalerType::MinMax))
                .with_variant("Standard", Scaler::new(ScalerType::Standard))
                .with_variant("Robust", Scaler::new(ScalerType::Robust)),
        )
        .step(
            Step::new("Classifier")
                .with_variant("LR", LogisticRegression::new())
                .with_variant("KNN", KNNClassifier::with_k(5)),
        )
        .param_grid("LR", ParamGrid::new().with("C", vec![0.1, 1.0, 10.0]))
        .grid_cv(cv())
        .eval_cv(cv())
        .build()
        .expect("valid pipeliner")
}

fn bench_get_results(c: &mut Criterion) {
    let mut group = c.benchmark_group("get_results");
    group.sample_size(10);

    for n_rows in [200, 1000].iter() {
        let (x, y) = create_classification_data(*n_rows, 8);

        group.bench_with_input(BenchmarkId::new("cached", n_rows), n_rows, |b, _| {
            let options = RunOptions::new().with_caching_steps(["Scaler"]);
            b.iter(|| {
                let mut pipeliner = build_pipeliner();
                black_box(pipeliner.get_results(&x, Some(&y), &options, &mut NullLogSink).unwrap())
            });
        });

        group.bench_with_input(BenchmarkId::new("uncached", n_rows), n_rows, |b, _| {
            let options = RunOptions::new();
            b.iter(|| {
                let mut pipeliner = build_pipeliner();
                black_box(pipeliner.get_results(&x, Some(&y), &options, &mut NullLogSink).unwrap())
            });
        });
    }

    group.finish();
}

fn bench_plan(c: &mut Criterion) {
    c.bench_function("plan_build", |b| {
        b.iter(|| {
            let mut builder = Pipeliner::builder();
            for s in 0..4 {
                let mut step = Step::new(format!("Step{}", s));
                for v in 0..4 {
                    step = step.with_variant(format!("S{}V{}", s, v), Scaler::new(ScalerType::MaxAbs));
                }
                builder = builder.step(step);
            }
            let pipeliner = builder.banned_combo("S0V0", "S1V1").build().unwrap();
            black_box(pipeliner.plan().len())
        });
    });
}

criterion_group!(benches, bench_get_results, bench_plan);
criterion_main!(benches);
