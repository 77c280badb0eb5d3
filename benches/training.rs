use churnflow::drift::check_drift;
use churnflow::preprocessing::{FeatureEngineer, LabelEncoder, Preprocessor};
use churnflow::training::{ChurnModel, GradientBoostingConfig, InferencePipeline, ModelSpec, RandomForestParams};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use polars::prelude::*;
use rand::prelude::*;
use rand::rngs::StdRng;

fn create_churn_data(n_rows: usize, n_features: usize, seed: u64) -> DataFrame {
    let mut rng = StdRng::seed_from_u64(seed);

    let features: Vec<Vec<f64>> = (0..n_features)
        .map(|_| (0..n_rows).map(|_| rng.gen::<f64>() * 10.0).collect())
        .collect();

    // Churn when the first two features are small, with some noise
    let labels: Vec<&str> = (0..n_rows)
        .map(|i| {
            if features[0][i] + features[1][i] + rng.gen::<f64>() * 2.0 < 8.0 {
                "churn"
            } else {
                "stay"
            }
        })
        .collect();

    let mut columns: Vec<Column> = features
        .into_iter()
        .enumerate()
        .map(|(i, values)| Column::new(format!("feature_{}", i).into(), values))
        .collect();
    columns.push(Column::new("label".into(), labels));
    DataFrame::new(columns).unwrap()
}

fn preprocessor() -> Preprocessor {
    Preprocessor::new("label", LabelEncoder::new("churn", "stay"), FeatureEngineer::default())
}

fn bench_fit(c: &mut Criterion) {
    let mut group = c.benchmark_group("fit");
    group.sample_size(10);

    let specs = [
        ("gradient_boosted", ModelSpec::GradientBoosted(GradientBoostingConfig::default())),
        (
            "random_forest",
            ModelSpec::RandomForest(RandomForestParams {
                n_estimators: 50,
                ..Default::default()
            }),
        ),
    ];

    for n_rows in [1000, 5000].iter() {
        let df = create_churn_data(*n_rows, 10, 1);
        let (x, y) = preprocessor().fit_transform(&df).unwrap();

        for (name, spec) in &specs {
            group.bench_with_input(BenchmarkId::new(*name, n_rows), &(&x, &y), |b, (x, y)| {
                b.iter(|| ChurnModel::fit(spec, black_box(x), black_box(y)).unwrap())
            });
        }
    }

    group.finish();
}

fn bench_prediction(c: &mut Criterion) {
    let mut group = c.benchmark_group("predict_proba");

    let train = create_churn_data(5000, 10, 2);
    let mut pre = preprocessor();
    let (x, y) = pre.fit_transform(&train).unwrap();
    let model = ChurnModel::fit(&ModelSpec::default(), &x, &y).unwrap();
    let pipeline = InferencePipeline::new(pre, model);

    for n_rows in [100, 1000, 10000].iter() {
        let df = create_churn_data(*n_rows, 10, 3).drop("label").unwrap();
        group.bench_with_input(BenchmarkId::new("raw_rows", n_rows), &df, |b, df| {
            b.iter(|| pipeline.predict_proba(black_box(df)).unwrap())
        });
    }

    group.finish();
}

fn bench_drift(c: &mut Criterion) {
    let mut group = c.benchmark_group("drift");

    let reference = create_churn_data(10000, 10, 4).drop("label").unwrap();
    for n_rows in [100, 1000, 10000].iter() {
        let current = create_churn_data(*n_rows, 10, 5).drop("label").unwrap();
        group.bench_with_input(BenchmarkId::new("check", n_rows), &current, |b, current| {
            b.iter(|| check_drift(black_box(&reference), black_box(current), 0.05).unwrap())
        });
    }

    group.finish();
}

criterion_group!(benches, bench_fit, bench_prediction, bench_drift);
criterion_main!(benches);
