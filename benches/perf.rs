use criterion::{Criterion, criterion_group, criterion_main};
use std::hint::black_box;

use tactical_intel::cluster::KMeans;
use tactical_intel::config::{EngineConfig, SmoteParams};
use tactical_intel::balance::Smote;
use tactical_intel::dataset::LabeledSet;
use tactical_intel::forest::{CancelToken, RandomForest};
use tactical_intel::source::parse_csv;
use tactical_intel::tactical::TacticalModel;

fn synthetic_set(rows: usize, features: usize, classes: usize) -> LabeledSet {
    let mut set = LabeledSet::default();
    for i in 0..rows {
        let class = i % classes;
        let row = (0..features)
            .map(|f| class as f64 * 3.0 + ((i * 7 + f * 13) % 11) as f64 * 0.1)
            .collect();
        set.push(row, class);
    }
    set
}

fn bench_forest_fit(c: &mut Criterion) {
    let set = synthetic_set(300, 9, 4);
    let params = EngineConfig::default().formation_forest;
    let cancel = CancelToken::new();
    c.bench_function("forest_fit_100_trees", |b| {
        b.iter(|| {
            let forest = RandomForest::fit(black_box(&set), 4, &params, 4, &cancel).unwrap();
            black_box(forest.n_trees());
        })
    });
}

fn bench_forest_predict(c: &mut Criterion) {
    let set = synthetic_set(300, 9, 4);
    let params = EngineConfig::default().formation_forest;
    let forest = RandomForest::fit(&set, 4, &params, 4, &CancelToken::new()).unwrap();
    c.bench_function("forest_predict_300_rows", |b| {
        b.iter(|| {
            let hits = set
                .features
                .iter()
                .filter(|row| forest.predict(black_box(row)) < 4)
                .count();
            black_box(hits);
        })
    });
}

fn bench_kmeans(c: &mut Criterion) {
    let set = synthetic_set(500, 8, 5);
    let params = EngineConfig::default().clustering;
    c.bench_function("kmeans_500x8_k5", |b| {
        b.iter(|| {
            let (model, _) = KMeans::new(5, params).fit(black_box(&set.features)).unwrap();
            black_box(model.iterations);
        })
    });
}

fn bench_smote(c: &mut Criterion) {
    let mut set = synthetic_set(400, 8, 2);
    for i in 0..20 {
        set.push(vec![50.0 + i as f64; 8], 2);
    }
    let names = vec!["a".to_string(), "b".to_string(), "c".to_string()];
    let smote = Smote::new(SmoteParams {
        k_neighbors: 5,
        seed: 42,
    });
    c.bench_function("smote_minority_topup", |b| {
        b.iter(|| {
            let balanced = smote.fit_resample(black_box(&set), &names).unwrap();
            black_box(balanced.synthetic_rows);
        })
    });
}

fn bench_tactic_train(c: &mut Criterion) {
    let table = parse_csv("tactics.csv", TACTICS_CSV.as_bytes()).unwrap();
    let cfg = EngineConfig::default();
    let cancel = CancelToken::new();
    c.bench_function("tactic_model_train", |b| {
        b.iter(|| {
            let model = TacticalModel::train(black_box(&table), &cfg, &cancel).unwrap();
            black_box(model.clusters().len());
        })
    });
}

criterion_group!(
    perf,
    bench_forest_fit,
    bench_forest_predict,
    bench_kmeans,
    bench_smote,
    bench_tactic_train
);
criterion_main!(perf);

static TACTICS_CSV: &str = include_str!("../tests/fixtures/tactics.csv");
