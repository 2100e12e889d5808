use std::path::PathBuf;

use tactical_intel::config::EngineConfig;
use tactical_intel::error::EngineError;
use tactical_intel::forest::CancelToken;
use tactical_intel::formation::{FEATURES, FormationModel};
use tactical_intel::source::{DataSource, FileSource};
use tactical_intel::table::{Cell, Table};

fn fixture(name: &str) -> PathBuf {
    let mut path = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    path.push("tests");
    path.push("fixtures");
    path.push(name);
    path
}

fn train_fixture() -> FormationModel {
    let table = FileSource::new(fixture("formations.csv"))
        .load()
        .expect("fixture should load");
    FormationModel::train(&table, &EngineConfig::default(), &CancelToken::new())
        .expect("fixture should train")
}

#[test]
fn fixture_trains_and_reports_what_was_dropped() {
    let model = train_fixture();
    let report = model.report().unwrap();

    assert_eq!(report.rows_loaded, 86);
    // "abandoned" has no leading digits.
    assert_eq!(report.dropped_rows.len(), 1);
    assert!(report.dropped_rows[0].contains("abandoned"));
    // 3-4-3 won exactly once.
    assert_eq!(report.dropped_classes.len(), 1);
    assert!(report.dropped_classes[0].starts_with("3-4-3"));
    assert_eq!(report.rows_used, 84);
    assert_eq!(report.train_rows + report.test_rows, 84);
    assert_eq!(report.feature_importances.len(), FEATURES.len());
}

#[test]
fn sanitized_labels_share_one_code() {
    let model = train_fixture();
    let winners = model.winning_encoder().classes();
    // "4-3-3 " and "4-3-3" collapse into one class.
    assert_eq!(winners.iter().filter(|c| c.starts_with("4-3-3")).count(), 1);
    assert!(winners.iter().all(|c| c.trim() == c));
}

#[test]
fn trained_formations_are_sorted_opponent_shapes() {
    let model = train_fixture();
    assert_eq!(
        model.trained_formations(),
        ["3-5-2", "4-2-3-1", "4-3-3", "4-4-2", "5-3-2"]
    );
}

#[test]
fn counter_is_a_retained_winning_formation() {
    let model = train_fixture();
    let retained = ["3-5-2", "4-2-3-1", "4-3-3", "4-4-2"];
    for opponent in model.trained_formations() {
        let counter = model.predict_one(opponent).unwrap();
        assert!(retained.contains(&counter.as_str()), "{counter}");
    }
    // Surrounding whitespace is stripped before encoding.
    assert_eq!(
        model.predict_one(" 4-4-2 ").unwrap(),
        model.predict_one("4-4-2").unwrap()
    );

    let ranked = model.ranked_counters("4-4-2").unwrap();
    assert_eq!(ranked[0].0, model.predict_one("4-4-2").unwrap());
    assert!(ranked.iter().all(|(name, _)| name != "3-4-3"));
}

#[test]
fn unknown_opponent_is_an_error_not_a_guess() {
    let model = train_fixture();
    let err = model.predict_one("2-3-5").unwrap_err();
    assert!(matches!(
        err,
        EngineError::UnknownLabel {
            space: "losing formation",
            ..
        }
    ));
    assert!(err.is_structural());
}

#[test]
fn typical_values_fill_everything_but_the_opponent() {
    let model = train_fixture();
    let typical = model.typical_values();
    assert_eq!(typical.len(), FEATURES.len() - 1);
    assert!(!typical.contains_key("losing_formation"));
    let row = model.input_row("4-4-2").unwrap();
    assert_eq!(row[1], typical["winning_goals"]);
    assert_eq!(row.len(), FEATURES.len());
}

#[test]
fn same_seed_same_predictions() {
    let a = train_fixture();
    let b = train_fixture();
    let held_out = a.held_out().features.clone();
    assert_eq!(
        a.predict_batch(&held_out).unwrap(),
        b.predict_batch(&held_out).unwrap()
    );
    assert_eq!(a.evaluate().unwrap(), b.evaluate().unwrap());
}

#[test]
fn batch_prediction_checks_feature_width() {
    let model = train_fixture();
    let err = model.predict_batch(&[vec![0.0; 3]]).unwrap_err();
    assert!(matches!(err, EngineError::FeatureContract(_)));
    assert!(model.predict_batch(&[]).unwrap().is_empty());
}

#[test]
fn missing_required_column_fails_at_load() {
    let mut t = Table::new(
        "broken.csv",
        vec![
            "Winning Team Formation".to_string(),
            "Winning Team Goals".to_string(),
        ],
    );
    t.push_row(vec![Cell::parse("4-4-2"), Cell::Num(1.0)])
        .unwrap();
    let err = FormationModel::train(&t, &EngineConfig::default(), &CancelToken::new()).unwrap_err();
    assert!(matches!(err, EngineError::MissingColumn { .. }));
}

#[test]
fn cancelled_training_produces_no_model() {
    let table = FileSource::new(fixture("formations.csv")).load().unwrap();
    let cancel = CancelToken::new();
    cancel.cancel();
    let err = FormationModel::train(&table, &EngineConfig::default(), &cancel).unwrap_err();
    assert!(matches!(err, EngineError::Cancelled));
}
