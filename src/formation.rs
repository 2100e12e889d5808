//! Counter-formation recommender: given the formation an opponent lines up in, predict
//! the formation that historically beat it.
//!
//! The opponent's shape is the losing side of each historical match and the answer is
//! the winning side, so the two are encoded through separate vocabularies.

use std::collections::{BTreeMap, BTreeSet};

use crate::balance::drop_rare_classes;
use crate::cache::DatasetKey;
use crate::config::EngineConfig;
use crate::dataset::{LabeledSet, median, stratified_split};
use crate::encoder::{LabelEncoder, LosingFormation, WinningFormation};
use crate::error::{EngineError, EngineResult};
use crate::evaluate::ClassificationReport;
use crate::features::derive_formation_columns;
use crate::forest::CancelToken;
use crate::normalize::{DroppedRow, NormalizeSpec, normalize, sanitize_label};
use crate::pipeline::{FeatureContract, FittedPipeline, TrainSettings};
use crate::report_export::{ModelReport, timestamp_now};
use crate::schema::{FORMATION_SCHEMA, formation as col};
use crate::table::Table;

/// Model input order. The first feature is the losing-side formation code.
pub const FEATURES: [&str; 9] = [
    col::LOSING_FORMATION,
    col::WINNING_GOALS,
    col::LOSING_GOALS,
    col::WINNING_XG,
    col::LOSING_XG,
    col::GOAL_DIFF,
    col::XG_DIFF,
    col::CLOSE_GAME,
    col::TOTAL_GOALS,
];

const DROP_COLUMNS: [&str; 3] = [col::OPPONENT, col::RESULT, col::WINNING_TEAM];

fn normalize_spec() -> NormalizeSpec<'static> {
    NormalizeSpec {
        drop_columns: &DROP_COLUMNS,
        text_columns: &[col::WINNING_FORMATION, col::LOSING_FORMATION],
        leading_int_columns: &[col::WINNING_GOALS, col::LOSING_GOALS],
        numeric_columns: &[col::WINNING_XG, col::LOSING_XG],
        numeric_fill: 0.0,
    }
}

#[derive(Debug, Clone)]
pub struct PreparedFormations {
    pub table: Table,
    pub dropped_rows: Vec<DroppedRow>,
    pub winning: LabelEncoder<WinningFormation>,
    pub losing: LabelEncoder<LosingFormation>,
    pub set: LabeledSet,
}

pub fn prepare(raw: &Table) -> EngineResult<PreparedFormations> {
    let resolved = FORMATION_SCHEMA.resolve(raw)?;
    let normalized = normalize(&resolved, &normalize_spec());
    let table = derive_formation_columns(&normalized.table)?;
    if table.is_empty() {
        return Err(EngineError::insufficient(
            "formation training",
            format!("{} has no usable rows", raw.source_id()),
        ));
    }

    let winning_labels = text_column(&table, col::WINNING_FORMATION);
    let losing_labels = text_column(&table, col::LOSING_FORMATION);
    let winning = LabelEncoder::<WinningFormation>::fit(&winning_labels);
    let losing = LabelEncoder::<LosingFormation>::fit(&losing_labels);

    let targets = winning.encode_all(&winning_labels)?;
    let opponent_codes = losing.encode_all(&losing_labels)?;
    let mut features = Vec::with_capacity(table.n_rows());
    for (row, code) in opponent_codes.iter().enumerate() {
        let mut values = Vec::with_capacity(FEATURES.len());
        values.push(*code as f64);
        for name in &FEATURES[1..] {
            values.push(table.num(row, name).unwrap_or(0.0));
        }
        features.push(values);
    }

    Ok(PreparedFormations {
        table,
        dropped_rows: normalized.dropped_rows,
        winning,
        losing,
        set: LabeledSet::new(features, targets),
    })
}

fn text_column(table: &Table, column: &str) -> Vec<String> {
    (0..table.n_rows())
        .map(|row| table.text(row, column).unwrap_or_default())
        .collect()
}

#[derive(Debug, Clone)]
pub struct FormationModel {
    key: DatasetKey,
    rows_loaded: usize,
    winning: LabelEncoder<WinningFormation>,
    losing: LabelEncoder<LosingFormation>,
    pipeline: FittedPipeline,
    typical: BTreeMap<String, f64>,
    trained_formations: Vec<String>,
    rows_used: usize,
    train_rows: usize,
    test: LabeledSet,
    dropped_rows: Vec<DroppedRow>,
    dropped_classes: Vec<String>,
}

impl FormationModel {
    pub fn train(raw: &Table, config: &EngineConfig, cancel: &CancelToken) -> EngineResult<Self> {
        let prepared = prepare(raw)?;
        let class_names = prepared.winning.classes().to_vec();

        let (retained, dropped) = drop_rare_classes(&prepared.set, &class_names);
        let split = stratified_split(&retained, config.test_ratio, config.split_seed);

        let settings = TrainSettings {
            forest: config.formation_forest,
            smote: config.formation_smote,
            threads: config.train_threads,
            cancel,
        };
        let pipeline = FittedPipeline::train(
            FeatureContract::new(FEATURES),
            None,
            &split.train,
            &class_names,
            &settings,
        )?;

        // "Typical game" values for everything the caller does not supply.
        let mut typical = BTreeMap::new();
        for (i, name) in FEATURES.iter().enumerate().skip(1) {
            let values: Vec<f64> = prepared.set.features.iter().map(|r| r[i]).collect();
            typical.insert(name.to_string(), median(&values));
        }

        let trained_formations: Vec<String> = retained
            .features
            .iter()
            .filter_map(|r| prepared.losing.decode(r[0] as usize).ok())
            .map(str::to_string)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        log::info!(
            "formation model: {} rows, {} winning classes, {} opponent formations",
            retained.len(),
            retained.class_counts().len(),
            trained_formations.len()
        );

        Ok(Self {
            key: DatasetKey::of(raw),
            rows_loaded: raw.n_rows(),
            winning: prepared.winning,
            losing: prepared.losing,
            pipeline,
            typical,
            trained_formations,
            rows_used: retained.len(),
            train_rows: split.train.len(),
            test: split.test,
            dropped_rows: prepared.dropped_rows,
            dropped_classes: dropped
                .iter()
                .map(|d| format!("{} ({} row)", d.name, d.count))
                .collect(),
        })
    }

    pub fn key(&self) -> &DatasetKey {
        &self.key
    }

    pub fn trained_formations(&self) -> &[String] {
        &self.trained_formations
    }

    pub fn typical_values(&self) -> &BTreeMap<String, f64> {
        &self.typical
    }

    pub fn winning_encoder(&self) -> &LabelEncoder<WinningFormation> {
        &self.winning
    }

    pub fn pipeline(&self) -> &FittedPipeline {
        &self.pipeline
    }

    pub fn input_row(&self, opponent: &str) -> EngineResult<Vec<f64>> {
        let code = self.losing.encode(&sanitize_label(opponent))?;
        let mut row = Vec::with_capacity(FEATURES.len());
        row.push(code as f64);
        for name in &FEATURES[1..] {
            row.push(self.typical.get(*name).copied().unwrap_or(0.0));
        }
        Ok(row)
    }

    /// Recommended counter to `opponent`. Unknown formations are an error, never a guess.
    pub fn predict_one(&self, opponent: &str) -> EngineResult<String> {
        let row = self.input_row(opponent)?;
        let code = self.pipeline.predict(&row)?;
        Ok(self.winning.decode(code)?.to_string())
    }

    pub fn ranked_counters(&self, opponent: &str) -> EngineResult<Vec<(String, f64)>> {
        let row = self.input_row(opponent)?;
        let proba = self.pipeline.predict_proba(&row)?;
        let mut ranked: Vec<(String, f64)> = self
            .winning
            .classes()
            .iter()
            .cloned()
            .zip(proba)
            .filter(|(_, p)| *p > 0.0)
            .collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        Ok(ranked)
    }

    pub fn predict_batch(&self, rows: &[Vec<f64>]) -> EngineResult<Vec<String>> {
        let codes = self.pipeline.predict_many(rows)?;
        self.winning.decode_all(&codes)
    }

    pub fn held_out(&self) -> &LabeledSet {
        &self.test
    }

    pub fn evaluate(&self) -> EngineResult<ClassificationReport> {
        let predicted = self.pipeline.predict_many(&self.test.features)?;
        Ok(ClassificationReport::from_codes(
            &self.test.labels,
            &predicted,
            self.winning.classes(),
        ))
    }

    pub fn report(&self) -> EngineResult<ModelReport> {
        Ok(ModelReport {
            model: "formation counter".to_string(),
            generated_at: timestamp_now(),
            dataset: self.key.to_string(),
            rows_loaded: self.rows_loaded,
            rows_used: self.rows_used,
            train_rows: self.train_rows,
            test_rows: self.test.len(),
            dropped_rows: describe_dropped(&self.dropped_rows),
            dropped_classes: self.dropped_classes.clone(),
            warnings: Vec::new(),
            balance: self.pipeline.balance(),
            feature_importances: self.pipeline.ranked_importances(),
            clusters: Vec::new(),
            metrics: self.evaluate()?,
        })
    }
}

pub(crate) fn describe_dropped(rows: &[DroppedRow]) -> Vec<String> {
    rows.iter()
        .map(|d| format!("row {}: {} = {:?} ({:?})", d.row, d.column, d.raw, d.reason))
        .collect()
}
