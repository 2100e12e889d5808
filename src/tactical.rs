//! Tactic classifier. Historical team-match statistics are clustered into style
//! archetypes, then a forest learns to name the archetype of a new stat line.

use std::collections::BTreeMap;

use crate::balance::drop_rare_classes;
use crate::cache::DatasetKey;
use crate::cluster::{ARCHETYPE_NAMES, ClusterProfile, StyleClustering};
use crate::config::EngineConfig;
use crate::dataset::{LabeledSet, median, stratified_split};
use crate::encoder::{LabelEncoder, Tactic};
use crate::error::{DivisionGuardWarning, EngineError, EngineResult};
use crate::evaluate::ClassificationReport;
use crate::features::{apply_derived_ratios, derive_tactical_columns};
use crate::formation::describe_dropped;
use crate::forest::CancelToken;
use crate::normalize::{DroppedRow, NormalizeSpec, normalize};
use crate::pipeline::{FeatureContract, FittedPipeline, TrainSettings};
use crate::report_export::{ModelReport, timestamp_now};
use crate::schema::{TACTICAL_SCHEMA, tactical as col};
use crate::table::{Cell, Table};

const DROP_COLUMNS: [&str; 6] = [
    col::MATCH_ID,
    col::COMPETITION,
    col::SEASON,
    col::TEAM,
    col::COUNTER_ATTACKS,
    col::SUCCESSFUL_PASSES,
];

#[derive(Debug, Clone)]
pub struct PreparedTactics {
    pub table: Table,
    pub contract: FeatureContract,
    pub features: Vec<Vec<f64>>,
    pub dropped_rows: Vec<DroppedRow>,
    pub warnings: Vec<DivisionGuardWarning>,
}

/// Resolves, cleans and derives the tactical table. Every remaining numeric column
/// becomes a feature, in table order.
pub fn prepare(raw: &Table) -> EngineResult<PreparedTactics> {
    let resolved = TACTICAL_SCHEMA.resolve(raw)?;
    let normalized = normalize(
        &resolved,
        &NormalizeSpec {
            drop_columns: &DROP_COLUMNS,
            text_columns: &[],
            leading_int_columns: &[],
            numeric_columns: &[],
            numeric_fill: 0.0,
        },
    );
    let (table, warnings) = derive_tactical_columns(&normalized.table);

    let required = TACTICAL_SCHEMA.required();
    let mut names = Vec::new();
    for (idx, column) in table.columns().iter().enumerate() {
        let numeric = table
            .rows()
            .iter()
            .all(|r| !matches!(r[idx], Cell::Text(_)));
        if numeric || required.contains(&column.as_str()) {
            names.push(column.clone());
        } else {
            log::warn!(
                "{}: ignoring non-numeric column `{}`",
                table.source_id(),
                column
            );
        }
    }
    let contract = FeatureContract::new(names);
    let features = contract.matrix(&table)?;

    Ok(PreparedTactics {
        table,
        contract,
        features,
        dropped_rows: normalized.dropped_rows,
        warnings,
    })
}

#[derive(Debug, Clone, PartialEq)]
pub struct TacticPrediction {
    pub archetype: String,
    pub warnings: Vec<DivisionGuardWarning>,
}

#[derive(Debug, Clone)]
pub struct TacticalModel {
    key: DatasetKey,
    rows_loaded: usize,
    tactics: LabelEncoder<Tactic>,
    pipeline: FittedPipeline,
    defaults: BTreeMap<String, f64>,
    clusters: Vec<ClusterProfile>,
    rows_used: usize,
    train_rows: usize,
    test: LabeledSet,
    dropped_rows: Vec<DroppedRow>,
    dropped_classes: Vec<String>,
    warnings: Vec<DivisionGuardWarning>,
}

impl TacticalModel {
    pub fn train(raw: &Table, config: &EngineConfig, cancel: &CancelToken) -> EngineResult<Self> {
        let prepared = prepare(raw)?;
        if prepared.features.is_empty() {
            return Err(EngineError::insufficient(
                "tactic training",
                format!("{} has no usable rows", raw.source_id()),
            ));
        }

        // The scaler fitted here is the one the trained pipeline replays at inference.
        let clustering = StyleClustering::fit(&prepared.features, config.clustering)?;
        let clusters = clustering.profiles(prepared.contract.names());
        let archetypes = clustering.labels();

        let tactics = LabelEncoder::<Tactic>::fit(ARCHETYPE_NAMES);
        let targets = tactics.encode_all(&archetypes)?;
        let class_names = tactics.classes().to_vec();
        let full = LabeledSet::new(prepared.features.clone(), targets);

        let (retained, dropped) = drop_rare_classes(&full, &class_names);
        let split = stratified_split(&retained, config.test_ratio, config.split_seed);

        let settings = TrainSettings {
            forest: config.tactic_forest,
            smote: config.tactic_smote,
            threads: config.train_threads,
            cancel,
        };
        let pipeline = FittedPipeline::train(
            prepared.contract.clone(),
            Some(clustering.scaler),
            &split.train,
            &class_names,
            &settings,
        )?;

        let defaults = prepared
            .contract
            .names()
            .iter()
            .enumerate()
            .map(|(i, name)| {
                let values: Vec<f64> = prepared.features.iter().map(|r| r[i]).collect();
                (name.clone(), median(&values))
            })
            .collect();

        log::info!(
            "tactic model: {} rows, {} features, {} archetypes",
            retained.len(),
            prepared.contract.len(),
            retained.class_counts().len()
        );

        Ok(Self {
            key: DatasetKey::of(raw),
            rows_loaded: raw.n_rows(),
            tactics,
            pipeline,
            defaults,
            clusters,
            rows_used: retained.len(),
            train_rows: split.train.len(),
            test: split.test,
            dropped_rows: prepared.dropped_rows,
            dropped_classes: dropped
                .iter()
                .map(|d| format!("{} ({} row)", d.name, d.count))
                .collect(),
            warnings: prepared.warnings,
        })
    }

    pub fn key(&self) -> &DatasetKey {
        &self.key
    }

    pub fn feature_names(&self) -> &[String] {
        self.pipeline.contract().names()
    }

    pub fn input_defaults(&self) -> &BTreeMap<String, f64> {
        &self.defaults
    }

    pub fn clusters(&self) -> &[ClusterProfile] {
        &self.clusters
    }

    pub fn pipeline(&self) -> &FittedPipeline {
        &self.pipeline
    }

    /// Classifies a partially specified stat line. Missing features take their median;
    /// the two ratio features are always recomputed from their source columns.
    pub fn predict_one(&self, input: &BTreeMap<String, f64>) -> EngineResult<TacticPrediction> {
        let contract = self.pipeline.contract();
        let mut merged = self.defaults.clone();
        for (name, value) in input {
            if !contract.names().contains(name) {
                return Err(EngineError::FeatureContract(format!(
                    "unknown feature `{name}`"
                )));
            }
            merged.insert(name.clone(), *value);
        }
        let warnings = apply_derived_ratios(&mut merged);
        let row = contract.row_from_named(&merged, &self.defaults)?;
        let code = self.pipeline.predict(&row)?;
        Ok(TacticPrediction {
            archetype: self.tactics.decode(code)?.to_string(),
            warnings,
        })
    }

    pub fn predict_batch(&self, rows: &[Vec<f64>]) -> EngineResult<Vec<String>> {
        let codes = self.pipeline.predict_many(rows)?;
        self.tactics.decode_all(&codes)
    }

    pub fn held_out(&self) -> &LabeledSet {
        &self.test
    }

    pub fn evaluate(&self) -> EngineResult<ClassificationReport> {
        let predicted = self.pipeline.predict_many(&self.test.features)?;
        Ok(ClassificationReport::from_codes(
            &self.test.labels,
            &predicted,
            self.tactics.classes(),
        ))
    }

    pub fn report(&self) -> EngineResult<ModelReport> {
        Ok(ModelReport {
            model: "tactic".to_string(),
            generated_at: timestamp_now(),
            dataset: self.key.to_string(),
            rows_loaded: self.rows_loaded,
            rows_used: self.rows_used,
            train_rows: self.train_rows,
            test_rows: self.test.len(),
            dropped_rows: describe_dropped(&self.dropped_rows),
            dropped_classes: self.dropped_classes.clone(),
            warnings: self.warnings.iter().map(ToString::to_string).collect(),
            balance: self.pipeline.balance(),
            feature_importances: self.pipeline.ranked_importances(),
            clusters: self.clusters.clone(),
            metrics: self.evaluate()?,
        })
    }
}
