//! Feature contract plus the fitted scaler/oversampler/forest chain.
//!
//! Oversampling only happens while training. A fitted pipeline never resamples: at
//! prediction time a row goes through the contract check, the scaler (if any), then the
//! forest.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::balance::Smote;
use crate::config::{ForestParams, SmoteParams};
use crate::dataset::LabeledSet;
use crate::error::{EngineError, EngineResult};
use crate::forest::{CancelToken, RandomForest};
use crate::scaler::StandardScaler;
use crate::table::Table;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureContract {
    names: Vec<String>,
}

impl FeatureContract {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
        }
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn check_width(&self, row: &[f64]) -> EngineResult<()> {
        if row.len() != self.names.len() {
            return Err(EngineError::FeatureContract(format!(
                "expected {} features ({}), got {}",
                self.names.len(),
                self.names.join(", "),
                row.len()
            )));
        }
        Ok(())
    }

    /// Builds a row in contract order. Missing names fall back to `defaults`; names the
    /// contract does not know are rejected.
    pub fn row_from_named(
        &self,
        input: &BTreeMap<String, f64>,
        defaults: &BTreeMap<String, f64>,
    ) -> EngineResult<Vec<f64>> {
        if let Some(extra) = input.keys().find(|k| !self.names.contains(k)) {
            return Err(EngineError::FeatureContract(format!(
                "unknown feature `{extra}`"
            )));
        }
        self.names
            .iter()
            .map(|name| {
                input
                    .get(name)
                    .or_else(|| defaults.get(name))
                    .copied()
                    .ok_or_else(|| {
                        EngineError::FeatureContract(format!("no value or default for `{name}`"))
                    })
            })
            .collect()
    }

    pub fn matrix(&self, table: &Table) -> EngineResult<Vec<Vec<f64>>> {
        let names: Vec<&str> = self.names.iter().map(String::as_str).collect();
        table.require_columns(&names)?;
        (0..table.n_rows())
            .map(|row| {
                names
                    .iter()
                    .map(|&col| {
                        table.num(row, col).ok_or_else(|| {
                            EngineError::FeatureContract(format!(
                                "{}: row {row} column `{col}` is not numeric",
                                table.source_id()
                            ))
                        })
                    })
                    .collect()
            })
            .collect()
    }
}

#[derive(Debug, Clone)]
pub struct TrainSettings<'a> {
    pub forest: ForestParams,
    pub smote: SmoteParams,
    pub threads: usize,
    pub cancel: &'a CancelToken,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceSummary {
    pub real_rows: usize,
    pub synthetic_rows: usize,
    pub k_neighbors: usize,
    pub rows_per_class: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FittedPipeline {
    contract: FeatureContract,
    scaler: Option<StandardScaler>,
    forest: RandomForest,
    balance: BalanceSummary,
}

impl FittedPipeline {
    /// Scales `train` with the supplied (already fitted) scaler, oversamples it, then grows
    /// the forest. `class_names` is indexed by class code.
    pub fn train(
        contract: FeatureContract,
        scaler: Option<StandardScaler>,
        train: &LabeledSet,
        class_names: &[String],
        settings: &TrainSettings<'_>,
    ) -> EngineResult<Self> {
        if contract.is_empty() {
            return Err(EngineError::FeatureContract("no features to train on".to_string()));
        }
        if let Some(row) = train.features.first() {
            contract.check_width(row)?;
        }
        let scaled = match scaler.as_ref() {
            Some(s) => LabeledSet::new(s.transform(&train.features)?, train.labels.clone()),
            None => train.clone(),
        };

        let balanced = Smote::new(settings.smote).fit_resample(&scaled, class_names)?;
        if settings.cancel.is_cancelled() {
            return Err(EngineError::Cancelled);
        }
        let forest = RandomForest::fit(
            &balanced.set,
            class_names.len(),
            &settings.forest,
            settings.threads,
            settings.cancel,
        )?;

        Ok(Self {
            contract,
            scaler,
            forest,
            balance: BalanceSummary {
                real_rows: balanced.set.len() - balanced.synthetic_rows,
                synthetic_rows: balanced.synthetic_rows,
                k_neighbors: balanced.k_used,
                rows_per_class: balanced.target_count,
            },
        })
    }

    pub fn contract(&self) -> &FeatureContract {
        &self.contract
    }

    pub fn scaler(&self) -> Option<&StandardScaler> {
        self.scaler.as_ref()
    }

    pub fn forest(&self) -> &RandomForest {
        &self.forest
    }

    pub fn balance(&self) -> BalanceSummary {
        self.balance
    }

    pub fn predict_proba(&self, row: &[f64]) -> EngineResult<Vec<f64>> {
        self.contract.check_width(row)?;
        let prepared = match self.scaler.as_ref() {
            Some(s) => s.transform_row(row)?,
            None => row.to_vec(),
        };
        Ok(self.forest.predict_proba(&prepared))
    }

    pub fn predict(&self, row: &[f64]) -> EngineResult<usize> {
        Ok(crate::forest::argmax(&self.predict_proba(row)?))
    }

    pub fn predict_many(&self, rows: &[Vec<f64>]) -> EngineResult<Vec<usize>> {
        rows.iter().map(|r| self.predict(r)).collect()
    }

    pub fn ranked_importances(&self) -> Vec<(String, f64)> {
        let mut ranked: Vec<(String, f64)> = self
            .contract
            .names()
            .iter()
            .cloned()
            .zip(self.forest.feature_importances().iter().copied())
            .collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        ranked
    }
}
