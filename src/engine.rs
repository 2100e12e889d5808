//! Per-session entry point: loads datasets through a [`DataSource`] and memoizes the
//! models trained on them.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::cache::{DatasetKey, ModelCache};
use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::forest::CancelToken;
use crate::formation::FormationModel;
use crate::source::DataSource;
use crate::tactical::{TacticPrediction, TacticalModel};

pub struct Session {
    config: EngineConfig,
    cancel: CancelToken,
    formations: ModelCache<FormationModel>,
    tactics: ModelCache<TacticalModel>,
}

impl Session {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            cancel: CancelToken::new(),
            formations: ModelCache::new(),
            tactics: ModelCache::new(),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Token that aborts the training request in flight, or the next one if none is
    /// running. It is cleared once that request finishes.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn formation_model(&self, source: &dyn DataSource) -> EngineResult<Arc<FormationModel>> {
        let table = source.load()?;
        let key = DatasetKey::of(&table);
        self.formations.get_or_train(&key, || {
            self.finish_request(FormationModel::train(&table, &self.config, &self.cancel))
        })
    }

    pub fn tactic_model(&self, source: &dyn DataSource) -> EngineResult<Arc<TacticalModel>> {
        let table = source.load()?;
        let key = DatasetKey::of(&table);
        self.tactics.get_or_train(&key, || {
            self.finish_request(TacticalModel::train(&table, &self.config, &self.cancel))
        })
    }

    fn finish_request<M>(&self, trained: EngineResult<M>) -> EngineResult<M> {
        if self.cancel.is_cancelled() {
            self.cancel.reset();
            log::info!("training request cancelled");
        }
        trained
    }

    /// Formations the recommender can be asked about. An unreachable source reads as an
    /// empty list; structural problems still surface.
    pub fn formation_options(&self, source: &dyn DataSource) -> EngineResult<Vec<String>> {
        match self.formation_model(source) {
            Ok(model) => Ok(model.trained_formations().to_vec()),
            Err(err @ EngineError::DataLoad { .. }) => {
                log::warn!("{err}; no formations available");
                Ok(Vec::new())
            }
            Err(err) => Err(err),
        }
    }

    pub fn recommend_counter(&self, source: &dyn DataSource, opponent: &str) -> EngineResult<String> {
        self.formation_model(source)?.predict_one(opponent)
    }

    pub fn classify_tactic(
        &self,
        source: &dyn DataSource,
        input: &BTreeMap<String, f64>,
    ) -> EngineResult<TacticPrediction> {
        self.tactic_model(source)?.predict_one(input)
    }

    pub fn invalidate(&self, source_id: &str) {
        let f = self.formations.invalidate(source_id);
        let t = self.tactics.invalidate(source_id);
        if f || t {
            log::info!("invalidated cached models for {source_id}");
        }
    }
}
