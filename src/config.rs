use std::env;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ForestParams {
    pub n_trees: usize,
    pub max_depth: usize,
    pub seed: u64,
    // Weight classes by n / (k * count_c) when growing trees.
    pub balanced_class_weight: bool,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct SmoteParams {
    pub k_neighbors: usize,
    pub seed: u64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ClusterParams {
    pub seed: u64,
    pub max_iter: usize,
    pub tolerance: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EngineConfig {
    pub test_ratio: f64,
    pub split_seed: u64,
    pub formation_forest: ForestParams,
    pub formation_smote: SmoteParams,
    pub tactic_forest: ForestParams,
    pub tactic_smote: SmoteParams,
    pub clustering: ClusterParams,
    pub train_threads: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            test_ratio: 0.2,
            split_seed: 44,
            formation_forest: ForestParams {
                n_trees: 100,
                max_depth: 10,
                seed: 33,
                balanced_class_weight: false,
            },
            formation_smote: SmoteParams {
                k_neighbors: 1,
                seed: 42,
            },
            tactic_forest: ForestParams {
                n_trees: 200,
                max_depth: 10,
                seed: 33,
                balanced_class_weight: true,
            },
            tactic_smote: SmoteParams {
                k_neighbors: 5,
                seed: 42,
            },
            clustering: ClusterParams {
                seed: 33,
                max_iter: 300,
                tolerance: 1e-4,
            },
            train_threads: 4,
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        cfg.test_ratio = env_parse("TI_TEST_RATIO")
            .unwrap_or(cfg.test_ratio)
            .clamp(0.05, 0.5);
        cfg.split_seed = env_parse("TI_SPLIT_SEED").unwrap_or(cfg.split_seed);

        if let Some(n) = env_parse::<usize>("TI_FORMATION_TREES") {
            cfg.formation_forest.n_trees = n.clamp(1, 2000);
        }
        if let Some(n) = env_parse::<usize>("TI_TACTIC_TREES") {
            cfg.tactic_forest.n_trees = n.clamp(1, 2000);
        }
        if let Some(depth) = env_parse::<usize>("TI_MAX_DEPTH") {
            let depth = depth.clamp(1, 64);
            cfg.formation_forest.max_depth = depth;
            cfg.tactic_forest.max_depth = depth;
        }
        if let Some(seed) = env_parse::<u64>("TI_FOREST_SEED") {
            cfg.formation_forest.seed = seed;
            cfg.tactic_forest.seed = seed;
        }
        if let Some(seed) = env_parse::<u64>("TI_SMOTE_SEED") {
            cfg.formation_smote.seed = seed;
            cfg.tactic_smote.seed = seed;
        }
        cfg.clustering.seed = env_parse("TI_KMEANS_SEED").unwrap_or(cfg.clustering.seed);
        cfg.train_threads = env_parse("TI_TRAIN_THREADS")
            .unwrap_or(cfg.train_threads)
            .clamp(1, 32);
        cfg
    }
}

pub fn formation_data_path() -> Option<PathBuf> {
    env_path("TI_FORMATION_DATA")
}

pub fn tactic_data_path() -> Option<PathBuf> {
    env_path("TI_TACTIC_DATA")
}

fn env_path(key: &str) -> Option<PathBuf> {
    let raw = env::var(key).ok()?;
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(PathBuf::from(trimmed))
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|val| val.trim().parse::<T>().ok())
}

#[cfg(test)]
mod tests {
    use super::EngineConfig;

    #[test]
    fn defaults_match_dashboard_constants() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.formation_forest.n_trees, 100);
        assert_eq!(cfg.tactic_forest.n_trees, 200);
        assert_eq!(cfg.formation_smote.k_neighbors, 1);
        assert_eq!(cfg.clustering.seed, 33);
        assert!(cfg.tactic_forest.balanced_class_weight);
        assert!(!cfg.formation_forest.balanced_class_weight);
        assert!((cfg.test_ratio - 0.2).abs() < 1e-12);
    }
}
