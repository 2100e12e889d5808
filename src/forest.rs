//! Gini random forest over encoded class codes.
//!
//! Trees are grown on bootstrap samples in parallel. Each bootstrap draw and each
//! per-node feature shuffle is seeded from the forest seed plus the tree index, so a fit
//! is reproducible regardless of thread scheduling.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use rand::Rng;
use rand::SeedableRng;
use rand::seq::SliceRandom;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::config::ForestParams;
use crate::dataset::LabeledSet;
use crate::error::{EngineError, EngineResult};

const MIN_SAMPLES_SPLIT: usize = 2;
const MIN_SAMPLES_LEAF: usize = 1;

/// Shared flag checked between trees. Once set, an in-flight fit returns
/// [`EngineError::Cancelled`] and no model is produced.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
enum Node {
    Leaf {
        probs: Vec<f64>,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: Box<Node>,
        right: Box<Node>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionTree {
    root: Node,
}

impl DecisionTree {
    pub fn predict_proba(&self, row: &[f64]) -> &[f64] {
        let mut node = &self.root;
        loop {
            match node {
                Node::Leaf { probs } => return probs,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    let v = row.get(*feature).copied().unwrap_or(0.0);
                    node = if v <= *threshold { left } else { right };
                }
            }
        }
    }

    pub fn depth(&self) -> usize {
        fn walk(node: &Node) -> usize {
            match node {
                Node::Leaf { .. } => 0,
                Node::Split { left, right, .. } => 1 + walk(left).max(walk(right)),
            }
        }
        walk(&self.root)
    }
}

struct Grower<'a> {
    features: &'a [Vec<f64>],
    labels: &'a [usize],
    weights: &'a [f64],
    n_classes: usize,
    max_depth: usize,
    max_features: usize,
    importances: Vec<f64>,
}

impl Grower<'_> {
    fn class_weights(&self, rows: &[usize]) -> Vec<f64> {
        let mut totals = vec![0.0; self.n_classes];
        for &i in rows {
            totals[self.labels[i]] += self.weights[i];
        }
        totals
    }

    fn leaf(totals: &[f64]) -> Node {
        let sum: f64 = totals.iter().sum();
        let probs = if sum > 0.0 {
            totals.iter().map(|w| w / sum).collect()
        } else {
            vec![0.0; totals.len()]
        };
        Node::Leaf { probs }
    }

    fn grow(&mut self, rows: &[usize], depth: usize, rng: &mut ChaCha8Rng) -> Node {
        let totals = self.class_weights(rows);
        let parent_gini = gini(&totals);
        if depth >= self.max_depth || rows.len() < MIN_SAMPLES_SPLIT || parent_gini < 1e-12 {
            return Self::leaf(&totals);
        }

        let Some(split) = self.best_split(rows, &totals, parent_gini, rng) else {
            return Self::leaf(&totals);
        };
        self.importances[split.feature] += split.gain;

        let (left_rows, right_rows): (Vec<usize>, Vec<usize>) = rows
            .iter()
            .partition(|&&i| self.features[i][split.feature] <= split.threshold);
        let left = self.grow(&left_rows, depth + 1, rng);
        let right = self.grow(&right_rows, depth + 1, rng);
        Node::Split {
            feature: split.feature,
            threshold: split.threshold,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    fn best_split(
        &self,
        rows: &[usize],
        totals: &[f64],
        parent_gini: f64,
        rng: &mut ChaCha8Rng,
    ) -> Option<SplitChoice> {
        let n_features = self.features[rows[0]].len();
        let mut order: Vec<usize> = (0..n_features).collect();
        order.shuffle(rng);

        let parent_weight: f64 = totals.iter().sum();
        let mut best: Option<SplitChoice> = None;
        let mut visited = 0;
        for feature in order {
            if visited >= self.max_features {
                break;
            }
            let mut sorted: Vec<(f64, usize)> = rows
                .iter()
                .map(|&i| (self.features[i][feature], i))
                .collect();
            sorted.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
            // Constant features do not count towards max_features.
            if sorted[0].0 == sorted[sorted.len() - 1].0 {
                continue;
            }
            visited += 1;

            let mut left = vec![0.0; self.n_classes];
            for pos in 0..sorted.len() - 1 {
                let (value, i) = sorted[pos];
                left[self.labels[i]] += self.weights[i];
                let next = sorted[pos + 1].0;
                if value == next {
                    continue;
                }
                let n_left = pos + 1;
                if n_left < MIN_SAMPLES_LEAF || sorted.len() - n_left < MIN_SAMPLES_LEAF {
                    continue;
                }
                let right: Vec<f64> = totals.iter().zip(&left).map(|(t, l)| t - l).collect();
                let w_left: f64 = left.iter().sum();
                let w_right: f64 = right.iter().sum();
                let gain =
                    parent_weight * parent_gini - w_left * gini(&left) - w_right * gini(&right);
                if gain > 1e-12 && best.as_ref().is_none_or(|b| gain > b.gain) {
                    best = Some(SplitChoice {
                        feature,
                        threshold: (value + next) / 2.0,
                        gain,
                    });
                }
            }
        }
        best
    }
}

struct SplitChoice {
    feature: usize,
    threshold: f64,
    gain: f64,
}

fn gini(totals: &[f64]) -> f64 {
    let sum: f64 = totals.iter().sum();
    if sum <= 0.0 {
        return 0.0;
    }
    1.0 - totals.iter().map(|w| (w / sum).powi(2)).sum::<f64>()
}

/// `n / (k * count_c)` for each class present in `labels`, 0 for absent classes.
pub fn balanced_class_weights(labels: &[usize], n_classes: usize) -> Vec<f64> {
    let mut counts = vec![0usize; n_classes];
    for &l in labels {
        counts[l] += 1;
    }
    let present = counts.iter().filter(|&&c| c > 0).count().max(1) as f64;
    let n = labels.len() as f64;
    counts
        .iter()
        .map(|&c| if c == 0 { 0.0 } else { n / (present * c as f64) })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomForest {
    n_classes: usize,
    trees: Vec<DecisionTree>,
    feature_importances: Vec<f64>,
}

impl RandomForest {
    /// Grows `params.n_trees` trees on `threads` worker threads. `n_classes` is the size of
    /// the label vocabulary; codes absent from `set` simply get zero probability.
    pub fn fit(
        set: &LabeledSet,
        n_classes: usize,
        params: &ForestParams,
        threads: usize,
        cancel: &CancelToken,
    ) -> EngineResult<Self> {
        if set.is_empty() {
            return Err(EngineError::insufficient("training", "no training rows"));
        }
        if let Some(bad) = set.labels.iter().find(|&&l| l >= n_classes) {
            return Err(EngineError::InvalidCode {
                space: "training label",
                code: *bad,
                size: n_classes,
            });
        }
        let n_features = set.n_features();
        let max_features = ((n_features as f64).sqrt() as usize).max(1);
        let class_weight = if params.balanced_class_weight {
            balanced_class_weights(&set.labels, n_classes)
        } else {
            vec![1.0; n_classes]
        };

        let pool = build_train_pool(threads);
        let grown: EngineResult<Vec<(DecisionTree, Vec<f64>)>> = with_train_pool(&pool, || {
            (0..params.n_trees)
                .into_par_iter()
                .map(|i| {
                    if cancel.is_cancelled() {
                        return Err(EngineError::Cancelled);
                    }
                    Ok(grow_tree(
                        set,
                        n_classes,
                        &class_weight,
                        params.max_depth,
                        max_features,
                        params.seed.wrapping_add(i as u64),
                    ))
                })
                .collect()
        });
        let grown = grown?;
        if cancel.is_cancelled() {
            return Err(EngineError::Cancelled);
        }

        let mut feature_importances = vec![0.0; n_features];
        let mut trees = Vec::with_capacity(grown.len());
        for (tree, importances) in grown {
            for (acc, v) in feature_importances.iter_mut().zip(&importances) {
                *acc += v;
            }
            trees.push(tree);
        }
        let sum: f64 = feature_importances.iter().sum();
        if sum > 0.0 {
            for v in &mut feature_importances {
                *v /= sum;
            }
        }

        log::info!(
            "forest: {} trees on {} rows x {} features ({} classes)",
            trees.len(),
            set.len(),
            n_features,
            n_classes
        );
        Ok(Self {
            n_classes,
            trees,
            feature_importances,
        })
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    pub fn n_classes(&self) -> usize {
        self.n_classes
    }

    pub fn trees(&self) -> &[DecisionTree] {
        &self.trees
    }

    pub fn feature_importances(&self) -> &[f64] {
        &self.feature_importances
    }

    pub fn predict_proba(&self, row: &[f64]) -> Vec<f64> {
        let mut out = vec![0.0; self.n_classes];
        for tree in &self.trees {
            for (acc, p) in out.iter_mut().zip(tree.predict_proba(row)) {
                *acc += p;
            }
        }
        let n = self.trees.len().max(1) as f64;
        for v in &mut out {
            *v /= n;
        }
        out
    }

    pub fn predict(&self, row: &[f64]) -> usize {
        argmax(&self.predict_proba(row))
    }
}

pub fn argmax(values: &[f64]) -> usize {
    let mut best = 0;
    for (i, v) in values.iter().enumerate() {
        if *v > values[best] {
            best = i;
        }
    }
    best
}

fn grow_tree(
    set: &LabeledSet,
    n_classes: usize,
    class_weight: &[f64],
    max_depth: usize,
    max_features: usize,
    seed: u64,
) -> (DecisionTree, Vec<f64>) {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let n = set.len();

    // Bootstrap multiplicity becomes a sample weight.
    let mut draws = vec![0usize; n];
    for _ in 0..n {
        draws[rng.gen_range(0..n)] += 1;
    }
    let weights: Vec<f64> = draws
        .iter()
        .zip(&set.labels)
        .map(|(&d, &l)| d as f64 * class_weight[l])
        .collect();
    let rows: Vec<usize> = (0..n).filter(|&i| draws[i] > 0).collect();

    let mut grower = Grower {
        features: &set.features,
        labels: &set.labels,
        weights: &weights,
        n_classes,
        max_depth,
        max_features,
        importances: vec![0.0; set.n_features()],
    };
    let root = grower.grow(&rows, 0, &mut rng);
    (DecisionTree { root }, grower.importances)
}

fn build_train_pool(threads: usize) -> Option<rayon::ThreadPool> {
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads.max(1))
        .build()
        .ok()
}

fn with_train_pool<T>(pool: &Option<rayon::ThreadPool>, action: impl FnOnce() -> T + Send) -> T
where
    T: Send,
{
    if let Some(pool) = pool.as_ref() {
        pool.install(action)
    } else {
        action()
    }
}
