use std::collections::BTreeMap;

use rand::SeedableRng;
use rand::seq::SliceRandom;
use rand_chacha::ChaCha8Rng;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LabeledSet {
    pub features: Vec<Vec<f64>>,
    pub labels: Vec<usize>,
}

impl LabeledSet {
    pub fn new(features: Vec<Vec<f64>>, labels: Vec<usize>) -> Self {
        debug_assert_eq!(features.len(), labels.len());
        Self { features, labels }
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn n_features(&self) -> usize {
        self.features.first().map(Vec::len).unwrap_or(0)
    }

    pub fn push(&mut self, features: Vec<f64>, label: usize) {
        self.features.push(features);
        self.labels.push(label);
    }

    pub fn subset(&self, indices: &[usize]) -> LabeledSet {
        LabeledSet {
            features: indices.iter().map(|&i| self.features[i].clone()).collect(),
            labels: indices.iter().map(|&i| self.labels[i]).collect(),
        }
    }

    pub fn class_counts(&self) -> BTreeMap<usize, usize> {
        let mut counts = BTreeMap::new();
        for &label in &self.labels {
            *counts.entry(label).or_insert(0) += 1;
        }
        counts
    }
}

#[derive(Debug, Clone)]
pub struct TrainingSplit {
    pub train: LabeledSet,
    pub test: LabeledSet,
    pub train_rows: Vec<usize>,
    pub test_rows: Vec<usize>,
}

/// Per-class shuffled split. Each class sends `floor(count * test_ratio)` rows to the
/// held-out half but always keeps at least two in training, so every class that survives
/// rare-class filtering can still be oversampled.
pub fn stratified_split(set: &LabeledSet, test_ratio: f64, seed: u64) -> TrainingSplit {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut by_class: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for (i, &label) in set.labels.iter().enumerate() {
        by_class.entry(label).or_default().push(i);
    }

    let mut train_rows = Vec::new();
    let mut test_rows = Vec::new();
    for (_, mut rows) in by_class {
        rows.shuffle(&mut rng);
        let n = rows.len();
        let n_test = ((n as f64 * test_ratio).floor() as usize).min(n.saturating_sub(2));
        test_rows.extend_from_slice(&rows[..n_test]);
        train_rows.extend_from_slice(&rows[n_test..]);
    }
    train_rows.sort_unstable();
    test_rows.sort_unstable();

    TrainingSplit {
        train: set.subset(&train_rows),
        test: set.subset(&test_rows),
        train_rows,
        test_rows,
    }
}

pub fn median(values: &[f64]) -> f64 {
    let mut sorted: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if sorted.is_empty() {
        return 0.0;
    }
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::{LabeledSet, median, stratified_split};

    fn set(counts: &[(usize, usize)]) -> LabeledSet {
        let mut s = LabeledSet::default();
        let mut i = 0.0;
        for &(label, n) in counts {
            for _ in 0..n {
                s.push(vec![i, i * 2.0], label);
                i += 1.0;
            }
        }
        s
    }

    #[test]
    fn split_halves_are_disjoint_and_cover_everything() {
        let s = set(&[(0, 10), (1, 7), (2, 2)]);
        let split = stratified_split(&s, 0.2, 44);
        let train: HashSet<_> = split.train_rows.iter().copied().collect();
        let test: HashSet<_> = split.test_rows.iter().copied().collect();
        assert!(train.is_disjoint(&test));
        assert_eq!(train.len() + test.len(), s.len());
        assert_eq!(split.train.len(), split.train_rows.len());
    }

    #[test]
    fn split_keeps_two_training_rows_per_class() {
        let s = set(&[(0, 10), (1, 3), (2, 2)]);
        let split = stratified_split(&s, 0.5, 1);
        let counts = split.train.class_counts();
        assert_eq!(counts[&0], 5);
        assert_eq!(counts[&1], 2);
        assert_eq!(counts[&2], 2);
    }

    #[test]
    fn split_is_deterministic_for_a_seed() {
        let s = set(&[(0, 12), (1, 9)]);
        let a = stratified_split(&s, 0.2, 44);
        let b = stratified_split(&s, 0.2, 44);
        assert_eq!(a.test_rows, b.test_rows);
    }

    #[test]
    fn median_handles_even_and_odd() {
        assert_eq!(median(&[3.0, 1.0, 2.0]), 2.0);
        assert_eq!(median(&[4.0, 1.0, 2.0, 3.0]), 2.5);
        assert_eq!(median(&[]), 0.0);
    }
}
