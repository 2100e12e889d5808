//! Minority oversampling (SMOTE) for the training half of a split.
//!
//! Synthetic rows are interpolated between a real row and one of its k nearest
//! same-class neighbours, so every synthetic value lies on a segment between two real
//! rows of the same class.

use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::config::SmoteParams;
use crate::dataset::LabeledSet;
use crate::error::{EngineError, EngineResult};

pub const MIN_CLASS_ROWS: usize = 2;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DroppedClass {
    pub code: usize,
    pub name: String,
    pub count: usize,
}

#[derive(Debug, Clone)]
pub struct Balanced {
    pub set: LabeledSet,
    pub dropped: Vec<DroppedClass>,
    pub synthetic_rows: usize,
    pub k_used: usize,
    pub target_count: usize,
}

/// Removes rows whose class has fewer than [`MIN_CLASS_ROWS`] rows. `class_names` is
/// indexed by class code and only used for reporting.
pub fn drop_rare_classes(set: &LabeledSet, class_names: &[String]) -> (LabeledSet, Vec<DroppedClass>) {
    let counts = set.class_counts();
    let dropped: Vec<DroppedClass> = counts
        .iter()
        .filter(|(_, n)| **n < MIN_CLASS_ROWS)
        .map(|(&code, &count)| DroppedClass {
            code,
            name: class_name(class_names, code),
            count,
        })
        .collect();
    if dropped.is_empty() {
        return (set.clone(), dropped);
    }

    for d in &dropped {
        log::warn!(
            "dropping class `{}`: {} row(s), need at least {}",
            d.name,
            d.count,
            MIN_CLASS_ROWS
        );
    }
    let keep: Vec<usize> = set
        .labels
        .iter()
        .enumerate()
        .filter(|(_, label)| counts[*label] >= MIN_CLASS_ROWS)
        .map(|(i, _)| i)
        .collect();
    (set.subset(&keep), dropped)
}

#[derive(Debug, Clone, Copy)]
pub struct Smote {
    params: SmoteParams,
}

impl Smote {
    pub fn new(params: SmoteParams) -> Self {
        Self { params }
    }

    /// Drops rare classes, then oversamples every remaining class up to the majority
    /// count. Real rows come first in the output, synthetic rows after.
    pub fn fit_resample(&self, set: &LabeledSet, class_names: &[String]) -> EngineResult<Balanced> {
        let (filtered, dropped) = drop_rare_classes(set, class_names);
        let counts = filtered.class_counts();
        if counts.len() < 2 {
            let kept = counts
                .keys()
                .map(|&c| class_name(class_names, c))
                .collect::<Vec<_>>();
            return Err(EngineError::insufficient(
                "balancing",
                format!(
                    "need at least two classes with {MIN_CLASS_ROWS}+ rows, have {kept:?} (dropped {:?})",
                    dropped.iter().map(|d| format!("{} ({})", d.name, d.count)).collect::<Vec<_>>()
                ),
            ));
        }

        let majority = counts.values().copied().max().unwrap_or(0);
        let rarest = counts.values().copied().min().unwrap_or(0);
        let k = self.params.k_neighbors.clamp(1, rarest - 1);
        if k < self.params.k_neighbors {
            log::info!(
                "smote: k_neighbors reduced from {} to {} (rarest class has {} rows)",
                self.params.k_neighbors,
                k,
                rarest
            );
        }

        let mut rng = ChaCha8Rng::seed_from_u64(self.params.seed);
        let mut out = filtered.clone();
        let mut synthetic_rows = 0usize;

        for (&class, &count) in &counts {
            let need = majority - count;
            if need == 0 {
                continue;
            }
            let members: Vec<usize> = filtered
                .labels
                .iter()
                .enumerate()
                .filter(|(_, l)| **l == class)
                .map(|(i, _)| i)
                .collect();
            let neighbours = nearest_neighbours(&filtered.features, &members, k);

            for _ in 0..need {
                let pick = rng.gen_range(0..members.len());
                let nn = neighbours[pick][rng.gen_range(0..neighbours[pick].len())];
                let gap: f64 = rng.gen_range(0.0..1.0);
                let base = &filtered.features[members[pick]];
                let other = &filtered.features[nn];
                let row = base
                    .iter()
                    .zip(other)
                    .map(|(a, b)| a + gap * (b - a))
                    .collect();
                out.push(row, class);
                synthetic_rows += 1;
            }
        }

        log::debug!(
            "smote: {} synthetic rows, {} classes at {} rows each",
            synthetic_rows,
            counts.len(),
            majority
        );

        Ok(Balanced {
            set: out,
            dropped,
            synthetic_rows,
            k_used: k,
            target_count: majority,
        })
    }
}

fn nearest_neighbours(features: &[Vec<f64>], members: &[usize], k: usize) -> Vec<Vec<usize>> {
    members
        .iter()
        .map(|&i| {
            let mut others: Vec<(f64, usize)> = members
                .iter()
                .filter(|&&j| j != i)
                .map(|&j| (squared_distance(&features[i], &features[j]), j))
                .collect();
            others.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
            others.truncate(k);
            others.into_iter().map(|(_, j)| j).collect()
        })
        .collect()
}

pub(crate) fn squared_distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y).powi(2)).sum()
}

fn class_name(class_names: &[String], code: usize) -> String {
    class_names
        .get(code)
        .cloned()
        .unwrap_or_else(|| format!("#{code}"))
}
