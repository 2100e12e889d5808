//! Style clustering: k-means over standardized team-match statistics, with a fixed
//! table mapping cluster ids to tactic archetype names.

use std::collections::HashSet;

use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::balance::squared_distance;
use crate::config::ClusterParams;
use crate::error::{EngineError, EngineResult};
use crate::scaler::StandardScaler;

/// Archetype for each cluster id. The number of clusters is the length of this table.
pub const ARCHETYPE_NAMES: [&str; 5] = [
    "Balanced High Press",
    "Flexible Possession",
    "Deep Build-Up",
    "Long Ball Counter",
    "Dominant Tiki-Taka",
];

pub fn archetype_name(cluster: usize) -> Option<&'static str> {
    ARCHETYPE_NAMES.get(cluster).copied()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KMeansModel {
    centroids: Vec<Vec<f64>>,
    pub iterations: usize,
    pub inertia: f64,
}

impl KMeansModel {
    pub fn centroids(&self) -> &[Vec<f64>] {
        &self.centroids
    }

    pub fn n_clusters(&self) -> usize {
        self.centroids.len()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct KMeans {
    n_clusters: usize,
    params: ClusterParams,
}

impl KMeans {
    pub fn new(n_clusters: usize, params: ClusterParams) -> Self {
        Self { n_clusters, params }
    }

    /// Returns the fitted model and one cluster id per row. Every cluster ends up with at
    /// least one row.
    pub fn fit(&self, rows: &[Vec<f64>]) -> EngineResult<(KMeansModel, Vec<usize>)> {
        let k = self.n_clusters;
        let distinct = count_distinct(rows);
        if k == 0 || distinct < k {
            return Err(EngineError::insufficient(
                "clustering",
                format!("{k} clusters need {k} distinct rows, have {distinct}"),
            ));
        }

        let mut rng = ChaCha8Rng::seed_from_u64(self.params.seed);
        let mut centroids = plus_plus_init(rows, k, &mut rng);
        let threshold = self.params.tolerance * mean_variance(rows);

        let mut labels = vec![usize::MAX; rows.len()];
        let mut iterations = 0;
        for _ in 0..self.params.max_iter.max(1) {
            iterations += 1;
            let next: Vec<usize> = rows
                .iter()
                .map(|r| nearest_centroid(&centroids, r).0)
                .collect();
            let changed = next != labels;
            labels = next;

            let updated = recompute_centroids(rows, &labels, &centroids);
            let shift: f64 = centroids
                .iter()
                .zip(&updated)
                .map(|(a, b)| squared_distance(a, b))
                .sum();
            centroids = updated;
            if !changed || shift <= threshold {
                break;
            }
        }

        // Final assignment against the last centroids, then make sure nothing is empty.
        labels = rows
            .iter()
            .map(|r| nearest_centroid(&centroids, r).0)
            .collect();
        fill_empty_clusters(rows, &mut labels, &mut centroids);

        let inertia = rows
            .iter()
            .zip(&labels)
            .map(|(r, &c)| squared_distance(r, &centroids[c]))
            .sum();
        log::debug!(
            "kmeans: {} rows, k={}, {} iterations, inertia {:.3}",
            rows.len(),
            k,
            iterations,
            inertia
        );

        Ok((
            KMeansModel {
                centroids,
                iterations,
                inertia,
            },
            labels,
        ))
    }
}

fn count_distinct(rows: &[Vec<f64>]) -> usize {
    rows.iter()
        .map(|r| r.iter().map(|v| v.to_bits()).collect::<Vec<u64>>())
        .collect::<HashSet<_>>()
        .len()
}

fn mean_variance(rows: &[Vec<f64>]) -> f64 {
    let Some(first) = rows.first() else {
        return 0.0;
    };
    let n = rows.len() as f64;
    let mut total = 0.0;
    for col in 0..first.len() {
        let mean = rows.iter().map(|r| r[col]).sum::<f64>() / n;
        total += rows.iter().map(|r| (r[col] - mean).powi(2)).sum::<f64>() / n;
    }
    total / first.len().max(1) as f64
}

fn nearest_centroid(centroids: &[Vec<f64>], row: &[f64]) -> (usize, f64) {
    let mut best = (0, f64::INFINITY);
    for (i, c) in centroids.iter().enumerate() {
        let d = squared_distance(row, c);
        if d < best.1 {
            best = (i, d);
        }
    }
    best
}

fn plus_plus_init(rows: &[Vec<f64>], k: usize, rng: &mut ChaCha8Rng) -> Vec<Vec<f64>> {
    let mut centroids = Vec::with_capacity(k);
    centroids.push(rows[rng.gen_range(0..rows.len())].clone());

    while centroids.len() < k {
        let distances: Vec<f64> = rows
            .iter()
            .map(|r| nearest_centroid(&centroids, r).1)
            .collect();
        let total: f64 = distances.iter().sum();
        let threshold = rng.gen_range(0.0..1.0) * total;

        // Strict comparison so rows already chosen (distance 0) are never picked again.
        let mut cumsum = 0.0;
        let mut chosen = None;
        for (i, &d) in distances.iter().enumerate() {
            cumsum += d;
            if cumsum > threshold {
                chosen = Some(i);
                break;
            }
        }
        let idx = chosen.unwrap_or_else(|| {
            distances
                .iter()
                .enumerate()
                .max_by(|a, b| a.1.total_cmp(b.1))
                .map(|(i, _)| i)
                .unwrap_or(0)
        });
        centroids.push(rows[idx].clone());
    }
    centroids
}

fn recompute_centroids(rows: &[Vec<f64>], labels: &[usize], previous: &[Vec<f64>]) -> Vec<Vec<f64>> {
    let n_features = previous.first().map(Vec::len).unwrap_or(0);
    let mut sums = vec![vec![0.0; n_features]; previous.len()];
    let mut counts = vec![0usize; previous.len()];
    for (row, &c) in rows.iter().zip(labels) {
        counts[c] += 1;
        for (s, v) in sums[c].iter_mut().zip(row) {
            *s += v;
        }
    }
    sums.into_iter()
        .zip(counts)
        .zip(previous)
        .map(|((sum, count), prev)| {
            if count == 0 {
                prev.clone()
            } else {
                sum.into_iter().map(|s| s / count as f64).collect()
            }
        })
        .collect()
}

/// Moves the row farthest from its own centroid into each empty cluster, taking only
/// from clusters that keep at least one row.
fn fill_empty_clusters(rows: &[Vec<f64>], labels: &mut [usize], centroids: &mut [Vec<f64>]) {
    loop {
        let mut counts = vec![0usize; centroids.len()];
        for &c in labels.iter() {
            counts[c] += 1;
        }
        let Some(empty) = counts.iter().position(|&n| n == 0) else {
            return;
        };
        let donor = rows
            .iter()
            .enumerate()
            .filter(|(i, _)| counts[labels[*i]] > 1)
            .map(|(i, r)| (i, squared_distance(r, &centroids[labels[i]])))
            .filter(|(_, d)| *d > 0.0)
            .max_by(|a, b| a.1.total_cmp(&b.1).then(b.0.cmp(&a.0)));
        let Some((row, _)) = donor else {
            return;
        };
        log::debug!("kmeans: cluster {empty} was empty, reseeded from row {row}");
        labels[row] = empty;
        centroids[empty] = rows[row].clone();
    }
}

#[derive(Debug, Clone)]
pub struct StyleClustering {
    pub scaler: StandardScaler,
    pub model: KMeansModel,
    pub assignments: Vec<usize>,
}

impl StyleClustering {
    pub fn fit(rows: &[Vec<f64>], params: ClusterParams) -> EngineResult<Self> {
        let scaler = StandardScaler::fit(rows)?;
        let scaled = scaler.transform(rows)?;
        let (model, assignments) = KMeans::new(ARCHETYPE_NAMES.len(), params).fit(&scaled)?;
        Ok(Self {
            scaler,
            model,
            assignments,
        })
    }

    pub fn labels(&self) -> Vec<&'static str> {
        self.assignments
            .iter()
            .map(|&c| archetype_name(c).unwrap_or("Unknown"))
            .collect()
    }

    pub fn profiles(&self, feature_names: &[String]) -> Vec<ClusterProfile> {
        let mut counts = vec![0usize; self.model.n_clusters()];
        for &c in &self.assignments {
            counts[c] += 1;
        }
        self.model
            .centroids()
            .iter()
            .enumerate()
            .map(|(id, centroid)| ClusterProfile {
                cluster: id,
                archetype: archetype_name(id).unwrap_or("Unknown").to_string(),
                members: counts[id],
                centroid: feature_names
                    .iter()
                    .cloned()
                    .zip(self.scaler.inverse_transform_row(centroid))
                    .collect(),
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterProfile {
    pub cluster: usize,
    pub archetype: String,
    pub members: usize,
    pub centroid: Vec<(String, f64)>,
}

#[cfg(test)]
mod tests {
    use super::{ARCHETYPE_NAMES, KMeans, StyleClustering, archetype_name};
    use crate::config::ClusterParams;
    use crate::error::EngineError;

    fn params() -> ClusterParams {
        ClusterParams {
            seed: 33,
            max_iter: 300,
            tolerance: 1e-4,
        }
    }

    fn blobs() -> Vec<Vec<f64>> {
        let centres = [(0.0, 0.0), (10.0, 0.0), (0.0, 10.0), (10.0, 10.0), (20.0, 20.0)];
        let mut rows = Vec::new();
        for (cx, cy) in centres {
            for j in 0..6 {
                let off = j as f64 * 0.1;
                rows.push(vec![cx + off, cy - off]);
            }
        }
        rows
    }

    #[test]
    fn separated_blobs_get_one_cluster_each() {
        let rows = blobs();
        let (model, labels) = KMeans::new(5, params()).fit(&rows).unwrap();
        assert_eq!(model.n_clusters(), 5);
        for blob in labels.chunks(6) {
            assert!(blob.iter().all(|&l| l == blob[0]));
        }
        let mut firsts: Vec<usize> = labels.chunks(6).map(|b| b[0]).collect();
        firsts.sort_unstable();
        firsts.dedup();
        assert_eq!(firsts.len(), 5);
    }

    #[test]
    fn clustering_is_deterministic() {
        let rows = blobs();
        let a = KMeans::new(5, params()).fit(&rows).unwrap();
        let b = KMeans::new(5, params()).fit(&rows).unwrap();
        assert_eq!(a.1, b.1);
        assert_eq!(a.0, b.0);
    }

    #[test]
    fn every_cluster_is_non_empty_with_duplicates() {
        let mut rows = vec![vec![0.0, 0.0]; 20];
        rows.extend([vec![1.0, 0.0], vec![2.0, 0.0], vec![3.0, 0.0], vec![4.0, 0.0]]);
        let (_, labels) = KMeans::new(5, params()).fit(&rows).unwrap();
        for c in 0..5 {
            assert!(labels.contains(&c), "cluster {c} empty");
        }
    }

    #[test]
    fn too_few_distinct_rows_is_insufficient() {
        let rows = vec![vec![1.0], vec![1.0], vec![2.0], vec![3.0], vec![4.0], vec![4.0]];
        let err = KMeans::new(5, params()).fit(&rows).unwrap_err();
        assert!(matches!(err, EngineError::InsufficientData { stage: "clustering", .. }));
    }

    #[test]
    fn archetype_table_covers_every_cluster() {
        let clustering = StyleClustering::fit(&blobs(), params()).unwrap();
        let labels = clustering.labels();
        for name in ARCHETYPE_NAMES {
            assert!(labels.contains(&name));
        }
        assert_eq!(archetype_name(5), None);

        let names = vec!["x".to_string(), "y".to_string()];
        let profiles = clustering.profiles(&names);
        assert_eq!(profiles.iter().map(|p| p.members).sum::<usize>(), 30);
        // Centroids come back in original units.
        assert!(profiles.iter().any(|p| p.centroid[0].1 > 19.0));
    }
}
