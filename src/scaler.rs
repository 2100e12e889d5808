use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};

/// Zero-mean / unit-variance scaler. Fitted once; constant columns get a scale of 1 so
/// they map to 0 instead of NaN.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    means: Vec<f64>,
    stds: Vec<f64>,
}

impl StandardScaler {
    pub fn fit(rows: &[Vec<f64>]) -> EngineResult<Self> {
        let Some(first) = rows.first() else {
            return Err(EngineError::insufficient("scaling", "no rows to fit on"));
        };
        let n_features = first.len();
        let n = rows.len() as f64;

        let mut means = vec![0.0_f64; n_features];
        for row in rows {
            for (m, v) in means.iter_mut().zip(row) {
                *m += v;
            }
        }
        for m in &mut means {
            *m /= n;
        }

        let mut stds = vec![0.0_f64; n_features];
        for row in rows {
            for ((s, v), m) in stds.iter_mut().zip(row).zip(&means) {
                *s += (v - m).powi(2);
            }
        }
        for s in &mut stds {
            // Population std, as the usual standard scaler does.
            *s = (*s / n).sqrt();
            if *s < 1e-12 {
                *s = 1.0;
            }
        }

        Ok(Self { means, stds })
    }

    pub fn n_features(&self) -> usize {
        self.means.len()
    }

    pub fn transform_row(&self, row: &[f64]) -> EngineResult<Vec<f64>> {
        if row.len() != self.means.len() {
            return Err(EngineError::FeatureContract(format!(
                "scaler expects {} features, got {}",
                self.means.len(),
                row.len()
            )));
        }
        Ok(row
            .iter()
            .zip(&self.means)
            .zip(&self.stds)
            .map(|((v, m), s)| (v - m) / s)
            .collect())
    }

    pub fn transform(&self, rows: &[Vec<f64>]) -> EngineResult<Vec<Vec<f64>>> {
        rows.iter().map(|r| self.transform_row(r)).collect()
    }

    pub fn inverse_transform_row(&self, row: &[f64]) -> Vec<f64> {
        row.iter()
            .zip(&self.means)
            .zip(&self.stds)
            .map(|((v, m), s)| v * s + m)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::StandardScaler;

    #[test]
    fn scaled_columns_have_zero_mean_unit_variance() {
        let rows = vec![
            vec![100.0, 1.0, 5.0],
            vec![200.0, 2.0, 5.0],
            vec![300.0, 3.0, 5.0],
            vec![400.0, 4.0, 5.0],
        ];
        let scaler = StandardScaler::fit(&rows).unwrap();
        let scaled = scaler.transform(&rows).unwrap();
        for col in 0..2 {
            let mean: f64 = scaled.iter().map(|r| r[col]).sum::<f64>() / 4.0;
            let var: f64 = scaled.iter().map(|r| (r[col] - mean).powi(2)).sum::<f64>() / 4.0;
            assert!(mean.abs() < 1e-9);
            assert!((var - 1.0).abs() < 1e-9);
        }
        // Constant column maps to zero.
        assert!(scaled.iter().all(|r| r[2] == 0.0));
    }

    #[test]
    fn inverse_transform_restores_values() {
        let rows = vec![vec![1.0, 10.0], vec![3.0, 30.0]];
        let scaler = StandardScaler::fit(&rows).unwrap();
        let z = scaler.transform_row(&rows[1]).unwrap();
        let back = scaler.inverse_transform_row(&z);
        assert!((back[0] - 3.0).abs() < 1e-12);
        assert!((back[1] - 30.0).abs() < 1e-12);
    }

    #[test]
    fn wrong_width_is_rejected() {
        let scaler = StandardScaler::fit(&[vec![1.0, 2.0]]).unwrap();
        assert!(scaler.transform_row(&[1.0]).is_err());
    }
}
