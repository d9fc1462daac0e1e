// ============================================================
// Layer 4 — Preprocessor
// ============================================================
// Turns raw annotated crops into network-ready numbers:
//
//   1. Dummy (one-hot) encoding of category names
//      Categories are sorted lexicographically so that the
//      column order is stable across runs on the same data.
//
//   2. Per-feature standardisation of the pixels
//      Every flattened pixel position (28·28·3 = 2352 features)
//      is shifted to zero mean and scaled to unit variance
//      over the dataset. A feature with zero variance keeps a
//      scale of 1 so it is centred but never divided by zero.
//
// Reference: Rust Book §8 (Vectors), §13 (Iterators)

use std::collections::BTreeSet;

use crate::domain::error::LocaliseError;

// ─── One-hot encoding ─────────────────────────────────────────────────────────
/// Result of dummy-encoding a list of category names.
#[derive(Debug, Clone, PartialEq)]
pub struct OneHot {
    /// Sorted unique category names; column `i` of a row stands for `categories[i]`
    pub categories: Vec<String>,

    /// One row per input name, `width` columns each
    pub rows: Vec<Vec<f32>>,
}

/// Encode `names` into one-hot rows of `width` columns.
///
/// `width` may be larger than the number of distinct names (classes that
/// do not occur in this data keep an all-zero column) but never smaller.
pub fn one_hot_encode(names: &[String], width: usize) -> Result<OneHot, LocaliseError> {
    let categories: Vec<String> = names
        .iter()
        .cloned()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    if categories.len() > width {
        return Err(LocaliseError::Dataset(format!(
            "found {} distinct categories but the classifier has only {} outputs",
            categories.len(),
            width
        )));
    }

    let rows = names
        .iter()
        .map(|name| {
            let mut row = vec![0.0f32; width];
            // Present by construction: `categories` is built from `names`
            if let Ok(col) = categories.binary_search(name) {
                row[col] = 1.0;
            }
            row
        })
        .collect();

    Ok(OneHot { categories, rows })
}

// ─── Standard scaler ──────────────────────────────────────────────────────────
/// Column-wise standardisation fitted on a set of flattened samples.
#[derive(Debug, Clone, PartialEq)]
pub struct StandardScaler {
    mean:  Vec<f32>,
    scale: Vec<f32>,
}

impl StandardScaler {
    /// Compute per-feature mean and population standard deviation.
    pub fn fit(samples: &[Vec<f32>]) -> Result<Self, LocaliseError> {
        let Some(first) = samples.first() else {
            return Err(LocaliseError::Dataset(
                "cannot fit a scaler on an empty dataset".to_string(),
            ));
        };
        let features = first.len();
        if let Some(bad) = samples.iter().position(|s| s.len() != features) {
            return Err(LocaliseError::Dataset(format!(
                "sample {bad} has {} features, expected {features}",
                samples[bad].len()
            )));
        }

        // Accumulate in f64 so that large datasets do not lose precision
        let n = samples.len() as f64;
        let mut sum    = vec![0.0f64; features];
        let mut sum_sq = vec![0.0f64; features];
        for sample in samples {
            for (j, &v) in sample.iter().enumerate() {
                let v = v as f64;
                sum[j]    += v;
                sum_sq[j] += v * v;
            }
        }

        let mut mean  = Vec::with_capacity(features);
        let mut scale = Vec::with_capacity(features);
        for j in 0..features {
            let m   = sum[j] / n;
            let var = (sum_sq[j] / n - m * m).max(0.0);
            let std = var.sqrt();
            mean.push(m as f32);
            scale.push(if std > f64::EPSILON { std as f32 } else { 1.0 });
        }

        Ok(Self { mean, scale })
    }

    /// Standardise `samples` in place.
    pub fn transform(&self, samples: &mut [Vec<f32>]) {
        for sample in samples.iter_mut() {
            for ((v, m), s) in sample.iter_mut().zip(&self.mean).zip(&self.scale) {
                *v = (*v - m) / s;
            }
        }
    }

    pub fn fit_transform(samples: &mut [Vec<f32>]) -> Result<Self, LocaliseError> {
        let scaler = Self::fit(samples)?;
        scaler.transform(samples);
        Ok(scaler)
    }

    pub fn features(&self) -> usize {
        self.mean.len()
    }
}

/// Global mean and standard deviation over every value of every sample.
/// Used to report the characteristics of the data after normalisation.
pub fn global_moments(samples: &[Vec<f32>]) -> (f64, f64) {
    let count: usize = samples.iter().map(Vec::len).sum();
    if count == 0 {
        return (0.0, 0.0);
    }
    let (sum, sum_sq) = samples
        .iter()
        .flatten()
        .fold((0.0f64, 0.0f64), |(s, sq), &v| (s + v as f64, sq + (v as f64) * (v as f64)));
    let mean = sum / count as f64;
    let var  = (sum_sq / count as f64 - mean * mean).max(0.0);
    (mean, var.sqrt())
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_one_hot_sorts_categories() {
        let encoded = one_hot_encode(&names(&["dog", "cat", "dog", "bird"]), 3).unwrap();
        assert_eq!(encoded.categories, names(&["bird", "cat", "dog"]));
        assert_eq!(encoded.rows[0], vec![0.0, 0.0, 1.0]);
        assert_eq!(encoded.rows[1], vec![0.0, 1.0, 0.0]);
        assert_eq!(encoded.rows[3], vec![1.0, 0.0, 0.0]);
    }

    #[test]
    fn test_one_hot_pads_unused_columns() {
        let encoded = one_hot_encode(&names(&["a", "b"]), 4).unwrap();
        assert_eq!(encoded.rows[1], vec![0.0, 1.0, 0.0, 0.0]);
    }

    #[test]
    fn test_one_hot_rejects_too_many_categories() {
        let err = one_hot_encode(&names(&["a", "b", "c"]), 2).unwrap_err();
        assert!(matches!(err, LocaliseError::Dataset(_)));
    }

    #[test]
    fn test_scaler_standardises_each_feature() {
        let mut samples = vec![vec![1.0, 10.0], vec![3.0, 30.0], vec![5.0, 50.0]];
        StandardScaler::fit_transform(&mut samples).unwrap();

        for j in 0..2 {
            let column: Vec<f32> = samples.iter().map(|s| s[j]).collect();
            let mean: f32 = column.iter().sum::<f32>() / 3.0;
            let var: f32  = column.iter().map(|v| (v - mean).powi(2)).sum::<f32>() / 3.0;
            assert!(mean.abs() < 1e-6);
            assert!((var - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn test_constant_feature_is_centred_not_divided() {
        let mut samples = vec![vec![2.0], vec![2.0]];
        let scaler = StandardScaler::fit_transform(&mut samples).unwrap();
        assert_eq!(scaler.features(), 1);
        assert_eq!(samples, vec![vec![0.0], vec![0.0]]);
    }

    #[test]
    fn test_scaler_rejects_ragged_samples() {
        let samples = vec![vec![1.0, 2.0], vec![1.0]];
        assert!(StandardScaler::fit(&samples).is_err());
    }

    #[test]
    fn test_global_moments() {
        let (mean, std) = global_moments(&[vec![1.0, 3.0], vec![1.0, 3.0]]);
        assert!((mean - 2.0).abs() < 1e-12);
        assert!((std - 1.0).abs() < 1e-12);
    }
}
