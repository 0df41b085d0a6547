//! Quantile binning of training features
//!
//! Split search runs over at most `max_bins` candidate thresholds per feature
//! instead of every distinct value. Thresholds are midpoints between adjacent
//! distinct values, so trees can keep raw `x <= threshold` tests at inference time
//! and never need the bins again.

use crate::error::ComputeError;

/// Upper bound on bins per feature (bins are stored as `u8`)
pub const MAX_BINS_LIMIT: usize = 256;

/// Feature-major binned copy of a training matrix
#[derive(Debug, Clone)]
pub struct BinnedMatrix {
    n_rows: usize,
    /// `bins[feature][row]`
    bins: Vec<Vec<u8>>,
    /// Ascending split thresholds per feature. A row goes left at split `b` when
    /// its bin is `<= b`, i.e. when its raw value is `<= thresholds[b]`.
    thresholds: Vec<Vec<f64>>,
}

impl BinnedMatrix {
    pub fn from_rows(rows: &[Vec<f64>], max_bins: usize) -> Result<Self, ComputeError> {
        if !(2..=MAX_BINS_LIMIT).contains(&max_bins) {
            return Err(ComputeError::InvalidConfig(format!(
                "max_bins must be in 2..={}, got {}",
                MAX_BINS_LIMIT, max_bins
            )));
        }
        let n_rows = rows.len();
        let n_features = rows.first().map_or(0, |r| r.len());

        let mut bins = Vec::with_capacity(n_features);
        let mut thresholds = Vec::with_capacity(n_features);

        for f in 0..n_features {
            let column: Vec<f64> = rows.iter().map(|r| r[f]).collect();
            let cuts = quantile_thresholds(&column, max_bins);
            let binned = column
                .iter()
                .map(|&x| cuts.partition_point(|&t| t < x) as u8)
                .collect();
            bins.push(binned);
            thresholds.push(cuts);
        }

        Ok(Self {
            n_rows,
            bins,
            thresholds,
        })
    }

    pub fn n_rows(&self) -> usize {
        self.n_rows
    }

    pub fn n_features(&self) -> usize {
        self.bins.len()
    }

    /// Number of bins for a feature (one more than its threshold count)
    pub fn n_bins(&self, feature: usize) -> usize {
        self.thresholds[feature].len() + 1
    }

    pub fn bin(&self, feature: usize, row: usize) -> usize {
        self.bins[feature][row] as usize
    }

    pub fn threshold(&self, feature: usize, split: usize) -> f64 {
        self.thresholds[feature][split]
    }
}

/// Candidate thresholds for one column
fn quantile_thresholds(column: &[f64], max_bins: usize) -> Vec<f64> {
    let mut distinct: Vec<f64> = column.to_vec();
    distinct.sort_by(|a, b| a.total_cmp(b));
    distinct.dedup();

    if distinct.len() <= 1 {
        return Vec::new();
    }

    if distinct.len() <= max_bins {
        return distinct.windows(2).map(|w| midpoint(w[0], w[1])).collect();
    }

    let mut cuts: Vec<f64> = (1..max_bins)
        .map(|q| {
            let idx = (q * distinct.len() / max_bins).max(1);
            midpoint(distinct[idx - 1], distinct[idx])
        })
        .collect();
    cuts.dedup();
    cuts
}

fn midpoint(a: f64, b: f64) -> f64 {
    a + (b - a) / 2.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_few_distinct_values_use_midpoints() {
        let rows = vec![vec![1.0], vec![3.0], vec![3.0], vec![7.0]];
        let binned = BinnedMatrix::from_rows(&rows, 64).unwrap();

        assert_eq!(binned.n_bins(0), 3);
        assert_eq!(binned.threshold(0, 0), 2.0);
        assert_eq!(binned.threshold(0, 1), 5.0);
        let bins: Vec<usize> = (0..4).map(|r| binned.bin(0, r)).collect();
        assert_eq!(bins, vec![0, 1, 1, 2]);
    }

    #[test]
    fn test_constant_feature_has_single_bin() {
        let rows = vec![vec![4.0, 1.0], vec![4.0, 2.0]];
        let binned = BinnedMatrix::from_rows(&rows, 16).unwrap();
        assert_eq!(binned.n_bins(0), 1);
        assert_eq!(binned.n_bins(1), 2);
    }

    #[test]
    fn test_many_values_capped_at_max_bins() {
        let rows: Vec<Vec<f64>> = (0..1000).map(|i| vec![i as f64]).collect();
        let binned = BinnedMatrix::from_rows(&rows, 32).unwrap();

        assert!(binned.n_bins(0) <= 32);
        // Bin order follows value order
        for r in 1..1000 {
            assert!(binned.bin(0, r) >= binned.bin(0, r - 1));
        }
        // Bin membership agrees with raw thresholds
        for r in 0..1000 {
            let b = binned.bin(0, r);
            if b < binned.n_bins(0) - 1 {
                assert!(rows[r][0] <= binned.threshold(0, b));
            }
            if b > 0 {
                assert!(rows[r][0] > binned.threshold(0, b - 1));
            }
        }
    }

    #[test]
    fn test_invalid_max_bins() {
        assert!(BinnedMatrix::from_rows(&[vec![1.0]], 1).is_err());
        assert!(BinnedMatrix::from_rows(&[vec![1.0]], 300).is_err());
    }
}
