use serde::{Deserialize, Serialize};

/// Summary of a numeric sample. Every field is 0.0 for an empty sample.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct DistributionStats {
    pub count: usize,
    pub median: f64,
    pub mean: f64,
    pub std_dev: f64,
    pub p50: f64,
    pub p90: f64,
    pub p95: f64,
    pub p99: f64,
    pub min: f64,
    pub max: f64,
}

impl DistributionStats {
    /// Sorts a copy of `values`. NaNs sort last and are otherwise kept.
    pub fn from_values(values: &[f64]) -> Self {
        if values.is_empty() {
            return Self::default();
        }
        let mut sorted = values.to_vec();
        sorted.sort_by(|a, b| a.total_cmp(b));
        let n = sorted.len();

        let mean = sorted.iter().sum::<f64>() / n as f64;
        // Sample standard deviation; undefined below two points.
        let std_dev = if n > 1 {
            let var = sorted.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (n - 1) as f64;
            var.sqrt()
        } else {
            0.0
        };
        let median = if n % 2 == 1 {
            sorted[n / 2]
        } else {
            (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
        };

        Self {
            count: n,
            median,
            mean,
            std_dev,
            p50: nearest_rank(&sorted, 0.50),
            p90: nearest_rank(&sorted, 0.90),
            p95: nearest_rank(&sorted, 0.95),
            p99: nearest_rank(&sorted, 0.99),
            min: sorted[0],
            max: sorted[n - 1],
        }
    }

    pub fn from_counts(values: impl IntoIterator<Item = usize>) -> Self {
        let v: Vec<f64> = values.into_iter().map(|x| x as f64).collect();
        Self::from_values(&v)
    }
}

/// `sorted[floor(n * q)]`, clamped to the last element. `sorted` must be non-empty.
fn nearest_rank(sorted: &[f64], q: f64) -> f64 {
    let idx = ((sorted.len() as f64 * q).floor() as usize).min(sorted.len() - 1);
    sorted[idx]
}

/// Mean of a sample, 0.0 when empty.
pub fn mean(values: impl IntoIterator<Item = f64>) -> f64 {
    let (sum, n) = values
        .into_iter()
        .fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    if n == 0 {
        0.0
    } else {
        sum / n as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_collapses_to_zero() {
        assert_eq!(DistributionStats::from_values(&[]), DistributionStats::default());
        assert_eq!(mean(std::iter::empty()), 0.0);
    }

    #[test]
    fn single_value_has_zero_spread() {
        let s = DistributionStats::from_values(&[4.2]);
        assert_eq!(s.std_dev, 0.0);
        assert_eq!(s.min, 4.2);
        assert_eq!(s.max, 4.2);
        assert_eq!(s.p99, 4.2);
        assert_eq!(s.median, 4.2);
    }

    #[test]
    fn nearest_rank_percentiles() {
        let values: Vec<f64> = (1..=10).rev().map(f64::from).collect();
        let s = DistributionStats::from_values(&values);
        assert_eq!(s.count, 10);
        assert_eq!(s.median, 5.5);
        assert_eq!(s.p50, 6.0);
        assert_eq!(s.p90, 10.0);
        assert_eq!(s.p95, 10.0);
        assert_eq!(s.min, 1.0);
        assert_eq!(s.max, 10.0);
        assert!((s.mean - 5.5).abs() < 1e-12);
        assert!((s.std_dev - 3.0276503540974917).abs() < 1e-9);
    }

    #[test]
    fn input_order_does_not_matter() {
        let a = DistributionStats::from_values(&[3.0, 1.0, 2.0]);
        let b = DistributionStats::from_values(&[1.0, 2.0, 3.0]);
        assert_eq!(a, b);
    }
}
