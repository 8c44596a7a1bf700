/// Scale factor turning a raw median absolute deviation into a Gaussian sigma.
pub const MAD_NORMALIZATION: f64 = 0.6745;

pub struct StatsHelper;

impl StatsHelper {
    pub fn mean(samples: &[f64]) -> f64 {
        if samples.is_empty() {
            return f64::NAN;
        }
        samples.iter().sum::<f64>() / samples.len() as f64
    }

    /// Population variance (no degrees-of-freedom correction).
    pub fn variance(samples: &[f64]) -> f64 {
        if samples.is_empty() {
            return f64::NAN;
        }
        let mean = Self::mean(samples);
        samples.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / samples.len() as f64
    }

    pub fn std(samples: &[f64]) -> f64 {
        Self::variance(samples).sqrt()
    }

    pub fn rms(samples: &[f64]) -> f64 {
        if samples.is_empty() {
            return 0.0;
        }
        let sum_sq: f64 = samples.iter().map(|&v| v * v).sum();
        (sum_sq / samples.len() as f64).sqrt()
    }

    pub fn median(samples: &[f64]) -> f64 {
        if samples.is_empty() {
            return f64::NAN;
        }
        let mut sorted = samples.to_vec();
        sorted.sort_by(f64::total_cmp);
        let n = sorted.len();
        if n % 2 == 1 {
            sorted[n / 2]
        } else {
            0.5 * (sorted[n / 2 - 1] + sorted[n / 2])
        }
    }

    /// Median absolute deviation, normalised to a Gaussian sigma.
    pub fn mad(samples: &[f64]) -> f64 {
        let center = Self::median(samples);
        let deviations: Vec<f64> = samples.iter().map(|v| (v - center).abs()).collect();
        Self::median(&deviations) / MAD_NORMALIZATION
    }

    pub fn min_max(samples: &[f64]) -> (f64, f64) {
        samples
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
                (lo.min(v), hi.max(v))
            })
    }

    /// Running median with mirrored edges (`d c b a | a b c d | d c b a`).
    pub fn median_filter(samples: &[f64], window: usize) -> Vec<f64> {
        let n = samples.len();
        if n == 0 || window <= 1 {
            return samples.to_vec();
        }
        let half = (window / 2) as isize;
        let mut scratch = Vec::with_capacity(window);
        (0..n as isize)
            .map(|center| {
                scratch.clear();
                let start = center - half;
                scratch.extend(
                    (start..start + window as isize).map(|i| samples[reflect_index(i, n)]),
                );
                Self::median(&scratch)
            })
            .collect()
    }
}

fn reflect_index(index: isize, len: usize) -> usize {
    let len = len as isize;
    let period = 2 * len;
    let folded = index.rem_euclid(period);
    if folded >= len {
        (period - 1 - folded) as usize
    } else {
        folded as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rms_zero_sequence_yields_zero() {
        assert_eq!(StatsHelper::rms(&[]), 0.0);
        assert_eq!(StatsHelper::rms(&[0.0, 0.0]), 0.0);
    }

    #[test]
    fn median_handles_even_and_odd_lengths() {
        assert_eq!(StatsHelper::median(&[3.0, 1.0, 2.0]), 2.0);
        assert_eq!(StatsHelper::median(&[4.0, 1.0, 3.0, 2.0]), 2.5);
    }

    #[test]
    fn std_is_population_std() {
        let std = StatsHelper::std(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]);
        assert!((std - 2.0).abs() < 1e-12);
    }

    #[test]
    fn mad_of_constant_is_zero() {
        assert_eq!(StatsHelper::mad(&[1.5; 10]), 0.0);
    }

    #[test]
    fn mad_is_normalized() {
        let mad = StatsHelper::mad(&[1.0, 2.0, 3.0, 4.0, 5.0]);
        assert!((mad - 1.0 / MAD_NORMALIZATION).abs() < 1e-12);
    }

    #[test]
    fn median_filter_removes_single_spike() {
        let filtered = StatsHelper::median_filter(&[1.0, 1.0, 9.0, 1.0, 1.0, 1.0], 5);
        assert!(filtered.iter().all(|&v| v == 1.0));
    }

    #[test]
    fn median_filter_mirrors_edges() {
        // Window at index 0 sees [b, a, a, b, c] = [2, 1, 1, 2, 3].
        let filtered = StatsHelper::median_filter(&[1.0, 2.0, 3.0, 10.0, 20.0], 5);
        assert_eq!(filtered[0], 2.0);
        assert_eq!(reflect_index(-1, 4), 0);
        assert_eq!(reflect_index(4, 4), 3);
        assert_eq!(reflect_index(-3, 1), 0);
    }
}
