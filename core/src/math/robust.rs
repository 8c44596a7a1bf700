//! Noise-floor estimates over sliding windows.
//!
//! On a noisy series the quietest stretch is the best proxy for the intrinsic
//! noise, so both estimators report the minimum over all windows.

use super::stats::StatsHelper;

/// Minimum standard deviation over every window of `window` samples.
///
/// Series shorter than five windows fall back to the standard deviation of the
/// first differences of the whole series.
pub fn windowed_min_std(series: &[f64], window: usize) -> f64 {
    let window = window.max(1);
    if series.len() < window * 5 {
        if series.len() < 2 {
            return 0.0;
        }
        let diffs: Vec<f64> = series.windows(2).map(|w| w[1] - w[0]).collect();
        return StatsHelper::std(&diffs);
    }
    series
        .windows(window)
        .map(StatsHelper::std)
        .fold(f64::INFINITY, f64::min)
}

/// Minimum MAD over every window of `window` samples.
///
/// Series shorter than three windows fall back to the MAD of the whole series.
pub fn windowed_min_mad(series: &[f64], window: usize) -> f64 {
    let window = window.max(1);
    if series.len() < window * 3 {
        if series.is_empty() {
            return 0.0;
        }
        return StatsHelper::mad(series);
    }
    series
        .windows(window)
        .map(StatsHelper::mad)
        .fold(f64::INFINITY, f64::min)
}

/// Window used by the baseline estimators: a twentieth of the scan, at least 20.
pub fn default_noise_window(len: usize) -> usize {
    (len / 20).max(20)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alternating_with_quiet_middle() -> Vec<f64> {
        (0..300)
            .map(|i| {
                let noise = if (100..200).contains(&i) { 0.01 } else { 1.0 };
                if i % 2 == 0 {
                    noise
                } else {
                    -noise
                }
            })
            .collect()
    }

    #[test]
    fn min_std_finds_quiet_interval() {
        let std = windowed_min_std(&alternating_with_quiet_middle(), 20);
        assert!((std - 0.01).abs() < 1e-9);
    }

    #[test]
    fn min_std_short_series_uses_differences() {
        let series = [0.0, 1.0, 0.0, 1.0, 0.0];
        // Differences alternate +1/-1.
        assert!((windowed_min_std(&series, 20) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn min_mad_finds_quiet_interval() {
        let mad = windowed_min_mad(&alternating_with_quiet_middle(), 20);
        assert!((mad - 0.01 / 0.6745).abs() < 1e-9);
    }

    #[test]
    fn min_mad_short_series_uses_whole_series() {
        let series = [1.0, 2.0, 3.0, 4.0, 5.0];
        assert_eq!(windowed_min_mad(&series, 20), StatsHelper::mad(&series));
    }

    #[test]
    fn default_window_has_floor() {
        assert_eq!(default_noise_window(100), 20);
        assert_eq!(default_noise_window(1000), 50);
    }
}
