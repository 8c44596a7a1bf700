use log::warn;

use crate::math::regions::contiguous_regions;
use crate::math::stats::StatsHelper;
use crate::prelude::{PurgeDirections, ReductionConfig};

/// Replaces transient spikes with values taken from their neighbourhood.
///
/// A sample is a spike when its distance from the running median exceeds
/// `threshold` times the MAD of all such distances. Strong, genuine peaks can
/// trip this as well, so callers choose the directions to inspect.
#[derive(Debug, Clone, Copy)]
pub struct OutlierPurger {
    pub window: usize,
    pub threshold: f64,
    pub directions: PurgeDirections,
}

impl Default for OutlierPurger {
    fn default() -> Self {
        Self {
            window: 5,
            threshold: 10.0,
            directions: PurgeDirections::BOTH,
        }
    }
}

impl OutlierPurger {
    pub fn new(directions: PurgeDirections) -> Self {
        Self {
            directions,
            ..Default::default()
        }
    }

    pub fn from_config(config: &ReductionConfig, directions: PurgeDirections) -> Self {
        Self {
            window: config.outlier_window,
            threshold: config.outlier_threshold,
            directions,
        }
    }

    /// Flags the spikes of `y`; all false when the residual MAD is zero.
    pub fn detect(&self, y: &[f64]) -> Vec<bool> {
        if !self.directions.any() || y.is_empty() {
            return vec![false; y.len()];
        }
        let smooth = StatsHelper::median_filter(y, self.window);
        let diffs: Vec<f64> = y.iter().zip(&smooth).map(|(v, s)| v - s).collect();
        let scale = StatsHelper::mad(&diffs);
        if scale <= 0.0 || !scale.is_finite() {
            return vec![false; y.len()];
        }
        let limit = self.threshold * scale;
        diffs
            .iter()
            .map(|&d| (self.directions.up && d > limit) || (self.directions.down && -d > limit))
            .collect()
    }

    pub fn purge(&self, y: &[f64]) -> Vec<f64> {
        self.purge_counted(y).0
    }

    /// Purged copy of `y` plus the number of samples replaced.
    pub fn purge_counted(&self, y: &[f64]) -> (Vec<f64>, usize) {
        let mut out = y.to_vec();
        let flags = self.detect(y);
        let count = flags.iter().filter(|&&f| f).count();
        if count == 0 {
            return (out, 0);
        }
        for run in contiguous_regions(&flags) {
            fill_run(&mut out, run);
        }
        warn!("Found {} outliers", count);
        (out, count)
    }
}

/// Convenience wrapper with the default window and threshold.
pub fn purge_outliers(y: &[f64], window: usize, up: bool, down: bool) -> Vec<f64> {
    OutlierPurger {
        window,
        directions: PurgeDirections { up, down },
        ..Default::default()
    }
    .purge(y)
}

/// Edge runs copy the nearest valid sample, interior runs are interpolated
/// linearly between the samples bracketing them.
fn fill_run(values: &mut [f64], [start, end]: [usize; 2]) {
    let len = values.len();
    match (start == 0, end >= len) {
        (true, true) => {}
        (true, false) => {
            let fill = values[end];
            values[start..end].iter_mut().for_each(|v| *v = fill);
        }
        (false, true) => {
            let fill = values[start - 1];
            values[start..].iter_mut().for_each(|v| *v = fill);
        }
        (false, false) => {
            let previous = values[start - 1];
            let next = values[end];
            let step = (next - previous) / (end - start + 1) as f64;
            for (k, v) in values[start..end].iter_mut().enumerate() {
                *v = previous + step * (k + 1) as f64;
            }
        }
    }
}
