//! Asymmetric least squares baseline (Eilers & Boelens, 2005).

use crate::math::banded::PentadiagonalSystem;
use crate::math::robust::{default_noise_window, windowed_min_std};
use crate::prelude::{PurgeDirections, ReductionConfig, ReductionError, ReductionResult};

use super::linear::{offset_fit, DEFAULT_MAX_EVALUATIONS};
use super::outliers::OutlierPurger;

/// Residuals within this many noise floors take part in the offset correction.
const OFFSET_WINDOW_SIGMAS: f64 = 10.0;

#[derive(Debug, Clone)]
pub struct AlsOptions {
    /// Stiffness: larger values give a baseline that bends less.
    pub lambda: f64,
    /// Asymmetry: weight given to samples above the baseline.
    pub p: f64,
    pub iterations: usize,
    pub purge: PurgeDirections,
    pub outlier_window: usize,
    pub outlier_threshold: f64,
    pub offset_correction: bool,
    pub max_fit_evaluations: usize,
}

impl Default for AlsOptions {
    fn default() -> Self {
        Self {
            lambda: 1e11,
            p: 0.001,
            iterations: 10,
            purge: PurgeDirections::BOTH,
            outlier_window: 5,
            outlier_threshold: 10.0,
            offset_correction: true,
            max_fit_evaluations: DEFAULT_MAX_EVALUATIONS,
        }
    }
}

impl AlsOptions {
    pub fn from_config(config: &ReductionConfig) -> Self {
        Self {
            lambda: config.als_lambda,
            p: config.als_p,
            iterations: config.als_iterations,
            outlier_window: config.outlier_window,
            outlier_threshold: config.outlier_threshold,
            max_fit_evaluations: config.max_fit_evaluations,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone)]
pub struct AlsBaseline {
    /// Input (after outlier purging) minus `baseline`.
    pub subtracted: Vec<f64>,
    /// Smooth baseline with the offset correction folded in.
    pub baseline: Vec<f64>,
    pub offset: f64,
    /// Samples replaced by the outlier purger.
    pub outliers: usize,
}

/// Smooth baseline `z` solving `(W + λ·DᵀD) z = W y`, re-weighting each round.
///
/// Samples above the current baseline get weight `p`, all others `1 - p`,
/// so no sample ever drops out of the system.
pub fn als_smooth(y: &[f64], lambda: f64, p: f64, iterations: usize) -> ReductionResult<Vec<f64>> {
    if y.is_empty() {
        return Err(ReductionError::DegenerateInput("empty series".into()));
    }
    if !(0.0..1.0).contains(&p) || p == 0.0 {
        return Err(ReductionError::DegenerateInput(format!(
            "asymmetry must lie in (0, 1), got {}",
            p
        )));
    }
    let penalty = PentadiagonalSystem::second_difference_penalty(y.len(), lambda);
    let mut weights = vec![1.0; y.len()];
    let mut z = y.to_vec();
    for _ in 0..iterations.max(1) {
        let rhs: Vec<f64> = weights.iter().zip(y).map(|(w, v)| w * v).collect();
        z = penalty.with_diagonal(&weights).solve(&rhs)?;
        for ((w, &v), &base) in weights.iter_mut().zip(y).zip(&z) {
            *w = if v > base { p } else { 1.0 - p };
        }
    }
    Ok(z)
}

pub fn baseline_als(x: &[f64], y: &[f64], options: &AlsOptions) -> ReductionResult<AlsBaseline> {
    if x.len() != y.len() {
        return Err(ReductionError::DegenerateInput(format!(
            "x has {} samples but y has {}",
            x.len(),
            y.len()
        )));
    }
    let purger = OutlierPurger {
        window: options.outlier_window,
        threshold: options.outlier_threshold,
        directions: options.purge,
    };
    let (y, outliers) = purger.purge_counted(y);
    let z = als_smooth(&y, options.lambda, options.p, options.iterations)?;
    let subtracted: Vec<f64> = y.iter().zip(&z).map(|(v, b)| v - b).collect();

    let offset = if options.offset_correction {
        running_mean_offset(x, &subtracted, options.max_fit_evaluations)?
    } else {
        0.0
    };

    Ok(AlsBaseline {
        subtracted: subtracted.iter().map(|v| v - offset).collect(),
        baseline: z.iter().map(|b| b + offset).collect(),
        offset,
        outliers,
    })
}

/// Constant level of the residuals that sit within the quiet noise band.
fn running_mean_offset(x: &[f64], residuals: &[f64], max_evaluations: usize) -> ReductionResult<f64> {
    let noise = windowed_min_std(residuals, default_noise_window(residuals.len()));
    let limit = OFFSET_WINDOW_SIGMAS * noise;
    let (mut good_x, mut good_y): (Vec<f64>, Vec<f64>) = x
        .iter()
        .zip(residuals)
        .filter(|(_, r)| r.abs() < limit)
        .map(|(&xi, &r)| (xi, r))
        .unzip();
    if good_x.is_empty() {
        good_x = x.to_vec();
        good_y = residuals.to_vec();
    }
    offset_fit(&good_x, &good_y, 0.0, max_evaluations)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn axis(len: usize) -> Vec<f64> {
        (0..len).map(|i| i as f64 * 0.1).collect()
    }

    fn wiggle(i: usize) -> f64 {
        0.01 * (((i * 7919) % 13) as f64 - 6.0)
    }

    #[test]
    fn symmetric_als_follows_a_line() {
        let x = axis(300);
        let y: Vec<f64> = x.iter().map(|&t| 2.5 * t - 4.0).collect();
        let options = AlsOptions {
            lambda: 1e5,
            p: 0.5,
            offset_correction: false,
            purge: PurgeDirections::NONE,
            ..Default::default()
        };
        let result = baseline_als(&x, &y, &options).unwrap();
        assert!(result.subtracted.iter().all(|r| r.abs() < 1e-3));
    }

    #[test]
    fn constant_input_gives_constant_baseline() {
        let x = axis(200);
        let y = vec![7.0; 200];
        let result = baseline_als(&x, &y, &AlsOptions::default()).unwrap();
        assert!(result.baseline.iter().all(|b| (b - 7.0).abs() < 1e-2));
        assert!(result.subtracted.iter().all(|r| r.abs() < 1e-2));
    }

    #[test]
    fn baseline_ignores_a_peak() {
        let x = axis(400);
        let y: Vec<f64> = x
            .iter()
            .enumerate()
            .map(|(i, &t)| 0.3 * t + 1.0 + 5.0 * (-(t - 20.0).powi(2) / 2.0).exp() + wiggle(i))
            .collect();
        let result = baseline_als(&x, &y, &AlsOptions::default()).unwrap();
        let peak = result.subtracted[200];
        assert!((peak - 5.0).abs() < 0.2, "peak {}", peak);
        assert!(result.subtracted[20].abs() < 0.2);
        assert!(result.subtracted[380].abs() < 0.2);
    }

    #[test]
    fn offset_correction_centres_the_noise() {
        let x = axis(400);
        let y: Vec<f64> = (0..400).map(|i| 3.0 + wiggle(i)).collect();
        let result = baseline_als(&x, &y, &AlsOptions::default()).unwrap();
        let mean = result.subtracted.iter().sum::<f64>() / 400.0;
        assert!(mean.abs() < 1e-3);
    }

    #[test]
    fn invalid_asymmetry_is_rejected() {
        assert!(als_smooth(&[1.0, 2.0, 3.0], 1.0, 0.0, 10).is_err());
        assert!(als_smooth(&[1.0, 2.0, 3.0], 1.0, 1.5, 10).is_err());
        assert!(als_smooth(&[], 1.0, 0.5, 10).is_err());
    }
}
