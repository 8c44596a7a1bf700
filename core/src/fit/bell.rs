//! Linear baseline plus a single bell, fitted jointly to a scan profile.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::math::lsq::{LevenbergMarquardt, LsqFit, Model};
use crate::math::stats::StatsHelper;
use crate::prelude::{ReductionError, ReductionResult};

use super::linear::linear_fun;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BellKind {
    /// Width is the standard deviation.
    Gauss,
    /// Width is the full width at half maximum.
    Lorentz,
}

impl FromStr for BellKind {
    type Err = ReductionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "gauss" => Ok(Self::Gauss),
            "lorentz" => Ok(Self::Lorentz),
            other => Err(ReductionError::InvalidKind(format!(
                "unknown bell kind '{}', expected gauss or lorentz",
                other
            ))),
        }
    }
}

impl fmt::Display for BellKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Gauss => write!(f, "gauss"),
            Self::Lorentz => write!(f, "lorentz"),
        }
    }
}

impl BellKind {
    pub fn evaluate(&self, amplitude: f64, center: f64, width: f64, x: f64) -> f64 {
        let dx = x - center;
        match self {
            Self::Gauss => amplitude * (-dx * dx / (2.0 * width * width)).exp(),
            Self::Lorentz => {
                let half = width / 2.0;
                amplitude * half * half / (dx * dx + half * half)
            }
        }
    }

    /// Derivatives with respect to amplitude, center and width.
    fn gradient(&self, amplitude: f64, center: f64, width: f64, x: f64) -> [f64; 3] {
        let dx = x - center;
        match self {
            Self::Gauss => {
                let s2 = width * width;
                let e = (-dx * dx / (2.0 * s2)).exp();
                [
                    e,
                    amplitude * e * dx / s2,
                    amplitude * e * dx * dx / (s2 * width),
                ]
            }
            Self::Lorentz => {
                let half = width / 2.0;
                let h2 = half * half;
                let denom = dx * dx + h2;
                [
                    h2 / denom,
                    2.0 * amplitude * h2 * dx / (denom * denom),
                    amplitude * half * dx * dx / (denom * denom),
                ]
            }
        }
    }
}

struct BaselinePlusBell(BellKind);

impl Model for BaselinePlusBell {
    fn parameter_count(&self) -> usize {
        5
    }

    fn evaluate(&self, p: &[f64], x: f64) -> f64 {
        linear_fun(x, p[0], p[1]) + self.0.evaluate(p[2], p[3], p[4], x)
    }

    fn gradient(&self, p: &[f64], x: f64, out: &mut [f64]) {
        out[0] = 1.0;
        out[1] = x;
        out[2..5].copy_from_slice(&self.0.gradient(p[2], p[3], p[4], x));
    }

    fn lower_bounds(&self) -> Vec<Option<f64>> {
        vec![None, None, Some(0.0), None, Some(f64::EPSILON)]
    }
}

/// Fitted baseline and bell, kept separable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BellFit {
    pub kind: BellKind,
    pub intercept: f64,
    pub slope: f64,
    pub amplitude: f64,
    pub center: f64,
    pub width: f64,
    /// Covariance of `[intercept, slope, amplitude, center, width]`.
    pub covariance: Option<Vec<Vec<f64>>>,
    pub evaluations: usize,
    pub converged: bool,
}

impl BellFit {
    fn from_lsq(kind: BellKind, fit: LsqFit) -> Self {
        let p = &fit.params;
        Self {
            kind,
            intercept: p[0],
            slope: p[1],
            amplitude: p[2],
            center: p[3],
            width: p[4],
            covariance: fit.covariance,
            evaluations: fit.evaluations,
            converged: fit.converged,
        }
    }

    pub fn baseline(&self, x: f64) -> f64 {
        linear_fun(x, self.intercept, self.slope)
    }

    pub fn bell(&self, x: f64) -> f64 {
        self.kind.evaluate(self.amplitude, self.center, self.width, x)
    }

    pub fn evaluate(&self, x: f64) -> f64 {
        self.baseline(x) + self.bell(x)
    }

    /// One-sigma error of the parameter at `index`, if the covariance exists.
    pub fn error(&self, index: usize) -> Option<f64> {
        self.covariance
            .as_ref()
            .and_then(|cov| cov.get(index))
            .and_then(|row| row.get(index))
            .map(|v| v.max(0.0).sqrt())
    }

    pub fn amplitude_error(&self) -> Option<f64> {
        self.error(2)
    }
}

/// Fits `q + m·x + bell(x)` to the profile.
///
/// Non-convergence is reported through [`BellFit::converged`]; the caller
/// decides whether it is fatal.
pub fn fit_baseline_plus_bell(
    x: &[f64],
    y: &[f64],
    kind: BellKind,
    max_evaluations: usize,
) -> ReductionResult<BellFit> {
    if x.len() != y.len() || x.len() < 5 {
        return Err(ReductionError::DegenerateInput(format!(
            "bell fit needs at least 5 paired samples, got {} x and {} y",
            x.len(),
            y.len()
        )));
    }
    let (ymin, ymax) = StatsHelper::min_max(y);
    let (xmin, xmax) = StatsHelper::min_max(x);
    let initial = [
        ymin,
        0.0,
        ymax - ymin,
        StatsHelper::mean(x),
        ((xmax - xmin) / 20.0).max(f64::EPSILON),
    ];
    let fit = LevenbergMarquardt::with_max_evaluations(max_evaluations).fit(
        &BaselinePlusBell(kind),
        x,
        y,
        &initial,
    )?;
    Ok(BellFit::from_lsq(kind, fit))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fit::linear::DEFAULT_MAX_EVALUATIONS;

    fn grid() -> Vec<f64> {
        (0..201).map(|i| -10.0 + i as f64 * 0.1).collect()
    }

    fn ripple(i: usize) -> f64 {
        0.01 * (i as f64 * 2.3).sin()
    }

    #[test]
    fn recovers_gaussian_on_a_slope() {
        let x = grid();
        let y: Vec<f64> = x
            .iter()
            .enumerate()
            .map(|(i, &t)| 1.0 + 0.02 * t + 5.0 * (-(t - 0.3).powi(2) / (2.0 * 1.44)).exp() + ripple(i))
            .collect();
        let fit = fit_baseline_plus_bell(&x, &y, BellKind::Gauss, DEFAULT_MAX_EVALUATIONS).unwrap();
        assert!(fit.converged);
        assert!((fit.amplitude - 5.0).abs() / 5.0 < 0.02);
        assert!((fit.center - 0.3).abs() < 0.02);
        assert!((fit.width - 1.2).abs() / 1.2 < 0.02);
        assert!((fit.slope - 0.02).abs() < 0.005);
        assert!(fit.amplitude_error().unwrap() < 0.1);
    }

    #[test]
    fn recovers_lorentzian() {
        let x = grid();
        let y: Vec<f64> = x
            .iter()
            .enumerate()
            .map(|(i, &t)| -2.0 + BellKind::Lorentz.evaluate(3.0, -1.0, 2.0, t) + ripple(i))
            .collect();
        let fit =
            fit_baseline_plus_bell(&x, &y, BellKind::Lorentz, DEFAULT_MAX_EVALUATIONS).unwrap();
        assert!(fit.converged);
        assert!((fit.amplitude - 3.0).abs() / 3.0 < 0.03);
        assert!((fit.center + 1.0).abs() < 0.02);
        assert!((fit.width - 2.0).abs() / 2.0 < 0.03);
    }

    #[test]
    fn lorentz_half_maximum_at_half_width() {
        let v = BellKind::Lorentz.evaluate(4.0, 1.0, 3.0, 2.5);
        assert!((v - 2.0).abs() < 1e-12);
    }

    #[test]
    fn unknown_kind_is_rejected() {
        let err = "bogus".parse::<BellKind>().unwrap_err();
        assert!(matches!(err, ReductionError::InvalidKind(_)));
        assert_eq!("lorentz".parse::<BellKind>().unwrap(), BellKind::Lorentz);
    }

    #[test]
    fn amplitude_stays_non_negative() {
        let x = grid();
        let y: Vec<f64> = x.iter().map(|&t| 2.0 - (-t * t / 2.0).exp()).collect();
        let fit = fit_baseline_plus_bell(&x, &y, BellKind::Gauss, DEFAULT_MAX_EVALUATIONS).unwrap();
        assert!(fit.amplitude >= 0.0);
        assert!(fit.width > 0.0);
    }
}
