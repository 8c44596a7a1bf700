use serde::{Deserialize, Serialize};

use crate::math::lsq::{LevenbergMarquardt, Model};
use crate::prelude::{ReductionError, ReductionResult};

pub const DEFAULT_MAX_EVALUATIONS: usize = 6000;

/// `y = slope * x + intercept`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct LineParams {
    pub intercept: f64,
    pub slope: f64,
}

impl LineParams {
    pub fn new(intercept: f64, slope: f64) -> Self {
        Self { intercept, slope }
    }

    pub fn at(&self, x: f64) -> f64 {
        linear_fun(x, self.intercept, self.slope)
    }
}

pub fn linear_fun(x: f64, intercept: f64, slope: f64) -> f64 {
    slope * x + intercept
}

struct LinearModel;

impl Model for LinearModel {
    fn parameter_count(&self) -> usize {
        2
    }

    fn evaluate(&self, params: &[f64], x: f64) -> f64 {
        linear_fun(x, params[0], params[1])
    }

    fn gradient(&self, _params: &[f64], x: f64, out: &mut [f64]) {
        out[0] = 1.0;
        out[1] = x;
    }
}

struct OffsetModel;

impl Model for OffsetModel {
    fn parameter_count(&self) -> usize {
        1
    }

    fn evaluate(&self, params: &[f64], _x: f64) -> f64 {
        params[0]
    }

    fn gradient(&self, _params: &[f64], _x: f64, out: &mut [f64]) {
        out[0] = 1.0;
    }
}

/// Least-squares line through (x, y) starting from `start`.
pub fn linear_fit(
    x: &[f64],
    y: &[f64],
    start: LineParams,
    max_evaluations: usize,
) -> ReductionResult<LineParams> {
    let fit = LevenbergMarquardt::with_max_evaluations(max_evaluations).fit(
        &LinearModel,
        x,
        y,
        &[start.intercept, start.slope],
    )?;
    if !fit.converged {
        return Err(ReductionError::fit(
            "linear fit",
            format!("no convergence after {} evaluations", fit.evaluations),
        ));
    }
    Ok(LineParams::new(fit.params[0], fit.params[1]))
}

/// Least-squares constant through (x, y) starting from `start`.
pub fn offset_fit(x: &[f64], y: &[f64], start: f64, max_evaluations: usize) -> ReductionResult<f64> {
    let fit = LevenbergMarquardt::with_max_evaluations(max_evaluations).fit(
        &OffsetModel,
        x,
        y,
        &[start],
    )?;
    if !fit.converged {
        return Err(ReductionError::fit(
            "offset fit",
            format!("no convergence after {} evaluations", fit.evaluations),
        ));
    }
    Ok(fit.params[0])
}
