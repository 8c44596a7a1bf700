//! Levenberg-Marquardt least squares for small parametric models.

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

use crate::prelude::{ReductionError, ReductionResult};

/// A scalar model `y = f(params; x)` with an analytic gradient.
pub trait Model {
    fn parameter_count(&self) -> usize;

    fn evaluate(&self, params: &[f64], x: f64) -> f64;

    /// Partial derivatives of `evaluate` with respect to each parameter.
    fn gradient(&self, params: &[f64], x: f64, out: &mut [f64]);

    /// Per-parameter lower bounds, enforced by projecting every step.
    fn lower_bounds(&self) -> Vec<Option<f64>> {
        vec![None; self.parameter_count()]
    }
}

/// Outcome of a least-squares fit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LsqFit {
    pub params: Vec<f64>,
    /// Parameter covariance scaled by the reduced chi-square; `None` when
    /// the normal matrix is singular or there are no spare degrees of freedom.
    pub covariance: Option<Vec<Vec<f64>>>,
    pub evaluations: usize,
    pub converged: bool,
    /// Sum of squared residuals at `params`.
    pub cost: f64,
}

impl LsqFit {
    /// One-sigma parameter errors from the covariance diagonal.
    pub fn errors(&self) -> Option<Vec<f64>> {
        self.covariance.as_ref().map(|cov| {
            cov.iter()
                .enumerate()
                .map(|(i, row)| row[i].max(0.0).sqrt())
                .collect()
        })
    }
}

#[derive(Debug, Clone)]
pub struct LevenbergMarquardt {
    pub max_evaluations: usize,
    pub ftol: f64,
    pub xtol: f64,
}

impl Default for LevenbergMarquardt {
    fn default() -> Self {
        Self {
            max_evaluations: 6000,
            ftol: 1.49012e-8,
            xtol: 1.49012e-8,
        }
    }
}

impl LevenbergMarquardt {
    pub fn with_max_evaluations(max_evaluations: usize) -> Self {
        Self {
            max_evaluations: max_evaluations.max(1),
            ..Default::default()
        }
    }

    pub fn fit<M: Model + ?Sized>(
        &self,
        model: &M,
        x: &[f64],
        y: &[f64],
        initial: &[f64],
    ) -> ReductionResult<LsqFit> {
        let k = model.parameter_count();
        if initial.len() != k {
            return Err(ReductionError::Internal(format!(
                "model takes {} parameters, {} given",
                k,
                initial.len()
            )));
        }
        if x.len() != y.len() || x.is_empty() {
            return Err(ReductionError::DegenerateInput(format!(
                "cannot fit {} x values against {} y values",
                x.len(),
                y.len()
            )));
        }

        let bounds = model.lower_bounds();
        let mut params = project(initial.to_vec(), &bounds);
        let mut cost = sum_of_squares(model, &params, x, y);
        if !cost.is_finite() {
            return Err(ReductionError::DegenerateInput(
                "model is not finite at the initial guess".into(),
            ));
        }
        let mut evaluations = 1;
        let mut damping = 1e-3;
        let mut converged = false;

        'outer: while evaluations < self.max_evaluations {
            if cost <= f64::MIN_POSITIVE {
                converged = true;
                break;
            }
            let (jacobian, residuals) = linearize(model, &params, x, y);
            let normal = jacobian.transpose() * &jacobian;
            let gradient = jacobian.transpose() * residuals;

            loop {
                let mut damped = normal.clone();
                for i in 0..k {
                    damped[(i, i)] += damping * normal[(i, i)].max(1e-12);
                }
                let step = match damped.lu().solve(&gradient) {
                    Some(step) => step,
                    None => {
                        damping *= 10.0;
                        if damping > 1e16 {
                            break 'outer;
                        }
                        continue;
                    }
                };
                let candidate = project(
                    params.iter().zip(step.iter()).map(|(p, s)| p + s).collect(),
                    &bounds,
                );
                let candidate_cost = sum_of_squares(model, &candidate, x, y);
                evaluations += 1;

                if candidate_cost.is_finite() && candidate_cost < cost {
                    let step_norm = step.norm();
                    let param_norm = params.iter().map(|p| p * p).sum::<f64>().sqrt();
                    let reduction = cost - candidate_cost;
                    params = candidate;
                    cost = candidate_cost;
                    damping = (damping / 10.0).max(1e-12);
                    if reduction <= self.ftol * cost
                        || step_norm <= self.xtol * (param_norm + self.xtol)
                    {
                        converged = true;
                        break 'outer;
                    }
                    break;
                }

                damping *= 10.0;
                if damping > 1e16 {
                    // No downhill step exists at machine precision.
                    converged = true;
                    break 'outer;
                }
                if evaluations >= self.max_evaluations {
                    break 'outer;
                }
            }
        }

        let covariance = covariance(model, &params, x, y, cost);
        Ok(LsqFit {
            params,
            covariance,
            evaluations,
            converged,
            cost,
        })
    }
}

fn project(mut params: Vec<f64>, bounds: &[Option<f64>]) -> Vec<f64> {
    for (p, bound) in params.iter_mut().zip(bounds) {
        if let Some(lower) = bound {
            if *p < *lower {
                *p = *lower;
            }
        }
    }
    params
}

fn sum_of_squares<M: Model + ?Sized>(model: &M, params: &[f64], x: &[f64], y: &[f64]) -> f64 {
    x.iter()
        .zip(y)
        .map(|(&xi, &yi)| (yi - model.evaluate(params, xi)).powi(2))
        .sum()
}

fn linearize<M: Model + ?Sized>(
    model: &M,
    params: &[f64],
    x: &[f64],
    y: &[f64],
) -> (DMatrix<f64>, DVector<f64>) {
    let k = params.len();
    let mut jacobian = DMatrix::zeros(x.len(), k);
    let mut residuals = DVector::zeros(x.len());
    let mut row = vec![0.0; k];
    for (i, (&xi, &yi)) in x.iter().zip(y).enumerate() {
        model.gradient(params, xi, &mut row);
        for (j, value) in row.iter().enumerate() {
            jacobian[(i, j)] = *value;
        }
        residuals[i] = yi - model.evaluate(params, xi);
    }
    (jacobian, residuals)
}

fn covariance<M: Model + ?Sized>(
    model: &M,
    params: &[f64],
    x: &[f64],
    y: &[f64],
    cost: f64,
) -> Option<Vec<Vec<f64>>> {
    let k = params.len();
    if x.len() <= k {
        return None;
    }
    let (jacobian, _) = linearize(model, params, x, y);
    let inverse = (jacobian.transpose() * jacobian).try_inverse()?;
    let scale = cost / (x.len() - k) as f64;
    let rows = (0..k)
        .map(|i| (0..k).map(|j| inverse[(i, j)] * scale).collect())
        .collect::<Vec<Vec<f64>>>();
    if rows.iter().flatten().all(|v: &f64| v.is_finite()) {
        Some(rows)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Exponential;

    impl Model for Exponential {
        fn parameter_count(&self) -> usize {
            2
        }

        fn evaluate(&self, params: &[f64], x: f64) -> f64 {
            params[0] * (params[1] * x).exp()
        }

        fn gradient(&self, params: &[f64], x: f64, out: &mut [f64]) {
            let e = (params[1] * x).exp();
            out[0] = e;
            out[1] = params[0] * x * e;
        }

        fn lower_bounds(&self) -> Vec<Option<f64>> {
            vec![Some(0.0), None]
        }
    }

    #[test]
    fn recovers_exponential_decay() {
        let x: Vec<f64> = (0..50).map(|i| i as f64 * 0.1).collect();
        let y: Vec<f64> = x.iter().map(|&xi| 3.0 * (-0.7 * xi).exp()).collect();
        let fit = LevenbergMarquardt::default()
            .fit(&Exponential, &x, &y, &[1.0, 0.0])
            .unwrap();
        assert!(fit.converged);
        assert!((fit.params[0] - 3.0).abs() < 1e-6);
        assert!((fit.params[1] + 0.7).abs() < 1e-6);
    }

    #[test]
    fn lower_bound_is_respected() {
        let x: Vec<f64> = (0..20).map(|i| i as f64).collect();
        let y = vec![-1.0; 20];
        let fit = LevenbergMarquardt::default()
            .fit(&Exponential, &x, &y, &[1.0, 0.0])
            .unwrap();
        assert!(fit.params[0] >= 0.0);
    }

    #[test]
    fn evaluation_cap_stops_fit() {
        let x: Vec<f64> = (0..50).map(|i| i as f64 * 0.1).collect();
        let y: Vec<f64> = x.iter().map(|&xi| 3.0 * (-0.7 * xi).exp()).collect();
        let fit = LevenbergMarquardt::with_max_evaluations(2)
            .fit(&Exponential, &x, &y, &[1.0, 0.0])
            .unwrap();
        assert!(!fit.converged);
        assert!(fit.evaluations <= 2);
    }

    #[test]
    fn mismatched_lengths_are_rejected() {
        let err = LevenbergMarquardt::default()
            .fit(&Exponential, &[0.0, 1.0], &[1.0], &[1.0, 0.0])
            .unwrap_err();
        assert!(matches!(err, ReductionError::DegenerateInput(_)));
    }
}
