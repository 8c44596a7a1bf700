use crate::prelude::{ReductionError, ReductionResult};

/// Symmetric positive-definite matrix with two bands above the diagonal.
///
/// Holds `W + λ·DᵀD` for the ALS smoother, where `D` is the second-difference
/// operator; solved by a banded Cholesky factorisation in O(n).
#[derive(Debug, Clone)]
pub struct PentadiagonalSystem {
    diag: Vec<f64>,
    upper1: Vec<f64>,
    upper2: Vec<f64>,
}

impl PentadiagonalSystem {
    /// `λ·DᵀD` for a series of `len` samples.
    pub fn second_difference_penalty(len: usize, lambda: f64) -> Self {
        let mut system = Self {
            diag: vec![0.0; len],
            upper1: vec![0.0; len.saturating_sub(1)],
            upper2: vec![0.0; len.saturating_sub(2)],
        };
        const STENCIL: [f64; 3] = [1.0, -2.0, 1.0];
        for row in 0..len.saturating_sub(2) {
            for p in 0..3 {
                for q in p..3 {
                    let value = lambda * STENCIL[p] * STENCIL[q];
                    match q - p {
                        0 => system.diag[row + p] += value,
                        1 => system.upper1[row + p] += value,
                        _ => system.upper2[row + p] += value,
                    }
                }
            }
        }
        system
    }

    pub fn len(&self) -> usize {
        self.diag.len()
    }

    pub fn is_empty(&self) -> bool {
        self.diag.is_empty()
    }

    /// Copy of the system with `weights` added on the diagonal.
    pub fn with_diagonal(&self, weights: &[f64]) -> Self {
        let mut system = self.clone();
        for (d, w) in system.diag.iter_mut().zip(weights) {
            *d += w;
        }
        system
    }

    pub fn solve(&self, rhs: &[f64]) -> ReductionResult<Vec<f64>> {
        let n = self.len();
        if rhs.len() != n {
            return Err(ReductionError::DegenerateInput(format!(
                "right-hand side has {} entries, system has {}",
                rhs.len(),
                n
            )));
        }

        let mut l0 = vec![0.0; n];
        let mut l1 = vec![0.0; n.saturating_sub(1)];
        let mut l2 = vec![0.0; n.saturating_sub(2)];
        for i in 0..n {
            let mut pivot = self.diag[i];
            if i >= 1 {
                pivot -= l1[i - 1] * l1[i - 1];
            }
            if i >= 2 {
                pivot -= l2[i - 2] * l2[i - 2];
            }
            if pivot <= 0.0 || !pivot.is_finite() {
                return Err(ReductionError::DegenerateInput(format!(
                    "banded system is not positive definite at row {}",
                    i
                )));
            }
            l0[i] = pivot.sqrt();
            if i + 1 < n {
                let coupling = if i >= 1 { l2[i - 1] * l1[i - 1] } else { 0.0 };
                l1[i] = (self.upper1[i] - coupling) / l0[i];
            }
            if i + 2 < n {
                l2[i] = self.upper2[i] / l0[i];
            }
        }

        let mut solution = vec![0.0; n];
        for i in 0..n {
            let mut acc = rhs[i];
            if i >= 1 {
                acc -= l1[i - 1] * solution[i - 1];
            }
            if i >= 2 {
                acc -= l2[i - 2] * solution[i - 2];
            }
            solution[i] = acc / l0[i];
        }
        for i in (0..n).rev() {
            let mut acc = solution[i];
            if i + 1 < n {
                acc -= l1[i] * solution[i + 1];
            }
            if i + 2 < n {
                acc -= l2[i] * solution[i + 2];
            }
            solution[i] = acc / l0[i];
        }
        Ok(solution)
    }
}
