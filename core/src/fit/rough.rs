use crate::math::robust::{default_noise_window, windowed_min_std};
use crate::math::stats::StatsHelper;
use crate::prelude::{ReductionError, ReductionResult};

use super::linear::{linear_fit, LineParams};

/// Fractions of the lowest samples used by the two detrending passes.
const PASS_FRACTIONS: [f64; 2] = [0.8, 0.15];

#[derive(Debug, Clone)]
pub struct RoughBaseline {
    pub detrended: Vec<f64>,
    pub baseline: Vec<f64>,
}

/// Removes a linear trend fitted to the lowest samples of the scan.
///
/// Each pass fits a line to the lowest fraction of the interior samples. When
/// that subset is not clearly quieter than the series noise floor the pass
/// uses every interior sample instead.
pub fn baseline_rough(
    x: &[f64],
    y: &[f64],
    start: Option<LineParams>,
    max_evaluations: usize,
) -> ReductionResult<RoughBaseline> {
    let n = y.len();
    if x.len() != n {
        return Err(ReductionError::DegenerateInput(format!(
            "x has {} samples but y has {}",
            x.len(),
            n
        )));
    }
    if n < 3 {
        return Err(ReductionError::DegenerateInput(format!(
            "rough baseline needs at least 3 samples, got {}",
            n
        )));
    }
    let start = start.unwrap_or_else(|| LineParams::new(StatsHelper::min_max(y).0, 0.0));

    let mut detrended = y.to_vec();
    let mut baseline = vec![0.0; n];
    let interior = 1..n - 1;
    let noise_floor = windowed_min_std(&y[interior.clone()], default_noise_window(n));

    for fraction in PASS_FRACTIONS {
        let values = &detrended[interior.clone()];
        let mut order: Vec<usize> = (0..values.len()).collect();
        order.sort_by(|&a, &b| values[a].total_cmp(&values[b]));
        let take = ((n as f64 * fraction) as usize).min(values.len());
        order.truncate(take);

        let selected: Vec<f64> = order.iter().map(|&i| values[i]).collect();
        if selected.len() < 2 || StatsHelper::std(&selected) < 2.0 * noise_floor {
            order = (0..values.len()).collect();
        } else {
            order.sort_unstable();
        }

        let fit_x: Vec<f64> = order.iter().map(|&i| x[i + 1]).collect();
        let fit_y: Vec<f64> = order.iter().map(|&i| values[i]).collect();
        let line = linear_fit(&fit_x, &fit_y, start, max_evaluations)?;

        for ((d, b), &xi) in detrended.iter_mut().zip(baseline.iter_mut()).zip(x) {
            let trend = line.at(xi);
            *d -= trend;
            *b += trend;
        }
    }

    Ok(RoughBaseline {
        detrended,
        baseline,
    })
}
