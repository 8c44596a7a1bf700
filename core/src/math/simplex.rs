//! Derivative-free minimisation with the Nelder-Mead simplex.

#[derive(Debug, Clone)]
pub struct SimplexOptions {
    pub max_evaluations: usize,
    /// Largest coordinate spread of the simplex accepted as converged.
    pub xtol: f64,
    /// Largest objective spread of the simplex accepted as converged,
    /// relative to the best value once that exceeds one.
    pub ftol: f64,
}

impl Default for SimplexOptions {
    fn default() -> Self {
        Self {
            max_evaluations: 10_000,
            xtol: 1e-8,
            ftol: 1e-12,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Minimum {
    pub point: Vec<f64>,
    pub value: f64,
    pub evaluations: usize,
    pub converged: bool,
}

/// Minimises `objective` starting from `start`, with the initial simplex
/// spanning `steps` along each axis. Non-finite objective values count as +inf.
pub fn nelder_mead(
    objective: impl Fn(&[f64]) -> f64,
    start: &[f64],
    steps: &[f64],
    options: &SimplexOptions,
) -> Minimum {
    let dim = start.len();
    let eval = |point: &[f64]| {
        let value = objective(point);
        if value.is_finite() {
            value
        } else {
            f64::INFINITY
        }
    };

    let mut vertices: Vec<Vec<f64>> = Vec::with_capacity(dim + 1);
    vertices.push(start.to_vec());
    for axis in 0..dim {
        let mut vertex = start.to_vec();
        let step = steps.get(axis).copied().unwrap_or(1.0);
        vertex[axis] += if step != 0.0 { step } else { 1.0 };
        vertices.push(vertex);
    }
    let mut values: Vec<f64> = vertices.iter().map(|v| eval(v)).collect();
    let mut evaluations = values.len();
    let mut converged = dim == 0;

    while !converged && evaluations < options.max_evaluations {
        let mut order: Vec<usize> = (0..=dim).collect();
        order.sort_by(|&a, &b| values[a].total_cmp(&values[b]));
        vertices = order.iter().map(|&i| vertices[i].clone()).collect();
        values = order.iter().map(|&i| values[i]).collect();

        let x_spread = vertices[1..]
            .iter()
            .flat_map(|v| v.iter().zip(&vertices[0]).map(|(a, b)| (a - b).abs()))
            .fold(0.0, f64::max);
        let f_spread = values[1..]
            .iter()
            .map(|v| (v - values[0]).abs())
            .fold(0.0, f64::max);
        if x_spread <= options.xtol && f_spread <= options.ftol * values[0].abs().max(1.0) {
            converged = true;
            break;
        }

        let centroid: Vec<f64> = (0..dim)
            .map(|axis| vertices[..dim].iter().map(|v| v[axis]).sum::<f64>() / dim as f64)
            .collect();
        let along = |scale: f64| -> Vec<f64> {
            centroid
                .iter()
                .zip(&vertices[dim])
                .map(|(c, w)| c + scale * (w - c))
                .collect()
        };

        let reflected = along(-1.0);
        let reflected_value = eval(&reflected);
        evaluations += 1;

        if reflected_value < values[0] {
            let expanded = along(-2.0);
            let expanded_value = eval(&expanded);
            evaluations += 1;
            if expanded_value < reflected_value {
                vertices[dim] = expanded;
                values[dim] = expanded_value;
            } else {
                vertices[dim] = reflected;
                values[dim] = reflected_value;
            }
            continue;
        }
        if reflected_value < values[dim - 1] {
            vertices[dim] = reflected;
            values[dim] = reflected_value;
            continue;
        }

        let contracted = if reflected_value < values[dim] {
            along(-0.5)
        } else {
            along(0.5)
        };
        let contracted_value = eval(&contracted);
        evaluations += 1;
        if contracted_value < values[dim].min(reflected_value) {
            vertices[dim] = contracted;
            values[dim] = contracted_value;
            continue;
        }

        let best = vertices[0].clone();
        for i in 1..=dim {
            vertices[i] = best
                .iter()
                .zip(&vertices[i])
                .map(|(b, v)| b + 0.5 * (v - b))
                .collect();
            values[i] = eval(&vertices[i]);
        }
        evaluations += dim;
    }

    let best = (0..=dim)
        .min_by(|&a, &b| values[a].total_cmp(&values[b]))
        .unwrap_or(0);
    Minimum {
        point: vertices[best].clone(),
        value: values[best],
        evaluations,
        converged,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimises_shifted_quadratic() {
        let minimum = nelder_mead(
            |p| (p[0] - 1.5).powi(2) + 3.0 * (p[1] + 0.5).powi(2) + 0.2,
            &[0.0, 0.0],
            &[0.5, 0.5],
            &SimplexOptions::default(),
        );
        assert!(minimum.converged);
        assert!((minimum.point[0] - 1.5).abs() < 1e-6);
        assert!((minimum.point[1] + 0.5).abs() < 1e-6);
        assert!((minimum.value - 0.2).abs() < 1e-10);
    }

    #[test]
    fn minimises_rosenbrock() {
        let minimum = nelder_mead(
            |p| (1.0 - p[0]).powi(2) + 100.0 * (p[1] - p[0] * p[0]).powi(2),
            &[-1.2, 1.0],
            &[0.1, 0.1],
            &SimplexOptions::default(),
        );
        assert!(minimum.converged);
        assert!((minimum.point[0] - 1.0).abs() < 1e-4);
        assert!((minimum.point[1] - 1.0).abs() < 1e-4);
    }

    #[test]
    fn reports_exhausted_budget() {
        let options = SimplexOptions {
            max_evaluations: 10,
            ..Default::default()
        };
        let minimum = nelder_mead(|p| p.iter().map(|v| v * v).sum(), &[5.0; 4], &[1.0; 4], &options);
        assert!(!minimum.converged);
    }
}
