//! Common baseline alignment of repeated scans over the same source.
//!
//! The first profile is the reference. Every other profile `i` receives a
//! correction `q_i + m_i·x` that is subtracted from its samples; the
//! corrections minimise the mean within-bin variance of the pooled samples.

use log::debug;
use serde::{Deserialize, Serialize};

use crate::math::simplex::{nelder_mead, SimplexOptions};
use crate::math::stats::StatsHelper;
use crate::prelude::{ReductionConfig, ReductionError, ReductionResult, SampleSeries};

#[derive(Debug, Clone)]
pub struct AlignOptions {
    pub bins: usize,
    /// Minimiser budget, multiplied by the number of free parameters.
    pub evaluations_per_parameter: usize,
    pub xtol: f64,
    pub ftol: f64,
}

impl Default for AlignOptions {
    fn default() -> Self {
        Self {
            bins: 20,
            evaluations_per_parameter: 1000,
            xtol: 1e-5,
            ftol: 1e-12,
        }
    }
}

impl AlignOptions {
    pub fn from_config(config: &ReductionConfig) -> Self {
        Self {
            bins: config.align_bins.max(1),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alignment {
    /// One entry per profile; the reference gets zero.
    pub offsets: Vec<f64>,
    pub slopes: Vec<f64>,
    pub variance_before: f64,
    pub variance_after: f64,
    pub evaluations: usize,
}

impl Alignment {
    /// Applies the correction of profile `index` to `y` sampled at `x`.
    pub fn correct(&self, index: usize, x: &[f64], y: &[f64]) -> Vec<f64> {
        let q = self.offsets.get(index).copied().unwrap_or(0.0);
        let m = self.slopes.get(index).copied().unwrap_or(0.0);
        x.iter().zip(y).map(|(xi, yi)| yi - (q + m * xi)).collect()
    }
}

/// Pooled samples with their bin index resolved once.
struct BinnedProfiles<'a> {
    profiles: &'a [SampleSeries],
    /// Per profile, per sample: bin index, or `None` past the last edge.
    membership: Vec<Vec<Option<usize>>>,
    bins: usize,
}

impl<'a> BinnedProfiles<'a> {
    fn new(profiles: &'a [SampleSeries], bins: usize) -> Self {
        let (lo, hi) = profiles
            .iter()
            .map(|p| StatsHelper::min_max(p.x()))
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), (a, b)| {
                (lo.min(a), hi.max(b))
            });
        let width = (hi - lo) / bins as f64;
        let membership = profiles
            .iter()
            .map(|p| {
                p.x()
                    .iter()
                    .map(|&x| {
                        if width <= 0.0 || !width.is_finite() {
                            return Some(0);
                        }
                        let bin = ((x - lo) / width).floor();
                        if bin >= 0.0 && (bin as usize) < bins {
                            Some(bin as usize)
                        } else {
                            None
                        }
                    })
                    .collect()
            })
            .collect();
        Self {
            profiles,
            membership,
            bins,
        }
    }

    /// Mean over non-empty bins of the population variance of the corrected
    /// samples. `offsets`/`slopes` skip the reference profile.
    fn total_variance(&self, offsets: &[f64], slopes: &[f64]) -> f64 {
        let mut buckets: Vec<Vec<f64>> = vec![Vec::new(); self.bins];
        for (index, (profile, bins)) in self.profiles.iter().zip(&self.membership).enumerate() {
            let (q, m) = if index == 0 {
                (0.0, 0.0)
            } else {
                (
                    offsets.get(index - 1).copied().unwrap_or(0.0),
                    slopes.get(index - 1).copied().unwrap_or(0.0),
                )
            };
            for ((&x, &y), bin) in profile.x().iter().zip(profile.y()).zip(bins) {
                if let Some(bin) = bin {
                    buckets[*bin].push(y - (q + m * x));
                }
            }
        }
        let variances: Vec<f64> = buckets
            .iter()
            .filter(|b| !b.is_empty())
            .map(|b| StatsHelper::variance(b))
            .filter(|v| v.is_finite())
            .collect();
        if variances.is_empty() {
            return f64::NAN;
        }
        StatsHelper::mean(&variances)
    }
}

/// Pooled within-bin variance of `profiles` after the given corrections.
pub fn total_variance(
    profiles: &[SampleSeries],
    offsets: &[f64],
    slopes: &[f64],
    bins: usize,
) -> f64 {
    BinnedProfiles::new(profiles, bins.max(1)).total_variance(offsets, slopes)
}

pub fn align(profiles: &[SampleSeries], options: &AlignOptions) -> ReductionResult<Alignment> {
    if profiles.is_empty() {
        return Err(ReductionError::DegenerateInput("no profiles to align".into()));
    }
    let binned = BinnedProfiles::new(profiles, options.bins.max(1));
    let free = profiles.len() - 1;
    let variance_before = binned.total_variance(&[], &[]);
    if free == 0 {
        return Ok(Alignment {
            offsets: vec![0.0],
            slopes: vec![0.0],
            variance_before,
            variance_after: variance_before,
            evaluations: 0,
        });
    }

    let pooled: Vec<f64> = profiles.iter().flat_map(|p| p.y().iter().copied()).collect();
    let (ymin, ymax) = StatsHelper::min_max(&pooled);
    let offset_step = ((ymax - ymin) / 10.0).max(1e-3);
    let xspan = profiles
        .iter()
        .map(|p| {
            let (lo, hi) = StatsHelper::min_max(p.x());
            hi - lo
        })
        .fold(0.0, f64::max)
        .max(1e-3);
    let slope_step = offset_step / xspan;

    let zero_slopes = vec![0.0; free];
    let stage_one = nelder_mead(
        |q| binned.total_variance(q, &zero_slopes),
        &vec![0.0; free],
        &vec![offset_step; free],
        &SimplexOptions {
            max_evaluations: options.evaluations_per_parameter * free,
            xtol: options.xtol,
            ftol: options.ftol,
        },
    );
    if !stage_one.converged {
        return Err(ReductionError::fit(
            "alignment offsets",
            format!("no convergence after {} evaluations", stage_one.evaluations),
        ));
    }
    debug!(
        "Offset-only alignment reached variance {:.6e}",
        stage_one.value
    );

    let mut start = stage_one.point.clone();
    start.extend(std::iter::repeat(0.0).take(free));
    let mut steps = vec![offset_step; free];
    steps.extend(std::iter::repeat(slope_step).take(free));
    let stage_two = nelder_mead(
        |p| binned.total_variance(&p[..free], &p[free..]),
        &start,
        &steps,
        &SimplexOptions {
            max_evaluations: options.evaluations_per_parameter * 2 * free,
            xtol: options.xtol,
            ftol: options.ftol,
        },
    );
    if !stage_two.converged {
        return Err(ReductionError::fit(
            "alignment offsets and slopes",
            format!("no convergence after {} evaluations", stage_two.evaluations),
        ));
    }

    let mut offsets = vec![0.0];
    offsets.extend_from_slice(&stage_two.point[..free]);
    let mut slopes = vec![0.0];
    slopes.extend_from_slice(&stage_two.point[free..]);
    Ok(Alignment {
        offsets,
        slopes,
        variance_before,
        variance_after: stage_two.value,
        evaluations: stage_one.evaluations + stage_two.evaluations,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bump(x: f64) -> f64 {
        3.0 * (-x * x / 4.0).exp()
    }

    fn profile(transform: impl Fn(f64) -> f64) -> SampleSeries {
        let x: Vec<f64> = (0..201).map(|i| -10.0 + i as f64 * 0.1).collect();
        let y = x.iter().map(|&t| bump(t) + transform(t)).collect();
        SampleSeries::new(x, y).unwrap()
    }

    #[test]
    fn undoes_injected_offsets_and_slopes() {
        let profiles = vec![
            profile(|_| 0.0),
            profile(|t| 0.5 + 0.1 * t),
            profile(|t| -0.3 - 0.05 * t),
        ];
        let alignment = align(&profiles, &AlignOptions::default()).unwrap();
        assert_eq!(alignment.offsets[0], 0.0);
        assert!((alignment.offsets[1] - 0.5).abs() < 0.02);
        assert!((alignment.slopes[1] - 0.1).abs() < 0.005);
        assert!((alignment.offsets[2] + 0.3).abs() < 0.02);
        assert!((alignment.slopes[2] + 0.05).abs() < 0.005);
        assert!(alignment.variance_after < alignment.variance_before);

        let corrected = alignment.correct(1, profiles[1].x(), profiles[1].y());
        assert!((corrected[100] - profiles[0].y()[100]).abs() < 0.05);
    }

    #[test]
    fn single_profile_is_untouched() {
        let profiles = vec![profile(|t| 0.2 * t)];
        let alignment = align(&profiles, &AlignOptions::default()).unwrap();
        assert_eq!(alignment.offsets, vec![0.0]);
        assert_eq!(alignment.evaluations, 0);
    }

    #[test]
    fn matching_correction_restores_variance() {
        let profiles = vec![profile(|_| 0.0), profile(|_| 0.0)];
        let variance = total_variance(&profiles, &[0.0], &[0.0], 20);
        assert!(variance > 0.0);
        let shifted = vec![profile(|_| 0.0), profile(|_| 1.0)];
        assert!(total_variance(&shifted, &[0.0], &[0.0], 20) > variance);
        assert!((total_variance(&shifted, &[1.0], &[0.0], 20) - variance).abs() < 1e-12);
    }

    #[test]
    fn empty_bins_are_ignored() {
        let a = SampleSeries::new(vec![0.0, 0.1, 9.9, 10.0], vec![1.0, 1.0, 2.0, 2.0]).unwrap();
        // Only the first and last populated bins contribute; both are constant.
        assert_eq!(total_variance(&[a], &[], &[], 20), 0.0);
    }

    #[test]
    fn exhausted_budget_is_reported() {
        let profiles = vec![
            profile(|_| 0.0),
            profile(|t| 0.5 + 0.1 * t),
            profile(|t| -0.3 - 0.05 * t),
        ];
        let options = AlignOptions {
            evaluations_per_parameter: 2,
            ..Default::default()
        };
        let err = align(&profiles, &options).unwrap_err();
        assert!(matches!(err, ReductionError::Fit { ref stage, .. } if stage == "alignment offsets"));
    }

    #[test]
    fn no_profiles_is_degenerate() {
        assert!(matches!(
            align(&[], &AlignOptions::default()),
            Err(ReductionError::DegenerateInput(_))
        ));
    }
}
