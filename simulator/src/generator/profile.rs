use anyhow::{ensure, Context};
use ndarray::Array2;
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use srtcore::calibration::{ScanAxis, ScanGeometry, ScanMeta};

use super::template::{bandpass, gaussian_beam, scan_offsets};

/// Description of one synthetic cross scan.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanPlan {
    pub source: String,
    pub axis: ScanAxis,
    pub reverse: bool,
    pub samples: usize,
    /// One channel gives a total-power scan.
    pub channels: usize,
    pub ra_deg: f64,
    pub dec_deg: f64,
    /// Length of the scan on the sky.
    pub span_deg: f64,
    /// Beam standard deviation on the sky.
    pub beam_deg: f64,
    /// Peak source counts, summed over the band.
    pub amplitude: f64,
    pub offset: f64,
    /// Baseline drift per second.
    pub drift: f64,
    pub noise: f64,
    /// Half-open channel range hit by pulsed interference.
    pub rfi_channels: Option<[usize; 2]>,
    pub rfi_amplitude: f64,
    pub frequency_mhz: f64,
    pub bandwidth_mhz: f64,
    pub duration_s: f64,
    pub time_mjd: f64,
    pub elevation_deg: f64,
}

impl Default for ScanPlan {
    fn default() -> Self {
        Self {
            source: "3C286".into(),
            axis: ScanAxis::Ra,
            reverse: false,
            samples: 160,
            channels: 64,
            ra_deg: 202.78,
            dec_deg: 30.51,
            span_deg: 1.0,
            beam_deg: 0.03,
            amplitude: 100.0,
            offset: 400.0,
            drift: 0.5,
            noise: 0.5,
            rfi_channels: None,
            rfi_amplitude: 200.0,
            frequency_mhz: 7000.0,
            bandwidth_mhz: 1024.0,
            duration_s: 20.0,
            time_mjd: 57000.0,
            elevation_deg: 45.0,
        }
    }
}

/// A generated scan: sky track, times and the `time x channel` counts.
#[derive(Debug, Clone)]
pub struct SyntheticScan {
    pub meta: ScanMeta,
    pub geometry: ScanGeometry,
    pub time: Vec<f64>,
    pub spectrum: Array2<f64>,
}

pub fn build_scan(plan: &ScanPlan, seed: u64) -> anyhow::Result<SyntheticScan> {
    ensure!(plan.samples >= 10, "a scan needs at least 10 samples");
    ensure!(plan.channels >= 1, "a scan needs at least one channel");
    ensure!(plan.beam_deg > 0.0, "beam width must be positive");

    let mut rng = StdRng::seed_from_u64(seed);
    let offsets = scan_offsets(plan.samples, plan.span_deg, plan.reverse);
    let cos_dec = plan.dec_deg.to_radians().cos();
    let (ra, dec): (Vec<f64>, Vec<f64>) = match plan.axis {
        ScanAxis::Ra => offsets
            .iter()
            .map(|o| (plan.ra_deg + o / cos_dec, plan.dec_deg))
            .unzip(),
        ScanAxis::Dec => offsets
            .iter()
            .map(|o| (plan.ra_deg, plan.dec_deg + o))
            .unzip(),
    };
    let geometry = ScanGeometry::new(ra, dec, plan.ra_deg, plan.dec_deg)
        .context("building synthetic scan track")?;

    let time: Vec<f64> = (0..plan.samples)
        .map(|i| plan.duration_s * i as f64 / plan.samples as f64)
        .collect();
    let gains: Vec<f64> = (0..plan.channels)
        .map(|c| bandpass(c, plan.channels))
        .collect();
    let gain_sum: f64 = gains.iter().sum();
    let noise = plan.noise.abs();

    let mut spectrum = Array2::zeros((plan.samples, plan.channels));
    for (row, (&offset, &t)) in offsets.iter().zip(&time).enumerate() {
        let total = plan.offset + plan.drift * t + plan.amplitude * gaussian_beam(offset, plan.beam_deg);
        let pulsed = row % 2 == 0;
        for (channel, &gain) in gains.iter().enumerate() {
            let jitter = if noise > 0.0 {
                rng.gen_range(-noise..noise)
            } else {
                0.0
            };
            let mut value = total * gain / gain_sum + jitter / (plan.channels as f64).sqrt();
            if let Some([lo, hi]) = plan.rfi_channels {
                if pulsed && (lo..hi).contains(&channel) {
                    value += plan.rfi_amplitude / plan.channels as f64;
                }
            }
            spectrum[(row, channel)] = value;
        }
    }

    Ok(SyntheticScan {
        meta: ScanMeta {
            source: plan.source.clone(),
            time: plan.time_mjd + plan.duration_s / 2.0 / 86400.0,
            frequency_mhz: plan.frequency_mhz,
            bandwidth_mhz: plan.bandwidth_mhz,
            elevation_deg: plan.elevation_deg,
        },
        geometry,
        time,
        spectrum,
    })
}

/// Alternating calibrator and target cross scans.
pub fn default_scans(count: usize) -> Vec<ScanPlan> {
    (0..count)
        .map(|i| {
            let calibrator = i % 4 < 2;
            let base = if calibrator {
                ScanPlan {
                    rfi_channels: Some([20, 23]),
                    ..Default::default()
                }
            } else {
                ScanPlan {
                    source: "W51".into(),
                    ra_deg: 290.92,
                    dec_deg: 14.51,
                    amplitude: 40.0,
                    ..Default::default()
                }
            };
            ScanPlan {
                axis: if i % 2 == 0 { ScanAxis::Ra } else { ScanAxis::Dec },
                reverse: (i / 4) % 2 == 1,
                time_mjd: base.time_mjd + i as f64 * 0.01,
                ..base
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generator_builds_expected_shape() {
        let plan = ScanPlan {
            samples: 50,
            channels: 8,
            ..Default::default()
        };
        let scan = build_scan(&plan, 7).unwrap();
        assert_eq!(scan.spectrum.dim(), (50, 8));
        assert_eq!(scan.time.len(), 50);
        assert_eq!(scan.geometry.scan_type(), "RA>");
    }

    #[test]
    fn same_seed_same_scan() {
        let plan = ScanPlan::default();
        let a = build_scan(&plan, 3).unwrap();
        let b = build_scan(&plan, 3).unwrap();
        let c = build_scan(&plan, 4).unwrap();
        assert_eq!(a.spectrum, b.spectrum);
        assert_ne!(a.spectrum, c.spectrum);
    }

    #[test]
    fn source_peaks_mid_scan() {
        let plan = ScanPlan {
            axis: ScanAxis::Dec,
            reverse: true,
            noise: 0.0,
            drift: 0.0,
            ..Default::default()
        };
        let scan = build_scan(&plan, 0).unwrap();
        assert_eq!(scan.geometry.scan_type(), "Dec<");
        let totals: Vec<f64> = scan.spectrum.rows().into_iter().map(|r| r.sum()).collect();
        let (peak, _) = totals
            .iter()
            .enumerate()
            .fold((0, f64::NEG_INFINITY), |best, (i, &v)| if v > best.1 { (i, v) } else { best });
        assert!((peak as i64 - 80).abs() <= 1);
        assert!((totals[peak] - 500.0).abs() < 1.0);
    }

    #[test]
    fn default_scans_mix_calibrators_and_targets() {
        let scans = default_scans(4);
        assert_eq!(scans[0].source, "3C286");
        assert_eq!(scans[2].source, "W51");
        assert_eq!(scans[1].axis, ScanAxis::Dec);
        assert!(build_scan(&ScanPlan { samples: 3, ..Default::default() }, 0).is_err());
    }
}
