//! RFI rejection for spectroscopic scans based on channel variability.
//!
//! Each channel's relative r.m.s. over the scan is compared with a smooth
//! floor fitted through all channels; channels far above the floor are
//! replaced with their neighbours before the light curve is formed.

use ndarray::{Array1, Array2, ArrayView2, Axis};
use serde::{Deserialize, Serialize};

use crate::fit::als::{als_smooth, baseline_als, AlsOptions};
use crate::fit::outliers::OutlierPurger;
use crate::math::regions::contiguous_regions;
use crate::math::robust::windowed_min_mad;
use crate::math::stats::StatsHelper;
use crate::prelude::{
    check_order, ProcessingStage, PurgeDirections, ReductionConfig, ReductionError,
    ReductionResult, StageInput, StageMetadata, StageOutput,
};
use crate::telemetry::log::LogManager;

/// Window of the reference MAD on the variability curve.
const REFERENCE_MAD_WINDOW: usize = 20;

/// Usable part of the band, referred to the local oscillator.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FrequencyRange {
    pub freqmin: f64,
    pub freqmax: f64,
    pub binmin: usize,
    /// Exclusive upper channel.
    pub binmax: usize,
}

impl FrequencyRange {
    pub fn width(&self) -> f64 {
        self.freqmax - self.freqmin
    }

    pub fn contains_bin(&self, bin: usize) -> bool {
        bin >= self.binmin && bin < self.binmax
    }
}

/// Resolves a frequency range text against a band of `nbin` channels.
///
/// `None` or `"default"` keeps 10%-90% of the band, `":"` or `"all"` the whole
/// band, and `"f0:f1"` the given MHz bounds.
pub fn interpret_frequency_range(
    text: Option<&str>,
    bandwidth: f64,
    nbin: usize,
) -> ReductionResult<FrequencyRange> {
    if bandwidth <= 0.0 || !bandwidth.is_finite() {
        return Err(ReductionError::InvalidRange(format!(
            "bandwidth must be positive, got {}",
            bandwidth
        )));
    }
    let (freqmin, freqmax) = match text.map(str::trim) {
        None | Some("default") => (bandwidth / 10.0, bandwidth * 0.9),
        Some(":") | Some("all") => (0.0, bandwidth),
        Some(other) => parse_bounds(other)?,
    };
    if freqmin < 0.0 || freqmax <= freqmin {
        return Err(ReductionError::InvalidRange(format!(
            "{}:{} is not an increasing, non-negative interval",
            freqmin, freqmax
        )));
    }
    let to_bin = |freq: f64| (nbin as f64 * freq / bandwidth).floor();
    let binmin = to_bin(freqmin) as usize;
    let binmax = (to_bin(freqmax) - 1.0).max(0.0) as usize;
    if binmax <= binmin || binmax >= nbin {
        return Err(ReductionError::InvalidRange(format!(
            "{}:{} MHz maps to channels {}..{} of {}",
            freqmin, freqmax, binmin, binmax, nbin
        )));
    }
    Ok(FrequencyRange {
        freqmin,
        freqmax,
        binmin,
        binmax,
    })
}

fn parse_bounds(text: &str) -> ReductionResult<(f64, f64)> {
    let mut parts = text.split(':');
    let (Some(lo), Some(hi), None) = (parts.next(), parts.next(), parts.next()) else {
        return Err(ReductionError::InvalidRange(format!(
            "expected 'f0:f1', got '{}'",
            text
        )));
    };
    let parse = |part: &str| {
        part.trim()
            .parse::<f64>()
            .map_err(|e| ReductionError::InvalidRange(format!("'{}': {}", text, e)))
    };
    Ok((parse(lo)?, parse(hi)?))
}

/// Intermediate curves of one cleaning pass, for inspection only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CleanDiagnostics {
    pub raw_lc: Vec<f64>,
    pub masked_lc: Vec<f64>,
    pub spectral_var: Vec<f64>,
    pub var_baseline: Vec<f64>,
    pub threshold: Vec<f64>,
    pub median_var: f64,
    pub reference_mad: f64,
    pub bad_intervals: Vec<[usize; 2]>,
}

#[derive(Debug, Clone)]
pub struct CleanResult {
    pub lc: Vec<f64>,
    pub freqmin: f64,
    pub freqmax: f64,
    pub range: FrequencyRange,
    /// True for every channel that went into the light curve.
    pub mask: Vec<bool>,
    pub diagnostics: Option<CleanDiagnostics>,
}

impl CleanResult {
    pub fn masked_channels(&self) -> usize {
        (self.range.binmin..self.range.binmax)
            .filter(|&bin| !self.mask[bin])
            .count()
    }
}

/// Cleans a `time x channel` spectrum and returns its light curve.
///
/// `length` is the scan duration in seconds and `bandwidth` is in MHz.
/// Returns `Ok(None)` for single-channel data, where there is nothing to clean.
/// Spectra too narrow for the configured range to hold a channel are
/// `InvalidRange`; the default 10%-90% range needs at least three channels.
pub fn clean_scan_using_variability(
    spectrum: ArrayView2<'_, f64>,
    length: f64,
    bandwidth: f64,
    good_mask: Option<&[bool]>,
    config: &ReductionConfig,
) -> ReductionResult<Option<CleanResult>> {
    let (nrows, nbin) = spectrum.dim();
    if nbin <= 1 {
        return Ok(None);
    }
    if nrows < 2 {
        return Err(ReductionError::DegenerateInput(format!(
            "a spectrum needs at least two samples, got {}",
            nrows
        )));
    }
    if let Some(mask) = good_mask {
        if mask.len() != nbin {
            return Err(ReductionError::DegenerateInput(format!(
                "good mask has {} channels, spectrum has {}",
                mask.len(),
                nbin
            )));
        }
    }
    let logger = LogManager::for_stage("clean");
    let times: Vec<f64> = (0..nrows)
        .map(|i| length * i as f64 / nrows as f64)
        .collect();
    let range = interpret_frequency_range(config.freqsplat.as_deref(), bandwidth, nbin)?;
    let freqmask: Vec<bool> = (0..nbin).map(|bin| range.contains_bin(bin)).collect();

    let spectral_var = relative_variability(spectrum);
    let usable: Vec<bool> = spectral_var.iter().map(|v| v.is_finite()).collect();
    let unusable = usable.iter().filter(|u| !**u).count();
    if unusable == nbin {
        return Err(ReductionError::DegenerateInput(
            "every channel has a zero or non-finite mean".into(),
        ));
    }
    if unusable > 0 {
        logger.warn(&format!(
            "{} channels have a zero or non-finite mean and are excluded",
            unusable
        ));
    }

    // Unusable channels stand at the median so they do not drag the floor.
    let in_range: Vec<f64> = (range.binmin..range.binmax)
        .map(|bin| spectral_var[bin])
        .filter(|v| v.is_finite())
        .collect();
    if in_range.is_empty() {
        return Err(ReductionError::DegenerateInput(
            "no usable channel inside the frequency range".into(),
        ));
    }
    let median_var = StatsHelper::median(&in_range);
    let masked_var: Vec<f64> = spectral_var[range.binmin..range.binmax]
        .iter()
        .map(|&v| if v.is_finite() { v } else { median_var })
        .collect();
    let reference_mad = windowed_min_mad(&masked_var, REFERENCE_MAD_WINDOW);

    let lambda = 10f64.powf(-6.2 + 1.2 * (nbin as f64).log2());
    let purger = OutlierPurger::from_config(config, config.variability_purge);
    let floor = als_smooth(
        &purger.purge(&masked_var),
        lambda,
        config.variability_p,
        config.variability_iterations,
    )?;
    let first = floor[0];
    let last = floor[floor.len() - 1];
    let var_baseline: Vec<f64> = (0..nbin)
        .map(|bin| {
            if bin < range.binmin {
                first
            } else if bin >= range.binmax {
                last
            } else {
                floor[bin - range.binmin]
            }
        })
        .collect();

    let threshold: Vec<f64> = var_baseline
        .iter()
        .map(|b| b + 2.0 * config.noise_threshold * reference_mad)
        .collect();
    let mut mask: Vec<bool> = (0..nbin)
        .map(|bin| {
            freqmask[bin]
                && usable[bin]
                && (config.nofilt || spectral_var[bin] < threshold[bin])
        })
        .collect();
    if let Some(good) = good_mask {
        for (m, &keep) in mask.iter_mut().zip(good) {
            *m |= keep;
        }
    }

    let bad: Vec<bool> = mask.iter().map(|m| !m).collect();
    let bad_intervals = contiguous_regions(&bad);
    let cleaned = fill_bad_channels(spectrum, &bad_intervals);

    let lc_options = AlsOptions {
        purge: PurgeDirections::NONE,
        ..AlsOptions::from_config(config)
    };
    let lc = baseline_als(&times, &band_sum(cleaned.view(), &freqmask), &lc_options)?.subtracted;

    let diagnostics = if config.enable_diagnostics {
        let raw_options = AlsOptions {
            purge: PurgeDirections::BOTH,
            ..lc_options.clone()
        };
        let all = vec![true; nbin];
        Some(CleanDiagnostics {
            raw_lc: baseline_als(&times, &band_sum(spectrum, &all), &raw_options)?.subtracted,
            masked_lc: baseline_als(&times, &band_sum(spectrum, &freqmask), &lc_options)?
                .subtracted,
            spectral_var: spectral_var.clone(),
            var_baseline,
            threshold,
            median_var,
            reference_mad,
            bad_intervals: bad_intervals.clone(),
        })
    } else {
        None
    };

    let result = CleanResult {
        lc,
        freqmin: range.freqmin,
        freqmax: range.freqmax,
        range,
        mask,
        diagnostics,
    };
    logger.detail(&format!(
        "{} of {} channels masked in {:.1}-{:.1} MHz",
        result.masked_channels(),
        range.binmax - range.binmin,
        range.freqmin,
        range.freqmax
    ));
    Ok(Some(result))
}

/// Per channel: r.m.s. deviation from the channel mean, over the mean.
fn relative_variability(spectrum: ArrayView2<'_, f64>) -> Vec<f64> {
    spectrum
        .axis_iter(Axis(1))
        .map(|column| {
            let mean = column.mean().unwrap_or(f64::NAN);
            if mean == 0.0 || !mean.is_finite() {
                return f64::NAN;
            }
            let rms = column.mapv(|v| (v - mean).powi(2)).mean().unwrap_or(f64::NAN).sqrt();
            rms / mean
        })
        .collect()
}

/// Edge runs copy the nearest valid channel; interior runs take the mean of
/// the two channels around them.
fn fill_bad_channels(spectrum: ArrayView2<'_, f64>, bad_intervals: &[[usize; 2]]) -> Array2<f64> {
    let nbin = spectrum.ncols();
    let mut cleaned = spectrum.to_owned();
    for &[start, end] in bad_intervals {
        let fill: Array1<f64> = if start == 0 && end >= nbin {
            continue;
        } else if start == 0 {
            spectrum.column(end).to_owned()
        } else if end >= nbin {
            spectrum.column(start - 1).to_owned()
        } else {
            (&spectrum.column(start - 1) + &spectrum.column(end)) / 2.0
        };
        for bin in start..end.min(nbin) {
            cleaned.column_mut(bin).assign(&fill);
        }
    }
    cleaned
}

fn band_sum(spectrum: ArrayView2<'_, f64>, channels: &[bool]) -> Vec<f64> {
    spectrum
        .axis_iter(Axis(0))
        .map(|row| {
            row.iter()
                .zip(channels)
                .filter(|(_, keep)| **keep)
                .map(|(v, _)| v)
                .sum()
        })
        .collect()
}

/// Replaces each spectrum by its RFI-cleaned light curve ("clean and splat").
pub struct CleaningStage {
    config: Option<ReductionConfig>,
    good_mask: Option<Vec<bool>>,
    logger: LogManager,
}

impl CleaningStage {
    pub fn new() -> Self {
        Self {
            config: None,
            good_mask: None,
            logger: LogManager::for_stage("clean"),
        }
    }

    /// Channels that are never flagged, e.g. those carrying a spectral line.
    pub fn with_good_mask(mut self, good_mask: Vec<bool>) -> Self {
        self.good_mask = Some(good_mask);
        self
    }
}

impl Default for CleaningStage {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessingStage for CleaningStage {
    fn initialize(&mut self, config: &ReductionConfig) -> ReductionResult<()> {
        self.config = Some(config.clone());
        Ok(())
    }

    fn execute(&mut self, input: StageInput) -> ReductionResult<StageOutput> {
        let config = self
            .config
            .as_ref()
            .ok_or_else(|| ReductionError::Internal("stage not initialized".into()))?;
        check_order(&input.time)?;
        if input.time.len() != input.samples.nrows() {
            return Err(ReductionError::DegenerateInput(format!(
                "{} times for {} spectra",
                input.time.len(),
                input.samples.nrows()
            )));
        }

        let passthrough = |input: StageInput, note: &str| StageOutput {
            time: input.time,
            samples: input.samples,
            bandwidth_mhz: input.bandwidth_mhz,
            metadata: StageMetadata {
                notes: vec![note.to_string()],
                ..Default::default()
            },
        };

        if config.filtering_factor > 0.5 {
            self.logger.warn(&format!(
                "Don't use filtering factors > 0.5 (got {}). Skipping cleaning",
                config.filtering_factor
            ));
            return Ok(passthrough(input, "cleaning skipped"));
        }

        let length = match (input.time.first(), input.time.last()) {
            (Some(first), Some(last)) => last - first,
            _ => 0.0,
        };
        let result = clean_scan_using_variability(
            input.samples.view(),
            length,
            input.bandwidth_mhz,
            self.good_mask.as_deref(),
            config,
        )?;
        let Some(result) = result else {
            return Ok(passthrough(input, "single channel"));
        };

        let masked = result.masked_channels();
        self.logger.record(&format!(
            "cleaned {} spectra, {} channels masked",
            input.time.len(),
            masked
        ));
        let output = StageInput::light_curve(input.time, result.lc, result.range.width());
        Ok(StageOutput {
            time: output.time,
            samples: output.samples,
            bandwidth_mhz: output.bandwidth_mhz,
            metadata: StageMetadata {
                frequency_range: Some(result.range),
                masked_channels: Some(masked),
                diagnostics: result.diagnostics,
                notes: vec![format!("{:.1}-{:.1} MHz", result.freqmin, result.freqmax)],
                ..Default::default()
            },
        })
    }

    fn cleanup(&mut self) {
        self.config = None;
    }
}
