use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::processing::variability::{CleanDiagnostics, FrequencyRange};

/// Which side of the running median the outlier purger inspects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurgeDirections {
    pub up: bool,
    pub down: bool,
}

impl PurgeDirections {
    pub const BOTH: Self = Self {
        up: true,
        down: true,
    };
    pub const NONE: Self = Self {
        up: false,
        down: false,
    };
    pub const UP_ONLY: Self = Self {
        up: true,
        down: false,
    };

    pub fn any(&self) -> bool {
        self.up || self.down
    }
}

/// Tunables shared by every reduction stage.
///
/// The numeric thresholds are empirical and carry no physical meaning; the
/// defaults are the values the reduction has been validated with.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReductionConfig {
    /// Median-filter width used when looking for spikes.
    pub outlier_window: usize,
    /// Spike threshold, in units of the MAD of the median-filter residuals.
    pub outlier_threshold: f64,
    pub als_lambda: f64,
    pub als_p: f64,
    pub als_iterations: usize,
    /// ALS iterations used on the spectral variability curve.
    pub variability_iterations: usize,
    /// ALS asymmetry of the variability floor, independent of `als_p`.
    pub variability_p: f64,
    pub variability_purge: PurgeDirections,
    /// Channel rejection threshold in sigmas of the reference MAD.
    pub noise_threshold: f64,
    /// Frequency range text, see [`interpret_frequency_range`].
    ///
    /// [`interpret_frequency_range`]: crate::processing::variability::interpret_frequency_range
    pub freqsplat: Option<String>,
    pub nofilt: bool,
    pub filtering_factor: f64,
    /// Baseline method, `als` or `rough`.
    pub baseline: String,
    /// Bell shape for the calibration fit, `gauss` or `lorentz`.
    pub bell: String,
    pub max_fit_evaluations: usize,
    pub align_bins: usize,
    pub enable_diagnostics: bool,
}

impl Default for ReductionConfig {
    fn default() -> Self {
        Self {
            outlier_window: 5,
            outlier_threshold: 10.0,
            als_lambda: 1e11,
            als_p: 0.001,
            als_iterations: 10,
            variability_iterations: 30,
            variability_p: 0.001,
            variability_purge: PurgeDirections::UP_ONLY,
            noise_threshold: 5.0,
            freqsplat: None,
            nofilt: false,
            filtering_factor: 0.0,
            baseline: "als".to_string(),
            bell: "gauss".to_string(),
            max_fit_evaluations: 6000,
            align_bins: 20,
            enable_diagnostics: false,
        }
    }
}

/// Ordered (x, y) samples of one scan channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleSeries {
    x: Vec<f64>,
    y: Vec<f64>,
}

impl SampleSeries {
    pub fn new(x: Vec<f64>, y: Vec<f64>) -> ReductionResult<Self> {
        if x.is_empty() {
            return Err(ReductionError::DegenerateInput("empty series".into()));
        }
        if x.len() != y.len() {
            return Err(ReductionError::DegenerateInput(format!(
                "x has {} samples but y has {}",
                x.len(),
                y.len()
            )));
        }
        check_order(&x)?;
        Ok(Self { x, y })
    }

    pub fn x(&self) -> &[f64] {
        &self.x
    }

    pub fn y(&self) -> &[f64] {
        &self.y
    }

    pub fn len(&self) -> usize {
        self.x.len()
    }

    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }

    pub fn into_parts(self) -> (Vec<f64>, Vec<f64>) {
        (self.x, self.y)
    }
}

/// Rejects an axis that is not monotonically non-decreasing.
pub fn check_order(axis: &[f64]) -> ReductionResult<()> {
    if axis.windows(2).any(|w| !(w[1] >= w[0])) {
        return Err(ReductionError::DegenerateInput(
            "the order of times in the scan is wrong".into(),
        ));
    }
    Ok(())
}

/// Input payload for a processing stage: one channel of one scan.
///
/// `samples` is time x frequency; a light curve is a single-column array.
#[derive(Debug, Clone)]
pub struct StageInput {
    pub time: Vec<f64>,
    pub samples: Array2<f64>,
    pub bandwidth_mhz: f64,
}

impl StageInput {
    pub fn light_curve(time: Vec<f64>, values: Vec<f64>, bandwidth_mhz: f64) -> Self {
        let samples = Array2::from_shape_fn((values.len(), 1), |(row, _)| values[row]);
        Self {
            time,
            samples,
            bandwidth_mhz,
        }
    }
}

/// Output produced by each stage.
#[derive(Debug, Clone)]
pub struct StageOutput {
    pub time: Vec<f64>,
    pub samples: Array2<f64>,
    pub bandwidth_mhz: f64,
    pub metadata: StageMetadata,
}

impl StageOutput {
    /// First column of the samples, i.e. the light curve once a scan is cleaned.
    pub fn light_curve(&self) -> Vec<f64> {
        self.samples.column(0).to_vec()
    }

    pub fn into_input(self) -> StageInput {
        StageInput {
            time: self.time,
            samples: self.samples,
            bandwidth_mhz: self.bandwidth_mhz,
        }
    }
}

/// Metadata used for chaining stages and telemetry.
#[derive(Debug, Clone, Default)]
pub struct StageMetadata {
    pub frequency_range: Option<FrequencyRange>,
    pub masked_channels: Option<usize>,
    pub outliers_purged: Option<usize>,
    pub diagnostics: Option<CleanDiagnostics>,
    pub notes: Vec<String>,
}

/// Common error type for the reduction core.
#[derive(thiserror::Error, Debug)]
pub enum ReductionError {
    #[error("fit did not converge in {stage}: {reason}")]
    Fit { stage: String, reason: String },
    #[error("invalid kind: {0}")]
    InvalidKind(String),
    #[error("degenerate input: {0}")]
    DegenerateInput(String),
    #[error("invalid frequency range: {0}")]
    InvalidRange(String),
    #[error("internal failure: {0}")]
    Internal(String),
}

impl ReductionError {
    pub fn fit(stage: &str, reason: impl Into<String>) -> Self {
        Self::Fit {
            stage: stage.to_string(),
            reason: reason.into(),
        }
    }
}

pub type ReductionResult<T> = Result<T, ReductionError>;

/// Trait describing object-oriented reduction stages.
pub trait ProcessingStage {
    fn initialize(&mut self, config: &ReductionConfig) -> ReductionResult<()>;
    fn execute(&mut self, input: StageInput) -> ReductionResult<StageOutput>;
    fn cleanup(&mut self);
}
