use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SourceKind {
    Calibrator,
    Source,
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Calibrator => write!(f, "Calibrator"),
            Self::Source => write!(f, "Source"),
        }
    }
}

/// Catalog flux of a calibrator and its one-sigma error, in Jy.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FluxDensity {
    pub flux: f64,
    pub error: f64,
}

/// Source of reference fluxes for known calibrators.
pub trait CalibratorCatalog {
    /// Flux of `source` at the given frequency, or `None` if it is not a
    /// calibrator. Frequencies are in GHz and `time` is an MJD.
    fn lookup(
        &self,
        source: &str,
        frequency_ghz: f64,
        bandwidth_ghz: f64,
        time: f64,
    ) -> Option<FluxDensity>;
}

/// Observation context of one scan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanMeta {
    pub source: String,
    /// Mean time of the scan, MJD.
    pub time: f64,
    pub frequency_mhz: f64,
    pub bandwidth_mhz: f64,
    pub elevation_deg: f64,
}

/// Fit outcome of one scan, plus its calibration factor when it targets a
/// calibrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalibrationRecord {
    pub scan_type: String,
    pub source: String,
    pub time: f64,
    pub frequency: f64,
    pub bandwidth: f64,
    pub counts: f64,
    pub counts_err: f64,
    pub width: f64,
    pub flux_density: f64,
    pub flux_density_err: f64,
    pub kind: SourceKind,
    pub elevation: f64,
    pub flux_over_counts: f64,
    pub flux_over_counts_err: f64,
    pub ra: f64,
    pub dec: f64,
    pub fit_ra: Option<f64>,
    pub fit_dec: Option<f64>,
}
