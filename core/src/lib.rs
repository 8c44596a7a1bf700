//! Reduction core for single-dish radio scans.
//!
//! Baseline removal, RFI cleaning of spectroscopic scans, bell fitting and
//! flux calibration, plus the alignment of repeated scans.

pub mod calibration;
pub mod fit;
pub mod math;
pub mod prelude;
pub mod processing;
pub mod telemetry;

pub use prelude::{
    ProcessingStage, PurgeDirections, ReductionConfig, ReductionError, ReductionResult,
    SampleSeries, StageInput, StageOutput,
};
