//! Scan-level processing stages.

pub mod baseline;
pub mod variability;

pub use baseline::{BaselineKind, BaselineStage};
pub use variability::{
    clean_scan_using_variability, interpret_frequency_range, CleanDiagnostics, CleanResult,
    CleaningStage, FrequencyRange,
};
