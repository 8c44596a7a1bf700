//! Turning fitted scan profiles into calibrated flux densities.

pub mod aggregate;
pub mod calibrate;
pub mod record;
pub mod scan;

pub use aggregate::{CalibratedFlux, FluxCalibration};
pub use calibrate::calibrate_scan;
pub use record::{CalibrationRecord, CalibratorCatalog, FluxDensity, ScanMeta, SourceKind};
pub use scan::{ScanAxis, ScanDirection, ScanGeometry};
