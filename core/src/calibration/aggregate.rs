use serde::{Deserialize, Serialize};

use crate::prelude::{ReductionError, ReductionResult};

use super::record::{CalibrationRecord, SourceKind};

/// Mean flux/counts conversion over a set of calibrator scans.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FluxCalibration {
    pub factor: f64,
    pub error: f64,
    pub calibrators: usize,
}

/// Calibrated flux of a source scan.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CalibratedFlux {
    pub flux_density: f64,
    pub flux_density_err: f64,
    pub systematic: f64,
}

impl FluxCalibration {
    pub fn from_records(records: &[CalibrationRecord]) -> ReductionResult<Self> {
        let calibrators: Vec<&CalibrationRecord> = records
            .iter()
            .filter(|r| r.kind == SourceKind::Calibrator)
            .collect();
        let ratios: Vec<f64> = calibrators
            .iter()
            .map(|r| r.flux_over_counts)
            .filter(|v| v.is_finite() && *v > 0.0)
            .collect();
        if ratios.is_empty() {
            return Err(ReductionError::DegenerateInput(
                "no calibrator scan with a usable flux/counts ratio".into(),
            ));
        }
        let factor = ratios.iter().sum::<f64>() / ratios.len() as f64;
        let square_sum: f64 = calibrators
            .iter()
            .map(|r| r.flux_over_counts_err)
            .filter(|v| v.is_finite() && *v > 0.0)
            .map(|v| v * v)
            .sum();
        Ok(Self {
            factor,
            error: square_sum.sqrt() / calibrators.len() as f64,
            calibrators: calibrators.len(),
        })
    }

    pub fn apply(&self, record: &CalibrationRecord) -> CalibratedFlux {
        let flux_density = record.counts * self.factor / record.bandwidth;
        CalibratedFlux {
            flux_density,
            flux_density_err: record.counts_err / record.counts * flux_density,
            systematic: self.error / self.factor * flux_density,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(kind: SourceKind, counts: f64, ratio: f64, ratio_err: f64) -> CalibrationRecord {
        CalibrationRecord {
            scan_type: "Dec>".into(),
            source: "any".into(),
            time: 0.0,
            frequency: 7000.0,
            bandwidth: 500.0,
            counts,
            counts_err: counts * 0.01,
            width: 0.04,
            flux_density: 0.0,
            flux_density_err: 0.0,
            kind,
            elevation: 45.0,
            flux_over_counts: ratio,
            flux_over_counts_err: ratio_err,
            ra: 0.0,
            dec: 0.0,
            fit_ra: None,
            fit_dec: Some(0.0),
        }
    }

    #[test]
    fn averages_usable_calibrators() {
        let records = vec![
            record(SourceKind::Calibrator, 10.0, 0.2, 0.03),
            record(SourceKind::Calibrator, 10.0, 0.4, 0.04),
            record(SourceKind::Calibrator, 10.0, f64::NAN, f64::NAN),
            record(SourceKind::Source, 10.0, 5.0, 0.0),
        ];
        let calibration = FluxCalibration::from_records(&records).unwrap();
        assert!((calibration.factor - 0.3).abs() < 1e-12);
        assert_eq!(calibration.calibrators, 3);
        assert!((calibration.error - 0.05 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn converts_source_counts() {
        let calibration = FluxCalibration {
            factor: 0.3,
            error: 0.03,
            calibrators: 2,
        };
        let flux = calibration.apply(&record(SourceKind::Source, 20.0, 1.0, 0.0));
        assert!((flux.flux_density - 20.0 * 0.3 / 500.0).abs() < 1e-12);
        assert!((flux.flux_density_err - 0.01 * flux.flux_density).abs() < 1e-12);
        assert!((flux.systematic - 0.1 * flux.flux_density).abs() < 1e-12);
    }

    #[test]
    fn no_calibrator_is_degenerate() {
        let records = vec![record(SourceKind::Source, 10.0, 1.0, 0.0)];
        assert!(FluxCalibration::from_records(&records).is_err());
    }
}
