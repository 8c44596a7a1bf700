use crate::fit::bell::{fit_baseline_plus_bell, BellKind};
use crate::prelude::{ReductionError, ReductionResult};
use crate::telemetry::log::LogManager;

use super::record::{CalibrationRecord, CalibratorCatalog, ScanMeta, SourceKind};
use super::scan::{ScanAxis, ScanGeometry};

/// Fits the bell along the scan axis and, for calibrators, derives the
/// flux/counts conversion.
pub fn calibrate_scan(
    meta: &ScanMeta,
    geometry: &ScanGeometry,
    counts: &[f64],
    catalog: &dyn CalibratorCatalog,
    bell: BellKind,
    max_evaluations: usize,
) -> ReductionResult<CalibrationRecord> {
    if counts.len() != geometry.len() {
        return Err(ReductionError::DegenerateInput(format!(
            "{} counts for {} track samples",
            counts.len(),
            geometry.len()
        )));
    }
    let logger = LogManager::for_stage("calibrate");

    let catalog_flux = catalog.lookup(
        &meta.source,
        meta.frequency_mhz / 1000.0,
        meta.bandwidth_mhz / 1000.0,
        meta.time,
    );
    let (kind, flux, flux_err) = match catalog_flux {
        Some(entry) => (SourceKind::Calibrator, entry.flux, entry.error),
        None => (SourceKind::Source, 1.0, 0.0),
    };

    let axis = geometry.axis();
    let x = geometry.coordinate();
    // The fit wants an increasing axis.
    let (x, y): (Vec<f64>, Vec<f64>) = if x.first() > x.last() {
        x.iter().rev().copied().zip(counts.iter().rev().copied()).unzip()
    } else {
        (x.to_vec(), counts.to_vec())
    };
    let fit = fit_baseline_plus_bell(&x, &y, bell, max_evaluations)?;
    if !fit.converged {
        return Err(ReductionError::fit(
            "bell fit",
            format!("{} after {} evaluations", meta.source, fit.evaluations),
        ));
    }
    let counts_err = fit.amplitude_error().ok_or_else(|| {
        ReductionError::fit("bell fit", format!("{}: no parameter covariance", meta.source))
    })?;
    let amplitude = fit.amplitude;

    let (fit_ra, fit_dec) = match axis {
        ScanAxis::Ra => (Some(fit.center), None),
        ScanAxis::Dec => (None, Some(fit.center)),
    };
    let flux_over_counts = flux / amplitude;
    let flux_over_counts_err = (counts_err / amplitude + flux_err / flux) * flux_over_counts;
    logger.detail(&format!(
        "{} {}: counts {:.4} +- {:.4}",
        meta.source,
        geometry.scan_type(),
        amplitude,
        counts_err
    ));

    Ok(CalibrationRecord {
        scan_type: geometry.scan_type(),
        source: meta.source.clone(),
        time: meta.time,
        frequency: meta.frequency_mhz,
        bandwidth: meta.bandwidth_mhz,
        counts: amplitude,
        counts_err,
        width: geometry.sky_width(fit.width),
        flux_density: flux / meta.bandwidth_mhz,
        flux_density_err: flux_err / meta.bandwidth_mhz,
        kind,
        elevation: meta.elevation_deg,
        flux_over_counts,
        flux_over_counts_err,
        ra: geometry.pointing_ra,
        dec: geometry.pointing_dec,
        fit_ra,
        fit_dec,
    })
}
