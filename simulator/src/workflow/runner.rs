use crate::generator::profile::{build_scan, SyntheticScan};
use crate::workflow::catalog::StaticCatalog;
use crate::workflow::config::WorkflowConfig;
use anyhow::Context;
use log::{info, warn};
use serde::Serialize;
use srtcore::calibration::{
    calibrate_scan, CalibratedFlux, CalibrationRecord, FluxCalibration, ScanAxis, SourceKind,
};
use srtcore::fit::align::{align, AlignOptions, Alignment};
use srtcore::fit::bell::BellKind;
use srtcore::prelude::{
    ProcessingStage, ReductionError, ReductionResult, SampleSeries, StageInput,
};
use srtcore::processing::variability::FrequencyRange;
use srtcore::processing::{BaselineStage, CleaningStage};
use srtcore::telemetry::{Metrics, MetricsRecorder};
use std::sync::Arc;

/// Outcome of one reduced scan.
#[derive(Debug, Clone, Serialize)]
pub struct ScanReport {
    pub index: usize,
    pub frequency_range: Option<FrequencyRange>,
    pub masked_channels: usize,
    pub record: CalibrationRecord,
    pub calibrated: Option<CalibratedFlux>,
    /// Baseline-subtracted counts against the sky offset from the pointing
    /// centre, increasing.
    #[serde(skip)]
    pub profile: SampleSeries,
}

#[derive(Debug, Clone, Serialize)]
pub struct AlignmentReport {
    pub source: String,
    pub axis: ScanAxis,
    pub scans: Vec<usize>,
    pub alignment: Alignment,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub reports: Vec<ScanReport>,
    pub calibration: Option<FluxCalibration>,
    pub alignments: Vec<AlignmentReport>,
    pub metrics: Metrics,
}

#[derive(Clone)]
pub struct Runner {
    config: Arc<WorkflowConfig>,
    catalog: Arc<StaticCatalog>,
    metrics: Arc<MetricsRecorder>,
}

impl Runner {
    pub fn new(config: WorkflowConfig) -> Self {
        let catalog = StaticCatalog::new(config.catalog.clone());
        Self {
            config: Arc::new(config),
            catalog: Arc::new(catalog),
            metrics: Arc::new(MetricsRecorder::new()),
        }
    }

    pub fn metrics(&self) -> Metrics {
        self.metrics.snapshot()
    }

    /// Clean, baseline and calibrate one scan.
    pub fn execute(&self, index: usize, scan: SyntheticScan) -> ReductionResult<ScanReport> {
        let reduction = &self.config.reduction;
        let bell: BellKind = reduction.bell.parse()?;

        let mut cleaning = CleaningStage::new();
        cleaning.initialize(reduction)?;
        let cleaned = cleaning.execute(StageInput {
            time: scan.time,
            samples: scan.spectrum,
            bandwidth_mhz: scan.meta.bandwidth_mhz,
        })?;
        cleaning.cleanup();
        let frequency_range = cleaned.metadata.frequency_range;
        let masked_channels = cleaned.metadata.masked_channels.unwrap_or(0);
        self.metrics.record_masked(masked_channels);

        // Multi-channel data that skipped cleaning is summed over the band.
        let mut input = cleaned.into_input();
        if input.samples.ncols() > 1 {
            let total = input.samples.rows().into_iter().map(|r| r.sum()).collect();
            input = StageInput::light_curve(input.time, total, input.bandwidth_mhz);
        }

        let mut baseline = BaselineStage::new();
        baseline.initialize(reduction)?;
        let flattened = baseline.execute(input)?;
        baseline.cleanup();
        self.metrics
            .record_outliers(flattened.metadata.outliers_purged.unwrap_or(0));

        let counts = flattened.light_curve();
        let mut meta = scan.meta;
        meta.bandwidth_mhz = flattened.bandwidth_mhz;
        let record = calibrate_scan(
            &meta,
            &scan.geometry,
            &counts,
            self.catalog.as_ref(),
            bell,
            reduction.max_fit_evaluations,
        )?;

        let offsets = scan.geometry.offsets();
        let (x, y): (Vec<f64>, Vec<f64>) = if offsets.first() > offsets.last() {
            offsets.into_iter().rev().zip(counts.into_iter().rev()).unzip()
        } else {
            (offsets, counts)
        };
        let profile = SampleSeries::new(x, y)?;

        info!(
            "scan {} {} {}: counts {:.3} +- {:.3}",
            index, record.source, record.scan_type, record.counts, record.counts_err
        );
        Ok(ScanReport {
            index,
            frequency_range,
            masked_channels,
            record,
            calibrated: None,
            profile,
        })
    }

    /// Reduces every configured scan on the blocking pool, then calibrates
    /// the sources against the calibrators and optionally aligns repeats.
    pub async fn run(&self) -> anyhow::Result<RunSummary> {
        let mut handles = Vec::with_capacity(self.config.scans.len());
        for (index, plan) in self.config.scans.iter().enumerate() {
            let scan = build_scan(plan, self.config.seed.wrapping_add(index as u64))
                .with_context(|| format!("generating scan {}", index))?;
            let runner = self.clone();
            handles.push(tokio::task::spawn_blocking(move || {
                runner.execute(index, scan)
            }));
        }

        let mut reports = Vec::new();
        for (index, handle) in handles.into_iter().enumerate() {
            let outcome = handle.await.context("joining scan worker")?;
            if let Some(report) = self.tally(index, outcome)? {
                reports.push(report);
            }
        }

        let records: Vec<CalibrationRecord> = reports.iter().map(|r| r.record.clone()).collect();
        let calibration = match FluxCalibration::from_records(&records) {
            Ok(calibration) => {
                for report in reports
                    .iter_mut()
                    .filter(|r| r.record.kind == SourceKind::Source)
                {
                    report.calibrated = Some(calibration.apply(&report.record));
                }
                Some(calibration)
            }
            Err(err) => {
                warn!("Sources left uncalibrated: {}", err);
                None
            }
        };

        let alignments = if self.config.align {
            self.align_repeats(&reports)
        } else {
            Vec::new()
        };

        Ok(RunSummary {
            reports,
            calibration,
            alignments,
            metrics: self.metrics.snapshot(),
        })
    }

    /// Counts one scan outcome. Fit failures skip the scan, anything else
    /// aborts the run.
    fn tally(
        &self,
        index: usize,
        outcome: ReductionResult<ScanReport>,
    ) -> anyhow::Result<Option<ScanReport>> {
        match outcome {
            Ok(report) => {
                self.metrics.record_processed();
                Ok(Some(report))
            }
            Err(ReductionError::Fit { stage, reason }) => {
                warn!("Skipping scan {}: {} failed ({})", index, stage, reason);
                self.metrics.record_skipped();
                Ok(None)
            }
            Err(err) => Err(err).with_context(|| format!("reducing scan {}", index)),
        }
    }

    fn align_repeats(&self, reports: &[ScanReport]) -> Vec<AlignmentReport> {
        let mut groups: Vec<(String, ScanAxis, Vec<usize>)> = Vec::new();
        for (position, report) in reports.iter().enumerate() {
            let axis = if report.record.fit_ra.is_some() {
                ScanAxis::Ra
            } else {
                ScanAxis::Dec
            };
            match groups
                .iter_mut()
                .find(|(source, a, _)| *source == report.record.source && *a == axis)
            {
                Some((_, _, members)) => members.push(position),
                None => groups.push((report.record.source.clone(), axis, vec![position])),
            }
        }

        let options = AlignOptions::from_config(&self.config.reduction);
        groups
            .into_iter()
            .filter(|(_, _, members)| members.len() > 1)
            .filter_map(|(source, axis, members)| {
                let profiles: Vec<SampleSeries> =
                    members.iter().map(|&m| reports[m].profile.clone()).collect();
                match align(&profiles, &options) {
                    Ok(alignment) => Some(AlignmentReport {
                        source,
                        axis,
                        scans: members.iter().map(|&m| reports[m].index).collect(),
                        alignment,
                    }),
                    Err(err) => {
                        warn!("Could not align {} {} scans: {}", source, axis, err);
                        None
                    }
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::profile::ScanPlan;

    fn small_workflow(align: bool) -> WorkflowConfig {
        let calibrator = ScanPlan {
            channels: 32,
            rfi_channels: Some([10, 12]),
            ..Default::default()
        };
        let target = ScanPlan {
            source: "W51".into(),
            channels: 32,
            amplitude: 40.0,
            ..Default::default()
        };
        WorkflowConfig {
            align,
            scans: vec![calibrator.clone(), target, calibrator],
            ..WorkflowConfig::from_args(0, 11)
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn runner_calibrates_sources_against_calibrators() {
        let runner = Runner::new(small_workflow(true));
        let summary = runner.run().await.unwrap();
        assert_eq!(summary.reports.len(), 3);
        assert_eq!(summary.metrics.scans_processed, 3);
        assert_eq!(summary.metrics.scans_skipped, 0);

        let calibration = summary.calibration.unwrap();
        assert_eq!(calibration.calibrators, 2);
        let target = &summary.reports[1];
        assert_eq!(target.record.kind, SourceKind::Source);
        let flux = target.calibrated.unwrap();
        assert!(flux.flux_density > 0.0);
        // 40 counts against 100 counts for a 5.8 Jy calibrator.
        let expected = 5.8 * 0.4 / target.record.bandwidth;
        assert!((flux.flux_density - expected).abs() / expected < 0.1);

        assert_eq!(summary.alignments.len(), 1);
        assert_eq!(summary.alignments[0].scans, vec![0, 2]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn fit_failures_skip_scans_without_aborting() {
        let mut config = small_workflow(false);
        config.reduction.max_fit_evaluations = 1;
        let summary = Runner::new(config).run().await.unwrap();
        assert!(summary.reports.is_empty());
        assert!(summary.calibration.is_none());
        assert_eq!(summary.metrics.scans_processed, 0);
        assert_eq!(summary.metrics.scans_skipped, 3);
    }

    #[test]
    fn one_failed_fit_leaves_other_reports() {
        let config = small_workflow(false);
        let runner = Runner::new(config.clone());
        let mut reports = Vec::new();
        for (index, plan) in config.scans.iter().enumerate() {
            let outcome = if index == 1 {
                Err(ReductionError::fit("bell fit", "W51 after 6000 evaluations"))
            } else {
                runner.execute(index, build_scan(plan, index as u64).unwrap())
            };
            if let Some(report) = runner.tally(index, outcome).unwrap() {
                reports.push(report);
            }
        }
        assert_eq!(reports.iter().map(|r| r.index).collect::<Vec<_>>(), vec![0, 2]);
        let metrics = runner.metrics();
        assert_eq!(metrics.scans_processed, 2);
        assert_eq!(metrics.scans_skipped, 1);

        let fatal = runner.tally(3, Err(ReductionError::InvalidKind("boxcar".into())));
        assert!(fatal.is_err());
        assert_eq!(runner.metrics().scans_skipped, 1);
    }

    #[test]
    fn unknown_bell_is_fatal() {
        let mut config = small_workflow(false);
        config.reduction.bell = "boxcar".into();
        let runner = Runner::new(config.clone());
        let scan = build_scan(&config.scans[0], 0).unwrap();
        let err = runner.execute(0, scan).unwrap_err();
        assert!(matches!(err, ReductionError::InvalidKind(_)));
    }

    #[test]
    fn total_power_scan_skips_cleaning() {
        let mut config = small_workflow(false);
        config.scans[0].channels = 1;
        let runner = Runner::new(config.clone());
        let scan = build_scan(&config.scans[0], 5).unwrap();
        let report = runner.execute(0, scan).unwrap();
        assert!(report.frequency_range.is_none());
        assert!((report.record.counts - 100.0).abs() < 5.0);
    }
}
