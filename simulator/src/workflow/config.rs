use anyhow::Context;
use serde::{Deserialize, Serialize};
use srtcore::prelude::ReductionConfig;
use std::fs;
use std::path::Path;

use super::catalog::{default_entries, CatalogEntry};
use crate::generator::profile::{default_scans, ScanPlan};

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowConfig {
    pub reduction: ReductionConfig,
    pub seed: u64,
    pub align: bool,
    pub catalog: Vec<CatalogEntry>,
    pub scans: Vec<ScanPlan>,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self::from_args(4, 0)
    }
}

impl WorkflowConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path_ref = path.as_ref();
        let contents = fs::read_to_string(path_ref)
            .with_context(|| format!("reading workflow config {}", path_ref.display()))?;
        let config: WorkflowConfig = serde_yaml::from_str(&contents)
            .with_context(|| format!("parsing workflow config {}", path_ref.display()))?;
        Ok(config)
    }

    pub fn from_args(scans: usize, seed: u64) -> Self {
        Self {
            reduction: ReductionConfig::default(),
            seed,
            align: false,
            catalog: default_entries(),
            scans: default_scans(scans),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use srtcore::calibration::ScanAxis;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn config_from_args_builds_scan_list() {
        let cfg = WorkflowConfig::from_args(6, 9);
        assert_eq!(cfg.scans.len(), 6);
        assert_eq!(cfg.seed, 9);
        assert_eq!(cfg.reduction.baseline, "als");
    }

    #[test]
    fn config_load_reads_yaml() {
        let mut temp = NamedTempFile::new().unwrap();
        temp.write_all(
            b"seed: 3\nalign: true\nreduction:\n  noise_threshold: 4.0\n  freqsplat: \"100:900\"\nscans:\n  - source: 3C147\n    axis: Dec\n    channels: 16\n",
        )
        .unwrap();
        let path = temp.into_temp_path();
        let cfg = WorkflowConfig::load(&path).unwrap();
        assert_eq!(cfg.seed, 3);
        assert!(cfg.align);
        assert_eq!(cfg.reduction.noise_threshold, 4.0);
        assert_eq!(cfg.reduction.freqsplat.as_deref(), Some("100:900"));
        assert_eq!(cfg.reduction.outlier_window, 5);
        assert_eq!(cfg.scans.len(), 1);
        assert_eq!(cfg.scans[0].axis, ScanAxis::Dec);
        assert_eq!(cfg.scans[0].samples, 160);
        assert_eq!(cfg.catalog.len(), 3);
    }

    #[test]
    fn config_load_reports_missing_file() {
        let err = WorkflowConfig::load("/nonexistent/workflow.yaml").unwrap_err();
        assert!(format!("{:#}", err).contains("reading workflow config"));
    }
}
