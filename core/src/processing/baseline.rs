use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::fit::als::{baseline_als, AlsOptions};
use crate::fit::rough::baseline_rough;
use crate::prelude::{
    check_order, ProcessingStage, ReductionConfig, ReductionError, ReductionResult, StageInput,
    StageMetadata, StageOutput,
};
use crate::telemetry::log::LogManager;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BaselineKind {
    Als,
    Rough,
}

impl FromStr for BaselineKind {
    type Err = ReductionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "als" => Ok(Self::Als),
            "rough" => Ok(Self::Rough),
            other => Err(ReductionError::InvalidKind(format!(
                "unknown baseline method '{}', expected als or rough",
                other
            ))),
        }
    }
}

impl fmt::Display for BaselineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Als => write!(f, "als"),
            Self::Rough => write!(f, "rough"),
        }
    }
}

/// Subtracts a baseline from every channel of the input.
pub struct BaselineStage {
    config: Option<ReductionConfig>,
    kind: BaselineKind,
    logger: LogManager,
}

impl BaselineStage {
    pub fn new() -> Self {
        Self {
            config: None,
            kind: BaselineKind::Als,
            logger: LogManager::for_stage("baseline"),
        }
    }

    pub fn kind(&self) -> BaselineKind {
        self.kind
    }

    fn subtract(
        &self,
        config: &ReductionConfig,
        time: &[f64],
        values: &[f64],
    ) -> ReductionResult<(Vec<f64>, usize)> {
        match self.kind {
            BaselineKind::Als => {
                let fit = baseline_als(time, values, &AlsOptions::from_config(config))?;
                Ok((fit.subtracted, fit.outliers))
            }
            BaselineKind::Rough => {
                let fit = baseline_rough(time, values, None, config.max_fit_evaluations)?;
                Ok((fit.detrended, 0))
            }
        }
    }
}

impl Default for BaselineStage {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessingStage for BaselineStage {
    fn initialize(&mut self, config: &ReductionConfig) -> ReductionResult<()> {
        self.kind = config.baseline.parse()?;
        self.config = Some(config.clone());
        Ok(())
    }

    fn execute(&mut self, input: StageInput) -> ReductionResult<StageOutput> {
        let config = self
            .config
            .as_ref()
            .ok_or_else(|| ReductionError::Internal("stage not initialized".into()))?;
        check_order(&input.time)?;
        if input.time.len() != input.samples.nrows() || input.time.is_empty() {
            return Err(ReductionError::DegenerateInput(format!(
                "{} times for {} samples",
                input.time.len(),
                input.samples.nrows()
            )));
        }

        let mut samples = input.samples;
        let mut outliers = 0;
        for mut column in samples.columns_mut() {
            let (subtracted, count) = self.subtract(config, &input.time, &column.to_vec())?;
            outliers += count;
            for (value, new) in column.iter_mut().zip(subtracted) {
                *value = new;
            }
        }
        self.logger.detail(&format!(
            "{} baseline removed from {} channels",
            self.kind,
            samples.ncols()
        ));

        Ok(StageOutput {
            time: input.time,
            samples,
            bandwidth_mhz: input.bandwidth_mhz,
            metadata: StageMetadata {
                outliers_purged: Some(outliers),
                notes: vec![format!("{} baseline", self.kind)],
                ..Default::default()
            },
        })
    }

    fn cleanup(&mut self) {
        self.config = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drifting_scan() -> StageInput {
        let time: Vec<f64> = (0..300).map(|i| i as f64 * 0.1).collect();
        let values = time
            .iter()
            .enumerate()
            .map(|(i, &t)| {
                let ripple = 0.05 * (i as f64 * 2.3).sin();
                4.0 + 0.2 * t + 10.0 * (-(t - 15.0).powi(2) / 2.0).exp() + ripple
            })
            .collect();
        StageInput::light_curve(time, values, 500.0)
    }

    #[test]
    fn parses_baseline_kinds() {
        assert_eq!("als".parse::<BaselineKind>().unwrap(), BaselineKind::Als);
        assert_eq!("rough".parse::<BaselineKind>().unwrap(), BaselineKind::Rough);
        assert!(matches!(
            "spline".parse::<BaselineKind>(),
            Err(ReductionError::InvalidKind(_))
        ));
    }

    #[test]
    fn unknown_kind_fails_initialization() {
        let mut stage = BaselineStage::new();
        let config = ReductionConfig {
            baseline: "spline".into(),
            ..Default::default()
        };
        assert!(stage.initialize(&config).is_err());
    }

    #[test]
    fn als_stage_flattens_drift() {
        let mut stage = BaselineStage::new();
        stage.initialize(&ReductionConfig::default()).unwrap();
        let output = stage.execute(drifting_scan()).unwrap();
        let lc = output.light_curve();
        assert!(lc[0].abs() < 0.2);
        assert!(lc[299].abs() < 0.2);
        assert!((lc[150] - 10.0).abs() < 0.3);
        assert_eq!(output.metadata.outliers_purged, Some(0));
    }

    #[test]
    fn rough_stage_flattens_drift() {
        let mut stage = BaselineStage::new();
        let config = ReductionConfig {
            baseline: "rough".into(),
            ..Default::default()
        };
        stage.initialize(&config).unwrap();
        assert_eq!(stage.kind(), BaselineKind::Rough);
        let output = stage.execute(drifting_scan()).unwrap();
        let lc = output.light_curve();
        assert!((lc[20] - lc[280]).abs() < 0.2);
        assert!(lc[150] - lc[20] > 9.0);
    }

    #[test]
    fn execute_before_initialize_is_internal_error() {
        let mut stage = BaselineStage::new();
        let err = stage.execute(drifting_scan()).unwrap_err();
        assert!(matches!(err, ReductionError::Internal(_)));
    }
}
