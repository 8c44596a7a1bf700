use anyhow::Context;
use clap::Parser;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use tokio::runtime::Builder as TokioBuilder;
use workflow::config::WorkflowConfig;
use workflow::runner::{RunSummary, Runner};

mod generator;
mod workflow;

#[derive(Parser)]
#[command(author, version, about = "Offline single-dish scan reduction driver")]
struct Args {
    /// Load a workflow config from YAML
    #[arg(long)]
    workflow: Option<PathBuf>,
    /// Number of synthetic scans when no workflow file is given
    #[arg(long, default_value_t = 4)]
    scans: usize,
    #[arg(long)]
    seed: Option<u64>,
    /// Baseline method: als or rough
    #[arg(long)]
    baseline: Option<String>,
    /// Calibration bell shape: gauss or lorentz
    #[arg(long)]
    bell: Option<String>,
    /// Frequency range kept after cleaning, e.g. "100:900" or ":"
    #[arg(long)]
    splat: Option<String>,
    #[arg(long)]
    noise_threshold: Option<f64>,
    /// Keep every channel in the range, only fill the bad ones
    #[arg(long, default_value_t = false)]
    nofilt: bool,
    /// Align repeated scans of the same source
    #[arg(long, default_value_t = false)]
    align: bool,
    /// Write one JSON report per scan to this file instead of stdout
    #[arg(long)]
    output: Option<PathBuf>,
}

impl Args {
    fn workflow_config(&self) -> anyhow::Result<WorkflowConfig> {
        let mut config = match &self.workflow {
            Some(path) => WorkflowConfig::load(path)?,
            None => WorkflowConfig::from_args(self.scans, self.seed.unwrap_or(0)),
        };
        if let Some(seed) = self.seed {
            config.seed = seed;
        }
        if let Some(baseline) = &self.baseline {
            config.reduction.baseline = baseline.clone();
        }
        if let Some(bell) = &self.bell {
            config.reduction.bell = bell.clone();
        }
        if let Some(splat) = &self.splat {
            config.reduction.freqsplat = Some(splat.clone());
        }
        if let Some(threshold) = self.noise_threshold {
            config.reduction.noise_threshold = threshold;
        }
        config.reduction.nofilt |= self.nofilt;
        config.align |= self.align;
        Ok(config)
    }
}

fn write_reports(summary: &RunSummary, out: &mut dyn Write) -> anyhow::Result<()> {
    for report in &summary.reports {
        serde_json::to_writer(&mut *out, report).context("serializing scan report")?;
        writeln!(out)?;
    }
    out.flush()?;
    Ok(())
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();
    let config = args.workflow_config()?;

    let runner = Runner::new(config);
    let runtime = TokioBuilder::new_multi_thread()
        .enable_all()
        .build()
        .context("creating reduction runtime")?;
    let summary = runtime.block_on(runner.run())?;

    match &args.output {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("creating report file {}", path.display()))?;
            write_reports(&summary, &mut BufWriter::new(file))?;
        }
        None => write_reports(&summary, &mut io::stdout().lock())?,
    }

    match &summary.calibration {
        Some(calibration) => eprintln!(
            "Calibration -> flux/counts {:.6} +- {:.6} from {} calibrator scans",
            calibration.factor, calibration.error, calibration.calibrators
        ),
        None => eprintln!("Calibration -> unavailable"),
    }
    for report in &summary.alignments {
        eprintln!(
            "Alignment {} {} scans {:?} -> variance {:.4} -> {:.4}",
            report.source,
            report.axis,
            report.scans,
            report.alignment.variance_before,
            report.alignment.variance_after
        );
    }
    let metrics = summary.metrics;
    eprintln!(
        "Processed {} scans ({} skipped), {} channels masked, {} outliers purged",
        metrics.scans_processed,
        metrics.scans_skipped,
        metrics.channels_masked,
        metrics.outliers_purged
    );
    Ok(())
}
