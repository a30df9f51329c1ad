use anyhow::Context;
use clap::Parser;
use dedispcore::dataset::{DatasetReader, JsonDatasetReader};
use generator::profile::{build_dataset, GeneratorConfig};
use std::path::PathBuf;
use workflow::batch::{append_line, BatchRunner};
use workflow::config::WorkflowConfig;
use workflow::runner::Runner;

mod generator;
mod workflow;

#[derive(Parser)]
#[command(author, version, about = "Offline tree-dedispersion driver")]
struct Args {
    /// Load a workflow config from YAML
    #[arg(long)]
    workflow: Option<PathBuf>,
    /// Read raw samples from a JSON dataset instead of synthesising a burst
    #[arg(long)]
    input: Option<PathBuf>,
    /// Tree depth; defaults to the smallest depth holding every channel
    #[arg(long)]
    depth: Option<u32>,
    #[arg(long, default_value_t = 0)]
    workers: usize,
    #[arg(long, default_value_t = 4)]
    fork_levels: u32,
    #[arg(long, default_value_t = 64)]
    channels: usize,
    #[arg(long, default_value_t = 1024)]
    samples: usize,
    #[arg(long, default_value_t = 12.0)]
    dm: f64,
    #[arg(long, default_value_t = 0)]
    seed: u64,
    /// Dedisperse every dataset matching the workflow's filename pattern here
    #[arg(long)]
    search_dir: Option<PathBuf>,
    /// In batch mode, mark files already present as processed without running them
    #[arg(long)]
    no_pre_existing: bool,
    /// Append a one-line summary to this file; in batch mode, the processed log
    #[arg(long)]
    report: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    let mut workflow_config = if let Some(path) = args.workflow {
        WorkflowConfig::load(path)?
    } else {
        let generator = GeneratorConfig {
            channels: args.channels,
            samples: args.samples,
            dm: args.dm,
            seed: args.seed,
            ..Default::default()
        };
        WorkflowConfig::from_args(args.depth, args.workers, args.fork_levels, generator)
    };

    if let Some(dir) = args.search_dir {
        workflow_config.search_directory = Some(dir);
    }
    if workflow_config.search_directory.is_some() && args.input.is_none() {
        if let Some(log) = args.report {
            workflow_config.processed_log = Some(log);
        }
        let batch = BatchRunner::from_config(workflow_config)?;
        if args.no_pre_existing {
            batch.skip_existing()?;
        }
        let outcomes = batch.run()?;
        println!("{}", serde_json::to_string_pretty(&outcomes)?);
        return Ok(());
    }

    let mut dataset = match &args.input {
        Some(path) => JsonDatasetReader
            .read(path)
            .with_context(|| format!("ingesting {}", path.display()))?,
        None => build_dataset(&workflow_config.generator)?,
    };

    let runner = Runner::new(workflow_config);
    let result = runner.execute(&mut dataset)?;
    println!("{}", serde_json::to_string_pretty(&result)?);

    if let Some(report_path) = args.report {
        let line = match &result.report.peak {
            Some(peak) => format!(
                "nchan={} samples={} peak_trial={} peak_dm={:.3} peak_sample={} peak_value={:.3}\n",
                result.report.nchan,
                result.report.samples,
                peak.trial,
                peak.dm,
                peak.sample,
                peak.value
            ),
            None => format!(
                "nchan={} samples={} no_peak\n",
                result.report.nchan, result.report.samples
            ),
        };
        append_line(&report_path, &line)
            .with_context(|| format!("writing report {}", report_path.display()))?;
    }

    Ok(())
}
