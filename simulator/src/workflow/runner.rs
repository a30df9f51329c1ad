use crate::workflow::config::WorkflowConfig;
use anyhow::Context;
use dedispcore::prelude::{ProcessingStage, StageReport};
use dedispcore::{Dataset, DedispersionStage};
use log::info;
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct WorkflowResult {
    pub raw_nchan: usize,
    pub ndata: usize,
    pub depth: u32,
    pub dm_step: f64,
    pub report: StageReport,
}

#[derive(Clone)]
pub struct Runner {
    config: WorkflowConfig,
}

impl Runner {
    pub fn new(config: WorkflowConfig) -> Self {
        Self { config }
    }

    pub fn execute(&self, dataset: &mut Dataset) -> anyhow::Result<WorkflowResult> {
        let stage_config = self.config.to_stage_config(dataset.raw_nchan())?;
        info!(
            "dedispersing {} channels x {} samples at depth {} ({} workers)",
            dataset.raw_nchan(),
            dataset.ndata(),
            stage_config.depth,
            stage_config.workers
        );

        let mut stage = DedispersionStage::new();
        stage
            .initialize(&stage_config)
            .context("initializing dedispersion stage")?;
        let report = stage
            .execute(dataset)
            .context("executing dedispersion stage")?;
        stage.cleanup();

        let dm_step = dataset.trial_dms().get(1).copied().unwrap_or(0.0);

        Ok(WorkflowResult {
            raw_nchan: dataset.raw_nchan(),
            ndata: dataset.ndata(),
            depth: stage_config.depth,
            dm_step,
            report,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::profile::{build_dataset, GeneratorConfig};

    #[test]
    fn runner_recovers_injected_burst() {
        let generator = GeneratorConfig {
            noise: 0.05,
            seed: 3,
            ..Default::default()
        };
        let cfg = WorkflowConfig::from_args(None, 2, 2, generator.clone());
        let mut dataset = build_dataset(&generator).unwrap();
        let result = Runner::new(cfg).execute(&mut dataset).unwrap();

        assert_eq!(result.depth, 6);
        assert_eq!(result.report.nchan, 64);
        assert_eq!(result.report.samples, generator.samples - 63);
        let peak = result.report.peak.unwrap();
        assert!((peak.dm - generator.dm).abs() <= 2.0 * result.dm_step);
        assert!(peak.sample.abs_diff(generator.arrival) <= 1);
        assert!(peak.value > 0.5 * generator.channels as f32);
    }

    #[test]
    fn runner_surfaces_depth_errors() {
        let generator = GeneratorConfig {
            channels: 16,
            samples: 64,
            ..Default::default()
        };
        let cfg = WorkflowConfig::from_args(Some(2), 0, 0, generator.clone());
        let mut dataset = build_dataset(&generator).unwrap();
        assert!(Runner::new(cfg).execute(&mut dataset).is_err());
    }
}
