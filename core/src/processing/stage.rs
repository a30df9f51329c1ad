use crate::dataset::Dataset;
use crate::math::geometry::nchan_for_depth;
use crate::math::stats::StatsHelper;
use crate::prelude::{
    DedispError, DedispResult, ProcessingStage, StageConfig, StageReport, TrialPeak,
};
use crate::processing::tree::BurstTransform;
use crate::telemetry::log::LogManager;
use crate::telemetry::metrics::MetricsRecorder;

/// Stage that maps a dataset onto the tree and fills its dedispersed output.
pub struct DedispersionStage {
    config: Option<StageConfig>,
    transform: Option<BurstTransform>,
    logger: LogManager,
    metrics: MetricsRecorder,
}

impl DedispersionStage {
    pub fn new() -> Self {
        Self {
            config: None,
            transform: None,
            logger: LogManager::new(),
            metrics: MetricsRecorder::new(),
        }
    }

    pub fn metrics(&self) -> &MetricsRecorder {
        &self.metrics
    }

    fn run(
        &self,
        depth: i32,
        transform: &BurstTransform,
        dataset: &mut Dataset,
    ) -> DedispResult<StageReport> {
        dataset.prepare(depth)?;
        let samples = dataset.dedisperse(transform)?;

        // A single input frequency has no dispersion sweep to resolve.
        let diagonal_dm = if dataset.raw_nchan() == 1 {
            0.0
        } else {
            dataset.diagonal_dm()?
        };
        let trial_dms = dataset.trial_dms();
        let output = dataset.data();
        let output_rms = StatsHelper::rms_2d(output);
        let peak = StatsHelper::argmax(output).map(|(trial, sample, value)| TrialPeak {
            trial,
            sample,
            dm: trial_dms[trial],
            value,
        });

        Ok(StageReport {
            nchan: dataset.nchan(),
            samples,
            diagonal_dm,
            output_rms,
            peak,
            notes: vec![
                format!("output RMS {:.4}", output_rms),
                format!("diagonal DM {:.3}", diagonal_dm),
            ],
        })
    }
}

impl Default for DedispersionStage {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessingStage for DedispersionStage {
    fn initialize(&mut self, config: &StageConfig) -> DedispResult<()> {
        let depth = i32::try_from(config.depth)
            .map_err(|_| DedispError::InvalidArgument(format!("depth {}", config.depth)))?;
        nchan_for_depth(depth)?;
        self.transform = Some(BurstTransform::with_workers(
            config.workers,
            config.fork_levels,
        )?);
        self.config = Some(config.clone());
        Ok(())
    }

    fn execute(&mut self, dataset: &mut Dataset) -> DedispResult<StageReport> {
        let config = self
            .config
            .as_ref()
            .ok_or_else(|| DedispError::Internal("stage not initialized".into()))?;
        let transform = self
            .transform
            .as_ref()
            .ok_or_else(|| DedispError::Internal("transform not configured".into()))?;

        match self.run(config.depth as i32, transform, dataset) {
            Ok(report) => {
                self.metrics.record_processed(report.nchan * report.samples);
                self.logger.record(&format!(
                    "DedispersionStage nchan {} samples {} RMS {:.4}",
                    report.nchan, report.samples, report.output_rms
                ));
                Ok(report)
            }
            Err(err) => {
                self.metrics.record_error();
                self.logger
                    .warn(&format!("DedispersionStage failed: {}", err));
                Err(err)
            }
        }
    }

    fn cleanup(&mut self) {
        self.config = None;
        self.transform = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    fn dataset(nchan: usize, ndata: usize) -> Dataset {
        let freqs = (0..nchan)
            .map(|i| 1500.0 - 400.0 * i as f64 / nchan as f64)
            .collect();
        let mut raw = Array2::<f32>::zeros((nchan, ndata));
        for row in 0..nchan {
            raw[[row, 5]] = 1.0;
        }
        Dataset::new(freqs, raw, 1e-3).unwrap()
    }

    #[test]
    fn stage_reports_zero_dm_pulse() {
        let mut stage = DedispersionStage::new();
        stage.initialize(&StageConfig::sequential(3)).unwrap();
        let mut data = dataset(8, 32);

        let report = stage.execute(&mut data).unwrap();
        assert_eq!(report.nchan, 8);
        assert_eq!(report.samples, 25);
        let peak = report.peak.unwrap();
        assert_eq!((peak.trial, peak.sample, peak.value), (0, 5, 8.0));
        assert_eq!(peak.dm, 0.0);
        assert!(report.diagonal_dm > 0.0);
        assert_eq!(stage.metrics().snapshot(), (1, 200, 0));
        stage.cleanup();
    }

    #[test]
    fn single_channel_reports_zero_diagonal() {
        let mut stage = DedispersionStage::new();
        stage.initialize(&StageConfig::sequential(0)).unwrap();
        let mut data = dataset(1, 16);

        let report = stage.execute(&mut data).unwrap();
        assert_eq!(report.nchan, 1);
        assert_eq!(report.samples, 16);
        assert_eq!(report.diagonal_dm, 0.0);
        assert_eq!(report.peak.unwrap().value, 1.0);
    }

    #[test]
    fn stage_requires_initialization() {
        let mut stage = DedispersionStage::new();
        let mut data = dataset(4, 16);
        assert!(matches!(
            stage.execute(&mut data),
            Err(DedispError::Internal(_))
        ));
    }

    #[test]
    fn stage_counts_failures() {
        let mut stage = DedispersionStage::new();
        stage
            .initialize(&StageConfig {
                depth: 2,
                workers: 2,
                fork_levels: 1,
            })
            .unwrap();
        let mut data = dataset(8, 32);
        assert!(stage.execute(&mut data).is_err());
        assert_eq!(stage.metrics().snapshot(), (0, 0, 1));
    }

    #[test]
    fn initialize_rejects_deep_trees() {
        let mut stage = DedispersionStage::new();
        assert!(stage.initialize(&StageConfig::sequential(40)).is_err());
    }
}
