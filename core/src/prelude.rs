use serde::{Deserialize, Serialize};

use crate::dataset::Dataset;

/// Shared configuration for the dedispersion stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageConfig {
    pub depth: u32,
    /// Worker threads for the fork-join merge; `0` or `1` runs sequentially.
    #[serde(default)]
    pub workers: usize,
    #[serde(default = "default_fork_levels")]
    pub fork_levels: u32,
}

fn default_fork_levels() -> u32 {
    4
}

impl StageConfig {
    pub fn sequential(depth: u32) -> Self {
        Self {
            depth,
            workers: 0,
            fork_levels: 0,
        }
    }
}

/// Location and value of the brightest dedispersed sample.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrialPeak {
    pub trial: usize,
    pub sample: usize,
    pub dm: f64,
    pub value: f32,
}

/// Summary produced by each stage run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StageReport {
    pub nchan: usize,
    pub samples: usize,
    pub diagonal_dm: f64,
    pub output_rms: f32,
    pub peak: Option<TrialPeak>,
    pub notes: Vec<String>,
}

/// Common error type for geometry, transform, and ingest failures.
#[derive(thiserror::Error, Debug)]
pub enum DedispError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("insufficient buffer: need {needed} samples, have {available}")]
    InsufficientBuffer { needed: usize, available: usize },
    #[error("i/o error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed dataset {path}: {reason}")]
    Format { path: String, reason: String },
    #[error("internal failure: {0}")]
    Internal(String),
}

pub type DedispResult<T> = Result<T, DedispError>;

/// Trait describing a processing stage that fills a dataset's output.
pub trait ProcessingStage {
    fn initialize(&mut self, config: &StageConfig) -> DedispResult<()>;
    fn execute(&mut self, dataset: &mut Dataset) -> DedispResult<StageReport>;
    fn cleanup(&mut self);
}
