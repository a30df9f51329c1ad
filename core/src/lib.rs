//! Tree dedispersion core for incoherent radio burst searches.
//!
//! Raw filterbank channels are remapped onto rows evenly spaced in delay,
//! then merged pairwise over `log2(nchan)` levels so every trial DM up to
//! the diagonal is produced in `O(nchan · ntime · log2(nchan))` work.

pub mod dataset;
pub mod math;
pub mod prelude;
pub mod processing;
pub mod telemetry;

pub use dataset::{Dataset, DelayMap};
pub use prelude::{DedispError, DedispResult, ProcessingStage, StageConfig, StageReport};
pub use processing::{burst_dm_transform, BurstTransform, DedispersionStage};
