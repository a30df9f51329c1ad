pub mod stage;
pub mod tree;

pub use stage::DedispersionStage;
pub use tree::{burst_dm_transform, BurstTransform};
