pub mod geometry;
pub mod stats;

pub use geometry::{depth_for_nchan, diagonal_dm, nchan_for_depth, nextra, K_DM};
pub use stats::StatsHelper;
