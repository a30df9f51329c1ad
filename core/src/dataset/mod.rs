pub mod delay_map;
pub mod ingest;

pub use delay_map::DelayMap;
pub use ingest::{DatasetReader, JsonDatasetReader};

use ndarray::{s, Array2, ArrayView2};

use crate::math::geometry::check_dt;
use crate::prelude::{DedispError, DedispResult};
use crate::processing::BurstTransform;

/// Filterbank samples plus the delay metadata of the active tree depth.
///
/// Raw fields are populated at construction; `prepare` fills `nchan`,
/// `chans` and `chan_map` for a depth and `dedisperse` fills `data`.
#[derive(Debug, Clone)]
pub struct Dataset {
    nchan: usize,
    raw_nchan: usize,
    ndata: usize,
    dt: f64,
    raw_chans: Vec<f64>,
    chans: Vec<f64>,
    raw_data: Array2<f32>,
    data: Array2<f32>,
    chan_map: Vec<usize>,
    depth: Option<u32>,
    dm_step: f64,
}

impl Dataset {
    /// `raw_data` is `raw_chans.len() × ndata`, one row per input channel.
    pub fn new(raw_chans: Vec<f64>, raw_data: Array2<f32>, dt: f64) -> DedispResult<Self> {
        check_dt(dt)?;
        if raw_chans.is_empty() {
            return Err(DedispError::InvalidArgument("no input channels".into()));
        }
        if raw_data.nrows() != raw_chans.len() {
            return Err(DedispError::InvalidArgument(format!(
                "{} channel frequencies for {} data rows",
                raw_chans.len(),
                raw_data.nrows()
            )));
        }

        Ok(Self {
            nchan: 0,
            raw_nchan: raw_chans.len(),
            ndata: raw_data.ncols(),
            dt,
            raw_chans,
            chans: Vec::new(),
            raw_data,
            data: Array2::zeros((0, 0)),
            chan_map: Vec::new(),
            depth: None,
            dm_step: 0.0,
        })
    }

    /// Computes the delay map for `depth`, discarding any previous output.
    pub fn prepare(&mut self, depth: i32) -> DedispResult<()> {
        let map = DelayMap::build(&self.raw_chans, depth, self.dt)?;
        self.depth = Some(map.depth());
        self.dm_step = map.dm_step();
        let (nchan, chans, chan_map) = map.into_parts();
        self.nchan = nchan;
        self.chans = chans;
        self.chan_map = chan_map;
        self.data = Array2::zeros((0, 0));
        Ok(())
    }

    /// Runs the tree over the raw samples, keeping the trailing `nchan - 1`
    /// samples as padding. Returns the number of valid samples per trial.
    pub fn dedisperse(&mut self, transform: &BurstTransform) -> DedispResult<usize> {
        let depth = self.active_depth()?;
        let padding = self.nchan - 1;
        if self.ndata <= padding {
            return Err(DedispError::InsufficientBuffer {
                needed: padding + 1,
                available: self.ndata,
            });
        }

        let ntime1 = self.ndata - padding;
        let mut output = Array2::zeros((self.nchan, ntime1));
        let processed = transform.transform(
            self.raw_data.slice(s![.., ..ntime1]),
            self.raw_data.slice(s![.., ntime1..]),
            output.view_mut(),
            self.dt,
            &self.chan_map,
            depth as i32,
        )?;
        self.data = output;
        Ok(processed)
    }

    pub fn nchan(&self) -> usize {
        self.nchan
    }

    pub fn raw_nchan(&self) -> usize {
        self.raw_nchan
    }

    pub fn ndata(&self) -> usize {
        self.ndata
    }

    pub fn dt(&self) -> f64 {
        self.dt
    }

    pub fn depth(&self) -> Option<u32> {
        self.depth
    }

    pub fn raw_chans(&self) -> &[f64] {
        &self.raw_chans
    }

    pub fn chans(&self) -> &[f64] {
        &self.chans
    }

    pub fn chan_map(&self) -> &[usize] {
        &self.chan_map
    }

    pub fn raw_data(&self) -> ArrayView2<'_, f32> {
        self.raw_data.view()
    }

    pub fn data(&self) -> ArrayView2<'_, f32> {
        self.data.view()
    }

    /// DM of each trial channel at the active depth.
    pub fn trial_dms(&self) -> Vec<f64> {
        self.chans.iter().map(|delay| delay * self.dm_step).collect()
    }

    /// Largest DM the tree resolves: each of the `nchan - 1` row gaps
    /// between the outer channel centres carries one sample of delay.
    pub fn diagonal_dm(&self) -> DedispResult<f64> {
        self.active_depth()?;
        if self.raw_nchan < 2 {
            return Err(DedispError::InvalidArgument(
                "a single frequency has no dispersion sweep".into(),
            ));
        }
        Ok((self.nchan - 1) as f64 * self.dm_step)
    }

    /// Releases the raw and processed sample arrays together.
    pub fn into_parts(self) -> (Array2<f32>, Array2<f32>) {
        (self.raw_data, self.data)
    }

    fn active_depth(&self) -> DedispResult<u32> {
        self.depth.ok_or_else(|| {
            DedispError::InvalidArgument("dataset has no delay map; call prepare first".into())
        })
    }
}
