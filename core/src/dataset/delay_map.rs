use serde::{Deserialize, Serialize};

use crate::math::geometry::{check_dt, delay_fraction, dispersion_delay, nchan_for_depth};
use crate::prelude::{DedispError, DedispResult};

/// Placement of raw channels on the delay-linear rows of one tree depth.
///
/// Row `r` of `nchan` sits at fraction `r / (nchan - 1)` of the band's
/// dispersion sweep, counted from the highest frequency. Each raw channel
/// is assigned the nearest row (round half away from zero), which is also
/// its integer sample offset when the band sweep is `nchan - 1` samples.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DelayMap {
    depth: u32,
    nchan: usize,
    chans: Vec<f64>,
    chan_map: Vec<usize>,
    dm_step: f64,
}

impl DelayMap {
    pub fn build(raw_chans: &[f64], depth: i32, dt: f64) -> DedispResult<Self> {
        let nchan = nchan_for_depth(depth)?;
        check_dt(dt)?;
        validate_frequencies(raw_chans, nchan)?;

        let (nu_hi, nu_lo) = band_edges(raw_chans);
        let last_row = (nchan - 1) as f64;
        let chan_map = raw_chans
            .iter()
            .map(|&nu| quantize(delay_fraction(nu, nu_hi, nu_lo) * last_row, nchan))
            .collect();

        let sweep_per_dm = dispersion_delay(1.0, nu_lo, nu_hi);
        let dm_step = if sweep_per_dm > 0.0 {
            dt / sweep_per_dm
        } else {
            0.0
        };

        Ok(Self {
            depth: depth as u32,
            nchan,
            chans: (0..nchan).map(|k| k as f64).collect(),
            chan_map,
            dm_step,
        })
    }

    pub fn depth(&self) -> u32 {
        self.depth
    }

    pub fn nchan(&self) -> usize {
        self.nchan
    }

    /// Full-band delay in samples for each trial channel.
    pub fn chans(&self) -> &[f64] {
        &self.chans
    }

    /// Processed row for each raw channel.
    pub fn chan_map(&self) -> &[usize] {
        &self.chan_map
    }

    /// DM that adds one sample of full-band delay; zero for a single frequency.
    pub fn dm_step(&self) -> f64 {
        self.dm_step
    }

    pub fn trial_dm(&self, trial: usize) -> Option<f64> {
        self.chans.get(trial).map(|&delay| delay * self.dm_step)
    }

    pub(crate) fn into_parts(self) -> (usize, Vec<f64>, Vec<usize>) {
        (self.nchan, self.chans, self.chan_map)
    }
}

fn quantize(position: f64, nchan: usize) -> usize {
    (position.round().max(0.0) as usize).min(nchan - 1)
}

/// Highest and lowest frequency of a monotonic channel list.
pub(crate) fn band_edges(raw_chans: &[f64]) -> (f64, f64) {
    let first = raw_chans[0];
    let last = raw_chans[raw_chans.len() - 1];
    (first.max(last), first.min(last))
}

fn validate_frequencies(raw_chans: &[f64], nchan: usize) -> DedispResult<()> {
    if raw_chans.is_empty() {
        return Err(DedispError::InvalidArgument("no input channels".into()));
    }
    if raw_chans.len() > nchan {
        return Err(DedispError::InvalidArgument(format!(
            "{} input channels do not fit {} processed channels",
            raw_chans.len(),
            nchan
        )));
    }
    if let Some(bad) = raw_chans.iter().find(|nu| !(nu.is_finite() && **nu > 0.0)) {
        return Err(DedispError::InvalidArgument(format!(
            "channel frequency {} is not positive",
            bad
        )));
    }
    let ascending = raw_chans.windows(2).all(|pair| pair[1] > pair[0]);
    let descending = raw_chans.windows(2).all(|pair| pair[1] < pair[0]);
    if !(ascending || descending) {
        return Err(DedispError::InvalidArgument(
            "channel frequencies must be strictly monotonic".into(),
        ));
    }
    Ok(())
}
