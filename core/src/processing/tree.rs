use log::debug;
use ndarray::{s, Array2, ArrayView1, ArrayView2, ArrayViewMut1, ArrayViewMut2, Axis, Zip};

use crate::math::geometry::{check_dt, nchan_for_depth, nextra};
use crate::prelude::{DedispError, DedispResult};

/// Recursive channel-merge dedisperser.
///
/// Each level splits its rows into a lower and an upper half, dedisperses
/// both, then forms trial `k` as lower trial `k / 2` plus upper trial `k / 2`
/// read `k - k / 2` samples later. After `depth` levels trial `k` sums every
/// row along a sweep of exactly `k` samples.
///
/// The two halves share no state, so the top `fork_levels` levels may run
/// on a fixed rayon pool. Results are bit-identical either way because every
/// output sample is produced by the same additions in the same order.
#[derive(Debug)]
pub struct BurstTransform {
    workers: Option<rayon::ThreadPool>,
    fork_levels: u32,
}

impl BurstTransform {
    pub fn sequential() -> Self {
        Self {
            workers: None,
            fork_levels: 0,
        }
    }

    /// Builds a fixed pool of `workers` threads that forks the top
    /// `fork_levels` levels. A single worker or zero levels stays sequential.
    pub fn with_workers(workers: usize, fork_levels: u32) -> DedispResult<Self> {
        if workers <= 1 || fork_levels == 0 {
            return Ok(Self::sequential());
        }
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|index| format!("dedisp-{}", index))
            .build()
            .map_err(|err| DedispError::Internal(format!("building worker pool: {}", err)))?;
        Ok(Self {
            workers: Some(pool),
            fork_levels,
        })
    }

    pub fn is_parallel(&self) -> bool {
        self.workers.is_some()
    }

    /// Dedisperses `indata1` (`nfreq × ntime1`) using the first
    /// `nextra(ntime2, depth)` samples of `indata2` (`nfreq × ntime2`) as
    /// padding. Raw channel `i` is accumulated into row `chan_map[i]`.
    ///
    /// Writes `nchan × ntime1` trials into `outdata` and returns `ntime1`.
    /// Nothing is written when validation fails.
    pub fn transform(
        &self,
        indata1: ArrayView2<f32>,
        indata2: ArrayView2<f32>,
        mut outdata: ArrayViewMut2<f32>,
        delta_t: f64,
        chan_map: &[usize],
        depth: i32,
    ) -> DedispResult<usize> {
        let nchan = nchan_for_depth(depth)?;
        check_dt(delta_t)?;
        let (nfreq, ntime1) = indata1.dim();
        validate_channels(nfreq, nchan, indata2.nrows(), chan_map)?;
        let padding = nextra(indata2.ncols(), depth)?;
        if outdata.nrows() != nchan {
            return Err(DedispError::InvalidArgument(format!(
                "output has {} rows, depth {} needs {}",
                outdata.nrows(),
                depth,
                nchan
            )));
        }
        if outdata.ncols() < ntime1 {
            return Err(DedispError::InsufficientBuffer {
                needed: ntime1,
                available: outdata.ncols(),
            });
        }

        let ntime = ntime1 + padding;
        let mut rows = Array2::<f32>::zeros((nchan, ntime));
        for (raw, &row) in chan_map.iter().enumerate() {
            let mut target = rows.row_mut(row);
            target
                .slice_mut(s![..ntime1])
                .zip_mut_with(&indata1.row(raw), |acc, &v| *acc += v);
            target
                .slice_mut(s![ntime1..])
                .zip_mut_with(&indata2.slice(s![raw, ..padding]), |acc, &v| *acc += v);
        }

        debug!(
            "tree transform: nfreq {} nchan {} ntime1 {} padding {} dt {:e}",
            nfreq, nchan, ntime1, padding, delta_t
        );

        let mut trials = Array2::<f32>::zeros((nchan, ntime));
        match &self.workers {
            Some(pool) => {
                let levels = self.fork_levels;
                pool.install(|| dedisperse_rows(rows.view(), trials.view_mut(), levels));
            }
            None => dedisperse_rows(rows.view(), trials.view_mut(), 0),
        }

        outdata
            .slice_mut(s![.., ..ntime1])
            .assign(&trials.slice(s![.., ..ntime1]));
        Ok(ntime1)
    }
}

impl Default for BurstTransform {
    fn default() -> Self {
        Self::sequential()
    }
}

/// Sequential tree transform; see [`BurstTransform::transform`].
pub fn burst_dm_transform(
    indata1: ArrayView2<f32>,
    indata2: ArrayView2<f32>,
    outdata: ArrayViewMut2<f32>,
    delta_t: f64,
    chan_map: &[usize],
    depth: i32,
) -> DedispResult<usize> {
    BurstTransform::sequential().transform(indata1, indata2, outdata, delta_t, chan_map, depth)
}

fn validate_channels(
    nfreq: usize,
    nchan: usize,
    padding_rows: usize,
    chan_map: &[usize],
) -> DedispResult<()> {
    if nfreq == 0 || nfreq > nchan {
        return Err(DedispError::InvalidArgument(format!(
            "{} input channels cannot be represented by {} processed channels",
            nfreq, nchan
        )));
    }
    if padding_rows != nfreq {
        return Err(DedispError::InvalidArgument(format!(
            "padding block has {} channels, expected {}",
            padding_rows, nfreq
        )));
    }
    if chan_map.len() != nfreq {
        return Err(DedispError::InvalidArgument(format!(
            "channel map has {} entries for {} channels",
            chan_map.len(),
            nfreq
        )));
    }
    if let Some(&row) = chan_map.iter().find(|&&row| row >= nchan) {
        return Err(DedispError::InvalidArgument(format!(
            "channel map entry {} exceeds {} rows",
            row, nchan
        )));
    }
    Ok(())
}

fn dedisperse_rows(input: ArrayView2<f32>, mut output: ArrayViewMut2<f32>, fork_levels: u32) {
    let nrows = input.nrows();
    if nrows == 1 {
        output.assign(&input);
        return;
    }

    let half = nrows / 2;
    let mut scratch = Array2::<f32>::zeros(input.raw_dim());
    {
        let (lower_in, upper_in) = input.split_at(Axis(0), half);
        let (lower_out, upper_out) = scratch.view_mut().split_at(Axis(0), half);
        if fork_levels > 0 {
            rayon::join(
                || dedisperse_rows(lower_in, lower_out, fork_levels - 1),
                || dedisperse_rows(upper_in, upper_out, fork_levels - 1),
            );
        } else {
            dedisperse_rows(lower_in, lower_out, 0);
            dedisperse_rows(upper_in, upper_out, 0);
        }
    }

    let (lower, upper) = scratch.view().split_at(Axis(0), half);
    for (trial, out_row) in output.axis_iter_mut(Axis(0)).enumerate() {
        let child = trial / 2;
        let shift = (trial - child) as isize;
        add_shifted(lower.row(child), upper.row(child), shift, out_row);
    }
}

/// `out[t] = base[t] + delayed[t + shift]`; reads outside `delayed` on
/// either side add zero.
pub(crate) fn add_shifted(
    base: ArrayView1<f32>,
    delayed: ArrayView1<f32>,
    shift: isize,
    mut out: ArrayViewMut1<f32>,
) {
    let len = base.len() as isize;
    let start = (-shift).clamp(0, len);
    let end = (delayed.len() as isize - shift).clamp(0, len);
    out.assign(&base);
    if start < end {
        Zip::from(out.slice_mut(s![start..end]))
            .and(delayed.slice(s![start + shift..end + shift]))
            .for_each(|acc, &v| *acc += v);
    }
}
