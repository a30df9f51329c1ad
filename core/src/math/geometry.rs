use crate::prelude::{DedispError, DedispResult};

/// Cold-plasma dispersion constant in s MHz² / (pc cm⁻³).
pub const K_DM: f64 = 4148.808;

/// Deepest tree supported; keeps `2^depth` well inside `usize` on 32-bit targets.
pub const MAX_DEPTH: i32 = 30;

/// Processed channel count for a recursion depth.
pub fn nchan_for_depth(depth: i32) -> DedispResult<usize> {
    if !(0..=MAX_DEPTH).contains(&depth) {
        return Err(DedispError::InvalidArgument(format!(
            "depth {} outside 0..={}",
            depth, MAX_DEPTH
        )));
    }
    Ok(1usize << depth)
}

/// Smallest depth whose `2^depth` rows can hold `nchan` input channels.
pub fn depth_for_nchan(nchan: usize) -> DedispResult<i32> {
    if nchan == 0 {
        return Err(DedispError::InvalidArgument("no input channels".into()));
    }
    let depth = nchan.next_power_of_two().trailing_zeros() as i32;
    nchan_for_depth(depth)?;
    Ok(depth)
}

/// Dispersion delay in seconds of `nu` relative to `nu_ref` (both MHz).
pub fn dispersion_delay(dm: f64, nu: f64, nu_ref: f64) -> f64 {
    K_DM * dm * (nu.powi(-2) - nu_ref.powi(-2))
}

/// DM at which each of the `2^depth` processed channels carries one sample
/// of delay, i.e. the full sweep between `nu1 > nu2` spans `2^depth` samples.
pub fn diagonal_dm(nu1: f64, nu2: f64, dt: f64, depth: i32) -> DedispResult<f64> {
    let nchan = nchan_for_depth(depth)?;
    if !(nu2.is_finite() && nu2 > 0.0 && nu1.is_finite() && nu1 > nu2) {
        return Err(DedispError::InvalidArgument(format!(
            "band edges must satisfy nu1 > nu2 > 0, got {} and {}",
            nu1, nu2
        )));
    }
    check_dt(dt)?;
    let sweep_per_dm = dispersion_delay(1.0, nu2, nu1);
    Ok(nchan as f64 * dt / sweep_per_dm)
}

/// Padding samples the deepest merge level reads past the main block.
///
/// Equals the largest trial sweep, `2^depth - 1` samples. `ndata2` is the
/// length of the trailing block that must supply that padding.
pub fn nextra(ndata2: usize, depth: i32) -> DedispResult<usize> {
    let needed = nchan_for_depth(depth)? - 1;
    if ndata2 < needed {
        return Err(DedispError::InsufficientBuffer {
            needed,
            available: ndata2,
        });
    }
    Ok(needed)
}

/// Fraction of the band's total delay at `nu`, measured from `nu_hi` (0.0)
/// to `nu_lo` (1.0). A zero-width band maps everything to 0.0.
pub fn delay_fraction(nu: f64, nu_hi: f64, nu_lo: f64) -> f64 {
    let span = nu_lo.powi(-2) - nu_hi.powi(-2);
    if span <= 0.0 {
        return 0.0;
    }
    (nu.powi(-2) - nu_hi.powi(-2)) / span
}

pub(crate) fn check_dt(dt: f64) -> DedispResult<()> {
    if dt.is_finite() && dt > 0.0 {
        Ok(())
    } else {
        Err(DedispError::InvalidArgument(format!(
            "sampling interval must be positive, got {}",
            dt
        )))
    }
}
