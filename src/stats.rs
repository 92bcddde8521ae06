//! Robust statistics over match residuals.
//!
//! [`make_statistics`] computes any combination of [`StatKind`] values over a
//! sample of scalars. The `make_match_statistics*` functions extract residuals
//! from a match list in one of four domains and forward them:
//!
//! | function | residual |
//! |---|---|
//! | [`make_match_statistics`] | stored match `distance` (radians) |
//! | [`make_match_statistics_in_radians`] | reference coord ↔ `wcs.pixel_to_sky(source centroid)` |
//! | [`make_match_statistics_in_pixels`] | source centroid ↔ `wcs.sky_to_pixel(reference coord)` |
//! | [`make_match_statistics_in_local_pixels`] | on-sky residual ÷ local pixel scale |
//!
//! Standard deviations use population (÷n) conventions throughout.
//! Quantiles interpolate linearly between order statistics.

use std::collections::BTreeMap;

use bitflags::bitflags;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::catalog::ReferenceMatch;
use crate::error::{AstromError, Result};
use crate::wcs::Wcs;

/// IQR → σ for a Gaussian distribution.
const IQ_TO_STDEV: f64 = 0.741_301_109_252_801;

bitflags! {
    /// Selection of statistics to compute. Combine with `|`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
    pub struct StatKind: u32 {
        /// Number of samples.
        const NPOINT = 1 << 0;
        const MEAN = 1 << 1;
        /// Unclipped population standard deviation.
        const STDEV = 1 << 2;
        const MEDIAN = 1 << 3;
        /// Interquartile range (q75 − q25).
        const IQRANGE = 1 << 4;
        /// Sigma-clipped mean.
        const MEANCLIP = 1 << 5;
        /// Sigma-clipped population standard deviation.
        const STDEVCLIP = 1 << 6;
    }
}

/// Parameters for sigma clipping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatisticsControl {
    /// Clipping threshold in units of σ. Default 3.0.
    pub num_sigma_clip: f64,
    /// Maximum number of clipping passes. Default 3.
    pub num_iter: u32,
}

impl Default for StatisticsControl {
    fn default() -> Self {
        Self {
            num_sigma_clip: 3.0,
            num_iter: 3,
        }
    }
}

/// The requested statistics of one sample.
#[derive(Debug, Clone, PartialEq)]
pub struct Statistics {
    values: BTreeMap<StatKind, f64>,
    npoint: usize,
}

impl Statistics {
    /// Value of a single statistic, if it was requested.
    pub fn get(&self, kind: StatKind) -> Option<f64> {
        self.values.get(&kind).copied()
    }

    /// The value when exactly one statistic was requested.
    pub fn value(&self) -> Option<f64> {
        if self.values.len() == 1 {
            self.values.values().next().copied()
        } else {
            None
        }
    }

    /// Number of finite samples the statistics were computed over.
    pub fn npoint(&self) -> usize {
        self.npoint
    }
}

/// Compute the requested statistics of `values`.
///
/// Non-finite values are ignored. Fails with [`AstromError::EmptyInput`] if
/// no finite value remains.
pub fn make_statistics(
    values: &[f64],
    flags: StatKind,
    ctrl: &StatisticsControl,
) -> Result<Statistics> {
    let mut sorted: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if sorted.is_empty() {
        return Err(AstromError::EmptyInput);
    }
    sorted.sort_by(f64::total_cmp);

    let clipped = if flags.intersects(StatKind::MEANCLIP | StatKind::STDEVCLIP) {
        Some(clipped_mean_stdev(&sorted, ctrl))
    } else {
        None
    };
    let unclipped = if flags.intersects(StatKind::MEAN | StatKind::STDEV) {
        Some(mean_stdev(&sorted))
    } else {
        None
    };

    let values = flags
        .iter()
        .map(|kind| {
            let v = if kind == StatKind::NPOINT {
                sorted.len() as f64
            } else if kind == StatKind::MEAN {
                unclipped.map_or(f64::NAN, |(m, _)| m)
            } else if kind == StatKind::STDEV {
                unclipped.map_or(f64::NAN, |(_, s)| s)
            } else if kind == StatKind::MEDIAN {
                percentile(&sorted, 0.5)
            } else if kind == StatKind::IQRANGE {
                interquartile_range(&sorted)
            } else if kind == StatKind::MEANCLIP {
                clipped.map_or(f64::NAN, |(m, _)| m)
            } else {
                clipped.map_or(f64::NAN, |(_, s)| s)
            };
            (kind, v)
        })
        .collect();

    Ok(Statistics {
        values,
        npoint: sorted.len(),
    })
}

/// Statistics of the stored `distance` of each match (radians).
pub fn make_match_statistics(matches: &[ReferenceMatch], flags: StatKind) -> Result<Statistics> {
    let residuals: Vec<f64> = matches.par_iter().map(|m| m.distance).collect();
    make_statistics(&residuals, flags, &StatisticsControl::default())
}

/// Statistics of the on-sky separation (radians) between each reference
/// coordinate and the source centroid projected through `wcs`.
pub fn make_match_statistics_in_radians<W: Wcs + ?Sized>(
    wcs: &W,
    matches: &[ReferenceMatch],
    flags: StatKind,
) -> Result<Statistics> {
    let residuals: Vec<f64> = matches
        .par_iter()
        .map(|m| {
            m.reference
                .coord
                .separation(&wcs.pixel_to_sky(&m.source.centroid))
        })
        .collect();
    make_statistics(&residuals, flags, &StatisticsControl::default())
}

/// Statistics of the pixel distance between each source centroid and the
/// reference coordinate projected through `wcs`.
pub fn make_match_statistics_in_pixels<W: Wcs + ?Sized>(
    wcs: &W,
    matches: &[ReferenceMatch],
    flags: StatKind,
) -> Result<Statistics> {
    let residuals: Vec<f64> = matches
        .par_iter()
        .map(|m| {
            wcs.sky_to_pixel(&m.reference.coord)
                .distance(&m.source.centroid)
        })
        .collect();
    make_statistics(&residuals, flags, &StatisticsControl::default())
}

/// Statistics of the on-sky residual expressed in units of the local pixel
/// scale of `wcs` at each reference coordinate.
pub fn make_match_statistics_in_local_pixels<W: Wcs + ?Sized>(
    wcs: &W,
    matches: &[ReferenceMatch],
    flags: StatKind,
) -> Result<Statistics> {
    let residuals: Vec<f64> = matches
        .par_iter()
        .map(|m| {
            let sep = m
                .reference
                .coord
                .separation(&wcs.pixel_to_sky(&m.source.centroid));
            sep / wcs.local_pixel_scale(&m.reference.coord)
        })
        .collect();
    make_statistics(&residuals, flags, &StatisticsControl::default())
}

// ── Internal helpers ────────────────────────────────────────────────────────

/// Linearly interpolated percentile of a sorted, non-empty slice. `p` is in [0, 1].
fn percentile(sorted: &[f64], p: f64) -> f64 {
    let rank = p * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    let frac = rank - lo as f64;
    sorted[lo] + (sorted[hi] - sorted[lo]) * frac
}

fn interquartile_range(sorted: &[f64]) -> f64 {
    percentile(sorted, 0.75) - percentile(sorted, 0.25)
}

/// Population mean and standard deviation.
fn mean_stdev(values: &[f64]) -> (f64, f64) {
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / n;
    (mean, var.sqrt())
}

/// Iterative sigma clipping.
///
/// The first pass centers on the median with σ estimated from the IQR (falling
/// back to the plain standard deviation when the IQR is zero); later passes use
/// the mean and standard deviation of the retained samples. Stops after
/// `ctrl.num_iter` passes or once a pass rejects nothing.
fn clipped_mean_stdev(sorted: &[f64], ctrl: &StatisticsControl) -> (f64, f64) {
    let mut center = percentile(sorted, 0.5);
    let mut sigma = IQ_TO_STDEV * interquartile_range(sorted);
    if sigma <= 0.0 {
        sigma = mean_stdev(sorted).1;
    }

    let mut kept: Vec<f64> = sorted.to_vec();
    for _ in 0..ctrl.num_iter {
        if sigma <= 0.0 {
            break;
        }
        let threshold = ctrl.num_sigma_clip * sigma;
        let next: Vec<f64> = kept
            .iter()
            .copied()
            .filter(|v| (v - center).abs() <= threshold)
            .collect();
        if next.is_empty() {
            break;
        }
        let changed = next.len() != kept.len();
        kept = next;
        (center, sigma) = mean_stdev(&kept);
        if !changed {
            break;
        }
    }
    mean_stdev(&kept)
}
