//! Least-squares TAN-SIP fitting from a match list.
//!
//! [`DistortionSolver`] is the seam the iterative fitter calls once per round.
//! [`SipSolver`] is the standard implementation:
//!
//! 1. For each match, project the reference coordinate onto the tangent plane
//!    of the starting WCS (`ξ, η`) and take the source pixel offset from CRPIX
//!    (`u, v`).
//! 2. Fit `ξ` and `η` separately as polynomials of total degree `order` in
//!    normalized `(u, v)` (SVD least squares).
//! 3. The linear terms give the new CD matrix, the constant terms shift CRPIX,
//!    and the higher terms (mapped through CD⁻¹) give SIP `A`/`B`.
//! 4. Fit the reverse `AP`/`BP` polynomials (one order higher) on a regular
//!    grid spanning the bounding box.
//!
//! Orders 0 and 1 produce a purely linear (TAN) WCS with no SIP terms.

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::bbox::BoundingBox;
use crate::catalog::ReferenceMatch;
use crate::centroid::Centroid;
use crate::coord::rad_to_arcsec;
use crate::error::{AstromError, Result};
use crate::stats::{
    make_match_statistics_in_pixels, make_match_statistics_in_radians, StatKind, Statistics,
};
use crate::wcs::sip::{term_pairs, SipDistortion, SipPolynomial};
use crate::wcs::TanSipWcs;

/// Highest polynomial order allowed by the SIP convention.
pub const MAX_SIP_ORDER: u32 = 9;

/// Output of one solver invocation.
#[derive(Debug, Clone)]
pub struct DistortionFit {
    /// The fitted WCS.
    pub wcs: TanSipWcs,
    /// Median on-sky separation between reference objects and sources under
    /// the fitted WCS, in radians.
    pub scatter_on_sky: f64,
}

/// Fits a distortion-bearing WCS to a match list.
pub trait DistortionSolver {
    /// Fit a new WCS of polynomial `order`, starting from `starting_wcs`.
    ///
    /// An empty `bbox` means the solver must derive the region of validity
    /// from the matches.
    fn solve(
        &self,
        matches: &[ReferenceMatch],
        starting_wcs: &TanSipWcs,
        order: u32,
        bbox: &BoundingBox,
    ) -> Result<DistortionFit>;
}

/// Configuration for [`SipSolver`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SipSolverConfig {
    /// Grid points per axis for the reverse fit. None = `5 × (order + 1)`.
    pub ngrid: Option<u32>,
}

/// Least-squares TAN-SIP solver.
#[derive(Debug, Clone, Default)]
pub struct SipSolver {
    pub config: SipSolverConfig,
}

impl SipSolver {
    pub fn new(config: SipSolverConfig) -> Self {
        Self { config }
    }

    /// Fit and return both the linear-only and the full WCS.
    pub fn fit(
        &self,
        matches: &[ReferenceMatch],
        starting_wcs: &TanSipWcs,
        order: u32,
        bbox: &BoundingBox,
    ) -> Result<SipFit> {
        // Forward polynomial covers degrees 0..=fwd_order, reverse one higher.
        let fwd_order = order.max(1);
        let rev_order = fwd_order + 1;
        if fwd_order + 1 > MAX_SIP_ORDER {
            return Err(AstromError::OrderOutOfRange {
                order: fwd_order + 1,
                max: MAX_SIP_ORDER,
            });
        }
        if rev_order + 1 > MAX_SIP_ORDER {
            return Err(AstromError::OrderOutOfRange {
                order: rev_order + 1,
                max: MAX_SIP_ORDER,
            });
        }
        let required = (fwd_order as usize + 1).max(3);
        if matches.len() < required {
            return Err(AstromError::TooFewMatches {
                found: matches.len(),
                required,
            });
        }

        let mut bbox = *bbox;
        if bbox.is_empty() {
            for m in matches.iter().filter(|m| m.source.centroid.is_finite()) {
                bbox.include(&m.source.centroid);
            }
            let border_frac = 1.0 / (matches.len() as f64).sqrt();
            bbox.grow([
                (border_frac * bbox.width() as f64) as i64,
                (border_frac * bbox.height() as f64) as i64,
            ]);
        }

        let (linear_wcs, forward) = fit_forward(matches, starting_wcs, fwd_order, required)?;

        let wcs = match forward {
            Some((a, b)) => {
                let with_forward = linear_wcs.with_sip(SipDistortion {
                    a,
                    b,
                    ap: SipPolynomial::zero(rev_order),
                    bp: SipPolynomial::zero(rev_order),
                });
                let ngrid = self.config.ngrid.unwrap_or(5 * (fwd_order + 1)).max(2);
                fit_reverse(&with_forward, rev_order, ngrid, &bbox)?
            }
            None => linear_wcs.clone(),
        };

        Ok(SipFit {
            linear_wcs,
            wcs,
            bbox,
            matches: matches.to_vec(),
        })
    }
}

impl DistortionSolver for SipSolver {
    fn solve(
        &self,
        matches: &[ReferenceMatch],
        starting_wcs: &TanSipWcs,
        order: u32,
        bbox: &BoundingBox,
    ) -> Result<DistortionFit> {
        let fit = self.fit(matches, starting_wcs, order, bbox)?;
        let scatter_on_sky = fit.scatter_on_sky()?;
        debug!(
            "SIP fit (order {}): scatter {:.4}\" (linear {:.4}\")",
            order,
            rad_to_arcsec(scatter_on_sky),
            rad_to_arcsec(fit.linear_scatter_on_sky()?),
        );
        Ok(DistortionFit {
            wcs: fit.wcs,
            scatter_on_sky,
        })
    }
}

/// Full result of a [`SipSolver::fit`].
#[derive(Debug, Clone)]
pub struct SipFit {
    /// WCS with the fitted CD/CRPIX but no SIP terms.
    pub linear_wcs: TanSipWcs,
    /// The fitted WCS, including SIP terms when the order calls for them.
    pub wcs: TanSipWcs,
    /// Region the reverse polynomial was fitted over.
    pub bbox: BoundingBox,
    matches: Vec<ReferenceMatch>,
}

impl SipFit {
    /// Median on-sky scatter (radians) under the fitted WCS.
    pub fn scatter_on_sky(&self) -> Result<f64> {
        make_match_statistics_in_radians(&self.wcs, &self.matches, StatKind::MEDIAN).map(median)
    }

    /// Median on-sky scatter (radians) under the linear-only WCS.
    pub fn linear_scatter_on_sky(&self) -> Result<f64> {
        make_match_statistics_in_radians(&self.linear_wcs, &self.matches, StatKind::MEDIAN)
            .map(median)
    }

    /// Median pixel scatter under the fitted WCS.
    pub fn scatter_in_pixels(&self) -> Result<f64> {
        make_match_statistics_in_pixels(&self.wcs, &self.matches, StatKind::MEDIAN).map(median)
    }

    /// Median pixel scatter under the linear-only WCS.
    pub fn linear_scatter_in_pixels(&self) -> Result<f64> {
        make_match_statistics_in_pixels(&self.linear_wcs, &self.matches, StatKind::MEDIAN)
            .map(median)
    }
}

fn median(stats: Statistics) -> f64 {
    stats.get(StatKind::MEDIAN).unwrap_or(f64::NAN)
}

// ── Internal helpers ────────────────────────────────────────────────────────

type ForwardTerms = Option<(SipPolynomial, SipPolynomial)>;

/// Fit CD, CRPIX shift and forward SIP terms.
fn fit_forward(
    matches: &[ReferenceMatch],
    starting_wcs: &TanSipWcs,
    order: u32,
    required: usize,
) -> Result<(TanSipWcs, ForwardTerms)> {
    let crpix = starting_wcs.crpix();

    let mut u = Vec::with_capacity(matches.len());
    let mut v = Vec::with_capacity(matches.len());
    let mut iwc1 = Vec::with_capacity(matches.len());
    let mut iwc2 = Vec::with_capacity(matches.len());
    for m in matches {
        let Some((xi, eta)) = starting_wcs.sky_to_intermediate(&m.reference.coord) else {
            continue;
        };
        let c = &m.source.centroid;
        if !c.is_finite() {
            continue;
        }
        u.push(c.x - crpix[0]);
        v.push(c.y - crpix[1]);
        iwc1.push(xi);
        iwc2.push(eta);
    }
    if u.len() < required {
        return Err(AstromError::TooFewMatches {
            found: u.len(),
            required,
        });
    }

    let norm = max_abs(&u).max(max_abs(&v));
    let norm = if norm > 0.0 { norm } else { 1.0 };
    let un: Vec<f64> = u.iter().map(|x| x / norm).collect();
    let vn: Vec<f64> = v.iter().map(|x| x / norm).collect();

    let terms = term_pairs(order);
    let c_mat = design_matrix(&un, &vn, &terms);
    let mu = least_squares(&c_mat, &iwc1);
    let nu = least_squares(&c_mat, &iwc2);

    let (i10, i01) = (1, 2);
    let cd = [
        [mu[i10] / norm, mu[i01] / norm],
        [nu[i10] / norm, nu[i01] / norm],
    ];
    let linear = TanSipWcs::new(starting_wcs.crval(), crpix, cd)?;
    let cd_inv = linear.cd_inverse();

    let new_crpix = [
        crpix[0] - (mu[0] * cd_inv[0][0] + nu[0] * cd_inv[0][1]),
        crpix[1] - (mu[0] * cd_inv[1][0] + nu[0] * cd_inv[1][1]),
    ];
    let linear = TanSipWcs::new(starting_wcs.crval(), new_crpix, cd)?;

    debug!(
        "  forward fit: {} points, CD=[{:.6e}, {:.6e}; {:.6e}, {:.6e}], CRPIX ({:.3}, {:.3}) → ({:.3}, {:.3})",
        u.len(),
        cd[0][0],
        cd[0][1],
        cd[1][0],
        cd[1][1],
        crpix[0],
        crpix[1],
        new_crpix[0],
        new_crpix[1],
    );

    if order < 2 {
        return Ok((linear, None));
    }

    let mut a = SipPolynomial::zero(order);
    let mut b = SipPolynomial::zero(order);
    for (i, &(p, q)) in terms.iter().enumerate() {
        if p + q < 2 {
            continue;
        }
        let scale = norm.powi((p + q) as i32);
        let da = cd_inv[0][0] * mu[i] + cd_inv[0][1] * nu[i];
        let db = cd_inv[1][0] * mu[i] + cd_inv[1][1] * nu[i];
        a.set(p, q, da / scale);
        b.set(p, q, db / scale);
    }

    Ok((linear, Some((a, b))))
}

/// Fit the reverse AP/BP polynomials on a grid over `bbox`.
fn fit_reverse(wcs: &TanSipWcs, order: u32, ngrid: u32, bbox: &BoundingBox) -> Result<TanSipWcs> {
    let (Some(min), Some(sip)) = (bbox.min(), wcs.sip()) else {
        return Ok(wcs.clone());
    };
    let crpix = wcs.crpix();
    let dx = bbox.width() as f64 / (ngrid - 1) as f64;
    let dy = bbox.height() as f64 / (ngrid - 1) as f64;

    let n = (ngrid * ngrid) as usize;
    let mut uu = Vec::with_capacity(n);
    let mut vv = Vec::with_capacity(n);
    let mut delta1 = Vec::with_capacity(n);
    let mut delta2 = Vec::with_capacity(n);
    for i in 0..ngrid {
        let y = min[1] as f64 + i as f64 * dy;
        for j in 0..ngrid {
            let x = min[0] as f64 + j as f64 * dx;
            let (undist_u, undist_v) = wcs.undistort_pixel(&Centroid::new(x, y));
            uu.push(undist_u);
            vv.push(undist_v);
            delta1.push((x - crpix[0]) - undist_u);
            delta2.push((y - crpix[1]) - undist_v);
        }
    }

    let norm = max_abs(&uu).max(max_abs(&vv));
    let norm = if norm > 0.0 { norm } else { 1.0 };
    let un: Vec<f64> = uu.iter().map(|x| x / norm).collect();
    let vn: Vec<f64> = vv.iter().map(|x| x / norm).collect();

    let terms = term_pairs(order);
    let c_mat = design_matrix(&un, &vn, &terms);
    let tmp_a = least_squares(&c_mat, &delta1);
    let tmp_b = least_squares(&c_mat, &delta2);

    let mut ap = SipPolynomial::zero(order);
    let mut bp = SipPolynomial::zero(order);
    for (i, &(p, q)) in terms.iter().enumerate() {
        let scale = norm.powi((p + q) as i32);
        ap.set(p, q, tmp_a[i] / scale);
        bp.set(p, q, tmp_b[i] / scale);
    }

    debug!(
        "  reverse fit: {}×{} grid over {}×{} px, order {}",
        ngrid,
        ngrid,
        bbox.width(),
        bbox.height(),
        order,
    );

    Ok(wcs.with_sip(SipDistortion {
        a: sip.a.clone(),
        b: sip.b.clone(),
        ap,
        bp,
    }))
}

/// Design matrix with one row per point and one column per `x^p · y^q` term.
fn design_matrix(x: &[f64], y: &[f64], terms: &[(u32, u32)]) -> DMatrix<f64> {
    DMatrix::from_fn(x.len(), terms.len(), |i, j| {
        let (p, q) = terms[j];
        x[i].powi(p as i32) * y[i].powi(q as i32)
    })
}

/// Solve `A·x ≈ b` in the least-squares sense via SVD.
fn least_squares(a: &DMatrix<f64>, b: &[f64]) -> DVector<f64> {
    let b_vec = DVector::from_column_slice(b);
    a.clone()
        .svd(true, true)
        .solve(&b_vec, 1e-12)
        .unwrap_or_else(|_| DVector::zeros(a.ncols()))
}

fn max_abs(values: &[f64]) -> f64 {
    values.iter().fold(0.0_f64, |acc, v| acc.max(v.abs()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{ReferenceRecord, SourceRecord};
    use crate::coord::{rad_to_arcsec, SkyCoord};
    use crate::wcs::Wcs;

    fn truth_wcs() -> TanSipWcs {
        TanSipWcs::from_pixel_scale(
            SkyCoord::from_degrees(215.5, 53.0),
            [1500.0, 1500.0],
            5.1e-5_f64.to_radians(),
        )
        .unwrap()
    }

    fn grid_matches(wcs: &TanSipWcs) -> Vec<ReferenceMatch> {
        let mut matches = Vec::new();
        for i in 0..8 {
            for j in 0..8 {
                let c = Centroid::new(10.0 + 140.0 * i as f64, 100.0 + 210.0 * j as f64);
                let id = (i * 8 + j) as u64;
                matches.push(ReferenceMatch::new(
                    ReferenceRecord::new(id, wcs.pixel_to_sky(&c)),
                    SourceRecord::new(id, c),
                    0.0,
                ));
            }
        }
        matches
    }

    #[test]
    fn test_linear_fit_recovers_truth() {
        let truth = truth_wcs();
        let matches = grid_matches(&truth);
        // Start from a slightly wrong CRPIX and scale.
        let start = TanSipWcs::from_pixel_scale(
            truth.crval(),
            [1495.0, 1503.0],
            5.0e-5_f64.to_radians(),
        )
        .unwrap();
        let fit = SipSolver::default()
            .fit(&matches, &start, 0, &BoundingBox::empty())
            .unwrap();
        assert!(!fit.wcs.has_distortion());
        let cd = fit.wcs.cd_matrix();
        let scale = 5.1e-5_f64.to_radians();
        assert!((cd[0][0] - scale).abs() / scale < 1e-9);
        assert!(cd[0][1].abs() / scale < 1e-9);
        assert!((fit.wcs.crpix()[0] - 1500.0).abs() < 1e-6);
        assert!((fit.wcs.crpix()[1] - 1500.0).abs() < 1e-6);
        assert!(rad_to_arcsec(fit.scatter_on_sky().unwrap()) < 1e-7);
    }

    #[test]
    fn test_quadratic_distortion_is_absorbed() {
        let truth = truth_wcs();
        let mut matches = grid_matches(&truth);
        for m in &mut matches {
            let c = m.source.centroid;
            m.source.centroid = Centroid::new(c.x + 1e-5 * c.x * c.x, c.y);
        }
        let solver = SipSolver::default();

        // SIP terms are fitted about the incoming CRPIX before it moves, so a
        // single round leaves a residual that later rounds remove.
        let first = solver.fit(&matches, &truth, 4, &BoundingBox::empty()).unwrap();
        assert!(first.wcs.has_distortion());
        let first_px = first.scatter_in_pixels().unwrap();
        let linear_px = first.linear_scatter_in_pixels().unwrap();
        assert!(linear_px > 0.2, "linear scatter {linear_px} px");
        assert!(first_px < linear_px, "first round {first_px} px vs linear {linear_px} px");

        let mut wcs = first.wcs;
        let mut sip_px = first_px;
        for round in 1..3 {
            let fit = solver.fit(&matches, &wcs, 4, &BoundingBox::empty()).unwrap();
            sip_px = fit.scatter_in_pixels().unwrap();
            println!("round {round}: SIP scatter {sip_px:.6} px");
            wcs = fit.wcs;
        }
        assert!(sip_px < 0.01, "SIP scatter {sip_px} px after three rounds");
    }

    #[test]
    fn test_too_few_matches() {
        let truth = truth_wcs();
        let matches = grid_matches(&truth);
        let err = SipSolver::default()
            .solve(&matches[..2], &truth, 0, &BoundingBox::empty())
            .unwrap_err();
        assert_eq!(
            err,
            AstromError::TooFewMatches {
                found: 2,
                required: 3
            }
        );
    }

    #[test]
    fn test_order_limit() {
        let truth = truth_wcs();
        let matches = grid_matches(&truth);
        let err = SipSolver::default()
            .solve(&matches, &truth, 8, &BoundingBox::empty())
            .unwrap_err();
        assert!(matches!(err, AstromError::OrderOutOfRange { .. }));
    }
}
