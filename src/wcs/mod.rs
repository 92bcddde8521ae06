//! World coordinate systems: the mapping between detector pixels and the sky.
//!
//! [`Wcs`] is the interface every transform used by the fitter, the catalog
//! synchronizer and the statistics engine must provide. [`TanSipWcs`] is the
//! concrete gnomonic (TAN) projection with optional SIP polynomial distortion.
//!
//! ## Conventions
//!
//! - Pixel coordinates are 0-based.
//! - The CD matrix maps pixel offsets from CRPIX (after SIP correction) to
//!   tangent-plane coordinates `(ξ, η)` in radians, with ξ increasing toward
//!   East (increasing RA) and η toward North.

pub mod sip;

use crate::centroid::Centroid;
use crate::coord::SkyCoord;
use crate::error::{AstromError, Result};

pub use sip::{SipDistortion, SipPolynomial};

/// A bidirectional pixel ↔ sky transform.
///
/// Implementations are immutable values that may be shared across threads.
pub trait Wcs: Send + Sync {
    /// Project a sky position to pixel coordinates.
    ///
    /// Positions that cannot be projected (e.g. behind the tangent plane)
    /// yield a non-finite centroid.
    fn sky_to_pixel(&self, coord: &SkyCoord) -> Centroid;

    /// Project a pixel position onto the sky.
    fn pixel_to_sky(&self, centroid: &Centroid) -> SkyCoord;

    /// Local pixel scale (radians per pixel) at `coord`, as the square root
    /// of the on-sky area of one pixel.
    fn local_pixel_scale(&self, coord: &SkyCoord) -> f64 {
        let center = self.sky_to_pixel(coord);
        let corners = [
            self.pixel_to_sky(&(center + (-0.5, 0.0))),
            self.pixel_to_sky(&(center + (0.5, 0.0))),
            self.pixel_to_sky(&(center + (0.0, -0.5))),
            self.pixel_to_sky(&(center + (0.0, 0.5))),
        ];
        let mut tp = [(0.0, 0.0); 4];
        for (slot, c) in tp.iter_mut().zip(&corners) {
            match tan_project(c.ra, c.dec, coord.ra, coord.dec) {
                Some(p) => *slot = p,
                None => return f64::NAN,
            }
        }
        let dx = (tp[1].0 - tp[0].0, tp[1].1 - tp[0].1);
        let dy = (tp[3].0 - tp[2].0, tp[3].1 - tp[2].1);
        (dx.0 * dy.1 - dx.1 * dy.0).abs().sqrt()
    }
}

// ── TAN projection ─────────────────────────────────────────────────────────

/// Forward gnomonic (TAN) projection.
///
/// Projects celestial point `(ra, dec)` onto the tangent plane at `(crval_ra, crval_dec)`.
/// Returns `(ξ, η)` in radians, or `None` if the point is on or behind the tangent plane.
///
/// Reference: Calabretta & Greisen (2002), FITS WCS Paper II, §5.1.1.
#[inline]
pub fn tan_project(ra: f64, dec: f64, crval_ra: f64, crval_dec: f64) -> Option<(f64, f64)> {
    let da = ra - crval_ra;
    let (sin_dec, cos_dec) = dec.sin_cos();
    let (sin_dec0, cos_dec0) = crval_dec.sin_cos();
    let cos_da = da.cos();

    let denom = sin_dec * sin_dec0 + cos_dec * cos_dec0 * cos_da;
    if denom <= 1e-12 {
        return None;
    }

    let xi = cos_dec * da.sin() / denom;
    let eta = (sin_dec * cos_dec0 - cos_dec * sin_dec0 * cos_da) / denom;
    Some((xi, eta))
}

/// Inverse gnomonic (TAN) projection.
///
/// Given tangent-plane coordinates `(ξ, η)` in radians at reference point
/// `(crval_ra, crval_dec)`, returns celestial coordinates `(ra, dec)` in radians.
#[inline]
pub fn inverse_tan_project(xi: f64, eta: f64, crval_ra: f64, crval_dec: f64) -> (f64, f64) {
    let rho_sq = xi * xi + eta * eta;
    if rho_sq < 1e-30 {
        return (crval_ra, crval_dec);
    }
    let (sin_dec0, cos_dec0) = crval_dec.sin_cos();

    let rho = rho_sq.sqrt();
    let c = rho.atan();
    let (sin_c, cos_c) = c.sin_cos();

    let dec = (cos_c * sin_dec0 + eta * sin_c * cos_dec0 / rho).asin();
    let ra = crval_ra + (xi * sin_c).atan2(rho * cos_dec0 * cos_c - eta * sin_dec0 * sin_c);
    (ra, dec)
}

/// Invert a 2×2 matrix. Returns `None` if singular (|det| < 1e-30).
#[inline]
pub fn cd_inverse(cd: &[[f64; 2]; 2]) -> Option<[[f64; 2]; 2]> {
    let det = cd[0][0] * cd[1][1] - cd[0][1] * cd[1][0];
    if det.abs() < 1e-30 || !det.is_finite() {
        return None;
    }
    let inv_det = 1.0 / det;
    Some([
        [cd[1][1] * inv_det, -cd[0][1] * inv_det],
        [-cd[1][0] * inv_det, cd[0][0] * inv_det],
    ])
}

#[inline]
fn mat_vec(m: &[[f64; 2]; 2], x: f64, y: f64) -> (f64, f64) {
    (m[0][0] * x + m[0][1] * y, m[1][0] * x + m[1][1] * y)
}

// ── TAN-SIP WCS ────────────────────────────────────────────────────────────

/// Gnomonic WCS with optional SIP distortion.
///
/// Values are never mutated once built; a fit produces a new `TanSipWcs`.
#[derive(Debug, Clone, PartialEq)]
pub struct TanSipWcs {
    crval: SkyCoord,
    crpix: [f64; 2],
    cd: [[f64; 2]; 2],
    cd_inv: [[f64; 2]; 2],
    sip: Option<SipDistortion>,
}

impl TanSipWcs {
    /// Create a pure TAN WCS.
    ///
    /// `cd` is in radians per pixel. Fails if `cd` is singular.
    pub fn new(crval: SkyCoord, crpix: [f64; 2], cd: [[f64; 2]; 2]) -> Result<Self> {
        let cd_inv = cd_inverse(&cd).ok_or(AstromError::SingularCdMatrix)?;
        Ok(Self {
            crval,
            crpix,
            cd,
            cd_inv,
            sip: None,
        })
    }

    /// Create a TAN WCS with a square, unrotated pixel grid of `scale_rad`
    /// radians per pixel.
    pub fn from_pixel_scale(crval: SkyCoord, crpix: [f64; 2], scale_rad: f64) -> Result<Self> {
        Self::new(crval, crpix, [[scale_rad, 0.0], [0.0, scale_rad]])
    }

    /// Return a copy of this WCS carrying the given SIP distortion.
    pub fn with_sip(&self, sip: SipDistortion) -> Self {
        Self {
            sip: Some(sip),
            ..self.clone()
        }
    }

    pub fn crval(&self) -> SkyCoord {
        self.crval
    }

    pub fn crpix(&self) -> [f64; 2] {
        self.crpix
    }

    /// CD matrix in radians per pixel.
    pub fn cd_matrix(&self) -> [[f64; 2]; 2] {
        self.cd
    }

    pub fn cd_inverse(&self) -> [[f64; 2]; 2] {
        self.cd_inv
    }

    pub fn sip(&self) -> Option<&SipDistortion> {
        self.sip.as_ref()
    }

    pub fn has_distortion(&self) -> bool {
        self.sip.is_some()
    }

    /// Tangent-plane coordinates `(ξ, η)` of a sky position, in radians.
    pub fn sky_to_intermediate(&self, coord: &SkyCoord) -> Option<(f64, f64)> {
        tan_project(coord.ra, coord.dec, self.crval.ra, self.crval.dec)
    }

    /// Undistorted pixel offset from CRPIX for an observed pixel position.
    pub fn undistort_pixel(&self, centroid: &Centroid) -> (f64, f64) {
        let u = centroid.x - self.crpix[0];
        let v = centroid.y - self.crpix[1];
        match &self.sip {
            Some(sip) => sip.undistort(u, v),
            None => (u, v),
        }
    }
}

impl Wcs for TanSipWcs {
    fn sky_to_pixel(&self, coord: &SkyCoord) -> Centroid {
        let Some((xi, eta)) = self.sky_to_intermediate(coord) else {
            return Centroid::nan();
        };
        let (uu, vv) = mat_vec(&self.cd_inv, xi, eta);
        let (u, v) = match &self.sip {
            Some(sip) => sip.distort(uu, vv),
            None => (uu, vv),
        };
        Centroid::new(u + self.crpix[0], v + self.crpix[1])
    }

    fn pixel_to_sky(&self, centroid: &Centroid) -> SkyCoord {
        let (uu, vv) = self.undistort_pixel(centroid);
        let (xi, eta) = mat_vec(&self.cd, uu, vv);
        let (ra, dec) = inverse_tan_project(xi, eta, self.crval.ra, self.crval.dec);
        SkyCoord::new(ra, dec)
    }
}
