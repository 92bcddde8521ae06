//! Celestial coordinates and angle conversions.
//!
//! All angles are radians unless a name says otherwise.

use std::f64::consts::{PI, TAU};

/// Radians per arcsecond.
pub const ARCSEC_TO_RAD: f64 = PI / (180.0 * 3600.0);

/// Convert an angle in radians to arcseconds.
#[inline]
pub fn rad_to_arcsec(rad: f64) -> f64 {
    rad / ARCSEC_TO_RAD
}

/// Convert an angle in arcseconds to radians.
#[inline]
pub fn arcsec_to_rad(arcsec: f64) -> f64 {
    arcsec * ARCSEC_TO_RAD
}

/// A position on the celestial sphere.
///
/// Right ascension is kept in `[0, 2π)`; declination in `[-π/2, π/2]`.
/// Both are in radians.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SkyCoord {
    pub ra: f64,
    pub dec: f64,
}

impl SkyCoord {
    /// Create a coordinate from radians, wrapping RA into `[0, 2π)`.
    pub fn new(ra: f64, dec: f64) -> Self {
        Self {
            ra: ra.rem_euclid(TAU),
            dec,
        }
    }

    pub fn from_degrees(ra_deg: f64, dec_deg: f64) -> Self {
        Self::new(ra_deg.to_radians(), dec_deg.to_radians())
    }

    /// A coordinate with NaN components, used for derived fields that have
    /// not been computed yet.
    pub fn nan() -> Self {
        Self {
            ra: f64::NAN,
            dec: f64::NAN,
        }
    }

    pub fn is_finite(&self) -> bool {
        self.ra.is_finite() && self.dec.is_finite()
    }

    /// Angular separation to `other` in radians.
    ///
    /// Uses the Vincenty form, which stays accurate at both tiny and
    /// near-antipodal separations.
    pub fn separation(&self, other: &SkyCoord) -> f64 {
        let dra = other.ra - self.ra;
        let (sin_dra, cos_dra) = dra.sin_cos();
        let (sin_d1, cos_d1) = self.dec.sin_cos();
        let (sin_d2, cos_d2) = other.dec.sin_cos();

        let num1 = cos_d2 * sin_dra;
        let num2 = cos_d1 * sin_d2 - sin_d1 * cos_d2 * cos_dra;
        let denom = sin_d1 * sin_d2 + cos_d1 * cos_d2 * cos_dra;
        (num1 * num1 + num2 * num2).sqrt().atan2(denom)
    }

    /// The point reached by travelling `distance` radians along a great circle
    /// starting at position angle `bearing` (North through East).
    pub fn offset(&self, bearing: f64, distance: f64) -> SkyCoord {
        let (sin_d, cos_d) = self.dec.sin_cos();
        let (sin_r, cos_r) = distance.sin_cos();
        let dec = (sin_d * cos_r + cos_d * sin_r * bearing.cos()).asin();
        let ra = self.ra + (bearing.sin() * sin_r * cos_d).atan2(cos_r - sin_d * dec.sin());
        SkyCoord::new(ra, dec)
    }
}
