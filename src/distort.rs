//! Synthetic centroid distortions for exercising the SIP fitter.
//!
//! Each [`DistortionKind`] is a simple polynomial perturbation of the pixel
//! position, scaled by a fraction `frac` whose default keeps the shift at the
//! pixel level for a few-thousand-pixel detector.

use serde::{Deserialize, Serialize};

use crate::catalog::SourceRecord;
use crate::centroid::Centroid;

/// Polynomial shape of a synthetic distortion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DistortionKind {
    /// Identity.
    None,
    /// `x → x·(1 + frac)`
    LinearX,
    /// `y → y·(1 + frac)`
    LinearY,
    /// `x → x + frac·x²`
    QuadraticX,
    /// `y → y + frac·y²`
    QuadraticY,
    /// `x → x + frac·x³`
    CubicX,
    /// `y → y + frac·x³`
    CubicY,
    /// `x → x + frac·(x³ − 2x² + 4x − 9)`
    ManyTermX,
    /// `y → y + frac·(y³ − 2y² + 4y − 9)`
    ManyTermY,
    /// `y → y + frac·(x³ − 2x²)`
    CrossTerms1,
    /// `x → x + frac·(y³ − 2y² + 4y − 9)`
    CrossTerms2,
    /// Both axes shifted by the many-term polynomial of the other axis.
    CrossTerms3,
    /// `x → x + frac·(y + 2y² + 3x + 4xy + x²)`
    Quadratic,
    /// `x → x + frac·(2x² − 1)`
    T2X,
}

impl DistortionKind {
    /// Default scale fraction for this shape.
    pub fn default_frac(self) -> f64 {
        match self {
            DistortionKind::None => 0.0,
            DistortionKind::LinearX | DistortionKind::LinearY => 1e-3,
            DistortionKind::QuadraticX
            | DistortionKind::QuadraticY
            | DistortionKind::Quadratic
            | DistortionKind::T2X => 1e-6,
            DistortionKind::CubicX
            | DistortionKind::CubicY
            | DistortionKind::ManyTermX
            | DistortionKind::ManyTermY
            | DistortionKind::CrossTerms3 => 1e-9,
            DistortionKind::CrossTerms1 | DistortionKind::CrossTerms2 => 1e-11,
        }
    }
}

/// A distortion shape together with its scale.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Distortion {
    pub kind: DistortionKind,
    pub frac: f64,
}

impl Distortion {
    pub fn new(kind: DistortionKind, frac: f64) -> Self {
        Self { kind, frac }
    }

    /// Apply the distortion to a pixel position.
    pub fn apply(&self, c: &Centroid) -> Centroid {
        let (x, y) = (c.x, c.y);
        let frac = self.frac;
        match self.kind {
            DistortionKind::None => *c,
            DistortionKind::LinearX => Centroid::new(x * (1.0 + frac), y),
            DistortionKind::LinearY => Centroid::new(x, y * (1.0 + frac)),
            DistortionKind::QuadraticX => Centroid::new(x + frac * x * x, y),
            DistortionKind::QuadraticY => Centroid::new(x, y + frac * y * y),
            DistortionKind::CubicX => Centroid::new(x + frac * x.powi(3), y),
            DistortionKind::CubicY => Centroid::new(x, y + frac * x.powi(3)),
            DistortionKind::ManyTermX => Centroid::new(x + frac * many_term(x), y),
            DistortionKind::ManyTermY => Centroid::new(x, y + frac * many_term(y)),
            DistortionKind::CrossTerms1 => {
                Centroid::new(x, y + frac * (x.powi(3) - 2.0 * x * x))
            }
            DistortionKind::CrossTerms2 => Centroid::new(x + frac * many_term(y), y),
            DistortionKind::CrossTerms3 => {
                Centroid::new(x + frac * many_term(y), y + frac * many_term(x))
            }
            DistortionKind::Quadratic => {
                let val = y + 2.0 * y * y + 3.0 * x + 4.0 * x * y + x * x;
                Centroid::new(x + frac * val, y)
            }
            DistortionKind::T2X => Centroid::new(x + frac * (2.0 * x * x - 1.0), y),
        }
    }
}

impl From<DistortionKind> for Distortion {
    fn from(kind: DistortionKind) -> Self {
        Self::new(kind, kind.default_frac())
    }
}

#[inline]
fn many_term(t: f64) -> f64 {
    t.powi(3) - 2.0 * t * t + 4.0 * t - 9.0
}

/// Copies of `sources` with distorted centroids. Sky coordinates are left
/// untouched.
pub fn distort_sources(sources: &[SourceRecord], distortion: &Distortion) -> Vec<SourceRecord> {
    sources
        .iter()
        .map(|s| SourceRecord {
            centroid: distortion.apply(&s.centroid),
            ..s.clone()
        })
        .collect()
}
