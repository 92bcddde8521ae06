//! Define a centroid: the pixel position of a detection (or the predicted
//! pixel position of a reference object) on the detector.
//!
//! Pixel coordinates are 0-based: the center of the first pixel is `(0.0, 0.0)`.

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Centroid {
    /// Position in pixels along columns (image x-axis).
    pub x: f64,
    /// Position in pixels along rows (image y-axis).
    pub y: f64,
}

impl Centroid {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// A centroid with NaN components, used for derived fields that have
    /// not been computed yet.
    pub fn nan() -> Self {
        Self {
            x: f64::NAN,
            y: f64::NAN,
        }
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }

    /// Euclidean distance to `other`, in pixels.
    pub fn distance(&self, other: &Centroid) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }
}

impl std::ops::Add<(f64, f64)> for Centroid {
    type Output = Centroid;

    fn add(self, (dx, dy): (f64, f64)) -> Centroid {
        Centroid::new(self.x + dx, self.y + dy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distance() {
        let a = Centroid::new(1.0, 2.0);
        let b = a + (3.0, 4.0);
        assert_eq!(b, Centroid::new(4.0, 6.0));
        assert!((a.distance(&b) - 5.0).abs() < 1e-15);
    }

    #[test]
    fn test_nan_is_not_finite() {
        assert!(!Centroid::nan().is_finite());
        assert!(Centroid::new(0.0, -3.0).is_finite());
    }
}
