//! Integer pixel bounding boxes.
//!
//! A [`BoundingBox`] defines the region over which a fitted distortion
//! polynomial must be well conditioned. It may be empty, in which case the
//! solver derives one from the match list.

use crate::centroid::Centroid;

/// Inclusive integer-pixel rectangle, possibly empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BoundingBox {
    extent: Option<([i64; 2], [i64; 2])>,
}

impl BoundingBox {
    /// The empty box.
    pub fn empty() -> Self {
        Self { extent: None }
    }

    /// Box spanning `min..=max` in both axes. Returns an empty box if
    /// `max < min` along either axis.
    pub fn new(min: [i64; 2], max: [i64; 2]) -> Self {
        if max[0] < min[0] || max[1] < min[1] {
            return Self::empty();
        }
        Self {
            extent: Some((min, max)),
        }
    }

    /// Box with the given corner and dimensions (in pixels).
    pub fn from_corner(min: [i64; 2], width: i64, height: i64) -> Self {
        Self::new(min, [min[0] + width - 1, min[1] + height - 1])
    }

    pub fn is_empty(&self) -> bool {
        self.extent.is_none()
    }

    pub fn min(&self) -> Option<[i64; 2]> {
        self.extent.map(|(min, _)| min)
    }

    pub fn max(&self) -> Option<[i64; 2]> {
        self.extent.map(|(_, max)| max)
    }

    /// Number of pixels along x (0 when empty).
    pub fn width(&self) -> i64 {
        self.extent.map_or(0, |(min, max)| max[0] - min[0] + 1)
    }

    /// Number of pixels along y (0 when empty).
    pub fn height(&self) -> i64 {
        self.extent.map_or(0, |(min, max)| max[1] - min[1] + 1)
    }

    /// Expand to include the integer pixel containing `point` (truncated toward zero).
    pub fn include(&mut self, point: &Centroid) {
        let p = [point.x as i64, point.y as i64];
        self.extent = Some(match self.extent {
            None => (p, p),
            Some((min, max)) => (
                [min[0].min(p[0]), min[1].min(p[1])],
                [max[0].max(p[0]), max[1].max(p[1])],
            ),
        });
    }

    /// Grow by `border` pixels on every side. No-op on an empty box.
    pub fn grow(&mut self, border: [i64; 2]) {
        if let Some((min, max)) = self.extent {
            *self = Self::new(
                [min[0] - border[0], min[1] - border[1]],
                [max[0] + border[0], max[1] + border[1]],
            );
        }
    }
}
