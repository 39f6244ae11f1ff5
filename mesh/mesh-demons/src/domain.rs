//! The virtual domain a registration is evaluated over.

use mesh_types::{Aabb, Point3};

use crate::{MetricError, MetricResult};

/// Axis-aligned region the transformed moving points are expected to stay in.
///
/// The metric only checks membership and counts escapes; it never clips.
///
/// # Example
///
/// ```
/// use mesh_demons::VirtualDomain;
/// use mesh_types::Point3;
///
/// let points = [Point3::new(0.0, 0.0, 0.0), Point3::new(2.0, 1.0, 0.0)];
/// let domain = VirtualDomain::enclosing(&points, 0.5).unwrap();
/// assert!(domain.contains(&Point3::new(-0.5, 1.5, 0.5)));
/// assert!(!domain.contains(&Point3::new(3.0, 0.0, 0.0)));
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VirtualDomain {
    bounds: Aabb,
}

impl VirtualDomain {
    /// Domain covering `bounds`.
    ///
    /// # Errors
    ///
    /// Returns [`MetricError::EmptyDomain`] if `bounds` is inverted or not
    /// finite.
    pub fn new(bounds: Aabb) -> MetricResult<Self> {
        let finite = bounds
            .min
            .coords
            .iter()
            .chain(bounds.max.coords.iter())
            .all(|c| c.is_finite());
        if bounds.is_empty() || !finite {
            return Err(MetricError::EmptyDomain);
        }
        Ok(Self { bounds })
    }

    /// Bounds of `points` grown by `padding` on every side.
    ///
    /// # Errors
    ///
    /// Returns [`MetricError::EmptyDomain`] if `points` is empty or the
    /// padded box is inverted.
    pub fn enclosing(points: &[Point3<f64>], padding: f64) -> MetricResult<Self> {
        Self::new(Aabb::from_points(points.iter()).expanded(padding))
    }

    /// Domain bounds.
    #[inline]
    #[must_use]
    pub const fn bounds(&self) -> &Aabb {
        &self.bounds
    }

    /// Whether `point` lies inside the domain, boundary included.
    #[inline]
    #[must_use]
    pub fn contains(&self, point: &Point3<f64>) -> bool {
        self.bounds.contains(point)
    }

    /// How many of `points` lie outside.
    #[must_use]
    pub fn count_outside(&self, points: &[Point3<f64>]) -> usize {
        points.iter().filter(|p| !self.contains(p)).count()
    }
}
