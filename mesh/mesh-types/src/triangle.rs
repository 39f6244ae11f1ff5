//! Triangle type for geometric calculations.

use nalgebra::{Point3, Vector3};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A triangle with concrete vertex positions.
///
/// Winding is **counter-clockwise (CCW) when viewed from the front**
/// (normal points toward viewer).
///
/// # Example
///
/// ```
/// use mesh_types::{Triangle, Point3};
///
/// let tri = Triangle::new(
///     Point3::new(0.0, 0.0, 0.0),
///     Point3::new(1.0, 0.0, 0.0),
///     Point3::new(0.0, 1.0, 0.0),
/// );
///
/// assert!((tri.area() - 0.5).abs() < 1e-10);
/// let normal = tri.normal().unwrap();
/// assert!((normal.z - 1.0).abs() < 1e-10);
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Triangle {
    /// First vertex.
    pub v0: Point3<f64>,
    /// Second vertex.
    pub v1: Point3<f64>,
    /// Third vertex.
    pub v2: Point3<f64>,
}

/// The closest point on a triangle to some query, with its barycentric
/// coordinates `(u, v, w)` relative to `(v0, v1, v2)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SurfacePoint {
    /// Position on the triangle.
    pub point: Point3<f64>,
    /// Barycentric weights, summing to one.
    pub barycentric: [f64; 3],
}

impl Triangle {
    /// Create a new triangle from three points.
    #[inline]
    #[must_use]
    pub const fn new(v0: Point3<f64>, v1: Point3<f64>, v2: Point3<f64>) -> Self {
        Self { v0, v1, v2 }
    }

    /// Compute the (unnormalized) face normal via cross product.
    ///
    /// The magnitude equals twice the triangle's area.
    #[inline]
    #[must_use]
    pub fn normal_unnormalized(&self) -> Vector3<f64> {
        let e1 = self.v1 - self.v0;
        let e2 = self.v2 - self.v0;
        e1.cross(&e2)
    }

    /// Compute the unit face normal.
    ///
    /// Returns `None` for degenerate triangles (zero area).
    #[must_use]
    pub fn normal(&self) -> Option<Vector3<f64>> {
        let n = self.normal_unnormalized();
        let len_sq = n.norm_squared();
        if len_sq > f64::EPSILON {
            Some(n / len_sq.sqrt())
        } else {
            None
        }
    }

    /// Compute the area of the triangle.
    #[inline]
    #[must_use]
    pub fn area(&self) -> f64 {
        self.normal_unnormalized().norm() * 0.5
    }

    /// Get vertices as an array.
    #[inline]
    #[must_use]
    pub const fn vertices(&self) -> [Point3<f64>; 3] {
        [self.v0, self.v1, self.v2]
    }

    /// Find the point on the triangle closest to `p`.
    ///
    /// The query is classified against the triangle's Voronoi regions
    /// (vertices, edges, interior), which amounts to projecting onto the
    /// supporting plane and clipping to the triangle.
    ///
    /// # Example
    ///
    /// ```
    /// use mesh_types::{Triangle, Point3};
    ///
    /// let tri = Triangle::new(
    ///     Point3::new(0.0, 0.0, 0.0),
    ///     Point3::new(1.0, 0.0, 0.0),
    ///     Point3::new(0.0, 1.0, 0.0),
    /// );
    ///
    /// let hit = tri.closest_point(&Point3::new(0.25, 0.25, 2.0));
    /// assert!((hit.point - Point3::new(0.25, 0.25, 0.0)).norm() < 1e-12);
    /// assert!((hit.barycentric[0] - 0.5).abs() < 1e-12);
    /// ```
    #[must_use]
    #[allow(clippy::many_single_char_names)]
    pub fn closest_point(&self, p: &Point3<f64>) -> SurfacePoint {
        let (a, b, c) = (self.v0, self.v1, self.v2);
        let ab = b - a;
        let ac = c - a;
        let ap = p - a;

        let d1 = ab.dot(&ap);
        let d2 = ac.dot(&ap);
        if d1 <= 0.0 && d2 <= 0.0 {
            return SurfacePoint::at(a, [1.0, 0.0, 0.0]);
        }

        let bp = p - b;
        let d3 = ab.dot(&bp);
        let d4 = ac.dot(&bp);
        if d3 >= 0.0 && d4 <= d3 {
            return SurfacePoint::at(b, [0.0, 1.0, 0.0]);
        }

        let vc = d1.mul_add(d4, -(d3 * d2));
        if vc <= 0.0 && d1 >= 0.0 && d3 <= 0.0 {
            let v = d1 / (d1 - d3);
            return SurfacePoint::at(a + ab * v, [1.0 - v, v, 0.0]);
        }

        let cp = p - c;
        let d5 = ab.dot(&cp);
        let d6 = ac.dot(&cp);
        if d6 >= 0.0 && d5 <= d6 {
            return SurfacePoint::at(c, [0.0, 0.0, 1.0]);
        }

        let vb = d5.mul_add(d2, -(d1 * d6));
        if vb <= 0.0 && d2 >= 0.0 && d6 <= 0.0 {
            let w = d2 / (d2 - d6);
            return SurfacePoint::at(a + ac * w, [1.0 - w, 0.0, w]);
        }

        let va = d3.mul_add(d6, -(d5 * d4));
        if va <= 0.0 && (d4 - d3) >= 0.0 && (d5 - d6) >= 0.0 {
            let w = (d4 - d3) / ((d4 - d3) + (d5 - d6));
            return SurfacePoint::at(b + (c - b) * w, [0.0, 1.0 - w, w]);
        }

        let sum = va + vb + vc;
        if sum.abs() < f64::MIN_POSITIVE {
            // Zero-area triangle whose regions all failed: settle for the
            // nearest corner.
            return self.nearest_corner(p);
        }
        let denom = 1.0 / sum;
        let v = vb * denom;
        let w = vc * denom;
        SurfacePoint::at(a + ab * v + ac * w, [1.0 - v - w, v, w])
    }

    fn nearest_corner(&self, p: &Point3<f64>) -> SurfacePoint {
        let corners = self.vertices();
        let mut best = 0;
        let mut best_dist = f64::INFINITY;
        for (i, corner) in corners.iter().enumerate() {
            let d = (corner - p).norm_squared();
            if d < best_dist {
                best_dist = d;
                best = i;
            }
        }
        let mut bary = [0.0; 3];
        bary[best] = 1.0;
        SurfacePoint::at(corners[best], bary)
    }
}

impl SurfacePoint {
    #[inline]
    const fn at(point: Point3<f64>, barycentric: [f64; 3]) -> Self {
        Self { point, barycentric }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn unit_right() -> Triangle {
        Triangle::new(
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
        )
    }

    #[test]
    fn triangle_area() {
        let tri = Triangle::new(
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(3.0, 0.0, 0.0),
            Point3::new(0.0, 3.0, 0.0),
        );
        assert_relative_eq!(tri.area(), 4.5, epsilon = 1e-12);
    }

    #[test]
    fn degenerate_triangle_has_no_normal() {
        let tri = Triangle::new(
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(2.0, 0.0, 0.0),
        );
        assert!(tri.normal().is_none());
        assert!(tri.area() < 1e-12);
    }

    #[test]
    fn closest_point_vertex_region() {
        let hit = unit_right().closest_point(&Point3::new(-1.0, -1.0, 0.5));
        assert_relative_eq!(hit.point, Point3::origin(), epsilon = 1e-12);
        assert_eq!(hit.barycentric, [1.0, 0.0, 0.0]);
    }

    #[test]
    fn closest_point_edge_region() {
        let hit = unit_right().closest_point(&Point3::new(0.5, -2.0, 0.0));
        assert_relative_eq!(hit.point, Point3::new(0.5, 0.0, 0.0), epsilon = 1e-12);
        assert_relative_eq!(hit.barycentric[0], 0.5, epsilon = 1e-12);
        assert_relative_eq!(hit.barycentric[1], 0.5, epsilon = 1e-12);
    }

    #[test]
    fn closest_point_hypotenuse_region() {
        let hit = unit_right().closest_point(&Point3::new(1.0, 1.0, 0.0));
        assert_relative_eq!(hit.point, Point3::new(0.5, 0.5, 0.0), epsilon = 1e-12);
        assert_relative_eq!(hit.barycentric[0], 0.0, epsilon = 1e-12);
    }

    #[test]
    fn barycentric_reconstructs_point() {
        let tri = Triangle::new(
            Point3::new(0.2, -0.3, 1.0),
            Point3::new(1.5, 0.1, 0.4),
            Point3::new(0.3, 1.2, -0.2),
        );
        let hit = tri.closest_point(&Point3::new(0.6, 0.4, 3.0));
        let [u, v, w] = hit.barycentric;
        let rebuilt = tri.v0.coords * u + tri.v1.coords * v + tri.v2.coords * w;
        assert_relative_eq!(hit.point.coords, rebuilt, epsilon = 1e-12);
        assert_relative_eq!(u + v + w, 1.0, epsilon = 1e-12);
    }
}
