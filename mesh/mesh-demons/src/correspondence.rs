//! Closest-point correspondence search and confidence weighting.

use mesh_types::{IndexedMesh, MeshTopology, Point3, Triangle};

use crate::ConfidenceWeighting;
use crate::bvh::{DEFAULT_MAX_LEAF_SIZE, NearestTriangle, TriangleBvh};

/// The closest point on a surface to a query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SurfaceHit {
    /// Closest point. Usually not a mesh vertex.
    pub point: Point3<f64>,
    /// Cell containing `point`.
    pub cell: u32,
    /// Barycentric coordinates of `point` in `cell`.
    pub barycentric: [f64; 3],
    /// Squared distance from the query.
    pub distance_squared: f64,
}

/// Nearest-point search over the valid cells of one mesh.
///
/// Built once per target mesh and read-only afterwards, so it can be shared
/// across rayon workers.
///
/// # Example
///
/// ```
/// use mesh_demons::SurfaceLocator;
/// use mesh_types::{Point3, grid_mesh};
///
/// let plane = grid_mesh(4, 4, 1.0);
/// let locator = SurfaceLocator::new(&plane, 500);
///
/// let hit = locator.closest_point(&Point3::new(1.5, 2.5, -3.0)).unwrap();
/// assert!((hit.distance_squared - 9.0).abs() < 1e-12);
/// assert!(!locator.is_accelerated());
/// ```
#[derive(Debug)]
pub struct SurfaceLocator {
    cells: Vec<u32>,
    bvh: TriangleBvh,
    accelerated: bool,
}

impl SurfaceLocator {
    /// Index the valid cells of `mesh`.
    ///
    /// Meshes with fewer than `linear_scan_threshold` valid cells are
    /// searched linearly.
    #[must_use]
    pub fn new(mesh: &IndexedMesh, linear_scan_threshold: usize) -> Self {
        let (cells, triangles): (Vec<u32>, Vec<Triangle>) = mesh
            .adjacency()
            .valid_cells()
            .iter()
            .filter_map(|&c| mesh.triangle(c as usize).map(|t| (c, t)))
            .unzip();

        let accelerated = triangles.len() >= linear_scan_threshold;
        // Below the threshold a single leaf holds every triangle.
        let leaf_size = if accelerated {
            DEFAULT_MAX_LEAF_SIZE
        } else {
            usize::MAX
        };

        Self {
            cells,
            bvh: TriangleBvh::build(triangles, leaf_size),
            accelerated,
        }
    }

    /// Number of searchable cells.
    #[inline]
    #[must_use]
    pub fn triangle_count(&self) -> usize {
        self.cells.len()
    }

    /// `true` when queries go through a multi-level hierarchy.
    #[inline]
    #[must_use]
    pub const fn is_accelerated(&self) -> bool {
        self.accelerated
    }

    /// Closest point on the indexed surface.
    ///
    /// Equidistant candidates resolve to the lowest cell id. Returns `None`
    /// when there is nothing to search or the query is not finite.
    #[must_use]
    pub fn closest_point(&self, query: &Point3<f64>) -> Option<SurfaceHit> {
        self.bvh.nearest(query).map(|n| self.hit(n))
    }

    /// Same as [`closest_point`](Self::closest_point) by exhaustive scan.
    ///
    /// Used as a correctness oracle for the hierarchy.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn closest_point_linear(&self, query: &Point3<f64>) -> Option<SurfaceHit> {
        let mut best: Option<NearestTriangle> = None;
        for (index, triangle) in self.bvh.triangles().iter().enumerate() {
            let index = index as u32;
            let surface = triangle.closest_point(query);
            let distance_squared = (surface.point - query).norm_squared();
            if NearestTriangle::improves(distance_squared, index, best.as_ref()) {
                best = Some(NearestTriangle {
                    index,
                    surface,
                    distance_squared,
                });
            }
        }
        best.map(|n| self.hit(n))
    }

    fn hit(&self, nearest: NearestTriangle) -> SurfaceHit {
        SurfaceHit {
            point: nearest.surface.point,
            cell: self.cells[nearest.index as usize],
            barycentric: nearest.surface.barycentric,
            distance_squared: nearest.distance_squared,
        }
    }
}

/// Gaussian confidence `exp(-d² / (2σ²))` for a squared distance.
#[inline]
#[must_use]
pub fn gaussian_confidence(distance_squared: f64, sigma: f64) -> f64 {
    (-distance_squared / (2.0 * sigma * sigma)).exp()
}

/// Confidence weights for one correspondence pass.
///
/// [`ConfidenceWeighting::MaximalDistance`] needs every distance of the pass
/// before any weight can be computed, which is why this takes the whole set.
/// If the largest distance is zero every weight is 1.
///
/// # Example
///
/// ```
/// use mesh_demons::{ConfidenceWeighting, confidence_weights};
///
/// let w = confidence_weights(ConfidenceWeighting::MaximalDistance, &[0.0, 1.0, 4.0]);
/// assert_eq!(w[0], 1.0);
/// assert!(w[1] > w[2]);
/// assert!((w[2] - (-0.5f64).exp()).abs() < 1e-12);
/// ```
#[must_use]
pub fn confidence_weights(policy: ConfidenceWeighting, distances_squared: &[f64]) -> Vec<f64> {
    match policy {
        ConfidenceWeighting::Disabled => vec![1.0; distances_squared.len()],
        ConfidenceWeighting::Gaussian { sigma } => distances_squared
            .iter()
            .map(|&d2| gaussian_confidence(d2, sigma))
            .collect(),
        ConfidenceWeighting::MaximalDistance => {
            let max_d2 = distances_squared.iter().copied().fold(0.0, f64::max);
            if max_d2 > 0.0 {
                distances_squared
                    .iter()
                    .map(|&d2| gaussian_confidence(d2, max_d2.sqrt()))
                    .collect()
            } else {
                vec![1.0; distances_squared.len()]
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use mesh_types::{Vertex, grid_mesh};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    /// A bumpy, non-planar surface so BVH pruning is exercised in 3D.
    fn wavy_sheet(n: usize) -> IndexedMesh {
        let mut mesh = grid_mesh(n, n, 0.1);
        for v in &mut mesh.vertices {
            let (x, y) = (v.position.x, v.position.y);
            v.position.z = 0.3 * (3.0 * x).sin() * (2.0 * y).cos();
        }
        mesh
    }

    #[test]
    fn bvh_agrees_with_linear_scan() {
        let mesh = wavy_sheet(24);
        let locator = SurfaceLocator::new(&mesh, 1);
        assert!(locator.is_accelerated());

        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..500 {
            let q = Point3::new(
                rng.gen_range(-0.5..2.9),
                rng.gen_range(-0.5..2.9),
                rng.gen_range(-1.0..1.0),
            );
            let fast = locator.closest_point(&q).unwrap();
            let slow = locator.closest_point_linear(&q).unwrap();
            assert_relative_eq!(fast.distance_squared, slow.distance_squared, epsilon = 1e-12);
            assert_relative_eq!(fast.point, slow.point, epsilon = 1e-9);
        }
    }

    #[test]
    fn repeated_queries_are_identical() {
        let mesh = wavy_sheet(12);
        let locator = SurfaceLocator::new(&mesh, 1);
        let q = Point3::new(0.37, 0.81, 0.4);
        let first = locator.closest_point(&q).unwrap();
        for _ in 0..10 {
            assert_eq!(locator.closest_point(&q).unwrap(), first);
        }
    }

    #[test]
    fn hit_reports_original_cell_id() {
        // Cell 0 is degenerate and never indexed; ids must still be the
        // mesh's own.
        let mut mesh = IndexedMesh::new();
        for (x, y) in [(0.0, 0.0), (1.0, 0.0), (0.0, 1.0), (1.0, 1.0)] {
            mesh.vertices.push(Vertex::from_coords(x, y, 0.0));
        }
        mesh.faces = vec![[0, 0, 1], [0, 1, 2], [1, 3, 2]];

        let locator = SurfaceLocator::new(&mesh, 500);
        assert_eq!(locator.triangle_count(), 2);
        let hit = locator.closest_point(&Point3::new(0.9, 0.9, 1.0)).unwrap();
        assert_eq!(hit.cell, 2);
    }

    #[test]
    fn empty_mesh_has_no_hits() {
        let locator = SurfaceLocator::new(&IndexedMesh::new(), 500);
        assert!(locator.closest_point(&Point3::origin()).is_none());
        assert!(locator.closest_point_linear(&Point3::origin()).is_none());
    }

    #[test]
    fn disabled_weights_are_one() {
        let w = confidence_weights(ConfidenceWeighting::Disabled, &[0.0, 3.0, 100.0]);
        assert_eq!(w, vec![1.0; 3]);
    }

    #[test]
    fn gaussian_weight_at_one_sigma() {
        let w = confidence_weights(ConfidenceWeighting::Gaussian { sigma: 2.0 }, &[4.0]);
        assert_relative_eq!(w[0], (-0.5f64).exp(), epsilon = 1e-15);
    }

    #[test]
    fn maximal_distance_all_zero() {
        let w = confidence_weights(ConfidenceWeighting::MaximalDistance, &[0.0, 0.0]);
        assert_eq!(w, vec![1.0, 1.0]);
    }
}
