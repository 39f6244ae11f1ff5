//! Local shape descriptors used to weight correspondences.
//!
//! Signed mean curvature per vertex from the cotangent Laplacian:
//!
//! ```text
//! Δx_i = 1/(2A_i) Σ_j (cot α_ij + cot β_ij)(x_j - x_i)
//! κ_i  = -½ Δx_i · n_i
//! ```
//!
//! with `A_i` the barycentric area (a third of each incident triangle) and
//! `n_i` the area-weighted vertex normal. A sphere with outward normals has
//! `κ = 1/R`; a plane has `κ = 0`.

use mesh_types::{IndexedMesh, Point3, Vector3};

use crate::correspondence::SurfaceHit;

/// Area-weighted unit vertex normals over the given cells.
///
/// Points with no incident area get a zero vector.
#[must_use]
pub fn vertex_normals(
    positions: &[Point3<f64>],
    faces: &[[u32; 3]],
    cells: &[u32],
) -> Vec<Vector3<f64>> {
    let mut normals = vec![Vector3::zeros(); positions.len()];
    for &cell in cells {
        let [a, b, c] = faces[cell as usize].map(|i| i as usize);
        // Magnitude is twice the area.
        let n = (positions[b] - positions[a]).cross(&(positions[c] - positions[a]));
        normals[a] += n;
        normals[b] += n;
        normals[c] += n;
    }
    for n in &mut normals {
        let len = n.norm();
        if len > 1e-10 {
            *n /= len;
        }
    }
    normals
}

/// Signed mean curvature at every point.
///
/// Only `cells` contribute; triangles whose doubled area squared is at or
/// below `epsilon` are skipped. Points with no remaining area get 0.
#[must_use]
pub fn mean_curvature(
    positions: &[Point3<f64>],
    faces: &[[u32; 3]],
    cells: &[u32],
    epsilon: f64,
) -> Vec<f64> {
    let n = positions.len();
    let mut laplacian = vec![Vector3::zeros(); n];
    let mut area = vec![0.0; n];

    for &cell in cells {
        let corners = faces[cell as usize].map(|i| i as usize);
        let [p0, p1, p2] = corners.map(|i| positions[i]);
        let doubled = (p1 - p0).cross(&(p2 - p0)).norm_squared();
        if doubled <= epsilon {
            continue;
        }

        // The angle opposite edge (i, j) sits at corner o.
        for k in 0..3 {
            let (i, j, o) = (corners[k], corners[(k + 1) % 3], corners[(k + 2) % 3]);
            let u = positions[i] - positions[o];
            let w = positions[j] - positions[o];
            let cot = u.dot(&w) / u.cross(&w).norm();
            let e = positions[j] - positions[i];
            laplacian[i] += e * cot;
            laplacian[j] -= e * cot;
        }

        let third = doubled.sqrt() / 6.0;
        for i in corners {
            area[i] += third;
        }
    }

    let normals = vertex_normals(positions, faces, cells);
    (0..n)
        .map(|i| {
            if area[i] > 0.0 {
                -0.5 * laplacian[i].dot(&normals[i]) / (2.0 * area[i])
            } else {
                0.0
            }
        })
        .collect()
}

/// Signed mean curvature of a mesh over its valid cells.
///
/// # Example
///
/// ```
/// use mesh_demons::features::mesh_mean_curvature;
/// use mesh_types::grid_mesh;
///
/// let flat = mesh_mean_curvature(&grid_mesh(3, 3, 1.0), 1e-12);
/// assert!(flat.iter().all(|k| k.abs() < 1e-12));
/// ```
#[must_use]
pub fn mesh_mean_curvature(mesh: &IndexedMesh, epsilon: f64) -> Vec<f64> {
    mean_curvature(
        &mesh.positions(),
        &mesh.faces,
        mesh.adjacency().valid_cells(),
        epsilon,
    )
}

/// Curvature descriptors for a fixed/moving mesh pair.
///
/// The factor for a correspondence is `exp(-γ (κ_moving - κ_fixed)²)` where
/// `κ_fixed` is interpolated at the hit.
#[derive(Debug, Clone, Default)]
pub struct GeometricFeatures {
    gamma: f64,
    moving: Vec<f64>,
    fixed: Vec<f64>,
    fixed_points: Vec<Point3<f64>>,
    fixed_faces: Vec<[u32; 3]>,
}

impl GeometricFeatures {
    /// Precompute curvature on both meshes. With `gamma == 0` nothing is
    /// computed and every factor is 1.
    #[must_use]
    pub fn new(gamma: f64, fixed: &IndexedMesh, moving: &IndexedMesh, epsilon: f64) -> Self {
        if gamma <= 0.0 {
            return Self::default();
        }
        Self {
            gamma,
            moving: mesh_mean_curvature(moving, epsilon),
            fixed: mesh_mean_curvature(fixed, epsilon),
            fixed_points: fixed.positions(),
            fixed_faces: fixed.faces.clone(),
        }
    }

    /// `true` when factors can differ from 1.
    #[inline]
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.gamma > 0.0
    }

    /// Curvature of moving point `point`.
    #[must_use]
    pub fn moving_curvature(&self, point: usize) -> f64 {
        self.moving.get(point).copied().unwrap_or(0.0)
    }

    /// Fixed-surface curvature interpolated at `hit`.
    #[must_use]
    pub fn fixed_curvature(&self, hit: &SurfaceHit) -> f64 {
        self.fixed_faces
            .get(hit.cell as usize)
            .map_or(0.0, |face| {
                let corner = face.map(|i| self.fixed.get(i as usize).copied().unwrap_or(0.0));
                let [u, v, w] = hit.barycentric;
                w.mul_add(corner[2], u.mul_add(corner[0], v * corner[1]))
            })
    }

    /// Gradient of [`fixed_curvature`](Self::fixed_curvature) with respect to
    /// the query point whose closest point is `hit`.
    ///
    /// An interior hit slides in the cell plane, an edge hit along its edge,
    /// and a corner hit stays put. The result is the in-plane gradient of the
    /// interpolant, its component along the edge, or zero.
    #[must_use]
    pub fn fixed_curvature_gradient(&self, hit: &SurfaceHit) -> Vector3<f64> {
        let Some(face) = self.fixed_faces.get(hit.cell as usize) else {
            return Vector3::zeros();
        };
        let mut points = [Point3::origin(); 3];
        let mut values = [0.0; 3];
        for (k, &i) in face.iter().enumerate() {
            match (self.fixed_points.get(i as usize), self.fixed.get(i as usize)) {
                (Some(p), Some(&v)) => {
                    points[k] = *p;
                    values[k] = v;
                }
                _ => return Vector3::zeros(),
            }
        }

        let mut active = [0usize; 3];
        let mut count = 0;
        for (k, &b) in hit.barycentric.iter().enumerate() {
            if b > 0.0 {
                active[count] = k;
                count += 1;
            }
        }

        match count {
            3 => {
                let e1 = points[1] - points[0];
                let e2 = points[2] - points[0];
                let n = e1.cross(&e2);
                let area2 = n.norm_squared();
                if area2 < f64::MIN_POSITIVE {
                    return Vector3::zeros();
                }
                (e2.cross(&n) * (values[1] - values[0]) + n.cross(&e1) * (values[2] - values[0]))
                    / area2
            }
            2 => {
                let (p, q) = (active[0], active[1]);
                let e = points[q] - points[p];
                let length2 = e.norm_squared();
                if length2 < f64::MIN_POSITIVE {
                    return Vector3::zeros();
                }
                e * ((values[q] - values[p]) / length2)
            }
            _ => Vector3::zeros(),
        }
    }

    /// Multiplicative mismatch weight for moving point `point` matched to `hit`.
    #[must_use]
    pub fn factor(&self, point: usize, hit: &SurfaceHit) -> f64 {
        if !self.is_enabled() {
            return 1.0;
        }
        let diff = self.moving_curvature(point) - self.fixed_curvature(hit);
        (-self.gamma * diff * diff).exp()
    }

    /// Gradient of [`factor`](Self::factor) with respect to the query point,
    /// for a hit that follows the query.
    #[must_use]
    pub fn factor_gradient(&self, point: usize, hit: &SurfaceHit) -> Vector3<f64> {
        if !self.is_enabled() {
            return Vector3::zeros();
        }
        let diff = self.moving_curvature(point) - self.fixed_curvature(hit);
        let factor = (-self.gamma * diff * diff).exp();
        self.fixed_curvature_gradient(hit) * (2.0 * self.gamma * diff * factor)
    }
}
