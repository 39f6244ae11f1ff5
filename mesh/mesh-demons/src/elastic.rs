//! Thin-shell elastic energy: edge stretch and hinge bending.
//!
//! Rest quantities are tabulated once into flat edge and hinge arrays and
//! are read-only afterwards. Each evaluation walks those arrays on the rayon
//! pool, accumulating into per-worker gradient buffers that are summed at
//! the end.
//!
//! # Stretch
//!
//! For an edge of rest length `L0` and current length `L`:
//!
//! ```text
//! E = ks ((L - L0) / L0)²
//! ∂E/∂x_a = ks · 2(L - L0)/L0² · (x_a - x_b)/L = -∂E/∂x_b
//! ```
//!
//! # Bending
//!
//! For a hinge with edge `x0 → x1` (as traversed by its first cell), wing
//! `x2` in the first cell and `x3` in the second:
//!
//! ```text
//! e  = x1 - x0,  n1 = e × (x2 - x0),  n2 = (x3 - x0) × e
//! θ  = atan2((n̂1 × n̂2) · ê, n̂1 · n̂2)
//! E  = kb (θ - θ0)²
//! ```
//!
//! `θ` is 0 for a flat, consistently oriented pair. Its gradient is
//! `-|e| n1/|n1|²` at `x2` and `-|e| n2/|n2|²` at `x3`; the edge vertices
//! take the opposite sum, split by where each wing projects onto the edge.

use std::f64::consts::PI;

use mesh_types::{IndexedMesh, MeshAdjacency, Point3, Vector3};
use rayon::prelude::*;
use tracing::debug;

/// An edge with its rest length.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EdgeRecord {
    /// Lower endpoint.
    pub a: u32,
    /// Higher endpoint.
    pub b: u32,
    /// Length in the rest configuration.
    pub rest_length: f64,
}

/// Two cells sharing an edge, with their rest dihedral angle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HingeRecord {
    /// `[x0, x1, x2, x3]`: edge start, edge end, first wing, second wing.
    pub points: [u32; 4],
    /// Signed dihedral angle in the rest configuration, radians.
    pub rest_angle: f64,
}

/// Energy and gradient of one elastic term for one configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct ElasticTerm {
    /// Weighted energy.
    pub energy: f64,
    /// `∂energy/∂x_i`, one entry per point.
    pub gradient: Vec<Vector3<f64>>,
    /// Elements skipped because the current geometry is degenerate.
    pub skipped: usize,
}

impl ElasticTerm {
    fn zeros(point_count: usize) -> Self {
        Self {
            energy: 0.0,
            gradient: vec![Vector3::zeros(); point_count],
            skipped: 0,
        }
    }

    fn merge(mut self, other: Self) -> Self {
        self.energy += other.energy;
        self.skipped += other.skipped;
        for (g, o) in self.gradient.iter_mut().zip(&other.gradient) {
            *g += o;
        }
        self
    }
}

/// Rest-state tables and weights for the stretch and bending terms.
///
/// # Example
///
/// ```
/// use mesh_demons::ElasticModel;
/// use mesh_types::grid_mesh;
///
/// let rest = grid_mesh(2, 2, 1.0);
/// let model = ElasticModel::from_mesh(&rest, 1.0, 1.0, 1e-12);
/// assert_eq!(model.edge_count(), 16);
/// assert_eq!(model.hinge_count(), 8);
///
/// // Uniform scaling by 1.5 strains every edge by 0.5.
/// let stretched: Vec<_> = rest.vertices.iter().map(|v| v.position * 1.5).collect();
/// let term = model.stretch(&stretched);
/// assert!((term.energy - 16.0 * 0.25).abs() < 1e-12);
/// assert!(model.bend(&stretched).energy.abs() < 1e-20);
/// ```
#[derive(Debug, Clone)]
pub struct ElasticModel {
    point_count: usize,
    edges: Vec<EdgeRecord>,
    hinges: Vec<HingeRecord>,
    stretch_weight: f64,
    bend_weight: f64,
    epsilon: f64,
    degenerate_rest_edges: usize,
    degenerate_rest_hinges: usize,
    non_manifold_edges: usize,
}

impl ElasticModel {
    /// Tabulate rest edges and hinges.
    ///
    /// `adjacency` must have been derived from `faces` over
    /// `rest_positions.len()` points. Edges shorter than `sqrt(epsilon)` and
    /// hinges whose edge or wings are degenerate in the rest state are left
    /// out and counted. Edges shared by more than two cells carry no hinge.
    #[must_use]
    pub fn new(
        rest_positions: &[Point3<f64>],
        faces: &[[u32; 3]],
        adjacency: &MeshAdjacency,
        stretch_weight: f64,
        bend_weight: f64,
        epsilon: f64,
    ) -> Self {
        let mut edges = Vec::with_capacity(adjacency.edge_count());
        let mut hinges = Vec::new();
        let mut degenerate_rest_edges = 0;
        let mut degenerate_rest_hinges = 0;

        for link in adjacency.edges() {
            let rest = rest_positions[link.b as usize] - rest_positions[link.a as usize];
            if rest.norm_squared() <= epsilon {
                degenerate_rest_edges += 1;
            } else {
                edges.push(EdgeRecord {
                    a: link.a,
                    b: link.b,
                    rest_length: rest.norm(),
                });
            }

            if !link.is_interior() {
                continue;
            }
            let points = hinge_points(faces, link.a, link.b, link.cells[0], link.cells[1]);
            let corners = points.map(|i| rest_positions[i as usize]);
            match dihedral_angle(&corners, epsilon) {
                Some(rest_angle) => hinges.push(HingeRecord { points, rest_angle }),
                None => degenerate_rest_hinges += 1,
            }
        }

        let non_manifold_edges = adjacency.non_manifold_edge_count();
        debug!(
            edges = edges.len(),
            hinges = hinges.len(),
            degenerate_rest_edges,
            degenerate_rest_hinges,
            non_manifold_edges,
            "Elastic rest state tabulated"
        );

        Self {
            point_count: rest_positions.len(),
            edges,
            hinges,
            stretch_weight,
            bend_weight,
            epsilon,
            degenerate_rest_edges,
            degenerate_rest_hinges,
            non_manifold_edges,
        }
    }

    /// Tabulate the rest state from a mesh's own positions and valid cells.
    #[must_use]
    pub fn from_mesh(mesh: &IndexedMesh, stretch_weight: f64, bend_weight: f64, epsilon: f64) -> Self {
        Self::new(
            &mesh.positions(),
            &mesh.faces,
            mesh.adjacency(),
            stretch_weight,
            bend_weight,
            epsilon,
        )
    }

    /// Number of points the model expects positions for.
    #[inline]
    #[must_use]
    pub const fn point_count(&self) -> usize {
        self.point_count
    }

    /// Tabulated edges.
    #[inline]
    #[must_use]
    pub fn edges(&self) -> &[EdgeRecord] {
        &self.edges
    }

    /// Tabulated hinges.
    #[inline]
    #[must_use]
    pub fn hinges(&self) -> &[HingeRecord] {
        &self.hinges
    }

    /// Number of tabulated edges.
    #[inline]
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Number of tabulated hinges.
    #[inline]
    #[must_use]
    pub fn hinge_count(&self) -> usize {
        self.hinges.len()
    }

    /// Edges left out because their rest length is degenerate.
    #[inline]
    #[must_use]
    pub const fn degenerate_rest_edges(&self) -> usize {
        self.degenerate_rest_edges
    }

    /// Hinges left out because their rest geometry is degenerate.
    #[inline]
    #[must_use]
    pub const fn degenerate_rest_hinges(&self) -> usize {
        self.degenerate_rest_hinges
    }

    /// Edges shared by more than two cells.
    #[inline]
    #[must_use]
    pub const fn non_manifold_edges(&self) -> usize {
        self.non_manifold_edges
    }

    /// Stretch energy and gradient at `positions`.
    ///
    /// # Panics
    ///
    /// Panics if `positions` has fewer than [`point_count`](Self::point_count)
    /// entries.
    #[must_use]
    pub fn stretch(&self, positions: &[Point3<f64>]) -> ElasticTerm {
        let ks = self.stretch_weight;
        if ks == 0.0 {
            return ElasticTerm::zeros(self.point_count);
        }
        let eps = self.epsilon;

        self.accumulate(&self.edges, |edge, acc| {
            let (a, b) = (edge.a as usize, edge.b as usize);
            let d = positions[a] - positions[b];
            let length_sq = d.norm_squared();
            if length_sq <= eps {
                acc.skipped += 1;
                return;
            }
            let length = length_sq.sqrt();
            let l0 = edge.rest_length;
            let strain = (length - l0) / l0;
            acc.energy += ks * strain * strain;

            let g = d * (ks * 2.0 * (length - l0) / (l0 * l0 * length));
            acc.gradient[a] += g;
            acc.gradient[b] -= g;
        })
    }

    /// Bending energy and gradient at `positions`.
    ///
    /// # Panics
    ///
    /// Panics if `positions` has fewer than [`point_count`](Self::point_count)
    /// entries.
    #[must_use]
    pub fn bend(&self, positions: &[Point3<f64>]) -> ElasticTerm {
        let kb = self.bend_weight;
        if kb == 0.0 {
            return ElasticTerm::zeros(self.point_count);
        }
        let eps = self.epsilon;

        self.accumulate(&self.hinges, |hinge, acc| {
            let corners = hinge.points.map(|i| positions[i as usize]);
            let Some((angle, grad)) = dihedral_angle_gradient(&corners, eps) else {
                acc.skipped += 1;
                return;
            };
            let delta = wrap_angle(angle - hinge.rest_angle);
            acc.energy += kb * delta * delta;

            let scale = 2.0 * kb * delta;
            for (&i, g) in hinge.points.iter().zip(grad) {
                acc.gradient[i as usize] += g * scale;
            }
        })
    }

    fn accumulate<T, F>(&self, items: &[T], visit: F) -> ElasticTerm
    where
        T: Sync,
        F: Fn(&T, &mut ElasticTerm) + Sync,
    {
        let n = self.point_count;
        items
            .par_iter()
            .fold(
                || ElasticTerm::zeros(n),
                |mut acc, item| {
                    visit(item, &mut acc);
                    acc
                },
            )
            .reduce(|| ElasticTerm::zeros(n), ElasticTerm::merge)
    }
}

/// Order a hinge so that `x0 → x1` is the direction `first` traverses the
/// shared edge.
fn hinge_points(faces: &[[u32; 3]], a: u32, b: u32, first: u32, second: u32) -> [u32; 4] {
    let (forward, wing1) = edge_in_face(faces[first as usize], a, b);
    let (_, wing2) = edge_in_face(faces[second as usize], a, b);
    if forward {
        [a, b, wing1, wing2]
    } else {
        [b, a, wing1, wing2]
    }
}

/// Whether `face` traverses `a → b`, and its third vertex.
fn edge_in_face(face: [u32; 3], a: u32, b: u32) -> (bool, u32) {
    for k in 0..3 {
        let (p, q, r) = (face[k], face[(k + 1) % 3], face[(k + 2) % 3]);
        if p == a && q == b {
            return (true, r);
        }
        if p == b && q == a {
            return (false, r);
        }
    }
    // Unreachable for faces that really contain the edge.
    (true, face[0])
}

/// Map an angle difference into `(-π, π]`.
fn wrap_angle(delta: f64) -> f64 {
    if delta > PI {
        delta - 2.0 * PI
    } else if delta <= -PI {
        delta + 2.0 * PI
    } else {
        delta
    }
}

/// Signed dihedral angle of hinge `[x0, x1, x2, x3]`.
///
/// Returns `None` if the edge or either wing triangle is degenerate
/// (squared length or squared doubled area at or below `epsilon`).
#[must_use]
pub fn dihedral_angle(corners: &[Point3<f64>; 4], epsilon: f64) -> Option<f64> {
    let [x0, x1, x2, x3] = corners;
    let e = x1 - x0;
    let n1 = e.cross(&(x2 - x0));
    let n2 = (x3 - x0).cross(&e);
    let (l2, a1, a2) = (e.norm_squared(), n1.norm_squared(), n2.norm_squared());
    if l2 <= epsilon || a1 <= epsilon || a2 <= epsilon {
        return None;
    }
    let sin = n1.cross(&n2).dot(&e) / (a1.sqrt() * a2.sqrt() * l2.sqrt());
    let cos = n1.dot(&n2) / (a1.sqrt() * a2.sqrt());
    Some(sin.atan2(cos))
}

/// Signed dihedral angle of hinge `[x0, x1, x2, x3]` and its gradient with
/// respect to each corner.
///
/// Returns `None` under the same conditions as [`dihedral_angle`].
#[must_use]
pub fn dihedral_angle_gradient(
    corners: &[Point3<f64>; 4],
    epsilon: f64,
) -> Option<(f64, [Vector3<f64>; 4])> {
    let angle = dihedral_angle(corners, epsilon)?;
    let [x0, x1, x2, x3] = corners;
    let e = x1 - x0;
    let l2 = e.norm_squared();
    let l = l2.sqrt();
    let n1 = e.cross(&(x2 - x0));
    let n2 = (x3 - x0).cross(&e);

    let g2 = n1 * (-l / n1.norm_squared());
    let g3 = n2 * (-l / n2.norm_squared());
    let s2 = (x2 - x0).dot(&e) / l2;
    let s3 = (x3 - x0).dot(&e) / l2;
    let g0 = g2 * (s2 - 1.0) + g3 * (s3 - 1.0);
    let g1 = -(g2 * s2 + g3 * s3);

    Some((angle, [g0, g1, g2, g3]))
}
