//! Indexed triangle mesh.

use std::sync::OnceLock;

use crate::{Aabb, MeshAdjacency, MeshBounds, MeshTopology, Triangle, Vertex};
use nalgebra::{Point3, Vector3};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// An indexed triangle mesh.
///
/// Stores vertices and faces separately, with faces referencing vertices by
/// index. Adjacency is derived on first use and cached; call
/// [`rebuild_adjacency`](Self::rebuild_adjacency) after editing `faces`.
///
/// # Example
///
/// ```
/// use mesh_types::{IndexedMesh, Vertex, MeshTopology};
///
/// let mut mesh = IndexedMesh::new();
/// mesh.vertices.push(Vertex::from_coords(0.0, 0.0, 0.0));
/// mesh.vertices.push(Vertex::from_coords(1.0, 0.0, 0.0));
/// mesh.vertices.push(Vertex::from_coords(0.0, 1.0, 0.0));
/// mesh.faces.push([0, 1, 2]);
///
/// assert_eq!(mesh.vertex_count(), 3);
/// assert_eq!(mesh.adjacency().edge_count(), 3);
/// ```
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct IndexedMesh {
    /// Vertex data.
    pub vertices: Vec<Vertex>,

    /// Triangle faces as indices into the vertex array.
    pub faces: Vec<[u32; 3]>,

    #[cfg_attr(feature = "serde", serde(skip))]
    adjacency: OnceLock<MeshAdjacency>,
}

impl IndexedMesh {
    /// Create a new empty mesh.
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self {
            vertices: Vec::new(),
            faces: Vec::new(),
            adjacency: OnceLock::new(),
        }
    }

    /// Create a mesh with pre-allocated capacity.
    #[inline]
    #[must_use]
    pub fn with_capacity(vertex_count: usize, face_count: usize) -> Self {
        Self {
            vertices: Vec::with_capacity(vertex_count),
            faces: Vec::with_capacity(face_count),
            adjacency: OnceLock::new(),
        }
    }

    /// Create a mesh from vertices and faces.
    #[inline]
    #[must_use]
    pub const fn from_parts(vertices: Vec<Vertex>, faces: Vec<[u32; 3]>) -> Self {
        Self {
            vertices,
            faces,
            adjacency: OnceLock::new(),
        }
    }

    /// Create a mesh from point positions and faces.
    #[must_use]
    pub fn from_points(points: &[Point3<f64>], faces: Vec<[u32; 3]>) -> Self {
        Self::from_parts(points.iter().copied().map(Vertex::new).collect(), faces)
    }

    /// Create a mesh from flat coordinate and index arrays.
    ///
    /// Returns an empty mesh if either array length is not a multiple of 3.
    ///
    /// # Example
    ///
    /// ```
    /// use mesh_types::{IndexedMesh, MeshTopology};
    ///
    /// let positions = [0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0];
    /// let mesh = IndexedMesh::from_raw(&positions, &[0, 1, 2]);
    /// assert_eq!(mesh.face_count(), 1);
    /// ```
    #[must_use]
    pub fn from_raw(positions: &[f64], indices: &[u32]) -> Self {
        if positions.len() % 3 != 0 || indices.len() % 3 != 0 {
            return Self::new();
        }

        let vertices = positions
            .chunks_exact(3)
            .map(|c| Vertex::from_coords(c[0], c[1], c[2]))
            .collect();
        let faces = indices.chunks_exact(3).map(|c| [c[0], c[1], c[2]]).collect();

        Self::from_parts(vertices, faces)
    }

    /// Derived adjacency, built on first access.
    pub fn adjacency(&self) -> &MeshAdjacency {
        self.adjacency
            .get_or_init(|| MeshAdjacency::build(self.vertices.len(), &self.faces))
    }

    /// Discard cached adjacency and derive it again from the current faces.
    pub fn rebuild_adjacency(&mut self) -> &MeshAdjacency {
        self.adjacency = OnceLock::new();
        self.adjacency()
    }

    /// Cells incident to point `point`.
    #[inline]
    pub fn cells_incident_to_point(&self, point: usize) -> &[u32] {
        self.adjacency().cells_incident_to_point(point)
    }

    /// Cells sharing the edge `{a, b}` (0, 1 or 2 on a manifold surface).
    #[inline]
    pub fn edge_sharing_cells(&self, a: u32, b: u32) -> &[u32] {
        self.adjacency().edge_sharing_cells(a, b)
    }

    /// Copy of all vertex positions, in index order.
    #[must_use]
    pub fn positions(&self) -> Vec<Point3<f64>> {
        self.vertices.iter().map(|v| v.position).collect()
    }

    /// Translate mesh by the given vector.
    pub fn translate(&mut self, offset: Vector3<f64>) {
        for vertex in &mut self.vertices {
            vertex.position += offset;
        }
    }

    /// Scale mesh uniformly around the origin.
    pub fn scale(&mut self, factor: f64) {
        for vertex in &mut self.vertices {
            vertex.position.coords *= factor;
        }
    }

    /// Total area of all faces.
    #[must_use]
    pub fn surface_area(&self) -> f64 {
        (0..self.faces.len())
            .filter_map(|i| self.triangle(i))
            .map(|tri| tri.area())
            .sum()
    }
}

impl MeshTopology for IndexedMesh {
    #[inline]
    fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    #[inline]
    fn face_count(&self) -> usize {
        self.faces.len()
    }

    #[inline]
    fn point(&self, index: usize) -> Option<Point3<f64>> {
        self.vertices.get(index).map(|v| v.position)
    }

    #[inline]
    fn face(&self, index: usize) -> Option<[u32; 3]> {
        self.faces.get(index).copied()
    }

    fn triangle(&self, index: usize) -> Option<Triangle> {
        let &[i0, i1, i2] = self.faces.get(index)?;
        Some(Triangle::new(
            self.vertices.get(i0 as usize)?.position,
            self.vertices.get(i1 as usize)?.position,
            self.vertices.get(i2 as usize)?.position,
        ))
    }
}

impl MeshBounds for IndexedMesh {
    fn bounds(&self) -> Aabb {
        Aabb::from_points(self.vertices.iter().map(|v| &v.position))
    }
}

/// Create a flat rectangular grid in the XY plane.
///
/// The grid has `(cols + 1) * (rows + 1)` points spaced `spacing` apart,
/// starting at the origin, and two triangles per square, all wound CCW
/// (normal +Z). Points are numbered row by row.
///
/// # Example
///
/// ```
/// use mesh_types::{grid_mesh, MeshTopology};
///
/// let grid = grid_mesh(2, 2, 1.0);
/// assert_eq!(grid.vertex_count(), 9);
/// assert_eq!(grid.face_count(), 8);
/// assert_eq!(grid.adjacency().edge_count(), 16);
/// ```
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
pub fn grid_mesh(cols: usize, rows: usize, spacing: f64) -> IndexedMesh {
    let stride = cols + 1;
    let mut mesh = IndexedMesh::with_capacity(stride * (rows + 1), 2 * cols * rows);

    for j in 0..=rows {
        for i in 0..=cols {
            mesh.vertices.push(Vertex::from_coords(
                i as f64 * spacing,
                j as f64 * spacing,
                0.0,
            ));
        }
    }

    for j in 0..rows {
        for i in 0..cols {
            let p00 = (j * stride + i) as u32;
            let p10 = p00 + 1;
            let p01 = p00 + stride as u32;
            let p11 = p01 + 1;
            mesh.faces.push([p00, p10, p11]);
            mesh.faces.push([p00, p11, p01]);
        }
    }

    mesh
}
