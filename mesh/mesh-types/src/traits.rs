//! Traits for mesh types.

use crate::{Aabb, Triangle};
use nalgebra::Point3;

/// Minimal read-only surface contract used by registration code.
///
/// Points and cells are addressed by dense indices. Cells are triangles,
/// stored as three point indices.
pub trait MeshTopology {
    /// Number of points, including unreferenced ones.
    fn vertex_count(&self) -> usize;

    /// Number of triangle cells, including degenerate ones.
    fn face_count(&self) -> usize;

    /// `true` when there are no points or no cells.
    fn is_empty(&self) -> bool {
        self.vertex_count() == 0 || self.face_count() == 0
    }

    /// Position of point `index`, or `None` if out of range.
    fn point(&self, index: usize) -> Option<Point3<f64>>;

    /// Vertex indices of cell `index`, or `None` if out of range.
    fn face(&self, index: usize) -> Option<[u32; 3]>;

    /// Triangle of cell `index` with resolved positions.
    ///
    /// Returns `None` if the cell or any of its points is out of range.
    fn triangle(&self, index: usize) -> Option<Triangle> {
        let [a, b, c] = self.face(index)?;
        Some(Triangle::new(
            self.point(a as usize)?,
            self.point(b as usize)?,
            self.point(c as usize)?,
        ))
    }
}

/// Trait for types that can compute a bounding box.
pub trait MeshBounds {
    /// Compute the axis-aligned bounding box.
    ///
    /// Returns an empty AABB if the mesh has no vertices.
    fn bounds(&self) -> Aabb;

    /// Compute the bounding box, returning `None` if empty.
    fn bounds_opt(&self) -> Option<Aabb> {
        let b = self.bounds();
        if b.is_empty() { None } else { Some(b) }
    }
}
