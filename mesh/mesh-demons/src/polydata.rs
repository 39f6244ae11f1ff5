//! Conversion of an indexed mesh into a generic polygon surface.

use mesh_types::{IndexedMesh, Point3};
use tracing::warn;

/// Polygon surface in offsets + connectivity form.
///
/// Polygon `k` uses point indices `connectivity[offsets[k]..offsets[k + 1]]`,
/// so `offsets` always has one more entry than there are polygons.
#[derive(Debug, Clone, PartialEq)]
pub struct PolygonSurface {
    /// Point positions, in input order.
    pub points: Vec<Point3<f64>>,
    /// Start of each polygon in `connectivity`, plus a final end marker.
    pub offsets: Vec<usize>,
    /// Concatenated point indices of all polygons.
    pub connectivity: Vec<u32>,
}

impl Default for PolygonSurface {
    fn default() -> Self {
        Self {
            points: Vec::new(),
            offsets: vec![0],
            connectivity: Vec::new(),
        }
    }
}

impl PolygonSurface {
    /// Number of polygons.
    #[inline]
    #[must_use]
    pub fn polygon_count(&self) -> usize {
        self.offsets.len().saturating_sub(1)
    }

    /// Point indices of polygon `index`.
    #[must_use]
    pub fn polygon(&self, index: usize) -> Option<&[u32]> {
        let start = *self.offsets.get(index)?;
        let end = *self.offsets.get(index + 1)?;
        self.connectivity.get(start..end)
    }
}

/// Convert a mesh to a [`PolygonSurface`].
///
/// Point order and triangle connectivity are kept as-is. A mesh with no
/// points converts to an empty surface and logs a warning.
///
/// # Example
///
/// ```
/// use mesh_demons::to_polygon_surface;
/// use mesh_types::grid_mesh;
///
/// let surface = to_polygon_surface(&grid_mesh(1, 1, 1.0));
/// assert_eq!(surface.points.len(), 4);
/// assert_eq!(surface.polygon_count(), 2);
/// assert_eq!(surface.polygon(1), Some(&[0, 3, 2][..]));
/// ```
#[must_use]
pub fn to_polygon_surface(mesh: &IndexedMesh) -> PolygonSurface {
    if mesh.vertices.is_empty() {
        warn!("Mesh has no points; returning an empty polygon surface");
        return PolygonSurface::default();
    }

    let mut offsets = Vec::with_capacity(mesh.faces.len() + 1);
    offsets.push(0);
    let mut connectivity = Vec::with_capacity(mesh.faces.len() * 3);
    for face in &mesh.faces {
        connectivity.extend_from_slice(face);
        offsets.push(connectivity.len());
    }

    PolygonSurface {
        points: mesh.positions(),
        offsets,
        connectivity,
    }
}
