//! Core mesh types for surface registration.
//!
//! This crate provides the surface representation consumed by the
//! thin-shell demons metric:
//!
//! - [`Vertex`] - A point in 3D space
//! - [`IndexedMesh`] - A triangle mesh with indexed vertices
//! - [`MeshAdjacency`] - Derived point→cell and edge→cell links, built lazily
//! - [`Triangle`] - A concrete triangle with vertex positions
//! - [`Aabb`] - Axis-aligned bounding box
//!
//! # Units
//!
//! This library is **unit-agnostic**. All coordinates are `f64`.
//!
//! # Adjacency
//!
//! Connectivity is static across a registration run, so adjacency is derived
//! once from the faces and cached on the mesh. It is only invalidated by an
//! explicit [`IndexedMesh::rebuild_adjacency`] call. Faces that repeat a
//! vertex index are skipped and counted, never treated as fatal.
//!
//! # Example
//!
//! ```
//! use mesh_types::{IndexedMesh, MeshTopology, Point3, Vertex};
//!
//! let mut mesh = IndexedMesh::new();
//! mesh.vertices.push(Vertex::new(Point3::new(0.0, 0.0, 0.0)));
//! mesh.vertices.push(Vertex::new(Point3::new(1.0, 0.0, 0.0)));
//! mesh.vertices.push(Vertex::new(Point3::new(0.0, 1.0, 0.0)));
//! mesh.vertices.push(Vertex::new(Point3::new(1.0, 1.0, 0.0)));
//! mesh.faces.push([0, 1, 2]);
//! mesh.faces.push([1, 3, 2]);
//!
//! assert_eq!(mesh.face_count(), 2);
//! assert_eq!(mesh.edge_sharing_cells(1, 2), &[0, 1]);
//! assert_eq!(mesh.cells_incident_to_point(0), &[0]);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

mod adjacency;
mod bounds;
mod mesh;
mod traits;
mod triangle;
mod vertex;

pub use adjacency::{EdgeLinks, MeshAdjacency};
pub use bounds::Aabb;
pub use mesh::{IndexedMesh, grid_mesh};
pub use traits::{MeshBounds, MeshTopology};
pub use triangle::{SurfacePoint, Triangle};
pub use vertex::Vertex;

// Re-export nalgebra types for convenience
pub use nalgebra::{Point3, Vector3};
