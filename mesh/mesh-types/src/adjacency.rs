//! Derived mesh connectivity.
//!
//! Provides point→cell links, unique undirected edges with the cells that
//! share them, and cell→cell neighbours across edges. Everything is stored
//! in flat indexed arrays so the structure can be read from many threads.

use hashbrown::HashMap;
use smallvec::SmallVec;

/// An undirected edge and the cells that contain it.
///
/// Endpoints are stored with `a < b`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EdgeLinks {
    /// Lower endpoint index.
    pub a: u32,
    /// Higher endpoint index.
    pub b: u32,
    /// Cells containing this edge, in face order. Two for an interior
    /// manifold edge, one on a boundary, more on a non-manifold edge.
    pub cells: SmallVec<[u32; 2]>,
}

impl EdgeLinks {
    /// `true` when exactly two cells share the edge.
    #[inline]
    #[must_use]
    pub fn is_interior(&self) -> bool {
        self.cells.len() == 2
    }
}

/// Adjacency derived from a face list.
///
/// Faces that repeat a vertex index are degenerate and faces that reference
/// a point outside `0..point_count` are invalid; both are left out of every
/// table and only counted.
#[derive(Debug, Clone, Default)]
pub struct MeshAdjacency {
    point_cells: Vec<Vec<u32>>,
    edges: Vec<EdgeLinks>,
    edge_lookup: HashMap<(u32, u32), u32>,
    cell_neighbors: Vec<[Option<u32>; 3]>,
    valid_cells: Vec<u32>,
    degenerate_cells: usize,
    invalid_cells: usize,
}

#[inline]
const fn edge_key(a: u32, b: u32) -> (u32, u32) {
    if a < b { (a, b) } else { (b, a) }
}

impl MeshAdjacency {
    /// Build adjacency for `point_count` points and the given faces.
    ///
    /// # Example
    ///
    /// ```
    /// use mesh_types::MeshAdjacency;
    ///
    /// let adj = MeshAdjacency::build(4, &[[0, 1, 2], [2, 1, 3], [0, 0, 3]]);
    /// assert_eq!(adj.edge_count(), 5);
    /// assert_eq!(adj.degenerate_cell_count(), 1);
    /// assert_eq!(adj.edge_sharing_cells(2, 1), &[0, 1]);
    /// ```
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    // Truncation: mesh indices are u32, so counts > 4B are unsupported
    pub fn build(point_count: usize, faces: &[[u32; 3]]) -> Self {
        let mut point_cells: Vec<Vec<u32>> = vec![Vec::new(); point_count];
        let mut edges: Vec<EdgeLinks> = Vec::new();
        let mut edge_lookup: HashMap<(u32, u32), u32> = HashMap::new();
        let mut valid_cells = Vec::with_capacity(faces.len());
        let mut degenerate_cells = 0;
        let mut invalid_cells = 0;

        for (cell, &[i0, i1, i2]) in faces.iter().enumerate() {
            let cell = cell as u32;
            if [i0, i1, i2].iter().any(|&i| i as usize >= point_count) {
                invalid_cells += 1;
                continue;
            }
            if i0 == i1 || i1 == i2 || i2 == i0 {
                degenerate_cells += 1;
                continue;
            }

            valid_cells.push(cell);
            for i in [i0, i1, i2] {
                point_cells[i as usize].push(cell);
            }

            for (a, b) in [(i0, i1), (i1, i2), (i2, i0)] {
                let key = edge_key(a, b);
                let id = *edge_lookup.entry(key).or_insert_with(|| {
                    edges.push(EdgeLinks {
                        a: key.0,
                        b: key.1,
                        cells: SmallVec::new(),
                    });
                    (edges.len() - 1) as u32
                });
                edges[id as usize].cells.push(cell);
            }
        }

        let mut cell_neighbors = vec![[None; 3]; faces.len()];
        for &cell in &valid_cells {
            let [i0, i1, i2] = faces[cell as usize];
            for (k, (a, b)) in [(i0, i1), (i1, i2), (i2, i0)].into_iter().enumerate() {
                let neighbour = edge_lookup
                    .get(&edge_key(a, b))
                    .and_then(|&id| edges[id as usize].cells.iter().copied().find(|&c| c != cell));
                cell_neighbors[cell as usize][k] = neighbour;
            }
        }

        Self {
            point_cells,
            edges,
            edge_lookup,
            cell_neighbors,
            valid_cells,
            degenerate_cells,
            invalid_cells,
        }
    }

    /// Number of points the adjacency was built for.
    #[inline]
    #[must_use]
    pub fn point_count(&self) -> usize {
        self.point_cells.len()
    }

    /// Cells that reference point `point` (empty for isolated or
    /// out-of-range points).
    #[inline]
    #[must_use]
    pub fn cells_incident_to_point(&self, point: usize) -> &[u32] {
        self.point_cells.get(point).map_or(&[], Vec::as_slice)
    }

    /// Cells sharing the edge `{a, b}`, in either orientation.
    ///
    /// Empty when the edge does not exist.
    #[must_use]
    pub fn edge_sharing_cells(&self, a: u32, b: u32) -> &[u32] {
        self.edge(a, b).map_or(&[], |e| e.cells.as_slice())
    }

    /// Look up the edge `{a, b}`.
    #[must_use]
    pub fn edge(&self, a: u32, b: u32) -> Option<&EdgeLinks> {
        self.edge_lookup
            .get(&edge_key(a, b))
            .map(|&id| &self.edges[id as usize])
    }

    /// All unique edges, in order of first appearance in the face list.
    #[inline]
    #[must_use]
    pub fn edges(&self) -> &[EdgeLinks] {
        &self.edges
    }

    /// Number of unique edges.
    #[inline]
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Edges shared by exactly two cells.
    pub fn interior_edges(&self) -> impl Iterator<Item = &EdgeLinks> {
        self.edges.iter().filter(|e| e.is_interior())
    }

    /// Edges shared by more than two cells.
    #[must_use]
    pub fn non_manifold_edge_count(&self) -> usize {
        self.edges.iter().filter(|e| e.cells.len() > 2).count()
    }

    /// Neighbouring cell across each edge `(v0,v1)`, `(v1,v2)`, `(v2,v0)`
    /// of cell `cell`.
    #[must_use]
    pub fn cell_neighbors(&self, cell: usize) -> [Option<u32>; 3] {
        self.cell_neighbors.get(cell).copied().unwrap_or([None; 3])
    }

    /// Cells that passed validation, in face order.
    #[inline]
    #[must_use]
    pub fn valid_cells(&self) -> &[u32] {
        &self.valid_cells
    }

    /// Faces skipped because they repeat a vertex index.
    #[inline]
    #[must_use]
    pub const fn degenerate_cell_count(&self) -> usize {
        self.degenerate_cells
    }

    /// Faces skipped because they reference a point that does not exist.
    #[inline]
    #[must_use]
    pub const fn invalid_cell_count(&self) -> usize {
        self.invalid_cells
    }
}
