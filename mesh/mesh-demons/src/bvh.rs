//! Bounding volume hierarchy for closest-point queries.
//!
//! Median split along the longest axis of each node's bounds, leaves of up to
//! eight triangles. Queries descend the nearer child first and prune any
//! subtree whose box is farther than the best triangle found so far.

use mesh_types::{Aabb, Point3, SurfacePoint, Triangle};
use smallvec::SmallVec;

/// Triangles per leaf.
pub const DEFAULT_MAX_LEAF_SIZE: usize = 8;

/// Subtrees with at least this many triangles are built on the rayon pool.
const PARALLEL_BUILD_THRESHOLD: usize = 4096;

#[derive(Debug)]
enum BvhNode {
    Leaf {
        bbox: Aabb,
        triangles: SmallVec<[u32; 8]>,
    },
    Internal {
        bbox: Aabb,
        left: Box<Self>,
        right: Box<Self>,
    },
}

impl BvhNode {
    const fn bbox(&self) -> &Aabb {
        match self {
            Self::Leaf { bbox, .. } | Self::Internal { bbox, .. } => bbox,
        }
    }
}

/// Nearest triangle found by a query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NearestTriangle {
    /// Index into the triangle list the hierarchy was built from.
    pub index: u32,
    /// Closest point on that triangle.
    pub surface: SurfacePoint,
    /// Squared distance from the query to `surface.point`.
    pub distance_squared: f64,
}

impl NearestTriangle {
    /// Whether `(distance_squared, index)` beats `best`, breaking distance
    /// ties toward the lower index.
    #[inline]
    #[allow(clippy::float_cmp)] // exact ties only
    pub(crate) fn improves(distance_squared: f64, index: u32, best: Option<&Self>) -> bool {
        distance_squared.is_finite()
            && best.is_none_or(|b| {
                distance_squared < b.distance_squared
                    || (distance_squared == b.distance_squared && index < b.index)
            })
    }
}

/// A BVH owning the triangles it indexes.
#[derive(Debug)]
pub struct TriangleBvh {
    triangles: Vec<Triangle>,
    root: Option<BvhNode>,
}

impl TriangleBvh {
    /// Build a hierarchy over `triangles`.
    ///
    /// Query results refer to positions in this list.
    ///
    /// # Example
    ///
    /// ```
    /// use mesh_demons::bvh::TriangleBvh;
    /// use mesh_types::{Point3, Triangle};
    ///
    /// let tri = Triangle::new(
    ///     Point3::new(0.0, 0.0, 0.0),
    ///     Point3::new(1.0, 0.0, 0.0),
    ///     Point3::new(0.0, 1.0, 0.0),
    /// );
    /// let bvh = TriangleBvh::build(vec![tri], 8);
    /// let hit = bvh.nearest(&Point3::new(0.2, 0.2, 1.0)).unwrap();
    /// assert_eq!(hit.index, 0);
    /// assert!((hit.distance_squared - 1.0).abs() < 1e-12);
    /// ```
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn build(triangles: Vec<Triangle>, max_leaf_size: usize) -> Self {
        if triangles.is_empty() {
            return Self {
                triangles,
                root: None,
            };
        }

        let boxes: Vec<(u32, Aabb)> = triangles
            .iter()
            .enumerate()
            .map(|(i, t)| (i as u32, Aabb::from_triangle(&t.v0, &t.v1, &t.v2)))
            .collect();

        let indices: Vec<usize> = (0..boxes.len()).collect();
        let root = build_recursive(&boxes, indices, max_leaf_size.max(1));

        Self {
            triangles,
            root: Some(root),
        }
    }

    /// Number of indexed triangles.
    #[inline]
    #[must_use]
    pub fn triangle_count(&self) -> usize {
        self.triangles.len()
    }

    /// The indexed triangles, in build order.
    #[inline]
    #[must_use]
    pub fn triangles(&self) -> &[Triangle] {
        &self.triangles
    }

    /// `true` when built from no triangles.
    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    /// Bounds of everything in the hierarchy.
    #[must_use]
    pub fn root_bounds(&self) -> Option<&Aabb> {
        self.root.as_ref().map(BvhNode::bbox)
    }

    /// Number of leaves.
    #[must_use]
    pub fn leaf_count(&self) -> usize {
        fn count(node: &BvhNode) -> usize {
            match node {
                BvhNode::Leaf { .. } => 1,
                BvhNode::Internal { left, right, .. } => count(left) + count(right),
            }
        }
        self.root.as_ref().map_or(0, count)
    }

    /// Closest point on any indexed triangle.
    ///
    /// Returns `None` for an empty hierarchy or a non-finite query.
    #[must_use]
    pub fn nearest(&self, query: &Point3<f64>) -> Option<NearestTriangle> {
        let mut best = None;
        if let Some(root) = &self.root {
            self.nearest_recursive(root, query, &mut best);
        }
        best
    }

    fn nearest_recursive(
        &self,
        node: &BvhNode,
        query: &Point3<f64>,
        best: &mut Option<NearestTriangle>,
    ) {
        match node {
            BvhNode::Leaf { triangles, .. } => {
                for &index in triangles {
                    let surface = self.triangles[index as usize].closest_point(query);
                    let distance_squared = (surface.point - query).norm_squared();
                    if NearestTriangle::improves(distance_squared, index, best.as_ref()) {
                        *best = Some(NearestTriangle {
                            index,
                            surface,
                            distance_squared,
                        });
                    }
                }
            }
            BvhNode::Internal { left, right, .. } => {
                let dl = left.bbox().distance_squared(query);
                let dr = right.bbox().distance_squared(query);
                let ordered = if dl <= dr {
                    [(left, dl), (right, dr)]
                } else {
                    [(right, dr), (left, dl)]
                };
                for (child, box_distance) in ordered {
                    // Equal distances are still visited so ties resolve by index.
                    if best.as_ref().is_none_or(|b| box_distance <= b.distance_squared) {
                        self.nearest_recursive(child, query, best);
                    }
                }
            }
        }
    }
}

fn build_recursive(boxes: &[(u32, Aabb)], indices: Vec<usize>, max_leaf_size: usize) -> BvhNode {
    let bbox = indices
        .iter()
        .fold(Aabb::empty(), |acc, &i| acc.union(&boxes[i].1));

    if indices.len() <= max_leaf_size {
        return BvhNode::Leaf {
            bbox,
            triangles: indices.iter().map(|&i| boxes[i].0).collect(),
        };
    }

    let axis = bbox.longest_axis();
    let mut sorted = indices;
    sorted.sort_by(|&a, &b| boxes[a].1.center()[axis].total_cmp(&boxes[b].1.center()[axis]));

    let right_indices = sorted.split_off(sorted.len() / 2);
    let left_indices = sorted;

    let (left, right) = if left_indices.len() + right_indices.len() >= PARALLEL_BUILD_THRESHOLD {
        rayon::join(
            || build_recursive(boxes, left_indices, max_leaf_size),
            || build_recursive(boxes, right_indices, max_leaf_size),
        )
    } else {
        (
            build_recursive(boxes, left_indices, max_leaf_size),
            build_recursive(boxes, right_indices, max_leaf_size),
        )
    };

    BvhNode::Internal {
        bbox,
        left: Box::new(left),
        right: Box::new(right),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use mesh_types::{MeshTopology, grid_mesh};

    fn grid_triangles(n: usize) -> Vec<Triangle> {
        let grid = grid_mesh(n, n, 1.0);
        (0..grid.face_count()).filter_map(|i| grid.triangle(i)).collect()
    }

    #[test]
    fn empty_build() {
        let bvh = TriangleBvh::build(Vec::new(), 8);
        assert!(bvh.is_empty());
        assert!(bvh.nearest(&Point3::origin()).is_none());
        assert_eq!(bvh.leaf_count(), 0);
    }

    #[test]
    fn leaves_cover_all_triangles() {
        let bvh = TriangleBvh::build(grid_triangles(6), 4);
        assert_eq!(bvh.triangle_count(), 72);
        assert!(bvh.leaf_count() >= 72 / 4);
        let bounds = bvh.root_bounds().unwrap();
        assert_eq!(bounds.max, Point3::new(6.0, 6.0, 0.0));
    }

    #[test]
    fn nearest_above_grid_projects_down() {
        let bvh = TriangleBvh::build(grid_triangles(4), 2);
        let hit = bvh.nearest(&Point3::new(2.3, 1.6, 0.75)).unwrap();
        assert!((hit.surface.point - Point3::new(2.3, 1.6, 0.0)).norm() < 1e-12);
        assert!((hit.distance_squared - 0.5625).abs() < 1e-12);
    }

    #[test]
    fn ties_resolve_to_lower_index() {
        // A query on a grid vertex is equidistant (zero) from every
        // incident triangle.
        let bvh = TriangleBvh::build(grid_triangles(3), 1);
        let hit = bvh.nearest(&Point3::new(1.0, 1.0, 0.0)).unwrap();
        assert_eq!(hit.distance_squared, 0.0);
        // Triangle 0, (0,0)-(1,0)-(1,1), is the lowest index touching it.
        assert_eq!(hit.index, 0);
    }

    #[test]
    fn nan_query_finds_nothing() {
        let bvh = TriangleBvh::build(grid_triangles(2), 8);
        assert!(bvh.nearest(&Point3::new(f64::NAN, 0.0, 0.0)).is_none());
    }
}
