//! The thin-shell demons metric.

use mesh_types::{IndexedMesh, Point3, Vector3};
use rayon::prelude::*;
use tracing::{debug, warn};

use crate::correspondence::SurfaceLocator;
use crate::domain::VirtualDomain;
use crate::elastic::ElasticModel;
use crate::error::{InvalidMeshError, MeshRole, MetricError, MetricResult};
use crate::features::GeometricFeatures;
use crate::matching::{Correspondence, FeatureMatching};
use crate::report::{Diagnostics, EnergyTerms, Evaluation};
use crate::transform::PointTransform;
use crate::{ConfidenceWeighting, CorrespondenceRefresh, RestState, ThinShellParams};

/// Deformable surface similarity for registering a moving mesh to a fixed one.
///
/// The value of one evaluation is
///
/// ```text
/// Σ_i w_i |x_i - y_i|²  +  stretch  +  bend
/// ```
///
/// where `x_i` are the transformed moving points, `y_i` their correspondences
/// on the fixed surface and `w_i` the confidence times feature weight. The
/// gradient is with respect to each `x_i`. Under
/// [`CorrespondenceRefresh::EveryIteration`] the targets and weights are
/// functions of the `x_i` and are differentiated as such (the maximal-distance
/// sigma included); under [`CorrespondenceRefresh::Fixed`] they are
/// constants. Chaining the gradient through a transform's
/// parameters is left to the caller (see
/// [`AffineTransform::parameter_gradient`](crate::AffineTransform::parameter_gradient)).
///
/// Both meshes are borrowed and never modified. The transformed points live
/// in a private buffer.
///
/// # Example
///
/// ```
/// use mesh_demons::{ThinShellDemonsMetric, ThinShellParams, VirtualDomain};
/// use mesh_types::{Vector3, grid_mesh};
///
/// let fixed = grid_mesh(2, 2, 1.0);
/// let mut moving = fixed.clone();
/// moving.translate(Vector3::new(0.0, 0.0, 0.5));
///
/// let domain = VirtualDomain::enclosing(&fixed.positions(), 1.0).unwrap();
/// let mut metric =
///     ThinShellDemonsMetric::initialize(&fixed, &moving, domain, ThinShellParams::default())
///         .unwrap();
///
/// // Undo the offset.
/// let evaluation = metric
///     .evaluate(&|p: &mesh_types::Point3<f64>| p - Vector3::new(0.0, 0.0, 0.5))
///     .unwrap();
/// assert!(evaluation.value.abs() < 1e-12);
/// assert_eq!(evaluation.gradient.len(), 9);
/// ```
#[derive(Debug)]
pub struct ThinShellDemonsMetric<'a> {
    fixed: &'a IndexedMesh,
    moving: &'a IndexedMesh,
    domain: VirtualDomain,
    params: ThinShellParams,
    moving_points: Vec<Point3<f64>>,
    working: Vec<Point3<f64>>,
    locator: SurfaceLocator,
    elastic: ElasticModel,
    features: GeometricFeatures,
    matching: FeatureMatching,
    diagnostics: Diagnostics,
}

impl<'a> ThinShellDemonsMetric<'a> {
    /// Validate inputs, build every derived table and find the first
    /// correspondences from the untransformed moving points.
    ///
    /// # Errors
    ///
    /// - [`MetricError::InvalidParameter`] if `params` fails validation.
    /// - [`MetricError::InvalidMesh`] if either mesh has no points, a cell
    ///   indexes past its points, it has no valid cells, or (with
    ///   [`RestState::FixedMesh`]) the point counts differ.
    /// - [`MetricError::CorrespondenceFailure`] if a moving point has no
    ///   closest point, which happens for non-finite coordinates.
    pub fn initialize(
        fixed: &'a IndexedMesh,
        moving: &'a IndexedMesh,
        domain: VirtualDomain,
        params: ThinShellParams,
    ) -> MetricResult<Self> {
        params.validate()?;
        validate_mesh(fixed, MeshRole::Fixed)?;
        validate_mesh(moving, MeshRole::Moving)?;

        let rest = match params.rest_state {
            RestState::FixedMesh => {
                if fixed.vertices.len() != moving.vertices.len() {
                    return Err(InvalidMeshError::PointCountMismatch {
                        fixed: fixed.vertices.len(),
                        moving: moving.vertices.len(),
                    }
                    .into());
                }
                fixed
            }
            RestState::MovingMesh => moving,
        };

        let epsilon = params.degenerate_epsilon;
        let locator = SurfaceLocator::new(fixed, params.linear_scan_threshold);
        let elastic =
            ElasticModel::from_mesh(rest, params.stretch_weight, params.bend_weight, epsilon);
        let features =
            GeometricFeatures::new(params.geometric_feature_weight, fixed, moving, epsilon);

        let moving_points = moving.positions();
        let mut matching = FeatureMatching::new(params.refresh, params.confidence());
        matching.rebuild(&locator, &features, &moving_points)?;

        let diagnostics = Diagnostics {
            degenerate_edges: elastic.degenerate_rest_edges(),
            degenerate_hinges: elastic.degenerate_rest_hinges(),
            skipped_cells: skipped_cells(fixed, moving),
            non_manifold_edges: elastic.non_manifold_edges(),
            points_outside_domain: domain.count_outside(&moving_points),
        };

        debug!(
            fixed_points = fixed.vertices.len(),
            moving_points = moving_points.len(),
            fixed_cells = locator.triangle_count(),
            accelerated = locator.is_accelerated(),
            edges = elastic.edge_count(),
            hinges = elastic.hinge_count(),
            features = features.is_enabled(),
            "Thin-shell metric initialized"
        );

        Ok(Self {
            fixed,
            moving,
            domain,
            params,
            working: moving_points.clone(),
            moving_points,
            locator,
            elastic,
            features,
            matching,
            diagnostics,
        })
    }

    /// Apply `transform` to every moving point and evaluate.
    ///
    /// # Errors
    ///
    /// Returns [`MetricError::CorrespondenceFailure`] if a transformed point
    /// has no closest point on the fixed surface.
    pub fn evaluate<T>(&mut self, transform: &T) -> MetricResult<Evaluation>
    where
        T: PointTransform + ?Sized,
    {
        let positions: Vec<Point3<f64>> = self
            .moving_points
            .par_iter()
            .map(|p| transform.transform_point(p))
            .collect();
        self.evaluate_points(positions)
    }

    /// Evaluate at already-transformed moving positions.
    ///
    /// # Errors
    ///
    /// - [`MetricError::InvalidParameter`] if `positions` does not hold one
    ///   entry per moving point.
    /// - [`MetricError::CorrespondenceFailure`] as for
    ///   [`evaluate`](Self::evaluate).
    pub fn evaluate_points(&mut self, positions: Vec<Point3<f64>>) -> MetricResult<Evaluation> {
        if positions.len() != self.moving_points.len() {
            return Err(MetricError::InvalidParameter(format!(
                "expected {} moving positions, got {}",
                self.moving_points.len(),
                positions.len()
            )));
        }

        let outside = self.domain.count_outside(&positions);
        if outside > 0 {
            warn!(outside, "Moving points outside the virtual domain");
        }

        let correspondences = self
            .matching
            .update(&self.locator, &self.features, &positions)?;
        let weights = match self.params.refresh {
            CorrespondenceRefresh::EveryIteration => WeightDependence::Live {
                confidence: self.params.confidence(),
                features: &self.features,
            },
            CorrespondenceRefresh::Fixed => WeightDependence::Frozen,
        };
        let (mismatch, mut gradient, max_distance, mean_distance) =
            mismatch_term(&positions, correspondences, weights);

        let stretch = self.elastic.stretch(&positions);
        let bend = self.elastic.bend(&positions);
        for (g, (s, b)) in gradient
            .iter_mut()
            .zip(stretch.gradient.iter().zip(&bend.gradient))
        {
            *g += s + b;
        }

        if stretch.skipped > 0 || bend.skipped > 0 {
            warn!(
                edges = stretch.skipped,
                hinges = bend.skipped,
                "Skipped degenerate elements"
            );
        }

        let terms = EnergyTerms {
            mismatch,
            stretch: stretch.energy,
            bend: bend.energy,
        };
        let diagnostics = Diagnostics {
            degenerate_edges: self.elastic.degenerate_rest_edges() + stretch.skipped,
            degenerate_hinges: self.elastic.degenerate_rest_hinges() + bend.skipped,
            skipped_cells: self.diagnostics.skipped_cells,
            non_manifold_edges: self.elastic.non_manifold_edges(),
            points_outside_domain: outside,
        };

        debug!(
            value = terms.total(),
            mismatch = terms.mismatch,
            stretch = terms.stretch,
            bend = terms.bend,
            max_distance,
            "Thin-shell evaluation"
        );

        self.working = positions;
        self.diagnostics = diagnostics;

        Ok(Evaluation {
            value: terms.total(),
            gradient,
            terms,
            diagnostics,
            max_distance,
            mean_distance,
        })
    }

    /// Value only.
    ///
    /// # Errors
    ///
    /// Same as [`evaluate`](Self::evaluate).
    pub fn value<T>(&mut self, transform: &T) -> MetricResult<f64>
    where
        T: PointTransform + ?Sized,
    {
        self.evaluate(transform).map(|e| e.value)
    }

    /// Search correspondences again from the current moving points,
    /// regardless of the refresh policy.
    ///
    /// # Errors
    ///
    /// Returns [`MetricError::CorrespondenceFailure`] if a point has no
    /// closest point.
    pub fn refresh_correspondences(&mut self) -> MetricResult<()> {
        self.matching
            .rebuild(&self.locator, &self.features, &self.working)?;
        Ok(())
    }

    /// Moving points as of the latest evaluation (untransformed before the
    /// first one).
    #[inline]
    #[must_use]
    pub fn virtual_domain_points(&self) -> &[Point3<f64>] {
        &self.working
    }

    /// Diagnostics of the latest evaluation, or of initialization.
    #[inline]
    #[must_use]
    pub const fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    /// Current correspondences.
    #[inline]
    #[must_use]
    pub fn correspondences(&self) -> &[Correspondence] {
        self.matching.correspondences()
    }

    /// Parameters the metric was initialized with.
    #[inline]
    #[must_use]
    pub const fn params(&self) -> &ThinShellParams {
        &self.params
    }

    /// Virtual domain.
    #[inline]
    #[must_use]
    pub const fn virtual_domain(&self) -> &VirtualDomain {
        &self.domain
    }

    /// Rest-state edge and hinge tables.
    #[inline]
    #[must_use]
    pub const fn elastic_model(&self) -> &ElasticModel {
        &self.elastic
    }

    /// Spatial index over the fixed surface.
    #[inline]
    #[must_use]
    pub const fn locator(&self) -> &SurfaceLocator {
        &self.locator
    }

    /// Number of correspondence searches run so far, initialization included.
    #[inline]
    #[must_use]
    pub const fn correspondence_passes(&self) -> usize {
        self.matching.pass_count()
    }

    /// The fixed mesh.
    #[inline]
    #[must_use]
    pub const fn fixed(&self) -> &'a IndexedMesh {
        self.fixed
    }

    /// The moving mesh, untransformed.
    #[inline]
    #[must_use]
    pub const fn moving(&self) -> &'a IndexedMesh {
        self.moving
    }
}

fn validate_mesh(mesh: &IndexedMesh, role: MeshRole) -> Result<(), InvalidMeshError> {
    let point_count = mesh.vertices.len();
    if point_count == 0 {
        return Err(InvalidMeshError::EmptyMesh { role });
    }

    for (cell, face) in mesh.faces.iter().enumerate() {
        if let Some(&index) = face.iter().find(|&&i| i as usize >= point_count) {
            return Err(InvalidMeshError::CellIndexOutOfRange {
                role,
                cell,
                index,
                point_count,
            });
        }
    }

    if mesh.adjacency().valid_cells().is_empty() {
        return Err(InvalidMeshError::NoValidCells { role });
    }
    Ok(())
}

fn skipped_cells(fixed: &IndexedMesh, moving: &IndexedMesh) -> usize {
    let skipped = fixed.adjacency().degenerate_cell_count();
    if std::ptr::eq(fixed, moving) {
        skipped
    } else {
        skipped + moving.adjacency().degenerate_cell_count()
    }
}

/// How the mismatch weights of one evaluation relate to its positions.
#[derive(Clone, Copy)]
enum WeightDependence<'f> {
    /// Computed from other positions; constant here.
    Frozen,
    /// Computed from these positions in this evaluation.
    Live {
        confidence: ConfidenceWeighting,
        features: &'f GeometricFeatures,
    },
}

/// Weighted squared distance to the targets, its gradient, and the largest
/// and mean target distance.
///
/// Target motion needs no term: the offset to the closest point is normal to
/// the direction the closest point can slide.
#[allow(clippy::cast_precision_loss)]
fn mismatch_term(
    positions: &[Point3<f64>],
    correspondences: &[Correspondence],
    weights: WeightDependence<'_>,
) -> (f64, Vec<Vector3<f64>>, f64, f64) {
    // Largest squared distance of the pass and the first point that has it.
    let (argmax, max_squared) = correspondences
        .iter()
        .enumerate()
        .fold((0, 0.0_f64), |(best, max), (i, c)| {
            if c.hit.distance_squared > max {
                (i, c.hit.distance_squared)
            } else {
                (best, max)
            }
        });

    let inv_sigma_squared = match weights {
        WeightDependence::Live {
            confidence: ConfidenceWeighting::Gaussian { sigma },
            ..
        } => 1.0 / (sigma * sigma),
        WeightDependence::Live {
            confidence: ConfidenceWeighting::MaximalDistance,
            ..
        } if max_squared > 0.0 => 1.0 / max_squared,
        _ => 0.0,
    };

    let per_point: Vec<(f64, Vector3<f64>, f64)> = positions
        .par_iter()
        .zip(correspondences.par_iter())
        .enumerate()
        .map(|(point, (x, c))| {
            let offset = x - c.target();
            let weight = c.weight();
            let squared = offset.norm_squared();
            let mut gradient = offset * (2.0 * weight);
            if let WeightDependence::Live { features, .. } = weights {
                // d/dx of exp(-d²/(2σ²)) is -c (x - y) / σ².
                gradient -= offset * (weight * squared * inv_sigma_squared);
                gradient += features.factor_gradient(point, &c.hit) * (c.confidence * squared);
            }
            (weight * squared, gradient, squared)
        })
        .collect();

    let mut energy = 0.0;
    let mut max_distance = 0.0_f64;
    let mut distance_sum = 0.0;
    let mut sigma_sensitivity = 0.0;
    let mut gradient = Vec::with_capacity(per_point.len());
    for (e, g, squared) in per_point {
        energy += e;
        sigma_sensitivity += e * squared;
        let d = squared.sqrt();
        max_distance = max_distance.max(d);
        distance_sum += d;
        gradient.push(g);
    }

    // The adaptive sigma moves with the farthest point.
    let adaptive = matches!(
        weights,
        WeightDependence::Live {
            confidence: ConfidenceWeighting::MaximalDistance,
            ..
        }
    );
    if adaptive && max_squared > 0.0 {
        let offset = positions[argmax] - correspondences[argmax].target();
        gradient[argmax] += offset * (sigma_sensitivity * inv_sigma_squared * inv_sigma_squared);
    }

    let mean_distance = if gradient.is_empty() {
        0.0
    } else {
        distance_sum / gradient.len() as f64
    };
    (energy, gradient, max_distance, mean_distance)
}
