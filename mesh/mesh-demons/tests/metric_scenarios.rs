//! End-to-end scenarios for the thin-shell demons metric.
//!
//! Run with: cargo test -p mesh-demons --test metric_scenarios

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]

use approx::assert_relative_eq;
use mesh_demons::{
    AffineTransform, ConfidenceWeighting, CorrespondenceRefresh, Evaluation, InvalidMeshError,
    IterationReporter, MeshRole, MetricError, RestState, RigidTransform, ThinShellDemonsMetric,
    ThinShellParams, TracingReporter, VirtualDomain,
};
use mesh_types::{IndexedMesh, Point3, Vector3, grid_mesh};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

// =============================================================================
// Fixtures
// =============================================================================

/// Grid lifted onto a gentle wave so hinges have non-zero rest angles.
fn wavy_sheet(cols: usize, rows: usize) -> IndexedMesh {
    let mut mesh = grid_mesh(cols, rows, 0.5);
    for v in &mut mesh.vertices {
        let p = &mut v.position;
        p.z = 0.2 * (1.3 * p.x).sin() * (0.9 * p.y).cos();
    }
    mesh
}

fn jittered(mesh: &IndexedMesh, seed: u64, amount: f64) -> IndexedMesh {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut out = mesh.clone();
    for v in &mut out.vertices {
        v.position += Vector3::new(
            rng.gen_range(-amount..amount),
            rng.gen_range(-amount..amount),
            rng.gen_range(-amount..amount),
        );
    }
    out
}

fn domain_for(mesh: &IndexedMesh) -> VirtualDomain {
    VirtualDomain::enclosing(&mesh.positions(), 2.0).unwrap()
}

fn identity() -> RigidTransform {
    RigidTransform::identity()
}

// =============================================================================
// Energy scenarios
// =============================================================================

#[test]
fn zero_deformation_has_zero_energy() {
    let mesh = wavy_sheet(4, 3);
    let params = ThinShellParams::default().with_refresh(CorrespondenceRefresh::Fixed);
    let mut metric =
        ThinShellDemonsMetric::initialize(&mesh, &mesh, domain_for(&mesh), params).unwrap();

    let evaluation = metric.evaluate(&identity()).unwrap();
    assert_eq!(evaluation.terms.stretch, 0.0);
    assert!(evaluation.terms.bend < 1e-20);
    assert!(evaluation.terms.mismatch < 1e-18);
    assert!(evaluation.max_distance < 1e-9);
    assert!(evaluation.gradient.iter().all(|g| g.norm() < 1e-9));

    for (c, p) in metric.correspondences().iter().zip(mesh.positions()) {
        assert_relative_eq!(*c.target(), p, epsilon = 1e-9);
    }
}

#[test]
fn undone_translation_has_zero_energy() {
    // 2x2 grid of 8 triangles.
    let fixed = grid_mesh(2, 2, 1.0);
    assert_eq!(fixed.faces.len(), 8);

    let offset = Vector3::new(3.0, -2.0, 1.5);
    let mut moving = fixed.clone();
    moving.translate(offset);

    let params = ThinShellParams::default().with_refresh(CorrespondenceRefresh::EveryIteration);
    let domain = VirtualDomain::enclosing(&fixed.positions(), 1.0).unwrap();
    let mut metric = ThinShellDemonsMetric::initialize(&fixed, &moving, domain, params).unwrap();

    let evaluation = metric
        .evaluate(&RigidTransform::from_translation(-offset))
        .unwrap();
    assert!(evaluation.terms.mismatch.abs() < 1e-12);
    assert!(evaluation.value.abs() < 1e-12);
    assert_eq!(evaluation.diagnostics.points_outside_domain, 0);
}

#[test]
fn uniform_stretch_matches_closed_form() {
    let reference = grid_mesh(2, 2, 1.0);
    let edge_count = reference.adjacency().edge_count();
    assert_eq!(edge_count, 16);

    for (weight, scale) in [(1.0, 1.5), (2.0, 0.5), (0.25, 2.0)] {
        let params = ThinShellParams::default().with_stretch_weight(weight);
        let domain = domain_for(&reference);
        let mut metric =
            ThinShellDemonsMetric::initialize(&reference, &reference, domain, params).unwrap();

        let evaluation = metric.evaluate(&RigidTransform::from_scale(scale)).unwrap();
        #[allow(clippy::cast_precision_loss)]
        let expected = weight * (scale - 1.0) * (scale - 1.0) * edge_count as f64;
        assert_relative_eq!(evaluation.terms.stretch, expected, max_relative = 1e-12);
        assert!(evaluation.terms.bend.abs() < 1e-20);
    }
}

#[test]
fn rigid_motion_costs_no_elastic_energy() {
    let mesh = wavy_sheet(3, 3);
    let mut metric = ThinShellDemonsMetric::initialize(
        &mesh,
        &mesh,
        domain_for(&mesh),
        ThinShellParams::default(),
    )
    .unwrap();

    let rotation = nalgebra::UnitQuaternion::from_euler_angles(0.3, -0.2, 0.7);
    let motion = RigidTransform::new(rotation, Vector3::new(0.1, 0.2, -0.3));
    let evaluation = metric.evaluate(&motion).unwrap();
    assert!(evaluation.terms.stretch < 1e-20);
    assert!(evaluation.terms.bend < 1e-20);
    assert!(evaluation.terms.mismatch > 0.0);
}

// =============================================================================
// Gradient
// =============================================================================

#[test]
fn gradient_matches_central_difference() {
    let fixed = wavy_sheet(4, 3);
    let moving = jittered(&fixed, 11, 0.05);

    let params = ThinShellParams::default()
        .with_stretch_weight(0.7)
        .with_bend_weight(0.3)
        .with_geometric_feature_weight(0.5)
        .with_confidence(ConfidenceWeighting::Gaussian { sigma: 0.5 })
        .with_refresh(CorrespondenceRefresh::Fixed);
    let mut metric =
        ThinShellDemonsMetric::initialize(&fixed, &moving, domain_for(&fixed), params).unwrap();

    let mut rng = StdRng::seed_from_u64(3);
    let base: Vec<Point3<f64>> = moving
        .positions()
        .into_iter()
        .map(|p| p + Vector3::new(rng.gen_range(-0.02..0.02), 0.0, rng.gen_range(-0.02..0.02)))
        .collect();
    let evaluation = metric.evaluate_points(base.clone()).unwrap();
    assert!(evaluation.diagnostics.is_clean());

    let h = 1e-6;
    for i in 0..base.len() {
        for axis in 0..3 {
            let mut plus = base.clone();
            plus[i][axis] += h;
            let mut minus = base.clone();
            minus[i][axis] -= h;
            let numeric = (metric.evaluate_points(plus).unwrap().value
                - metric.evaluate_points(minus).unwrap().value)
                / (2.0 * h);
            let analytic = evaluation.gradient[i][axis];
            assert!(
                (numeric - analytic).abs() <= 1e-5 * (1.0 + analytic.abs()),
                "point {i} axis {axis}: numeric {numeric} analytic {analytic}"
            );
        }
    }
    // Fixed policy never searched again.
    assert_eq!(metric.correspondence_passes(), 1);
}

/// Central differences of `metric` at `base` against `analytic`, every point
/// and axis.
fn assert_gradient_matches(
    metric: &mut ThinShellDemonsMetric<'_>,
    base: &[Point3<f64>],
    analytic: &[Vector3<f64>],
) {
    let h = 1e-6;
    for i in 0..base.len() {
        for axis in 0..3 {
            let mut plus = base.to_vec();
            plus[i][axis] += h;
            let mut minus = base.to_vec();
            minus[i][axis] -= h;
            let numeric = (metric.evaluate_points(plus).unwrap().value
                - metric.evaluate_points(minus).unwrap().value)
                / (2.0 * h);
            let expected = analytic[i][axis];
            assert!(
                (numeric - expected).abs() <= 1e-5 * (1.0 + expected.abs()),
                "point {i} axis {axis}: numeric {numeric} analytic {expected}"
            );
        }
    }
}

#[test]
#[allow(clippy::cast_precision_loss)]
fn refreshed_gaussian_weights_are_differentiated() {
    let fixed = grid_mesh(2, 2, 1.0);
    let params = ThinShellParams::default()
        .with_stretch_weight(0.0)
        .with_bend_weight(0.0)
        .with_confidence(ConfidenceWeighting::Gaussian { sigma: 0.5 });
    let mut metric =
        ThinShellDemonsMetric::initialize(&fixed, &fixed, domain_for(&fixed), params).unwrap();

    let base: Vec<Point3<f64>> = fixed
        .positions()
        .into_iter()
        .enumerate()
        .map(|(i, p)| Point3::new(p.x, p.y, 0.05f64.mul_add(i as f64, 0.3)))
        .collect();
    let evaluation = metric.evaluate_points(base.clone()).unwrap();

    // Point 5 sits at d = 0.55: 2 w d (1 - d²/(2σ²)).
    let d = 0.55_f64;
    let w = (-d * d / 0.5).exp();
    assert_relative_eq!(
        evaluation.gradient[5].z,
        2.0 * w * d * (1.0 - d * d / 0.5),
        epsilon = 1e-12
    );

    assert_gradient_matches(&mut metric, &base, &evaluation.gradient);
}

#[test]
fn refreshed_weights_and_features_are_differentiated() {
    let fixed = wavy_sheet(4, 3);
    let moving = jittered(&fixed, 11, 0.05);

    for confidence in [
        ConfidenceWeighting::Gaussian { sigma: 0.4 },
        ConfidenceWeighting::MaximalDistance,
    ] {
        let params = ThinShellParams::default()
            .with_stretch_weight(0.7)
            .with_bend_weight(0.3)
            .with_geometric_feature_weight(0.5)
            .with_confidence(confidence);
        let mut metric =
            ThinShellDemonsMetric::initialize(&fixed, &moving, domain_for(&fixed), params)
                .unwrap();

        let mut rng = StdRng::seed_from_u64(9);
        let base: Vec<Point3<f64>> = moving
            .positions()
            .into_iter()
            .map(|p| {
                p + Vector3::new(
                    rng.gen_range(-0.02..0.02),
                    rng.gen_range(-0.02..0.02),
                    rng.gen_range(0.1..0.2),
                )
            })
            .collect();
        let evaluation = metric.evaluate_points(base.clone()).unwrap();
        assert!(evaluation.diagnostics.is_clean());
        assert!(metric.correspondences().iter().any(|c| c.feature < 1.0));

        assert_gradient_matches(&mut metric, &base, &evaluation.gradient);
    }
}

#[test]
fn affine_descent_reduces_value() {
    let fixed = grid_mesh(4, 4, 0.25);
    let mut moving = fixed.clone();
    moving.translate(Vector3::new(0.1, -0.05, 0.5));
    let moving_points = moving.positions();

    let params = ThinShellParams::default()
        .with_stretch_weight(0.1)
        .with_bend_weight(0.1);
    let mut metric =
        ThinShellDemonsMetric::initialize(&fixed, &moving, domain_for(&fixed), params).unwrap();

    let centroid = Point3::from(
        moving_points.iter().map(|p| p.coords).sum::<Vector3<f64>>() / 25.0,
    );
    let mut transform = AffineTransform::identity().with_center(centroid);
    let initial = metric.evaluate(&transform).unwrap().value;

    for _ in 0..40 {
        let evaluation = metric.evaluate(&transform).unwrap();
        let gradient = transform.parameter_gradient(&moving_points, &evaluation.gradient);
        let mut parameters = transform.parameters();
        for (p, g) in parameters.iter_mut().zip(gradient) {
            *p -= 0.01 * g;
        }
        transform.set_parameters(&parameters).unwrap();
    }

    let last = metric.evaluate(&transform).unwrap();
    assert!(last.value < 0.02 * initial, "{} vs {initial}", last.value);
}

// =============================================================================
// Feature matching policy
// =============================================================================

#[test]
fn fixed_correspondences_do_not_follow_the_surface() {
    let mesh = grid_mesh(4, 4, 0.25);
    let slide = RigidTransform::from_translation(Vector3::new(0.05, 0.05, 0.0));

    let fixed_policy = ThinShellParams::default().with_refresh(CorrespondenceRefresh::Fixed);
    let mut fixed_metric =
        ThinShellDemonsMetric::initialize(&mesh, &mesh, domain_for(&mesh), fixed_policy).unwrap();
    let with_fixed = fixed_metric.evaluate(&slide).unwrap();
    assert_relative_eq!(with_fixed.terms.mismatch, 25.0 * 0.005, max_relative = 1e-9);
    assert_eq!(fixed_metric.correspondence_passes(), 1);

    let mut live_metric = ThinShellDemonsMetric::initialize(
        &mesh,
        &mesh,
        domain_for(&mesh),
        ThinShellParams::default(),
    )
    .unwrap();
    let with_refresh = live_metric.evaluate(&slide).unwrap();
    assert!(with_refresh.terms.mismatch < with_fixed.terms.mismatch);
    assert_eq!(live_metric.correspondence_passes(), 2);
}

#[test]
fn adaptive_confidence_downweights_far_points() {
    let fixed = grid_mesh(2, 2, 1.0);
    let mut moving = fixed.clone();
    // One point well off the surface.
    moving.vertices[4].position.z = 2.0;

    let params = ThinShellParams::default()
        .with_rest_state(RestState::MovingMesh)
        .with_adaptive_sigma(true)
        .with_confidence_weighting(true);
    let metric =
        ThinShellDemonsMetric::initialize(&fixed, &moving, domain_for(&fixed), params).unwrap();

    let c = metric.correspondences();
    assert_relative_eq!(c[4].confidence, (-0.5f64).exp(), epsilon = 1e-12);
    assert!(c.iter().enumerate().all(|(i, c)| i == 4 || c.confidence == 1.0));
}

#[test]
fn curvature_features_downweight_dissimilar_matches() {
    let fixed = grid_mesh(4, 4, 0.5);
    let mut moving = fixed.clone();
    for v in &mut moving.vertices {
        let p = &mut v.position;
        p.z = 0.4 * (2.0 * p.x).sin() * (2.0 * p.y).sin();
    }

    let plain = ThinShellParams::default().with_rest_state(RestState::MovingMesh);
    let featured = plain.clone().with_geometric_feature_weight(4.0);

    let mut without = ThinShellDemonsMetric::initialize(&fixed, &moving, domain_for(&fixed), plain)
        .unwrap();
    let mut with = ThinShellDemonsMetric::initialize(&fixed, &moving, domain_for(&fixed), featured)
        .unwrap();

    assert!(with.correspondences().iter().any(|c| c.feature < 0.99));
    assert!(with.correspondences().iter().all(|c| c.feature <= 1.0));
    let a = without.evaluate(&identity()).unwrap().terms.mismatch;
    let b = with.evaluate(&identity()).unwrap().terms.mismatch;
    assert!(b < a);
}

// =============================================================================
// Determinism and diagnostics
// =============================================================================

#[test]
fn repeated_evaluation_is_reproducible() {
    let fixed = wavy_sheet(6, 6);
    let moving = jittered(&fixed, 5, 0.1);
    // Zero threshold forces the hierarchy even on a small mesh.
    let params = ThinShellParams::default().with_linear_scan_threshold(0);
    let mut metric =
        ThinShellDemonsMetric::initialize(&fixed, &moving, domain_for(&fixed), params).unwrap();
    assert!(metric.locator().is_accelerated());

    let motion = RigidTransform::from_translation(Vector3::new(0.02, -0.01, 0.03));
    let first = metric.evaluate(&motion).unwrap();
    let second = metric.evaluate(&motion).unwrap();
    assert_relative_eq!(first.value, second.value, max_relative = 1e-12);
    for (a, b) in first.gradient.iter().zip(&second.gradient) {
        assert_relative_eq!(*a, *b, epsilon = 1e-12);
    }

    for p in metric.virtual_domain_points() {
        let fast = metric.locator().closest_point(p).unwrap();
        let slow = metric.locator().closest_point_linear(p).unwrap();
        assert_eq!(fast.cell, slow.cell);
        assert_eq!(fast.distance_squared, slow.distance_squared);
    }
}

#[test]
fn collapsed_geometry_is_counted_not_fatal() {
    let mesh = grid_mesh(2, 2, 1.0);
    let mut metric = ThinShellDemonsMetric::initialize(
        &mesh,
        &mesh,
        domain_for(&mesh),
        ThinShellParams::default(),
    )
    .unwrap();

    // Drop point 0 onto point 1, collapsing edge 0-1 and cell [0, 1, 4].
    let collapse = |p: &Point3<f64>| {
        if *p == Point3::origin() {
            Point3::new(1.0, 0.0, 0.0)
        } else {
            *p
        }
    };
    let evaluation = metric.evaluate(&collapse).unwrap();
    assert!(evaluation.value.is_finite());
    assert!(evaluation.gradient.iter().all(|g| g.iter().all(|c| c.is_finite())));
    assert!(evaluation.diagnostics.degenerate_edges >= 1);
    assert!(evaluation.diagnostics.degenerate_hinges >= 1);
    assert!(!metric.diagnostics().is_clean());
}

#[test]
fn degenerate_cells_are_skipped() {
    let mut mesh = grid_mesh(2, 2, 1.0);
    mesh.faces.push([0, 0, 1]);
    let metric = ThinShellDemonsMetric::initialize(
        &mesh,
        &mesh,
        domain_for(&mesh),
        ThinShellParams::default(),
    )
    .unwrap();
    assert_eq!(metric.diagnostics().skipped_cells, 1);
    assert_eq!(metric.locator().triangle_count(), 8);
}

// =============================================================================
// Errors
// =============================================================================

#[test]
fn empty_meshes_are_rejected() {
    let mesh = grid_mesh(1, 1, 1.0);
    let empty = IndexedMesh::new();

    let err = ThinShellDemonsMetric::initialize(
        &mesh,
        &empty,
        domain_for(&mesh),
        ThinShellParams::default(),
    )
    .unwrap_err();
    assert_eq!(
        err,
        MetricError::InvalidMesh(InvalidMeshError::EmptyMesh {
            role: MeshRole::Moving
        })
    );

    let err = ThinShellDemonsMetric::initialize(
        &empty,
        &mesh,
        domain_for(&mesh),
        ThinShellParams::default(),
    )
    .unwrap_err();
    assert_eq!(
        err,
        MetricError::InvalidMesh(InvalidMeshError::EmptyMesh {
            role: MeshRole::Fixed
        })
    );
}

#[test]
fn rest_on_fixed_mesh_needs_matching_point_counts() {
    let fixed = grid_mesh(2, 2, 1.0);
    let moving = grid_mesh(3, 2, 1.0);

    let err = ThinShellDemonsMetric::initialize(
        &fixed,
        &moving,
        domain_for(&moving),
        ThinShellParams::default(),
    )
    .unwrap_err();
    assert_eq!(
        err,
        MetricError::InvalidMesh(InvalidMeshError::PointCountMismatch {
            fixed: 9,
            moving: 12
        })
    );

    let params = ThinShellParams::default().with_rest_state(RestState::MovingMesh);
    let metric =
        ThinShellDemonsMetric::initialize(&fixed, &moving, domain_for(&moving), params).unwrap();
    assert_eq!(metric.virtual_domain_points().len(), 12);
}

#[test]
fn non_finite_points_fail_correspondence() {
    let mesh = grid_mesh(2, 2, 1.0);
    let mut metric = ThinShellDemonsMetric::initialize(
        &mesh,
        &mesh,
        domain_for(&mesh),
        ThinShellParams::default(),
    )
    .unwrap();
    let mut positions = mesh.positions();
    positions[5].y = f64::NAN;
    let err = metric.evaluate_points(positions).unwrap_err();
    assert_eq!(err, MetricError::CorrespondenceFailure { point: 5 });
}

// =============================================================================
// Reporting
// =============================================================================

#[test]
fn caller_drives_reporters() {
    let fixed = grid_mesh(3, 3, 1.0);
    let mut moving = fixed.clone();
    moving.translate(Vector3::new(0.0, 0.0, 1.0));
    let mut metric = ThinShellDemonsMetric::initialize(
        &fixed,
        &moving,
        domain_for(&fixed),
        ThinShellParams::default(),
    )
    .unwrap();

    let mut history = Vec::new();
    let mut tracing_reporter = TracingReporter::default();
    {
        let mut record = |_: usize, e: &Evaluation| history.push(e.value);
        for (iteration, dz) in [0.0, -0.5, -1.0].into_iter().enumerate() {
            let step = RigidTransform::from_translation(Vector3::new(0.0, 0.0, dz));
            let evaluation = metric.evaluate(&step).unwrap();
            record.report(iteration, &evaluation);
            tracing_reporter.report(iteration, &evaluation);
        }
    }

    assert_eq!(tracing_reporter.reported(), 3);
    assert_eq!(history.len(), 3);
    assert!(history[0] > history[1] && history[1] > history[2]);
    assert!(history[2].abs() < 1e-12);
}
