//! Thin-shell demons metric for deformable surface registration.
//!
//! This crate scores how well a transformed moving surface matches a fixed
//! one, and returns the gradient an optimizer needs to improve the match:
//! - **Correspondences** - closest points on the fixed surface through a
//!   bounding-volume hierarchy, weighted by distance confidence and an
//!   optional curvature-similarity factor
//! - **Thin-shell elasticity** - edge stretch and hinge bending relative to
//!   a rest configuration, with analytic gradients
//! - **Feature matching** - correspondences recomputed every evaluation or
//!   kept from initialization
//!
//! The optimizer and the transform parameterization live outside this
//! crate. A caller initializes [`ThinShellDemonsMetric`] once, then asks it
//! to [`evaluate`](ThinShellDemonsMetric::evaluate) under each new
//! transform.
//!
//! # Layer 0
//!
//! This is a Layer 0 crate with zero Bevy dependencies.
//!
//! # Quick Start
//!
//! ```
//! use mesh_demons::{
//!     AffineTransform, ConfidenceWeighting, ThinShellDemonsMetric, ThinShellParams,
//!     VirtualDomain,
//! };
//! use mesh_types::{Vector3, grid_mesh};
//!
//! let fixed = grid_mesh(4, 4, 0.25);
//! let mut moving = fixed.clone();
//! moving.translate(Vector3::new(0.0, 0.0, 0.3));
//!
//! let params = ThinShellParams::default()
//!     .with_stretch_weight(0.5)
//!     .with_bend_weight(0.1)
//!     .with_confidence(ConfidenceWeighting::MaximalDistance);
//! let domain = VirtualDomain::enclosing(&fixed.positions(), 1.0).unwrap();
//! let mut metric = ThinShellDemonsMetric::initialize(&fixed, &moving, domain, params).unwrap();
//!
//! // A few plain gradient steps on the affine parameters.
//! let mut transform = AffineTransform::identity();
//! let start = metric.evaluate(&transform).unwrap().value;
//! for _ in 0..20 {
//!     let evaluation = metric.evaluate(&transform).unwrap();
//!     let step = transform.parameter_gradient(&moving.positions(), &evaluation.gradient);
//!     let mut parameters = transform.parameters();
//!     for (p, g) in parameters.iter_mut().zip(step) {
//!         *p -= 0.01 * g;
//!     }
//!     transform.set_parameters(&parameters).unwrap();
//! }
//! assert!(metric.evaluate(&transform).unwrap().value < start);
//! ```
//!
//! # Degenerate geometry
//!
//! Collapsed edges and zero-area hinge wings are skipped, never fatal. The
//! count comes back in [`Evaluation::diagnostics`] so a long registration
//! can keep going and decide afterwards whether to trust the result.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![allow(clippy::module_name_repetitions)]

pub mod bvh;
pub mod features;

mod config;
mod correspondence;
mod domain;
mod elastic;
mod error;
mod matching;
mod metric;
mod polydata;
mod report;
mod transform;

pub use config::{
    ConfidenceWeighting, CorrespondenceRefresh, DEFAULT_CONFIDENCE_SIGMA, RestState,
    ThinShellParams,
};
pub use correspondence::{SurfaceHit, SurfaceLocator, confidence_weights, gaussian_confidence};
pub use domain::VirtualDomain;
pub use elastic::{
    EdgeRecord, ElasticModel, ElasticTerm, HingeRecord, dihedral_angle, dihedral_angle_gradient,
};
pub use error::{InvalidMeshError, MeshRole, MetricError, MetricResult};
pub use matching::{Correspondence, FeatureMatching, find_correspondences};
pub use metric::ThinShellDemonsMetric;
pub use polydata::{PolygonSurface, to_polygon_surface};
pub use report::{Diagnostics, EnergyTerms, Evaluation, IterationReporter, TracingReporter};
pub use transform::{AFFINE_PARAMETER_COUNT, AffineTransform, PointTransform, RigidTransform};
