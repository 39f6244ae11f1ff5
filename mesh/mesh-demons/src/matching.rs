//! Correspondence bookkeeping and refresh policy.

use mesh_types::Point3;
use rayon::prelude::*;
use tracing::debug;

use crate::correspondence::{SurfaceHit, SurfaceLocator, confidence_weights};
use crate::features::GeometricFeatures;
use crate::{ConfidenceWeighting, CorrespondenceRefresh, MetricError, MetricResult};

/// Where one moving point is pulled to, and how strongly.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Correspondence {
    /// Closest point on the fixed surface.
    pub hit: SurfaceHit,
    /// Distance-based confidence in `[0, 1]`.
    pub confidence: f64,
    /// Curvature-similarity factor in `[0, 1]`.
    pub feature: f64,
}

impl Correspondence {
    /// Combined mismatch weight.
    #[inline]
    #[must_use]
    pub fn weight(&self) -> f64 {
        self.confidence * self.feature
    }

    /// Target position on the fixed surface.
    #[inline]
    #[must_use]
    pub const fn target(&self) -> &Point3<f64> {
        &self.hit.point
    }
}

/// Find and weight a correspondence for every position.
///
/// Queries run in parallel. Confidence is computed only after every distance
/// is known, since the adaptive strategy depends on the largest.
///
/// # Errors
///
/// Returns [`MetricError::CorrespondenceFailure`] naming the lowest point
/// index for which the search found nothing.
pub fn find_correspondences(
    locator: &SurfaceLocator,
    features: &GeometricFeatures,
    confidence: ConfidenceWeighting,
    positions: &[Point3<f64>],
) -> MetricResult<Vec<Correspondence>> {
    let hits: Vec<Option<SurfaceHit>> = positions
        .par_iter()
        .map(|p| locator.closest_point(p))
        .collect();

    let hits = hits
        .into_iter()
        .enumerate()
        .map(|(point, hit)| hit.ok_or(MetricError::CorrespondenceFailure { point }))
        .collect::<MetricResult<Vec<_>>>()?;

    let distances: Vec<f64> = hits.iter().map(|h| h.distance_squared).collect();
    let weights = confidence_weights(confidence, &distances);

    Ok(hits
        .into_iter()
        .zip(weights)
        .enumerate()
        .map(|(point, (hit, confidence))| Correspondence {
            hit,
            confidence,
            feature: features.factor(point, &hit),
        })
        .collect())
}

/// Holds the current correspondences and decides when to recompute them.
///
/// # Example
///
/// ```
/// use mesh_demons::{ConfidenceWeighting, CorrespondenceRefresh, FeatureMatching, SurfaceLocator};
/// use mesh_demons::features::GeometricFeatures;
/// use mesh_types::{Point3, grid_mesh};
///
/// let plane = grid_mesh(2, 2, 1.0);
/// let locator = SurfaceLocator::new(&plane, 500);
/// let features = GeometricFeatures::default();
///
/// let mut matching =
///     FeatureMatching::new(CorrespondenceRefresh::Fixed, ConfidenceWeighting::Disabled);
/// let first = vec![Point3::new(0.5, 0.5, 1.0)];
/// matching.update(&locator, &features, &first).unwrap();
///
/// // Fixed policy: moving the point does not move its target.
/// let moved = vec![Point3::new(1.5, 1.5, 1.0)];
/// let c = matching.update(&locator, &features, &moved).unwrap();
/// assert_eq!(c[0].target(), &Point3::new(0.5, 0.5, 0.0));
/// assert_eq!(matching.pass_count(), 1);
/// ```
#[derive(Debug, Clone)]
pub struct FeatureMatching {
    refresh: CorrespondenceRefresh,
    confidence: ConfidenceWeighting,
    correspondences: Vec<Correspondence>,
    built: bool,
    passes: usize,
}

impl FeatureMatching {
    /// Empty state for the given policy.
    #[must_use]
    pub const fn new(refresh: CorrespondenceRefresh, confidence: ConfidenceWeighting) -> Self {
        Self {
            refresh,
            confidence,
            correspondences: Vec::new(),
            built: false,
            passes: 0,
        }
    }

    /// Refresh policy.
    #[inline]
    #[must_use]
    pub const fn refresh(&self) -> CorrespondenceRefresh {
        self.refresh
    }

    /// `true` once a pass has succeeded.
    #[inline]
    #[must_use]
    pub const fn is_built(&self) -> bool {
        self.built
    }

    /// Number of successful search passes.
    #[inline]
    #[must_use]
    pub const fn pass_count(&self) -> usize {
        self.passes
    }

    /// Current correspondences (empty until built).
    #[inline]
    #[must_use]
    pub fn correspondences(&self) -> &[Correspondence] {
        &self.correspondences
    }

    /// Correspondences for `positions` under the refresh policy.
    ///
    /// [`CorrespondenceRefresh::Fixed`] searches only if nothing has been
    /// built yet; [`CorrespondenceRefresh::EveryIteration`] always searches.
    ///
    /// # Errors
    ///
    /// Propagates [`MetricError::CorrespondenceFailure`] from the search.
    pub fn update(
        &mut self,
        locator: &SurfaceLocator,
        features: &GeometricFeatures,
        positions: &[Point3<f64>],
    ) -> MetricResult<&[Correspondence]> {
        if self.built && self.refresh == CorrespondenceRefresh::Fixed {
            return Ok(&self.correspondences);
        }
        self.rebuild(locator, features, positions)
    }

    /// Search again and replace the current correspondences.
    ///
    /// On error the previous correspondences, built flag and pass count are
    /// kept, so a failed refresh never changes what a `Fixed` policy reuses.
    ///
    /// # Errors
    ///
    /// Propagates [`MetricError::CorrespondenceFailure`] from the search.
    pub fn rebuild(
        &mut self,
        locator: &SurfaceLocator,
        features: &GeometricFeatures,
        positions: &[Point3<f64>],
    ) -> MetricResult<&[Correspondence]> {
        self.correspondences = find_correspondences(locator, features, self.confidence, positions)?;
        self.built = true;
        self.passes += 1;
        debug!(
            points = positions.len(),
            pass = self.passes,
            "Correspondences rebuilt"
        );
        Ok(&self.correspondences)
    }
}
