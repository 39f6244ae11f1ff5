//! Metric configuration.

use crate::{MetricError, MetricResult};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Sigma used when confidence weighting is switched on without one.
pub const DEFAULT_CONFIDENCE_SIGMA: f64 = 1.0;

/// How correspondence distance is turned into a mismatch weight.
///
/// Every variant is non-increasing in distance.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ConfidenceWeighting {
    /// Every correspondence has weight 1.
    #[default]
    Disabled,
    /// `exp(-d² / (2σ²))` with a fixed `sigma`.
    Gaussian {
        /// Falloff width, in mesh units.
        sigma: f64,
    },
    /// Gaussian falloff whose sigma is the largest correspondence distance
    /// of the current pass.
    MaximalDistance,
}

/// When correspondences are recomputed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum CorrespondenceRefresh {
    /// Rebuild at the start of every evaluation.
    #[default]
    EveryIteration,
    /// Compute once at initialization from the untransformed moving mesh and
    /// reuse for every evaluation.
    Fixed,
}

/// Which configuration supplies rest edge lengths and rest dihedral angles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum RestState {
    /// Fixed mesh positions and cells. Requires one fixed point per moving point.
    #[default]
    FixedMesh,
    /// The moving mesh before any transform is applied.
    MovingMesh,
}

/// Parameters for the thin-shell demons metric.
///
/// # Example
///
/// ```
/// use mesh_demons::{CorrespondenceRefresh, ThinShellParams};
///
/// let params = ThinShellParams::new()
///     .with_stretch_weight(1.0)
///     .with_bend_weight(5.0)
///     .with_geometric_feature_weight(10.0)
///     .with_confidence_weighting(true)
///     .with_adaptive_sigma(true)
///     .with_refresh(CorrespondenceRefresh::Fixed);
///
/// assert!(params.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ThinShellParams {
    /// Weight of the edge-stretch term (default: 1.0).
    pub stretch_weight: f64,
    /// Weight of the bending term (default: 1.0).
    pub bend_weight: f64,
    /// Curvature-mismatch falloff applied to the mismatch weights
    /// (default: 0.0, disabled).
    pub geometric_feature_weight: f64,
    /// Confidence weighting of the mismatch term (default: off).
    pub confidence_weighting: bool,
    /// Calibrate the confidence sigma to the largest correspondence distance
    /// of each pass. Only read while `confidence_weighting` is on
    /// (default: off).
    pub adaptive_sigma: bool,
    /// Fixed Gaussian sigma used when `adaptive_sigma` is off
    /// (default: [`DEFAULT_CONFIDENCE_SIGMA`]).
    pub confidence_sigma: f64,
    /// Correspondence refresh policy (default: every iteration).
    pub refresh: CorrespondenceRefresh,
    /// Source of the elastic rest state (default: fixed mesh).
    pub rest_state: RestState,
    /// Squared-length and squared-area floor below which elastic elements
    /// are skipped as degenerate (default: 1e-12).
    pub degenerate_epsilon: f64,
    /// Fixed meshes with fewer triangles than this use a linear scan instead
    /// of a BVH (default: 500).
    pub linear_scan_threshold: usize,
}

impl Default for ThinShellParams {
    fn default() -> Self {
        Self {
            stretch_weight: 1.0,
            bend_weight: 1.0,
            geometric_feature_weight: 0.0,
            confidence_weighting: false,
            adaptive_sigma: false,
            confidence_sigma: DEFAULT_CONFIDENCE_SIGMA,
            refresh: CorrespondenceRefresh::EveryIteration,
            rest_state: RestState::FixedMesh,
            degenerate_epsilon: 1e-12,
            linear_scan_threshold: 500,
        }
    }
}

impl ThinShellParams {
    /// Creates parameters with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the stretch weight.
    #[must_use]
    pub const fn with_stretch_weight(mut self, weight: f64) -> Self {
        self.stretch_weight = weight;
        self
    }

    /// Sets the bend weight.
    #[must_use]
    pub const fn with_bend_weight(mut self, weight: f64) -> Self {
        self.bend_weight = weight;
        self
    }

    /// Sets the geometric-feature weight.
    #[must_use]
    pub const fn with_geometric_feature_weight(mut self, weight: f64) -> Self {
        self.geometric_feature_weight = weight;
        self
    }

    /// Sets the confidence weighting strategy.
    ///
    /// Overwrites both confidence flags and, for a Gaussian, the sigma.
    #[must_use]
    pub const fn with_confidence(mut self, confidence: ConfidenceWeighting) -> Self {
        match confidence {
            ConfidenceWeighting::Disabled => {
                self.confidence_weighting = false;
                self.adaptive_sigma = false;
            }
            ConfidenceWeighting::Gaussian { sigma } => {
                self.confidence_weighting = true;
                self.adaptive_sigma = false;
                self.confidence_sigma = sigma;
            }
            ConfidenceWeighting::MaximalDistance => {
                self.confidence_weighting = true;
                self.adaptive_sigma = true;
            }
        }
        self
    }

    /// Turns confidence weighting on or off.
    #[must_use]
    pub const fn with_confidence_weighting(mut self, enabled: bool) -> Self {
        self.confidence_weighting = enabled;
        self
    }

    /// Calibrates sigma to the maximal correspondence distance of each pass.
    ///
    /// Independent of [`with_confidence_weighting`](Self::with_confidence_weighting):
    /// the flag is kept while weighting is off and takes effect once it is
    /// switched on.
    #[must_use]
    pub const fn with_adaptive_sigma(mut self, enabled: bool) -> Self {
        self.adaptive_sigma = enabled;
        self
    }

    /// Sets the fixed Gaussian sigma.
    #[must_use]
    pub const fn with_confidence_sigma(mut self, sigma: f64) -> Self {
        self.confidence_sigma = sigma;
        self
    }

    /// The confidence strategy the two flags and the sigma select.
    #[must_use]
    pub const fn confidence(&self) -> ConfidenceWeighting {
        match (self.confidence_weighting, self.adaptive_sigma) {
            (false, _) => ConfidenceWeighting::Disabled,
            (true, true) => ConfidenceWeighting::MaximalDistance,
            (true, false) => ConfidenceWeighting::Gaussian {
                sigma: self.confidence_sigma,
            },
        }
    }

    /// Sets the correspondence refresh policy.
    #[must_use]
    pub const fn with_refresh(mut self, refresh: CorrespondenceRefresh) -> Self {
        self.refresh = refresh;
        self
    }

    /// Sets the rest-state source.
    #[must_use]
    pub const fn with_rest_state(mut self, rest_state: RestState) -> Self {
        self.rest_state = rest_state;
        self
    }

    /// Sets the degeneracy epsilon.
    #[must_use]
    pub const fn with_degenerate_epsilon(mut self, epsilon: f64) -> Self {
        self.degenerate_epsilon = epsilon;
        self
    }

    /// Sets the triangle count below which correspondence search is linear.
    #[must_use]
    pub const fn with_linear_scan_threshold(mut self, threshold: usize) -> Self {
        self.linear_scan_threshold = threshold;
        self
    }

    /// Checks that every weight is finite and non-negative and that any
    /// configured sigma is positive.
    ///
    /// # Errors
    ///
    /// Returns [`MetricError::InvalidParameter`] naming the first bad value.
    pub fn validate(&self) -> MetricResult<()> {
        for (name, value) in [
            ("stretch_weight", self.stretch_weight),
            ("bend_weight", self.bend_weight),
            ("geometric_feature_weight", self.geometric_feature_weight),
            ("degenerate_epsilon", self.degenerate_epsilon),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(MetricError::InvalidParameter(format!(
                    "{name} must be finite and non-negative, got {value}"
                )));
            }
        }

        if let ConfidenceWeighting::Gaussian { sigma } = self.confidence() {
            if !sigma.is_finite() || sigma <= 0.0 {
                return Err(MetricError::InvalidParameter(format!(
                    "confidence sigma must be finite and positive, got {sigma}"
                )));
            }
        }

        Ok(())
    }
}
