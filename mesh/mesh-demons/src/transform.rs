//! Transforms the metric can apply to moving points.
//!
//! The metric only needs [`PointTransform::transform_point`]. Parameterised
//! transforms additionally map the per-point gradient onto their own
//! parameters so a caller's optimizer can step them.

use mesh_types::{Point3, Vector3};
use nalgebra::{Matrix3, UnitQuaternion};

use crate::{MetricError, MetricResult};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Maps a moving point to its current position.
///
/// Must be `Sync`: points are transformed on the rayon pool.
pub trait PointTransform: Sync {
    /// Position of `point` under this transform.
    fn transform_point(&self, point: &Point3<f64>) -> Point3<f64>;
}

impl<F> PointTransform for F
where
    F: Fn(&Point3<f64>) -> Point3<f64> + Sync,
{
    fn transform_point(&self, point: &Point3<f64>) -> Point3<f64> {
        self(point)
    }
}

/// Rotation, translation and uniform scale, applied as scale, then rotate,
/// then translate.
///
/// # Example
///
/// ```
/// use mesh_demons::{PointTransform, RigidTransform};
/// use nalgebra::{Point3, UnitQuaternion, Vector3};
/// use std::f64::consts::FRAC_PI_2;
///
/// let rotation = UnitQuaternion::from_axis_angle(&Vector3::z_axis(), FRAC_PI_2);
/// let transform = RigidTransform::new(rotation, Vector3::new(1.0, 0.0, 0.0));
///
/// let p = transform.transform_point(&Point3::new(1.0, 0.0, 0.0));
/// assert!((p - Point3::new(1.0, 1.0, 0.0)).norm() < 1e-12);
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RigidTransform {
    /// Rotation as a unit quaternion.
    pub rotation: UnitQuaternion<f64>,
    /// Translation vector.
    pub translation: Vector3<f64>,
    /// Uniform scale factor (default 1.0).
    pub scale: f64,
}

impl Default for RigidTransform {
    fn default() -> Self {
        Self::identity()
    }
}

impl RigidTransform {
    /// Rotation and translation with unit scale.
    #[must_use]
    pub const fn new(rotation: UnitQuaternion<f64>, translation: Vector3<f64>) -> Self {
        Self {
            rotation,
            translation,
            scale: 1.0,
        }
    }

    /// Rotation, translation and scale.
    #[must_use]
    pub const fn with_scale(
        rotation: UnitQuaternion<f64>,
        translation: Vector3<f64>,
        scale: f64,
    ) -> Self {
        Self {
            rotation,
            translation,
            scale,
        }
    }

    /// The identity.
    #[must_use]
    pub fn identity() -> Self {
        Self::new(UnitQuaternion::identity(), Vector3::zeros())
    }

    /// Pure translation.
    #[must_use]
    pub fn from_translation(translation: Vector3<f64>) -> Self {
        Self::new(UnitQuaternion::identity(), translation)
    }

    /// Pure uniform scale about the origin.
    #[must_use]
    pub fn from_scale(scale: f64) -> Self {
        Self::with_scale(UnitQuaternion::identity(), Vector3::zeros(), scale)
    }

    /// The transform applying `other` first, then `self`.
    #[must_use]
    pub fn compose(&self, other: &Self) -> Self {
        Self {
            rotation: self.rotation * other.rotation,
            translation: self.translation + self.rotation * (other.translation * self.scale),
            scale: self.scale * other.scale,
        }
    }

    /// The inverse transform.
    #[must_use]
    pub fn inverse(&self) -> Self {
        let inv_scale = 1.0 / self.scale;
        let inv_rotation = self.rotation.inverse();
        Self {
            rotation: inv_rotation,
            translation: inv_rotation * (-self.translation * inv_scale),
            scale: inv_scale,
        }
    }

    /// The same map as an [`AffineTransform`] centred at the origin.
    #[must_use]
    pub fn to_affine(&self) -> AffineTransform {
        AffineTransform::new(
            self.rotation.to_rotation_matrix().into_inner() * self.scale,
            self.translation,
        )
    }
}

impl PointTransform for RigidTransform {
    fn transform_point(&self, point: &Point3<f64>) -> Point3<f64> {
        Point3::from(self.rotation * (point.coords * self.scale) + self.translation)
    }
}

/// Number of affine parameters.
pub const AFFINE_PARAMETER_COUNT: usize = 12;

/// `y = M (x - c) + c + t`.
///
/// The parameter vector is the nine matrix entries in row-major order
/// followed by the translation. The centre is fixed and not a parameter.
///
/// # Example
///
/// ```
/// use mesh_demons::{AffineTransform, PointTransform};
/// use nalgebra::{Matrix3, Point3, Vector3};
///
/// let t = AffineTransform::new(Matrix3::identity() * 2.0, Vector3::zeros())
///     .with_center(Point3::new(1.0, 1.0, 1.0));
/// let p = t.transform_point(&Point3::new(2.0, 1.0, 1.0));
/// assert!((p - Point3::new(3.0, 1.0, 1.0)).norm() < 1e-12);
/// assert_eq!(t.parameters()[0], 2.0);
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct AffineTransform {
    /// Linear part.
    pub matrix: Matrix3<f64>,
    /// Translation, applied after the linear part.
    pub translation: Vector3<f64>,
    /// Fixed point of the linear part.
    pub center: Point3<f64>,
}

impl Default for AffineTransform {
    fn default() -> Self {
        Self::identity()
    }
}

impl AffineTransform {
    /// Matrix and translation, centred at the origin.
    #[must_use]
    pub fn new(matrix: Matrix3<f64>, translation: Vector3<f64>) -> Self {
        Self {
            matrix,
            translation,
            center: Point3::origin(),
        }
    }

    /// The identity, centred at the origin.
    #[must_use]
    pub fn identity() -> Self {
        Self::new(Matrix3::identity(), Vector3::zeros())
    }

    /// Sets the centre.
    #[must_use]
    pub const fn with_center(mut self, center: Point3<f64>) -> Self {
        self.center = center;
        self
    }

    /// Build from a parameter vector and a centre.
    ///
    /// # Errors
    ///
    /// Returns [`MetricError::InvalidParameter`] unless `parameters` has
    /// exactly [`AFFINE_PARAMETER_COUNT`] entries.
    pub fn from_parameters(parameters: &[f64], center: Point3<f64>) -> MetricResult<Self> {
        let mut transform = Self::identity().with_center(center);
        transform.set_parameters(parameters)?;
        Ok(transform)
    }

    /// Current parameter vector.
    #[must_use]
    pub fn parameters(&self) -> [f64; AFFINE_PARAMETER_COUNT] {
        let mut p = [0.0; AFFINE_PARAMETER_COUNT];
        for r in 0..3 {
            for c in 0..3 {
                p[3 * r + c] = self.matrix[(r, c)];
            }
            p[9 + r] = self.translation[r];
        }
        p
    }

    /// Replace matrix and translation from a parameter vector.
    ///
    /// # Errors
    ///
    /// Returns [`MetricError::InvalidParameter`] unless `parameters` has
    /// exactly [`AFFINE_PARAMETER_COUNT`] entries.
    pub fn set_parameters(&mut self, parameters: &[f64]) -> MetricResult<()> {
        if parameters.len() != AFFINE_PARAMETER_COUNT {
            return Err(MetricError::InvalidParameter(format!(
                "affine transform takes {AFFINE_PARAMETER_COUNT} parameters, got {}",
                parameters.len()
            )));
        }
        for r in 0..3 {
            for c in 0..3 {
                self.matrix[(r, c)] = parameters[3 * r + c];
            }
            self.translation[r] = parameters[9 + r];
        }
        Ok(())
    }

    /// Chain a per-point gradient `∂E/∂y_i` through this transform.
    ///
    /// `points` are the untransformed positions `x_i`. Returns `∂E/∂p` in
    /// parameter order. Extra entries in the longer slice are ignored.
    #[must_use]
    pub fn parameter_gradient(
        &self,
        points: &[Point3<f64>],
        gradient: &[Vector3<f64>],
    ) -> [f64; AFFINE_PARAMETER_COUNT] {
        let mut out = [0.0; AFFINE_PARAMETER_COUNT];
        for (x, g) in points.iter().zip(gradient) {
            let local = x - self.center;
            for r in 0..3 {
                for c in 0..3 {
                    out[3 * r + c] += g[r] * local[c];
                }
                out[9 + r] += g[r];
            }
        }
        out
    }
}

impl PointTransform for AffineTransform {
    fn transform_point(&self, point: &Point3<f64>) -> Point3<f64> {
        self.center + self.matrix * (point - self.center) + self.translation
    }
}
