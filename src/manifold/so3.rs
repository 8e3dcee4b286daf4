//! SO(3) - Special Orthogonal Group in 3D
//!
//! SO(3) elements are 3D rotations stored as nalgebra unit quaternions. Tangent
//! elements are rotation vectors `θ = angle · axis` in `R³`.
//!
//! The left and right Jacobians are also exposed as associated functions so that
//! SE(3) can assemble its block Jacobians from them.

use crate::manifold::{LieGroup, Manifold, ManifoldError, ManifoldResult, skew};
use nalgebra::{Matrix3, Quaternion, Rotation3, UnitQuaternion, Vector3};
use std::{
    fmt,
    fmt::{Display, Formatter},
};

/// SO(3) group element representing rotations in 3D.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SO3 {
    quaternion: UnitQuaternion<f64>,
}

impl Display for SO3 {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let q = self.quaternion.quaternion();
        write!(
            f,
            "SO3(quaternion: [w: {:.4}, x: {:.4}, y: {:.4}, z: {:.4}])",
            q.w, q.i, q.j, q.k
        )
    }
}

impl SO3 {
    pub fn from_quaternion(quaternion: UnitQuaternion<f64>) -> Self {
        SO3 { quaternion }
    }

    /// Create from Euler angles (roll, pitch, yaw).
    pub fn from_euler_angles(roll: f64, pitch: f64, yaw: f64) -> Self {
        SO3::from_quaternion(UnitQuaternion::from_euler_angles(roll, pitch, yaw))
    }

    /// Create from an axis and an angle.
    pub fn from_axis_angle(axis: &Vector3<f64>, angle: f64) -> Self {
        SO3::exp(&(axis.normalize() * angle), None)
    }

    /// Create from quaternion coefficients `[w, x, y, z]`, normalizing the input.
    pub fn try_from_slice(data: &[f64]) -> ManifoldResult<Self> {
        if data.len() != 4 {
            return Err(ManifoldError::DimensionMismatch {
                expected: 4,
                actual: data.len(),
            });
        }
        if data.iter().any(|x| !x.is_finite()) {
            return Err(ManifoldError::InvalidNumber);
        }
        let quaternion = Quaternion::new(data[0], data[1], data[2], data[3]);
        UnitQuaternion::try_new(quaternion, f64::EPSILON)
            .map(SO3::from_quaternion)
            .ok_or_else(|| ManifoldError::InvalidElement("quaternion has zero norm".to_string()))
    }

    pub fn quaternion(&self) -> UnitQuaternion<f64> {
        self.quaternion
    }

    pub fn rotation_matrix(&self) -> Matrix3<f64> {
        self.quaternion.to_rotation_matrix().into_inner()
    }

    pub fn to_rotation(&self) -> Rotation3<f64> {
        self.quaternion.to_rotation_matrix()
    }

    /// Rotate a point.
    pub fn act(&self, point: &Vector3<f64>) -> Vector3<f64> {
        self.quaternion * *point
    }

    /// Left Jacobian `Jl(θ)`.
    ///
    /// # Notes
    /// ```text
    /// Jl(θ) = I + (1 - cos θ)/θ² [θ]× + (θ - sin θ)/θ³ [θ]×²
    /// ```
    pub fn left_jacobian(theta: &Vector3<f64>) -> Matrix3<f64> {
        let angle_sq = theta.norm_squared();
        let theta_skew = skew(theta);

        if angle_sq <= f64::EPSILON {
            return Matrix3::identity() + 0.5 * theta_skew;
        }

        let angle = angle_sq.sqrt();
        let (sin_angle, cos_angle) = angle.sin_cos();
        Matrix3::identity()
            + (1.0 - cos_angle) / angle_sq * theta_skew
            + (angle - sin_angle) / (angle_sq * angle) * theta_skew * theta_skew
    }

    /// Inverse left Jacobian `Jl⁻¹(θ)`.
    ///
    /// # Notes
    /// ```text
    /// Jl⁻¹(θ) = I - ½[θ]× + (1/θ² - (1 + cos θ)/(2θ sin θ)) [θ]×²
    /// ```
    pub fn left_jacobian_inv(theta: &Vector3<f64>) -> Matrix3<f64> {
        let angle_sq = theta.norm_squared();
        let theta_skew = skew(theta);

        if angle_sq <= f64::EPSILON {
            return Matrix3::identity() - 0.5 * theta_skew;
        }

        let angle = angle_sq.sqrt();
        let (sin_angle, cos_angle) = angle.sin_cos();
        Matrix3::identity() - 0.5 * theta_skew
            + (1.0 / angle_sq - (1.0 + cos_angle) / (2.0 * angle * sin_angle))
                * theta_skew
                * theta_skew
    }
}

impl Manifold for SO3 {
    type TangentVector = Vector3<f64>;

    fn retract(&self, tangent: &Self::TangentVector) -> Self {
        self.right_plus(tangent, None, None)
    }

    fn local_coordinate(&self, other: &Self) -> Self::TangentVector {
        other.right_minus(self, None, None)
    }
}

impl LieGroup for SO3 {
    type JacobianMatrix = Matrix3<f64>;

    fn identity() -> Self {
        SO3 {
            quaternion: UnitQuaternion::identity(),
        }
    }

    fn inverse(&self, jacobian: Option<&mut Self::JacobianMatrix>) -> Self {
        if let Some(jac) = jacobian {
            *jac = -self.adjoint();
        }
        SO3 {
            quaternion: self.quaternion.inverse(),
        }
    }

    fn compose(
        &self,
        other: &Self,
        jacobian_self: Option<&mut Self::JacobianMatrix>,
        jacobian_other: Option<&mut Self::JacobianMatrix>,
    ) -> Self {
        if let Some(jac_self) = jacobian_self {
            *jac_self = other.rotation_matrix().transpose();
        }
        if let Some(jac_other) = jacobian_other {
            *jac_other = Matrix3::identity();
        }
        SO3 {
            quaternion: self.quaternion * other.quaternion,
        }
    }

    fn exp(tangent: &Self::TangentVector, jacobian: Option<&mut Self::JacobianMatrix>) -> Self {
        let quaternion = if tangent.norm_squared() > f64::EPSILON {
            UnitQuaternion::from_scaled_axis(*tangent)
        } else {
            UnitQuaternion::from_quaternion(Quaternion::new(
                1.0,
                tangent.x / 2.0,
                tangent.y / 2.0,
                tangent.z / 2.0,
            ))
        };

        if let Some(jac) = jacobian {
            *jac = Self::right_jacobian(tangent);
        }

        SO3 { quaternion }
    }

    fn log(&self, jacobian: Option<&mut Self::JacobianMatrix>) -> Self::TangentVector {
        let q = self.quaternion.quaternion();
        let sin_angle_squared = q.i * q.i + q.j * q.j + q.k * q.k;

        let log_coeff = if sin_angle_squared > f64::EPSILON {
            let sin_angle = sin_angle_squared.sqrt();
            let cos_angle = q.w;
            // q and -q are the same rotation; pick the angle in [-π, π].
            let two_angle = 2.0
                * if cos_angle < 0.0 {
                    f64::atan2(-sin_angle, -cos_angle)
                } else {
                    f64::atan2(sin_angle, cos_angle)
                };
            two_angle / sin_angle
        } else {
            2.0 * q.w.signum()
        };

        let tangent = Vector3::new(q.i * log_coeff, q.j * log_coeff, q.k * log_coeff);

        if let Some(jac) = jacobian {
            *jac = Self::right_jacobian_inv(&tangent);
        }

        tangent
    }

    /// `Jr(θ) = Jl(-θ) = Jl(θ)ᵀ`
    fn right_jacobian(tangent: &Self::TangentVector) -> Self::JacobianMatrix {
        SO3::left_jacobian(tangent).transpose()
    }

    fn right_jacobian_inv(tangent: &Self::TangentVector) -> Self::JacobianMatrix {
        SO3::left_jacobian_inv(tangent).transpose()
    }

    fn jacobian_identity() -> Self::JacobianMatrix {
        Matrix3::identity()
    }

    fn zero_jacobian() -> Self::JacobianMatrix {
        Matrix3::zeros()
    }

    fn random_with<R: rand::Rng>(rng: &mut R) -> Self {
        let tangent = Vector3::new(
            rng.random_range(-1.0..1.0),
            rng.random_range(-1.0..1.0),
            rng.random_range(-1.0..1.0),
        );
        SO3::exp(&tangent, None)
    }

    fn adjoint(&self) -> Self::JacobianMatrix {
        self.rotation_matrix()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifold::numerical_adjoint;
    use std::f64::consts::PI;

    const TOLERANCE: f64 = 1e-12;

    #[test]
    fn test_so3_exp_log_round_trip() {
        for tangent in [
            Vector3::new(0.1, -0.2, 0.3),
            Vector3::new(1e-10, 0.0, -1e-10),
            Vector3::new(0.0, 0.0, PI - 1e-3),
            Vector3::new(1.5, 1.0, -0.5),
        ] {
            let recovered = SO3::exp(&tangent, None).log(None);
            assert!((recovered - tangent).norm() < 1e-9);
        }
    }

    #[test]
    fn test_so3_retract_local_round_trip() {
        for _ in 0..100 {
            let p = SO3::random();
            let v = Vector3::new(0.05, -0.2, 0.1);
            let q = p.retract(&v);
            assert!((p.local_coordinate(&q) - v).norm() < 1e-10);
            assert!(p.local_coordinate(&p).norm() < TOLERANCE);
        }
    }

    #[test]
    fn test_so3_compose_with_inverse_is_identity() {
        let r = SO3::from_euler_angles(0.3, -0.6, 1.9);
        let identity = r.compose(&r.inverse(None), None, None);
        assert!(identity.is_approx(&SO3::identity(), 1e-12));
    }

    #[test]
    fn test_so3_adjoint_matches_numerical() {
        for _ in 0..20 {
            let g = SO3::random();
            assert!((g.adjoint() - numerical_adjoint(&g)).norm() < 1e-8);
        }
    }

    #[test]
    fn test_so3_left_jacobian_inverse() {
        let theta = Vector3::new(0.4, -1.1, 0.7);
        let product = SO3::left_jacobian(&theta) * SO3::left_jacobian_inv(&theta);
        assert!((product - Matrix3::identity()).norm() < 1e-10);
    }

    #[test]
    fn test_so3_right_jacobian_first_order() {
        let tangent = Vector3::new(0.3, 0.8, -0.2);
        let delta = Vector3::new(1e-6, 2e-6, -1e-6);
        let lhs = SO3::exp(&(tangent + delta), None);
        let rhs = SO3::exp(&tangent, None).compose(
            &SO3::exp(&(SO3::right_jacobian(&tangent) * delta), None),
            None,
            None,
        );
        assert!(lhs.is_approx(&rhs, 1e-10));
    }

    #[test]
    fn test_so3_act() {
        let r = SO3::from_axis_angle(&Vector3::z(), PI / 2.0);
        let rotated = r.act(&Vector3::x());
        assert!((rotated - Vector3::y()).norm() < TOLERANCE);
    }

    #[test]
    fn test_so3_try_from_slice() -> Result<(), ManifoldError> {
        let r = SO3::try_from_slice(&[2.0, 0.0, 0.0, 0.0])?;
        assert!(r.is_approx(&SO3::identity(), TOLERANCE));
        assert!(SO3::try_from_slice(&[0.0; 4]).is_err());
        Ok(())
    }
}
