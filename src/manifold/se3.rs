//! SE(3) - Special Euclidean Group in 3D
//!
//! SE(3) elements are rigid body transformations in 3D, stored as an SO(3)
//! rotation and a translation vector.
//!
//! SE(3) tangent elements are twists `[ω, v]` in `R⁶`: the rotation vector
//! first, followed by the translational component. The exponential map is
//!
//! ```text
//! exp([θ, ρ]) = [ exp(θ)  Jl(θ)ρ ]
//!               [   0        1   ]
//! ```
//!
//! where `Jl` is the SO(3) left Jacobian.

use crate::manifold::{LieGroup, Manifold, ManifoldError, ManifoldResult, SO3, skew};
use nalgebra::{
    Isometry3, Matrix3, Matrix6, Translation3, UnitQuaternion, Vector3, Vector6,
};
use std::{
    fmt,
    fmt::{Display, Formatter},
};

/// SE(3) group element representing rigid body transformations in 3D.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SE3 {
    rotation: SO3,
    translation: Vector3<f64>,
}

impl Display for SE3 {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let t = self.translation;
        let q = self.rotation.quaternion();
        write!(
            f,
            "SE3(translation: [{:.4}, {:.4}, {:.4}], rotation: [w: {:.4}, x: {:.4}, y: {:.4}, z: {:.4}])",
            t.x, t.y, t.z, q.w, q.i, q.j, q.k
        )
    }
}

/// Split a twist into its rotational and translational parts.
fn split_twist(tangent: &Vector6<f64>) -> (Vector3<f64>, Vector3<f64>) {
    (
        tangent.fixed_rows::<3>(0).into_owned(),
        tangent.fixed_rows::<3>(3).into_owned(),
    )
}

/// Assemble a lower block-triangular 6×6 matrix `[A 0; C A]`.
fn lower_block_triangular(diagonal: &Matrix3<f64>, lower: &Matrix3<f64>) -> Matrix6<f64> {
    let mut matrix = Matrix6::zeros();
    matrix.fixed_view_mut::<3, 3>(0, 0).copy_from(diagonal);
    matrix.fixed_view_mut::<3, 3>(3, 3).copy_from(diagonal);
    matrix.fixed_view_mut::<3, 3>(3, 0).copy_from(lower);
    matrix
}

impl SE3 {
    pub fn new(translation: Vector3<f64>, rotation: UnitQuaternion<f64>) -> Self {
        SE3 {
            rotation: SO3::from_quaternion(rotation),
            translation,
        }
    }

    pub fn from_translation_so3(translation: Vector3<f64>, rotation: SO3) -> Self {
        SE3 {
            rotation,
            translation,
        }
    }

    /// Pure translation.
    pub fn from_translation(x: f64, y: f64, z: f64) -> Self {
        Self::from_translation_so3(Vector3::new(x, y, z), SO3::identity())
    }

    pub fn from_isometry(isometry: Isometry3<f64>) -> Self {
        Self::new(isometry.translation.vector, isometry.rotation)
    }

    /// Create from `[tx, ty, tz, qw, qx, qy, qz]`, normalizing the quaternion.
    pub fn try_from_slice(data: &[f64]) -> ManifoldResult<Self> {
        if data.len() != 7 {
            return Err(ManifoldError::DimensionMismatch {
                expected: 7,
                actual: data.len(),
            });
        }
        let rotation = SO3::try_from_slice(&data[3..])?;
        if data[..3].iter().any(|x| !x.is_finite()) {
            return Err(ManifoldError::InvalidNumber);
        }
        Ok(Self::from_translation_so3(
            Vector3::new(data[0], data[1], data[2]),
            rotation,
        ))
    }

    pub fn translation(&self) -> Vector3<f64> {
        self.translation
    }

    pub fn rotation(&self) -> SO3 {
        self.rotation
    }

    pub fn rotation_matrix(&self) -> Matrix3<f64> {
        self.rotation.rotation_matrix()
    }

    pub fn to_isometry(&self) -> Isometry3<f64> {
        Isometry3::from_parts(
            Translation3::from(self.translation),
            self.rotation.quaternion(),
        )
    }

    /// Transform a point: `R p + t`.
    pub fn act(&self, point: &Vector3<f64>) -> Vector3<f64> {
        self.rotation.act(point) + self.translation
    }

    /// Off-diagonal block `Q(ρ, θ)` of the SE(3) left Jacobian.
    ///
    /// # Notes
    /// ```text
    /// Q = ½[ρ]× + c₁ ([θ]×[ρ]× + [ρ]×[θ]× + [θ]×[ρ]×[θ]×)
    ///           + c₂ ([θ]×²[ρ]× + [ρ]×[θ]×² - 3[θ]×[ρ]×[θ]×)
    ///           + c₃ ([θ]×[ρ]×[θ]×² + [θ]×²[ρ]×[θ]×)
    /// c₁ = (θ - sin θ)/θ³
    /// c₂ = (θ² + 2cos θ - 2)/(2θ⁴)
    /// c₃ = (2θ - 3sin θ + θcos θ)/(2θ⁵)
    /// ```
    pub fn q_block(rho: &Vector3<f64>, theta: &Vector3<f64>) -> Matrix3<f64> {
        let rho_skew = skew(rho);
        let theta_skew = skew(theta);
        let angle_sq = theta.norm_squared();

        let (c1, c2, c3) = if angle_sq < 1e-4 {
            (
                1.0 / 6.0 - angle_sq / 120.0,
                1.0 / 24.0 - angle_sq / 720.0,
                1.0 / 120.0,
            )
        } else {
            let angle = angle_sq.sqrt();
            let (sin_angle, cos_angle) = angle.sin_cos();
            (
                (angle - sin_angle) / (angle_sq * angle),
                (angle_sq + 2.0 * cos_angle - 2.0) / (2.0 * angle_sq * angle_sq),
                (2.0 * angle - 3.0 * sin_angle + angle * cos_angle)
                    / (2.0 * angle_sq * angle_sq * angle),
            )
        };

        let theta_rho = theta_skew * rho_skew;
        let rho_theta = rho_skew * theta_skew;
        let theta_rho_theta = theta_rho * theta_skew;
        let theta_theta = theta_skew * theta_skew;

        0.5 * rho_skew
            + c1 * (theta_rho + rho_theta + theta_rho_theta)
            + c2 * (theta_theta * rho_skew + rho_skew * theta_theta - 3.0 * theta_rho_theta)
            + c3 * (theta_rho_theta * theta_skew + theta_skew * theta_rho_theta)
    }
}

impl Manifold for SE3 {
    type TangentVector = Vector6<f64>;

    fn retract(&self, tangent: &Self::TangentVector) -> Self {
        self.right_plus(tangent, None, None)
    }

    fn local_coordinate(&self, other: &Self) -> Self::TangentVector {
        other.right_minus(self, None, None)
    }
}

impl LieGroup for SE3 {
    type JacobianMatrix = Matrix6<f64>;

    fn identity() -> Self {
        SE3 {
            rotation: SO3::identity(),
            translation: Vector3::zeros(),
        }
    }

    fn inverse(&self, jacobian: Option<&mut Self::JacobianMatrix>) -> Self {
        let rotation_inverse = self.rotation.inverse(None);
        let translation_inverse = -rotation_inverse.act(&self.translation);

        if let Some(jac) = jacobian {
            *jac = -self.adjoint();
        }

        SE3::from_translation_so3(translation_inverse, rotation_inverse)
    }

    fn compose(
        &self,
        other: &Self,
        jacobian_self: Option<&mut Self::JacobianMatrix>,
        jacobian_other: Option<&mut Self::JacobianMatrix>,
    ) -> Self {
        let result = SE3::from_translation_so3(
            self.rotation.act(&other.translation) + self.translation,
            self.rotation.compose(&other.rotation, None, None),
        );

        if let Some(jac_self) = jacobian_self {
            *jac_self = other.inverse(None).adjoint();
        }

        if let Some(jac_other) = jacobian_other {
            *jac_other = Matrix6::identity();
        }

        result
    }

    fn exp(tangent: &Self::TangentVector, jacobian: Option<&mut Self::JacobianMatrix>) -> Self {
        let (theta, rho) = split_twist(tangent);
        let rotation = SO3::exp(&theta, None);
        let translation = SO3::left_jacobian(&theta) * rho;

        if let Some(jac) = jacobian {
            *jac = Self::right_jacobian(tangent);
        }

        SE3::from_translation_so3(translation, rotation)
    }

    fn log(&self, jacobian: Option<&mut Self::JacobianMatrix>) -> Self::TangentVector {
        let theta = self.rotation.log(None);
        let rho = SO3::left_jacobian_inv(&theta) * self.translation;

        let mut tangent = Vector6::zeros();
        tangent.fixed_rows_mut::<3>(0).copy_from(&theta);
        tangent.fixed_rows_mut::<3>(3).copy_from(&rho);

        if let Some(jac) = jacobian {
            *jac = Self::right_jacobian_inv(&tangent);
        }

        tangent
    }

    /// # Notes
    /// In `[θ, ρ]` ordering:
    /// ```text
    /// Jr = [ Jr(θ)        0   ]
    ///      [ Q(-ρ, -θ)  Jr(θ) ]
    /// ```
    fn right_jacobian(tangent: &Self::TangentVector) -> Self::JacobianMatrix {
        let (theta, rho) = split_twist(tangent);
        let rotation_jacobian = SO3::right_jacobian(&theta);
        lower_block_triangular(&rotation_jacobian, &SE3::q_block(&-rho, &-theta))
    }

    fn right_jacobian_inv(tangent: &Self::TangentVector) -> Self::JacobianMatrix {
        let (theta, rho) = split_twist(tangent);
        let rotation_jacobian_inv = SO3::right_jacobian_inv(&theta);
        let q = SE3::q_block(&-rho, &-theta);
        lower_block_triangular(
            &rotation_jacobian_inv,
            &(-rotation_jacobian_inv * q * rotation_jacobian_inv),
        )
    }

    fn jacobian_identity() -> Self::JacobianMatrix {
        Matrix6::identity()
    }

    fn zero_jacobian() -> Self::JacobianMatrix {
        Matrix6::zeros()
    }

    fn random_with<R: rand::Rng>(rng: &mut R) -> Self {
        let translation = Vector3::new(
            rng.random_range(-1.0..1.0),
            rng.random_range(-1.0..1.0),
            rng.random_range(-1.0..1.0),
        );
        SE3::from_translation_so3(translation, SO3::random_with(rng))
    }

    /// # Notes
    /// In `[θ, ρ]` ordering:
    /// ```text
    /// Ad(M) = [ R       0 ]
    ///         [ [t]×R   R ]
    /// ```
    fn adjoint(&self) -> Self::JacobianMatrix {
        let r = self.rotation_matrix();
        lower_block_triangular(&r, &(skew(&self.translation) * r))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifold::numerical_adjoint;

    const TOLERANCE: f64 = 1e-12;

    fn numerical_jacobian<F>(x: &SE3, f: F) -> Matrix6<f64>
    where
        F: Fn(&SE3) -> SE3,
    {
        let h = 1e-6;
        let fx = f(x);
        let mut jac = Matrix6::zeros();
        for i in 0..6 {
            let mut delta = Vector6::zeros();
            delta[i] = h;
            let plus = fx.local_coordinate(&f(&x.retract(&delta)));
            let minus = fx.local_coordinate(&f(&x.retract(&(-delta))));
            jac.set_column(i, &((plus - minus) / (2.0 * h)));
        }
        jac
    }

    #[test]
    fn test_se3_exp_rotation_first() {
        let translation_only = SE3::exp(&Vector6::new(0.0, 0.0, 0.0, 1.0, 2.0, 3.0), None);
        assert!((translation_only.translation() - Vector3::new(1.0, 2.0, 3.0)).norm() < TOLERANCE);
        assert!(translation_only.rotation().is_approx(&SO3::identity(), TOLERANCE));
    }

    #[test]
    fn test_se3_exp_log_round_trip() {
        for tangent in [
            Vector6::new(0.1, -0.2, 0.3, 1.0, 0.0, -1.0),
            Vector6::new(1e-9, 0.0, 0.0, 0.5, 0.5, 0.5),
            Vector6::new(1.2, 0.4, -0.9, -2.0, 3.0, 0.25),
        ] {
            let recovered = SE3::exp(&tangent, None).log(None);
            assert!((recovered - tangent).norm() < 1e-9);
        }
    }

    #[test]
    fn test_se3_retract_local_round_trip() {
        for _ in 0..100 {
            let p = SE3::random();
            let v = Vector6::new(0.05, -0.1, 0.2, 0.3, -0.2, 0.1);
            let q = p.retract(&v);
            assert!((p.local_coordinate(&q) - v).norm() < 1e-9);
            assert!(p.local_coordinate(&p).norm() < TOLERANCE);
        }
    }

    #[test]
    fn test_se3_adjoint_matches_numerical() {
        for _ in 0..20 {
            let g = SE3::random();
            assert!((g.adjoint() - numerical_adjoint(&g)).norm() < 1e-7);
        }
    }

    #[test]
    fn test_se3_compose_and_inverse_jacobians() {
        let a = SE3::random();
        let b = SE3::random();
        let mut jac_a = Matrix6::zeros();
        let mut jac_b = Matrix6::zeros();
        a.compose(&b, Some(&mut jac_a), Some(&mut jac_b));
        let numerical_a = numerical_jacobian(&a, |x| x.compose(&b, None, None));
        let numerical_b = numerical_jacobian(&b, |x| a.compose(x, None, None));
        assert!((jac_a - numerical_a).norm() < 1e-6);
        assert!((jac_b - numerical_b).norm() < 1e-6);

        let mut jac_inverse = Matrix6::zeros();
        a.inverse(Some(&mut jac_inverse));
        let numerical_inverse = numerical_jacobian(&a, |x| x.inverse(None));
        assert!((jac_inverse - numerical_inverse).norm() < 1e-6);
    }

    #[test]
    fn test_se3_right_jacobians() {
        let tangent = Vector6::new(0.4, -0.3, 0.8, 1.0, -2.0, 0.5);
        let jr = SE3::right_jacobian(&tangent);
        let jr_inv = SE3::right_jacobian_inv(&tangent);
        assert!((jr * jr_inv - Matrix6::identity()).norm() < 1e-9);

        let delta = Vector6::new(1e-6, -1e-6, 2e-6, 1e-6, 1e-6, -2e-6);
        let lhs = SE3::exp(&(tangent + delta), None);
        let rhs = SE3::exp(&tangent, None).compose(&SE3::exp(&(jr * delta), None), None, None);
        assert!(lhs.is_approx(&rhs, 1e-10));
    }

    #[test]
    fn test_se3_log_jacobian_small_angle() {
        let tangent = Vector6::new(1e-4, 2e-4, -1e-4, 0.7, -0.3, 1.1);
        let jr = SE3::right_jacobian(&tangent);
        let jr_inv = SE3::right_jacobian_inv(&tangent);
        assert!((jr * jr_inv - Matrix6::identity()).norm() < 1e-9);
    }

    #[test]
    fn test_se3_act() {
        let pose = SE3::from_translation(1.0, 0.0, 0.0);
        let point = pose.act(&Vector3::new(0.0, 1.0, 0.0));
        assert!((point - Vector3::new(1.0, 1.0, 0.0)).norm() < TOLERANCE);
    }

    #[test]
    fn test_se3_try_from_slice() {
        assert!(SE3::try_from_slice(&[0.0; 6]).is_err());
        assert!(SE3::try_from_slice(&[1.0, 2.0, 3.0, 1.0, 0.0, 0.0, 0.0]).is_ok());
        assert!(SE3::try_from_slice(&[1.0, 2.0, 3.0, 0.0, 0.0, 0.0, 0.0]).is_err());
    }
}
