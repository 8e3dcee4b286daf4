//! SE(2) - Special Euclidean Group in 2D
//!
//! SE(2) elements are planar rigid body transformations, stored as a unit
//! complex rotation and a translation vector.
//!
//! SE(2) tangent elements are twists `[θ, x, y]`: the rotational component
//! first, followed by the translational component `ρ = (x, y)`. The exponential
//! map is
//!
//! ```text
//! exp([θ, ρ]) = [ R(θ)  V(θ)ρ ]     V(θ) = [ a  -b ]   a = sin θ / θ
//!               [  0      1   ]            [ b   a ]   b = (1 - cos θ) / θ
//! ```

use crate::manifold::{LieGroup, Manifold, ManifoldError, ManifoldResult, SO2};
use nalgebra::{Isometry2, Matrix2, Matrix3, Translation2, UnitComplex, Vector2, Vector3};
use std::{
    fmt,
    fmt::{Display, Formatter},
};

/// SE(2) group element representing rigid body transformations in 2D.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SE2 {
    translation: Vector2<f64>,
    rotation: UnitComplex<f64>,
}

impl Display for SE2 {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "SE2(translation: [{:.4}, {:.4}], rotation: {:.4})",
            self.translation.x,
            self.translation.y,
            self.angle()
        )
    }
}

/// `(sin θ / θ, (1 - cos θ) / θ)`, with Taylor expansions near zero.
fn exp_coefficients(theta: f64) -> (f64, f64) {
    let theta_sq = theta * theta;
    if theta_sq < f64::EPSILON {
        (1.0 - theta_sq / 6.0, 0.5 * theta - theta * theta_sq / 24.0)
    } else {
        (theta.sin() / theta, (1.0 - theta.cos()) / theta)
    }
}

impl SE2 {
    /// Create a new SE2 element from translation and rotation.
    pub fn new(translation: Vector2<f64>, rotation: UnitComplex<f64>) -> Self {
        SE2 {
            translation,
            rotation,
        }
    }

    /// Create SE2 from translation components and angle.
    pub fn from_xy_angle(x: f64, y: f64, theta: f64) -> Self {
        Self::new(Vector2::new(x, y), UnitComplex::from_angle(theta))
    }

    /// Create SE2 from a translation and an SO2 rotation.
    pub fn from_translation_so2(translation: Vector2<f64>, rotation: SO2) -> Self {
        Self::new(translation, rotation.complex())
    }

    /// Create SE2 from an isometry.
    pub fn from_isometry(isometry: Isometry2<f64>) -> Self {
        Self::new(isometry.translation.vector, isometry.rotation)
    }

    /// Create SE2 from `[x, y, θ]`.
    pub fn try_from_slice(data: &[f64]) -> ManifoldResult<Self> {
        if data.len() != 3 {
            return Err(ManifoldError::DimensionMismatch {
                expected: 3,
                actual: data.len(),
            });
        }
        if data.iter().any(|x| !x.is_finite()) {
            return Err(ManifoldError::InvalidNumber);
        }
        Ok(Self::from_xy_angle(data[0], data[1], data[2]))
    }

    pub fn translation(&self) -> Vector2<f64> {
        self.translation
    }

    pub fn rotation(&self) -> SO2 {
        SO2::from_unit_complex(self.rotation)
    }

    pub fn x(&self) -> f64 {
        self.translation.x
    }

    pub fn y(&self) -> f64 {
        self.translation.y
    }

    /// Rotation angle in `(-π, π]`.
    pub fn angle(&self) -> f64 {
        self.rotation.angle()
    }

    pub fn rotation_matrix(&self) -> Matrix2<f64> {
        self.rotation.to_rotation_matrix().into_inner()
    }

    pub fn to_isometry(&self) -> Isometry2<f64> {
        Isometry2::from_parts(Translation2::from(self.translation), self.rotation)
    }

    /// Transform a point: `R p + t`.
    pub fn act(&self, point: &Vector2<f64>) -> Vector2<f64> {
        self.rotation * *point + self.translation
    }
}

impl Manifold for SE2 {
    type TangentVector = Vector3<f64>;

    fn retract(&self, tangent: &Self::TangentVector) -> Self {
        self.right_plus(tangent, None, None)
    }

    fn local_coordinate(&self, other: &Self) -> Self::TangentVector {
        other.right_minus(self, None, None)
    }
}

impl LieGroup for SE2 {
    type JacobianMatrix = Matrix3<f64>;

    fn identity() -> Self {
        SE2 {
            translation: Vector2::zeros(),
            rotation: UnitComplex::identity(),
        }
    }

    /// # Notes
    /// ```text
    /// M⁻¹ = [ Rᵀ  -Rᵀt ]
    ///       [ 0     1  ]
    /// ```
    fn inverse(&self, jacobian: Option<&mut Self::JacobianMatrix>) -> Self {
        let rotation_inverse = self.rotation.inverse();
        let translation_inverse = -(rotation_inverse * self.translation);

        if let Some(jac) = jacobian {
            *jac = -self.adjoint();
        }

        SE2::new(translation_inverse, rotation_inverse)
    }

    fn compose(
        &self,
        other: &Self,
        jacobian_self: Option<&mut Self::JacobianMatrix>,
        jacobian_other: Option<&mut Self::JacobianMatrix>,
    ) -> Self {
        let result = SE2::new(
            self.rotation * other.translation + self.translation,
            self.rotation * other.rotation,
        );

        if let Some(jac_self) = jacobian_self {
            *jac_self = other.inverse(None).adjoint();
        }

        if let Some(jac_other) = jacobian_other {
            *jac_other = Matrix3::identity();
        }

        result
    }

    fn exp(tangent: &Self::TangentVector, jacobian: Option<&mut Self::JacobianMatrix>) -> Self {
        let theta = tangent[0];
        let (a, b) = exp_coefficients(theta);
        let translation = Vector2::new(
            a * tangent[1] - b * tangent[2],
            b * tangent[1] + a * tangent[2],
        );

        if let Some(jac) = jacobian {
            *jac = Self::right_jacobian(tangent);
        }

        SE2::new(translation, UnitComplex::from_angle(theta))
    }

    /// # Notes
    /// ```text
    /// θ = atan2(sin, cos)
    /// ρ = V(θ)⁻¹ t = 1/(a² + b²) [ a  b ] t
    ///                            [-b  a ]
    /// ```
    fn log(&self, jacobian: Option<&mut Self::JacobianMatrix>) -> Self::TangentVector {
        let theta = self.angle();
        let (a, b) = exp_coefficients(theta);
        let den = 1.0 / (a * a + b * b);
        let (a, b) = (a * den, b * den);
        let x = self.translation.x;
        let y = self.translation.y;

        let tangent = Vector3::new(theta, a * x + b * y, -b * x + a * y);

        if let Some(jac) = jacobian {
            *jac = Self::right_jacobian_inv(&tangent);
        }

        tangent
    }

    /// # Notes
    /// In `[θ, x, y]` ordering, with `ρ = (x, y)`:
    /// ```text
    /// Jr = [ 1      0    0 ]
    ///      [ j₁    a    b ]
    ///      [ j₂   -b    a ]
    /// j₁ = (θx - y + y cos θ - x sin θ) / θ²
    /// j₂ = (x + θy - x cos θ - y sin θ) / θ²
    /// ```
    fn right_jacobian(tangent: &Self::TangentVector) -> Self::JacobianMatrix {
        let theta = tangent[0];
        let x = tangent[1];
        let y = tangent[2];
        let theta_sq = theta * theta;
        let (a, b) = exp_coefficients(theta);

        let (j1, j2) = if theta_sq < f64::EPSILON {
            (-y / 2.0 + theta * x / 6.0, x / 2.0 + theta * y / 6.0)
        } else {
            let (sin_theta, cos_theta) = theta.sin_cos();
            (
                (theta * x - y + y * cos_theta - x * sin_theta) / theta_sq,
                (x + theta * y - x * cos_theta - y * sin_theta) / theta_sq,
            )
        };

        Matrix3::new(1.0, 0.0, 0.0, j1, a, b, j2, -b, a)
    }

    fn right_jacobian_inv(tangent: &Self::TangentVector) -> Self::JacobianMatrix {
        let theta = tangent[0];
        let x = tangent[1];
        let y = tangent[2];
        let theta_sq = theta * theta;

        let (diagonal, k1, k2) = if theta_sq > f64::EPSILON {
            let (sin_theta, cos_theta) = theta.sin_cos();
            let a = theta * sin_theta;
            let b = theta * cos_theta;
            let den = 2.0 * theta * (cos_theta - 1.0);
            (
                -a / (2.0 * cos_theta - 2.0),
                (a * x + b * y - theta * y + 2.0 * x * cos_theta - 2.0 * x) / den,
                (-b * x + a * y + theta * x + 2.0 * y * cos_theta - 2.0 * y) / den,
            )
        } else {
            (
                1.0 - theta_sq / 12.0,
                y / 2.0 + theta * x / 12.0,
                -x / 2.0 + theta * y / 12.0,
            )
        };

        Matrix3::new(
            1.0,
            0.0,
            0.0,
            k1,
            diagonal,
            -theta * 0.5,
            k2,
            theta * 0.5,
            diagonal,
        )
    }

    fn jacobian_identity() -> Self::JacobianMatrix {
        Matrix3::identity()
    }

    fn zero_jacobian() -> Self::JacobianMatrix {
        Matrix3::zeros()
    }

    fn random_with<R: rand::Rng>(rng: &mut R) -> Self {
        SE2::from_xy_angle(
            rng.random_range(-1.0..1.0),
            rng.random_range(-1.0..1.0),
            rng.random_range(-std::f64::consts::PI..std::f64::consts::PI),
        )
    }

    /// # Notes
    /// In `[θ, x, y]` ordering:
    /// ```text
    /// Ad(M) = [ 1    0 ]
    ///         [ ŧ    R ]      ŧ = (t_y, -t_x)
    /// ```
    fn adjoint(&self) -> Self::JacobianMatrix {
        let r = self.rotation_matrix();
        Matrix3::new(
            1.0,
            0.0,
            0.0,
            self.translation.y,
            r[(0, 0)],
            r[(0, 1)],
            -self.translation.x,
            r[(1, 0)],
            r[(1, 1)],
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifold::numerical_adjoint;
    use std::f64::consts::PI;

    const TOLERANCE: f64 = 1e-12;

    /// Central-difference Jacobian of `f` with respect to right perturbations of `x`.
    fn numerical_jacobian<F>(x: &SE2, f: F) -> Matrix3<f64>
    where
        F: Fn(&SE2) -> SE2,
    {
        let h = 1e-6;
        let fx = f(x);
        let mut jac = Matrix3::zeros();
        for i in 0..3 {
            let mut delta = Vector3::zeros();
            delta[i] = h;
            let plus = fx.local_coordinate(&f(&x.retract(&delta)));
            let minus = fx.local_coordinate(&f(&x.retract(&(-delta))));
            jac.set_column(i, &((plus - minus) / (2.0 * h)));
        }
        jac
    }

    #[test]
    fn test_se2_compose() {
        let a = SE2::from_xy_angle(1.0, 1.0, PI / 2.0);
        let b = SE2::from_xy_angle(2.0, 2.0, PI / 2.0);
        let c = a.compose(&b, None, None);
        assert!((c.x() - (-1.0)).abs() < TOLERANCE);
        assert!((c.y() - 3.0).abs() < TOLERANCE);
        assert!((c.angle().abs() - PI).abs() < TOLERANCE);
    }

    #[test]
    fn test_se2_inverse() {
        let a = SE2::from_xy_angle(0.7, -2.0, 0.4);
        let identity = a.compose(&a.inverse(None), None, None);
        assert!(identity.translation().norm() < TOLERANCE);
        assert!(identity.angle().abs() < TOLERANCE);
    }

    #[test]
    fn test_se2_exp_log_round_trip() {
        for tangent in [
            Vector3::new(0.0, 1.0, -2.0),
            Vector3::new(1e-9, 0.5, 0.25),
            Vector3::new(2.5, -1.0, 3.0),
        ] {
            let recovered = SE2::exp(&tangent, None).log(None);
            assert!((recovered - tangent).norm() < 1e-10);
        }
    }

    #[test]
    fn test_se2_exp_rotation_first() {
        let pose = SE2::exp(&Vector3::new(0.0, 2.0, 3.0), None);
        assert!((pose.x() - 2.0).abs() < TOLERANCE);
        assert!((pose.y() - 3.0).abs() < TOLERANCE);
        let turn = SE2::exp(&Vector3::new(PI / 2.0, 0.0, 0.0), None);
        assert!((turn.angle() - PI / 2.0).abs() < TOLERANCE);
        assert!(turn.translation().norm() < TOLERANCE);
    }

    #[test]
    fn test_se2_retract_local_round_trip() {
        for _ in 0..100 {
            let p = SE2::random();
            let v = Vector3::new(0.2, -0.1, 0.3);
            let q = p.retract(&v);
            assert!((p.local_coordinate(&q) - v).norm() < 1e-10);
            assert!(p.local_coordinate(&p).norm() < TOLERANCE);
            assert!(p.retract(&p.local_coordinate(&p)).is_approx(&p, TOLERANCE));
        }
    }

    #[test]
    fn test_se2_adjoint_matches_numerical() {
        for _ in 0..20 {
            let g = SE2::random();
            assert!((g.adjoint() - numerical_adjoint(&g)).norm() < 1e-8);
        }
    }

    #[test]
    fn test_se2_adjoint_transports_tangent() {
        let g = SE2::from_xy_angle(1.0, -0.5, 0.8);
        let v = Vector3::new(0.1, 0.2, -0.3);
        let lhs = g.compose(&SE2::exp(&v, None), None, None);
        let rhs = SE2::exp(&g.adjoint_apply(&v), None).compose(&g, None, None);
        assert!(lhs.is_approx(&rhs, 1e-10));
    }

    #[test]
    fn test_se2_compose_jacobians() {
        let a = SE2::from_xy_angle(0.3, 1.2, -0.7);
        let b = SE2::from_xy_angle(-1.0, 0.4, 2.1);
        let mut jac_a = Matrix3::zeros();
        let mut jac_b = Matrix3::zeros();
        a.compose(&b, Some(&mut jac_a), Some(&mut jac_b));

        let numerical_a = numerical_jacobian(&a, |x| x.compose(&b, None, None));
        let numerical_b = numerical_jacobian(&b, |x| a.compose(x, None, None));
        assert!((jac_a - numerical_a).norm() < 1e-6);
        assert!((jac_b - numerical_b).norm() < 1e-6);
    }

    #[test]
    fn test_se2_inverse_jacobian() {
        let a = SE2::from_xy_angle(0.3, 1.2, -0.7);
        let mut jac = Matrix3::zeros();
        a.inverse(Some(&mut jac));
        let numerical = numerical_jacobian(&a, |x| x.inverse(None));
        assert!((jac - numerical).norm() < 1e-6);
    }

    #[test]
    fn test_se2_right_jacobians() {
        let tangent = Vector3::new(0.9, -0.4, 1.3);
        let jr = SE2::right_jacobian(&tangent);
        let jr_inv = SE2::right_jacobian_inv(&tangent);
        assert!((jr * jr_inv - Matrix3::identity()).norm() < 1e-10);

        // exp(τ + δ) ≈ exp(τ) ∘ exp(Jr δ)
        let delta = Vector3::new(1e-6, -2e-6, 1.5e-6);
        let lhs = SE2::exp(&(tangent + delta), None);
        let rhs = SE2::exp(&tangent, None).compose(&SE2::exp(&(jr * delta), None), None, None);
        assert!(lhs.is_approx(&rhs, 1e-10));
    }

    #[test]
    fn test_se2_try_from_slice() {
        assert!(SE2::try_from_slice(&[1.0, 2.0]).is_err());
        assert!(SE2::try_from_slice(&[1.0, f64::NAN, 0.0]).is_err());
        assert!(SE2::try_from_slice(&[1.0, 2.0, 0.5]).is_ok());
    }
}
