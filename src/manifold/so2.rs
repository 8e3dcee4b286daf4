//! SO(2) - Special Orthogonal Group in 2D
//!
//! SO(2) elements are rotations in the plane, stored as nalgebra unit complex
//! numbers. The tangent space is one-dimensional: a single angle in radians.
//! The group is abelian, so the adjoint and the right Jacobians are all `1`.

use crate::manifold::{LieGroup, Manifold, ManifoldError, ManifoldResult, wrap_angle};
use nalgebra::{Complex, Matrix1, Matrix2, UnitComplex, Vector1, Vector2};
use std::{
    fmt,
    fmt::{Display, Formatter},
};

/// SO(2) group element representing rotations in 2D.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SO2 {
    complex: UnitComplex<f64>,
}

impl Display for SO2 {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "SO2(angle: {:.4})", self.angle())
    }
}

impl SO2 {
    /// Create from an angle in radians.
    pub fn from_angle(angle: f64) -> Self {
        SO2 {
            complex: UnitComplex::from_angle(angle),
        }
    }

    /// Create from a unit complex number.
    pub fn from_unit_complex(complex: UnitComplex<f64>) -> Self {
        SO2 { complex }
    }

    /// Create from `[cos θ, sin θ]`, normalizing the input.
    ///
    /// Fails when the input is not finite or too close to zero to normalize.
    pub fn try_from_slice(data: &[f64]) -> ManifoldResult<Self> {
        if data.len() != 2 {
            return Err(ManifoldError::DimensionMismatch {
                expected: 2,
                actual: data.len(),
            });
        }
        if data.iter().any(|x| !x.is_finite()) {
            return Err(ManifoldError::InvalidNumber);
        }
        let complex = Complex::new(data[0], data[1]);
        UnitComplex::try_new(complex, f64::EPSILON)
            .map(SO2::from_unit_complex)
            .ok_or_else(|| {
                ManifoldError::InvalidElement("complex number has zero norm".to_string())
            })
    }

    /// Rotation angle in `(-π, π]`.
    pub fn angle(&self) -> f64 {
        self.complex.angle()
    }

    /// Underlying unit complex number.
    pub fn complex(&self) -> UnitComplex<f64> {
        self.complex
    }

    /// 2×2 rotation matrix.
    pub fn rotation_matrix(&self) -> Matrix2<f64> {
        self.complex.to_rotation_matrix().into_inner()
    }

    /// Rotate a point.
    pub fn act(&self, point: &Vector2<f64>) -> Vector2<f64> {
        self.complex * *point
    }
}

impl Manifold for SO2 {
    type TangentVector = Vector1<f64>;

    fn retract(&self, tangent: &Self::TangentVector) -> Self {
        self.right_plus(tangent, None, None)
    }

    fn local_coordinate(&self, other: &Self) -> Self::TangentVector {
        other.right_minus(self, None, None)
    }
}

impl LieGroup for SO2 {
    type JacobianMatrix = Matrix1<f64>;

    fn identity() -> Self {
        SO2 {
            complex: UnitComplex::identity(),
        }
    }

    fn inverse(&self, jacobian: Option<&mut Self::JacobianMatrix>) -> Self {
        if let Some(jac) = jacobian {
            *jac = -Matrix1::identity();
        }
        SO2 {
            complex: self.complex.inverse(),
        }
    }

    fn compose(
        &self,
        other: &Self,
        jacobian_self: Option<&mut Self::JacobianMatrix>,
        jacobian_other: Option<&mut Self::JacobianMatrix>,
    ) -> Self {
        if let Some(jac_self) = jacobian_self {
            *jac_self = Matrix1::identity();
        }
        if let Some(jac_other) = jacobian_other {
            *jac_other = Matrix1::identity();
        }
        SO2 {
            complex: self.complex * other.complex,
        }
    }

    fn exp(tangent: &Self::TangentVector, jacobian: Option<&mut Self::JacobianMatrix>) -> Self {
        if let Some(jac) = jacobian {
            *jac = Matrix1::identity();
        }
        SO2::from_angle(tangent[0])
    }

    fn log(&self, jacobian: Option<&mut Self::JacobianMatrix>) -> Self::TangentVector {
        if let Some(jac) = jacobian {
            *jac = Matrix1::identity();
        }
        Vector1::new(wrap_angle(self.angle()))
    }

    fn right_jacobian(_tangent: &Self::TangentVector) -> Self::JacobianMatrix {
        Matrix1::identity()
    }

    fn right_jacobian_inv(_tangent: &Self::TangentVector) -> Self::JacobianMatrix {
        Matrix1::identity()
    }

    fn jacobian_identity() -> Self::JacobianMatrix {
        Matrix1::identity()
    }

    fn zero_jacobian() -> Self::JacobianMatrix {
        Matrix1::zeros()
    }

    fn random_with<R: rand::Rng>(rng: &mut R) -> Self {
        SO2::from_angle(rng.random_range(-std::f64::consts::PI..std::f64::consts::PI))
    }

    fn adjoint(&self) -> Self::JacobianMatrix {
        Matrix1::identity()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifold::numerical_adjoint;
    use std::f64::consts::PI;

    const TOLERANCE: f64 = 1e-12;

    #[test]
    fn test_so2_compose_and_inverse() {
        let a = SO2::from_angle(PI / 4.0);
        let b = SO2::from_angle(PI / 2.0);
        assert!((a.compose(&b, None, None).angle() - 3.0 * PI / 4.0).abs() < TOLERANCE);
        let identity = a.compose(&a.inverse(None), None, None);
        assert!(identity.angle().abs() < TOLERANCE);
    }

    #[test]
    fn test_so2_retract_local_round_trip() {
        for _ in 0..50 {
            let p = SO2::random();
            let v = Vector1::new(0.3);
            let q = p.retract(&v);
            assert!((p.local_coordinate(&q) - v).norm() < 1e-10);
            assert!(p.local_coordinate(&p).norm() < TOLERANCE);
        }
    }

    #[test]
    fn test_so2_log_wraps_angle() {
        let p = SO2::from_angle(PI - 0.1);
        let q = SO2::from_angle(-PI + 0.1);
        let v = p.local_coordinate(&q);
        assert!((v[0] - 0.2).abs() < 1e-10);
    }

    #[test]
    fn test_so2_adjoint_matches_numerical() {
        let g = SO2::from_angle(1.1);
        assert!((g.adjoint() - numerical_adjoint(&g)).norm() < 1e-8);
    }

    #[test]
    fn test_so2_try_from_slice() -> Result<(), ManifoldError> {
        let rotation = SO2::try_from_slice(&[0.0, 2.0])?;
        assert!((rotation.angle() - PI / 2.0).abs() < TOLERANCE);
        assert!(SO2::try_from_slice(&[0.0, 0.0]).is_err());
        assert!(matches!(
            SO2::try_from_slice(&[1.0]),
            Err(ManifoldError::DimensionMismatch { .. })
        ));
        Ok(())
    }
}
