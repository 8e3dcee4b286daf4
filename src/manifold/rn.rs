//! Rⁿ - n-dimensional Euclidean space
//!
//! Fixed-size vectors `SVector<f64, N>` are manifolds whose tangent space is the
//! space itself, and an abelian Lie group under addition. Landmarks, velocities,
//! biases and other unconstrained variables are stored directly as vectors.

use crate::manifold::{LieGroup, Manifold};
use nalgebra::{SMatrix, SVector};

impl<const N: usize> Manifold for SVector<f64, N> {
    type TangentVector = SVector<f64, N>;

    fn retract(&self, tangent: &Self::TangentVector) -> Self {
        self + tangent
    }

    fn local_coordinate(&self, other: &Self) -> Self::TangentVector {
        other - self
    }
}

impl<const N: usize> LieGroup for SVector<f64, N> {
    type JacobianMatrix = SMatrix<f64, N, N>;

    fn identity() -> Self {
        SVector::zeros()
    }

    fn inverse(&self, jacobian: Option<&mut Self::JacobianMatrix>) -> Self {
        if let Some(jac) = jacobian {
            *jac = -SMatrix::<f64, N, N>::identity();
        }
        -self
    }

    fn compose(
        &self,
        other: &Self,
        jacobian_self: Option<&mut Self::JacobianMatrix>,
        jacobian_other: Option<&mut Self::JacobianMatrix>,
    ) -> Self {
        if let Some(jac_self) = jacobian_self {
            *jac_self = SMatrix::identity();
        }
        if let Some(jac_other) = jacobian_other {
            *jac_other = SMatrix::identity();
        }
        self + other
    }

    fn exp(tangent: &Self::TangentVector, jacobian: Option<&mut Self::JacobianMatrix>) -> Self {
        if let Some(jac) = jacobian {
            *jac = SMatrix::identity();
        }
        *tangent
    }

    fn log(&self, jacobian: Option<&mut Self::JacobianMatrix>) -> Self::TangentVector {
        if let Some(jac) = jacobian {
            *jac = SMatrix::identity();
        }
        *self
    }

    fn right_jacobian(_tangent: &Self::TangentVector) -> Self::JacobianMatrix {
        SMatrix::identity()
    }

    fn right_jacobian_inv(_tangent: &Self::TangentVector) -> Self::JacobianMatrix {
        SMatrix::identity()
    }

    fn jacobian_identity() -> Self::JacobianMatrix {
        SMatrix::identity()
    }

    fn zero_jacobian() -> Self::JacobianMatrix {
        SMatrix::zeros()
    }

    fn random_with<R: rand::Rng>(rng: &mut R) -> Self {
        SVector::from_fn(|_, _| rng.random_range(-1.0..1.0))
    }

    // Vector addition is commutative.
    fn adjoint(&self) -> Self::JacobianMatrix {
        SMatrix::identity()
    }
}
