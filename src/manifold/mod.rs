//! Manifolds and Lie groups used as optimization variables.
//!
//! Every variable type in a factor graph implements [`Manifold`]: it has a
//! fixed-dimension tangent space and a pair of maps between points and tangent
//! vectors at a basepoint.
//!
//! - `retract(p, v)`: the point reached by moving from `p` along `v`
//! - `local_coordinate(p, q)`: the tangent vector at `p` pointing to `q`
//!
//! Lie groups additionally implement [`LieGroup`] and retract through the
//! exponential map with right multiplication:
//!
//! ```text
//! retract(p, v)          = p ∘ exp(v)
//! local_coordinate(p, q) = log(p⁻¹ ∘ q)
//! ```
//!
//! Lie group M,° | size   | dim | X ∈ M             | T_X M             | Exp(T)            | Comp. | Tangent order
//! ------------- | ------ | --- | ----------------- | ----------------- | ----------------- | ----- | -------------
//! n-D vector    | Rⁿ,+   | n   | v ∈ Rⁿ            | v ∈ Rⁿ            | v = exp(v)        | v₁+v₂ | [v]
//! Rotation      | SO(2),.| 1   | z ∈ C, \|z\| = 1  | θ ∈ R             | z = exp(iθ)       | z₁z₂  | [θ]
//! Rigid motion  | SE(2),.| 3   | M = [R t; 0 1]    | [θ, ρ] ∈ R³       | Exp([θ, ρ])       | M₁M₂  | [θ, x, y]
//! Rotation      | SO(3),.| 3   | q ∈ H, \|q\| = 1  | θ ∈ R³            | q = exp(uθ/2)     | q₁q₂  | [θx, θy, θz]
//! Rigid motion  | SE(3),.| 6   | M = [R t; 0 1]    | [θ, ρ] ∈ R⁶       | Exp([θ, ρ])       | M₁M₂  | [ω, v]
//!
//! Tangent vectors of SE(n) are twist coordinates with the rotational part first.
//!
//! # Jacobian convention
//!
//! All optional Jacobian out-parameters use right perturbations: for a map
//! `f: M → N`, `J` satisfies
//!
//! ```text
//! f(X ∘ exp(ε)) ≈ f(X) ∘ exp(J·ε)
//! ```
//!
//! Factor Jacobians built from these compose by plain matrix products.

use nalgebra::{DMatrix, Matrix3, Vector3};
use std::fmt::Debug;
use std::ops::{Add, Index, IndexMut, Mul, Neg};
use thiserror::Error;

pub mod rn;
pub mod se2;
pub mod se3;
pub mod so2;
pub mod so3;
pub mod vector;

pub use se2::SE2;
pub use se3::SE3;
pub use so2::SO2;
pub use so3::SO3;
pub use vector::EuclideanVector;

/// Step used when differentiating group operations numerically.
pub const NUMERICAL_ADJOINT_STEP: f64 = 1e-6;

/// Errors that can occur when building manifold elements from raw data.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ManifoldError {
    /// Raw data had the wrong number of components
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
    /// Numerical instability in computation
    #[error("Numerical instability: {0}")]
    NumericalInstability(String),
    /// Data does not describe a valid group element
    #[error("Invalid manifold element: {0}")]
    InvalidElement(String),
    /// NaN or Inf detected in manifold element
    #[error("Invalid number: NaN or Inf detected")]
    InvalidNumber,
}

/// Result type for manifold operations
pub type ManifoldResult<T> = Result<T, ManifoldError>;

/// A differentiable manifold with a fixed-dimension tangent space.
///
/// `retract` and `local_coordinate` are total functions that are only accurate
/// near the basepoint. They must be mutual local inverses:
///
/// ```text
/// retract(p, 0) = p
/// local_coordinate(p, p) = 0
/// local_coordinate(p, retract(p, v)) ≈ v   for small v
/// ```
pub trait Manifold: Clone + Debug + Send + Sync + 'static {
    /// Tangent vector type at every point of the manifold
    type TangentVector: EuclideanVector;

    /// Degrees of freedom (tangent space dimension)
    const DOF: usize = <Self::TangentVector as EuclideanVector>::DIM;

    /// Move from `self` along `tangent`.
    fn retract(&self, tangent: &Self::TangentVector) -> Self;

    /// Tangent vector at `self` that retracts onto `other`.
    fn local_coordinate(&self, other: &Self) -> Self::TangentVector;
}

/// Core trait for Lie group operations.
///
/// Provides group structure, exponential coordinates and the Jacobians needed to
/// differentiate through composition and inversion. Implementations must keep the
/// right-perturbation convention described in the module docs.
///
/// # Type Parameters
///
/// - `JacobianMatrix`: square `DOF × DOF` matrix type for Jacobians and adjoints
pub trait LieGroup: Manifold + PartialEq {
    /// Jacobian matrix type (`DOF × DOF`)
    type JacobianMatrix: Clone
        + Copy
        + Debug
        + PartialEq
        + Send
        + Sync
        + Neg<Output = Self::JacobianMatrix>
        + Add<Output = Self::JacobianMatrix>
        + Mul<Output = Self::JacobianMatrix>
        + Index<(usize, usize), Output = f64>
        + IndexMut<(usize, usize)>;

    /// Neutral element `e` such that `e ∘ g = g ∘ e = g`.
    fn identity() -> Self;

    /// Group inverse `g⁻¹`.
    ///
    /// # Arguments
    /// * `jacobian` - Optional Jacobian `∂g⁻¹/∂g = -Ad(g)`
    fn inverse(&self, jacobian: Option<&mut Self::JacobianMatrix>) -> Self;

    /// Composition `self ∘ other`.
    ///
    /// # Arguments
    /// * `jacobian_self` - Optional Jacobian with respect to `self`, `Ad(other⁻¹)`
    /// * `jacobian_other` - Optional Jacobian with respect to `other`, `I`
    fn compose(
        &self,
        other: &Self,
        jacobian_self: Option<&mut Self::JacobianMatrix>,
        jacobian_other: Option<&mut Self::JacobianMatrix>,
    ) -> Self;

    /// Exponential map from the tangent space at the identity.
    ///
    /// # Arguments
    /// * `jacobian` - Optional right Jacobian `Jr(tangent)`
    fn exp(tangent: &Self::TangentVector, jacobian: Option<&mut Self::JacobianMatrix>) -> Self;

    /// Logarithmic map to the tangent space at the identity.
    ///
    /// # Arguments
    /// * `jacobian` - Optional inverse right Jacobian `Jr⁻¹(log(self))`
    fn log(&self, jacobian: Option<&mut Self::JacobianMatrix>) -> Self::TangentVector;

    /// Right Jacobian `Jr(τ)`: `exp(τ + δ) ≈ exp(τ) ∘ exp(Jr δ)`.
    fn right_jacobian(tangent: &Self::TangentVector) -> Self::JacobianMatrix;

    /// Inverse right Jacobian `Jr⁻¹(τ)`: `log(exp(τ) ∘ exp(δ)) ≈ τ + Jr⁻¹ δ`.
    fn right_jacobian_inv(tangent: &Self::TangentVector) -> Self::JacobianMatrix;

    /// Identity matrix of the Jacobian type.
    fn jacobian_identity() -> Self::JacobianMatrix;

    /// Zero matrix of the Jacobian type.
    fn zero_jacobian() -> Self::JacobianMatrix;

    /// Random element drawn from `rng`.
    fn random_with<R: rand::Rng>(rng: &mut R) -> Self;

    /// Random element drawn from the thread-local generator.
    fn random() -> Self {
        Self::random_with(&mut rand::rng())
    }

    /// Adjoint matrix `Ad(g)`, with `g ∘ exp(v) = exp(Ad(g) v) ∘ g`.
    ///
    /// The default differentiates conjugation numerically; concrete groups
    /// override it with a closed form.
    fn adjoint(&self) -> Self::JacobianMatrix {
        numerical_adjoint(self)
    }

    /// Transport a tangent vector from the local frame of `self` to the identity: `Ad(g) v`.
    fn adjoint_apply(&self, tangent: &Self::TangentVector) -> Self::TangentVector {
        jacobian_apply::<Self>(&self.adjoint(), tangent)
    }

    /// Apply the transpose of the adjoint: `Ad(g)ᵀ v`.
    fn adjoint_transpose_apply(&self, tangent: &Self::TangentVector) -> Self::TangentVector {
        jacobian_transpose_apply::<Self>(&self.adjoint(), tangent)
    }

    /// Relative element `self⁻¹ ∘ other`.
    ///
    /// # Arguments
    /// * `jacobian_self` - Optional Jacobian with respect to `self`, `-Ad((self⁻¹ ∘ other)⁻¹)`
    /// * `jacobian_other` - Optional Jacobian with respect to `other`, `I`
    fn between(
        &self,
        other: &Self,
        jacobian_self: Option<&mut Self::JacobianMatrix>,
        jacobian_other: Option<&mut Self::JacobianMatrix>,
    ) -> Self {
        let result = self.inverse(None).compose(other, None, None);

        if let Some(jac_self) = jacobian_self {
            *jac_self = -result.inverse(None).adjoint();
        }

        if let Some(jac_other) = jacobian_other {
            *jac_other = Self::jacobian_identity();
        }

        result
    }

    /// Right plus `g ⊕ τ = g ∘ exp(τ)`.
    ///
    /// # Arguments
    /// * `jacobian_self` - Optional Jacobian with respect to `g`, `Ad(exp(τ)⁻¹)`
    /// * `jacobian_tangent` - Optional Jacobian with respect to `τ`, `Jr(τ)`
    fn right_plus(
        &self,
        tangent: &Self::TangentVector,
        jacobian_self: Option<&mut Self::JacobianMatrix>,
        jacobian_tangent: Option<&mut Self::JacobianMatrix>,
    ) -> Self {
        let exp_tangent = Self::exp(tangent, None);

        if let Some(jac_tangent) = jacobian_tangent {
            *jac_tangent = Self::right_jacobian(tangent);
        }

        self.compose(&exp_tangent, jacobian_self, None)
    }

    /// Right minus `g₁ ⊖ g₂ = log(g₂⁻¹ ∘ g₁)`.
    ///
    /// # Arguments
    /// * `jacobian_self` - Optional Jacobian with respect to `g₁`, `Jr⁻¹(τ)`
    /// * `jacobian_other` - Optional Jacobian with respect to `g₂`, `-Jl⁻¹(τ)`
    fn right_minus(
        &self,
        other: &Self,
        jacobian_self: Option<&mut Self::JacobianMatrix>,
        jacobian_other: Option<&mut Self::JacobianMatrix>,
    ) -> Self::TangentVector {
        let difference = other.inverse(None).compose(self, None, None);
        let tangent = difference.log(None);

        if let Some(jac_self) = jacobian_self {
            *jac_self = Self::right_jacobian_inv(&tangent);
        }

        if let Some(jac_other) = jacobian_other {
            // Jl⁻¹(τ) = Jr⁻¹(-τ)
            *jac_other = -Self::right_jacobian_inv(&(-tangent));
        }

        tangent
    }

    /// Check if the element is approximately equal to another element.
    fn is_approx(&self, other: &Self, tolerance: f64) -> bool {
        self.local_coordinate(other).norm() < tolerance
    }
}

/// Adjoint of `group` derived from composition, inversion and the exponential map.
///
/// Column `i` is the central difference of `log(g ∘ exp(h eᵢ) ∘ g⁻¹)` in `h`.
pub fn numerical_adjoint<G: LieGroup>(group: &G) -> G::JacobianMatrix {
    let h = NUMERICAL_ADJOINT_STEP;
    let group_inverse = group.inverse(None);
    let mut adjoint = G::zero_jacobian();

    for (col, basis) in G::TangentVector::standard_basis().iter().enumerate() {
        let conjugate = |scale: f64| {
            group
                .compose(&G::exp(&(*basis * scale), None), None, None)
                .compose(&group_inverse, None, None)
                .log(None)
        };
        let column = (conjugate(h) - conjugate(-h)) * (0.5 / h);
        for (row, value) in column.as_slice().iter().enumerate() {
            adjoint[(row, col)] = *value;
        }
    }

    adjoint
}

/// Matrix-vector product `J v` for a group Jacobian.
pub fn jacobian_apply<G: LieGroup>(
    jacobian: &G::JacobianMatrix,
    tangent: &G::TangentVector,
) -> G::TangentVector {
    let input = tangent.as_slice();
    let output: Vec<f64> = (0..G::DOF)
        .map(|row| (0..G::DOF).map(|col| jacobian[(row, col)] * input[col]).sum())
        .collect();
    G::TangentVector::from_slice(&output)
}

/// Matrix-vector product `Jᵀ v` for a group Jacobian.
pub fn jacobian_transpose_apply<G: LieGroup>(
    jacobian: &G::JacobianMatrix,
    tangent: &G::TangentVector,
) -> G::TangentVector {
    let input = tangent.as_slice();
    let output: Vec<f64> = (0..G::DOF)
        .map(|col| (0..G::DOF).map(|row| jacobian[(row, col)] * input[row]).sum())
        .collect();
    G::TangentVector::from_slice(&output)
}

/// Copy a group Jacobian into a dynamically sized matrix.
pub fn jacobian_to_dmatrix<G: LieGroup>(jacobian: &G::JacobianMatrix) -> DMatrix<f64> {
    DMatrix::from_fn(G::DOF, G::DOF, |row, col| jacobian[(row, col)])
}

/// Skew-symmetric matrix `[v]×`, with `[v]× w = v × w`.
pub fn skew(v: &Vector3<f64>) -> Matrix3<f64> {
    Matrix3::new(0.0, -v.z, v.y, v.z, 0.0, -v.x, -v.y, v.x, 0.0)
}

/// Wrap an angle to `(-π, π]`.
pub fn wrap_angle(angle: f64) -> f64 {
    let wrapped = angle.sin().atan2(angle.cos());
    if wrapped <= -std::f64::consts::PI {
        wrapped + 2.0 * std::f64::consts::PI
    } else {
        wrapped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOLERANCE: f64 = 1e-12;

    #[test]
    fn test_skew_matches_cross_product() {
        let v = Vector3::new(0.3, -1.2, 2.0);
        let w = Vector3::new(-0.7, 0.4, 1.5);
        let difference = skew(&v) * w - v.cross(&w);
        assert!(difference.norm() < TOLERANCE);
    }

    #[test]
    fn test_wrap_angle() {
        use std::f64::consts::PI;
        assert!((wrap_angle(3.0 * PI) - PI).abs() < 1e-9);
        assert!((wrap_angle(-0.5) + 0.5).abs() < TOLERANCE);
        assert!((wrap_angle(2.0 * PI + 0.25) - 0.25).abs() < 1e-9);
    }

    #[test]
    fn test_manifold_error_display() {
        let error = ManifoldError::DimensionMismatch {
            expected: 3,
            actual: 2,
        };
        assert_eq!(error.to_string(), "Dimension mismatch: expected 3, got 2");
        assert_eq!(
            ManifoldError::InvalidNumber.to_string(),
            "Invalid number: NaN or Inf detected"
        );
        let dynamic: &dyn std::error::Error = &error;
        assert!(dynamic.source().is_none());
    }
}
