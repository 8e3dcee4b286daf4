//! The factor contract.
//!
//! A factor references a fixed tuple of variables (its *edges*), computes an error
//! vector from their values and linearizes it into a [`JacobianFactor`]: one dense
//! block per edge mapping that edge's tangent space to the error space, plus the
//! error at the linearization point.
//!
//! Every factor gets a linearization for free through
//! [`numerical_linearization`], which differentiates `error_vector` by central
//! differences along each edge's retraction. Factors with a known closed form
//! override [`Factor::linearize`]; both paths must agree.
//!
//! # Example
//!
//! ```
//! use tangent_fusion::core::factor::Factor;
//! use tangent_fusion::core::store::{TypedId, VariableAssignments};
//! use tangent_fusion::manifold::EuclideanVector;
//! use nalgebra::Vector2;
//!
//! /// Pulls a 2D point towards a target.
//! #[derive(Debug)]
//! struct Anchor {
//!     edges: (TypedId<Vector2<f64>>,),
//!     target: Vector2<f64>,
//! }
//!
//! impl Factor for Anchor {
//!     type Variables = (Vector2<f64>,);
//!     type ErrorVector = Vector2<f64>;
//!
//!     fn edges(&self) -> &(TypedId<Vector2<f64>>,) {
//!         &self.edges
//!     }
//!
//!     fn error_vector(&self, values: &(Vector2<f64>,)) -> Vector2<f64> {
//!         values.0 - self.target
//!     }
//! }
//!
//! let mut values = VariableAssignments::new();
//! let point = values.store(Vector2::new(1.0, 2.0));
//! let anchor = Anchor { edges: (point,), target: Vector2::zeros() };
//!
//! let linear = anchor.linearize(&(values[point],));
//! assert!((linear.blocks()[0][(0, 0)] - 1.0).abs() < 1e-8);
//! assert!((anchor.error(&(values[point],)) - 2.5).abs() < 1e-12);
//! ```

use crate::core::store::{AnyId, TypedId, VariableAssignments};
use crate::linalg::gaussian::JacobianFactor;
use crate::manifold::{EuclideanVector, Manifold};
use nalgebra::{DMatrix, DVector};
use std::fmt::Debug;

/// Step used by [`numerical_linearization`].
pub const NUMERICAL_DIFFERENTIATION_STEP: f64 = 1e-6;

/// A fixed tuple of manifold-valued variables a factor is connected to.
///
/// Implemented for 1-, 2- and 3-tuples of [`Manifold`] types.
pub trait VariableTuple: 'static {
    /// Tuple of typed handles, one per edge.
    type Ids: Copy + Debug + Send + Sync;
    /// Tuple of values, one per edge.
    type Values: Clone + Debug + Send + Sync;

    /// Number of edges.
    const ARITY: usize;

    /// Read the values at `ids` out of `values`.
    fn read(ids: &Self::Ids, values: &VariableAssignments) -> Self::Values;

    /// Type-erased handles in edge order.
    fn erased_ids(ids: &Self::Ids) -> Vec<AnyId>;

    /// Tangent dimension of every edge.
    fn tangent_dims() -> Vec<usize>;

    /// Copy of `values` with the value at `edge` retracted by `delta`.
    ///
    /// # Panics
    /// If `edge >= ARITY` or `delta` has the wrong length.
    fn perturbed(values: &Self::Values, edge: usize, delta: &[f64]) -> Self::Values;
}

macro_rules! impl_variable_tuple {
    ($arity:expr; $($name:ident => $idx:tt),+) => {
        impl<$($name: Manifold),+> VariableTuple for ($($name,)+) {
            type Ids = ($(TypedId<$name>,)+);
            type Values = ($($name,)+);

            const ARITY: usize = $arity;

            fn read(ids: &Self::Ids, values: &VariableAssignments) -> Self::Values {
                ($(values.get(ids.$idx).clone(),)+)
            }

            fn erased_ids(ids: &Self::Ids) -> Vec<AnyId> {
                vec![$(ids.$idx.erased()),+]
            }

            fn tangent_dims() -> Vec<usize> {
                vec![$(<$name as Manifold>::DOF),+]
            }

            fn perturbed(values: &Self::Values, edge: usize, delta: &[f64]) -> Self::Values {
                assert!(edge < $arity, "edge {edge} out of range for a {}-ary factor", $arity);
                let mut perturbed = values.clone();
                $(
                    if edge == $idx {
                        let tangent =
                            <<$name as Manifold>::TangentVector as EuclideanVector>::from_slice(delta);
                        perturbed.$idx = values.$idx.retract(&tangent);
                    }
                )+
                perturbed
            }
        }
    };
}

impl_variable_tuple!(1; A => 0);
impl_variable_tuple!(2; A => 0, B => 1);
impl_variable_tuple!(3; A => 0, B => 1, C => 2);

/// Values read for the edges of factor `F`.
pub type FactorValues<F> = <<F as Factor>::Variables as VariableTuple>::Values;

/// Handles of the edges of factor `F`.
pub type FactorIds<F> = <<F as Factor>::Variables as VariableTuple>::Ids;

/// A single error term connecting a fixed set of variables.
///
/// Factors are immutable once constructed. `error_vector` must be a pure function
/// of the edge values.
pub trait Factor: Debug + Send + Sync + Sized + 'static {
    /// Variable types at the edges, in order
    type Variables: VariableTuple;
    /// Error space of this factor
    type ErrorVector: EuclideanVector;

    /// Handles of the connected variables.
    fn edges(&self) -> &FactorIds<Self>;

    /// Error vector at the given edge values.
    fn error_vector(&self, values: &FactorValues<Self>) -> Self::ErrorVector;

    /// Scalar error `0.5 * ‖e‖²`.
    fn error(&self, values: &FactorValues<Self>) -> f64 {
        0.5 * self.error_vector(values).squared_norm()
    }

    /// Jacobian blocks and residual at `values`.
    ///
    /// Defaults to [`numerical_linearization`].
    fn linearize(&self, values: &FactorValues<Self>) -> JacobianFactor {
        numerical_linearization(self, values)
    }

    /// Linearization by numerical differentiation, regardless of any override of
    /// [`Factor::linearize`].
    fn linearize_numerically(&self, values: &FactorValues<Self>) -> JacobianFactor {
        numerical_linearization(self, values)
    }

    /// Error vector read directly from a variable store.
    fn error_vector_at(&self, values: &VariableAssignments) -> Self::ErrorVector {
        self.error_vector(&Self::Variables::read(self.edges(), values))
    }
}

/// Linearize `factor` by central differences along every edge's retraction.
///
/// Column `j` of the block for edge `i` is
/// `(e(retract(xᵢ, h·eⱼ)) - e(retract(xᵢ, -h·eⱼ))) / 2h`.
pub fn numerical_linearization<F: Factor>(factor: &F, values: &FactorValues<F>) -> JacobianFactor {
    let h = NUMERICAL_DIFFERENTIATION_STEP;
    let residual = factor.error_vector(values);
    let rows = <F::ErrorVector as EuclideanVector>::DIM;

    let blocks = F::Variables::tangent_dims()
        .into_iter()
        .enumerate()
        .map(|(edge, dim)| {
            let mut block = DMatrix::zeros(rows, dim);
            let mut delta = vec![0.0; dim];
            for col in 0..dim {
                delta[col] = h;
                let plus = factor.error_vector(&F::Variables::perturbed(values, edge, &delta));
                delta[col] = -h;
                let minus = factor.error_vector(&F::Variables::perturbed(values, edge, &delta));
                delta[col] = 0.0;
                let column = (plus - minus) * (0.5 / h);
                block.column_mut(col).copy_from_slice(column.as_slice());
            }
            block
        })
        .collect();

    JacobianFactor::new(
        F::Variables::erased_ids(factor.edges()),
        blocks,
        DVector::from_column_slice(residual.as_slice()),
    )
}
