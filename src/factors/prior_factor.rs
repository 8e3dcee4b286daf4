//! Prior factor for unary constraints on variables.

use crate::core::factor::{Factor, FactorIds, FactorValues};
use crate::core::store::TypedId;
use crate::linalg::gaussian::JacobianFactor;
use crate::manifold::{EuclideanVector, LieGroup, jacobian_to_dmatrix};
use nalgebra::DVector;

/// Prior factor (unary constraint) on a single Lie group variable.
///
/// Represents a direct measurement or prior belief about a variable's value, used to
/// anchor variables (for example the first pose of a SLAM problem) to known values.
///
/// # Mathematical Formulation
///
/// The error is the weighted tangent vector at the prior pointing to the current value:
///
/// ```text
/// e = w · log(x_prior⁻¹ ∘ x)
/// J = w · Jr⁻¹(e / w)
/// ```
///
/// # Example
///
/// ```
/// use tangent_fusion::core::factor::Factor;
/// use tangent_fusion::core::store::VariableAssignments;
/// use tangent_fusion::factors::PriorFactor;
/// use tangent_fusion::manifold::SE2;
///
/// let mut values = VariableAssignments::new();
/// let pose = values.store(SE2::from_xy_angle(0.1, 0.05, 0.02));
///
/// let prior = PriorFactor::new(pose, SE2::from_xy_angle(0.0, 0.0, 0.0)).with_weight(10.0);
/// let error = prior.error_vector_at(&values);
/// assert!((error[0] - 0.2).abs() < 1e-12);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct PriorFactor<M: LieGroup> {
    edges: (TypedId<M>,),
    /// The prior value
    pub prior: M,
    /// Scale applied to the error, the inverse of the standard deviation
    pub weight: f64,
}

impl<M: LieGroup> PriorFactor<M> {
    /// Prior with unit weight.
    pub fn new(variable: TypedId<M>, prior: M) -> Self {
        PriorFactor {
            edges: (variable,),
            prior,
            weight: 1.0,
        }
    }

    /// # Panics
    /// If `weight` is not finite.
    pub fn with_weight(mut self, weight: f64) -> Self {
        assert!(weight.is_finite(), "prior weight must be finite, got {weight}");
        self.weight = weight;
        self
    }
}

impl<M: LieGroup> Factor for PriorFactor<M> {
    type Variables = (M,);
    type ErrorVector = M::TangentVector;

    fn edges(&self) -> &FactorIds<Self> {
        &self.edges
    }

    fn error_vector(&self, values: &FactorValues<Self>) -> M::TangentVector {
        self.prior.local_coordinate(&values.0) * self.weight
    }

    fn linearize(&self, values: &FactorValues<Self>) -> JacobianFactor {
        let prior_inv = self.prior.inverse(None);

        let mut j_diff_wrt_x = M::zero_jacobian();
        let diff = prior_inv.compose(&values.0, None, Some(&mut j_diff_wrt_x));

        let mut j_log_wrt_diff = M::zero_jacobian();
        let residual = diff.log(Some(&mut j_log_wrt_diff)) * self.weight;

        let jacobian = jacobian_to_dmatrix::<M>(&(j_log_wrt_diff * j_diff_wrt_x)) * self.weight;
        JacobianFactor::new(
            vec![self.edges.0.erased()],
            vec![jacobian],
            DVector::from_column_slice(residual.as_slice()),
        )
    }
}
