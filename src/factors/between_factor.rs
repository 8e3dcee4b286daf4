use crate::core::factor::{Factor, FactorIds, FactorValues};
use crate::core::store::TypedId;
use crate::linalg::gaussian::JacobianFactor;
use crate::manifold::{EuclideanVector, LieGroup, jacobian_to_dmatrix};
use nalgebra::DVector;

/// Generic between factor for Lie group relative-motion constraints.
///
/// Represents a relative measurement `T_ij` between two variables of the same Lie
/// group (odometry, loop closures, relative rotations).
///
/// # Mathematical Formulation
///
/// ```text
/// e = w · log(T_ij⁻¹ ∘ T_i⁻¹ ∘ T_j)
/// ```
///
/// The error has the dimension of the group's tangent space, rotation first for
/// SE(2) and SE(3).
///
/// # Jacobian Computation
///
/// The Jacobians are chained from the group operations:
/// 1. **Inverse**: `T_i⁻¹` with Jacobian `∂(T_i⁻¹)/∂T_i`
/// 2. **Composition**: `T_i⁻¹ ∘ T_j` with Jacobians for both operands
/// 3. **Composition**: `T_ij⁻¹ ∘ (T_i⁻¹ ∘ T_j)` with Jacobian for the right operand
/// 4. **Logarithm**: `log(...)` with Jacobian `Jr⁻¹`
///
/// which gives `∂e/∂T_i = -w·Jr⁻¹(r)·Ad((T_i⁻¹T_j)⁻¹)` and `∂e/∂T_j = w·Jr⁻¹(r)`.
///
/// # Examples
///
/// ```
/// use tangent_fusion::core::factor::Factor;
/// use tangent_fusion::core::store::VariableAssignments;
/// use tangent_fusion::factors::BetweenFactor;
/// use tangent_fusion::manifold::SE2;
///
/// let mut values = VariableAssignments::new();
/// let x0 = values.store(SE2::from_xy_angle(0.0, 0.0, 0.0));
/// let x1 = values.store(SE2::from_xy_angle(0.95, 0.05, 0.12));
///
/// // Measurement: moved 1m forward and rotated 0.1 rad
/// let between = BetweenFactor::new(x0, x1, SE2::from_xy_angle(1.0, 0.0, 0.1));
/// let error = between.error_vector_at(&values);
/// assert!(error.norm() < 0.1);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct BetweenFactor<T: LieGroup> {
    edges: (TypedId<T>, TypedId<T>),
    /// The measured relative transformation from the first to the second variable
    pub relative_pose: T,
    /// Scale applied to the error, the inverse of the standard deviation
    pub weight: f64,
}

impl<T: LieGroup> BetweenFactor<T> {
    /// Between factor with unit weight.
    pub fn new(from: TypedId<T>, to: TypedId<T>, relative_pose: T) -> Self {
        BetweenFactor {
            edges: (from, to),
            relative_pose,
            weight: 1.0,
        }
    }

    /// # Panics
    /// If `weight` is not finite.
    pub fn with_weight(mut self, weight: f64) -> Self {
        assert!(weight.is_finite(), "between weight must be finite, got {weight}");
        self.weight = weight;
        self
    }
}

impl<T: LieGroup> Factor for BetweenFactor<T> {
    type Variables = (T, T);
    type ErrorVector = T::TangentVector;

    fn edges(&self) -> &FactorIds<Self> {
        &self.edges
    }

    fn error_vector(&self, values: &FactorValues<Self>) -> T::TangentVector {
        let (from, to) = values;
        let relative = from.between(to, None, None);
        self.relative_pose.inverse(None).compose(&relative, None, None).log(None) * self.weight
    }

    fn linearize(&self, values: &FactorValues<Self>) -> JacobianFactor {
        let (from, to) = values;

        // Step 1: from.inverse()
        let mut j_from_inv_wrt_from = T::zero_jacobian();
        let from_inv = from.inverse(Some(&mut j_from_inv_wrt_from));

        // Step 2: from_inv * to
        let mut j_relative_wrt_from_inv = T::zero_jacobian();
        let mut j_relative_wrt_to = T::zero_jacobian();
        let relative = from_inv.compose(
            to,
            Some(&mut j_relative_wrt_from_inv),
            Some(&mut j_relative_wrt_to),
        );

        // Step 3: measured⁻¹ * relative
        let mut j_diff_wrt_relative = T::zero_jacobian();
        let diff = self.relative_pose.inverse(None).compose(
            &relative,
            None,
            Some(&mut j_diff_wrt_relative),
        );

        // Step 4: diff.log()
        let mut j_log_wrt_diff = T::zero_jacobian();
        let residual = diff.log(Some(&mut j_log_wrt_diff)) * self.weight;

        let j_error_wrt_relative = j_log_wrt_diff * j_diff_wrt_relative;
        let jacobian_wrt_from =
            j_error_wrt_relative * j_relative_wrt_from_inv * j_from_inv_wrt_from;
        let jacobian_wrt_to = j_error_wrt_relative * j_relative_wrt_to;

        JacobianFactor::new(
            vec![self.edges.0.erased(), self.edges.1.erased()],
            vec![
                jacobian_to_dmatrix::<T>(&jacobian_wrt_from) * self.weight,
                jacobian_to_dmatrix::<T>(&jacobian_wrt_to) * self.weight,
            ],
            DVector::from_column_slice(residual.as_slice()),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::store::VariableAssignments;
    use crate::factors::test_support::assert_linearizations_agree;
    use crate::manifold::{Manifold, SE2, SE3, SO2, SO3};
    use nalgebra::{Vector3, Vector6};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use std::f64::consts::FRAC_PI_2;

    fn random_near<T: LieGroup>(rng: &mut StdRng, base: &T, radius: f64) -> T {
        let offset: Vec<f64> = (0..T::DOF)
            .map(|_| rng.random_range(-radius..radius))
            .collect();
        base.retract(&T::TangentVector::from_slice(&offset))
    }

    fn check_dual_path<T: LieGroup>(seed: u64, weight: f64) {
        let mut rng = StdRng::seed_from_u64(seed);
        for _ in 0..25 {
            let from = T::random_with(&mut rng);
            let to = random_near(&mut rng, &from, 1.0);
            let measured = random_near(&mut rng, &from.between(&to, None, None), 0.3);

            let mut values = VariableAssignments::new();
            let a = values.store(from.clone());
            let b = values.store(to.clone());
            let factor = BetweenFactor::new(a, b, measured).with_weight(weight);
            let edge_values = (from, to);
            assert_linearizations_agree(
                &factor.linearize(&edge_values),
                &factor.linearize_numerically(&edge_values),
                1e-6,
            );
        }
    }

    #[test]
    fn test_between_dual_path_se2() {
        check_dual_path::<SE2>(10, 1.0);
    }

    #[test]
    fn test_between_dual_path_se3() {
        check_dual_path::<SE3>(11, 2.0);
    }

    #[test]
    fn test_between_dual_path_so3() {
        check_dual_path::<SO3>(12, 1.0);
    }

    #[test]
    fn test_between_dual_path_so2() {
        check_dual_path::<SO2>(13, 5.0);
    }

    #[test]
    fn test_between_zero_error_for_exact_measurement() {
        let mut values = VariableAssignments::new();
        let a = values.store(SE2::from_xy_angle(0.0, 0.0, 0.0));
        let b = values.store(SE2::from_xy_angle(2.0, 0.0, FRAC_PI_2));
        let factor = BetweenFactor::new(a, b, SE2::from_xy_angle(2.0, 0.0, FRAC_PI_2));
        assert!(factor.error_vector_at(&values).norm() < 1e-12);
    }

    #[test]
    fn test_between_jacobian_structure_at_solution() {
        let from = SE3::random();
        let to = from.retract(&Vector6::new(0.1, -0.2, 0.3, 1.0, 0.5, -0.5));
        let mut values = VariableAssignments::new();
        let a = values.store(from);
        let b = values.store(to);
        let factor = BetweenFactor::new(a, b, from.between(&to, None, None));
        let linear = factor.linearize(&(from, to));

        // At zero error Jr⁻¹ = I, so ∂e/∂to = I and ∂e/∂from = -Ad((from⁻¹to)⁻¹).
        let identity = nalgebra::DMatrix::<f64>::identity(6, 6);
        assert!((&linear.blocks()[1] - &identity).norm() < 1e-9);
        let adjoint =
            jacobian_to_dmatrix::<SE3>(&from.between(&to, None, None).inverse(None).adjoint());
        assert!((&linear.blocks()[0] + adjoint).norm() < 1e-9);
    }

    #[test]
    fn test_between_error_rotation_first() {
        let mut values = VariableAssignments::new();
        let a = values.store(SE2::from_xy_angle(0.0, 0.0, 0.0));
        let b = values.store(SE2::from_xy_angle(0.0, 0.0, 0.3));
        let factor = BetweenFactor::new(a, b, SE2::from_xy_angle(0.0, 0.0, 0.0));
        let error = factor.error_vector_at(&values);
        assert!((error - Vector3::new(0.3, 0.0, 0.0)).norm() < 1e-12);
    }
}
