//! Factor implementations for graph-based optimization problems.
//!
//! Factors represent measurements or relationships between variables in a factor
//! graph. Each factor computes an error vector from the values of its edges and
//! linearizes it into one Jacobian block per edge.
//!
//! # Factor Graph Formulation
//!
//! ```text
//! minimize Σ_i ½ ||e_i(x)||²
//! ```
//!
//! where `x` is the set of variables (poses, rotations, landmarks) and `e_i` the
//! weighted error of factor `i`.
//!
//! # Factor Types
//!
//! - [`PriorFactor`]: unary constraint anchoring a variable to a known value
//! - [`BetweenFactor`]: relative motion between two variables of the same Lie group
//! - [`BearingRangeFactor2`]: bearing and range from an SE(2) pose to a 2D landmark
//!
//! # Linearization
//!
//! All factors here supply closed-form Jacobians built from the group Jacobians
//! of the [`manifold`](crate::manifold) module. The generic numerical path stays
//! available through [`Factor::linearize_numerically`](crate::core::factor::Factor::linearize_numerically)
//! and the two are tested against each other.

pub mod bearing_range_factor;
pub mod between_factor;
pub mod prior_factor;

pub use bearing_range_factor::BearingRangeFactor2;
pub use between_factor::BetweenFactor;
pub use prior_factor::PriorFactor;

#[cfg(test)]
pub(crate) mod test_support {
    use crate::linalg::gaussian::JacobianFactor;

    /// Assert that two linearizations of the same factor agree to `tolerance`,
    /// relative to the magnitude of each block.
    pub fn assert_linearizations_agree(
        analytic: &JacobianFactor,
        numerical: &JacobianFactor,
        tolerance: f64,
    ) {
        assert_eq!(analytic.edges(), numerical.edges());
        let residual_difference = (analytic.residual() - numerical.residual()).norm();
        assert!(
            residual_difference <= tolerance * (1.0 + analytic.residual().norm()),
            "residuals differ by {residual_difference:e}"
        );
        for (edge, (a, n)) in analytic.blocks().iter().zip(numerical.blocks()).enumerate() {
            let difference = (a - n).norm();
            assert!(
                difference <= tolerance * (1.0 + a.norm()),
                "block {edge} differs by {difference:e}\nanalytic: {a}\nnumerical: {n}"
            );
        }
    }
}
