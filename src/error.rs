//! Error types for the tangent-fusion library
//!
//! Every module owns a `thiserror` enum; [`FusionError`] is the top-level error
//! that wraps them while preserving the source chain.
//!
//! Example error chain:
//! ```text
//! FusionError::Optimizer(
//!     OptimizerError::LinAlg(
//!         LinAlgError::NumericalBreakdown("non-finite iterate at iteration 3")
//!     )
//! )
//! ```
//!
//! Precondition violations (a handle of the wrong type, a missing tangent entry,
//! stores of different shapes) are not represented here: they panic.

use crate::{
    core::CoreError, linalg::LinAlgError, manifold::ManifoldError, observers::ObserverError,
    optimizer::OptimizerError,
};
use std::error::Error as StdError;
use thiserror::Error;

/// Main result type used throughout the tangent-fusion library
pub type FusionResult<T> = Result<T, FusionError>;

/// Main error type for the tangent-fusion library
///
/// ```rust,ignore
/// if let Err(e) = solver.optimize(&graph, &mut values).map_err(FusionError::from) {
///     warn!("Full chain: {}", e.chain());
/// }
/// ```
#[derive(Debug, Error)]
pub enum FusionError {
    /// Variable store and factor graph errors
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Optimization algorithm errors
    #[error(transparent)]
    Optimizer(#[from] OptimizerError),

    /// Linear algebra errors
    #[error(transparent)]
    LinearAlgebra(#[from] LinAlgError),

    /// Manifold element construction errors
    #[error(transparent)]
    Manifold(#[from] ManifoldError),

    /// Observer errors
    #[error(transparent)]
    Observer(#[from] ObserverError),
}

impl FusionError {
    /// Get the full error chain as a string for logging and debugging.
    ///
    /// One line per error, from this error down to the root cause.
    pub fn chain(&self) -> String {
        let mut chain = vec![self.to_string()];
        let mut source = self.source();

        while let Some(err) = source {
            chain.push(format!("  → {err}"));
            source = err.source();
        }

        chain.join("\n")
    }

    /// Get a compact single-line error chain for logging
    ///
    /// ```rust,ignore
    /// error!("Optimization failed: {}", err.chain_compact());
    /// // Output: "Linear algebra error: ... → Numerical breakdown in iterative solver: ..."
    /// ```
    pub fn chain_compact(&self) -> String {
        let mut chain = vec![self.to_string()];
        let mut source = self.source();

        while let Some(err) = source {
            chain.push(err.to_string());
            source = err.source();
        }

        chain.join(" → ")
    }
}
