//! Matrix-free linear algebra over linearized factor graphs.
//!
//! - [`gaussian`]: Jacobian factors and the linearized graph with its forward and
//!   adjoint operators
//! - [`cgls`]: conjugate-gradient least squares over those operators

pub mod cgls;
pub mod gaussian;

pub use cgls::{Cgls, CglsConfig};
pub use gaussian::{GaussianFactorGraph, JacobianFactor};

use crate::core::store::TangentStore;
use std::{
    fmt,
    fmt::{Display, Formatter},
};
use thiserror::Error;
use tracing::error;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum LinearSolverType {
    #[default]
    Cgls,
}

impl Display for LinearSolverType {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            LinearSolverType::Cgls => write!(f, "CGLS"),
        }
    }
}

/// Linear algebra specific error types for tangent-fusion
#[derive(Debug, Clone, Error)]
pub enum LinAlgError {
    /// The iteration produced NaN or Inf
    #[error("Numerical breakdown in iterative solver: {0}")]
    NumericalBreakdown(String),

    /// Operands do not share a layout
    #[error("Dimension mismatch: {0}")]
    DimensionMismatch(String),
}

impl LinAlgError {
    /// Log the error with tracing::error and return self for chaining
    #[must_use]
    pub fn log(self) -> Self {
        error!("{}", self);
        self
    }

    /// Log the error with the original source error
    ///
    /// # Arguments
    /// * `source_error` - The original error (must implement Debug)
    #[must_use]
    pub fn log_with_source<E: std::fmt::Debug>(self, source_error: E) -> Self {
        error!("{} | Source: {:?}", self, source_error);
        self
    }
}

/// Result type for linear algebra operations
pub type LinAlgResult<T> = Result<T, LinAlgError>;

/// Outcome of one linear solve.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearSolveSummary {
    /// Iterations performed
    pub iterations: usize,
    /// Whether the stopping criterion was met before the iteration budget ran out
    pub converged: bool,
    /// `‖A·Δ + b‖` at the returned solution
    pub final_residual_norm: f64,
}

/// Trait for linear least-squares solvers over a linearized graph
pub trait LinearSolver {
    /// Minimize `‖A·Δ + b‖²`, starting from and updating `delta` in place.
    ///
    /// When the iteration budget runs out the best iterate is kept in `delta` and
    /// the summary reports `converged == false`.
    ///
    /// # Errors
    /// Returns `LinAlgError::NumericalBreakdown` if an iterate becomes non-finite.
    fn solve(
        &mut self,
        system: &GaussianFactorGraph,
        delta: &mut TangentStore,
    ) -> LinAlgResult<LinearSolveSummary>;
}
