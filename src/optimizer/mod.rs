//! Optimization solvers for nonlinear least squares on factor graphs.
//!
//! Every optimizer minimizes the total graph error
//!
//! ```text
//! E(x) = Σᵢ ½‖eᵢ(x)‖²
//! ```
//!
//! over a [`VariableAssignments`], stepping in the tangent spaces of the
//! variables and moving them with each manifold's retraction:
//! - Levenberg-Marquardt (damped Gauss-Newton solved with CGLS)
//! - Gradient descent on the error gradient
//! - Nonlinear conjugate gradient with a backtracking line search

use crate::core::graph::FactorGraph;
use crate::core::store::VariableAssignments;
use crate::linalg;
use std::{
    fmt,
    fmt::{Display, Formatter},
};
use thiserror::Error;
use tracing::error;
use web_time::Duration;

pub mod gradient_descent;
pub mod levenberg_marquardt;
pub mod nonlinear_cg;

pub use gradient_descent::{GradientDescent, GradientDescentConfig};
pub use levenberg_marquardt::{LevenbergMarquardt, LevenbergMarquardtConfig};
pub use nonlinear_cg::{NonlinearCgConfig, NonlinearConjugateGradient};

// Re-export observer types from the observers module
pub use crate::observers::{OptObserver, OptObserverVec};

/// Type of optimization algorithm
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum OptimizerType {
    /// Levenberg-Marquardt algorithm (robust, adaptive damping)
    #[default]
    LevenbergMarquardt,
    /// Fixed learning-rate gradient descent
    GradientDescent,
    /// Polak-Ribière nonlinear conjugate gradient
    NonlinearConjugateGradient,
}

impl Display for OptimizerType {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            OptimizerType::LevenbergMarquardt => write!(f, "Levenberg-Marquardt"),
            OptimizerType::GradientDescent => write!(f, "Gradient Descent"),
            OptimizerType::NonlinearConjugateGradient => write!(f, "Nonlinear Conjugate Gradient"),
        }
    }
}

/// Optimizer-specific error types
#[derive(Debug, Clone, Error)]
pub enum OptimizerError {
    /// Damping parameter exceeded its bound without an accepted step (LM-specific)
    #[error("Damping parameter became too large: {damping:.6e} > {max_damping:.6e}")]
    DampingFailure { damping: f64, max_damping: f64 },

    /// Invalid optimization parameters provided
    #[error("Invalid optimization parameters: {0}")]
    InvalidParameters(String),

    /// NaN or Inf in the error or the variables
    #[error("Numerical instability detected: {0}")]
    NumericalInstability(String),

    /// Linear algebra operation failed
    #[error("Linear algebra error: {0}")]
    LinAlg(#[from] linalg::LinAlgError),

    /// Graph has no factors or the assignment has no variables
    #[error("Problem has no factors or no variables to optimize")]
    EmptyProblem,
}

impl OptimizerError {
    /// Log the error with tracing::error and return self for chaining
    ///
    /// # Example
    /// ```ignore
    /// operation()
    ///     .map_err(|e| OptimizerError::from(e).log())?;
    /// ```
    #[must_use]
    pub fn log(self) -> Self {
        error!("{}", self);
        self
    }

    /// Log the error with the original source error
    #[must_use]
    pub fn log_with_source<E: std::fmt::Debug>(self, source_error: E) -> Self {
        error!("{} | Source: {:?}", self, source_error);
        self
    }
}

/// Result type for optimizer operations
pub type OptimizerResult<T> = Result<T, OptimizerError>;

/// Status of a finished optimization
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptimizationStatus {
    /// A convergence criterion was met
    Converged,
    /// The iteration budget ran out first; the values are a best effort
    MaxIterationsReached,
}

impl Display for OptimizationStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            OptimizationStatus::Converged => write!(f, "Converged"),
            OptimizationStatus::MaxIterationsReached => write!(f, "Maximum iterations reached"),
        }
    }
}

/// Amount of diagnostic output. Never changes control flow.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Verbosity {
    #[default]
    Silent,
    /// One `info!` summary per optimization
    Summary,
    /// Per-iteration tables through `debug!`
    Trial,
}

/// Outcome of a gradient-based optimization.
#[derive(Debug, Clone)]
pub struct OptimizerSummary {
    pub optimizer: OptimizerType,
    pub status: OptimizationStatus,
    pub iterations: usize,
    pub initial_error: f64,
    pub final_error: f64,
    pub final_gradient_norm: f64,
    pub total_time: Duration,
}

impl OptimizerSummary {
    pub fn converged(&self) -> bool {
        self.status == OptimizationStatus::Converged
    }
}

impl Display for OptimizerSummary {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} Final Result", self.optimizer)?;
        writeln!(f, "{}", self.status)?;
        writeln!(f)?;
        writeln!(f, "Error:")?;
        writeln!(f, "  Initial:   {:.6e}", self.initial_error)?;
        writeln!(f, "  Final:     {:.6e}", self.final_error)?;
        writeln!(f, "  Gradient:  {:.2e}", self.final_gradient_norm)?;
        writeln!(f, "Iterations:  {}", self.iterations)?;
        writeln!(
            f,
            "Total time:  {:.2}ms",
            self.total_time.as_secs_f64() * 1000.0
        )
    }
}

/// Common interface of the optimizers in this module.
pub trait Optimizer {
    type Summary;

    /// Minimize the error of `graph`, updating `values` in place.
    fn optimize(
        &mut self,
        graph: &FactorGraph,
        values: &mut VariableAssignments,
    ) -> OptimizerResult<Self::Summary>;
}

/// Reject empty problems and return the finite initial error.
pub(crate) fn initial_error(
    graph: &FactorGraph,
    values: &VariableAssignments,
) -> OptimizerResult<f64> {
    if graph.is_empty() || values.is_empty() {
        return Err(OptimizerError::EmptyProblem.log());
    }
    let error = graph.error(values);
    if !error.is_finite() {
        return Err(
            OptimizerError::NumericalInstability(format!("initial error is {error}")).log(),
        );
    }
    Ok(error)
}

pub(crate) fn check_positive(name: &str, value: f64) -> OptimizerResult<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(OptimizerError::InvalidParameters(format!(
            "{name} must be positive and finite, got {value}"
        ))
        .log())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::factors::PriorFactor;
    use crate::manifold::SE2;

    #[test]
    fn test_initial_error_rejects_empty_problem() {
        let graph = FactorGraph::new();
        let values = VariableAssignments::new();
        assert!(matches!(
            initial_error(&graph, &values),
            Err(OptimizerError::EmptyProblem)
        ));
    }

    #[test]
    fn test_initial_error_rejects_non_finite() {
        let mut values = VariableAssignments::new();
        let x = values.store(SE2::from_xy_angle(f64::NAN, 0.0, 0.0));
        let mut graph = FactorGraph::new();
        graph.add(PriorFactor::new(x, SE2::from_xy_angle(0.0, 0.0, 0.0)));
        assert!(matches!(
            initial_error(&graph, &values),
            Err(OptimizerError::NumericalInstability(_))
        ));
    }

    #[test]
    fn test_check_positive() {
        assert!(check_positive("lambda", 1e-4).is_ok());
        assert!(check_positive("lambda", 0.0).is_err());
        assert!(check_positive("lambda", f64::INFINITY).is_err());
    }

    #[test]
    fn test_display() {
        assert_eq!(OptimizationStatus::Converged.to_string(), "Converged");
        assert_eq!(OptimizerType::default().to_string(), "Levenberg-Marquardt");
        assert!(Verbosity::Trial > Verbosity::Summary);
    }
}
