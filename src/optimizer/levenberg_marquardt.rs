//! Levenberg-Marquardt algorithm implementation.
//!
//! The Levenberg-Marquardt (LM) method minimizes the total graph error
//!
//! ```text
//! E(x) = ½ Σᵢ ‖eᵢ(x)‖²
//! ```
//!
//! by repeatedly linearizing the graph at the current assignment and solving the
//! damped linear least squares problem
//!
//! ```text
//! min_Δ ½‖A·Δ + b‖² + ½λ‖Δ‖²
//! ```
//!
//! with [`Cgls`]. The damping enters the linear system as one `√λ·I` Jacobian
//! factor per variable, so the solver never forms `AᵀA`.
//!
//! # Lambda Search
//!
//! Each outer iteration runs an inner search over λ:
//!
//! ```text
//! Δe     = E(x) - E(x ⊕ Δ)                    actual reduction
//! Δe_lin = L(0) - L(Δ)                         reduction of the damped linear model
//! ρ      = Δe / Δe_lin                         model fidelity
//! ```
//!
//! - **Accept** (`Δe > 0` and `ρ > 0.01`): keep `x ⊕ Δ`, `λ ← max(λ / f, λ_min)`
//! - **Reject**: keep `x`, `λ ← λ · f`; once `λ > λ_max` the optimization fails
//!   with [`OptimizerError::DampingFailure`]
//!
//! A CGLS numerical breakdown counts as a rejected trial.
//!
//! # Convergence
//!
//! The optimization stops with [`OptimizationStatus::Converged`] when any trial
//! has `ρ > 0.5` and `Δe < precision` or reaches an error below `precision`, or
//! when the squared gradient norm falls below `precision`. A trial that reaches
//! a lower error this way is kept even if `ρ ≤ 0.01`. When
//! the outer iteration budget runs out the current values are kept and the
//! status is [`OptimizationStatus::MaxIterationsReached`].
//!
//! # Example
//!
//! ```
//! use tangent_fusion::core::graph::FactorGraph;
//! use tangent_fusion::core::store::VariableAssignments;
//! use tangent_fusion::factors::PriorFactor;
//! use tangent_fusion::manifold::SE2;
//! use tangent_fusion::optimizer::{LevenbergMarquardt, LevenbergMarquardtConfig};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut values = VariableAssignments::new();
//! let x = values.store(SE2::from_xy_angle(1.0, 0.0, 0.0));
//!
//! let mut graph = FactorGraph::new();
//! graph.add(PriorFactor::new(x, SE2::from_xy_angle(0.0, 0.0, 0.0)));
//!
//! let config = LevenbergMarquardtConfig::new().with_max_iterations(20);
//! let mut solver = LevenbergMarquardt::with_config(config);
//! let summary = solver.optimize(&graph, &mut values)?;
//! assert!(summary.final_error < 1e-8);
//! assert!(values[x].x().abs() < 1e-4);
//! # Ok(())
//! # }
//! ```
//!
//! # References
//!
//! - Levenberg, K. (1944). "A Method for the Solution of Certain Non-Linear Problems in Least Squares".
//! - Marquardt, D. W. (1963). "An Algorithm for Least-Squares Estimation of Nonlinear Parameters".
//! - Björck, Å. (1996). *Numerical Methods for Least Squares Problems*. SIAM. Section 7.4.

use crate::core::graph::FactorGraph;
use crate::core::store::VariableAssignments;
use crate::linalg::cgls::{Cgls, CglsConfig};
use crate::linalg::{GaussianFactorGraph, LinAlgError, LinearSolver, LinearSolverType};
use crate::optimizer::{
    OptObserver, OptObserverVec, OptimizationStatus, Optimizer, OptimizerError,
    OptimizerResult, Verbosity, check_positive, initial_error,
};
use std::{
    fmt,
    fmt::{Display, Formatter},
};
use tracing::{debug, info};
use web_time::{Duration, Instant};

/// Minimum model fidelity for accepting a step
const MIN_STEP_QUALITY: f64 = 0.01;
/// Model fidelity above which a tiny reduction counts as convergence
const GOOD_STEP_QUALITY: f64 = 0.5;

/// Summary statistics for the Levenberg-Marquardt optimization process.
#[derive(Debug, Clone)]
pub struct LevenbergMarquardtSummary {
    /// Error at the caller-supplied values
    pub initial_error: f64,
    /// Error at the returned values
    pub final_error: f64,
    /// Number of outer iterations (linearizations)
    pub iterations: usize,
    /// Number of accepted lambda trials
    pub accepted_steps: usize,
    /// Number of rejected lambda trials
    pub rejected_steps: usize,
    /// Damping parameter when the optimization stopped
    pub final_lambda: f64,
    /// Gradient norm at the last linearization
    pub final_gradient_norm: f64,
    /// Total time elapsed
    pub total_time: Duration,
    /// One entry per lambda trial
    pub iteration_history: Vec<IterationStats>,
    pub status: OptimizationStatus,
}

impl LevenbergMarquardtSummary {
    pub fn converged(&self) -> bool {
        self.status == OptimizationStatus::Converged
    }
}

impl Display for LevenbergMarquardtSummary {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        writeln!(f, "Levenberg-Marquardt Final Result")?;
        if self.converged() {
            writeln!(f, "CONVERGED ({})", self.status)?;
        } else {
            writeln!(f, "NOT CONVERGED ({})", self.status)?;
        }

        writeln!(f)?;
        writeln!(f, "Error:")?;
        writeln!(f, "  Initial:   {:.6e}", self.initial_error)?;
        writeln!(f, "  Final:     {:.6e}", self.final_error)?;
        writeln!(
            f,
            "  Reduction: {:.6e} ({:.2}%)",
            self.initial_error - self.final_error,
            100.0 * (self.initial_error - self.final_error) / self.initial_error.max(1e-12)
        )?;
        writeln!(f)?;
        let trials = (self.accepted_steps + self.rejected_steps).max(1) as f64;
        writeln!(f, "Iterations:")?;
        writeln!(f, "  Total:          {}", self.iterations)?;
        writeln!(
            f,
            "  Accepted steps: {} ({:.1}%)",
            self.accepted_steps,
            100.0 * self.accepted_steps as f64 / trials
        )?;
        writeln!(
            f,
            "  Rejected steps: {} ({:.1}%)",
            self.rejected_steps,
            100.0 * self.rejected_steps as f64 / trials
        )?;
        writeln!(f, "  Final lambda:   {:.2e}", self.final_lambda)?;
        writeln!(f, "  Final |grad|:   {:.2e}", self.final_gradient_norm)?;
        writeln!(f)?;
        writeln!(
            f,
            "Total time: {:.2}ms",
            self.total_time.as_secs_f64() * 1000.0
        )
    }
}

/// Per-trial statistics for detailed logging (Ceres-style output).
#[derive(Debug, Clone)]
pub struct IterationStats {
    /// Outer iteration the trial belongs to
    pub iteration: usize,
    /// Error after the trial (the unchanged error when rejected)
    pub error: f64,
    /// Actual error reduction `Δe` of the trial step
    pub error_change: f64,
    /// Gradient norm at the linearization point
    pub gradient_norm: f64,
    /// Norm of the trial step
    pub step_norm: f64,
    /// Model fidelity ρ
    pub step_quality: f64,
    /// Damping used for the trial
    pub lambda: f64,
    /// CGLS iterations spent on the trial
    pub cgls_iterations: usize,
    /// Time taken for this trial in milliseconds
    pub trial_time_ms: f64,
    /// Total elapsed time since optimization started in milliseconds
    pub total_time_ms: f64,
    /// Whether the step was accepted (true) or rejected (false)
    pub accepted: bool,
}

impl IterationStats {
    /// Print table header in Ceres-style format
    pub fn print_header() {
        debug!(
            "{:>4}  {:>13}  {:>13}  {:>13}  {:>13}  {:>11}  {:>11}  {:>7}  {:>11}  {:>13}  {:>6}",
            "iter",
            "error",
            "error_change",
            "|gradient|",
            "|step|",
            "rho",
            "lambda",
            "cg_iter",
            "trial_time",
            "total_time",
            "status"
        );
    }

    /// Print single trial line in Ceres-style format with scientific notation
    pub fn print_line(&self) {
        let status = if self.accepted { "✓" } else { "✗" };
        debug!(
            "{:>4}  {:>13.6e}  {:>13.2e}  {:>13.2e}  {:>13.2e}  {:>11.2e}  {:>11.2e}  {:>7}  {:>9.2}ms  {:>11.2}ms  {:>6}",
            self.iteration,
            self.error,
            self.error_change,
            self.gradient_norm,
            self.step_norm,
            self.step_quality,
            self.lambda,
            self.cgls_iterations,
            self.trial_time_ms,
            self.total_time_ms,
            status
        );
    }
}

/// Configuration parameters for the Levenberg-Marquardt optimizer.
///
/// ```
/// use tangent_fusion::optimizer::LevenbergMarquardtConfig;
/// use tangent_fusion::optimizer::Verbosity;
///
/// let config = LevenbergMarquardtConfig::new()
///     .with_max_iterations(100)
///     .with_initial_lambda(1e-3)
///     .with_lambda_bounds(1e-12, 1e12)
///     .with_verbosity(Verbosity::Summary);
/// assert_eq!(config.max_iterations, 100);
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LevenbergMarquardtConfig {
    /// Target precision for the error, its reduction and the squared gradient norm
    pub precision: f64,
    /// Maximum number of outer iterations (linearizations)
    pub max_iterations: usize,
    /// Maximum number of lambda trials per outer iteration
    pub max_inner_iterations: usize,
    pub initial_lambda: f64,
    /// Floor applied when decreasing lambda
    pub min_lambda: f64,
    /// Exceeding this fails the optimization
    pub max_lambda: f64,
    /// Growth factor on rejection and shrink factor on acceptance
    pub lambda_factor: f64,
    /// Settings of the inner linear solver
    pub cgls: CglsConfig,
    pub verbosity: Verbosity,
}

impl Default for LevenbergMarquardtConfig {
    fn default() -> Self {
        Self {
            precision: 1e-10,
            max_iterations: 50,
            max_inner_iterations: 400,
            initial_lambda: 1e-4,
            min_lambda: 1e-16,
            max_lambda: 1e32,
            lambda_factor: 2.0,
            cgls: CglsConfig::default(),
            verbosity: Verbosity::Silent,
        }
    }
}

impl LevenbergMarquardtConfig {
    /// Create a new Levenberg-Marquardt configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_precision(mut self, precision: f64) -> Self {
        self.precision = precision;
        self
    }

    /// Set the maximum number of outer iterations
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Set the maximum number of lambda trials per outer iteration
    pub fn with_max_inner_iterations(mut self, max_inner_iterations: usize) -> Self {
        self.max_inner_iterations = max_inner_iterations;
        self
    }

    pub fn with_initial_lambda(mut self, lambda: f64) -> Self {
        self.initial_lambda = lambda;
        self
    }

    /// Set the lambda bounds.
    pub fn with_lambda_bounds(mut self, min: f64, max: f64) -> Self {
        self.min_lambda = min;
        self.max_lambda = max;
        self
    }

    pub fn with_lambda_factor(mut self, factor: f64) -> Self {
        self.lambda_factor = factor;
        self
    }

    pub fn with_cgls(mut self, cgls: CglsConfig) -> Self {
        self.cgls = cgls;
        self
    }

    pub fn with_verbosity(mut self, verbosity: Verbosity) -> Self {
        self.verbosity = verbosity;
        self
    }

    /// Check that the bounds and factors describe a usable lambda search.
    pub fn validate(&self) -> OptimizerResult<()> {
        check_positive("precision", self.precision)?;
        check_positive("initial_lambda", self.initial_lambda)?;
        check_positive("min_lambda", self.min_lambda)?;
        check_positive("max_lambda", self.max_lambda)?;
        if self.lambda_factor.is_nan() || self.lambda_factor <= 1.0 {
            return Err(OptimizerError::InvalidParameters(format!(
                "lambda_factor must be greater than 1, got {}",
                self.lambda_factor
            ))
            .log());
        }
        if self.min_lambda > self.max_lambda {
            return Err(OptimizerError::InvalidParameters(format!(
                "min_lambda {:e} exceeds max_lambda {:e}",
                self.min_lambda, self.max_lambda
            ))
            .log());
        }
        Ok(())
    }

    /// Print configuration parameters
    pub fn print_configuration(&self) {
        debug!(
            "Configuration:\n  Solver:        Levenberg-Marquardt\n  Linear solver: {} (precision {:.2e}, max iterations {})\n  Convergence Criteria:\n  Precision:           {:.2e}\n  Max iterations:      {}\n  Max inner iterations: {}\n  Damping Parameters:\n  Initial lambda:      {:.2e}\n  Lambda range:        [{:.2e}, {:.2e}]\n  Lambda factor:       {:.2}\n  Verbosity:           {:?}",
            LinearSolverType::Cgls,
            self.cgls.precision,
            self.cgls.max_iterations,
            self.precision,
            self.max_iterations,
            self.max_inner_iterations,
            self.initial_lambda,
            self.min_lambda,
            self.max_lambda,
            self.lambda_factor,
            self.verbosity,
        );
    }
}

/// Result of one lambda trial
struct TrialEvaluation {
    candidate: Option<VariableAssignments>,
    new_error: f64,
    accepted: bool,
    error_change: f64,
    step_quality: f64,
    step_norm: f64,
    cgls_iterations: usize,
}

/// Levenberg-Marquardt solver for factor graphs.
///
/// # Examples
///
/// ```
/// use tangent_fusion::observers::ErrorHistoryObserver;
/// use tangent_fusion::optimizer::{LevenbergMarquardt, LevenbergMarquardtConfig};
///
/// let recorder = ErrorHistoryObserver::new();
/// let mut solver = LevenbergMarquardt::with_config(LevenbergMarquardtConfig::new());
/// solver.add_observer(recorder.clone());
/// ```
pub struct LevenbergMarquardt {
    config: LevenbergMarquardtConfig,
    observers: OptObserverVec,
}

impl Default for LevenbergMarquardt {
    fn default() -> Self {
        Self::new()
    }
}

impl LevenbergMarquardt {
    /// Create a new Levenberg-Marquardt solver with default configuration.
    pub fn new() -> Self {
        Self::with_config(LevenbergMarquardtConfig::default())
    }

    /// Create a new Levenberg-Marquardt solver with the given configuration.
    pub fn with_config(config: LevenbergMarquardtConfig) -> Self {
        Self {
            config,
            observers: OptObserverVec::new(),
        }
    }

    pub fn config(&self) -> &LevenbergMarquardtConfig {
        &self.config
    }

    /// Add an observer notified with the values after every accepted step.
    pub fn add_observer(&mut self, observer: impl OptObserver + 'static) {
        self.observers.add(observer);
    }

    /// Solve the damped system at `values` and evaluate the retracted candidate.
    fn try_step(
        &self,
        graph: &FactorGraph,
        linear: &GaussianFactorGraph,
        lambda: f64,
        values: &VariableAssignments,
        current_error: f64,
    ) -> OptimizerResult<TrialEvaluation> {
        let damped = linear.damped(lambda);
        let mut delta = damped.zero_tangent();
        let mut cgls = Cgls::with_config(self.config.cgls);

        let cgls_iterations = match cgls.solve(&damped, &mut delta) {
            Ok(solve) => solve.iterations,
            Err(LinAlgError::NumericalBreakdown(_)) => {
                return Ok(TrialEvaluation {
                    candidate: None,
                    new_error: f64::NAN,
                    accepted: false,
                    error_change: f64::NAN,
                    step_quality: f64::NAN,
                    step_norm: f64::NAN,
                    cgls_iterations: self.config.cgls.max_iterations,
                });
            }
            Err(e) => return Err(OptimizerError::from(e).log()),
        };

        let candidate = values.retracted(&delta);
        let new_error = graph.error(&candidate);
        let error_change = current_error - new_error;
        let linear_change = damped.error(&damped.zero_tangent()) - damped.error(&delta);
        let step_quality = error_change / linear_change;

        let accepted = new_error.is_finite()
            && error_change > 0.0
            && step_quality.is_finite()
            && step_quality > MIN_STEP_QUALITY;

        Ok(TrialEvaluation {
            candidate: Some(candidate),
            new_error,
            accepted,
            error_change,
            step_quality,
            step_norm: delta.norm(),
            cgls_iterations,
        })
    }

    /// Minimize the error of `graph`, updating `values` in place.
    ///
    /// # Errors
    /// - [`OptimizerError::EmptyProblem`] for a graph without factors or values
    ///   without variables
    /// - [`OptimizerError::NumericalInstability`] if the initial error is not finite
    /// - [`OptimizerError::DampingFailure`] if lambda exceeds `max_lambda`; `values`
    ///   then hold the last accepted state
    pub fn optimize(
        &mut self,
        graph: &FactorGraph,
        values: &mut VariableAssignments,
    ) -> OptimizerResult<LevenbergMarquardtSummary> {
        let start_time = Instant::now();
        self.config.validate()?;
        let initial_error = initial_error(graph, values)?;
        let trial_verbosity = self.config.verbosity >= Verbosity::Trial;

        if trial_verbosity {
            self.config.print_configuration();
            IterationStats::print_header();
        }

        let mut lambda = self.config.initial_lambda;
        let mut current_error = initial_error;
        let mut iterations = 0;
        let mut accepted_steps = 0;
        let mut rejected_steps = 0;
        let mut final_gradient_norm = f64::NAN;
        let mut iteration_history = Vec::new();
        let mut status = OptimizationStatus::MaxIterationsReached;

        if !self.observers.is_empty() {
            let gradient_norm = graph.error_gradient(values).norm();
            self.observers
                .set_iteration_metrics(current_error, gradient_norm, Some(lambda), 0.0, None);
            self.observers.notify(values, 0);
        }

        if current_error < self.config.precision {
            status = OptimizationStatus::Converged;
        }

        'outer: for iteration in 1..=self.config.max_iterations {
            if status == OptimizationStatus::Converged {
                break;
            }
            iterations = iteration;

            let linear = graph.linearized(values);
            let gradient = linear.apply_adjoint(&linear.residual());
            final_gradient_norm = gradient.norm();
            if gradient.squared_norm() < self.config.precision {
                status = OptimizationStatus::Converged;
                break;
            }

            for _ in 0..self.config.max_inner_iterations {
                let trial_start = Instant::now();
                let trial_lambda = lambda;
                let trial = self.try_step(graph, &linear, trial_lambda, values, current_error)?;

                // Checked on every trial, before the accept/reject decision.
                let converged_here = (trial.step_quality > GOOD_STEP_QUALITY
                    && trial.error_change < self.config.precision)
                    || trial.new_error < self.config.precision;
                let commit =
                    trial.accepted || (converged_here && trial.new_error < current_error);
                if commit {
                    if let Some(candidate) = trial.candidate {
                        *values = candidate;
                        current_error = trial.new_error;
                    }
                }

                let stats = IterationStats {
                    iteration,
                    error: current_error,
                    error_change: trial.error_change,
                    gradient_norm: final_gradient_norm,
                    step_norm: trial.step_norm,
                    step_quality: trial.step_quality,
                    lambda: trial_lambda,
                    cgls_iterations: trial.cgls_iterations,
                    trial_time_ms: trial_start.elapsed().as_secs_f64() * 1000.0,
                    total_time_ms: start_time.elapsed().as_secs_f64() * 1000.0,
                    accepted: commit,
                };
                if trial_verbosity {
                    stats.print_line();
                }
                iteration_history.push(stats);

                if commit {
                    accepted_steps += 1;
                    lambda = (lambda / self.config.lambda_factor).max(self.config.min_lambda);

                    self.observers.set_iteration_metrics(
                        current_error,
                        final_gradient_norm,
                        Some(lambda),
                        trial.step_norm,
                        Some(trial.step_quality),
                    );
                    self.observers.notify(values, iteration);
                } else {
                    rejected_steps += 1;
                }

                if converged_here {
                    status = OptimizationStatus::Converged;
                    break 'outer;
                }
                if commit {
                    continue 'outer;
                }

                lambda *= self.config.lambda_factor;
                if lambda > self.config.max_lambda {
                    return Err(OptimizerError::DampingFailure {
                        damping: lambda,
                        max_damping: self.config.max_lambda,
                    }
                    .log());
                }
            }
        }

        let summary = LevenbergMarquardtSummary {
            initial_error,
            final_error: current_error,
            iterations,
            accepted_steps,
            rejected_steps,
            final_lambda: lambda,
            final_gradient_norm,
            total_time: start_time.elapsed(),
            iteration_history,
            status,
        };

        if self.config.verbosity >= Verbosity::Summary {
            info!("{}", summary);
        }
        Ok(summary)
    }
}

impl Optimizer for LevenbergMarquardt {
    type Summary = LevenbergMarquardtSummary;

    fn optimize(
        &mut self,
        graph: &FactorGraph,
        values: &mut VariableAssignments,
    ) -> OptimizerResult<LevenbergMarquardtSummary> {
        LevenbergMarquardt::optimize(self, graph, values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::factor::{Factor, FactorIds, FactorValues};
    use crate::core::store::TypedId;
    use crate::factors::{BetweenFactor, PriorFactor};
    use crate::linalg::JacobianFactor;
    use crate::manifold::{LieGroup, SE2, SO3};
    use crate::observers::ErrorHistoryObserver;
    use nalgebra::{DMatrix, DVector, Vector2, Vector3};

    const TOLERANCE: f64 = 1e-6;

    #[test]
    fn test_config_defaults() {
        let config = LevenbergMarquardtConfig::default();
        assert_eq!(config.precision, 1e-10);
        assert_eq!(config.max_iterations, 50);
        assert_eq!(config.max_inner_iterations, 400);
        assert_eq!(config.initial_lambda, 1e-4);
        assert_eq!(config.min_lambda, 1e-16);
        assert_eq!(config.max_lambda, 1e32);
        assert_eq!(config.lambda_factor, 2.0);
        assert_eq!(config.cgls, CglsConfig::default());
        assert_eq!(config.verbosity, Verbosity::Silent);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let bad_factor = LevenbergMarquardtConfig::new().with_lambda_factor(1.0);
        assert!(matches!(
            bad_factor.validate(),
            Err(OptimizerError::InvalidParameters(_))
        ));
        let bad_bounds = LevenbergMarquardtConfig::new().with_lambda_bounds(1.0, 1e-3);
        assert!(bad_bounds.validate().is_err());
    }

    #[test]
    fn test_single_prior() -> Result<(), Box<dyn std::error::Error>> {
        let mut values = VariableAssignments::new();
        let x = values.store(SE2::from_xy_angle(1.0, 0.0, 0.0));
        let mut graph = FactorGraph::new();
        graph.add(PriorFactor::new(x, SE2::from_xy_angle(0.0, 0.0, 0.0)));

        let mut solver = LevenbergMarquardt::new();
        let summary = solver.optimize(&graph, &mut values)?;

        assert!(summary.converged());
        assert!(summary.final_error < 1e-8);
        assert!((summary.initial_error - 0.5).abs() < 1e-12);
        assert!(values[x].x().abs() < 1e-4);
        assert!(values[x].y().abs() < 1e-4);
        assert!(values[x].angle().abs() < 1e-4);
        Ok(())
    }

    #[test]
    fn test_already_converged_takes_no_steps() -> Result<(), Box<dyn std::error::Error>> {
        let mut values = VariableAssignments::new();
        let x = values.store(SE2::from_xy_angle(0.0, 0.0, 0.0));
        let mut graph = FactorGraph::new();
        graph.add(PriorFactor::new(x, SE2::from_xy_angle(0.0, 0.0, 0.0)));

        let summary = LevenbergMarquardt::new().optimize(&graph, &mut values)?;
        assert!(summary.converged());
        assert_eq!(summary.iterations, 0);
        assert_eq!(summary.accepted_steps, 0);
        Ok(())
    }

    #[test]
    fn test_error_non_increasing_at_accepted_steps() -> Result<(), Box<dyn std::error::Error>> {
        let mut values = VariableAssignments::new();
        let a = values.store(SO3::from_euler_angles(0.3, -0.2, 0.1));
        let b = values.store(SO3::from_euler_angles(1.2, 0.4, -0.6));
        let mut graph = FactorGraph::new();
        graph.add(PriorFactor::new(a, SO3::identity()));
        graph.add(BetweenFactor::new(a, b, SO3::from_axis_angle(&Vector3::y(), 0.5)));

        let recorder = ErrorHistoryObserver::new();
        let mut solver = LevenbergMarquardt::new();
        solver.add_observer(recorder.clone());
        let summary = solver.optimize(&graph, &mut values)?;

        let history = recorder.history()?;
        assert_eq!(history.len(), summary.accepted_steps + 1);
        for pair in history.windows(2) {
            assert!(pair[1].1 <= pair[0].1 + TOLERANCE * pair[0].1);
        }
        assert!(summary.final_error < 1e-8);
        Ok(())
    }

    #[test]
    fn test_narrow_lambda_bounds_solve_linear_problem() -> Result<(), Box<dyn std::error::Error>> {
        let mut values = VariableAssignments::new();
        let a = values.store(SE2::from_xy_angle(0.0, 0.0, 0.0));
        let mut graph = FactorGraph::new();
        graph.add(PriorFactor::new(a, SE2::from_xy_angle(0.0, 0.0, 0.0)));
        // Two conflicting priors: the minimum has a nonzero error.
        graph.add(PriorFactor::new(a, SE2::from_xy_angle(2.0, 0.0, 0.0)));

        let config = LevenbergMarquardtConfig::new()
            .with_max_iterations(5)
            .with_initial_lambda(1e-4)
            .with_lambda_bounds(1e-16, 1e-4);
        let summary = LevenbergMarquardt::with_config(config).optimize(&graph, &mut values)?;

        assert!(summary.converged());
        assert_eq!(summary.rejected_steps, 0);
        assert!((values[a].x() - 1.0).abs() < 1e-3);
        Ok(())
    }

    /// Prior whose linear model scales residual and Jacobian alike, so the model
    /// promises far more reduction than the exact step delivers.
    #[derive(Debug)]
    struct OverconfidentPrior {
        edges: (TypedId<Vector2<f64>>,),
        scale: f64,
    }

    impl Factor for OverconfidentPrior {
        type Variables = (Vector2<f64>,);
        type ErrorVector = Vector2<f64>;

        fn edges(&self) -> &FactorIds<Self> {
            &self.edges
        }

        fn error_vector(&self, values: &FactorValues<Self>) -> Vector2<f64> {
            values.0
        }

        fn linearize(&self, values: &FactorValues<Self>) -> JacobianFactor {
            JacobianFactor::new(
                vec![self.edges.0.erased()],
                vec![DMatrix::<f64>::identity(2, 2) * self.scale],
                DVector::from_column_slice((values.0 * self.scale).as_slice()),
            )
        }
    }

    #[test]
    fn test_poor_model_trial_below_precision_converges() -> Result<(), Box<dyn std::error::Error>> {
        let mut values = VariableAssignments::new();
        let x = values.store(Vector2::new(1e-4, 0.0));
        let mut graph = FactorGraph::new();
        graph.add(OverconfidentPrior {
            edges: (x,),
            scale: 100.0,
        });

        let summary = LevenbergMarquardt::new().optimize(&graph, &mut values)?;

        let trial = &summary.iteration_history[0];
        assert!(trial.step_quality < MIN_STEP_QUALITY);
        assert!(trial.accepted);
        assert_eq!(summary.status, OptimizationStatus::Converged);
        assert_eq!(summary.iterations, 1);
        assert_eq!(summary.accepted_steps, 1);
        assert_eq!(summary.rejected_steps, 0);
        assert!(summary.final_error < 1e-10);
        assert!(values[x].norm() < 1e-8);
        Ok(())
    }

    #[test]
    fn test_conflicting_priors_converge_to_midpoint() -> Result<(), Box<dyn std::error::Error>> {
        let mut values = VariableAssignments::new();
        let a = values.store(SE2::from_xy_angle(0.3, -0.2, 0.1));
        let mut graph = FactorGraph::new();
        graph.add(PriorFactor::new(a, SE2::from_xy_angle(0.0, 0.0, 0.0)));
        graph.add(PriorFactor::new(a, SE2::from_xy_angle(2.0, 0.0, 0.0)));

        let summary = LevenbergMarquardt::new().optimize(&graph, &mut values)?;
        assert!(summary.converged());
        assert!((values[a].x() - 1.0).abs() < 1e-4);
        assert!(values[a].y().abs() < 1e-4);
        assert!((summary.final_error - 1.0).abs() < 1e-6);
        Ok(())
    }

    #[test]
    fn test_empty_graph_is_rejected() {
        let mut values = VariableAssignments::new();
        values.store(SE2::from_xy_angle(0.0, 0.0, 0.0));
        let graph = FactorGraph::new();
        let result = LevenbergMarquardt::new().optimize(&graph, &mut values);
        assert!(matches!(result, Err(OptimizerError::EmptyProblem)));
    }

    #[test]
    fn test_summary_display() -> Result<(), Box<dyn std::error::Error>> {
        let mut values = VariableAssignments::new();
        let x = values.store(SE2::from_xy_angle(0.5, 0.5, 0.5));
        let mut graph = FactorGraph::new();
        graph.add(PriorFactor::new(x, SE2::from_xy_angle(0.0, 0.0, 0.0)));

        let config = LevenbergMarquardtConfig::new().with_verbosity(Verbosity::Trial);
        let summary = LevenbergMarquardt::with_config(config).optimize(&graph, &mut values)?;
        let text = summary.to_string();
        assert!(text.contains("Levenberg-Marquardt Final Result"));
        assert!(text.contains("CONVERGED"));
        assert_eq!(
            summary.iteration_history.len(),
            summary.accepted_steps + summary.rejected_steps
        );
        Ok(())
    }
}
