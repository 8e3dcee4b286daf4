//! Nonlinear conjugate gradient with Polak-Ribière+ directions.
//!
//! ```text
//! d₀ = -g₀
//! x_{k+1} = x_k ⊕ α_k·d_k                 α_k from Armijo backtracking
//! β_k     = max(0, g_{k+1}·(g_{k+1} - g_k) / ‖g_k‖²)
//! d_{k+1} = -g_{k+1} + β_k·d_k
//! ```
//!
//! Directions are kept in the tangent coordinates of the current values and
//! carried to the next point unchanged. A direction that is not a descent
//! direction is replaced by the steepest descent direction.

use crate::core::graph::FactorGraph;
use crate::core::store::{TangentStore, VariableAssignments};
use crate::optimizer::{
    OptObserver, OptObserverVec, OptimizationStatus, Optimizer, OptimizerError, OptimizerResult,
    OptimizerSummary, OptimizerType, Verbosity, check_positive, initial_error,
};
use tracing::{debug, info};
use web_time::Instant;

/// Configuration for [`NonlinearConjugateGradient`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NonlinearCgConfig {
    pub max_iterations: usize,
    /// Threshold on the squared gradient norm
    pub precision: f64,
    /// First step length tried by the line search
    pub initial_step: f64,
    /// Step shrink factor of the backtracking line search
    pub backtracking_factor: f64,
    /// Armijo constant `c` in `E(x ⊕ αd) ≤ E(x) + c·α·(g·d)`
    pub sufficient_decrease: f64,
    pub max_line_search_steps: usize,
    pub verbosity: Verbosity,
}

impl Default for NonlinearCgConfig {
    fn default() -> Self {
        Self {
            max_iterations: 100,
            precision: 1e-10,
            initial_step: 1.0,
            backtracking_factor: 0.5,
            sufficient_decrease: 1e-4,
            max_line_search_steps: 50,
            verbosity: Verbosity::Silent,
        }
    }
}

impl NonlinearCgConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn with_precision(mut self, precision: f64) -> Self {
        self.precision = precision;
        self
    }

    /// Set the line search parameters.
    pub fn with_line_search(
        mut self,
        initial_step: f64,
        backtracking_factor: f64,
        sufficient_decrease: f64,
        max_steps: usize,
    ) -> Self {
        self.initial_step = initial_step;
        self.backtracking_factor = backtracking_factor;
        self.sufficient_decrease = sufficient_decrease;
        self.max_line_search_steps = max_steps;
        self
    }

    pub fn with_verbosity(mut self, verbosity: Verbosity) -> Self {
        self.verbosity = verbosity;
        self
    }

    pub fn print_configuration(&self) {
        debug!(
            "Configuration:\n  Solver:          Nonlinear Conjugate Gradient (PR+)\n  Max iterations:  {}\n  Precision:       {:.2e}\n  Line search:\n  Initial step:    {:.2e}\n  Backtracking:    {:.2}\n  Armijo c:        {:.2e}\n  Max steps:       {}",
            self.max_iterations,
            self.precision,
            self.initial_step,
            self.backtracking_factor,
            self.sufficient_decrease,
            self.max_line_search_steps
        );
    }

    fn validate(&self) -> OptimizerResult<()> {
        check_positive("initial_step", self.initial_step)?;
        check_positive("backtracking_factor", self.backtracking_factor)?;
        check_positive("sufficient_decrease", self.sufficient_decrease)?;
        if self.backtracking_factor >= 1.0 {
            return Err(OptimizerError::InvalidParameters(format!(
                "backtracking_factor must be below 1, got {}",
                self.backtracking_factor
            ))
            .log());
        }
        Ok(())
    }
}

/// Accepted line search step
struct LineSearchStep {
    values: VariableAssignments,
    error: f64,
    alpha: f64,
}

/// Polak-Ribière+ nonlinear conjugate gradient.
#[derive(Default)]
pub struct NonlinearConjugateGradient {
    config: NonlinearCgConfig,
    observers: OptObserverVec,
}

impl NonlinearConjugateGradient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: NonlinearCgConfig) -> Self {
        Self {
            config,
            observers: OptObserverVec::new(),
        }
    }

    pub fn config(&self) -> &NonlinearCgConfig {
        &self.config
    }

    pub fn add_observer(&mut self, observer: impl OptObserver + 'static) {
        self.observers.add(observer);
    }

    /// Armijo backtracking along `direction`; only strictly decreasing steps pass.
    fn line_search(
        &self,
        graph: &FactorGraph,
        values: &VariableAssignments,
        current_error: f64,
        direction: &TangentStore,
        slope: f64,
    ) -> Option<LineSearchStep> {
        let mut alpha = self.config.initial_step;
        for _ in 0..self.config.max_line_search_steps {
            let candidate = values.retracted(&(direction.clone() * alpha));
            let error = graph.error(&candidate);
            let bound = current_error + self.config.sufficient_decrease * alpha * slope;
            if error.is_finite() && error < current_error && error <= bound {
                return Some(LineSearchStep {
                    values: candidate,
                    error,
                    alpha,
                });
            }
            alpha *= self.config.backtracking_factor;
        }
        None
    }

    /// Minimize the error of `graph`, updating `values` in place.
    ///
    /// A line search that finds no decrease along the steepest descent
    /// direction ends the optimization as converged.
    pub fn optimize(
        &mut self,
        graph: &FactorGraph,
        values: &mut VariableAssignments,
    ) -> OptimizerResult<OptimizerSummary> {
        let start_time = Instant::now();
        self.config.validate()?;
        let initial_error = initial_error(graph, values)?;
        let trial_verbosity = self.config.verbosity >= Verbosity::Trial;
        if trial_verbosity {
            self.config.print_configuration();
        }

        let mut current_error = initial_error;
        let mut gradient = graph.error_gradient(values);
        let mut direction = -gradient.clone();
        let mut status = OptimizationStatus::MaxIterationsReached;
        let mut iterations = 0;

        self.observers
            .set_iteration_metrics(current_error, gradient.norm(), None, 0.0, None);
        self.observers.notify(values, 0);

        for iteration in 1..=self.config.max_iterations {
            let gradient_squared = gradient.squared_norm();
            if gradient_squared < self.config.precision {
                status = OptimizationStatus::Converged;
                break;
            }

            let mut slope = gradient.dot(&direction);
            let mut steepest = false;
            if slope >= 0.0 || slope.is_nan() {
                direction = -gradient.clone();
                slope = -gradient_squared;
                steepest = true;
            }

            let step = match self.line_search(graph, values, current_error, &direction, slope) {
                Some(step) => step,
                None if steepest => {
                    status = OptimizationStatus::Converged;
                    break;
                }
                None => {
                    direction = -gradient.clone();
                    slope = -gradient_squared;
                    match self.line_search(graph, values, current_error, &direction, slope) {
                        Some(step) => step,
                        None => {
                            status = OptimizationStatus::Converged;
                            break;
                        }
                    }
                }
            };

            iterations = iteration;
            let step_norm = step.alpha * direction.norm();
            *values = step.values;
            current_error = step.error;

            let next_gradient = graph.error_gradient(values);
            let beta = ((next_gradient.squared_norm() - next_gradient.dot(&gradient))
                / gradient_squared)
                .max(0.0);
            direction.scale_mut(beta);
            direction.add_scaled_mut(-1.0, &next_gradient);
            gradient = next_gradient;

            if trial_verbosity {
                debug!(
                    "{:>4}  error {:>13.6e}  |gradient| {:>11.2e}  alpha {:>9.2e}  beta {:>9.2e}",
                    iteration,
                    current_error,
                    gradient.norm(),
                    step.alpha,
                    beta
                );
            }
            self.observers
                .set_iteration_metrics(current_error, gradient.norm(), None, step_norm, None);
            self.observers.notify(values, iteration);
        }

        let summary = OptimizerSummary {
            optimizer: OptimizerType::NonlinearConjugateGradient,
            status,
            iterations,
            initial_error,
            final_error: current_error,
            final_gradient_norm: gradient.norm(),
            total_time: start_time.elapsed(),
        };
        if self.config.verbosity >= Verbosity::Summary {
            info!("{}", summary);
        }
        Ok(summary)
    }
}

impl Optimizer for NonlinearConjugateGradient {
    type Summary = OptimizerSummary;

    fn optimize(
        &mut self,
        graph: &FactorGraph,
        values: &mut VariableAssignments,
    ) -> OptimizerResult<OptimizerSummary> {
        NonlinearConjugateGradient::optimize(self, graph, values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::factors::{BetweenFactor, PriorFactor};
    use crate::manifold::SE2;
    use crate::observers::ErrorHistoryObserver;

    fn chain() -> (FactorGraph, VariableAssignments) {
        let mut values = VariableAssignments::new();
        let a = values.store(SE2::from_xy_angle(0.3, -0.2, 0.2));
        let b = values.store(SE2::from_xy_angle(0.8, 0.5, -0.3));
        let c = values.store(SE2::from_xy_angle(2.4, 0.1, 0.4));
        let mut graph = FactorGraph::new();
        graph.add(PriorFactor::new(a, SE2::from_xy_angle(0.0, 0.0, 0.0)));
        graph.add(BetweenFactor::new(a, b, SE2::from_xy_angle(1.0, 0.0, 0.0)));
        graph.add(BetweenFactor::new(b, c, SE2::from_xy_angle(1.0, 0.0, 0.0)));
        (graph, values)
    }

    #[test]
    fn test_config_defaults() {
        let config = NonlinearCgConfig::default();
        assert_eq!(config.max_iterations, 100);
        assert_eq!(config.initial_step, 1.0);
        assert_eq!(config.backtracking_factor, 0.5);
        assert_eq!(config.sufficient_decrease, 1e-4);
        assert_eq!(config.max_line_search_steps, 50);
    }

    #[test]
    fn test_reduces_error_monotonically() -> Result<(), Box<dyn std::error::Error>> {
        let (graph, mut values) = chain();
        let recorder = ErrorHistoryObserver::new();
        let mut solver = NonlinearConjugateGradient::new();
        solver.add_observer(recorder.clone());
        let summary = solver.optimize(&graph, &mut values)?;

        assert!(summary.final_error < 1e-3 * summary.initial_error);
        let history = recorder.history()?;
        assert_eq!(history.len(), summary.iterations + 1);
        for pair in history.windows(2) {
            assert!(pair[1].1 < pair[0].1);
        }
        Ok(())
    }

    #[test]
    fn test_rejects_expanding_backtracking() {
        let (graph, mut values) = chain();
        let config = NonlinearCgConfig::new().with_line_search(1.0, 2.0, 1e-4, 10);
        let result = NonlinearConjugateGradient::with_config(config).optimize(&graph, &mut values);
        assert!(result.is_err());
    }
}
