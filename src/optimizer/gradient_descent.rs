//! Fixed learning-rate gradient descent on a factor graph.
//!
//! ```text
//! g = ∇E(x)             adjoint of the linearized graph applied to its error vectors
//! x ← x ⊕ (-η · g)
//! ```
//!
//! Stops when `‖g‖² < precision` or after `max_iterations` steps.

use crate::core::graph::FactorGraph;
use crate::core::store::VariableAssignments;
use crate::optimizer::{
    OptObserver, OptObserverVec, OptimizationStatus, Optimizer, OptimizerError,
    OptimizerResult, OptimizerSummary, OptimizerType, Verbosity, check_positive, initial_error,
};
use tracing::{debug, info};
use web_time::Instant;

/// Configuration for [`GradientDescent`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GradientDescentConfig {
    /// Step scale η
    pub learning_rate: f64,
    pub max_iterations: usize,
    /// Threshold on the squared gradient norm
    pub precision: f64,
    pub verbosity: Verbosity,
}

impl Default for GradientDescentConfig {
    fn default() -> Self {
        Self {
            learning_rate: 1e-3,
            max_iterations: 100,
            precision: 1e-10,
            verbosity: Verbosity::Silent,
        }
    }
}

impl GradientDescentConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_learning_rate(mut self, learning_rate: f64) -> Self {
        self.learning_rate = learning_rate;
        self
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn with_precision(mut self, precision: f64) -> Self {
        self.precision = precision;
        self
    }

    pub fn with_verbosity(mut self, verbosity: Verbosity) -> Self {
        self.verbosity = verbosity;
        self
    }

    pub fn print_configuration(&self) {
        debug!(
            "Configuration:\n  Solver:          Gradient Descent\n  Learning rate:   {:.2e}\n  Max iterations:  {}\n  Precision:       {:.2e}",
            self.learning_rate, self.max_iterations, self.precision
        );
    }
}

/// Gradient descent along the retraction of every variable.
#[derive(Default)]
pub struct GradientDescent {
    config: GradientDescentConfig,
    observers: OptObserverVec,
}

impl GradientDescent {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: GradientDescentConfig) -> Self {
        Self {
            config,
            observers: OptObserverVec::new(),
        }
    }

    pub fn config(&self) -> &GradientDescentConfig {
        &self.config
    }

    pub fn add_observer(&mut self, observer: impl OptObserver + 'static) {
        self.observers.add(observer);
    }

    /// Minimize the error of `graph`, updating `values` in place.
    ///
    /// # Errors
    /// [`OptimizerError::NumericalInstability`] when a step produces a
    /// non-finite error, typically because the learning rate is too large.
    pub fn optimize(
        &mut self,
        graph: &FactorGraph,
        values: &mut VariableAssignments,
    ) -> OptimizerResult<OptimizerSummary> {
        let start_time = Instant::now();
        check_positive("learning_rate", self.config.learning_rate)?;
        let initial_error = initial_error(graph, values)?;
        let trial_verbosity = self.config.verbosity >= Verbosity::Trial;
        if trial_verbosity {
            self.config.print_configuration();
        }

        let mut current_error = initial_error;
        let mut status = OptimizationStatus::MaxIterationsReached;
        let mut iterations = 0;
        let mut gradient = graph.error_gradient(values);
        let mut step_norm = 0.0;

        for iteration in 0..=self.config.max_iterations {
            let gradient_norm = gradient.norm();
            self.observers
                .set_iteration_metrics(current_error, gradient_norm, None, step_norm, None);
            self.observers.notify(values, iteration);
            if trial_verbosity {
                debug!(
                    "{:>4}  error {:>13.6e}  |gradient| {:>11.2e}",
                    iteration, current_error, gradient_norm
                );
            }

            if gradient.squared_norm() < self.config.precision {
                status = OptimizationStatus::Converged;
                break;
            }
            if iteration == self.config.max_iterations {
                break;
            }

            let step = gradient * -self.config.learning_rate;
            step_norm = step.norm();
            values.move_along(&step);
            iterations = iteration + 1;

            current_error = graph.error(values);
            if !current_error.is_finite() {
                return Err(OptimizerError::NumericalInstability(format!(
                    "error became {current_error} after iteration {iterations}"
                ))
                .log());
            }
            gradient = graph.error_gradient(values);
        }

        let summary = OptimizerSummary {
            optimizer: OptimizerType::GradientDescent,
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

impl Optimizer for GradientDescent {
    type Summary = OptimizerSummary;

    fn optimize(
        &mut self,
        graph: &FactorGraph,
        values: &mut VariableAssignments,
    ) -> OptimizerResult<OptimizerSummary> {
        GradientDescent::optimize(self, graph, values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::factors::{BetweenFactor, PriorFactor};
    use crate::manifold::SE2;

    #[test]
    fn test_config_defaults() {
        let config = GradientDescentConfig::default();
        assert_eq!(config.learning_rate, 1e-3);
        assert_eq!(config.max_iterations, 100);
        assert_eq!(config.precision, 1e-10);
    }

    #[test]
    fn test_default_learning_rate_reduces_error() -> Result<(), Box<dyn std::error::Error>> {
        let mut values = VariableAssignments::new();
        let a = values.store(SE2::from_xy_angle(0.2, -0.1, 0.3));
        let b = values.store(SE2::from_xy_angle(1.5, 0.4, 0.1));
        let mut graph = FactorGraph::new();
        graph.add(PriorFactor::new(a, SE2::from_xy_angle(0.0, 0.0, 0.0)));
        graph.add(BetweenFactor::new(a, b, SE2::from_xy_angle(1.0, 0.0, 0.0)));

        let summary = GradientDescent::new().optimize(&graph, &mut values)?;
        assert_eq!(summary.iterations, 100);
        assert_eq!(summary.status, OptimizationStatus::MaxIterationsReached);
        assert!(summary.final_error < summary.initial_error);
        Ok(())
    }

    #[test]
    fn test_converges_on_single_prior() -> Result<(), Box<dyn std::error::Error>> {
        let mut values = VariableAssignments::new();
        let x = values.store(SE2::from_xy_angle(1.0, 0.0, 0.0));
        let mut graph = FactorGraph::new();
        graph.add(PriorFactor::new(x, SE2::from_xy_angle(0.0, 0.0, 0.0)));

        let config = GradientDescentConfig::new()
            .with_learning_rate(0.5)
            .with_max_iterations(200);
        let summary = GradientDescent::with_config(config).optimize(&graph, &mut values)?;
        assert!(summary.converged());
        assert!(values[x].x().abs() < 1e-4);
        Ok(())
    }

    #[test]
    fn test_rejects_non_positive_learning_rate() {
        let mut values = VariableAssignments::new();
        let x = values.store(SE2::from_xy_angle(1.0, 0.0, 0.0));
        let mut graph = FactorGraph::new();
        graph.add(PriorFactor::new(x, SE2::from_xy_angle(0.0, 0.0, 0.0)));

        let config = GradientDescentConfig::new().with_learning_rate(-1.0);
        let result = GradientDescent::with_config(config).optimize(&graph, &mut values);
        assert!(matches!(result, Err(OptimizerError::InvalidParameters(_))));
    }
}
