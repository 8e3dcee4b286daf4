//! Conjugate-gradient least squares.
//!
//! Björck's CGLS minimizes `‖A·Δ + b‖²` using only the forward (`A·x`) and
//! adjoint (`Aᵀ·y`) operators of a [`GaussianFactorGraph`]:
//!
//! ```text
//! r = -(A·Δ₀ + b)      s = Aᵀ·r      p = s      γ = ‖s‖²
//! loop:
//!     q = A·p
//!     α = γ / ‖q‖²
//!     Δ += α·p         r -= α·q
//!     s = Aᵀ·r         γ' = ‖s‖²
//!     stop if ‖α·p‖² < precision
//!     p = s + (γ'/γ)·p γ = γ'
//! ```
//!
//! In exact arithmetic CGLS reaches the least-squares solution in at most
//! `dim(Δ)` iterations.

use crate::core::store::TangentStore;
use crate::linalg::gaussian::GaussianFactorGraph;
use crate::linalg::{LinAlgError, LinAlgResult, LinearSolveSummary, LinearSolver};
use tracing::{debug, warn};

/// Configuration for [`Cgls`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CglsConfig {
    /// Stop once the squared norm of the last update falls below this
    pub precision: f64,
    /// Iteration budget
    pub max_iterations: usize,
}

impl Default for CglsConfig {
    fn default() -> Self {
        CglsConfig {
            precision: 1e-10,
            max_iterations: 400,
        }
    }
}

impl CglsConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_precision(mut self, precision: f64) -> Self {
        self.precision = precision;
        self
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }
}

/// Matrix-free CGLS solver.
#[derive(Clone, Debug, Default)]
pub struct Cgls {
    config: CglsConfig,
}

impl Cgls {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: CglsConfig) -> Self {
        Cgls { config }
    }

    pub fn config(&self) -> &CglsConfig {
        &self.config
    }
}

impl LinearSolver for Cgls {
    fn solve(
        &mut self,
        system: &GaussianFactorGraph,
        delta: &mut TangentStore,
    ) -> LinAlgResult<LinearSolveSummary> {
        if !delta.same_shape(&system.zero_tangent()) {
            return Err(LinAlgError::DimensionMismatch(
                "initial solution does not match the tangent layout of the system".to_string(),
            )
            .log());
        }

        let mut r = system.error_vectors(delta);
        r.scale_mut(-1.0);
        let mut s = system.apply_adjoint(&r);
        let mut p = s.clone();
        let mut gamma = s.squared_norm();

        if gamma == 0.0 {
            return Ok(LinearSolveSummary {
                iterations: 0,
                converged: true,
                final_residual_norm: r.norm(),
            });
        }

        for iteration in 1..=self.config.max_iterations {
            let q = system.apply_forward(&p);
            let q_norm_squared = q.squared_norm();
            if q_norm_squared == 0.0 {
                // p lies in the null space of A: no further progress is possible.
                return Ok(LinearSolveSummary {
                    iterations: iteration,
                    converged: true,
                    final_residual_norm: r.norm(),
                });
            }

            let alpha = gamma / q_norm_squared;
            delta.add_scaled_mut(alpha, &p);
            r.add_scaled_mut(-alpha, &q);
            s = system.apply_adjoint(&r);
            let gamma_next = s.squared_norm();
            let step_squared = alpha * alpha * p.squared_norm();

            if !alpha.is_finite() || !gamma_next.is_finite() || !delta.is_finite() {
                return Err(LinAlgError::NumericalBreakdown(format!(
                    "non-finite iterate at iteration {iteration} (alpha = {alpha:e})"
                ))
                .log());
            }

            if step_squared < self.config.precision {
                debug!(
                    "CGLS converged after {} iterations, step² = {:.3e}",
                    iteration, step_squared
                );
                return Ok(LinearSolveSummary {
                    iterations: iteration,
                    converged: true,
                    final_residual_norm: r.norm(),
                });
            }

            let beta = gamma_next / gamma;
            gamma = gamma_next;
            p.scale_mut(beta);
            p.add_scaled_mut(1.0, &s);
        }

        warn!(
            "CGLS exhausted {} iterations without reaching precision {:.1e}",
            self.config.max_iterations, self.config.precision
        );
        Ok(LinearSolveSummary {
            iterations: self.config.max_iterations,
            converged: false,
            final_residual_norm: r.norm(),
        })
    }
}
