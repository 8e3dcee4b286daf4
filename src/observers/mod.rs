//! Observer pattern for optimization monitoring.
//!
//! Observers can be registered with any optimizer and are notified after every
//! accepted step, which keeps monitoring (logging, metrics, plotting in host
//! applications) separate from the optimization algorithms.
//!
//! ```text
//! ┌──────────────────┐
//! │    Optimizer     │
//! │   (LM/GD/NCG)    │
//! └────────┬─────────┘
//!          │ observers.notify(values, iteration)
//!          ├──────────────┬──────────────┐
//!          ▼              ▼              ▼
//!    ┌──────────┐  ┌──────────┐  ┌──────────┐
//!    │  Error   │  │ Metrics  │  │  Custom  │
//!    │ History  │  │ Observer │  │ Observer │
//!    └──────────┘  └──────────┘  └──────────┘
//! ```
//!
//! # Example
//!
//! ```
//! use tangent_fusion::core::store::VariableAssignments;
//! use tangent_fusion::observers::{OptObserver, OptObserverVec};
//! use std::sync::atomic::{AtomicUsize, Ordering};
//! use std::sync::Arc;
//!
//! struct StepCounter {
//!     steps: Arc<AtomicUsize>,
//! }
//!
//! impl OptObserver for StepCounter {
//!     fn on_step(&self, _values: &VariableAssignments, _iteration: usize) {
//!         self.steps.fetch_add(1, Ordering::Relaxed);
//!     }
//! }
//!
//! let steps = Arc::new(AtomicUsize::new(0));
//! let mut observers = OptObserverVec::new();
//! observers.add(StepCounter { steps: steps.clone() });
//! observers.notify(&VariableAssignments::new(), 0);
//! assert_eq!(steps.load(Ordering::Relaxed), 1);
//! ```

use crate::core::store::VariableAssignments;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tracing::error;

/// Observer-specific error types
#[derive(Debug, Clone, Error)]
pub enum ObserverError {
    /// Mutex was poisoned (thread panicked while holding lock)
    #[error("Mutex poisoned in {context}: {reason}")]
    MutexPoisoned { context: String, reason: String },
}

impl ObserverError {
    /// Log the error with tracing::error and return self for chaining
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

/// Result type for observer operations
pub type ObserverResult<T> = Result<T, ObserverError>;

/// Observer trait for monitoring optimization progress.
///
/// Observers receive immutable views of the optimization state. They must be
/// `Send`; use interior mutability (`Mutex`, atomics) to record state.
pub trait OptObserver: Send {
    /// Called with the current values after each iteration.
    ///
    /// # Arguments
    ///
    /// * `values` - Current variable values
    /// * `iteration` - Iteration number (0 = initial values, 1+ = after steps)
    fn on_step(&self, values: &VariableAssignments, iteration: usize);

    /// Metrics of the iteration about to be reported through `on_step`.
    ///
    /// # Arguments
    ///
    /// * `error` - Total error `Σ ½‖eᵢ‖²`
    /// * `gradient_norm` - Norm of the error gradient
    /// * `damping` - Damping parameter (Levenberg-Marquardt only)
    /// * `step_norm` - Norm of the tangent step
    /// * `step_quality` - Model fidelity ρ (Levenberg-Marquardt only)
    fn set_iteration_metrics(
        &self,
        _error: f64,
        _gradient_norm: f64,
        _damping: Option<f64>,
        _step_norm: f64,
        _step_quality: Option<f64>,
    ) {
    }
}

/// Collection of observers, notified in registration order.
#[derive(Default)]
pub struct OptObserverVec {
    observers: Vec<Box<dyn OptObserver>>,
}

impl OptObserverVec {
    pub fn new() -> Self {
        Self {
            observers: Vec::new(),
        }
    }

    pub fn add(&mut self, observer: impl OptObserver + 'static) {
        self.observers.push(Box::new(observer));
    }

    #[inline]
    pub fn set_iteration_metrics(
        &self,
        error: f64,
        gradient_norm: f64,
        damping: Option<f64>,
        step_norm: f64,
        step_quality: Option<f64>,
    ) {
        for observer in &self.observers {
            observer.set_iteration_metrics(error, gradient_norm, damping, step_norm, step_quality);
        }
    }

    #[inline]
    pub fn notify(&self, values: &VariableAssignments, iteration: usize) {
        for observer in &self.observers {
            observer.on_step(values, iteration);
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.observers.len()
    }
}

/// Records `(iteration, error)` for every notified step.
///
/// Clones share the same history, so a clone can be registered with an
/// optimizer and the original inspected afterwards.
#[derive(Clone, Debug, Default)]
pub struct ErrorHistoryObserver {
    pending_error: Arc<Mutex<Option<f64>>>,
    history: Arc<Mutex<Vec<(usize, f64)>>>,
}

impl ErrorHistoryObserver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Recorded `(iteration, error)` pairs in notification order.
    pub fn history(&self) -> ObserverResult<Vec<(usize, f64)>> {
        self.history
            .lock()
            .map(|guard| guard.clone())
            .map_err(|e| {
                ObserverError::MutexPoisoned {
                    context: "ErrorHistoryObserver::history".to_string(),
                    reason: e.to_string(),
                }
                .log()
            })
    }
}

impl OptObserver for ErrorHistoryObserver {
    fn on_step(&self, _values: &VariableAssignments, iteration: usize) {
        let pending = match self.pending_error.lock() {
            Ok(mut guard) => guard.take(),
            Err(e) => {
                let _ = ObserverError::MutexPoisoned {
                    context: "ErrorHistoryObserver::on_step".to_string(),
                    reason: e.to_string(),
                }
                .log();
                None
            }
        };
        if let Some(error) = pending {
            if let Ok(mut guard) = self.history.lock() {
                guard.push((iteration, error));
            }
        }
    }

    fn set_iteration_metrics(
        &self,
        error: f64,
        _gradient_norm: f64,
        _damping: Option<f64>,
        _step_norm: f64,
        _step_quality: Option<f64>,
    ) {
        if let Ok(mut guard) = self.pending_error.lock() {
            *guard = Some(error);
        }
    }
}
