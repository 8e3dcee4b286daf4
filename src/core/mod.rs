//! Core problem representation for tangent-fusion.
//!
//! This module contains the building blocks a problem is assembled from:
//! - [`store`]: heterogeneous variable storage and its tangent space
//! - [`factor`]: the factor contract and generic numerical linearization
//! - [`graph`]: the heterogeneous factor graph and stacked error vectors

pub mod factor;
pub mod graph;
pub mod store;

pub use factor::{Factor, VariableTuple, numerical_linearization};
pub use graph::{ErrorVectors, FactorGraph};
pub use store::{AnyId, TangentStore, TypedId, VariableAssignments};

use thiserror::Error;
use tracing::error;

/// Core module error types for variable storage and factor graphs
#[derive(Debug, Clone, Error)]
pub enum CoreError {
    /// Unknown variable type or out-of-range handle
    #[error("Variable error: {0}")]
    Variable(String),

    /// Dimension mismatch between factor blocks, errors and variables
    #[error("Dimension mismatch: {0}")]
    DimensionMismatch(String),

    /// Invalid input parameter or configuration
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl CoreError {
    /// Log the error with tracing::error and return self for chaining
    ///
    /// # Example
    /// ```
    /// use tangent_fusion::core::CoreError;
    ///
    /// let error = CoreError::InvalidInput("empty graph".to_string()).log();
    /// assert!(error.to_string().contains("empty graph"));
    /// ```
    #[must_use]
    pub fn log(self) -> Self {
        error!("{}", self);
        self
    }

    /// Log the error together with the underlying source error
    ///
    /// # Arguments
    /// * `source_error` - The original error (must implement Debug)
    #[must_use]
    pub fn log_with_source<E: std::fmt::Debug>(self, source_error: E) -> Self {
        error!("{} | Source: {:?}", self, source_error);
        self
    }
}

/// Result type for core module operations
pub type CoreResult<T> = Result<T, CoreError>;
