//! # Tangent Fusion
//!
//! Manifold-aware nonlinear least squares for pose estimation and tracking.
//!
//! ## Features
//!
//! - **Lie groups**: SO(2), SE(2), SO(3), SE(3) and fixed-size vectors, with
//!   closed-form right Jacobians for their group operations
//! - **Heterogeneous variable store**: values of any manifold type addressed by
//!   typed handles, kept in one contiguous array per type
//! - **Factor graphs**: factors over one to three variables of fixed types,
//!   linearized analytically or by central differences
//! - **Matrix-free linear algebra**: Gaussian factor graphs with exact forward
//!   and adjoint operators solved by CGLS
//! - **Optimizers**: Levenberg-Marquardt, gradient descent and nonlinear
//!   conjugate gradient, all stepping through each manifold's retraction
//!
//! ## Example
//!
//! ```
//! use tangent_fusion::{
//!     BetweenFactor, FactorGraph, LevenbergMarquardt, PriorFactor, VariableAssignments,
//! };
//! use tangent_fusion::manifold::SE2;
//!
//! # fn main() -> Result<(), tangent_fusion::FusionError> {
//! let mut values = VariableAssignments::new();
//! let x0 = values.store(SE2::from_xy_angle(0.1, -0.1, 0.05));
//! let x1 = values.store(SE2::from_xy_angle(0.9, 0.2, 0.1));
//!
//! let mut graph = FactorGraph::new();
//! graph.add(PriorFactor::new(x0, SE2::from_xy_angle(0.0, 0.0, 0.0)));
//! graph.add(BetweenFactor::new(x0, x1, SE2::from_xy_angle(1.0, 0.0, 0.0)));
//!
//! let summary = LevenbergMarquardt::new().optimize(&graph, &mut values)?;
//! assert!(summary.final_error < 1e-8);
//! assert!((values[x1].x() - 1.0).abs() < 1e-4);
//! # Ok(())
//! # }
//! ```

pub mod core;
pub mod error;
pub mod factors;
pub mod linalg;
#[cfg(feature = "logging")]
pub mod logger;
pub mod manifold;
pub mod observers;
pub mod optimizer;

// Re-export core types
pub use crate::core::{AnyId, Factor, FactorGraph, TangentStore, TypedId, VariableAssignments};
pub use error::{FusionError, FusionResult};

// Re-export factor types
pub use factors::{BearingRangeFactor2, BetweenFactor, PriorFactor};

pub use linalg::{Cgls, CglsConfig, GaussianFactorGraph, JacobianFactor, LinearSolver};
#[cfg(feature = "logging")]
pub use logger::{init_logger, init_logger_with_level};
pub use optimizer::{
    GradientDescent, LevenbergMarquardt, LevenbergMarquardtConfig, NonlinearConjugateGradient,
    OptObserver, OptObserverVec, Optimizer, OptimizerType, Verbosity,
};
