//! Heterogeneous factor graph.
//!
//! A [`FactorGraph`] keeps one contiguous array per concrete factor type, in the
//! order the types were first added. Graph-wide operations (error, error vectors,
//! linearization, gradient) iterate every array and delegate to the concrete
//! factor, so callers never name the factor types a graph contains.
//!
//! With the `parallel` feature each array is evaluated with rayon. Factors only
//! read the variable store and write their own output slot; results are collected
//! in insertion order.
//!
//! # Example
//!
//! ```
//! use tangent_fusion::core::graph::FactorGraph;
//! use tangent_fusion::core::store::VariableAssignments;
//! use tangent_fusion::factors::{BetweenFactor, PriorFactor};
//! use tangent_fusion::manifold::SE2;
//!
//! let mut values = VariableAssignments::new();
//! let x0 = values.store(SE2::from_xy_angle(0.1, 0.0, 0.0));
//! let x1 = values.store(SE2::from_xy_angle(1.0, 0.0, 0.0));
//!
//! let mut graph = FactorGraph::new();
//! graph.add(PriorFactor::new(x0, SE2::from_xy_angle(0.0, 0.0, 0.0)));
//! graph.add(BetweenFactor::new(x0, x1, SE2::from_xy_angle(1.0, 0.0, 0.0)));
//!
//! assert_eq!(graph.len(), 2);
//! assert!(graph.error(&values) > 0.0);
//! ```

use crate::core::factor::{Factor, VariableTuple};
use crate::core::store::{TangentStore, VariableAssignments};
use crate::linalg::gaussian::{GaussianFactorGraph, JacobianFactor};
use crate::manifold::EuclideanVector;
use nalgebra::{DVector, DVectorView};
use std::any::{Any, TypeId, type_name};
use std::collections::HashMap;
use std::fmt;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Capability interface over one concrete-typed array of factors.
trait AnyFactorArray: Send + Sync + fmt::Debug {
    fn as_any_mut(&mut self) -> &mut dyn Any;
    fn len(&self) -> usize;
    fn type_name(&self) -> &'static str;
    fn error(&self, values: &VariableAssignments) -> f64;
    fn error_vectors(&self, values: &VariableAssignments) -> Vec<DVector<f64>>;
    fn linearize(&self, values: &VariableAssignments) -> Vec<JacobianFactor>;
}

#[derive(Debug)]
struct FactorArray<F> {
    factors: Vec<F>,
}

impl<F: Factor> AnyFactorArray for FactorArray<F> {
    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn len(&self) -> usize {
        self.factors.len()
    }

    fn type_name(&self) -> &'static str {
        type_name::<F>()
    }

    fn error(&self, values: &VariableAssignments) -> f64 {
        #[cfg(feature = "parallel")]
        let factors = self.factors.par_iter();
        #[cfg(not(feature = "parallel"))]
        let factors = self.factors.iter();

        factors
            .map(|factor| factor.error(&F::Variables::read(factor.edges(), values)))
            .sum()
    }

    fn error_vectors(&self, values: &VariableAssignments) -> Vec<DVector<f64>> {
        #[cfg(feature = "parallel")]
        let factors = self.factors.par_iter();
        #[cfg(not(feature = "parallel"))]
        let factors = self.factors.iter();

        factors
            .map(|factor| DVector::from_column_slice(factor.error_vector_at(values).as_slice()))
            .collect()
    }

    fn linearize(&self, values: &VariableAssignments) -> Vec<JacobianFactor> {
        #[cfg(feature = "parallel")]
        let factors = self.factors.par_iter();
        #[cfg(not(feature = "parallel"))]
        let factors = self.factors.iter();

        factors
            .map(|factor| factor.linearize(&F::Variables::read(factor.edges(), values)))
            .collect()
    }
}

/// A heterogeneous collection of factors.
///
/// Factors are only ever appended. Iteration order is slot order (the order the
/// factor types were first added), then insertion order within a type.
#[derive(Debug, Default)]
pub struct FactorGraph {
    arrays: Vec<Box<dyn AnyFactorArray>>,
    slots: HashMap<TypeId, usize>,
}

impl FactorGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a factor.
    pub fn add<F: Factor>(&mut self, factor: F) {
        let slot = match self.slots.get(&TypeId::of::<F>()) {
            Some(slot) => *slot,
            None => {
                self.slots.insert(TypeId::of::<F>(), self.arrays.len());
                self.arrays.push(Box::new(FactorArray::<F> {
                    factors: Vec::new(),
                }));
                self.arrays.len() - 1
            }
        };
        self.arrays[slot]
            .as_any_mut()
            .downcast_mut::<FactorArray<F>>()
            .unwrap_or_else(|| panic!("factor array type mismatch for {}", type_name::<F>()))
            .factors
            .push(factor);
    }

    /// Total number of factors.
    pub fn len(&self) -> usize {
        self.arrays.iter().map(|array| array.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of distinct factor types.
    pub fn factor_type_count(&self) -> usize {
        self.arrays.len()
    }

    /// Factor type names with their counts, in slot order.
    pub fn type_summary(&self) -> Vec<(&'static str, usize)> {
        self.arrays
            .iter()
            .map(|array| (array.type_name(), array.len()))
            .collect()
    }

    /// Total error `Σ 0.5 ‖eᵢ‖²` at `values`.
    pub fn error(&self, values: &VariableAssignments) -> f64 {
        self.arrays.iter().map(|array| array.error(values)).sum()
    }

    /// Stacked error vectors of all factors at `values`.
    pub fn error_vectors(&self, values: &VariableAssignments) -> ErrorVectors {
        ErrorVectors::from_vectors(
            self.arrays
                .iter()
                .flat_map(|array| array.error_vectors(values))
                .collect(),
        )
    }

    /// Linearize every factor at `values`.
    pub fn linearized(&self, values: &VariableAssignments) -> GaussianFactorGraph {
        let factors = self
            .arrays
            .iter()
            .flat_map(|array| array.linearize(values))
            .collect();
        GaussianFactorGraph::new(factors, values.zero_tangent())
    }

    /// Gradient of the total error with respect to every variable's tangent space.
    ///
    /// With `e(Δ) ≈ AΔ + b`, the gradient of `0.5 ‖e‖²` at `Δ = 0` is `Aᵀ b`.
    pub fn error_gradient(&self, values: &VariableAssignments) -> TangentStore {
        let linearized = self.linearized(values);
        linearized.apply_adjoint(&linearized.residual())
    }
}

/// Per-factor error vectors stacked into one contiguous buffer.
///
/// This is the codomain of a linearized graph: `apply_forward` produces one and
/// `apply_adjoint` consumes one. Arithmetic between two `ErrorVectors` requires
/// the same layout and panics otherwise.
#[derive(Clone, Debug, PartialEq)]
pub struct ErrorVectors {
    data: DVector<f64>,
    offsets: Vec<usize>,
}

impl ErrorVectors {
    /// Stack `vectors` in order.
    pub fn from_vectors(vectors: Vec<DVector<f64>>) -> Self {
        let mut offsets = Vec::with_capacity(vectors.len() + 1);
        offsets.push(0);
        for vector in &vectors {
            offsets.push(offsets[offsets.len() - 1] + vector.len());
        }
        let data = DVector::from_iterator(
            offsets[offsets.len() - 1],
            vectors.iter().flat_map(|vector| vector.iter().copied()),
        );
        ErrorVectors { data, offsets }
    }

    /// Zero vector with the same layout as `self`.
    pub fn zeros_like(&self) -> Self {
        ErrorVectors {
            data: DVector::zeros(self.data.len()),
            offsets: self.offsets.clone(),
        }
    }

    /// Number of factors.
    pub fn len(&self) -> usize {
        self.offsets.len() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total number of scalar components.
    pub fn dimension(&self) -> usize {
        self.data.len()
    }

    /// Error vector of factor `i`.
    pub fn get(&self, i: usize) -> DVectorView<'_, f64> {
        self.data.rows(self.offsets[i], self.offsets[i + 1] - self.offsets[i])
    }

    /// Components of factor `i`.
    pub fn slice(&self, i: usize) -> &[f64] {
        &self.data.as_slice()[self.offsets[i]..self.offsets[i + 1]]
    }

    /// All components in factor order.
    pub fn as_dvector(&self) -> &DVector<f64> {
        &self.data
    }

    pub fn dot(&self, other: &ErrorVectors) -> f64 {
        self.assert_same_layout(other);
        self.data.dot(&other.data)
    }

    pub fn squared_norm(&self) -> f64 {
        self.data.norm_squared()
    }

    pub fn norm(&self) -> f64 {
        self.data.norm()
    }

    pub fn scale_mut(&mut self, factor: f64) {
        self.data *= factor;
    }

    /// `self += alpha * other`
    pub fn add_scaled_mut(&mut self, alpha: f64, other: &ErrorVectors) {
        self.assert_same_layout(other);
        self.data.axpy(alpha, &other.data, 1.0);
    }

    pub fn is_finite(&self) -> bool {
        self.data.iter().all(|x| x.is_finite())
    }

    fn assert_same_layout(&self, other: &ErrorVectors) {
        assert!(
            self.offsets == other.offsets,
            "error vectors have different layouts"
        );
    }
}
