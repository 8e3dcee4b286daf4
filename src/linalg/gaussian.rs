//! Linearized (Gaussian) factor graphs.
//!
//! A [`GaussianFactorGraph`] represents the stacked affine system
//!
//! ```text
//! r(Δ) = A·Δ + b
//! ```
//!
//! where `Δ` ranges over the tangent space of every variable, `A` is block-sparse
//! with one dense block per factor edge, and `b` stacks the factor errors at the
//! linearization point. `A` is never assembled. The graph only exposes
//!
//! - `apply_forward(Δ) = A·Δ`, one error vector per factor
//! - `apply_adjoint(y) = Aᵀ·y`, scatter-added into a tangent store
//!
//! and the two are exact adjoints: `⟨A·x, y⟩ = ⟨x, Aᵀ·y⟩`.

use crate::core::graph::ErrorVectors;
use crate::core::store::{AnyId, TangentStore};
use nalgebra::{DMatrix, DVector};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// First-order model `Σᵢ Jᵢ·δᵢ + b` of one factor.
#[derive(Clone, Debug, PartialEq)]
pub struct JacobianFactor {
    edges: Vec<AnyId>,
    blocks: Vec<DMatrix<f64>>,
    b: DVector<f64>,
}

impl JacobianFactor {
    /// # Panics
    /// If the number of blocks differs from the number of edges or a block does
    /// not have one row per error component.
    pub fn new(edges: Vec<AnyId>, blocks: Vec<DMatrix<f64>>, b: DVector<f64>) -> Self {
        assert_eq!(
            edges.len(),
            blocks.len(),
            "jacobian factor needs one block per edge"
        );
        for block in &blocks {
            assert_eq!(
                block.nrows(),
                b.len(),
                "jacobian block has {} rows for an error of dimension {}",
                block.nrows(),
                b.len()
            );
        }
        JacobianFactor { edges, blocks, b }
    }

    /// Factor `scale·I` on one variable with zero residual.
    ///
    /// Appending one per variable with `scale = √λ` adds `λ·I` to the normal
    /// equations.
    pub fn scalar(edge: AnyId, dim: usize, scale: f64) -> Self {
        JacobianFactor {
            edges: vec![edge],
            blocks: vec![DMatrix::identity(dim, dim) * scale],
            b: DVector::zeros(dim),
        }
    }

    pub fn edges(&self) -> &[AnyId] {
        &self.edges
    }

    pub fn blocks(&self) -> &[DMatrix<f64>] {
        &self.blocks
    }

    /// Error at `Δ = 0`.
    pub fn residual(&self) -> &DVector<f64> {
        &self.b
    }

    /// Dimension of the error space.
    pub fn dimension(&self) -> usize {
        self.b.len()
    }

    /// Linear part `Σᵢ Jᵢ·δᵢ`.
    pub fn apply_forward(&self, delta: &TangentStore) -> DVector<f64> {
        let mut output = DVector::zeros(self.b.len());
        for (edge, block) in self.edges.iter().zip(&self.blocks) {
            let input = delta.slice(*edge);
            assert_eq!(
                input.len(),
                block.ncols(),
                "jacobian block does not match the tangent dimension of {edge:?}"
            );
            output.gemv(1.0, block, &DVector::from_column_slice(input), 1.0);
        }
        output
    }

    /// Affine model `Σᵢ Jᵢ·δᵢ + b`.
    pub fn error_vector(&self, delta: &TangentStore) -> DVector<f64> {
        self.apply_forward(delta) + &self.b
    }

    /// Scatter-add `Jᵢᵀ·y` into the entry of every edge in `output`.
    pub fn apply_adjoint_into(&self, y: &[f64], output: &mut TangentStore) {
        let y = DVector::from_column_slice(y);
        for (edge, block) in self.edges.iter().zip(&self.blocks) {
            let contribution = block.tr_mul(&y);
            for (accumulator, value) in output
                .slice_mut(*edge)
                .iter_mut()
                .zip(contribution.iter())
            {
                *accumulator += value;
            }
        }
    }
}

/// The linearization of a whole factor graph.
#[derive(Clone, Debug)]
pub struct GaussianFactorGraph {
    factors: Vec<JacobianFactor>,
    zero: TangentStore,
}

impl GaussianFactorGraph {
    /// `zero` fixes the tangent layout that `Δ` and `Aᵀ·y` live in.
    pub fn new(factors: Vec<JacobianFactor>, zero: TangentStore) -> Self {
        GaussianFactorGraph { factors, zero }
    }

    pub fn push(&mut self, factor: JacobianFactor) {
        self.factors.push(factor);
    }

    pub fn factors(&self) -> &[JacobianFactor] {
        &self.factors
    }

    pub fn len(&self) -> usize {
        self.factors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factors.is_empty()
    }

    /// Zero vector of the tangent space.
    pub fn zero_tangent(&self) -> TangentStore {
        self.zero.clone()
    }

    /// `A·Δ`, one error vector per factor.
    pub fn apply_forward(&self, delta: &TangentStore) -> ErrorVectors {
        #[cfg(feature = "parallel")]
        let factors = self.factors.par_iter();
        #[cfg(not(feature = "parallel"))]
        let factors = self.factors.iter();

        ErrorVectors::from_vectors(factors.map(|factor| factor.apply_forward(delta)).collect())
    }

    /// `Aᵀ·y`.
    ///
    /// # Panics
    /// If `y` does not have one entry per factor.
    pub fn apply_adjoint(&self, y: &ErrorVectors) -> TangentStore {
        assert_eq!(
            y.len(),
            self.factors.len(),
            "adjoint input needs one error vector per factor"
        );
        let mut output = self.zero.clone();
        for (i, factor) in self.factors.iter().enumerate() {
            factor.apply_adjoint_into(y.slice(i), &mut output);
        }
        output
    }

    /// Stacked residual `b`.
    pub fn residual(&self) -> ErrorVectors {
        ErrorVectors::from_vectors(self.factors.iter().map(|factor| factor.b.clone()).collect())
    }

    /// Affine model `A·Δ + b`.
    pub fn error_vectors(&self, delta: &TangentStore) -> ErrorVectors {
        let mut vectors = self.apply_forward(delta);
        vectors.add_scaled_mut(1.0, &self.residual());
        vectors
    }

    /// Model error `0.5 ‖A·Δ + b‖²`.
    pub fn error(&self, delta: &TangentStore) -> f64 {
        0.5 * self.error_vectors(delta).squared_norm()
    }

    /// Append `√λ·I` on every variable.
    pub fn add_scalar_jacobians(&mut self, lambda: f64) {
        let scale = lambda.sqrt();
        for (id, dim) in self.zero.ids() {
            self.factors.push(JacobianFactor::scalar(id, dim, scale));
        }
    }

    /// Copy of `self` damped by `λ`.
    pub fn damped(&self, lambda: f64) -> Self {
        let mut damped = self.clone();
        damped.add_scalar_jacobians(lambda);
        damped
    }
}
