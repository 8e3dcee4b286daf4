//! Fixed-dimension Euclidean vectors.
//!
//! Tangent vectors and factor error vectors are small statically sized vectors.
//! [`EuclideanVector`] is the common interface the store, factors and solvers
//! use to add, scale and take inner products of them without knowing the
//! dimension at the call site.

use nalgebra::SVector;
use std::fmt::Debug;
use std::ops::{Add, AddAssign, Mul, Neg, Sub, SubAssign};

/// A real vector space of static dimension `DIM` with the standard inner product.
pub trait EuclideanVector:
    Copy
    + Clone
    + Debug
    + PartialEq
    + Send
    + Sync
    + 'static
    + Add<Output = Self>
    + Sub<Output = Self>
    + Neg<Output = Self>
    + Mul<f64, Output = Self>
    + AddAssign
    + SubAssign
{
    /// Number of components
    const DIM: usize;

    /// The zero vector.
    fn zero() -> Self;

    /// Standard inner product.
    fn dot(&self, other: &Self) -> f64;

    /// Unit vector along axis `index`.
    ///
    /// # Panics
    /// If `index >= DIM`.
    fn basis_vector(index: usize) -> Self;

    /// Components in order.
    fn as_slice(&self) -> &[f64];

    /// Build from exactly `DIM` components.
    ///
    /// # Panics
    /// If `values.len() != DIM`.
    fn from_slice(values: &[f64]) -> Self;

    fn squared_norm(&self) -> f64 {
        self.dot(self)
    }

    fn norm(&self) -> f64 {
        self.squared_norm().sqrt()
    }

    /// All `DIM` unit vectors, used to build Jacobian columns.
    fn standard_basis() -> Vec<Self> {
        (0..Self::DIM).map(Self::basis_vector).collect()
    }
}

impl<const N: usize> EuclideanVector for SVector<f64, N> {
    const DIM: usize = N;

    fn zero() -> Self {
        SVector::zeros()
    }

    fn dot(&self, other: &Self) -> f64 {
        nalgebra::Matrix::dot(self, other)
    }

    fn basis_vector(index: usize) -> Self {
        assert!(index < N, "basis index {index} out of range for dimension {N}");
        let mut basis = SVector::zeros();
        basis[index] = 1.0;
        basis
    }

    fn as_slice(&self) -> &[f64] {
        nalgebra::Matrix::as_slice(self)
    }

    fn from_slice(values: &[f64]) -> Self {
        assert_eq!(
            values.len(),
            N,
            "expected {N} components, got {}",
            values.len()
        );
        SVector::from_column_slice(values)
    }
}
