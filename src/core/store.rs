//! Heterogeneous, type-erased variable storage.
//!
//! A [`VariableAssignments`] holds one contiguous array per concrete variable type
//! (SE2 poses, SO3 rotations, landmark vectors, ...). Values are addressed by
//! [`TypedId`] handles, which carry the static type of the value and its index in
//! that type's array. Handles stay valid for the lifetime of the store because the
//! store only ever appends.
//!
//! ```text
//! VariableAssignments
//! ├── slot 0: VariableArray<SE2>      [p0, p1, p2, ...]
//! ├── slot 1: VariableArray<Vector2>  [l0, l1, ...]
//! └── slot 2: VariableArray<SO3>      [r0, ...]
//! ```
//!
//! The tangent space of a store is a [`TangentStore`]: the same slots, each a flat
//! `f64` buffer with the tangent dimension of its value type. It forms a vector
//! space (addition, scaling, inner product) used for steps and gradients.
//!
//! # Example
//!
//! ```
//! use tangent_fusion::core::store::VariableAssignments;
//! use tangent_fusion::manifold::SE2;
//! use nalgebra::Vector3;
//!
//! let mut values = VariableAssignments::new();
//! let pose = values.store(SE2::from_xy_angle(1.0, 0.0, 0.0));
//!
//! let mut step = values.zero_tangent();
//! step.set(pose, Vector3::new(0.0, 0.5, 0.0));
//! values.move_along(&step);
//!
//! assert!((values[pose].x() - 1.5).abs() < 1e-12);
//! ```

use crate::core::{CoreError, CoreResult};
use crate::manifold::{EuclideanVector, Manifold};
use nalgebra::DVector;
use std::any::{Any, TypeId, type_name};
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::ops::{Add, Index, IndexMut, Mul, Neg, Sub};

/// Typed handle to a value stored in a [`VariableAssignments`].
pub struct TypedId<T> {
    index: usize,
    _marker: PhantomData<fn() -> T>,
}

impl<T> TypedId<T> {
    pub(crate) fn new(index: usize) -> Self {
        TypedId {
            index,
            _marker: PhantomData,
        }
    }

    /// Position within the array of `T` values.
    pub fn index(&self) -> usize {
        self.index
    }
}

impl<T: 'static> TypedId<T> {
    /// Type-erased form of this handle.
    pub fn erased(&self) -> AnyId {
        AnyId {
            type_id: TypeId::of::<T>(),
            index: self.index,
        }
    }
}

impl<T> Clone for TypedId<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for TypedId<T> {}

impl<T> PartialEq for TypedId<T> {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index
    }
}

impl<T> Eq for TypedId<T> {}

impl<T> Hash for TypedId<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.index.hash(state);
    }
}

impl<T> fmt::Debug for TypedId<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypedId<{}>({})", type_name::<T>(), self.index)
    }
}

/// Type-erased handle: runtime type tag plus index.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct AnyId {
    type_id: TypeId,
    index: usize,
}

impl AnyId {
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    pub fn index(&self) -> usize {
        self.index
    }
}

/// Capability interface over one concrete-typed array of values.
trait AnyVariableArray: Send + Sync + fmt::Debug {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
    fn len(&self) -> usize;
    fn tangent_dim(&self) -> usize;
    fn type_name(&self) -> &'static str;
    fn boxed_clone(&self) -> Box<dyn AnyVariableArray>;
    /// Retract value `i` by `delta[i * dim..(i + 1) * dim]`.
    fn retract_all(&mut self, delta: &[f64]);
    /// Write `local_coordinate(self[i], other[i])` into `out`.
    fn local_coordinates(&self, other: &dyn AnyVariableArray, out: &mut [f64]);
}

#[derive(Clone, Debug)]
struct VariableArray<T> {
    values: Vec<T>,
}

impl<T: Manifold> AnyVariableArray for VariableArray<T> {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn len(&self) -> usize {
        self.values.len()
    }

    fn tangent_dim(&self) -> usize {
        T::DOF
    }

    fn type_name(&self) -> &'static str {
        type_name::<T>()
    }

    fn boxed_clone(&self) -> Box<dyn AnyVariableArray> {
        Box::new(self.clone())
    }

    fn retract_all(&mut self, delta: &[f64]) {
        let dim = T::DOF;
        assert_eq!(
            delta.len(),
            self.values.len() * dim,
            "tangent block for {} has the wrong size",
            type_name::<T>()
        );
        for (value, chunk) in self.values.iter_mut().zip(delta.chunks_exact(dim)) {
            *value = value.retract(&T::TangentVector::from_slice(chunk));
        }
    }

    fn local_coordinates(&self, other: &dyn AnyVariableArray, out: &mut [f64]) {
        let other = other
            .as_any()
            .downcast_ref::<VariableArray<T>>()
            .unwrap_or_else(|| panic!("mismatched arrays for {}", type_name::<T>()));
        assert_eq!(
            self.values.len(),
            other.values.len(),
            "stores hold different numbers of {}",
            type_name::<T>()
        );
        for ((a, b), chunk) in self
            .values
            .iter()
            .zip(other.values.iter())
            .zip(out.chunks_exact_mut(T::DOF))
        {
            chunk.copy_from_slice(a.local_coordinate(b).as_slice());
        }
    }
}

/// Assignment of values to every variable of an optimization problem.
///
/// Precondition violations (looking up a handle whose type has no array, or an
/// out-of-range index) panic: they indicate a malformed problem. Use
/// [`VariableAssignments::try_get`] for checked access.
#[derive(Debug, Default)]
pub struct VariableAssignments {
    arrays: Vec<Box<dyn AnyVariableArray>>,
    slots: HashMap<TypeId, usize>,
}

impl Clone for VariableAssignments {
    fn clone(&self) -> Self {
        VariableAssignments {
            arrays: self.arrays.iter().map(|array| array.boxed_clone()).collect(),
            slots: self.slots.clone(),
        }
    }
}

impl VariableAssignments {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `value` and return its handle.
    pub fn store<T: Manifold>(&mut self, value: T) -> TypedId<T> {
        let array = self.array_or_insert::<T>();
        array.values.push(value);
        TypedId::new(array.values.len() - 1)
    }

    pub fn get<T: Manifold>(&self, id: TypedId<T>) -> &T {
        let array = self.array::<T>();
        array.values.get(id.index).unwrap_or_else(|| {
            panic!(
                "{id:?} out of range: store holds {} values",
                array.values.len()
            )
        })
    }

    pub fn get_mut<T: Manifold>(&mut self, id: TypedId<T>) -> &mut T {
        let array = self.array_mut::<T>();
        let len = array.values.len();
        array
            .values
            .get_mut(id.index)
            .unwrap_or_else(|| panic!("{id:?} out of range: store holds {len} values"))
    }

    pub fn set<T: Manifold>(&mut self, id: TypedId<T>, value: T) {
        *self.get_mut(id) = value;
    }

    /// Checked lookup.
    pub fn try_get<T: Manifold>(&self, id: TypedId<T>) -> CoreResult<&T> {
        let slot = self.slots.get(&TypeId::of::<T>()).ok_or_else(|| {
            CoreError::Variable(format!("no values of type {} in store", type_name::<T>()))
        })?;
        self.arrays[*slot]
            .as_any()
            .downcast_ref::<VariableArray<T>>()
            .and_then(|array| array.values.get(id.index))
            .ok_or_else(|| CoreError::Variable(format!("{id:?} is out of range")))
    }

    /// All values of type `T` with their handles, in insertion order.
    pub fn iter<T: Manifold>(&self) -> impl Iterator<Item = (TypedId<T>, &T)> {
        let values: &[T] = self
            .slots
            .get(&TypeId::of::<T>())
            .and_then(|slot| self.arrays[*slot].as_any().downcast_ref::<VariableArray<T>>())
            .map(|array| array.values.as_slice())
            .unwrap_or(&[]);
        values
            .iter()
            .enumerate()
            .map(|(index, value)| (TypedId::new(index), value))
    }

    /// Number of stored values of type `T`.
    pub fn count<T: Manifold>(&self) -> usize {
        self.iter::<T>().count()
    }

    /// Total number of stored values.
    pub fn len(&self) -> usize {
        self.arrays.iter().map(|array| array.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sum of the tangent dimensions of all stored values.
    pub fn tangent_dimension(&self) -> usize {
        self.arrays
            .iter()
            .map(|array| array.len() * array.tangent_dim())
            .sum()
    }

    /// Names of the stored variable types, in the order they were first stored.
    pub fn type_names(&self) -> Vec<&'static str> {
        self.arrays.iter().map(|array| array.type_name()).collect()
    }

    /// Zero tangent vector at every stored value.
    pub fn zero_tangent(&self) -> TangentStore {
        let blocks = self
            .arrays
            .iter()
            .map(|array| TangentBlock {
                type_name: array.type_name(),
                dim: array.tangent_dim(),
                data: vec![0.0; array.len() * array.tangent_dim()],
            })
            .collect();
        TangentStore {
            blocks,
            slots: self.slots.clone(),
        }
    }

    /// Retract every value by the tangent vector at the same handle.
    ///
    /// # Panics
    /// If `along` lacks an entry for any stored value.
    pub fn move_along(&mut self, along: &TangentStore) {
        for (type_id, slot) in &self.slots {
            let block = along.block(*type_id);
            self.arrays[*slot].retract_all(&block.data);
        }
    }

    /// Copy of `self` moved along `along`.
    pub fn retracted(&self, along: &TangentStore) -> Self {
        let mut moved = self.clone();
        moved.move_along(along);
        moved
    }

    /// Tangent vectors at `self` pointing to `other`, value by value.
    ///
    /// # Panics
    /// If the two stores do not hold the same variables.
    pub fn local_coordinate(&self, other: &VariableAssignments) -> TangentStore {
        let mut tangent = self.zero_tangent();
        for (type_id, slot) in &self.slots {
            let other_slot = other.slots.get(type_id).unwrap_or_else(|| {
                panic!("other store has no {}", self.arrays[*slot].type_name())
            });
            let block = tangent.block_mut(*type_id);
            self.arrays[*slot]
                .local_coordinates(other.arrays[*other_slot].as_ref(), &mut block.data);
        }
        tangent
    }

    fn array<T: Manifold>(&self) -> &VariableArray<T> {
        self.slots
            .get(&TypeId::of::<T>())
            .and_then(|slot| self.arrays[*slot].as_any().downcast_ref::<VariableArray<T>>())
            .unwrap_or_else(|| panic!("no values of type {} in store", type_name::<T>()))
    }

    fn array_mut<T: Manifold>(&mut self) -> &mut VariableArray<T> {
        let slot = *self
            .slots
            .get(&TypeId::of::<T>())
            .unwrap_or_else(|| panic!("no values of type {} in store", type_name::<T>()));
        self.arrays[slot]
            .as_any_mut()
            .downcast_mut::<VariableArray<T>>()
            .unwrap_or_else(|| panic!("array type mismatch for {}", type_name::<T>()))
    }

    fn array_or_insert<T: Manifold>(&mut self) -> &mut VariableArray<T> {
        if !self.slots.contains_key(&TypeId::of::<T>()) {
            self.slots.insert(TypeId::of::<T>(), self.arrays.len());
            self.arrays.push(Box::new(VariableArray::<T> { values: Vec::new() }));
        }
        self.array_mut::<T>()
    }
}

impl<T: Manifold> Index<TypedId<T>> for VariableAssignments {
    type Output = T;

    fn index(&self, id: TypedId<T>) -> &T {
        self.get(id)
    }
}

impl<T: Manifold> IndexMut<TypedId<T>> for VariableAssignments {
    fn index_mut(&mut self, id: TypedId<T>) -> &mut T {
        self.get_mut(id)
    }
}

#[derive(Clone, Debug, PartialEq)]
struct TangentBlock {
    type_name: &'static str,
    dim: usize,
    data: Vec<f64>,
}

/// Tangent vectors for every value of a [`VariableAssignments`].
///
/// Arithmetic between two tangent stores requires them to have the same shape
/// (same types, counts and dimensions) and panics otherwise.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TangentStore {
    blocks: Vec<TangentBlock>,
    slots: HashMap<TypeId, usize>,
}

impl TangentStore {
    /// Zero vector with the same shape as `self`.
    pub fn zeros_like(&self) -> Self {
        let mut zeros = self.clone();
        zeros.scale_mut(0.0);
        zeros
    }

    pub fn get<T: Manifold>(&self, id: TypedId<T>) -> T::TangentVector {
        T::TangentVector::from_slice(self.slice(id.erased()))
    }

    pub fn set<T: Manifold>(&mut self, id: TypedId<T>, tangent: T::TangentVector) {
        self.slice_mut(id.erased()).copy_from_slice(tangent.as_slice());
    }

    /// Components of the tangent vector at `id`.
    pub fn slice(&self, id: AnyId) -> &[f64] {
        let block = self.block(id.type_id);
        let start = id.index * block.dim;
        assert!(
            start + block.dim <= block.data.len(),
            "{id:?} out of range for {}",
            block.type_name
        );
        &block.data[start..start + block.dim]
    }

    pub fn slice_mut(&mut self, id: AnyId) -> &mut [f64] {
        let block = self.block_mut(id.type_id);
        let start = id.index * block.dim;
        assert!(
            start + block.dim <= block.data.len(),
            "{id:?} out of range for {}",
            block.type_name
        );
        &mut block.data[start..start + block.dim]
    }

    /// Total number of scalar components.
    pub fn dimension(&self) -> usize {
        self.blocks.iter().map(|block| block.data.len()).sum()
    }

    pub fn same_shape(&self, other: &TangentStore) -> bool {
        self.slots == other.slots
            && self
                .blocks
                .iter()
                .zip(&other.blocks)
                .all(|(a, b)| a.dim == b.dim && a.data.len() == b.data.len())
    }

    pub fn dot(&self, other: &TangentStore) -> f64 {
        self.assert_same_shape(other);
        self.blocks
            .iter()
            .zip(&other.blocks)
            .map(|(a, b)| a.data.iter().zip(&b.data).map(|(x, y)| x * y).sum::<f64>())
            .sum()
    }

    pub fn squared_norm(&self) -> f64 {
        self.dot(self)
    }

    pub fn norm(&self) -> f64 {
        self.squared_norm().sqrt()
    }

    pub fn scale_mut(&mut self, factor: f64) {
        for block in &mut self.blocks {
            block.data.iter_mut().for_each(|x| *x *= factor);
        }
    }

    /// `self += alpha * other`
    pub fn add_scaled_mut(&mut self, alpha: f64, other: &TangentStore) {
        self.assert_same_shape(other);
        for (a, b) in self.blocks.iter_mut().zip(&other.blocks) {
            a.data
                .iter_mut()
                .zip(&b.data)
                .for_each(|(x, y)| *x += alpha * y);
        }
    }

    /// Every variable handle with its tangent dimension, slot by slot.
    pub fn ids(&self) -> Vec<(AnyId, usize)> {
        let mut slots: Vec<(usize, TypeId)> = self
            .slots
            .iter()
            .map(|(type_id, slot)| (*slot, *type_id))
            .collect();
        slots.sort_unstable_by_key(|(slot, _)| *slot);
        slots
            .into_iter()
            .flat_map(|(slot, type_id)| {
                let block = &self.blocks[slot];
                let count = if block.dim == 0 { 0 } else { block.data.len() / block.dim };
                (0..count).map(move |index| (AnyId { type_id, index }, block.dim))
            })
            .collect()
    }

    /// True when every component is finite.
    pub fn is_finite(&self) -> bool {
        self.blocks
            .iter()
            .all(|block| block.data.iter().all(|x| x.is_finite()))
    }

    /// All components concatenated in slot order.
    pub fn to_dvector(&self) -> DVector<f64> {
        DVector::from_iterator(
            self.dimension(),
            self.blocks.iter().flat_map(|block| block.data.iter().copied()),
        )
    }

    fn block(&self, type_id: TypeId) -> &TangentBlock {
        let slot = self
            .slots
            .get(&type_id)
            .unwrap_or_else(|| panic!("tangent store has no entry for {type_id:?}"));
        &self.blocks[*slot]
    }

    fn block_mut(&mut self, type_id: TypeId) -> &mut TangentBlock {
        let slot = *self
            .slots
            .get(&type_id)
            .unwrap_or_else(|| panic!("tangent store has no entry for {type_id:?}"));
        &mut self.blocks[slot]
    }

    fn assert_same_shape(&self, other: &TangentStore) {
        assert!(
            self.same_shape(other),
            "tangent stores have different shapes"
        );
    }
}

impl Add for TangentStore {
    type Output = TangentStore;

    fn add(mut self, rhs: TangentStore) -> TangentStore {
        self.add_scaled_mut(1.0, &rhs);
        self
    }
}

impl Sub for TangentStore {
    type Output = TangentStore;

    fn sub(mut self, rhs: TangentStore) -> TangentStore {
        self.add_scaled_mut(-1.0, &rhs);
        self
    }
}

impl Mul<f64> for TangentStore {
    type Output = TangentStore;

    fn mul(mut self, rhs: f64) -> TangentStore {
        self.scale_mut(rhs);
        self
    }
}

impl Neg for TangentStore {
    type Output = TangentStore;

    fn neg(self) -> TangentStore {
        self * -1.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifold::{LieGroup, SE2, SO3};
    use nalgebra::{Vector2, Vector3};

    const TOLERANCE: f64 = 1e-12;

    fn mixed_store() -> (VariableAssignments, TypedId<SE2>, TypedId<Vector2<f64>>, TypedId<SE2>) {
        let mut values = VariableAssignments::new();
        let p0 = values.store(SE2::from_xy_angle(0.0, 0.0, 0.0));
        let l0 = values.store(Vector2::new(3.0, 4.0));
        let p1 = values.store(SE2::from_xy_angle(1.0, 2.0, 0.5));
        (values, p0, l0, p1)
    }

    #[test]
    fn test_store_and_get() {
        let (values, p0, l0, p1) = mixed_store();
        assert_eq!(values.len(), 3);
        assert_eq!(values.count::<SE2>(), 2);
        assert_eq!(values.count::<Vector2<f64>>(), 1);
        assert_eq!(p0.index(), 0);
        assert_eq!(p1.index(), 1);
        assert_eq!(l0.index(), 0);
        assert_eq!(values[l0], Vector2::new(3.0, 4.0));
        assert!((values.get(p1).y() - 2.0).abs() < TOLERANCE);
        assert_eq!(values.tangent_dimension(), 8);
        assert_eq!(values.type_names().len(), 2);
    }

    #[test]
    fn test_handles_stable_under_append() {
        let (mut values, p0, _, _) = mixed_store();
        let before = *values.get(p0);
        for i in 0..100 {
            values.store(SE2::from_xy_angle(i as f64, 0.0, 0.0));
        }
        assert_eq!(*values.get(p0), before);
    }

    #[test]
    fn test_set() {
        let (mut values, _, l0, _) = mixed_store();
        values.set(l0, Vector2::new(-1.0, 0.5));
        assert_eq!(values[l0], Vector2::new(-1.0, 0.5));
        values[l0] = Vector2::new(2.0, 2.0);
        assert_eq!(values[l0], Vector2::new(2.0, 2.0));
    }

    #[test]
    fn test_try_get_errors() {
        let (values, _, _, _) = mixed_store();
        assert!(values.try_get(TypedId::<SO3>::new(0)).is_err());
        assert!(values.try_get(TypedId::<SE2>::new(5)).is_err());
        assert!(values.try_get(TypedId::<SE2>::new(1)).is_ok());
    }

    #[test]
    #[should_panic(expected = "no values of type")]
    fn test_get_missing_type_panics() {
        let (values, _, _, _) = mixed_store();
        let _ = values.get(TypedId::<SO3>::new(0));
    }

    #[test]
    fn test_zero_tangent_and_move() {
        let (mut values, p0, l0, p1) = mixed_store();
        let original = values.clone();
        let mut step = values.zero_tangent();
        assert_eq!(step.dimension(), 8);
        assert_eq!(step.squared_norm(), 0.0);

        values.move_along(&step);
        assert!(values.get(p1).is_approx(original.get(p1), TOLERANCE));

        step.set(p0, Vector3::new(0.1, 1.0, 0.0));
        step.set(l0, Vector2::new(0.5, -0.5));
        values.move_along(&step);
        assert!(values.get(p0).is_approx(&SE2::exp(&Vector3::new(0.1, 1.0, 0.0), None), TOLERANCE));
        assert_eq!(values[l0], Vector2::new(3.5, 3.5));
        assert!(values.get(p1).is_approx(original.get(p1), TOLERANCE));
    }

    #[test]
    fn test_local_coordinate_inverts_move() {
        let (values, p0, l0, p1) = mixed_store();
        let mut step = values.zero_tangent();
        step.set(p0, Vector3::new(0.05, 0.2, -0.1));
        step.set(p1, Vector3::new(-0.1, 0.0, 0.3));
        step.set(l0, Vector2::new(1.0, 2.0));
        let moved = values.retracted(&step);
        let recovered = values.local_coordinate(&moved);
        assert!((recovered - step).norm() < 1e-10);
    }

    #[test]
    fn test_tangent_store_vector_space() {
        let (values, p0, l0, _) = mixed_store();
        let mut a = values.zero_tangent();
        let mut b = values.zero_tangent();
        a.set(p0, Vector3::new(1.0, 2.0, 3.0));
        b.set(p0, Vector3::new(1.0, 0.0, -1.0));
        b.set(l0, Vector2::new(4.0, 0.0));
        assert_eq!(a.dot(&b), -2.0);

        a.add_scaled_mut(2.0, &b);
        assert_eq!(a.get(p0), Vector3::new(3.0, 2.0, 1.0));
        assert_eq!(a.get(l0), Vector2::new(8.0, 0.0));

        let c = a.clone() - a.clone() * 0.5;
        assert_eq!(c.get(l0), Vector2::new(4.0, 0.0));
        assert_eq!((-c).get(p0), Vector3::new(-1.5, -1.0, -0.5));
        assert_eq!(b.zeros_like().norm(), 0.0);
        assert_eq!(b.to_dvector().len(), 8);
    }

    #[test]
    #[should_panic(expected = "different shapes")]
    fn test_tangent_shape_mismatch_panics() {
        let (values, _, _, _) = mixed_store();
        let mut other = VariableAssignments::new();
        other.store(SE2::identity());
        let _ = values.zero_tangent().dot(&other.zero_tangent());
    }

    #[test]
    #[should_panic(expected = "tangent store has no entry")]
    fn test_move_along_missing_entry_panics() {
        let (mut values, _, _, _) = mixed_store();
        let mut other = VariableAssignments::new();
        other.store(SE2::identity());
        values.move_along(&other.zero_tangent());
    }
}
