//! Item and vector abstractions consumed by the index.
//!
//! An [`Item`] couples an external identifier with the vector used for
//! distance computation and a version number for upsert/delete ordering.
//! Items are handed to the index by value and owned by it from then on.

use serde::{Deserialize, Serialize};
use std::hash::Hash;

/// An indexable item.
///
/// The version number orders writes to the same identifier: an insert or
/// delete only takes effect if its version is at least the version currently
/// stored (or tombstoned) for that identifier.
pub trait Item {
    /// External identifier type.
    type Id: Clone + Eq + Hash;
    /// Vector type handed to the distance metric.
    type Vector: PartialEq;

    /// The external identifier.
    fn id(&self) -> &Self::Id;

    /// The vector distances are computed on.
    fn vector(&self) -> &Self::Vector;

    /// Dimensionality of the vector; must match the index.
    fn dimensions(&self) -> usize;

    /// Write version, defaults to 0.
    fn version(&self) -> i64 {
        0
    }
}

/// A ready-made dense item: an identifier plus an `f32` vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DenseItem<TId> {
    id: TId,
    vector: Vec<f32>,
    version: i64,
}

impl<TId> DenseItem<TId> {
    /// Creates an item with version 0.
    pub fn new(id: TId, vector: Vec<f32>) -> Self {
        Self {
            id,
            vector,
            version: 0,
        }
    }

    /// Creates an item with an explicit version.
    pub fn with_version(id: TId, vector: Vec<f32>, version: i64) -> Self {
        Self {
            id,
            vector,
            version,
        }
    }
}

impl<TId: Clone + Eq + Hash> Item for DenseItem<TId> {
    type Id = TId;
    type Vector = Vec<f32>;

    fn id(&self) -> &TId {
        &self.id
    }

    fn vector(&self) -> &Vec<f32> {
        &self.vector
    }

    fn dimensions(&self) -> usize {
        self.vector.len()
    }

    fn version(&self) -> i64 {
        self.version
    }
}

/// A sparse vector: sorted indices of the non-zero entries plus their values.
///
/// `indices` must be strictly increasing; the sparse metrics rely on it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SparseVector<T> {
    /// Positions of the non-zero entries, strictly increasing.
    pub indices: Vec<i32>,
    /// Values at those positions.
    pub values: Vec<T>,
}

impl<T> SparseVector<T> {
    /// Creates a sparse vector from parallel index/value arrays.
    pub fn new(indices: Vec<i32>, values: Vec<T>) -> Self {
        debug_assert_eq!(indices.len(), values.len());
        Self { indices, values }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dense_item_accessors() {
        let item = DenseItem::new(7u64, vec![1.0, 2.0, 3.0]);
        assert_eq!(*item.id(), 7);
        assert_eq!(item.dimensions(), 3);
        assert_eq!(item.version(), 0);
    }

    #[test]
    fn test_dense_item_with_version() {
        let item = DenseItem::with_version("a".to_string(), vec![0.5], 12);
        assert_eq!(item.version(), 12);
        assert_eq!(item.vector(), &vec![0.5]);
    }

    #[test]
    fn test_sparse_vector_roundtrip() {
        let v = SparseVector::new(vec![0, 3, 9], vec![1.0f32, -2.0, 0.5]);
        let bytes = bincode::serialize(&v).unwrap();
        let back: SparseVector<f32> = bincode::deserialize(&bytes).unwrap();
        assert_eq!(v, back);
    }
}
