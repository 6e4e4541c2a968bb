//! # smallworld
//!
//! Embeddable in-memory approximate nearest-neighbor index built on the
//! Hierarchical Navigable Small World graph of Malkov & Yashunin
//! (<https://arxiv.org/abs/1603.09320>).
//!
//! The index supports concurrent insertion, soft deletion with versioning,
//! k-nearest-neighbor queries under a pluggable distance metric, and
//! persistence to a byte stream. Deleted nodes stay in the graph as
//! tombstones to preserve navigability; they are traversed during search but
//! never returned to callers.
//!
//! ```no_run
//! use smallworld::distance::SquaredEuclidean;
//! use smallworld::hnsw::HnswIndex;
//! use smallworld::item::DenseItem;
//!
//! let index: HnswIndex<DenseItem<u64>, _> =
//!     HnswIndex::builder(2, SquaredEuclidean, 1000).build();
//! index.add(DenseItem::new(1, vec![0.0, 0.0])).unwrap();
//! index.add(DenseItem::new(2, vec![3.0, 4.0])).unwrap();
//! let hits = index.find_nearest(&vec![0.0, 0.1], 1);
//! assert_eq!(*hits[0].item.id(), 1);
//! ```

/// Default tuning parameters and limits.
pub mod config;
/// Distance metrics: euclidean, cosine, inner product, and friends.
pub mod distance;
/// Error types surfaced at the index boundary.
pub mod error;
/// The HNSW graph engine: construction, search, soft deletes, persistence.
pub mod hnsw;
/// The `Index` trait: the operations every index view supports.
pub mod index;
/// Item and vector abstractions consumed by the index.
pub mod item;
/// Support structures: bit-set, object pool, Murmur3 hash.
pub mod util;

pub use error::IndexError;
pub use hnsw::HnswIndex;
pub use index::{Index, SearchResult};
pub use item::{DenseItem, Item};
