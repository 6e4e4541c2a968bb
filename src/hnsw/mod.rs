//! Hierarchical Navigable Small World graph engine.
//!
//! The graph is layered: every node lives on layer 0, and each node is
//! additionally promoted to higher layers with exponentially decaying
//! probability (deterministic per identifier). Queries descend greedily
//! from the entry point through the sparse upper layers, then run a
//! best-first expansion on the base layer.
//!
//! ## Locking protocol
//!
//! A single global lock serializes node allocation, entry-point promotion,
//! the lookup and tombstone maps, `remove`, `get`, `size`, `items`,
//! `resize`, and `save`. Each node carries its own mutex over its neighbor
//! lists; search and connect operations hold at most one of these plus the
//! one being modified, always acquired current-node-then-neighbor, and a
//! connect releases the first before taking the next, so no lock cycle can
//! form. A per-identifier mutex covers the linking phase of `add` so racing
//! inserts of the same identifier cannot interleave after the global lock
//! is released. The excluded-candidates bit-set hides nodes whose wiring is
//! still in progress from concurrent writers.

/// Brute-force view for recall evaluation.
pub mod exact;
/// Graph structure, node store, builder, and the concurrency controller.
pub mod graph;
/// Insertion: upsert gating, linking, heuristic neighbor selection.
pub mod insert;
/// Persistence wire format and codecs.
pub mod persist;
/// Greedy descent, base-layer expansion, k-NN queries.
pub mod search;

pub use exact::ExactView;
pub use graph::{Builder, HnswIndex};
pub use persist::{BincodeCodec, Codec};

use crate::distance::Metric;
use crate::error::Result;
use crate::index::{Index, SearchResult};
use crate::item::Item;
use std::io::Write;
use std::sync::Arc;

impl<TItem, M> Index<TItem> for HnswIndex<TItem, M>
where
    TItem: Item,
    M: Metric<TItem::Vector>,
{
    type Unit = M::Unit;

    fn add(&self, item: TItem) -> Result<bool> {
        HnswIndex::add(self, item)
    }

    fn remove(&self, id: &TItem::Id, version: i64) -> bool {
        HnswIndex::remove(self, id, version)
    }

    fn size(&self) -> usize {
        HnswIndex::size(self)
    }

    fn get(&self, id: &TItem::Id) -> Option<Arc<TItem>> {
        HnswIndex::get(self, id)
    }

    fn items(&self) -> Vec<Arc<TItem>> {
        HnswIndex::items(self)
    }

    fn find_nearest(&self, vector: &TItem::Vector, k: usize) -> Vec<SearchResult<TItem, M::Unit>> {
        HnswIndex::find_nearest(self, vector, k)
    }

    fn save(&self, out: &mut dyn Write) -> Result<()> {
        HnswIndex::save(self, out)
    }
}
