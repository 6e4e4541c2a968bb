//! HNSW graph structure: node store, lookup maps, tuning parameters, and
//! the concurrency controller.
//!
//! Nodes are allocated dense internal IDs under the global lock and
//! published into a fixed-capacity slot array. Soft-deleted nodes keep their
//! slot and their graph edges so the graph stays navigable; they are only
//! excluded from result lists. The entry point is always a node at the
//! maximum layer inserted so far.

use crate::config;
use crate::distance::Metric;
use crate::hnsw::persist::{BincodeCodec, Codec};
use crate::item::Item;
use crate::util::{ArrayBitSet, ObjectPool};
use parking_lot::{Mutex, RwLock};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

/// A graph node: one slot in the node store.
///
/// `connections[level]` holds the neighbor IDs at that level; the outer
/// vector's length is fixed at `top_level + 1` when the node is created.
/// The item handle and the deleted flag are replaceable without taking the
/// connection lock.
pub(crate) struct Node<TItem> {
    pub(crate) id: u32,
    top_level: usize,
    pub(crate) connections: Mutex<Vec<Vec<u32>>>,
    item: RwLock<Arc<TItem>>,
    deleted: AtomicBool,
}

impl<TItem> Node<TItem> {
    pub(crate) fn new(
        id: u32,
        top_level: usize,
        item: Arc<TItem>,
        max_m: usize,
        max_m0: usize,
    ) -> Self {
        let mut connections = Vec::with_capacity(top_level + 1);
        for level in 0..=top_level {
            let level_m = if level == 0 { max_m0 } else { max_m };
            connections.push(Vec::with_capacity(level_m));
        }
        Self {
            id,
            top_level,
            connections: Mutex::new(connections),
            item: RwLock::new(item),
            deleted: AtomicBool::new(false),
        }
    }

    /// Rebuilds a node from persisted parts.
    pub(crate) fn from_parts(
        id: u32,
        connections: Vec<Vec<u32>>,
        item: Arc<TItem>,
        deleted: bool,
    ) -> Self {
        Self {
            id,
            top_level: connections.len().saturating_sub(1),
            connections: Mutex::new(connections),
            item: RwLock::new(item),
            deleted: AtomicBool::new(deleted),
        }
    }

    /// The node's assigned top level; immutable after insertion.
    pub(crate) fn top_level(&self) -> usize {
        self.top_level
    }

    /// A handle to the current item.
    pub(crate) fn item(&self) -> Arc<TItem> {
        self.item.read().clone()
    }

    /// Swaps in a newer item (same identifier, byte-equal vector).
    pub(crate) fn replace_item(&self, item: Arc<TItem>) {
        *self.item.write() = item;
    }

    pub(crate) fn is_deleted(&self) -> bool {
        self.deleted.load(Ordering::Acquire)
    }

    pub(crate) fn set_deleted(&self) {
        self.deleted.store(true, Ordering::Release);
    }
}

/// Mutable index state guarded by the global lock.
pub(crate) struct IndexState<TId> {
    /// Number of allocated node slots, live or tombstoned.
    pub(crate) node_count: usize,
    /// Node store capacity; grows only via `resize`.
    pub(crate) capacity: usize,
    /// External identifier → internal node ID, live nodes only.
    pub(crate) lookup: HashMap<TId, u32>,
    /// Tombstone versions for identifiers whose node was soft-deleted.
    pub(crate) tombstones: HashMap<TId, i64>,
    /// Per-identifier mutexes, created lazily on first insert.
    pub(crate) item_locks: HashMap<TId, Arc<Mutex<()>>>,
}

/// An approximate nearest-neighbor index over a hierarchical navigable
/// small-world graph.
///
/// All operations take `&self`; interior locking permits concurrent inserts
/// and searches. See the module docs for the locking protocol.
pub struct HnswIndex<TItem: Item, M: Metric<TItem::Vector>> {
    pub(crate) dimensions: usize,
    pub(crate) m: usize,
    pub(crate) max_m: usize,
    pub(crate) max_m0: usize,
    pub(crate) level_lambda: f64,
    pub(crate) ef: AtomicUsize,
    pub(crate) ef_construction: usize,
    pub(crate) remove_enabled: bool,
    pub(crate) metric: M,
    pub(crate) id_codec: Box<dyn Codec<TItem::Id>>,
    pub(crate) item_codec: Box<dyn Codec<TItem>>,
    /// The global lock.
    pub(crate) state: Mutex<IndexState<TItem::Id>>,
    /// Fixed-capacity slot array; slots are published under the global lock.
    pub(crate) nodes: RwLock<Vec<Option<Arc<Node<TItem>>>>>,
    /// The node at the maximum layer, or `None` while the index is empty.
    pub(crate) entry_point: RwLock<Option<Arc<Node<TItem>>>>,
    /// Pool of visited sets loaned to searches; swapped out on `resize`.
    pub(crate) visited_pool: RwLock<Arc<ObjectPool<ArrayBitSet>>>,
    /// Internal IDs of insertions whose graph linking is still in progress.
    pub(crate) excluded: Mutex<ArrayBitSet>,
}

impl<TItem, M> HnswIndex<TItem, M>
where
    TItem: Item,
    M: Metric<TItem::Vector>,
{
    /// Starts building an index for vectors of the given dimensionality,
    /// holding at most `max_item_count` items (live plus tombstoned).
    pub fn builder(dimensions: usize, metric: M, max_item_count: usize) -> Builder<TItem, M> {
        Builder {
            dimensions,
            metric,
            max_item_count,
            m: config::DEFAULT_M,
            ef: config::DEFAULT_EF,
            ef_construction: config::DEFAULT_EF_CONSTRUCTION,
            remove_enabled: config::DEFAULT_REMOVE_ENABLED,
            _items: std::marker::PhantomData,
        }
    }

    /// Fetches the node in slot `id`.
    pub(crate) fn node(&self, id: u32) -> Option<Arc<Node<TItem>>> {
        self.nodes.read().get(id as usize).and_then(Clone::clone)
    }

    /// Draws the top level for an identifier from an exponential
    /// distribution, deterministically: the same identifier always lands on
    /// the same level, so index builds are reproducible given the same
    /// insertion order.
    pub(crate) fn assign_level(&self, id: &TItem::Id) -> usize {
        let mut hasher = DefaultHasher::new();
        id.hash(&mut hasher);
        let bytes = (hasher.finish() as u32).to_be_bytes();
        let hash = crate::util::murmur::hash32(&bytes, config::LEVEL_HASH_SEED) as i32;
        let uniform = (hash as f64 / i32::MAX as f64).abs();
        if uniform == 0.0 {
            return 0;
        }
        (-uniform.ln() * self.level_lambda) as usize
    }

    /// Number of live items.
    pub fn size(&self) -> usize {
        self.state.lock().lookup.len()
    }

    /// Looks up a live item by identifier.
    pub fn get(&self, id: &TItem::Id) -> Option<Arc<TItem>> {
        let state = self.state.lock();
        let node_id = *state.lookup.get(id)?;
        self.node(node_id).map(|node| node.item())
    }

    /// All live items, in slot order.
    pub fn items(&self) -> Vec<Arc<TItem>> {
        let state = self.state.lock();
        let nodes = self.nodes.read();
        nodes[..state.node_count]
            .iter()
            .flatten()
            .filter(|node| !node.is_deleted())
            .map(|node| node.item())
            .collect()
    }

    /// Soft-deletes the item with the given identifier.
    ///
    /// The node keeps its slot and its edges; it is only excluded from
    /// results from now on. Returns `false` when removal is disabled, the
    /// identifier is unknown, or the stored item is newer than `version`.
    pub fn remove(&self, id: &TItem::Id, version: i64) -> bool {
        if !self.remove_enabled {
            return false;
        }
        let mut state = self.state.lock();
        self.remove_locked(&mut state, id, version)
    }

    /// Soft delete with the global lock already held.
    pub(crate) fn remove_locked(
        &self,
        state: &mut IndexState<TItem::Id>,
        id: &TItem::Id,
        version: i64,
    ) -> bool {
        let Some(&node_id) = state.lookup.get(id) else {
            return false;
        };
        let Some(node) = self.node(node_id) else {
            return false;
        };
        if node.item().version() > version {
            return false;
        }
        node.set_deleted();
        state.lookup.remove(id);
        state.tombstones.insert(id.clone(), version);
        true
    }

    /// Grows the node store to `new_size` slots. Shrinking is not
    /// supported; a smaller size is ignored.
    pub fn resize(&self, new_size: usize) {
        let mut state = self.state.lock();
        if new_size <= state.capacity {
            return;
        }
        state.capacity = new_size;
        self.nodes.write().resize(new_size, None);

        let pool_size = std::thread::available_parallelism().map_or(1, |n| n.get());
        *self.visited_pool.write() = Arc::new(ObjectPool::new(pool_size, || {
            ArrayBitSet::new(new_size)
        }));

        let mut excluded = self.excluded.lock();
        let grown = ArrayBitSet::copy_grow(&excluded, new_size);
        *excluded = grown;
        tracing::info!(new_size, "node store resized");
    }

    /// A brute-force view over the same node store, for recall evaluation.
    pub fn as_exact(&self) -> super::ExactView<'_, TItem, M> {
        super::ExactView::new(self)
    }

    /// Vector dimensionality the index was built with.
    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    /// Bidirectional links created per node per level.
    pub fn m(&self) -> usize {
        self.m
    }

    /// Current query-time search width.
    pub fn ef(&self) -> usize {
        self.ef.load(Ordering::Relaxed)
    }

    /// Adjusts the query-time search width. The only tuning knob that is
    /// mutable after construction.
    pub fn set_ef(&self, ef: usize) {
        self.ef.store(ef, Ordering::Relaxed);
    }

    /// Construction-time search width.
    pub fn ef_construction(&self) -> usize {
        self.ef_construction
    }

    /// Whether soft deletion and upsert-with-replace are enabled.
    pub fn remove_enabled(&self) -> bool {
        self.remove_enabled
    }

    /// Current node store capacity.
    pub fn max_item_count(&self) -> usize {
        self.state.lock().capacity
    }
}

/// Configures and creates an [`HnswIndex`].
pub struct Builder<TItem: Item, M: Metric<TItem::Vector>> {
    dimensions: usize,
    metric: M,
    max_item_count: usize,
    m: usize,
    ef: usize,
    ef_construction: usize,
    remove_enabled: bool,
    _items: std::marker::PhantomData<fn() -> TItem>,
}

impl<TItem, M> Builder<TItem, M>
where
    TItem: Item,
    M: Metric<TItem::Vector>,
{
    /// Sets the number of bidirectional links created per node per level.
    /// Sensible values range from 2 to 100; higher suits high-dimensional
    /// data, at a memory and build-time cost. Drives `max_m = m`,
    /// `max_m0 = 2m`, and the level distribution `lambda = 1/ln(m)`.
    pub fn with_m(mut self, m: usize) -> Self {
        self.m = m;
        self
    }

    /// Sets the query-time search width.
    pub fn with_ef(mut self, ef: usize) -> Self {
        self.ef = ef;
        self
    }

    /// Sets the construction-time search width; values below `m` are raised
    /// to `m`.
    pub fn with_ef_construction(mut self, ef_construction: usize) -> Self {
        self.ef_construction = ef_construction;
        self
    }

    /// Enables soft deletion and upsert-with-replace.
    pub fn with_remove_enabled(mut self, remove_enabled: bool) -> Self {
        self.remove_enabled = remove_enabled;
        self
    }

    /// Builds the index with bincode codecs for persistence.
    pub fn build(self) -> HnswIndex<TItem, M>
    where
        TItem: Serialize + DeserializeOwned + 'static,
        TItem::Id: Serialize + DeserializeOwned + 'static,
    {
        self.build_with_codecs(
            Box::new(BincodeCodec::default()),
            Box::new(BincodeCodec::default()),
        )
    }

    /// Builds the index with caller-supplied persistence codecs.
    pub fn build_with_codecs(
        self,
        id_codec: Box<dyn Codec<TItem::Id>>,
        item_codec: Box<dyn Codec<TItem>>,
    ) -> HnswIndex<TItem, M> {
        let capacity = self.max_item_count;
        let pool_size = std::thread::available_parallelism().map_or(1, |n| n.get());
        HnswIndex {
            dimensions: self.dimensions,
            m: self.m,
            max_m: self.m,
            max_m0: self.m * 2,
            level_lambda: 1.0 / (self.m as f64).ln(),
            ef: AtomicUsize::new(self.ef),
            ef_construction: self.ef_construction.max(self.m),
            remove_enabled: self.remove_enabled,
            metric: self.metric,
            id_codec,
            item_codec,
            state: Mutex::new(IndexState {
                node_count: 0,
                capacity,
                lookup: HashMap::new(),
                tombstones: HashMap::new(),
                item_locks: HashMap::new(),
            }),
            nodes: RwLock::new(vec![None; capacity]),
            entry_point: RwLock::new(None),
            visited_pool: RwLock::new(Arc::new(ObjectPool::new(pool_size, || {
                ArrayBitSet::new(capacity)
            }))),
            excluded: Mutex::new(ArrayBitSet::new(capacity)),
        }
    }
}
