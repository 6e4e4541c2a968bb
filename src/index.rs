//! The `Index` trait: operations every index view supports.
//!
//! [`crate::hnsw::HnswIndex`] is the approximate implementation; its
//! [`crate::hnsw::ExactView`] companion implements the same trait with a
//! linear scan for recall evaluation.

use crate::error::{IndexError, Result};
use crate::item::Item;
use parking_lot::Mutex;
use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Progress callback for bulk inserts: `(items_done, items_total)`.
pub type ProgressFn = dyn Fn(usize, usize) + Sync;

/// A progress callback that does nothing.
pub fn null_progress(_done: usize, _total: usize) {}

/// A single nearest-neighbor hit: the stored item and its distance to the
/// query vector.
#[derive(Debug, Clone)]
pub struct SearchResult<TItem, U> {
    /// Distance from the query vector to the item, per the index metric.
    pub distance: U,
    /// The matched item.
    pub item: Arc<TItem>,
}

/// A k-nearest-neighbor index over items.
pub trait Index<TItem: Item> {
    /// Distance value type of the underlying metric.
    type Unit: Copy + PartialOrd;

    /// Adds a new item.
    ///
    /// If an item with the same identifier already exists: with removal
    /// disabled this returns `Ok(false)` and changes nothing; with removal
    /// enabled the item replaces the stored one when its version is at least
    /// as new, otherwise `Ok(false)`.
    fn add(&self, item: TItem) -> Result<bool>;

    /// Soft-deletes the item with the given identifier.
    ///
    /// Returns `false` when removal is disabled, when the identifier is
    /// unknown, or when the stored item carries a newer version.
    fn remove(&self, id: &TItem::Id, version: i64) -> bool;

    /// Number of live (non-deleted) items.
    fn size(&self) -> usize;

    /// Looks up a live item by identifier.
    fn get(&self, id: &TItem::Id) -> Option<Arc<TItem>>;

    /// Returns `true` if a live item with this identifier exists.
    fn contains(&self, id: &TItem::Id) -> bool {
        self.get(id).is_some()
    }

    /// All live items, in no particular order.
    fn items(&self) -> Vec<Arc<TItem>>;

    /// The `k` items nearest to `vector`, nearest first.
    fn find_nearest(&self, vector: &TItem::Vector, k: usize) -> Vec<SearchResult<TItem, Self::Unit>>;

    /// The `k` items nearest to the stored item with the given identifier,
    /// excluding that item itself. Empty when the identifier is unknown.
    fn find_neighbors(&self, id: &TItem::Id, k: usize) -> Vec<SearchResult<TItem, Self::Unit>> {
        let Some(item) = self.get(id) else {
            return Vec::new();
        };
        let mut results = self.find_nearest(item.vector(), k + 1);
        results.retain(|result| result.item.id() != id);
        results.truncate(k);
        results
    }

    /// Writes the index to a byte stream.
    ///
    /// Not atomic with respect to concurrent mutation; see the persistence
    /// module for the on-disk helpers.
    fn save(&self, out: &mut dyn Write) -> Result<()>;

    /// Inserts many items in parallel using all available hardware threads.
    fn add_all(&self, items: Vec<TItem>) -> Result<()>
    where
        Self: Sync,
        TItem: Send,
    {
        let num_threads = std::thread::available_parallelism().map_or(1, |n| n.get());
        self.add_all_with(
            items,
            num_threads,
            &null_progress,
            crate::config::DEFAULT_PROGRESS_UPDATE_INTERVAL,
        )
    }

    /// Inserts many items in parallel on `num_threads` threads, reporting to
    /// `progress` every `progress_interval` completed items.
    ///
    /// The first worker-thread failure is re-raised on the calling thread as
    /// [`IndexError::Uncategorized`]; remaining workers drain the queue.
    fn add_all_with(
        &self,
        items: Vec<TItem>,
        num_threads: usize,
        progress: &ProgressFn,
        progress_interval: usize,
    ) -> Result<()>
    where
        Self: Sync,
        TItem: Send,
    {
        let total = items.len();
        tracing::debug!(total, num_threads, "bulk insert started");

        let queue = Mutex::new(items.into_iter());
        let done = AtomicUsize::new(0);
        let failure: Mutex<Option<IndexError>> = Mutex::new(None);

        std::thread::scope(|scope| {
            for _ in 0..num_threads.max(1) {
                scope.spawn(|| loop {
                    let next = queue.lock().next();
                    let Some(item) = next else {
                        break;
                    };
                    match self.add(item) {
                        Ok(_) => {
                            let count = done.fetch_add(1, Ordering::Relaxed) + 1;
                            if progress_interval > 0
                                && (count % progress_interval == 0 || count == total)
                            {
                                progress(count, total);
                            }
                        }
                        Err(err) => {
                            let mut slot = failure.lock();
                            if slot.is_none() {
                                *slot = Some(err);
                            }
                            break;
                        }
                    }
                });
            }
        });

        match failure.into_inner() {
            Some(err) => Err(IndexError::Uncategorized(Box::new(err))),
            None => Ok(()),
        }
    }
}
