//! HNSW insertion: upsert gating, node allocation, graph linking with
//! heuristic neighbor selection, and entry-point maintenance.
//!
//! The global lock covers everything up to the publication of the new node.
//! Once the node cannot raise the top layer, the lock is released and the
//! linking phase runs concurrently with other inserts. The
//! excluded-candidates set keeps concurrent writers from linking *to* a node
//! whose neighbor lists are still being wired; readers that reach such a
//! node early see pre-allocated empty lists, which is safe.

use crate::distance::{cmp_unit, Metric};
use crate::error::{IndexError, Result};
use crate::hnsw::graph::{HnswIndex, IndexState, Node};
use crate::hnsw::search::ResultCandidate;
use crate::item::Item;
use parking_lot::{Mutex, MutexGuard};
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::Arc;

impl<TItem, M> HnswIndex<TItem, M>
where
    TItem: Item,
    M: Metric<TItem::Vector>,
{
    /// Adds a new item to the index.
    ///
    /// Returns `Ok(false)` without modifying the index when the identifier
    /// is already present and removal is disabled, when the incoming
    /// version is older than the stored item, or when a tombstone for the
    /// identifier carries a newer version. An existing item with an equal
    /// vector is replaced in place; one with a different vector is
    /// tombstoned and re-inserted as a fresh node.
    pub fn add(&self, item: TItem) -> Result<bool> {
        if item.dimensions() != self.dimensions {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimensions,
                actual: item.dimensions(),
            });
        }

        let level = self.assign_level(item.id());
        let item = Arc::new(item);

        let mut state = self.state.lock();

        if let Some(&existing_id) = state.lookup.get(item.id()) {
            if !self.remove_enabled {
                return Ok(false);
            }
            let Some(existing) = self.node(existing_id) else {
                return Ok(false);
            };
            let stored = existing.item();
            if item.version() < stored.version() {
                return Ok(false);
            }
            if stored.vector() == item.vector() {
                existing.replace_item(Arc::clone(&item));
                return Ok(true);
            }
            // Different vector: tombstone the old node and insert a fresh one
            self.remove_locked(&mut state, item.id(), item.version());
        } else if let Some(&tombstone_version) = state.tombstones.get(item.id()) {
            if item.version() < tombstone_version {
                return Ok(false);
            }
        }

        if state.node_count >= state.capacity {
            return Err(IndexError::SizeLimitExceeded {
                capacity: state.capacity,
            });
        }

        let new_id = state.node_count as u32;
        state.node_count += 1;
        self.excluded.lock().insert(new_id);

        let node = Arc::new(Node::new(
            new_id,
            level,
            Arc::clone(&item),
            self.max_m,
            self.max_m0,
        ));
        self.nodes.write()[new_id as usize] = Some(Arc::clone(&node));
        state.lookup.insert(item.id().clone(), new_id);
        state.tombstones.remove(item.id());

        let item_lock = Arc::clone(
            state
                .item_locks
                .entry(item.id().clone())
                .or_insert_with(|| Arc::new(Mutex::new(()))),
        );
        let entry_copy = self.entry_point.read().clone();

        // Held until the linking below is done; two racing inserts of the
        // same identifier must not interleave after the global lock drops.
        let item_guard = item_lock.lock();

        let mut global: Option<MutexGuard<'_, IndexState<TItem::Id>>> = Some(state);
        if let Some(ref entry) = entry_copy {
            if level <= entry.top_level() {
                // The new node cannot become the entry point; let other
                // inserts proceed while we wire this one in.
                global = None;
            }
        }

        if let Some(ref entry) = entry_copy {
            let query = item.vector();
            let mut curr = Arc::clone(entry);
            if level < entry.top_level() {
                curr = self.greedy_closest(query, curr, entry.top_level(), level + 1);
            }

            for layer in (0..=level.min(entry.top_level())).rev() {
                let mut top_candidates =
                    self.search_base_layer(&curr, query, self.ef_construction, layer);

                if entry.is_deleted() {
                    // A tombstoned entry point contributes only the +∞
                    // sentinel to the expansion; re-inject it with its real
                    // distance so the new node still links toward it.
                    let entry_item = entry.item();
                    let distance = self.metric.distance(query, entry_item.vector());
                    top_candidates.push(ResultCandidate {
                        distance,
                        node_id: entry.id,
                    });
                    if top_candidates.len() > self.ef_construction {
                        top_candidates.pop();
                    }
                }

                self.mutually_connect(&node, top_candidates, layer);
            }
        }

        let promote = match entry_copy {
            None => true,
            Some(ref entry) => level > entry.top_level(),
        };
        if promote {
            // The global lock is still held in exactly this case, which
            // makes the promotion atomic with the level comparison.
            *self.entry_point.write() = Some(Arc::clone(&node));
        }

        drop(item_guard);
        self.excluded.lock().remove(new_id);
        drop(global);
        Ok(true)
    }

    /// Wires the new node into the graph at one layer: selects diverse
    /// neighbors from the search candidates, appends them to the new node's
    /// list, and back-links each neighbor, re-pruning any neighbor whose
    /// list would exceed its per-level maximum.
    fn mutually_connect(
        &self,
        new_node: &Arc<Node<TItem>>,
        top_candidates: BinaryHeap<ResultCandidate<M::Unit>>,
        layer: usize,
    ) {
        let best_n = if layer == 0 { self.max_m0 } else { self.max_m };
        let new_item = new_node.item();
        let new_vector = new_item.vector();

        let selected = self.select_neighbors(top_candidates.into_vec(), self.m);

        for candidate in selected {
            let neighbour_id = candidate.node_id;
            if self.excluded.lock().contains(neighbour_id) {
                // Another insert is mid-wiring on this node; linking through
                // it now could expose a half-connected neighborhood.
                continue;
            }

            {
                let mut connections = new_node.connections.lock();
                connections[layer].push(neighbour_id);
            }

            let Some(neighbour) = self.node(neighbour_id) else {
                continue;
            };
            let neighbour_item = neighbour.item();
            let neighbour_vector = neighbour_item.vector();

            let mut connections = neighbour.connections.lock();
            let Some(list) = connections.get_mut(layer) else {
                continue;
            };

            if list.len() < best_n {
                list.push(new_node.id);
            } else {
                // Full: re-select the most diverse best_n among the current
                // neighbors plus the new node.
                let mut candidates = Vec::with_capacity(list.len() + 1);
                candidates.push(ResultCandidate {
                    distance: self.metric.distance(new_vector, neighbour_vector),
                    node_id: new_node.id,
                });
                for &other_id in list.iter() {
                    let Some(other) = self.node(other_id) else {
                        continue;
                    };
                    let other_item = other.item();
                    candidates.push(ResultCandidate {
                        distance: self.metric.distance(neighbour_vector, other_item.vector()),
                        node_id: other_id,
                    });
                }
                let kept = self.select_neighbors(candidates, best_n);
                *list = kept.into_iter().map(|kept| kept.node_id).collect();
            }
        }
    }

    /// The diversity heuristic (variant 2 from the HNSW paper): walking the
    /// candidates nearest-first, keep one only if no already-kept candidate
    /// is closer to it than the base point is. This favors neighbors that
    /// are spread apart and preserves the long-range links the graph needs
    /// to stay navigable.
    fn select_neighbors(
        &self,
        mut candidates: Vec<ResultCandidate<M::Unit>>,
        m: usize,
    ) -> Vec<ResultCandidate<M::Unit>> {
        if candidates.len() <= m {
            return candidates;
        }

        candidates.sort_unstable_by(|a, b| cmp_unit(&a.distance, &b.distance));

        let mut selected: Vec<ResultCandidate<M::Unit>> = Vec::with_capacity(m);
        for candidate in candidates {
            if selected.len() >= m {
                break;
            }
            let Some(candidate_node) = self.node(candidate.node_id) else {
                continue;
            };
            let candidate_item = candidate_node.item();
            let candidate_vector = candidate_item.vector();

            let diverse = selected.iter().all(|kept| {
                let Some(kept_node) = self.node(kept.node_id) else {
                    return true;
                };
                let kept_item = kept_node.item();
                let between = self.metric.distance(candidate_vector, kept_item.vector());
                cmp_unit(&between, &candidate.distance) != Ordering::Less
            });

            if diverse {
                selected.push(candidate);
            }
        }
        selected
    }
}
