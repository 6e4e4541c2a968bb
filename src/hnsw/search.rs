//! HNSW search: greedy upper-layer descent, best-first base-layer
//! expansion, and the k-NN query entry point.
//!
//! Tombstoned nodes are traversed like any other node, keeping the graph
//! navigable after deletions, but they never enter the result heap. A
//! tombstoned entry point seeds the expansion queue with the +∞ sentinel
//! (`None`) so the first real candidate always improves on it.

use crate::distance::{cmp_bound, cmp_unit, Metric};
use crate::hnsw::graph::{HnswIndex, Node};
use crate::index::SearchResult;
use crate::item::Item;
use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::sync::Arc;

/// A result-heap entry. Max-heap order by distance, so the worst kept
/// result is at the top and can be evicted cheaply.
pub(crate) struct ResultCandidate<U> {
    pub(crate) distance: U,
    pub(crate) node_id: u32,
}

impl<U: PartialOrd> PartialEq for ResultCandidate<U> {
    fn eq(&self, other: &Self) -> bool {
        cmp_unit(&self.distance, &other.distance) == Ordering::Equal
    }
}

impl<U: PartialOrd> Eq for ResultCandidate<U> {}

impl<U: PartialOrd> PartialOrd for ResultCandidate<U> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<U: PartialOrd> Ord for ResultCandidate<U> {
    fn cmp(&self, other: &Self) -> Ordering {
        cmp_unit(&self.distance, &other.distance)
    }
}

/// An expansion-queue entry. `None` is the +∞ sentinel used when the entry
/// point is tombstoned. Wrapped in [`Reverse`] to form a min-heap.
struct Candidate<U> {
    distance: Option<U>,
    node_id: u32,
}

impl<U: PartialOrd> PartialEq for Candidate<U> {
    fn eq(&self, other: &Self) -> bool {
        cmp_bound(&self.distance, &other.distance) == Ordering::Equal
    }
}

impl<U: PartialOrd> Eq for Candidate<U> {}

impl<U: PartialOrd> PartialOrd for Candidate<U> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<U: PartialOrd> Ord for Candidate<U> {
    fn cmp(&self, other: &Self) -> Ordering {
        cmp_bound(&self.distance, &other.distance)
    }
}

impl<TItem, M> HnswIndex<TItem, M>
where
    TItem: Item,
    M: Metric<TItem::Vector>,
{
    /// The `k` items nearest to `query`, nearest first.
    ///
    /// Descends greedily from the entry point through every layer above 0,
    /// then runs a best-first expansion at the base layer with width
    /// `max(ef, k)`.
    pub fn find_nearest(
        &self,
        query: &TItem::Vector,
        k: usize,
    ) -> Vec<SearchResult<TItem, M::Unit>> {
        let Some(entry) = self.entry_point.read().clone() else {
            return Vec::new();
        };

        let curr = if entry.top_level() > 0 {
            self.greedy_closest(query, Arc::clone(&entry), entry.top_level(), 1)
        } else {
            entry
        };

        let width = self.ef().max(k);
        let mut top_candidates = self.search_base_layer(&curr, query, width, 0);
        while top_candidates.len() > k {
            top_candidates.pop();
        }

        top_candidates
            .into_sorted_vec()
            .into_iter()
            .filter_map(|candidate| {
                self.node(candidate.node_id).map(|node| SearchResult {
                    distance: candidate.distance,
                    item: node.item(),
                })
            })
            .collect()
    }

    /// Greedy descent: starting from `start` at `from_layer`, repeatedly
    /// hops to any neighbor closer to `query` than the current node, one
    /// layer at a time down to `to_layer` (inclusive). Each scan round
    /// holds the current node's connection lock.
    pub(crate) fn greedy_closest(
        &self,
        query: &TItem::Vector,
        start: Arc<Node<TItem>>,
        from_layer: usize,
        to_layer: usize,
    ) -> Arc<Node<TItem>> {
        let mut curr = start;
        let curr_item = curr.item();
        let mut curr_dist = self.metric.distance(query, curr_item.vector());
        drop(curr_item);

        for layer in (to_layer..=from_layer).rev() {
            loop {
                let mut next: Option<Arc<Node<TItem>>> = None;
                {
                    let connections = curr.connections.lock();
                    if let Some(neighbours) = connections.get(layer) {
                        for &candidate_id in neighbours {
                            let Some(candidate) = self.node(candidate_id) else {
                                continue;
                            };
                            let candidate_item = candidate.item();
                            let distance = self.metric.distance(query, candidate_item.vector());
                            if cmp_unit(&distance, &curr_dist) == Ordering::Less {
                                curr_dist = distance;
                                next = Some(candidate);
                            }
                        }
                    }
                }
                match next {
                    Some(closer) => curr = closer,
                    None => break,
                }
            }
        }
        curr
    }

    /// Best-first expansion at a single layer, bounded by a dynamic lower
    /// bound: the distance of the worst of the best `k` results so far.
    ///
    /// Returns a max-heap of at most `k` non-deleted results. A tombstoned
    /// entry node contributes only the +∞ expansion sentinel.
    pub(crate) fn search_base_layer(
        &self,
        entry: &Arc<Node<TItem>>,
        query: &TItem::Vector,
        k: usize,
        layer: usize,
    ) -> BinaryHeap<ResultCandidate<M::Unit>> {
        let pool = Arc::clone(&*self.visited_pool.read());
        let mut visited = pool.borrow();

        let mut top_candidates: BinaryHeap<ResultCandidate<M::Unit>> = BinaryHeap::new();
        let mut candidate_set: BinaryHeap<Reverse<Candidate<M::Unit>>> = BinaryHeap::new();
        let mut lower_bound: Option<M::Unit>;

        if entry.is_deleted() {
            lower_bound = None;
            candidate_set.push(Reverse(Candidate {
                distance: None,
                node_id: entry.id,
            }));
        } else {
            let entry_item = entry.item();
            let distance = self.metric.distance(query, entry_item.vector());
            lower_bound = Some(distance);
            top_candidates.push(ResultCandidate {
                distance,
                node_id: entry.id,
            });
            candidate_set.push(Reverse(Candidate {
                distance: Some(distance),
                node_id: entry.id,
            }));
        }
        visited.insert(entry.id);

        while let Some(Reverse(current)) = candidate_set.pop() {
            if cmp_bound(&current.distance, &lower_bound) == Ordering::Greater {
                break;
            }

            let Some(node) = self.node(current.node_id) else {
                continue;
            };
            let connections = node.connections.lock();
            let Some(neighbours) = connections.get(layer) else {
                continue;
            };

            for &candidate_id in neighbours {
                if visited.contains(candidate_id) {
                    continue;
                }
                visited.insert(candidate_id);

                let Some(candidate_node) = self.node(candidate_id) else {
                    continue;
                };
                let candidate_item = candidate_node.item();
                let distance = self.metric.distance(query, candidate_item.vector());

                if top_candidates.len() < k
                    || cmp_bound(&lower_bound, &Some(distance)) == Ordering::Greater
                {
                    candidate_set.push(Reverse(Candidate {
                        distance: Some(distance),
                        node_id: candidate_id,
                    }));
                    if !candidate_node.is_deleted() {
                        top_candidates.push(ResultCandidate {
                            distance,
                            node_id: candidate_id,
                        });
                    }
                    if top_candidates.len() > k {
                        top_candidates.pop();
                    }
                    if let Some(worst) = top_candidates.peek() {
                        lower_bound = Some(worst.distance);
                    }
                }
            }
        }

        visited.clear();
        pool.give_back(visited);
        top_candidates
    }
}

#[cfg(test)]
mod tests {
    use crate::distance::SquaredEuclidean;
    use crate::hnsw::HnswIndex;
    use crate::item::DenseItem;
    use crate::item::Item;

    fn make_index(max_items: usize) -> HnswIndex<DenseItem<u64>, SquaredEuclidean> {
        HnswIndex::builder(2, SquaredEuclidean, max_items)
            .with_m(4)
            .with_ef(10)
            .with_ef_construction(10)
            .build()
    }

    #[test]
    fn test_empty_index_returns_nothing() {
        let index = make_index(8);
        assert!(index.find_nearest(&vec![0.0, 0.0], 5).is_empty());
    }

    #[test]
    fn test_single_item() {
        let index = make_index(8);
        index.add(DenseItem::new(1, vec![0.0, 0.0])).unwrap();
        let hits = index.find_nearest(&vec![0.0, 0.0], 1);
        assert_eq!(hits.len(), 1);
        assert_eq!(*hits[0].item.id(), 1);
        assert_eq!(hits[0].distance, 0.0);
    }

    #[test]
    fn test_results_in_ascending_distance_order() {
        let index = make_index(64);
        for id in 0u64..50 {
            index
                .add(DenseItem::new(id, vec![id as f32, 0.0]))
                .unwrap();
        }
        let hits = index.find_nearest(&vec![17.0, 0.0], 10);
        assert_eq!(hits.len(), 10);
        for pair in hits.windows(2) {
            assert!(pair[0].distance <= pair[1].distance);
        }
        assert_eq!(*hits[0].item.id(), 17);
    }

    #[test]
    fn test_k_larger_than_index() {
        let index = make_index(8);
        index.add(DenseItem::new(1, vec![0.0, 0.0])).unwrap();
        index.add(DenseItem::new(2, vec![1.0, 0.0])).unwrap();
        let hits = index.find_nearest(&vec![0.0, 0.0], 10);
        assert_eq!(hits.len(), 2);
    }

    #[test]
    fn test_deleted_items_never_returned() {
        let index: HnswIndex<DenseItem<u64>, _> =
            HnswIndex::builder(2, SquaredEuclidean, 8)
                .with_m(4)
                .with_ef(10)
                .with_ef_construction(10)
                .with_remove_enabled(true)
                .build();
        index.add(DenseItem::new(1, vec![0.0, 0.0])).unwrap();
        index.add(DenseItem::new(2, vec![3.0, 4.0])).unwrap();
        index.add(DenseItem::new(3, vec![1.0, 1.0])).unwrap();
        assert!(index.remove(&2, 0));

        let hits = index.find_nearest(&vec![3.0, 4.0], 3);
        assert!(hits.iter().all(|hit| *hit.item.id() != 2));
        assert_eq!(hits.len(), 2);
    }

    #[test]
    fn test_search_after_deleting_entry_point() {
        // Delete every item once, including whichever node is the entry
        // point, then verify the survivors are still reachable.
        let index: HnswIndex<DenseItem<u64>, _> =
            HnswIndex::builder(2, SquaredEuclidean, 16)
                .with_m(4)
                .with_ef(10)
                .with_ef_construction(10)
                .with_remove_enabled(true)
                .build();
        for id in 0u64..10 {
            index
                .add(DenseItem::new(id, vec![id as f32, id as f32]))
                .unwrap();
        }
        for id in 0u64..5 {
            assert!(index.remove(&id, 0));
        }
        let hits = index.find_nearest(&vec![0.0, 0.0], 10);
        assert_eq!(hits.len(), 5);
        assert!(hits.iter().all(|hit| *hit.item.id() >= 5));
    }

    #[test]
    fn test_find_neighbors_excludes_self() {
        use crate::index::Index;
        let index = make_index(16);
        for id in 0u64..10 {
            index
                .add(DenseItem::new(id, vec![id as f32, 0.0]))
                .unwrap();
        }
        let neighbours = index.find_neighbors(&5, 3);
        assert_eq!(neighbours.len(), 3);
        assert!(neighbours.iter().all(|hit| *hit.item.id() != 5));
    }

    #[test]
    fn test_find_neighbors_unknown_id() {
        use crate::index::Index;
        let index = make_index(8);
        index.add(DenseItem::new(1, vec![0.0, 0.0])).unwrap();
        assert!(index.find_neighbors(&99, 3).is_empty());
    }
}
