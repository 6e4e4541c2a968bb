//! Brute-force companion view.
//!
//! Shares the node store and lookup with the graph index but answers
//! `find_nearest` by scanning every populated slot. Slow and always right;
//! used as the ground truth when measuring recall of the graph search.

use crate::distance::Metric;
use crate::error::Result;
use crate::hnsw::graph::HnswIndex;
use crate::hnsw::search::ResultCandidate;
use crate::index::{Index, SearchResult};
use crate::item::Item;
use std::collections::BinaryHeap;
use std::io::Write;
use std::sync::Arc;

/// Exact (linear-scan) view over an [`HnswIndex`].
pub struct ExactView<'a, TItem: Item, M: Metric<TItem::Vector>> {
    index: &'a HnswIndex<TItem, M>,
}

impl<'a, TItem, M> ExactView<'a, TItem, M>
where
    TItem: Item,
    M: Metric<TItem::Vector>,
{
    pub(crate) fn new(index: &'a HnswIndex<TItem, M>) -> Self {
        Self { index }
    }
}

impl<TItem, M> Index<TItem> for ExactView<'_, TItem, M>
where
    TItem: Item,
    M: Metric<TItem::Vector>,
{
    type Unit = M::Unit;

    fn add(&self, item: TItem) -> Result<bool> {
        self.index.add(item)
    }

    fn remove(&self, id: &TItem::Id, version: i64) -> bool {
        self.index.remove(id, version)
    }

    fn size(&self) -> usize {
        self.index.size()
    }

    fn get(&self, id: &TItem::Id) -> Option<Arc<TItem>> {
        self.index.get(id)
    }

    fn items(&self) -> Vec<Arc<TItem>> {
        self.index.items()
    }

    fn find_nearest(&self, vector: &TItem::Vector, k: usize) -> Vec<SearchResult<TItem, M::Unit>> {
        let node_count = self.index.state.lock().node_count;
        let mut top: BinaryHeap<ResultCandidate<M::Unit>> = BinaryHeap::new();

        for internal_id in 0..node_count {
            let Some(node) = self.index.node(internal_id as u32) else {
                continue;
            };
            if node.is_deleted() {
                continue;
            }
            let item = node.item();
            let distance = self.index.metric.distance(item.vector(), vector);
            top.push(ResultCandidate {
                distance,
                node_id: node.id,
            });
            if top.len() > k {
                top.pop();
            }
        }

        top.into_sorted_vec()
            .into_iter()
            .filter_map(|candidate| {
                self.index.node(candidate.node_id).map(|node| SearchResult {
                    distance: candidate.distance,
                    item: node.item(),
                })
            })
            .collect()
    }

    fn save(&self, out: &mut dyn Write) -> Result<()> {
        self.index.save(out)
    }
}

#[cfg(test)]
mod tests {
    use crate::distance::{cmp_unit, SquaredEuclidean};
    use crate::hnsw::HnswIndex;
    use crate::index::Index;
    use crate::item::DenseItem;
    use crate::item::Item;
    use std::cmp::Ordering;

    fn make_index() -> HnswIndex<DenseItem<u64>, SquaredEuclidean> {
        HnswIndex::builder(2, SquaredEuclidean, 64)
            .with_m(4)
            .with_ef(10)
            .with_ef_construction(10)
            .with_remove_enabled(true)
            .build()
    }

    #[test]
    fn test_exact_matches_hand_computed() {
        let index = make_index();
        index.add(DenseItem::new(1, vec![0.0, 0.0])).unwrap();
        index.add(DenseItem::new(2, vec![3.0, 4.0])).unwrap();
        index.add(DenseItem::new(3, vec![1.0, 1.0])).unwrap();

        let exact = index.as_exact();
        let hits = exact.find_nearest(&vec![0.0, 0.0], 2);
        assert_eq!(hits.len(), 2);
        assert_eq!(*hits[0].item.id(), 1);
        assert_eq!(hits[0].distance, 0.0);
        assert_eq!(*hits[1].item.id(), 3);
        assert_eq!(hits[1].distance, 2.0);
    }

    #[test]
    fn test_exact_skips_deleted() {
        let index = make_index();
        index.add(DenseItem::new(1, vec![0.0, 0.0])).unwrap();
        index.add(DenseItem::new(2, vec![0.1, 0.0])).unwrap();
        assert!(index.remove(&2, 0));

        let hits = index.as_exact().find_nearest(&vec![0.0, 0.0], 5);
        assert_eq!(hits.len(), 1);
        assert_eq!(*hits[0].item.id(), 1);
    }

    #[test]
    fn test_exact_is_lower_bound_for_approximate() {
        let index = make_index();
        for id in 0u64..50 {
            let x = (id % 10) as f32;
            let y = (id / 10) as f32;
            index.add(DenseItem::new(id, vec![x, y])).unwrap();
        }

        let query = vec![4.3, 2.7];
        let k = 5;
        let approx = index.find_nearest(&query, k);
        let exact = index.as_exact().find_nearest(&query, k);

        // Rank for rank, the approximate result can never beat ground truth
        assert_eq!(exact.len(), k);
        for (approx_hit, exact_hit) in approx.iter().zip(exact.iter()) {
            assert_ne!(
                cmp_unit(&approx_hit.distance, &exact_hit.distance),
                Ordering::Less
            );
        }
    }

    #[test]
    fn test_exact_view_delegates_mutation() {
        let index = make_index();
        let exact = index.as_exact();
        exact.add(DenseItem::new(9, vec![1.0, 2.0])).unwrap();
        assert_eq!(index.size(), 1);
        assert!(exact.contains(&9));
        assert!(exact.remove(&9, 0));
        assert_eq!(exact.size(), 0);
    }
}
