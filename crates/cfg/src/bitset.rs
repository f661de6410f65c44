use bit_set::BitSet as Bs;
use cranelift_entity::EntityRef;
use std::{fmt, marker::PhantomData};

use crate::block::Block;

/// A dense entity-indexed bit set over the block ids of one graph.
pub type BlockSet = BitSet<Block>;

/// A bit set with a fixed domain `[0, domain)`, indexed by entity id.
///
/// Created from a graph at a point in time
/// ([`create_block_set`](crate::ControlFlowGraph::create_block_set)); it does
/// not grow, and it must be treated as invalid after blocks are inserted or
/// deleted.
#[derive(Clone, PartialEq, Eq)]
pub struct BitSet<T> {
    bs: Bs,
    domain: usize,
    marker: PhantomData<T>,
}

impl<T> BitSet<T> {
    pub(crate) fn with_domain(domain: usize) -> Self {
        Self {
            bs: Bs::with_capacity(domain),
            domain,
            marker: PhantomData,
        }
    }

    /// The fixed domain size this set was created with.
    pub fn domain(&self) -> usize {
        self.domain
    }

    pub fn is_empty(&self) -> bool {
        self.bs.is_empty()
    }

    /// The number of entities in the set.
    pub fn len(&self) -> usize {
        self.bs.len()
    }

    pub fn clear(&mut self) {
        self.bs.clear()
    }

    pub fn union_with(&mut self, other: &Self) {
        self.bs.union_with(&other.bs)
    }

    pub fn intersect_with(&mut self, other: &Self) {
        self.bs.intersect_with(&other.bs)
    }

    pub fn difference_with(&mut self, other: &Self) {
        self.bs.difference_with(&other.bs)
    }

    pub fn is_subset(&self, other: &Self) -> bool {
        self.bs.is_subset(&other.bs)
    }

    pub fn is_disjoint(&self, other: &Self) -> bool {
        self.bs.is_disjoint(&other.bs)
    }
}

impl<T> BitSet<T>
where
    T: EntityRef,
{
    pub fn insert(&mut self, elem: T) -> bool {
        debug_assert!(elem.index() < self.domain, "entity outside the set domain");
        self.bs.insert(elem.index())
    }

    pub fn remove(&mut self, elem: T) -> bool {
        self.bs.remove(elem.index())
    }

    pub fn contains(&self, elem: T) -> bool {
        self.bs.contains(elem.index())
    }

    pub fn iter(&self) -> impl Iterator<Item = T> + '_ {
        self.bs.iter().map(|v| T::new(v))
    }
}

impl<T> fmt::Debug for BitSet<T>
where
    T: EntityRef + fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.bs.iter()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{block::BlockData, graph::ControlFlowGraph};

    #[test]
    fn basic_ops() {
        let mut cfg = ControlFlowGraph::new();
        let b0 = cfg.append_block(BlockData::new()).unwrap();
        let b1 = cfg.append_block(BlockData::new()).unwrap();
        let b2 = cfg.append_block(BlockData::new()).unwrap();

        let mut set = cfg.create_block_set();
        assert_eq!(set.domain(), 3);
        assert!(set.is_empty());

        assert!(set.insert(b0));
        assert!(!set.insert(b0));
        assert!(set.insert(b2));
        assert_eq!(set.len(), 2);
        assert!(set.contains(b0));
        assert!(!set.contains(b1));

        let collected: Vec<_> = set.iter().collect();
        assert_eq!(collected, vec![b0, b2]);

        assert!(set.remove(b0));
        assert!(!set.contains(b0));

        set.clear();
        assert!(set.is_empty());
    }

    #[test]
    fn set_algebra() {
        let mut cfg = ControlFlowGraph::new();
        let blocks: Vec<_> = (0..4)
            .map(|_| cfg.append_block(BlockData::new()).unwrap())
            .collect();

        let mut a = cfg.create_block_set();
        a.insert(blocks[0]);
        a.insert(blocks[1]);

        let mut b = cfg.create_block_set();
        b.insert(blocks[1]);
        b.insert(blocks[2]);

        let mut union = a.clone();
        union.union_with(&b);
        assert_eq!(union.len(), 3);

        let mut inter = a.clone();
        inter.intersect_with(&b);
        assert_eq!(inter.iter().collect::<Vec<_>>(), vec![blocks[1]]);

        let mut diff = a.clone();
        diff.difference_with(&b);
        assert_eq!(diff.iter().collect::<Vec<_>>(), vec![blocks[0]]);

        assert!(inter.is_subset(&a));
        assert!(!a.is_disjoint(&b));
    }
}
