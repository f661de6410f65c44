use std::{
    error, fmt,
    ops::{Index, IndexMut},
};

use cranelift_entity::PrimaryMap;

use crate::{
    bitset::BlockSet,
    block::{Block, BlockData, CfgBlock, LAST_VALID_BLOCK_INDEX, UNNUMBERED},
    loops::{Loop, LoopData},
};

/// The control flow graph of one compilation unit.
///
/// The graph exclusively owns its blocks and its loop forest; both live for
/// the duration of the compilation unit and are discarded with it. The block
/// array is in reverse post order and a block's id is its position in the
/// array, so the start block is always id 0.
///
/// There is no incremental update path: inserting or deleting blocks after
/// the dominator or loop passes ran invalidates ids, the interval numbering,
/// and any [`BlockSet`] created from the old block count. Callers must
/// rebuild the graph from scratch instead.
#[derive(Debug, Default)]
pub struct ControlFlowGraph<B = BlockData> {
    pub(crate) blocks: PrimaryMap<Block, B>,
    pub(crate) loops: PrimaryMap<Loop, LoopData>,
    pub(crate) max_dominator_depth: u32,
}

impl<B: CfgBlock> ControlFlowGraph<B> {
    pub fn new() -> Self {
        Self {
            blocks: PrimaryMap::new(),
            loops: PrimaryMap::new(),
            max_dominator_depth: 0,
        }
    }

    /// Appends a block, assigning it the next id in reverse post order.
    ///
    /// Fails with a [`Bailout`] once [`LAST_VALID_BLOCK_INDEX`] is exhausted;
    /// the compilation unit must be abandoned in that case.
    pub fn append_block(&mut self, block: B) -> Result<Block, Bailout> {
        if self.blocks.len() > LAST_VALID_BLOCK_INDEX as usize {
            return Err(Bailout {
                block_count: self.blocks.len(),
            });
        }
        Ok(self.blocks.push(block))
    }

    pub fn block(&self, block: Block) -> &B {
        &self.blocks[block]
    }

    pub fn block_mut(&mut self, block: Block) -> &mut B {
        &mut self.blocks[block]
    }

    pub fn blocks(&self) -> impl DoubleEndedIterator<Item = Block> {
        self.blocks.keys()
    }

    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// The start block, id 0 by reverse post order convention.
    pub fn start_block(&self) -> Block {
        debug_assert!(!self.blocks.is_empty());
        Block::from_u32(0)
    }

    pub fn max_dominator_depth(&self) -> u32 {
        self.max_dominator_depth
    }

    /// Clears all blocks and loops for reuse on a new compilation unit.
    pub fn clear(&mut self) {
        self.blocks.clear();
        self.loops.clear();
        self.max_dominator_depth = 0;
    }

    /// Returns `true` if `a` dominates `b`, i.e. every path from the start
    /// block to `b` passes through `a`. A block dominates itself.
    ///
    /// This is an O(1) interval containment test over the pre-order numbering
    /// assigned by [`compute_dominators`](Self::compute_dominators): `a`
    /// dominates `b` iff `number(a) <= number(b) <= max_child_number(a)`.
    /// Blocks on different branches of the dominator tree have disjoint
    /// intervals.
    pub fn dominates(&self, a: Block, b: Block) -> bool {
        let a = self.blocks[a].dom();
        let b = self.blocks[b].dom();
        debug_assert!(
            a.number != UNNUMBERED && b.number != UNNUMBERED,
            "dominator ranges are not assigned"
        );
        a.number <= b.number && b.number <= a.max_child_number
    }

    /// Returns `true` if `a` dominates `b` and `a != b`.
    pub fn strictly_dominates(&self, a: Block, b: Block) -> bool {
        a != b && self.dominates(a, b)
    }

    /// Returns the lowest common ancestor of `a` and `b` in the dominator
    /// tree.
    ///
    /// `None` denotes "no constraint yet", not the start block: it is the
    /// identity of this operation, so the other argument is returned
    /// unchanged.
    pub fn common_dominator(&self, a: Option<Block>, b: Option<Block>) -> Option<Block> {
        match (a, b) {
            (None, other) | (other, None) => other,
            (Some(a), Some(b)) if a == b => Some(a),
            (Some(a), Some(b)) => Some(self.common_dominator_walk(a, b)),
        }
    }

    /// Ascends from the shallower block while the deeper block's pre-order
    /// number lies outside the current interval. Intervals strictly nest
    /// along the ancestor chain, so the walk stops exactly at the lowest
    /// common ancestor, after at most dominator-tree-depth steps.
    fn common_dominator_walk(&self, a: Block, b: Block) -> Block {
        let (deep, shallow) = if self.blocks[a].dom().depth >= self.blocks[b].dom().depth {
            (a, b)
        } else {
            (b, a)
        };
        let probe = self.blocks[deep].dom().number;
        debug_assert!(probe != UNNUMBERED, "dominator ranges are not assigned");

        let mut result = shallow;
        while probe < self.blocks[result].dom().number {
            result = self.blocks[result].dom().dominator().unwrap();
        }
        while probe > self.blocks[result].dom().max_child_number {
            result = self.blocks[result].dom().dominator().unwrap();
        }
        result
    }

    /// Creates a dense block set whose domain is exactly the current block
    /// count.
    ///
    /// The set is the building block for block-level fixed-point dataflow;
    /// it does not grow, and it is invalidated by any change to the block
    /// array.
    pub fn create_block_set(&self) -> BlockSet {
        BlockSet::with_domain(self.blocks.len())
    }
}

impl ControlFlowGraph<BlockData> {
    /// Adds the edge `from -> to`, maintaining pred/succ symmetry.
    pub fn add_edge(&mut self, from: Block, to: Block) {
        self.blocks[from].push_succ(to);
        self.blocks[to].push_pred(from);
    }

    /// Removes the edge `from -> to`.
    pub fn remove_edge(&mut self, from: Block, to: Block) {
        self.blocks[from].remove_succ(to);
        self.blocks[to].remove_pred(from);
    }
}

impl<B> Index<Block> for ControlFlowGraph<B> {
    type Output = B;

    fn index(&self, block: Block) -> &B {
        &self.blocks[block]
    }
}

impl<B> IndexMut<Block> for ControlFlowGraph<B> {
    fn index_mut(&mut self, block: Block) -> &mut B {
        &mut self.blocks[block]
    }
}

/// Raised when a compilation unit exceeds [`LAST_VALID_BLOCK_INDEX`] basic
/// blocks. The unit must be abandoned; there is no partial output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bailout {
    pub block_count: usize,
}

impl fmt::Display for Bailout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "graph too large to safely compile in reasonable time: more than {LAST_VALID_BLOCK_INDEX} basic blocks"
        )
    }
}

impl error::Error for Bailout {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_and_index() {
        let mut cfg = ControlFlowGraph::new();
        let b0 = cfg.append_block(BlockData::new()).unwrap();
        let b1 = cfg.append_block(BlockData::new()).unwrap();

        assert_eq!(b0.as_u32(), 0);
        assert_eq!(b1.as_u32(), 1);
        assert_eq!(cfg.block_count(), 2);
        assert_eq!(cfg.start_block(), b0);
    }

    #[test]
    fn edge_symmetry() {
        let mut cfg = ControlFlowGraph::new();
        let b0 = cfg.append_block(BlockData::new()).unwrap();
        let b1 = cfg.append_block(BlockData::new()).unwrap();

        cfg.add_edge(b0, b1);
        assert_eq!(cfg[b0].succs(), &[b1]);
        assert_eq!(cfg[b1].preds(), &[b0]);

        cfg.remove_edge(b0, b1);
        assert!(cfg[b0].succs().is_empty());
        assert!(cfg[b1].preds().is_empty());
    }

    #[test]
    fn bailout_display() {
        let err = Bailout { block_count: 4 };
        assert!(err.to_string().contains("basic blocks"));
    }
}
