use cranelift_entity::{entity_impl, packed_option::PackedOption};
use log::trace;
use smallvec::SmallVec;

use crate::{
    block::{Block, CfgBlock},
    graph::ControlFlowGraph,
};

/// An opaque reference to a loop.
///
/// The id is the loop's stable identity, assigned at discovery time; since
/// discovery visits headers in reverse post order, an outer loop always has a
/// lower id than the loops nested inside it.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Loop(u32);
entity_impl!(Loop, "loop");

/// One natural loop of the graph.
///
/// Created once by the discovery pass, appended to only during that pass, and
/// immutable afterwards for the rest of the compilation unit. Parent and
/// child links carry identity only; loops and blocks share the lifetime of
/// the owning graph.
#[derive(Debug, Clone)]
pub struct LoopData {
    header: Block,
    parent: PackedOption<Loop>,
    pub(crate) children: SmallVec<[Loop; 4]>,
    depth: u32,
    blocks: Vec<Block>,
    exits: Vec<Block>,
    natural_exits: Vec<Block>,
    inverted: bool,
}

impl LoopData {
    pub(crate) fn new(header: Block, parent: Option<Loop>, depth: u32) -> Self {
        Self {
            header,
            parent: parent.into(),
            children: SmallVec::new(),
            depth,
            blocks: vec![header],
            exits: Vec::new(),
            natural_exits: Vec::new(),
            inverted: false,
        }
    }

    pub fn header(&self) -> Block {
        self.header
    }

    pub fn parent(&self) -> Option<Loop> {
        self.parent.expand()
    }

    pub fn children(&self) -> &[Loop] {
        &self.children
    }

    /// Nesting depth, 1 for an outermost loop.
    pub fn depth(&self) -> u32 {
        self.depth
    }

    /// All member blocks including the header and the blocks of nested
    /// loops, in discovery order.
    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn push_block(&mut self, block: Block) {
        self.blocks.push(block);
    }

    /// The conservative exit set handed over by the discovery pass. May be
    /// stale relative to [`natural_exits`](Self::natural_exits) after later
    /// control flow simplification; both sets are kept deliberately.
    pub fn exits(&self) -> &[Block] {
        &self.exits
    }

    /// The exact earliest-exit set for the current CFG shape. Recompute with
    /// [`ControlFlowGraph::recompute_natural_exits`] after transformations.
    pub fn natural_exits(&self) -> &[Block] {
        &self.natural_exits
    }

    /// Sorts by id so membership is a binary search.
    pub fn set_exits(&mut self, mut exits: Vec<Block>) {
        exits.sort_unstable();
        exits.dedup();
        self.exits = exits;
    }

    pub fn set_natural_exits(&mut self, mut exits: Vec<Block>) {
        exits.sort_unstable();
        exits.dedup();
        self.natural_exits = exits;
    }

    pub fn is_loop_exit(&self, block: Block) -> bool {
        self.exits.binary_search(&block).is_ok()
    }

    pub fn is_natural_exit(&self, block: Block) -> bool {
        self.natural_exits.binary_search(&block).is_ok()
    }

    pub fn is_inverted(&self) -> bool {
        self.inverted
    }

    pub fn set_inverted(&mut self, inverted: bool) {
        self.inverted = inverted;
    }
}

impl<B: CfgBlock> ControlFlowGraph<B> {
    /// Registers a loop discovered at `header`, nested inside `parent`.
    ///
    /// The new loop starts out containing only its header block, which is
    /// also pointed at the new loop; the discovery pass appends the remaining
    /// members and exit sets.
    pub fn insert_loop(&mut self, header: Block, parent: Option<Loop>) -> Loop {
        let depth = match parent {
            Some(parent) => self.loops[parent].depth + 1,
            None => 1,
        };
        let lp = self.loops.push(LoopData::new(header, parent, depth));
        if let Some(parent) = parent {
            self.loops[parent].children.push(lp);
        }
        self.blocks[header].set_containing_loop(Some(lp));
        lp
    }

    pub fn loop_data(&self, lp: Loop) -> &LoopData {
        &self.loops[lp]
    }

    pub fn loop_data_mut(&mut self, lp: Loop) -> &mut LoopData {
        &mut self.loops[lp]
    }

    /// Iterates all loops, outer loops before the loops nested inside them.
    pub fn loops(&self) -> impl DoubleEndedIterator<Item = Loop> {
        self.loops.keys()
    }

    pub fn loop_count(&self) -> usize {
        self.loops.len()
    }

    /// Returns `true` if `block` is a member of `lp`, i.e. `lp` occurs on
    /// the chain from the block's innermost loop to the outermost one.
    pub fn is_in_loop(&self, block: Block, lp: Loop) -> bool {
        let mut cur = self.blocks[block].containing_loop();
        while let Some(inner) = cur {
            if inner == lp {
                return true;
            }
            cur = self.loops[inner].parent();
        }
        false
    }

    /// The nesting depth of `block`'s innermost loop, 0 outside any loop.
    pub fn loop_depth(&self, block: Block) -> u32 {
        self.blocks[block]
            .containing_loop()
            .map_or(0, |lp| self.loops[lp].depth)
    }

    /// Recomputes the exact exit set of `lp` from the current CFG shape:
    /// every successor of a member block that is not itself a member.
    pub fn recompute_natural_exits(&mut self, lp: Loop) {
        let mut exits = Vec::new();
        for i in 0..self.loops[lp].blocks.len() {
            let member = self.loops[lp].blocks[i];
            for j in 0..self.blocks[member].succs().len() {
                let succ = self.blocks[member].succs()[j];
                if !self.is_in_loop(succ, lp) {
                    exits.push(succ);
                }
            }
        }
        trace!("recomputed natural exits of {lp}: {} blocks", exits.len());
        self.loops[lp].set_natural_exits(exits);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::BlockData;

    /// `pre -> h -> {bd, exit}`, `bd -> end`, `end -> h`.
    fn simple_loop() -> (ControlFlowGraph<BlockData>, Vec<Block>, Loop) {
        let mut cfg = ControlFlowGraph::new();
        let blocks: Vec<_> = (0..5)
            .map(|_| cfg.append_block(BlockData::new()).unwrap())
            .collect();
        let (pre, h, bd, end, exit) = (blocks[0], blocks[1], blocks[2], blocks[3], blocks[4]);

        cfg.add_edge(pre, h);
        cfg.add_edge(h, bd);
        cfg.add_edge(h, exit);
        cfg.add_edge(bd, end);
        cfg.add_edge(end, h);

        cfg[h].set_loop_header(true);
        cfg[end].set_loop_end(true);

        cfg.compute_dominators();

        let lp = cfg.insert_loop(h, None);
        cfg[bd].set_containing_loop(Some(lp));
        cfg[end].set_containing_loop(Some(lp));
        cfg.loop_data_mut(lp).push_block(bd);
        cfg.loop_data_mut(lp).push_block(end);
        cfg.loop_data_mut(lp).set_exits(vec![exit]);
        cfg.recompute_natural_exits(lp);

        (cfg, blocks, lp)
    }

    #[test]
    fn loop_shape() {
        let (cfg, blocks, lp) = simple_loop();
        let (pre, h, bd, end, exit) = (blocks[0], blocks[1], blocks[2], blocks[3], blocks[4]);

        let data = cfg.loop_data(lp);
        assert_eq!(data.header(), h);
        assert_eq!(data.parent(), None);
        assert_eq!(data.depth(), 1);
        assert_eq!(data.blocks(), &[h, bd, end]);

        assert_eq!(cfg.loop_count(), 1);
        assert!(cfg.is_in_loop(h, lp));
        assert!(cfg.is_in_loop(end, lp));
        assert!(!cfg.is_in_loop(pre, lp));
        assert!(!cfg.is_in_loop(exit, lp));
        assert_eq!(cfg.loop_depth(bd), 1);
        assert_eq!(cfg.loop_depth(exit), 0);
    }

    #[test]
    fn exit_sets() {
        let (cfg, blocks, lp) = simple_loop();
        let exit = blocks[4];

        let data = cfg.loop_data(lp);
        assert_eq!(data.exits(), &[exit]);
        assert_eq!(data.natural_exits(), &[exit]);
        assert!(data.is_loop_exit(exit));
        assert!(data.is_natural_exit(exit));
        assert!(!data.is_loop_exit(blocks[2]));
    }

    #[test]
    fn natural_exits_follow_cfg_changes() {
        let (mut cfg, blocks, lp) = simple_loop();
        let (bd, exit) = (blocks[2], blocks[4]);

        // A simplification pass adds a second way out of the loop; the
        // conservative set goes stale, the natural set follows.
        cfg.add_edge(bd, exit);
        cfg.recompute_natural_exits(lp);

        let data = cfg.loop_data(lp);
        assert_eq!(data.exits(), &[exit]);
        assert_eq!(data.natural_exits(), &[exit]);

        let mut cfg2 = ControlFlowGraph::new();
        let a = cfg2.append_block(BlockData::new()).unwrap();
        let b = cfg2.append_block(BlockData::new()).unwrap();
        let c = cfg2.append_block(BlockData::new()).unwrap();
        cfg2.add_edge(a, b);
        cfg2.add_edge(b, b);
        cfg2.add_edge(b, c);
        cfg2[b].set_loop_header(true);
        cfg2[b].set_loop_end(true);
        cfg2.compute_dominators();

        let lp2 = cfg2.insert_loop(b, None);
        cfg2.recompute_natural_exits(lp2);
        assert_eq!(cfg2.loop_data(lp2).natural_exits(), &[c]);
    }

    #[test]
    fn nesting_depth_and_children() {
        let mut cfg = ControlFlowGraph::new();
        let h0 = cfg.append_block(BlockData::new()).unwrap();
        let h1 = cfg.append_block(BlockData::new()).unwrap();
        let h2 = cfg.append_block(BlockData::new()).unwrap();

        let outer = cfg.insert_loop(h0, None);
        let middle = cfg.insert_loop(h1, Some(outer));
        let inner = cfg.insert_loop(h2, Some(middle));

        assert_eq!(cfg.loop_data(outer).depth(), 1);
        assert_eq!(cfg.loop_data(middle).depth(), 2);
        assert_eq!(cfg.loop_data(inner).depth(), 3);
        assert_eq!(cfg.loop_data(outer).children(), &[middle]);
        assert_eq!(cfg.loop_data(middle).children(), &[inner]);
        assert_eq!(cfg.loop_data(inner).parent(), Some(middle));

        assert!(cfg.is_in_loop(h2, outer));
        assert!(!cfg.is_in_loop(h0, inner));
        assert_eq!(cfg.loop_depth(h2), 3);
    }

    #[test]
    fn inverted_flag() {
        let mut cfg = ControlFlowGraph::new();
        let h = cfg.append_block(BlockData::new()).unwrap();
        let lp = cfg.insert_loop(h, None);

        assert!(!cfg.loop_data(lp).is_inverted());
        cfg.loop_data_mut(lp).set_inverted(true);
        assert!(cfg.loop_data(lp).is_inverted());
    }
}
