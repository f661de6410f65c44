//! Post dominator assignment.
//!
//! A block's post dominator is the first block every path leaving it must
//! reach. Blocks are visited in reverse id order so successors are resolved
//! before their predecessors; a dead end on any path means the block has no
//! post dominator at all.

use log::trace;

use crate::{
    block::{Block, CfgBlock},
    graph::ControlFlowGraph,
};

impl<B: CfgBlock> ControlFlowGraph<B> {
    /// Computes the post dominator of every block that has one.
    ///
    /// Loop end blocks are skipped so a loop header is never registered as
    /// the post dominator of its own back edge.
    pub fn compute_postdominators(&mut self) {
        'outer: for i in (0..self.block_count()).rev() {
            let block = Block::from_u32(i as u32);
            if self.blocks[block].is_loop_end() {
                continue;
            }
            let succ_count = self.blocks[block].succs().len();
            if succ_count == 0 {
                continue;
            }

            let mut postdom = self.blocks[block].succs()[0];
            for j in 1..succ_count {
                let succ = self.blocks[block].succs()[j];
                postdom = match self.common_postdominator(postdom, succ) {
                    Some(pd) => pd,
                    // A dead end on one of the paths; no post dominator.
                    None => continue 'outer,
                };
            }
            self.blocks[block].set_postdominator(Some(postdom));
        }
        trace!("computed post dominators for {} blocks", self.block_count());
    }

    /// Folds two blocks to their common post dominator by advancing
    /// whichever side has the smaller id along its post dominator link.
    fn common_postdominator(&self, a: Block, b: Block) -> Option<Block> {
        let (mut a, mut b) = (a, b);
        while a != b {
            if a < b {
                a = self.blocks[a].postdominator()?;
            } else {
                b = self.blocks[b].postdominator()?;
            }
        }
        Some(a)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::many_single_char_names)]

    use super::*;
    use crate::block::BlockData;

    #[test]
    fn diamond_postdominators() {
        let mut cfg = ControlFlowGraph::new();
        let blocks: Vec<_> = (0..4)
            .map(|_| cfg.append_block(BlockData::new()).unwrap())
            .collect();
        let (s, a, b, j) = (blocks[0], blocks[1], blocks[2], blocks[3]);

        cfg.add_edge(s, a);
        cfg.add_edge(s, b);
        cfg.add_edge(a, j);
        cfg.add_edge(b, j);

        cfg.compute_postdominators();

        assert_eq!(cfg[s].postdominator(), Some(j));
        assert_eq!(cfg[a].postdominator(), Some(j));
        assert_eq!(cfg[b].postdominator(), Some(j));
        assert_eq!(cfg[j].postdominator(), None);
    }

    #[test]
    fn loop_header_has_no_postdominator_through_back_edge() {
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

        cfg.compute_postdominators();

        assert_eq!(cfg[pre].postdominator(), Some(h));
        assert_eq!(cfg[bd].postdominator(), Some(end));
        // The loop end was skipped, so the body path dead-ends and the
        // header folds to no post dominator.
        assert_eq!(cfg[end].postdominator(), None);
        assert_eq!(cfg[h].postdominator(), None);
        assert_eq!(cfg[exit].postdominator(), None);
    }

    #[test]
    fn dead_end_branch() {
        let mut cfg = ControlFlowGraph::new();
        let blocks: Vec<_> = (0..4)
            .map(|_| cfg.append_block(BlockData::new()).unwrap())
            .collect();
        let (s, a, sink, ret) = (blocks[0], blocks[1], blocks[2], blocks[3]);

        // One branch sinks (deopt style), the other returns.
        cfg.add_edge(s, a);
        cfg.add_edge(s, sink);
        cfg.add_edge(a, ret);

        cfg.compute_postdominators();

        assert_eq!(cfg[a].postdominator(), Some(ret));
        assert_eq!(cfg[s].postdominator(), None);
    }
}
