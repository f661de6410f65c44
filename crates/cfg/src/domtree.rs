//! Dominator tree construction and navigation.
//!
//! Immediate dominators are folded over each block's forward predecessors in
//! reverse post order, then a pre-order walk assigns every block the interval
//! `[number, max_child_number]` that makes
//! [`dominates`](crate::ControlFlowGraph::dominates) a constant-time
//! containment check.

use std::fmt::Write;

use cranelift_entity::EntityRef;
use log::trace;

use crate::{
    block::{Block, CfgBlock, UNNUMBERED},
    graph::ControlFlowGraph,
};

impl<B: CfgBlock> ControlFlowGraph<B> {
    /// Computes immediate dominators, dominator depths, the intrusive
    /// dominated-child lists, and the pre-order interval numbering for the
    /// whole graph.
    ///
    /// Requires the block array to be in reverse post order with symmetric
    /// pred/succ links and loop end blocks flagged; back edges are the only
    /// predecessors ignored while folding.
    pub fn compute_dominators(&mut self) {
        if self.block_count() == 0 {
            return;
        }
        debug_assert!(
            self.blocks[self.start_block()].preds().is_empty(),
            "start block has no predecessor and therefore no dominator"
        );

        for block in self.blocks.values_mut() {
            *block.dom_mut() = Default::default();
        }

        let mut max_depth = 0;
        for i in 1..self.block_count() {
            let block = Block::new(i);

            let mut idom: Option<Block> = None;
            for j in 0..self.blocks[block].preds().len() {
                let pred = self.blocks[block].preds()[j];
                if self.blocks[pred].is_loop_end() {
                    continue;
                }
                idom = Some(match idom {
                    None => pred,
                    Some(dom) => self.raw_common_dominator(dom, pred),
                });
            }
            let idom = idom.expect("non-start block without a forward predecessor");

            self.set_dominator(block, idom);
            self.insert_dominated_sorted(idom, block);
            max_depth = max_depth.max(self.blocks[block].dom().depth);
        }
        self.max_dominator_depth = max_depth;

        self.assign_dominator_ranges();
        trace!(
            "computed dominators for {} blocks, max depth {}",
            self.block_count(),
            self.max_dominator_depth
        );
    }

    /// Sets `block`'s immediate dominator and its dominator depth.
    ///
    /// This only writes the child-to-parent back link. Attaching `block` to
    /// the parent's intrusive child list ([`set_first_dominated`] /
    /// [`set_dominated_sibling`]) is the caller's separate responsibility;
    /// both mutations are needed to keep the tree navigable in both
    /// directions.
    ///
    /// [`set_first_dominated`]: Self::set_first_dominated
    /// [`set_dominated_sibling`]: Self::set_dominated_sibling
    pub fn set_dominator(&mut self, block: Block, dominator: Block) {
        let depth = self.blocks[dominator].dom().depth + 1;
        let dom = self.blocks[block].dom_mut();
        dom.dominator = dominator.into();
        dom.depth = depth;
    }

    pub fn set_first_dominated(&mut self, block: Block, child: Option<Block>) {
        self.blocks[block].dom_mut().first_dominated = child.into();
    }

    pub fn set_dominated_sibling(&mut self, block: Block, sibling: Option<Block>) {
        self.blocks[block].dom_mut().dominated_sibling = sibling.into();
    }

    /// The immediate dominator of `block`, or `None` for the start block.
    pub fn dominator(&self, block: Block) -> Option<Block> {
        self.blocks[block].dom().dominator()
    }

    /// Iterates the blocks immediately dominated by `block`.
    pub fn dominated_children(&self, block: Block) -> DominatedChildren<'_, B> {
        DominatedChildren {
            cfg: self,
            next: self.blocks[block].dom().first_dominated(),
        }
    }

    /// Returns the nearest strict dominator of `block` that is not in a
    /// strictly inner loop relative to `block`.
    ///
    /// A loop header's dominator is outside the loop by construction, so it
    /// is returned directly. Returns `None` only for the start block.
    pub fn dominator_skip_loops(&self, block: Block) -> Option<Block> {
        let mut dom = self.blocks[block].dom().dominator()?;
        if self.blocks[block].is_loop_header() {
            return Some(dom);
        }
        let target = self.blocks[block].containing_loop();
        while self.blocks[dom].containing_loop() != target {
            dom = self.blocks[dom].dom().dominator().unwrap();
        }
        Some(dom)
    }

    /// Renders the dominator tree, one block per line, children indented
    /// under their parent.
    pub fn display_dominator_tree(&self) -> String {
        fn walk<B: CfgBlock>(
            cfg: &ControlFlowGraph<B>,
            block: Block,
            indent: usize,
            out: &mut String,
        ) {
            writeln!(out, "{:indent$}{block}", "", indent = indent).unwrap();
            for child in cfg.dominated_children(block) {
                walk(cfg, child, indent + 2, out);
            }
        }

        let mut out = String::new();
        if self.block_count() > 0 {
            walk(self, self.start_block(), 0, &mut out);
        }
        out
    }

    /// Lowest common ancestor by walking `dominator` links, usable before
    /// the interval numbering exists. Both inputs must already have their
    /// dominator and depth assigned.
    fn raw_common_dominator(&self, mut a: Block, mut b: Block) -> Block {
        let mut depth_a = self.blocks[a].dom().depth;
        let mut depth_b = self.blocks[b].dom().depth;
        while depth_a > depth_b {
            a = self.blocks[a].dom().dominator().unwrap();
            depth_a -= 1;
        }
        while depth_b > depth_a {
            b = self.blocks[b].dom().dominator().unwrap();
            depth_b -= 1;
        }
        while a != b {
            a = self.blocks[a].dom().dominator().unwrap();
            b = self.blocks[b].dom().dominator().unwrap();
        }
        a
    }

    /// Keeps the dominated list sorted by id so predecessor blocks always
    /// come before successor blocks when the list is walked.
    fn insert_dominated_sorted(&mut self, dominator: Block, block: Block) {
        let head = self.blocks[dominator].dom().first_dominated();
        match head {
            Some(first) if first < block => {
                let mut cur = first;
                while let Some(next) = self.blocks[cur].dom().dominated_sibling() {
                    if next >= block {
                        break;
                    }
                    cur = next;
                }
                let tail = self.blocks[cur].dom().dominated_sibling();
                self.set_dominated_sibling(block, tail);
                self.set_dominated_sibling(cur, Some(block));
            }
            _ => {
                self.set_dominated_sibling(block, head);
                self.set_first_dominated(dominator, Some(block));
            }
        }
    }

    /// Assigns `number`/`max_child_number` with an explicit stack.
    ///
    /// Children are pushed in list order and popped LIFO, so the first child
    /// in the list receives the largest numbers of all siblings; a revisited
    /// parent therefore closes its interval with the first child's
    /// `max_child_number`.
    fn assign_dominator_ranges(&mut self) {
        let mut stack = Vec::with_capacity(self.block_count());
        stack.push(self.start_block());
        let mut number = 0;

        while let Some(&cur) = stack.last() {
            if self.blocks[cur].dom().number == UNNUMBERED {
                self.blocks[cur].dom_mut().number = number;
                match self.blocks[cur].dom().first_dominated() {
                    Some(first) => {
                        let mut child = Some(first);
                        while let Some(c) = child {
                            stack.push(c);
                            child = self.blocks[c].dom().dominated_sibling();
                        }
                    }
                    None => {
                        self.blocks[cur].dom_mut().max_child_number = number;
                        stack.pop();
                    }
                }
                number += 1;
            } else {
                let first = self.blocks[cur].dom().first_dominated().unwrap();
                let max = self.blocks[first].dom().max_child_number;
                self.blocks[cur].dom_mut().max_child_number = max;
                stack.pop();
            }
        }
    }
}

pub struct DominatedChildren<'a, B> {
    cfg: &'a ControlFlowGraph<B>,
    next: Option<Block>,
}

impl<'a, B: CfgBlock> Iterator for DominatedChildren<'a, B> {
    type Item = Block;

    fn next(&mut self) -> Option<Block> {
        let cur = self.next?;
        self.next = self.cfg[cur].dom().dominated_sibling();
        Some(cur)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::many_single_char_names)]

    use super::*;
    use crate::block::BlockData;

    fn append_blocks(cfg: &mut ControlFlowGraph<BlockData>, n: usize) -> Vec<Block> {
        (0..n)
            .map(|_| cfg.append_block(BlockData::new()).unwrap())
            .collect()
    }

    /// Ground truth for the interval test: walk `dominator` links from `b`
    /// up to the start block and look for `a`.
    fn dominates_by_walk(cfg: &ControlFlowGraph<BlockData>, a: Block, b: Block) -> bool {
        let mut cur = Some(b);
        while let Some(block) = cur {
            if block == a {
                return true;
            }
            cur = cfg.dominator(block);
        }
        false
    }

    /// `s -> {a, b} -> j`
    fn diamond() -> (ControlFlowGraph<BlockData>, Vec<Block>) {
        let mut cfg = ControlFlowGraph::new();
        let blocks = append_blocks(&mut cfg, 4);
        let (s, a, b, j) = (blocks[0], blocks[1], blocks[2], blocks[3]);

        cfg.add_edge(s, a);
        cfg.add_edge(s, b);
        cfg.add_edge(a, j);
        cfg.add_edge(b, j);

        cfg.compute_dominators();
        (cfg, blocks)
    }

    /// `entry -> oh -> ih -> {ib, exit}`, `ib -> {ih, oe}`, `oe -> oh`:
    /// an inner loop `{ih, ib}` nested in an outer loop `{oh, ih, ib, oe}`.
    fn nested_loops() -> (ControlFlowGraph<BlockData>, Vec<Block>) {
        let mut cfg = ControlFlowGraph::new();
        let blocks = append_blocks(&mut cfg, 6);
        let (entry, oh, ih, ib, oe, exit) =
            (blocks[0], blocks[1], blocks[2], blocks[3], blocks[4], blocks[5]);

        cfg.add_edge(entry, oh);
        cfg.add_edge(oh, ih);
        cfg.add_edge(ih, ib);
        cfg.add_edge(ih, exit);
        cfg.add_edge(ib, ih);
        cfg.add_edge(ib, oe);
        cfg.add_edge(oe, oh);

        cfg[oh].set_loop_header(true);
        cfg[ih].set_loop_header(true);
        cfg[ib].set_loop_end(true);
        cfg[oe].set_loop_end(true);

        cfg.compute_dominators();

        let outer = cfg.insert_loop(oh, None);
        let inner = cfg.insert_loop(ih, Some(outer));
        cfg[ib].set_containing_loop(Some(inner));
        cfg[oe].set_containing_loop(Some(outer));
        for member in [ih, ib, oe] {
            cfg.loop_data_mut(outer).push_block(member);
        }
        cfg.loop_data_mut(inner).push_block(ib);

        (cfg, blocks)
    }

    #[test]
    fn diamond_dominators() {
        let (cfg, blocks) = diamond();
        let (s, a, b, j) = (blocks[0], blocks[1], blocks[2], blocks[3]);

        assert_eq!(cfg.dominator(s), None);
        assert_eq!(cfg.dominator(a), Some(s));
        assert_eq!(cfg.dominator(b), Some(s));
        assert_eq!(cfg.dominator(j), Some(s));

        assert!(cfg.dominates(s, j));
        assert!(cfg.dominates(s, s));
        assert!(!cfg.dominates(a, b));
        assert!(!cfg.dominates(j, a));
        assert!(cfg.strictly_dominates(s, a));
        assert!(!cfg.strictly_dominates(s, s));

        assert_eq!(cfg.common_dominator(Some(a), Some(b)), Some(s));
        assert_eq!(cfg.max_dominator_depth(), 1);
    }

    #[test]
    fn common_dominator_laws() {
        let (cfg, blocks) = nested_loops();

        for &a in &blocks {
            // Identity laws.
            assert_eq!(cfg.common_dominator(Some(a), Some(a)), Some(a));
            assert_eq!(cfg.common_dominator(None, Some(a)), Some(a));
            assert_eq!(cfg.common_dominator(Some(a), None), Some(a));

            for &b in &blocks {
                let lca = cfg.common_dominator(Some(a), Some(b));
                // Symmetry.
                assert_eq!(lca, cfg.common_dominator(Some(b), Some(a)));
                // The result dominates both inputs.
                let lca = lca.unwrap();
                assert!(cfg.dominates(lca, a));
                assert!(cfg.dominates(lca, b));
            }
        }
        assert_eq!(cfg.common_dominator(None, None), None);
    }

    #[test]
    fn interval_test_matches_link_walk() {
        let (cfg, blocks) = nested_loops();
        for &a in &blocks {
            for &b in &blocks {
                assert_eq!(
                    cfg.dominates(a, b),
                    dominates_by_walk(&cfg, a, b),
                    "interval test diverges for ({a}, {b})"
                );
            }
        }
    }

    #[test]
    fn intrusive_list_round_trip() {
        let (cfg, blocks) = nested_loops();

        for &parent in &blocks {
            let children: Vec<_> = cfg.dominated_children(parent).collect();

            // Forward direction: every listed child points back at `parent`,
            // and the list is sorted by id with no duplicates.
            for pair in children.windows(2) {
                assert!(pair[0] < pair[1]);
            }
            for &child in &children {
                assert_eq!(cfg.dominator(child), Some(parent));
            }

            // Backward direction: every block whose dominator is `parent`
            // occurs in the list exactly once.
            for &block in &blocks {
                let expected = cfg.dominator(block) == Some(parent);
                let occurrences = children.iter().filter(|c| **c == block).count();
                assert_eq!(occurrences, usize::from(expected));
            }
        }
    }

    #[test]
    fn nested_loop_dominators() {
        let (cfg, blocks) = nested_loops();
        let (entry, oh, ih, ib, oe, exit) =
            (blocks[0], blocks[1], blocks[2], blocks[3], blocks[4], blocks[5]);

        assert_eq!(cfg.dominator(oh), Some(entry));
        assert_eq!(cfg.dominator(ih), Some(oh));
        assert_eq!(cfg.dominator(ib), Some(ih));
        assert_eq!(cfg.dominator(oe), Some(ib));
        assert_eq!(cfg.dominator(exit), Some(ih));

        assert!(cfg.dominates(oh, oe));
        assert!(!cfg.dominates(ib, exit));
        assert_eq!(cfg.common_dominator(Some(oe), Some(exit)), Some(ih));
        assert_eq!(cfg.max_dominator_depth(), 4);
    }

    #[test]
    fn skip_loops_walks_out_of_inner_loops() {
        let (cfg, blocks) = nested_loops();
        let (entry, oh, ih, ib, oe, exit) =
            (blocks[0], blocks[1], blocks[2], blocks[3], blocks[4], blocks[5]);

        // The start block has no dominator at all.
        assert_eq!(cfg.dominator_skip_loops(entry), None);
        // Loop headers return their dominator directly.
        assert_eq!(cfg.dominator_skip_loops(oh), Some(entry));
        assert_eq!(cfg.dominator_skip_loops(ih), Some(oh));
        // A body block stays inside its own loop.
        assert_eq!(cfg.dominator_skip_loops(ib), Some(ih));
        // The outer loop end skips the inner loop entirely.
        assert_eq!(cfg.dominator_skip_loops(oe), Some(oh));
        // The exit block skips both loops.
        assert_eq!(cfg.dominator_skip_loops(exit), Some(entry));
    }

    #[test]
    fn dominator_tree_dump() {
        let (cfg, _) = nested_loops();
        insta::assert_snapshot!(cfg.display_dominator_tree(), @r"
        b0
          b1
            b2
              b3
                b4
              b5
        ");
    }
}
