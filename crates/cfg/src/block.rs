use cranelift_entity::{entity_impl, packed_option::PackedOption};
use smallvec::SmallVec;

use crate::loops::Loop;

/// An opaque reference to a basic block.
///
/// The id is simultaneously the index into the owning graph's block array;
/// blocks always refer to each other through ids resolved by the graph, never
/// through owning pointers, so blocks can be renumbered and the graph rebuilt
/// without dangling references.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Block(u32);
entity_impl!(Block, "b");

/// The reserved id that marks "no block". Never assigned to a real block.
pub const INVALID_BLOCK_ID: u32 = u32::MAX;

/// The largest id a graph may assign. Appending a block past this limit is a
/// compilation bailout, not a recoverable error.
pub const LAST_VALID_BLOCK_INDEX: u32 = INVALID_BLOCK_ID - 1;

pub(crate) const UNNUMBERED: u32 = u32::MAX;

/// Per-block dominator tree state.
///
/// Children of a block in the dominator tree are encoded as an intrusive
/// singly-linked list: `first_dominated` names one child and
/// `dominated_sibling` chains it to the next child of the same parent. This
/// avoids a growable child collection per node; the tree is built once and
/// walked many times.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomTreeNode {
    pub(crate) dominator: PackedOption<Block>,
    pub(crate) first_dominated: PackedOption<Block>,
    pub(crate) dominated_sibling: PackedOption<Block>,
    pub(crate) depth: u32,
    pub(crate) number: u32,
    pub(crate) max_child_number: u32,
}

impl Default for DomTreeNode {
    fn default() -> Self {
        Self {
            dominator: None.into(),
            first_dominated: None.into(),
            dominated_sibling: None.into(),
            depth: 0,
            number: UNNUMBERED,
            max_child_number: UNNUMBERED,
        }
    }
}

impl DomTreeNode {
    /// The immediate dominator, or `None` for the start block.
    pub fn dominator(&self) -> Option<Block> {
        self.dominator.expand()
    }

    pub fn first_dominated(&self) -> Option<Block> {
        self.first_dominated.expand()
    }

    pub fn dominated_sibling(&self) -> Option<Block> {
        self.dominated_sibling.expand()
    }

    /// Depth in the dominator tree. The start block has depth 0.
    pub fn depth(&self) -> u32 {
        self.depth
    }

    /// Pre-order visitation number in the dominator tree, or `None` if the
    /// numbering pass has not run.
    pub fn number(&self) -> Option<u32> {
        (self.number != UNNUMBERED).then_some(self.number)
    }

    /// The maximum pre-order number among this block and all of its
    /// dominator tree descendants.
    pub fn max_child_number(&self) -> Option<u32> {
        (self.max_child_number != UNNUMBERED).then_some(self.max_child_number)
    }
}

/// The capability set a concrete block variant must provide.
///
/// Compilation stages use different block representations (modifiable
/// mid-level blocks, scheduled backend blocks with alignment and linear scan
/// order), but they all share the dominator tree state and the queries the
/// graph needs to navigate them.
pub trait CfgBlock {
    fn preds(&self) -> &[Block];

    fn succs(&self) -> &[Block];

    fn is_loop_header(&self) -> bool;

    fn is_loop_end(&self) -> bool;

    fn is_indirect_branch_target(&self) -> bool {
        false
    }

    fn is_exception_entry(&self) -> bool {
        false
    }

    fn is_aligned(&self) -> bool {
        false
    }

    fn is_modifiable(&self) -> bool {
        false
    }

    fn linear_scan_number(&self) -> Option<u32> {
        None
    }

    fn postdominator(&self) -> Option<Block>;

    fn set_postdominator(&mut self, postdom: Option<Block>);

    fn dom(&self) -> &DomTreeNode;

    fn dom_mut(&mut self) -> &mut DomTreeNode;

    /// The innermost loop this block belongs to, or `None` if the block is
    /// not part of any loop.
    fn containing_loop(&self) -> Option<Loop>;

    fn set_containing_loop(&mut self, lp: Option<Loop>);
}

/// The modifiable block variant used by the mid-level pipeline.
#[derive(Debug, Clone, Default)]
pub struct BlockData {
    preds: SmallVec<[Block; 2]>,
    succs: SmallVec<[Block; 2]>,
    dom: DomTreeNode,
    postdom: PackedOption<Block>,
    containing_loop: PackedOption<Loop>,
    loop_header: bool,
    loop_end: bool,
    indirect_branch_target: bool,
    exception_entry: bool,
}

impl BlockData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_pred(&mut self, pred: Block) {
        self.preds.push(pred);
    }

    pub fn push_succ(&mut self, succ: Block) {
        self.succs.push(succ);
    }

    pub fn remove_pred(&mut self, pred: Block) {
        self.preds.retain(|b| *b != pred);
    }

    pub fn remove_succ(&mut self, succ: Block) {
        self.succs.retain(|b| *b != succ);
    }

    pub fn set_loop_header(&mut self, loop_header: bool) {
        self.loop_header = loop_header;
    }

    pub fn set_loop_end(&mut self, loop_end: bool) {
        self.loop_end = loop_end;
    }

    pub fn set_indirect_branch_target(&mut self, indirect: bool) {
        self.indirect_branch_target = indirect;
    }

    pub fn set_exception_entry(&mut self, exception_entry: bool) {
        self.exception_entry = exception_entry;
    }
}

impl CfgBlock for BlockData {
    fn preds(&self) -> &[Block] {
        &self.preds
    }

    fn succs(&self) -> &[Block] {
        &self.succs
    }

    fn is_loop_header(&self) -> bool {
        self.loop_header
    }

    fn is_loop_end(&self) -> bool {
        self.loop_end
    }

    fn is_indirect_branch_target(&self) -> bool {
        self.indirect_branch_target
    }

    fn is_exception_entry(&self) -> bool {
        self.exception_entry
    }

    fn is_modifiable(&self) -> bool {
        true
    }

    fn postdominator(&self) -> Option<Block> {
        self.postdom.expand()
    }

    fn set_postdominator(&mut self, postdom: Option<Block>) {
        self.postdom = postdom.into();
    }

    fn dom(&self) -> &DomTreeNode {
        &self.dom
    }

    fn dom_mut(&mut self) -> &mut DomTreeNode {
        &mut self.dom
    }

    fn containing_loop(&self) -> Option<Loop> {
        self.containing_loop.expand()
    }

    fn set_containing_loop(&mut self, lp: Option<Loop>) {
        self.containing_loop = lp.into();
    }
}
