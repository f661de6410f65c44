pub mod bitset;
pub mod block;
pub mod domtree;
pub mod graph;
pub mod loops;
pub mod postdom;

pub use bitset::{BitSet, BlockSet};
pub use block::{
    Block, BlockData, CfgBlock, DomTreeNode, INVALID_BLOCK_ID, LAST_VALID_BLOCK_INDEX,
};
pub use graph::{Bailout, ControlFlowGraph};
pub use loops::{Loop, LoopData};
