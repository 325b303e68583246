//! Function layout.
//!
//! The order of basic blocks in a function and the order of instructions in a
//! block is determined by the `Layout` data structure defined in this module.

use crate::entity::packed_option::PackedOption;
use crate::entity::SecondaryMap;
use crate::ir::{Block, Inst};

/// The `Layout` struct determines the layout of blocks and instructions in a
/// function. It does not contain definitions of instructions or blocks, but
/// depends on `Inst` and `Block` entity references being defined elsewhere.
///
/// This data structure determines:
///
/// - The order of blocks in the function.
/// - Which block contains a given instruction.
/// - The order of instructions within a block.
#[derive(Clone)]
pub struct Layout {
    /// Linked list nodes for the layout order of blocks. Forms a doubly
    /// linked list, terminated in both ends by `None`.
    blocks: SecondaryMap<Block, BlockNode>,

    /// Linked list nodes for the layout order of instructions. Forms a
    /// doubly linked list per block, terminated in both ends by `None`.
    insts: SecondaryMap<Inst, InstNode>,

    /// First block in the layout order, or `None` when no blocks have been
    /// laid out.
    first_block: Option<Block>,

    /// Last block in the layout order.
    last_block: Option<Block>,
}

#[derive(Clone, Debug, Default)]
struct BlockNode {
    prev: PackedOption<Block>,
    next: PackedOption<Block>,
    first_inst: PackedOption<Inst>,
    last_inst: PackedOption<Inst>,
}

#[derive(Clone, Debug, Default)]
struct InstNode {
    block: PackedOption<Block>,
    prev: PackedOption<Inst>,
    next: PackedOption<Inst>,
}

impl Layout {
    /// Create a new empty `Layout`.
    pub fn new() -> Self {
        Self {
            blocks: SecondaryMap::new(),
            insts: SecondaryMap::new(),
            first_block: None,
            last_block: None,
        }
    }
}

/// Methods for laying out blocks.
impl Layout {
    /// Is `block` currently part of the layout?
    pub fn is_block_inserted(&self, block: Block) -> bool {
        Some(block) == self.first_block || self.blocks[block].prev.is_some()
    }

    /// Insert `block` as the last block in the layout.
    pub fn append_block(&mut self, block: Block) {
        debug_assert!(!self.is_block_inserted(block));
        {
            let node = &mut self.blocks[block];
            node.prev = self.last_block.into();
            node.next = None.into();
        }
        match self.last_block {
            Some(last) => self.blocks[last].next = block.into(),
            None => self.first_block = Some(block),
        }
        self.last_block = Some(block);
    }

    /// Return an iterator over all blocks in layout order.
    pub fn blocks(&self) -> Blocks<'_> {
        Blocks {
            layout: self,
            next: self.first_block,
        }
    }

    /// Get the function's entry block: the first block in the layout.
    pub fn entry_block(&self) -> Option<Block> {
        self.first_block
    }

    /// Get the block following `block` in the layout order.
    pub fn next_block(&self, block: Block) -> Option<Block> {
        self.blocks[block].next.expand()
    }
}

/// An iterator over the blocks of a function, in layout order.
pub struct Blocks<'f> {
    layout: &'f Layout,
    next: Option<Block>,
}

impl<'f> Iterator for Blocks<'f> {
    type Item = Block;

    fn next(&mut self) -> Option<Block> {
        let block = self.next?;
        self.next = self.layout.next_block(block);
        Some(block)
    }
}

/// Methods for arranging instructions.
///
/// An instruction starts out as *not inserted* in the layout. An instruction
/// can be inserted into a block at a given position.
impl Layout {
    /// Get the block containing `inst`, or `None` if `inst` is not inserted
    /// in the layout.
    pub fn inst_block(&self, inst: Inst) -> Option<Block> {
        self.insts[inst].block.expand()
    }

    /// Append `inst` to the end of `block`.
    pub fn append_inst(&mut self, inst: Inst, block: Block) {
        debug_assert_eq!(self.inst_block(inst), None);
        debug_assert!(
            self.is_block_inserted(block),
            "cannot append instructions to block not in layout"
        );
        let last = self.blocks[block].last_inst;
        {
            let node = &mut self.insts[inst];
            node.block = block.into();
            node.prev = last;
            debug_assert!(node.next.is_none());
        }
        match last.expand() {
            Some(last) => self.insts[last].next = inst.into(),
            None => self.blocks[block].first_inst = inst.into(),
        }
        self.blocks[block].last_inst = inst.into();
    }

    /// Insert `inst` before the instruction `before` in the same block.
    pub fn insert_inst(&mut self, inst: Inst, before: Inst) {
        debug_assert_eq!(self.inst_block(inst), None);
        let block = self
            .inst_block(before)
            .expect("instruction before insertion point not in the layout");
        let after = self.insts[before].prev;
        {
            let node = &mut self.insts[inst];
            node.block = block.into();
            node.next = before.into();
            node.prev = after;
        }
        self.insts[before].prev = inst.into();
        match after.expand() {
            None => self.blocks[block].first_inst = inst.into(),
            Some(a) => self.insts[a].next = inst.into(),
        }
    }

    /// Remove `inst` from the layout.
    pub fn remove_inst(&mut self, inst: Inst) {
        let block = self.inst_block(inst).expect("instruction already removed");
        let prev;
        let next;
        {
            let node = &mut self.insts[inst];
            prev = node.prev;
            next = node.next;
            node.block = None.into();
            node.prev = None.into();
            node.next = None.into();
        }
        match prev.expand() {
            None => self.blocks[block].first_inst = next,
            Some(p) => self.insts[p].next = next,
        }
        match next.expand() {
            None => self.blocks[block].last_inst = prev,
            Some(n) => self.insts[n].prev = prev,
        }
    }

    /// Fetch a block's first instruction.
    pub fn first_inst(&self, block: Block) -> Option<Inst> {
        self.blocks[block].first_inst.expand()
    }

    /// Fetch a block's last instruction.
    pub fn last_inst(&self, block: Block) -> Option<Inst> {
        self.blocks[block].last_inst.expand()
    }

    /// Fetch the instruction following `inst`.
    pub fn next_inst(&self, inst: Inst) -> Option<Inst> {
        self.insts[inst].next.expand()
    }

    /// Fetch the instruction preceding `inst`.
    pub fn prev_inst(&self, inst: Inst) -> Option<Inst> {
        self.insts[inst].prev.expand()
    }

    /// Iterate over the instructions in `block` in layout order.
    pub fn block_insts(&self, block: Block) -> Insts<'_> {
        Insts {
            layout: self,
            head: self.blocks[block].first_inst.expand(),
            tail: self.blocks[block].last_inst.expand(),
        }
    }
}

/// Iterator over instructions in a block, in layout order.
pub struct Insts<'f> {
    layout: &'f Layout,
    head: Option<Inst>,
    tail: Option<Inst>,
}

impl<'f> Iterator for Insts<'f> {
    type Item = Inst;

    fn next(&mut self) -> Option<Inst> {
        let inst = self.head?;
        if self.head == self.tail {
            self.head = None;
            self.tail = None;
        } else {
            self.head = self.layout.next_inst(inst);
        }
        Some(inst)
    }
}

impl<'f> DoubleEndedIterator for Insts<'f> {
    fn next_back(&mut self) -> Option<Inst> {
        let inst = self.tail?;
        if self.head == self.tail {
            self.head = None;
            self.tail = None;
        } else {
            self.tail = self.layout.prev_inst(inst);
        }
        Some(inst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::EntityRef;

    #[test]
    fn append_and_iterate() {
        let mut layout = Layout::new();
        let block = Block::new(0);
        layout.append_block(block);
        assert!(layout.is_block_inserted(block));
        assert_eq!(layout.entry_block(), Some(block));

        let i0 = Inst::new(0);
        let i1 = Inst::new(1);
        let i2 = Inst::new(2);
        layout.append_inst(i0, block);
        layout.append_inst(i1, block);
        layout.append_inst(i2, block);
        let insts: Vec<Inst> = layout.block_insts(block).collect();
        assert_eq!(insts, vec![i0, i1, i2]);
        assert_eq!(layout.inst_block(i1), Some(block));
        assert_eq!(layout.first_inst(block), Some(i0));
        assert_eq!(layout.last_inst(block), Some(i2));
    }

    #[test]
    fn insert_and_remove() {
        let mut layout = Layout::new();
        let block = Block::new(0);
        layout.append_block(block);

        let i0 = Inst::new(0);
        let i1 = Inst::new(1);
        let i2 = Inst::new(2);
        layout.append_inst(i0, block);
        layout.append_inst(i2, block);
        layout.insert_inst(i1, i2);
        let insts: Vec<Inst> = layout.block_insts(block).collect();
        assert_eq!(insts, vec![i0, i1, i2]);

        layout.remove_inst(i0);
        assert_eq!(layout.inst_block(i0), None);
        let insts: Vec<Inst> = layout.block_insts(block).collect();
        assert_eq!(insts, vec![i1, i2]);
        assert_eq!(layout.first_inst(block), Some(i1));

        layout.remove_inst(i2);
        let insts: Vec<Inst> = layout.block_insts(block).collect();
        assert_eq!(insts, vec![i1]);
        assert_eq!(layout.last_inst(block), Some(i1));
    }

    #[test]
    fn backward_iteration() {
        let mut layout = Layout::new();
        let block = Block::new(0);
        layout.append_block(block);
        let insts: Vec<Inst> = (0..4).map(Inst::new).collect();
        for &inst in &insts {
            layout.append_inst(inst, block);
        }
        let rev: Vec<Inst> = layout.block_insts(block).rev().collect();
        assert_eq!(rev, insts.iter().rev().copied().collect::<Vec<_>>());
    }
}
