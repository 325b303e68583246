//! Cursor library.
//!
//! This module defines cursor data types that can be used for inserting
//! instructions.

use crate::ir;
use crate::ir::{InsertBuilder, InstInserterBase};

/// The possible positions of a cursor.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum CursorPosition {
    /// Cursor is not pointing anywhere. No instructions can be inserted.
    Nowhere,
    /// Cursor is pointing at an existing instruction.
    /// New instructions will be inserted *before* the current instruction.
    At(ir::Inst),
    /// Cursor is before the beginning of a block. No instructions can be
    /// inserted. Calling `next_inst()` will move to the first instruction in
    /// the block.
    Before(ir::Block),
    /// Cursor is pointing after the end of a block.
    /// New instructions will be appended to the block.
    After(ir::Block),
}

/// All cursor types implement the `Cursor` trait which provides common
/// navigation operations.
pub trait Cursor {
    /// Get the current cursor position.
    fn position(&self) -> CursorPosition;

    /// Set the current position.
    fn set_position(&mut self, pos: CursorPosition);

    /// Borrow a reference to the function layout that this cursor is
    /// navigating.
    fn layout(&self) -> &ir::Layout;

    /// Borrow a mutable reference to the function layout that this cursor is
    /// navigating.
    fn layout_mut(&mut self) -> &mut ir::Layout;

    /// Rebuild this cursor positioned at `inst`.
    fn at_inst(mut self, inst: ir::Inst) -> Self
    where
        Self: Sized,
    {
        self.goto_inst(inst);
        self
    }

    /// Rebuild this cursor positioned at the top of `block`.
    fn at_top(mut self, block: ir::Block) -> Self
    where
        Self: Sized,
    {
        self.goto_top(block);
        self
    }

    /// Rebuild this cursor positioned at the bottom of `block`.
    fn at_bottom(mut self, block: ir::Block) -> Self
    where
        Self: Sized,
    {
        self.goto_bottom(block);
        self
    }

    /// Get the instruction corresponding to the current position, if any.
    fn current_inst(&self) -> Option<ir::Inst> {
        match self.position() {
            CursorPosition::At(inst) => Some(inst),
            _ => None,
        }
    }

    /// Go to a specific instruction which must be inserted in the layout.
    /// New instructions will be inserted before `inst`.
    fn goto_inst(&mut self, inst: ir::Inst) {
        debug_assert!(self.layout().inst_block(inst).is_some());
        self.set_position(CursorPosition::At(inst));
    }

    /// Go to the top of `block`, which must be inserted into the layout.
    /// At this position, instructions cannot be inserted, but `next_inst()`
    /// will move to the first instruction in the block.
    fn goto_top(&mut self, block: ir::Block) {
        debug_assert!(self.layout().is_block_inserted(block));
        self.set_position(CursorPosition::Before(block));
    }

    /// Go to the bottom of `block`, which must be inserted into the layout.
    /// At this position, inserted instructions will be appended to the block.
    fn goto_bottom(&mut self, block: ir::Block) {
        debug_assert!(self.layout().is_block_inserted(block));
        self.set_position(CursorPosition::After(block));
    }

    /// Move to the next instruction in the same block and return it.
    ///
    /// - If the cursor was positioned before a block, go to the first
    ///   instruction in that block.
    /// - If there are no more instructions in the block, go to the
    ///   `After(block)` position and return `None`.
    /// - If the cursor wasn't pointing anywhere, keep doing that.
    ///
    /// This method will never move the cursor to a different block.
    fn next_inst(&mut self) -> Option<ir::Inst> {
        use self::CursorPosition::*;
        match self.position() {
            Nowhere | After(..) => None,
            At(inst) => {
                if let Some(next) = self.layout().next_inst(inst) {
                    self.set_position(At(next));
                    Some(next)
                } else {
                    let pos = After(
                        self.layout()
                            .inst_block(inst)
                            .expect("current instruction removed?"),
                    );
                    self.set_position(pos);
                    None
                }
            }
            Before(block) => {
                if let Some(next) = self.layout().first_inst(block) {
                    self.set_position(At(next));
                    Some(next)
                } else {
                    self.set_position(After(block));
                    None
                }
            }
        }
    }

    /// Move to the previous instruction in the same block and return it.
    ///
    /// - If the cursor was positioned after a block, go to the last
    ///   instruction in that block.
    /// - If there are no more instructions in the block, go to the
    ///   `Before(block)` position and return `None`.
    /// - If the cursor wasn't pointing anywhere, keep doing that.
    ///
    /// This method will never move the cursor to a different block.
    fn prev_inst(&mut self) -> Option<ir::Inst> {
        use self::CursorPosition::*;
        match self.position() {
            Nowhere | Before(..) => None,
            At(inst) => {
                if let Some(prev) = self.layout().prev_inst(inst) {
                    self.set_position(At(prev));
                    Some(prev)
                } else {
                    let pos = Before(
                        self.layout()
                            .inst_block(inst)
                            .expect("current instruction removed?"),
                    );
                    self.set_position(pos);
                    None
                }
            }
            After(block) => {
                if let Some(prev) = self.layout().last_inst(block) {
                    self.set_position(At(prev));
                    Some(prev)
                } else {
                    self.set_position(Before(block));
                    None
                }
            }
        }
    }

    /// Insert an instruction at the current position.
    ///
    /// - If pointing at an instruction, the new instruction is inserted
    ///   before the current instruction.
    /// - If pointing at the bottom of a block, the new instruction is
    ///   appended to the block.
    /// - Otherwise panic.
    ///
    /// In either case, the cursor is not moved, such that repeated calls to
    /// `insert_inst()` cause instructions to appear in insertion order in the
    /// block.
    fn insert_inst(&mut self, inst: ir::Inst) {
        use self::CursorPosition::*;
        match self.position() {
            Nowhere | Before(..) => panic!("invalid insert_inst position"),
            At(cur) => self.layout_mut().insert_inst(inst, cur),
            After(block) => self.layout_mut().append_inst(inst, block),
        }
    }

    /// Remove the instruction under the cursor.
    ///
    /// The cursor is left pointing at the position following the current
    /// instruction.
    ///
    /// Return the instruction that was removed.
    fn remove_inst(&mut self) -> ir::Inst {
        let inst = self.current_inst().expect("no instruction to remove");
        self.next_inst();
        self.layout_mut().remove_inst(inst);
        inst
    }
}

/// Function cursor.
///
/// A `FuncCursor` holds a mutable reference to a whole `ir::Function` while
/// keeping a position too. The function can be re-borrowed by accessing the
/// public `cur.func` member.
pub struct FuncCursor<'f> {
    pos: CursorPosition,
    /// The referenced function.
    pub func: &'f mut ir::Function,
}

impl<'f> FuncCursor<'f> {
    /// Create a new `FuncCursor` pointing nowhere.
    pub fn new(func: &'f mut ir::Function) -> Self {
        Self {
            pos: CursorPosition::Nowhere,
            func,
        }
    }

    /// Create an instruction builder that inserts an instruction at the
    /// current position.
    pub fn ins<'c>(&'c mut self) -> InsertBuilder<'c, &'c mut FuncCursor<'f>> {
        InsertBuilder::new(self)
    }
}

impl<'f> Cursor for FuncCursor<'f> {
    fn position(&self) -> CursorPosition {
        self.pos
    }

    fn set_position(&mut self, pos: CursorPosition) {
        self.pos = pos;
    }

    fn layout(&self) -> &ir::Layout {
        &self.func.layout
    }

    fn layout_mut(&mut self) -> &mut ir::Layout {
        &mut self.func.layout
    }
}

impl<'c, 'f> InstInserterBase<'c> for &'c mut FuncCursor<'f> {
    fn data_flow_graph(&self) -> &ir::DataFlowGraph {
        &self.func.dfg
    }

    fn data_flow_graph_mut(&mut self) -> &mut ir::DataFlowGraph {
        &mut self.func.dfg
    }

    fn insert_built_inst(self, inst: ir::Inst) -> &'c mut ir::DataFlowGraph {
        self.insert_inst(inst);
        &mut self.func.dfg
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{types, Function, InstBuilder};

    #[test]
    fn insert_and_walk() {
        let mut func = Function::with_name("sample");
        let block = func.dfg.make_block();
        func.layout.append_block(block);
        let x = func.dfg.append_block_param(block, types::I32);

        let mut pos = FuncCursor::new(&mut func).at_bottom(block);
        let one = pos.ins().iconst(types::I32, 1);
        let sum = pos.ins().iadd(x, one);
        let _sq = pos.ins().imul(sum, sum);

        let mut pos = FuncCursor::new(&mut func).at_top(block);
        let mut count = 0;
        while pos.next_inst().is_some() {
            count += 1;
        }
        assert_eq!(count, 3);

        // Inserting at an instruction places new code before it.
        let sum_inst = match func.dfg.value_def(sum) {
            crate::ir::ValueDef::Result(inst) => inst,
            _ => unreachable!(),
        };
        let mut pos = FuncCursor::new(&mut func).at_inst(sum_inst);
        let _two = pos.ins().iconst(types::I32, 2);
        let order: Vec<String> = {
            let f = &pos.func;
            f.layout
                .block_insts(block)
                .map(|i| f.dfg.display_inst(i).to_string())
                .collect()
        };
        assert_eq!(order[1], "v4 = iconst.i32 2");
    }
}
