//! Data flow graph tracking instructions, values, and blocks.

use core::fmt;
use core::ops::{Index, IndexMut};

use smallvec::SmallVec;

use crate::entity::packed_option::PackedOption;
use crate::entity::{PrimaryMap, SecondaryMap};
use crate::ir::instructions::InstructionData;
use crate::ir::{types, Block, Inst, Type, Value, ValueList, ValueListPool};

/// Storage for instructions within the DFG.
#[derive(Clone)]
pub struct Insts(PrimaryMap<Inst, InstructionData>);

/// Allow immutable access to instructions via indexing.
impl Index<Inst> for Insts {
    type Output = InstructionData;

    fn index(&self, inst: Inst) -> &InstructionData {
        self.0.index(inst)
    }
}

/// Allow mutable access to instructions via indexing.
impl IndexMut<Inst> for Insts {
    fn index_mut(&mut self, inst: Inst) -> &mut InstructionData {
        self.0.index_mut(inst)
    }
}

/// Storage for basic blocks within the DFG.
#[derive(Clone)]
pub struct Blocks(PrimaryMap<Block, BlockData>);

impl Blocks {
    /// Get the total number of basic blocks created in this function.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` when no blocks have been created.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns `true` if the given block reference is valid.
    pub fn is_valid(&self, block: Block) -> bool {
        self.0.is_valid(block)
    }
}

impl Index<Block> for Blocks {
    type Output = BlockData;

    fn index(&self, block: Block) -> &BlockData {
        &self.0[block]
    }
}

/// Contents of a basic block: its parameter values.
///
/// The sequence of instructions in the block is kept by the `Layout`.
#[derive(Clone, Default)]
pub struct BlockData {
    params: ValueList,
}

type ValueUseList = SmallVec<[Inst; 4]>;

/// A data flow graph defines all instructions, basic blocks, and values of a
/// function, along with the def-use edges between them. The order of blocks
/// and of instructions within a block is recorded separately by the `Layout`.
///
/// Unlike a pure-SSA representation that derives uses on demand, this graph
/// keeps an exact reverse def-use table: for every value, the instructions
/// currently using it. The table is maintained across instruction creation,
/// operand rewriting, and erasure; an erased instruction never lingers in any
/// use list.
#[derive(Clone)]
pub struct DataFlowGraph {
    /// Data about all of the instructions in the function. The instructions
    /// in this map are not in program order; that is tracked by `Layout`.
    pub insts: Insts,

    /// The result value of each instruction, if it has one.
    results: SecondaryMap<Inst, PackedOption<Value>>,

    /// Basic blocks in the function and their parameters.
    pub blocks: Blocks,

    /// Memory pool for value lists used by variable-arity instructions and
    /// block parameters.
    pub value_lists: ValueListPool,

    /// Primary value table with an entry for every value.
    values: PrimaryMap<Value, ValueData>,

    /// For each value, the instructions currently using it. An instruction
    /// that uses a value in several operand slots appears once per slot.
    uses: SecondaryMap<Value, ValueUseList>,
}

/// Where a value comes from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ValueDef {
    /// Value is the result of an instruction.
    Result(Inst),
    /// Value is the n'th parameter of a block.
    Param(Block, usize),
}

impl ValueDef {
    /// Get the instruction where the value was defined, if any.
    pub fn inst(self) -> Option<Inst> {
        match self {
            Self::Result(inst) => Some(inst),
            Self::Param(..) => None,
        }
    }
}

/// Internal table storage for values.
#[derive(Clone, Debug)]
enum ValueData {
    /// Value is the result of an instruction.
    Inst { ty: Type, inst: Inst },
    /// Value is a block parameter.
    Param { ty: Type, num: u16, block: Block },
}

impl DataFlowGraph {
    /// Create a new empty `DataFlowGraph`.
    pub fn new() -> Self {
        Self {
            insts: Insts(PrimaryMap::new()),
            results: SecondaryMap::new(),
            blocks: Blocks(PrimaryMap::new()),
            value_lists: ValueListPool::new(),
            values: PrimaryMap::new(),
            uses: SecondaryMap::new(),
        }
    }

    /// Get the total number of instructions created in this function, whether
    /// they are currently inserted in the layout or not.
    pub fn num_insts(&self) -> usize {
        self.insts.0.len()
    }

    /// Get the total number of values.
    pub fn num_values(&self) -> usize {
        self.values.len()
    }

    /// Get the total number of basic blocks.
    pub fn num_blocks(&self) -> usize {
        self.blocks.len()
    }
}

/// Handling values.
impl DataFlowGraph {
    fn make_value(&mut self, data: ValueData) -> Value {
        self.values.push(data)
    }

    /// Check if a value reference is valid.
    pub fn value_is_valid(&self, v: Value) -> bool {
        self.values.is_valid(v)
    }

    /// Get the type of a value.
    pub fn value_type(&self, v: Value) -> Type {
        match self.values[v] {
            ValueData::Inst { ty, .. } | ValueData::Param { ty, .. } => ty,
        }
    }

    /// Get the definition of a value: the instruction that produced it or the
    /// block that has it as a parameter.
    pub fn value_def(&self, v: Value) -> ValueDef {
        match self.values[v] {
            ValueData::Inst { inst, .. } => ValueDef::Result(inst),
            ValueData::Param { block, num, .. } => ValueDef::Param(block, num as usize),
        }
    }

    /// The instructions currently using `v`, one entry per operand slot.
    pub fn value_uses(&self, v: Value) -> &[Inst] {
        &self.uses[v]
    }
}

/// Handling blocks and block parameters.
impl DataFlowGraph {
    /// Create a new basic block.
    pub fn make_block(&mut self) -> Block {
        self.blocks.0.push(BlockData::default())
    }

    /// Append a parameter of type `ty` to `block` and return the new value.
    pub fn append_block_param(&mut self, block: Block, ty: Type) -> Value {
        let num = self.blocks[block].params.len(&self.value_lists);
        debug_assert!(num <= u16::MAX as usize, "too many parameters on block");
        let value = self.make_value(ValueData::Param {
            ty,
            num: num as u16,
            block,
        });
        self.blocks.0[block].params.push(value, &mut self.value_lists);
        value
    }

    /// Get the parameters of `block`.
    pub fn block_params(&self, block: Block) -> &[Value] {
        self.blocks[block].params.as_slice(&self.value_lists)
    }

    /// Get the number of parameters on `block`.
    pub fn num_block_params(&self, block: Block) -> usize {
        self.blocks[block].params.len(&self.value_lists)
    }
}

/// Handling instructions.
impl DataFlowGraph {
    /// Create a new instruction and register it as a user of its operands.
    ///
    /// The instruction has no result value yet; call [`make_inst_results`]
    /// to create it.
    ///
    /// [`make_inst_results`]: DataFlowGraph::make_inst_results
    pub fn make_inst(&mut self, data: InstructionData) -> Inst {
        let inst = self.insts.0.push(data);
        let args: SmallVec<[Value; 8]> = self.inst_args(inst).iter().copied().collect();
        for arg in args {
            self.uses[arg].push(inst);
        }
        inst
    }

    /// Create the result value for `inst` with type `ctrl_typevar`.
    ///
    /// Instructions without results (stores) take `types::INVALID` and get
    /// none. Returns the number of results created.
    pub fn make_inst_results(&mut self, inst: Inst, ctrl_typevar: Type) -> usize {
        debug_assert!(self.results[inst].is_none(), "inst already has a result");
        if !self.insts[inst].opcode().has_result() {
            debug_assert_eq!(ctrl_typevar, types::INVALID);
            return 0;
        }
        debug_assert!(!ctrl_typevar.is_invalid(), "result type required");
        let value = self.make_value(ValueData::Inst {
            ty: ctrl_typevar,
            inst,
        });
        self.results[inst] = value.into();
        1
    }

    /// The result value of `inst`, if it has one.
    pub fn inst_result(&self, inst: Inst) -> Option<Value> {
        self.results[inst].expand()
    }

    /// Get the result of an instruction that is known to have one.
    ///
    /// This function panics if the instruction has no result.
    pub fn first_result(&self, inst: Inst) -> Value {
        self.results[inst].expand().expect("instruction has no result")
    }

    /// Get all value arguments of `inst` as a slice.
    pub fn inst_args(&self, inst: Inst) -> &[Value] {
        self.insts[inst].arguments(&self.value_lists)
    }

    /// Rewrite every use of `old` in the operands of `inst` to `new`,
    /// updating the use lists on both values.
    pub fn replace_uses_of_in(&mut self, inst: Inst, old: Value, new: Value) {
        debug_assert_ne!(old, new);
        let mut count = 0;
        {
            let DataFlowGraph {
                ref mut insts,
                ref mut value_lists,
                ..
            } = *self;
            for arg in insts[inst].arguments_mut(value_lists) {
                if *arg == old {
                    *arg = new;
                    count += 1;
                }
            }
        }
        for _ in 0..count {
            let pos = self.uses[old]
                .iter()
                .position(|&u| u == inst)
                .expect("use list out of sync");
            self.uses[old].remove(pos);
            self.uses[new].push(inst);
        }
    }

    /// Unregister `inst` from the use lists of its operands.
    ///
    /// This must be called when an instruction is erased so that it never
    /// shows up as a user again. The instruction data itself stays in the
    /// table; only the layout and the use lists forget about it.
    pub fn detach_inst(&mut self, inst: Inst) {
        let args: SmallVec<[Value; 8]> = self.inst_args(inst).iter().copied().collect();
        for arg in args {
            if let Some(pos) = self.uses[arg].iter().position(|&u| u == inst) {
                self.uses[arg].remove(pos);
            }
        }
    }

    /// Returns an object that can display `inst`.
    pub fn display_inst(&self, inst: Inst) -> DisplayInst<'_> {
        DisplayInst(self, inst)
    }
}

/// Object that can display an instruction.
pub struct DisplayInst<'a>(&'a DataFlowGraph, Inst);

impl<'a> fmt::Display for DisplayInst<'a> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let dfg = self.0;
        let inst = self.1;
        if let Some(result) = dfg.inst_result(inst) {
            write!(f, "{} = ", result)?;
        }
        let data = &dfg.insts[inst];
        let opcode = data.opcode();
        match *data {
            InstructionData::Unary { arg, .. } => {
                let ty = dfg.value_type(dfg.first_result(inst));
                write!(f, "{}.{} {}", opcode, ty, arg)
            }
            InstructionData::UnaryImm { imm, .. } => {
                let ty = dfg.value_type(dfg.first_result(inst));
                write!(f, "{}.{} {}", opcode, ty, imm)
            }
            InstructionData::Binary { args, .. } => {
                write!(f, "{} {}, {}", opcode, args[0], args[1])
            }
            InstructionData::BinaryImm8 { arg, imm, .. } => {
                write!(f, "{} {}, {}", opcode, arg, imm)
            }
            InstructionData::TernaryImm8 { args, imm, .. } => {
                write!(f, "{} {}, {}, {}", opcode, args[0], args[1], imm)
            }
            InstructionData::Load { arg, .. } => {
                let ty = dfg.value_type(dfg.first_result(inst));
                write!(f, "{}.{} {}", opcode, ty, arg)
            }
            InstructionData::Store { args, .. } => {
                write!(f, "{} {}, {}", opcode, args[0], args[1])
            }
            InstructionData::ElemAddr { args, .. } => {
                write!(f, "{}", opcode)?;
                for (i, arg) in args.as_slice(&dfg.value_lists).iter().enumerate() {
                    write!(f, "{} {}", if i == 0 { "" } else { "," }, arg)?;
                }
                Ok(())
            }
            InstructionData::Call {
                intrinsic, args, ..
            } => {
                let ty = dfg.value_type(dfg.first_result(inst));
                write!(f, "{}.{} {}(", opcode, ty, intrinsic)?;
                for (i, arg) in args.as_slice(&dfg.value_lists).iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", arg)?;
                }
                write!(f, ")")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::instructions::Opcode;

    #[test]
    fn block_params() {
        let mut dfg = DataFlowGraph::new();
        let block = dfg.make_block();
        assert_eq!(block.to_string(), "block0");
        assert_eq!(dfg.num_block_params(block), 0);

        let arg1 = dfg.append_block_param(block, types::F32);
        assert_eq!(arg1.to_string(), "v0");
        let arg2 = dfg.append_block_param(block, types::I16);
        assert_eq!(dfg.block_params(block), &[arg1, arg2]);
        assert_eq!(dfg.value_def(arg1), ValueDef::Param(block, 0));
        assert_eq!(dfg.value_def(arg2), ValueDef::Param(block, 1));
        assert_eq!(dfg.value_type(arg1), types::F32);
        assert_eq!(dfg.value_type(arg2), types::I16);
    }

    #[test]
    fn results_and_uses() {
        let mut dfg = DataFlowGraph::new();
        let block = dfg.make_block();
        let x = dfg.append_block_param(block, types::I32);
        let y = dfg.append_block_param(block, types::I32);

        let add = dfg.make_inst(InstructionData::Binary {
            opcode: Opcode::Iadd,
            args: [x, y],
        });
        assert_eq!(dfg.make_inst_results(add, types::I32), 1);
        let sum = dfg.first_result(add);
        assert_eq!(dfg.value_def(sum), ValueDef::Result(add));
        assert_eq!(dfg.value_uses(x), &[add]);
        assert_eq!(dfg.value_uses(y), &[add]);

        // A value used in both slots appears once per slot.
        let sq = dfg.make_inst(InstructionData::Binary {
            opcode: Opcode::Imul,
            args: [sum, sum],
        });
        dfg.make_inst_results(sq, types::I32);
        assert_eq!(dfg.value_uses(sum), &[sq, sq]);

        dfg.replace_uses_of_in(sq, sum, x);
        assert_eq!(dfg.inst_args(sq), &[x, x]);
        assert!(dfg.value_uses(sum).is_empty());
        assert_eq!(dfg.value_uses(x), &[add, sq, sq]);

        dfg.detach_inst(add);
        assert_eq!(dfg.value_uses(x), &[sq, sq]);
        assert!(dfg.value_uses(y).is_empty());
    }

    #[test]
    fn display() {
        let mut dfg = DataFlowGraph::new();
        let block = dfg.make_block();
        let x = dfg.append_block_param(block, types::I64);
        let c = dfg.make_inst(InstructionData::UnaryImm {
            opcode: Opcode::Iconst,
            imm: 3.into(),
        });
        dfg.make_inst_results(c, types::I64);
        let cv = dfg.first_result(c);
        let add = dfg.make_inst(InstructionData::Binary {
            opcode: Opcode::Iadd,
            args: [x, cv],
        });
        dfg.make_inst_results(add, types::I64);
        assert_eq!(dfg.display_inst(c).to_string(), "v1 = iconst.i64 3");
        assert_eq!(dfg.display_inst(add).to_string(), "v2 = iadd v0, v1");
    }
}
