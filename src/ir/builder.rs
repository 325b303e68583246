//! Instruction builders.
//!
//! A `Builder` provides a convenient interface for creating instructions:
//! one method per opcode that assembles the `InstructionData`, creates the
//! result value, and hands the finished instruction to an inserter. The
//! usual inserter is a cursor, via `pos.ins()`.

use core::marker::PhantomData;

use crate::ir::immediates::Uimm8;
use crate::ir::instructions::{InstructionData, Intrinsic, Opcode, ValueList};
use crate::ir::{types, DataFlowGraph, Inst, Type, Value};

/// Base trait for instruction builders.
///
/// The `InstBuilder` trait provides the methods for creating instructions;
/// it requires this base trait which abstracts over what happens to the
/// finished instruction.
pub trait InstBuilderBase<'f>: Sized {
    /// Get an immutable reference to the data flow graph.
    fn data_flow_graph(&self) -> &DataFlowGraph;

    /// Get a mutable reference to the data flow graph.
    fn data_flow_graph_mut(&mut self) -> &mut DataFlowGraph;

    /// Insert an instruction built from `data`, with a result of type
    /// `ctrl_typevar` (or none when `ctrl_typevar` is `INVALID`).
    fn build(self, data: InstructionData, ctrl_typevar: Type) -> (Inst, &'f mut DataFlowGraph);
}

/// Convenience methods for building instructions.
pub trait InstBuilder<'f>: InstBuilderBase<'f> {
    /// Integer constant.
    fn iconst(self, ty: Type, imm: i64) -> Value {
        debug_assert!(ty.is_int());
        let (inst, dfg) = self.build(
            InstructionData::UnaryImm {
                opcode: Opcode::Iconst,
                imm: imm.into(),
            },
            ty,
        );
        dfg.first_result(inst)
    }

    /// Vector constant with every lane zero.
    fn vconst(self, ty: Type) -> Value {
        debug_assert!(ty.is_vector());
        let (inst, dfg) = self.build(
            InstructionData::UnaryImm {
                opcode: Opcode::Vconst,
                imm: 0.into(),
            },
            ty,
        );
        dfg.first_result(inst)
    }

    /// A binary arithmetic instruction. The result type is the type of the
    /// operands.
    fn binary(self, opcode: Opcode, x: Value, y: Value) -> Value {
        debug_assert!(opcode.is_binary_arith());
        let ty = self.data_flow_graph().value_type(x);
        debug_assert_eq!(ty, self.data_flow_graph().value_type(y));
        let (inst, dfg) = self.build(InstructionData::Binary { opcode, args: [x, y] }, ty);
        dfg.first_result(inst)
    }

    /// Integer addition.
    fn iadd(self, x: Value, y: Value) -> Value {
        self.binary(Opcode::Iadd, x, y)
    }

    /// Integer subtraction.
    fn isub(self, x: Value, y: Value) -> Value {
        self.binary(Opcode::Isub, x, y)
    }

    /// Integer multiplication.
    fn imul(self, x: Value, y: Value) -> Value {
        self.binary(Opcode::Imul, x, y)
    }

    /// Bitwise and.
    fn band(self, x: Value, y: Value) -> Value {
        self.binary(Opcode::Band, x, y)
    }

    /// Bitwise or.
    fn bor(self, x: Value, y: Value) -> Value {
        self.binary(Opcode::Bor, x, y)
    }

    /// Bitwise xor.
    fn bxor(self, x: Value, y: Value) -> Value {
        self.binary(Opcode::Bxor, x, y)
    }

    /// Floating point addition.
    fn fadd(self, x: Value, y: Value) -> Value {
        self.binary(Opcode::Fadd, x, y)
    }

    /// Floating point subtraction.
    fn fsub(self, x: Value, y: Value) -> Value {
        self.binary(Opcode::Fsub, x, y)
    }

    /// Floating point multiplication.
    fn fmul(self, x: Value, y: Value) -> Value {
        self.binary(Opcode::Fmul, x, y)
    }

    /// Load a value of type `ty` from the address `addr`.
    fn load(self, ty: Type, addr: Value) -> Value {
        let (inst, dfg) = self.build(
            InstructionData::Load {
                opcode: Opcode::Load,
                arg: addr,
            },
            ty,
        );
        dfg.first_result(inst)
    }

    /// Store `x` to the address `addr`.
    fn store(self, x: Value, addr: Value) -> Inst {
        let (inst, _) = self.build(
            InstructionData::Store {
                opcode: Opcode::Store,
                args: [x, addr],
            },
            types::INVALID,
        );
        inst
    }

    /// Compute the address of an element of the aggregate at `base`.
    fn elem_addr(mut self, base: Value, indices: &[Value]) -> Value {
        let mut args = ValueList::default();
        {
            let pool = &mut self.data_flow_graph_mut().value_lists;
            args.push(base, pool);
            for &index in indices {
                args.push(index, pool);
            }
        }
        let (inst, dfg) = self.build(
            InstructionData::ElemAddr {
                opcode: Opcode::ElemAddr,
                args,
            },
            types::PTR,
        );
        dfg.first_result(inst)
    }

    /// Reinterpret the pointer `x`.
    fn bitcast(self, ty: Type, x: Value) -> Value {
        let (inst, dfg) = self.build(
            InstructionData::Unary {
                opcode: Opcode::Bitcast,
                arg: x,
            },
            ty,
        );
        dfg.first_result(inst)
    }

    /// Insert the scalar `y` into lane `lane` of the vector `x`.
    fn insertlane(self, x: Value, y: Value, lane: Uimm8) -> Value {
        let ty = self.data_flow_graph().value_type(x);
        debug_assert!(ty.is_vector());
        let (inst, dfg) = self.build(
            InstructionData::TernaryImm8 {
                opcode: Opcode::Insertlane,
                args: [x, y],
                imm: lane,
            },
            ty,
        );
        dfg.first_result(inst)
    }

    /// Extract lane `lane` of the vector `x`.
    fn extractlane(self, x: Value, lane: Uimm8) -> Value {
        let ty = self.data_flow_graph().value_type(x);
        debug_assert!(ty.is_vector());
        let (inst, dfg) = self.build(
            InstructionData::BinaryImm8 {
                opcode: Opcode::Extractlane,
                arg: x,
                imm: lane,
            },
            ty.lane_type(),
        );
        dfg.first_result(inst)
    }

    /// Call `intrinsic` with `call_args`, producing a result of type `ty`.
    fn call(mut self, ty: Type, intrinsic: Intrinsic, call_args: &[Value]) -> Value {
        debug_assert_eq!(call_args.len(), intrinsic.num_args());
        let mut args = ValueList::default();
        {
            let pool = &mut self.data_flow_graph_mut().value_lists;
            for &arg in call_args {
                args.push(arg, pool);
            }
        }
        let (inst, dfg) = self.build(
            InstructionData::Call {
                opcode: Opcode::Call,
                intrinsic,
                args,
            },
            ty,
        );
        dfg.first_result(inst)
    }
}

impl<'f, T: InstBuilderBase<'f>> InstBuilder<'f> for T {}

/// Base trait for instruction inserters.
///
/// This is an alternative base trait for an instruction builder to implement.
/// An instruction inserter can be adapted into an instruction builder by
/// wrapping it in an `InsertBuilder`.
pub trait InstInserterBase<'f>: Sized {
    /// Get an immutable reference to the data flow graph.
    fn data_flow_graph(&self) -> &DataFlowGraph;

    /// Get a mutable reference to the data flow graph.
    fn data_flow_graph_mut(&mut self) -> &mut DataFlowGraph;

    /// Insert a new instruction which belongs to the DFG.
    fn insert_built_inst(self, inst: Inst) -> &'f mut DataFlowGraph;
}

/// Builder that inserts an instruction at the current position.
///
/// An `InsertBuilder` is a wrapper for an `InstInserterBase` that turns it
/// into an instruction builder with some additional facilities for creating
/// instructions that reuse existing values as results.
pub struct InsertBuilder<'f, IIB: InstInserterBase<'f>> {
    inserter: IIB,
    unused: PhantomData<&'f u32>,
}

impl<'f, IIB: InstInserterBase<'f>> InsertBuilder<'f, IIB> {
    /// Create a new builder which inserts instructions at `pos`.
    pub fn new(inserter: IIB) -> Self {
        Self {
            inserter,
            unused: PhantomData,
        }
    }
}

impl<'f, IIB: InstInserterBase<'f>> InstBuilderBase<'f> for InsertBuilder<'f, IIB> {
    fn data_flow_graph(&self) -> &DataFlowGraph {
        self.inserter.data_flow_graph()
    }

    fn data_flow_graph_mut(&mut self) -> &mut DataFlowGraph {
        self.inserter.data_flow_graph_mut()
    }

    fn build(mut self, data: InstructionData, ctrl_typevar: Type) -> (Inst, &'f mut DataFlowGraph) {
        let inst;
        {
            let dfg = self.inserter.data_flow_graph_mut();
            inst = dfg.make_inst(data);
            dfg.make_inst_results(inst, ctrl_typevar);
        }
        (inst, self.inserter.insert_built_inst(inst))
    }
}
