//! Instruction formats and opcodes.
//!
//! The opcode set is closed and small: constants, the binary arithmetic class,
//! memory access, the element-pointer op, the pointer cast, lane
//! insertion/extraction, and intrinsic calls. Each opcode belongs to exactly
//! one [`InstructionData`] format.

use core::fmt;
use core::slice;

use crate::entity;
use crate::ir::immediates::{Imm64, Uimm8};
use crate::ir::Value;

/// Some instructions use an external list of argument values because the
/// argument count is not fixed by the format. These value lists are stored in
/// a memory pool in `dfg.value_lists`.
pub type ValueList = entity::EntityList<Value>;

/// Memory pool for holding value lists. See `ValueList`.
pub type ValueListPool = entity::ListPool<Value>;

/// Identifier of an intrinsic function callable through `call`.
///
/// Every intrinsic has a fixed argument count and operates lane-wise, so a
/// call vectorizes to the same intrinsic at a vector type.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum Intrinsic {
    /// Square root.
    Sqrt,
    /// Absolute value.
    Fabs,
    /// Minimum of two numbers.
    Fmin,
    /// Maximum of two numbers.
    Fmax,
}

impl Intrinsic {
    /// Number of arguments the intrinsic takes.
    pub fn num_args(self) -> usize {
        match self {
            Self::Sqrt | Self::Fabs => 1,
            Self::Fmin | Self::Fmax => 2,
        }
    }
}

impl fmt::Display for Intrinsic {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match self {
            Self::Sqrt => "sqrt",
            Self::Fabs => "fabs",
            Self::Fmin => "fmin",
            Self::Fmax => "fmax",
        })
    }
}

/// An instruction opcode.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum Opcode {
    /// Integer constant.
    Iconst,
    /// Vector constant with every lane zero.
    Vconst,
    /// Integer addition.
    Iadd,
    /// Integer subtraction.
    Isub,
    /// Integer multiplication.
    Imul,
    /// Bitwise and.
    Band,
    /// Bitwise or.
    Bor,
    /// Bitwise xor.
    Bxor,
    /// Floating point addition.
    Fadd,
    /// Floating point subtraction.
    Fsub,
    /// Floating point multiplication.
    Fmul,
    /// Load from memory.
    Load,
    /// Store to memory.
    Store,
    /// Address of an element of an in-memory aggregate.
    ElemAddr,
    /// Reinterpret a pointer as a pointer to a different element type.
    Bitcast,
    /// Insert a scalar into a vector lane.
    Insertlane,
    /// Extract a scalar from a vector lane.
    Extractlane,
    /// Call an intrinsic function.
    Call,
}

impl Opcode {
    /// Can this instruction read from memory?
    pub fn can_load(self) -> bool {
        self == Self::Load
    }

    /// Can this instruction write to memory?
    pub fn can_store(self) -> bool {
        self == Self::Store
    }

    /// Is this one of the binary arithmetic opcodes?
    pub fn is_binary_arith(self) -> bool {
        matches!(
            self,
            Self::Iadd
                | Self::Isub
                | Self::Imul
                | Self::Band
                | Self::Bor
                | Self::Bxor
                | Self::Fadd
                | Self::Fsub
                | Self::Fmul
        )
    }

    /// Does this instruction produce a result value?
    pub fn has_result(self) -> bool {
        self != Self::Store
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match self {
            Self::Iconst => "iconst",
            Self::Vconst => "vconst",
            Self::Iadd => "iadd",
            Self::Isub => "isub",
            Self::Imul => "imul",
            Self::Band => "band",
            Self::Bor => "bor",
            Self::Bxor => "bxor",
            Self::Fadd => "fadd",
            Self::Fsub => "fsub",
            Self::Fmul => "fmul",
            Self::Load => "load",
            Self::Store => "store",
            Self::ElemAddr => "elem_addr",
            Self::Bitcast => "bitcast",
            Self::Insertlane => "insertlane",
            Self::Extractlane => "extractlane",
            Self::Call => "call",
        })
    }
}

/// Contents of an instruction: the opcode plus its operands.
///
/// Value operands are stored inline when the format has a fixed arity;
/// `elem_addr` and `call` keep theirs in a [`ValueList`].
#[derive(Copy, Clone, Debug, PartialEq, Hash)]
pub enum InstructionData {
    /// One value operand: `bitcast`.
    Unary {
        /// The opcode.
        opcode: Opcode,
        /// The operand.
        arg: Value,
    },
    /// One immediate operand: `iconst`, `vconst`.
    UnaryImm {
        /// The opcode.
        opcode: Opcode,
        /// The immediate.
        imm: Imm64,
    },
    /// Two value operands: the binary arithmetic class.
    Binary {
        /// The opcode.
        opcode: Opcode,
        /// The operands.
        args: [Value; 2],
    },
    /// One value operand plus a lane immediate: `extractlane`.
    BinaryImm8 {
        /// The opcode.
        opcode: Opcode,
        /// The vector operand.
        arg: Value,
        /// The lane index.
        imm: Uimm8,
    },
    /// Two value operands plus a lane immediate: `insertlane`.
    TernaryImm8 {
        /// The opcode.
        opcode: Opcode,
        /// The vector and the scalar to insert.
        args: [Value; 2],
        /// The lane index.
        imm: Uimm8,
    },
    /// A load with its address operand.
    Load {
        /// The opcode.
        opcode: Opcode,
        /// The address.
        arg: Value,
    },
    /// A store: the value to store and the address.
    Store {
        /// The opcode.
        opcode: Opcode,
        /// `args[0]` is the stored value, `args[1]` the address.
        args: [Value; 2],
    },
    /// An element address computation: base pointer followed by indices.
    ElemAddr {
        /// The opcode.
        opcode: Opcode,
        /// `args[0]` is the base pointer, the rest are indices.
        args: ValueList,
    },
    /// An intrinsic call.
    Call {
        /// The opcode.
        opcode: Opcode,
        /// Which intrinsic to call.
        intrinsic: Intrinsic,
        /// The call arguments.
        args: ValueList,
    },
}

impl InstructionData {
    /// Get the opcode of this instruction.
    pub fn opcode(&self) -> Opcode {
        match *self {
            Self::Unary { opcode, .. }
            | Self::UnaryImm { opcode, .. }
            | Self::Binary { opcode, .. }
            | Self::BinaryImm8 { opcode, .. }
            | Self::TernaryImm8 { opcode, .. }
            | Self::Load { opcode, .. }
            | Self::Store { opcode, .. }
            | Self::ElemAddr { opcode, .. }
            | Self::Call { opcode, .. } => opcode,
        }
    }

    /// Get the value arguments of this instruction as a slice.
    pub fn arguments<'a>(&'a self, pool: &'a ValueListPool) -> &'a [Value] {
        match self {
            Self::Unary { arg, .. } | Self::BinaryImm8 { arg, .. } | Self::Load { arg, .. } => {
                slice::from_ref(arg)
            }
            Self::UnaryImm { .. } => &[],
            Self::Binary { args, .. }
            | Self::TernaryImm8 { args, .. }
            | Self::Store { args, .. } => args,
            Self::ElemAddr { args, .. } | Self::Call { args, .. } => args.as_slice(pool),
        }
    }

    /// Get the value arguments of this instruction as a mutable slice.
    pub fn arguments_mut<'a>(&'a mut self, pool: &'a mut ValueListPool) -> &'a mut [Value] {
        match self {
            Self::Unary { arg, .. } | Self::BinaryImm8 { arg, .. } | Self::Load { arg, .. } => {
                slice::from_mut(arg)
            }
            Self::UnaryImm { .. } => &mut [],
            Self::Binary { args, .. }
            | Self::TernaryImm8 { args, .. }
            | Self::Store { args, .. } => args,
            Self::ElemAddr { args, .. } | Self::Call { args, .. } => args.as_mut_slice(pool),
        }
    }
}
