//! Representation of functions: instructions, values, blocks, and layout.

pub mod builder;
pub mod dfg;
pub mod entities;
pub mod function;
pub mod immediates;
pub mod instructions;
pub mod layout;
pub mod types;

pub use crate::ir::builder::{InsertBuilder, InstBuilder, InstBuilderBase, InstInserterBase};
pub use crate::ir::dfg::{DataFlowGraph, ValueDef};
pub use crate::ir::entities::{Block, Inst, Value};
pub use crate::ir::function::Function;
pub use crate::ir::instructions::{InstructionData, Intrinsic, Opcode, ValueList, ValueListPool};
pub use crate::ir::layout::Layout;
pub use crate::ir::types::Type;
