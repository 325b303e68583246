//! IR entity references.
//!
//! Instructions need to reference other parts of the function: the values they
//! consume, the blocks they live in. These references are not Rust references
//! but small index newtypes into tables owned by the
//! [`Function`](super::Function), so they stay valid across mutation and cost
//! four bytes each. There is a separate index type per entity so the indices
//! cannot be mixed up.
//!
//! All entity references implement `Display` in the textual IR notation.

use crate::entity::entity_impl;

/// An opaque reference to a basic block.
///
/// While the order is stable, it is arbitrary and does not necessarily
/// resemble the layout order.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Block(u32);
entity_impl!(Block, "block");

/// An opaque reference to an SSA value.
///
/// Values are produced as instruction results or block parameters.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Value(u32);
entity_impl!(Value, "v");

/// An opaque reference to an instruction.
///
/// While the order is stable, it is arbitrary and does not necessarily
/// resemble the layout order.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Inst(u32);
entity_impl!(Inst, "inst");
