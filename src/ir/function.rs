//! Intermediate representation of a function.
//!
//! The `Function` struct defined in this module owns all of its basic blocks,
//! instructions, and values.

use core::fmt;

use crate::ir::{DataFlowGraph, Layout};

/// A function: a data flow graph plus the layout giving program order.
#[derive(Clone)]
pub struct Function {
    /// Name of this function, for diagnostics.
    pub name: String,

    /// Data flow graph containing the primary definition of all instructions,
    /// blocks and values.
    pub dfg: DataFlowGraph,

    /// Layout of blocks and instructions in the function body.
    pub layout: Layout,
}

impl Function {
    /// Create a function with the given name.
    pub fn with_name(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            dfg: DataFlowGraph::new(),
            layout: Layout::new(),
        }
    }

    /// Create an anonymous function.
    pub fn new() -> Self {
        Self::with_name("")
    }
}

impl Default for Function {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "function %{} {{", self.name)?;
        for block in self.layout.blocks() {
            write!(f, "{}(", block)?;
            for (i, &param) in self.dfg.block_params(block).iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{}: {}", param, self.dfg.value_type(param))?;
            }
            writeln!(f, "):")?;
            for inst in self.layout.block_insts(block) {
                writeln!(f, "    {}", self.dfg.display_inst(inst))?;
            }
        }
        writeln!(f, "}}")
    }
}
