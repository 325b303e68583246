//! Alignment analysis over memory access addresses.
//!
//! Packing two memory operations requires knowing that they touch adjacent
//! elements of the same array, indexed off the same induction variable. This
//! module decodes addresses of the shape `&base[iv]` and `&base[iv + c]` into
//! a canonical `(base, induction variable, index)` triple; everything else is
//! silently skipped and cannot anchor a pack.
//!
//! Alignment is seeded from loads and stores only. During pack extension it
//! is copied onto newly packed arithmetic instructions, so adjacency
//! constraints keep propagating along the chains.

use log::trace;

use crate::fx::FxHashMap;
use crate::inst_predicates::may_read_or_write_memory;
use crate::ir::instructions::InstructionData;
use crate::ir::{Block, Function, Inst, Opcode, Value};

/// Canonical description of a memory access address.
///
/// For the access `A[i + 3]`: `base` is `A`, `induction_var` is `i`, and
/// `index` is 3.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct AlignInfo {
    /// The base address of the accessed aggregate.
    pub base: Value,
    /// The variable part of the element index.
    pub induction_var: Value,
    /// The constant element offset from `base[induction_var]`.
    pub index: u32,
}

/// Check that `b` describes the access `offset` elements above `a`.
pub fn consistent(a: &AlignInfo, b: &AlignInfo, offset: u32) -> bool {
    a.base == b.base
        && a.induction_var == b.induction_var
        && a.index.wrapping_add(offset) == b.index
}

/// Per-block map from instruction to its alignment information.
pub struct AlignmentMap {
    info: FxHashMap<Inst, AlignInfo>,
}

impl AlignmentMap {
    /// Analyze the memory operations of `block`.
    pub fn compute(func: &Function, block: Block) -> Self {
        let mut map = Self {
            info: FxHashMap::default(),
        };
        for inst in func.layout.block_insts(block) {
            if !may_read_or_write_memory(&func.dfg, inst) {
                continue;
            }
            let addr = match func.dfg.insts[inst] {
                InstructionData::Load { arg, .. } => arg,
                InstructionData::Store { args, .. } => args[1],
                _ => continue,
            };
            if let Some(info) = decode_addr(func, addr) {
                trace!(
                    "[align] ({}): base = {}, iv = {}, index = {}",
                    func.dfg.display_inst(inst),
                    info.base,
                    info.induction_var,
                    info.index
                );
                map.info.insert(inst, info);
            }
        }
        map
    }

    /// Alignment information for `inst`, if any.
    pub fn get(&self, inst: Inst) -> Option<&AlignInfo> {
        self.info.get(&inst)
    }

    /// Copy the alignment of `src` onto `dst`. Does nothing when `src` has no
    /// alignment or `dst` already has some.
    pub fn copy(&mut self, dst: Inst, src: Inst) {
        if self.info.contains_key(&dst) {
            return;
        }
        if let Some(info) = self.info.get(&src).copied() {
            self.info.insert(dst, info);
        }
    }

    /// Do `s1` and `s2` access adjacent elements of the same array?
    pub fn adjacent(&self, s1: Inst, s2: Inst) -> bool {
        match (self.get(s1), self.get(s2)) {
            (Some(a1), Some(a2)) => consistent(a1, a2, 1),
            _ => false,
        }
    }
}

/// Decode an address into alignment information.
///
/// The address must be an `elem_addr` with exactly two indices whose first
/// index is not a nonzero constant. The second index is unwrapped while it is
/// an `iadd` or `bor` with a constant right operand, accumulating the
/// constants; the terminal value is the induction variable.
fn decode_addr(func: &Function, addr: Value) -> Option<AlignInfo> {
    let addr_inst = func.dfg.value_def(addr).inst()?;
    let args = match func.dfg.insts[addr_inst] {
        InstructionData::ElemAddr { args, .. } => args,
        _ => return None,
    };
    let args = args.as_slice(&func.dfg.value_lists);
    let (&base, indices) = args.split_first()?;
    if indices.len() != 2 {
        return None;
    }
    if let Some(c) = as_iconst(func, indices[0]) {
        if c != 0 {
            return None;
        }
    }

    let mut v = indices[1];
    let mut index = 0u32;
    while let Some(def) = func.dfg.value_def(v).inst() {
        let (opcode, args) = match func.dfg.insts[def] {
            InstructionData::Binary { opcode, args } => (opcode, args),
            _ => break,
        };
        if opcode != Opcode::Iadd && opcode != Opcode::Bor {
            break;
        }
        match as_iconst(func, args[1]) {
            Some(c) => {
                index = index.wrapping_add(c as u32);
                v = args[0];
            }
            None => break,
        }
    }
    Some(AlignInfo {
        base,
        induction_var: v,
        index,
    })
}

fn as_iconst(func: &Function, v: Value) -> Option<i64> {
    let inst = func.dfg.value_def(v).inst()?;
    match func.dfg.insts[inst] {
        InstructionData::UnaryImm {
            opcode: Opcode::Iconst,
            imm,
        } => Some(imm.bits()),
        _ => None,
    }
}
