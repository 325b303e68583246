//! Instruction predicates/properties, shared by various analyses.

use crate::ir::instructions::InstructionData;
use crate::ir::{types, DataFlowGraph, Inst, Type};

/// Does `inst` read or write memory?
pub fn may_read_or_write_memory(dfg: &DataFlowGraph, inst: Inst) -> bool {
    let opcode = dfg.insts[inst].opcode();
    opcode.can_load() || opcode.can_store()
}

/// Result type of `inst`, or `INVALID` when it produces no value.
fn result_type(dfg: &DataFlowGraph, inst: Inst) -> Type {
    dfg.inst_result(inst)
        .map_or(types::INVALID, |v| dfg.value_type(v))
}

/// Are `s1` and `s2` isomorphic?
///
/// Isomorphic instructions have the same opcode and the same result type, and
/// both belong to one of the pack-eligible classes: binary arithmetic, load,
/// store, or a call of the same intrinsic. Stores additionally must store
/// values of the same type. Nothing else can be replaced by one vector
/// instruction, so nothing else is isomorphic.
pub fn is_isomorphic(dfg: &DataFlowGraph, s1: Inst, s2: Inst) -> bool {
    let d1 = &dfg.insts[s1];
    let d2 = &dfg.insts[s2];
    if d1.opcode() != d2.opcode() {
        return false;
    }
    if result_type(dfg, s1) != result_type(dfg, s2) {
        return false;
    }
    let opcode = d1.opcode();
    if opcode.is_binary_arith() || opcode.can_load() {
        return true;
    }
    if opcode.can_store() {
        let t1 = dfg.value_type(dfg.inst_args(s1)[0]);
        let t2 = dfg.value_type(dfg.inst_args(s2)[0]);
        return t1 == t2;
    }
    if let (
        InstructionData::Call { intrinsic: i1, .. },
        InstructionData::Call { intrinsic: i2, .. },
    ) = (d1, d2)
    {
        return i1 == i2;
    }
    false
}

/// Does `s` directly depend on `s_dep`, i.e. is `s` among the users of the
/// value `s_dep` produces? This is one-hop dependence only; transitive
/// dependence is the scheduler's business, at pack granularity.
pub fn is_dependent_on(dfg: &DataFlowGraph, s: Inst, s_dep: Inst) -> bool {
    match dfg.inst_result(s_dep) {
        Some(v) => dfg.value_uses(v).contains(&s),
        None => false,
    }
}

/// Are `s1` and `s2` independent: neither uses the other's result?
pub fn is_independent(dfg: &DataFlowGraph, s1: Inst, s2: Inst) -> bool {
    !is_dependent_on(dfg, s1, s2) && !is_dependent_on(dfg, s2, s1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cursor::{Cursor, FuncCursor};
    use crate::ir::{Function, InstBuilder, ValueDef};

    fn def(dfg: &DataFlowGraph, v: crate::ir::Value) -> Inst {
        match dfg.value_def(v) {
            ValueDef::Result(inst) => inst,
            _ => panic!("not an instruction result"),
        }
    }

    #[test]
    fn oracles() {
        let mut func = Function::new();
        let block = func.dfg.make_block();
        func.layout.append_block(block);
        let p = func.dfg.append_block_param(block, types::PTR);
        let x = func.dfg.append_block_param(block, types::I32);
        let y = func.dfg.append_block_param(block, types::I32);

        let mut pos = FuncCursor::new(&mut func).at_bottom(block);
        let a = pos.ins().iadd(x, y);
        let b = pos.ins().iadd(y, x);
        let m = pos.ins().imul(a, x);
        let l1 = pos.ins().load(types::I32, p);
        let l2 = pos.ins().load(types::I32, p);
        let addr = pos.ins().elem_addr(p, &[x]);
        let addr2 = pos.ins().elem_addr(p, &[y]);

        let dfg = &func.dfg;
        let (a, b, m) = (def(dfg, a), def(dfg, b), def(dfg, m));
        let (l1, l2) = (def(dfg, l1), def(dfg, l2));
        let (addr, addr2) = (def(dfg, addr), def(dfg, addr2));

        assert!(is_isomorphic(dfg, a, b));
        assert!(!is_isomorphic(dfg, a, m)); // different opcodes
        assert!(is_isomorphic(dfg, l1, l2));
        assert!(!is_isomorphic(dfg, a, l1));
        // Element address computations are not a vectorizable class.
        assert!(!is_isomorphic(dfg, addr, addr2));

        assert!(is_dependent_on(dfg, m, a));
        assert!(!is_dependent_on(dfg, a, m));
        assert!(!is_independent(dfg, m, a));
        assert!(is_independent(dfg, a, b));
        assert!(is_independent(dfg, l1, l2));
    }
}
