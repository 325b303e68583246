//! Pack scheduling.
//!
//! Code generation replaces each pack by one vector instruction, emitted at a
//! single program point. That is only meaningful if the packs can be ordered
//! consistently with the values and memory locations flowing between them.
//! This module builds the pack-level dependency graph, orders it
//! topologically, and checks that the chosen emission points are feasible.
//! Any failure abandons the block before a single instruction has been
//! touched.

use std::collections::BTreeSet;

use log::trace;

use crate::entity::SecondaryMap;
use crate::fx::FxHashMap;
use crate::ir::{Block, Function, Inst, Value};
use crate::slp::align::AlignmentMap;
use crate::slp::pack::PackSet;

/// `deps[p]` holds the packs that pack `p` consumes values from or must be
/// emitted after.
pub type DependencyMap = Vec<BTreeSet<usize>>;

/// Map from instruction to the pack (by index) containing it.
pub fn pack_members(packs: &PackSet) -> FxHashMap<Inst, usize> {
    let mut members = FxHashMap::default();
    for (p, pack) in packs.iter().enumerate() {
        for &s in pack.elems() {
            let old = members.insert(s, p);
            debug_assert!(old.is_none(), "instruction in more than one pack");
        }
    }
    members
}

/// Build the dependency graph over packs.
///
/// There is an SSA edge `q ∈ deps[p]` whenever some element of `p` uses a
/// value produced by an element of `q`, and a memory edge whenever the two
/// packs access conflicting locations and their program order pins a
/// direction. Cycles are possible (combination can chain pairs into packs
/// whose surroundings interleave both ways); the scheduler reports them as
/// failure.
pub fn build_dependencies(
    func: &Function,
    packs: &PackSet,
    align: &AlignmentMap,
    positions: &SecondaryMap<Inst, u32>,
) -> DependencyMap {
    let members = pack_members(packs);
    let mut deps: DependencyMap = vec![BTreeSet::new(); packs.len()];

    for (p, pack) in packs.iter().enumerate() {
        for &s in pack.elems() {
            for &arg in func.dfg.inst_args(s) {
                let Some(def) = func.dfg.value_def(arg).inst() else {
                    continue;
                };
                if let Some(&q) = members.get(&def) {
                    if q != p {
                        deps[p].insert(q);
                    }
                }
            }
        }
    }

    add_memory_edges(func, packs, align, positions, &mut deps);

    for (p, pdeps) in deps.iter().enumerate() {
        if !pdeps.is_empty() {
            trace!(
                "pack {} depends on packs {:?}",
                p,
                pdeps.iter().collect::<Vec<_>>()
            );
        }
    }
    deps
}

struct MemPack {
    idx: usize,
    base: Value,
    induction_var: Value,
    first: u32,
    last: u32,
    is_store: bool,
}

/// Add ordering edges between memory packs that touch overlapping element
/// ranges of the same array.
///
/// Lane-aligned packs (identical range and width, the read-modify-write
/// shape) conflict lane by lane, so each lane orders the later access after
/// the earlier one. A partial overlap cannot be expressed lane-for-lane at
/// pack granularity; every ordered element pair contributes an edge, and
/// interleaved accesses then produce a cycle, which abandons the block.
fn add_memory_edges(
    func: &Function,
    packs: &PackSet,
    align: &AlignmentMap,
    positions: &SecondaryMap<Inst, u32>,
    deps: &mut DependencyMap,
) {
    let mem: Vec<MemPack> = packs
        .iter()
        .enumerate()
        .filter_map(|(idx, pack)| {
            let opcode = func.dfg.insts[pack.first()].opcode();
            if !opcode.can_load() && !opcode.can_store() {
                return None;
            }
            let info = align.get(pack.first())?;
            Some(MemPack {
                idx,
                base: info.base,
                induction_var: info.induction_var,
                first: info.index,
                last: info.index + pack.len() as u32 - 1,
                is_store: opcode.can_store(),
            })
        })
        .collect();

    for (an, a) in mem.iter().enumerate() {
        for b in &mem[an + 1..] {
            if a.base != b.base || a.induction_var != b.induction_var {
                continue;
            }
            if !a.is_store && !b.is_store {
                continue;
            }
            if a.last < b.first || b.last < a.first {
                continue;
            }
            let pa = packs.get(a.idx);
            let pb = packs.get(b.idx);
            if a.first == b.first && a.last == b.last {
                // Lane-aligned: order each lane pair by program order.
                for (&sa, &sb) in pa.elems().iter().zip(pb.elems()) {
                    if positions[sa] < positions[sb] {
                        deps[b.idx].insert(a.idx);
                    } else {
                        deps[a.idx].insert(b.idx);
                    }
                }
            } else {
                for &sa in pa.elems() {
                    for &sb in pb.elems() {
                        if positions[sa] < positions[sb] {
                            deps[b.idx].insert(a.idx);
                        } else {
                            deps[a.idx].insert(b.idx);
                        }
                    }
                }
            }
        }
    }
}

/// Order the packs topologically.
///
/// Repeatedly select the first pack, in insertion order, that is not yet
/// scheduled and whose dependencies are all scheduled. When a full pass makes
/// no progress while packs remain, the graph is cyclic and `None` is
/// returned.
pub fn topological_order(packs: &PackSet, deps: &DependencyMap) -> Option<Vec<usize>> {
    let mut scheduled = vec![false; packs.len()];
    let mut order = Vec::with_capacity(packs.len());
    loop {
        let before = order.len();
        for p in 0..packs.len() {
            if scheduled[p] {
                continue;
            }
            if deps[p].iter().all(|&q| scheduled[q]) {
                scheduled[p] = true;
                order.push(p);
                break;
            }
        }
        if order.len() == before {
            break;
        }
    }
    if order.len() == packs.len() {
        trace!("scheduled pack order: {:?}", order);
        Some(order)
    } else {
        None
    }
}

/// Check that emitting each pack at its last element is feasible.
///
/// Emission inserts all new instructions strictly before the pack's last
/// element, so three things must hold before any mutation happens:
///
/// - the sequence-last element of each pack is also its program-order-last,
/// - for every edge, the producer's emission point precedes the consumer's,
/// - every in-block user of a pack element that is not itself packed sits
///   below the emission point, where a lane extract can reach it.
pub fn validate_placement(
    func: &Function,
    block: Block,
    packs: &PackSet,
    deps: &DependencyMap,
    positions: &SecondaryMap<Inst, u32>,
) -> bool {
    let members = pack_members(packs);

    for pack in packs.iter() {
        let last = positions[pack.last()];
        if pack.elems().iter().any(|&s| positions[s] > last) {
            return false;
        }
    }

    for (p, pdeps) in deps.iter().enumerate() {
        let at = positions[packs.get(p).last()];
        for &q in pdeps {
            if positions[packs.get(q).last()] >= at {
                return false;
            }
        }
    }

    for pack in packs.iter() {
        let last = positions[pack.last()];
        for &s in pack.elems() {
            let Some(result) = func.dfg.inst_result(s) else {
                continue;
            };
            for &user in func.dfg.value_uses(result) {
                if members.contains_key(&user) {
                    continue;
                }
                if func.layout.inst_block(user) != Some(block) {
                    continue;
                }
                if positions[user] <= last {
                    return false;
                }
            }
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cursor::{Cursor, FuncCursor};
    use crate::ir::{types, Function, InstBuilder, Opcode};
    use crate::slp::block_positions;
    use crate::slp::pack::{combine_packs, extend_packlist, find_adj_refs};

    /// `dst[i+k] = a[i+k] + b[i+k]` for `k` in `0..4`, three distinct arrays.
    fn three_arrays() -> (Function, Block) {
        let mut func = Function::with_name("three_arrays");
        let block = func.dfg.make_block();
        func.layout.append_block(block);
        let a = func.dfg.append_block_param(block, types::PTR);
        let b = func.dfg.append_block_param(block, types::PTR);
        let dst = func.dfg.append_block_param(block, types::PTR);
        let iv = func.dfg.append_block_param(block, types::I64);
        let mut pos = FuncCursor::new(&mut func).at_bottom(block);
        let zero = pos.ins().iconst(types::I64, 0);
        for k in 0..4 {
            let off = if k == 0 {
                iv
            } else {
                let c = pos.ins().iconst(types::I64, k);
                pos.ins().iadd(iv, c)
            };
            let aa = pos.ins().elem_addr(a, &[zero, off]);
            let x = pos.ins().load(types::I64, aa);
            let ba = pos.ins().elem_addr(b, &[zero, off]);
            let y = pos.ins().load(types::I64, ba);
            let sum = pos.ins().iadd(x, y);
            let da = pos.ins().elem_addr(dst, &[zero, off]);
            pos.ins().store(sum, da);
        }
        (func, block)
    }

    fn discover(func: &Function, block: Block) -> (PackSet, AlignmentMap) {
        let mut align = AlignmentMap::compute(func, block);
        let positions = block_positions(func, block);
        let mut packs = PackSet::default();
        find_adj_refs(func, block, &align, &mut packs);
        extend_packlist(func, block, &mut align, &mut packs, &positions);
        (combine_packs(func, packs), align)
    }

    #[test]
    fn schedules_producers_first() {
        let (func, block) = three_arrays();
        let (packs, align) = discover(&func, block);
        let positions = block_positions(&func, block);
        assert_eq!(packs.len(), 4);

        let deps = build_dependencies(&func, &packs, &align, &positions);
        let order = topological_order(&packs, &deps).expect("acyclic");
        assert_eq!(order.len(), packs.len());

        let mut seen = vec![false; packs.len()];
        for p in order {
            assert!(deps[p].iter().all(|&q| seen[q]));
            seen[p] = true;
        }
        assert!(validate_placement(&func, block, &packs, &deps, &positions));

        // The store pack consumes the add pack which consumes both loads.
        let store = packs
            .iter()
            .position(|p| func.dfg.insts[p.first()].opcode() == Opcode::Store)
            .unwrap();
        let add = packs
            .iter()
            .position(|p| func.dfg.insts[p.first()].opcode() == Opcode::Iadd)
            .unwrap();
        assert!(deps[store].contains(&add));
        assert_eq!(deps[add].len(), 2);
    }

    #[test]
    fn detects_cycles() {
        // Two fake packs depending on each other.
        let (func, block) = three_arrays();
        let (packs, _) = discover(&func, block);
        let n = packs.len();
        let mut deps: DependencyMap = vec![BTreeSet::new(); n];
        deps[0].insert(1);
        deps[1].insert(0);
        assert_eq!(topological_order(&packs, &deps), None);
    }
}
