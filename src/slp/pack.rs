//! Pack discovery.
//!
//! A pack is an ordered group of isomorphic, independent instructions that a
//! single vector instruction can replace. Discovery proceeds in three steps:
//! seeding pairs from adjacent memory references, breadth-first extension of
//! the pair set along use-def and def-use chains, and combination of pairs
//! that share an endpoint into longer packs.

use log::trace;

use crate::entity::packed_option::PackedOption;
use crate::entity::SecondaryMap;
use crate::inst_predicates::{is_independent, is_isomorphic, may_read_or_write_memory};
use crate::ir::{Block, Function, Inst, Value};
use crate::slp::align::{consistent, AlignInfo, AlignmentMap};
use smallvec::SmallVec;

/// An ordered group of isomorphic, independent instructions to be replaced by
/// one vector instruction, one lane per element.
///
/// A pack of size two is a *pair*, with a left and a right element; pairs are
/// the unit of discovery. Packs are never mutated after discovery except for
/// recording the vector value code generation produces for them.
#[derive(Clone, PartialEq)]
pub struct Pack {
    elems: SmallVec<[Inst; 4]>,
    /// The vector result, once code generation has materialized it.
    value: PackedOption<Value>,
}

impl Pack {
    fn pair(s1: Inst, s2: Inst) -> Self {
        let mut elems = SmallVec::new();
        elems.push(s1);
        elems.push(s2);
        Self {
            elems,
            value: None.into(),
        }
    }

    /// Concatenate two packs that share an endpoint, eliding the duplicate.
    fn combine(p1: &Pack, p2: &Pack) -> Self {
        debug_assert_eq!(p1.last(), p2.first());
        let mut elems = p1.elems.clone();
        elems.extend_from_slice(&p2.elems[1..]);
        Self {
            elems,
            value: None.into(),
        }
    }

    /// Number of elements, which is also the vector width.
    pub fn len(&self) -> usize {
        self.elems.len()
    }

    /// The elements, in lane order.
    pub fn elems(&self) -> &[Inst] {
        &self.elems
    }

    /// The first element.
    pub fn first(&self) -> Inst {
        self.elems[0]
    }

    /// The last element.
    pub fn last(&self) -> Inst {
        self.elems[self.elems.len() - 1]
    }

    /// Is this a pack of exactly two elements?
    pub fn is_pair(&self) -> bool {
        self.len() == 2
    }

    /// The left element of a pair.
    pub fn left(&self) -> Inst {
        debug_assert!(self.is_pair());
        self.elems[0]
    }

    /// The right element of a pair.
    pub fn right(&self) -> Inst {
        debug_assert!(self.is_pair());
        self.elems[1]
    }

    /// The lane of `inst` within this pack, if it is an element.
    pub fn lane_of(&self, inst: Inst) -> Option<usize> {
        self.elems.iter().position(|&s| s == inst)
    }

    /// The vector value produced for this pack, once emitted.
    pub fn value(&self) -> Option<Value> {
        self.value.expand()
    }

    /// Record the vector value produced for this pack.
    pub fn set_value(&mut self, value: Value) {
        debug_assert!(self.value.is_none());
        self.value = value.into();
    }
}

/// The packs under construction for one block.
///
/// Insertion order is preserved and observable: scheduling resolves ties in
/// it, so adding packs in a deterministic order keeps the whole pass
/// deterministic.
#[derive(Default)]
pub struct PackSet {
    packs: Vec<Pack>,
}

impl PackSet {
    /// Number of packs.
    pub fn len(&self) -> usize {
        self.packs.len()
    }

    /// Is the set empty?
    pub fn is_empty(&self) -> bool {
        self.packs.is_empty()
    }

    /// Get the n'th pack.
    pub fn get(&self, n: usize) -> &Pack {
        &self.packs[n]
    }

    /// Get the n'th pack mutably.
    pub fn get_mut(&mut self, n: usize) -> &mut Pack {
        &mut self.packs[n]
    }

    /// Iterate over the packs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &Pack> {
        self.packs.iter()
    }

    /// Add the pair `(s1, s2)`, unless an equal pack already exists.
    pub fn add_pair(&mut self, func: &Function, s1: Inst, s2: Inst) {
        let pack = Pack::pair(s1, s2);
        if self.packs.iter().any(|p| *p == pack) {
            return;
        }
        trace!(
            "[add_pair] ({}) and ({})",
            func.dfg.display_inst(s1),
            func.dfg.display_inst(s2)
        );
        self.packs.push(pack);
    }

    /// Does the pair `(s1, s2)` already exist?
    pub fn pair_exists(&self, s1: Inst, s2: Inst) -> bool {
        self.packs
            .iter()
            .any(|p| p.is_pair() && p.left() == s1 && p.right() == s2)
    }

    /// Is `s` the left element of any pair?
    pub fn packed_in_left(&self, s: Inst) -> bool {
        self.packs.iter().any(|p| p.is_pair() && p.left() == s)
    }

    /// Is `s` the right element of any pair?
    pub fn packed_in_right(&self, s: Inst) -> bool {
        self.packs.iter().any(|p| p.is_pair() && p.right() == s)
    }

    /// Find the pack containing `s`, if any.
    pub fn find_pack(&self, s: Inst) -> Option<usize> {
        self.packs.iter().position(|p| p.lane_of(s).is_some())
    }
}

/// Can `s1` and `s2` form a pair anchored at alignment `anchor`?
///
/// The statements must be isomorphic, independent, and distinct; `s1` must
/// not already be packed as a left element nor `s2` as a right element; and
/// whatever alignment the statements carry must agree with the anchor
/// (`s1` exactly, `s2` offset by one lane). Absent alignment is permitted.
fn stmts_can_pack(
    func: &Function,
    packs: &PackSet,
    align: &AlignmentMap,
    s1: Inst,
    s2: Inst,
    anchor: Option<&AlignInfo>,
) -> bool {
    if s1 == s2 {
        return false;
    }
    if !is_isomorphic(&func.dfg, s1, s2) || !is_independent(&func.dfg, s1, s2) {
        return false;
    }
    if packs.packed_in_left(s1) || packs.packed_in_right(s2) {
        return false;
    }
    if let Some(a1) = align.get(s1) {
        match anchor {
            Some(anchor) if consistent(anchor, a1, 0) => {}
            _ => return false,
        }
    }
    if let Some(a2) = align.get(s2) {
        match anchor {
            Some(anchor) if consistent(anchor, a2, 1) => {}
            _ => return false,
        }
    }
    true
}

/// Estimated savings of packing `(t1, t2)`: negative when the pair already
/// exists, otherwise positive. A richer cost model would go here.
fn est_savings(packs: &PackSet, t1: Inst, t2: Inst) -> i32 {
    if packs.pair_exists(t1, t2) {
        -1
    } else {
        1
    }
}

/// Seed the pack set with every adjacent pair of memory references in
/// `block`.
pub fn find_adj_refs(func: &Function, block: Block, align: &AlignmentMap, packs: &mut PackSet) {
    for s1 in func.layout.block_insts(block) {
        if !may_read_or_write_memory(&func.dfg, s1) {
            continue;
        }
        for s2 in func.layout.block_insts(block) {
            if s2 == s1 || !may_read_or_write_memory(&func.dfg, s2) {
                continue;
            }
            if align.adjacent(s1, s2) {
                let anchor = align.get(s1).copied();
                if stmts_can_pack(func, packs, align, s1, s2, anchor.as_ref()) {
                    packs.add_pair(func, s1, s2);
                }
            }
        }
    }
}

/// Grow the pack set breadth-first: for every pack, try to pack the operands
/// of its elements (use-def) and the users of its elements (def-use). Newly
/// added pairs are processed in turn until the set stops growing.
pub fn extend_packlist(
    func: &Function,
    block: Block,
    align: &mut AlignmentMap,
    packs: &mut PackSet,
    positions: &SecondaryMap<Inst, u32>,
) {
    let mut head = 0;
    while head < packs.len() {
        follow_use_defs(func, block, align, packs, head);
        follow_def_uses(func, block, align, packs, head, positions);
        head += 1;
    }
}

/// The defining instruction of `v`, when it lies in `block`.
fn def_in_block(func: &Function, block: Block, v: Value) -> Option<Inst> {
    let inst = func.dfg.value_def(v).inst()?;
    if func.layout.inst_block(inst) == Some(block) {
        Some(inst)
    } else {
        None
    }
}

/// Try to pack, operand slot by operand slot, the definitions feeding the
/// pair at `n`.
fn follow_use_defs(
    func: &Function,
    block: Block,
    align: &mut AlignmentMap,
    packs: &mut PackSet,
    n: usize,
) {
    let (s1, s2) = {
        let p = packs.get(n);
        (p.left(), p.right())
    };
    let anchor = align.get(s1).copied();
    let nargs = func.dfg.inst_args(s1).len();
    debug_assert_eq!(nargs, func.dfg.inst_args(s2).len());
    for j in 0..nargs {
        let t1 = def_in_block(func, block, func.dfg.inst_args(s1)[j]);
        let t2 = def_in_block(func, block, func.dfg.inst_args(s2)[j]);
        let (Some(t1), Some(t2)) = (t1, t2) else {
            continue;
        };
        if stmts_can_pack(func, packs, align, t1, t2, anchor.as_ref())
            && est_savings(packs, t1, t2) >= 0
        {
            packs.add_pair(func, t1, t2);
            align.copy(t1, s1);
            align.copy(t2, s2);
        }
    }
}

/// Try to pack one pair of users of the pair at `n`. Among the viable user
/// pairs, the lexicographically earliest by block position wins.
fn follow_def_uses(
    func: &Function,
    block: Block,
    align: &mut AlignmentMap,
    packs: &mut PackSet,
    n: usize,
    positions: &SecondaryMap<Inst, u32>,
) {
    let (s1, s2) = {
        let p = packs.get(n);
        (p.left(), p.right())
    };
    let anchor = align.get(s1).copied();
    let (Some(r1), Some(r2)) = (func.dfg.inst_result(s1), func.dfg.inst_result(s2)) else {
        return;
    };
    let mut best: Option<(Inst, Inst)> = None;
    for &t1 in func.dfg.value_uses(r1) {
        if func.layout.inst_block(t1) != Some(block) {
            continue;
        }
        for &t2 in func.dfg.value_uses(r2) {
            if func.layout.inst_block(t2) != Some(block) {
                continue;
            }
            if !stmts_can_pack(func, packs, align, t1, t2, anchor.as_ref()) {
                continue;
            }
            if est_savings(packs, t1, t2) < 0 {
                continue;
            }
            let better = match best {
                None => true,
                Some((u1, u2)) => (positions[t1], positions[t2]) < (positions[u1], positions[u2]),
            };
            if better {
                best = Some((t1, t2));
            }
        }
    }
    if let Some((u1, u2)) = best {
        packs.add_pair(func, u1, u2);
        align.copy(u1, s1);
        align.copy(u2, s2);
    }
}

/// Combine pairs that chain by a shared endpoint into longer packs.
///
/// Whenever the last element of one pack is the first element of another, the
/// two are replaced by their concatenation with the duplicate elided. The
/// merged pack is built outside the scan and the list updated atomically, and
/// the scan restarts after every merge.
pub fn combine_packs(func: &Function, mut packs: PackSet) -> PackSet {
    loop {
        let mut found = None;
        'scan: for i in 0..packs.len() {
            for j in 0..packs.len() {
                if i != j && packs.get(i).last() == packs.get(j).first() {
                    found = Some((i, j));
                    break 'scan;
                }
            }
        }
        let Some((i, j)) = found else {
            break;
        };
        let combined = Pack::combine(packs.get(i), packs.get(j));
        let (hi, lo) = if i > j { (i, j) } else { (j, i) };
        packs.packs.remove(hi);
        packs.packs.remove(lo);
        packs.packs.push(combined);
    }

    for (n, pack) in packs.iter().enumerate() {
        trace!("pack {} ({} wide):", n, pack.len());
        for (lane, &s) in pack.elems().iter().enumerate() {
            trace!("  {}: {}", lane, func.dfg.display_inst(s));
        }
    }
    packs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cursor::{Cursor, FuncCursor};
    use crate::ir::{types, InstBuilder, Opcode};
    use crate::slp::block_positions;

    /// Build `dst[i+k] = src[i+k] * src[i+k]` for `k` in `0..n`, returning
    /// the function and its block.
    fn self_multiply(n: i64) -> (Function, Block) {
        let mut func = Function::with_name("self_multiply");
        let block = func.dfg.make_block();
        func.layout.append_block(block);
        let base = func.dfg.append_block_param(block, types::PTR);
        let iv = func.dfg.append_block_param(block, types::I64);
        let mut pos = FuncCursor::new(&mut func).at_bottom(block);
        let zero = pos.ins().iconst(types::I64, 0);
        for k in 0..n {
            let off = if k == 0 {
                iv
            } else {
                let c = pos.ins().iconst(types::I64, k);
                pos.ins().iadd(iv, c)
            };
            let addr = pos.ins().elem_addr(base, &[zero, off]);
            let x = pos.ins().load(types::I64, addr);
            let sq = pos.ins().imul(x, x);
            pos.ins().store(sq, addr);
        }
        (func, block)
    }

    #[test]
    fn seeding_pairs_adjacent_refs() {
        let (func, block) = self_multiply(4);
        let align = AlignmentMap::compute(&func, block);
        let mut packs = PackSet::default();
        find_adj_refs(&func, block, &align, &mut packs);

        // Three load pairs and three store pairs.
        assert_eq!(packs.len(), 6);
        for pack in packs.iter() {
            assert!(pack.is_pair());
            let op = func.dfg.insts[pack.left()].opcode();
            assert!(op == Opcode::Load || op == Opcode::Store);
            assert!(align.adjacent(pack.left(), pack.right()));
        }
    }

    #[test]
    fn extension_packs_the_multiplies() {
        let (func, block) = self_multiply(4);
        let mut align = AlignmentMap::compute(&func, block);
        let positions = block_positions(&func, block);
        let mut packs = PackSet::default();
        find_adj_refs(&func, block, &align, &mut packs);
        extend_packlist(&func, block, &mut align, &mut packs, &positions);

        let muls: Vec<&Pack> = packs
            .iter()
            .filter(|p| func.dfg.insts[p.first()].opcode() == Opcode::Imul)
            .collect();
        assert_eq!(muls.len(), 3);
        // Extension copied alignment onto the multiplies.
        for p in muls {
            assert!(align.get(p.left()).is_some());
        }
    }

    #[test]
    fn combination_chains_pairs() {
        let (func, block) = self_multiply(4);
        let mut align = AlignmentMap::compute(&func, block);
        let positions = block_positions(&func, block);
        let mut packs = PackSet::default();
        find_adj_refs(&func, block, &align, &mut packs);
        extend_packlist(&func, block, &mut align, &mut packs, &positions);
        let packs = combine_packs(&func, packs);

        assert_eq!(packs.len(), 3);
        for pack in packs.iter() {
            assert_eq!(pack.len(), 4);
        }
        // Each instruction belongs to at most one pack.
        for pack in packs.iter() {
            for &s in pack.elems() {
                assert_eq!(
                    packs
                        .iter()
                        .filter(|p| p.lane_of(s).is_some())
                        .count(),
                    1
                );
            }
        }
        // Memory packs are index-ordered with step one.
        for pack in packs.iter() {
            if !may_read_or_write_memory(&func.dfg, pack.first()) {
                continue;
            }
            let infos: Vec<u32> = pack
                .elems()
                .iter()
                .map(|&s| align.get(s).unwrap().index)
                .collect();
            for w in infos.windows(2) {
                assert_eq!(w[1], w[0] + 1);
            }
        }
    }

    #[test]
    fn pair_bookkeeping() {
        let (func, block) = self_multiply(2);
        let align = AlignmentMap::compute(&func, block);
        let mut packs = PackSet::default();
        find_adj_refs(&func, block, &align, &mut packs);
        assert_eq!(packs.len(), 2);

        let loads: Vec<Inst> = func
            .layout
            .block_insts(block)
            .filter(|&i| func.dfg.insts[i].opcode() == Opcode::Load)
            .collect();
        let (l0, l1) = (loads[0], loads[1]);
        assert!(packs.pair_exists(l0, l1));
        assert!(!packs.pair_exists(l1, l0));
        assert!(packs.packed_in_left(l0));
        assert!(!packs.packed_in_left(l1));
        assert!(packs.packed_in_right(l1));

        // Re-adding the same pair is a no-op.
        packs.add_pair(&func, l0, l1);
        assert_eq!(packs.len(), 2);
    }
}
