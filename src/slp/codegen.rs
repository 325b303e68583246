//! Vector code generation for scheduled packs.
//!
//! Each scheduled pack is replaced by one vector instruction, emitted just
//! before the pack's last element. Operand vectors are reused from upstream
//! packs when every lane matches, and otherwise assembled by a *prepack*: a
//! zero vector filled lane by lane with inserts. Scalar users outside any
//! pack keep working through *postpack* lane extracts. Once every pack is
//! emitted, the superseded scalar instructions are erased.

use log::trace;
use smallvec::SmallVec;

use crate::cursor::{Cursor, FuncCursor};
use crate::fx::FxHashMap;
use crate::ir::instructions::InstructionData;
use crate::ir::{types, Function, Inst, InstBuilder, Opcode, Type, Value};
use crate::slp::pack::{Pack, PackSet};
use crate::slp::schedule::{pack_members, DependencyMap};

/// Result of dispatching one pack.
enum Emitted {
    /// A vector value was produced.
    Value(Value),
    /// A vector store was emitted; stores produce no value.
    Store,
    /// The pack could not be emitted and was left alone.
    Skipped,
}

/// Emit vector code for every scheduled pack, then erase the superseded
/// scalars. Returns whether the block changed.
pub fn emit(
    func: &mut Function,
    packs: &mut PackSet,
    order: &[usize],
    deps: &DependencyMap,
) -> bool {
    let members = pack_members(packs);
    // Which packs will materialize. Dispatch is opcode-determined, so this is
    // known up front; postpack uses it to decide which users still need a
    // scalar lane.
    let will_emit: Vec<bool> = packs
        .iter()
        .map(|pack| {
            let opcode = func.dfg.insts[pack.first()].opcode();
            dispatchable(opcode) && pack_lane_type(func, pack).by(pack.len() as u16).is_some()
        })
        .collect();

    let mut emitted = vec![false; packs.len()];
    for &p in order {
        match emit_pack(func, packs, p, &members) {
            Emitted::Value(value) => {
                packs.get_mut(p).set_value(value);
                emitted[p] = true;
            }
            Emitted::Store => emitted[p] = true,
            Emitted::Skipped => continue,
        }
        postpack(func, packs, p, &members, &will_emit);
    }

    // Erase superseded scalars. A store pack with no dependencies consumes
    // nothing any pack produced; it is opportunistic, and its scalar stores
    // are retained next to the vector store.
    let mut doomed: Vec<Inst> = Vec::new();
    for &p in order {
        if !emitted[p] {
            continue;
        }
        let pack = packs.get(p);
        if func.dfg.insts[pack.first()].opcode().can_store() && deps[p].is_empty() {
            trace!("[codegen] retaining scalar stores of dependency-free pack {}", p);
            continue;
        }
        doomed.extend_from_slice(pack.elems());
    }
    for &s in &doomed {
        func.dfg.detach_inst(s);
        func.layout.remove_inst(s);
    }
    #[cfg(debug_assertions)]
    for &s in &doomed {
        if let Some(result) = func.dfg.inst_result(s) {
            debug_assert!(
                func.dfg.value_uses(result).is_empty(),
                "erased scalar {} still has users",
                result
            );
        }
    }

    emitted.iter().any(|&e| e)
}

fn dispatchable(opcode: Opcode) -> bool {
    opcode.can_load() || opcode.can_store() || opcode.is_binary_arith() || opcode == Opcode::Call
}

/// The scalar lane type of a pack: the stored type for stores, the result
/// type otherwise.
fn pack_lane_type(func: &Function, pack: &Pack) -> Type {
    let first = pack.first();
    if func.dfg.insts[first].opcode().can_store() {
        func.dfg.value_type(func.dfg.inst_args(first)[0])
    } else {
        match func.dfg.inst_result(first) {
            Some(result) => func.dfg.value_type(result),
            None => types::INVALID,
        }
    }
}

fn emit_pack(
    func: &mut Function,
    packs: &PackSet,
    p: usize,
    members: &FxHashMap<Inst, usize>,
) -> Emitted {
    let pack = packs.get(p);
    let first = pack.first();
    let last = pack.last();
    let opcode = func.dfg.insts[first].opcode();
    let lane_ty = pack_lane_type(func, pack);
    let Some(vec_ty) = lane_ty.by(pack.len() as u16) else {
        trace!("[codegen] no vector type {} x {}; skipping pack {}", lane_ty, pack.len(), p);
        return Emitted::Skipped;
    };

    match opcode {
        Opcode::Load => {
            let addr = func.dfg.inst_args(first)[0];
            let mut pos = FuncCursor::new(func).at_inst(last);
            let vec_ptr = pos.ins().bitcast(types::PTR, addr);
            let value = pos.ins().load(vec_ty, vec_ptr);
            let inst = pos.func.dfg.value_def(value).inst().expect("load result");
            trace!("[codegen] {}", pos.func.dfg.display_inst(inst));
            Emitted::Value(value)
        }
        Opcode::Store => {
            let addr = func.dfg.inst_args(first)[1];
            let mut pos = FuncCursor::new(func).at_inst(last);
            let data = operand_vec(&mut pos, packs, p, 0, members, vec_ty);
            let vec_ptr = pos.ins().bitcast(types::PTR, addr);
            let inst = pos.ins().store(data, vec_ptr);
            trace!("[codegen] {}", pos.func.dfg.display_inst(inst));
            Emitted::Store
        }
        op if op.is_binary_arith() => {
            let mut pos = FuncCursor::new(func).at_inst(last);
            let x = operand_vec(&mut pos, packs, p, 0, members, vec_ty);
            let y = operand_vec(&mut pos, packs, p, 1, members, vec_ty);
            let value = pos.ins().binary(op, x, y);
            let inst = pos.func.dfg.value_def(value).inst().expect("binary result");
            trace!("[codegen] {}", pos.func.dfg.display_inst(inst));
            Emitted::Value(value)
        }
        Opcode::Call => {
            let intrinsic = match func.dfg.insts[first] {
                InstructionData::Call { intrinsic, .. } => intrinsic,
                _ => unreachable!("call opcode with non-call data"),
            };
            let mut pos = FuncCursor::new(func).at_inst(last);
            let mut args: SmallVec<[Value; 3]> = SmallVec::new();
            for j in 0..intrinsic.num_args() {
                args.push(operand_vec(&mut pos, packs, p, j, members, vec_ty));
            }
            let value = pos.ins().call(vec_ty, intrinsic, &args);
            let inst = pos.func.dfg.value_def(value).inst().expect("call result");
            trace!("[codegen] {}", pos.func.dfg.display_inst(inst));
            Emitted::Value(value)
        }
        _ => {
            trace!("[codegen] unsupported opcode {} in pack {}; skipping", opcode, p);
            Emitted::Skipped
        }
    }
}

/// The pack producing `v`, if any.
fn upstream_pack(func: &Function, members: &FxHashMap<Inst, usize>, v: Value) -> Option<usize> {
    let def = func.dfg.value_def(v).inst()?;
    members.get(&def).copied()
}

/// Assemble the `j`-th operand vector of pack `p`.
///
/// When every lane's operand is exactly the corresponding lane of one
/// upstream pack with a materialized vector, that vector is reused directly.
/// Otherwise a prepack is emitted for this consumer: a zero vector filled
/// lane by lane, where lanes produced by packs come in through an extract and
/// everything else (live-ins, constants, unpacked scalars) is inserted as is.
fn operand_vec(
    pos: &mut FuncCursor,
    packs: &PackSet,
    p: usize,
    j: usize,
    members: &FxHashMap<Inst, usize>,
    vec_ty: Type,
) -> Value {
    let pack = packs.get(p);
    let defs: SmallVec<[Value; 8]> = pack
        .elems()
        .iter()
        .map(|&s| pos.func.dfg.inst_args(s)[j])
        .collect();

    if let Some(q) = upstream_pack(pos.func, members, defs[0]) {
        let upstream = packs.get(q);
        if upstream.len() == pack.len() && upstream.value().is_some() {
            let lane_for_lane = defs.iter().enumerate().all(|(lane, &d)| {
                pos.func.dfg.value_def(d).inst() == Some(upstream.elems()[lane])
            });
            if lane_for_lane {
                return upstream.value().expect("checked above");
            }
        }
    }

    trace!("[prepack] pack {} operand {}", p, j);
    let mut vec = pos.ins().vconst(vec_ty);
    for (lane, &d) in defs.iter().enumerate() {
        let scalar = match upstream_pack(pos.func, members, d) {
            Some(q) if packs.get(q).value().is_some() => {
                let upstream = packs.get(q);
                let def = pos.func.dfg.value_def(d).inst().expect("packed def");
                let idx = upstream.lane_of(def).expect("member of its own pack");
                pos.ins()
                    .extractlane(upstream.value().expect("checked above"), idx as u8)
            }
            _ => d,
        };
        vec = pos.ins().insertlane(vec, scalar, lane as u8);
    }
    vec
}

/// Reconnect scalar users of the elements of pack `p` through lane extracts.
///
/// Users that are themselves in a materializing pack are served by that
/// pack's operand vectors and need nothing here. One extract is created per
/// used lane, right after the vector instruction.
fn postpack(
    func: &mut Function,
    packs: &PackSet,
    p: usize,
    members: &FxHashMap<Inst, usize>,
    will_emit: &[bool],
) {
    let pack = packs.get(p);
    let Some(vec_val) = pack.value() else {
        return;
    };
    let last = pack.last();
    for (lane, &s) in pack.elems().iter().enumerate() {
        let Some(result) = func.dfg.inst_result(s) else {
            continue;
        };
        let mut users: SmallVec<[Inst; 4]> = func
            .dfg
            .value_uses(result)
            .iter()
            .copied()
            .filter(|u| !members.get(u).map_or(false, |&q| will_emit[q]))
            .collect();
        users.dedup();
        if users.is_empty() {
            continue;
        }
        let extract = {
            let mut pos = FuncCursor::new(func).at_inst(last);
            pos.ins().extractlane(vec_val, lane as u8)
        };
        for user in users {
            trace!(
                "[postpack] lane {} of pack {} now feeds ({})",
                lane,
                p,
                func.dfg.display_inst(user)
            );
            func.dfg.replace_uses_of_in(user, result, extract);
        }
    }
}
