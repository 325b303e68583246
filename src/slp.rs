//! Superword-level parallelism: a basic-block auto-vectorizer.
//!
//! The pass looks for groups of isomorphic, independent scalar instructions
//! within one basic block that can be replaced by a single vector
//! instruction. Discovery is seeded from loads and stores of adjacent array
//! elements, then grown along the use-def and def-use chains; chained pairs
//! are combined into wider packs; a pack-level dependency graph is ordered
//! topologically; and finally every pack is rewritten into a vector
//! instruction with scalar-to-vector (prepack) and vector-to-scalar
//! (postpack) adapters where the surrounding scalar code needs them.
//!
//! Everything is best-effort per block and total across the function: a
//! block whose packs cannot be scheduled is left exactly as it was found,
//! and the next block is tried. Diagnostics go to `log` at trace level.

mod align;
mod codegen;
mod pack;
mod schedule;

use log::trace;

use crate::entity::SecondaryMap;
use crate::ir::{Block, Function, Inst};

pub use crate::slp::align::{AlignInfo, AlignmentMap};
pub use crate::slp::pack::{Pack, PackSet};

/// Apply superword-level parallelism to every block of `func`.
///
/// Returns whether any block was changed. The control flow graph is
/// preserved: blocks are never created, split, or removed.
pub fn do_slp(func: &mut Function) -> bool {
    let mut changed = false;
    let blocks: Vec<Block> = func.layout.blocks().collect();
    for block in blocks {
        changed |= vectorize_block(func, block);
    }
    changed
}

/// Vectorize one block. All per-block state lives and dies here.
fn vectorize_block(func: &mut Function, block: Block) -> bool {
    let mut align = AlignmentMap::compute(func, block);
    let positions = block_positions(func, block);

    let mut packs = PackSet::default();
    pack::find_adj_refs(func, block, &align, &mut packs);
    if packs.is_empty() {
        trace!("{}: no adjacent memory references", block);
        return false;
    }
    pack::extend_packlist(func, block, &mut align, &mut packs, &positions);
    let mut packs = pack::combine_packs(func, packs);

    let deps = schedule::build_dependencies(func, &packs, &align, &positions);
    let Some(order) = schedule::topological_order(&packs, &deps) else {
        trace!("{}: pack dependencies are cyclic; leaving block unchanged", block);
        return false;
    };
    if !schedule::validate_placement(func, block, &packs, &deps, &positions) {
        trace!("{}: vector placement is infeasible; leaving block unchanged", block);
        return false;
    }

    codegen::emit(func, &mut packs, &order, &deps)
}

/// Layout positions of the instructions of `block`, used for deterministic
/// tie-breaks and placement checks. Computed once per block, before any
/// mutation.
pub(crate) fn block_positions(func: &Function, block: Block) -> SecondaryMap<Inst, u32> {
    let mut positions = SecondaryMap::new();
    for (i, inst) in func.layout.block_insts(block).enumerate() {
        positions[inst] = i as u32;
    }
    positions
}
