//! Superword-level parallelism (SLP) auto-vectorizer.
//!
//! This crate implements a basic-block vectorizer over a small typed SSA
//! intermediate representation. Within a single block it discovers groups of
//! isomorphic, independent scalar instructions ("packs"), seeds them from
//! adjacent memory references, grows them along def-use and use-def chains,
//! schedules them against a pack-level dependency graph, and rewrites the
//! block with vector instructions plus the scalar-to-vector and
//! vector-to-scalar adapters the surrounding code needs.
//!
//! The [`ir`] module provides the IR itself; [`slp`] is the transformation
//! pass. Entry point: [`slp::do_slp`].

#![warn(missing_docs)]

/// Re-export of `cranelift-entity`, the entity-reference arena toolkit the IR
/// is built on.
pub use cranelift_entity as entity;

pub mod cursor;
pub mod inst_predicates;
pub mod ir;
pub mod slp;

mod fx;
