//! Shared interfaces for the multipole FMM engine.
//!
//! This crate defines the vocabulary the other workspace members agree on:
//! geometry types, the contract a partitioned point-region tree must honour,
//! the operator set a kernel supplies to the solver, and the vtables used to
//! serialise particles and node data for distributed execution.

pub mod fmm;
pub mod parallel;
pub mod tree;
pub mod types;
