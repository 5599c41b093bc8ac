//! Buffer assignment for veles computations.
//!
//! Given a read-only dataflow graph and its input/output alias declarations,
//! this crate decides how logical values pack into physical storage regions
//! and whether operations can execute in place over an operand's buffer.
//!
//! # Module Organization
//!
//! - [`value`] - Logical value enumeration and pass-through forwarding
//! - [`union`] - Union-find over values (equivalence classes)
//! - [`liveness`] - Live ranges over a fixed execution order
//! - [`collective`] - Resolution of declared input/output aliases
//! - [`assignment`] - The allocator, result mapping, and query surface
//! - [`error`] - Error types and result handling
//!
//! # Pipeline
//!
//! ```text
//! Computation + AliasConfig
//!     ↓
//! ValueTable::build          → logical values, view forwards
//!     ↓
//! liveness::compute          → live range per value
//!     ↓
//! seed_declared_aliases      → forced unions (fatal if unsatisfiable)
//!     ↓
//! BufferAssignment::run      → coalescing + region layout
//! ```
//!
//! Assignment is a single pass per computation with no shared mutable state;
//! independent computations may be assigned concurrently by the caller.

pub mod assignment;
pub mod collective;
pub mod error;
pub mod liveness;
pub mod union;
pub mod value;

#[cfg(test)]
pub mod test;

pub use assignment::{Allocation, AllocationId, AssignmentStats, BufferAssignment, BufferSlice};
pub use error::{Error, Result};
pub use liveness::{LiveRange, Liveness};
pub use union::UnionFind;
pub use value::{LogicalValue, ValueId, ValueTable};
