//! Common imports for building and inspecting computations.
//!
//! ```rust,ignore
//! use veles_ir::prelude::*;
//! ```

pub use crate::alias::{AliasConfig, AliasDeclaration, AliasKind};
pub use crate::graph::{Computation, OpId, Operation};
pub use crate::op::{BinaryOp, DotDims, Op, OpKind, ReduceOp, UnaryOp};
pub use crate::shape::{Shape, ValuePath};

pub use veles_dtype::ElementType;
