//! Operation enum and in-place eligibility classification.
//!
//! [`Op`] encodes each operation's operand structure directly in its variant,
//! mirroring the computation DAG. [`OpKind`] collapses the variants into the
//! coarse classes the allocator cares about: whether an operation may
//! overwrite an operand, forwards storage, or must never be touched.

use smallvec::SmallVec;
use veles_dtype::ElementType;

use crate::graph::OpId;

/// Elementwise unary operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    Neg,
    Abs,
    Exp,
    Sqrt,
}

/// Elementwise binary operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Max,
    Min,
}

/// Reduction applied across replicas by a collective.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReduceOp {
    Sum,
    Prod,
    Max,
    Min,
}

/// Batch and contracting dimension lists of a dot operation.
///
/// Batch lists pair positionally (`lhs_batch[i]` runs with `rhs_batch[i]`),
/// as do contracting lists. The lists are metadata over operand dimensions;
/// reordering them never moves data.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct DotDims {
    pub lhs_batch: SmallVec<[usize; 2]>,
    pub lhs_contracting: SmallVec<[usize; 2]>,
    pub rhs_batch: SmallVec<[usize; 2]>,
    pub rhs_contracting: SmallVec<[usize; 2]>,
}

impl DotDims {
    /// Plain matrix multiply dims: contract `lhs_contracting` with
    /// `rhs_contracting`, no batching.
    pub fn contracting(lhs: usize, rhs: usize) -> Self {
        Self {
            lhs_batch: SmallVec::new(),
            lhs_contracting: smallvec::smallvec![lhs],
            rhs_batch: SmallVec::new(),
            rhs_contracting: smallvec::smallvec![rhs],
        }
    }

    /// Dimensions of the lhs that are neither batch nor contracting.
    pub fn lhs_free(&self, rank: usize) -> SmallVec<[usize; 2]> {
        (0..rank).filter(|d| !self.lhs_batch.contains(d) && !self.lhs_contracting.contains(d)).collect()
    }

    /// Dimensions of the rhs that are neither batch nor contracting.
    pub fn rhs_free(&self, rank: usize) -> SmallVec<[usize; 2]> {
        (0..rank).filter(|d| !self.rhs_batch.contains(d) && !self.rhs_contracting.contains(d)).collect()
    }
}

/// Operation with typed operands.
///
/// Operands are [`OpId`]s into the owning computation, always referring to
/// earlier operations, so the operation list is a valid topological order by
/// construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Op {
    /// Entry parameter of the computation.
    Parameter { index: usize },

    Unary { op: UnaryOp, input: OpId },
    Binary { op: BinaryOp, lhs: OpId, rhs: OpId },

    /// Elementwise element-type conversion.
    Convert { input: OpId, element: ElementType },

    /// Replica-synchronized reduction. One operand produces the operand's
    /// shape; several same-shaped operands produce a tuple with one result
    /// position per operand, in operand order.
    AllReduce { inputs: SmallVec<[OpId; 2]>, reduce: ReduceOp },

    /// Matrix-multiply-like contraction.
    Dot { lhs: OpId, rhs: OpId, dims: DotDims },

    Tuple { elements: SmallVec<[OpId; 4]> },
    GetTupleElement { input: OpId, index: usize },

    /// Type-punning view; total byte size is unchanged.
    Bitcast { input: OpId },
    /// Dimension-regrouping view; element type and count are unchanged.
    Reshape { input: OpId },
}

/// Coarse operation class used for in-place eligibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::AsRefStr)]
pub enum OpKind {
    Parameter,
    Elementwise,
    Collective,
    Matmul,
    /// No-cost storage forwarding (bitcast, reshape, tuple-element).
    View,
    Tuple,
}

impl OpKind {
    /// Whether results of this kind may overwrite an operand that dies at the
    /// defining position.
    pub fn overwrites_operand(self) -> bool {
        matches!(self, Self::Elementwise | Self::Collective)
    }
}

impl std::fmt::Display for OpKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_ref())
    }
}

impl Op {
    pub fn kind(&self) -> OpKind {
        match self {
            Self::Parameter { .. } => OpKind::Parameter,
            Self::Unary { .. } | Self::Binary { .. } | Self::Convert { .. } => OpKind::Elementwise,
            Self::AllReduce { .. } => OpKind::Collective,
            Self::Dot { .. } => OpKind::Matmul,
            Self::GetTupleElement { .. } | Self::Bitcast { .. } | Self::Reshape { .. } => OpKind::View,
            Self::Tuple { .. } => OpKind::Tuple,
        }
    }

    /// Operand references in positional order.
    pub fn operands(&self) -> SmallVec<[OpId; 2]> {
        match self {
            Self::Parameter { .. } => SmallVec::new(),
            Self::Unary { input, .. } | Self::Convert { input, .. } => smallvec::smallvec![*input],
            Self::Binary { lhs, rhs, .. } | Self::Dot { lhs, rhs, .. } => smallvec::smallvec![*lhs, *rhs],
            Self::AllReduce { inputs, .. } => inputs.clone(),
            Self::Tuple { elements } => elements.iter().copied().collect(),
            Self::GetTupleElement { input, .. } | Self::Bitcast { input } | Self::Reshape { input } => {
                smallvec::smallvec![*input]
            }
        }
    }
}
