use smallvec::SmallVec;
use snafu::Snafu;
use veles_dtype::ElementType;

use crate::op::BinaryOp;
use crate::shape::Shape;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Clone, PartialEq, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    /// An operand id does not refer to an earlier operation of this computation.
    #[snafu(display("operand #{operand} out of range: computation has {len} operations"))]
    OperandOutOfRange { operand: usize, len: usize },

    /// Shapes of a binary operation disagree.
    #[snafu(display("shape mismatch in {op:?}: {lhs} vs {rhs}"))]
    BinaryShapeMismatch { op: BinaryOp, lhs: Box<Shape>, rhs: Box<Shape> },

    /// Element types of two array operands disagree.
    #[snafu(display("element type mismatch: {lhs} vs {rhs}"))]
    ElementTypeMismatch { lhs: ElementType, rhs: ElementType },

    /// An array-shaped operand was required.
    #[snafu(display("array shape required, got {got}"))]
    ArrayRequired { got: Box<Shape> },

    /// A tuple-shaped operand was required.
    #[snafu(display("tuple shape required, got {got}"))]
    TupleRequired { got: Box<Shape> },

    /// Tuple element index past the end of the tuple.
    #[snafu(display("tuple index {index} out of bounds for tuple of {len} elements"))]
    TupleIndexOutOfBounds { index: usize, len: usize },

    /// Variadic operation invoked without operands.
    #[snafu(display("{operation} requires at least one operand"))]
    EmptyOperandList { operation: &'static str },

    /// Collective operands must all carry one shape.
    #[snafu(display("collective operand shapes differ: {first} vs {other}"))]
    CollectiveShapeMismatch { first: Box<Shape>, other: Box<Shape> },

    /// Bitcast must preserve the total byte size.
    #[snafu(display("bitcast changes byte size: {input_bytes} -> {output_bytes}"))]
    BitcastSizeMismatch { input_bytes: usize, output_bytes: usize },

    /// Reshape must preserve the element count.
    #[snafu(display("reshape changes element count: {input_elements} -> {output_elements}"))]
    ReshapeCountMismatch { input_elements: usize, output_elements: usize },

    /// Dot dimension index past the operand rank.
    #[snafu(display("dot {side} dimension {dim} out of range for rank {rank}"))]
    DotDimOutOfRange { side: &'static str, dim: usize, rank: usize },

    /// Dot dimension listed twice for one operand.
    #[snafu(display("dot {side} dimension {dim} listed more than once"))]
    DotDuplicateDim { side: &'static str, dim: usize },

    /// Batch/contracting lists pair positionally and must have equal length.
    #[snafu(display("dot {what} dimension lists have mismatched lengths: lhs {lhs_len} vs rhs {rhs_len}"))]
    DotPairingMismatch { what: &'static str, lhs_len: usize, rhs_len: usize },

    /// Paired dot dimensions must have equal extents.
    #[snafu(display(
        "dot {what} dimension size mismatch: lhs dim {lhs_dim} has size {lhs_size}, rhs dim {rhs_dim} has size {rhs_size}"
    ))]
    DotDimSizeMismatch { what: &'static str, lhs_dim: usize, rhs_dim: usize, lhs_size: usize, rhs_size: usize },

    /// Zero-sized dimensions are rejected at construction.
    #[snafu(display("shape contains a zero dimension: {dims:?}"))]
    ZeroDimension { dims: SmallVec<[usize; 4]> },
}
