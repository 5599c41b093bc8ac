use snafu::Snafu;
use veles_ir::{AliasDeclaration, OpId, ValuePath};

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Clone, PartialEq, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    /// Assignment over an empty computation.
    #[snafu(display("computation '{name}' has no operations"))]
    EmptyComputation { name: String },

    /// The caller's execution order lists an operation twice.
    #[snafu(display("operation {op} appears more than once in the execution order"))]
    DuplicateInOrder { op: OpId },

    /// The caller's execution order does not cover an operation.
    #[snafu(display("operation {op} is missing from the execution order"))]
    MissingFromOrder { op: OpId },

    /// An operand is read before its definition in the given order. The order
    /// violates the dependency precondition.
    #[snafu(display("operation {user} at position {position} reads {operand} before it is defined"))]
    UseBeforeDefinition { user: OpId, operand: OpId, position: usize },

    /// An alias declaration names a parameter or position the graph does not
    /// have.
    #[snafu(display("malformed alias declaration {declaration}: {reason}"))]
    MalformedDeclaration { declaration: AliasDeclaration, reason: &'static str },

    /// The declared input and output positions have different byte sizes.
    #[snafu(display(
        "alias declaration {declaration} sizes disagree: parameter has {parameter_bytes} bytes, output has {output_bytes}"
    ))]
    AliasSizeMismatch { declaration: AliasDeclaration, parameter_bytes: usize, output_bytes: usize },

    /// A declared alias forces two values with overlapping live ranges into
    /// one storage region.
    #[snafu(display("alias declaration {declaration} is unsatisfiable: {a} and {b} are live at the same time"))]
    UnsatisfiableAlias { declaration: AliasDeclaration, a: String, b: String },

    /// Query for a position the computation does not produce.
    #[snafu(display("no logical value at {op} position {path}"))]
    UnknownPosition { op: OpId, path: ValuePath },

    /// A completed assignment failed an internal consistency check.
    #[snafu(display("buffer assignment validation failed: {reason}"))]
    ValidationFailed { reason: String },
}
