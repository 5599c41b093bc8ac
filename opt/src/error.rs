use snafu::Snafu;
use veles_ir::OpId;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Clone, PartialEq, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    /// Canonicalization asked about an operation that is not a dot.
    #[snafu(display("operation {op} is not a dot"))]
    NotADot { op: OpId },
}
