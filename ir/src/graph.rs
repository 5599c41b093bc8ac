//! Computation graph construction and shape inference.
//!
//! A [`Computation`] owns its operations in insertion order. Builder methods
//! validate operand references and shapes as operations are added, so every
//! stored graph is well formed and the operation list itself is a valid
//! topological execution order.

use smallvec::SmallVec;
use snafu::ensure;
use veles_dtype::ElementType;

use crate::alias::{AliasConfig, AliasDeclaration};
use crate::error::*;
use crate::op::{BinaryOp, DotDims, Op, OpKind, ReduceOp, UnaryOp};
use crate::shape::{Shape, ValuePath};

/// Index of an operation within its computation.
///
/// Ids are minted by the owning [`Computation`] and are only meaningful there.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OpId(u32);

impl OpId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl std::fmt::Display for OpId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Operation node: the op itself plus its inferred result shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operation {
    op: Op,
    shape: Shape,
}

impl Operation {
    pub fn op(&self) -> &Op {
        &self.op
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub fn kind(&self) -> OpKind {
        self.op.kind()
    }
}

/// A dataflow graph plus its module-level aliasing contracts.
#[derive(Debug, Clone, Default)]
pub struct Computation {
    name: String,
    ops: Vec<Operation>,
    /// Designated output. Tracks the last inserted operation unless set
    /// explicitly.
    root: Option<OpId>,
    aliases: AliasConfig,
}

impl Computation {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), ops: Vec::new(), root: None, aliases: AliasConfig::default() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// The designated output operation, `None` only for an empty graph.
    pub fn root(&self) -> Option<OpId> {
        self.root
    }

    /// Operation at `id`. Ids must originate from this computation.
    pub fn operation(&self, id: OpId) -> &Operation {
        &self.ops[id.index()]
    }

    pub fn ops(&self) -> impl Iterator<Item = (OpId, &Operation)> {
        self.ops.iter().enumerate().map(|(i, op)| (OpId(i as u32), op))
    }

    /// Insertion order, which is topological by construction.
    pub fn execution_order(&self) -> Vec<OpId> {
        (0..self.ops.len() as u32).map(OpId).collect()
    }

    /// Entry parameter with the given number, if any.
    pub fn parameter_id(&self, index: usize) -> Option<OpId> {
        self.ops().find_map(|(id, operation)| match operation.op() {
            Op::Parameter { index: i } if *i == index => Some(id),
            _ => None,
        })
    }

    pub fn alias_config(&self) -> &AliasConfig {
        &self.aliases
    }

    /// Record an input/output aliasing contract. Declarations are validated
    /// against the graph when buffer assignment resolves them.
    pub fn declare_alias(&mut self, declaration: AliasDeclaration) {
        self.aliases.push(declaration);
    }

    /// Redirect the designated output.
    ///
    /// # Errors
    /// `id` must refer to an operation of this computation.
    pub fn set_root(&mut self, id: OpId) -> Result<()> {
        ensure!(id.index() < self.ops.len(), OperandOutOfRangeSnafu { operand: id.index(), len: self.ops.len() });
        self.root = Some(id);
        Ok(())
    }

    // =========================================================================
    // Builder methods
    // =========================================================================

    /// Add an entry parameter. Parameter numbers are assigned in insertion
    /// order, starting at zero.
    pub fn parameter(&mut self, shape: Shape) -> OpId {
        let index = self.ops.iter().filter(|o| matches!(o.op(), Op::Parameter { .. })).count();
        self.push(Op::Parameter { index }, shape)
    }

    pub fn unary(&mut self, op: UnaryOp, input: OpId) -> Result<OpId> {
        let shape = self.array_shape(input)?.clone();
        Ok(self.push(Op::Unary { op, input }, shape))
    }

    /// Elementwise binary operation over equal shapes. Broadcasting is the
    /// front end's concern, not the graph's.
    pub fn binary(&mut self, op: BinaryOp, lhs: OpId, rhs: OpId) -> Result<OpId> {
        let lhs_shape = self.array_shape(lhs)?.clone();
        let rhs_shape = self.array_shape(rhs)?;
        ensure!(
            lhs_shape == *rhs_shape,
            BinaryShapeMismatchSnafu { op, lhs: Box::new(lhs_shape.clone()), rhs: Box::new(rhs_shape.clone()) }
        );
        Ok(self.push(Op::Binary { op, lhs, rhs }, lhs_shape))
    }

    /// Elementwise conversion to another element type.
    pub fn convert(&mut self, input: OpId, element: ElementType) -> Result<OpId> {
        let shape = self.array_shape(input)?;
        let dims: SmallVec<[usize; 4]> = shape.dims().unwrap_or_default().iter().copied().collect();
        Ok(self.push(Op::Convert { input, element }, Shape::Array { element, dims }))
    }

    /// Replica-synchronized all-reduce over one or more same-shaped operands.
    ///
    /// One operand yields the operand's shape; several yield a tuple with one
    /// result position per operand, in operand order.
    pub fn all_reduce(&mut self, inputs: impl IntoIterator<Item = OpId>, reduce: ReduceOp) -> Result<OpId> {
        let inputs: SmallVec<[OpId; 2]> = inputs.into_iter().collect();
        ensure!(!inputs.is_empty(), EmptyOperandListSnafu { operation: "all-reduce" });

        let first = self.array_shape(inputs[0])?.clone();
        for &input in &inputs[1..] {
            let other = self.array_shape(input)?;
            ensure!(
                first == *other,
                CollectiveShapeMismatchSnafu { first: Box::new(first.clone()), other: Box::new(other.clone()) }
            );
        }

        let shape = if inputs.len() == 1 {
            first
        } else {
            Shape::tuple(inputs.iter().map(|_| first.clone()).collect())
        };
        Ok(self.push(Op::AllReduce { inputs, reduce }, shape))
    }

    /// Matrix-multiply-like contraction with explicit batch and contracting
    /// dimension lists.
    pub fn dot(&mut self, lhs: OpId, rhs: OpId, dims: DotDims) -> Result<OpId> {
        let lhs_shape = self.array_shape(lhs)?.clone();
        let rhs_shape = self.array_shape(rhs)?.clone();

        let lhs_element = lhs_shape.element().unwrap_or(ElementType::F32);
        let rhs_element = rhs_shape.element().unwrap_or(ElementType::F32);
        ensure!(lhs_element == rhs_element, ElementTypeMismatchSnafu { lhs: lhs_element, rhs: rhs_element });

        let lhs_dims = lhs_shape.dims().unwrap_or_default();
        let rhs_dims = rhs_shape.dims().unwrap_or_default();
        validate_dot_side("lhs batch", "lhs contracting", &dims.lhs_batch, &dims.lhs_contracting, lhs_dims.len())?;
        validate_dot_side("rhs batch", "rhs contracting", &dims.rhs_batch, &dims.rhs_contracting, rhs_dims.len())?;

        ensure!(
            dims.lhs_batch.len() == dims.rhs_batch.len(),
            DotPairingMismatchSnafu { what: "batch", lhs_len: dims.lhs_batch.len(), rhs_len: dims.rhs_batch.len() }
        );
        ensure!(
            dims.lhs_contracting.len() == dims.rhs_contracting.len(),
            DotPairingMismatchSnafu {
                what: "contracting",
                lhs_len: dims.lhs_contracting.len(),
                rhs_len: dims.rhs_contracting.len(),
            }
        );

        for (what, lhs_list, rhs_list) in [
            ("batch", &dims.lhs_batch, &dims.rhs_batch),
            ("contracting", &dims.lhs_contracting, &dims.rhs_contracting),
        ] {
            for (&ld, &rd) in lhs_list.iter().zip(rhs_list) {
                ensure!(
                    lhs_dims[ld] == rhs_dims[rd],
                    DotDimSizeMismatchSnafu {
                        what,
                        lhs_dim: ld,
                        rhs_dim: rd,
                        lhs_size: lhs_dims[ld],
                        rhs_size: rhs_dims[rd],
                    }
                );
            }
        }

        // Result dims: batch (in lhs list order), then lhs free, then rhs free.
        let mut out: SmallVec<[usize; 4]> = dims.lhs_batch.iter().map(|&d| lhs_dims[d]).collect();
        out.extend(dims.lhs_free(lhs_dims.len()).iter().map(|&d| lhs_dims[d]));
        out.extend(dims.rhs_free(rhs_dims.len()).iter().map(|&d| rhs_dims[d]));

        let shape = Shape::Array { element: lhs_element, dims: out };
        Ok(self.push(Op::Dot { lhs, rhs, dims }, shape))
    }

    pub fn tuple(&mut self, elements: impl IntoIterator<Item = OpId>) -> Result<OpId> {
        let elements: SmallVec<[OpId; 4]> = elements.into_iter().collect();
        let shapes = elements.iter().map(|&e| Ok(self.shape_of(e)?.clone())).collect::<Result<Vec<_>>>()?;
        Ok(self.push(Op::Tuple { elements }, Shape::tuple(shapes)))
    }

    pub fn get_tuple_element(&mut self, input: OpId, index: usize) -> Result<OpId> {
        let shape = self.shape_of(input)?;
        let Shape::Tuple(elements) = shape else {
            return TupleRequiredSnafu { got: Box::new(shape.clone()) }.fail();
        };
        let element =
            elements.get(index).ok_or_else(|| TupleIndexOutOfBoundsSnafu { index, len: elements.len() }.build())?;
        let element = element.clone();
        Ok(self.push(Op::GetTupleElement { input, index }, element))
    }

    /// Type-punning view of `input` as `shape`. Total byte size must match.
    pub fn bitcast(&mut self, input: OpId, shape: Shape) -> Result<OpId> {
        let input_bytes = self.array_shape(input)?.byte_size().unwrap_or(0);
        let output_bytes = match shape.byte_size() {
            Some(bytes) => bytes,
            None => return ArrayRequiredSnafu { got: Box::new(shape) }.fail(),
        };
        ensure!(input_bytes == output_bytes, BitcastSizeMismatchSnafu { input_bytes, output_bytes });
        Ok(self.push(Op::Bitcast { input }, shape))
    }

    /// Dimension-regrouping view of `input`. Element type and count are
    /// unchanged.
    pub fn reshape(&mut self, input: OpId, dims: impl IntoIterator<Item = usize>) -> Result<OpId> {
        let input_shape = self.array_shape(input)?;
        let element = input_shape.element().unwrap_or(ElementType::F32);
        let input_elements = input_shape.element_count().unwrap_or(0);
        let shape = Shape::array(element, dims)?;
        let output_elements = shape.element_count().unwrap_or(0);
        ensure!(input_elements == output_elements, ReshapeCountMismatchSnafu { input_elements, output_elements });
        Ok(self.push(Op::Reshape { input }, shape))
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn push(&mut self, op: Op, shape: Shape) -> OpId {
        let id = OpId(self.ops.len() as u32);
        self.ops.push(Operation { op, shape });
        self.root = Some(id);
        id
    }

    fn shape_of(&self, id: OpId) -> Result<&Shape> {
        ensure!(id.index() < self.ops.len(), OperandOutOfRangeSnafu { operand: id.index(), len: self.ops.len() });
        Ok(self.ops[id.index()].shape())
    }

    fn array_shape(&self, id: OpId) -> Result<&Shape> {
        let shape = self.shape_of(id)?;
        ensure!(shape.is_array(), ArrayRequiredSnafu { got: Box::new(shape.clone()) });
        Ok(shape)
    }
}

fn validate_dot_side(
    batch_name: &'static str,
    contracting_name: &'static str,
    batch: &[usize],
    contracting: &[usize],
    rank: usize,
) -> Result<()> {
    for (list, name) in [(batch, batch_name), (contracting, contracting_name)] {
        for (i, &dim) in list.iter().enumerate() {
            ensure!(dim < rank, DotDimOutOfRangeSnafu { side: name, dim, rank });
            ensure!(!list[..i].contains(&dim), DotDuplicateDimSnafu { side: name, dim });
        }
    }
    // A dimension cannot be both batch and contracting.
    for &dim in batch {
        ensure!(!contracting.contains(&dim), DotDuplicateDimSnafu { side: batch_name, dim });
    }
    Ok(())
}
