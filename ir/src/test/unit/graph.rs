//! Tests for computation construction and shape inference.

use veles_dtype::ElementType;

use crate::error::Error;
use crate::graph::Computation;
use crate::op::{BinaryOp, DotDims, Op, OpKind, ReduceOp};
use crate::shape::Shape;

fn f32_array(dims: &[usize]) -> Shape {
    Shape::array(ElementType::F32, dims.iter().copied()).expect("valid shape")
}

#[test]
fn parameters_number_in_insertion_order() {
    let mut comp = Computation::new("params");
    let p0 = comp.parameter(f32_array(&[4]));
    let p1 = comp.parameter(f32_array(&[8]));

    assert_eq!(comp.parameter_id(0), Some(p0));
    assert_eq!(comp.parameter_id(1), Some(p1));
    assert_eq!(comp.parameter_id(2), None);
}

#[test]
fn root_tracks_last_insertion_until_set() {
    let mut comp = Computation::new("root");
    let p0 = comp.parameter(f32_array(&[4]));
    let neg = comp.unary(crate::op::UnaryOp::Neg, p0).unwrap();
    assert_eq!(comp.root(), Some(neg));

    comp.set_root(p0).unwrap();
    assert_eq!(comp.root(), Some(p0));
}

#[test]
fn binary_requires_equal_shapes() {
    let mut comp = Computation::new("bin");
    let p0 = comp.parameter(f32_array(&[4]));
    let p1 = comp.parameter(f32_array(&[8]));

    let err = comp.binary(BinaryOp::Add, p0, p1).unwrap_err();
    assert!(matches!(err, Error::BinaryShapeMismatch { .. }));
}

#[test]
fn all_reduce_single_operand_keeps_shape() {
    let mut comp = Computation::new("ar1");
    let p0 = comp.parameter(f32_array(&[128]));
    let ar = comp.all_reduce([p0], ReduceOp::Sum).unwrap();

    assert_eq!(comp.operation(ar).shape(), &f32_array(&[128]));
    assert_eq!(comp.operation(ar).kind(), OpKind::Collective);
}

#[test]
fn all_reduce_two_operands_produces_tuple() {
    let mut comp = Computation::new("ar2");
    let p0 = comp.parameter(f32_array(&[128]));
    let p1 = comp.parameter(f32_array(&[128]));
    let ar = comp.all_reduce([p0, p1], ReduceOp::Sum).unwrap();

    assert_eq!(comp.operation(ar).shape(), &Shape::tuple(vec![f32_array(&[128]), f32_array(&[128])]));
}

#[test]
fn all_reduce_rejects_shape_mismatch() {
    let mut comp = Computation::new("ar-bad");
    let p0 = comp.parameter(f32_array(&[128]));
    let p1 = comp.parameter(f32_array(&[64]));

    let err = comp.all_reduce([p0, p1], ReduceOp::Sum).unwrap_err();
    assert!(matches!(err, Error::CollectiveShapeMismatch { .. }));
}

#[test]
fn dot_infers_batch_free_layout() {
    let mut comp = Computation::new("dot");
    let p0 = comp.parameter(f32_array(&[11, 22, 33, 44]));
    let p1 = comp.parameter(f32_array(&[11, 22, 33, 44]));

    let mut dims = DotDims::contracting(2, 2);
    dims.lhs_batch = smallvec::smallvec![0, 1];
    dims.rhs_batch = smallvec::smallvec![0, 1];

    let dot = comp.dot(p0, p1, dims).unwrap();
    assert_eq!(comp.operation(dot).shape(), &f32_array(&[11, 22, 44, 44]));
    assert_eq!(comp.operation(dot).kind(), OpKind::Matmul);
}

#[test]
fn dot_rejects_unpaired_batch_dims() {
    let mut comp = Computation::new("dot-bad");
    let p0 = comp.parameter(f32_array(&[4, 8]));
    let p1 = comp.parameter(f32_array(&[4, 8]));

    let mut dims = DotDims::contracting(1, 1);
    dims.lhs_batch = smallvec::smallvec![0];

    let err = comp.dot(p0, p1, dims).unwrap_err();
    assert!(matches!(err, Error::DotPairingMismatch { what: "batch", .. }));
}

#[test]
fn dot_rejects_contracted_size_mismatch() {
    let mut comp = Computation::new("dot-size");
    let p0 = comp.parameter(f32_array(&[4, 8]));
    let p1 = comp.parameter(f32_array(&[16, 4]));

    let err = comp.dot(p0, p1, DotDims::contracting(1, 0)).unwrap_err();
    assert!(matches!(err, Error::DotDimSizeMismatch { .. }));
}

#[test]
fn tuple_and_element_round_trip() {
    let mut comp = Computation::new("tuple");
    let p0 = comp.parameter(f32_array(&[4]));
    let p1 = comp.parameter(f32_array(&[8]));
    let tuple = comp.tuple([p0, p1]).unwrap();
    let second = comp.get_tuple_element(tuple, 1).unwrap();

    assert_eq!(comp.operation(second).shape(), &f32_array(&[8]));
    assert_eq!(comp.operation(second).kind(), OpKind::View);
    assert!(matches!(comp.get_tuple_element(tuple, 2).unwrap_err(), Error::TupleIndexOutOfBounds { .. }));
    assert!(matches!(comp.get_tuple_element(p0, 0).unwrap_err(), Error::TupleRequired { .. }));
}

#[test]
fn bitcast_preserves_byte_size() {
    let mut comp = Computation::new("bitcast");
    let p0 = comp.parameter(f32_array(&[128]));

    let ok = comp.bitcast(p0, Shape::array(ElementType::U32, [128]).unwrap());
    assert!(ok.is_ok());

    let err = comp.bitcast(p0, f32_array(&[64])).unwrap_err();
    assert!(matches!(err, Error::BitcastSizeMismatch { .. }));
}

#[test]
fn reshape_preserves_element_count() {
    let mut comp = Computation::new("reshape");
    let p0 = comp.parameter(f32_array(&[4, 8]));

    let reshaped = comp.reshape(p0, [32]).unwrap();
    assert_eq!(comp.operation(reshaped).shape(), &f32_array(&[32]));
    assert!(matches!(comp.reshape(p0, [31]).unwrap_err(), Error::ReshapeCountMismatch { .. }));
}

#[test]
fn convert_is_elementwise() {
    let mut comp = Computation::new("convert");
    let p0 = comp.parameter(Shape::array(ElementType::S8, [11, 22, 33, 44]).unwrap());
    let converted = comp.convert(p0, ElementType::F16).unwrap();

    let shape = comp.operation(converted).shape();
    assert_eq!(shape.element(), Some(ElementType::F16));
    assert_eq!(shape.dims(), Some(&[11usize, 22, 33, 44][..]));
    assert_eq!(comp.operation(converted).kind(), OpKind::Elementwise);
}

#[test]
fn operands_reported_in_positional_order() {
    let mut comp = Computation::new("operands");
    let p0 = comp.parameter(f32_array(&[4]));
    let p1 = comp.parameter(f32_array(&[4]));
    let add = comp.binary(BinaryOp::Add, p0, p1).unwrap();

    match comp.operation(add).op() {
        Op::Binary { lhs, rhs, .. } => {
            assert_eq!((*lhs, *rhs), (p0, p1));
        }
        other => panic!("expected binary, got {other:?}"),
    }
    assert_eq!(comp.operation(add).op().operands().as_slice(), &[p0, p1]);
}

#[test]
fn execution_order_is_insertion_order() {
    let mut comp = Computation::new("order");
    let p0 = comp.parameter(f32_array(&[4]));
    let neg = comp.unary(crate::op::UnaryOp::Neg, p0).unwrap();

    let order = comp.execution_order();
    assert_eq!(order, vec![p0, neg]);
}
