//! Tests for declared input/output alias resolution.

use test_case::test_case;
use veles_ir::{AliasDeclaration, AliasKind, Computation, ReduceOp, UnaryOp, ValuePath};

use crate::assignment::BufferAssignment;
use crate::error::Error;
use crate::test::helpers::{f32_vec, single_operand_all_reduce, two_operand_all_reduce};

#[test_case(AliasKind::May; "may alias")]
#[test_case(AliasKind::Must; "must alias")]
fn all_reduce_performed_in_place(kind: AliasKind) {
    let comp = single_operand_all_reduce(kind);
    let assignment = BufferAssignment::run(&comp).unwrap();

    let root = comp.root().unwrap();
    let param0 = comp.parameter_id(0).unwrap();
    assert!(assignment.shares_top_level_slice(root, param0));
    assignment.validate(&comp).unwrap();
}

#[test_case(AliasKind::May; "may alias")]
#[test_case(AliasKind::Must; "must alias")]
fn all_reduce_performed_in_place_two_operands(kind: AliasKind) {
    let comp = two_operand_all_reduce(kind);
    let assignment = BufferAssignment::run(&comp).unwrap();

    let root = comp.root().unwrap();
    let param0 = comp.parameter_id(0).unwrap();
    let param1 = comp.parameter_id(1).unwrap();

    assert!(assignment.shares_slice(root, &ValuePath::from([0]), param0, &ValuePath::root()));
    assert!(assignment.shares_slice(root, &ValuePath::from([1]), param1, &ValuePath::root()));

    // Each pair aliases independently; there is no cross-aliasing.
    assert!(!assignment.shares_slice(root, &ValuePath::from([0]), param1, &ValuePath::root()));
    assert!(!assignment.shares_slice(root, &ValuePath::from([1]), param0, &ValuePath::root()));

    assignment.validate(&comp).unwrap();
}

#[test]
fn declaration_with_missing_output_position_is_fatal() {
    let mut comp = single_operand_all_reduce(AliasKind::May);
    comp.declare_alias(AliasDeclaration::new(0, ValuePath::root(), ValuePath::from([7]), AliasKind::May));

    let err = BufferAssignment::run(&comp).unwrap_err();
    assert!(matches!(err, Error::MalformedDeclaration { reason: "output position does not exist", .. }));
}

#[test]
fn declaration_with_unknown_parameter_is_fatal() {
    let mut comp = single_operand_all_reduce(AliasKind::Must);
    comp.declare_alias(AliasDeclaration::new(3, ValuePath::root(), ValuePath::root(), AliasKind::Must));

    let err = BufferAssignment::run(&comp).unwrap_err();
    assert!(matches!(err, Error::MalformedDeclaration { reason: "no such entry parameter", .. }));
}

#[test_case(AliasKind::May; "may alias")]
#[test_case(AliasKind::Must; "must alias")]
fn declaration_with_size_mismatch_is_fatal(kind: AliasKind) {
    let mut comp = Computation::new("size_mismatch");
    let p0 = comp.parameter(f32_vec(128));
    let _p1 = comp.parameter(f32_vec(64));
    comp.all_reduce([p0], ReduceOp::Sum).unwrap();
    comp.declare_alias(AliasDeclaration::new(1, ValuePath::root(), ValuePath::root(), kind));

    let err = BufferAssignment::run(&comp).unwrap_err();
    assert!(matches!(err, Error::AliasSizeMismatch { parameter_bytes: 256, output_bytes: 512, .. }));
}

#[test]
fn alias_conflicting_with_live_reader_is_fatal() {
    // The all-reduce would overwrite param0 while neg still needs it.
    let mut comp = Computation::new("conflicting_alias");
    let p0 = comp.parameter(f32_vec(128));
    let ar = comp.all_reduce([p0], ReduceOp::Sum).unwrap();
    comp.unary(UnaryOp::Neg, p0).unwrap();
    comp.set_root(ar).unwrap();
    comp.declare_alias(AliasDeclaration::new(0, ValuePath::root(), ValuePath::root(), AliasKind::Must));

    let err = BufferAssignment::run(&comp).unwrap_err();
    assert!(matches!(err, Error::UnsatisfiableAlias { .. }));
}
