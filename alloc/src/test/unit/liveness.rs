//! Tests for liveness over a fixed execution order.

use veles_ir::{BinaryOp, Computation, UnaryOp, ValuePath};

use crate::error::Error;
use crate::liveness::{self, LiveRange};
use crate::test::helpers::f32_vec;
use crate::value::ValueTable;

#[test]
fn chain_ranges_follow_reads() {
    let mut comp = Computation::new("chain");
    let p0 = comp.parameter(f32_vec(4));
    let a = comp.unary(UnaryOp::Neg, p0).unwrap();
    let b = comp.unary(UnaryOp::Neg, a).unwrap();

    let table = ValueTable::build(&comp);
    let order = comp.execution_order();
    let live = liveness::compute(&comp, &order, &table).unwrap();

    let range_of = |op, path: &ValuePath| live.range(table.lookup(op, path).unwrap());

    assert_eq!(range_of(p0, &ValuePath::root()), LiveRange { def: 0, last_use: 1 });
    assert_eq!(range_of(a, &ValuePath::root()), LiveRange { def: 1, last_use: 2 });
    // Root values stay live past the end of the order.
    assert_eq!(range_of(b, &ValuePath::root()), LiveRange { def: 2, last_use: 3 });
    assert_eq!(live.horizon(), 3);
}

#[test]
fn multiple_readers_extend_to_latest() {
    let mut comp = Computation::new("readers");
    let p0 = comp.parameter(f32_vec(4));
    let a = comp.unary(UnaryOp::Neg, p0).unwrap();
    let _b = comp.binary(BinaryOp::Add, p0, a).unwrap();

    let table = ValueTable::build(&comp);
    let live = liveness::compute(&comp, &comp.execution_order(), &table).unwrap();

    let p0_value = table.lookup(p0, &ValuePath::root()).unwrap();
    assert_eq!(live.range(p0_value).last_use, 2);
}

#[test]
fn tuple_element_reads_only_selected_subtree() {
    let mut comp = Computation::new("gte_liveness");
    let p0 = comp.parameter(f32_vec(4));
    let p1 = comp.parameter(f32_vec(4));
    let tuple = comp.tuple([p0, p1]).unwrap();
    let first = comp.get_tuple_element(tuple, 0).unwrap();
    comp.set_root(first).unwrap();

    let table = ValueTable::build(&comp);
    let live = liveness::compute(&comp, &comp.execution_order(), &table).unwrap();

    let leaf_0 = table.lookup(tuple, &ValuePath::from([0])).unwrap();
    let leaf_1 = table.lookup(tuple, &ValuePath::from([1])).unwrap();
    assert_eq!(live.range(leaf_0).last_use, 3);
    // The unselected leaf dies at the tuple itself.
    assert_eq!(live.range(leaf_1).last_use, 2);
}

#[test]
fn use_before_definition_is_fatal() {
    let mut comp = Computation::new("bad_order");
    let p0 = comp.parameter(f32_vec(4));
    let a = comp.unary(UnaryOp::Neg, p0).unwrap();

    let table = ValueTable::build(&comp);
    let err = liveness::compute(&comp, &[a, p0], &table).unwrap_err();
    assert!(matches!(err, Error::UseBeforeDefinition { .. }));
}

#[test]
fn incomplete_order_is_fatal() {
    let mut comp = Computation::new("partial_order");
    let p0 = comp.parameter(f32_vec(4));
    let a = comp.unary(UnaryOp::Neg, p0).unwrap();

    let table = ValueTable::build(&comp);
    assert!(matches!(liveness::compute(&comp, &[a], &table).unwrap_err(), Error::MissingFromOrder { .. }));
    assert!(matches!(
        liveness::compute(&comp, &[p0, a, a], &table).unwrap_err(),
        Error::DuplicateInOrder { .. }
    ));
}
