//! Tests for logical value enumeration and pass-through forwarding.

use veles_ir::{BinaryOp, Computation, ReduceOp, ValuePath};

use crate::test::helpers::f32_vec;
use crate::value::ValueTable;

#[test]
fn array_op_has_one_root_value() {
    let mut comp = Computation::new("single");
    let p0 = comp.parameter(f32_vec(4));
    let add = comp.binary(BinaryOp::Add, p0, p0).unwrap();

    let table = ValueTable::build(&comp);
    assert_eq!(table.len(), 2);
    assert_eq!(table.values_of(add).count(), 1);

    let value = table.lookup(add, &ValuePath::root()).unwrap();
    assert_eq!(table.value(value).bytes, 16);
    assert_eq!(table.lookup(add, &ValuePath::from([0])), None);
}

#[test]
fn tuple_result_enumerates_leaf_positions() {
    let mut comp = Computation::new("tuple_values");
    let p0 = comp.parameter(f32_vec(128));
    let p1 = comp.parameter(f32_vec(128));
    let ar = comp.all_reduce([p0, p1], ReduceOp::Sum).unwrap();

    let table = ValueTable::build(&comp);
    // Two parameters plus two tuple leaves; the tuple root is not a value.
    assert_eq!(table.len(), 4);
    assert!(table.lookup(ar, &ValuePath::root()).is_none());
    assert!(table.lookup(ar, &ValuePath::from([0])).is_some());
    assert!(table.lookup(ar, &ValuePath::from([1])).is_some());
}

#[test]
fn views_forward_their_source() {
    let mut comp = Computation::new("views");
    let p0 = comp.parameter(f32_vec(32));
    let reshaped = comp.reshape(p0, [4, 8]).unwrap();

    let table = ValueTable::build(&comp);
    let view = table.lookup(reshaped, &ValuePath::root()).unwrap();
    let source = table.lookup(p0, &ValuePath::root()).unwrap();
    assert_eq!(table.forwards(), &[(view, source)]);
}

#[test]
fn tuple_and_extraction_forward_element_values() {
    let mut comp = Computation::new("tuple_forwarding");
    let p0 = comp.parameter(f32_vec(4));
    let p1 = comp.parameter(f32_vec(8));
    let tuple = comp.tuple([p0, p1]).unwrap();
    let second = comp.get_tuple_element(tuple, 1).unwrap();

    let table = ValueTable::build(&comp);
    let forwards = table.forwards();

    let tuple_leaf_1 = table.lookup(tuple, &ValuePath::from([1])).unwrap();
    let p1_value = table.lookup(p1, &ValuePath::root()).unwrap();
    let extracted = table.lookup(second, &ValuePath::root()).unwrap();

    assert!(forwards.contains(&(tuple_leaf_1, p1_value)));
    assert!(forwards.contains(&(extracted, tuple_leaf_1)));
}
