use crate::{
    db::record::RecordId,
    value::{Value, ValueType, canonical_cmp, strict_order_cmp},
};
use proptest::prelude::*;
use std::{
    cmp::Ordering,
    collections::hash_map::DefaultHasher,
    hash::{Hash, Hasher},
};

// ---- helpers -----------------------------------------------------------

fn hash_of(v: &Value) -> u64 {
    let mut h = DefaultHasher::new();
    v.hash(&mut h);
    h.finish()
}

fn v_txt(s: &str) -> Value {
    Value::Text(s.to_string())
}

// ---- ordering ----------------------------------------------------------

#[test]
fn null_sorts_before_every_other_rank() {
    for other in [
        Value::Bool(false),
        Value::Int(i64::MIN),
        Value::Float(f64::NEG_INFINITY),
        v_txt(""),
        Value::Blob(vec![]),
        Value::Link(RecordId::new(0, 0)),
    ] {
        assert_eq!(canonical_cmp(&Value::Null, &other), Ordering::Less);
    }
}

#[test]
fn ints_and_floats_share_one_numeric_order() {
    assert_eq!(canonical_cmp(&Value::Int(1), &Value::Float(1.5)), Ordering::Less);
    assert_eq!(canonical_cmp(&Value::Float(2.5), &Value::Int(2)), Ordering::Greater);
    assert_eq!(canonical_cmp(&Value::Int(-3), &Value::Float(-3.5)), Ordering::Greater);
    assert_eq!(Value::Int(4), Value::Float(4.0));
}

#[test]
fn equal_numbers_hash_identically() {
    assert_eq!(hash_of(&Value::Int(7)), hash_of(&Value::Float(7.0)));
    assert_eq!(hash_of(&Value::Float(0.0)), hash_of(&Value::Float(-0.0)));
}

#[test]
fn nan_sorts_after_every_number_and_equals_itself() {
    let nan = Value::Float(f64::NAN);
    assert_eq!(canonical_cmp(&nan, &Value::Float(f64::INFINITY)), Ordering::Greater);
    assert_eq!(canonical_cmp(&Value::Int(i64::MAX), &nan), Ordering::Less);
    assert_eq!(nan, Value::Float(f64::NAN));
}

#[test]
fn strict_order_rejects_nulls_and_mixed_ranks() {
    assert_eq!(strict_order_cmp(&Value::Null, &Value::Int(1)), None);
    assert_eq!(strict_order_cmp(&v_txt("1"), &Value::Int(1)), None);
    assert_eq!(
        strict_order_cmp(&Value::Int(1), &Value::Float(0.5)),
        Some(Ordering::Greater)
    );
}

#[test]
fn lists_compare_lexicographically_then_by_length() {
    let short = Value::list([1, 2]);
    let long = Value::list([1, 2, 0]);
    let bigger = Value::list([1, 3]);
    assert_eq!(canonical_cmp(&short, &long), Ordering::Less);
    assert_eq!(canonical_cmp(&long, &bigger), Ordering::Less);
}

// ---- coercion ----------------------------------------------------------

#[test]
fn text_literals_coerce_into_declared_types() {
    assert_eq!(v_txt("25").coerce(ValueType::Int), Some(Value::Int(25)));
    assert_eq!(v_txt(" 2.5 ").coerce(ValueType::Float), Some(Value::Float(2.5)));
    assert_eq!(v_txt("TRUE").coerce(ValueType::Bool), Some(Value::Bool(true)));
    assert_eq!(
        v_txt("#12:3").coerce(ValueType::Link),
        Some(Value::Link(RecordId::new(12, 3)))
    );
    assert!(matches!(
        v_txt("2024-02-29").coerce(ValueType::Date),
        Some(Value::Date(_))
    ));
}

#[test]
fn lossy_or_unparsable_coercions_are_rejected() {
    assert_eq!(Value::Float(1.5).coerce(ValueType::Int), None);
    assert_eq!(v_txt("abc").coerce(ValueType::Int), None);
    assert_eq!(Value::Blob(vec![1]).coerce(ValueType::Text), None);
}

#[test]
fn null_coerces_to_null_for_every_type() {
    for ty in [ValueType::Int, ValueType::Text, ValueType::Link, ValueType::Date] {
        assert_eq!(Value::Null.coerce(ty), Some(Value::Null));
    }
}

#[test]
fn numbers_render_as_plain_text() {
    assert_eq!(Value::Int(42).coerce(ValueType::Text), Some(v_txt("42")));
    assert_eq!(Value::Bool(false).coerce(ValueType::Text), Some(v_txt("false")));
}

proptest! {
    #[test]
    fn canonical_order_is_antisymmetric(a in any::<i64>(), b in -1.0e12f64..1.0e12f64) {
        let left = Value::Int(a);
        let right = Value::Float(b);
        prop_assert_eq!(canonical_cmp(&left, &right), canonical_cmp(&right, &left).reverse());
    }

    #[test]
    fn int_float_order_matches_exact_arithmetic(a in -1_000_000i64..1_000_000, b in -1.0e6f64..1.0e6f64) {
        #[expect(clippy::cast_precision_loss)]
        let expected = (a as f64).partial_cmp(&b).expect("finite");
        prop_assert_eq!(canonical_cmp(&Value::Int(a), &Value::Float(b)), expected);
    }
}
