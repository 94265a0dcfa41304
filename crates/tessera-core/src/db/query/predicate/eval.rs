use super::{BetweenPredicate, CompareOp, ComparePredicate, FieldPath, Operand, Predicate};
use crate::{
    db::record::{Document, RecordSource},
    value::{Value, ValueType, strict_order_cmp},
};
use std::cmp::Ordering;

/// Evaluate `predicate` against one record. Dotted paths load linked
/// records through `source`.
pub(crate) fn eval<S>(predicate: &Predicate, doc: &Document, source: &S) -> bool
where
    S: RecordSource + ?Sized,
{
    match predicate {
        Predicate::True => true,
        Predicate::False => false,
        Predicate::And(children) => children.iter().all(|c| eval(c, doc, source)),
        Predicate::Or(children) => children.iter().any(|c| eval(c, doc, source)),
        Predicate::Not(inner) => !eval(inner, doc, source),
        Predicate::Compare(cmp) => eval_compare(cmp, doc, source),
        Predicate::Between(between) => resolve_path(&between.field, doc, source)
            .iter()
            .any(|value| in_bounds(value, between)),
        Predicate::IsNull(field) => resolve_path(field, doc, source)
            .iter()
            .all(Value::is_null),
        Predicate::IsNotNull(field) => resolve_path(field, doc, source)
            .iter()
            .any(|v| !v.is_null()),
    }
}

/// Values a path reaches from `doc`. Links are followed through single
/// links and link lists, so one path may reach several values; a path that
/// reaches nothing yields a single null.
pub(crate) fn resolve_path<S>(path: &FieldPath, doc: &Document, source: &S) -> Vec<Value>
where
    S: RecordSource + ?Sized,
{
    let Some((first, rest)) = path.segments().split_first() else {
        return vec![Value::Null];
    };

    let mut current = vec![doc.get(first).clone()];
    for segment in rest {
        let mut next = Vec::new();
        for value in current {
            step(&value, segment, source, &mut next);
        }
        current = next;
    }

    if current.is_empty() {
        current.push(Value::Null);
    }

    current
}

fn step<S>(value: &Value, segment: &str, source: &S, out: &mut Vec<Value>)
where
    S: RecordSource + ?Sized,
{
    match value {
        Value::Link(rid) => {
            if let Some(linked) = source.load(*rid) {
                out.push(linked.get(segment).clone());
            }
        }
        Value::List(items) => {
            for item in items {
                step(item, segment, source, out);
            }
        }
        Value::Map(entries) => {
            if let Some(v) = entries.get(segment) {
                out.push(v.clone());
            }
        }
        _ => {}
    }
}

fn eval_compare<S>(cmp: &ComparePredicate, doc: &Document, source: &S) -> bool
where
    S: RecordSource + ?Sized,
{
    let left = resolve_path(&cmp.field, doc, source);
    match &cmp.operand {
        Operand::Value(right) => left.iter().any(|l| compare(l, cmp.op, right)),
        Operand::Field(other) => {
            let right = resolve_path(other, doc, source);
            left.iter()
                .any(|l| right.iter().any(|r| compare(l, cmp.op, r)))
        }
    }
}

/// Literal converted to the type of the value it is compared with, or
/// left as is when it has no such form.
fn align(literal: &Value, like: &Value) -> Value {
    literal
        .coerce(like.value_type())
        .unwrap_or_else(|| literal.clone())
}

fn equals(left: &Value, right: &Value) -> bool {
    !left.is_null() && !right.is_null() && *left == align(right, left)
}

fn compare(left: &Value, op: CompareOp, right: &Value) -> bool {
    match op {
        CompareOp::Eq => equals(left, right),
        CompareOp::Ne => !left.is_null() && !right.is_null() && !equals(left, right),
        CompareOp::Lt | CompareOp::Lte | CompareOp::Gt | CompareOp::Gte => {
            let Some(ord) = strict_order_cmp(left, &align(right, left)) else {
                return false;
            };
            match op {
                CompareOp::Lt => ord == Ordering::Less,
                CompareOp::Lte => ord != Ordering::Greater,
                CompareOp::Gt => ord == Ordering::Greater,
                _ => ord != Ordering::Less,
            }
        }
        CompareOp::In => {
            let Some(candidates) = right.as_list() else {
                return equals(left, right);
            };
            match left {
                Value::List(items) => items
                    .iter()
                    .any(|item| candidates.iter().any(|c| equals(item, c))),
                _ => candidates.iter().any(|c| equals(left, c)),
            }
        }
        CompareOp::Contains => match left {
            Value::List(items) => items.iter().any(|item| equals(item, right)),
            _ => false,
        },
        CompareOp::ContainsKey => match (left, right.coerce(ValueType::Text)) {
            (Value::Map(entries), Some(Value::Text(key))) => entries.contains_key(&key),
            _ => false,
        },
        CompareOp::ContainsValue => match left {
            Value::Map(entries) => entries.values().any(|v| equals(v, right)),
            _ => false,
        },
    }
}

fn in_bounds(value: &Value, between: &BetweenPredicate) -> bool {
    let lower = strict_order_cmp(value, &align(&between.lower, value));
    let upper = strict_order_cmp(value, &align(&between.upper, value));

    let above = match lower {
        Some(Ordering::Greater) => true,
        Some(Ordering::Equal) => between.lower_inclusive,
        _ => false,
    };
    let below = match upper {
        Some(Ordering::Less) => true,
        Some(Ordering::Equal) => between.upper_inclusive,
        _ => false,
    };

    above && below
}
