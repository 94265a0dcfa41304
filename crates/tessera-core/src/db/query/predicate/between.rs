use super::{BetweenPredicate, CompareOp, ComparePredicate, FieldPath, Predicate};

///
/// Rewrite same-field lower/upper bound pairs inside each AND into a single
/// `Between`. Returns the rewritten predicate and the number of pairs
/// converted.
///
/// A pair is eligible only when both bounds compare the field with a
/// non-null literal and no `=` on the same field appears in that AND.
/// Expects normalized input.
///
#[must_use]
pub(crate) fn convert_between(predicate: Predicate) -> (Predicate, usize) {
    match predicate {
        Predicate::And(children) => {
            let mut count = 0;
            let children: Vec<Predicate> = children
                .into_iter()
                .map(|child| {
                    let (child, n) = convert_between(child);
                    count += n;
                    child
                })
                .collect();
            let (mut children, n) = convert_conjunction(children);
            let predicate = if children.len() == 1 {
                children.remove(0)
            } else {
                Predicate::And(children)
            };

            (predicate, count + n)
        }
        Predicate::Or(children) => {
            let mut count = 0;
            let children = children
                .into_iter()
                .map(|child| {
                    let (child, n) = convert_between(child);
                    count += n;
                    child
                })
                .collect();

            (Predicate::Or(children), count)
        }
        Predicate::Not(inner) => {
            let (inner, n) = convert_between(*inner);
            (Predicate::Not(Box::new(inner)), n)
        }
        other => (other, 0),
    }
}

/// Bound comparison eligible for pairing.
fn bound(predicate: &Predicate) -> Option<&ComparePredicate> {
    match predicate {
        Predicate::Compare(cmp)
            if (cmp.op.is_lower_bound() || cmp.op.is_upper_bound())
                && cmp.literal().is_some_and(|v| !v.is_null()) =>
        {
            Some(cmp)
        }
        _ => None,
    }
}

fn has_equality(children: &[Predicate], field: &FieldPath) -> bool {
    children.iter().any(|child| {
        matches!(child, Predicate::Compare(cmp) if cmp.op == CompareOp::Eq && cmp.field.same_as(field))
    })
}

fn convert_conjunction(children: Vec<Predicate>) -> (Vec<Predicate>, usize) {
    let mut slots: Vec<Option<Predicate>> = children.into_iter().map(Some).collect();
    let snapshot: Vec<Predicate> = slots.iter().flatten().cloned().collect();
    let mut converted = 0;

    for i in 0..slots.len() {
        let Some(first) = slots[i].as_ref().and_then(bound).cloned() else {
            continue;
        };
        if has_equality(&snapshot, &first.field) {
            continue;
        }

        let partner = (i + 1..slots.len()).find(|&j| {
            slots[j].as_ref().and_then(bound).is_some_and(|other| {
                other.field.same_as(&first.field)
                    && other.op.is_lower_bound() != first.op.is_lower_bound()
            })
        });
        let Some(j) = partner else {
            continue;
        };
        let Some(second) = slots[j].as_ref().and_then(bound).cloned() else {
            continue;
        };

        let (lower, upper) = if first.op.is_lower_bound() {
            (first, second)
        } else {
            (second, first)
        };
        let (Some(lo), Some(hi)) = (lower.literal(), upper.literal()) else {
            continue;
        };

        slots[j] = None;
        slots[i] = Some(Predicate::Between(BetweenPredicate {
            field: lower.field.clone(),
            lower: lo.clone(),
            lower_inclusive: lower.op.is_inclusive(),
            upper: hi.clone(),
            upper_inclusive: upper.op.is_inclusive(),
        }));
        converted += 1;
    }

    (slots.into_iter().flatten().collect(), converted)
}
