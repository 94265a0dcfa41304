use super::Predicate;

///
/// Normalize a predicate into the form the planner matches against.
///
/// - nested AND / OR nodes are flattened
/// - neutral elements are removed, absorbing ones short-circuit
/// - double negation is eliminated
///
/// Child order is preserved; the planner is insensitive to it and
/// between-conversion pairs bounds in encounter order.
///
#[must_use]
pub(crate) fn normalize(predicate: &Predicate) -> Predicate {
    match predicate {
        Predicate::And(children) => normalize_and(children),
        Predicate::Or(children) => normalize_or(children),
        Predicate::Not(inner) => normalize_not(inner),
        other => other.clone(),
    }
}

fn normalize_and(children: &[Predicate]) -> Predicate {
    let mut out = Vec::with_capacity(children.len());
    for child in children {
        match normalize(child) {
            Predicate::True => {}
            Predicate::False => return Predicate::False,
            Predicate::And(grand) => out.extend(grand),
            other => out.push(other),
        }
    }

    collapse(out, Predicate::True, Predicate::And)
}

fn normalize_or(children: &[Predicate]) -> Predicate {
    let mut out = Vec::with_capacity(children.len());
    for child in children {
        match normalize(child) {
            Predicate::False => {}
            Predicate::True => return Predicate::True,
            Predicate::Or(grand) => out.extend(grand),
            other => out.push(other),
        }
    }

    collapse(out, Predicate::False, Predicate::Or)
}

fn normalize_not(inner: &Predicate) -> Predicate {
    match normalize(inner) {
        Predicate::True => Predicate::False,
        Predicate::False => Predicate::True,
        Predicate::Not(grand) => *grand,
        other => Predicate::Not(Box::new(other)),
    }
}

fn collapse(
    mut children: Vec<Predicate>,
    empty: Predicate,
    wrap: fn(Vec<Predicate>) -> Predicate,
) -> Predicate {
    match children.len() {
        0 => empty,
        1 => children.pop().unwrap_or(empty),
        _ => wrap(children),
    }
}
