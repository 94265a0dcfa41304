//! Index selection for one class query.
//!
//! Phase 1 normalizes the filter and pairs bounds into ranges. Phase 2
//! turns each conjunction into index candidates: direct and composite
//! indexes over the class and its ancestors, then chains for dotted paths.
//! Phase 3 ranks candidates and appends the full-scan fallback.

use crate::{
    db::{
        index::{ChainedIndex, FieldMode, IndexField, IndexHandle, IndexKey},
        manager::IndexManager,
        query::{
            Query,
            plan::{AccessPath, AccessPlan, IndexRef, LogicalPlan, fingerprint},
            predicate::{CompareOp, FieldPath, Predicate, convert_between, normalize},
        },
        schema::ClassCatalog,
    },
    error::InternalError,
    obs::sink::{MetricsEvent, record},
    value::Value,
};
use std::cmp::Reverse;
use tracing::debug;

///
/// Atom
///
/// Index-relevant shape of one conjunct: a field compared with literals.
///

#[derive(Clone, Debug)]
enum Atom<'p> {
    Eq(&'p Value),
    In(&'p [Value]),
    IsNull,
    Contains(&'p Value),
    ContainsKey(&'p Value),
    ContainsValue(&'p Value),
    Range {
        lower: Option<(&'p Value, bool)>,
        upper: Option<(&'p Value, bool)>,
    },
}

impl Atom<'_> {
    const fn is_range(&self) -> bool {
        matches!(self, Self::Range { .. })
    }
}

#[derive(Clone, Debug)]
struct FieldAtom<'p> {
    path: &'p FieldPath,
    atom: Atom<'p>,
}

fn atoms_of(conjuncts: &[Predicate]) -> Vec<FieldAtom<'_>> {
    conjuncts.iter().filter_map(atom_of).collect()
}

fn atom_of(predicate: &Predicate) -> Option<FieldAtom<'_>> {
    let (path, atom) = match predicate {
        Predicate::Compare(cmp) => {
            let value = cmp.literal()?;
            if value.is_null() {
                return None;
            }
            let atom = match cmp.op {
                CompareOp::Eq => Atom::Eq(value),
                CompareOp::In => Atom::In(value.as_list()?),
                CompareOp::Contains => Atom::Contains(value),
                CompareOp::ContainsKey => Atom::ContainsKey(value),
                CompareOp::ContainsValue => Atom::ContainsValue(value),
                CompareOp::Gt | CompareOp::Gte => Atom::Range {
                    lower: Some((value, cmp.op.is_inclusive())),
                    upper: None,
                },
                CompareOp::Lt | CompareOp::Lte => Atom::Range {
                    lower: None,
                    upper: Some((value, cmp.op.is_inclusive())),
                },
                CompareOp::Ne => return None,
            };
            (&cmp.field, atom)
        }
        Predicate::Between(b) => {
            if b.lower.is_null() || b.upper.is_null() {
                return None;
            }
            (
                &b.field,
                Atom::Range {
                    lower: Some((&b.lower, b.lower_inclusive)),
                    upper: Some((&b.upper, b.upper_inclusive)),
                },
            )
        }
        Predicate::IsNull(field) => (field, Atom::IsNull),
        _ => return None,
    };

    Some(FieldAtom { path, atom })
}

///
/// Score
///
/// Ascending order is preference order.
///

#[derive(Clone, Debug, Eq, Ord, PartialEq, PartialOrd)]
struct Score {
    covered: Reverse<usize>,
    hops: usize,
    exact: Reverse<bool>,
    unique: Reverse<bool>,
    hash: Reverse<bool>,
    class_order: usize,
    name: String,
}

#[derive(Debug)]
struct Candidate {
    plan: AccessPlan,
    score: Score,
}

///
/// Matched
///
/// Access path for one index against a set of atoms.
///

#[derive(Debug)]
struct Matched {
    path: AccessPath,
    covered: usize,
    exact: bool,
}

/// Plan `query` against the current registry.
pub(crate) fn plan(
    query: &Query,
    manager: &IndexManager,
    schema: &dyn ClassCatalog,
) -> Result<LogicalPlan, InternalError> {
    // Phase 1: normal form, between-conversion.
    let normalized = normalize(query.predicate());
    let fingerprint = fingerprint(query, &normalized);
    let (predicate, between_converted) = convert_between(normalized);
    if between_converted > 0 {
        record(MetricsEvent::BetweenConverted {
            count: u64::try_from(between_converted).unwrap_or(u64::MAX),
        });
    }

    // Phase 2: candidates.
    let planner = Planner {
        manager,
        schema,
        class: query.class(),
    };
    let mut candidates = match &predicate {
        Predicate::Or(children) => planner.union(children)?.into_iter().collect(),
        Predicate::And(children) => planner.conjunction(children)?,
        single => planner.conjunction(std::slice::from_ref(single))?,
    };

    // Phase 3: rank, then fall back to a full scan.
    candidates.sort_by(|a, b| a.score.cmp(&b.score));
    let mut plans: Vec<AccessPlan> = candidates.into_iter().map(|c| c.plan).collect();
    plans.push(AccessPlan::Path(AccessPath::FullScan));

    debug!(
        class = query.class(),
        predicate = %predicate,
        access = %plans[0],
        between_converted,
        "query planned"
    );

    Ok(LogicalPlan {
        class: query.class().to_string(),
        predicate,
        candidates: plans,
        limit: query.row_limit(),
        between_converted,
        fingerprint,
    })
}

struct Planner<'a> {
    manager: &'a IndexManager,
    schema: &'a dyn ClassCatalog,
    class: &'a str,
}

impl Planner<'_> {
    /// Candidates for a conjunction, unranked.
    fn conjunction(&self, conjuncts: &[Predicate]) -> Result<Vec<Candidate>, InternalError> {
        let atoms = atoms_of(conjuncts);
        let mut out = Vec::new();
        if atoms.is_empty() {
            return Ok(out);
        }

        // direct and composite indexes, base class first
        let chain: Vec<String> = self
            .schema
            .superclass_chain(self.class)
            .into_iter()
            .rev()
            .map(|c| c.name.to_ascii_lowercase())
            .collect();
        let simple: Vec<(&str, &Atom<'_>)> = atoms
            .iter()
            .filter_map(|a| a.path.as_simple().map(|field| (field, &a.atom)))
            .collect();

        // an index missing one of the class's clusters would drop its rows
        let scope = self.schema.polymorphic_clusters(self.class);
        for handle in self.manager.indexes_for_class(self.schema, self.class) {
            if !handle.covers_all(&scope) {
                continue;
            }
            let Some(matched) = match_index(&handle, &simple)? else {
                continue;
            };
            let class_order = chain
                .iter()
                .position(|c| c.eq_ignore_ascii_case(handle.definition().class()))
                .unwrap_or(chain.len());

            out.push(Candidate {
                score: score(&handle, &matched, 0, class_order),
                plan: AccessPlan::Path(matched.path),
            });
        }

        // rows of subclasses live under the base index too
        if let Some(base) = out.iter().map(|c| c.score.class_order).min() {
            out.retain(|c| c.score.class_order == base);
        }

        // chains for dotted paths; a broken link reads as null, which no
        // reverse lookup can reach
        for atom in atoms
            .iter()
            .filter(|a| a.path.len() > 1 && !matches!(a.atom, Atom::IsNull))
        {
            if let Some(candidate) = self.chain(atom)? {
                out.push(candidate);
            }
        }

        Ok(out)
    }

    fn chain(&self, atom: &FieldAtom<'_>) -> Result<Option<Candidate>, InternalError> {
        let segments = atom.path.segments();
        let Some(chained) = ChainedIndex::resolve(
            self.manager,
            self.schema,
            self.class,
            segments,
            atom.atom.is_range(),
        ) else {
            return Ok(None);
        };
        let Some(field) = atom.path.last() else {
            return Ok(None);
        };

        let last = chained.last();
        let Some(matched) = match_index(last, &[(field, &atom.atom)])? else {
            return Ok(None);
        };

        let links: Vec<IndexRef> = chained.hops()[..chained.hop_count() - 1]
            .iter()
            .map(|h| index_ref(h, 1))
            .collect();
        let hops = chained.hop_count();

        Ok(Some(Candidate {
            score: score(last, &matched, hops, 0),
            plan: AccessPlan::Path(AccessPath::Chain {
                links,
                last: Box::new(matched.path),
            }),
        }))
    }

    /// A union when every branch has an index access of its own.
    fn union(&self, branches: &[Predicate]) -> Result<Option<Candidate>, InternalError> {
        let mut paths = Vec::with_capacity(branches.len());
        let mut covered = usize::MAX;
        let mut hops = 0;

        for branch in branches {
            let conjuncts = match branch {
                Predicate::And(children) => children.as_slice(),
                single => std::slice::from_ref(single),
            };
            let Some(best) = self
                .conjunction(conjuncts)?
                .into_iter()
                .min_by(|a, b| a.score.cmp(&b.score))
            else {
                return Ok(None);
            };
            let AccessPlan::Path(path) = best.plan else {
                return Ok(None);
            };

            covered = covered.min(best.score.covered.0);
            hops = hops.max(best.score.hops);
            paths.push(path);
        }
        if paths.is_empty() {
            return Ok(None);
        }

        Ok(Some(Candidate {
            plan: AccessPlan::Union(paths),
            score: Score {
                covered: Reverse(covered),
                hops,
                exact: Reverse(false),
                unique: Reverse(false),
                hash: Reverse(false),
                class_order: 0,
                name: String::new(),
            },
        }))
    }
}

fn index_ref(handle: &IndexHandle, params: usize) -> IndexRef {
    IndexRef {
        name: handle.name().to_string(),
        id: handle.id(),
        params,
    }
}

fn score(handle: &IndexHandle, matched: &Matched, hops: usize, class_order: usize) -> Score {
    Score {
        covered: Reverse(matched.covered),
        hops,
        exact: Reverse(matched.exact),
        unique: Reverse(handle.kind().is_unique()),
        hash: Reverse(handle.kind().is_hash()),
        class_order,
        name: handle.name().to_ascii_lowercase(),
    }
}

/// Literal values an equality-like atom binds for one index field.
fn eq_values(field: &IndexField, ignore_nulls: bool, atom: &Atom<'_>) -> Option<Vec<Value>> {
    match (field.mode, atom) {
        (FieldMode::Scalar, Atom::Eq(v)) => Some(vec![(*v).clone()]),
        (FieldMode::Scalar, Atom::In(items)) => {
            Some(items.iter().filter(|v| !v.is_null()).cloned().collect())
        }
        (FieldMode::Scalar, Atom::IsNull) if !ignore_nulls => Some(vec![Value::Null]),
        (FieldMode::ByElement, Atom::Contains(v))
        | (FieldMode::ByMapKey, Atom::ContainsKey(v))
        | (FieldMode::ByMapValue, Atom::ContainsValue(v)) => Some(vec![(*v).clone()]),
        _ => None,
    }
}

type Bounds<'p> = (Option<(&'p Value, bool)>, Option<(&'p Value, bool)>);

fn range_bounds<'p>(field: &IndexField, atoms: &[(&str, &Atom<'p>)]) -> Option<Bounds<'p>> {
    let mut lower = None;
    let mut upper = None;
    for (name, atom) in atoms {
        if !field.is(name) {
            continue;
        }
        if let Atom::Range { lower: lo, upper: hi } = atom {
            lower = lower.or(*lo);
            upper = upper.or(*hi);
        }
    }

    (lower.is_some() || upper.is_some()).then_some((lower, upper))
}

/// Cartesian product of per-slot literal lists.
fn combinations(slots: &[Vec<Value>]) -> Vec<Vec<Value>> {
    slots.iter().fold(vec![Vec::new()], |acc, values| {
        acc.iter()
            .flat_map(|prefix| {
                values.iter().map(move |v| {
                    let mut next = prefix.clone();
                    next.push(v.clone());
                    next
                })
            })
            .collect()
    })
}

/// Match one index against simple-field atoms: equality-like atoms bind
/// leading fields in order, then at most one range binds the next field.
fn match_index(
    handle: &IndexHandle,
    atoms: &[(&str, &Atom<'_>)],
) -> Result<Option<Matched>, InternalError> {
    let kind = handle.kind();
    if kind.is_fulltext() {
        return Ok(None);
    }
    let def = handle.definition();

    // Phase 1: bind leading fields.
    let mut slots: Vec<Vec<Value>> = Vec::new();
    let mut range = None;
    for field in def.fields() {
        let bound = atoms
            .iter()
            .filter(|(name, _)| field.is(name))
            .find_map(|(_, atom)| eq_values(field, def.ignore_nulls(), atom));
        if let Some(values) = bound {
            slots.push(values);
            continue;
        }
        if kind.supports_range() && field.mode == FieldMode::Scalar {
            range = range_bounds(field, atoms);
        }
        break;
    }

    let combos = combinations(&slots);
    if combos.is_empty() {
        return Ok(None);
    }
    // a range under several prefixes would need one scan each
    if combos.len() > 1 {
        range = None;
    }

    let covered = slots.len() + usize::from(range.is_some());
    if covered == 0
        || (def.ignore_nulls() && covered < def.arity())
        || (kind.is_hash() && (range.is_some() || covered < def.arity()))
    {
        return Ok(None);
    }
    let index = index_ref(handle, covered);
    let exact = covered == def.arity();

    // Phase 2: range over one prefix.
    if let Some((lower, upper)) = range {
        let prefix = &combos[0];
        let bound_key = |value: &Value| -> Result<Option<IndexKey>, InternalError> {
            let mut values = prefix.clone();
            values.push(value.clone());
            Ok(def.create_key(&values)?)
        };

        // nulls sort lowest and never satisfy a bound
        let (lower_key, lower_inclusive) = match lower {
            Some((value, inclusive)) => (bound_key(value)?, inclusive),
            None => (bound_key(&Value::Null)?, false),
        };
        let Some(lower_key) = lower_key else {
            return Ok(None);
        };
        let (upper_key, upper_inclusive) = match upper {
            Some((value, inclusive)) => match bound_key(value)? {
                Some(key) => (Some(key), inclusive),
                None => return Ok(None),
            },
            None if prefix.is_empty() => (None, false),
            None => match def.create_key(prefix)? {
                Some(key) => (Some(key), true),
                None => return Ok(None),
            },
        };

        let range = handle.range(
            Some(&lower_key),
            lower_inclusive,
            upper_key.as_ref(),
            upper_inclusive,
        )?;

        return Ok(Some(Matched {
            path: AccessPath::IndexRange { index, range },
            covered,
            exact,
        }));
    }

    // Phase 3: discrete keys.
    let mut keys = Vec::with_capacity(combos.len());
    for combo in &combos {
        if let Some(key) = def.create_key(combo)? {
            keys.push(key);
        }
    }
    if keys.is_empty() {
        return Ok(None);
    }
    keys.sort();
    keys.dedup();

    Ok(Some(Matched {
        path: AccessPath::IndexKeys { index, keys },
        covered,
        exact,
    }))
}
