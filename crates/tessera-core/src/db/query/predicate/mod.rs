//! Module: query::predicate
//! Responsibility: the parsed filter tree the planner consumes, its
//! normal form, between-conversion and row evaluation.
//! Does not own: index choice or execution.

mod between;
mod eval;
mod normalize;


pub(crate) use between::convert_between;
pub(crate) use eval::{eval, resolve_path};
pub(crate) use normalize::normalize;

use crate::value::Value;
use std::{fmt, ops};

///
/// FieldPath
///
/// Dotted field reference. A path with more than one segment walks links.
///

#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct FieldPath(Vec<String>);

impl FieldPath {
    #[must_use]
    pub fn new(segments: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self(segments.into_iter().map(Into::into).collect())
    }

    #[must_use]
    pub fn parse(dotted: &str) -> Self {
        Self::new(dotted.split('.').map(str::trim))
    }

    #[must_use]
    pub fn segments(&self) -> &[String] {
        &self.0
    }

    #[must_use]
    pub const fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Field name when the path has a single segment.
    #[must_use]
    pub fn as_simple(&self) -> Option<&str> {
        match self.0.as_slice() {
            [name] => Some(name),
            _ => None,
        }
    }

    #[must_use]
    pub fn last(&self) -> Option<&str> {
        self.0.last().map(String::as_str)
    }

    /// Case-insensitive path equality.
    #[must_use]
    pub fn same_as(&self, other: &Self) -> bool {
        self.0.len() == other.0.len()
            && self
                .0
                .iter()
                .zip(&other.0)
                .all(|(a, b)| a.eq_ignore_ascii_case(b))
    }
}

impl From<&str> for FieldPath {
    fn from(dotted: &str) -> Self {
        Self::parse(dotted)
    }
}

impl From<String> for FieldPath {
    fn from(dotted: String) -> Self {
        Self::parse(&dotted)
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join("."))
    }
}

///
/// CompareOp
///

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Lte,
    Gt,
    Gte,
    In,
    Contains,
    ContainsKey,
    ContainsValue,
}

impl CompareOp {
    /// Operator seen from the other side: `5 < a` is `a > 5`.
    #[must_use]
    pub const fn flip(self) -> Self {
        match self {
            Self::Lt => Self::Gt,
            Self::Lte => Self::Gte,
            Self::Gt => Self::Lt,
            Self::Gte => Self::Lte,
            other => other,
        }
    }

    #[must_use]
    pub const fn is_lower_bound(self) -> bool {
        matches!(self, Self::Gt | Self::Gte)
    }

    #[must_use]
    pub const fn is_upper_bound(self) -> bool {
        matches!(self, Self::Lt | Self::Lte)
    }

    #[must_use]
    pub const fn is_inclusive(self) -> bool {
        matches!(self, Self::Lte | Self::Gte)
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Ne => "<>",
            Self::Lt => "<",
            Self::Lte => "<=",
            Self::Gt => ">",
            Self::Gte => ">=",
            Self::In => "IN",
            Self::Contains => "CONTAINS",
            Self::ContainsKey => "CONTAINSKEY",
            Self::ContainsValue => "CONTAINSVALUE",
        }
    }
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

///
/// Operand
///
/// Right-hand side of a comparison: a literal, or another field of the
/// same record. Field operands never drive index selection.
///

#[derive(Clone, Debug, PartialEq)]
pub enum Operand {
    Value(Value),
    Field(FieldPath),
}

impl Operand {
    #[must_use]
    pub const fn as_value(&self) -> Option<&Value> {
        match self {
            Self::Value(v) => Some(v),
            Self::Field(_) => None,
        }
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(v) => write!(f, "{v}"),
            Self::Field(p) => write!(f, "{p}"),
        }
    }
}

///
/// ComparePredicate
///

#[derive(Clone, Debug, PartialEq)]
pub struct ComparePredicate {
    pub field: FieldPath,
    pub op: CompareOp,
    pub operand: Operand,
}

impl ComparePredicate {
    /// Literal operand, if the comparison is field-to-literal.
    #[must_use]
    pub const fn literal(&self) -> Option<&Value> {
        self.operand.as_value()
    }
}

///
/// BetweenPredicate
///

#[derive(Clone, Debug, PartialEq)]
pub struct BetweenPredicate {
    pub field: FieldPath,
    pub lower: Value,
    pub lower_inclusive: bool,
    pub upper: Value,
    pub upper_inclusive: bool,
}

///
/// Predicate
///

#[derive(Clone, Debug, PartialEq)]
pub enum Predicate {
    True,
    False,
    And(Vec<Self>),
    Or(Vec<Self>),
    Not(Box<Self>),
    Compare(ComparePredicate),
    Between(BetweenPredicate),
    IsNull(FieldPath),
    IsNotNull(FieldPath),
}

impl Predicate {
    #[must_use]
    pub fn and(children: impl IntoIterator<Item = Self>) -> Self {
        Self::And(children.into_iter().collect())
    }

    #[must_use]
    pub fn or(children: impl IntoIterator<Item = Self>) -> Self {
        Self::Or(children.into_iter().collect())
    }

    #[must_use]
    pub fn compare(field: impl Into<FieldPath>, op: CompareOp, value: impl Into<Value>) -> Self {
        Self::Compare(ComparePredicate {
            field: field.into(),
            op,
            operand: Operand::Value(value.into()),
        })
    }

    /// Literal on the left: `value op field`.
    #[must_use]
    pub fn compare_literal_first(
        value: impl Into<Value>,
        op: CompareOp,
        field: impl Into<FieldPath>,
    ) -> Self {
        Self::compare(field, op.flip(), value)
    }

    /// Field-to-field comparison within one record.
    #[must_use]
    pub fn compare_fields(
        field: impl Into<FieldPath>,
        op: CompareOp,
        other: impl Into<FieldPath>,
    ) -> Self {
        Self::Compare(ComparePredicate {
            field: field.into(),
            op,
            operand: Operand::Field(other.into()),
        })
    }

    #[must_use]
    pub fn eq(field: impl Into<FieldPath>, value: impl Into<Value>) -> Self {
        Self::compare(field, CompareOp::Eq, value)
    }

    #[must_use]
    pub fn ne(field: impl Into<FieldPath>, value: impl Into<Value>) -> Self {
        Self::compare(field, CompareOp::Ne, value)
    }

    #[must_use]
    pub fn lt(field: impl Into<FieldPath>, value: impl Into<Value>) -> Self {
        Self::compare(field, CompareOp::Lt, value)
    }

    #[must_use]
    pub fn lte(field: impl Into<FieldPath>, value: impl Into<Value>) -> Self {
        Self::compare(field, CompareOp::Lte, value)
    }

    #[must_use]
    pub fn gt(field: impl Into<FieldPath>, value: impl Into<Value>) -> Self {
        Self::compare(field, CompareOp::Gt, value)
    }

    #[must_use]
    pub fn gte(field: impl Into<FieldPath>, value: impl Into<Value>) -> Self {
        Self::compare(field, CompareOp::Gte, value)
    }

    #[must_use]
    pub fn in_list<I, V>(field: impl Into<FieldPath>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Self::compare(field, CompareOp::In, Value::list(values))
    }

    #[must_use]
    pub fn contains(field: impl Into<FieldPath>, value: impl Into<Value>) -> Self {
        Self::compare(field, CompareOp::Contains, value)
    }

    #[must_use]
    pub fn contains_key(field: impl Into<FieldPath>, key: impl Into<Value>) -> Self {
        Self::compare(field, CompareOp::ContainsKey, key)
    }

    #[must_use]
    pub fn contains_value(field: impl Into<FieldPath>, value: impl Into<Value>) -> Self {
        Self::compare(field, CompareOp::ContainsValue, value)
    }

    /// SQL `BETWEEN`: both bounds inclusive.
    #[must_use]
    pub fn between(
        field: impl Into<FieldPath>,
        lower: impl Into<Value>,
        upper: impl Into<Value>,
    ) -> Self {
        Self::between_bounds(field, lower, true, upper, true)
    }

    #[must_use]
    pub fn between_bounds(
        field: impl Into<FieldPath>,
        lower: impl Into<Value>,
        lower_inclusive: bool,
        upper: impl Into<Value>,
        upper_inclusive: bool,
    ) -> Self {
        Self::Between(BetweenPredicate {
            field: field.into(),
            lower: lower.into(),
            lower_inclusive,
            upper: upper.into(),
            upper_inclusive,
        })
    }

    #[must_use]
    pub fn is_null(field: impl Into<FieldPath>) -> Self {
        Self::IsNull(field.into())
    }

    #[must_use]
    pub fn is_not_null(field: impl Into<FieldPath>) -> Self {
        Self::IsNotNull(field.into())
    }
}

impl ops::BitAnd for Predicate {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self {
        Self::And(vec![self, rhs])
    }
}

impl ops::BitOr for Predicate {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self::Or(vec![self, rhs])
    }
}

impl ops::Not for Predicate {
    type Output = Self;

    fn not(self) -> Self {
        Self::Not(Box::new(self))
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn join(f: &mut fmt::Formatter<'_>, children: &[Predicate], sep: &str) -> fmt::Result {
            f.write_str("(")?;
            for (i, child) in children.iter().enumerate() {
                if i > 0 {
                    f.write_str(sep)?;
                }
                write!(f, "{child}")?;
            }
            f.write_str(")")
        }

        match self {
            Self::True => f.write_str("TRUE"),
            Self::False => f.write_str("FALSE"),
            Self::And(children) => join(f, children, " AND "),
            Self::Or(children) => join(f, children, " OR "),
            Self::Not(inner) => write!(f, "NOT {inner}"),
            Self::Compare(cmp) => write!(f, "{} {} {}", cmp.field, cmp.op, cmp.operand),
            Self::Between(b) => {
                let open = if b.lower_inclusive { '[' } else { '(' };
                let close = if b.upper_inclusive { ']' } else { ')' };
                write!(f, "{} BETWEEN {open}{}, {}{close}", b.field, b.lower, b.upper)
            }
            Self::IsNull(field) => write!(f, "{field} IS NULL"),
            Self::IsNotNull(field) => write!(f, "{field} IS NOT NULL"),
        }
    }
}
