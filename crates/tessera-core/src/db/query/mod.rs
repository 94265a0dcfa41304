//! Query surface: class queries with a filter tree, and direct queries
//! against one named index.
//!
//! Filters arrive already parsed; there is no text syntax here.

pub(crate) mod exec;
pub mod plan;
pub mod predicate;

pub use plan::{AccessPath, AccessPlan, ExplainPlan, IndexRef, LogicalPlan, QueryFingerprint};
pub use predicate::{BetweenPredicate, CompareOp, ComparePredicate, FieldPath, Operand, Predicate};

use crate::value::Value;

///
/// Query
///
/// Filtered read of one class and its subclasses.
///

#[derive(Clone, Debug, PartialEq)]
pub struct Query {
    class: String,
    predicate: Predicate,
    limit: Option<usize>,
}

impl Query {
    /// Every record of `class`.
    #[must_use]
    pub fn select(class: impl Into<String>) -> Self {
        Self {
            class: class.into(),
            predicate: Predicate::True,
            limit: None,
        }
    }

    /// Add a filter; repeated calls combine with AND.
    #[must_use]
    pub fn filter(mut self, predicate: Predicate) -> Self {
        self.predicate = match self.predicate {
            Predicate::True => predicate,
            existing => Predicate::and([existing, predicate]),
        };
        self
    }

    /// Stop after `limit` qualifying records.
    #[must_use]
    pub const fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    #[must_use]
    pub fn class(&self) -> &str {
        &self.class
    }

    #[must_use]
    pub const fn predicate(&self) -> &Predicate {
        &self.predicate
    }

    #[must_use]
    pub const fn row_limit(&self) -> Option<usize> {
        self.limit
    }

    /// Range over a named index. Bounds are (possibly partial) composite
    /// literals such as `[2, 5]`; `None` leaves that side open.
    #[must_use]
    pub fn index_range(
        index: impl Into<String>,
        lower: Option<Vec<Value>>,
        lower_inclusive: bool,
        upper: Option<Vec<Value>>,
        upper_inclusive: bool,
    ) -> IndexQuery {
        IndexQuery::new(
            index,
            IndexTarget::Range {
                lower,
                lower_inclusive,
                upper,
                upper_inclusive,
            },
        )
    }

    /// Point lookups of full or partial composite literals on a named index.
    #[must_use]
    pub fn index_keys(index: impl Into<String>, keys: Vec<Vec<Value>>) -> IndexQuery {
        IndexQuery::new(index, IndexTarget::Keys(keys))
    }
}

///
/// IndexTarget
///

#[derive(Clone, Debug, PartialEq)]
pub enum IndexTarget {
    Range {
        lower: Option<Vec<Value>>,
        lower_inclusive: bool,
        upper: Option<Vec<Value>>,
        upper_inclusive: bool,
    },
    Keys(Vec<Vec<Value>>),
}

///
/// IndexQuery
///
/// Direct read of index entries, bypassing the planner. Literals are
/// converted to the index's declared field types.
///

#[derive(Clone, Debug, PartialEq)]
pub struct IndexQuery {
    index: String,
    target: IndexTarget,
    descending: bool,
    limit: Option<usize>,
}

impl IndexQuery {
    fn new(index: impl Into<String>, target: IndexTarget) -> Self {
        Self {
            index: index.into(),
            target,
            descending: false,
            limit: None,
        }
    }

    #[must_use]
    pub const fn descending(mut self) -> Self {
        self.descending = true;
        self
    }

    #[must_use]
    pub const fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    #[must_use]
    pub fn index(&self) -> &str {
        &self.index
    }

    #[must_use]
    pub const fn target(&self) -> &IndexTarget {
        &self.target
    }

    #[must_use]
    pub const fn is_descending(&self) -> bool {
        self.descending
    }

    #[must_use]
    pub const fn row_limit(&self) -> Option<usize> {
        self.limit
    }

    // Leading key fields the literals bind.
    pub(crate) fn params(&self) -> usize {
        match &self.target {
            IndexTarget::Range { lower, upper, .. } => lower
                .iter()
                .chain(upper)
                .map(Vec::len)
                .max()
                .unwrap_or(0),
            IndexTarget::Keys(keys) => keys.iter().map(Vec::len).max().unwrap_or(0),
        }
    }
}
