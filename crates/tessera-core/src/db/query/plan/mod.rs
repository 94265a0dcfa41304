//! Module: query::plan
//! Responsibility: choosing access paths for a filtered class scan.
//! Does not own: row evaluation (see `predicate`) or execution (see `exec`).

mod cache;
mod explain;
mod fingerprint;
mod planner;

#[cfg(test)]
mod tests;

pub use explain::ExplainPlan;
pub use fingerprint::QueryFingerprint;

pub(crate) use cache::PlanCache;
pub(crate) use fingerprint::fingerprint;
pub(crate) use planner::plan;

use crate::{
    db::{
        index::{IndexId, IndexKey, KeyRange, chain::chain_name},
        query::predicate::Predicate,
    },
    obs::sink::PlanKind,
};
use std::fmt;

///
/// IndexRef
///
/// Index a plan reads, pinned to the generation it was planned against.
/// `params` is the number of leading index fields the plan binds.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct IndexRef {
    pub name: String,
    pub id: IndexId,
    pub params: usize,
}

///
/// AccessPath
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum AccessPath {
    FullScan,
    IndexKeys {
        index: IndexRef,
        keys: Vec<IndexKey>,
    },
    IndexRange {
        index: IndexRef,
        range: KeyRange,
    },
    /// Reverse lookups through `links` starting from the records `last`
    /// yields.
    Chain {
        links: Vec<IndexRef>,
        last: Box<Self>,
    },
}

impl AccessPath {
    /// Every index the path reads, outermost first.
    #[must_use]
    pub fn indexes(&self) -> Vec<&IndexRef> {
        match self {
            Self::FullScan => Vec::new(),
            Self::IndexKeys { index, .. } | Self::IndexRange { index, .. } => vec![index],
            Self::Chain { links, last } => links.iter().chain(last.indexes()).collect(),
        }
    }

    /// Number of indexes a chain walks; zero for direct paths.
    #[must_use]
    pub fn chain_hops(&self) -> usize {
        match self {
            Self::Chain { links, last } => links.len() + last.indexes().len(),
            _ => 0,
        }
    }

    #[must_use]
    pub const fn is_full_scan(&self) -> bool {
        matches!(self, Self::FullScan)
    }
}

impl fmt::Display for AccessPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FullScan => f.write_str("FULL SCAN"),
            Self::IndexKeys { index, keys } => {
                write!(f, "INDEX {} KEYS [", index.name)?;
                for (i, key) in keys.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{key}")?;
                }
                f.write_str("]")
            }
            Self::IndexRange { index, range } => write!(f, "INDEX {} RANGE {range}", index.name),
            Self::Chain { links, last } => {
                let names: Vec<&str> = self.indexes().iter().map(|i| i.name.as_str()).collect();
                chain_name(names.into_iter(), f)?;
                write!(f, " VIA {} LINKS THEN {last}", links.len())
            }
        }
    }
}

///
/// AccessPlan
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum AccessPlan {
    Path(AccessPath),
    /// Disjunction answered by one path per branch; results are merged
    /// without duplicates.
    Union(Vec<AccessPath>),
}

impl AccessPlan {
    #[must_use]
    pub fn indexes(&self) -> Vec<&IndexRef> {
        match self {
            Self::Path(path) => path.indexes(),
            Self::Union(paths) => paths.iter().flat_map(AccessPath::indexes).collect(),
        }
    }

    #[must_use]
    pub const fn is_full_scan(&self) -> bool {
        matches!(self, Self::Path(AccessPath::FullScan))
    }

    #[must_use]
    pub fn chain_hops(&self) -> usize {
        match self {
            Self::Path(path) => path.chain_hops(),
            Self::Union(paths) => paths.iter().map(AccessPath::chain_hops).max().unwrap_or(0),
        }
    }

    pub(crate) const fn kind(&self) -> PlanKind {
        match self {
            Self::Path(AccessPath::FullScan) => PlanKind::FullScan,
            Self::Path(AccessPath::Chain { .. }) => PlanKind::Chain,
            Self::Path(_) => PlanKind::Index,
            Self::Union(_) => PlanKind::Union,
        }
    }
}

impl fmt::Display for AccessPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Path(path) => write!(f, "{path}"),
            Self::Union(paths) => {
                f.write_str("UNION(")?;
                for (i, path) in paths.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" | ")?;
                    }
                    write!(f, "{path}")?;
                }
                f.write_str(")")
            }
        }
    }
}

///
/// LogicalPlan
///
/// Planned query: the rewritten predicate plus candidate access plans, best
/// first. The last candidate is always a full scan, so execution can fall
/// back when an index went stale after planning.
///

#[derive(Clone, Debug)]
pub struct LogicalPlan {
    class: String,
    predicate: Predicate,
    candidates: Vec<AccessPlan>,
    limit: Option<usize>,
    between_converted: usize,
    fingerprint: QueryFingerprint,
}

impl LogicalPlan {
    #[must_use]
    pub fn class(&self) -> &str {
        &self.class
    }

    /// Filter re-checked on every candidate row.
    #[must_use]
    pub const fn predicate(&self) -> &Predicate {
        &self.predicate
    }

    #[must_use]
    pub fn candidates(&self) -> &[AccessPlan] {
        &self.candidates
    }

    #[must_use]
    pub fn best(&self) -> &AccessPlan {
        const FULL_SCAN: &AccessPlan = &AccessPlan::Path(AccessPath::FullScan);

        self.candidates.first().unwrap_or(FULL_SCAN)
    }

    #[must_use]
    pub const fn limit(&self) -> Option<usize> {
        self.limit
    }

    #[must_use]
    pub const fn between_converted(&self) -> usize {
        self.between_converted
    }

    #[must_use]
    pub const fn fingerprint(&self) -> QueryFingerprint {
        self.fingerprint
    }

    #[must_use]
    pub fn explain(&self) -> ExplainPlan {
        ExplainPlan::from_plan(self)
    }
}
