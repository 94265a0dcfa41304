//! Module: query::exec
//! Responsibility: running a planned query or a direct index query against
//! one reader's view of records and indexes.
//! Does not own: index choice (see `plan`).

use crate::{
    db::{
        Database,
        index::{IndexEntry, IndexHandle, IndexKey, KeyRange, chain},
        query::{
            IndexQuery, IndexTarget,
            plan::{AccessPath, AccessPlan, IndexRef, LogicalPlan},
            predicate::eval,
        },
        read::ReadContext,
        record::{Document, RecordId},
        schema::ClassCatalog,
    },
    error::{ErrorClass, ErrorOrigin, InternalError},
    obs::sink::{MetricsEvent, record},
    value::Value,
};
use std::{collections::BTreeSet, sync::Arc};
use tracing::{debug, warn};

///
/// Scope
///
/// Classes and clusters a class query reads: the class and its subclasses.
///

struct Scope {
    classes: BTreeSet<String>,
    clusters: Vec<i32>,
}

impl Scope {
    fn of(db: &Database, class: &str) -> Self {
        let schema = db.schema.read();

        Self {
            classes: schema
                .polymorphic_classes(class)
                .iter()
                .map(|c| c.name.to_ascii_lowercase())
                .collect(),
            clusters: schema.polymorphic_clusters(class),
        }
    }

    fn admits(&self, doc: &Document) -> bool {
        self.classes.contains(&doc.class().to_ascii_lowercase())
    }
}

///
/// Access
///
/// Access path with every index resolved to its live handle.
///

enum Access<'p> {
    FullScan,
    Keys {
        handle: Arc<IndexHandle>,
        keys: &'p [IndexKey],
    },
    Range {
        handle: Arc<IndexHandle>,
        range: &'p KeyRange,
    },
    Chain {
        links: Vec<Arc<IndexHandle>>,
        last: Box<Self>,
    },
}

/// Run `plan` through `ctx`, reverting past candidates whose indexes were
/// dropped or recreated since planning.
pub(crate) fn execute(
    db: &Database,
    plan: &LogicalPlan,
    ctx: &dyn ReadContext,
) -> Result<Vec<Document>, InternalError> {
    const FULL_SCAN: &AccessPlan = &AccessPlan::Path(AccessPath::FullScan);

    let scope = Scope::of(db, plan.class());
    if scope.classes.is_empty() {
        return Ok(Vec::new());
    }

    // Phase 1: first candidate whose indexes are all live.
    let (chosen, access) = plan
        .candidates()
        .iter()
        .find_map(|candidate| resolve_plan(db, candidate).map(|access| (candidate, access)))
        .unwrap_or((FULL_SCAN, vec![Access::FullScan]));

    record(MetricsEvent::Plan {
        kind: chosen.kind(),
    });
    for index in chosen.indexes() {
        record(MetricsEvent::IndexUsed {
            index: &index.name,
            params: index.params,
        });
    }

    // Phase 2: candidate rows, then the full filter on each.
    let mut rows = Rows::new(plan, &scope, ctx);
    for path in &access {
        if rows.done() {
            break;
        }
        match path {
            Access::FullScan => {
                for doc in ctx.scan_clusters(&scope.clusters) {
                    if rows.done() {
                        break;
                    }
                    rows.offer(doc);
                }
            }
            _ => {
                for rid in candidate_rids(path, ctx)? {
                    if rows.done() {
                        break;
                    }
                    rows.offer_rid(rid);
                }
            }
        }
    }

    let (out, scanned) = rows.finish();
    record(MetricsEvent::RowsScanned {
        rows: u64::try_from(scanned).unwrap_or(u64::MAX),
    });
    debug!(
        class = plan.class(),
        access = %chosen,
        scanned,
        returned = out.len(),
        "query executed"
    );

    Ok(out)
}

fn resolve_plan<'p>(db: &Database, plan: &'p AccessPlan) -> Option<Vec<Access<'p>>> {
    match plan {
        AccessPlan::Path(path) => resolve_path(db, path).map(|access| vec![access]),
        AccessPlan::Union(paths) => paths.iter().map(|path| resolve_path(db, path)).collect(),
    }
}

fn resolve_path<'p>(db: &Database, path: &'p AccessPath) -> Option<Access<'p>> {
    let access = match path {
        AccessPath::FullScan => Access::FullScan,
        AccessPath::IndexKeys { index, keys } => Access::Keys {
            handle: live(db, index)?,
            keys,
        },
        AccessPath::IndexRange { index, range } => Access::Range {
            handle: live(db, index)?,
            range,
        },
        AccessPath::Chain { links, last } => Access::Chain {
            links: links
                .iter()
                .map(|link| live(db, link))
                .collect::<Option<_>>()?,
            last: Box::new(resolve_path(db, last)?),
        },
    };

    Some(access)
}

// Handle for `index` if it is still the generation the plan was built on.
fn live(db: &Database, index: &IndexRef) -> Option<Arc<IndexHandle>> {
    let handle = db
        .indexes
        .read()
        .get(&index.name)
        .filter(|h| h.id() == index.id);
    if handle.is_none() {
        record(MetricsEvent::PlanReverted { index: &index.name });
        warn!(index = %index.name, id = %index.id, "planned index is gone, reverting");
    }

    handle
}

fn candidate_rids(access: &Access<'_>, ctx: &dyn ReadContext) -> Result<Vec<RecordId>, InternalError> {
    let rids = match access {
        Access::FullScan => Vec::new(),
        Access::Keys { handle, keys } => rids_of(ctx.index_entries_for_keys(handle, keys, true)?),
        Access::Range { handle, range } => {
            rids_of(ctx.index_entries_between(handle, range, true)?)
        }
        Access::Chain { links, last } => {
            let matched: BTreeSet<RecordId> = candidate_rids(last, ctx)?.into_iter().collect();

            chain::walk_back(links, ctx, matched)?.into_iter().collect()
        }
    };

    Ok(rids)
}

fn rids_of(entries: Vec<IndexEntry>) -> Vec<RecordId> {
    entries.into_iter().map(|(_, rid)| rid).collect()
}

///
/// Rows
///
/// Accumulates qualifying documents without duplicates, up to the limit.
///

struct Rows<'a> {
    plan: &'a LogicalPlan,
    scope: &'a Scope,
    ctx: &'a dyn ReadContext,
    seen: BTreeSet<RecordId>,
    out: Vec<Document>,
    scanned: usize,
}

impl<'a> Rows<'a> {
    fn new(plan: &'a LogicalPlan, scope: &'a Scope, ctx: &'a dyn ReadContext) -> Self {
        Self {
            plan,
            scope,
            ctx,
            seen: BTreeSet::new(),
            out: Vec::new(),
            scanned: 0,
        }
    }

    fn done(&self) -> bool {
        self.plan.limit().is_some_and(|limit| self.out.len() >= limit)
    }

    fn offer_rid(&mut self, rid: RecordId) {
        if self.seen.contains(&rid) {
            return;
        }
        // an index entry can outlive its record inside a transaction view
        if let Some(doc) = self.ctx.load(rid) {
            self.offer(doc);
        }
    }

    fn offer(&mut self, doc: Document) {
        if !self.seen.insert(doc.rid()) {
            return;
        }
        self.scanned += 1;
        if self.scope.admits(&doc) && eval(self.plan.predicate(), &doc, self.ctx) {
            self.out.push(doc);
        }
    }

    fn finish(self) -> (Vec<Document>, usize) {
        (self.out, self.scanned)
    }
}

/// Run a direct query against one named index.
pub(crate) fn run_index_query(
    query: &IndexQuery,
    handle: &IndexHandle,
    ctx: &dyn ReadContext,
) -> Result<Vec<IndexEntry>, InternalError> {
    let def = handle.definition();
    let ascending = !query.is_descending();

    let mut entries = match query.target() {
        IndexTarget::Range {
            lower,
            lower_inclusive,
            upper,
            upper_inclusive,
        } => {
            let lower = bound_key(handle, lower.as_deref())?;
            let upper = bound_key(handle, upper.as_deref())?;
            let range = handle.range(
                lower.as_ref(),
                *lower_inclusive,
                upper.as_ref(),
                *upper_inclusive,
            )?;

            ctx.index_entries_between(handle, &range, ascending)?
        }
        IndexTarget::Keys(literals) => {
            let mut keys = Vec::with_capacity(literals.len());
            for values in literals {
                // a literal without a representation in the key type matches nothing
                if let Some(key) = def.create_key(values)? {
                    keys.push(key);
                }
            }

            ctx.index_entries_for_keys(handle, &keys, ascending)?
        }
    };

    if let Some(limit) = query.row_limit() {
        entries.truncate(limit);
    }
    record(MetricsEvent::IndexUsed {
        index: handle.name(),
        params: query.params(),
    });

    Ok(entries)
}

fn bound_key(handle: &IndexHandle, values: Option<&[Value]>) -> Result<Option<IndexKey>, InternalError> {
    let Some(values) = values else {
        return Ok(None);
    };

    match handle.definition().create_key(values)? {
        Some(key) => Ok(Some(key)),
        None => Err(InternalError::new(
            ErrorClass::InvalidKey,
            ErrorOrigin::Query,
            format!(
                "range bound [{}] cannot be converted to the key of index '{}'",
                join_values(values),
                handle.name()
            ),
        )),
    }
}

fn join_values(values: &[Value]) -> String {
    values
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}
