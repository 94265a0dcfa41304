//! Chained index lookups over link paths such as `group.curator.salary`.

use crate::{
    MAX_CHAIN_HOPS,
    db::{
        index::IndexHandle,
        manager::IndexManager,
        read::ReadContext,
        record::RecordId,
        schema::ClassCatalog,
    },
    error::InternalError,
    value::Value,
};
use std::{collections::BTreeSet, fmt, sync::Arc};

///
/// ChainedIndex
///
/// One index per path segment: hop `i` indexes the link field that leads to
/// the class hop `i + 1` is declared on; the last hop indexes the compared
/// field. Owns no storage.
///

#[derive(Clone, Debug)]
pub struct ChainedIndex {
    hops: Vec<Arc<IndexHandle>>,
}

impl ChainedIndex {
    /// Pick an index for every segment of `path`, starting at `class`.
    ///
    /// Returns `None` when some segment is not a link, or has no eligible
    /// index covering every cluster of the class it is declared on.
    /// `needs_range` restricts the last hop to ordered kinds.
    #[must_use]
    pub fn resolve(
        manager: &IndexManager,
        schema: &dyn ClassCatalog,
        class: &str,
        path: &[String],
        needs_range: bool,
    ) -> Option<Self> {
        let (last, links) = path.split_last()?;
        if links.is_empty() || path.len() > MAX_CHAIN_HOPS {
            return None;
        }

        let mut hops = Vec::with_capacity(path.len());
        let mut current = class.to_string();
        for segment in links {
            let linked = schema.property(&current, segment)?.linked_class.clone()?;
            let scope = schema.polymorphic_clusters(&current);
            let best = manager
                .involved_indexes(schema, &current, &[segment.as_str()])
                .into_iter()
                .filter(|h| h.covers_all(&scope) && link_hop_eligible(h))
                .max_by(|a, b| {
                    link_hop_priority(a)
                        .cmp(&link_hop_priority(b))
                        .then_with(|| b.name().cmp(a.name()))
                })?;
            hops.push(best);
            current = linked;
        }

        let scope = schema.polymorphic_clusters(&current);
        let last_hop = manager
            .involved_indexes(schema, &current, &[last.as_str()])
            .into_iter()
            .filter(|h| {
                let kind = h.kind();
                h.covers_all(&scope)
                    && !kind.is_fulltext()
                    && !(kind.is_hash() && h.definition().is_composite())
                    && (!needs_range || kind.supports_range())
            })
            .min_by(|a, b| {
                a.definition()
                    .arity()
                    .cmp(&b.definition().arity())
                    .then_with(|| a.name().cmp(b.name()))
            })?;
        hops.push(last_hop);

        Some(Self { hops })
    }

    #[must_use]
    pub fn hops(&self) -> &[Arc<IndexHandle>] {
        &self.hops
    }

    #[must_use]
    pub const fn hop_count(&self) -> usize {
        self.hops.len()
    }

    /// Index answering the comparison at the end of the path.
    #[must_use]
    pub fn last(&self) -> &Arc<IndexHandle> {
        &self.hops[self.hops.len() - 1]
    }

    #[must_use]
    pub fn name(&self) -> String {
        self.to_string()
    }

    /// Map records matched by the last hop back to records of the class the
    /// chain starts at, through reverse lookups on each link index.
    pub(crate) fn walk_back(
        &self,
        ctx: &dyn ReadContext,
        matched: BTreeSet<RecordId>,
    ) -> Result<BTreeSet<RecordId>, InternalError> {
        walk_back(&self.hops[..self.hops.len() - 1], ctx, matched)
    }
}

/// Reverse lookups through `links`, last hop first.
pub(crate) fn walk_back(
    links: &[Arc<IndexHandle>],
    ctx: &dyn ReadContext,
    matched: BTreeSet<RecordId>,
) -> Result<BTreeSet<RecordId>, InternalError> {
    let mut rids = matched;
    for hop in links.iter().rev() {
        if rids.is_empty() {
            break;
        }

        let mut keys = Vec::with_capacity(rids.len());
        for rid in &rids {
            if let Some(key) = hop.definition().create_key(&[Value::Link(*rid)])? {
                keys.push(key);
            }
        }

        rids = ctx
            .index_entries_for_keys(hop, &keys, true)?
            .into_iter()
            .map(|(_, rid)| rid)
            .collect();
    }

    Ok(rids)
}

impl fmt::Display for ChainedIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        chain_name(self.hops.iter().map(|h| h.name()), f)
    }
}

pub(crate) fn chain_name<'a>(
    names: impl Iterator<Item = &'a str>,
    f: &mut fmt::Formatter<'_>,
) -> fmt::Result {
    f.write_str("IndexChain{")?;
    for (i, name) in names.enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        f.write_str(name)?;
    }
    f.write_str("}")
}

// Link hops look up full keys only: composites that drop nulls would miss
// records, and composite hash keys cannot be probed by prefix.
fn link_hop_eligible(handle: &IndexHandle) -> bool {
    let def = handle.definition();
    let kind = handle.kind();

    !kind.is_fulltext()
        && !(def.is_composite() && def.ignore_nulls())
        && !(def.is_composite() && kind.is_hash())
}

fn link_hop_priority(handle: &IndexHandle) -> u8 {
    let mut priority = 0;
    if !handle.definition().is_composite() {
        priority += 10;
    }
    priority += if handle.kind().is_hash() { 10 } else { 5 };

    priority
}
