use crate::db::{index::IndexKey, record::RecordId};
use std::collections::{BTreeMap, BTreeSet};

///
/// IndexChange
///
/// One buffered mutation of a key. `Remove(None)` drops every value.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum IndexChange {
    Put(RecordId),
    Remove(Option<RecordId>),
}

///
/// ChangeLog
///
/// Buffered mutations of one index inside one transaction. Changes are kept
/// per key in append order; a clear discards everything recorded before it
/// and hides the store's contents from reads.
///

#[derive(Clone, Debug, Default)]
pub(crate) struct ChangeLog {
    cleared: bool,
    changes: BTreeMap<IndexKey, Vec<IndexChange>>,
}

impl ChangeLog {
    pub(crate) fn put(&mut self, key: IndexKey, rid: RecordId) {
        self.changes
            .entry(key)
            .or_default()
            .push(IndexChange::Put(rid));
    }

    pub(crate) fn remove(&mut self, key: IndexKey, rid: Option<RecordId>) {
        self.changes
            .entry(key)
            .or_default()
            .push(IndexChange::Remove(rid));
    }

    pub(crate) fn clear(&mut self) {
        self.cleared = true;
        self.changes.clear();
    }

    pub(crate) const fn is_cleared(&self) -> bool {
        self.cleared
    }

    pub(crate) fn keys(&self) -> impl Iterator<Item = &IndexKey> {
        self.changes.keys()
    }

    pub(crate) fn touches(&self, key: &IndexKey) -> bool {
        self.changes.contains_key(key)
    }

    /// Number of buffered put and remove changes.
    pub(crate) fn op_counts(&self) -> (u64, u64) {
        self.changes
            .values()
            .flatten()
            .fold((0, 0), |(puts, removes), change| match change {
                IndexChange::Put(_) => (puts + 1, removes),
                IndexChange::Remove(_) => (puts, removes + 1),
            })
    }

    /// Value-set of `key` after replaying this log over `stored`, the
    /// store's committed value-set for the same key.
    pub(crate) fn replay(&self, key: &IndexKey, stored: BTreeSet<RecordId>) -> BTreeSet<RecordId> {
        let mut rids = if self.cleared { BTreeSet::new() } else { stored };

        for change in self.changes.get(key).into_iter().flatten() {
            match change {
                IndexChange::Put(rid) => {
                    rids.insert(*rid);
                }
                IndexChange::Remove(Some(rid)) => {
                    rids.remove(rid);
                }
                IndexChange::Remove(None) => rids.clear(),
            }
        }

        rids
    }
}
