//! Read context shared by query execution and chain walks.

use crate::{
    db::{
        Database,
        index::{IndexEntry, IndexHandle, IndexKey, KeyRange},
        record::{Document, RecordId, RecordSource},
    },
    error::InternalError,
};
use std::collections::BTreeSet;

///
/// ReadContext
///
/// Records plus index reads as one reader sees them: committed state for
/// direct reads, committed state with buffered writes for a transaction.
///
/// Implementations never hold an index store lock while taking the record
/// lock.
///

pub(crate) trait ReadContext: RecordSource {
    fn index_get(
        &self,
        index: &IndexHandle,
        key: &IndexKey,
    ) -> Result<BTreeSet<RecordId>, InternalError>;

    fn index_entries_between(
        &self,
        index: &IndexHandle,
        range: &KeyRange,
        ascending: bool,
    ) -> Result<Vec<IndexEntry>, InternalError>;

    fn index_entries_for_keys(
        &self,
        index: &IndexHandle,
        keys: &[IndexKey],
        ascending: bool,
    ) -> Result<Vec<IndexEntry>, InternalError>;
}

///
/// DirectRead
///
/// Committed-state reader over a database.
///

pub(crate) struct DirectRead<'a> {
    db: &'a Database,
}

impl<'a> DirectRead<'a> {
    pub(crate) const fn new(db: &'a Database) -> Self {
        Self { db }
    }
}

impl RecordSource for DirectRead<'_> {
    fn load(&self, rid: RecordId) -> Option<Document> {
        self.db.records.read().load(rid)
    }

    fn version(&self, rid: RecordId) -> Option<u64> {
        self.db.records.read().version(rid)
    }

    fn scan_clusters(&self, clusters: &[i32]) -> Vec<Document> {
        self.db.records.read().scan_clusters(clusters)
    }
}

impl ReadContext for DirectRead<'_> {
    fn index_get(
        &self,
        index: &IndexHandle,
        key: &IndexKey,
    ) -> Result<BTreeSet<RecordId>, InternalError> {
        index.get(key)
    }

    fn index_entries_between(
        &self,
        index: &IndexHandle,
        range: &KeyRange,
        ascending: bool,
    ) -> Result<Vec<IndexEntry>, InternalError> {
        index.entries_between(range, ascending)
    }

    fn index_entries_for_keys(
        &self,
        index: &IndexHandle,
        keys: &[IndexKey],
        ascending: bool,
    ) -> Result<Vec<IndexEntry>, InternalError> {
        index.entries_for_keys(keys, ascending)
    }
}
