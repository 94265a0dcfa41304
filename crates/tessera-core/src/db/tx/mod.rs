//! Module: tx
//! Responsibility: optimistic transactions over records and index stores.
//! Writes are buffered per index in a `ChangeLog`; reads replay the log over
//! the committed store; commit folds every log atomically.
//! Does not own: key extraction (see `maintain`) or store internals.

mod log;
mod overlay;

#[cfg(test)]
mod tests;

pub(crate) use log::ChangeLog;
pub(crate) use overlay::OverlayView;

use crate::{
    db::{
        Database,
        index::{IndexEntry, IndexHandle, IndexKey, IndexOps, KeyRange},
        maintain::{ChangeSet, IndexMaintainer, IndexSink},
        query::{ExplainPlan, IndexQuery, Query},
        read::ReadContext,
        record::{Document, RecordId, RecordSource},
        schema::ClassCatalog,
    },
    error::{ErrorClass, ErrorOrigin, InternalError},
    obs::sink::{MetricsEvent, record},
};
use derive_more::Display;
use std::{
    collections::{BTreeMap, BTreeSet},
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::{SystemTime, UNIX_EPOCH},
};
use tracing::{debug, warn};
use ulid::Ulid;

static TX_SEQUENCE: AtomicU64 = AtomicU64::new(1);

///
/// TxId
///
/// Transaction identity: creation time in the ULID timestamp, a process-wide
/// sequence in the random part. Sortable by start order.
///

#[derive(Clone, Copy, Debug, Display, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct TxId(Ulid);

impl TxId {
    fn next() -> Self {
        let now_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX));
        let seq = TX_SEQUENCE.fetch_add(1, Ordering::Relaxed);

        Self(Ulid::from_parts(now_ms, u128::from(seq)))
    }
}

///
/// TxState
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TxState {
    Active,
    Committed,
    RolledBack,
}

impl TxState {
    const fn label(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Committed => "committed",
            Self::RolledBack => "rolled back",
        }
    }
}

///
/// RecordWrite
///

#[derive(Clone, Debug)]
enum RecordWrite {
    Save(Document),
    Delete,
}

///
/// TxIndexLog
///
/// Change log bound to the index generation it was recorded against.
///

#[derive(Debug)]
struct TxIndexLog {
    handle: Arc<IndexHandle>,
    log: ChangeLog,
}

///
/// StagedOp
///
/// Maintenance output held back until key extraction for the whole record
/// succeeded, so a failed write leaves the logs untouched.
///

enum StagedOp {
    Put(Arc<IndexHandle>, IndexKey, RecordId),
    Remove(Arc<IndexHandle>, IndexKey, RecordId),
}

#[derive(Default)]
struct Staged {
    ops: Vec<StagedOp>,
}

impl IndexSink for Staged {
    fn put(
        &mut self,
        index: &Arc<IndexHandle>,
        key: IndexKey,
        rid: RecordId,
    ) -> Result<(), InternalError> {
        self.ops.push(StagedOp::Put(Arc::clone(index), key, rid));
        Ok(())
    }

    fn remove(
        &mut self,
        index: &Arc<IndexHandle>,
        key: IndexKey,
        rid: RecordId,
    ) -> Result<(), InternalError> {
        self.ops.push(StagedOp::Remove(Arc::clone(index), key, rid));
        Ok(())
    }
}

///
/// Transaction
///
/// Unit of isolated work against one database. Nothing reaches the stores
/// until `commit`; dropping an active transaction rolls it back.
///

pub struct Transaction<'db> {
    db: &'db Database,
    id: TxId,
    state: TxState,
    writes: BTreeMap<RecordId, RecordWrite>,
    read_versions: BTreeMap<RecordId, Option<u64>>,
    logs: BTreeMap<String, TxIndexLog>,
}

impl<'db> Transaction<'db> {
    pub(crate) fn begin(db: &'db Database) -> Self {
        let id = TxId::next();
        record(MetricsEvent::TxBegin);
        debug!(tx = %id, "transaction started");

        Self {
            db,
            id,
            state: TxState::Active,
            writes: BTreeMap::new(),
            read_versions: BTreeMap::new(),
            logs: BTreeMap::new(),
        }
    }

    #[must_use]
    pub const fn id(&self) -> TxId {
        self.id
    }

    #[must_use]
    pub const fn state(&self) -> TxState {
        self.state
    }

    fn ensure_active(&self) -> Result<(), InternalError> {
        match self.state {
            TxState::Active => Ok(()),
            state => Err(InternalError::tx_not_active(state.label())),
        }
    }

    // ------------------------------------------------------------------
    // Records
    // ------------------------------------------------------------------

    /// Store a new record in the first cluster of its class.
    pub fn insert(&mut self, mut doc: Document) -> Result<RecordId, InternalError> {
        self.ensure_active()?;

        let cluster = {
            let schema = self.db.schema.read();
            let class = schema.class(doc.class()).ok_or_else(|| {
                InternalError::not_found(ErrorOrigin::Schema, "class", doc.class())
            })?;
            class.clusters.first().copied().ok_or_else(|| {
                InternalError::tx_invariant(format!("class '{}' has no cluster", class.name))
            })?
        };
        let rid = self.db.records.write().allocate(cluster);
        doc.assign(rid, 1);

        let indexes = self.db.indexes_for_record(doc.class());
        let mut staged = Staged::default();
        IndexMaintainer::new(&indexes).on_create(&doc, &mut staged)?;
        self.apply_staged(staged);

        self.read_versions.insert(rid, None);
        self.writes.insert(rid, RecordWrite::Save(doc));

        Ok(rid)
    }

    /// Insert a new record or update an existing one.
    pub fn save(&mut self, doc: Document) -> Result<RecordId, InternalError> {
        self.save_with_changes(doc, &ChangeSet::new())
    }

    /// Update with explicit collection deltas; indexed collection fields
    /// named in `changes` are maintained element by element.
    pub fn save_with_changes(
        &mut self,
        mut doc: Document,
        changes: &ChangeSet,
    ) -> Result<RecordId, InternalError> {
        self.ensure_active()?;
        if !doc.rid().is_persistent() {
            return self.insert(doc);
        }

        let rid = doc.rid();
        let before = self
            .load(rid)
            .ok_or_else(|| InternalError::not_found(ErrorOrigin::Record, "record", &rid.to_string()))?;
        if before.version() != doc.version() {
            record(MetricsEvent::TxConflict);
            return Err(InternalError::concurrent_modification(
                rid,
                Some(doc.version()),
                Some(before.version()),
            ));
        }

        doc.assign(rid, before.version() + 1);
        let indexes = self.db.indexes_for_record(doc.class());
        let mut staged = Staged::default();
        IndexMaintainer::new(&indexes).on_update(&before, &doc, changes, &mut staged)?;
        self.apply_staged(staged);

        self.read_versions
            .entry(rid)
            .or_insert(Some(before.version()));
        self.writes.insert(rid, RecordWrite::Save(doc));

        Ok(rid)
    }

    pub fn delete(&mut self, rid: RecordId) -> Result<(), InternalError> {
        self.ensure_active()?;

        let before = self
            .load(rid)
            .ok_or_else(|| InternalError::not_found(ErrorOrigin::Record, "record", &rid.to_string()))?;
        let indexes = self.db.indexes_for_record(before.class());
        let mut staged = Staged::default();
        IndexMaintainer::new(&indexes).on_delete(&before, &mut staged)?;
        self.apply_staged(staged);

        self.read_versions
            .entry(rid)
            .or_insert(Some(before.version()));
        self.writes.insert(rid, RecordWrite::Delete);

        Ok(())
    }

    /// Record as this transaction sees it.
    #[must_use]
    pub fn load(&self, rid: RecordId) -> Option<Document> {
        match self.writes.get(&rid) {
            Some(RecordWrite::Save(doc)) => Some(doc.clone()),
            Some(RecordWrite::Delete) => None,
            None => self.db.records.read().load(rid),
        }
    }

    // ------------------------------------------------------------------
    // Raw index access
    // ------------------------------------------------------------------

    fn handle(&self, name: &str) -> Result<Arc<IndexHandle>, InternalError> {
        self.db
            .index(name)
            .ok_or_else(|| InternalError::not_found(ErrorOrigin::Registry, "index", name))
    }

    pub fn index_put(&mut self, index: &str, key: IndexKey, rid: RecordId) -> Result<(), InternalError> {
        self.ensure_active()?;
        let handle = self.handle(index)?;
        handle.check_lookup_key(&key)?;
        if !handle.kind().is_fulltext() && key.arity() != handle.definition().arity() {
            return Err(InternalError::invalid_key_shape(
                handle.name(),
                handle.definition().arity(),
                key.arity(),
            ));
        }

        self.log_put(&handle, &key, rid);
        Ok(())
    }

    /// Remove one record from `key`, or every record when `rid` is `None`.
    pub fn index_remove(
        &mut self,
        index: &str,
        key: IndexKey,
        rid: Option<RecordId>,
    ) -> Result<(), InternalError> {
        self.ensure_active()?;
        let handle = self.handle(index)?;
        handle.check_lookup_key(&key)?;

        self.log_remove(&handle, &key, rid);
        Ok(())
    }

    pub fn index_clear(&mut self, index: &str) -> Result<(), InternalError> {
        self.ensure_active()?;
        let handle = self.handle(index)?;
        self.log_mut(&handle).clear();

        Ok(())
    }

    pub fn index_get(&self, index: &str, key: &IndexKey) -> Result<BTreeSet<RecordId>, InternalError> {
        self.ensure_active()?;
        let handle = self.handle(index)?;

        ReadContext::index_get(self, &handle, key)
    }

    pub fn index_entries_between(
        &self,
        index: &str,
        range: &KeyRange,
        ascending: bool,
    ) -> Result<Vec<IndexEntry>, InternalError> {
        self.ensure_active()?;
        let handle = self.handle(index)?;

        ReadContext::index_entries_between(self, &handle, range, ascending)
    }

    pub fn index_entries_for_keys(
        &self,
        index: &str,
        keys: &[IndexKey],
        ascending: bool,
    ) -> Result<Vec<IndexEntry>, InternalError> {
        self.ensure_active()?;
        let handle = self.handle(index)?;

        ReadContext::index_entries_for_keys(self, &handle, keys, ascending)
    }

    /// Entry count of an index including this transaction's changes.
    pub fn index_len(&self, index: &str) -> Result<usize, InternalError> {
        self.ensure_active()?;
        let handle = self.handle(index)?;

        Ok(self.with_overlay(&handle, |view| view.len()))
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    pub fn query(&self, query: &Query) -> Result<Vec<Document>, InternalError> {
        self.ensure_active()?;
        let plan = self.db.prepare(query)?;

        self.db.execute_in(&plan, self)
    }

    pub fn explain(&self, query: &Query) -> Result<ExplainPlan, InternalError> {
        self.ensure_active()?;

        self.db.explain(query)
    }

    /// Direct index read, including this transaction's buffered changes.
    pub fn index_query(&self, query: &IndexQuery) -> Result<Vec<IndexEntry>, InternalError> {
        self.ensure_active()?;

        self.db.index_query_in(query, self)
    }

    // ------------------------------------------------------------------
    // Logs
    // ------------------------------------------------------------------

    fn log_mut(&mut self, handle: &Arc<IndexHandle>) -> &mut ChangeLog {
        &mut self
            .logs
            .entry(handle.name().to_ascii_lowercase())
            .or_insert_with(|| TxIndexLog {
                handle: Arc::clone(handle),
                log: ChangeLog::default(),
            })
            .log
    }

    fn log_put(&mut self, handle: &Arc<IndexHandle>, key: &IndexKey, rid: RecordId) {
        let keys = handle.read().storage_keys(key);
        let log = self.log_mut(handle);
        for key in keys {
            log.put(key, rid);
        }
    }

    fn log_remove(&mut self, handle: &Arc<IndexHandle>, key: &IndexKey, rid: Option<RecordId>) {
        let keys = handle.read().storage_keys(key);
        let log = self.log_mut(handle);
        for key in keys {
            log.remove(key, rid);
        }
    }

    fn apply_staged(&mut self, staged: Staged) {
        for op in staged.ops {
            match op {
                StagedOp::Put(handle, key, rid) => self.log_put(&handle, &key, rid),
                StagedOp::Remove(handle, key, rid) => self.log_remove(&handle, &key, Some(rid)),
            }
        }
    }

    /// Run `f` over the transaction's view of one index. The store guard is
    /// released before this returns.
    fn with_overlay<R>(&self, handle: &IndexHandle, f: impl FnOnce(&OverlayView<'_>) -> R) -> R {
        let store = handle.read();
        let log = self
            .logs
            .get(&handle.name().to_ascii_lowercase())
            .filter(|entry| entry.handle.id() == handle.id())
            .map(|entry| &entry.log);

        f(&OverlayView::new(&store, log, handle.definition().arity()))
    }

    // ------------------------------------------------------------------
    // Completion
    // ------------------------------------------------------------------

    /// Fold every buffered change into the stores and records.
    ///
    /// Either everything applies or nothing does; on failure the transaction
    /// ends rolled back and the error says why.
    pub fn commit(mut self) -> Result<(), InternalError> {
        self.ensure_active()?;

        match self.fold() {
            Ok((indexes, changes)) => {
                self.state = TxState::Committed;
                record(MetricsEvent::TxCommit { indexes, changes });
                debug!(tx = %self.id, indexes, changes, "transaction committed");

                Ok(())
            }
            Err(err) => {
                self.discard();
                if err.is_conflict() {
                    record(MetricsEvent::TxConflict);
                }
                record(MetricsEvent::TxRollback);
                warn!(tx = %self.id, error = %err.display_with_class(), "commit aborted");

                Err(err)
            }
        }
    }

    pub fn rollback(mut self) -> Result<(), InternalError> {
        self.ensure_active()?;
        self.discard();
        record(MetricsEvent::TxRollback);
        debug!(tx = %self.id, "transaction rolled back");

        Ok(())
    }

    fn discard(&mut self) {
        self.state = TxState::RolledBack;
        self.logs.clear();
        self.writes.clear();
        self.read_versions.clear();
    }

    fn fold(&mut self) -> Result<(u64, u64), InternalError> {
        let db = self.db;
        let manager = db.indexes.read();
        let mut records = db.records.write();

        // Phase 1: every record read for update is still at the version seen.
        for (rid, expected) in &self.read_versions {
            let found = records.version(*rid);
            if found != *expected {
                return Err(InternalError::concurrent_modification(*rid, *expected, found));
            }
        }

        // Phase 2: no index was dropped or recreated underneath the logs.
        for entry in self.logs.values() {
            match manager.get(entry.handle.name()) {
                Some(current) if current.id() == entry.handle.id() => {}
                _ => {
                    return Err(InternalError::new(
                        ErrorClass::Conflict,
                        ErrorOrigin::Transaction,
                        format!("index '{}' changed during the transaction", entry.handle.name()),
                    ));
                }
            }
        }

        // Phase 3: lock stores in name order and compute final value-sets.
        let mut guards: Vec<_> = self
            .logs
            .values()
            .map(|entry| (entry, entry.handle.write()))
            .collect();

        let mut finals: Vec<Vec<(IndexKey, BTreeSet<RecordId>)>> = Vec::with_capacity(guards.len());
        for (entry, store) in &guards {
            let mut keys = Vec::new();
            for key in entry.log.keys() {
                let stored = store.get(key);
                let rids = entry.log.replay(key, stored.clone());
                if store.is_unique() && rids.len() > 1 {
                    return Err(unique_conflict(&entry.handle, key, &stored, &rids));
                }
                keys.push((key.clone(), rids));
            }
            finals.push(keys);
        }

        // Phase 4: apply. Nothing below can fail.
        let mut changes = 0;
        for ((entry, store), keys) in guards.iter_mut().zip(finals) {
            if entry.log.is_cleared() {
                store.clear();
                record(MetricsEvent::IndexClear {
                    index: entry.handle.name(),
                });
            }
            for (key, rids) in keys {
                store.replace(key, rids);
            }

            let (puts, removes) = entry.log.op_counts();
            changes += puts + removes;
            record(MetricsEvent::IndexDelta {
                index: entry.handle.name(),
                puts,
                removes,
            });
        }
        drop(guards);

        for (rid, write) in std::mem::take(&mut self.writes) {
            match write {
                RecordWrite::Save(doc) => records.insert(doc),
                RecordWrite::Delete => {
                    records.remove(rid);
                }
            }
        }

        let indexes = u64::try_from(self.logs.len()).unwrap_or(u64::MAX);
        self.logs.clear();
        self.read_versions.clear();

        Ok((indexes, changes))
    }
}

fn unique_conflict(
    handle: &IndexHandle,
    key: &IndexKey,
    stored: &BTreeSet<RecordId>,
    rids: &BTreeSet<RecordId>,
) -> InternalError {
    let existing = rids
        .iter()
        .copied()
        .find(|rid| stored.contains(rid))
        .or_else(|| rids.first().copied());
    let attempted = rids.iter().copied().find(|rid| Some(*rid) != existing);

    match (existing, attempted) {
        (Some(existing), Some(attempted)) => {
            record(MetricsEvent::UniqueViolation {
                index: handle.name(),
            });
            InternalError::unique_violation(handle.name(), key.to_string(), existing, attempted)
        }
        _ => InternalError::tx_invariant(format!(
            "unique check on '{}' found no conflicting pair",
            handle.name()
        )),
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        if self.state == TxState::Active {
            self.discard();
            record(MetricsEvent::TxRollback);
            debug!(tx = %self.id, "abandoned transaction rolled back");
        }
    }
}

impl RecordSource for Transaction<'_> {
    fn load(&self, rid: RecordId) -> Option<Document> {
        Self::load(self, rid)
    }

    fn scan_clusters(&self, clusters: &[i32]) -> Vec<Document> {
        let mut docs: BTreeMap<RecordId, Document> = self
            .db
            .records
            .read()
            .scan_clusters(clusters)
            .into_iter()
            .map(|doc| (doc.rid(), doc))
            .collect();

        for (rid, write) in &self.writes {
            if !clusters.contains(&rid.cluster) {
                continue;
            }
            match write {
                RecordWrite::Save(doc) => {
                    docs.insert(*rid, doc.clone());
                }
                RecordWrite::Delete => {
                    docs.remove(rid);
                }
            }
        }

        docs.into_values().collect()
    }
}

impl ReadContext for Transaction<'_> {
    fn index_get(
        &self,
        index: &IndexHandle,
        key: &IndexKey,
    ) -> Result<BTreeSet<RecordId>, InternalError> {
        index.check_lookup_key(key)?;

        Ok(self.with_overlay(index, |view| view.get(key)))
    }

    fn index_entries_between(
        &self,
        index: &IndexHandle,
        range: &KeyRange,
        ascending: bool,
    ) -> Result<Vec<IndexEntry>, InternalError> {
        self.with_overlay(index, |view| view.entries_between(range, ascending))
            .map_err(|err| index.store_error(err))
    }

    fn index_entries_for_keys(
        &self,
        index: &IndexHandle,
        keys: &[IndexKey],
        ascending: bool,
    ) -> Result<Vec<IndexEntry>, InternalError> {
        for key in keys {
            index.check_lookup_key(key)?;
        }

        self.with_overlay(index, |view| view.entries_for_keys(keys, ascending))
            .map_err(|err| index.store_error(err))
    }
}
