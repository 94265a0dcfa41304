//! Database context: schema, records, the index registry and the plan
//! cache, plus the transactional and auto-commit entry points.

pub mod index;
pub mod maintain;
pub mod manager;
pub mod query;
mod read;
pub mod record;
pub mod schema;
pub mod tx;


pub use tx::{Transaction, TxId, TxState};

use crate::{
    config::DbConfig,
    db::{
        index::{IndexEntry, IndexHandle, IndexSpec},
        maintain::ChangeSet,
        manager::{IndexManager, NoProgress, ProgressListener},
        query::{
            ExplainPlan, IndexQuery, LogicalPlan, Query, exec,
            plan::{self, PlanCache},
            predicate::normalize,
        },
        read::{DirectRead, ReadContext},
        record::{Document, MemoryRecords, RecordId, RecordSource},
        schema::{ClassDef, Schema},
    },
    error::{ErrorOrigin, InternalError},
    obs::sink::{MetricsEvent, record},
};
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use tracing::debug;

///
/// Database
///
/// Explicit owner of one registry of indexes. Locks are always taken in
/// the order schema, indexes, records, index stores.
///

#[derive(Debug)]
pub struct Database {
    config: DbConfig,
    schema: RwLock<Schema>,
    records: RwLock<MemoryRecords>,
    indexes: RwLock<IndexManager>,
    plan_cache: Mutex<PlanCache>,
}

impl Default for Database {
    fn default() -> Self {
        Self::build(DbConfig::default())
    }
}

impl Database {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: DbConfig) -> Result<Self, InternalError> {
        config.validate()?;

        Ok(Self::build(config))
    }

    fn build(config: DbConfig) -> Self {
        let plan_cache = PlanCache::new(&config.plan_cache);

        Self {
            config,
            schema: RwLock::new(Schema::new()),
            records: RwLock::new(MemoryRecords::new()),
            indexes: RwLock::new(IndexManager::new()),
            plan_cache: Mutex::new(plan_cache),
        }
    }

    #[must_use]
    pub const fn config(&self) -> &DbConfig {
        &self.config
    }

    // ------------------------------------------------------------------
    // Schema
    // ------------------------------------------------------------------

    pub fn create_class(&self, def: ClassDef) -> Result<(), InternalError> {
        let name = def.name.clone();
        let mut schema = self.schema.write();
        schema.create_class(def)?;
        self.indexes.read().extend_to_class(&*schema, &name);
        drop(schema);
        self.plan_cache.lock().clear();

        Ok(())
    }

    /// Run a closure with read access to the class catalog.
    pub fn with_schema<R>(&self, f: impl FnOnce(&Schema) -> R) -> R {
        f(&self.schema.read())
    }

    // ------------------------------------------------------------------
    // Indexes
    // ------------------------------------------------------------------

    pub fn create_index(&self, spec: IndexSpec) -> Result<Arc<IndexHandle>, InternalError> {
        self.create_index_with_progress(spec, &mut NoProgress)
    }

    /// Register an index and bulk-build it over the existing records.
    pub fn create_index_with_progress(
        &self,
        spec: IndexSpec,
        listener: &mut dyn ProgressListener,
    ) -> Result<Arc<IndexHandle>, InternalError> {
        let schema = self.schema.read();
        let mut manager = self.indexes.write();
        let records = self.records.read();

        let handle = manager.create(spec, &schema, &*records, &self.config, listener)?;
        self.plan_cache.lock().clear();
        debug!(index = %handle.name(), kind = %handle.kind(), entries = handle.len(), "index created");

        Ok(handle)
    }

    pub fn drop_index(&self, name: &str) -> Result<(), InternalError> {
        self.indexes.write().drop_index(name)?;
        self.plan_cache.lock().clear();

        Ok(())
    }

    /// Clear and repopulate one index; returns its entry count.
    pub fn rebuild_index(
        &self,
        name: &str,
        listener: &mut dyn ProgressListener,
    ) -> Result<usize, InternalError> {
        let schema = self.schema.read();
        let manager = self.indexes.read();
        let records = self.records.read();

        manager.rebuild(name, &schema, &*records, &self.config, listener)
    }

    #[must_use]
    pub fn index(&self, name: &str) -> Option<Arc<IndexHandle>> {
        self.indexes.read().get(name)
    }

    /// Index `name`, only if declared on `class` itself.
    #[must_use]
    pub fn class_index(&self, class: &str, name: &str) -> Option<Arc<IndexHandle>> {
        self.indexes.read().class_index(class, name)
    }

    #[must_use]
    pub fn indexes(&self) -> Vec<Arc<IndexHandle>> {
        self.indexes.read().iter().cloned().collect()
    }

    /// Indexes declared on `class` itself.
    #[must_use]
    pub fn class_indexes(&self, class: &str) -> Vec<Arc<IndexHandle>> {
        self.indexes.read().get_for_class(class)
    }

    /// Indexes maintained for records of `class`, ancestors included.
    #[must_use]
    pub fn indexes_for_class(&self, class: &str) -> Vec<Arc<IndexHandle>> {
        let schema = self.schema.read();

        self.indexes.read().indexes_for_class(&*schema, class)
    }

    pub(crate) fn indexes_for_record(&self, class: &str) -> Vec<Arc<IndexHandle>> {
        self.indexes_for_class(class)
    }

    #[must_use]
    pub fn are_indexed(&self, class: &str, fields: &[&str]) -> bool {
        let schema = self.schema.read();

        self.indexes.read().are_indexed(&*schema, class, fields)
    }

    #[must_use]
    pub fn involved_indexes(&self, class: &str, fields: &[&str]) -> Vec<Arc<IndexHandle>> {
        let schema = self.schema.read();

        self.indexes.read().involved_indexes(&*schema, class, fields)
    }

    // ------------------------------------------------------------------
    // Records
    // ------------------------------------------------------------------

    #[must_use]
    pub fn begin(&self) -> Transaction<'_> {
        Transaction::begin(self)
    }

    /// Run `f` in a fresh transaction and commit it if `f` succeeds.
    pub fn transaction<R>(
        &self,
        f: impl FnOnce(&mut Transaction<'_>) -> Result<R, InternalError>,
    ) -> Result<R, InternalError> {
        let mut tx = self.begin();
        let out = f(&mut tx)?;
        tx.commit()?;

        Ok(out)
    }

    pub fn insert(&self, doc: Document) -> Result<RecordId, InternalError> {
        self.transaction(|tx| tx.insert(doc))
    }

    pub fn save(&self, doc: Document) -> Result<RecordId, InternalError> {
        self.transaction(|tx| tx.save(doc))
    }

    pub fn save_with_changes(
        &self,
        doc: Document,
        changes: &ChangeSet,
    ) -> Result<RecordId, InternalError> {
        self.transaction(|tx| tx.save_with_changes(doc, changes))
    }

    pub fn delete(&self, rid: RecordId) -> Result<(), InternalError> {
        self.transaction(|tx| tx.delete(rid))
    }

    #[must_use]
    pub fn load(&self, rid: RecordId) -> Option<Document> {
        self.records.read().load(rid)
    }

    #[must_use]
    pub fn record_count(&self) -> usize {
        self.records.read().len()
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    pub fn query(&self, query: &Query) -> Result<Vec<Document>, InternalError> {
        let plan = self.prepare(query)?;

        self.execute(&plan)
    }

    pub fn explain(&self, query: &Query) -> Result<ExplainPlan, InternalError> {
        Ok(self.prepare(query)?.explain())
    }

    /// Plan `query`, reusing a cached plan for the same normalized query.
    pub fn prepare(&self, query: &Query) -> Result<Arc<LogicalPlan>, InternalError> {
        let schema = self.schema.read();
        let manager = self.indexes.read();

        let mut cache = self.plan_cache.lock();
        let fingerprint = cache
            .is_enabled()
            .then(|| plan::fingerprint(query, &normalize(query.predicate())));
        if let Some(fingerprint) = fingerprint {
            let cached = cache.get(&fingerprint);
            record(MetricsEvent::PlanCache {
                hit: cached.is_some(),
            });
            if let Some(plan) = cached {
                return Ok(plan);
            }
        }

        let plan = Arc::new(plan::plan(query, &manager, &*schema)?);
        if let Some(fingerprint) = fingerprint {
            cache.insert(fingerprint, Arc::clone(&plan));
        }

        Ok(plan)
    }

    /// Execute a prepared plan against committed state.
    pub fn execute(&self, plan: &LogicalPlan) -> Result<Vec<Document>, InternalError> {
        self.execute_in(plan, &DirectRead::new(self))
    }

    pub(crate) fn execute_in(
        &self,
        plan: &LogicalPlan,
        ctx: &dyn ReadContext,
    ) -> Result<Vec<Document>, InternalError> {
        exec::execute(self, plan, ctx)
    }

    /// Read entries of one named index directly.
    pub fn index_query(&self, query: &IndexQuery) -> Result<Vec<IndexEntry>, InternalError> {
        self.index_query_in(query, &DirectRead::new(self))
    }

    pub(crate) fn index_query_in(
        &self,
        query: &IndexQuery,
        ctx: &dyn ReadContext,
    ) -> Result<Vec<IndexEntry>, InternalError> {
        let handle = self
            .index(query.index())
            .ok_or_else(|| InternalError::not_found(ErrorOrigin::Registry, "index", query.index()))?;

        exec::run_index_query(query, &handle, ctx)
    }

    #[cfg(test)]
    pub(crate) fn cached_plans(&self) -> usize {
        self.plan_cache.lock().len()
    }
}
