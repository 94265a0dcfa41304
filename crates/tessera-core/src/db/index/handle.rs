use crate::{
    config::FullTextConfig,
    db::{
        index::{
            definition::IndexDefinition,
            kind::IndexKind,
            key::{IndexKey, KeyRange},
            store::{IndexEntry, IndexOps, IndexStore, StoreError},
        },
        record::RecordId,
    },
    error::InternalError,
    obs::sink::{MetricsEvent, record},
};
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::{collections::BTreeSet, fmt};

///
/// IndexId
///
/// Registration generation of an index. A dropped and recreated index with
/// the same name receives a new id, which is how cached plans detect that
/// the index they reference went stale.
///

#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct IndexId(pub(crate) u64);

impl fmt::Display for IndexId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "idx#{}", self.0)
    }
}

///
/// IndexSpec
///
/// Creation request for one index. Empty `clusters` means every cluster of
/// the class and its subclasses.
///

#[derive(Clone, Debug)]
pub struct IndexSpec {
    pub name: String,
    pub kind: IndexKind,
    pub definition: IndexDefinition,
    pub clusters: Vec<i32>,
}

impl IndexSpec {
    #[must_use]
    pub fn new(name: impl Into<String>, kind: IndexKind, definition: IndexDefinition) -> Self {
        Self {
            name: name.into(),
            kind,
            definition,
            clusters: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_clusters(mut self, clusters: impl IntoIterator<Item = i32>) -> Self {
        self.clusters = clusters.into_iter().collect();
        self
    }
}

///
/// IndexHandle
///
/// A registered index: identity, definition, cluster scope and its store.
/// Direct operations lock the store and apply immediately; transactional
/// writes go through `db::tx` and reach the store only when folded.
///
/// An index created without explicit clusters follows its class: clusters
/// of subclasses created later join its scope.
///

#[derive(Debug)]
pub struct IndexHandle {
    id: IndexId,
    name: String,
    kind: IndexKind,
    definition: IndexDefinition,
    clusters: RwLock<BTreeSet<i32>>,
    follows_class: bool,
    store: RwLock<IndexStore>,
}

impl IndexHandle {
    pub(crate) fn new(
        id: IndexId,
        spec: IndexSpec,
        clusters: BTreeSet<i32>,
        fulltext: &FullTextConfig,
    ) -> Self {
        let store = IndexStore::new(spec.kind, spec.definition.arity(), fulltext);

        Self {
            id,
            name: spec.name,
            kind: spec.kind,
            definition: spec.definition,
            clusters: RwLock::new(clusters),
            follows_class: spec.clusters.is_empty(),
            store: RwLock::new(store),
        }
    }

    #[must_use]
    pub const fn id(&self) -> IndexId {
        self.id
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub const fn kind(&self) -> IndexKind {
        self.kind
    }

    #[must_use]
    pub const fn definition(&self) -> &IndexDefinition {
        &self.definition
    }

    #[must_use]
    pub fn clusters(&self) -> BTreeSet<i32> {
        self.clusters.read().clone()
    }

    /// True when the scope was derived from the class rather than given.
    #[must_use]
    pub const fn follows_class(&self) -> bool {
        self.follows_class
    }

    #[must_use]
    pub fn covers(&self, rid: RecordId) -> bool {
        self.clusters.read().contains(&rid.cluster)
    }

    /// True when every one of `clusters` is in scope.
    #[must_use]
    pub fn covers_all(&self, clusters: &[i32]) -> bool {
        let scope = self.clusters.read();
        clusters.iter().all(|c| scope.contains(c))
    }

    pub(crate) fn add_clusters(&self, clusters: impl IntoIterator<Item = i32>) {
        self.clusters.write().extend(clusters);
    }

    pub(crate) fn read(&self) -> RwLockReadGuard<'_, IndexStore> {
        self.store.read()
    }

    pub(crate) fn write(&self) -> RwLockWriteGuard<'_, IndexStore> {
        self.store.write()
    }

    /// Reject keys that cannot address this index.
    pub(crate) fn check_lookup_key(&self, key: &IndexKey) -> Result<(), InternalError> {
        let expected = if self.kind.is_fulltext() {
            1
        } else {
            self.definition.arity()
        };
        if key.arity() == 0 || key.arity() > expected || !key.is_sentinel_free() {
            return Err(InternalError::invalid_key_shape(
                &self.name,
                expected,
                key.arity(),
            ));
        }

        Ok(())
    }

    pub(crate) fn store_error(&self, err: StoreError) -> InternalError {
        match err {
            StoreError::UniqueViolation {
                key,
                existing,
                attempted,
            } => {
                record(MetricsEvent::UniqueViolation { index: &self.name });
                InternalError::unique_violation(&self.name, key.to_string(), existing, attempted)
            }
            StoreError::Shape { key, expected } => {
                InternalError::invalid_key_shape(&self.name, expected, key.arity())
            }
            StoreError::Unsupported { .. } => {
                InternalError::index_unsupported(format!("{}: {err}", self.name))
            }
        }
    }

    pub fn put(&self, key: IndexKey, rid: RecordId) -> Result<(), InternalError> {
        self.write()
            .put(key, rid)
            .map_err(|err| self.store_error(err))?;
        record(MetricsEvent::IndexDelta {
            index: &self.name,
            puts: 1,
            removes: 0,
        });

        Ok(())
    }

    pub fn remove(&self, key: &IndexKey, rid: Option<RecordId>) -> Result<bool, InternalError> {
        self.check_lookup_key(key)?;
        let removed = self.write().remove(key, rid);
        if removed {
            record(MetricsEvent::IndexDelta {
                index: &self.name,
                puts: 0,
                removes: 1,
            });
        }

        Ok(removed)
    }

    pub fn get(&self, key: &IndexKey) -> Result<BTreeSet<RecordId>, InternalError> {
        self.check_lookup_key(key)?;

        Ok(self.read().get(key))
    }

    pub fn contains(&self, key: &IndexKey) -> Result<bool, InternalError> {
        Ok(!self.get(key)?.is_empty())
    }

    /// Range between two possibly partial keys of this index.
    pub fn range(
        &self,
        lower: Option<&IndexKey>,
        lower_inclusive: bool,
        upper: Option<&IndexKey>,
        upper_inclusive: bool,
    ) -> Result<KeyRange, InternalError> {
        for key in [lower, upper].into_iter().flatten() {
            self.check_lookup_key(key)?;
        }

        Ok(KeyRange::between(
            self.definition.arity(),
            lower,
            lower_inclusive,
            upper,
            upper_inclusive,
        ))
    }

    pub fn entries_between(
        &self,
        range: &KeyRange,
        ascending: bool,
    ) -> Result<Vec<IndexEntry>, InternalError> {
        self.read()
            .entries_between(range, ascending)
            .map_err(|err| self.store_error(err))
    }

    pub fn values_between(
        &self,
        range: &KeyRange,
        ascending: bool,
    ) -> Result<Vec<RecordId>, InternalError> {
        self.read()
            .values_between(range, ascending)
            .map_err(|err| self.store_error(err))
    }

    pub fn entries_for_keys(
        &self,
        keys: &[IndexKey],
        ascending: bool,
    ) -> Result<Vec<IndexEntry>, InternalError> {
        for key in keys {
            self.check_lookup_key(key)?;
        }

        self.read()
            .entries_for_keys(keys, ascending)
            .map_err(|err| self.store_error(err))
    }

    pub fn clear(&self) {
        self.write().clear();
        record(MetricsEvent::IndexClear { index: &self.name });
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn key_count(&self) -> usize {
        self.read().key_count()
    }
}
