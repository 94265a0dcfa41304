//! Module: index::store
//! Responsibility: key -> record-set containers for every index kind.
//! Does not own: transaction buffering (see `db::tx`) or key extraction.

mod fulltext;
mod hash;
mod tree;


pub use fulltext::FullTextStore;
pub use hash::HashStore;
pub use tree::TreeStore;

use crate::{
    config::FullTextConfig,
    db::{
        index::{
            kind::IndexKind,
            key::{IndexKey, KeyRange},
        },
        record::RecordId,
    },
};
use std::collections::BTreeSet;
use thiserror::Error as ThisError;

/// (key, record) pair yielded by scans, in scan order.
pub type IndexEntry = (IndexKey, RecordId);

///
/// StoreError
///
/// Store-level failures; the owning index handle adds its name.
///

#[derive(Debug, Eq, PartialEq, ThisError)]
pub enum StoreError {
    #[error("key {key} already maps to {existing}, cannot add {attempted}")]
    UniqueViolation {
        key: IndexKey,
        existing: RecordId,
        attempted: RecordId,
    },

    #[error("key {key} does not fit arity {expected}")]
    Shape { key: IndexKey, expected: usize },

    #[error("{kind} index does not support {op}")]
    Unsupported { kind: IndexKind, op: &'static str },
}

///
/// IndexOps
///
/// Operations shared by every index kind. Value-sets are ordered by record id.
///

pub trait IndexOps {
    fn put(&mut self, key: IndexKey, rid: RecordId) -> Result<(), StoreError>;

    /// Remove one record from `key`, or the whole key when `rid` is `None`.
    /// Returns whether anything was removed.
    fn remove(&mut self, key: &IndexKey, rid: Option<RecordId>) -> bool;

    fn get(&self, key: &IndexKey) -> BTreeSet<RecordId>;

    fn contains(&self, key: &IndexKey) -> bool {
        !self.get(key).is_empty()
    }

    fn entries_between(
        &self,
        range: &KeyRange,
        ascending: bool,
    ) -> Result<Vec<IndexEntry>, StoreError>;

    fn values_between(&self, range: &KeyRange, ascending: bool) -> Result<Vec<RecordId>, StoreError> {
        Ok(self
            .entries_between(range, ascending)?
            .into_iter()
            .map(|(_, rid)| rid)
            .collect())
    }

    /// Entries for discrete keys; partial composite keys address their prefix.
    fn entries_for_keys(
        &self,
        keys: &[IndexKey],
        ascending: bool,
    ) -> Result<Vec<IndexEntry>, StoreError>;

    fn clear(&mut self);

    /// Overwrite the value-set of one key; an empty set removes the key.
    fn replace(&mut self, key: IndexKey, rids: BTreeSet<RecordId>);

    /// Number of (key, record) entries.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn key_count(&self) -> usize;
}

///
/// IndexStore
///
/// Closed enum over the store implementations. Dispatches `IndexOps` and
/// carries the per-kind key normalisation used by transaction logs.
///

#[derive(Debug)]
pub enum IndexStore {
    Tree(TreeStore),
    Hash(HashStore),
    FullText(FullTextStore),
}

impl IndexStore {
    #[must_use]
    pub fn new(kind: IndexKind, arity: usize, fulltext: &FullTextConfig) -> Self {
        match kind {
            IndexKind::Unique => Self::Tree(TreeStore::new(true, arity)),
            IndexKind::NotUnique => Self::Tree(TreeStore::new(false, arity)),
            IndexKind::UniqueHash => Self::Hash(HashStore::new(true, arity)),
            IndexKind::NotUniqueHash => Self::Hash(HashStore::new(false, arity)),
            IndexKind::FullText => Self::FullText(FullTextStore::new(fulltext.clone())),
        }
    }

    #[must_use]
    pub const fn is_unique(&self) -> bool {
        match self {
            Self::Tree(s) => s.is_unique(),
            Self::Hash(s) => s.is_unique(),
            Self::FullText(_) => false,
        }
    }

    /// Keys a put or remove of `key` touches in storage.
    /// Full-text keys expand into their words.
    #[must_use]
    pub fn storage_keys(&self, key: &IndexKey) -> Vec<IndexKey> {
        match self {
            Self::FullText(s) => s.words(key),
            Self::Tree(_) | Self::Hash(_) => vec![key.clone()],
        }
    }

    /// Normalised form of a lookup key.
    #[must_use]
    pub fn lookup_key(&self, key: &IndexKey) -> IndexKey {
        match self {
            Self::FullText(s) => s.normalize(key),
            Self::Tree(_) | Self::Hash(_) => key.clone(),
        }
    }

    fn inner(&self) -> &dyn IndexOps {
        match self {
            Self::Tree(s) => s,
            Self::Hash(s) => s,
            Self::FullText(s) => s,
        }
    }

    fn inner_mut(&mut self) -> &mut dyn IndexOps {
        match self {
            Self::Tree(s) => s,
            Self::Hash(s) => s,
            Self::FullText(s) => s,
        }
    }
}

impl IndexOps for IndexStore {
    fn put(&mut self, key: IndexKey, rid: RecordId) -> Result<(), StoreError> {
        self.inner_mut().put(key, rid)
    }

    fn remove(&mut self, key: &IndexKey, rid: Option<RecordId>) -> bool {
        self.inner_mut().remove(key, rid)
    }

    fn get(&self, key: &IndexKey) -> BTreeSet<RecordId> {
        self.inner().get(key)
    }

    fn entries_between(
        &self,
        range: &KeyRange,
        ascending: bool,
    ) -> Result<Vec<IndexEntry>, StoreError> {
        self.inner().entries_between(range, ascending)
    }

    fn entries_for_keys(
        &self,
        keys: &[IndexKey],
        ascending: bool,
    ) -> Result<Vec<IndexEntry>, StoreError> {
        self.inner().entries_for_keys(keys, ascending)
    }

    fn clear(&mut self) {
        self.inner_mut().clear();
    }

    fn replace(&mut self, key: IndexKey, rids: BTreeSet<RecordId>) {
        self.inner_mut().replace(key, rids);
    }

    fn len(&self) -> usize {
        self.inner().len()
    }

    fn key_count(&self) -> usize {
        self.inner().key_count()
    }
}

/// Sorted, deduplicated copy of `keys` in scan direction.
pub(crate) fn ordered_keys(keys: &[IndexKey], ascending: bool) -> Vec<IndexKey> {
    let mut sorted: Vec<IndexKey> = keys.to_vec();
    sorted.sort();
    sorted.dedup();
    if !ascending {
        sorted.reverse();
    }

    sorted
}

/// Flatten one key's value-set into entries in scan direction.
pub(crate) fn push_entries(
    out: &mut Vec<IndexEntry>,
    key: &IndexKey,
    rids: &BTreeSet<RecordId>,
    ascending: bool,
) {
    if ascending {
        out.extend(rids.iter().map(|rid| (key.clone(), *rid)));
    } else {
        out.extend(rids.iter().rev().map(|rid| (key.clone(), *rid)));
    }
}
