use crate::db::{
    index::{
        kind::IndexKind,
        key::{IndexKey, KeyRange},
        store::{IndexEntry, IndexOps, StoreError, ordered_keys, push_entries},
    },
    record::RecordId,
};
use std::collections::{BTreeSet, HashMap};

///
/// HashStore
///
/// Unordered store backing the hash kinds. Point lookups only; partial keys
/// and ranges are rejected.
///

#[derive(Debug)]
pub struct HashStore {
    unique: bool,
    arity: usize,
    map: HashMap<IndexKey, BTreeSet<RecordId>>,
    entries: usize,
}

impl HashStore {
    #[must_use]
    pub fn new(unique: bool, arity: usize) -> Self {
        Self {
            unique,
            arity,
            map: HashMap::new(),
            entries: 0,
        }
    }

    #[must_use]
    pub const fn is_unique(&self) -> bool {
        self.unique
    }

    const fn kind(&self) -> IndexKind {
        if self.unique {
            IndexKind::UniqueHash
        } else {
            IndexKind::NotUniqueHash
        }
    }

    fn check_full(&self, key: &IndexKey) -> Result<(), StoreError> {
        if key.arity() == self.arity && key.is_sentinel_free() {
            Ok(())
        } else {
            Err(StoreError::Shape {
                key: key.clone(),
                expected: self.arity,
            })
        }
    }
}

impl IndexOps for HashStore {
    fn put(&mut self, key: IndexKey, rid: RecordId) -> Result<(), StoreError> {
        self.check_full(&key)?;

        if self.unique
            && let Some(existing) = self.map.get(&key).and_then(BTreeSet::first).copied()
            && existing != rid
        {
            return Err(StoreError::UniqueViolation {
                key,
                existing,
                attempted: rid,
            });
        }
        if self.map.entry(key).or_default().insert(rid) {
            self.entries += 1;
        }

        Ok(())
    }

    fn remove(&mut self, key: &IndexKey, rid: Option<RecordId>) -> bool {
        let Some(rids) = self.map.get_mut(key) else {
            return false;
        };

        let removed = match rid {
            Some(rid) => usize::from(rids.remove(&rid)),
            None => std::mem::take(rids).len(),
        };
        if rids.is_empty() {
            self.map.remove(key);
        }
        self.entries -= removed;

        removed > 0
    }

    fn get(&self, key: &IndexKey) -> BTreeSet<RecordId> {
        self.map.get(key).cloned().unwrap_or_default()
    }

    fn entries_between(
        &self,
        _range: &KeyRange,
        _ascending: bool,
    ) -> Result<Vec<IndexEntry>, StoreError> {
        Err(StoreError::Unsupported {
            kind: self.kind(),
            op: "range scans",
        })
    }

    fn entries_for_keys(
        &self,
        keys: &[IndexKey],
        ascending: bool,
    ) -> Result<Vec<IndexEntry>, StoreError> {
        let mut out = Vec::new();
        for key in ordered_keys(keys, ascending) {
            if key.arity() != self.arity {
                return Err(StoreError::Unsupported {
                    kind: self.kind(),
                    op: "partial key lookups",
                });
            }
            if let Some(rids) = self.map.get(&key) {
                push_entries(&mut out, &key, rids, ascending);
            }
        }

        Ok(out)
    }

    fn clear(&mut self) {
        self.map.clear();
        self.entries = 0;
    }

    fn replace(&mut self, key: IndexKey, rids: BTreeSet<RecordId>) {
        let added = rids.len();
        let previous = if rids.is_empty() {
            self.map.remove(&key)
        } else {
            self.map.insert(key, rids)
        };
        self.entries = self.entries - previous.map_or(0, |p| p.len()) + added;
    }

    fn len(&self) -> usize {
        self.entries
    }

    fn key_count(&self) -> usize {
        self.map.len()
    }
}
