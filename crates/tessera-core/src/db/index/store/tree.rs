use crate::db::{
    index::{
        key::{IndexKey, KeyRange},
        store::{IndexEntry, IndexOps, StoreError, ordered_keys, push_entries},
    },
    record::RecordId,
};
use std::collections::{BTreeMap, BTreeSet};

///
/// TreeStore
///
/// Ordered store backing UNIQUE and NOT_UNIQUE indexes.
///

#[derive(Debug)]
pub struct TreeStore {
    unique: bool,
    arity: usize,
    map: BTreeMap<IndexKey, BTreeSet<RecordId>>,
    entries: usize,
}

impl TreeStore {
    #[must_use]
    pub const fn new(unique: bool, arity: usize) -> Self {
        Self {
            unique,
            arity,
            map: BTreeMap::new(),
            entries: 0,
        }
    }

    #[must_use]
    pub const fn is_unique(&self) -> bool {
        self.unique
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

    fn scan(&self, range: &KeyRange, ascending: bool, out: &mut Vec<IndexEntry>) {
        if range.is_empty() {
            return;
        }

        let iter = self.map.range(range.as_bounds());
        if ascending {
            for (key, rids) in iter {
                push_entries(out, key, rids, true);
            }
        } else {
            for (key, rids) in iter.rev() {
                push_entries(out, key, rids, false);
            }
        }
    }
}

impl IndexOps for TreeStore {
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
        range: &KeyRange,
        ascending: bool,
    ) -> Result<Vec<IndexEntry>, StoreError> {
        let mut out = Vec::new();
        self.scan(range, ascending, &mut out);

        Ok(out)
    }

    fn entries_for_keys(
        &self,
        keys: &[IndexKey],
        ascending: bool,
    ) -> Result<Vec<IndexEntry>, StoreError> {
        let mut out = Vec::new();
        for key in ordered_keys(keys, ascending) {
            if key.arity() > self.arity {
                return Err(StoreError::Shape {
                    key,
                    expected: self.arity,
                });
            }
            if key.arity() < self.arity {
                self.scan(&KeyRange::prefix(self.arity, &key), ascending, &mut out);
            } else if let Some(rids) = self.map.get(&key) {
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
