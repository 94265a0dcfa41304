use crate::db::{
    index::{
        IndexKey, KeyRange,
        store::{IndexEntry, IndexOps, IndexStore, StoreError, ordered_keys, push_entries},
    },
    record::RecordId,
    tx::log::ChangeLog,
};
use std::collections::{BTreeMap, BTreeSet};

///
/// OverlayView
///
/// Read view of one index as seen by a transaction: the committed store
/// answer with the transaction's change log replayed on top. Without a log
/// every call goes straight to the store.
///

pub(crate) struct OverlayView<'a> {
    store: &'a IndexStore,
    log: Option<&'a ChangeLog>,
    arity: usize,
}

impl<'a> OverlayView<'a> {
    pub(crate) const fn new(store: &'a IndexStore, log: Option<&'a ChangeLog>, arity: usize) -> Self {
        Self { store, log, arity }
    }

    pub(crate) fn get(&self, key: &IndexKey) -> BTreeSet<RecordId> {
        let key = self.store.lookup_key(key);
        let stored = self.store.get(&key);

        match self.log {
            None => stored,
            Some(log) => log.replay(&key, stored),
        }
    }

    pub(crate) fn entries_between(
        &self,
        range: &KeyRange,
        ascending: bool,
    ) -> Result<Vec<IndexEntry>, StoreError> {
        // the store call also surfaces kinds that cannot scan ranges
        let stored = self.store.entries_between(range, ascending)?;
        let Some(log) = self.log else {
            return Ok(stored);
        };

        // Phase 1: committed entries, unless the log cleared them.
        let mut merged: BTreeMap<IndexKey, BTreeSet<RecordId>> = BTreeMap::new();
        if !log.is_cleared() {
            for (key, rid) in stored {
                merged.entry(key).or_default().insert(rid);
            }
        }

        // Phase 2: replay every logged key inside the range.
        for key in log.keys().filter(|k| range.contains(k)) {
            let rids = log.replay(key, self.store.get(key));
            merged.insert(key.clone(), rids);
        }

        let mut out = Vec::new();
        if ascending {
            for (key, rids) in &merged {
                push_entries(&mut out, key, rids, true);
            }
        } else {
            for (key, rids) in merged.iter().rev() {
                push_entries(&mut out, key, rids, false);
            }
        }

        Ok(out)
    }

    pub(crate) fn entries_for_keys(
        &self,
        keys: &[IndexKey],
        ascending: bool,
    ) -> Result<Vec<IndexEntry>, StoreError> {
        if self.log.is_none() {
            return self.store.entries_for_keys(keys, ascending);
        }

        let normalized: Vec<IndexKey> = keys.iter().map(|k| self.store.lookup_key(k)).collect();
        let mut out = Vec::new();
        for key in ordered_keys(&normalized, ascending) {
            if key.arity() < self.arity {
                out.extend(self.entries_between(&KeyRange::prefix(self.arity, &key), ascending)?);
            } else {
                push_entries(&mut out, &key, &self.get(&key), ascending);
            }
        }

        Ok(out)
    }

    /// Entry count as the transaction sees it.
    pub(crate) fn len(&self) -> usize {
        let Some(log) = self.log else {
            return self.store.len();
        };

        let base = if log.is_cleared() { 0 } else { self.store.len() };
        log.keys().fold(base, |count, key| {
            let stored = self.store.get(key);
            let visible = log.replay(key, stored.clone()).len();
            let hidden = if log.is_cleared() { 0 } else { stored.len() };
            count + visible - hidden
        })
    }
}
