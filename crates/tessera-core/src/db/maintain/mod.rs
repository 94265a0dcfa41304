//! Module: maintain
//! Responsibility: translate record create/update/delete into index puts
//! and removes, incrementally for collection fields with explicit deltas.
//! Does not own: where the puts land (direct store or transaction log).

mod delta;


pub use delta::{ChangeSet, CollectionChange};

use crate::{
    db::{
        index::{FieldMode, IndexDefinition, IndexHandle, IndexKey, KeyPart},
        record::{Document, RecordId},
    },
    error::InternalError,
    value::Value,
};
use std::{
    collections::{BTreeMap, BTreeSet},
    sync::Arc,
};

///
/// IndexSink
///
/// Destination of maintenance operations.
///

pub(crate) trait IndexSink {
    fn put(&mut self, index: &Arc<IndexHandle>, key: IndexKey, rid: RecordId)
    -> Result<(), InternalError>;

    fn remove(
        &mut self,
        index: &Arc<IndexHandle>,
        key: IndexKey,
        rid: RecordId,
    ) -> Result<(), InternalError>;
}

///
/// DirectSink
///
/// Applies maintenance straight to the stores; used by bulk builds.
///

pub(crate) struct DirectSink;

impl IndexSink for DirectSink {
    fn put(
        &mut self,
        index: &Arc<IndexHandle>,
        key: IndexKey,
        rid: RecordId,
    ) -> Result<(), InternalError> {
        index.put(key, rid)
    }

    fn remove(
        &mut self,
        index: &Arc<IndexHandle>,
        key: IndexKey,
        rid: RecordId,
    ) -> Result<(), InternalError> {
        index.remove(&key, Some(rid)).map(|_| ())
    }
}

///
/// IndexMaintainer
///
/// Maintenance over the indexes that apply to one record's class.
/// Indexes whose cluster scope excludes the record are skipped.
///

pub(crate) struct IndexMaintainer<'a> {
    indexes: &'a [Arc<IndexHandle>],
}

impl<'a> IndexMaintainer<'a> {
    pub(crate) const fn new(indexes: &'a [Arc<IndexHandle>]) -> Self {
        Self { indexes }
    }

    fn covering(&self, rid: RecordId) -> impl Iterator<Item = &'a Arc<IndexHandle>> {
        self.indexes.iter().filter(move |index| index.covers(rid))
    }

    pub(crate) fn on_create(
        &self,
        doc: &Document,
        sink: &mut dyn IndexSink,
    ) -> Result<(), InternalError> {
        let rid = doc.rid();
        for index in self.covering(rid) {
            for key in index.definition().keys_for(doc)? {
                sink.put(index, key, rid)?;
            }
        }

        Ok(())
    }

    /// Remove every key each indexed field contributed, element keys included.
    pub(crate) fn on_delete(
        &self,
        doc: &Document,
        sink: &mut dyn IndexSink,
    ) -> Result<(), InternalError> {
        let rid = doc.rid();
        for index in self.covering(rid) {
            for key in index.definition().keys_for(doc)? {
                sink.remove(index, key, rid)?;
            }
        }

        Ok(())
    }

    pub(crate) fn on_update(
        &self,
        before: &Document,
        after: &Document,
        changes: &ChangeSet,
        sink: &mut dyn IndexSink,
    ) -> Result<(), InternalError> {
        let rid = after.rid();
        let dirty = dirty_fields(before, after, changes);
        if dirty.is_empty() {
            return Ok(());
        }

        for index in self.covering(rid) {
            let def = index.definition();
            let touched: Vec<&str> = def
                .field_names()
                .filter(|f| dirty.contains(&f.to_ascii_lowercase()))
                .collect();
            if touched.is_empty() {
                continue;
            }

            // incremental path: the collection field is the only dirty field
            // of this index and the caller supplied its delta
            if let Some((_, field)) = def.collection_field()
                && touched.len() == 1
                && field.is(touched[0])
                && let Some(events) = changes.get(&field.name)
            {
                apply_delta(index, def, before, after, events, sink)?;
                continue;
            }

            let old: BTreeSet<IndexKey> = def.keys_for(before)?.into_iter().collect();
            let new: BTreeSet<IndexKey> = def.keys_for(after)?.into_iter().collect();
            for key in old.difference(&new) {
                sink.remove(index, key.clone(), rid)?;
            }
            for key in new.difference(&old) {
                sink.put(index, key.clone(), rid)?;
            }
        }

        Ok(())
    }
}

/// Lowercased names of fields whose value differs, plus fields with deltas.
fn dirty_fields(before: &Document, after: &Document, changes: &ChangeSet) -> BTreeSet<String> {
    let mut dirty: BTreeSet<String> = changes.field_names().map(str::to_string).collect();
    let names: BTreeSet<&str> = before
        .fields()
        .chain(after.fields())
        .map(|(name, _)| name)
        .collect();

    for name in names {
        if before.get(name) != after.get(name) {
            dirty.insert(name.to_ascii_lowercase());
        }
    }

    dirty
}

// Element edits fold into net add/remove counters so an element added and
// removed within one delta issues nothing.
//
// A removal is confirmed against the components left in `after`, since a
// list or map-value collection may still hold a duplicate. That is one pass
// over the collection per delta carrying a removal; the store keeps no
// occurrence counts. Map keys are unique and skip it.
fn apply_delta(
    index: &Arc<IndexHandle>,
    def: &IndexDefinition,
    before: &Document,
    after: &Document,
    events: &[CollectionChange],
    sink: &mut dyn IndexSink,
) -> Result<(), InternalError> {
    let Some((position, field)) = def.collection_field() else {
        return Ok(());
    };
    let mode = field.mode;
    let mut to_add: BTreeMap<IndexKey, usize> = BTreeMap::new();
    let mut to_remove: BTreeMap<IndexKey, usize> = BTreeMap::new();

    let mut add = |component: &Value| -> Result<(), InternalError> {
        if let Some(key) = def.key_with_component(after, component)? {
            net(&mut to_add, &mut to_remove, key);
        }
        Ok(())
    };
    let mut remove_keys: Vec<Value> = Vec::new();

    for event in events {
        match (mode, event) {
            (FieldMode::ByMapKey, CollectionChange::Added { key, .. }) => add(key)?,
            (FieldMode::ByMapKey, CollectionChange::Removed { key, .. }) => {
                remove_keys.push(key.clone());
            }
            (FieldMode::ByMapKey, CollectionChange::Updated { .. }) => {}
            (_, CollectionChange::Added { value, .. }) => add(value)?,
            (_, CollectionChange::Removed { old, .. }) => remove_keys.push(old.clone()),
            (_, CollectionChange::Updated { old, new, .. }) => {
                remove_keys.push(old.clone());
                add(new)?;
            }
        }
    }

    for component in &remove_keys {
        if let Some(key) = def.key_with_component(after, component)? {
            net(&mut to_remove, &mut to_add, key);
        }
    }

    let rid = after.rid();
    let pending: Vec<IndexKey> = to_remove
        .into_iter()
        .filter(|(_, n)| *n > 0)
        .map(|(key, _)| key)
        .collect();
    if !pending.is_empty() {
        let remaining = if mode == FieldMode::ByMapKey {
            BTreeSet::new()
        } else {
            def.collection_components(after)?
        };
        for key in pending {
            let kept = key
                .parts()
                .get(position)
                .and_then(KeyPart::as_value)
                .is_some_and(|component| remaining.contains(component));
            if !kept {
                sink.remove(index, key, rid)?;
            }
        }
    }
    for (key, _) in to_add.into_iter().filter(|(_, n)| *n > 0) {
        sink.put(index, key, rid)?;
    }

    // the null placeholder of an empty collection follows the emptiness
    let was_empty = def.empty_collection_key(before)?;
    let is_empty = def.empty_collection_key(after)?;
    if was_empty != is_empty {
        if let Some(key) = was_empty {
            sink.remove(index, key, rid)?;
        }
        if let Some(key) = is_empty {
            sink.put(index, key, rid)?;
        }
    }

    Ok(())
}

/// Record one occurrence of `key` in `target`, cancelling a pending
/// opposite occurrence first.
fn net(target: &mut BTreeMap<IndexKey, usize>, opposite: &mut BTreeMap<IndexKey, usize>, key: IndexKey) {
    match opposite.get_mut(&key) {
        Some(n) if *n > 0 => *n -= 1,
        _ => *target.entry(key).or_default() += 1,
    }
}
