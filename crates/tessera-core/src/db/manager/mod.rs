//! Module: manager
//! Responsibility: registry of named indexes per database, lookup by class
//! and field set, bulk build and rebuild.
//! Does not own: query-time index choice (see `query::plan`).

#[cfg(test)]
mod tests;

use crate::{
    config::DbConfig,
    db::{
        index::{IndexHandle, IndexId, IndexSpec},
        maintain::{DirectSink, IndexMaintainer},
        record::RecordSource,
        schema::{ClassCatalog, Schema},
    },
    error::{ErrorOrigin, InternalError},
};
use std::{
    collections::{BTreeMap, BTreeSet},
    slice,
    sync::Arc,
};
use tracing::debug;

///
/// ProgressListener
///
/// Observer of a bulk index build. Every method has a no-op default.
///

pub trait ProgressListener {
    fn on_begin(&mut self, _index: &str, _total: usize) {}

    fn on_progress(&mut self, _index: &str, _done: usize, _total: usize) {}

    fn on_completed(&mut self, _index: &str, _succeeded: bool) {}
}

///
/// NoProgress
///

pub struct NoProgress;

impl ProgressListener for NoProgress {}

///
/// IndexManager
///
/// Indexes keyed by lowercase name, plus a per-class lookup from every
/// leading field set of a definition to the indexes it starts.
///

#[derive(Debug, Default)]
pub struct IndexManager {
    indexes: BTreeMap<String, Arc<IndexHandle>>,
    class_index: BTreeMap<String, BTreeMap<BTreeSet<String>, BTreeSet<String>>>,
    next_id: u64,
}

impl IndexManager {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register and populate a new index.
    ///
    /// The index becomes visible only after the bulk build succeeded.
    pub fn create(
        &mut self,
        spec: IndexSpec,
        schema: &Schema,
        records: &dyn RecordSource,
        config: &DbConfig,
        listener: &mut dyn ProgressListener,
    ) -> Result<Arc<IndexHandle>, InternalError> {
        let key = spec.name.to_ascii_lowercase();
        if self.indexes.contains_key(&key) {
            return Err(InternalError::already_exists(
                ErrorOrigin::Registry,
                "index",
                &spec.name,
            ));
        }

        let class = spec.definition.class();
        if schema.class(class).is_none() {
            return Err(InternalError::not_found(ErrorOrigin::Schema, "class", class));
        }
        if spec.kind.is_fulltext() && spec.definition.is_composite() {
            return Err(InternalError::index_unsupported(format!(
                "full-text index '{}' must have exactly one field",
                spec.name
            )));
        }

        let clusters: BTreeSet<i32> = if spec.clusters.is_empty() {
            schema.polymorphic_clusters(class).into_iter().collect()
        } else {
            spec.clusters.iter().copied().collect()
        };

        self.next_id += 1;
        let handle = Arc::new(IndexHandle::new(
            IndexId(self.next_id),
            spec,
            clusters,
            &config.fulltext,
        ));

        populate(&handle, schema, records, config.build.progress_step, listener)?;
        self.register(&handle);

        Ok(handle)
    }

    fn register(&mut self, handle: &Arc<IndexHandle>) {
        let name = handle.name().to_ascii_lowercase();
        let def = handle.definition();
        let by_fields = self
            .class_index
            .entry(def.class().to_ascii_lowercase())
            .or_default();

        let mut prefix = BTreeSet::new();
        for field in def.field_names() {
            prefix.insert(field.to_ascii_lowercase());
            by_fields
                .entry(prefix.clone())
                .or_default()
                .insert(name.clone());
        }

        self.indexes.insert(name, Arc::clone(handle));
    }

    pub fn drop_index(&mut self, name: &str) -> Result<Arc<IndexHandle>, InternalError> {
        let key = name.to_ascii_lowercase();
        let handle = self
            .indexes
            .remove(&key)
            .ok_or_else(|| InternalError::not_found(ErrorOrigin::Registry, "index", name))?;

        let class = handle.definition().class().to_ascii_lowercase();
        if let Some(by_fields) = self.class_index.get_mut(&class) {
            for names in by_fields.values_mut() {
                names.remove(&key);
            }
            by_fields.retain(|_, names| !names.is_empty());
            if by_fields.is_empty() {
                self.class_index.remove(&class);
            }
        }
        debug!(index = %handle.name(), id = %handle.id(), "index dropped");

        Ok(handle)
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<IndexHandle>> {
        self.indexes.get(&name.to_ascii_lowercase()).cloned()
    }

    /// Index `name`, only if it is declared on `class` itself.
    #[must_use]
    pub fn class_index(&self, class: &str, name: &str) -> Option<Arc<IndexHandle>> {
        self.get(name)
            .filter(|h| h.definition().class().eq_ignore_ascii_case(class))
    }

    /// Indexes declared on `class` itself, by name.
    #[must_use]
    pub fn get_for_class(&self, class: &str) -> Vec<Arc<IndexHandle>> {
        self.indexes
            .values()
            .filter(|h| h.definition().class().eq_ignore_ascii_case(class))
            .cloned()
            .collect()
    }

    /// Indexes that apply to records of `class`: its own and those of its
    /// ancestors, base class first.
    #[must_use]
    pub fn indexes_for_class(&self, schema: &dyn ClassCatalog, class: &str) -> Vec<Arc<IndexHandle>> {
        schema
            .superclass_chain(class)
            .into_iter()
            .rev()
            .flat_map(|c| self.get_for_class(&c.name))
            .collect()
    }

    /// Bring the clusters of a newly created `class` into the scope of every
    /// ancestor index whose scope follows its class.
    pub fn extend_to_class(&self, schema: &dyn ClassCatalog, class: &str) {
        let Some(clusters) = schema.class(class).map(|c| c.clusters.clone()) else {
            return;
        };

        for ancestor in schema.superclass_chain(class).into_iter().skip(1) {
            for handle in self.get_for_class(&ancestor.name) {
                if handle.follows_class() {
                    handle.add_clusters(clusters.iter().copied());
                    debug!(index = %handle.name(), class, ?clusters, "index scope extended");
                }
            }
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<IndexHandle>> {
        self.indexes.values()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.indexes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.indexes.is_empty()
    }

    /// True when some index of `class` or an ancestor starts with exactly
    /// `fields`, in any order, compared case-insensitively.
    #[must_use]
    pub fn are_indexed(&self, schema: &dyn ClassCatalog, class: &str, fields: &[&str]) -> bool {
        let key = field_set(fields);

        schema.superclass_chain(class).into_iter().any(|c| {
            self.class_index
                .get(&c.name.to_ascii_lowercase())
                .and_then(|by_fields| by_fields.get(&key))
                .is_some_and(|names| !names.is_empty())
        })
    }

    /// Indexes whose leading fields are exactly `fields`, searched from
    /// `class` up through its ancestors. An index that ignores nulls is
    /// returned only when `fields` cover all of it.
    #[must_use]
    pub fn involved_indexes(
        &self,
        schema: &dyn ClassCatalog,
        class: &str,
        fields: &[&str],
    ) -> Vec<Arc<IndexHandle>> {
        let key = field_set(fields);
        let mut found = Vec::new();

        for c in schema.superclass_chain(class) {
            let Some(names) = self
                .class_index
                .get(&c.name.to_ascii_lowercase())
                .and_then(|by_fields| by_fields.get(&key))
            else {
                continue;
            };

            found.extend(
                names
                    .iter()
                    .filter_map(|name| self.indexes.get(name))
                    .filter(|h| {
                        let def = h.definition();
                        !def.ignore_nulls() || def.arity() == key.len()
                    })
                    .cloned(),
            );
        }

        found
    }

    /// Clear and repopulate one index from the records it covers.
    pub fn rebuild(
        &self,
        name: &str,
        schema: &Schema,
        records: &dyn RecordSource,
        config: &DbConfig,
        listener: &mut dyn ProgressListener,
    ) -> Result<usize, InternalError> {
        let handle = self
            .get(name)
            .ok_or_else(|| InternalError::not_found(ErrorOrigin::Registry, "index", name))?;

        handle.clear();
        populate(&handle, schema, records, config.build.progress_step, listener)?;

        Ok(handle.len())
    }
}

fn field_set(fields: &[&str]) -> BTreeSet<String> {
    fields.iter().map(|f| f.to_ascii_lowercase()).collect()
}

// Bulk build over every record of the index's clusters whose class is the
// indexed class or a subclass of it.
fn populate(
    handle: &Arc<IndexHandle>,
    schema: &Schema,
    records: &dyn RecordSource,
    progress_step: usize,
    listener: &mut dyn ProgressListener,
) -> Result<(), InternalError> {
    let class = handle.definition().class();
    let clusters: Vec<i32> = handle.clusters().iter().copied().collect();
    let docs: Vec<_> = records
        .scan_clusters(&clusters)
        .into_iter()
        .filter(|doc| schema.is_subclass_of(doc.class(), class))
        .collect();

    let total = docs.len();
    listener.on_begin(handle.name(), total);

    let maintainer = IndexMaintainer::new(slice::from_ref(handle));
    let step = progress_step.max(1);
    for (done, doc) in docs.iter().enumerate() {
        if let Err(err) = maintainer.on_create(doc, &mut DirectSink) {
            listener.on_completed(handle.name(), false);
            return Err(err);
        }
        if (done + 1) % step == 0 {
            listener.on_progress(handle.name(), done + 1, total);
        }
    }

    listener.on_completed(handle.name(), true);
    debug!(
        index = %handle.name(),
        id = %handle.id(),
        records = total,
        entries = handle.len(),
        "index built"
    );

    Ok(())
}
