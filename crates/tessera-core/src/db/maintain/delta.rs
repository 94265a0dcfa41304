use crate::value::Value;
use std::collections::BTreeMap;

///
/// CollectionChange
///
/// One element-level edit of a list or map field. For lists `key` is the
/// element position; for maps it is the entry key.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum CollectionChange {
    Added { key: Value, value: Value },
    Removed { key: Value, old: Value },
    Updated { key: Value, old: Value, new: Value },
}

impl CollectionChange {
    #[must_use]
    pub fn list_added(position: usize, value: impl Into<Value>) -> Self {
        Self::Added {
            key: position_value(position),
            value: value.into(),
        }
    }

    #[must_use]
    pub fn list_removed(position: usize, old: impl Into<Value>) -> Self {
        Self::Removed {
            key: position_value(position),
            old: old.into(),
        }
    }

    #[must_use]
    pub fn list_updated(position: usize, old: impl Into<Value>, new: impl Into<Value>) -> Self {
        Self::Updated {
            key: position_value(position),
            old: old.into(),
            new: new.into(),
        }
    }

    #[must_use]
    pub fn map_inserted(key: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Added {
            key: Value::Text(key.into()),
            value: value.into(),
        }
    }

    #[must_use]
    pub fn map_removed(key: impl Into<String>, old: impl Into<Value>) -> Self {
        Self::Removed {
            key: Value::Text(key.into()),
            old: old.into(),
        }
    }

    #[must_use]
    pub fn map_updated(key: impl Into<String>, old: impl Into<Value>, new: impl Into<Value>) -> Self {
        Self::Updated {
            key: Value::Text(key.into()),
            old: old.into(),
            new: new.into(),
        }
    }
}

fn position_value(position: usize) -> Value {
    Value::Int(i64::try_from(position).unwrap_or(i64::MAX))
}

///
/// ChangeSet
///
/// Explicit per-field collection deltas accompanying a save. Fields absent
/// here are maintained by comparing the before and after snapshots.
///

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ChangeSet {
    fields: BTreeMap<String, Vec<CollectionChange>>,
}

impl ChangeSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, field: &str, change: CollectionChange) {
        self.fields
            .entry(field.to_ascii_lowercase())
            .or_default()
            .push(change);
    }

    #[must_use]
    pub fn with(mut self, field: &str, change: CollectionChange) -> Self {
        self.push(field, change);
        self
    }

    #[must_use]
    pub fn get(&self, field: &str) -> Option<&[CollectionChange]> {
        self.fields
            .get(&field.to_ascii_lowercase())
            .map(Vec::as_slice)
    }

    pub(crate) fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}
