//! Record identity, documents, and the record source contract used by
//! index builds, full scans and chain evaluation.


use crate::value::Value;
use std::{collections::BTreeMap, fmt, str::FromStr};
use thiserror::Error as ThisError;

///
/// RecordId
///
/// Physical record address `#cluster:position`.
/// Negative coordinates mark a record that has not been stored yet.
///

#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct RecordId {
    pub cluster: i32,
    pub position: i64,
}

impl RecordId {
    pub const NEW: Self = Self {
        cluster: -1,
        position: -1,
    };

    #[must_use]
    pub const fn new(cluster: i32, position: i64) -> Self {
        Self { cluster, position }
    }

    #[must_use]
    pub const fn is_persistent(&self) -> bool {
        self.cluster >= 0 && self.position >= 0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}:{}", self.cluster, self.position)
    }
}

///
/// RecordIdParseError
///

#[derive(Debug, Eq, PartialEq, ThisError)]
#[error("invalid record id '{0}'")]
pub struct RecordIdParseError(pub String);

impl FromStr for RecordId {
    type Err = RecordIdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || RecordIdParseError(s.to_string());
        let body = s.strip_prefix('#').unwrap_or(s);
        let (cluster, position) = body.split_once(':').ok_or_else(err)?;

        Ok(Self {
            cluster: cluster.parse().map_err(|_| err())?,
            position: position.parse().map_err(|_| err())?,
        })
    }
}

///
/// Document
///
/// A stored record: class name, version and named field values.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Document {
    rid: RecordId,
    class: String,
    version: u64,
    fields: BTreeMap<String, Value>,
}

impl Document {
    #[must_use]
    pub fn new(class: impl Into<String>) -> Self {
        Self {
            rid: RecordId::NEW,
            class: class.into(),
            version: 0,
            fields: BTreeMap::new(),
        }
    }

    /// Builder-style field assignment.
    #[must_use]
    pub fn with(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(field, value);
        self
    }

    pub fn set(&mut self, field: impl Into<String>, value: impl Into<Value>) {
        self.fields.insert(field.into(), value.into());
    }

    pub fn remove(&mut self, field: &str) -> Option<Value> {
        self.fields.remove(field)
    }

    /// Field value; missing fields read as null.
    #[must_use]
    pub fn get(&self, field: &str) -> &Value {
        const NULL: &Value = &Value::Null;

        self.fields.get(field).unwrap_or(NULL)
    }

    /// Mutable access to a collection field for in-place edits.
    pub fn get_mut(&mut self, field: &str) -> Option<&mut Value> {
        self.fields.get_mut(field)
    }

    #[must_use]
    pub const fn rid(&self) -> RecordId {
        self.rid
    }

    #[must_use]
    pub fn class(&self) -> &str {
        &self.class
    }

    #[must_use]
    pub const fn version(&self) -> u64 {
        self.version
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub(crate) const fn assign(&mut self, rid: RecordId, version: u64) {
        self.rid = rid;
        self.version = version;
    }
}

///
/// RecordSource
///
/// Read access to stored records. Implemented by the in-memory store and by
/// transactions, which layer their own writes on top.
///

pub trait RecordSource {
    fn load(&self, rid: RecordId) -> Option<Document>;

    fn version(&self, rid: RecordId) -> Option<u64> {
        self.load(rid).map(|doc| doc.version())
    }

    /// Every record stored in one of `clusters`, in record id order.
    fn scan_clusters(&self, clusters: &[i32]) -> Vec<Document>;
}

///
/// MemoryRecords
///
/// In-memory record storage with per-cluster position allocation.
///

#[derive(Debug, Default)]
pub struct MemoryRecords {
    docs: BTreeMap<RecordId, Document>,
    next_position: BTreeMap<i32, i64>,
}

impl MemoryRecords {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve the next position in `cluster`.
    pub fn allocate(&mut self, cluster: i32) -> RecordId {
        let next = self.next_position.entry(cluster).or_insert(0);
        let rid = RecordId::new(cluster, *next);
        *next += 1;

        rid
    }

    pub fn insert(&mut self, doc: Document) {
        let rid = doc.rid();
        let next = self.next_position.entry(rid.cluster).or_insert(0);
        if rid.position >= *next {
            *next = rid.position + 1;
        }
        self.docs.insert(rid, doc);
    }

    pub fn remove(&mut self, rid: RecordId) -> Option<Document> {
        self.docs.remove(&rid)
    }

    #[must_use]
    pub fn get(&self, rid: RecordId) -> Option<&Document> {
        self.docs.get(&rid)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.docs.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }
}

impl RecordSource for MemoryRecords {
    fn load(&self, rid: RecordId) -> Option<Document> {
        self.docs.get(&rid).cloned()
    }

    fn version(&self, rid: RecordId) -> Option<u64> {
        self.docs.get(&rid).map(Document::version)
    }

    fn scan_clusters(&self, clusters: &[i32]) -> Vec<Document> {
        let mut sorted = clusters.to_vec();
        sorted.sort_unstable();
        sorted.dedup();

        sorted
            .into_iter()
            .flat_map(|cluster| {
                self.docs
                    .range(RecordId::new(cluster, 0)..=RecordId::new(cluster, i64::MAX))
                    .map(|(_, doc)| doc.clone())
            })
            .collect()
    }
}
