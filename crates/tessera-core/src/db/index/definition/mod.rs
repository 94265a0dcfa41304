//! Module: index::definition
//! Responsibility: which fields of a record produce which index keys.
//! Does not own: storage of keys or maintenance ordering.


use crate::{
    MAX_INDEX_FIELDS,
    db::{index::key::IndexKey, record::Document},
    error::{ErrorClass, ErrorOrigin, InternalError},
    value::{Value, ValueType},
};
use std::{collections::BTreeSet, fmt};
use thiserror::Error as ThisError;

///
/// DefinitionError
///

#[derive(Debug, Eq, PartialEq, ThisError)]
pub enum DefinitionError {
    #[error("index definition needs at least one field")]
    Empty,

    #[error("index definition has {count} fields, at most {max} are allowed")]
    TooManyFields { count: usize, max: usize },

    #[error("composite key cannot contain more than one collection field: {0:?}")]
    MultipleCollections(Vec<String>),

    #[error("field '{0}' appears more than once")]
    DuplicateField(String),

    #[error("value {value} of field '{field}' cannot be converted to {ty}")]
    Conversion {
        field: String,
        value: String,
        ty: ValueType,
    },

    #[error("key arity {found} does not fit declared arity {expected}")]
    Arity { expected: usize, found: usize },
}

impl From<DefinitionError> for InternalError {
    fn from(err: DefinitionError) -> Self {
        let class = match err {
            DefinitionError::Conversion { .. } | DefinitionError::Arity { .. } => {
                ErrorClass::InvalidKey
            }
            _ => ErrorClass::Unsupported,
        };

        Self::new(class, ErrorOrigin::Index, err.to_string())
    }
}

///
/// FieldMode
///
/// How a field contributes key components. At most one field of a
/// definition may use a collection mode.
///

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum FieldMode {
    Scalar,
    ByElement,
    ByMapKey,
    ByMapValue,
}

impl FieldMode {
    #[must_use]
    pub const fn is_collection(self) -> bool {
        !matches!(self, Self::Scalar)
    }
}

///
/// IndexField
///

#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct IndexField {
    pub name: String,
    pub key_type: ValueType,
    pub mode: FieldMode,
}

impl IndexField {
    #[must_use]
    pub fn new(name: impl Into<String>, key_type: ValueType) -> Self {
        Self {
            name: name.into(),
            key_type,
            mode: FieldMode::Scalar,
        }
    }

    /// One key per list element; `key_type` is the element type.
    #[must_use]
    pub fn by_element(name: impl Into<String>, key_type: ValueType) -> Self {
        Self {
            mode: FieldMode::ByElement,
            ..Self::new(name, key_type)
        }
    }

    /// One key per map key.
    #[must_use]
    pub fn by_map_key(name: impl Into<String>) -> Self {
        Self {
            mode: FieldMode::ByMapKey,
            ..Self::new(name, ValueType::Text)
        }
    }

    /// One key per map value; `key_type` is the value type.
    #[must_use]
    pub fn by_map_value(name: impl Into<String>, key_type: ValueType) -> Self {
        Self {
            mode: FieldMode::ByMapValue,
            ..Self::new(name, key_type)
        }
    }

    #[must_use]
    pub fn is(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
    }

    fn convert(&self, value: &Value) -> Result<Value, DefinitionError> {
        value
            .coerce(self.key_type)
            .ok_or_else(|| DefinitionError::Conversion {
                field: self.name.clone(),
                value: value.to_string(),
                ty: self.key_type,
            })
    }

    /// Key components this field contributes for one field value.
    fn components(&self, value: &Value) -> Result<Vec<Value>, DefinitionError> {
        match (self.mode, value) {
            (FieldMode::Scalar, v) => Ok(vec![self.convert(v)?]),
            (FieldMode::ByElement, Value::List(items)) => {
                items.iter().map(|item| self.convert(item)).collect()
            }
            (FieldMode::ByMapKey, Value::Map(entries)) => entries
                .keys()
                .map(|k| self.convert(&Value::Text(k.clone())))
                .collect(),
            (FieldMode::ByMapValue, Value::Map(entries)) => {
                entries.values().map(|v| self.convert(v)).collect()
            }
            // a non-collection value in a collection field indexes as null
            (FieldMode::ByElement, v) if v.is_scalar() && !v.is_null() => Ok(vec![self.convert(v)?]),
            _ => Ok(vec![Value::Null]),
        }
    }

    fn is_empty_collection(&self, value: &Value) -> bool {
        match (self.mode, value) {
            (FieldMode::ByElement, Value::List(items)) => items.is_empty(),
            (FieldMode::ByMapKey | FieldMode::ByMapValue, Value::Map(entries)) => entries.is_empty(),
            _ => false,
        }
    }
}

impl fmt::Display for IndexField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.mode {
            FieldMode::Scalar => write!(f, "{}", self.name),
            FieldMode::ByElement => write!(f, "{} by element", self.name),
            FieldMode::ByMapKey => write!(f, "{} by key", self.name),
            FieldMode::ByMapValue => write!(f, "{} by value", self.name),
        }
    }
}

///
/// IndexDefinition
///
/// Ordered field list of one index over a class and its subclasses.
/// `ignore_nulls` drops every key with a null component instead of
/// indexing it as the lowest value.
///

#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct IndexDefinition {
    class: String,
    fields: Vec<IndexField>,
    ignore_nulls: bool,
}

impl IndexDefinition {
    pub fn new(
        class: impl Into<String>,
        fields: impl IntoIterator<Item = IndexField>,
    ) -> Result<Self, DefinitionError> {
        let fields: Vec<IndexField> = fields.into_iter().collect();

        if fields.is_empty() {
            return Err(DefinitionError::Empty);
        }
        if fields.len() > MAX_INDEX_FIELDS {
            return Err(DefinitionError::TooManyFields {
                count: fields.len(),
                max: MAX_INDEX_FIELDS,
            });
        }

        let mut seen = BTreeSet::new();
        for field in &fields {
            if !seen.insert(field.name.to_ascii_lowercase()) {
                return Err(DefinitionError::DuplicateField(field.name.clone()));
            }
        }

        let collections: Vec<String> = fields
            .iter()
            .filter(|f| f.mode.is_collection())
            .map(|f| f.name.clone())
            .collect();
        if collections.len() > 1 {
            return Err(DefinitionError::MultipleCollections(collections));
        }

        Ok(Self {
            class: class.into(),
            fields,
            ignore_nulls: false,
        })
    }

    /// Single scalar field definition.
    pub fn simple(
        class: impl Into<String>,
        field: impl Into<String>,
        key_type: ValueType,
    ) -> Result<Self, DefinitionError> {
        Self::new(class, [IndexField::new(field, key_type)])
    }

    #[must_use]
    pub const fn with_ignore_nulls(mut self, ignore_nulls: bool) -> Self {
        self.ignore_nulls = ignore_nulls;
        self
    }

    #[must_use]
    pub fn class(&self) -> &str {
        &self.class
    }

    #[must_use]
    pub fn fields(&self) -> &[IndexField] {
        &self.fields
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }

    #[must_use]
    pub const fn arity(&self) -> usize {
        self.fields.len()
    }

    #[must_use]
    pub const fn is_composite(&self) -> bool {
        self.fields.len() > 1
    }

    #[must_use]
    pub const fn ignore_nulls(&self) -> bool {
        self.ignore_nulls
    }

    /// Position and declaration of the collection field, if any.
    #[must_use]
    pub fn collection_field(&self) -> Option<(usize, &IndexField)> {
        self.fields
            .iter()
            .enumerate()
            .find(|(_, f)| f.mode.is_collection())
    }

    #[must_use]
    pub fn position_of(&self, field: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.is(field))
    }

    /// Every key the record contributes, in key order without duplicates.
    ///
    /// An empty collection contributes nothing on its own, but in a
    /// composite it takes a null component so the record stays reachable
    /// through the scalar fields.
    pub fn keys_for(&self, doc: &Document) -> Result<Vec<IndexKey>, DefinitionError> {
        let mut combos: Vec<IndexKey> = vec![IndexKey::new([])];
        for field in &self.fields {
            let mut components = field.components(doc.get(&field.name))?;
            if components.is_empty() && self.is_composite() {
                components.push(Value::Null);
            }
            combos = combos
                .iter()
                .flat_map(|prefix| {
                    components.iter().map(move |c| {
                        let mut key = prefix.clone();
                        key.push(c.clone());
                        key
                    })
                })
                .collect();
        }

        let keys: BTreeSet<IndexKey> = combos
            .into_iter()
            .filter(|key| !(self.ignore_nulls && key.has_null()))
            .collect();

        Ok(keys.into_iter().collect())
    }

    /// Key for a single collection component combined with the record's
    /// scalar fields. `None` when the key is dropped for holding a null.
    pub(crate) fn key_with_component(
        &self,
        doc: &Document,
        component: &Value,
    ) -> Result<Option<IndexKey>, DefinitionError> {
        let mut key = IndexKey::new([]);
        for field in &self.fields {
            let value = if field.mode.is_collection() {
                field.convert(component)?
            } else {
                field.convert(doc.get(&field.name))?
            };
            key.push(value);
        }

        Ok((!(self.ignore_nulls && key.has_null())).then_some(key))
    }

    /// Null-component key a composite holds while its collection field is
    /// empty in `doc`.
    pub(crate) fn empty_collection_key(
        &self,
        doc: &Document,
    ) -> Result<Option<IndexKey>, DefinitionError> {
        match self.collection_field() {
            Some((_, field))
                if self.is_composite() && field.is_empty_collection(doc.get(&field.name)) =>
            {
                self.key_with_component(doc, &Value::Null)
            }
            _ => Ok(None),
        }
    }

    /// Converted components the collection field holds in `doc`.
    pub(crate) fn collection_components(
        &self,
        doc: &Document,
    ) -> Result<BTreeSet<Value>, DefinitionError> {
        let Some((_, field)) = self.collection_field() else {
            return Ok(BTreeSet::new());
        };

        Ok(field.components(doc.get(&field.name))?.into_iter().collect())
    }

    /// Build a (possibly partial) key from query literals, converting each
    /// literal into its field's declared type.
    ///
    /// Returns `Ok(None)` when a literal has no representation in the field
    /// type; such a condition cannot match through this index.
    pub fn create_key(&self, values: &[Value]) -> Result<Option<IndexKey>, DefinitionError> {
        if values.is_empty() || values.len() > self.fields.len() {
            return Err(DefinitionError::Arity {
                expected: self.fields.len(),
                found: values.len(),
            });
        }

        let mut key = IndexKey::new([]);
        for (field, value) in self.fields.iter().zip(values) {
            match value.coerce(field.key_type) {
                Some(v) => key.push(v),
                None => return Ok(None),
            }
        }

        Ok(Some(key))
    }
}

impl fmt::Display for IndexDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.class)?;
        for (i, field) in self.fields.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{field}")?;
        }
        write!(f, ")")
    }
}
