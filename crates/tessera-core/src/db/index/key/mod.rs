//! Module: index::key
//! Responsibility: composite key representation, ordering and prefix bounds.
//! Does not own: extraction of keys from records (see `definition`).

mod range;

#[cfg(test)]
mod tests;

pub use range::KeyRange;

use crate::value::Value;
use std::{cmp::Ordering, fmt};

///
/// KeyPart
///
/// One key component. `Low` and `High` are bound-only sentinels that sort
/// below and above every value; stored keys only hold `Value` parts.
///

#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum KeyPart {
    Low,
    Value(Value),
    High,
}

impl KeyPart {
    #[must_use]
    pub const fn as_value(&self) -> Option<&Value> {
        match self {
            Self::Value(v) => Some(v),
            Self::Low | Self::High => None,
        }
    }
}

///
/// IndexKey
///
/// Simple (arity 1) or composite key. Keys order lexicographically by
/// component; a shorter key is a partial key addressing every full key
/// that starts with it.
///

#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct IndexKey(Vec<KeyPart>);

impl IndexKey {
    #[must_use]
    pub fn new(values: impl IntoIterator<Item = Value>) -> Self {
        Self(values.into_iter().map(KeyPart::Value).collect())
    }

    #[must_use]
    pub fn simple(value: impl Into<Value>) -> Self {
        Self(vec![KeyPart::Value(value.into())])
    }

    #[must_use]
    pub const fn arity(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn parts(&self) -> &[KeyPart] {
        &self.0
    }

    /// Value components; sentinels are skipped.
    pub fn values(&self) -> impl Iterator<Item = &Value> {
        self.0.iter().filter_map(KeyPart::as_value)
    }

    /// First component, used by simple-key consumers.
    #[must_use]
    pub fn first(&self) -> Option<&Value> {
        self.0.first().and_then(KeyPart::as_value)
    }

    #[must_use]
    pub fn has_null(&self) -> bool {
        self.values().any(Value::is_null)
    }

    #[must_use]
    pub fn is_sentinel_free(&self) -> bool {
        self.0.iter().all(|p| matches!(p, KeyPart::Value(_)))
    }

    /// Compare after truncating both keys to the shorter arity.
    #[must_use]
    pub fn cmp_prefix(&self, other: &Self) -> Ordering {
        let len = self.0.len().min(other.0.len());
        self.0[..len].cmp(&other.0[..len])
    }

    #[must_use]
    pub fn starts_with(&self, prefix: &Self) -> bool {
        self.0.starts_with(&prefix.0)
    }

    /// Extend with `fill` up to `arity` components.
    #[must_use]
    pub(crate) fn padded(&self, arity: usize, fill: &KeyPart) -> Self {
        let mut parts = self.0.clone();
        while parts.len() < arity {
            parts.push(fill.clone());
        }

        Self(parts)
    }

    pub(crate) fn push(&mut self, value: Value) {
        self.0.push(KeyPart::Value(value));
    }
}

impl From<Value> for IndexKey {
    fn from(value: Value) -> Self {
        Self::simple(value)
    }
}

impl fmt::Display for IndexKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let render = |part: &KeyPart, f: &mut fmt::Formatter<'_>| match part {
            KeyPart::Low => write!(f, "-inf"),
            KeyPart::Value(v) => write!(f, "{v}"),
            KeyPart::High => write!(f, "+inf"),
        };

        if let [single] = self.0.as_slice() {
            return render(single, f);
        }

        write!(f, "[")?;
        for (i, part) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            render(part, f)?;
        }
        write!(f, "]")
    }
}
