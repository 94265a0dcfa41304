use crate::db::index::key::{IndexKey, KeyPart};
use std::{cmp::Ordering, fmt, ops::Bound};

///
/// KeyRange
///
/// Key-space bounds for one index. Partial bound keys are padded with
/// sentinels so that a lower bound lands on the lowest and an upper bound on
/// the highest full key sharing the prefix.
///

#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct KeyRange {
    pub lower: Bound<IndexKey>,
    pub upper: Bound<IndexKey>,
}

impl KeyRange {
    #[must_use]
    pub const fn all() -> Self {
        Self {
            lower: Bound::Unbounded,
            upper: Bound::Unbounded,
        }
    }

    /// Range between two (possibly partial) keys of an index of `arity`.
    #[must_use]
    pub fn between(
        arity: usize,
        lower: Option<&IndexKey>,
        lower_inclusive: bool,
        upper: Option<&IndexKey>,
        upper_inclusive: bool,
    ) -> Self {
        let lower = lower.map_or(Bound::Unbounded, |key| {
            if lower_inclusive {
                Bound::Included(key.padded(arity, &KeyPart::Low))
            } else {
                Bound::Excluded(key.padded(arity, &KeyPart::High))
            }
        });
        let upper = upper.map_or(Bound::Unbounded, |key| {
            if upper_inclusive {
                Bound::Included(key.padded(arity, &KeyPart::High))
            } else {
                Bound::Excluded(key.padded(arity, &KeyPart::Low))
            }
        });

        Self { lower, upper }
    }

    /// Every full key that starts with `prefix`.
    #[must_use]
    pub fn prefix(arity: usize, prefix: &IndexKey) -> Self {
        Self::between(arity, Some(prefix), true, Some(prefix), true)
    }

    #[must_use]
    pub fn contains(&self, key: &IndexKey) -> bool {
        let above = match &self.lower {
            Bound::Unbounded => true,
            Bound::Included(low) => key >= low,
            Bound::Excluded(low) => key > low,
        };
        let below = match &self.upper {
            Bound::Unbounded => true,
            Bound::Included(high) => key <= high,
            Bound::Excluded(high) => key < high,
        };

        above && below
    }

    /// True when no key can satisfy both bounds.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        let (low, low_incl, high, high_incl) = match (&self.lower, &self.upper) {
            (Bound::Included(l), Bound::Included(h)) => (l, true, h, true),
            (Bound::Included(l), Bound::Excluded(h)) => (l, true, h, false),
            (Bound::Excluded(l), Bound::Included(h)) => (l, false, h, true),
            (Bound::Excluded(l), Bound::Excluded(h)) => (l, false, h, false),
            _ => return false,
        };

        match low.cmp(high) {
            Ordering::Greater => true,
            Ordering::Equal => !(low_incl && high_incl),
            Ordering::Less => false,
        }
    }

    /// Borrowed bounds for `BTreeMap::range`; only valid when not empty.
    #[must_use]
    pub fn as_bounds(&self) -> (Bound<&IndexKey>, Bound<&IndexKey>) {
        (self.lower.as_ref(), self.upper.as_ref())
    }
}

impl fmt::Display for KeyRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.lower {
            Bound::Included(key) => write!(f, "[{key}")?,
            Bound::Excluded(key) => write!(f, "({key}")?,
            Bound::Unbounded => f.write_str("(-inf")?,
        }
        f.write_str(" .. ")?;
        match &self.upper {
            Bound::Included(key) => write!(f, "{key}]"),
            Bound::Excluded(key) => write!(f, "{key})"),
            Bound::Unbounded => f.write_str("+inf)"),
        }
    }
}
