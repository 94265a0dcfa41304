use std::{fmt, str::FromStr};
use thiserror::Error as ThisError;

///
/// IndexKind
///
/// Closed set of index implementations. Tree kinds keep keys ordered and
/// answer range scans; hash kinds answer point lookups only.
///

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum IndexKind {
    Unique,
    NotUnique,
    UniqueHash,
    NotUniqueHash,
    FullText,
}

impl IndexKind {
    #[must_use]
    pub const fn is_unique(self) -> bool {
        matches!(self, Self::Unique | Self::UniqueHash)
    }

    #[must_use]
    pub const fn is_hash(self) -> bool {
        matches!(self, Self::UniqueHash | Self::NotUniqueHash)
    }

    #[must_use]
    pub const fn is_fulltext(self) -> bool {
        matches!(self, Self::FullText)
    }

    #[must_use]
    pub const fn supports_range(self) -> bool {
        matches!(self, Self::Unique | Self::NotUnique)
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unique => "UNIQUE",
            Self::NotUnique => "NOT_UNIQUE",
            Self::UniqueHash => "UNIQUE_HASH",
            Self::NotUniqueHash => "NOTUNIQUE_HASH",
            Self::FullText => "FULLTEXT",
        }
    }
}

impl fmt::Display for IndexKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

///
/// UnknownIndexKind
///

#[derive(Debug, Eq, PartialEq, ThisError)]
#[error("unknown index kind '{0}'")]
pub struct UnknownIndexKind(pub String);

impl FromStr for IndexKind {
    type Err = UnknownIndexKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().replace('-', "_").as_str() {
            "UNIQUE" => Ok(Self::Unique),
            "NOT_UNIQUE" | "NOTUNIQUE" => Ok(Self::NotUnique),
            "UNIQUE_HASH" | "UNIQUE_HASH_INDEX" => Ok(Self::UniqueHash),
            "NOTUNIQUE_HASH" | "NOT_UNIQUE_HASH" | "NOTUNIQUE_HASH_INDEX" => Ok(Self::NotUniqueHash),
            "FULLTEXT" => Ok(Self::FullText),
            _ => Err(UnknownIndexKind(s.to_string())),
        }
    }
}
