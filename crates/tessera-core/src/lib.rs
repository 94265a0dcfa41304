//! Core runtime for Tessera: values, index keys and stores, transactional
//! index overlays, index maintenance, and index-aware query planning.
#![warn(unreachable_pub)]

// public exports are one module level down
pub mod config;
pub mod db;
pub mod error;
pub mod obs;
pub mod value;

// test
#[cfg(test)]
pub(crate) mod test_support;

///
/// CONSTANTS
///

/// Maximum number of fields a single index definition may declare.
///
/// Bounds composite key arity so range bounds and cross products stay small.
pub const MAX_INDEX_FIELDS: usize = 8;

/// Maximum number of link hops a chained index lookup may walk.
pub const MAX_CHAIN_HOPS: usize = 8;

///
/// Prelude
///
/// Prelude contains only domain vocabulary.
/// No stores, planners, or helpers are re-exported here.
///

pub mod prelude {
    pub use crate::{
        db::{
            Database,
            index::{FieldMode, IndexDefinition, IndexField, IndexKey, IndexKind, IndexSpec},
            query::{Predicate, Query},
            record::{Document, RecordId},
            schema::{ClassDef, Property},
        },
        value::{Value, ValueType},
    };
}
