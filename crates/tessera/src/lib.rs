//! ## Crate layout
//! - `core`: values, index keys and stores, transactions, maintenance and
//!   the index-aware query planner.
//! - `error`: the public error taxonomy callers match on.
//!
//! The `prelude` module is the surface most callers need.

pub use tessera_core as core;

pub mod error;

pub use error::Error;

//
// Consts
//

/// Workspace version re-export for downstream tooling/tests.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

///
/// Prelude
///

pub mod prelude {
    pub use crate::{
        core::{
            config::DbConfig,
            db::{
                Database, Transaction,
                index::{FieldMode, IndexDefinition, IndexField, IndexKey, IndexKind, IndexSpec},
                maintain::{ChangeSet, CollectionChange},
                manager::ProgressListener,
                query::{ExplainPlan, IndexQuery, Predicate, Query},
                record::{Document, RecordId},
                schema::{ClassDef, Property},
            },
            value::{Value, ValueType},
        },
        error::{Error, ErrorKind, ErrorOrigin},
    };
}
