//! Secondary indexes: key model, definitions, stores and registered handles.

pub(crate) mod chain;
pub(crate) mod definition;
pub(crate) mod handle;
pub(crate) mod key;
pub(crate) mod kind;
pub(crate) mod store;

pub use chain::ChainedIndex;
pub use definition::{DefinitionError, FieldMode, IndexDefinition, IndexField};
pub use handle::{IndexHandle, IndexId, IndexSpec};
pub use key::{IndexKey, KeyPart, KeyRange};
pub use kind::{IndexKind, UnknownIndexKind};
pub use store::{IndexEntry, IndexOps, IndexStore, StoreError};
