//! Local mirror storage.

pub mod entities;
pub mod mirror;
pub mod schema;
pub mod types;

pub use entities::MirrorEntity;
pub use mirror::{MirrorStore, UpsertSummary};
pub use schema::ForeignKeySpec;
pub use types::{MutationKind, StorageError, StorageResult};

#[cfg(test)]
mod mirror_tests;
