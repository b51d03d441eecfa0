//! Per-entity sync adapters.
//!
//! One adapter per entity type. Each translates between mirror rows and
//! remote DTOs, decides per call whether to use the network or the cache,
//! and participates in the orchestrator's push/pull cycle through the
//! object-safe [`SyncAdapter`] trait.

use async_trait::async_trait;

use gradebook_api::{EntityRef, Mirrored};

use crate::sync::report::{EntityPull, EntityPush};

pub mod activities;
pub mod catalog;
pub mod groups;
mod push;
pub mod scores;
pub mod students;

pub use activities::ActivitiesAdapter;
pub use catalog::{SubjectsAdapter, TermsAdapter};
pub use groups::GroupsAdapter;
pub use scores::ScoresAdapter;
pub use students::StudentsAdapter;

/// An adapter's participation in a sync cycle. Both phases are
/// infallible from the orchestrator's point of view: every per-row or
/// per-collection failure is folded into the returned report.
#[async_trait]
pub trait SyncAdapter: Send + Sync {
    fn entity_name(&self) -> &'static str;

    /// Upload this entity's pending rows, one by one; a row's failure
    /// never aborts the rest.
    async fn push_pending(&self) -> EntityPush;

    /// Refresh the mirror from the authoritative collections.
    async fn pull(&self) -> EntityPull;
}

/// Encodings a scoped read should match against: both identities of the
/// mirrored parent when it is known, the caller's reference otherwise.
pub(crate) fn scope_encodings<E>(row: Option<&Mirrored<E>>, fallback: EntityRef) -> Vec<String> {
    match row {
        Some(row) => row.reference_encodings(),
        None => vec![fallback.encode()],
    }
}
