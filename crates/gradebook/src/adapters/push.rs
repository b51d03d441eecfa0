//! The shared per-row push state machine.
//!
//! Every adapter drives its pending rows through the same dispatch:
//! create when no identity is attached, update when one is, delete only
//! when a server identity exists (otherwise the row is purely local and
//! is removed without any network call). A successful create immediately
//! reconciles the row and rewrites child references so dependents pushed
//! later in the same cycle carry the fresh server identity.

use async_trait::async_trait;
use tracing::{debug, warn};

use gradebook_api::{ApiResult, Mirrored, ServerId, SyncState};

use crate::storage::{MirrorEntity, MirrorStore};
use crate::sync::connectivity::ConnectivityMonitor;
use crate::sync::report::EntityPush;

/// Remote mutation endpoints for one entity type.
#[async_trait]
pub(crate) trait RemoteMutator<E: MirrorEntity>: Send + Sync {
    fn entity_name(&self) -> &'static str;

    /// Err(reason) when the row cannot go out yet, e.g. its parent
    /// reference is still local-only. Deferred rows retry next cycle.
    fn push_ready(&self, row: &Mirrored<E>) -> Result<(), String> {
        let _ = row;
        Ok(())
    }

    async fn push_create(&self, row: &Mirrored<E>) -> ApiResult<ServerId>;
    async fn push_update(&self, id: ServerId, row: &Mirrored<E>) -> ApiResult<()>;
    async fn push_delete(&self, id: ServerId) -> ApiResult<()>;
}

pub(crate) async fn drain_pending<E, M>(
    store: &MirrorStore,
    net: &ConnectivityMonitor,
    mutator: &M,
) -> EntityPush
where
    E: MirrorEntity,
    M: RemoteMutator<E>,
{
    let mut report = EntityPush {
        entity: mutator.entity_name().to_string(),
        ..Default::default()
    };

    let rows = match store.list_pending::<E>().await {
        Ok(rows) => rows,
        Err(err) => {
            warn!(entity = mutator.entity_name(), error = %err, "could not list pending rows");
            return report;
        }
    };

    for row in rows {
        if let Err(reason) = mutator.push_ready(&row) {
            debug!(
                entity = mutator.entity_name(),
                local_id = row.local_id.0,
                reason = %reason,
                "deferring row until next cycle"
            );
            report.deferred += 1;
            continue;
        }

        let outcome = push_row(store, mutator, &row).await;
        match outcome {
            Ok(networked) => {
                if networked {
                    net.note_success();
                }
                report.pushed += 1;
            }
            Err(PushError::Storage(err)) => {
                warn!(
                    entity = mutator.entity_name(),
                    local_id = row.local_id.0,
                    error = %err,
                    "storage failure while confirming push"
                );
                report.failed += 1;
            }
            Err(PushError::Api(err)) => {
                net.note_error(&err);
                if err.is_rejection() {
                    warn!(
                        entity = mutator.entity_name(),
                        local_id = row.local_id.0,
                        error = %err,
                        "row rejected by server, left pending"
                    );
                    report.rejected += 1;
                } else {
                    warn!(
                        entity = mutator.entity_name(),
                        local_id = row.local_id.0,
                        error = %err,
                        "row push failed, will retry next cycle"
                    );
                    report.failed += 1;
                }
            }
        }
    }

    report
}

enum PushError {
    Api(gradebook_api::ApiError),
    Storage(crate::storage::StorageError),
}

impl From<gradebook_api::ApiError> for PushError {
    fn from(err: gradebook_api::ApiError) -> Self {
        PushError::Api(err)
    }
}

impl From<crate::storage::StorageError> for PushError {
    fn from(err: crate::storage::StorageError) -> Self {
        PushError::Storage(err)
    }
}

/// Returns whether the backend was actually involved, so the caller only
/// feeds real network outcomes into the connectivity monitor.
async fn push_row<E, M>(
    store: &MirrorStore,
    mutator: &M,
    row: &Mirrored<E>,
) -> Result<bool, PushError>
where
    E: MirrorEntity,
    M: RemoteMutator<E>,
{
    match (row.state, row.server_id) {
        (SyncState::PendingDelete, None) => {
            // Purely local tombstone: nothing to tell the server.
            store.remove_row::<E>(row.local_id).await?;
            Ok(false)
        }
        (SyncState::PendingDelete, Some(id)) => {
            match mutator.push_delete(id).await {
                Ok(()) => {}
                // Already gone remotely counts as confirmed.
                Err(err) if err.status() == Some(404) => {
                    debug!(
                        entity = mutator.entity_name(),
                        server_id = id.0,
                        "remote row already deleted"
                    );
                }
                Err(err) => return Err(err.into()),
            }
            store.reconcile_after_push::<E>(row.local_id, id).await?;
            Ok(true)
        }
        (SyncState::PendingUpdate, Some(id)) => {
            mutator.push_update(id, row).await?;
            store.reconcile_after_push::<E>(row.local_id, id).await?;
            Ok(true)
        }
        // No identity attached yet: issue a create. Covers PendingCreate
        // and the defensive case of an update row that lost its identity.
        (SyncState::PendingCreate | SyncState::PendingUpdate, _) => {
            let server_id = mutator.push_create(row).await?;
            store.reconcile_after_push::<E>(row.local_id, server_id).await?;
            // Children recorded against our local key can now reference
            // the real identity.
            store
                .rewrite_parent_ref(E::TABLE, row.local_id, server_id)
                .await?;
            Ok(true)
        }
        (SyncState::Synced, _) => Ok(false),
    }
}
